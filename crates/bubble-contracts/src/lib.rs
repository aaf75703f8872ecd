pub mod events;
pub mod logs;
pub mod messages;
pub mod models;
pub mod words;
