mod equivalence;
mod index;
mod table;

pub use equivalence::{FAILURE_MARKER, HINT_REVEAL_AFTER};
pub use index::{SurfaceIndex, Target, UnknownWord};
pub use table::{Concept, LanguageSpec, SynonymTable, DEFAULT_LANGUAGE};
