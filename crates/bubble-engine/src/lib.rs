pub mod credentials;
pub mod error;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod recognize;
pub mod retry;
pub mod sse;
pub mod stream;
pub mod transport;

pub use credentials::CredentialResolver;
pub use error::{ErrorKind, GatewayError};
pub use provider::{
    build_provider, Completion, ProviderConfig, ProviderRegistry, ProviderResponse,
    VisionProvider,
};
pub use recognize::{extract_guess, RecognitionAttempt, Recognizer, RECOGNITION_ATTEMPTS};
pub use retry::{run_with_retry, with_retry, DEFAULT_ATTEMPTS};
pub use stream::{FragmentStream, Reassembler, StreamEnd};
pub use transport::{HttpReply, HttpTransport, ReqwestTransport};
