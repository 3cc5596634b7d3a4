// bearer-client - credentialed HTTP API client with token refresh and retry

pub mod auth;
pub mod classifier;
pub mod config;
pub mod error;
pub mod http_client;
pub mod logging;
pub mod models;
pub mod transport;

pub use auth::{AuthManager, Credentials, Token};
pub use classifier::{Classification, ErrorClassifier};
pub use config::{ClientArgs, ClientConfig};
pub use error::{ClientError, Result, TransportError, TransportErrorKind};
pub use http_client::{ApiClient, RetryPolicy};
pub use models::{ApiRequest, ApiResponse};
pub use transport::{ReqwestTransport, Transport};
