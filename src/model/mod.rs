mod invoker;
mod retry;
mod transport;
mod types;

pub use invoker::{ModelInvoker, Moderator, RetryingInvoker};
pub use retry::{RetryPolicy, with_retries};
pub use transport::{DirectTransport, ModelTransport, ProxyTransport, TransportError};
pub use types::{Content, GenerateRequest, InlineData, Part, SafetySetting, default_safety_settings};
