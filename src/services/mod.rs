pub mod orchestrator;
pub mod retry;
pub mod validator;

pub use orchestrator::Orchestrator;
pub use retry::{run_with_retry, RetryPolicy};
pub use validator::Validator;
