pub mod env;
pub mod retry;
pub mod tracing_init;

pub use env::AppConfig;
pub use retry::RetryPolicy;
pub use tracing_init::init_tracing;
