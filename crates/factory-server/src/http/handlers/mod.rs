//! HTTP request handlers.

mod batch;
mod health;
mod requirements;
mod token;

pub use batch::{run_batch, run_batch_stream};
pub use health::{devtools_probe, favicon, health_check};
pub use requirements::get_requirements;
pub use token::save_token;
