//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`chapters`] — Chapter submission, retrieval, deletion, page serving
//! - [`uploads`] — Upload progress and cancellation
//! - [`system`] — Health, events, OpenAPI

mod chapters;
mod system;
mod uploads;

// Re-export all handlers so `routes::function_name` continues to work
pub use chapters::*;
pub use system::*;
pub use uploads::*;
