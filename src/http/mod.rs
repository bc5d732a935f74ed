//! Operational HTTP surface.
//!
//! # Data Flow
//! ```text
//! request
//!     → server.rs (request id, trace, timeout, body limit)
//!     → hooks.rs (provider notifications → background scheduler jobs)
//!     → handlers.rs (registrations, forwarding, draw reports, health)
//!     → admin/ (bearer-token routes)
//!     → response.rs (error kind → status)
//! ```
//!
//! # Design Decisions
//! - Hooks answer 202 at once; the job is coalesced per key and runs
//!   under the scheduler's locks
//! - Draw finalization is never awaited by a request since stretching
//!   outlives any reasonable request timeout

pub mod handlers;
pub mod hooks;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{ApiError, ApiResult};
pub use server::{build_router, AppState, HttpServer};
