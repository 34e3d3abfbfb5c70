//! # Actix Middleware Library
//!
//! Middleware shared by the chat backend's Actix surfaces
//!
//! ## Modules
//! - `front_door`: per-request authorization, inserts [`AuthContext`]
//! - `logging`: request/response logging via tracing
//! - `correlation_id`: `X-Correlation-ID` propagation

pub mod correlation_id;
pub mod front_door;
pub mod logging;

pub use correlation_id::{get_correlation_id, CorrelationId, CorrelationIdMiddleware};
pub use front_door::{AuthContext, FrontDoor};
pub use logging::Logging;
