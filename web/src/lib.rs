//! Axum glue shared by Gigbook's server-rendered pages.
//!
//! Handlers in the marketplace crate follow one shape:
//!
//! 1. extract the session user, path, query and form
//! 2. load the row and build an action
//! 3. dispatch through a per-request `Store`
//! 4. answer with a redirect carrying a flash message, or rendered HTML
//!
//! This crate provides the pieces of that shape that have nothing to do with
//! DJs or bookings: [`AppError`] (HTML error pages), [`flash`] redirects,
//! request extractors, the correlation-id middleware, and health handlers.
//!
//! # Example
//!
//! ```ignore
//! use gigbook_web::{flash, AppError};
//!
//! async fn accept(
//!     State(state): State<AppState>,
//!     user: CurrentUser,
//!     Path(id): Path<Uuid>,
//! ) -> Result<Redirect, AppError> {
//!     let outcome = run_booking_command(&state, id, BookingAction::Accept { .. }).await?;
//!     Ok(flash::message(&format!("/dashboard/requests/{id}"), "Request accepted"))
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod flash;
pub mod handlers;
pub mod html;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{ClientIp, CorrelationId};
pub use flash::Flash;
pub use middleware::{correlation_id_layer, CorrelationIdExt, CORRELATION_ID_HEADER};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
