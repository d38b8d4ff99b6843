//! Handlers that are the same for every Gigbook deployment.

pub mod health;

pub use health::{health_check, readiness};
