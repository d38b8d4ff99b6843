//! Gigbook: a two-sided DJ booking marketplace.
//!
//! DJs publish profiles to a public directory; clients browse it and send
//! booking requests without an account. DJs accept or decline from their
//! dashboard, clients pay a deposit through hosted checkout, and a signed
//! webhook marks it paid.
//!
//! # Architecture
//!
//! - [`aggregates`]: booking and profile reducers, run one command per
//!   request in a short-lived store
//! - [`repositories`]: data access under the caller's identity (Postgres
//!   with row-level security, or in memory)
//! - [`providers`]: payments, email and avatar storage behind traits
//! - [`notifications`]: email bodies for every lifecycle step
//! - [`pages`] and [`server`]: server-rendered HTML over Axum
//! - [`config`]: environment configuration

#![allow(clippy::module_name_repetitions)]

pub mod aggregates;
pub mod config;
pub mod notifications;
pub mod pages;
pub mod providers;
pub mod repositories;
pub mod server;
pub mod types;
pub mod validation;

pub use config::Config;
pub use server::{build_router, AppState};
