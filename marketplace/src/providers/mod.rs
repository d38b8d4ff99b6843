//! External collaborators: payments, email, avatar storage.
//!
//! Each is a trait with an HTTP implementation for the hosted service and,
//! behind the `test-utils` feature, an in-memory mock.

pub mod mailer;
pub mod payments;
pub mod storage;
pub mod webhook;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use mailer::{ConsoleMailer, Email, MailError, Mailer, ResendConfig, ResendMailer};
pub use payments::{
    CheckoutRequest, CheckoutSession, CheckoutStatus, PaymentError, PaymentGateway, StripeConfig,
    StripeGateway,
};
pub use storage::{AvatarStorage, AvatarUpload, HostedStorage, StorageConfig, StorageError};
