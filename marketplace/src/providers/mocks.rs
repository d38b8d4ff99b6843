//! In-memory providers for tests.

use super::mailer::{Email, MailError, Mailer};
use super::payments::{CheckoutRequest, CheckoutSession, CheckoutStatus, PaymentError, PaymentGateway};
use super::storage::{AvatarStorage, StorageError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct PaymentsInner {
    sessions: HashMap<String, CheckoutSession>,
    by_key: HashMap<String, String>,
    requests: Vec<CheckoutRequest>,
    unavailable: bool,
}

/// Mock checkout API.
///
/// Like the real processor, a repeated idempotency key returns the session
/// created for it the first time.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<PaymentsInner>>,
}

impl MockPaymentGateway {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.inner).unavailable = unavailable;
    }

    /// Every create request received, including idempotent repeats.
    #[must_use]
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        lock(&self.inner).requests.clone()
    }

    /// Number of distinct sessions created.
    #[must_use]
    pub fn session_count(&self) -> usize {
        lock(&self.inner).sessions.len()
    }

    /// Move a session to another state.
    pub fn set_status(&self, session_id: &str, status: CheckoutStatus) {
        if let Some(session) = lock(&self.inner).sessions.get_mut(session_id) {
            session.status = status;
            if status != CheckoutStatus::Open {
                session.url = None;
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut inner = lock(&self.inner);
        if inner.unavailable {
            return Err(PaymentError::Network("mock processor unavailable".into()));
        }
        inner.requests.push(request.clone());

        if let Some(existing) = inner
            .by_key
            .get(&request.idempotency_key)
            .and_then(|id| inner.sessions.get(id))
        {
            return Ok(existing.clone());
        }

        let id = format!("cs_test_{}", inner.sessions.len() + 1);
        let session = CheckoutSession {
            url: Some(format!("https://checkout.test/pay/{id}")),
            id: id.clone(),
            status: CheckoutStatus::Open,
            payment_status: Some("unpaid".into()),
            payment_intent: None,
        };
        inner.by_key.insert(request.idempotency_key.clone(), id.clone());
        inner.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, PaymentError> {
        let inner = lock(&self.inner);
        if inner.unavailable {
            return Err(PaymentError::Network("mock processor unavailable".into()));
        }
        inner.sessions.get(id).cloned().ok_or_else(|| PaymentError::Api {
            status: 404,
            message: format!("No such checkout.session: {id}"),
        })
    }
}

/// Mailer that records messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<Email>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingMailer {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail.
    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// Messages delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        lock(&self.sent).clone()
    }

    /// Messages delivered to `to`.
    #[must_use]
    pub fn sent_to(&self, to: &str) -> Vec<Email> {
        self.sent().into_iter().filter(|email| email.to == to).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if *lock(&self.failing) {
            return Err(MailError::Network("mock mailer failing".into()));
        }
        lock(&self.sent).push(email.clone());
        Ok(())
    }
}

/// Storage that keeps uploads in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type and bytes stored at `path`.
    #[must_use]
    pub fn object(&self, path: &str) -> Option<(String, Vec<u8>)> {
        lock(&self.objects).get(path).cloned()
    }

    /// Stored paths.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }
}

#[async_trait]
impl AvatarStorage for MemoryStorage {
    async fn upload(&self, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        lock(&self.objects).insert(path.to_string(), (content_type.to_string(), bytes));
        Ok(format!("https://storage.test/avatars/{path}"))
    }
}
