//! Reducers for the two mutable aggregates: booking requests and DJ
//! profiles.
//!
//! Handlers load the row under the caller's identity, build a per-request
//! [`Store`] around it and wait for the terminal action with [`execute`].

pub mod booking;
pub mod profile;

use gigbook_core::reducer::Reducer;
use gigbook_runtime::{Store, StoreError};
use std::time::Duration;

/// How long a handler waits for a command to finish.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(20);

/// Actions that end a command.
pub trait Outcome {
    /// `true` for the action a handler waits for.
    fn is_terminal(&self) -> bool;
}

/// Run `command` against `state` in a fresh store and return the action
/// that ends it.
///
/// # Errors
///
/// Returns [`StoreError::Timeout`] if no terminal action arrives within
/// [`COMMAND_TIMEOUT`].
pub async fn execute<R, S, A, E>(reducer: R, state: S, env: E, command: A) -> Result<A, StoreError>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: Outcome + Send + Clone + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let store = Store::new(state, reducer, env);
    store
        .send_and_wait_for(command, |action: &A| action.is_terminal(), COMMAND_TIMEOUT)
        .await
}
