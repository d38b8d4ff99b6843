//! HTTP client for the hosted auth REST API (`/auth/v1`).

use super::{AuthProvider, AuthSession, AuthUser, OtpType, SignUpOutcome};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Hosted auth client.
///
/// # Example
///
/// ```no_run
/// use gigbook_auth::{AuthConfig, HostedAuthClient};
///
/// let client = HostedAuthClient::new(AuthConfig::new(
///     "https://abc.supabase.co",
///     "public-anon-key",
///     "https://gigbook.example",
/// ))?;
/// # Ok::<(), gigbook_auth::AuthError>(())
/// ```
#[derive(Clone, Debug)]
pub struct HostedAuthClient {
    config: AuthConfig,
    http_client: Client,
}

/// Error body. Newer deployments send `error_code`/`msg`, older ones
/// `error`/`error_description`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> &str {
        self.error_code
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or_default()
    }

    fn message(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .unwrap_or_default()
    }
}

/// Which call failed; the same error code means different things per call.
#[derive(Debug, Clone, Copy)]
enum Call {
    Password,
    SignUp,
    Otp,
    Verify,
    User,
    Refresh,
    Logout,
}

impl HostedAuthClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InternalError`] if the HTTP client cannot be built.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::InternalError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http_client
            .post(self.config.endpoint(path))
            .header("apikey", &self.config.anon_key)
    }

    async fn send(&self, call: Call, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        Err(map_error(call, status, &body))
    }

    async fn session(&self, call: Call, request: RequestBuilder) -> Result<AuthSession> {
        self.send(call, request)
            .await?
            .json()
            .await
            .map_err(|e| AuthError::InternalError(format!("Invalid session response: {e}")))
    }
}

fn map_error(call: Call, status: StatusCode, body: &ErrorBody) -> AuthError {
    let code = body.code();
    let message = body.message();

    if status == StatusCode::TOO_MANY_REQUESTS || code.starts_with("over_") {
        return AuthError::RateLimited;
    }

    let mapped = match (call, code) {
        (_, "email_not_confirmed") => Some(AuthError::EmailNotConfirmed),
        (_, "user_already_exists" | "email_exists") => Some(AuthError::UserAlreadyExists),
        (_, "weak_password") => Some(AuthError::WeakPassword(message.clone())),
        (Call::Password, "invalid_credentials" | "invalid_grant") => {
            Some(AuthError::InvalidCredentials)
        },
        (Call::Verify, "otp_expired" | "otp_disabled" | "invalid_grant" | "flow_state_expired") => {
            Some(AuthError::LinkExpired)
        },
        (Call::Refresh, _) if status.is_client_error() => Some(AuthError::InvalidRefreshToken),
        (Call::User | Call::Logout, _)
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
                || code == "bad_jwt"
                || code == "session_not_found" =>
        {
            Some(AuthError::SessionExpired)
        },
        (Call::Verify, _) if status.is_client_error() => Some(AuthError::LinkExpired),
        (Call::Password, _) if status == StatusCode::BAD_REQUEST => {
            Some(AuthError::InvalidCredentials)
        },
        _ => None,
    };

    mapped.unwrap_or_else(|| {
        tracing::error!(?call, status = status.as_u16(), code, %message, "Auth service error");
        AuthError::Provider {
            status: status.as_u16(),
            message,
        }
    })
}

#[async_trait]
impl AuthProvider for HostedAuthClient {
    #[tracing::instrument(skip(self, password), name = "auth_sign_in")]
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        let request = self
            .post("token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        self.session(Call::Password, request).await
    }

    #[tracing::instrument(skip(self, password), name = "auth_sign_up")]
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
    ) -> Result<SignUpOutcome> {
        let request = self
            .post("signup")
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email, "password": password }));
        let body: serde_json::Value = self
            .send(Call::SignUp, request)
            .await?
            .json()
            .await
            .map_err(|e| AuthError::InternalError(format!("Invalid sign-up response: {e}")))?;

        // With confirmations on the response is the bare user, otherwise a session.
        if body.get("access_token").is_some() {
            let session: AuthSession = serde_json::from_value(body)
                .map_err(|e| AuthError::InternalError(format!("Invalid session: {e}")))?;
            Ok(SignUpOutcome::SignedIn(session))
        } else {
            Ok(SignUpOutcome::ConfirmationSent)
        }
    }

    #[tracing::instrument(skip(self), name = "auth_magic_link")]
    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<()> {
        let request = self
            .post("otp")
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email, "create_user": true }));
        self.send(Call::Otp, request).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, token_hash), name = "auth_verify")]
    async fn verify_otp(&self, token_hash: &str, otp_type: OtpType) -> Result<AuthSession> {
        let request = self
            .post("verify")
            .json(&json!({ "type": otp_type.as_str(), "token_hash": token_hash }));
        self.session(Call::Verify, request).await
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let request = self
            .http_client
            .get(self.config.endpoint("user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token);
        self.send(Call::User, request)
            .await?
            .json()
            .await
            .map_err(|e| AuthError::InternalError(format!("Invalid user response: {e}")))
    }

    #[tracing::instrument(skip_all, name = "auth_refresh")]
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        let request = self
            .post("token")
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));
        self.session(Call::Refresh, request).await
    }

    #[tracing::instrument(skip_all, name = "auth_sign_out")]
    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let request = self.post("logout").bearer_auth(access_token);
        match self.send(Call::Logout, request).await {
            // Already gone is as good as signed out.
            Ok(_) | Err(AuthError::SessionExpired) => Ok(()),
            Err(other) => Err(other),
        }
    }
}
