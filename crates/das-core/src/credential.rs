//! Access-credential refresh around external calls.
//!
//! The credential is owned outside the scheduler. Contract: call
//! `ensure_valid()` before each call; if the call is rejected as
//! unauthorized, `refresh()` once and retry the same call exactly once;
//! any other failure is surfaced unchanged.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::generator::{Generator, GeneratorError, NodeInput};
use crate::judge::{Judge, JudgeError, JudgeRequest};

/// Credential failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CredentialError {
    #[error("no credential configured")]
    Missing,

    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),
}

impl CredentialError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Missing => "credential_missing",
            Self::RefreshFailed(_) => "credential_refresh_failed",
        }
    }
}

/// Externally-owned credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Make sure a usable credential is present (may refresh if expired).
    async fn ensure_valid(&self) -> Result<(), CredentialError>;

    /// Force a refresh after the remote side rejected the credential.
    async fn refresh(&self) -> Result<(), CredentialError>;
}

/// Errors that can signal a rejected credential.
pub trait AuthFailure: Sized {
    fn is_unauthorized(&self) -> bool;
    fn from_credential(err: CredentialError) -> Self;
}

/// Run `call` under the refresh-once contract.
pub async fn call_with_refresh<T, E, F, Fut>(
    credentials: &dyn CredentialProvider,
    mut call: F,
) -> Result<T, E>
where
    E: AuthFailure,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    credentials.ensure_valid().await.map_err(E::from_credential)?;
    match call().await {
        Err(err) if err.is_unauthorized() => {
            info!("credential rejected, refreshing once");
            if let Err(refresh_err) = credentials.refresh().await {
                warn!(error = %refresh_err, "credential refresh failed");
                return Err(E::from_credential(refresh_err));
            }
            call().await
        }
        other => other,
    }
}

/// A [`Judge`] that applies the refresh-once contract.
pub struct AuthenticatedJudge<J> {
    inner: J,
    credentials: Arc<dyn CredentialProvider>,
}

impl<J: Judge> AuthenticatedJudge<J> {
    pub fn new(inner: J, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { inner, credentials }
    }
}

#[async_trait]
impl<J: Judge> Judge for AuthenticatedJudge<J> {
    async fn judge(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
        call_with_refresh(self.credentials.as_ref(), || self.inner.judge(request)).await
    }
}

/// A [`Generator`] that applies the refresh-once contract.
pub struct AuthenticatedGenerator<G> {
    inner: G,
    credentials: Arc<dyn CredentialProvider>,
}

impl<G: Generator> AuthenticatedGenerator<G> {
    pub fn new(inner: G, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { inner, credentials }
    }
}

#[async_trait]
impl<G: Generator> Generator for AuthenticatedGenerator<G> {
    async fn generate(
        &self,
        input: &NodeInput,
        template_offset: u32,
    ) -> Result<Value, GeneratorError> {
        call_with_refresh(self.credentials.as_ref(), || {
            self.inner.generate(input, template_offset)
        })
        .await
    }
}
