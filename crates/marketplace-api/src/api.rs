//! Account and license orchestration
//!
//! `MarketplaceApi` holds no state of its own between calls. Every public
//! operation runs guard → validate → local precondition → at most one
//! transport call → classify → store write XOR typed error. The license key
//! slot is never written before classification has produced a success.

use std::sync::Arc;

use common::Secret;
use tracing::{debug, info, warn};

use crate::access::{AccessGuard, DomainPolicy};
use crate::classify::{self, CreateAccountOutcome, FreeTrialOutcome, ValidateTokenOutcome};
use crate::constants::{
    CREATE_ACCOUNT_ACTION, EMAIL_PARAM, VALIDATE_CONSUMER_ACTION, free_trial_action,
};
use crate::error::{Error, Operation, Rejection, Result};
use crate::store::LicenseKeyStore;
use crate::transport::{RawResponse, Transport, TransportRequest};
use crate::validate;

/// Longest payload excerpt written to logs for unexpected responses.
const LOG_PAYLOAD_LIMIT: usize = 256;

/// Orchestrator for the privileged marketplace operations.
///
/// Cheap to clone; hosts that resolve caller privilege per request build one
/// per request with that caller's `AccessGuard`.
#[derive(Clone)]
pub struct MarketplaceApi {
    transport: Arc<dyn Transport>,
    store: Arc<dyn LicenseKeyStore>,
    access: Arc<dyn AccessGuard>,
    domains: Arc<dyn DomainPolicy>,
}

impl MarketplaceApi {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn LicenseKeyStore>,
        access: Arc<dyn AccessGuard>,
        domains: Arc<dyn DomainPolicy>,
    ) -> Self {
        Self {
            transport,
            store,
            access,
            domains,
        }
    }

    /// Same collaborators, different caller.
    pub fn with_access(&self, access: Arc<dyn AccessGuard>) -> Self {
        Self {
            access,
            ..self.clone()
        }
    }

    /// Create a marketplace account for `email` and store the license key
    /// the marketplace issues for it.
    ///
    /// Fails with `LicenseAlreadyExists` before any network call when a key
    /// is already stored. The slot is checked again right before the write;
    /// a key stored concurrently during the call is kept and the operation
    /// fails with the same error.
    pub async fn create_account(&self, email: &str) -> Result<()> {
        let operation = Operation::CreateAccount;
        self.access.require_elevated_privilege()?;

        let email = validate::normalize_email(email);
        validate::email(&email, self.domains.as_ref())?;

        if self.store.has().await? {
            return Err(Error::LicenseAlreadyExists);
        }

        let request = TransportRequest::new(CREATE_ACCOUNT_ACTION).param(EMAIL_PARAM, &email);
        let response = self.download(operation, &request).await?;

        match classify::create_account(&response) {
            CreateAccountOutcome::Created(key) => {
                if self.store.has().await? {
                    warn!("license key was stored while the account was being created, keeping it");
                    return Err(Error::LicenseAlreadyExists);
                }
                self.store.set(key).await?;
                info!("marketplace account created, license key stored");
                Ok(())
            }
            CreateAccountOutcome::EmailRejectedInvalid => Err(Rejection::EmailInvalid.into()),
            CreateAccountOutcome::EmailRejectedDuplicate => Err(Rejection::EmailDuplicate.into()),
            CreateAccountOutcome::UnexpectedResponse => Err(unexpected(operation, &response)),
        }
    }

    /// Validate `license_key` with the marketplace and store it if valid.
    ///
    /// The key is sent only as the access token; the request carries no
    /// parameters. Transport failures are returned unchanged.
    pub async fn save_license_key(&self, license_key: &str) -> Result<()> {
        let operation = Operation::SaveLicenseKey;
        self.access.require_elevated_privilege()?;
        validate::license_key(license_key)?;

        let key = Secret::new(license_key.to_string());
        let request = TransportRequest::new(VALIDATE_CONSUMER_ACTION).access_token(key.clone());
        let response = self.download(operation, &request).await?;

        match classify::validate_token(&response) {
            ValidateTokenOutcome::Valid => {
                self.store.set(key).await?;
                info!("license key validated and stored");
                Ok(())
            }
            ValidateTokenOutcome::TokenInvalid => {
                info!(status = response.status, "marketplace reported license key as not valid");
                Err(Rejection::TokenInvalid.into())
            }
            ValidateTokenOutcome::UnexpectedResponse => Err(unexpected(operation, &response)),
        }
    }

    /// Remove the stored license key. Succeeds when none is stored.
    pub async fn delete_license_key(&self) -> Result<()> {
        self.access.require_elevated_privilege()?;
        self.store.delete().await?;
        info!("license key removed");
        Ok(())
    }

    /// Whether a license key is stored. The key itself is never returned.
    pub async fn license_key_configured(&self) -> Result<bool> {
        self.access.require_elevated_privilege()?;
        self.store.has().await
    }

    /// Start the free trial of `plugin_name`.
    pub async fn start_free_trial(&self, plugin_name: &str) -> Result<()> {
        let operation = Operation::StartFreeTrial;
        self.access.require_elevated_privilege()?;
        validate::plugin_name(plugin_name)?;

        let request = TransportRequest::new(free_trial_action(plugin_name));
        let response = self.download(operation, &request).await?;

        match classify::free_trial(&response) {
            FreeTrialOutcome::TrialStarted => {
                info!(plugin = plugin_name, "free trial started");
                Ok(())
            }
            FreeTrialOutcome::TrialRejected(message) => {
                info!(plugin = plugin_name, reason = ?message, "marketplace refused free trial");
                Err(Rejection::TrialRejected(message).into())
            }
            FreeTrialOutcome::UnexpectedResponse => Err(unexpected(operation, &response)),
        }
    }

    async fn download(
        &self,
        operation: Operation,
        request: &TransportRequest,
    ) -> Result<RawResponse> {
        debug!(%operation, action = %request.action, "calling marketplace");
        self.transport.download(request).await.map_err(|e| {
            warn!(%operation, kind = e.kind.code(), error = %e, "marketplace request failed");
            Error::Connectivity(e)
        })
    }
}

fn unexpected(operation: Operation, response: &RawResponse) -> Error {
    warn!(
        %operation,
        status = response.status,
        payload = excerpt(&response.data),
        "unexpected marketplace response"
    );
    Error::UnexpectedResponse {
        operation,
        status: response.status,
    }
}

fn excerpt(data: &str) -> &str {
    if data.len() <= LOG_PAYLOAD_LIMIT {
        return data;
    }
    let mut end = LOG_PAYLOAD_LIMIT;
    while !data.is_char_boundary(end) {
        end -= 1;
    }
    &data[..end]
}
