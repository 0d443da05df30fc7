//! Marketplace account and license client
//!
//! Orchestrates the four privileged marketplace operations: creating an
//! account, saving a license key, deleting it, and starting a plugin free
//! trial. Every operation follows the same pipeline:
//!
//! 1. `AccessGuard::require_elevated_privilege()` rejects unprivileged callers
//! 2. `validate` checks caller input (email, plugin name, license key)
//! 3. Local preconditions are checked against the `LicenseKeyStore`
//! 4. At most one `Transport::download()` call reaches the marketplace
//! 5. `classify` maps the raw status + payload onto a closed outcome set
//! 6. The license key slot is written or deleted only on a success outcome
//!
//! The transport, key store, access guard and domain policy are injected at
//! construction so hosts (and tests) can supply their own implementations.

pub mod access;
pub mod api;
pub mod classify;
pub mod constants;
pub mod error;
pub mod store;
pub mod transport;
pub mod validate;

pub use access::{AccessGuard, AllowedDomains, DomainPolicy, StaticAccess};
pub use api::MarketplaceApi;
pub use classify::{CreateAccountOutcome, FreeTrialOutcome, Payload, ValidateTokenOutcome};
pub use error::{Error, ErrorKind, Operation, Rejection, Result, ValidationError};
pub use store::{FileLicenseKeyStore, LicenseKeyStore, MemoryLicenseKeyStore};
pub use transport::{
    HttpTransport, RawResponse, Transport, TransportError, TransportErrorKind, TransportRequest,
};

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by the dyn-compatible collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
