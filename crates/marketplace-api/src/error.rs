//! Error taxonomy for marketplace operations
//!
//! Every failure carries a kind (`ErrorKind`) and a stable machine code
//! (`Error::code()`). Human-facing wording is left to the presentation
//! layer, which should switch on these rather than on `Display` text.

use std::fmt;

use crate::transport::TransportError;

/// The public operations, used for logging and for naming unexpected responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAccount,
    SaveLicenseKey,
    DeleteLicenseKey,
    LicenseStatus,
    StartFreeTrial,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::CreateAccount => "create_account",
            Operation::SaveLicenseKey => "save_license_key",
            Operation::DeleteLicenseKey => "delete_license_key",
            Operation::LicenseStatus => "license_status",
            Operation::StartFreeTrial => "start_free_trial",
        }
    }

    /// Code reported when the marketplace answers this operation with a
    /// response that matches none of its known shapes.
    pub fn unexpected_response_code(self) -> &'static str {
        match self {
            Operation::CreateAccount => "CreateAccountErrorAPI",
            Operation::SaveLicenseKey => "SaveLicenseKeyErrorAPI",
            Operation::StartFreeTrial => "TrialStartErrorAPI",
            // No network call is made for these two.
            Operation::DeleteLicenseKey | Operation::LicenseStatus => "MarketplaceErrorAPI",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local input validation failures. No network call has been attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyInput { field: &'static str },

    #[error("{field} has an invalid format")]
    InvalidFormat { field: &'static str },

    #[error("email domain {domain} is not allowed")]
    DomainNotAllowed { domain: String },
}

/// The marketplace explicitly rejected the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("marketplace rejected the email address as invalid")]
    EmailInvalid,

    #[error("marketplace already has an account for this email address")]
    EmailDuplicate,

    #[error("license key is not valid")]
    TokenInvalid,

    #[error("marketplace refused to start the free trial{}", remote_reason(.0))]
    TrialRejected(Option<String>),
}

fn remote_reason(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

/// Coarse error category, for callers that map failures onto transports
/// such as HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AccessDenied,
    Validation,
    PreconditionFailed,
    RemoteRejected,
    UnexpectedResponse,
    Connectivity,
    Storage,
}

/// Errors from marketplace operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("superuser access required (checkUserHasSuperUserAccess)")]
    AccessDenied,

    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("a license key is already configured")]
    LicenseAlreadyExists,

    #[error("{0}")]
    Rejected(#[from] Rejection),

    #[error("unexpected marketplace response to {operation} (status {status})")]
    UnexpectedResponse { operation: Operation, status: u16 },

    /// Transport failure, passed through with its original kind and message.
    #[error(transparent)]
    Connectivity(#[from] TransportError),

    #[error("no license key configured")]
    LicenseKeyMissing,

    #[error("license key storage failed: {0}")]
    Storage(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AccessDenied => ErrorKind::AccessDenied,
            Error::Validation(_) => ErrorKind::Validation,
            Error::LicenseAlreadyExists => ErrorKind::PreconditionFailed,
            Error::Rejected(_) => ErrorKind::RemoteRejected,
            Error::UnexpectedResponse { .. } => ErrorKind::UnexpectedResponse,
            Error::Connectivity(_) => ErrorKind::Connectivity,
            Error::LicenseKeyMissing | Error::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Stable machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            Error::AccessDenied => "checkUserHasSuperUserAccess",
            Error::Validation(ValidationError::EmptyInput { .. }) => "ValidatorErrorEmptyValue",
            Error::Validation(ValidationError::InvalidFormat { field }) => match *field {
                "email" => "CreateAccountErrorEmailInvalid",
                "plugin_name" => "InvalidPluginName",
                _ => "ValidatorErrorInvalidFormat",
            },
            Error::Validation(ValidationError::DomainNotAllowed { .. }) => {
                "ErrorEmailDomainNotAllowed"
            }
            Error::LicenseAlreadyExists => "CreateAccountErrorLicenseExists",
            Error::Rejected(Rejection::EmailInvalid) => "CreateAccountErrorAPIEmailInvalid",
            Error::Rejected(Rejection::EmailDuplicate) => "CreateAccountErrorAPIEmailExists",
            Error::Rejected(Rejection::TokenInvalid) => "LicenseKeyIsNotValid",
            Error::Rejected(Rejection::TrialRejected(_)) => "TrialStartRejected",
            Error::UnexpectedResponse { operation, .. } => operation.unexpected_response_code(),
            Error::Connectivity(e) => e.kind.code(),
            Error::LicenseKeyMissing => "LicenseKeyMissing",
            Error::Storage(_) => "LicenseKeyStorageError",
        }
    }

    /// Message supplied by the marketplace itself, if any.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Error::Rejected(Rejection::TrialRejected(message)) => message.as_deref(),
            _ => None,
        }
    }
}

/// Result alias for marketplace operations.
pub type Result<T> = std::result::Result<T, Error>;
