//! Input validators
//!
//! Checks run in a fixed order (emptiness, then format, then policy) so an
//! empty value is never reported as badly formatted.

use std::sync::LazyLock;

use regex::Regex;

use crate::access::DomainPolicy;
use crate::error::ValidationError;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$",
    )
    .expect("email pattern is valid")
});

static PLUGIN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("plugin name pattern is valid"));

/// Trim and lowercase an email address before validation.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate an (already normalized) email address against the address
/// grammar and the domain policy.
pub fn email(email: &str, policy: &dyn DomainPolicy) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::EmptyInput { field: "email" });
    }
    if !EMAIL.is_match(email) {
        return Err(ValidationError::InvalidFormat { field: "email" });
    }
    if let Some(allowed) = policy.allowed_domains() {
        // The grammar guarantees exactly one '@'.
        let domain = email
            .rsplit_once('@')
            .map(|(_, d)| d.to_lowercase())
            .unwrap_or_default();
        if !allowed.contains(&domain) {
            return Err(ValidationError::DomainNotAllowed { domain });
        }
    }
    Ok(())
}

/// Plugin names are interpolated into the request path, so only ASCII
/// letters and digits are accepted.
pub fn plugin_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyInput {
            field: "plugin_name",
        });
    }
    if !PLUGIN_NAME.is_match(name) {
        return Err(ValidationError::InvalidFormat {
            field: "plugin_name",
        });
    }
    Ok(())
}

pub fn license_key(key: &str) -> Result<(), ValidationError> {
    if key.trim().is_empty() {
        return Err(ValidationError::EmptyInput {
            field: "license_key",
        });
    }
    Ok(())
}
