//! Caller privilege and email domain policy
//!
//! Both are answered by the host. `StaticAccess` fits hosts that resolve
//! the caller's privilege before building a `MarketplaceApi` for the call.

use std::collections::HashSet;

use crate::error::{Error, Result};

/// Answers whether the current caller holds elevated (superuser) privilege.
pub trait AccessGuard: Send + Sync {
    /// Fails with `Error::AccessDenied` for unprivileged callers.
    fn require_elevated_privilege(&self) -> Result<()>;
}

/// Fixed privilege answer for a single caller.
#[derive(Debug, Clone, Copy)]
pub struct StaticAccess {
    elevated: bool,
}

impl StaticAccess {
    pub fn superuser() -> Self {
        Self { elevated: true }
    }

    pub fn denied() -> Self {
        Self { elevated: false }
    }

    pub fn from_elevated(elevated: bool) -> Self {
        Self { elevated }
    }
}

impl AccessGuard for StaticAccess {
    fn require_elevated_privilege(&self) -> Result<()> {
        if self.elevated {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }
}

/// Optional allow-list of email domains for new accounts.
pub trait DomainPolicy: Send + Sync {
    /// `None` means every domain is allowed. Entries are lowercase.
    fn allowed_domains(&self) -> Option<&HashSet<String>>;
}

/// Allow-list configured by the host.
#[derive(Debug, Clone, Default)]
pub struct AllowedDomains {
    domains: Option<HashSet<String>>,
}

impl AllowedDomains {
    pub fn any() -> Self {
        Self { domains: None }
    }

    /// Blank entries are dropped; a list with nothing left is unrestricted.
    pub fn only<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains: HashSet<String> = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if domains.is_empty() {
            return Self::any();
        }
        Self {
            domains: Some(domains),
        }
    }

    /// An empty or missing list from configuration means no restriction.
    pub fn from_config(domains: Option<&[String]>) -> Self {
        match domains {
            Some(list) => Self::only(list),
            None => Self::any(),
        }
    }
}

impl DomainPolicy for AllowedDomains {
    fn allowed_domains(&self) -> Option<&HashSet<String>> {
        self.domains.as_ref()
    }
}
