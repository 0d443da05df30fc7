//! Marketplace endpoint constants
//!
//! Action identifiers are appended to the configured API base URL by the
//! transport. They are part of the marketplace's public API, not secrets.

/// Default marketplace API base URL
pub const DEFAULT_API_URL: &str = "https://plugins.matomo.org/api/2.0";

/// Creates a marketplace account and returns its license key
pub const CREATE_ACCOUNT_ACTION: &str = "createAccount";

/// Validates the license key sent as the access token
pub const VALIDATE_CONSUMER_ACTION: &str = "consumer/validate";

/// Request parameter carrying the account email
pub const EMAIL_PARAM: &str = "email";

/// Field of the createAccount response carrying the new license key
pub const LICENSE_KEY_FIELD: &str = "license_key";

/// Free trial action for a single plugin.
///
/// The plugin name must already have passed `validate::plugin_name`, which
/// guarantees it cannot add path segments.
pub fn free_trial_action(plugin_name: &str) -> String {
    format!("plugins/{plugin_name}/freeTrial")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_trial_action_embeds_plugin_name() {
        assert_eq!(free_trial_action("testPlugin"), "plugins/testPlugin/freeTrial");
    }

    #[test]
    fn default_api_url_has_no_trailing_slash() {
        assert!(!DEFAULT_API_URL.ends_with('/'));
        assert!(DEFAULT_API_URL.starts_with("https://"));
    }
}
