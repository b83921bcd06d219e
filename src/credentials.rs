// 🔑 Credential Boundary - API key for the assistant integration
//
// Stored in the settings table under a fixed key. Nothing in this crate
// transmits it; callers read it back when they need it.

use crate::db::{Event, Store};
use crate::error::CredentialError;
use std::sync::Arc;
use tracing::info;

/// Settings key the API key lives under
pub const API_KEY_SETTING: &str = "gemini_api_key";

pub struct CredentialStore {
    store: Arc<Store>,
}

impl CredentialStore {
    pub fn new(store: Arc<Store>) -> Self {
        CredentialStore { store }
    }

    /// Store any non-empty key as given, replacing the previous one
    pub fn set_api_key(&self, key: &str) -> Result<(), CredentialError> {
        if key.is_empty() {
            return Err(CredentialError::EmptyKey);
        }

        self.store.set_setting(API_KEY_SETTING, key)?;
        // Never log or audit the key itself
        self.store.record_event(&Event::new(
            "api_key_set",
            "setting",
            API_KEY_SETTING,
            serde_json::json!({ "length": key.len() }),
            "user",
        ))?;
        info!("api key updated");
        Ok(())
    }

    pub fn api_key(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.store.setting(API_KEY_SETTING)?)
    }

    pub fn has_api_key(&self) -> Result<bool, CredentialError> {
        Ok(self.api_key()?.is_some())
    }
}

/// "sk-abcdef123" -> "sk-a•••••123"
pub fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "•".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}{}{}", head, "•".repeat(chars.len() - 7), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_credentials() -> CredentialStore {
        CredentialStore::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn test_set_and_read_key() {
        let creds = create_test_credentials();
        assert_eq!(creds.api_key().unwrap(), None);

        creds.set_api_key("AIza-first").unwrap();
        creds.set_api_key("AIza-second").unwrap();
        assert_eq!(creds.api_key().unwrap().as_deref(), Some("AIza-second"));
        assert!(creds.has_api_key().unwrap());
    }

    #[test]
    fn test_empty_key_rejected() {
        let creds = create_test_credentials();
        creds.set_api_key("kept").unwrap();

        assert!(matches!(creds.set_api_key(""), Err(CredentialError::EmptyKey)));
        assert_eq!(creds.api_key().unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn test_key_stored_as_given() {
        let creds = create_test_credentials();

        creds.set_api_key("   ").unwrap();
        assert_eq!(creds.api_key().unwrap().as_deref(), Some("   "));

        creds.set_api_key(" AIza-padded ").unwrap();
        assert_eq!(creds.api_key().unwrap().as_deref(), Some(" AIza-padded "));
    }

    #[test]
    fn test_key_not_in_audit_payload() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let creds = CredentialStore::new(Arc::clone(&store));
        creds.set_api_key("super-secret-value").unwrap();

        let events = store.events_for("setting", API_KEY_SETTING).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].data.to_string().contains("super-secret-value"));
        assert_eq!(events[0].data["length"], 18);
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("sk-abcdef123"), "sk-a•••••123");
        assert_eq!(mask("short"), "•••••");
    }
}
