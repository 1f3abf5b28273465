//! Process-wide credential set used to authenticate against wrapped APIs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Username/password plus optional API-key header and explicit login URL.
///
/// There is at most one active credential set per process. It is always replaced as a whole,
/// never partially updated.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSet {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub api_key_name: Option<String>,
    #[serde(default)]
    pub api_key_value: Option<String>,
    #[serde(default)]
    pub login_url: Option<String>,
}

impl CredentialSet {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            api_key_name: None,
            api_key_value: None,
            login_url: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.api_key_name = Some(name.into());
        self.api_key_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    /// The API-key header as `(name, value)`, when both halves are configured and non-empty.
    #[must_use]
    pub fn api_key(&self) -> Option<(&str, &str)> {
        match (self.api_key_name.as_deref(), self.api_key_value.as_deref()) {
            (Some(name), Some(value)) if !name.is_empty() && !value.is_empty() => {
                Some((name, value))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_key_name", &self.api_key_name)
            .field("api_key_value", &self.api_key_value.as_ref().map(|_| "<redacted>"))
            .field("login_url", &self.login_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::CredentialSet;

    #[test]
    fn api_key_requires_both_halves() {
        let creds = CredentialSet::new("alice", "secret");
        assert!(creds.api_key().is_none());

        let mut half = creds.clone();
        half.api_key_name = Some("X-API-Key".to_string());
        assert!(half.api_key().is_none());

        let full = creds.with_api_key("X-API-Key", "k-1");
        assert_eq!(full.api_key(), Some(("X-API-Key", "k-1")));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = CredentialSet::new("alice", "hunter2").with_api_key("X-API-Key", "k-1");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("k-1"));
    }

    #[test]
    fn deserializes_camel_case() {
        let creds: CredentialSet = serde_json::from_value(serde_json::json!({
            "username": "u",
            "password": "p",
            "loginUrl": "http://127.0.0.1:1/login"
        }))
        .expect("valid credentials");
        assert_eq!(creds.login_url.as_deref(), Some("http://127.0.0.1:1/login"));
        assert!(creds.api_key_name.is_none());
    }
}
