//! Plugin settings: OIDC client registration and account-linking policy.
//!
//! Settings are stored by the host under the `oidc` namespace using the
//! field names `discoverUrl`, `clientId`, `clientSecret` and
//! `matchUserByEmail`. They are loaded when the login strategy is set up
//! and handed to the resolver as an explicit [`ResolverConfig`].

use crate::error::ConfigError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use rootcause::Report;
use rootcause::prelude::ResultExt;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Namespace the plugin settings are stored under.
pub const SETTINGS_NAMESPACE: &str = "oidc";

/// Settings as stored, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    /// Provider discovery URL (issuer URL or its well-known document).
    #[serde(default)]
    pub discover_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Link unknown identities to existing accounts with the same email.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub match_user_by_email: bool,
}

impl PluginSettings {
    /// Decodes settings from a host settings object.
    ///
    /// Host settings stores keep every value as a string, so the flag
    /// accepts `"true"`, `"on"` and `"1"` as well as booleans.
    pub fn from_fields(fields: HashMap<String, String>) -> Result<Self, Report<ConfigError>> {
        let object = fields
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect::<serde_json::Map<_, _>>();
        let settings = serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
            ConfigError::Unreadable {
                reason: e.to_string(),
            }
        })?;
        Ok(settings)
    }

    /// Checks that the client registration is complete.
    ///
    /// # Errors
    ///
    /// `ConfigError::Missing` naming every blank or absent field.
    pub fn validate(&self) -> Result<OidcSettings, Report<ConfigError>> {
        let mut missing = Vec::new();
        let discover_url = present(&self.discover_url, "discoverUrl", &mut missing);
        let client_id = present(&self.client_id, "clientId", &mut missing);
        let client_secret = present(&self.client_secret, "clientSecret", &mut missing);

        match (discover_url, client_id, client_secret) {
            (Some(discover_url), Some(client_id), Some(client_secret)) => Ok(OidcSettings {
                discover_url,
                client_id,
                client_secret,
                match_user_by_email: self.match_user_by_email,
            }),
            _ => Err(ConfigError::Missing { fields: missing }.into()),
        }
    }
}

fn present(
    value: &Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            missing.push(name);
            None
        }
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "on" | "1"),
    })
}

/// A complete client registration.
#[derive(Clone, PartialEq, Eq)]
pub struct OidcSettings {
    discover_url: String,
    client_id: String,
    client_secret: String,
    match_user_by_email: bool,
}

impl OidcSettings {
    #[must_use]
    pub fn discover_url(&self) -> &str {
        &self.discover_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn match_user_by_email(&self) -> bool {
        self.match_user_by_email
    }

    /// Policy handed to the resolver on each login.
    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            match_user_by_email: self.match_user_by_email,
        }
    }
}

impl fmt::Debug for OidcSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcSettings")
            .field("discover_url", &self.discover_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("match_user_by_email", &self.match_user_by_email)
            .finish()
    }
}

/// Account-linking policy for [`IdentityResolver::resolve`](crate::IdentityResolver::resolve).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverConfig {
    pub match_user_by_email: bool,
}

impl ResolverConfig {
    #[must_use]
    pub fn new(match_user_by_email: bool) -> Self {
        Self {
            match_user_by_email,
        }
    }
}

/// Host settings store.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Loads a settings namespace. Unset namespaces load as defaults.
    async fn load(&self, namespace: &str) -> Result<PluginSettings, Report<ConfigError>>;
}

/// Settings kept in the `settings:<namespace>` object of a key-value store.
#[derive(Clone)]
pub struct KvSettingsStore {
    kv: Arc<dyn KeyValueStore>,
}

impl KvSettingsStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Object key for a namespace.
    #[must_use]
    pub fn object_key(namespace: &str) -> String {
        format!("settings:{namespace}")
    }
}

#[async_trait]
impl SettingsStore for KvSettingsStore {
    async fn load(&self, namespace: &str) -> Result<PluginSettings, Report<ConfigError>> {
        let key = Self::object_key(namespace);
        let fields = self
            .kv
            .get_object(&key)
            .await
            .context(ConfigError::Unreadable {
                reason: format!("cannot read {key}"),
            })?;
        PluginSettings::from_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryKeyValueStore;

    /// Store whose every call fails.
    struct UnreachableStore;

    #[async_trait]
    impl KeyValueStore for UnreachableStore {
        async fn get_field(&self, _: &str, _: &str) -> Result<Option<String>, Report<StoreError>> {
            Err(unreachable_backend())
        }

        async fn set_field(&self, _: &str, _: &str, _: &str) -> Result<(), Report<StoreError>> {
            Err(unreachable_backend())
        }

        async fn set_field_if_absent(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<Option<String>, Report<StoreError>> {
            Err(unreachable_backend())
        }

        async fn delete_field(&self, _: &str, _: &str) -> Result<(), Report<StoreError>> {
            Err(unreachable_backend())
        }

        async fn get_object(&self, _: &str) -> Result<HashMap<String, String>, Report<StoreError>> {
            Err(unreachable_backend())
        }
    }

    fn unreachable_backend() -> Report<StoreError> {
        StoreError::Backend {
            reason: "connection refused".to_string(),
        }
        .into()
    }

    fn complete() -> PluginSettings {
        PluginSettings {
            discover_url: Some("https://idp.example".to_string()),
            client_id: Some("forum".to_string()),
            client_secret: Some("s3cret".to_string()),
            match_user_by_email: true,
        }
    }

    #[test]
    fn complete_settings_validate() {
        let settings = complete().validate().expect("valid");
        assert_eq!(settings.discover_url(), "https://idp.example");
        assert_eq!(settings.client_id(), "forum");
        assert_eq!(settings.client_secret(), "s3cret");
        assert!(settings.resolver_config().match_user_by_email);
    }

    #[test]
    fn empty_settings_report_every_missing_field() {
        let err = PluginSettings::default().validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("discoverUrl"));
        assert!(message.contains("clientId"));
        assert!(message.contains("clientSecret"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut settings = complete();
        settings.client_secret = Some("   ".to_string());
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("clientSecret"));
        assert!(!err.to_string().contains("clientId"));
    }

    #[test]
    fn debug_redacts_secret() {
        let settings = complete().validate().expect("valid");
        let debug = format!("{settings:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn from_fields_reads_camel_case_strings() {
        let fields: HashMap<String, String> = [
            ("discoverUrl", "https://idp.example"),
            ("clientId", "forum"),
            ("clientSecret", "s3cret"),
            ("matchUserByEmail", "on"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = PluginSettings::from_fields(fields).expect("decode");
        assert_eq!(settings, complete());
    }

    #[test]
    fn flag_string_forms() {
        for (raw, expected) in [
            ("true", true),
            ("1", true),
            ("ON", true),
            ("false", false),
            ("off", false),
            ("", false),
        ] {
            let fields = HashMap::from([("matchUserByEmail".to_string(), raw.to_string())]);
            let settings = PluginSettings::from_fields(fields).expect("decode");
            assert_eq!(settings.match_user_by_email, expected, "raw value {raw:?}");
        }
    }

    #[test]
    fn flag_accepts_json_bool() {
        let settings: PluginSettings =
            serde_json::from_str(r#"{"matchUserByEmail": true}"#).expect("deserialize");
        assert!(settings.match_user_by_email);
        assert!(settings.discover_url.is_none());
    }

    #[tokio::test]
    async fn kv_store_loads_namespace_object() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set_field("settings:oidc", "clientId", "forum").await.unwrap();
        kv.set_field("settings:other", "clientId", "nope").await.unwrap();

        let store = KvSettingsStore::new(kv);
        let settings = store.load(SETTINGS_NAMESPACE).await.expect("load");

        assert_eq!(settings.client_id.as_deref(), Some("forum"));
        assert!(settings.discover_url.is_none());
        assert!(!settings.match_user_by_email);
    }

    #[tokio::test]
    async fn kv_store_unset_namespace_is_default() {
        let store = KvSettingsStore::new(Arc::new(MemoryKeyValueStore::new()));
        let settings = store.load(SETTINGS_NAMESPACE).await.expect("load");
        assert_eq!(settings, PluginSettings::default());
    }

    #[tokio::test]
    async fn kv_store_failure_keeps_the_cause() {
        let store = KvSettingsStore::new(Arc::new(UnreachableStore));
        let err = store.load(SETTINGS_NAMESPACE).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("OIDC settings unreadable: cannot read settings:oidc"));
        assert!(message.contains("connection refused"));
    }
}
