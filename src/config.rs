use std::{env, fmt};

use crate::{model::error::StorageError, util::object::Provider};

pub const ACCESS_KEY_ID_VAR: &str = "OSS_ACCESS_KEY_ID";
pub const ACCESS_KEY_SECRET_VAR: &str = "OSS_ACCESS_KEY_SECRET";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// String whose value never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(***)")
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OssConfig {
    pub provider: Provider,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Secret,
    pub access_key_secret: Secret,
    pub bucket: String,
    pub secure: bool,
    pub timeout_ms: u64,
    pub exclusive_transfers: bool,
}

impl Default for OssConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            region: String::new(),
            endpoint: None,
            access_key_id: Secret::default(),
            access_key_secret: Secret::default(),
            bucket: String::new(),
            secure: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            exclusive_transfers: false,
        }
    }
}

/// Partial configuration; `None` keeps the stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub provider: Option<Provider>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<Secret>,
    pub access_key_secret: Option<Secret>,
    pub bucket: Option<String>,
    pub secure: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub exclusive_transfers: Option<bool>,
}

impl ConfigPatch {
    pub fn credentials(mut self, access_key_id: &str, access_key_secret: &str) -> Self {
        self.access_key_id = Some(Secret::new(access_key_id));
        self.access_key_secret = Some(Secret::new(access_key_secret));
        self
    }

    pub fn target(mut self, region: &str, bucket: &str) -> Self {
        self.region = Some(region.to_string());
        self.bucket = Some(bucket.to_string());
        self
    }
}

impl OssConfig {
    pub fn merge(&mut self, patch: ConfigPatch) {
        if let Some(provider) = patch.provider {
            self.provider = provider;
        }
        if let Some(region) = patch.region {
            self.region = region;
        }
        if let Some(endpoint) = patch.endpoint {
            self.endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }
        if let Some(access_key_id) = patch.access_key_id {
            self.access_key_id = access_key_id;
        }
        if let Some(access_key_secret) = patch.access_key_secret {
            self.access_key_secret = access_key_secret;
        }
        if let Some(bucket) = patch.bucket {
            self.bucket = bucket;
        }
        if let Some(secure) = patch.secure {
            self.secure = secure;
        }
        if let Some(timeout_ms) = patch.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(exclusive_transfers) = patch.exclusive_transfers {
            self.exclusive_transfers = exclusive_transfers;
        }
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.region.is_empty() || self.bucket.is_empty() {
            return Err(StorageError::Configuration(
                "region and bucket are required".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves credentials, preferring the configured ones over `secrets`.
    pub fn resolve(
        &self,
        secrets: &dyn SecretProvider,
    ) -> Result<ConnectionSettings, StorageError> {
        self.validate()?;

        let access_key_id = Some(self.access_key_id.clone())
            .filter(|s| !s.is_empty())
            .or_else(|| secrets.access_key_id())
            .filter(|s| !s.is_empty());
        let access_key_secret = Some(self.access_key_secret.clone())
            .filter(|s| !s.is_empty())
            .or_else(|| secrets.access_key_secret())
            .filter(|s| !s.is_empty());

        let (access_key_id, access_key_secret) = match (access_key_id, access_key_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(StorageError::Credential(
                    "no access credentials provided".to_string(),
                ))
            }
        };

        Ok(ConnectionSettings {
            provider: self.provider,
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            access_key_id,
            access_key_secret,
            bucket: self.bucket.clone(),
            secure: self.secure,
            timeout_ms: self.timeout_ms,
        })
    }
}

/// Validated configuration with resolved credentials, handed to a connector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub provider: Provider,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Secret,
    pub access_key_secret: Secret,
    pub bucket: String,
    pub secure: bool,
    pub timeout_ms: u64,
}

impl ConnectionSettings {
    pub fn endpoint_url(&self) -> Option<String> {
        self.endpoint
            .clone()
            .or_else(|| self.provider.default_endpoint(&self.region, self.secure))
    }

    pub fn object_url(&self, key: &str) -> String {
        self.provider.object_url(
            self.endpoint.as_deref(),
            &self.region,
            &self.bucket,
            key,
            self.secure,
        )
    }
}

/// Source of credentials missing from the configuration.
pub trait SecretProvider: Send + Sync {
    fn access_key_id(&self) -> Option<Secret>;

    fn access_key_secret(&self) -> Option<Secret>;
}

pub struct EnvSecretProvider;

impl SecretProvider for EnvSecretProvider {
    fn access_key_id(&self) -> Option<Secret> {
        env::var(ACCESS_KEY_ID_VAR).ok().map(Secret::new)
    }

    fn access_key_secret(&self) -> Option<Secret> {
        env::var(ACCESS_KEY_SECRET_VAR).ok().map(Secret::new)
    }
}

pub struct NoSecrets;

impl SecretProvider for NoSecrets {
    fn access_key_id(&self) -> Option<Secret> {
        None
    }

    fn access_key_secret(&self) -> Option<Secret> {
        None
    }
}

pub struct StaticSecrets {
    pub access_key_id: Secret,
    pub access_key_secret: Secret,
}

impl StaticSecrets {
    pub fn new(access_key_id: &str, access_key_secret: &str) -> Self {
        Self {
            access_key_id: Secret::new(access_key_id),
            access_key_secret: Secret::new(access_key_secret),
        }
    }
}

impl SecretProvider for StaticSecrets {
    fn access_key_id(&self) -> Option<Secret> {
        Some(self.access_key_id.clone())
    }

    fn access_key_secret(&self) -> Option<Secret> {
        Some(self.access_key_secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let mut config = OssConfig::default();
        config.merge(ConfigPatch::default().target("r1", "b1").credentials("k", "s"));
        config.merge(ConfigPatch {
            bucket: Some("b2".to_string()),
            timeout_ms: Some(5_000),
            ..Default::default()
        });

        assert_eq!(config.region, "r1");
        assert_eq!(config.bucket, "b2");
        assert_eq!(config.access_key_id.expose(), "k");
        assert_eq!(config.timeout_ms, 5_000);
        assert!(config.secure);
    }

    #[test]
    fn test_validate() {
        let cases = vec![
            ("", "", false),
            ("r1", "", false),
            ("", "b1", false),
            ("r1", "b1", true),
        ];

        for (region, bucket, expected) in cases {
            let mut config = OssConfig::default();
            config.merge(ConfigPatch::default().target(region, bucket));
            assert_eq!(
                config.validate().is_ok(),
                expected,
                "failed for case: {}/{}",
                region,
                bucket
            );
        }
    }

    #[test]
    fn test_resolve_credentials() {
        let mut config = OssConfig::default();
        config.merge(ConfigPatch::default().target("r1", "b1"));

        assert!(matches!(
            config.resolve(&NoSecrets),
            Err(StorageError::Credential(_))
        ));

        let settings = config
            .resolve(&StaticSecrets::new("env-k", "env-s"))
            .expect("secret provider should supply credentials");
        assert_eq!(settings.access_key_id.expose(), "env-k");

        config.merge(ConfigPatch::default().credentials("k", ""));
        let settings = config
            .resolve(&StaticSecrets::new("env-k", "env-s"))
            .expect("credentials should combine");
        assert_eq!(settings.access_key_id.expose(), "k");
        assert_eq!(settings.access_key_secret.expose(), "env-s");

        assert!(matches!(
            config.resolve(&StaticSecrets::new("", "")),
            Err(StorageError::Credential(_))
        ));
    }

    #[test]
    fn test_resolve_requires_target_first() {
        let config = OssConfig::default();
        assert!(matches!(
            config.resolve(&StaticSecrets::new("k", "s")),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let mut config = OssConfig::default();
        config.merge(ConfigPatch::default().credentials("AKID123", "topsecret"));
        let printed = format!("{:?}", config);

        assert!(!printed.contains("AKID123"));
        assert!(!printed.contains("topsecret"));
        assert!(printed.contains("Secret(***)"));
    }
}
