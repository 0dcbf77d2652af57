//! Gateway configuration
//!
//! The configuration is read once at startup and never changes afterwards. Loading it selects
//! the active [`SecurityFacadeProvider`] and validates everything that provider needs, so a
//! misconfigured gateway fails before serving its first request.
//!
//! # Example
//! ```
//! use s3s_gate::config::{GateConfig, SecurityConfig};
//! use s3s_gate::outcome::DenialMode;
//!
//! let config = GateConfig::from_json(r#"{
//!     "security": {
//!         "type": "opa",
//!         "server_base_uri": "http://localhost:8181/v1/data",
//!         "decision_path": "s3/allow",
//!         "fast_path": { "allow_keys": ["default-allow"] }
//!     },
//!     "denial_mode": "forbidden"
//! }"#).unwrap();
//!
//! assert!(matches!(config.security, SecurityConfig::Opa(_)));
//! assert_eq!(config.denial_mode, DenialMode::Forbidden);
//! assert!(config.build_provider().is_ok());
//!
//! // `opa` without a base uri never starts
//! let config = GateConfig::from_json(r#"{ "security": { "type": "opa" } }"#).unwrap();
//! assert!(config.build_provider().is_err());
//! ```

use crate::error::ConfigError;
use crate::outcome::DenialMode;
use crate::security::opa::{FastPathRules, HttpOpaClient, OpaS3SecurityFacadeProvider, OpaS3SecurityMapper, TableOpaMapper};
use crate::security::{AllowAllSecurityFacadeProvider, SecurityFacadeProvider};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

/// Gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// The active security provider.
    pub security: SecurityConfig,

    /// How a denied request is reported to the client.
    ///
    /// Default: [`DenialMode::Unauthorized`]
    pub denial_mode: DenialMode,
}

impl GateConfig {
    /// # Errors
    /// Returns [`ConfigError::Json`] if the document is malformed.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or is malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Validates the configuration and builds the active provider.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the selected provider is misconfigured.
    pub fn build_provider(&self) -> Result<Arc<dyn SecurityFacadeProvider>, ConfigError> {
        self.security.build_provider()
    }
}

/// Provider selection. The `type` field is the discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SecurityConfig {
    /// Every request is allowed.
    #[default]
    AllowAll,
    /// Decisions come from an OPA-compatible policy service.
    Opa(OpaSecurityConfig),
}

impl SecurityConfig {
    /// # Errors
    /// Returns a [`ConfigError`] if the selected provider is misconfigured.
    pub fn build_provider(&self) -> Result<Arc<dyn SecurityFacadeProvider>, ConfigError> {
        match self {
            Self::AllowAll => {
                info!("security provider: allow-all");
                Ok(Arc::new(AllowAllSecurityFacadeProvider))
            }
            Self::Opa(opa) => Ok(Arc::new(opa.build_provider()?)),
        }
    }
}

/// Settings of the OPA provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpaSecurityConfig {
    /// Base uri of the policy service, e.g. `http://localhost:8181/v1/data`. Required.
    pub server_base_uri: Option<String>,

    /// Path of the decision document, appended to the base uri.
    ///
    /// Default: `s3/allow`
    pub decision_path: String,

    /// Timeout of one policy request in milliseconds. Must be positive.
    ///
    /// Default: 5000
    pub timeout_ms: u64,

    /// Keys answered without asking the policy service.
    pub fast_path: FastPathRules,
}

impl Default for OpaSecurityConfig {
    fn default() -> Self {
        Self {
            server_base_uri: None,
            decision_path: "s3/allow".to_owned(),
            timeout_ms: 5000,
            fast_path: FastPathRules::default(),
        }
    }
}

impl OpaSecurityConfig {
    /// Parses and checks the server base uri.
    ///
    /// # Errors
    /// Returns an error if the uri is missing, unparsable, not http(s), or cannot carry a path.
    pub fn server_base_uri(&self) -> Result<Url, ConfigError> {
        let Some(raw) = self.server_base_uri.as_deref() else {
            return Err(ConfigError::MissingOpaServerBaseUri);
        };
        let invalid = |reason: String| ConfigError::InvalidOpaServerBaseUri {
            uri: raw.to_owned(),
            reason,
        };

        let uri = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if !matches!(uri.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", uri.scheme())));
        }
        if uri.cannot_be_a_base() {
            return Err(invalid("cannot be a base".to_owned()));
        }
        Ok(uri)
    }

    /// # Errors
    /// Returns [`ConfigError::ZeroTimeout`] if the timeout is zero.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Duration::from_millis(self.timeout_ms))
    }

    /// Builds the provider with the reference [`TableOpaMapper`].
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the settings are invalid.
    pub fn build_provider(&self) -> Result<OpaS3SecurityFacadeProvider, ConfigError> {
        let client = HttpOpaClient::new(self.timeout()?).map_err(ConfigError::HttpClient)?;
        let mapper = TableOpaMapper::new(Arc::new(client), self.decision_path.clone()).with_fast_path(self.fast_path.clone());
        self.build_provider_with_mapper(Arc::new(mapper))
    }

    /// Builds the provider around a custom mapper. Only the base uri is taken from `self`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the base uri is invalid.
    pub fn build_provider_with_mapper(
        &self,
        mapper: Arc<dyn OpaS3SecurityMapper>,
    ) -> Result<OpaS3SecurityFacadeProvider, ConfigError> {
        let server_base_uri = self.server_base_uri()?;
        info!(%server_base_uri, decision_path = %self.decision_path, "security provider: opa");
        Ok(OpaS3SecurityFacadeProvider::new(server_base_uri, mapper))
    }
}
