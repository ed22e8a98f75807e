//! Client configuration.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. Nothing in the library reads the process
//! environment; the CLI maps flags and `TABULARIS_*` variables onto the
//! builder, and tests construct configs directly.
//!
//! # Plan override
//! [`ClientConfig::plan_override`] forces the account onto a plan tier for
//! local testing of Free/Pro behaviour. It is applied to every account
//! snapshot through [`crate::quota::QuotaGate::from_account`] and never
//! changes what the service itself enforces.

use crate::error::TabularisError;
use crate::quota::PlanTier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a conversion client.
///
/// Built via [`ClientConfig::builder()`] or using [`ClientConfig::default()`].
///
/// # Example
/// ```rust
/// use tabularis::{ClientConfig, PlanTier};
///
/// let config = ClientConfig::builder()
///     .api_base_url("https://convert.example.com/api")
///     .access_token("eyJhbGciOi...")
///     .plan_override(Some(PlanTier::Pro))
///     .build()
///     .unwrap();
/// assert_eq!(config.request_timeout_secs, 120);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the conversion service. Default: `http://localhost:8000`.
    pub api_base_url: String,

    /// Bearer token of the signed-in user. Default: none.
    ///
    /// Session management lives outside this crate; callers obtain the token
    /// however their sign-in flow works and hand it over here.
    pub access_token: Option<String>,

    /// Force the account onto a plan tier. Default: none (use the real plan).
    pub plan_override: Option<PlanTier>,

    /// Per-request timeout in seconds. Default: 120.
    ///
    /// Conversion of a long document is a single synchronous request on the
    /// service side, so this must cover the slowest conversion you expect.
    pub request_timeout_secs: u64,

    /// Directory that converted files are saved into. Default: `.`.
    pub output_dir: PathBuf,

    /// Extension for artifacts whose response names no file. Default: `xlsx`.
    pub artifact_extension: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            access_token: None,
            plan_override: None,
            request_timeout_secs: 120,
            output_dir: PathBuf::from("."),
            artifact_extension: "xlsx".to_string(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("plan_override", &self.plan_override)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("output_dir", &self.output_dir)
            .field("artifact_extension", &self.artifact_extension)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim().to_string();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.config.access_token = (!token.trim().is_empty()).then_some(token);
        self
    }

    pub fn plan_override(mut self, plan: Option<PlanTier>) -> Self {
        self.config.plan_override = plan;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn artifact_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.artifact_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, TabularisError> {
        let c = &self.config;
        let url = reqwest::Url::parse(&c.api_base_url).map_err(|e| {
            TabularisError::InvalidConfig(format!(
                "API base URL '{}' is not a valid URL: {e}",
                c.api_base_url
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TabularisError::InvalidConfig(format!(
                "API base URL must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if c.request_timeout_secs == 0 {
            return Err(TabularisError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.artifact_extension.is_empty()
            || !c
                .artifact_extension
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric())
        {
            return Err(TabularisError::InvalidConfig(format!(
                "Artifact extension must be alphanumeric, got '{}'",
                c.artifact_extension
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let c = ClientConfig::builder().build().unwrap();
        assert_eq!(c.api_base_url, "http://localhost:8000");
        assert_eq!(c.request_timeout_secs, 120);
        assert_eq!(c.artifact_extension, "xlsx");
        assert!(c.plan_override.is_none());
    }

    #[test]
    fn rejects_bad_url() {
        let err = ClientConfig::builder().api_base_url("not a url").build();
        assert!(matches!(err, Err(TabularisError::InvalidConfig(_))));
        let err = ClientConfig::builder()
            .api_base_url("ftp://files.example.com")
            .build();
        assert!(matches!(err, Err(TabularisError::InvalidConfig(_))));
    }

    #[test]
    fn setters_normalise() {
        let c = ClientConfig::builder()
            .request_timeout_secs(0)
            .artifact_extension(".csv")
            .access_token("   ")
            .build()
            .unwrap();
        assert_eq!(c.request_timeout_secs, 1);
        assert_eq!(c.artifact_extension, "csv");
        assert!(c.access_token.is_none());
    }

    #[test]
    fn rejects_path_like_extension() {
        let err = ClientConfig::builder().artifact_extension("x/../y").build();
        assert!(matches!(err, Err(TabularisError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_token() {
        let c = ClientConfig::builder()
            .access_token("super-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
