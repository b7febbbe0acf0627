//! Gateway configuration file.
//!
//! Every field is optional; a missing file section falls back to its
//! defaults.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//!
//! [gateway]
//! public_base = "https://gateway.example/proxy"
//! script_url = "https://gateway.example/arx.js"
//! cache_ttl_secs = 600
//! rewrite_mode = "continuity"
//!
//! [rules]
//! threshold = 6
//! extra_trusted_domains = ['(?:^|\.)my-reader\.example$']
//! blocklist_file = "/etc/arx/easylist.txt"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SentinelError};
use crate::passes::RewriteMode;
use crate::route::GatewayRoute;
use crate::rules::{RuleSet, RuleSetBuilder, blocklist};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Public URL of the `/proxy` endpoint, used when routing references.
    pub public_base: String,
    /// Where pages load the in-page engine from. Defaults to `arx.js` next
    /// to `public_base`.
    pub script_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub rewrite_mode: RewriteMode,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            public_base: format!("http://localhost:{DEFAULT_PORT}/proxy"),
            script_url: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: concat!("ArxSentinel/", env!("CARGO_PKG_VERSION")).to_string(),
            rewrite_mode: RewriteMode::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub threshold: Option<f64>,
    pub extra_block_patterns: Vec<String>,
    pub extra_trusted_domains: Vec<String>,
    pub extra_trusted_paths: Vec<String>,
    pub extra_whitelist: Vec<String>,
    /// EasyList file whose `||domain^` rules become block patterns.
    pub blocklist_file: Option<PathBuf>,
}

impl SentinelConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SentinelError::Config(e.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SentinelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn route(&self) -> Result<GatewayRoute> {
        GatewayRoute::new(&self.gateway.public_base)
    }

    /// Configured `script_url`, or the engine location derived from the
    /// route.
    pub fn script_url(&self) -> Result<String> {
        match &self.gateway.script_url {
            Some(url) => Ok(url.clone()),
            None => Ok(self.route()?.engine_script_url()),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.gateway.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.fetch_timeout_secs)
    }

    /// The default tables extended with the `[rules]` section, without the
    /// block list file.
    pub fn rules_builder(&self) -> RuleSetBuilder {
        let rules = &self.rules;
        let mut builder = RuleSet::builder()
            .supplementary_patterns(rules.extra_block_patterns.iter().cloned());
        for domain in &rules.extra_trusted_domains {
            builder = builder.trusted_domain(domain.clone());
        }
        for path in &rules.extra_trusted_paths {
            builder = builder.trusted_path(path.clone());
        }
        for token in &rules.extra_whitelist {
            builder = builder.whitelist_token(token.clone());
        }
        if let Some(threshold) = rules.threshold {
            builder = builder.threshold(threshold);
        }
        builder
    }

    /// Build the rule set, reading `blocklist_file` if configured.
    pub async fn rule_set(&self) -> Result<RuleSet> {
        let mut builder = self.rules_builder();
        if let Some(path) = &self.rules.blocklist_file {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SentinelError::Config(format!("{}: {e}", path.display())))?;
            let patterns = blocklist::parse_easylist(&text);
            tracing::info!(count = patterns.len(), path = %path.display(), "Loaded block list");
            builder = builder.supplementary_patterns(patterns);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = SentinelConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert!(config.gateway.user_agent.starts_with("ArxSentinel/"));
        assert_eq!(config.gateway.rewrite_mode, RewriteMode::Strict);
        assert_eq!(
            config.route().unwrap().base().as_str(),
            "http://localhost:3000/proxy"
        );
        assert_eq!(config.script_url().unwrap(), "http://localhost:3000/arx.js");
    }

    #[test]
    fn sections_override_defaults() {
        let config = SentinelConfig::from_toml(
            r#"
            [server]
            port = 8080

            [gateway]
            public_base = "https://gw.example/proxy"
            rewrite_mode = "continuity"

            [rules]
            threshold = 7.5
            extra_block_patterns = ['annoying-network\.example']
            extra_trusted_domains = ['(?:^|\.)my-reader\.example$']
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.gateway.rewrite_mode, RewriteMode::Continuity);
        assert_eq!(config.script_url().unwrap(), "https://gw.example/arx.js");

        let rules = config.rules_builder().build().unwrap();
        assert_eq!(rules.threshold(), 7.5);
        assert!(rules.matches_block("https://annoying-network.example/x.js"));
        assert!(rules.is_trusted_host("cdn.my-reader.example"));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(matches!(
            SentinelConfig::from_toml("[server]\nport = \"high\""),
            Err(SentinelError::Config(_))
        ));

        let config =
            SentinelConfig::from_toml("[rules]\nextra_block_patterns = ['(unclosed']").unwrap();
        assert!(matches!(
            config.rules_builder().build(),
            Err(SentinelError::Config(_))
        ));
    }

    #[tokio::test]
    async fn block_list_file_extends_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("easylist.txt");
        tokio::fs::write(&path, "! comment\n||annoying-network.example^\n")
            .await
            .unwrap();

        let mut config = SentinelConfig::default();
        config.rules.blocklist_file = Some(path);
        let rules = config.rule_set().await.unwrap();
        assert!(rules.matches_block("https://cdn.annoying-network.example/a.js"));

        config.rules.blocklist_file = Some(dir.path().join("missing.txt"));
        assert!(matches!(config.rule_set().await, Err(SentinelError::Config(_))));
    }
}
