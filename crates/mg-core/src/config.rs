//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. mg-gateway.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "mg-gateway.toml";

/// Path of the health check route, reserved next to the webhook routes
pub const HEALTH_PATH: &str = "/health";

/// Facebook Messenger adapter configuration
///
/// Set once at construction and never mutated afterwards. The `Debug`
/// output redacts every secret.
#[derive(Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// App secret from the App Dashboard, used for payload signatures
    #[serde(default)]
    pub app_secret: String,

    /// Arbitrary value echoed back by Facebook during the webhook handshake
    pub validation_token: String,

    /// Page access token used to call the Send API
    pub page_access_token: String,

    /// URI path of the webhook (GET handshake + POST deliveries)
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,

    /// URI path of the push-style send endpoint, disabled when `None`
    #[serde(default)]
    pub send_api_path: Option<String>,

    /// Channel name handed to the notification handler
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Graph API base URL
    #[serde(default = "default_graph_api_url")]
    pub graph_api_url: String,

    /// Graph API version segment
    #[serde(default = "default_graph_api_version")]
    pub graph_api_version: String,

    /// Require a valid `X-Hub-Signature-256` header on webhook deliveries
    #[serde(default)]
    pub verify_signature: bool,
}

impl AdapterConfig {
    /// Create a configuration with the three Facebook credentials and
    /// defaults for everything else
    pub fn new(app_secret: &str, validation_token: &str, page_access_token: &str) -> Self {
        Self {
            app_secret: app_secret.to_string(),
            validation_token: validation_token.to_string(),
            page_access_token: page_access_token.to_string(),
            webhook_path: default_webhook_path(),
            send_api_path: None,
            channel_name: default_channel_name(),
            graph_api_url: default_graph_api_url(),
            graph_api_version: default_graph_api_version(),
            verify_signature: false,
        }
    }

    /// Set the webhook path
    pub fn with_webhook_path(mut self, path: &str) -> Self {
        self.webhook_path = path.to_string();
        self
    }

    /// Enable the push-style send endpoint at `path`
    pub fn with_send_api_path(mut self, path: &str) -> Self {
        self.send_api_path = Some(path.to_string());
        self
    }

    /// Point the Send API at another base URL
    pub fn with_graph_api_url(mut self, url: &str) -> Self {
        self.graph_api_url = url.to_string();
        self
    }

    /// Toggle payload signature verification
    pub fn with_signature_verification(mut self, enabled: bool) -> Self {
        self.verify_signature = enabled;
        self
    }

    /// Full URL of the Send API message endpoint (without the access token)
    pub fn messages_url(&self) -> String {
        format!(
            "{}/{}/me/messages",
            self.graph_api_url.trim_end_matches('/'),
            self.graph_api_version
        )
    }

    /// Check the invariants the adapter relies on
    pub fn validate(&self) -> Result<()> {
        if self.validation_token.is_empty() {
            return Err(CoreError::Config("validation_token must not be empty".to_string()));
        }
        if self.page_access_token.is_empty() {
            return Err(CoreError::Config("page_access_token must not be empty".to_string()));
        }
        if !self.webhook_path.starts_with('/') {
            return Err(CoreError::Config(format!(
                "webhook_path must start with '/': {}",
                self.webhook_path
            )));
        }
        if self.webhook_path == HEALTH_PATH {
            return Err(CoreError::Config(format!(
                "webhook_path must not be {}",
                HEALTH_PATH
            )));
        }
        if let Some(path) = &self.send_api_path {
            if !path.starts_with('/') {
                return Err(CoreError::Config(format!(
                    "send_api_path must start with '/': {}",
                    path
                )));
            }
            if *path == self.webhook_path || path == HEALTH_PATH {
                return Err(CoreError::Config(
                    "send_api_path must differ from webhook_path and /health".to_string(),
                ));
            }
        }
        if self.verify_signature && self.app_secret.is_empty() {
            return Err(CoreError::Config(
                "app_secret is required when verify_signature is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("app_secret", &redact(&self.app_secret))
            .field("validation_token", &redact(&self.validation_token))
            .field("page_access_token", &redact(&self.page_access_token))
            .field("webhook_path", &self.webhook_path)
            .field("send_api_path", &self.send_api_path)
            .field("channel_name", &self.channel_name)
            .field("graph_api_url", &self.graph_api_url)
            .field("graph_api_version", &self.graph_api_version)
            .field("verify_signature", &self.verify_signature)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the webhook server
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding a listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_channel_name() -> String {
    "FacebookMessenger".to_string()
}

fn default_graph_api_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_graph_api_version() -> String {
    "v2.6".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Main configuration for mg-gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Webhook server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Facebook Messenger adapter configuration
    pub facebook: AdapterConfig,
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_vars<F>(value: &str, lookup: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                while let Some(c) = chars.next_if(|&c| c != '}') {
                    var_name.push(c);
                }
                chars.next(); // '}' を消費

                if let Some(env_value) = lookup(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// # 環境変数展開
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換されます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_toml_file_with(path, &env_lookup)
    }

    fn from_toml_file_with<P, F>(path: P, lookup: &F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str_with(&toml_content, lookup)
    }

    fn from_toml_str_with<F>(content: &str, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded_content = Self::expand_vars(content, lookup);

        let toml_config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| CoreError::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut cfg = Self::from_toml_config(toml_config);

        // 既存の環境変数で上書き（環境変数が優先）
        cfg.apply_overrides(lookup);
        cfg.facebook.validate()?;

        Ok(cfg)
    }

    /// 設定を読み込む
    ///
    /// 明示されたパス、カレントディレクトリの `mg-gateway.toml` の順に探し、
    /// 見つからない場合は環境変数のみを使います。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// TOML 構造から Config を構築
    fn from_toml_config(toml: TomlConfig) -> Self {
        let facebook = toml.facebook.unwrap_or_default();
        let server = toml.server.unwrap_or_default();

        Config {
            server: ServerConfig {
                host: server.host.unwrap_or_else(default_host),
                port: server.port.unwrap_or_else(default_port),
            },
            facebook: AdapterConfig {
                app_secret: facebook.app_secret.unwrap_or_default(),
                validation_token: facebook.validation_token.unwrap_or_default(),
                page_access_token: facebook.page_access_token.unwrap_or_default(),
                webhook_path: facebook.webhook_path.unwrap_or_else(default_webhook_path),
                send_api_path: facebook.send_api_path,
                channel_name: facebook.channel_name.unwrap_or_else(default_channel_name),
                graph_api_url: facebook.graph_api_url.unwrap_or_else(default_graph_api_url),
                graph_api_version: facebook
                    .graph_api_version
                    .unwrap_or_else(default_graph_api_version),
                verify_signature: facebook.verify_signature.unwrap_or(false),
            },
        }
    }

    /// 環境変数で設定を上書きする
    fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fb = &mut self.facebook;

        if let Some(secret) = lookup("FACEBOOK_APP_SECRET") {
            fb.app_secret = secret;
        }
        if let Some(token) = lookup("FACEBOOK_VALIDATION_TOKEN") {
            fb.validation_token = token;
        }
        if let Some(token) = lookup("FACEBOOK_PAGE_ACCESS_TOKEN") {
            fb.page_access_token = token;
        }
        if let Some(path) = lookup("FACEBOOK_WEBHOOK_PATH").filter(|p| !p.is_empty()) {
            fb.webhook_path = path;
        }
        if let Some(path) = lookup("FACEBOOK_SEND_API_PATH") {
            // An empty value disables the endpoint
            fb.send_api_path = Some(path).filter(|p| !p.is_empty());
        }
        if let Some(url) = lookup("FACEBOOK_GRAPH_API_URL").filter(|u| !u.is_empty()) {
            fb.graph_api_url = url;
        }
        if let Some(version) = lookup("FACEBOOK_GRAPH_API_VERSION").filter(|v| !v.is_empty()) {
            fb.graph_api_version = version;
        }
        if let Some(flag) = lookup("FACEBOOK_VERIFY_SIGNATURE") {
            fb.verify_signature = parse_flag(&flag);
        }
        if let Some(name) = lookup("BOT_CHANNEL_NAME").filter(|n| !n.is_empty()) {
            fb.channel_name = name;
        }

        if let Some(host) = lookup("SERVER_HOST").filter(|h| !h.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let validation_token = lookup("FACEBOOK_VALIDATION_TOKEN")
            .ok_or_else(|| CoreError::Config("FACEBOOK_VALIDATION_TOKEN not set".to_string()))?;
        let page_access_token = lookup("FACEBOOK_PAGE_ACCESS_TOKEN")
            .ok_or_else(|| CoreError::Config("FACEBOOK_PAGE_ACCESS_TOKEN not set".to_string()))?;

        let mut cfg = Config {
            server: ServerConfig::default(),
            facebook: AdapterConfig::new("", &validation_token, &page_access_token),
        };
        cfg.apply_overrides(lookup);
        cfg.facebook.validate()?;

        Ok(cfg)
    }
}

// ============================================================================
// TOML 構造体定義（ファイル解析用）
// ============================================================================

/// TOML ファイル用のトップレベル構造
#[derive(Debug, Deserialize)]
struct TomlConfig {
    /// サーバー設定
    server: Option<TomlServerConfig>,
    /// Facebook 設定
    facebook: Option<TomlFacebookConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlServerConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlFacebookConfig {
    app_secret: Option<String>,
    validation_token: Option<String>,
    page_access_token: Option<String>,
    webhook_path: Option<String>,
    send_api_path: Option<String>,
    channel_name: Option<String>,
    graph_api_url: Option<String>,
    graph_api_version: Option<String>,
    verify_signature: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_adapter_config_defaults() {
        let config = AdapterConfig::new("secret", "verify", "page-token");
        assert_eq!(config.webhook_path, "/webhook");
        assert_eq!(config.channel_name, "FacebookMessenger");
        assert!(config.send_api_path.is_none());
        assert!(!config.verify_signature);
        assert_eq!(
            config.messages_url(),
            "https://graph.facebook.com/v2.6/me/messages"
        );
    }

    #[test]
    fn test_messages_url_trims_trailing_slash() {
        let config = AdapterConfig::new("", "verify", "token")
            .with_graph_api_url("http://127.0.0.1:9999/");
        assert_eq!(config.messages_url(), "http://127.0.0.1:9999/v2.6/me/messages");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AdapterConfig::new("s3cret", "v3rify", "p4ge");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("v3rify"));
        assert!(!debug.contains("p4ge"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_validate() {
        assert!(AdapterConfig::new("", "verify", "token").validate().is_ok());
        assert!(AdapterConfig::new("", "", "token").validate().is_err());
        assert!(AdapterConfig::new("", "verify", "").validate().is_err());
        assert!(
            AdapterConfig::new("", "verify", "token")
                .with_webhook_path("webhook")
                .validate()
                .is_err()
        );
        assert!(
            AdapterConfig::new("", "verify", "token")
                .with_send_api_path("/webhook")
                .validate()
                .is_err()
        );
        assert!(
            AdapterConfig::new("", "verify", "token")
                .with_webhook_path("/health")
                .validate()
                .is_err()
        );
        assert!(
            AdapterConfig::new("", "verify", "token")
                .with_signature_verification(true)
                .validate()
                .is_err()
        );
        assert!(
            AdapterConfig::new("secret", "verify", "token")
                .with_signature_verification(true)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_expand_vars() {
        let lookup = lookup_from(&[("MG_TEST_VAR", "test_value")]);

        let result = Config::expand_vars("prefix_${MG_TEST_VAR}_suffix", &lookup);
        assert_eq!(result, "prefix_test_value_suffix");

        // 存在しない環境変数
        let result = Config::expand_vars("prefix_${NONEXISTENT_VAR}_suffix", &lookup);
        assert_eq!(result, "prefix__suffix");

        let result = Config::expand_vars("no_vars_here", &lookup);
        assert_eq!(result, "no_vars_here");

        let result = Config::expand_vars("${}_content", &lookup);
        assert_eq!(result, "_content");
    }

    #[test]
    fn test_toml_config_parsing() {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8080

[facebook]
app_secret = "${MG_APP_SECRET}"
validation_token = "verify"
page_access_token = "page-token"
webhook_path = "/fb"
send_api_path = "/fb/send"
channel_name = "Messenger"
verify_signature = true
"#;
        let lookup = lookup_from(&[("MG_APP_SECRET", "expanded-secret")]);
        let config = Config::from_toml_str_with(toml_content, &lookup).unwrap();

        assert_eq!(config.server.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.facebook.app_secret, "expanded-secret");
        assert_eq!(config.facebook.validation_token, "verify");
        assert_eq!(config.facebook.page_access_token, "page-token");
        assert_eq!(config.facebook.webhook_path, "/fb");
        assert_eq!(config.facebook.send_api_path.as_deref(), Some("/fb/send"));
        assert_eq!(config.facebook.channel_name, "Messenger");
        assert_eq!(config.facebook.graph_api_version, "v2.6");
        assert!(config.facebook.verify_signature);
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let toml_content = r#"
[facebook]
validation_token = "from-file"
page_access_token = "from-file"
send_api_path = "/send"
"#;
        let lookup = lookup_from(&[
            ("FACEBOOK_VALIDATION_TOKEN", "from-env"),
            ("FACEBOOK_SEND_API_PATH", ""),
            ("SERVER_PORT", "9090"),
        ]);
        let config = Config::from_toml_str_with(toml_content, &lookup).unwrap();

        assert_eq!(config.facebook.validation_token, "from-env");
        assert_eq!(config.facebook.page_access_token, "from-file");
        assert!(config.facebook.send_api_path.is_none());
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn test_toml_missing_tokens_rejected() {
        let lookup = lookup_from(&[]);
        let result = Config::from_toml_str_with("[server]\nport = 1\n", &lookup);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_from_lookup() {
        let lookup = lookup_from(&[
            ("FACEBOOK_VALIDATION_TOKEN", "verify"),
            ("FACEBOOK_PAGE_ACCESS_TOKEN", "token"),
            ("FACEBOOK_VERIFY_SIGNATURE", "false"),
            ("BOT_CHANNEL_NAME", "fb"),
        ]);
        let config = Config::from_lookup(&lookup).unwrap();
        assert_eq!(config.facebook.validation_token, "verify");
        assert_eq!(config.facebook.channel_name, "fb");
        assert_eq!(config.server.port, 3000);

        let missing = lookup_from(&[("FACEBOOK_VALIDATION_TOKEN", "verify")]);
        assert!(Config::from_lookup(&missing).is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mg-gateway.toml");
        std::fs::write(
            &path,
            "[facebook]\nvalidation_token = \"verify\"\npage_access_token = \"token\"\n",
        )
        .unwrap();

        let config = Config::from_toml_file_with(&path, &lookup_from(&[])).unwrap();
        assert_eq!(config.facebook.webhook_path, "/webhook");

        let missing = dir.path().join("missing.toml");
        assert!(Config::from_toml_file_with(&missing, &lookup_from(&[])).is_err());
    }
}
