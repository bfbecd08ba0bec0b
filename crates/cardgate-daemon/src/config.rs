//! Gateway configuration file.
//!
//! The file is TOML, read once at startup. `${VAR}` placeholders are replaced
//! with environment values before parsing, so secrets such as the collector
//! token can stay out of the file. Placeholders inside `#` comments are left
//! alone, so a commented-out line may name a variable that is not set:
//!
//! ```toml
//! endpoint = "https://collector.example.com/scans"
//! auth_token = "${CARDGATE_TOKEN}"
//! # auth_token = "${CARDGATE_STAGING_TOKEN}"
//! device_id = "gate-01"
//! vendor_id = "0403"
//!
//! [update]
//! enabled = true
//! repository = "acme/cardgate-scripts"
//! install_dir = "/opt/cardgate"
//! ```

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cardgate_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_RECONNECT_INTERVAL_MS, DEFAULT_SEND_RETRIES,
    DEFAULT_SEND_RETRY_DELAY_MS, DEFAULT_SEND_TIMEOUT_MS, DEFAULT_UPDATE_API_BASE,
    DEFAULT_UPDATE_BRANCH, DEFAULT_UPDATE_INTERVAL_SECS, DEFAULT_UPDATE_TIMEOUT_SECS,
    VERSION_MARKER_FILE,
};
use cardgate_core::{CardNormalizer, DeviceId};
use cardgate_network::{DeliveryConfig, Url};
use cardgate_serial::{ConnectionConfig, DeviceFilter};
use cardgate_update::UpdateConfig;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

const PLACEHOLDER_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable {0} is referenced but not set")]
    MissingVariable(String),

    #[error("Invalid TOML: {0}")]
    Parse(String),

    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Finalized gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayConfig {
    /// Pinned device path; skips discovery.
    #[serde(default)]
    pub serial_path: Option<PathBuf>,

    #[serde(default)]
    pub vendor_id: Option<String>,

    #[serde(default)]
    pub product_id: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Collector URL.
    pub endpoint: String,

    #[serde(default)]
    pub auth_token: Option<String>,

    /// Identifier embedded in every event.
    #[serde(alias = "device_name")]
    pub device_id: String,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Total delivery attempts per event.
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,

    #[serde(default = "default_send_retry_delay_ms")]
    pub send_retry_delay_ms: u64,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    #[serde(default)]
    pub issuer_prefix: Option<String>,

    #[serde(default)]
    pub update: UpdateSection,
}

/// The `[update]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpdateSection {
    pub enabled: bool,
    pub repository: Option<String>,
    pub branch: String,
    pub api_base: String,
    pub install_dir: Option<PathBuf>,
    pub marker_path: Option<PathBuf>,
    pub check_interval_secs: u64,
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            enabled: false,
            repository: None,
            branch: DEFAULT_UPDATE_BRANCH.to_string(),
            api_base: DEFAULT_UPDATE_API_BASE.to_string(),
            install_dir: None,
            marker_path: None,
            check_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
        }
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

fn default_send_retries() -> u32 {
    DEFAULT_SEND_RETRIES
}

fn default_send_retry_delay_ms() -> u64 {
    DEFAULT_SEND_RETRY_DELAY_MS
}

fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT_MS
}

impl GatewayConfig {
    /// Read, substitute, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text, substituting from the process
    /// environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_toml_str_with(content, |name| std::env::var(name).ok())
    }

    /// Like [`GatewayConfig::from_toml_str`] with a custom variable lookup.
    pub fn from_toml_str_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = substitute_env_vars_with(content, lookup)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value the components will be built from.
    pub fn validate(&self) -> Result<()> {
        self.delivery_config()?;
        self.device_id()?;
        self.normalizer()?;
        self.update_config()?;

        validate_usb_id("vendor_id", self.vendor_id.as_deref())?;
        validate_usb_id("product_id", self.product_id.as_deref())?;

        if self.baud_rate == 0 {
            return Err(ConfigError::invalid("baud_rate", "must be greater than 0"));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "reconnect_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.send_retries == 0 {
            return Err(ConfigError::invalid("send_retries", "must be at least 1"));
        }
        if self.send_timeout_ms == 0 {
            return Err(ConfigError::invalid("send_timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }

    pub fn device_id(&self) -> Result<DeviceId> {
        DeviceId::new(&self.device_id).map_err(|e| ConfigError::invalid("device_id", e.to_string()))
    }

    pub fn normalizer(&self) -> Result<CardNormalizer> {
        match &self.issuer_prefix {
            Some(prefix) => CardNormalizer::with_issuer_prefix(prefix)
                .map_err(|e| ConfigError::invalid("issuer_prefix", e.to_string())),
            None => Ok(CardNormalizer::new()),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            serial_path: self.serial_path.clone(),
            filter: DeviceFilter::new(self.vendor_id.as_deref(), self.product_id.as_deref()),
            baud_rate: self.baud_rate,
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
        }
    }

    pub fn delivery_config(&self) -> Result<DeliveryConfig> {
        let endpoint = parse_http_url("endpoint", &self.endpoint)?;

        let mut config = DeliveryConfig::new(endpoint)
            .with_retries(
                self.send_retries,
                Duration::from_millis(self.send_retry_delay_ms),
            )
            .with_request_timeout(Duration::from_millis(self.send_timeout_ms));

        // An empty token (often an empty ${VAR}) means no authentication.
        if let Some(token) = self.auth_token.as_deref().map(str::trim)
            && !token.is_empty()
        {
            config = config.with_auth_token(token);
        }
        Ok(config)
    }

    /// Update supervisor settings, or `None` when self-update is disabled.
    pub fn update_config(&self) -> Result<Option<UpdateConfig>> {
        let section = &self.update;
        if !section.enabled {
            return Ok(None);
        }

        let repository = section
            .repository
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| ConfigError::invalid("update.repository", "required when enabled"))?;
        if !is_repository_slug(repository) {
            return Err(ConfigError::invalid(
                "update.repository",
                format!("expected owner/name, got '{repository}'"),
            ));
        }

        let install_dir = section
            .install_dir
            .clone()
            .ok_or_else(|| ConfigError::invalid("update.install_dir", "required when enabled"))?;

        if section.branch.trim().is_empty() {
            return Err(ConfigError::invalid("update.branch", "must not be empty"));
        }
        if section.check_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "update.check_interval_secs",
                "must be greater than 0",
            ));
        }

        Ok(Some(UpdateConfig {
            repository: repository.to_string(),
            branch: section.branch.trim().to_string(),
            api_base: parse_http_url("update.api_base", &section.api_base)?,
            marker_path: section
                .marker_path
                .clone()
                .unwrap_or_else(|| install_dir.join(VERSION_MARKER_FILE)),
            install_dir,
            check_interval: Duration::from_secs(section.check_interval_secs),
            request_timeout: Duration::from_secs(DEFAULT_UPDATE_TIMEOUT_SECS),
        }))
    }
}

/// Replace every `${VAR}` outside comments in `content` using `lookup`.
///
/// # Errors
///
/// `ConfigError::MissingVariable` for the first placeholder `lookup` cannot
/// resolve.
pub fn substitute_env_vars_with<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(PLACEHOLDER_PATTERN).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let comments = comment_ranges(content);

    let mut output = String::with_capacity(content.len());
    let mut last = 0;
    for caps in re.captures_iter(content) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if comments.iter().any(|comment| comment.contains(&whole.start())) {
            continue;
        }
        let value = lookup(name.as_str())
            .ok_or_else(|| ConfigError::MissingVariable(name.as_str().to_string()))?;

        output.push_str(&content[last..whole.start()]);
        output.push_str(&value);
        last = whole.end();
    }
    output.push_str(&content[last..]);

    Ok(output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Basic,
    Literal,
    MultiBasic,
    MultiLiteral,
}

/// Byte ranges of TOML comments, each from `#` to the end of its line.
///
/// A `#` inside any of the four string forms does not start a comment.
fn comment_ranges(content: &str) -> Vec<Range<usize>> {
    let bytes = content.as_bytes();
    let mut ranges = Vec::new();
    let mut quote = Quote::None;
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        match (quote, bytes[i]) {
            (Quote::None, b'#') => {
                let end = content[i..].find('\n').map_or(content.len(), |n| i + n);
                ranges.push(i..end);
                i = end;
                continue;
            }
            (Quote::None, b'"') if rest.starts_with(b"\"\"\"") => {
                quote = Quote::MultiBasic;
                i += 3;
                continue;
            }
            (Quote::None, b'\'') if rest.starts_with(b"'''") => {
                quote = Quote::MultiLiteral;
                i += 3;
                continue;
            }
            (Quote::None, b'"') => quote = Quote::Basic,
            (Quote::None, b'\'') => quote = Quote::Literal,
            (Quote::Basic | Quote::MultiBasic, b'\\') => {
                // Skip the escaped byte.
                i += 2;
                continue;
            }
            (Quote::Basic, b'"' | b'\n') | (Quote::Literal, b'\'' | b'\n') => {
                quote = Quote::None;
            }
            (Quote::MultiBasic, b'"') if rest.starts_with(b"\"\"\"") => {
                quote = Quote::None;
                i += 3;
                continue;
            }
            (Quote::MultiLiteral, b'\'') if rest.starts_with(b"'''") => {
                quote = Quote::None;
                i += 3;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    ranges
}

fn parse_http_url(field: &'static str, value: &str) -> Result<Url> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::invalid(field, format!("{e}: '{value}'")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::invalid(
            field,
            format!("unsupported scheme '{other}', expected http or https"),
        )),
    }
}

fn validate_usb_id(field: &'static str, value: Option<&str>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::invalid(
            field,
            format!("expected 1-4 hex digits, got '{value}'"),
        ));
    }
    Ok(())
}

fn is_repository_slug(value: &str) -> bool {
    let mut parts = value.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MINIMAL: &str = r#"
        endpoint = "https://collector.example.com/scans"
        device_id = "gate-01"
    "#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(content: &str) -> Result<GatewayConfig> {
        GatewayConfig::from_toml_str_with(content, no_env)
    }

    #[test]
    fn test_defaults() {
        let config = parse(MINIMAL).unwrap();

        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.reconnect_interval_ms, 5000);
        assert_eq!(config.send_retries, 3);
        assert_eq!(config.send_retry_delay_ms, 2000);
        assert_eq!(config.send_timeout_ms, 10_000);
        assert!(config.serial_path.is_none());
        assert!(!config.update.enabled);
        assert!(config.update_config().unwrap().is_none());

        let connection = config.connection_config();
        assert!(connection.filter.is_empty());
        assert_eq!(connection.reconnect_interval, Duration::from_secs(5));

        let delivery = config.delivery_config().unwrap();
        assert_eq!(delivery.max_attempts, 3);
        assert_eq!(delivery.retry_delay, Duration::from_secs(2));
        assert!(delivery.auth_token.is_none());
    }

    #[test]
    fn test_device_name_alias() {
        let config = parse(
            r#"
            endpoint = "http://10.0.0.5:8080/scan"
            device_name = "turnstile-east"
            "#,
        )
        .unwrap();

        assert_eq!(config.device_id().unwrap().as_str(), "turnstile-east");
    }

    #[test]
    fn test_substitutes_environment() {
        let content = r#"
            endpoint = "${COLLECTOR_URL}/scans"
            auth_token = "${TOKEN}"
            device_id = "gate-01"
        "#;
        let config = GatewayConfig::from_toml_str_with(content, |name| match name {
            "COLLECTOR_URL" => Some("https://collector.example.com".to_string()),
            "TOKEN" => Some("s3cret".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.endpoint, "https://collector.example.com/scans");
        assert_eq!(
            config.delivery_config().unwrap().auth_token.as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn test_unset_variable_is_an_error() {
        let result = substitute_env_vars_with("token = \"${MISSING}\"", no_env);

        assert!(matches!(result, Err(ConfigError::MissingVariable(name)) if name == "MISSING"));
    }

    #[test]
    fn test_text_without_placeholders_is_unchanged() {
        let text = "price = \"$5\"\nbraces = \"{x}\"";
        assert_eq!(substitute_env_vars_with(text, no_env).unwrap(), text);
    }

    #[test]
    fn test_commented_placeholders_are_ignored() {
        let content = r#"
            endpoint = "https://collector.example.com/scans"
            device_id = "gate-01"
            # auth_token = "${STAGING_TOKEN}"
            auth_token = "${TOKEN}" # was "${OLD_TOKEN}"
        "#;
        let config = GatewayConfig::from_toml_str_with(content, |name| {
            (name == "TOKEN").then(|| "s3cret".to_string())
        })
        .unwrap();

        assert_eq!(
            config.delivery_config().unwrap().auth_token.as_deref(),
            Some("s3cret")
        );
    }

    #[rstest]
    #[case::basic("a = \"#${X}\"", "a = \"#1\"")]
    #[case::literal("a = '#${X}'", "a = '#1'")]
    #[case::escaped_quote("a = \"\\\"#${X}\"", "a = \"\\\"#1\"")]
    #[case::multi_line("a = \"\"\"\n# ${X}\n\"\"\"", "a = \"\"\"\n# 1\n\"\"\"")]
    #[case::after_string("a = \"${X}\" # ${Y}", "a = \"1\" # ${Y}")]
    fn test_hash_inside_strings_is_not_a_comment(#[case] content: &str, #[case] expected: &str) {
        let lookup = |name: &str| (name == "X").then(|| "1".to_string());
        assert_eq!(substitute_env_vars_with(content, lookup).unwrap(), expected);
    }

    #[test]
    fn test_empty_token_means_no_auth() {
        let config = parse(&format!("{MINIMAL}\nauth_token = \"  \"")).unwrap();
        assert!(config.delivery_config().unwrap().auth_token.is_none());
    }

    #[test]
    fn test_full_update_section() {
        let config = parse(&format!(
            r#"{MINIMAL}
            [update]
            enabled = true
            repository = "acme/gate-scripts"
            branch = "stable"
            install_dir = "/opt/cardgate"
            check_interval_secs = 120
            "#
        ))
        .unwrap();

        let update = config.update_config().unwrap().unwrap();
        assert_eq!(update.repository, "acme/gate-scripts");
        assert_eq!(update.branch, "stable");
        assert_eq!(update.api_base.as_str(), "https://api.github.com/");
        assert_eq!(update.marker_path, PathBuf::from("/opt/cardgate/.version"));
        assert_eq!(update.check_interval, Duration::from_secs(120));
    }

    #[rstest]
    #[case::missing_endpoint("device_id = \"gate-01\"")]
    #[case::missing_device("endpoint = \"https://c.example.com\"")]
    #[case::not_toml("endpoint = ")]
    fn test_parse_errors(#[case] content: &str) {
        assert!(matches!(parse(content), Err(ConfigError::Parse(_))));
    }

    #[rstest]
    #[case::relative_endpoint("endpoint = \"collector/scans\"\ndevice_id = \"g\"", "endpoint")]
    #[case::ftp_endpoint("endpoint = \"ftp://c.example.com\"\ndevice_id = \"g\"", "endpoint")]
    #[case::blank_device("endpoint = \"https://c.example.com\"\ndevice_id = \"  \"", "device_id")]
    #[case::zero_retries(&format!("{MINIMAL}\nsend_retries = 0"), "send_retries")]
    #[case::zero_baud(&format!("{MINIMAL}\nbaud_rate = 0"), "baud_rate")]
    #[case::zero_reconnect(&format!("{MINIMAL}\nreconnect_interval_ms = 0"), "reconnect_interval_ms")]
    #[case::long_vendor(&format!("{MINIMAL}\nvendor_id = \"12345\""), "vendor_id")]
    #[case::non_hex_product(&format!("{MINIMAL}\nproduct_id = \"60zz\""), "product_id")]
    #[case::bad_prefix(&format!("{MINIMAL}\nissuer_prefix = \"60177\""), "issuer_prefix")]
    #[case::update_without_repo(&format!("{MINIMAL}\n[update]\nenabled = true\ninstall_dir = \"/opt\""), "update.repository")]
    #[case::update_bad_repo(&format!("{MINIMAL}\n[update]\nenabled = true\nrepository = \"acme\"\ninstall_dir = \"/opt\""), "update.repository")]
    #[case::update_without_dir(&format!("{MINIMAL}\n[update]\nenabled = true\nrepository = \"acme/gate\""), "update.install_dir")]
    fn test_validation_errors(#[case] content: &str, #[case] expected_field: &str) {
        match parse(content) {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected invalid {expected_field}, got {other:?}"),
        }
    }

    #[rstest]
    #[case("0403")]
    #[case("0x0403")]
    #[case("6001")]
    #[case("a")]
    fn test_accepts_usb_ids(#[case] id: &str) {
        assert!(validate_usb_id("vendor_id", Some(id)).is_ok());
    }

    #[test]
    fn test_disabled_update_section_is_not_checked() {
        let config = parse(&format!("{MINIMAL}\n[update]\nrepository = \"not a slug\"")).unwrap();
        assert!(config.update_config().unwrap().is_none());
    }
}
