//! Configuration from environment variables and curio.yml.
//!
//! **Environment variables:**
//! - `HOST`: bind address (default: 0.0.0.0)
//! - `PORT`: server port (default: 3000)
//! - `CURSOR_URL`: upstream chat endpoint
//! - `CURSOR_CHECKSUM`: fixed checksum used instead of deriving one per request
//! - `CURSOR_CLIENT_VERSION`: value of `x-cursor-client-version` (default: 0.42.3)
//! - `CURSOR_TIMEZONE`: value of `x-cursor-timezone` (default: Asia/Shanghai)
//! - `CONNECT_TIMEOUT_SECS`: upstream connect timeout (default: 10)
//!
//! A YAML file may override any of these under a `gateway:` key:
//!
//! ```yaml
//! gateway:
//!   port: 3000
//!   cursor_url: "https://api2.cursor.sh/aiserver.v1.AiService/StreamChat"
//!   checksum: "${CURSOR_CHECKSUM}"
//! ```
//!
//! `$VAR` and `${VAR}` references inside string values are expanded.

use anyhow::{Context, Result};
use curio_cursor::{CursorClientConfig, DEFAULT_CLIENT_VERSION, DEFAULT_CURSOR_URL, DEFAULT_TIMEZONE};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub cursor_url: String,
    pub checksum_override: Option<String>,
    pub client_version: String,
    pub timezone: String,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
struct CurioYamlConfig {
    #[serde(default)]
    gateway: GatewaySection,
}

#[derive(Debug, Default, Deserialize)]
struct GatewaySection {
    host: Option<String>,
    port: Option<u16>,
    cursor_url: Option<String>,
    checksum: Option<String>,
    client_version: Option<String>,
    timezone: Option<String>,
    connect_timeout_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            cursor_url: env::var("CURSOR_URL").unwrap_or_else(|_| DEFAULT_CURSOR_URL.to_string()),
            checksum_override: env::var("CURSOR_CHECKSUM").ok().filter(|c| !c.is_empty()),
            client_version: env::var("CURSOR_CLIENT_VERSION")
                .unwrap_or_else(|_| DEFAULT_CLIENT_VERSION.to_string()),
            timezone: env::var("CURSOR_TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string()),
            connect_timeout_secs: env::var("CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10),
        }
    }
}

impl GatewayConfig {
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read curio.yml from {:?}", path))?;
        Self::from_yaml_str(&content)
    }

    /// Layer a YAML document over the environment defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let yaml: CurioYamlConfig =
            serde_yaml_ng::from_str(content).with_context(|| "Failed to parse curio.yml")?;
        let section = yaml.gateway;
        let defaults = Self::default();
        let expand = |v: Option<String>| v.map(|s| expand_env_string(&s));

        Ok(Self {
            host: expand(section.host).unwrap_or(defaults.host),
            port: section.port.unwrap_or(defaults.port),
            cursor_url: expand(section.cursor_url).unwrap_or(defaults.cursor_url),
            checksum_override: expand(section.checksum)
                .filter(|c| !c.is_empty())
                .or(defaults.checksum_override),
            client_version: expand(section.client_version).unwrap_or(defaults.client_version),
            timezone: expand(section.timezone).unwrap_or(defaults.timezone),
            connect_timeout_secs: section
                .connect_timeout_secs
                .unwrap_or(defaults.connect_timeout_secs),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client_config(&self) -> CursorClientConfig {
        CursorClientConfig {
            url: self.cursor_url.clone(),
            checksum_override: self.checksum_override.clone(),
            client_version: self.client_version.clone(),
            timezone: self.timezone.clone(),
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}

/// Expand `$VAR` and `${VAR}`; unknown variables are left as written.
fn expand_env_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next();
            let var_name: String = chars.by_ref().take_while(|&c| c != '}').collect();
            match env::var(&var_name) {
                Ok(value) => result.push_str(&value),
                Err(_) => {
                    result.push_str("${");
                    result.push_str(&var_name);
                    result.push('}');
                }
            }
        } else {
            let mut var_name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    var_name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            match env::var(&var_name) {
                Ok(value) if !var_name.is_empty() => result.push_str(&value),
                _ => {
                    result.push('$');
                    result.push_str(&var_name);
                }
            }
        }
    }

    result
}
