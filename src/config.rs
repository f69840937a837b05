use crate::call::ivr::{default_departments, validate_departments, Department, MenuPrompt};
use anyhow::{anyhow, bail, Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr};
use url::Url;

pub const API_KEY_PREFIX: &str = "KEY";
pub const ENV_API_KEY: &str = "TELNYX_API_KEY";
pub const ENV_PORT: &str = "PORT";
pub const ENV_DEBUG: &str = "DEBUG";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub http_addr: String,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub debug: bool,
    pub platform: PlatformConfig,
    pub menu: MenuPrompt,
    pub departments: Vec<Department>,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub api_base: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn redact(key: &str) -> String {
    let key = key.trim();
    if key.chars().count() <= API_KEY_PREFIX.len() {
        return "***".to_string();
    }
    let prefix: String = key.chars().take(API_KEY_PREFIX.len()).collect();
    format!("{}***", prefix)
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telnyx.com/v2".to_string(),
            api_key: String::new(),
            timeout_secs: 8,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:5000".to_string(),
            log_level: Some("info".to_string()),
            log_file: None,
            debug: false,
            platform: PlatformConfig::default(),
            menu: MenuPrompt::default(),
            departments: default_departments(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }

    /// Applies `TELNYX_API_KEY`, `PORT` and `DEBUG` from the process
    /// environment on top of the file values.
    pub fn with_env(self) -> Result<Self> {
        self.with_env_from(|name| std::env::var(name).ok())
    }

    pub fn with_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.platform.api_key = key.trim().to_string();
        }
        if let Some(port) = lookup(ENV_PORT) {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|e| anyhow!("invalid {}={}: {}", ENV_PORT, port, e))?;
            let mut addr = self.socket_addr()?;
            addr.set_port(port);
            self.http_addr = addr.to_string();
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            self.debug = debug.trim().eq_ignore_ascii_case("true");
        }
        Ok(self)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.http_addr
            .parse()
            .map_err(|e| anyhow!("invalid http_addr {}: {}", self.http_addr, e))
    }

    /// Effective log level: `debug` wins over `log_level`.
    pub fn effective_log_level(&self) -> Option<&str> {
        if self.debug {
            Some("debug")
        } else {
            self.log_level.as_deref()
        }
    }

    /// Every problem found in the configuration, keyed by the offending field.
    pub fn issues(&self) -> Vec<(&'static str, String)> {
        let mut issues = Vec::new();
        if let Err(e) = validate_api_key(&self.platform.api_key) {
            issues.push(("platform.api_key", e.to_string()));
        }
        if let Err(e) = self.socket_addr() {
            issues.push(("http_addr", e.to_string()));
        }
        match Url::parse(&self.platform.api_base) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => issues.push((
                "platform.api_base",
                format!("unsupported scheme {}, expected http(s)", url.scheme()),
            )),
            Err(e) => issues.push((
                "platform.api_base",
                format!("invalid url {}: {}", self.platform.api_base, e),
            )),
        }
        if self.platform.timeout_secs == 0 {
            issues.push((
                "platform.timeout_secs",
                "must be greater than zero".to_string(),
            ));
        }
        if let Err(e) = validate_departments(&self.departments) {
            issues.push(("departments", e.to_string()));
        }
        issues
    }

    pub fn validate(&self) -> Result<()> {
        match self.issues().into_iter().next() {
            Some((field, message)) => bail!("{}: {}", field, message),
            None => Ok(()),
        }
    }
}

pub fn validate_api_key(key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        bail!("api key is missing, set {}={}...", ENV_API_KEY, API_KEY_PREFIX);
    }
    if !key.starts_with(API_KEY_PREFIX) {
        bail!(
            "api key does not look like a platform key, it must start with {}",
            API_KEY_PREFIX
        );
    }
    Ok(())
}
