//! Service configuration.
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! yields a working single-listener service.

use std::fmt;
use std::fs;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::Level;
use url::{Host, Url};

use crate::http::connection::{BufferLimits, ConnectionOptions};
use crate::server::slots::MAX_LISTENERS;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_ENV: &str = "CONNSLOT_CONFIG";

/// Environment variable overriding `listen` (comma separated).
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Number of connection slots.
    pub slots: usize,
    /// Listen URLs: `tcp://HOST:PORT` or `unix:///path`.
    pub listen: Vec<String>,
    pub idle_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub keep_alive: bool,
    /// Add `x-slot` / `x-open` headers to every reply.
    pub slot_headers: bool,
    pub log_level: String,
    pub request_buffer: BufferConfig,
    pub reply_header_buffer: BufferConfig,
    pub body_cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    pub initial: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Regeneration interval; expiry is aligned to multiples of it.
    pub interval_secs: u64,
    pub initial: usize,
    pub max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slots: 5,
            listen: vec!["tcp://[::]:8080".to_string()],
            idle_timeout_secs: 60,
            poll_interval_secs: 5,
            keep_alive: true,
            slot_headers: true,
            log_level: "info".to_string(),
            request_buffer: BufferConfig::default(),
            reply_header_buffer: BufferConfig::default(),
            body_cache: CacheConfig::default(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            initial: 48,
            max: 1000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            initial: 1000,
            max: 200_000,
        }
    }
}

impl From<BufferConfig> for BufferLimits {
    fn from(config: BufferConfig) -> Self {
        BufferLimits::new(config.initial, config.max)
    }
}

impl CacheConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn limits(&self) -> BufferLimits {
        BufferLimits::new(self.initial, self.max)
    }
}

/// A parsed listen URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Local(PathBuf),
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Tcp(addr) => write!(f, "tcp://{}", addr),
            ListenAddr::Local(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl FromStr for ListenAddr {
    type Err = anyhow::Error;

    /// Accepts `tcp://HOST:PORT`, `unix:///path` and a bare `IP:PORT`.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(ListenAddr::Tcp(addr));
        }

        let url = Url::parse(s).with_context(|| format!("invalid listen URL {:?}", s))?;
        match url.scheme() {
            "tcp" => {
                let port = url
                    .port()
                    .with_context(|| format!("listen URL {:?} has no port", s))?;
                let addr = match url.host() {
                    Some(Host::Ipv4(ip)) => SocketAddr::new(IpAddr::V4(ip), port),
                    Some(Host::Ipv6(ip)) => SocketAddr::new(IpAddr::V6(ip), port),
                    Some(Host::Domain(name)) => (name, port)
                        .to_socket_addrs()
                        .with_context(|| format!("cannot resolve {:?}", name))?
                        .next()
                        .with_context(|| format!("{:?} resolved to no address", name))?,
                    None => bail!("listen URL {:?} has no host", s),
                };
                Ok(ListenAddr::Tcp(addr))
            }
            "unix" => {
                if url.path().is_empty() || url.path() == "/" {
                    bail!("listen URL {:?} has no socket path", s);
                }
                Ok(ListenAddr::Local(PathBuf::from(url.path())))
            }
            other => bail!("unsupported listen scheme {:?} in {:?}", other, s),
        }
    }
}

impl Config {
    /// Loads the file named by `CONNSLOT_CONFIG` (defaults when unset) and
    /// applies the `LISTEN` override.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Ok(listen) = std::env::var(LISTEN_ENV) {
            config.listen = listen
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slots == 0 {
            bail!("slots must be at least 1");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        if self.listen.is_empty() || self.listen.len() > MAX_LISTENERS {
            bail!(
                "between 1 and {} listen addresses required, got {}",
                MAX_LISTENERS,
                self.listen.len()
            );
        }
        for (name, initial, max) in [
            ("request_buffer", self.request_buffer.initial, self.request_buffer.max),
            (
                "reply_header_buffer",
                self.reply_header_buffer.initial,
                self.reply_header_buffer.max,
            ),
            ("body_cache", self.body_cache.initial, self.body_cache.max),
        ] {
            if initial == 0 || initial > max {
                bail!("{}: need 0 < initial <= max, got {}/{}", name, initial, max);
            }
        }
        self.log_level()?;
        Ok(())
    }

    pub fn listeners(&self) -> Result<Vec<ListenAddr>> {
        self.listen.iter().map(|s| s.parse()).collect()
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            request: self.request_buffer.into(),
            reply_header: self.reply_header_buffer.into(),
            keep_alive: self.keep_alive,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn log_level(&self) -> Result<Level> {
        Level::from_str(&self.log_level)
            .map_err(|_| anyhow::anyhow!("unknown log level {:?}", self.log_level))
    }
}
