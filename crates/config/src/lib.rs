//! Configuration loading for pandaura.
//!
//! Configuration is a single TOML file. Every field is optional; missing
//! fields take the defaults below. Credentials never live in the file.
//!
//! ```toml
//! [sync]
//! url = "ws://localhost:5000/ws/tags"
//! vendor = "siemens"
//! debounce_ms = 1500
//! max_reconnect_attempts = 0     # 0 = unlimited
//!
//! [autosave]
//! debounce_ms = 1000
//! fallback_dir = "~/.cache/pandaura"
//!
//! [versions]
//! min_interval_secs = 30
//!
//! [api]
//! base_url = "http://localhost:5000/api"
//! ```

mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use error::{ConfigError, Result};
use pandaura_state::AutosaveConfig;
use pandaura_sync::ChannelConfig;
use pandaura_worker::{Backoff, RetryPolicy};
use serde::Deserialize;
use url::Url;

/// File name looked up inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Parsed configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub sync: SyncSection,
	pub autosave: AutosaveSection,
	pub versions: VersionsSection,
	pub api: ApiSection,
}

/// `[sync]`: the live tag channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
	pub url: String,
	/// Stamped onto every extracted tag.
	pub vendor: Option<String>,
	pub debounce_ms: u64,
	pub connect_timeout_ms: u64,
	pub ping_interval_ms: u64,
	pub pong_timeout_ms: u64,
	pub backoff_base_ms: u64,
	pub backoff_max_ms: u64,
	/// `0` retries forever.
	pub max_reconnect_attempts: u32,
}

impl Default for SyncSection {
	fn default() -> Self {
		Self {
			url: "ws://localhost:5000/ws/tags".into(),
			vendor: None,
			debounce_ms: 1500,
			connect_timeout_ms: 10_000,
			ping_interval_ms: 25_000,
			pong_timeout_ms: 10_000,
			backoff_base_ms: 1000,
			backoff_max_ms: 30_000,
			max_reconnect_attempts: 0,
		}
	}
}

/// `[autosave]`: debounced module persistence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutosaveSection {
	pub debounce_ms: u64,
	pub close_flush_timeout_ms: u64,
	/// Directory for the local fallback store. Unset disables it.
	pub fallback_dir: Option<PathBuf>,
}

impl Default for AutosaveSection {
	fn default() -> Self {
		Self {
			debounce_ms: 1000,
			close_flush_timeout_ms: 2000,
			fallback_dir: None,
		}
	}
}

/// `[versions]`: version history throttling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersionsSection {
	pub min_interval_secs: u64,
}

impl Default for VersionsSection {
	fn default() -> Self {
		Self { min_interval_secs: 30 }
	}
}

/// `[api]`: the HTTP project and version API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSection {
	pub base_url: String,
}

impl Default for ApiSection {
	fn default() -> Self {
		Self {
			base_url: "http://localhost:5000/api".into(),
		}
	}
}

impl Config {
	/// Parse and validate a TOML string.
	pub fn parse(input: &str) -> Result<Self> {
		let config: Config = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Load configuration from a file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
			path: path.to_path_buf(),
			error: e,
		})?;
		Self::parse(&content)
	}

	/// Loads `explicit` if given, else the platform config file if it
	/// exists, else the defaults.
	///
	/// An explicit path that cannot be read is an error; a missing default
	/// file is not.
	pub fn discover(explicit: Option<&Path>) -> Result<Self> {
		if let Some(path) = explicit {
			return Self::load(path);
		}
		match default_path() {
			Some(path) if path.is_file() => Self::load(path),
			_ => Ok(Self::default()),
		}
	}

	/// Rejects values that would stall timers or invert the backoff range.
	pub fn validate(&self) -> Result<()> {
		let nonzero = [
			("sync.debounce_ms", self.sync.debounce_ms),
			("sync.connect_timeout_ms", self.sync.connect_timeout_ms),
			("sync.ping_interval_ms", self.sync.ping_interval_ms),
			("sync.pong_timeout_ms", self.sync.pong_timeout_ms),
			("sync.backoff_base_ms", self.sync.backoff_base_ms),
			("autosave.debounce_ms", self.autosave.debounce_ms),
			("autosave.close_flush_timeout_ms", self.autosave.close_flush_timeout_ms),
		];
		if let Some((field, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
			return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
		}
		if self.sync.backoff_base_ms > self.sync.backoff_max_ms {
			return Err(ConfigError::Invalid(format!(
				"sync.backoff_base_ms ({}) exceeds sync.backoff_max_ms ({})",
				self.sync.backoff_base_ms, self.sync.backoff_max_ms
			)));
		}
		let sync_url = self.sync_url()?;
		if !matches!(sync_url.scheme(), "ws" | "wss") {
			return Err(ConfigError::Invalid(format!("sync.url must use ws or wss, got {}", sync_url.scheme())));
		}
		self.api_base_url()?;
		Ok(())
	}

	pub fn sync_url(&self) -> Result<Url> {
		parse_url("sync.url", &self.sync.url)
	}

	pub fn api_base_url(&self) -> Result<Url> {
		parse_url("api.base_url", &self.api.base_url)
	}

	pub fn sync_debounce(&self) -> Duration {
		Duration::from_millis(self.sync.debounce_ms)
	}

	pub fn channel_config(&self) -> ChannelConfig {
		let sync = &self.sync;
		ChannelConfig {
			connect_timeout: Duration::from_millis(sync.connect_timeout_ms),
			ping_interval: Duration::from_millis(sync.ping_interval_ms),
			pong_timeout: Duration::from_millis(sync.pong_timeout_ms),
			retry: RetryPolicy {
				backoff: Backoff::new(Duration::from_millis(sync.backoff_base_ms), Duration::from_millis(sync.backoff_max_ms)),
				max_attempts: (sync.max_reconnect_attempts > 0).then_some(sync.max_reconnect_attempts),
			},
		}
	}

	pub fn autosave_config(&self) -> AutosaveConfig {
		AutosaveConfig {
			debounce: Duration::from_millis(self.autosave.debounce_ms),
			close_flush_timeout: Duration::from_millis(self.autosave.close_flush_timeout_ms),
		}
	}

	pub fn min_version_interval(&self) -> Duration {
		Duration::from_secs(self.versions.min_interval_secs)
	}

	/// The fallback store directory with a leading `~` expanded.
	pub fn fallback_dir(&self) -> Option<PathBuf> {
		self.autosave.fallback_dir.as_deref().map(expand_home)
	}
}

/// `$XDG_CONFIG_HOME/pandaura/config.toml` or the platform equivalent.
pub fn default_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("pandaura").join(CONFIG_FILE_NAME))
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
	Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{field}: {e}")))
}

fn expand_home(path: &Path) -> PathBuf {
	match path.strip_prefix("~") {
		Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
		Err(_) => path.to_path_buf(),
	}
}

#[cfg(test)]
mod tests;
