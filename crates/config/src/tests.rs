use std::io::Write;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn empty_file_yields_defaults() {
	let config = Config::parse("").unwrap();
	assert_eq!(config, Config::default());
	assert_eq!(config.sync_debounce(), Duration::from_millis(1500));
	assert_eq!(config.min_version_interval(), Duration::from_secs(30));
	assert_eq!(config.channel_config(), ChannelConfig::default());
	assert_eq!(config.autosave_config(), AutosaveConfig::default());
}

#[test]
fn partial_sections_keep_other_defaults() {
	let config = Config::parse(
		r#"
		[sync]
		vendor = "rockwell"
		max_reconnect_attempts = 5
		backoff_max_ms = 8000

		[versions]
		min_interval_secs = 0
		"#,
	)
	.unwrap();

	assert_eq!(config.sync.vendor.as_deref(), Some("rockwell"));
	assert_eq!(config.sync.debounce_ms, 1500);
	let channel = config.channel_config();
	assert_eq!(channel.retry.max_attempts, Some(5));
	assert_eq!(channel.retry.backoff, Backoff::new(Duration::from_secs(1), Duration::from_secs(8)));
	assert_eq!(config.min_version_interval(), Duration::ZERO);
	assert_eq!(config.api, ApiSection::default());
}

#[test]
fn zero_reconnect_cap_is_unlimited() {
	let config = Config::parse("[sync]\nmax_reconnect_attempts = 0\n").unwrap();
	assert_eq!(config.channel_config().retry.max_attempts, None);
}

#[test]
fn zero_timers_are_rejected() {
	let err = Config::parse("[autosave]\ndebounce_ms = 0\n").unwrap_err();
	assert!(matches!(&err, ConfigError::Invalid(msg) if msg.contains("autosave.debounce_ms")), "{err}");

	let err = Config::parse("[sync]\npong_timeout_ms = 0\n").unwrap_err();
	assert!(matches!(&err, ConfigError::Invalid(msg) if msg.contains("sync.pong_timeout_ms")), "{err}");
}

#[test]
fn inverted_backoff_is_rejected() {
	let err = Config::parse("[sync]\nbackoff_base_ms = 5000\nbackoff_max_ms = 1000\n").unwrap_err();
	assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn sync_url_must_be_a_websocket() {
	let err = Config::parse("[sync]\nurl = \"http://localhost/ws\"\n").unwrap_err();
	assert!(matches!(&err, ConfigError::Invalid(msg) if msg.contains("ws or wss")), "{err}");

	let err = Config::parse("[api]\nbase_url = \"not a url\"\n").unwrap_err();
	assert!(matches!(&err, ConfigError::Invalid(msg) if msg.starts_with("api.base_url")), "{err}");
}

#[test]
fn unknown_fields_and_bad_types_fail_to_parse() {
	assert!(matches!(Config::parse("[sync]\ntoken = \"secret\"\n"), Err(ConfigError::Parse(_))));
	assert!(matches!(Config::parse("[sync]\ndebounce_ms = \"fast\"\n"), Err(ConfigError::Parse(_))));
}

#[test]
fn fallback_dir_expands_home() {
	let config = Config::parse("[autosave]\nfallback_dir = \"/var/lib/pandaura\"\n").unwrap();
	assert_eq!(config.fallback_dir(), Some(PathBuf::from("/var/lib/pandaura")));

	let config = Config::parse("[autosave]\nfallback_dir = \"~/.cache/pandaura\"\n").unwrap();
	if let Some(home) = dirs::home_dir() {
		assert_eq!(config.fallback_dir(), Some(home.join(".cache/pandaura")));
	}
	assert_eq!(Config::default().fallback_dir(), None);
}

#[test]
fn load_reads_file() {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	writeln!(file, "[api]\nbase_url = \"https://plc.example.com/api\"").unwrap();

	let config = Config::load(file.path()).unwrap();
	assert_eq!(config.api_base_url().unwrap().as_str(), "https://plc.example.com/api");
}

#[test]
fn explicit_missing_path_is_an_error() {
	let dir = tempfile::tempdir().unwrap();
	let missing = dir.path().join("nope.toml");
	let err = Config::discover(Some(&missing)).unwrap_err();
	assert!(matches!(err, ConfigError::Io { path, .. } if path == missing));
}
