//! Pandaura command-line front door.
//!
//! Extracts and generates tag declarations offline, pushes a file through
//! the live tag channel, and manages project versions over the HTTP API.

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use pandaura_config::Config;
use pandaura_primitives::{ModuleId, ProjectId, ProjectState, Tag};
use pandaura_state::{AutosaveController, FileStore, HttpBackend, ModuleSession, ProjectBackend, ProjectEventBus, VersionControlManager};
use pandaura_sync::{Endpoint, SyncChannel, TagSyncController, WsConnector, spawn_tag_sync};
use pandaura_tags::{Extractor, generate_code};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Command, VersionAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	setup_tracing(cli.verbose);

	let config = Config::discover(cli.config.as_deref()).context("loading configuration")?;
	debug!(?config, "cli.config_loaded");

	match cli.command {
		Command::Extract { file, vendor } => extract(&config, &file, vendor),
		Command::Generate { tags } => generate(&tags),
		Command::Sync { project, file, wait } => sync(&config, cli.token, project.id, &file, Duration::from_secs(wait)).await,
		Command::State { project, module, partial } => save_state(&config, cli.token, project.id, ModuleId::new(module), &partial).await,
		Command::Versions { project, action } => versions(&config, cli.token, project.id, action).await,
	}
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_env("PANDAURA_LOG")
			.or_else(|_| EnvFilter::try_from_default_env())
			.unwrap_or_else(|_| {
				if verbose {
					EnvFilter::new("pandaura=debug,info")
				} else {
					EnvFilter::new("pandaura=info,warn")
				}
			})
	};

	if let Some(log_dir) = std::env::var("PANDAURA_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("pandaura.{}.log", std::process::id()));
		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false).with_target(true);
			tracing_subscriber::registry().with(filter()).with(file_layer).init();
			debug!(path = ?log_path, "cli.tracing_initialized");
			return;
		}
	}

	tracing_subscriber::fmt().with_env_filter(filter()).with_writer(std::io::stderr).init();
}

fn read(path: &Path) -> anyhow::Result<String> {
	std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn extractor(config: &Config, vendor: Option<String>) -> Extractor {
	match vendor.or_else(|| config.sync.vendor.clone()) {
		Some(vendor) => Extractor::new().with_vendor(vendor),
		None => Extractor::new(),
	}
}

fn extract(config: &Config, file: &Path, vendor: Option<String>) -> anyhow::Result<()> {
	let code = read(file)?;
	let tags = extractor(config, vendor)
		.extract(&code)
		.with_context(|| format!("extracting tags from {}", file.display()))?;
	print_json(&tags)
}

fn generate(path: &Path) -> anyhow::Result<()> {
	let tags: Vec<Tag> = serde_json::from_str(&read(path)?).with_context(|| format!("parsing tag list {}", path.display()))?;
	print!("{}", generate_code(&tags));
	Ok(())
}

async fn sync(config: &Config, token: Option<String>, project_id: ProjectId, file: &Path, wait: Duration) -> anyhow::Result<()> {
	let Some(token) = token else {
		bail!("the sync channel needs a token: pass --token or set PANDAURA_TOKEN");
	};
	let code = read(file)?;

	let endpoint = Endpoint::new(config.sync_url()?, project_id, token);
	let (channel, events) = SyncChannel::connect(Arc::new(WsConnector), endpoint, config.channel_config())
		.await
		.context("connecting to the sync channel")?;
	channel.subscribe(project_id)?;

	let controller = TagSyncController::new(project_id, extractor(config, None)).with_debounce(config.sync_debounce());
	let (handle, mut updates) = spawn_tag_sync(controller, channel, events);
	handle.edit(code)?;
	let decision = handle.flush().await?;
	debug!(%project_id, ?decision, "cli.sync_pushed");

	let applied = tokio::time::timeout(wait, updates.recv()).await;
	let status = handle.status();
	handle.shutdown().await;

	match applied {
		Ok(Some(applied)) => {
			info!(%project_id, tags = applied.tags.len(), parsed = applied.parsed_count, "cli.sync_complete");
			print_json(&applied.tags)
		}
		Ok(None) => bail!("sync channel stopped: {}", status.last_error.unwrap_or_else(|| "no reason given".into())),
		Err(_) => bail!("no tag list from the server within {}s", wait.as_secs()),
	}
}

fn http_backend(config: &Config, token: Option<String>) -> anyhow::Result<Arc<HttpBackend>> {
	Ok(Arc::new(HttpBackend::new(config.api_base_url()?, token)?))
}

async fn save_state(config: &Config, token: Option<String>, project_id: ProjectId, module: ModuleId, partial: &Path) -> anyhow::Result<()> {
	let partial: serde_json::Value = serde_json::from_str(&read(partial)?).context("parsing module state")?;
	if !partial.is_object() {
		bail!("module state must be a JSON object");
	}

	let backend = http_backend(config, token)?;
	let mut autosave = AutosaveController::new(project_id, module.clone(), backend.clone(), config.autosave_config());
	if let Some(dir) = config.fallback_dir() {
		let store = FileStore::open(dir.clone())
			.await
			.with_context(|| format!("opening fallback store {}", dir.display()))?;
		autosave = autosave.with_fallback(Arc::new(store));
	}

	let bus = ProjectEventBus::default();
	let mut session = ModuleSession::mount(autosave, backend, &bus).await?;
	session.autosave_mut().update_project_state(partial).await;
	if !session.unmount().await {
		warn!(%project_id, %module, "cli.state_not_saved");
		bail!("the save did not complete; unsaved state is kept in the fallback store if one is configured");
	}
	info!(%project_id, %module, "cli.state_saved");
	Ok(())
}

async fn versions(config: &Config, token: Option<String>, project_id: ProjectId, action: VersionAction) -> anyhow::Result<()> {
	let backend = http_backend(config, token)?;
	let mut manager = VersionControlManager::new(project_id, backend.clone(), ProjectEventBus::default()).with_min_interval(config.min_version_interval());

	match action {
		VersionAction::List => {
			for version in manager.refresh_history().await? {
				let kind = if version.is_auto { "auto" } else { "manual" };
				println!(
					"{:>6}  {}  {:<6}  {}",
					version.version_number.to_string(),
					version.created_at.format("%Y-%m-%d %H:%M:%S"),
					kind,
					version.message
				);
			}
		}
		VersionAction::Create { message, state } => {
			let state: ProjectState = match state {
				Some(path) => serde_json::from_str(&read(&path)?).with_context(|| format!("parsing project state {}", path.display()))?,
				None => backend.get_project_state(project_id).await?,
			};
			let version = manager.create_version(&message, &state).await?;
			println!("created {version}");
		}
		VersionAction::Rollback { version } => {
			let outcome = manager.rollback_to_version(version).await?;
			println!("rolled back to {}, recorded as {}", outcome.rolled_back_to, outcome.new_version);
		}
		VersionAction::Delete { version } => {
			manager.delete_version(version).await?;
			println!("deleted {version}");
		}
		VersionAction::Show { version } => print_json(&manager.get_version_data(version).await?)?,
	}
	Ok(())
}
