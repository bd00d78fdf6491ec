use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pandaura_primitives::{ModuleId, ProjectId, VersionNumber};

#[derive(Parser, Debug)]
#[command(name = "pandaura")]
#[command(about = "PLC tag sync and project version history")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Configuration file (defaults to the platform config directory)
	#[arg(short, long, value_name = "PATH", global = true)]
	pub config: Option<PathBuf>,

	/// API token for the sync socket and the project API
	#[arg(long, env = "PANDAURA_TOKEN", hide_env_values = true, global = true)]
	pub token: Option<String>,

	/// Verbose logging
	#[arg(short, long, global = true)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
	/// Print the tags declared in a structured-text file as JSON
	Extract {
		file: PathBuf,
		/// Vendor stamped onto every tag (overrides the config file)
		#[arg(long)]
		vendor: Option<String>,
	},
	/// Print structured-text declarations for a JSON tag list
	Generate { tags: PathBuf },
	/// Push a file to the live tag channel and print the server's tag list
	Sync {
		#[command(flatten)]
		project: ProjectArg,
		file: PathBuf,
		/// How long to wait for the server's tag list
		#[arg(long, default_value_t = 15, value_name = "SECS")]
		wait: u64,
	},
	/// Merge JSON into one module's live state and save it
	State {
		#[command(flatten)]
		project: ProjectArg,
		/// Module owning the state
		#[arg(long, default_value = ModuleId::LOGIC_STUDIO)]
		module: String,
		/// JSON object merged into the module's state
		partial: PathBuf,
	},
	/// Manage project versions
	Versions {
		#[command(flatten)]
		project: ProjectArg,
		#[command(subcommand)]
		action: VersionAction,
	},
}

#[derive(Args, Debug, Clone, Copy)]
pub struct ProjectArg {
	/// Project id
	#[arg(long = "project", short = 'p', value_parser = parse_project)]
	pub id: ProjectId,
}

/// Version subcommands.
#[derive(Subcommand, Debug)]
pub enum VersionAction {
	/// List versions, newest first
	List,
	/// Record a version
	Create {
		/// Version message
		#[arg(short, long)]
		message: String,
		/// Project state JSON to record (defaults to the live state)
		#[arg(long, value_name = "PATH")]
		state: Option<PathBuf>,
	},
	/// Restore a version as the live state
	Rollback {
		#[arg(value_parser = parse_version)]
		version: VersionNumber,
	},
	/// Delete a version
	Delete {
		#[arg(value_parser = parse_version)]
		version: VersionNumber,
	},
	/// Print a version's project state as JSON
	Show {
		#[arg(value_parser = parse_version)]
		version: VersionNumber,
	},
}

fn parse_project(raw: &str) -> Result<ProjectId, String> {
	raw.parse().map(ProjectId).map_err(|e| format!("invalid project id: {e}"))
}

/// Accepts `7` or `v7`.
fn parse_version(raw: &str) -> Result<VersionNumber, String> {
	let digits = raw.strip_prefix('v').unwrap_or(raw);
	match digits.parse() {
		Ok(0) => Err("version numbers start at 1".into()),
		Ok(n) => Ok(VersionNumber(n)),
		Err(e) => Err(format!("invalid version: {e}")),
	}
}
