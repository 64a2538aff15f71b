use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[cfg(test)]
mod tests;

fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(name = "dapmux")]
#[command(about = "Debug session orchestration for multi-target programs")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: text (default) or json
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Replay a target discovery scenario against an in-process host
	Simulate(SimulateArgs),

	/// Show which host features a host version enables
	Capabilities(CapabilitiesArgs),
}

#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
	/// Scenario file (JSON)
	#[arg(short, long, value_name = "FILE")]
	pub scenario: PathBuf,

	/// Override the host version from the scenario
	#[arg(long, value_name = "VERSION")]
	pub host_version: Option<String>,

	/// Defer host session starts until a flush step
	#[arg(long)]
	pub deferred: bool,

	/// How long to wait for outstanding requests at the end, in milliseconds
	#[arg(long, value_name = "MS", default_value_t = 5000)]
	pub settle_timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
pub struct CapabilitiesArgs {
	/// Host version (semver)
	pub version: String,
}
