use std::path::PathBuf;

use clap::Parser;

use super::*;

#[test]
fn parse_simulate_command() {
	let args = vec!["dapmux", "simulate", "--scenario", "/tmp/scenario.json", "--deferred"];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Simulate(args) => {
			assert_eq!(args.scenario, PathBuf::from("/tmp/scenario.json"));
			assert!(args.deferred);
			assert_eq!(args.host_version, None);
			assert_eq!(args.settle_timeout_ms, 5000);
		}
		_ => panic!("Expected Simulate command"),
	}
}

#[test]
fn parse_simulate_requires_scenario() {
	let args = vec!["dapmux", "simulate"];
	assert!(Cli::try_parse_from(args).is_err());
}

#[test]
fn parse_global_flags_after_subcommand() {
	let args = vec!["dapmux", "capabilities", "1.49.0", "-vv", "-f", "json"];
	let cli = Cli::try_parse_from(args).unwrap();

	assert_eq!(cli.verbose, 2);
	assert_eq!(cli.format, OutputFormat::Json);
	match cli.command {
		Commands::Capabilities(args) => assert_eq!(args.version, "1.49.0"),
		_ => panic!("Expected Capabilities command"),
	}
}

#[test]
fn default_format_is_text() {
	let cli = Cli::try_parse_from(["dapmux", "capabilities", "1.0.0"]).unwrap();
	assert_eq!(cli.format, OutputFormat::Text);
	assert_eq!(cli.verbose, 0);
}

#[test]
fn unknown_format_is_rejected() {
	let args = vec!["dapmux", "-f", "yaml", "capabilities", "1.0.0"];
	assert!(Cli::try_parse_from(args).is_err());
}
