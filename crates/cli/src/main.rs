use clap::Parser;
use dapmux_cli::cli::Cli;
use dapmux_cli::commands;
use dapmux_cli::logging;
use dapmux_cli::output::{self, OutputFormat, ResultBuilder};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = cli.command.name();

	if let Err(err) = commands::dispatch(cli, format).await {
		handle_error(command, &err, format);
		std::process::exit(1);
	}
}

fn handle_error(command: &str, err: &anyhow::Error, format: OutputFormat) {
	let result: output::CommandResult<()> = ResultBuilder::new(command).error(commands::error_code(err), format!("{err:#}")).build();

	// Humans read stderr; agents parse the JSON envelope on stdout.
	if let Some(ref error) = result.error {
		output::print_error_stderr(error);
	}
	if format == OutputFormat::Json {
		output::print_result(&result, format);
	}
}
