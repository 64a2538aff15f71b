mod capabilities;
mod simulate;

pub use capabilities::CapabilitiesReport;
pub use simulate::{AcquireOutcome, SessionSummary, SimulationReport};

use anyhow::Result;

use crate::cli::{Cli, Commands};
use crate::output::{ErrorCode, OutputFormat, ResultBuilder, print_result};
use crate::scenario::ScenarioError;

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Simulate(_) => "simulate",
			Commands::Capabilities(_) => "capabilities",
		}
	}
}

/// Runs the selected command and prints its result.
pub async fn dispatch(cli: Cli, format: OutputFormat) -> Result<()> {
	let name = cli.command.name();
	match cli.command {
		Commands::Simulate(args) => {
			let report = simulate::run(args).await?;
			print_result(&ResultBuilder::new(name).data(report).build(), format);
		}
		Commands::Capabilities(args) => {
			let report = capabilities::run(args);
			print_result(&ResultBuilder::new(name).data(report).build(), format);
		}
	}
	Ok(())
}

/// Stable error code for a failed command.
pub fn error_code(err: &anyhow::Error) -> ErrorCode {
	if err.downcast_ref::<ScenarioError>().is_some() {
		ErrorCode::InvalidScenario
	} else if err.downcast_ref::<dapmux::Error>().is_some() {
		ErrorCode::SessionError
	} else {
		ErrorCode::InternalError
	}
}
