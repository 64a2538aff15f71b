use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs the stderr subscriber. `RUST_LOG` overrides `verbosity`.
pub fn init_logging(verbosity: u8) {
	// 0 = warnings only; host chatter stays quiet
	// 1 (-v) = session lifecycle
	// 2+ (-vv) = registry and transport detail
	let filter = match verbosity {
		0 => "warn,dapmux.host=off",
		1 => "info,dapmux.transport=warn",
		_ => "debug",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
