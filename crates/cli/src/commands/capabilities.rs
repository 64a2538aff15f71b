//! `dapmux capabilities`: resolve host features for a version.

use std::io::{self, Write};

use colored::Colorize;
use dapmux::HostCapabilities;
use dapmux::capabilities::{SESSION_HIERARCHY_MIN_VERSION, SESSION_RENAME_MIN_VERSION};
use serde::Serialize;

use crate::cli::CapabilitiesArgs;
use crate::output::TextRender;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesReport {
	pub version: String,
	pub session_hierarchy: bool,
	pub session_rename: bool,
}

pub fn run(args: CapabilitiesArgs) -> CapabilitiesReport {
	let caps = HostCapabilities::resolve(&args.version);
	CapabilitiesReport {
		version: args.version,
		session_hierarchy: caps.session_hierarchy,
		session_rename: caps.session_rename,
	}
}

fn mark(enabled: bool) -> colored::ColoredString {
	if enabled { "yes".green() } else { "no".yellow() }
}

impl TextRender for CapabilitiesReport {
	fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
		writeln!(out, "Host {}", self.version.bold())?;
		writeln!(
			out,
			"  session hierarchy (>= {SESSION_HIERARCHY_MIN_VERSION}): {}",
			mark(self.session_hierarchy)
		)?;
		writeln!(out, "  session rename    (>= {SESSION_RENAME_MIN_VERSION}): {}", mark(self.session_rename))
	}
}
