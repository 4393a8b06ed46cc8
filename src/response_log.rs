//! The response log: the last answer's trace as `response.json`.

use std::path::{Path, PathBuf};

use ragtrace_core::pipeline::ResponseTrace;
use ragtrace_core::Result;
use serde::Serialize;
use tracing::info;

/// File name written inside the output directory.
pub const RESPONSE_FILE: &str = "response.json";

/// Serialize `trace` as JSON indented with four spaces.
pub fn render_trace(trace: &ResponseTrace) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    trace.serialize(&mut serializer)?;
    // serde_json only emits valid UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write `trace` to `<dir>/response.json`, creating `dir` if needed.
///
/// Overwrites any previous log. Returns the written path.
pub fn save_response(trace: &ResponseTrace, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(RESPONSE_FILE);
    std::fs::write(&path, render_trace(trace)?)?;
    info!(path = %path.display(), "saved response log");
    Ok(path)
}
