//! Build log scanning.
//!
//! The runtime streams the build log in chunks of one or more lines. Each
//! line is logged as it arrives and checked for the canonical
//! `Successfully built <id>` marker; the last marker wins.

use std::sync::LazyLock;

use regex::Regex;
use rocked_common::error::Result;
use rocked_common::types::ImageId;

static BUILT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Successfully\sbuilt\s(.*)").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Result of consuming a build log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Image id from the last marker, if any was seen.
    pub image_id: Option<ImageId>,
    /// Every line of the log, newline-terminated.
    pub log: String,
}

/// Returns the image id announced by a single log line, if any.
#[must_use]
pub fn parse_marker(line: &str) -> Option<ImageId> {
    BUILT_MARKER
        .captures(line)
        .map(|caps| ImageId::new(caps[1].trim()))
        .filter(|id| !id.is_empty())
}

/// Consumes a chunk stream to exhaustion.
///
/// # Errors
///
/// Returns the first error the stream yields.
pub fn scan<I>(chunks: I) -> Result<BuildOutcome>
where
    I: IntoIterator<Item = Result<String>>,
{
    let mut outcome = BuildOutcome::default();
    for chunk in chunks {
        let chunk = chunk?;
        for line in chunk.trim_end_matches('\n').lines() {
            tracing::info!(target: "rocked::build", "{line}");
            outcome.log.push_str(line);
            outcome.log.push('\n');
            if let Some(id) = parse_marker(line) {
                outcome.image_id = Some(id);
            }
        }
    }
    Ok(outcome)
}
