//! Console log tail extraction under a fixed transfer window.

use std::sync::OnceLock;

use buildwatch_client::{BuildRef, BuildTracker, Result};
use regex::Regex;

use crate::obs::emit_log_tail_fetched;

/// Bytes fetched from the end of the console log, whatever its size.
pub const LOG_WINDOW_BYTES: u64 = 2048;

fn markup() -> &'static Regex {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    MARKUP.get_or_init(|| Regex::new(r"<[^>]+>|\r").expect("constant pattern"))
}

/// Strip markup tags and carriage returns from one console line.
pub fn clean_line(raw: &[u8]) -> String {
    markup()
        .replace_all(&String::from_utf8_lossy(raw), "")
        .into_owned()
}

/// Last `line_count` lines of the console log of `job` at `build`, oldest
/// first.
///
/// Makes exactly one size probe and at most one content fetch. A log whose
/// last lines do not fit in [`LOG_WINDOW_BYTES`] yields fewer lines.
pub async fn tail_lines(
    tracker: &dyn BuildTracker,
    job: &str,
    build: &BuildRef,
    line_count: usize,
) -> Result<Vec<String>> {
    let total = tracker.console_size(job, build).await?;
    let offset = total.saturating_sub(LOG_WINDOW_BYTES);
    let window = tracker.console_from(job, build, offset).await?;

    let lines = parse_tail(&window, line_count, offset == 0);
    emit_log_tail_fetched(job, build, total, lines.len());
    Ok(lines)
}

/// Split the last `line_count` lines off `buf`, scanning backward.
///
/// The segment before the first newline is only a whole line when the
/// window starts at the beginning of the log; otherwise it is a fragment
/// and is dropped.
pub fn parse_tail(buf: &[u8], line_count: usize, starts_at_line_boundary: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if line_count == 0 {
        return lines;
    }

    let mut end = buf.len();
    if buf.last() == Some(&b'\n') {
        end -= 1;
    }

    let mut i = end;
    while i > 0 && lines.len() < line_count {
        i -= 1;
        if buf[i] == b'\n' {
            lines.push(clean_line(&buf[i + 1..end]));
            end = i;
        }
    }

    if starts_at_line_boundary && lines.len() < line_count && end > 0 {
        lines.push(clean_line(&buf[..end]));
    }

    lines.reverse();
    lines
}
