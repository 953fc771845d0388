//! Structured progress events parsed from subprocess output

/// A structured progress update emitted while a subprocess runs
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Fractional completion in 0..=1, when the tool reported one
    pub fraction: Option<f64>,
    /// Transfer rate exactly as the tool printed it, e.g. "5.20MiB/s"
    pub rate_label: Option<String>,
    /// Estimated time remaining exactly as printed, e.g. "00:15"
    pub eta_label: Option<String>,
}

/// Everything a running subprocess emits, in production order
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// A line that parsed as a progress marker
    Progress(ProgressEvent),
    /// Any other output line, forwarded verbatim
    Log(String),
}

/// Parse one output line into a progress event.
///
/// Recognized shape (yt-dlp and similar tools):
/// `[download]  42.5% of ~ 150.00MiB at  5.20MiB/s ETA 00:15`
///
/// Returns None for lines that carry no percentage; callers forward
/// those as [`RunnerEvent::Log`] instead of dropping them.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    if !line.contains('%') {
        return None;
    }

    // Percentage: scan backwards from the '%' for the number. Byte
    // offsets throughout; the line can carry arbitrary non-ascii text.
    let pct_pos = line.find('%')?;
    let before = &line[..pct_pos];
    let mut num_start = None;
    for (idx, c) in before.char_indices().rev() {
        if c.is_ascii_digit() || c == '.' {
            num_start = Some(idx);
        } else if num_start.is_some() {
            break;
        }
    }
    let pct = before[num_start?..].trim().parse::<f64>().ok()?;
    if !(0.0..=100.0).contains(&pct) {
        return None;
    }

    // Rate: token between " at " and the end of "/s"
    let rate_label = line.find(" at ").and_then(|at_idx| {
        let after = &line[at_idx + 4..];
        let end = after.find("/s")?;
        let token = after[..end].trim();
        if token.is_empty() {
            None
        } else {
            Some(format!("{}/s", token))
        }
    });

    // ETA: first token after "ETA "
    let eta_label = line.find("ETA ").and_then(|eta_idx| {
        let token = line[eta_idx + 4..].split_whitespace().next()?;
        Some(token.to_string())
    });

    Some(ProgressEvent {
        fraction: Some(pct / 100.0),
        rate_label,
        eta_label,
    })
}
