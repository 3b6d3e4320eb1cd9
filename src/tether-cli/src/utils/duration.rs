//! Timeout strings on the command line.

use std::time::Duration;

/// Parse `500ms`, `30s`, `5m`, `1h` or a bare number of seconds.
///
/// Fractions are accepted (`1.5s`). Zero is rejected: a command that may
/// not run at all is a usage error.
pub fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err("timeout must not be empty".to_string());
    }

    let (num_str, scale) = if let Some(n) = s.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600.0)
    } else {
        (s.as_str(), 1.0)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid timeout: {s} (use e.g. 500ms, 30s, 5m, 1h)"))?;

    let secs = num * scale;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("invalid timeout: {s}"));
    }

    let duration = Duration::try_from_secs_f64(secs).map_err(|_| format!("timeout too large: {s}"))?;
    if duration.is_zero() {
        return Err("timeout must be greater than zero".to_string());
    }
    Ok(duration)
}

/// Same as [`parse_timeout`], but zero is allowed (used for kill grace).
pub fn parse_grace(s: &str) -> Result<Duration, String> {
    match s.trim() {
        "0" | "0s" | "0ms" => Ok(Duration::ZERO),
        other => parse_timeout(other),
    }
}

/// Compact human form: `750ms`, `12s`, `1.5s`, `3m`, `2h`.
pub fn format_timeout(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis % 3_600_000 == 0 {
        format!("{}h", millis / 3_600_000)
    } else if millis % 60_000 == 0 {
        format!("{}m", millis / 60_000)
    } else if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
