//! Progress event normalization
//!
//! The fetch engine reports progress through callbacks whose payload shape
//! varies by engine and call style (percent strings, raw byte counters,
//! numeric or preformatted speed/ETA). This module normalizes those
//! heterogeneous events into a single [`ProgressUpdate`].
//!
//! Normalization is best-effort telemetry, not a correctness path: a field
//! that fails to parse yields `None`, which means "keep the previous value"
//! when applied to a task record. It never produces an error.

use serde_json::Value;

use crate::utils::{format_bytes, format_eta};

/// Normalized progress fields extracted from one engine event
///
/// Every field is optional; `None` leaves the task's previous value intact.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressUpdate {
    /// Progress percentage (0.0 to 100.0)
    pub progress: Option<f32>,

    /// Human-readable transfer speed (e.g. "1.25 MiB/s")
    pub speed: Option<String>,

    /// Human-readable time remaining (e.g. "01:23")
    pub eta: Option<String>,

    /// Bytes downloaded so far
    pub downloaded_bytes: Option<u64>,

    /// Total size in bytes
    pub total_bytes: Option<u64>,
}

/// Normalize an arbitrary engine progress event.
///
/// Recognized fields (first match wins):
/// - percent: `percent` (number), `_percent_str` (string like `" 42.3%"`)
/// - speed: `speed` / `speed_bps` (number, bytes per second), `_speed_str` (string)
/// - eta: `eta` (number, seconds), `_eta_str` (string)
/// - bytes: `downloaded_bytes`, `total_bytes` falling back to
///   `total_bytes_estimate`
///
/// When no percent is reported but both byte counters are present, the
/// percentage is derived from them.
pub fn normalize(event: &Value) -> ProgressUpdate {
    let downloaded_bytes = parse_u64(event, &["downloaded_bytes"]);
    let total_bytes = parse_u64(event, &["total_bytes", "total_bytes_estimate"]);

    let progress = parse_percent(event).or_else(|| derive_percent(downloaded_bytes, total_bytes));

    ProgressUpdate {
        progress,
        speed: parse_speed(event),
        eta: parse_eta(event),
        downloaded_bytes,
        total_bytes,
    }
}

fn parse_percent(event: &Value) -> Option<f32> {
    let raw = if let Some(n) = event.get("percent").and_then(Value::as_f64) {
        n
    } else {
        let s = event.get("_percent_str")?.as_str()?;
        s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?
    };
    if raw.is_finite() && (0.0..=100.0).contains(&raw) {
        Some(raw as f32)
    } else {
        None
    }
}

fn derive_percent(downloaded: Option<u64>, total: Option<u64>) -> Option<f32> {
    let (downloaded, total) = (downloaded?, total?);
    if total == 0 {
        return None;
    }
    Some(((downloaded as f64 / total as f64) * 100.0).min(100.0) as f32)
}

fn parse_speed(event: &Value) -> Option<String> {
    for key in ["speed", "speed_bps"] {
        if let Some(bps) = event.get(key).and_then(Value::as_f64)
            && bps.is_finite()
            && bps >= 0.0
        {
            return Some(format!("{}/s", format_bytes(bps as u64)));
        }
    }
    event
        .get("_speed_str")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_eta(event: &Value) -> Option<String> {
    if let Some(secs) = event.get("eta").and_then(Value::as_u64) {
        return Some(format_eta(secs));
    }
    event
        .get("_eta_str")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_u64(event: &Value, keys: &[&str]) -> Option<u64> {
    for key in keys {
        if let Some(value) = event.get(key) {
            // Engines sometimes report byte counters as floats
            if let Some(n) = value.as_u64() {
                return Some(n);
            }
            if let Some(f) = value.as_f64()
                && f.is_finite()
                && f >= 0.0
            {
                return Some(f as u64);
            }
        }
    }
    None
}
