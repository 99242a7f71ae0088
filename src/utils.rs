//! Shared utility functions

use chrono::{SecondsFormat, Utc};

/// Expand `~` prefix to the user's home directory.
///
/// Returns the original string unchanged if it doesn't start with `~/`
/// or if the home directory cannot be determined.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}

/// Current UTC time as an RFC 3339 / ISO-8601 timestamp.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Bytes to mebibytes
pub fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_leaves_plain_paths_alone() {
        assert_eq!(expand_tilde("../model_cache"), "../model_cache");
        assert_eq!(expand_tilde("/var/cache/models"), "/var/cache/models");
    }

    #[test]
    fn expand_tilde_resolves_home() {
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_tilde("~/models");
            assert_eq!(expanded, home.join("models").to_string_lossy());
        }
    }

    #[test]
    fn timestamp_is_utc() {
        let ts = utc_timestamp();
        assert!(ts.ends_with("+00:00"), "{ts}");
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn to_mb_converts_bytes() {
        assert_eq!(to_mb(3 * 1024 * 1024), 3.0);
    }
}
