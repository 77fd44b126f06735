use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Front-end settings: poll cadence, token location, and the simulated
/// service's behavior. Values come from defaults, then an optional TOML
/// file, then `LINK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub poll_interval_ms: u64,
    pub token_file: PathBuf,
    pub connect_delay_ms: u64,
    pub reject_start: bool,
    pub status_outage_every: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            token_file: PathBuf::from("auth_token.txt"),
            connect_delay_ms: 1500,
            reject_start: false,
            status_outage_every: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    poll_interval_ms: Option<u64>,
    token_file: Option<PathBuf>,
    connect_delay_ms: Option<u64>,
    reject_start: Option<bool>,
    status_outage_every: Option<u32>,
}

pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = std::fs::read_to_string(path) {
        apply_file(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("LINK_POLL_INTERVAL_MS") {
        if let Ok(v) = v.parse() {
            settings.poll_interval_ms = v;
        }
    }
    if let Ok(v) = std::env::var("LINK_TOKEN_FILE") {
        settings.token_file = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("LINK_CONNECT_DELAY_MS") {
        if let Ok(v) = v.parse() {
            settings.connect_delay_ms = v;
        }
    }
    if let Ok(v) = std::env::var("LINK_REJECT_START") {
        settings.reject_start = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = std::env::var("LINK_STATUS_OUTAGE_EVERY") {
        if let Ok(v) = v.parse() {
            settings.status_outage_every = Some(v);
        }
    }

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    if let Ok(file) = toml::from_str::<FileSettings>(raw) {
        if let Some(v) = file.poll_interval_ms {
            settings.poll_interval_ms = v;
        }
        if let Some(v) = file.token_file {
            settings.token_file = v;
        }
        if let Some(v) = file.connect_delay_ms {
            settings.connect_delay_ms = v;
        }
        if let Some(v) = file.reject_start {
            settings.reject_start = v;
        }
        if let Some(v) = file.status_outage_every {
            settings.status_outage_every = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_poll_every_half_second() {
        let settings = Settings::default();
        assert_eq!(settings.poll_interval_ms, 500);
        assert_eq!(settings.token_file, PathBuf::from("auth_token.txt"));
        assert!(!settings.reject_start);
        assert_eq!(settings.status_outage_every, None);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut settings = Settings::default();
        let raw = "poll_interval_ms = 250\n\
                   token_file = \"/tmp/tok\"\n\
                   reject_start = true\n\
                   status_outage_every = 4\n";
        apply_file(&mut settings, raw);
        assert_eq!(settings.poll_interval_ms, 250);
        assert_eq!(settings.token_file, PathBuf::from("/tmp/tok"));
        assert!(settings.reject_start);
        assert_eq!(settings.connect_delay_ms, 1500);
        assert_eq!(settings.status_outage_every, Some(4));
    }

    #[test]
    fn malformed_file_leaves_defaults_in_place() {
        let mut settings = Settings::default();
        apply_file(&mut settings, "poll_interval_ms = \"not a number\"");
        assert_eq!(settings.poll_interval_ms, 500);
    }
}
