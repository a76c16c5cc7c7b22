pub const DEBOUNCE_MS_ENV: &str = "ENQUETE_DEBOUNCE_MS";
pub const JOURNAL_ENV: &str = "ENQUETE_JOURNAL";

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debounce_ms: u64,
    pub journal_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            journal_enabled: true,
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            debounce_ms: resolve_debounce_ms(std::env::var(DEBOUNCE_MS_ENV).ok().as_deref()),
            journal_enabled: parse_enabled_default_true(
                std::env::var(JOURNAL_ENV).ok().as_deref(),
            ),
        }
    }
}

#[must_use]
pub(crate) fn resolve_debounce_ms(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_DEBOUNCE_MS)
}

#[must_use]
pub(crate) fn parse_enabled_default_true(raw: Option<&str>) -> bool {
    !matches!(
        raw.map(|value| value.trim().to_ascii_lowercase())
            .as_deref(),
        Some("off" | "none" | "0" | "false")
    )
}
