use std::time::Duration;

const DEFAULT_MIN_PART_SIZE: i64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Size floor applied to every completed part except the last.
    pub min_part_size: i64,
    /// Verify client-supplied content checksums on put paths.
    pub enforce_checksum: bool,
    /// Upload sessions idle longer than this are aborted by the reaper.
    pub idle_retention: Duration,
    pub reap_interval: Duration,
    /// Upper bound on a single namespace-store interaction.
    pub io_deadline: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_part_size: DEFAULT_MIN_PART_SIZE,
            enforce_checksum: true,
            idle_retention: Duration::from_secs(24 * 60 * 60),
            reap_interval: Duration::from_secs(5 * 60),
            io_deadline: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env_i64("CANOPY_MIN_PART_SIZE") {
            config.min_part_size = value;
        }
        if let Some(value) = env_var("CANOPY_ENFORCE_CHECKSUM").and_then(|v| parse_bool(&v)) {
            config.enforce_checksum = value;
        }
        if let Some(value) = env_secs("CANOPY_UPLOAD_IDLE_RETENTION_SECS") {
            config.idle_retention = value;
        }
        if let Some(value) = env_secs("CANOPY_UPLOAD_REAP_INTERVAL_SECS") {
            config.reap_interval = value;
        }
        if let Some(value) = env_secs("CANOPY_NAMESPACE_IO_DEADLINE_SECS") {
            config.io_deadline = value;
        }
        config
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_i64(name: &str) -> Option<i64> {
    env_var(name)?.parse().ok()
}

fn env_secs(name: &str) -> Option<Duration> {
    let secs: u64 = env_var(name)?.parse().ok()?;
    Some(Duration::from_secs(secs))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
