use std::time::Duration;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9229;

#[derive(Debug, Clone)]
pub struct CdpConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a single command round trip.
    pub command_timeout: Duration,
    pub discovery_timeout: Duration,
    /// Deadline for the `finished` progress event during heap snapshot capture.
    pub snapshot_progress_timeout: Duration,
    /// Quiet period after which a capture without progress reporting is considered done.
    pub snapshot_settle_window: Duration,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            command_timeout: Duration::from_secs(30),
            discovery_timeout: Duration::from_secs(5),
            snapshot_progress_timeout: Duration::from_secs(30),
            snapshot_settle_window: Duration::from_secs(5),
        }
    }
}

impl CdpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_snapshot_progress_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_progress_timeout = timeout;
        self
    }

    pub fn with_snapshot_settle_window(mut self, window: Duration) -> Self {
        self.snapshot_settle_window = window;
        self
    }

    /// HTTP endpoint that lists the inspector's debug targets.
    pub fn discovery_url(&self) -> String {
        format!("http://{}:{}/json", self.host, self.port)
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("CDP_HOST").unwrap_or(defaults.host);

        let port = std::env::var("CDP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        Self {
            host,
            port,
            command_timeout: duration_from_env("CDP_COMMAND_TIMEOUT_MS")
                .unwrap_or(defaults.command_timeout),
            discovery_timeout: defaults.discovery_timeout,
            snapshot_progress_timeout: duration_from_env("CDP_SNAPSHOT_TIMEOUT_MS")
                .unwrap_or(defaults.snapshot_progress_timeout),
            snapshot_settle_window: duration_from_env("CDP_SNAPSHOT_SETTLE_MS")
                .unwrap_or(defaults.snapshot_settle_window),
        }
    }
}

fn duration_from_env(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
