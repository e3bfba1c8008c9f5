use std::{net::SocketAddr, path::PathBuf, time::Duration};

pub const DEFAULT_LOG_FILE: &str = "/var/log/arpcut/arpcut.log";

/// Timing knobs shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct Timing {
    /// How long to wait for an ARP reply when resolving the gateway MAC.
    #[arg(long, global = true, default_value_t = 2000)]
    pub resolve_timeout_ms: u64,

    /// How long a subnet scan collects replies.
    #[arg(long, global = true, default_value_t = 2000)]
    pub scan_window_ms: u64,

    /// Period of the repeater that re-poisons every cut host.
    #[arg(long, global = true, default_value_t = 1000)]
    pub repeat_interval_ms: u64,
}

impl Timing {
    pub fn resolve_timeout(&self) -> Duration {
        return Duration::from_millis(self.resolve_timeout_ms);
    }

    pub fn scan_window(&self) -> Duration {
        return Duration::from_millis(self.scan_window_ms);
    }

    pub fn repeat_interval(&self) -> Duration {
        // A zero period would panic in tokio::time::interval.
        return Duration::from_millis(self.repeat_interval_ms.max(1));
    }
}

impl Default for Timing {
    fn default() -> Self {
        return Self {
            resolve_timeout_ms: 2000,
            scan_window_ms: 2000,
            repeat_interval_ms: 1000,
        };
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address the control API listens on. Keep it on loopback.
    #[arg(short, long, default_value = "127.0.0.1:8013")]
    pub listen: SocketAddr,

    /// File the log is appended to and served from `GET /log`.
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
}
