use std::path::PathBuf;

use clap::Parser;

/// Display and remote-control daemon for a networked audio device.
#[derive(Parser, Debug)]
#[command(name = "drcpd")]
#[command(version)]
#[command(about = "Display and remote-control daemon", long_about = None)]
pub struct Cli {
    /// Log verbosity (error, warn, info, debug, trace).
    #[arg(long, default_value = "info", env = "DRCPD_VERBOSE")]
    pub verbose: String,

    /// Suppress all logging below error level.
    #[arg(long)]
    pub quiet: bool,

    /// Stay in the foreground instead of daemonizing.
    #[arg(long)]
    pub fg: bool,

    /// Path to the inbound DCP pipe (acks from the display peer).
    #[arg(long, default_value = "/tmp/dcpd_fifo_i", env = "DRCPD_IDCP")]
    pub idcp: PathBuf,

    /// Path to the outbound DCP pipe (display frames to the peer).
    #[arg(long, default_value = "/tmp/dcpd_fifo_o", env = "DRCPD_ODCP")]
    pub odcp: PathBuf,

    /// Connect to the session D-Bus for the UI command bus.
    #[arg(long, conflicts_with = "system_dbus")]
    pub session_dbus: bool,

    /// Connect to the system D-Bus for the UI command bus.
    #[arg(long)]
    pub system_dbus: bool,

    /// Path to the persisted INI configuration file.
    #[arg(long, default_value = "/var/lib/drcpd/drcpd.conf", env = "DRCPD_CONFIG_FILE")]
    pub config_file: PathBuf,
}

impl Cli {
    pub fn log_filter(&self) -> String {
        if self.quiet {
            "error".to_string()
        } else {
            self.verbose.clone()
        }
    }
}
