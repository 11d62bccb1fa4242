//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Bridge peer 802.11 traffic between a monitor-mode interface and a remote server.
#[derive(Parser, Debug, Clone)]
#[command(name = "wlbridge")]
#[command(version)]
pub struct Cli {
    /// Server address (host:port). Overrides the config file.
    pub server: Option<String>,

    /// Wireless interface to use for the bridge (e.g. wlan0, wlp5s0).
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Don't put the interface in monitor mode. Use when monitor mode is set up externally
    /// (airmon-ng, iw).
    #[arg(short = 'M', long)]
    pub no_monitor: bool,

    /// Don't put the interface in promiscuous mode. Use when the driver is always promiscuous
    /// but rejects the setting.
    #[arg(short = 'P', long)]
    pub no_promiscuous: bool,

    /// Don't channel hop while discovering. Use when the peer's channel is known or another
    /// tool switches channels.
    #[arg(short = 'H', long)]
    pub no_channel_hopping: bool,

    /// Enter monitor mode with `iw <if> set monitor` instead of libpcap.
    #[arg(short = 'm', long)]
    pub alt_monitor: bool,

    /// Dump captured frames to this pcap file.
    #[arg(short = 'D', long, value_name = "FILE")]
    pub dump_packets: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
