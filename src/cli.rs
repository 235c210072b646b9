use clap::{Parser, ValueEnum};

/// Command-line configuration.
///
/// Every flag can also be set through the environment variable of the same
/// name (the flag value wins when both are present on the command line).
#[derive(Parser, Debug)]
#[command(
    name = "wgwatch",
    version,
    about = "WireGuard peer connection monitor"
)]
pub struct Cli {
    /// Type of packet monitor to use
    #[arg(long, env = "monitor", default_value = "nflog")]
    pub monitor: MonitorKind,

    /// NFLOG group index (when monitor=nflog)
    #[arg(long, env = "group", default_value_t = 1)]
    pub group: u16,

    /// Interface where to listen for packets (when monitor=bpf)
    #[arg(long, env = "interface", default_value = "eth0")]
    pub interface: String,

    /// BPF filter triggering a device snapshot (when monitor=bpf)
    #[arg(long, env = "filter", default_value = "udp and dst port 3000")]
    pub filter: String,

    /// Custom webhook where to report events; empty disables delivery
    #[arg(long, env = "webhook", default_value = "")]
    pub webhook: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    Nflog,
    Bpf,
}
