// Packet sources.
//
// Two interchangeable implementations of one capability: an NFLOG consumer
// on a netfilter log group and a libpcap capture on an interface. The
// tracker sees a single `PacketMonitor`; the variant is chosen from
// configuration at process start.
//
// Contract shared by both variants:
//   - `open()` acquires the capture handle; failures are fatal startup
//     errors.
//   - `watch(tx, shutdown)` parses frames into `PacketSummary` values and
//     blocks sending them into `tx` (capacity 1 — the producer stalls until
//     the tracker drains). It returns when the shutdown channel fires or the
//     receiver side goes away.
//   - `close()` releases the handle. The producer thread calls it after
//     `watch` returns and then drops its sender, so the packet channel
//     closes on the producer side and nothing is emitted after shutdown.

pub mod bpf;
pub mod nflog;

use crossbeam_channel::{Receiver, Sender};

use crate::error::WgwatchError;
use crate::packet::PacketSummary;

pub use bpf::BpfSource;
pub use nflog::NflogSource;

/// Capacity of the packet channel between the producer and the tracker.
pub const PACKET_CHANNEL_CAPACITY: usize = 1;

/// A configured packet source.
pub enum PacketMonitor {
    Nflog(NflogSource),
    Bpf(BpfSource),
}

impl PacketMonitor {
    /// NFLOG consumer on `group`, optionally inside a named network
    /// namespace (`/run/netns/<name>`).
    pub fn nflog(group: u16, netns: Option<String>) -> Self {
        PacketMonitor::Nflog(NflogSource::new(group, netns))
    }

    /// libpcap capture on `interface` with a BPF filter expression.
    pub fn bpf(interface: &str, filter: &str) -> Self {
        PacketMonitor::Bpf(BpfSource::new(interface, filter))
    }

    pub fn open(&mut self) -> Result<(), WgwatchError> {
        match self {
            PacketMonitor::Nflog(source) => source.open(),
            PacketMonitor::Bpf(source) => source.open(),
        }
    }

    /// Produce packets into `tx` until shutdown is signalled or the
    /// receiver disconnects.
    pub fn watch(&mut self, tx: &Sender<PacketSummary>, shutdown: &Receiver<()>) {
        match self {
            PacketMonitor::Nflog(source) => source.watch(tx, shutdown),
            PacketMonitor::Bpf(source) => source.watch(tx, shutdown),
        }
    }

    pub fn close(&mut self) {
        match self {
            PacketMonitor::Nflog(source) => source.close(),
            PacketMonitor::Bpf(source) => source.close(),
        }
    }
}

/// Check whether the consumer has asked the producer to stop.
pub(crate) fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    match shutdown.try_recv() {
        Ok(()) | Err(crossbeam_channel::TryRecvError::Disconnected) => true,
        Err(crossbeam_channel::TryRecvError::Empty) => false,
    }
}
