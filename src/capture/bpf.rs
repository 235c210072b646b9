// BPF packet source — libpcap capture on an interface with a filter
// expression.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use crossbeam_channel::{Receiver, Sender};

use super::shutdown_requested;
use crate::error::WgwatchError;
use crate::packet::{self, LinkType, PacketSummary};

const SNAPLEN: i32 = 1600;
const READ_TIMEOUT_MS: i32 = 500;

/// libpcap capture on an interface, filtered by a BPF expression.
pub struct BpfSource {
    interface: String,
    filter: String,
    handle: Option<pcap::Capture<pcap::Active>>,
    link_type: LinkType,
}

impl BpfSource {
    pub fn new(interface: &str, filter: &str) -> Self {
        Self {
            interface: interface.to_string(),
            filter: filter.to_string(),
            handle: None,
            link_type: LinkType::Ethernet,
        }
    }

    /// Activate the capture handle and install the filter.
    pub fn open(&mut self) -> Result<(), WgwatchError> {
        let mut handle = pcap::Capture::from_device(self.interface.as_str())
            .map_err(|e| {
                WgwatchError::Capture(format!("failed to open interface {}: {e}", self.interface))
            })?
            .snaplen(SNAPLEN)
            .promisc(true)
            .timeout(READ_TIMEOUT_MS)
            .open()
            .map_err(|e| {
                WgwatchError::Capture(format!(
                    "failed to activate capture on {}: {e}",
                    self.interface
                ))
            })?;

        handle.filter(&self.filter, true).map_err(|e| {
            WgwatchError::Capture(format!("failed to set bpf filter {:?}: {e}", self.filter))
        })?;

        self.link_type = match handle.get_datalink() {
            pcap::Linktype::ETHERNET => LinkType::Ethernet,
            pcap::Linktype::NULL | pcap::Linktype::LOOP => LinkType::Null,
            _ => LinkType::Raw,
        };

        log::info!(
            "bpf capture on {} with filter {:?} ({:?} framing)",
            self.interface,
            self.filter,
            self.link_type
        );
        self.handle = Some(handle);
        Ok(())
    }

    /// Read loop: parse captured frames and send their summaries.
    pub fn watch(&mut self, tx: &Sender<PacketSummary>, shutdown: &Receiver<()>) {
        loop {
            if shutdown_requested(shutdown) {
                return;
            }
            let Some(handle) = self.handle.as_mut() else {
                return;
            };

            match handle.next_packet() {
                Ok(captured) => {
                    let Some(mut summary) = packet::parse_single_packet(captured.data, self.link_type)
                    else {
                        continue;
                    };
                    if let Some(stamp) = capture_time(captured.header) {
                        summary.time = stamp;
                    }
                    if tx.send(summary).is_err() {
                        return; // receiver dropped
                    }
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(e) => {
                    log::warn!("pcap read error on {}: {e}", self.interface);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    /// Release the capture handle.
    pub fn close(&mut self) {
        self.handle = None;
    }
}

/// Capture timestamp from the pcap header, `None` when the layer did not
/// stamp the packet.
fn capture_time(header: &pcap::PacketHeader) -> Option<DateTime<Utc>> {
    if header.ts.tv_sec == 0 && header.ts.tv_usec == 0 {
        return None;
    }
    Utc.timestamp_opt(header.ts.tv_sec as i64, (header.ts.tv_usec as u32) * 1000)
        .single()
}
