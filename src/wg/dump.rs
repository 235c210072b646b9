// `wg show all dump` snapshot client.

use std::process::Command;

use chrono::{DateTime, TimeZone, Utc};

use super::{Device, DeviceLister, PeerSample};
use crate::error::WgwatchError;

// Column counts of the two `wg show all dump` line shapes. Device lines carry
// interface, private key, public key, listen port and fwmark; peer lines carry
// interface, public key, preshared key, endpoint, allowed ips, latest
// handshake, rx, tx and keepalive.
const DEVICE_FIELDS: usize = 5;
const PEER_FIELDS: usize = 9;

/// Snapshot client over the `wg` command-line tool.
pub struct WgDumpClient {
    netns: Option<String>,
}

impl WgDumpClient {
    /// Probe for a usable `wg` binary.
    ///
    /// Fails when the tool is absent so the process can refuse to start
    /// instead of silently polling nothing.
    pub fn new() -> Result<Self, WgwatchError> {
        Self::probe(None)
    }

    /// Snapshot client polling inside a named network namespace
    /// (`ip netns exec <name> wg ...`).
    pub fn in_netns(netns: &str) -> Result<Self, WgwatchError> {
        Self::probe(Some(netns.to_string()))
    }

    fn probe(netns: Option<String>) -> Result<Self, WgwatchError> {
        let output = Command::new("wg")
            .arg("--version")
            .output()
            .map_err(|e| WgwatchError::Snapshot(format!("wg binary not available: {e}")))?;
        if !output.status.success() {
            return Err(WgwatchError::Snapshot(format!(
                "wg --version exited with {}",
                output.status
            )));
        }
        Ok(Self { netns })
    }

    fn dump_command(&self) -> Command {
        match self.netns.as_deref() {
            Some(ns) => {
                let mut cmd = Command::new("ip");
                cmd.args(["netns", "exec", ns, "wg", "show", "all", "dump"]);
                cmd
            }
            None => {
                let mut cmd = Command::new("wg");
                cmd.args(["show", "all", "dump"]);
                cmd
            }
        }
    }
}

impl DeviceLister for WgDumpClient {
    fn list_devices(&self) -> Result<Vec<Device>, WgwatchError> {
        let output = self
            .dump_command()
            .output()
            .map_err(|e| WgwatchError::Snapshot(format!("wg show failed to run: {e}")))?;
        if !output.status.success() {
            return Err(WgwatchError::Snapshot(format!(
                "wg show exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_dump(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse the tab-separated `wg show all dump` output.
///
/// Malformed lines and peers without an endpoint are skipped: a peer that has
/// never had an endpoint cannot be matched against captured traffic anyway.
fn parse_dump(text: &str) -> Vec<Device> {
    let mut devices: Vec<Device> = Vec::new();

    for line in text.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        match fields.len() {
            DEVICE_FIELDS => devices.push(Device {
                name: fields[0].to_string(),
                peers: Vec::new(),
            }),
            PEER_FIELDS => {
                let Some(peer) = parse_peer_line(&fields) else {
                    log::warn!("skipping unparsable wg dump line: {line:?}");
                    continue;
                };
                let Some(sample) = peer else {
                    continue; // peer without endpoint
                };
                let name = fields[0];
                match devices.iter_mut().find(|d| d.name == name) {
                    Some(dev) => dev.peers.push(sample),
                    None => devices.push(Device {
                        name: name.to_string(),
                        peers: vec![sample],
                    }),
                }
            }
            _ if line.trim().is_empty() => {}
            _ => log::warn!("skipping unrecognized wg dump line: {line:?}"),
        }
    }

    devices
}

/// Parse one peer line. Outer `None` means malformed; inner `None` means the
/// peer has no endpoint.
fn parse_peer_line(fields: &[&str]) -> Option<Option<PeerSample>> {
    let public_key = fields[1].parse().ok()?;
    let endpoint = match fields[3] {
        "(none)" => return Some(None),
        raw => raw.parse().ok()?,
    };
    let handshake_secs: i64 = fields[5].parse().ok()?;
    let rx_bytes: u64 = fields[6].parse().ok()?;
    let tx_bytes: u64 = fields[7].parse().ok()?;

    Some(Some(PeerSample {
        public_key,
        endpoint,
        last_handshake: handshake_time(handshake_secs),
        rx_bytes,
        tx_bytes,
    }))
}

fn handshake_time(secs: i64) -> DateTime<Utc> {
    if secs == 0 {
        return DateTime::<Utc>::UNIX_EPOCH;
    }
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
