// WireGuard device snapshots.
//
// `DeviceLister` is the seam between the tracker and the kernel: one call
// returns every local WireGuard device with its peers. The shipped
// implementation shells out to `wg show all dump`; tests substitute fakes.

mod dump;

pub use dump::WgDumpClient;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::error::WgwatchError;

/// Length of a WireGuard public key in bytes.
pub const KEY_LEN: usize = 32;

/// A WireGuard peer public key.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD.encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for PublicKey {
    type Err = WgwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = STANDARD
            .decode(s)
            .map_err(|e| WgwatchError::Snapshot(format!("invalid public key {s:?}: {e}")))?;
        let bytes: [u8; KEY_LEN] = raw
            .try_into()
            .map_err(|_| WgwatchError::Snapshot(format!("public key {s:?} is not {KEY_LEN} bytes")))?;
        Ok(Self(bytes))
    }
}

/// Immutable snapshot of a WireGuard peer at one instant.
#[derive(Debug, Clone)]
pub struct PeerSample {
    pub public_key: PublicKey,
    /// Remote `host:port` the peer's packets originate from.
    pub endpoint: SocketAddr,
    /// Wall-clock time of the last successful handshake; UNIX epoch when the
    /// peer has never completed one.
    pub last_handshake: DateTime<Utc>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One WireGuard device and the peers registered on it.
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub peers: Vec<PeerSample>,
}

/// Snapshot source for WireGuard device state.
pub trait DeviceLister: Send + Sync {
    fn list_devices(&self) -> Result<Vec<Device>, WgwatchError>;
}
