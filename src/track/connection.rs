// Per-peer connection records and the state machine derived from successive
// device snapshots.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;

use crate::wg::{Device, PeerSample};

/// Connection state derived from two successive peer samples.
///
/// `Opened` and `Closed` are the transition states reported externally;
/// `Established` and `Inactive` are steady states; `Undefined` means not
/// enough samples have been observed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Undefined,
    Opened,
    Established,
    Closed,
    Inactive,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Undefined => "undefined",
            ConnectionState::Opened => "opened",
            ConnectionState::Established => "established",
            ConnectionState::Closed => "closed",
            ConnectionState::Inactive => "inactive",
        };
        f.write_str(name)
    }
}

/// Mutable per-peer record owned by the [`ConnectionMap`].
///
/// `prev` always holds the sample that was in `curr` before the most recent
/// snapshot that saw this peer. The `opened` flag tracks whether the Opened
/// transition has been reported for the current session; it is flipped by
/// [`Connection::state`] under the per-connection lock.
pub struct Connection {
    device: String,
    prev: Option<PeerSample>,
    curr: Option<PeerSample>,
    opened: RwLock<bool>,
}

impl Connection {
    fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            prev: None,
            curr: None,
            opened: RwLock::new(false),
        }
    }

    /// Record a fresh sample, shifting the current one into `prev`.
    fn advance(&mut self, sample: PeerSample) {
        self.prev = self.curr.take();
        self.curr = Some(sample);
    }

    /// Display identity: `<device>:<base64 public key>`.
    pub fn id(&self) -> String {
        match self.curr.as_ref() {
            Some(sample) => format!("{}:{}", self.device, sample.public_key),
            None => self.device.clone(),
        }
    }

    /// Whether the Opened transition has been reported for this session.
    pub fn opened(&self) -> bool {
        *self.opened.read()
    }

    fn set_opened(&self, value: bool) {
        *self.opened.write() = value;
    }

    fn is_transferring(&self) -> bool {
        match (self.prev.as_ref(), self.curr.as_ref()) {
            (Some(prev), Some(curr)) => {
                prev.rx_bytes < curr.rx_bytes || prev.tx_bytes < curr.tx_bytes
            }
            _ => false,
        }
    }

    fn run_based_on_opened(&self) -> ConnectionState {
        if self.opened() {
            // conn already registered, nothing new
            return ConnectionState::Established;
        }

        // newly opened conn
        self.set_opened(true);
        ConnectionState::Opened
    }

    /// Compute the connection state from the previous and current samples.
    ///
    /// Flips the `opened` flag as a side effect when reporting `Opened` or
    /// `Closed`.
    pub fn state(&self, now: DateTime<Utc>, idle_timeout: TimeDelta) -> ConnectionState {
        let (Some(prev), Some(curr)) = (self.prev.as_ref(), self.curr.as_ref()) else {
            return ConnectionState::Undefined;
        };

        if prev.last_handshake < curr.last_handshake {
            // difference in handshake time indicates running conn
            return self.run_based_on_opened();
        }

        if curr.last_handshake == prev.last_handshake && self.is_transferring() {
            // no change in handshake but difference in
            // transferred bytes indicates running conn
            return self.run_based_on_opened();
        }

        // no change in handshake and no change in transferred bytes
        let cutoff = now
            .checked_sub_signed(idle_timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if curr.last_handshake < cutoff {
            // conn idle for too long, disconnected
            if self.opened() {
                self.set_opened(false);
                return ConnectionState::Closed;
            }
            return ConnectionState::Inactive;
        }

        // Handshake is stale but still inside the idle window: between
        // keepalives a live peer looks exactly like this, so report it as
        // running rather than dead.
        self.run_based_on_opened()
    }
}

/// Concurrent mapping from peer endpoint string to [`Connection`].
///
/// Entries are created the first time a snapshot observes a peer endpoint and
/// removed by the tracker once the state machine reports `Closed` or
/// `Inactive`. Iteration is per-entry consistent, not globally atomic.
pub struct ConnectionMap {
    map: DashMap<String, Connection, FxBuildHasher>,
}

impl ConnectionMap {
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Reconcile the map against a fresh device list.
    ///
    /// Every peer present in `devices` ends up with an entry whose `curr`
    /// reflects that peer; peers that disappeared keep their previous entry
    /// untouched (pruning is the tracker's job).
    pub fn snapshot(&self, devices: &[Device]) {
        for device in devices {
            for peer in &device.peers {
                let key = peer.endpoint.to_string();
                self.map
                    .entry(key)
                    .or_insert_with(|| Connection::new(&device.name))
                    .advance(peer.clone());
            }
        }
    }

    /// Whether an entry exists for `key` and has been reported as opened.
    pub fn is_opened(&self, key: &str) -> bool {
        self.map.get(key).map(|conn| conn.opened()).unwrap_or(false)
    }

    pub fn remove(&self, key: &str) {
        self.map.remove(key);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Visit every entry. Callers must not mutate the map from inside the
    /// closure; collect keys and act afterwards.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Connection),
    {
        for entry in self.map.iter() {
            f(entry.key(), entry.value());
        }
    }
}

impl Default for ConnectionMap {
    fn default() -> Self {
        Self::new()
    }
}
