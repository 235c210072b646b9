// Connection tracker: correlates captured packets with device snapshots and
// reports peer state changes.
//
// Thread topology: the producer thread runs the packet source, the tracker
// thread consumes the packet channel, and a ticker thread polls device state
// while any connection is live. Webhook posts run on short-lived threads so
// HTTP latency never stalls the handler or the ticker.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{TimeDelta, Utc};
use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::capture::{PacketMonitor, PACKET_CHANNEL_CAPACITY};
use crate::error::WgwatchError;
use crate::hook;
use crate::packet::PacketSummary;
use crate::track::connection::{ConnectionMap, ConnectionState};
use crate::wg::DeviceLister;

/// Tracker tunables.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How stale a peer's handshake may be before it counts as closed.
    pub idle_timeout: Duration,
    /// Period of the polling ticker started on first traffic.
    pub tick_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5 * 60),
            tick_interval: Duration::from_secs(2 * 60),
        }
    }
}

/// Grace window for the packet source to acknowledge shutdown.
const STOP_GRACE: Duration = Duration::from_secs(3);

pub struct Tracker {
    shared: Arc<Shared>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

/// State shared between the tracker thread and the ticker thread.
struct Shared {
    lister: Box<dyn DeviceLister>,
    conn_map: ConnectionMap,
    webhook: String,
    /// Live ticker handle; `None` while no connection is tracked. Swapped
    /// atomically so the packet handler and the ticker never race a
    /// read-then-write.
    ticker: ArcSwapOption<TickerHandle>,
    tick_interval: Duration,
    idle_timeout: TimeDelta,
}

struct TickerHandle {
    stop_tx: Sender<()>,
}

impl Tracker {
    pub fn new(lister: Box<dyn DeviceLister>, webhook: String, config: TrackerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        Self {
            shared: Arc::new(Shared {
                lister,
                conn_map: ConnectionMap::new(),
                webhook,
                ticker: ArcSwapOption::const_empty(),
                tick_interval: config.tick_interval,
                idle_timeout: TimeDelta::from_std(config.idle_timeout)
                    .unwrap_or_else(|_| TimeDelta::minutes(5)),
            }),
            shutdown_tx,
            shutdown_rx,
            done_tx,
            done_rx,
        }
    }

    /// Run the tracker over an opened packet source.
    ///
    /// Spawns the producer thread and consumes the packet channel on the
    /// calling thread until shutdown closes it.
    pub fn run(&self, monitor: PacketMonitor) -> Result<(), WgwatchError> {
        let (pkt_tx, pkt_rx) = bounded(PACKET_CHANNEL_CAPACITY);
        let shutdown_rx = self.shutdown_rx.clone();
        let done_tx = self.done_tx.clone();

        let producer = thread::Builder::new()
            .name("wgwatch-capture".into())
            .spawn(move || {
                let mut monitor = monitor;
                monitor.watch(&pkt_tx, &shutdown_rx);
                monitor.close();
                drop(pkt_tx);
                let _ = done_tx.try_send(());
            })
            .map_err(|e| WgwatchError::Fatal(format!("spawn capture thread: {e}")))?;

        log::info!("initiating wg peer monitoring");
        self.handle_packets(&pkt_rx);
        let _ = producer.join();
        Ok(())
    }

    /// Consume summaries from the packet channel until it closes.
    pub fn handle_packets(&self, pkt_rx: &Receiver<PacketSummary>) {
        for summary in pkt_rx.iter() {
            self.handle_packet(summary);
        }
    }

    fn handle_packet(&self, summary: PacketSummary) {
        let shared = &self.shared;

        if shared.ticker.load().is_none() {
            // First packet of a burst: report it and start polling.
            let webhook = shared.webhook.clone();
            let first = summary.clone();
            spawn_post(move || hook::post_packet(&webhook, &first));
            self.init_ticker();
        }

        if shared.conn_map.is_opened(&summary.remote_addr()) {
            // if opened, connection is already reported
            return;
        }

        let devices = match shared.lister.list_devices() {
            Ok(devices) => devices,
            Err(e) => {
                log::error!("wg snapshot failed: {e}");
                return;
            }
        };
        shared.conn_map.snapshot(&devices);
        shared.report_new_connections();
    }

    /// Start the polling ticker. Called only when no ticker is live.
    fn init_ticker(&self) {
        let (stop_tx, stop_rx) = bounded(1);
        self.shared
            .ticker
            .store(Some(Arc::new(TickerHandle { stop_tx })));

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("wgwatch-ticker".into())
            .spawn(move || ticker_loop(&shared, &stop_rx));
        if let Err(e) = spawned {
            log::error!("failed to spawn ticker thread: {e}");
            self.shared.ticker.store(None);
        }
    }

    /// Whether the polling ticker is currently live.
    pub fn ticker_running(&self) -> bool {
        self.shared.ticker.load().is_some()
    }

    /// The tracked connection map.
    pub fn connections(&self) -> &ConnectionMap {
        &self.shared.conn_map
    }

    /// Graceful shutdown: signal the producer, wait for its acknowledgment
    /// within the grace window, then stop any live ticker.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.try_send(());
        if self.done_rx.recv_timeout(STOP_GRACE).is_err() {
            log::warn!(
                "packet source did not acknowledge shutdown within {STOP_GRACE:?}"
            );
        }
        if let Some(handle) = self.shared.ticker.swap(None) {
            let _ = handle.stop_tx.try_send(());
        }
    }
}

impl Shared {
    /// Report every connection whose state machine just turned `Opened`.
    fn report_new_connections(&self) {
        let now = Utc::now();
        let mut opened = Vec::new();
        self.conn_map.for_each(|endpoint, conn| {
            if conn.state(now, self.idle_timeout) == ConnectionState::Opened {
                opened.push((endpoint.to_string(), conn.id()));
            }
        });

        for (endpoint, id) in opened {
            let webhook = self.webhook.clone();
            spawn_post(move || {
                hook::post_state(&webhook, &endpoint, &id, "opened")
            });
        }
    }

    /// Evaluate every connection, report and remove the closed ones, drop
    /// the inactive ones silently. Returns the number of live entries left.
    fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut closed = Vec::new();
        let mut inactive = Vec::new();
        self.conn_map.for_each(|endpoint, conn| {
            match conn.state(now, self.idle_timeout) {
                ConnectionState::Closed => closed.push((endpoint.to_string(), conn.id())),
                ConnectionState::Inactive => inactive.push(endpoint.to_string()),
                _ => {}
            }
        });

        for (endpoint, id) in closed {
            let webhook = self.webhook.clone();
            let reported = endpoint.clone();
            spawn_post(move || {
                hook::post_state(&webhook, &reported, &id, "closed")
            });
            self.conn_map.remove(&endpoint);
        }
        for endpoint in inactive {
            // never opened, nothing to report
            self.conn_map.remove(&endpoint);
        }

        self.conn_map.len()
    }
}

/// Ticker thread: refresh snapshots and sweep until no connection is left.
fn ticker_loop(shared: &Shared, stop_rx: &Receiver<()>) {
    let ticker = crossbeam_channel::tick(shared.tick_interval);
    loop {
        select! {
            recv(ticker) -> _ => {}
            recv(stop_rx) -> _ => return,
        }
        log::info!("tick");

        match shared.lister.list_devices() {
            Ok(devices) => shared.conn_map.snapshot(&devices),
            Err(e) => log::error!("wg snapshot failed on tick: {e}"),
        }

        if shared.sweep() == 0 {
            // no one is connected; the next packet restarts the cycle
            log::info!("stopping ticker");
            shared.ticker.store(None);
            return;
        }
    }
}

/// Fire-and-forget webhook post on a short-lived thread.
fn spawn_post<F>(post: F)
where
    F: FnOnce() -> Result<(), WgwatchError> + Send + 'static,
{
    thread::spawn(move || {
        if let Err(e) = post() {
            log::error!("webhook post failed: {e}");
        }
    });
}
