use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use wgwatch::capture::PacketMonitor;
use wgwatch::cli::{Cli, MonitorKind};
use wgwatch::error::WgwatchError;
use wgwatch::track::{Tracker, TrackerConfig};
use wgwatch::wg::WgDumpClient;

/// Global shutdown flag, set by signal handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGHUP, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGQUIT, signal_handler as libc::sighandler_t);
    }
}

fn exit_code(err: &WgwatchError) -> i32 {
    match err {
        WgwatchError::InsufficientPermission(_) => 1,
        WgwatchError::Capture(_) | WgwatchError::Netlink(_) => 2,
        WgwatchError::Snapshot(_) => 3,
        _ => 4,
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(exit_code(&e));
    }
}

fn run(cli: Cli) -> Result<(), WgwatchError> {
    install_signal_handlers();

    let mut monitor = match cli.monitor {
        MonitorKind::Bpf => PacketMonitor::bpf(&cli.interface, &cli.filter),
        MonitorKind::Nflog => PacketMonitor::nflog(cli.group, None),
    };
    // Startup errors are fatal: nothing is spawned until both the capture
    // handle and the snapshot client are usable.
    monitor.open()?;
    let lister = WgDumpClient::new()?;

    let tracker = Arc::new(Tracker::new(
        Box::new(lister),
        cli.webhook.clone(),
        TrackerConfig::default(),
    ));

    let handler = {
        let tracker = Arc::clone(&tracker);
        thread::Builder::new()
            .name("wgwatch-tracker".into())
            .spawn(move || {
                if let Err(e) = tracker.run(monitor) {
                    log::error!("tracker terminated: {e}");
                }
            })
            .map_err(|e| WgwatchError::Fatal(format!("spawn tracker thread: {e}")))?
    };

    while !SHUTDOWN_REQUESTED.load(Ordering::Relaxed) && !handler.is_finished() {
        thread::sleep(Duration::from_millis(200));
    }

    log::info!("shutting down");
    tracker.stop();
    let _ = handler.join();
    Ok(())
}
