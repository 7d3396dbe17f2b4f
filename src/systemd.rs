use clap::{Arg, ArgMatches, Command};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use systemd::daemon::notify;
use systemd::daemon::{STATE_READY, STATE_STATUS, STATE_STOPPING};
use systemd::journal::JournalLog;

static UNDER_SYSTEMD: AtomicBool = AtomicBool::new(true);

fn under_systemd() -> bool {
    UNDER_SYSTEMD.load(Ordering::Relaxed)
}

pub fn add_args(app_args: Command<'_>) -> Command<'_> {
    app_args.arg(
        Arg::new("no_systemd")
            .long("no_systemd")
            .help("Log to stderr and skip service notifications"),
    )
}

pub fn start(args: &ArgMatches) {
    UNDER_SYSTEMD.store(!args.is_present("no_systemd"), Ordering::Relaxed);
    if under_systemd() {
        if let Err(e) = JournalLog::init() {
            eprintln!("Failed to log to journal: {}", e);
        }
        log::set_max_level(log::LevelFilter::Info);
    } else {
        tracing_subscriber::fmt::init();
    }
    info!("Alarm button controller starting");
}

/// Report readiness, with a status line naming the device and its peers
pub fn ready(status: &str) {
    info!("Alarm button controller ready: {}", status);
    if under_systemd() {
        if let Err(e) = notify(false, [(STATE_READY, "1"), (STATE_STATUS, status)].iter()) {
            warn!("Failed to notify systemd of ready state: {}", e);
        }
    }
}

pub fn exiting(reason: &str) {
    info!("Alarm button controller exiting: {}", reason);
    if under_systemd() {
        if let Err(e) = notify(false, [(STATE_STOPPING, "1"), (STATE_STATUS, reason)].iter()) {
            warn!("Failed to notify systemd of stopping: {}", e);
        }
    }
}
