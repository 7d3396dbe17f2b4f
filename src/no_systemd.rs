use clap::{ArgMatches, Command};
use log::info;

pub fn add_args(app_args: Command<'_>) -> Command<'_> {
    app_args
}

pub fn start(_args: &ArgMatches) {
    tracing_subscriber::fmt::init();
    info!("Alarm button controller starting");
}

pub fn ready(status: &str) {
    info!("Alarm button controller ready: {}", status);
}

pub fn exiting(reason: &str) {
    info!("Alarm button controller exiting: {}", reason);
}
