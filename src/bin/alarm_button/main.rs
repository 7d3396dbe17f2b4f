use clap::{Arg, Command};
use git_version::git_version;
use log::{debug, error, info, warn};
use std::path::Path;
use tokio::signal;
use tokio::time::{timeout, Duration};
use yd_alarm_button::controller::Controller;
use yd_alarm_button::daemon;
use yd_alarm_button::device::ChannelSink;
use yd_alarm_button::output;
use yd_alarm_button::read_config;
use yd_alarm_button::signalk::{Connection, SubscriptionFilter};
use yd_alarm_button::startup;

const DEFAULT_CONFIG_FILE: &str = "alarm_button.json";

/// Time allowed for queued commands to be written on exit
const OUTPUT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    let version = env!("CARGO_PKG_VERSION").to_string() + " " + git_version!(fallback = "unknown");
    let app_args = Command::new("YD alarm button")
        .version(version.as_str())
        .about("Plays the most severe Signal K notification on a Yacht Devices alarm button")
        .arg(
            Arg::new("CONF")
                .default_value(DEFAULT_CONFIG_FILE)
                .help("Configuration file"),
        );

    let app_args = daemon::add_args(app_args);
    let args = app_args.get_matches();

    daemon::start(&args);

    let conf_path = args.value_of("CONF").unwrap_or(DEFAULT_CONFIG_FILE);
    let config = match read_config::read_file(Path::new(conf_path)) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to read configuration file '{}': {}", conf_path, e);
            return;
        }
    };

    let writer = match output::open(&config.output).await {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to open command output: {}", e);
            return;
        }
    };
    let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut writing = tokio::spawn(output::write_commands(command_rx, writer));
    let sink = ChannelSink::new(command_tx);

    let mut conn = match Connection::connect(config.server.as_str()).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to connect to {}: {}", config.server, e);
            return;
        }
    };
    let subscription = match conn.subscribe(SubscriptionFilter::default()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to subscribe to notifications: {}", e);
            return;
        }
    };

    let mut controller = Controller::new(&config, sink.clone());
    // Alarms are handled while the device is being configured
    let mut configuring = Box::pin(startup::run(startup::sequence(&config), sink));
    let mut configured = false;
    let mut output_closed = false;

    daemon::ready(&format!(
        "Device {} bank {}, server {}, output {}",
        config.device_address, config.bank, config.server, config.output
    ));
    let reason = loop {
        tokio::select! {
            res = signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("Failed to wait for ctrl-c: {}", e);
                }
                break "Interrupted";
            },
            _ = &mut configuring, if !configured => {
                info!("Device configured");
                configured = true;
            },
            res = &mut writing => {
                output_closed = true;
                match res {
                    Ok(Ok(())) => error!("Command output closed"),
                    Ok(Err(e)) => error!("Failed to write commands to {}: {}", config.output, e),
                    Err(e) => error!("Command writer failed: {}", e),
                }
                break "Command output lost";
            },
            res = conn.get_delta() => {
                match res {
                    Some(delta) => {
                        if let Some(delta) = subscription.filter_delta(delta) {
                            controller.on_delta(&delta);
                        }
                    },
                    None => {
                        error!("Lost connection to {}", config.server);
                        break "Signal K connection lost";
                    }
                }
            }
        }
    };

    drop(controller.stop());
    drop(configuring);
    if let Err(e) = conn.unsubscribe(subscription).await {
        warn!("Failed to unsubscribe: {}", e);
    }
    if !output_closed {
        match timeout(OUTPUT_FLUSH_TIMEOUT, writing).await {
            Ok(Ok(Ok(()))) => debug!("Command output closed"),
            Ok(Ok(Err(e))) => error!("Failed to write commands: {}", e),
            Ok(Err(e)) => error!("Command writer failed: {}", e),
            Err(_) => warn!("Timed out writing remaining commands"),
        }
    }

    daemon::exiting(reason);
}
