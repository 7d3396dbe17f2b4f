use crate::device::{CommandSink, DeviceCommand, YdCommand};
use crate::read_config::ButtonConfig;
use log::info;
use std::time::Duration;

/// Configuration commands for the device, each with the delay to wait
/// before sending it.
pub fn sequence(config: &ButtonConfig) -> Vec<(Duration, DeviceCommand)> {
    let dst = config.device_address;
    let mut commands = Vec::new();
    if let Some(mode) = config.mode {
        commands.push(YdCommand::Mode(mode));
    }
    commands.push(YdCommand::Bank(config.bank));
    commands.push(YdCommand::Volume(config.volume));

    commands
        .into_iter()
        .enumerate()
        .map(|(i, command)| {
            let delay = if i == 0 {
                config.startup_delay
            } else {
                config.volume_delay
            };
            (delay, DeviceCommand::Configure { dst, command })
        })
        .collect()
}

/// Send the commands in order, sleeping before each one. Returns the sink.
pub async fn run<S: CommandSink>(steps: Vec<(Duration, DeviceCommand)>, mut sink: S) -> S {
    for (delay, command) in steps {
        tokio::time::sleep(delay).await;
        if let DeviceCommand::Configure { command: yd, .. } = &command {
            info!("Configuring device: {}", yd);
        }
        sink.emit(command);
    }
    sink
}

#[cfg(test)]
use crate::device::DeviceMode;
#[cfg(test)]
use test_log::test;

#[test]
fn test_default_sequence() {
    let steps = sequence(&ButtonConfig::default());
    assert_eq!(
        steps,
        vec![
            (
                Duration::from_secs(5),
                DeviceCommand::Configure {
                    dst: 67,
                    command: YdCommand::Bank(10)
                }
            ),
            (
                Duration::from_secs(1),
                DeviceCommand::Configure {
                    dst: 67,
                    command: YdCommand::Volume(40)
                }
            ),
        ]
    );
}

#[test]
fn test_sequence_with_mode() {
    let config = ButtonConfig {
        mode: Some(DeviceMode::DigitalSwitching),
        startup_delay: Duration::from_secs(2),
        volume_delay: Duration::from_millis(300),
        ..ButtonConfig::default()
    };
    let steps: Vec<(Duration, YdCommand)> = sequence(&config)
        .into_iter()
        .map(|(delay, cmd)| match cmd {
            DeviceCommand::Configure { command, .. } => (delay, command),
            other => panic!("Unexpected command {:?}", other),
        })
        .collect();
    assert_eq!(
        steps,
        vec![
            (
                Duration::from_secs(2),
                YdCommand::Mode(DeviceMode::DigitalSwitching)
            ),
            (Duration::from_millis(300), YdCommand::Bank(10)),
            (Duration::from_millis(300), YdCommand::Volume(40)),
        ]
    );
}

#[cfg(test)]
#[test(tokio::test(start_paused = true))]
async fn test_run_waits() {
    let start = tokio::time::Instant::now();
    let sent = run(sequence(&ButtonConfig::default()), Vec::new()).await;
    assert_eq!(sent.len(), 2);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
}

#[cfg(test)]
#[test(tokio::test(start_paused = true))]
async fn test_nothing_sent_before_delay() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let sink = crate::device::ChannelSink::new(tx);
    let running = tokio::spawn(run(sequence(&ButtonConfig::default()), sink));
    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert!(rx.try_recv().is_err());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(matches!(
        rx.try_recv(),
        Ok(DeviceCommand::Configure {
            command: YdCommand::Bank(10),
            ..
        })
    ));
    running.await.unwrap();
    assert!(matches!(
        rx.try_recv(),
        Ok(DeviceCommand::Configure {
            command: YdCommand::Volume(40),
            ..
        })
    ));
}
