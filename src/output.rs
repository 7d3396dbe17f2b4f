use crate::device::DeviceCommand;
use crate::read_config::STDOUT_OUTPUT;
use crate::util::error::DynResult;
use futures::SinkExt;
use log::{debug, error};
use std::pin::Pin;
use tokio::io::AsyncWrite;
use tokio::net::UnixStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::codec::{FramedWrite, LinesCodec};

pub type CommandOutput = Pin<Box<dyn AsyncWrite + Send>>;

/// Open standard output for "-", otherwise connect to a Unix socket
pub async fn open(name: &str) -> DynResult<CommandOutput> {
    if name == STDOUT_OUTPUT {
        Ok(Box::pin(tokio::io::stdout()))
    } else {
        let stream = UnixStream::connect(name)
            .await
            .map_err(|e| format!("Failed to connect to {}: {}", name, e))?;
        Ok(Box::pin(stream))
    }
}

/// Write every queued command as one JSON record per line until all
/// senders are gone.
pub async fn write_commands<W>(mut commands: UnboundedReceiver<DeviceCommand>, writer: W) -> DynResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut lines = FramedWrite::new(writer, LinesCodec::new());
    while let Some(command) = commands.recv().await {
        let line = match serde_json::to_string(&command) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode {:?}: {}", command, e);
                continue;
            }
        };
        debug!("{}: {}", command.event_name(), line);
        lines.send(line).await?;
    }
    Ok(())
}

#[cfg(test)]
use crate::sound_policy::Sound;
#[cfg(test)]
use std::task::{Context, Poll};
#[cfg(test)]
use test_log::test;

/// Output whose peer has gone away
#[cfg(test)]
struct BrokenOutput;

#[cfg(test)]
impl AsyncWrite for BrokenOutput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
#[test(tokio::test)]
async fn test_write_commands() {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tx.send(DeviceCommand::play(67, 10, Sound::from_config(Some(3))))
        .unwrap();
    tx.send(DeviceCommand::silence_all(67, 10)).unwrap();
    drop(tx);

    let mut buf = Vec::new();
    write_commands(rx, &mut buf).await.unwrap();
    let text = String::from_utf8(buf).unwrap();
    let records: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["Switch3"], "On");
    assert_eq!(records[0]["Switch2"], "Off");
    assert_eq!(records[1]["Switch3"], "Off");
}

#[cfg(test)]
#[test(tokio::test)]
async fn test_open_missing_socket() {
    assert!(open("/nonexistent/alarm_button.sock").await.is_err());
}

#[cfg(test)]
#[test(tokio::test)]
async fn test_write_failure_ends_writer() {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let writing = tokio::spawn(write_commands(rx, BrokenOutput));
    tx.send(DeviceCommand::play(67, 10, Sound::from_config(Some(2))))
        .unwrap();
    assert!(writing.await.unwrap().is_err());
    // Later commands have nowhere to go
    assert!(tx.send(DeviceCommand::silence_all(67, 10)).is_err());
}
