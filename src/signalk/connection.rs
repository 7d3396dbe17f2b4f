use super::delta::{is_malformed_delta, Delta, PathSubscription, ServerMessage, UnsubscribeRequest};
use super::subscription::{Subscription, SubscriptionFilter};
use crate::util::error::DynResult;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

/// Longest line accepted from the server
const MAX_LINE_LENGTH: usize = 1 << 20;

/// Newline delimited JSON stream from a Signal K server
pub struct Connection {
    writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
    deltas: Receiver<Delta>,
}

async fn read_connection<R>(r: R, send: Sender<Delta>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(r, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    while let Some(res) = lines.next().await {
        let line = match res {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read from server: {}", e);
                break;
            }
        };
        debug!("Got line: {}", line);
        match serde_json::from_str(&line) {
            Err(e) => {
                error!("Failed to parse message: {}", e);
            }
            Ok(ServerMessage::Hello(hello)) => {
                info!(
                    "Connected to {} {}",
                    hello.name.as_deref().unwrap_or("server"),
                    hello.version
                );
            }
            Ok(ServerMessage::Delta(delta)) => {
                if send.send(delta).await.is_err() {
                    break;
                }
            }
            Ok(ServerMessage::Other(msg)) if is_malformed_delta(&msg) => {
                warn!("Dropped malformed delta: {}", msg);
            }
            Ok(ServerMessage::Other(msg)) => {
                debug!("Ignored message: {}", msg);
            }
        }
    }
    debug!("Server connection closed");
}

impl Connection {
    pub async fn connect<A>(addr: A) -> std::io::Result<Connection>
    where
        A: ToSocketAddrs,
    {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Connection {
        let (r, w) = stream.into_split();
        let (delta_in, delta_out) = mpsc::channel(10);
        tokio::spawn(read_connection(r, delta_in));
        Connection {
            writer: FramedWrite::new(w, LinesCodec::new()),
            deltas: delta_out,
        }
    }

    async fn send<T: Serialize>(&mut self, msg: &T) -> DynResult<()> {
        let line = serde_json::to_string(msg)?;
        debug!("Cmd: {}", line);
        self.writer.send(line).await?;
        Ok(())
    }

    /// Next delta from the server. None when the connection is closed.
    pub async fn get_delta(&mut self) -> Option<Delta> {
        self.deltas.recv().await
    }

    pub async fn subscribe(&mut self, filter: SubscriptionFilter) -> DynResult<Subscription> {
        // The stream starts out sending everything about the own vessel
        let unsubscribe_all = UnsubscribeRequest {
            context: "*".to_string(),
            unsubscribe: vec![PathSubscription {
                path: "*".to_string(),
                policy: None,
            }],
        };
        self.send(&unsubscribe_all).await?;
        self.send(&filter.subscribe_request()).await?;
        debug!("Subscribed to {:?}", filter.paths);
        Ok(Subscription::new(filter))
    }

    pub async fn unsubscribe(&mut self, subscription: Subscription) -> DynResult<()> {
        self.send(&subscription.filter().unsubscribe_request())
            .await
    }
}

#[cfg(test)]
use test_log::test;

#[cfg(test)]
#[test(tokio::test)]
async fn test_subscribe_and_receive() {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (r, mut w) = stream.into_split();
        let mut lines = FramedRead::new(r, LinesCodec::new());
        w.write_all(
            b"{\"name\":\"signalk-server\",\"version\":\"2.8.0\",\"self\":\"vessels.self\",\"roles\":[\"main\"]}\n",
        )
        .await
        .unwrap();
        let mut received = Vec::new();
        received.push(lines.next().await.unwrap().unwrap());
        received.push(lines.next().await.unwrap().unwrap());
        w.write_all(b"this is not json\n").await.unwrap();
        w.write_all(b"{\"requestId\":\"1\",\"state\":\"COMPLETED\"}\n")
            .await
            .unwrap();
        w.write_all(
            b"{\"updates\":[{\"values\":[{\"path\":\"notifications.mob\",\"value\":{\"state\":\"emergency\",\"method\":[\"sound\"]}}]}]}\n",
        )
        .await
        .unwrap();
        received.push(lines.next().await.unwrap().unwrap());
        received
    });

    let mut conn = Connection::connect(addr).await.unwrap();
    let subscription = conn.subscribe(SubscriptionFilter::default()).await.unwrap();
    let delta = conn.get_delta().await.unwrap();
    assert_eq!(delta.updates[0].values[0].path, "notifications.mob");
    conn.unsubscribe(subscription).await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(
        received,
        vec![
            r#"{"context":"*","unsubscribe":[{"path":"*"}]}"#.to_string(),
            r#"{"context":"vessels.self","subscribe":[{"path":"notifications.*","policy":"instant"}]}"#
                .to_string(),
            r#"{"context":"vessels.self","unsubscribe":[{"path":"notifications.*"}]}"#
                .to_string(),
        ]
    );
    // The server side is gone
    assert_eq!(conn.get_delta().await, None);
}
