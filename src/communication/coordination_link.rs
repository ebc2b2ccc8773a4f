use crate::communication::messages::{CoordinationMessage, WIRE_SIZE};
use crate::errors::LinkError;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Sending end of a one-way coordination channel.
///
/// Works over any ordered byte stream (in-process duplex, pipe, socket).
/// Each message goes out as one fixed-size record, so no framing is added.
pub struct CoordinationSender<W> {
    writer: W,
    broken: bool,
}

impl<W: AsyncWrite + Unpin> CoordinationSender<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            broken: false,
        }
    }

    /// Writes one whole message. `false` means the channel is unusable; the
    /// link never retries, and every later send fails as well.
    pub async fn send(&mut self, message: &CoordinationMessage) -> bool {
        match self.try_send(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Coordination send for vehicle {} failed: {}",
                    message.vehicle_id(),
                    e
                );
                false
            }
        }
    }

    pub async fn try_send(&mut self, message: &CoordinationMessage) -> Result<(), LinkError> {
        if self.broken {
            return Err(LinkError::Closed);
        }
        let bytes = message.encode();
        let written = match self.writer.write_all(&bytes).await {
            Ok(()) => self.writer.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            self.broken = true;
            LinkError::Io(e)
        })
    }

    /// Graceful close: the receiver's next `receive` reports `Closed`.
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Coordination sender shutdown: {}", e);
        }
    }
}

/// Receiving end of a one-way coordination channel.
pub struct CoordinationReceiver<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> CoordinationReceiver<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Waits for the next whole message.
    ///
    /// End of stream on a record boundary is `Closed`. End of stream inside a
    /// record is `Truncated`, and the channel must be treated as dead.
    pub async fn receive(&mut self) -> Result<CoordinationMessage, LinkError> {
        let mut buf = [0u8; WIRE_SIZE];
        let mut filled = 0;
        while filled < WIRE_SIZE {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(if filled == 0 {
                    LinkError::Closed
                } else {
                    LinkError::Truncated {
                        expected: WIRE_SIZE,
                        received: filled,
                    }
                });
            }
            filled += n;
        }
        Ok(CoordinationMessage::decode(&buf)?)
    }
}

/// In-process link: a sender and the receiver it feeds.
pub fn coordination_link() -> (
    CoordinationSender<DuplexStream>,
    CoordinationReceiver<DuplexStream>,
) {
    // Room for a burst of messages before the writer waits on the reader.
    let (write_end, read_end) = tokio::io::duplex(WIRE_SIZE * 64);
    (
        CoordinationSender::new(write_end),
        CoordinationReceiver::new(read_end),
    )
}

/// A message as seen by the receiving intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerNotice {
    /// Intersection that received the message.
    pub receiver: String,
    pub message: CoordinationMessage,
}

/// Reaction of the receiving intersection to a peer announcement.
///
/// Notices are informational: the receiving controller is not preempted by
/// them. The announced vehicle preempts that controller by itself once it is
/// queued there as an emergency lane head.
pub trait PeerNotificationHandler: Send + 'static {
    fn on_notice(&mut self, notice: &PeerNotice);
}

impl<F> PeerNotificationHandler for F
where
    F: FnMut(&PeerNotice) + Send + 'static,
{
    fn on_notice(&mut self, notice: &PeerNotice) {
        self(notice)
    }
}

/// How a listener ended.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListenerReport {
    pub name: String,
    pub received: usize,
    pub emergencies: usize,
    /// Set when the channel failed rather than closing cleanly.
    pub failure: Option<String>,
}

/// Runs the listener actor for one link endpoint until the channel closes or
/// fails. Failures end the loop; nothing is retried.
pub fn spawn_listener<R, H>(
    name: impl Into<String>,
    mut receiver: CoordinationReceiver<R>,
    mut handler: H,
) -> JoinHandle<ListenerReport>
where
    R: AsyncRead + Unpin + Send + 'static,
    H: PeerNotificationHandler,
{
    let name = name.into();
    tokio::spawn(async move {
        let mut report = ListenerReport {
            name: name.clone(),
            ..ListenerReport::default()
        };
        info!("[{}-Listener] Listener started", name);
        loop {
            match receiver.receive().await {
                Ok(message) => {
                    report.received += 1;
                    info!(
                        "[{}-Listener] Received message for vehicle {} (type={}, emergency={}) from {} to {} via approach {} movement {}",
                        name,
                        message.vehicle_id(),
                        message.class(),
                        if message.is_emergency() { "yes" } else { "no" },
                        message.origin(),
                        message.destination(),
                        message.approach(),
                        message.movement()
                    );
                    if message.is_emergency() {
                        report.emergencies += 1;
                        info!(
                            "[{}-Listener] Preparing for incoming emergency vehicle {}",
                            name,
                            message.vehicle_id()
                        );
                    }
                    handler.on_notice(&PeerNotice {
                        receiver: name.clone(),
                        message,
                    });
                }
                Err(LinkError::Closed) => break,
                Err(e) => {
                    warn!("[{}-Listener] Channel failed: {}", name, e);
                    report.failure = Some(e.to_string());
                    break;
                }
            }
        }
        info!("[{}-Listener] Listener exiting", name);
        report
    })
}

/// Drains `outbox` into `sender`, so synchronous code (such as a vehicle's
/// access callback) can emit messages. Stops at the first failed send, or
/// when every outbox sender is dropped, closing the link either way.
/// Returns the number of messages delivered.
pub fn spawn_link_writer<W>(
    name: impl Into<String>,
    mut sender: CoordinationSender<W>,
    mut outbox: UnboundedReceiver<CoordinationMessage>,
) -> JoinHandle<usize>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        let mut delivered = 0;
        while let Some(message) = outbox.recv().await {
            if !sender.send(&message).await {
                warn!("[{}] Coordination link is down; dropping further notices", name);
                break;
            }
            delivered += 1;
        }
        sender.close().await;
        delivered
    })
}
