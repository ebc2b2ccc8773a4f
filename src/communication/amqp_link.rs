use crate::communication::coordination_link::{PeerNotice, PeerNotificationHandler};
use crate::communication::messages::{CoordinationMessage, WIRE_SIZE};
use amiquip::{
    Connection, ConsumerMessage, ConsumerOptions, Exchange, Publish, QueueDeclareOptions,
    Result as AmiquipResult,
};
use log::{info, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;

/// Publishes a copy of every coordination message sent on a link to a
/// RabbitMQ queue, so processes outside the run can follow emergency
/// transits. The body is the same fixed-size record used on the link.
///
/// Returns the tap to feed and the blocking publisher task. The task ends
/// once every tap is dropped.
pub fn start_coordination_mirror(
    amqp_url: String,
    queue_name: String,
) -> (
    UnboundedSender<CoordinationMessage>,
    JoinHandle<AmiquipResult<()>>,
) {
    let (tap, mut mirrored) = unbounded_channel::<CoordinationMessage>();
    let publisher = tokio::task::spawn_blocking(move || -> AmiquipResult<()> {
        let mut connection = Connection::insecure_open(&amqp_url)?;
        let channel = connection.open_channel(None)?;
        let exchange = Exchange::direct(&channel);
        channel.queue_declare(queue_name.as_str(), QueueDeclareOptions::default())?;
        info!("[CoordinationMirror] Publishing to '{}'", queue_name);

        while let Some(message) = mirrored.blocking_recv() {
            exchange.publish(Publish::new(&message.encode(), queue_name.as_str()))?;
        }
        connection.close()
    });
    (tap, publisher)
}

/// Consumes a mirrored coordination queue, handing each decoded record to
/// `handler` under the name `receiver`. A body that is not exactly one record
/// is a transport error and ends the consumer.
pub fn listen_coordination_queue<H: PeerNotificationHandler>(
    amqp_url: &str,
    queue_name: &str,
    receiver: &str,
    mut handler: H,
) -> AmiquipResult<()> {
    let mut connection = Connection::insecure_open(amqp_url)?;
    let channel = connection.open_channel(None)?;
    let queue = channel.queue_declare(queue_name, QueueDeclareOptions::default())?;
    let consumer = queue.consume(ConsumerOptions::default())?;
    info!("[{}] Waiting for coordination messages on '{}'", receiver, queue_name);

    for message in consumer.receiver() {
        match message {
            ConsumerMessage::Delivery(delivery) => {
                let decoded = <[u8; WIRE_SIZE]>::try_from(delivery.body.as_slice())
                    .map_err(|_| format!("body of {} bytes", delivery.body.len()))
                    .and_then(|record| {
                        CoordinationMessage::decode(&record).map_err(|e| e.to_string())
                    });
                consumer.ack(delivery)?;
                match decoded {
                    Ok(message) => handler.on_notice(&PeerNotice {
                        receiver: receiver.to_string(),
                        message,
                    }),
                    Err(reason) => {
                        warn!(
                            "[{}] Malformed coordination record ({}); stopping consumer",
                            receiver, reason
                        );
                        break;
                    }
                }
            }
            other => {
                info!("[{}] Coordination consumer ended: {:?}", receiver, other);
                break;
            }
        }
    }
    connection.close()
}
