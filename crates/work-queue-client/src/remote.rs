use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::debug;
use work_queue_core::{Envelope, MessageBroker, TransportError, TransportResult};
use work_queue_protocol::{
    AckResponse, DeclareQueueRequest, DeclareReplyQueueRequest, DeleteQueueRequest, Message,
    MessageCodec, NackKind, NackResponse, PublishRequest, ReceiveRequest,
};

type Connection = Framed<TcpStream, MessageCodec>;

/// [`MessageBroker`] backed by a `wq-broker` server over one TCP connection.
///
/// Requests are strictly sequential on the connection. A blocking `receive`
/// holds it until it returns, so a dispatcher and a worker in the same
/// process should each use their own `RemoteBroker`. Reply queues belong to
/// the connection and disappear with it.
pub struct RemoteBroker {
    broker_address: String,
    connection: Mutex<Option<Connection>>,
}

impl RemoteBroker {
    /// Connect to broker
    pub async fn connect(broker_address: impl Into<String>) -> TransportResult<Self> {
        let broker_address = broker_address.into();
        let framed = Self::open(&broker_address).await?;

        Ok(RemoteBroker {
            broker_address,
            connection: Mutex::new(Some(framed)),
        })
    }

    pub fn broker_address(&self) -> &str {
        &self.broker_address
    }

    async fn open(broker_address: &str) -> TransportResult<Connection> {
        let stream = TcpStream::connect(broker_address)
            .await
            .map_err(|e| TransportError::Unreachable(format!("{}: {}", broker_address, e)))?;
        Ok(Framed::new(stream, MessageCodec))
    }

    /// Send one request and wait for its response
    async fn request(&self, message: Message) -> TransportResult<Message> {
        // An unframeable message is a local error; the connection stays usable
        message.check_size()?;

        let mut slot = self.connection.lock().await;

        // Taken out for the whole exchange: if this future is dropped half way
        // the slot stays empty and the next request starts on a fresh socket
        let mut framed = match slot.take() {
            Some(framed) => framed,
            None => {
                debug!("Reconnecting to broker at {}", self.broker_address);
                Self::open(&self.broker_address).await?
            }
        };

        framed.send(message).await?;

        let response = match framed.next().await {
            Some(Ok(response)) => response,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(TransportError::Unreachable(
                    "Connection closed by broker".to_string(),
                ))
            }
        };

        *slot = Some(framed);
        Ok(response)
    }

    async fn request_ack(&self, message: Message) -> TransportResult<AckResponse> {
        match self.request(message).await? {
            Message::Ack(ack) => Ok(ack),
            Message::Nack(nack) => Err(nack_error(nack)),
            _ => Err(TransportError::Protocol("Unexpected response".to_string())),
        }
    }
}

fn nack_error(nack: NackResponse) -> TransportError {
    match nack.kind {
        NackKind::QueueNotFound => TransportError::QueueNotFound(nack.error),
        NackKind::QueueDeleted => TransportError::QueueDeleted(nack.error),
        NackKind::Rejected => TransportError::Rejected(nack.error),
    }
}

#[async_trait]
impl MessageBroker for RemoteBroker {
    async fn declare_queue(&self, queue: &str) -> TransportResult<()> {
        self.request_ack(Message::DeclareQueue(DeclareQueueRequest {
            queue: queue.to_string(),
        }))
        .await?;
        Ok(())
    }

    async fn declare_reply_queue(&self) -> TransportResult<String> {
        let ack = self
            .request_ack(Message::DeclareReplyQueue(DeclareReplyQueueRequest {}))
            .await?;
        ack.queue
            .ok_or_else(|| TransportError::Protocol("Reply queue name missing".to_string()))
    }

    async fn delete_queue(&self, queue: &str) -> TransportResult<()> {
        self.request_ack(Message::DeleteQueue(DeleteQueueRequest {
            queue: queue.to_string(),
        }))
        .await?;
        Ok(())
    }

    async fn publish(&self, queue: &str, envelope: Envelope) -> TransportResult<()> {
        self.request_ack(Message::Publish(PublishRequest {
            queue: queue.to_string(),
            envelope,
        }))
        .await?;
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> TransportResult<Option<Envelope>> {
        let request = Message::Receive(ReceiveRequest {
            queue: queue.to_string(),
            // Too many milliseconds for the wire means no timeout at all
            timeout_ms: timeout.and_then(|timeout| u64::try_from(timeout.as_millis()).ok()),
        });

        match self.request(request).await? {
            Message::Delivery(delivery) => Ok(delivery.envelope),
            Message::Nack(nack) => Err(nack_error(nack)),
            _ => Err(TransportError::Protocol("Unexpected response".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nack_kinds_map_to_transport_errors() {
        let not_found = nack_error(NackResponse {
            kind: NackKind::QueueNotFound,
            error: "work".to_string(),
        });
        assert!(matches!(not_found, TransportError::QueueNotFound(q) if q == "work"));

        let rejected = nack_error(NackResponse {
            kind: NackKind::Rejected,
            error: "Unsupported message type".to_string(),
        });
        assert!(matches!(rejected, TransportError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_oversized_publish_keeps_connection() {
        use std::sync::Arc;
        use work_queue_broker::{BrokerConfig, BrokerServer};
        use work_queue_protocol::MAX_MESSAGE_SIZE;

        let server = Arc::new(BrokerServer::new(BrokerConfig::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.clone().serve(listener));

        let broker = RemoteBroker::connect(addr.to_string()).await.unwrap();
        broker.declare_queue("work").await.unwrap();

        let oversized = Envelope::from_parts(None, None, vec![0u8; MAX_MESSAGE_SIZE]);
        match broker.publish("work", oversized).await {
            Err(TransportError::Protocol(message)) => assert!(message.contains("too large")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }

        let small = Envelope::from_parts(None, None, b"fits".to_vec());
        broker.publish("work", small).await.unwrap();

        assert_eq!(server.broker().depth("work"), Some(1));
        assert_eq!(server.metrics().connections_open.get(), 1);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_unreachable() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        match RemoteBroker::connect(addr.to_string()).await {
            Err(TransportError::Unreachable(_)) => {}
            Err(other) => panic!("Expected Unreachable, got {:?}", other),
            Ok(_) => panic!("Expected connection failure"),
        }
    }
}
