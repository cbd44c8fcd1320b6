use crate::config::BrokerConfig;
use crate::metrics::BrokerMetrics;
use crate::queue::{InMemoryBroker, REPLY_QUEUE_PREFIX};
use work_queue_core::{Envelope, MessageBroker, TransportError};
use work_queue_protocol::{
    AckResponse, DeliveryResponse, Message, MessageCodec, NackKind, NackResponse, ReceiveRequest,
};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::codec::Framed;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

type Connection = Framed<TcpStream, MessageCodec>;

/// TCP front end exposing an [`InMemoryBroker`] to remote dispatchers and workers
pub struct BrokerServer {
    config: Arc<BrokerConfig>,
    broker: Arc<InMemoryBroker>,
    shutdown: Arc<Notify>,
}

impl BrokerServer {
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_broker(config, Arc::new(InMemoryBroker::new()))
    }

    pub fn with_broker(config: BrokerConfig, broker: Arc<InMemoryBroker>) -> Self {
        BrokerServer {
            config: Arc::new(config),
            broker,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.network.host, self.config.network.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("Broker listening on {}", addr);

        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    error!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutting down broker");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a client connection.
    ///
    /// Reply queues declared over the connection are exclusive to it: other
    /// connections may publish to them but not receive from or delete them.
    /// They are deleted once the connection closes, whatever the reason.
    async fn handle_connection(&self, stream: TcpStream) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, MessageCodec);
        let mut reply_queues = Vec::new();

        self.metrics().connections_open.inc();
        let result = self.serve_connection(&mut framed, &mut reply_queues).await;
        self.metrics().connections_open.dec();

        for queue in reply_queues {
            if let Err(e) = self.broker.delete_queue(&queue).await {
                warn!("Failed to delete reply queue {}: {}", queue, e);
            }
        }

        result
    }

    async fn serve_connection(
        &self,
        framed: &mut Connection,
        reply_queues: &mut Vec<String>,
    ) -> anyhow::Result<()> {
        while let Some(result) = framed.next().await {
            let message = match result {
                Ok(message) => message,
                Err(e) => {
                    error!("Protocol error: {}", e);
                    break;
                }
            };

            let response = match message {
                Message::Receive(req) if is_foreign_reply_queue(&req.queue, reply_queues) => {
                    foreign_reply_queue(&req.queue)
                }
                Message::Receive(req) => {
                    let queue = req.queue.clone();
                    match self.handle_receive(req, framed).await {
                        Some(Message::Delivery(DeliveryResponse {
                            envelope: Some(envelope),
                        })) => {
                            self.deliver(framed, &queue, envelope).await?;
                            continue;
                        }
                        Some(response) => response,
                        None => {
                            debug!("Client went away during receive");
                            break;
                        }
                    }
                }
                other => self.handle_message(other, reply_queues).await,
            };

            framed.send(response).await?;
        }

        Ok(())
    }

    /// Handle a protocol message
    async fn handle_message(&self, message: Message, reply_queues: &mut Vec<String>) -> Message {
        match message {
            Message::DeclareQueue(req) => match self.broker.declare_queue(&req.queue).await {
                Ok(()) => ack(None),
                Err(e) => nack(e),
            },
            Message::DeclareReplyQueue(_) => match self.broker.declare_reply_queue().await {
                Ok(queue) => {
                    reply_queues.push(queue.clone());
                    ack(Some(queue))
                }
                Err(e) => nack(e),
            },
            Message::DeleteQueue(req) if is_foreign_reply_queue(&req.queue, reply_queues) => {
                foreign_reply_queue(&req.queue)
            }
            Message::DeleteQueue(req) => {
                reply_queues.retain(|queue| queue != &req.queue);
                match self.broker.delete_queue(&req.queue).await {
                    Ok(()) => ack(None),
                    Err(e) => nack(e),
                }
            }
            Message::Publish(req) => match self.broker.publish(&req.queue, req.envelope).await {
                Ok(()) => ack(None),
                Err(e) => nack(e),
            },
            _ => Message::Nack(NackResponse {
                kind: NackKind::Rejected,
                error: "Unsupported message type".to_string(),
            }),
        }
    }

    /// Wait for a delivery while watching the connection.
    ///
    /// Clients never pipeline requests, so anything readable during a receive
    /// means the peer is gone. Returns `None` in that case; the pending receive
    /// is dropped before it takes an envelope off the queue.
    async fn handle_receive(&self, req: ReceiveRequest, framed: &mut Connection) -> Option<Message> {
        let timeout = req.timeout_ms.map(Duration::from_millis);

        tokio::select! {
            result = self.broker.receive(&req.queue, timeout) => Some(match result {
                Ok(envelope) => Message::Delivery(DeliveryResponse { envelope }),
                Err(e) => nack(e),
            }),
            _ = framed.next() => None,
        }
    }

    /// Send a delivery, putting the envelope back at the head of its queue
    /// if the frame cannot be written
    async fn deliver(
        &self,
        framed: &mut Connection,
        queue: &str,
        envelope: Envelope,
    ) -> anyhow::Result<()> {
        let response = Message::Delivery(DeliveryResponse {
            envelope: Some(envelope.clone()),
        });

        if let Err(e) = framed.send(response).await {
            warn!("Delivery from {} failed, requeueing: {}", queue, e);
            self.broker.requeue_front(queue, envelope);
            return Err(e.into());
        }
        Ok(())
    }

    /// Get the broker behind the server
    pub fn broker(&self) -> Arc<InMemoryBroker> {
        self.broker.clone()
    }

    /// Get metrics registry
    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        self.broker.metrics()
    }

    /// Shutdown the broker
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

fn is_foreign_reply_queue(queue: &str, reply_queues: &[String]) -> bool {
    queue.starts_with(REPLY_QUEUE_PREFIX) && !reply_queues.iter().any(|owned| owned == queue)
}

fn foreign_reply_queue(queue: &str) -> Message {
    Message::Nack(NackResponse {
        kind: NackKind::Rejected,
        error: format!("Reply queue {} belongs to another connection", queue),
    })
}

fn ack(queue: Option<String>) -> Message {
    Message::Ack(AckResponse { queue })
}

fn nack(err: TransportError) -> Message {
    let (kind, error) = match err {
        TransportError::QueueNotFound(queue) => (NackKind::QueueNotFound, queue),
        TransportError::QueueDeleted(queue) => (NackKind::QueueDeleted, queue),
        other => (NackKind::Rejected, other.to_string()),
    };
    Message::Nack(NackResponse { kind, error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use work_queue_core::Task;
    use work_queue_protocol::{
        DeclareQueueRequest, DeclareReplyQueueRequest, DeleteQueueRequest, PublishRequest,
    };

    async fn start() -> (Arc<BrokerServer>, std::net::SocketAddr) {
        let server = Arc::new(BrokerServer::new(BrokerConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.clone().serve(listener));
        (server, addr)
    }

    async fn connect(addr: std::net::SocketAddr) -> Connection {
        Framed::new(TcpStream::connect(addr).await.unwrap(), MessageCodec)
    }

    async fn request(framed: &mut Connection, message: Message) -> Message {
        framed.send(message).await.unwrap();
        framed.next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_publish_then_receive() {
        let (_server, addr) = start().await;
        let mut framed = connect(addr).await;

        let declared = request(
            &mut framed,
            Message::DeclareQueue(DeclareQueueRequest {
                queue: "work".to_string(),
            }),
        )
        .await;
        assert!(matches!(declared, Message::Ack(_)));

        let task = Task::new("echo", b"ping".to_vec()).unwrap();
        let published = request(
            &mut framed,
            Message::Publish(PublishRequest {
                queue: "work".to_string(),
                envelope: Envelope::for_task(&task).unwrap(),
            }),
        )
        .await;
        assert!(matches!(published, Message::Ack(_)));

        let delivered = request(
            &mut framed,
            Message::Receive(ReceiveRequest {
                queue: "work".to_string(),
                timeout_ms: Some(1000),
            }),
        )
        .await;

        match delivered {
            Message::Delivery(DeliveryResponse {
                envelope: Some(envelope),
            }) => assert_eq!(envelope.decode_task().unwrap(), task),
            other => panic!("Expected delivery, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_from_unknown_queue_is_nacked() {
        let (_server, addr) = start().await;
        let mut framed = connect(addr).await;

        let response = request(
            &mut framed,
            Message::Receive(ReceiveRequest {
                queue: "missing".to_string(),
                timeout_ms: Some(10),
            }),
        )
        .await;

        match response {
            Message::Nack(nack) => {
                assert_eq!(nack.kind, NackKind::QueueNotFound);
                assert_eq!(nack.error, "missing");
            }
            other => panic!("Expected nack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reply_queue_removed_when_connection_closes() {
        let (server, addr) = start().await;
        let mut framed = connect(addr).await;

        let queue = match request(
            &mut framed,
            Message::DeclareReplyQueue(DeclareReplyQueueRequest {}),
        )
        .await
        {
            Message::Ack(AckResponse { queue: Some(queue) }) => queue,
            other => panic!("Expected ack with queue name, got {:?}", other),
        };
        assert!(server.broker().has_queue(&queue));

        drop(framed);

        for _ in 0..100 {
            if !server.broker().has_queue(&queue) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Reply queue {} outlived its connection", queue);
    }

    #[tokio::test]
    async fn test_reply_queue_is_exclusive_to_its_connection() {
        let (server, addr) = start().await;
        let mut owner = connect(addr).await;
        let mut other = connect(addr).await;

        let queue = match request(
            &mut owner,
            Message::DeclareReplyQueue(DeclareReplyQueueRequest {}),
        )
        .await
        {
            Message::Ack(AckResponse { queue: Some(queue) }) => queue,
            other => panic!("Expected ack with queue name, got {:?}", other),
        };

        // Anyone may publish a reply
        let task = Task::new("echo", b"reply".to_vec()).unwrap();
        let published = request(
            &mut other,
            Message::Publish(PublishRequest {
                queue: queue.clone(),
                envelope: Envelope::for_task(&task).unwrap(),
            }),
        )
        .await;
        assert!(matches!(published, Message::Ack(_)));

        let received = request(
            &mut other,
            Message::Receive(ReceiveRequest {
                queue: queue.clone(),
                timeout_ms: Some(10),
            }),
        )
        .await;
        let deleted = request(
            &mut other,
            Message::DeleteQueue(DeleteQueueRequest {
                queue: queue.clone(),
            }),
        )
        .await;
        for response in [received, deleted] {
            match response {
                Message::Nack(nack) => assert_eq!(nack.kind, NackKind::Rejected),
                other => panic!("Expected rejection, got {:?}", other),
            }
        }
        assert_eq!(server.broker().depth(&queue), Some(1));

        let delivered = request(
            &mut owner,
            Message::Receive(ReceiveRequest {
                queue: queue.clone(),
                timeout_ms: Some(1000),
            }),
        )
        .await;
        assert!(matches!(
            delivered,
            Message::Delivery(DeliveryResponse { envelope: Some(_) })
        ));
    }
}
