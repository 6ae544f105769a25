//! Serialization shim between the protocol and the binary endpoint.
//!
//! The transport moves opaque bytes; the protocol speaks [`Message`]. The
//! shim encodes on the way out and decodes on the way in, dropping
//! malformed inbound payloads with a warning so a misbehaving peer can
//! never crash the follower.

use std::sync::Arc;

use async_trait::async_trait;
use oraclecore_core::{BinaryNetworkEndpoint, OracleId};
use oraclecore_protocol::{Message, MessageWithSender, NetSender};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Outbound half: encodes messages onto the endpoint.
pub(crate) struct SerializingEndpoint {
    endpoint: Arc<dyn BinaryNetworkEndpoint>,
}

impl SerializingEndpoint {
    pub(crate) fn new(endpoint: Arc<dyn BinaryNetworkEndpoint>) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl NetSender for SerializingEndpoint {
    async fn send_to(&self, msg: Message, to: OracleId) {
        let kind = msg.kind();
        if let Err(e) = self.endpoint.send_to(msg.encode(), to).await {
            warn!(kind, to, error = %e, "failed to send message");
        }
    }

    async fn broadcast(&self, msg: Message) {
        let kind = msg.kind();
        if let Err(e) = self.endpoint.broadcast(msg.encode()).await {
            warn!(kind, error = %e, "failed to broadcast message");
        }
    }
}

/// Inbound half: decodes endpoint payloads and feeds the follower's queue.
///
/// Exits when the endpoint closes, the follower goes away, or the protocol
/// instance is shut down.
pub(crate) async fn pump_inbound(
    endpoint: Arc<dyn BinaryNetworkEndpoint>,
    inbound: mpsc::Sender<MessageWithSender>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            received = endpoint.recv() => {
                let Some(binary) = received else {
                    debug!("endpoint closed, inbound pump exiting");
                    return;
                };
                let msg = match Message::decode(&binary.msg) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(sender = binary.sender, error = %e, "dropping undecodable message");
                        continue;
                    }
                };
                let with_sender = MessageWithSender { msg, sender: binary.sender };
                if inbound.send(with_sender).await.is_err() {
                    debug!("follower queue closed, inbound pump exiting");
                    return;
                }
            }
            _ = shutdown.recv() => {
                debug!("inbound pump winding down");
                return;
            }
        }
    }
}
