//! Network task: the second half of the two-task split.
//!
//! Owns all socket and HTTP work. The crypto side never touches the
//! network directly; it drives this task through [`NetCommand`] and
//! reads verdicts back as [`NetEvent`], each reply carrying the `seq`
//! of the command that caused it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{NetCommand, NetCommandKind, NetEvent, NetEventKind};
use crate::transport::Transport;

/// Runs until the command channel closes. The endpoint announced by the
/// last `Endpoint` command is held for the `Payload` that follows it.
pub async fn run(
    transport: Arc<dyn Transport>,
    mut commands: mpsc::Receiver<NetCommand>,
    events: mpsc::Sender<NetEvent>,
) {
    let mut current_endpoint: Option<String> = None;

    while let Some(NetCommand { seq, kind }) = commands.recv().await {
        let kind = match kind {
            NetCommandKind::Resolve { did } => match transport.resolve(&did).await {
                Ok(bytes) => {
                    debug!(%did, len = bytes.len(), "did document resolved");
                    NetEventKind::Document { bytes }
                }
                Err(e) => NetEventKind::ResolveFailed {
                    did,
                    reason: e.to_string(),
                },
            },
            NetCommandKind::Endpoint { endpoint } => {
                match transport.check_reachable(&endpoint).await {
                    Ok(()) => {
                        current_endpoint = Some(endpoint);
                        NetEventKind::Ready
                    }
                    Err(e) => {
                        warn!(%endpoint, error = %e, "endpoint unreachable");
                        current_endpoint = None;
                        NetEventKind::Unreachable { endpoint }
                    }
                }
            }
            NetCommandKind::Payload { bytes } => match current_endpoint.as_deref() {
                Some(endpoint) => match transport.deliver(endpoint, &bytes).await {
                    Ok(()) => {
                        info!(%endpoint, len = bytes.len(), "envelope delivered");
                        NetEventKind::Delivered
                    }
                    Err(e) => NetEventKind::DeliveryFailed {
                        reason: e.to_string(),
                    },
                },
                None => NetEventKind::DeliveryFailed {
                    reason: "payload without a ready endpoint".into(),
                },
            },
            NetCommandKind::Register { endpoint, payload } => {
                // Fire and forget: log the outcome, emit nothing.
                match transport.register(&endpoint, &payload).await {
                    Ok(()) => info!(%endpoint, "signing key published"),
                    Err(e) => warn!(%endpoint, error = %e, "signing key publication failed"),
                }
                continue;
            }
        };
        if events.send(NetEvent { seq, kind }).await.is_err() {
            break;
        }
    }
    debug!("network task shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;

    struct FlakyTransport;

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn resolve(&self, did: &str) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::ResolveFailed {
                did: did.to_string(),
                reason: "registry down".into(),
            })
        }
        async fn check_reachable(&self, _endpoint: &str) -> Result<(), TransportError> {
            Ok(())
        }
        async fn deliver(&self, _endpoint: &str, _payload: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
        async fn register(&self, _endpoint: &str, _payload: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn resolve_failure_becomes_an_event_not_a_crash() {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (evt_tx, mut evt_rx) = mpsc::channel(4);
        let task = tokio::spawn(run(Arc::new(FlakyTransport), cmd_rx, evt_tx));

        cmd_tx
            .send(NetCommand {
                seq: 3,
                kind: NetCommandKind::Resolve {
                    did: "did:batterypass:x".into(),
                },
            })
            .await
            .unwrap();
        let event = evt_rx.recv().await.unwrap();
        assert_eq!(event.seq, 3);
        match event.kind {
            NetEventKind::ResolveFailed { did, .. } => assert_eq!(did, "did:batterypass:x"),
            other => panic!("unexpected event: {other:?}"),
        }

        drop(cmd_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn payload_without_endpoint_is_rejected() {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (evt_tx, mut evt_rx) = mpsc::channel(4);
        let task = tokio::spawn(run(Arc::new(FlakyTransport), cmd_rx, evt_tx));

        cmd_tx
            .send(NetCommand {
                seq: 1,
                kind: NetCommandKind::Payload { bytes: vec![1, 2] },
            })
            .await
            .unwrap();
        let event = evt_rx.recv().await.unwrap();
        assert_eq!(event.seq, 1);
        assert!(matches!(event.kind, NetEventKind::DeliveryFailed { .. }));

        drop(cmd_tx);
        task.await.unwrap();
    }
}
