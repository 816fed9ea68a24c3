//! Connection driver — runs one generation from handshake to teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use campus_core::AppError;
use campus_core::config::ReconnectConfig;

use crate::message::Envelope;
use crate::transport::{Transport, TransportLink};

use super::key::ScopeKey;
use super::manager::Shared;
use super::state::{ChannelEvent, ChannelFailure, ChannelState, DisconnectReason};

enum Opened {
    Link(Box<dyn TransportLink>),
    Failed(AppError),
    Cancelled,
}

enum LinkEnd {
    Cancelled,
    Dropped(String),
}

/// Drives the transport for one connect request.
pub(crate) struct Driver {
    pub(crate) shared: Arc<Shared>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) policy: ReconnectConfig,
    pub(crate) handshake_timeout: Duration,
    pub(crate) key: ScopeKey,
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) outbound: mpsc::Receiver<Envelope>,
}

impl Driver {
    /// Runs until cancelled or the retry budget is spent.
    ///
    /// `previous` is the driver being replaced; its link is released before
    /// this one opens.
    pub(crate) async fn run(mut self, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        let mut link = match self.open().await {
            Opened::Link(link) => link,
            Opened::Cancelled => return,
            Opened::Failed(e) => {
                warn!(error = %e, "Realtime handshake failed");
                self.shared.transition(self.generation, |status| {
                    status.state = ChannelState::Disconnected;
                    vec![
                        ChannelEvent::Error {
                            failure: ChannelFailure::Failed,
                            message: e.to_string(),
                        },
                        ChannelEvent::Disconnected {
                            reason: DisconnectReason::HandshakeFailed,
                        },
                    ]
                });
                return;
            }
        };

        if !self.mark_connected() {
            debug!("Discarding handshake that completed after disconnect");
            link.close().await;
            return;
        }

        loop {
            match self.pump(link.as_mut()).await {
                LinkEnd::Cancelled => {
                    link.close().await;
                    debug!("Realtime link released");
                    return;
                }
                LinkEnd::Dropped(reason) => {
                    warn!(reason = %reason, "Realtime link dropped");
                    link.close().await;
                }
            }

            match self.reconnect().await {
                Some(next) => link = next,
                None => return,
            }
        }
    }

    async fn open(&self) -> Opened {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Opened::Cancelled,
            opened = tokio::time::timeout(self.handshake_timeout, self.transport.open(&self.key)) => {
                match opened {
                    Ok(Ok(link)) => Opened::Link(link),
                    Ok(Err(e)) => Opened::Failed(e),
                    Err(_) => Opened::Failed(AppError::transport(format!(
                        "Handshake timed out after {:?}",
                        self.handshake_timeout
                    ))),
                }
            }
        }
    }

    fn mark_connected(&self) -> bool {
        self.shared.transition(self.generation, |status| {
            status.state = ChannelState::Connected;
            info!(epoch = status.epoch, "Realtime connection established");
            vec![ChannelEvent::Connected {
                epoch: status.epoch,
            }]
        })
    }

    async fn pump(&mut self, link: &mut dyn TransportLink) -> LinkEnd {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return LinkEnd::Cancelled,
                frame = link.recv() => match frame {
                    Some(Ok(envelope)) => self.shared.dispatch(self.generation, envelope),
                    Some(Err(e)) => return LinkEnd::Dropped(e.to_string()),
                    None => return LinkEnd::Dropped("closed by peer".to_string()),
                },
                Some(envelope) = self.outbound.recv() => {
                    if let Err(e) = link.send(envelope).await {
                        return LinkEnd::Dropped(e.to_string());
                    }
                }
            }
        }
    }

    /// Retries with backoff on a fresh epoch.
    ///
    /// Returns the new link, or `None` once cancelled or out of attempts.
    async fn reconnect(&self) -> Option<Box<dyn TransportLink>> {
        let mut epoch = 0;
        let entered = self.shared.transition(self.generation, |status| {
            status.epoch += 1;
            status.state = ChannelState::Reconnecting;
            epoch = status.epoch;
            Vec::new()
        });
        if !entered {
            return None;
        }

        for attempt in 1..=self.policy.max_attempts {
            self.shared
                .notify(self.generation, ChannelEvent::Reconnecting { attempt, epoch });

            let delay = self.policy.delay_for(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.open().await {
                Opened::Link(mut link) => {
                    if self.mark_connected() {
                        return Some(link);
                    }
                    link.close().await;
                    return None;
                }
                Opened::Cancelled => return None,
                Opened::Failed(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                    self.shared.notify(
                        self.generation,
                        ChannelEvent::Error {
                            failure: ChannelFailure::Failed,
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        warn!(
            attempts = self.policy.max_attempts,
            "Realtime reconnect attempts exhausted"
        );
        self.shared.transition(self.generation, |status| {
            status.state = ChannelState::Disconnected;
            vec![
                ChannelEvent::Error {
                    failure: ChannelFailure::Fatal,
                    message: format!(
                        "Gave up after {} reconnect attempts",
                        self.policy.max_attempts
                    ),
                },
                ChannelEvent::Disconnected {
                    reason: DisconnectReason::RetriesExhausted,
                },
            ]
        });
        None
    }
}
