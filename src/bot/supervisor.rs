//! Message stream supervisor.
//!
//! One stream, one message at a time:
//!
//! ```text
//! CONNECTING --open ok--> STREAMING --clean end--> CONNECTING (attempts = 0)
//!     |                       |
//!     | open failed           | stream error
//!     v                       v
//!  BACKOFF <------------------+
//!     | attempts < max: sleep, then CONNECTING
//!     | attempts = max: STOPPED
//! ```
//!
//! The attempt counter resets once a message has been processed on a
//! stream. Per-message failures never leave STREAMING.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::error::Result;
use crate::game::GameStore;
use crate::transport::{Message, MessageStream, Transport, TransportError};

use super::commands::CommandRouter;
use super::groups::ResolvedGroups;
use super::membership::MembershipSync;
use super::replies;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Connecting,
    Streaming,
    Backoff,
    Stopped,
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Retry budget used up.
    Exhausted,
    Cancelled,
}

enum StreamEnd {
    Clean,
    Failed(TransportError),
    Cancelled,
}

pub struct StreamSupervisor {
    transport: Arc<dyn Transport>,
    router: CommandRouter,
    membership: MembershipSync,
    max_attempts: u32,
    retry_delay: Duration,
    state: SupervisorState,
    attempts: u32,
    processed: u64,
}

impl StreamSupervisor {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<GameStore>,
        groups: ResolvedGroups,
        config: &StreamConfig,
    ) -> Self {
        let router = CommandRouter::new(transport.clone(), store, groups.confession);
        let membership = MembershipSync::new(transport.clone(), groups.enroll);
        Self {
            transport,
            router,
            membership,
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay(),
            state: SupervisorState::Connecting,
            attempts: 0,
            processed: 0,
        }
    }

    /// Override the backoff delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Messages handed to the router or membership sync so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            tracing::debug!("Supervisor {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Consume the message stream until the retry budget is spent or `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) -> SupervisorExit {
        tracing::info!("Listening for messages");

        let exit = loop {
            self.transition(SupervisorState::Connecting);

            let opened = tokio::select! {
                _ = cancel.cancelled() => break SupervisorExit::Cancelled,
                opened = self.transport.stream_messages() => opened,
            };

            match opened {
                Ok(stream) => {
                    self.transition(SupervisorState::Streaming);
                    match self.consume(stream, &cancel).await {
                        StreamEnd::Clean => {
                            tracing::info!("Message stream ended, reconnecting");
                            self.attempts = 0;
                            continue;
                        }
                        StreamEnd::Cancelled => break SupervisorExit::Cancelled,
                        StreamEnd::Failed(e) => {
                            self.attempts += 1;
                            tracing::warn!(
                                "Message stream failed (attempt {}/{}): {}",
                                self.attempts,
                                self.max_attempts,
                                e
                            );
                        }
                    }
                }
                Err(e) => {
                    self.attempts += 1;
                    tracing::warn!(
                        "Could not open message stream (attempt {}/{}): {}",
                        self.attempts,
                        self.max_attempts,
                        e
                    );
                }
            }

            self.transition(SupervisorState::Backoff);
            if self.attempts >= self.max_attempts {
                tracing::error!(
                    "Giving up on the message stream after {} attempts",
                    self.attempts
                );
                break SupervisorExit::Exhausted;
            }

            tracing::info!("Retrying in {:?}", self.retry_delay);
            tokio::select! {
                _ = cancel.cancelled() => break SupervisorExit::Cancelled,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        };

        self.transition(SupervisorState::Stopped);
        tracing::info!("Supervisor stopped: {:?}", exit);
        exit
    }

    async fn consume(&mut self, mut stream: MessageStream, cancel: &CancellationToken) -> StreamEnd {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                next = stream.next() => next,
            };

            match next {
                None => return StreamEnd::Clean,
                Some(Err(e)) => return StreamEnd::Failed(e),
                Some(Ok(message)) => {
                    if self.handle_message(&message).await {
                        self.processed += 1;
                    }
                    if self.attempts != 0 {
                        tracing::debug!("Messages flowing, retry counter reset");
                        self.attempts = 0;
                    }
                }
            }
        }
    }

    /// Returns `false` when the message was filtered out.
    async fn handle_message(&self, message: &Message) -> bool {
        if message.is_from(self.transport.inbox_id()) {
            return false;
        }
        let Some(text) = message.text() else {
            tracing::trace!("Skipping {} ({})", message.id, message.content_type.type_id);
            return false;
        };

        tracing::debug!("Message {} from {}", message.id, message.sender_inbox_id);

        if let Err(e) = self.process(message, text).await {
            tracing::error!("Failed to process message {}: {}", message.id, e);
            self.apologize(message).await;
        }
        true
    }

    async fn process(&self, message: &Message, text: &str) -> Result<()> {
        let origin = self
            .transport
            .get_conversation(&message.conversation_id)
            .await?
            .ok_or_else(|| TransportError::NotFound(message.conversation_id.clone()))?;

        if self.router.handle(text, &origin).await {
            return Ok(());
        }

        self.membership
            .handle(&message.sender_inbox_id, &origin)
            .await
    }

    /// Best effort; groups never get the apology.
    async fn apologize(&self, message: &Message) {
        let conversation = match self
            .transport
            .get_conversation(&message.conversation_id)
            .await
        {
            Ok(Some(conversation)) => conversation,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Could not look up {} to apologise: {}", message.conversation_id, e);
                return;
            }
        };
        if conversation.is_group() {
            return;
        }
        if let Err(e) = self.transport.send(&conversation.id, replies::APOLOGY).await {
            tracing::warn!("Failed to send apology to {}: {}", conversation.id, e);
        }
    }
}
