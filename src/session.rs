// Event pump between a transport and the reconciler
//
// One task owns the reconciler. Remote events and local commands are applied
// in the order they arrive on the input channel, outbound frames are flushed
// to the sink after every input, and stale typing indicators are swept on a
// timer.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::events::{Command, Event};
use crate::sync::Reconciler;
use crate::wire::{self, Frame};

const TYPING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Remote(Event),
    Local(Command),
}

/// Where outbound frames go. The transport behind it is not our concern.
#[async_trait]
pub trait OutboundSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;
}

/// Forwards frames to a channel, for a transport task to pick up
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl OutboundSink for ChannelSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|e| anyhow::anyhow!("Outbound channel closed: {}", e))
    }
}

pub struct Session<S: OutboundSink> {
    reconciler: Reconciler,
    sink: S,
}

impl<S: OutboundSink> Session<S> {
    pub fn new(reconciler: Reconciler, sink: S) -> Self {
        Self { reconciler, sink }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut Reconciler {
        &mut self.reconciler
    }

    /// Apply one input and flush whatever it queued
    pub async fn handle(&mut self, input: Input) {
        match input {
            Input::Remote(event) => self.reconciler.apply(event),
            Input::Local(command) => self.reconciler.execute(command),
        }
        self.flush().await;
    }

    /// Send queued frames. Failures are logged and dropped: the server
    /// resends what matters on reconnect.
    pub async fn flush(&mut self) {
        for outbound in self.reconciler.take_outbound() {
            let frame = wire::encode(&outbound);
            debug!("Sending {} frame", frame.event);
            if let Err(e) = self.sink.send(frame).await {
                error!("Failed to send outbound frame: {}", e);
            }
        }
    }

    /// Consume inputs until the channel closes, then hand back the state
    pub async fn run(mut self, mut rx: mpsc::Receiver<Input>) -> Reconciler {
        let mut sweep = tokio::time::interval(TYPING_SWEEP_INTERVAL);
        let mut handled: u64 = 0;

        loop {
            tokio::select! {
                input = rx.recv() => match input {
                    Some(input) => {
                        self.handle(input).await;
                        handled += 1;
                    }
                    None => break,
                },
                _ = sweep.tick() => {
                    let expired = self.reconciler.expire_typing(Utc::now());
                    if !expired.is_empty() {
                        debug!("Typing indicators expired for {:?}", expired);
                    }
                }
            }
        }

        info!("Session input closed after {} inputs", handled);
        self.reconciler
    }
}
