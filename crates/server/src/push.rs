//! The optional push stream: connect, forward frames, and on any error or
//! close schedule exactly one reconnect after a fixed delay.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use pixel_office_engine::protocol::PushFrame;
use pixel_office_engine::SourceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub type FrameStream = BoxStream<'static, Result<PushFrame, SourceError>>;

pub trait PushConnector: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<FrameStream, SourceError>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Opened,
    Frame(PushFrame),
    Lost(String),
}

/// A single pending reconnect. Scheduling while one is already pending is a
/// no-op, so a burst of errors still yields one reconnect.
#[derive(Debug)]
pub struct ReconnectTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl ReconnectTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn schedule(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Instant::now() + self.delay);
        true
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Sleeps until the pending deadline and clears it. Returns immediately
    /// when nothing is scheduled.
    pub async fn wait(&mut self) {
        if let Some(at) = self.deadline {
            tokio::time::sleep_until(at).await;
            self.deadline = None;
        }
    }
}

/// Runs until the receiving side goes away. Abort the task to cancel a
/// pending reconnect.
pub async fn run_push_stream(
    connector: Arc<dyn PushConnector>,
    delay: Duration,
    events: mpsc::Sender<PushEvent>,
) {
    let mut timer = ReconnectTimer::new(delay);
    loop {
        let reason = match connector.connect().await {
            Ok(mut stream) => {
                if events.send(PushEvent::Opened).await.is_err() {
                    return;
                }
                loop {
                    match stream.next().await {
                        Some(Ok(frame)) => {
                            if events.send(PushEvent::Frame(frame)).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(e)) => break e,
                        None => break SourceError::Closed,
                    }
                }
            }
            Err(e) => e,
        };

        tracing::warn!(error = %reason, delay_ms = delay.as_millis() as u64, "push stream lost; reconnecting");
        if events.send(PushEvent::Lost(reason.to_string())).await.is_err() {
            return;
        }
        timer.schedule();
        timer.wait().await;
    }
}
