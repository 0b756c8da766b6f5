//! Telemetry sinks and the heartbeat side channel
//!
//! The orchestrator is the only producer of pipeline events for a session.
//! A heartbeat task may share the same channel; its frames carry no ordering
//! relationship with pipeline events.

use crate::error::PipelineError;
use async_trait::async_trait;
use genloop_core::TelemetryEvent;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Ordered destination for telemetry events
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Deliver one event. Fails once the observer is gone.
    async fn emit(&self, event: TelemetryEvent) -> Result<(), PipelineError>;

    /// Whether the observer has disconnected
    fn is_closed(&self) -> bool;
}

/// One unit on the transport
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Frame {
    Event(TelemetryEvent),
    Heartbeat(HeartbeatFrame),
}

/// `{"event":"heartbeat"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeartbeatFrame {
    event: &'static str,
}

impl Frame {
    pub fn heartbeat() -> Self {
        Self::Heartbeat(HeartbeatFrame { event: "heartbeat" })
    }

    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat(_))
    }

    /// Newline-terminated JSON
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Sink backed by a bounded mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
}

impl ChannelSink {
    /// Create a sink and the receiving half for the transport
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Sender for side-channel frames such as heartbeats
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<Frame> {
        self.tx.clone()
    }
}

#[async_trait]
impl TelemetrySink for ChannelSink {
    async fn emit(&self, event: TelemetryEvent) -> Result<(), PipelineError> {
        tracing::trace!(kind = event.kind(), "emit");
        self.tx
            .send(Frame::Event(event))
            .await
            .map_err(|_| PipelineError::SinkClosed)
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// In-memory sink that records every event
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<TelemetryEvent>>,
    closed: AtomicBool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Wire names of recorded events, in order
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(TelemetryEvent::kind).collect()
    }

    /// Simulate an observer disconnect
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TelemetrySink for CollectingSink {
    async fn emit(&self, event: TelemetryEvent) -> Result<(), PipelineError> {
        if self.is_closed() {
            return Err(PipelineError::SinkClosed);
        }
        self.events.lock().push(event);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Periodic keep-alive task; stops when dropped
#[derive(Debug)]
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Send a heartbeat frame every `every` until the channel closes
    pub fn spawn(tx: mpsc::Sender<Frame>, every: Duration) -> Self {
        let every = every.max(Duration::from_millis(10));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(Frame::heartbeat()).await.is_err() {
                    tracing::debug!("heartbeat channel closed");
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genloop_core::DonePayload;

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::channel(8);
        sink.emit(TelemetryEvent::started("s")).await.unwrap();
        sink.emit(TelemetryEvent::Done(DonePayload::completed("ok")))
            .await
            .unwrap();
        drop(sink);

        let mut kinds = Vec::new();
        while let Some(Frame::Event(ev)) = rx.recv().await {
            kinds.push(ev.kind());
        }
        assert_eq!(kinds, ["started", "done"]);
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelSink::channel(1);
        drop(rx);
        assert!(sink.is_closed());
        assert!(sink.emit(TelemetryEvent::started("s")).await.is_err());
    }

    #[test]
    fn heartbeat_frame_shape() {
        assert_eq!(
            Frame::heartbeat().to_json_line().unwrap(),
            "{\"event\":\"heartbeat\"}\n"
        );
    }

    #[tokio::test]
    async fn heartbeat_ticks_until_stopped() {
        let (tx, mut rx) = mpsc::channel(16);
        let hb = Heartbeat::spawn(tx, Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(180)).await;
        hb.stop();

        let mut beats = 0;
        while let Ok(frame) = rx.try_recv() {
            assert!(frame.is_heartbeat());
            beats += 1;
        }
        assert!((2..=4).contains(&beats), "got {beats} heartbeats");
    }
}
