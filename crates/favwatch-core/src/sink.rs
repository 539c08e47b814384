//! Event sink implementations
//!
//! - [`ChannelSink`] hands output events to another task through a bounded
//!   `tokio::sync::mpsc` channel, exposed to the consumer as a stream.
//! - [`JsonLinesSink`] writes each event as one JSON line to an async writer
//!   (stdout in the daemon) and returns only after the line was flushed.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, Result};
use crate::traits::{EventSink, OutputEvent};

/// Event sink that forwards events into a bounded channel
///
/// Unlike the engine's monitoring channel, this one never drops: `emit`
/// waits for capacity, so a slow consumer slows the check down instead of
/// losing events.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<OutputEvent>,
}

impl ChannelSink {
    /// Create a sink and the stream that yields its events
    pub fn new(capacity: usize) -> (Self, ReceiverStream<OutputEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, ReceiverStream::new(rx))
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: OutputEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|e| Error::sink(format!("Event receiver dropped, lost event {}", e.0.id)))
    }
}

/// Event sink that writes newline-delimited JSON
///
/// A serialize, write or flush failure is returned from `emit`, so the
/// engine never saves a buffer whose events did not reach the writer.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap an async writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Take the writer back
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> EventSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, event: OutputEvent) -> Result<()> {
        let mut line = serde_json::to_vec(&event)
            .map_err(|e| Error::sink(format!("Failed to serialize event {}: {}", event.id, e)))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| Error::sink(format!("Failed to write event {}: {}", event.id, e)))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::sink(format!("Failed to flush event {}: {}", event.id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio_stream::StreamExt;

    fn event(id: &str) -> OutputEvent {
        OutputEvent {
            id: id.into(),
            created_at: Utc::now(),
            payload: serde_json::json!({ "id_str": id }),
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, mut stream) = ChannelSink::new(8);

        sink.emit(event("1")).await.unwrap();
        sink.emit(event("2")).await.unwrap();
        drop(sink);

        let mut received = Vec::new();
        while let Some(event) = stream.next().await {
            received.push(event.id.to_string());
        }
        assert_eq!(received, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_json_lines_one_event_per_line() {
        let sink = JsonLinesSink::new(Vec::new());

        sink.emit(event("1")).await.unwrap();
        sink.emit(event("2")).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], "1");
        assert_eq!(lines[1]["payload"]["id_str"], "2");
    }

    #[tokio::test]
    async fn test_closed_receiver_is_an_error() {
        let (sink, stream) = ChannelSink::new(1);
        drop(stream);

        let err = sink.emit(event("1")).await.unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
    }
}
