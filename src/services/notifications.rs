use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entities::temp_media;
use crate::models::{MediaTargetRef, MediaTransferDto, TempMediaUploadDto};

/// Lifecycle events emitted by the staging and transfer services
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TempMediaEvent {
    Uploaded {
        temp_media: temp_media::Model,
        upload_dto: TempMediaUploadDto,
    },
    Transferred {
        target: MediaTargetRef,
        transfer_dto: MediaTransferDto,
    },
    Expired {
        temp_media: temp_media::Model,
    },
}

impl TempMediaEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TempMediaEvent::Uploaded { .. } => "uploaded",
            TempMediaEvent::Transferred { .. } => "transferred",
            TempMediaEvent::Expired { .. } => "expired",
        }
    }
}

/// Receives lifecycle notifications.
///
/// `publish` runs inline on the task that performed the upload, transfer or
/// purge, so implementations must only hand the event off (push to a channel,
/// log a line). Sinks that do real I/O belong behind a
/// [`QueuedNotificationSink`]. A returned error is logged and never fails the
/// originating operation.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: &TempMediaEvent) -> anyhow::Result<()>;
}

/// Publish and swallow sink failures
pub(crate) fn notify(sink: &dyn NotificationSink, event: TempMediaEvent) {
    if let Err(e) = sink.publish(&event) {
        tracing::warn!("Notification sink rejected {} event: {}", event.kind(), e);
    }
}

/// Sink that drops every event
pub struct NoOpNotificationSink;

impl NotificationSink for NoOpNotificationSink {
    fn publish(&self, _event: &TempMediaEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink that writes each event to the tracing log
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn publish(&self, event: &TempMediaEvent) -> anyhow::Result<()> {
        match event {
            TempMediaEvent::Uploaded { upload_dto, .. } => tracing::info!(
                temp_media_id = %upload_dto.id,
                expires_at = %upload_dto.expires_at,
                "📥 Temporary media uploaded"
            ),
            TempMediaEvent::Transferred {
                target,
                transfer_dto,
            } => tracing::info!(
                model_type = %target.model_type,
                model_id = %target.model_id,
                collection = %transfer_dto.collection_name,
                transferred = transfer_dto.transferred_count,
                failed = transfer_dto.failed_count(),
                "📦 Temporary media transferred"
            ),
            TempMediaEvent::Expired { temp_media } => tracing::info!(
                temp_media_id = %temp_media.id,
                status = ?temp_media.status,
                "🧹 Temporary media purged"
            ),
        }
        Ok(())
    }
}

/// Sink that forwards events to an unbounded channel for async consumers
pub struct ChannelNotificationSink {
    sender: mpsc::UnboundedSender<TempMediaEvent>,
}

impl ChannelNotificationSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TempMediaEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelNotificationSink {
    fn publish(&self, event: &TempMediaEvent) -> anyhow::Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("notification receiver dropped"))
    }
}

/// Sink that queues events and publishes them to a slower sink on a
/// background task, one at a time and in order.
pub struct QueuedNotificationSink {
    sender: mpsc::UnboundedSender<TempMediaEvent>,
}

impl QueuedNotificationSink {
    /// Start the delivery task. It drains the queue and stops once every
    /// handle to the returned sink is dropped. Must be called from within a
    /// tokio runtime.
    pub fn spawn(inner: Arc<dyn NotificationSink>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<TempMediaEvent>();

        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let sink = inner.clone();
                let kind = event.kind();
                match tokio::task::spawn_blocking(move || sink.publish(&event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!("Notification sink rejected {} event: {}", kind, e)
                    }
                    Err(e) => tracing::error!("Notification delivery for {} event failed: {}", kind, e),
                }
            }
            tracing::debug!("Notification queue closed");
        });

        (Self { sender }, handle)
    }
}

impl NotificationSink for QueuedNotificationSink {
    fn publish(&self, event: &TempMediaEvent) -> anyhow::Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("notification queue closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn transferred() -> TempMediaEvent {
        TempMediaEvent::Transferred {
            target: MediaTargetRef {
                model_type: "product".into(),
                model_id: "1".into(),
            },
            transfer_dto: MediaTransferDto {
                collection_name: "gallery".into(),
                transferred_media: Vec::new(),
                transferred_count: 0,
                failures: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelNotificationSink::channel();
        notify(&sink, transferred());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "transferred");
    }

    #[test]
    fn test_dropped_receiver_does_not_panic() {
        let (sink, rx) = ChannelNotificationSink::channel();
        drop(rx);
        assert!(sink.publish(&transferred()).is_err());
        // swallowed by the helper
        notify(&sink, transferred());
    }

    struct SlowSink {
        delay: Duration,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl NotificationSink for SlowSink {
        fn publish(&self, event: &TempMediaEvent) -> anyhow::Result<()> {
            std::thread::sleep(self.delay);
            self.seen.lock().unwrap().push(event.kind());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_queued_sink_does_not_block_caller() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slow = SlowSink {
            delay: Duration::from_millis(300),
            seen: seen.clone(),
        };
        let (sink, worker) = QueuedNotificationSink::spawn(Arc::new(slow));

        let started = Instant::now();
        notify(&sink, transferred());
        notify(&sink, transferred());
        assert!(started.elapsed() < Duration::from_millis(100));

        // dropping the last handle lets the worker drain and stop
        drop(sink);
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["transferred", "transferred"]);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = TempMediaEvent::Uploaded {
            temp_media: crate::entities::temp_media::Model {
                id: "t1".into(),
                file_path: "t1.png".into(),
                original_name: "a.png".into(),
                mime_type: "image/png".into(),
                size_bytes: 3,
                checksum: "00".into(),
                session_id: Some("s1".into()),
                user_id: None,
                status: crate::entities::temp_media::TempMediaStatus::Active,
                created_at: Utc::now(),
                expires_at: Utc::now(),
                processed_at: None,
                claim_token: None,
                claimed_at: None,
            },
            upload_dto: TempMediaUploadDto {
                id: "t1".into(),
                url: "http://x/t1.png".into(),
                original_name: "a.png".into(),
                mime_type: "image/png".into(),
                size_bytes: 3,
                expires_at: Utc::now(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "uploaded");
        assert_eq!(json["temp_media"]["status"], "active");
    }
}
