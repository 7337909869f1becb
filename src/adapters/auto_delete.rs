//! Notification wrapper that retracts alert messages after the owner's
//! retention period.
//!
//! Retraction runs on a detached task and never affects the send result.
//! Pending retractions are lost if the process exits first.

use crate::domain::alert::OwnerId;
use crate::domain::error::EngineError;
use crate::ports::notification_port::{MessageHandle, NotificationPort, RetentionPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct AutoDeleteDispatcher {
    inner: Arc<dyn NotificationPort>,
    policy: Arc<dyn RetentionPolicy>,
}

impl AutoDeleteDispatcher {
    pub fn new(inner: Arc<dyn NotificationPort>, policy: Arc<dyn RetentionPolicy>) -> Self {
        Self { inner, policy }
    }

    fn schedule(&self, handle: MessageHandle, after: Duration) {
        let inner = Arc::clone(&self.inner);
        debug!(owner = handle.owner, message_id = handle.message_id, after_secs = after.as_secs(), "retraction scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Err(e) = inner.retract(&handle).await {
                warn!(owner = handle.owner, message_id = handle.message_id, error = %e, "retraction failed");
            }
        });
    }
}

#[async_trait]
impl NotificationPort for AutoDeleteDispatcher {
    async fn send(&self, owner: OwnerId, text: &str) -> Result<MessageHandle, EngineError> {
        let handle = self.inner.send(owner, text).await?;
        // The policy may hit the database; keep it off the runtime workers.
        let policy = Arc::clone(&self.policy);
        let retention = tokio::task::spawn_blocking(move || policy.retention(owner))
            .await
            .unwrap_or_else(|e| Err(EngineError::persistence(format!("retention task failed: {e}"))));
        match retention {
            Ok(Some(after)) => self.schedule(handle.clone(), after),
            Ok(None) => {}
            Err(e) => warn!(owner, error = %e, "retention lookup failed, message kept"),
        }
        Ok(handle)
    }

    async fn retract(&self, handle: &MessageHandle) -> Result<(), EngineError> {
        self.inner.retract(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        retracted: Mutex<Vec<MessageHandle>>,
        fail_retract: bool,
    }

    #[async_trait]
    impl NotificationPort for Recorder {
        async fn send(&self, owner: OwnerId, _text: &str) -> Result<MessageHandle, EngineError> {
            Ok(MessageHandle { owner, message_id: 42 })
        }

        async fn retract(&self, handle: &MessageHandle) -> Result<(), EngineError> {
            self.retracted.lock().unwrap().push(handle.clone());
            if self.fail_retract {
                return Err(EngineError::Delivery {
                    owner: handle.owner,
                    reason: "message too old".into(),
                });
            }
            Ok(())
        }
    }

    struct Minutes(Option<u64>);

    impl RetentionPolicy for Minutes {
        fn retention(&self, _owner: OwnerId) -> Result<Option<Duration>, EngineError> {
            Ok(self.0.map(|m| Duration::from_secs(m * 60)))
        }
    }

    struct Broken;

    impl RetentionPolicy for Broken {
        fn retention(&self, _owner: OwnerId) -> Result<Option<Duration>, EngineError> {
            Err(EngineError::persistence("database is locked"))
        }
    }

    /// Answers only once another task on the runtime has signalled.
    struct Waiting(Mutex<std::sync::mpsc::Receiver<()>>);

    impl RetentionPolicy for Waiting {
        fn retention(&self, _owner: OwnerId) -> Result<Option<Duration>, EngineError> {
            self.0
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| EngineError::persistence("runtime thread was blocked"))?;
            Ok(Some(Duration::from_secs(60)))
        }
    }

    #[tokio::test]
    async fn retention_lookup_runs_off_the_runtime_thread() {
        let (tx, rx) = std::sync::mpsc::channel();
        let inner = Arc::new(Recorder::default());
        let dispatcher = AutoDeleteDispatcher::new(inner.clone(), Arc::new(Waiting(Mutex::new(rx))));
        tokio::spawn(async move {
            let _ = tx.send(());
        });

        dispatcher.send(5, "hi").await.unwrap();
        tokio::time::pause();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(inner.retracted.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retracts_after_retention() {
        let inner = Arc::new(Recorder::default());
        let dispatcher = AutoDeleteDispatcher::new(inner.clone(), Arc::new(Minutes(Some(2))));

        dispatcher.send(5, "hi").await.unwrap();
        tokio::time::sleep(Duration::from_secs(119)).await;
        assert!(inner.retracted.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            *inner.retracted.lock().unwrap(),
            vec![MessageHandle { owner: 5, message_id: 42 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_message_without_retention() {
        let inner = Arc::new(Recorder::default());
        let dispatcher = AutoDeleteDispatcher::new(inner.clone(), Arc::new(Minutes(None)));

        dispatcher.send(5, "hi").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(inner.retracted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn send_succeeds_when_policy_or_retraction_fails() {
        let inner = Arc::new(Recorder {
            fail_retract: true,
            ..Recorder::default()
        });
        let broken = AutoDeleteDispatcher::new(inner.clone(), Arc::new(Broken));
        assert!(broken.send(5, "hi").await.is_ok());

        let failing = AutoDeleteDispatcher::new(inner.clone(), Arc::new(Minutes(Some(1))));
        assert!(failing.send(5, "hi").await.is_ok());
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(inner.retracted.lock().unwrap().len(), 1);
    }
}
