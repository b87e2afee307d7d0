//! Report notifications dispatched off the request path.
//!
//! The service hands each notice to [`ChannelNotifier`], which only enqueues
//! it. A detached worker drains the queue and raises the operator alert. A
//! full or closed queue drops the notice; the report itself is already stored.

use domain::{CoreError, ReportNotice, ReportNotifier};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<ReportNotice>,
}

impl ReportNotifier for ChannelNotifier {
    fn notify(&self, notice: ReportNotice) -> Result<(), CoreError> {
        self.tx.try_send(notice).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                CoreError::Repository("notification queue full".into())
            }
            mpsc::error::TrySendError::Closed(_) => {
                CoreError::Repository("notification worker stopped".into())
            }
        })
    }
}

/// Create a bounded notifier and the receiving end of its queue.
pub fn channel(capacity: usize) -> (ChannelNotifier, mpsc::Receiver<ReportNotice>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelNotifier { tx }, rx)
}

/// Spawn the worker that turns queued notices into operator alerts.
pub fn spawn_worker(mut rx: mpsc::Receiver<ReportNotice>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = rx.recv().await {
            alert(&notice);
        }
    })
}

fn alert(notice: &ReportNotice) {
    warn!(
        target: "report_alert",
        code = %notice.code,
        target_url = %notice.target_url,
        reason = %notice.reason,
        reported_at = %http_common::system_time_to_rfc3339(notice.reported_at),
        "short link reported"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ShortCode;
    use std::time::SystemTime;

    fn notice() -> ReportNotice {
        ReportNotice {
            code: ShortCode::new("abc123").unwrap(),
            target_url: "https://example.com".into(),
            reason: "spam".into(),
            reported_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn enqueues_without_blocking() {
        let (notifier, mut rx) = channel(2);
        notifier.notify(notice()).unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.code.as_str(), "abc123");
    }

    #[tokio::test]
    async fn full_or_closed_queue_is_an_error_not_a_wait() {
        let (notifier, rx) = channel(1);
        notifier.notify(notice()).unwrap();
        assert!(notifier.notify(notice()).is_err());
        drop(rx);
        assert!(notifier.notify(notice()).is_err());
    }

    #[tokio::test]
    async fn worker_drains_until_senders_drop() {
        let (notifier, rx) = channel(4);
        let handle = spawn_worker(rx);
        notifier.notify(notice()).unwrap();
        notifier.notify(notice()).unwrap();
        drop(notifier);
        handle.await.unwrap();
    }
}
