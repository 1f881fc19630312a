//! One transient success/error notice that dismisses itself after a timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<(u64, Banner)>,
    next_seq: u64,
}

/// Showing a new banner replaces the old one and restarts the timer.
pub struct BannerSlot {
    slot: Arc<Mutex<Slot>>,
    timeout: Duration,
    timer: Option<JoinHandle<()>>,
}

impl BannerSlot {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            timeout,
            timer: None,
        }
    }

    pub async fn show(&mut self, kind: BannerKind, message: impl Into<String>) {
        let seq = {
            let mut slot = self.slot.lock().await;
            slot.next_seq += 1;
            let seq = slot.next_seq;
            slot.current = Some((
                seq,
                Banner {
                    kind,
                    message: message.into(),
                },
            ));
            seq
        };

        if let Some(old) = self.timer.take() {
            old.abort();
        }
        let slot = Arc::clone(&self.slot);
        let timeout = self.timeout;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut slot = slot.lock().await;
            // A newer banner owns the slot now.
            if slot.current.as_ref().is_some_and(|(s, _)| *s == seq) {
                slot.current = None;
            }
        }));
    }

    pub async fn success(&mut self, message: impl Into<String>) {
        self.show(BannerKind::Success, message).await;
    }

    pub async fn error(&mut self, message: impl Into<String>) {
        self.show(BannerKind::Error, message).await;
    }

    pub async fn dismiss(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.slot.lock().await.current = None;
    }

    pub async fn current(&self) -> Option<Banner> {
        self.slot.lock().await.current.as_ref().map(|(_, b)| b.clone())
    }
}

impl Drop for BannerSlot {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn banner_disappears_after_timeout() {
        let mut banner = BannerSlot::new(Duration::from_secs(5));
        banner.success("Payment recorded").await;
        assert_eq!(
            banner.current().await.map(|b| b.kind),
            Some(BannerKind::Success)
        );

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert!(banner.current().await.is_some());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(banner.current().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_banner_restarts_the_timer() {
        let mut banner = BannerSlot::new(Duration::from_secs(5));
        banner.success("first").await;
        tokio::time::sleep(Duration::from_secs(4)).await;
        banner.error("second").await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        let shown = banner.current().await.unwrap();
        assert_eq!(shown.kind, BannerKind::Error);
        assert_eq!(shown.message, "second");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(banner.current().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_clears_immediately() {
        let mut banner = BannerSlot::new(Duration::from_secs(5));
        banner.error("boom").await;
        banner.dismiss().await;
        assert!(banner.current().await.is_none());
    }
}
