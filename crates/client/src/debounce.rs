//! Search-box debouncing for the invoice list filters.
//!
//! Free-text search waits for the user to stop typing; discrete filter changes
//! (status, page, page size) go out immediately and supersede any pending
//! search dispatch.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Search(String),
    Status(Option<String>),
    PaymentStatus(Option<String>),
    Page(u32),
    PageSize(u32),
    IncludeDeleted(bool),
}

impl FilterChange {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Search(_))
    }
}

pub struct SearchDebouncer {
    delay: Duration,
    tx: mpsc::UnboundedSender<FilterChange>,
    pending: Option<JoinHandle<()>>,
}

impl SearchDebouncer {
    /// Returns the debouncer and the receiving end of coalesced changes.
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<FilterChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                delay,
                tx,
                pending: None,
            },
            rx,
        )
    }

    pub fn push(&mut self, change: FilterChange) {
        self.cancel_pending();

        if !change.is_text() {
            if self.tx.send(change).is_err() {
                tracing::debug!("filter receiver dropped");
            }
            return;
        }

        let tx = self.tx.clone();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(change);
        }));
    }

    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(s: &str) -> FilterChange {
        FilterChange::Search(s.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_typing_dispatches_once() {
        let (mut debouncer, mut rx) = SearchDebouncer::new(Duration::from_millis(500));
        for text in ["a", "ac", "acm", "acme"] {
            debouncer.push(search(text));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(rx.try_recv().unwrap(), search("acme"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn discrete_changes_are_immediate_and_cancel_pending_search() {
        let (mut debouncer, mut rx) = SearchDebouncer::new(Duration::from_millis(500));
        debouncer.push(search("acme"));
        debouncer.push(FilterChange::Page(3));

        assert_eq!(rx.try_recv().unwrap(), FilterChange::Page(3));
        assert!(!debouncer.has_pending());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_debouncer_discards_pending_search() {
        let (mut debouncer, mut rx) = SearchDebouncer::new(Duration::from_millis(500));
        debouncer.push(search("acme"));
        drop(debouncer);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.recv().await.is_none());
    }
}
