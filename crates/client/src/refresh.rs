//! Invoice list loading where only the newest request may publish.
//!
//! Each `load` bumps a generation counter and aborts the previous request.
//! A response whose generation is no longer current is discarded, so a slow
//! search for "ac" can never overwrite the results for "acme".

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use tradedesk_invoicing::{InvoicePage, normalize_invoice_page};

use crate::backend::{BackendError, InvoiceBackend, ListQuery};

#[derive(Debug, Clone, Default)]
pub struct ListState {
    pub page: Option<InvoicePage>,
    pub query: Option<ListQuery>,
    pub loading: bool,
    pub error: Option<String>,
    /// Generation of the request that produced `page`.
    pub generation: u64,
}

pub struct ListRefresher<B> {
    backend: Arc<B>,
    state: Arc<Mutex<ListState>>,
    generation: Arc<AtomicU64>,
    in_flight: Option<JoinHandle<()>>,
}

impl<B: InvoiceBackend> ListRefresher<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(ListState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: None,
        }
    }

    /// Start loading `query`, superseding any request still in flight.
    pub async fn load(&mut self, query: ListQuery) -> u64 {
        if let Some(previous) = self.in_flight.take() {
            previous.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock().await;
            state.loading = true;
            state.error = None;
            state.query = Some(query.clone());
        }

        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);
        self.in_flight = Some(tokio::spawn(async move {
            let result = backend
                .list_invoices(&query)
                .await
                .map(|raw| normalize_invoice_page(&raw, "invoice_list"));
            let mut state = state.lock().await;
            if current.load(Ordering::SeqCst) != generation {
                tracing::debug!(generation, "discarding stale invoice list response");
                return;
            }
            state.loading = false;
            match result {
                Ok(page) => {
                    state.page = Some(page);
                    state.generation = generation;
                }
                Err(BackendError::Cancelled) => {}
                Err(err) => {
                    tracing::warn!(error = %err, generation, "invoice list request failed");
                    state.error = Some(err.to_string());
                }
            }
        }));
        generation
    }

    /// Abandon the in-flight request, if any.
    pub async fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.lock().await.loading = false;
    }

    /// Wait for the current request to finish.
    pub async fn settled(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            let _ = handle.await;
        }
    }

    pub async fn state(&self) -> ListState {
        self.state.lock().await.clone()
    }
}

impl<B> Drop for ListRefresher<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use std::time::Duration;
    use tradedesk_core::{Money, RecordId};
    use serde_json::{Value, json};
    use tradedesk_invoicing::{Invoice, PaymentPayload, VoidPayload, normalize_invoice};

    fn invoice(id: &str, number: &str, customer: &str) -> Invoice {
        normalize_invoice(
            &json!({
                "id": id,
                "invoiceNumber": number,
                "status": "issued",
                "customer": {"id": "c-1", "name": customer},
                "total": "100.00",
                "invoiceDate": "2025-05-01",
            }),
            "test",
        )
        .unwrap()
    }

    fn backend() -> Arc<InMemoryBackend> {
        Arc::new(InMemoryBackend::with_invoices([
            invoice("1", "INV-001", "Acme Trading"),
            invoice("2", "INV-002", "Blue Dunes"),
            invoice("3", "INV-003", "Acme Logistics"),
        ]))
    }

    fn search(text: &str) -> ListQuery {
        ListQuery {
            search: Some(text.to_string()),
            ..ListQuery::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn loads_and_normalizes_a_page() {
        let mut refresher = ListRefresher::new(backend());
        refresher.load(ListQuery::default()).await;
        refresher.settled().await;

        let state = refresher.state().await;
        assert!(!state.loading);
        let page = state.page.unwrap();
        assert_eq!(page.invoices.len(), 3);
        assert_eq!(page.pagination.total_items, 3);
        assert_eq!(page.invoices[0].total, Money::from_minor(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_request_wins_over_slower_older_one() {
        let backend = backend();
        backend.set_list_latency(Some(Duration::from_millis(300)));
        let mut refresher = ListRefresher::new(Arc::clone(&backend));

        refresher.load(search("a")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let latest = refresher.load(search("acme")).await;
        refresher.settled().await;

        let state = refresher.state().await;
        assert_eq!(state.generation, latest);
        let ids: Vec<RecordId> = state
            .page
            .unwrap()
            .invoices
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![RecordId::from("1"), RecordId::from("3")]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_loading_without_error() {
        let backend = backend();
        backend.set_list_latency(Some(Duration::from_secs(1)));
        let mut refresher = ListRefresher::new(backend);

        refresher.load(ListQuery::default()).await;
        assert!(refresher.state().await.loading);
        refresher.cancel().await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        let state = refresher.state().await;
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert!(state.page.is_none());
    }

    /// Answers every list call with the same canned result.
    struct Canned(Result<Value, BackendError>);

    #[async_trait::async_trait]
    impl InvoiceBackend for Canned {
        async fn fetch_invoice(&self, _: &RecordId) -> Result<Value, BackendError> {
            Err(BackendError::Network("offline".into()))
        }
        async fn list_invoices(&self, _: &ListQuery) -> Result<Value, BackendError> {
            self.0.clone()
        }
        async fn add_payment(&self, _: &PaymentPayload) -> Result<Value, BackendError> {
            Err(BackendError::Network("offline".into()))
        }
        async fn void_payment(&self, _: &VoidPayload) -> Result<Value, BackendError> {
            Err(BackendError::Network("offline".into()))
        }
        async fn calculate_commission(&self, _: &RecordId) -> Result<Value, BackendError> {
            Err(BackendError::Network("offline".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failures_surface_as_error_text() {
        let down = Canned(Err(BackendError::Network("offline".into())));
        let mut refresher = ListRefresher::new(Arc::new(down));
        refresher.load(ListQuery::default()).await;
        refresher.settled().await;

        let state = refresher.state().await;
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("network error: offline"));
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_amounts_still_publish_the_page() {
        let max = "79228162514264337593543950335";
        let rows = Canned(Ok(json!({
            "invoices": [
                {"id": "ok", "total": "5.00"},
                {"id": "big", "payments": [{"amount": max}, {"amount": max}]},
            ],
        })));
        let mut refresher = ListRefresher::new(Arc::new(rows));
        refresher.load(ListQuery::default()).await;
        refresher.settled().await;

        let state = refresher.state().await;
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert_eq!(state.page.map(|p| p.invoices.len()), Some(2));
    }
}
