//! The REST backend as seen by the session layer.
//!
//! Responses are returned as raw JSON; turning them into canonical entities is
//! the normalizer's job, so every backend (HTTP or in-memory) is tolerated the
//! same defensive way.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use tradedesk_core::RecordId;
use tradedesk_invoicing::{PaymentPayload, VoidPayload};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request was superseded or aborted; never reported to the user.
    #[error("request cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
}

impl BackendError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Filters for the invoice list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    pub include_deleted: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: crate::preferences::DEFAULT_PAGE_SIZE,
            search: None,
            status: None,
            payment_status: None,
            include_deleted: false,
        }
    }
}

#[async_trait]
pub trait InvoiceBackend: Send + Sync + 'static {
    async fn fetch_invoice(&self, invoice_id: &RecordId) -> Result<Value, BackendError>;

    /// One page of invoices in whatever envelope the server uses.
    async fn list_invoices(&self, query: &ListQuery) -> Result<Value, BackendError>;

    /// Record a payment; returns the server's recomputed invoice.
    async fn add_payment(&self, payload: &PaymentPayload) -> Result<Value, BackendError>;

    /// Void a payment; returns the server's recomputed invoice.
    async fn void_payment(&self, payload: &VoidPayload) -> Result<Value, BackendError>;

    async fn calculate_commission(&self, invoice_id: &RecordId) -> Result<Value, BackendError>;
}

pub mod memory {
    //! In-process backend that recomputes balances the way the server does.

    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::{Value, json};

    use tradedesk_core::{CurrencyPrecision, RecordId};
    use tradedesk_invoicing::{
        Invoice, PaymentPayload, PaymentRecord, VoidPayload, recompute_balances, to_canonical_json,
    };

    use super::{BackendError, InvoiceBackend, ListQuery};

    #[derive(Debug, Default)]
    struct Inner {
        invoices: BTreeMap<RecordId, Invoice>,
        next_payment: u64,
        payment_failures: VecDeque<BackendError>,
        fetch_failures: VecDeque<BackendError>,
        commission_failure: Option<BackendError>,
        commission_calls: Vec<RecordId>,
        list_calls: Vec<ListQuery>,
    }

    /// Thread-safe, in-memory stand-in for the REST API.
    #[derive(Debug, Default)]
    pub struct InMemoryBackend {
        inner: Mutex<Inner>,
        list_latency: Mutex<Option<Duration>>,
        payment_latency: Mutex<Option<Duration>>,
    }

    impl InMemoryBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_invoices(invoices: impl IntoIterator<Item = Invoice>) -> Self {
            let backend = Self::new();
            for invoice in invoices {
                backend.upsert(invoice);
            }
            backend
        }

        pub fn upsert(&self, invoice: Invoice) {
            self.lock().invoices.insert(invoice.id.clone(), invoice);
        }

        pub fn invoice(&self, invoice_id: &RecordId) -> Option<Invoice> {
            self.lock().invoices.get(invoice_id).cloned()
        }

        /// Fail the next add/void call with `err`.
        pub fn fail_next_payment(&self, err: BackendError) {
            self.lock().payment_failures.push_back(err);
        }

        pub fn fail_next_fetch(&self, err: BackendError) {
            self.lock().fetch_failures.push_back(err);
        }

        pub fn fail_commission(&self, err: Option<BackendError>) {
            self.lock().commission_failure = err;
        }

        pub fn set_list_latency(&self, latency: Option<Duration>) {
            *self
                .list_latency
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = latency;
        }

        /// Delay add/void calls before they touch any state.
        pub fn set_payment_latency(&self, latency: Option<Duration>) {
            *self
                .payment_latency
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = latency;
        }

        pub fn commission_calls(&self) -> Vec<RecordId> {
            self.lock().commission_calls.clone()
        }

        pub fn list_calls(&self) -> Vec<ListQuery> {
            self.lock().list_calls.clone()
        }

        async fn simulate(latency: &Mutex<Option<Duration>>) {
            let delay = *latency.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }

        fn lock(&self) -> MutexGuard<'_, Inner> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn not_found(invoice_id: &RecordId) -> BackendError {
            BackendError::Api {
                status: 404,
                body: format!("invoice {invoice_id} not found"),
            }
        }
    }

    #[async_trait]
    impl InvoiceBackend for InMemoryBackend {
        async fn fetch_invoice(&self, invoice_id: &RecordId) -> Result<Value, BackendError> {
            let mut inner = self.lock();
            if let Some(err) = inner.fetch_failures.pop_front() {
                return Err(err);
            }
            inner
                .invoices
                .get(invoice_id)
                .map(to_canonical_json)
                .ok_or_else(|| Self::not_found(invoice_id))
        }

        async fn list_invoices(&self, query: &ListQuery) -> Result<Value, BackendError> {
            Self::simulate(&self.list_latency).await;

            let mut inner = self.lock();
            inner.list_calls.push(query.clone());

            let needle = query.search.as_deref().map(str::to_lowercase);
            let matching: Vec<&Invoice> = inner
                .invoices
                .values()
                .filter(|i| query.include_deleted || !i.is_deleted())
                .filter(|i| match &needle {
                    Some(n) => {
                        i.invoice_number.to_lowercase().contains(n)
                            || i.customer.name.to_lowercase().contains(n)
                    }
                    None => true,
                })
                .filter(|i| query.status.as_deref().is_none_or(|s| i.status.as_str() == s))
                .collect();

            let page_size = query.page_size.max(1) as usize;
            let start = (query.page.max(1) as usize - 1) * page_size;
            let rows: Vec<Value> = matching
                .iter()
                .skip(start)
                .take(page_size)
                .map(|i| to_canonical_json(i))
                .collect();

            Ok(json!({
                "invoices": rows,
                "pagination": {
                    "currentPage": query.page.max(1),
                    "pageSize": page_size,
                    "totalItems": matching.len(),
                    "totalPages": matching.len().div_ceil(page_size).max(1),
                }
            }))
        }

        async fn add_payment(&self, payload: &PaymentPayload) -> Result<Value, BackendError> {
            Self::simulate(&self.payment_latency).await;
            let mut inner = self.lock();
            if let Some(err) = inner.payment_failures.pop_front() {
                return Err(err);
            }
            inner.next_payment += 1;
            let id = RecordId::from(format!("srv-{}", inner.next_payment));

            let invoice = inner
                .invoices
                .get_mut(&payload.invoice_id)
                .ok_or_else(|| Self::not_found(&payload.invoice_id))?;
            if payload.amount > invoice.outstanding {
                return Err(BackendError::Api {
                    status: 422,
                    body: "payment exceeds outstanding balance".into(),
                });
            }

            let payment_date = DateTime::parse_from_rfc3339(&payload.payment_date)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| BackendError::Api {
                    status: 400,
                    body: format!("invalid paymentDate: {e}"),
                })?;
            invoice.payments.push(PaymentRecord {
                id,
                amount: payload.amount,
                payment_date,
                method: payload.method,
                reference_no: payload.reference_no.clone(),
                notes: payload.notes.clone(),
                voided: false,
                voided_at: None,
                void_reason: None,
                voided_by: None,
            });
            recompute_balances(invoice, &CurrencyPrecision::default());
            Ok(to_canonical_json(invoice))
        }

        async fn void_payment(&self, payload: &VoidPayload) -> Result<Value, BackendError> {
            Self::simulate(&self.payment_latency).await;
            let mut inner = self.lock();
            if let Some(err) = inner.payment_failures.pop_front() {
                return Err(err);
            }
            let invoice = inner
                .invoices
                .get_mut(&payload.invoice_id)
                .ok_or_else(|| Self::not_found(&payload.invoice_id))?;
            let payment = invoice
                .payments
                .iter_mut()
                .find(|p| p.id == payload.payment_id)
                .ok_or_else(|| BackendError::Api {
                    status: 404,
                    body: format!("payment {} not found", payload.payment_id),
                })?;
            if payment.voided {
                return Err(BackendError::Api {
                    status: 409,
                    body: "payment already voided".into(),
                });
            }
            payment.voided = true;
            payment.voided_at = Some(Utc::now());
            payment.void_reason = Some(payload.reason.clone());
            payment.voided_by = payload.voided_by.clone();
            recompute_balances(invoice, &CurrencyPrecision::default());
            Ok(to_canonical_json(invoice))
        }

        async fn calculate_commission(&self, invoice_id: &RecordId) -> Result<Value, BackendError> {
            let mut inner = self.lock();
            inner.commission_calls.push(invoice_id.clone());
            match &inner.commission_failure {
                Some(err) => Err(err.clone()),
                None => Ok(json!({"invoiceId": invoice_id, "calculated": true})),
            }
        }
    }
}
