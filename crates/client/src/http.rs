//! reqwest-backed [`InvoiceBackend`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use tradedesk_core::RecordId;
use tradedesk_invoicing::{PaymentPayload, VoidPayload};

use crate::backend::{BackendError, InvoiceBackend, ListQuery};
use crate::config::ClientConfig;

/// Talks to the REST API under `api_url`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::new(api_url)
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        match &config.auth_token {
            Some(token) => Self::with_token(&config.api_url, token),
            None => Self::new(&config.api_url),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value, BackendError> {
        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Self::read_json(resp).await
    }

    async fn read_json(resp: Response) -> Result<Value, BackendError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        resp.json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[async_trait]
impl InvoiceBackend for HttpBackend {
    async fn fetch_invoice(&self, invoice_id: &RecordId) -> Result<Value, BackendError> {
        let req = self.client.get(self.url(&format!("/invoices/{invoice_id}")));
        self.send(req).await
    }

    async fn list_invoices(&self, query: &ListQuery) -> Result<Value, BackendError> {
        let req = self.client.get(self.url("/invoices")).query(query);
        self.send(req).await
    }

    async fn add_payment(&self, payload: &PaymentPayload) -> Result<Value, BackendError> {
        let path = format!("/invoices/{}/payments", payload.invoice_id);
        let req = self.client.post(self.url(&path)).json(payload);
        self.send(req).await
    }

    async fn void_payment(&self, payload: &VoidPayload) -> Result<Value, BackendError> {
        let path = format!(
            "/invoices/{}/payments/{}/void",
            payload.invoice_id, payload.payment_id
        );
        let req = self.client.post(self.url(&path)).json(payload);
        self.send(req).await
    }

    async fn calculate_commission(&self, invoice_id: &RecordId) -> Result<Value, BackendError> {
        let path = format!("/invoices/{invoice_id}/commission");
        self.send(self.client.post(self.url(&path))).await
    }
}
