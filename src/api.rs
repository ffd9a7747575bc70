//! Backend REST client.
//!
//! Provides authenticated HTTP communication with the POS backend. Every
//! request carries the session's `Authorization: Token ...` header; failures
//! are mapped to user-friendly [`PosError::NetworkFailure`] messages.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::backend::PosBackend;
use crate::error::{PosError, PosResult};
use crate::models::{
    CreateOrderRequest, CreateOrderResponse, MainCategory, Order, OrderId, PayOrderRequest,
    PayOrderResponse, Product, ProductFilter, SubCategory, UpdateOrderAmountRequest,
    UpdateOrderItemsRequest, VatSetting, VoidOrderResponse,
};
use crate::session::Session;

/// Timeout used specifically for the lightweight connectivity test.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach POS server at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid POS server URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Your session is invalid or has expired. Please log in again.".to_string(),
        403 => "You are not allowed to perform this action".to_string(),
        404 => "POS server endpoint not found".to_string(),
        s if s >= 500 => format!("POS server error (HTTP {s})"),
        s => format!("Unexpected response from POS server (HTTP {s})"),
    }
}

/// Build the failure text for a non-2xx response, preferring the backend's
/// own `error` / `message` field.
fn error_detail(status: StatusCode, body_text: &str) -> String {
    let trimmed = body_text.trim();
    let message = match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => json
            .get("error")
            .or_else(|| json.get("message"))
            .or_else(|| json.get("detail"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| status_error(status)),
        Err(_) if !trimmed.is_empty() && trimmed.len() <= 200 => {
            format!("{}: {trimmed}", status_error(status))
        }
        Err(_) => status_error(status),
    };
    let tag = format!("(HTTP {})", status.as_u16());
    if message.contains(&tag) {
        message
    } else {
        format!("{message} {tag}")
    }
}

// ---------------------------------------------------------------------------
// Connectivity test
// ---------------------------------------------------------------------------

/// Result of a connectivity test.
#[derive(Debug, serde::Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ApiClient {
    client: Client,
    session: Arc<Session>,
}

impl ApiClient {
    pub fn new(session: Arc<Session>, timeout: Duration) -> PosResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PosError::NetworkFailure(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Test connectivity to the backend with the lightweight ping endpoint.
    pub async fn test_connectivity(&self) -> ConnectivityResult {
        let url = format!("{}/api/ping/", self.session.base_url());
        let start = Instant::now();

        let resp = match self
            .client
            .get(&url)
            .timeout(CONNECTIVITY_TIMEOUT)
            .header(AUTHORIZATION, self.session.authorization().as_str())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return ConnectivityResult {
                    success: false,
                    latency_ms: None,
                    error: Some(friendly_error(self.session.base_url(), &e)),
                };
            }
        };

        let latency = start.elapsed().as_millis() as u64;
        let status = resp.status();

        if status.is_success() {
            info!(latency_ms = latency, "connectivity test passed");
            ConnectivityResult {
                success: true,
                latency_ms: Some(latency),
                error: None,
            }
        } else {
            ConnectivityResult {
                success: false,
                latency_ms: Some(latency),
                error: Some(status_error(status)),
            }
        }
    }

    /// Perform an authenticated request and decode the JSON response.
    ///
    /// `path` includes the leading slash, e.g. `/api/orders/pending/`.
    /// Empty bodies (204) decode from `null`.
    async fn send_json<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> PosResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let base = self.session.base_url();
        let full_url = format!("{base}{path}");
        let start = Instant::now();

        let mut req = self
            .client
            .request(method.clone(), &full_url)
            .header(AUTHORIZATION, self.session.authorization().as_str())
            .header(CONTENT_TYPE, "application/json");
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await.map_err(|e| {
            warn!(%method, path, error = %e, "backend request failed");
            PosError::NetworkFailure(friendly_error(base, &e))
        })?;
        let status = resp.status();
        debug!(
            %method,
            path,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "backend request"
        );

        let body_text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let detail = error_detail(status, &body_text);
            warn!(%method, path, status = status.as_u16(), detail = %detail, "backend rejected request");
            return Err(PosError::NetworkFailure(detail));
        }

        let text = if body_text.trim().is_empty() {
            "null"
        } else {
            body_text.as_str()
        };
        serde_json::from_str(text)
            .map_err(|e| PosError::NetworkFailure(format!("Invalid JSON from POS server: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> PosResult<T> {
        self.send_json::<T, Value>(Method::GET, path, None).await
    }
}

#[async_trait]
impl PosBackend for ApiClient {
    async fn list_products(&self, filter: ProductFilter) -> PosResult<Vec<Product>> {
        let path = match filter.sub_category {
            Some(id) => format!("/api/products/?sub_category={id}"),
            None => "/api/products/".to_string(),
        };
        self.get_json(&path).await
    }

    async fn list_main_categories(&self) -> PosResult<Vec<MainCategory>> {
        self.get_json("/api/main-categories/").await
    }

    async fn list_sub_categories(&self) -> PosResult<Vec<SubCategory>> {
        self.get_json("/api/sub-categories/").await
    }

    async fn list_pending_orders(&self) -> PosResult<Vec<Order>> {
        self.get_json("/api/orders/pending/").await
    }

    async fn create_order(&self, req: &CreateOrderRequest) -> PosResult<CreateOrderResponse> {
        self.send_json(Method::POST, "/api/create-order/", Some(req))
            .await
    }

    async fn update_order_items(
        &self,
        order_id: OrderId,
        req: &UpdateOrderItemsRequest,
    ) -> PosResult<()> {
        let path = format!("/api/orders/update-order/{order_id}/");
        self.send_json::<Value, _>(Method::PATCH, &path, Some(req))
            .await
            .map(|_| ())
    }

    async fn update_order_amount(
        &self,
        order_id: OrderId,
        req: &UpdateOrderAmountRequest,
    ) -> PosResult<()> {
        let path = format!("/api/orders/update-order-amount/{order_id}/");
        self.send_json::<Value, _>(Method::PATCH, &path, Some(req))
            .await
            .map(|_| ())
    }

    async fn void_order(&self, order_id: OrderId) -> PosResult<VoidOrderResponse> {
        let path = format!("/api/orders/void/{order_id}/");
        let body = serde_json::json!({});
        let resp: Option<VoidOrderResponse> =
            self.send_json(Method::PATCH, &path, Some(&body)).await?;
        Ok(resp.unwrap_or_default())
    }

    async fn pay_order(
        &self,
        order_id: OrderId,
        req: &PayOrderRequest,
    ) -> PosResult<PayOrderResponse> {
        let path = format!("/api/orders/pay/{order_id}/");
        let resp: Option<PayOrderResponse> = self.send_json(Method::PATCH, &path, Some(req)).await?;
        Ok(resp.unwrap_or_default())
    }

    async fn vat_setting(&self) -> PosResult<VatSetting> {
        self.get_json("/api/vat-setting/").await
    }
}
