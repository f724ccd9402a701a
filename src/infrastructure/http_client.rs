use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{FieldErrors, GatewayError};
use crate::domain::list_query::{FetchParams, Page};
use crate::domain::order::{
    CustomerType, NewOrder, OrderLineItem, OrderStatus, OrderView, PaymentMethod,
};
use crate::domain::ports::{OrderGateway, PageFetcher, SessionProvider};

/// Body sent on create and update. The server re-prices it; the totals
/// travel along for display parity only.
#[derive(Debug, Serialize)]
struct OrderPayload<'a> {
    customer_id: &'a str,
    customer_name: &'a str,
    customer_type: CustomerType,
    status: OrderStatus,
    print_status: i32,
    payment_method: PaymentMethod,
    notes: Option<&'a str>,
    auto_delivery_cost: bool,
    delivery_cost: f64,
    discount_percent: f64,
    items: &'a [OrderLineItem],
    subtotal_gross: f64,
    grand_total: f64,
}

impl<'a> From<&'a NewOrder> for OrderPayload<'a> {
    fn from(order: &'a NewOrder) -> Self {
        Self {
            customer_id: &order.customer_id,
            customer_name: &order.customer_name,
            customer_type: order.customer_type,
            status: order.status,
            print_status: order.status.code(),
            payment_method: order.payment_method,
            notes: order.notes.as_deref(),
            auto_delivery_cost: order.auto_delivery_cost,
            delivery_cost: order.totals.delivery_cost,
            discount_percent: order.totals.order_discount_percent,
            items: &order.items,
            subtotal_gross: order.totals.subtotal_gross,
            grand_total: order.totals.grand_total,
        }
    }
}

/// Client for the remote order API. Every request carries the session's
/// bearer token; a 401 signs the session out.
pub struct HttpOrderClient<S> {
    client: Client,
    base_url: String,
    session: S,
}

impl<S: SessionProvider> HttpOrderClient<S> {
    pub fn new(base_url: impl Into<String>, session: S) -> Self {
        Self::with_client(Client::new(), base_url, session)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, session: S) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match self.session.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send the request and turn every non-success status into a
    /// [`GatewayError`].
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        let response = builder.send().await.map_err(|e| {
            warn!("order API request failed: {}", e);
            GatewayError::Failed(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        debug!("order API answered {}", status);

        match status {
            StatusCode::UNAUTHORIZED => {
                self.session.sign_out();
                Err(GatewayError::Unauthorized)
            }
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                Err(GatewayError::Validation(parse_field_errors(&body)))
            }
            _ => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                Err(GatewayError::Failed(error_message(&body, status)))
            }
        }
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GatewayError> {
        self.execute(builder)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Failed(format!("invalid response body: {}", e)))
    }
}

#[async_trait]
impl<S: SessionProvider> PageFetcher for HttpOrderClient<S> {
    type Item = OrderView;

    async fn fetch_page(
        &self,
        params: &FetchParams,
        cancel: CancellationToken,
    ) -> Result<Page<OrderView>, GatewayError> {
        let builder = self
            .request(Method::GET, "/orders")
            .query(&params.to_query());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            page = self.json::<Page<OrderView>>(builder) => page,
        }
    }
}

#[async_trait]
impl<S: SessionProvider> OrderGateway for HttpOrderClient<S> {
    async fn create(&self, order: &NewOrder) -> Result<OrderView, GatewayError> {
        let builder = self
            .request(Method::POST, "/orders")
            .json(&OrderPayload::from(order));
        self.json(builder).await
    }

    async fn update(&self, id: Uuid, order: &NewOrder) -> Result<OrderView, GatewayError> {
        let builder = self
            .request(Method::PUT, &format!("/orders/{}", id))
            .json(&OrderPayload::from(order));
        self.json(builder).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), GatewayError> {
        self.execute(self.request(Method::DELETE, &format!("/orders/{}", id)))
            .await
            .map(|_| ())
    }
}

/// Read field errors from a 422 body. Accepts a flat `{field: message}`
/// map, list-valued messages (the first one is kept) and an optional
/// `errors` envelope.
pub fn parse_field_errors(body: &Value) -> FieldErrors {
    let fields = match body.get("errors") {
        Some(Value::Object(inner)) => inner,
        _ => match body {
            Value::Object(map) => map,
            _ => return FieldErrors::new(),
        },
    };

    let mut errors = FieldErrors::new();
    for (field, value) in fields {
        let message = match value {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            Value::Null => None,
            other => Some(other.to_string()),
        };
        if let Some(message) = message {
            errors.add(field.clone(), message);
        }
    }
    errors
}

fn error_message(body: &Value, status: StatusCode) -> String {
    ["error", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("unexpected status {}", status))
}
