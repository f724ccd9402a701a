use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::order_service::{clamp_params, OrderService};
use crate::domain::errors::{DomainError, FieldErrors};
use crate::domain::list_query::{ListDefaults, ListQueryState, SortType, Sorting};
use crate::domain::order::{
    CustomerRef, CustomerType, OrderDraft, OrderLineItem, OrderStatus, OrderView, PaymentMethod,
};
use crate::domain::ports::OrderRepository;
use crate::domain::pricing::{is_negative, PricingConfig, RawNumber};
use crate::errors::AppError;

/// The service as shared by the HTTP workers.
pub type SharedOrderService = OrderService<Box<dyn OrderRepository>>;

pub const DEFAULT_PER_PAGE: u32 = 20;

fn list_defaults() -> ListDefaults {
    ListDefaults {
        page: 1,
        per_page: DEFAULT_PER_PAGE,
        sorting: Sorting {
            by: "created_at".to_string(),
            direction: SortType::Desc,
        },
    }
}

// ── Request / response DTOs ──────────────────────────────────────────────────

/// Numbers may arrive as JSON numbers or numeric strings.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderLineRequest {
    pub product_id: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub quantity: RawNumber,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub unit_price: RawNumber,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub line_discount_percent: RawNumber,
}

/// Create/update payload. Client-side totals are ignored and recomputed.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderRequest {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    /// `p` (retail) or `m` (wholesale).
    #[serde(default)]
    pub customer_type: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub delivery_cost: RawNumber,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub discount_percent: RawNumber,
    #[serde(default)]
    pub auto_delivery_cost: bool,
    /// `pending`, `processing`, `completed` or `cancelled`.
    #[serde(default)]
    pub status: Option<String>,
    /// Legacy integer status, used when `status` is absent.
    #[serde(default)]
    pub print_status: Option<i32>,
    /// `ef`, `trans` or `mp`.
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderRequest {
    /// Build the draft the service validates. Problems only visible in the
    /// raw payload (unknown customer type, negative amounts sent as text)
    /// are reported together with the draft's own validation errors.
    pub fn into_draft(self, config: &PricingConfig) -> Result<OrderDraft, FieldErrors> {
        let mut errors = FieldErrors::new();

        let customer_type = match self.customer_type.as_deref() {
            None => CustomerType::default(),
            Some(raw) => raw.parse::<CustomerType>().unwrap_or_else(|_| {
                errors.add("customer_type", "Unknown customer type");
                CustomerType::default()
            }),
        };
        let customer = self
            .customer_id
            .filter(|id| !id.trim().is_empty())
            .map(|id| CustomerRef {
                id,
                name: self.customer_name.unwrap_or_default(),
                customer_type,
            });
        let status = match self.status {
            Some(status) => status.parse::<OrderStatus>().ok(),
            None => Some(OrderStatus::from_code(self.print_status.unwrap_or_default())),
        };

        for (index, line) in self.items.iter().enumerate() {
            if is_negative(&line.quantity) {
                errors.add(
                    format!("items.{}.quantity", index),
                    "Quantity must be greater than zero",
                );
            }
            if is_negative(&line.unit_price) {
                errors.add(
                    format!("items.{}.unit_price", index),
                    "Unit price cannot be negative",
                );
            }
        }

        let draft = OrderDraft {
            customer,
            items: self
                .items
                .into_iter()
                .map(|line| {
                    OrderLineItem::with_discount(
                        line.product_id,
                        line.product_name,
                        line.quantity,
                        line.unit_price,
                        line.line_discount_percent,
                        config,
                    )
                })
                .collect(),
            delivery_cost: self.delivery_cost,
            discount_percent: self.discount_percent,
            auto_delivery_cost: self.auto_delivery_cost,
            status,
            payment_method: self
                .payment_method
                .and_then(|v| v.parse::<PaymentMethod>().ok()),
            notes: self.notes.unwrap_or_default(),
        };

        if errors.is_empty() {
            return Ok(draft);
        }
        if let Err(more) = draft.validate() {
            errors.merge(more);
        }
        Err(errors)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub line_discount_percent: f64,
    pub line_subtotal: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_type: String,
    pub status: String,
    pub print_status: i32,
    pub payment_method: String,
    pub notes: Option<String>,
    pub auto_delivery_cost: bool,
    pub subtotal_gross: f64,
    pub order_discount_percent: f64,
    pub discount_amount: f64,
    pub delivery_cost: f64,
    pub grand_total: f64,
    pub items: Vec<OrderLineResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderView> for OrderResponse {
    fn from(o: OrderView) -> Self {
        Self {
            id: o.id,
            customer_id: o.customer_id,
            customer_name: o.customer_name,
            customer_type: o.customer_type.code().to_string(),
            status: o.status.as_str().to_string(),
            print_status: o.status.code(),
            payment_method: o.payment_method.code().to_string(),
            notes: o.notes,
            auto_delivery_cost: o.auto_delivery_cost,
            subtotal_gross: o.totals.subtotal_gross,
            order_discount_percent: o.totals.order_discount_percent,
            discount_amount: o.totals.discount_amount,
            delivery_cost: o.totals.delivery_cost,
            grand_total: o.totals.grand_total,
            items: o
                .items
                .into_iter()
                .map(|l| OrderLineResponse {
                    product_id: l.product_id,
                    product_name: l.product_name,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    line_discount_percent: l.line_discount_percent,
                    line_subtotal: l.line_subtotal,
                })
                .collect(),
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersResponse {
    pub data: Vec<OrderResponse>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub last_page: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationErrorResponse {
    /// Field name → message.
    pub errors: BTreeMap<String, String>,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /orders
///
/// Returns one page of orders with their lines. `page`, `perPage`, `sortBy`
/// and `sortType` control paging and order; any other key is a filter.
#[utoipa::path(
    get,
    path = "/orders",
    params(
        ("page" = Option<u32>, Query, description = "Page number (1-based, default 1)"),
        ("perPage" = Option<u32>, Query, description = "Items per page (default 20, max 100)"),
        ("sortBy" = Option<String>, Query, description = "created_at, total, customer or status"),
        ("sortType" = Option<String>, Query, description = "asc or desc (default desc)"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("payment_method" = Option<String>, Query, description = "Filter by payment method"),
        ("customer_type" = Option<String>, Query, description = "Filter by customer type"),
        ("search" = Option<String>, Query, description = "Customer name contains"),
    ),
    responses(
        (status = 200, description = "Paginated list of orders", body = ListOrdersResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    service: web::Data<SharedOrderService>,
    query: web::Query<BTreeMap<String, String>>,
) -> Result<HttpResponse, AppError> {
    let state = ListQueryState::initialize(&query.into_inner(), &list_defaults());
    let params = clamp_params(&state.params());
    let (page, per_page) = (params.page, params.per_page);

    let result = web::block(move || service.list_orders(&params))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(ListOrdersResponse {
        last_page: result.total.div_ceil(u64::from(per_page)).max(1),
        total: result.total,
        data: result.data.into_iter().map(OrderResponse::from).collect(),
        page,
        per_page,
    }))
}

/// GET /orders/{id}
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    service: web::Data<SharedOrderService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    let result = web::block(move || service.get_order(order_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    match result {
        Some(order) => Ok(HttpResponse::Ok().json(OrderResponse::from(order))),
        None => Err(AppError::NotFound),
    }
}

/// POST /orders
///
/// Validates and prices the payload, then stores the order with its lines.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = OrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 422, description = "Invalid order", body = ValidationErrorResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    service: web::Data<SharedOrderService>,
    body: web::Json<OrderRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();

    let order = web::block(move || {
        let draft = body
            .into_draft(service.pricing())
            .map_err(DomainError::from)?;
        service.create_order(&draft)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(OrderResponse::from(order)))
}

/// PUT /orders/{id}
///
/// Replaces the order's fields and lines; totals are recomputed.
#[utoipa::path(
    put,
    path = "/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = OrderRequest,
    responses(
        (status = 200, description = "Order updated", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 422, description = "Invalid order", body = ValidationErrorResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn update_order(
    service: web::Data<SharedOrderService>,
    path: web::Path<Uuid>,
    body: web::Json<OrderRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let body = body.into_inner();

    let order = web::block(move || {
        let draft = body
            .into_draft(service.pricing())
            .map_err(DomainError::from)?;
        service.update_order(order_id, &draft)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// DELETE /orders/{id}
#[utoipa::path(
    delete,
    path = "/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn delete_order(
    service: web::Data<SharedOrderService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    web::block(move || service.delete_order(order_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::NoContent().finish())
}
