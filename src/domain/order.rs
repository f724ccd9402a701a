use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::FieldErrors;
use super::list_query::{FetchParams, SortType};
use super::pricing::{
    coerce_number, is_negative, line_amount, recompute_line_item, recompute_order_totals,
    LineField, PricingConfig, RawNumber, TotalsOptions,
};

// ── Enumerations ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomerType {
    #[default]
    #[serde(rename = "p", alias = "retail")]
    Retail,
    #[serde(rename = "m", alias = "wholesale")]
    Wholesale,
}

impl CustomerType {
    pub fn code(self) -> &'static str {
        match self {
            CustomerType::Retail => "p",
            CustomerType::Wholesale => "m",
        }
    }
}

impl FromStr for CustomerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p" | "retail" => Ok(CustomerType::Retail),
            "m" | "wholesale" => Ok(CustomerType::Wholesale),
            other => Err(format!("unknown customer type '{}'", other)),
        }
    }
}

/// Order lifecycle state. Storage keeps the legacy integer code; see
/// [`OrderStatus::code`] and [`OrderStatus::from_code`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Legacy integer code (`print_status`).
    pub fn code(self) -> i32 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Completed => 2,
            OrderStatus::Cancelled => 3,
        }
    }

    /// Unknown codes read as `Pending`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => OrderStatus::Processing,
            2 => OrderStatus::Completed,
            3 => OrderStatus::Cancelled,
            _ => OrderStatus::Pending,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[default]
    #[serde(rename = "ef")]
    Cash,
    #[serde(rename = "trans")]
    Transfer,
    #[serde(rename = "mp")]
    MercadoPago,
}

impl PaymentMethod {
    pub fn code(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "ef",
            PaymentMethod::Transfer => "trans",
            PaymentMethod::MercadoPago => "mp",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ef" => Ok(PaymentMethod::Cash),
            "trans" => Ok(PaymentMethod::Transfer),
            "mp" => Ok(PaymentMethod::MercadoPago),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

// ── Line items and totals ────────────────────────────────────────────────────

/// One product entry of an order. `line_subtotal` is derived; use
/// [`recompute_line_item`] to edit quantity, price or discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub line_discount_percent: f64,
    #[serde(default)]
    pub line_subtotal: f64,
}

impl OrderLineItem {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: impl Into<RawNumber>,
        unit_price: impl Into<RawNumber>,
        config: &PricingConfig,
    ) -> Self {
        Self::with_discount(
            product_id,
            product_name,
            quantity,
            unit_price,
            RawNumber::Missing,
            config,
        )
    }

    pub fn with_discount(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: impl Into<RawNumber>,
        unit_price: impl Into<RawNumber>,
        discount_percent: impl Into<RawNumber>,
        config: &PricingConfig,
    ) -> Self {
        let quantity = coerce_number(quantity);
        let unit_price = coerce_number(unit_price);
        let line_discount_percent = coerce_number(discount_percent);
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            line_discount_percent,
            line_subtotal: line_amount(quantity, unit_price, line_discount_percent, config),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
    /// Sum of the line subtotals ("total_bruto").
    pub subtotal_gross: f64,
    pub order_discount_percent: f64,
    pub discount_amount: f64,
    pub delivery_cost: f64,
    pub grand_total: f64,
}

impl OrderTotals {
    pub fn is_finite(&self) -> bool {
        [
            self.subtotal_gross,
            self.order_discount_percent,
            self.discount_amount,
            self.delivery_cost,
            self.grand_total,
        ]
        .iter()
        .all(|n| n.is_finite())
    }
}

// ── Draft (live form state) ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub customer_type: CustomerType,
}

/// A catalog product as offered to the order form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductQuote {
    pub id: String,
    pub name: String,
    pub retail_price: f64,
    #[serde(default)]
    pub wholesale_price: Option<f64>,
}

impl ProductQuote {
    /// Wholesale customers get the wholesale price when the product has one.
    pub fn price_for(&self, customer_type: CustomerType) -> f64 {
        match (customer_type, self.wholesale_price) {
            (CustomerType::Wholesale, Some(price)) => coerce_number(price),
            _ => coerce_number(self.retail_price),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub customer: Option<CustomerRef>,
    pub items: Vec<OrderLineItem>,
    pub delivery_cost: RawNumber,
    pub discount_percent: RawNumber,
    pub auto_delivery_cost: bool,
    pub status: Option<OrderStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub notes: String,
}

impl Default for OrderDraft {
    fn default() -> Self {
        Self {
            customer: None,
            items: Vec::new(),
            delivery_cost: RawNumber::Number(0.0),
            discount_percent: RawNumber::Number(0.0),
            auto_delivery_cost: false,
            status: Some(OrderStatus::Pending),
            payment_method: Some(PaymentMethod::Cash),
            notes: String::new(),
        }
    }
}

impl OrderDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retail unless a wholesale customer is selected.
    pub fn customer_type(&self) -> CustomerType {
        self.customer
            .as_ref()
            .map(|c| c.customer_type)
            .unwrap_or_default()
    }

    /// Add `quantity` units of a product. A product already on the order has
    /// its quantity increased instead of getting a second line.
    pub fn add_product(
        &mut self,
        product: &ProductQuote,
        quantity: impl Into<RawNumber>,
        config: &PricingConfig,
    ) {
        let quantity = coerce_number(quantity);
        if let Some(index) = self
            .items
            .iter()
            .position(|item| item.product_id == product.id)
        {
            let current = &self.items[index];
            let merged = coerce_number(current.quantity) + quantity;
            let updated = recompute_line_item(current, LineField::Quantity, merged, config);
            self.items[index] = updated;
        } else {
            let price = product.price_for(self.customer_type());
            self.items.push(OrderLineItem::new(
                product.id.clone(),
                product.name.clone(),
                quantity,
                price,
                config,
            ));
        }
    }

    /// Edit one field of the line at `index`. Returns `false` when there is
    /// no such line.
    pub fn edit_item(
        &mut self,
        index: usize,
        field: LineField,
        value: impl Into<RawNumber>,
        config: &PricingConfig,
    ) -> bool {
        let Some(item) = self.items.get(index) else {
            return false;
        };
        let updated = recompute_line_item(item, field, value, config);
        self.items[index] = updated;
        true
    }

    pub fn remove_item(&mut self, index: usize) -> Option<OrderLineItem> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn totals(&self, config: &PricingConfig) -> OrderTotals {
        recompute_order_totals(
            &self.items,
            &self.delivery_cost,
            &self.discount_percent,
            &TotalsOptions {
                auto_delivery_cost: self.auto_delivery_cost,
                customer_type: self.customer_type(),
            },
            config,
        )
    }

    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.customer.is_none() {
            errors.add("customer", "A customer must be selected");
        }
        if self.items.is_empty() {
            errors.add("items", "At least one product must be added");
        }
        for (index, item) in self.items.iter().enumerate() {
            if coerce_number(item.quantity) <= 0.0 {
                errors.add(
                    format!("items.{}.quantity", index),
                    "Quantity must be greater than zero",
                );
            }
            if item.unit_price < 0.0 {
                errors.add(
                    format!("items.{}.unit_price", index),
                    "Unit price cannot be negative",
                );
            }
        }
        if !self.auto_delivery_cost && is_negative(&self.delivery_cost) {
            errors.add("delivery_cost", "Delivery cost cannot be negative");
        }
        let discount = coerce_number(&self.discount_percent);
        if is_negative(&self.discount_percent) || !(0.0..=100.0).contains(&discount) {
            errors.add("discount", "Discount must be between 0 and 100");
        }
        if self.status.is_none() {
            errors.add("status", "A status must be selected");
        }
        if self.payment_method.is_none() {
            errors.add("payment_method", "A payment method must be selected");
        }

        errors.into_result()
    }

    /// Validate and price the draft, producing the payload handed to the
    /// order storage. Totals are materialized fresh here.
    pub fn to_new_order(&self, config: &PricingConfig) -> Result<NewOrder, FieldErrors> {
        self.validate()?;
        let (Some(customer), Some(status), Some(payment_method)) =
            (self.customer.as_ref(), self.status, self.payment_method)
        else {
            // validate() rejects every one of these cases.
            return Err(FieldErrors::new());
        };

        let items: Vec<OrderLineItem> = self
            .items
            .iter()
            .map(|item| {
                recompute_line_item(item, LineField::Quantity, item.quantity, config)
            })
            .collect();
        let totals = self.totals(config);

        // Finite inputs can still overflow once multiplied and summed.
        let mut errors = FieldErrors::new();
        for (index, item) in items.iter().enumerate() {
            if !item.line_subtotal.is_finite() {
                errors.add(
                    format!("items.{}.quantity", index),
                    "Quantity and unit price are too large",
                );
            }
        }
        if !totals.is_finite() {
            errors.add("total", "The order total is too large");
        }
        errors.into_result()?;

        let notes = self.notes.trim();

        Ok(NewOrder {
            customer_id: customer.id.clone(),
            customer_name: customer.name.clone(),
            customer_type: customer.customer_type,
            status,
            payment_method,
            notes: (!notes.is_empty()).then(|| notes.to_string()),
            auto_delivery_cost: self.auto_delivery_cost,
            items,
            totals,
        })
    }
}

// ── Storage-facing models ────────────────────────────────────────────────────

/// A validated, priced order ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_type: CustomerType,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub auto_delivery_cost: bool,
    pub items: Vec<OrderLineItem>,
    pub totals: OrderTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub id: Uuid,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_type: CustomerType,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    #[serde(default)]
    pub auto_delivery_cost: bool,
    #[serde(flatten)]
    pub totals: OrderTotals,
    #[serde(default)]
    pub items: Vec<OrderLineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters understood by order listings. Unknown keys and unparseable
/// values are ignored; `search` matches the customer name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub customer_type: Option<CustomerType>,
    pub search: Option<String>,
}

impl OrderFilter {
    pub fn from_filters(filters: &BTreeMap<String, String>) -> Self {
        let parse = |key: &str| {
            filters
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        Self {
            status: parse("status").and_then(|v| v.parse().ok()),
            payment_method: parse("payment_method").and_then(|v| v.parse().ok()),
            customer_type: parse("customer_type").and_then(|v| v.parse().ok()),
            search: parse("search").map(str::to_lowercase),
        }
    }

    pub fn matches(&self, order: &OrderView) -> bool {
        self.status.map_or(true, |s| order.status == s)
            && self.payment_method.map_or(true, |p| order.payment_method == p)
            && self.customer_type.map_or(true, |c| order.customer_type == c)
            && self
                .search
                .as_deref()
                .map_or(true, |needle| order.customer_name.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSortField {
    CreatedAt,
    Total,
    Customer,
    Status,
}

impl OrderSortField {
    /// Unknown field names sort by creation date.
    pub fn parse(name: &str) -> Self {
        match name {
            "total" | "grand_total" => OrderSortField::Total,
            "customer" | "customer_name" => OrderSortField::Customer,
            "status" => OrderSortField::Status,
            _ => OrderSortField::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSort {
    pub field: OrderSortField,
    pub direction: SortType,
}

impl OrderSort {
    pub fn from_params(params: &FetchParams) -> Self {
        Self {
            field: OrderSortField::parse(&params.sort_by),
            direction: params.sort_type,
        }
    }
}
