use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::{order_lines, orders};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_type: String,
    pub print_status: i32,
    pub payment_method: String,
    pub notes: Option<String>,
    pub auto_delivery_cost: bool,
    pub subtotal_gross: BigDecimal,
    pub discount_percent: BigDecimal,
    pub discount_amount: BigDecimal,
    pub delivery_cost: BigDecimal,
    pub grand_total: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column values written on insert and on update.
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = orders)]
#[diesel(treat_none_as_null = true)]
pub struct OrderChanges {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_type: String,
    pub print_status: i32,
    pub payment_method: String,
    pub notes: Option<String>,
    pub auto_delivery_cost: bool,
    pub subtotal_gross: BigDecimal,
    pub discount_percent: BigDecimal,
    pub discount_amount: BigDecimal,
    pub delivery_cost: BigDecimal,
    pub grand_total: BigDecimal,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: Uuid,
    #[diesel(embed)]
    pub changes: OrderChanges,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = order_lines)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub position: i32,
    pub product_id: String,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: BigDecimal,
    pub line_discount_percent: BigDecimal,
    pub line_subtotal: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_lines)]
pub struct NewOrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub position: i32,
    pub product_id: String,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: BigDecimal,
    pub line_discount_percent: BigDecimal,
    pub line_subtotal: BigDecimal,
}
