//! Order pricing: numeric coercion of loosely typed form values and the
//! totals arithmetic shared by the order form and the order API.
//!
//! Every function in this module is total. Malformed numbers degrade to `0`
//! instead of failing, and nothing here clamps or validates ranges; that is
//! the job of [`OrderDraft::validate`](super::order::OrderDraft::validate).

use serde::{Deserialize, Serialize};

use super::order::{CustomerType, OrderLineItem, OrderTotals};

pub const DEFAULT_FREE_SHIPPING_THRESHOLD: f64 = 1500.0;
pub const DEFAULT_FLAT_DELIVERY_FEE: f64 = 150.0;

/// A numeric value as received from a form field or a JSON payload: a
/// number, a numeric or currency-like string (`"$12.50"`), or nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl From<f64> for RawNumber {
    fn from(n: f64) -> Self {
        RawNumber::Number(n)
    }
}

impl From<i32> for RawNumber {
    fn from(n: i32) -> Self {
        RawNumber::Number(f64::from(n))
    }
}

impl From<u32> for RawNumber {
    fn from(n: u32) -> Self {
        RawNumber::Number(f64::from(n))
    }
}

impl From<&str> for RawNumber {
    fn from(s: &str) -> Self {
        RawNumber::Text(s.to_string())
    }
}

impl From<String> for RawNumber {
    fn from(s: String) -> Self {
        RawNumber::Text(s)
    }
}

impl From<&RawNumber> for RawNumber {
    fn from(raw: &RawNumber) -> Self {
        raw.clone()
    }
}

impl<T: Into<RawNumber>> From<Option<T>> for RawNumber {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawNumber::Missing, Into::into)
    }
}

/// Pricing constants. Fixed for the lifetime of a process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Retail orders strictly below this gross subtotal pay the flat fee.
    pub free_shipping_threshold: f64,
    pub flat_delivery_fee: f64,
    /// When set, every line subtotal is reduced by its line discount.
    /// When unset, line discounts are informational only.
    pub apply_line_discounts: bool,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold: DEFAULT_FREE_SHIPPING_THRESHOLD,
            flat_delivery_fee: DEFAULT_FLAT_DELIVERY_FEE,
            apply_line_discounts: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsOptions {
    pub auto_delivery_cost: bool,
    pub customer_type: CustomerType,
}

/// The editable numeric fields of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineField {
    Quantity,
    UnitPrice,
    DiscountPercent,
}

/// Coerce any raw value into a finite number.
///
/// Strings contribute their first unsigned decimal token (`digits(.digits)?`),
/// so `"$12.50abc"` is `12.5` and `"abc"` is `0`. Missing values, empty
/// strings and non-finite numbers are `0`.
pub fn coerce_number(value: impl Into<RawNumber>) -> f64 {
    let n = match value.into() {
        RawNumber::Number(n) => n,
        RawNumber::Text(s) => first_decimal_token(&s)
            .and_then(|token| token.parse::<f64>().ok())
            .unwrap_or(0.0),
        RawNumber::Missing => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Whether a raw value reads as negative. Text keeps its sign here even
/// though [`coerce_number`] only extracts the magnitude: `"-10"` coerces to
/// `10` but is negative.
pub fn is_negative(value: impl Into<RawNumber>) -> bool {
    match value.into() {
        RawNumber::Number(n) => n < 0.0,
        RawNumber::Text(s) => {
            let sign_before_digits = s
                .find(|c: char| c.is_ascii_digit())
                .is_some_and(|first_digit| s[..first_digit].contains('-'));
            sign_before_digits && coerce_number(s.as_str()) > 0.0
        }
        RawNumber::Missing => false,
    }
}

fn first_decimal_token(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    // Only take the fraction when at least one digit follows the point.
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    Some(&s[start..end])
}

/// Format a raw value as `$X.XX`.
pub fn format_currency(value: impl Into<RawNumber>) -> String {
    let n = coerce_number(value);
    // Avoid rendering "-0.00" for a negative zero.
    let n = if n == 0.0 { 0.0 } else { n };
    format!("${:.2}", n)
}

/// The amount a single line contributes to the gross subtotal.
pub fn line_amount(
    quantity: impl Into<RawNumber>,
    unit_price: impl Into<RawNumber>,
    discount_percent: impl Into<RawNumber>,
    config: &PricingConfig,
) -> f64 {
    let gross = coerce_number(quantity) * coerce_number(unit_price);
    if config.apply_line_discounts {
        gross - gross * coerce_number(discount_percent) / 100.0
    } else {
        gross
    }
}

/// Apply an edit to one field of a line item and recompute its subtotal.
///
/// The untouched fields are re-coerced as well so a line carrying a
/// non-finite number can never poison the subtotal.
pub fn recompute_line_item(
    item: &OrderLineItem,
    field: LineField,
    new_value: impl Into<RawNumber>,
    config: &PricingConfig,
) -> OrderLineItem {
    let new_value = coerce_number(new_value);
    let mut quantity = coerce_number(item.quantity);
    let mut unit_price = coerce_number(item.unit_price);
    let mut discount = coerce_number(item.line_discount_percent);
    match field {
        LineField::Quantity => quantity = new_value,
        LineField::UnitPrice => unit_price = new_value,
        LineField::DiscountPercent => discount = new_value,
    }

    OrderLineItem {
        product_id: item.product_id.clone(),
        product_name: item.product_name.clone(),
        quantity,
        unit_price,
        line_discount_percent: discount,
        line_subtotal: line_amount(quantity, unit_price, discount, config),
    }
}

/// Compute gross subtotal, discount amount, delivery cost and grand total.
///
/// Line subtotals are always re-derived from quantity and unit price; the
/// stored `line_subtotal` of each item is ignored. A discount outside
/// `0..=100` is applied arithmetically as given.
pub fn recompute_order_totals(
    items: &[OrderLineItem],
    delivery_cost: impl Into<RawNumber>,
    discount_percent: impl Into<RawNumber>,
    options: &TotalsOptions,
    config: &PricingConfig,
) -> OrderTotals {
    let subtotal_gross: f64 = items
        .iter()
        .map(|item| {
            line_amount(
                item.quantity,
                item.unit_price,
                item.line_discount_percent,
                config,
            )
        })
        .sum();

    let delivery_cost = if options.auto_delivery_cost {
        auto_delivery_cost(subtotal_gross, options.customer_type, config)
    } else {
        coerce_number(delivery_cost)
    };

    let order_discount_percent = coerce_number(discount_percent);
    let discount_amount = order_discount_percent / 100.0 * subtotal_gross;

    OrderTotals {
        subtotal_gross,
        order_discount_percent,
        discount_amount,
        delivery_cost,
        grand_total: subtotal_gross + delivery_cost - discount_amount,
    }
}

/// Flat fee for small retail orders, free otherwise. Empty orders ship free.
pub fn auto_delivery_cost(
    subtotal_gross: f64,
    customer_type: CustomerType,
    config: &PricingConfig,
) -> f64 {
    if subtotal_gross > 0.0
        && subtotal_gross < config.free_shipping_threshold
        && customer_type == CustomerType::Retail
    {
        config.flat_delivery_fee
    } else {
        0.0
    }
}
