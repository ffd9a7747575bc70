//! Wire entities exchanged with the POS backend.
//!
//! Field names follow the backend's JSON exactly; Rust-side names are
//! shortened through `#[serde(rename)]`. Decimal columns (prices, amounts,
//! VAT) may arrive either as JSON numbers or as strings such as `"100.00"`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

pub type ProductId = i64;
pub type OrderId = i64;
pub type OrderItemId = i64;
pub type CategoryId = i64;

// ---------------------------------------------------------------------------
// Lenient decimal decoding
// ---------------------------------------------------------------------------

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn de_money<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    value_to_f64(&v).ok_or_else(|| serde::de::Error::custom(format!("invalid decimal: {v}")))
}

pub(crate) fn de_opt_money<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(ref s)) if s.trim().is_empty() => Ok(None),
        Some(other) => value_to_f64(&other)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal: {other}"))),
    }
}

/// Stock counts are signed on the backend; anything below zero means none
/// left and `null` means unknown (treated as none). Non-numeric input is an
/// error rather than a silent zero.
fn de_stock<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    if v.is_null() {
        return Ok(0);
    }
    let n = value_to_f64(&v)
        .filter(|n| n.is_finite())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid quantity: {v}")))?;
    Ok(n.max(0.0).min(f64::from(u32::MAX)) as u32)
}

fn de_lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<String>::deserialize(deserializer)?;
    Ok(v.and_then(|s| {
        DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "product_id")]
    pub id: ProductId,
    #[serde(rename = "product_name")]
    pub name: String,
    #[serde(rename = "product_price", deserialize_with = "de_money")]
    pub price: f64,
    /// Units currently available for sale.
    #[serde(rename = "product_quantity", deserialize_with = "de_stock", default)]
    pub quantity: u32,
    #[serde(rename = "product_image", default)]
    pub image: Option<String>,
    #[serde(default)]
    pub sub_category: Option<CategoryId>,
    #[serde(rename = "product_brand", default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(rename = "product_color", default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "product_size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainCategory {
    #[serde(rename = "main_category_id")]
    pub id: CategoryId,
    #[serde(rename = "main_category_name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCategory {
    #[serde(rename = "sub_category_id")]
    pub id: CategoryId,
    #[serde(rename = "sub_category_name")]
    pub name: String,
    pub main_category: CategoryId,
}

/// Optional server-side narrowing of the product list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub sub_category: Option<CategoryId>,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Void,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Paid => "Paid",
            OrderStatus::Void => "Void",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(rename = "order_item_id")]
    pub id: OrderItemId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub product_name: String,
    #[serde(rename = "order_item_quantity", deserialize_with = "de_stock")]
    pub quantity: u32,
    #[serde(rename = "product_price", deserialize_with = "de_money")]
    pub unit_price: f64,
    /// Manual price override. `None` means no discount.
    #[serde(default, deserialize_with = "de_opt_money")]
    pub discounted_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "order_id")]
    pub id: OrderId,
    /// Pre-VAT amount stored by the backend.
    #[serde(rename = "order_amount", deserialize_with = "de_money", default)]
    pub amount: f64,
    #[serde(rename = "order_status", default)]
    pub status: OrderStatus,
    #[serde(
        rename = "order_date_created",
        default,
        deserialize_with = "de_lenient_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "order_items", default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: OrderItemId) -> Option<&mut OrderItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    /// Items that still contribute to the order (quantity above zero).
    pub fn visible_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|i| i.quantity > 0)
    }
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderedProduct {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOrderLine {
    pub product: OrderedProduct,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CreateOrderLine>,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreateOrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One line of an item update. `discounted_price` is always serialized so the
/// backend clears an override when it is `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItemPatch {
    pub order_item_id: OrderItemId,
    pub quantity: u32,
    pub discounted_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOrderItemsRequest {
    pub items: Vec<OrderItemPatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOrderAmountRequest {
    pub order_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayOrderRequest {
    pub order_paid_amount: f64,
    pub cashier_first_name: String,
    pub cashier_last_name: String,
    pub vat_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PayOrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VoidOrderResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct VatSetting {
    #[serde(deserialize_with = "de_money", default)]
    pub vat_percentage: f64,
}
