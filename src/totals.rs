//! Money arithmetic shared by the cart and the order editor.

use serde::Serialize;

use crate::models::{Order, OrderItem};

/// Subtotal, VAT and VAT-inclusive total of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub subtotal: f64,
    pub vat: f64,
    pub total: f64,
}

/// Price used for totals: the manual override when present, else the unit price.
pub fn effective_price(item: &OrderItem) -> f64 {
    item.discounted_price.unwrap_or(item.unit_price)
}

/// Pre-VAT amount of an order. This is the value stored as `order_amount`.
pub fn order_subtotal(order: &Order) -> f64 {
    order
        .items
        .iter()
        .map(|item| effective_price(item) * f64::from(item.quantity))
        .sum()
}

pub fn compute_totals(order: &Order, vat_percentage: f64) -> Totals {
    let subtotal = order_subtotal(order);
    let vat = subtotal * vat_percentage / 100.0;
    Totals {
        subtotal,
        vat,
        total: subtotal + vat,
    }
}

/// VAT-inclusive display amount for an order list entry.
pub fn amount_with_vat(amount: f64, vat_percentage: f64) -> f64 {
    amount * (1.0 + vat_percentage / 100.0)
}

/// Change owed to the customer. Callers reject underpayment before this.
pub fn change_due(tendered: f64, total: f64) -> f64 {
    tendered - total
}

/// Round to cents for values sent over the wire.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
