//! Editing an open pending order: quantity and discount changes, void, pay.
//!
//! Each line-item edit runs as one ordered sequence:
//!
//! 1. apply the change to the working copy (tentative),
//! 2. send the item update; on failure revert the working copy and stop,
//! 3. recompute the order amount from the working copy,
//! 4. push the amount to the backend,
//! 5. notify the listener (the pending-order list) with the new snapshot.
//!
//! All mutating methods take `&mut self`, so edits to one open order can never
//! overlap: a second edit starts only after the previous sequence finished.
//!
//! If step 4 fails the item change is already stored by the backend but its
//! `order_amount` is stale. The editor keeps the local state, reports the
//! failure and flags the gap (`amount_in_sync() == false`) until
//! [`OrderEditor::resync_amount`] succeeds. Nothing is retried automatically.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::DynPosBackend;
use crate::error::{PosError, PosResult};
use crate::models::{
    Order, OrderId, OrderItem, OrderItemId, OrderItemPatch, OrderStatus, PayOrderRequest,
    UpdateOrderAmountRequest, UpdateOrderItemsRequest,
};
use crate::session::Cashier;
use crate::totals::{change_due, compute_totals, effective_price, order_subtotal, round_cents, Totals};

/// Receives confirmed snapshots of the order being edited.
pub trait OrderListener: Send + Sync {
    fn order_updated(&self, order: &Order);

    /// The order reached a terminal state and left the pending set.
    fn order_finished(&self, order_id: OrderId, status: OrderStatus);
}

/// Result of a successful payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub order_id: OrderId,
    pub total: f64,
    pub tendered: f64,
    pub change: f64,
}

/// Display row for one order item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemLine {
    pub order_item_id: OrderItemId,
    pub product_name: String,
    pub quantity: u32,
    pub price: f64,
    /// Unit price shown struck through when a discount applies.
    pub original_price: Option<f64>,
    pub line_total: f64,
}

pub struct OrderEditor {
    order: Order,
    vat_percentage: f64,
    backend: DynPosBackend,
    listener: Option<Arc<dyn OrderListener>>,
    amount_in_sync: bool,
}

/// Discount as sent to the backend: `None` when absent or equal to the unit price.
fn wire_discount(item: &OrderItem) -> Option<f64> {
    item.discounted_price
        .filter(|d| (d - item.unit_price).abs() > f64::EPSILON)
        .map(round_cents)
}

/// A price equal to the unit price is no discount at all.
fn normalize_discount(unit_price: f64, discounted_price: f64) -> Option<f64> {
    if (discounted_price - unit_price).abs() <= f64::EPSILON {
        None
    } else {
        Some(discounted_price)
    }
}

impl OrderEditor {
    pub fn new(order: Order, vat_percentage: f64, backend: DynPosBackend) -> Self {
        Self {
            order,
            vat_percentage,
            backend,
            listener: None,
            amount_in_sync: true,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn OrderListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn order_id(&self) -> OrderId {
        self.order.id
    }

    pub fn into_order(self) -> Order {
        self.order
    }

    pub fn vat_percentage(&self) -> f64 {
        self.vat_percentage
    }

    pub fn set_vat_percentage(&mut self, vat_percentage: f64) {
        self.vat_percentage = vat_percentage;
    }

    /// Totals of the working copy, recomputed on every call.
    pub fn totals(&self) -> Totals {
        compute_totals(&self.order, self.vat_percentage)
    }

    /// False after an amount push failed and before a successful resync.
    pub fn amount_in_sync(&self) -> bool {
        self.amount_in_sync
    }

    pub fn item_lines(&self) -> Vec<ItemLine> {
        self.order
            .items
            .iter()
            .map(|item| {
                let price = effective_price(item);
                ItemLine {
                    order_item_id: item.id,
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    price,
                    original_price: item.discounted_price.map(|_| item.unit_price),
                    line_total: price * f64::from(item.quantity),
                }
            })
            .collect()
    }

    fn ensure_pending(&self) -> PosResult<()> {
        if self.order.status.is_terminal() {
            return Err(PosError::OrderNotPending {
                order_id: self.order.id,
                status: self.order.status,
            });
        }
        Ok(())
    }

    /// Add `delta` to an item's quantity. Zero keeps the row (it stops
    /// contributing to the total); going below zero is rejected.
    pub async fn change_item_quantity(
        &mut self,
        item_id: OrderItemId,
        delta: i64,
    ) -> PosResult<Totals> {
        self.ensure_pending()?;
        let item = self
            .order
            .item(item_id)
            .ok_or(PosError::UnknownOrderItem(item_id))?;
        let new_quantity = i64::from(item.quantity).saturating_add(delta);
        if new_quantity < 0 {
            return Err(PosError::NegativeQuantity);
        }
        let new_quantity = u32::try_from(new_quantity).map_err(|_| PosError::NegativeQuantity)?;

        self.commit_item_change(item_id, |item| item.quantity = new_quantity)
            .await
    }

    /// Override an item's price. Negative or non-finite prices are rejected
    /// before any request.
    pub async fn apply_discount(
        &mut self,
        item_id: OrderItemId,
        discounted_price: f64,
    ) -> PosResult<Totals> {
        if !discounted_price.is_finite() || discounted_price < 0.0 {
            return Err(PosError::InvalidDiscount(discounted_price));
        }
        self.ensure_pending()?;
        if self.order.item(item_id).is_none() {
            return Err(PosError::UnknownOrderItem(item_id));
        }

        self.commit_item_change(item_id, |item| {
            item.discounted_price = normalize_discount(item.unit_price, discounted_price)
        })
        .await
    }

    async fn commit_item_change<F>(&mut self, item_id: OrderItemId, patch: F) -> PosResult<Totals>
    where
        F: FnOnce(&mut OrderItem),
    {
        let order_id = self.order.id;
        let item = self
            .order
            .item_mut(item_id)
            .ok_or(PosError::UnknownOrderItem(item_id))?;

        // tentative local patch
        let previous = item.clone();
        patch(item);
        let req = UpdateOrderItemsRequest {
            items: vec![OrderItemPatch {
                order_item_id: item.id,
                quantity: item.quantity,
                discounted_price: wire_discount(item),
            }],
        };

        if let Err(e) = self.backend.update_order_items(order_id, &req).await {
            warn!(order_id, item_id, error = %e, "order item update failed, reverting");
            if let Some(item) = self.order.item_mut(item_id) {
                *item = previous;
            }
            return Err(e);
        }

        self.push_amount().await?;
        Ok(self.totals())
    }

    async fn push_amount(&mut self) -> PosResult<()> {
        let order_id = self.order.id;
        let amount = round_cents(order_subtotal(&self.order));
        let req = UpdateOrderAmountRequest {
            order_amount: amount,
        };

        match self.backend.update_order_amount(order_id, &req).await {
            Ok(()) => {
                self.order.amount = amount;
                self.amount_in_sync = true;
                if let Some(listener) = &self.listener {
                    listener.order_updated(&self.order);
                }
                info!(order_id, amount, "order amount updated");
                Ok(())
            }
            Err(e) => {
                self.amount_in_sync = false;
                warn!(
                    order_id,
                    amount,
                    error = %e,
                    "order amount push failed; item change stored but amount is stale"
                );
                Err(e)
            }
        }
    }

    /// Push the locally computed amount again after a failed push.
    pub async fn resync_amount(&mut self) -> PosResult<()> {
        self.ensure_pending()?;
        self.push_amount().await
    }

    /// Void the order. Returns the backend's confirmation message.
    pub async fn void_order(&mut self) -> PosResult<String> {
        self.ensure_pending()?;
        let order_id = self.order.id;
        let resp = self.backend.void_order(order_id).await?;

        self.order.status = OrderStatus::Void;
        if let Some(listener) = &self.listener {
            listener.order_finished(order_id, OrderStatus::Void);
        }
        info!(order_id, "order voided");
        Ok(resp
            .message
            .unwrap_or_else(|| format!("Order {order_id} voided")))
    }

    /// Take payment. Underpayment is rejected before any request; on success
    /// the change owed is reported.
    pub async fn pay_order(&mut self, tendered: f64, cashier: &Cashier) -> PosResult<PaymentReceipt> {
        self.ensure_pending()?;
        let due = self.totals().total;
        if !tendered.is_finite() || tendered < due {
            return Err(PosError::InsufficientPayment {
                tendered,
                total: due,
            });
        }

        let order_id = self.order.id;
        let req = PayOrderRequest {
            order_paid_amount: round_cents(tendered),
            cashier_first_name: cashier.first_name.clone(),
            cashier_last_name: cashier.last_name.clone(),
            vat_percentage: self.vat_percentage,
        };
        let resp = self.backend.pay_order(order_id, &req).await?;
        if !resp.success {
            let message = resp
                .error
                .or(resp.message)
                .unwrap_or_else(|| "An error occurred while processing the payment.".to_string());
            warn!(order_id, message = %message, "payment rejected");
            return Err(PosError::Rejected(message));
        }

        self.order.status = OrderStatus::Paid;
        if let Some(listener) = &self.listener {
            listener.order_finished(order_id, OrderStatus::Paid);
        }
        let total = round_cents(due);
        let tendered = round_cents(tendered);
        let change = round_cents(change_due(tendered, due)).max(0.0);
        info!(order_id, total, tendered, change, cashier = %cashier.display_name(), "order paid");
        Ok(PaymentReceipt {
            order_id,
            total,
            tendered,
            change,
        })
    }
}
