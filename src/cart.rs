//! Cart and running total for the order being composed at the register.
//!
//! The cart keeps the latest product list it was given so that stock ceilings
//! and prices always come from the most recent refresh. Every accepted
//! mutation recomputes the total; rejected mutations change nothing.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::backend::PosBackend;
use crate::error::{PosError, PosResult};
use crate::models::{
    CreateOrderLine, CreateOrderRequest, OrderId, OrderedProduct, Product, ProductId,
};
use crate::totals::round_cents;

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub order_id: Option<OrderId>,
    pub total: f64,
    pub line_count: usize,
}

#[derive(Debug, Default)]
pub struct Cart {
    products: HashMap<ProductId, Product>,
    lines: BTreeMap<ProductId, u32>,
    total: f64,
}

impl Cart {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            ..Self::default()
        }
    }

    pub fn product(&self, product_id: ProductId) -> Option<&Product> {
        self.products.get(&product_id)
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.lines.values().all(|&q| q == 0)
    }

    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.lines.get(&product_id).copied().unwrap_or(0)
    }

    /// Whether the product grid should mark this product as added.
    pub fn is_added(&self, product_id: ProductId) -> bool {
        self.quantity_of(product_id) > 0
    }

    /// Cart lines in product-id order.
    pub fn lines(&self) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.lines.iter().map(|(&id, &q)| (id, q))
    }

    /// Add `delta` (may be negative) to the product's quantity.
    ///
    /// The result is floored at zero. If it would exceed the available stock
    /// the call fails with `InsufficientStock` and the cart is unchanged.
    /// Returns the new quantity; reaching zero removes the line.
    pub fn set_quantity(&mut self, product_id: ProductId, delta: i64) -> PosResult<u32> {
        let product = self
            .products
            .get(&product_id)
            .ok_or(PosError::UnknownProduct(product_id))?;

        let current = i64::from(self.quantity_of(product_id));
        let requested = current.saturating_add(delta).max(0);
        if requested > i64::from(product.quantity) {
            debug!(
                product_id,
                requested,
                available = product.quantity,
                "cart quantity rejected: insufficient stock"
            );
            return Err(PosError::InsufficientStock {
                product_id,
                max: product.quantity,
            });
        }

        let new_quantity = requested as u32;
        if new_quantity == 0 {
            self.lines.remove(&product_id);
        } else {
            self.lines.insert(product_id, new_quantity);
        }
        self.recompute_total();
        Ok(new_quantity)
    }

    /// Σ price × quantity over every line, using the latest known prices.
    pub fn recompute_total(&mut self) -> f64 {
        self.total = self
            .lines
            .iter()
            .filter(|(_, &q)| q > 0)
            .filter_map(|(id, &q)| self.products.get(id).map(|p| p.price * f64::from(q)))
            .sum();
        self.total
    }

    /// Adopt a freshly fetched product list and drop lines that can no longer
    /// be sold. Lines whose product vanished or hit zero stock are deleted;
    /// lines above a reduced stock level are clamped to it. Returns the ids of
    /// deleted lines.
    pub fn prune_stale_lines(&mut self, products: Vec<Product>) -> Vec<ProductId> {
        self.products = products.into_iter().map(|p| (p.id, p)).collect();

        let mut removed = Vec::new();
        let products = &self.products;
        self.lines.retain(|id, qty| match products.get(id) {
            Some(p) if p.quantity > 0 => {
                if *qty > p.quantity {
                    warn!(
                        product_id = id,
                        was = *qty,
                        now = p.quantity,
                        "stock dropped below cart quantity, clamping"
                    );
                    *qty = p.quantity;
                }
                true
            }
            _ => {
                removed.push(*id);
                false
            }
        });

        if !removed.is_empty() {
            info!(removed = ?removed, "removed unavailable products from cart");
        }
        self.recompute_total();
        removed
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.total = 0.0;
    }

    fn build_request(&self) -> PosResult<CreateOrderRequest> {
        let items: Vec<CreateOrderLine> = self
            .lines
            .iter()
            .filter(|(_, &q)| q > 0)
            .filter_map(|(id, &quantity)| {
                self.products.get(id).map(|p| CreateOrderLine {
                    product: OrderedProduct {
                        product_id: p.id,
                        product_name: p.name.clone(),
                        product_price: p.price,
                    },
                    quantity,
                })
            })
            .collect();

        if items.is_empty() {
            return Err(PosError::EmptyCart);
        }

        Ok(CreateOrderRequest {
            items,
            total: round_cents(self.total),
        })
    }

    /// Send the cart to the backend as a new pending order.
    ///
    /// An empty cart fails with `EmptyCart` before any request. The cart is
    /// cleared only after the backend confirms; any failure leaves it intact
    /// so the cashier can retry.
    pub async fn submit_order(&mut self, backend: &dyn PosBackend) -> PosResult<SubmittedOrder> {
        let req = self.build_request()?;
        let line_count = req.items.len();
        let total = req.total;

        let resp = backend.create_order(&req).await.map_err(|e| {
            warn!(error = %e, "order creation failed; cart kept");
            e
        })?;

        if !resp.success {
            let message = resp
                .message
                .unwrap_or_else(|| "Something went wrong while creating the order.".to_string());
            warn!(message = %message, "order creation rejected; cart kept");
            return Err(PosError::Rejected(message));
        }

        info!(order_id = ?resp.order_id, total, line_count, "order created");
        self.clear();
        Ok(SubmittedOrder {
            order_id: resp.order_id,
            total,
            line_count,
        })
    }
}
