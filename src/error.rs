//! Error taxonomy for the terminal core.
//!
//! Validation failures (`InsufficientStock`, `EmptyCart`, `InvalidDiscount`,
//! `InsufficientPayment`, ...) are always raised before any network call.
//! Backend failures arrive as `NetworkFailure` (transport or HTTP status) or
//! `Rejected` (the backend answered but refused the operation).

use thiserror::Error;

use crate::models::{OrderStatus, ProductId};

pub type PosResult<T> = Result<T, PosError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PosError {
    #[error("Insufficient stock for product {product_id}: at most {max} available")]
    InsufficientStock { product_id: ProductId, max: u32 },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid discounted price: {0}")]
    InvalidDiscount(f64),

    #[error("Insufficient payment: {tendered:.2} tendered, {total:.2} due")]
    InsufficientPayment { tendered: f64, total: f64 },

    #[error("Quantity cannot go below zero")]
    NegativeQuantity,

    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    #[error("Order {0} is not in the pending list")]
    UnknownOrder(i64),

    #[error("Order item {0} is not part of this order")]
    UnknownOrderItem(i64),

    #[error("Order {order_id} is {status}, not pending")]
    OrderNotPending { order_id: i64, status: OrderStatus },

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Rejected by backend: {0}")]
    Rejected(String),
}

impl PosError {
    /// Plain-language text for the transient cashier notification.
    pub fn user_message(&self) -> String {
        match self {
            PosError::InsufficientStock { max, .. } => {
                format!("You can only add up to {max} of this product.")
            }
            PosError::EmptyCart => {
                "Please add items to your cart before creating an order.".to_string()
            }
            PosError::InvalidDiscount(_) => "Please enter a valid price.".to_string(),
            PosError::InsufficientPayment { .. } => {
                "The amount given is less than the total amount. Please try again.".to_string()
            }
            PosError::NegativeQuantity => "Quantity cannot go below zero.".to_string(),
            PosError::UnknownProduct(_) => "That product is no longer available.".to_string(),
            PosError::UnknownOrder(_) => "That order is no longer pending.".to_string(),
            PosError::UnknownOrderItem(_) => "That item is no longer part of the order.".to_string(),
            PosError::OrderNotPending { status, .. } => {
                format!("This order is already {status} and can no longer be changed.")
            }
            PosError::NetworkFailure(msg) | PosError::Rejected(msg) => msg.clone(),
        }
    }

    /// Whether the failure happened before any request left the terminal.
    pub fn is_validation(&self) -> bool {
        !matches!(self, PosError::NetworkFailure(_) | PosError::Rejected(_))
    }
}
