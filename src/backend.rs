//! The backend seam used by the cart, the order editor and the pollers.
//!
//! Production code talks to [`crate::api::ApiClient`]; tests plug in the
//! in-memory [`mock::MockBackend`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::PosResult;
use crate::models::{
    CreateOrderRequest, CreateOrderResponse, MainCategory, Order, OrderId, PayOrderRequest,
    PayOrderResponse, Product, ProductFilter, SubCategory, UpdateOrderAmountRequest,
    UpdateOrderItemsRequest, VatSetting, VoidOrderResponse,
};

pub type DynPosBackend = Arc<dyn PosBackend>;

#[async_trait]
pub trait PosBackend: Send + Sync {
    async fn list_products(&self, filter: ProductFilter) -> PosResult<Vec<Product>>;

    async fn list_main_categories(&self) -> PosResult<Vec<MainCategory>>;

    async fn list_sub_categories(&self) -> PosResult<Vec<SubCategory>>;

    async fn list_pending_orders(&self) -> PosResult<Vec<Order>>;

    async fn create_order(&self, req: &CreateOrderRequest) -> PosResult<CreateOrderResponse>;

    async fn update_order_items(
        &self,
        order_id: OrderId,
        req: &UpdateOrderItemsRequest,
    ) -> PosResult<()>;

    async fn update_order_amount(
        &self,
        order_id: OrderId,
        req: &UpdateOrderAmountRequest,
    ) -> PosResult<()>;

    async fn void_order(&self, order_id: OrderId) -> PosResult<VoidOrderResponse>;

    async fn pay_order(&self, order_id: OrderId, req: &PayOrderRequest)
        -> PosResult<PayOrderResponse>;

    async fn vat_setting(&self) -> PosResult<VatSetting>;
}
