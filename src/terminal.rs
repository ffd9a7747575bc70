//! Register state owned by the runtime: the VAT rate, the category tree, the
//! latest product snapshot, the cart and the pending-order board.

use tracing::{info, warn};

use crate::backend::DynPosBackend;
use crate::cart::{Cart, SubmittedOrder};
use crate::catalog::{filter_products, paginate, CategoryTree, Page, ProductQuery};
use crate::error::PosResult;
use crate::models::{OrderId, Product, ProductFilter, ProductId};
use crate::order_editor::OrderEditor;
use crate::sync::PendingOrders;

pub struct Terminal {
    backend: DynPosBackend,
    vat_percentage: Option<f64>,
    categories: CategoryTree,
    products: Vec<Product>,
    cart: Cart,
    pending: PendingOrders,
}

impl Terminal {
    /// Load VAT, categories and products. Each failed load is logged and left
    /// empty so the register can start while the backend is down; a missing
    /// VAT rate is fetched again when an order is opened.
    pub async fn load(backend: DynPosBackend) -> Self {
        let vat_percentage = match backend.vat_setting().await {
            Ok(vat) => {
                info!(vat_percentage = vat.vat_percentage, "VAT setting loaded");
                Some(vat.vat_percentage)
            }
            Err(e) => {
                warn!(error = %e, "could not load VAT setting");
                None
            }
        };

        let categories = match CategoryTree::load(backend.as_ref()).await {
            Ok(tree) => {
                info!(
                    main = tree.main_categories().len(),
                    sub = tree.sub_categories().len(),
                    "categories loaded"
                );
                tree
            }
            Err(e) => {
                warn!(error = %e, "could not load categories");
                CategoryTree::default()
            }
        };

        let products = match backend.list_products(ProductFilter::default()).await {
            Ok(products) => products,
            Err(e) => {
                warn!(error = %e, "initial product load failed");
                Vec::new()
            }
        };

        Self {
            backend,
            vat_percentage,
            categories,
            cart: Cart::new(products.clone()),
            products,
            pending: PendingOrders::new(),
        }
    }

    pub fn backend(&self) -> DynPosBackend {
        self.backend.clone()
    }

    pub fn vat_percentage(&self) -> Option<f64> {
        self.vat_percentage
    }

    pub fn categories(&self) -> &CategoryTree {
        &self.categories
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn cart_mut(&mut self) -> &mut Cart {
        &mut self.cart
    }

    pub fn pending(&self) -> &PendingOrders {
        &self.pending
    }

    /// Adopt a product refresh and prune cart lines that can no longer be sold.
    pub fn apply_products(&mut self, products: Vec<Product>) -> Vec<ProductId> {
        self.products = products.clone();
        self.cart.prune_stale_lines(products)
    }

    /// One page of the product grid for `query`.
    pub fn browse(&self, query: &ProductQuery) -> Page<Product> {
        let matching = filter_products(&self.products, self.categories.sub_categories(), query)
            .into_iter()
            .cloned()
            .collect();
        paginate(matching, query.page())
    }

    pub async fn submit_cart(&mut self) -> PosResult<SubmittedOrder> {
        let backend = self.backend.clone();
        self.cart.submit_order(backend.as_ref()).await
    }

    async fn ensure_vat(&mut self) -> PosResult<f64> {
        if let Some(vat) = self.vat_percentage {
            return Ok(vat);
        }
        let vat = self.backend.vat_setting().await?.vat_percentage;
        info!(vat_percentage = vat, "VAT setting loaded");
        self.vat_percentage = Some(vat);
        Ok(vat)
    }

    /// Open a pending order for editing at the terminal's VAT rate.
    pub async fn open_order(&mut self, order_id: OrderId) -> PosResult<OrderEditor> {
        let vat = self.ensure_vat().await?;
        self.pending.open_order(order_id, vat, self.backend.clone())
    }
}
