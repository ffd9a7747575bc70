//! KiosCorp POS terminal core.
//!
//! The cart and order-total engine, the protocol for editing items of an
//! open pending order, and the pollers that keep the pending-order list and
//! the product grid fresh.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod api;
pub mod backend;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod order_editor;
pub mod session;
pub mod sync;
pub mod terminal;
pub mod totals;

pub use api::ApiClient;
pub use backend::{DynPosBackend, PosBackend};
pub use cart::{Cart, SubmittedOrder};
pub use config::PosConfig;
pub use error::{PosError, PosResult};
pub use models::{Order, OrderItem, OrderStatus, Product};
pub use order_editor::{OrderEditor, PaymentReceipt};
pub use session::{Cashier, Session};
pub use sync::{start_pending_order_poll, start_product_poll, PendingOrders, PollerHandle};
pub use terminal::Terminal;
pub use totals::{compute_totals, Totals};

use crate::models::ProductFilter;

/// Run the headless terminal core until Ctrl-C: load configuration, connect,
/// load the register state, then keep the pending-order list and product
/// snapshot fresh and prune the cart whenever the catalog changes.
pub async fn run() -> anyhow::Result<()> {
    let _log_guard = diagnostics::init_logging().context("failed to initialise logging")?;
    info!("Starting KiosCorp POS v{}", env!("CARGO_PKG_VERSION"));

    let config = PosConfig::from_env().context("failed to load POS configuration")?;
    let session = Arc::new(Session::from_config(&config));
    info!(
        session_id = %session.session_id(),
        backend = session.base_url(),
        cashier = %session.cashier().display_name(),
        "session ready"
    );

    let api = Arc::new(ApiClient::new(session.clone(), config.request_timeout)?);
    let connectivity = api.test_connectivity().await;
    if !connectivity.success {
        warn!(
            error = connectivity.error.as_deref().unwrap_or("unknown"),
            "backend unreachable at startup; pollers will keep retrying"
        );
    }
    let backend: DynPosBackend = api.clone();

    let mut terminal = Terminal::load(backend.clone()).await;

    let shutdown = CancellationToken::new();
    let order_poll = start_pending_order_poll(
        terminal.pending().clone(),
        backend.clone(),
        config.sidebar_poll,
        shutdown.clone(),
    );
    let (mut products_rx, product_poll) = start_product_poll(
        backend.clone(),
        ProductFilter::default(),
        config.screen_poll,
        shutdown.clone(),
    );
    let mut count_rx = terminal.pending().subscribe_count();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("shutdown requested");
                break;
            }
            changed = products_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let products = products_rx.borrow_and_update().clone();
                let pruned = terminal.apply_products(products);
                if !pruned.is_empty() {
                    info!(?pruned, total = terminal.cart().total(), "cart lines adjusted after catalog refresh");
                }
            }
            changed = count_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *count_rx.borrow_and_update();
                info!(pending = count, "pending orders");
            }
        }
    }

    shutdown.cancel();
    order_poll.shutdown().await;
    product_poll.shutdown().await;
    info!("POS core stopped");
    Ok(())
}
