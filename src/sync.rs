//! Pending-order list kept fresh by polling, and the product refresh loop.
//!
//! The board holds the latest pending-order snapshot from the backend. While
//! an order is open in an [`OrderEditor`], its entry is pinned to the last
//! locally confirmed copy: a poll that started before an edit finished would
//! otherwise overwrite the edit with stale data.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{DynPosBackend, PosBackend};
use crate::error::{PosError, PosResult};
use crate::models::{Order, OrderId, OrderStatus, Product, ProductFilter};
use crate::order_editor::{OrderEditor, OrderListener};

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct OpenOrder {
    id: OrderId,
    confirmed: Order,
}

#[derive(Debug, Default)]
struct Board {
    orders: Vec<Order>,
    open: Option<OpenOrder>,
}

impl Board {
    fn replace(&mut self, order: &Order) -> bool {
        match self.orders.iter_mut().find(|o| o.id == order.id) {
            Some(slot) => {
                *slot = order.clone();
                true
            }
            None => false,
        }
    }
}

/// Shared handle to the pending-order list. Clones see the same list.
#[derive(Clone)]
pub struct PendingOrders {
    board: Arc<Mutex<Board>>,
    count_tx: Arc<watch::Sender<usize>>,
}

impl Default for PendingOrders {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingOrders {
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            board: Arc::new(Mutex::new(Board::default())),
            count_tx: Arc::new(count_tx),
        }
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_count(&self, count: usize) {
        self.count_tx.send_if_modified(|current| {
            let changed = *current != count;
            *current = count;
            changed
        });
    }

    /// Replace the list with a fresh backend snapshot. The open order keeps
    /// its confirmed copy; an open order that already reached a terminal
    /// state stays out of the list.
    pub fn apply_snapshot(&self, orders: Vec<Order>) {
        let count = {
            let mut board = self.board();
            let mut orders: Vec<Order> = orders
                .into_iter()
                .filter(|o| !o.status.is_terminal())
                .collect();

            if let Some(open) = &board.open {
                if open.confirmed.status.is_terminal() {
                    orders.retain(|o| o.id != open.id);
                } else if let Some(slot) = orders.iter_mut().find(|o| o.id == open.id) {
                    *slot = open.confirmed.clone();
                } else {
                    debug!(order_id = open.id, "open order missing from pending snapshot");
                }
            }

            board.orders = orders;
            board.orders.len()
        };
        self.publish_count(count);
    }

    /// Record a confirmed mutation of an order.
    pub fn notify_order_updated(&self, order: &Order) {
        let mut board = self.board();
        if let Some(open) = board.open.as_mut() {
            if open.id == order.id {
                open.confirmed = order.clone();
            }
        }
        board.replace(order);
    }

    /// Start editing an order from the list.
    pub fn open_order(
        &self,
        order_id: OrderId,
        vat_percentage: f64,
        backend: DynPosBackend,
    ) -> PosResult<OrderEditor> {
        let order = {
            let mut board = self.board();
            let order = board
                .orders
                .iter()
                .find(|o| o.id == order_id)
                .cloned()
                .ok_or(PosError::UnknownOrder(order_id))?;
            board.open = Some(OpenOrder {
                id: order_id,
                confirmed: order.clone(),
            });
            order
        };
        debug!(order_id, "order opened");

        Ok(OrderEditor::new(order, vat_percentage, backend).with_listener(Arc::new(self.clone())))
    }

    /// Merge the editor's working copy back into the list and unpin it.
    pub fn close_order(&self, editor: OrderEditor) {
        let order = editor.into_order();
        let count = {
            let mut board = self.board();
            if board.open.as_ref().is_some_and(|o| o.id == order.id) {
                board.open = None;
            }
            if order.status.is_terminal() {
                board.orders.retain(|o| o.id != order.id);
            } else {
                board.replace(&order);
            }
            board.orders.len()
        };
        debug!(order_id = order.id, "order closed");
        self.publish_count(count);
    }

    /// Drop an order that left the pending set.
    pub fn remove(&self, order_id: OrderId) {
        let count = {
            let mut board = self.board();
            board.orders.retain(|o| o.id != order_id);
            board.orders.len()
        };
        self.publish_count(count);
    }

    pub fn orders(&self) -> Vec<Order> {
        self.board().orders.clone()
    }

    pub fn open_order_id(&self) -> Option<OrderId> {
        self.board().open.as_ref().map(|o| o.id)
    }

    pub fn pending_count(&self) -> usize {
        self.board().orders.len()
    }

    /// Receiver for the pending-count badge.
    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Fetch and apply one snapshot. Returns `false` when `cancel` fired
    /// before the snapshot could be applied; the board is left untouched.
    pub async fn poll_once(
        &self,
        backend: &dyn PosBackend,
        cancel: &CancellationToken,
    ) -> PosResult<bool> {
        let orders = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            res = backend.list_pending_orders() => res?,
        };
        if cancel.is_cancelled() {
            debug!("discarding pending-order snapshot after cancellation");
            return Ok(false);
        }
        self.apply_snapshot(orders);
        Ok(true)
    }
}

impl OrderListener for PendingOrders {
    fn order_updated(&self, order: &Order) {
        self.notify_order_updated(order);
    }

    fn order_finished(&self, order_id: OrderId, status: OrderStatus) {
        {
            let mut board = self.board();
            if let Some(open) = board.open.as_mut() {
                if open.id == order_id {
                    open.confirmed.status = status;
                }
            }
        }
        self.remove(order_id);
    }
}

// ---------------------------------------------------------------------------
// Background pollers
// ---------------------------------------------------------------------------

/// Owns a poller task. Dropping the handle stops the loop.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "poller task ended abnormally");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Refresh `pending` every `period` until `cancel` fires or the handle drops.
/// The first fetch happens immediately.
pub fn start_pending_order_poll(
    pending: PendingOrders,
    backend: DynPosBackend,
    period: Duration,
    cancel: CancellationToken,
) -> PollerHandle {
    let token = cancel.child_token();
    let loop_token = token.clone();

    let task = tokio::spawn(async move {
        info!(interval_ms = period.as_millis() as u64, "pending order poll started");
        let mut ticker = ticker(period);
        loop {
            tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match pending.poll_once(backend.as_ref(), &loop_token).await {
                Ok(true) => debug!(count = pending.pending_count(), "pending orders refreshed"),
                Ok(false) => break,
                Err(e) => warn!(error = %e, "pending order poll failed"),
            }
        }
        info!("pending order poll stopped");
    });

    PollerHandle {
        cancel: token,
        task: Some(task),
    }
}

/// Refresh the product list every `period` and publish each snapshot.
pub fn start_product_poll(
    backend: DynPosBackend,
    filter: ProductFilter,
    period: Duration,
    cancel: CancellationToken,
) -> (watch::Receiver<Vec<Product>>, PollerHandle) {
    let (tx, rx) = watch::channel(Vec::new());
    let token = cancel.child_token();
    let loop_token = token.clone();

    let task = tokio::spawn(async move {
        info!(interval_ms = period.as_millis() as u64, "product poll started");
        let mut ticker = ticker(period);
        loop {
            tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                res = backend.list_products(filter) => res,
            };
            match result {
                Ok(products) => {
                    debug!(count = products.len(), "products refreshed");
                    tx.send_replace(products);
                }
                Err(e) => warn!(error = %e, "product poll failed"),
            }
        }
        info!("product poll stopped");
    });

    (
        rx,
        PollerHandle {
            cancel: token,
            task: Some(task),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::models::OrderItem;

    fn order(id: i64, qty: u32) -> Order {
        Order {
            id,
            amount: 100.0 * f64::from(qty),
            status: OrderStatus::Pending,
            created_at: None,
            items: vec![OrderItem {
                id: id * 10,
                product_id: Some(1),
                product_name: "Cap".into(),
                quantity: qty,
                unit_price: 100.0,
                discounted_price: None,
                product_image: None,
                product_color: None,
                product_size: None,
            }],
        }
    }

    async fn wait_for_calls(backend: &MockBackend, op: &str, n: usize) {
        for _ in 0..200 {
            if backend.count(op) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {n} {op} calls");
    }

    #[test]
    fn test_snapshot_replaces_list_and_publishes_count() {
        let pending = PendingOrders::new();
        let rx = pending.subscribe_count();
        pending.apply_snapshot(vec![order(1, 1), order(2, 1)]);
        assert_eq!(pending.pending_count(), 2);
        assert_eq!(*rx.borrow(), 2);

        let mut paid = order(3, 1);
        paid.status = OrderStatus::Paid;
        pending.apply_snapshot(vec![order(2, 4), paid]);
        let orders = pending.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].items[0].quantity, 4);
        assert_eq!(*rx.borrow(), 1);
    }

    #[test]
    fn test_open_unknown_order_fails() {
        let pending = PendingOrders::new();
        let backend: DynPosBackend = Arc::new(MockBackend::new());
        assert!(matches!(
            pending.open_order(9, 12.0, backend),
            Err(PosError::UnknownOrder(9))
        ));
    }

    #[tokio::test]
    async fn test_poll_during_edit_keeps_confirmed_edit() {
        let backend = Arc::new(MockBackend::new());
        backend.set_pending(vec![order(1, 2), order(2, 1)]);
        let pending = PendingOrders::new();
        pending.apply_snapshot(vec![order(1, 2), order(2, 1)]);

        let mut editor = pending.open_order(1, 12.0, backend.clone()).unwrap();

        // A poll starts before the edit and returns the stale order 1.
        let gate = backend.hold("list_pending_orders");
        let poller = pending.clone();
        let poll_backend = backend.clone();
        let poll = tokio::spawn(async move {
            poller
                .poll_once(poll_backend.as_ref(), &CancellationToken::new())
                .await
        });
        wait_for_calls(&backend, "list_pending_orders", 1).await;

        editor.change_item_quantity(10, 1).await.expect("edit");
        gate.notify_one();
        assert_eq!(poll.await.unwrap(), Ok(true));

        let shown = pending.orders();
        let first = shown.iter().find(|o| o.id == 1).unwrap();
        assert_eq!(first.items[0].quantity, 3);
        assert_eq!(first.amount, 300.0);

        pending.close_order(editor);
        assert_eq!(pending.open_order_id(), None);
        assert_eq!(pending.orders()[0].items[0].quantity, 3);

        // Once closed, the backend snapshot is authoritative again.
        pending.apply_snapshot(vec![order(1, 5), order(2, 1)]);
        assert_eq!(pending.orders()[0].items[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_snapshot_landing_mid_discount_keeps_confirmed_copy() {
        let backend = Arc::new(MockBackend::new());
        backend.set_pending(vec![order(1, 2), order(2, 1)]);
        let pending = PendingOrders::new();
        pending.apply_snapshot(vec![order(1, 2), order(2, 1)]);

        let mut editor = pending.open_order(1, 12.0, backend.clone()).unwrap();
        let gate = backend.hold("update_order_items");

        {
            let edit = editor.apply_discount(10, 80.0);
            tokio::pin!(edit);
            // Drive the edit until its item update is in flight.
            tokio::select! {
                res = &mut edit => panic!("edit finished while held: {res:?}"),
                _ = wait_for_calls(&backend, "update_order_items", 1) => {}
            }

            let applied = pending
                .poll_once(backend.as_ref(), &CancellationToken::new())
                .await
                .expect("poll");
            assert!(applied);
            let shown = pending.orders();
            let first = shown.iter().find(|o| o.id == 1).unwrap();
            assert_eq!(first.items[0].discounted_price, None);
            assert_eq!(first.items[0].quantity, 2);
            assert_eq!(backend.count("update_order_amount"), 0);

            gate.notify_one();
            edit.await.expect("discount");
        }

        assert_eq!(editor.order().item(10).unwrap().discounted_price, Some(80.0));
        let shown = pending.orders();
        let first = shown.iter().find(|o| o.id == 1).unwrap();
        assert_eq!(first.items[0].discounted_price, Some(80.0));
        assert_eq!(first.amount, 160.0);

        // A later stale snapshot still cannot undo the confirmed discount.
        pending.apply_snapshot(vec![order(1, 2), order(2, 1)]);
        let shown = pending.orders();
        assert_eq!(shown.iter().find(|o| o.id == 1).unwrap().items[0].discounted_price, Some(80.0));
    }

    #[tokio::test]
    async fn test_paid_order_leaves_list_even_if_stale_poll_lands() {
        let backend = Arc::new(MockBackend::new());
        let pending = PendingOrders::new();
        pending.apply_snapshot(vec![order(1, 1), order(2, 1)]);
        let rx = pending.subscribe_count();

        let mut editor = pending.open_order(1, 0.0, backend.clone()).unwrap();
        let cashier = crate::session::Cashier {
            first_name: "Ana".into(),
            last_name: "Reyes".into(),
            role: "cashier".into(),
        };
        editor.pay_order(100.0, &cashier).await.expect("pay");
        assert_eq!(pending.pending_count(), 1);
        assert_eq!(*rx.borrow(), 1);

        pending.apply_snapshot(vec![order(1, 1), order(2, 1)]);
        assert_eq!(pending.pending_count(), 1);

        pending.close_order(editor);
        assert!(pending.orders().iter().all(|o| o.id != 1));
    }

    #[tokio::test]
    async fn test_close_merges_working_copy() {
        let backend = Arc::new(MockBackend::new());
        let pending = PendingOrders::new();
        pending.apply_snapshot(vec![order(1, 1)]);

        let mut editor = pending.open_order(1, 0.0, backend.clone()).unwrap();
        backend.fail("update_order_amount");
        assert!(editor.change_item_quantity(10, 2).await.is_err());
        // Item change stored, amount push failed: the list was not notified.
        assert_eq!(pending.orders()[0].items[0].quantity, 1);

        pending.close_order(editor);
        assert_eq!(pending.orders()[0].items[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_cancelled_poll_discards_result() {
        let backend = Arc::new(MockBackend::new());
        backend.set_pending(vec![order(1, 1)]);
        let pending = PendingOrders::new();
        let gate = backend.hold("list_pending_orders");
        let cancel = CancellationToken::new();

        let poller = pending.clone();
        let poll_backend = backend.clone();
        let poll_cancel = cancel.clone();
        let poll = tokio::spawn(async move {
            poller.poll_once(poll_backend.as_ref(), &poll_cancel).await
        });
        wait_for_calls(&backend, "list_pending_orders", 1).await;

        cancel.cancel();
        gate.notify_one();
        assert_eq!(poll.await.unwrap(), Ok(false));
        assert_eq!(pending.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_error_leaves_list_untouched() {
        let backend = Arc::new(MockBackend::new());
        backend.fail("list_pending_orders");
        let pending = PendingOrders::new();
        pending.apply_snapshot(vec![order(1, 1)]);

        let err = pending
            .poll_once(backend.as_ref(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::NetworkFailure(_)));
        assert_eq!(pending.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_pending_poller_stops_when_handle_drops() {
        let backend = Arc::new(MockBackend::new());
        backend.set_pending(vec![order(1, 1), order(2, 1)]);
        let pending = PendingOrders::new();

        let handle = start_pending_order_poll(
            pending.clone(),
            backend.clone(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        wait_for_calls(&backend, "list_pending_orders", 2).await;
        assert_eq!(pending.pending_count(), 2);

        drop(handle);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_drop = backend.count("list_pending_orders");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.count("list_pending_orders"), after_drop);
    }

    #[tokio::test]
    async fn test_parent_token_stops_product_poll() {
        let backend = Arc::new(MockBackend::new());
        backend.set_products(vec![Product {
            id: 1,
            name: "Cap".into(),
            price: 250.0,
            quantity: 3,
            image: None,
            sub_category: None,
            brand: None,
            color: None,
            size: None,
        }]);
        let parent = CancellationToken::new();
        let (mut rx, handle) = start_product_poll(
            backend.clone(),
            ProductFilter::default(),
            Duration::from_millis(10),
            parent.clone(),
        );

        rx.changed().await.expect("first snapshot");
        assert_eq!(rx.borrow().len(), 1);

        parent.cancel();
        handle.shutdown().await;
        let calls = backend.count("list_products");
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.count("list_products"), calls);
    }
}
