use async_trait::async_trait;
use domain::{Order, OrderStatus};

use crate::Result;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts the order unless one with the same number already exists.
    /// Returns true if it was inserted.
    async fn create_if_not_exist(&self, order: &Order) -> Result<bool>;

    async fn find_by_order_number(&self, order_number: &str) -> Result<Order>;

    /// Moves the order to `to` if its current status is one of `from`.
    ///
    /// Returns `None` when the status did not match; fails with `NotFound`
    /// when there is no such order.
    async fn change_status(
        &self,
        order_number: &str,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<Order>>;
}
