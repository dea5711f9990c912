use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Order, OrderStatus};
use tokio::sync::RwLock;

use crate::{OrderRepository, Result, StoreError};

#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_if_not_exist(&self, order: &Order) -> Result<bool> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_number) {
            return Ok(false);
        }
        orders.insert(order.order_number.clone(), order.clone());
        Ok(true)
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Order> {
        self.orders
            .read()
            .await
            .get(order_number)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Order", order_number))
    }

    async fn change_status(
        &self,
        order_number: &str,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_number)
            .ok_or_else(|| StoreError::not_found("Order", order_number))?;

        if !from.contains(&order.order_status) {
            return Ok(None);
        }
        order.order_status = to;
        Ok(Some(order.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::TransactionId;
    use domain::{Agent, CustomerContact, Seller};

    fn order() -> Order {
        let transaction_id = TransactionId::new();
        let now = Utc::now();
        Order {
            order_number: Order::number_for(transaction_id, now),
            transaction_id,
            customer: Agent::new("customer-1"),
            customer_contact: CustomerContact {
                name: "Jane".to_string(),
                email: "jane@example.com".to_string(),
                telephone: "+000".to_string(),
            },
            seller: Seller {
                id: "seller-1".to_string(),
                name: "Cinema".to_string(),
                email: "box-office@example.com".to_string(),
            },
            accepted_offers: vec![],
            payment_methods: vec![],
            price: 1800,
            order_status: OrderStatus::Processing,
            order_date: now,
        }
    }

    #[tokio::test]
    async fn test_create_if_not_exist_is_idempotent() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        assert!(repo.create_if_not_exist(&order).await.unwrap());

        let mut changed = order.clone();
        changed.price = 1;
        assert!(!repo.create_if_not_exist(&changed).await.unwrap());

        let stored = repo.find_by_order_number(&order.order_number).await.unwrap();
        assert_eq!(stored.price, 1800);
    }

    #[tokio::test]
    async fn test_change_status_is_conditional() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        repo.create_if_not_exist(&order).await.unwrap();

        let delivered = repo
            .change_status(&order.order_number, &OrderStatus::DELIVERABLE, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.map(|o| o.order_status), Some(OrderStatus::Delivered));

        let again = repo
            .change_status(&order.order_number, &OrderStatus::DELIVERABLE, OrderStatus::Delivered)
            .await
            .unwrap();
        assert!(again.is_none());

        let err = repo
            .change_status("missing", &OrderStatus::DELIVERABLE, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
