//! The ReturnOrder saga.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::TransactionId;
use domain::{
    Agent, Order, PaymentActionAttributes, PaymentMethod, PotentialActions,
    ReturnOrderActionAttributes, ReturnOrderObject, ReturnOrderPotentialActions,
    ReturnOrderResult, ReturnPotentialActions, SendEmailMessageActionAttributes, Transaction,
    TransactionAttributes, TransactionObject, TransactionResult, TransactionStatus,
    TransactionType,
};
use store::{ActionRepository, OrderRepository, TransactionRepository};

use crate::authorization::Authorizations;
use crate::error::{Result, SagaError};
use crate::{ensure_agent, message};

/// Decides whether an order may still be returned.
pub trait ReturnPolicy: Send + Sync {
    fn validate(&self, order: &Order, now: DateTime<Utc>) -> Result<()>;
}

/// Accepts returns within a fixed window after the order date.
#[derive(Debug, Clone, Copy)]
pub struct ReturnWindowPolicy {
    window: Duration,
}

impl ReturnWindowPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

impl Default for ReturnWindowPolicy {
    fn default() -> Self {
        Self::new(Duration::days(30))
    }
}

impl ReturnPolicy for ReturnWindowPolicy {
    fn validate(&self, order: &Order, now: DateTime<Utc>) -> Result<()> {
        if now - order.order_date > self.window {
            return Err(SagaError::argument(format!(
                "order {} is past its return window",
                order.order_number
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StartReturnOrder {
    pub agent: Agent,
    pub order_number: String,
    pub reason: Option<String>,
    /// Start even if the return policy rejects the order.
    pub forcibly: bool,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConfirmReturnOrder {
    pub agent_id: String,
    pub transaction_id: TransactionId,
}

#[derive(Clone)]
pub struct ReturnOrderService {
    transactions: Arc<dyn TransactionRepository>,
    actions: Arc<dyn ActionRepository>,
    orders: Arc<dyn OrderRepository>,
    policy: Arc<dyn ReturnPolicy>,
}

impl ReturnOrderService {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        actions: Arc<dyn ActionRepository>,
        orders: Arc<dyn OrderRepository>,
        policy: Arc<dyn ReturnPolicy>,
    ) -> Self {
        Self {
            transactions,
            actions,
            orders,
            policy,
        }
    }

    /// Starts a return for a delivered order.
    ///
    /// At most one return may exist per PlaceOrder transaction; a second start
    /// fails with `AlreadyInUse`.
    #[tracing::instrument(skip(self, command), fields(order_number = %command.order_number))]
    pub async fn start(&self, command: StartReturnOrder) -> Result<Transaction> {
        let order = self
            .orders
            .find_by_order_number(&command.order_number)
            .await?;
        if !order.order_status.is_returnable() {
            return Err(SagaError::argument(format!(
                "order {} is {} and cannot be returned",
                order.order_number, order.order_status
            )));
        }

        let place_order = self
            .transactions
            .find_by_id(TransactionType::PlaceOrder, order.transaction_id)
            .await?;
        if place_order.status != TransactionStatus::Confirmed {
            return Err(SagaError::argument(format!(
                "transaction {} is {}",
                place_order.id, place_order.status
            )));
        }

        let bypassed = match self.policy.validate(&order, Utc::now()) {
            Ok(()) => false,
            Err(err) if command.forcibly => {
                tracing::warn!(
                    agent_id = %command.agent.id,
                    reason = %err,
                    "return policy bypassed by forcible return"
                );
                true
            }
            Err(err) => return Err(err),
        };

        let transaction = self
            .transactions
            .start(TransactionAttributes {
                agent: command.agent,
                object: TransactionObject::ReturnOrder(ReturnOrderObject {
                    transaction: place_order.to_ref(),
                    order_number: order.order_number,
                    reason: command.reason,
                    forcibly: bypassed,
                }),
                expires: command.expires,
            })
            .await?;
        tracing::info!(transaction_id = %transaction.id, "return order started");
        Ok(transaction)
    }

    /// Confirms the return, fixing the refunds and the customer notice.
    #[tracing::instrument(skip(self, command), fields(transaction_id = %command.transaction_id))]
    pub async fn confirm(&self, command: ConfirmReturnOrder) -> Result<Transaction> {
        let transaction = self
            .transactions
            .find_in_progress_by_id(TransactionType::ReturnOrder, command.transaction_id)
            .await?;
        ensure_agent(&transaction, &command.agent_id)?;

        let object = transaction.return_order_object().cloned().ok_or_else(|| {
            SagaError::argument(format!("{} is not a ReturnOrder", transaction.id))
        })?;
        let order = self
            .orders
            .find_by_order_number(&object.order_number)
            .await?;

        let actions = self
            .actions
            .find_authorize_by_transaction_id(object.transaction.id)
            .await?;
        let authorizations = Authorizations::from_actions(&actions)?;
        if authorizations.payments.is_empty() {
            return Err(SagaError::not_found(
                "payment authorization",
                format!("transaction {}", object.transaction.id),
            ));
        }

        let refund = |method: PaymentMethod| {
            authorizations
                .payment(method)
                .map(|payment| PaymentActionAttributes {
                    order_number: order.order_number.clone(),
                    authorize_action_id: payment.action_id,
                    payment_method: method,
                    amount: payment.amount,
                })
        };
        let refund_total = authorizations.payment_total()?;

        let potential_actions = ReturnOrderPotentialActions {
            return_order: ReturnOrderActionAttributes {
                agent: transaction.agent.clone(),
                order_number: order.order_number.clone(),
                potential_actions: ReturnPotentialActions {
                    refund_credit_card: refund(PaymentMethod::CreditCard),
                    refund_pecorino: refund(PaymentMethod::Pecorino),
                    send_email_message: (!order.customer_contact.email.is_empty()).then(
                        || SendEmailMessageActionAttributes {
                            message: message::order_returned(&order, refund_total),
                        },
                    ),
                },
            },
        };

        let confirmed = self
            .transactions
            .confirm(
                TransactionType::ReturnOrder,
                transaction.id,
                TransactionResult::ReturnOrder(ReturnOrderResult {
                    order_number: order.order_number.clone(),
                    refund_total,
                }),
                PotentialActions::ReturnOrder(potential_actions),
            )
            .await?;

        metrics::counter!("transactions_confirmed_total", "type_of" => "ReturnOrder").increment(1);
        tracing::info!(refund_total, "return order confirmed");
        Ok(confirmed)
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, agent_id: &str, transaction_id: TransactionId) -> Result<Transaction> {
        let transaction = self
            .transactions
            .find_in_progress_by_id(TransactionType::ReturnOrder, transaction_id)
            .await?;
        ensure_agent(&transaction, agent_id)?;
        Ok(self
            .transactions
            .cancel(TransactionType::ReturnOrder, transaction_id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CustomerContact, OrderStatus, Seller};

    fn order_dated(order_date: DateTime<Utc>) -> Order {
        Order {
            order_number: "20250101-ABCDEF123456".to_string(),
            transaction_id: TransactionId::new(),
            customer: Agent::new("customer-1"),
            customer_contact: CustomerContact {
                name: "Jane".to_string(),
                email: "jane@example.com".to_string(),
                telephone: "+81-3-0000-0000".to_string(),
            },
            seller: Seller {
                id: "seller-1".to_string(),
                name: "Theater".to_string(),
                email: "box-office@example.com".to_string(),
            },
            accepted_offers: Vec::new(),
            payment_methods: Vec::new(),
            price: 0,
            order_status: OrderStatus::Delivered,
            order_date,
        }
    }

    #[test]
    fn test_window_policy_accepts_recent_orders() {
        let now = Utc::now();
        let policy = ReturnWindowPolicy::new(Duration::days(7));
        assert!(policy.validate(&order_dated(now - Duration::days(6)), now).is_ok());
    }

    #[test]
    fn test_window_policy_rejects_old_orders() {
        let now = Utc::now();
        let policy = ReturnWindowPolicy::new(Duration::days(7));
        let err = policy
            .validate(&order_dated(now - Duration::days(8)), now)
            .unwrap_err();
        assert!(matches!(err, SagaError::Argument(_)));
    }
}
