//! Materializing confirmed transactions: creating, delivering, paying for
//! and returning orders.
//!
//! Every operation here is run by a task and may run more than once, so each
//! one either checks the ledger or relies on an idempotent store operation
//! before causing an effect.

use std::sync::Arc;

use chrono::Utc;
use common::TransactionId;
use domain::{
    ActionAttributes, ActionPurpose, ActionType, Agent, Order, OrderStatus, OwnershipInfo,
    PaymentActionAttributes, SendEmailMessageActionAttributes,
    SendOrderActionAttributes, TaskData, Transaction, TransactionStatus, TransactionType,
};
use serde_json::json;
use store::{
    ActionRepository, OrderRepository, OwnershipInfoRepository, Repositories, TaskRepository,
    TransactionRepository,
};

use crate::Collaborators;
use crate::authorization::Authorizations;
use crate::error::{Result, SagaError};
use crate::export::enqueue_once;
use crate::ledger::ActionLedger;
use crate::services::{Mailer, PaymentGateway, ReservationService};

#[derive(Clone)]
pub struct OrderService {
    transactions: Arc<dyn TransactionRepository>,
    tasks: Arc<dyn TaskRepository>,
    orders: Arc<dyn OrderRepository>,
    ownership_infos: Arc<dyn OwnershipInfoRepository>,
    ledger: ActionLedger,
    reservations: Arc<dyn ReservationService>,
    payments: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
}

impl OrderService {
    pub fn new(
        repositories: &Repositories,
        ledger: ActionLedger,
        collaborators: &Collaborators,
    ) -> Self {
        Self {
            transactions: repositories.transactions.clone(),
            tasks: repositories.tasks.clone(),
            orders: repositories.orders.clone(),
            ownership_infos: repositories.ownership_infos.clone(),
            ledger,
            reservations: collaborators.reservations.clone(),
            payments: collaborators.payments.clone(),
            mailer: collaborators.mailer.clone(),
        }
    }

    fn actions(&self) -> &Arc<dyn ActionRepository> {
        self.ledger.actions()
    }

    /// Creates the order of a confirmed PlaceOrder transaction and enqueues
    /// its delivery and payments.
    #[tracing::instrument(skip(self))]
    pub async fn create_from_transaction(&self, transaction_id: TransactionId) -> Result<Order> {
        let transaction = self
            .confirmed(TransactionType::PlaceOrder, transaction_id)
            .await?;
        let order = transaction
            .place_order_result()
            .map(|result| result.order.clone())
            .ok_or_else(|| SagaError::not_found("order result", transaction_id.to_string()))?;
        let potential_actions = transaction
            .place_order_potential_actions()
            .map(|actions| actions.order.potential_actions.clone())
            .ok_or_else(|| {
                SagaError::not_found("potential actions", transaction_id.to_string())
            })?;

        let attributes = ActionAttributes::new(
            ActionType::OrderAction,
            transaction.agent.clone(),
            json!({ "order_number": order.order_number }),
        )
        .with_purpose(ActionPurpose::transaction(
            TransactionType::PlaceOrder,
            transaction_id,
        ));
        let orders = self.orders.clone();
        let (_, created) = self
            .ledger
            .run(attributes, || async {
                orders
                    .create_if_not_exist(&order)
                    .await
                    .map_err(SagaError::from)
            })
            .await?;
        if created {
            metrics::counter!("orders_created_total").increment(1);
            tracing::info!(order_number = %order.order_number, "order created");
        }

        let now = Utc::now();
        let follow_ups = [
            potential_actions.send_order.map(TaskData::SendOrder),
            potential_actions.pay_credit_card.map(TaskData::PayCreditCard),
            potential_actions.pay_pecorino.map(TaskData::PayPecorino),
        ];
        for data in follow_ups.into_iter().flatten() {
            enqueue_once(self.tasks.as_ref(), data, now).await?;
        }

        Ok(order)
    }

    /// Hands the seats over to the customer and marks the order delivered.
    #[tracing::instrument(skip(self, attributes), fields(order_number = %attributes.order_number))]
    pub async fn send_order(&self, attributes: &SendOrderActionAttributes) -> Result<Order> {
        let order = self
            .orders
            .find_by_order_number(&attributes.order_number)
            .await?;
        if matches!(
            order.order_status,
            OrderStatus::Returned | OrderStatus::Cancelled
        ) {
            return Err(SagaError::argument(format!(
                "order {} is {} and cannot be sent",
                order.order_number, order.order_status
            )));
        }

        let action = ActionAttributes::new(
            ActionType::SendAction,
            Agent::system(),
            json!({ "order_number": order.order_number }),
        )
        .with_purpose(ActionPurpose::transaction(
            TransactionType::PlaceOrder,
            order.transaction_id,
        ));
        let (_, delivered) = self
            .ledger
            .run(action, || async {
                let now = Utc::now();
                for offer in &order.accepted_offers {
                    self.ownership_infos
                        .save_by_identifier(&OwnershipInfo::for_offer(&order, offer, now))
                        .await?;
                    self.reservations.confirm(&offer.reservation_id).await?;
                }
                self.deliver_order(&order.order_number).await
            })
            .await?;

        if let Some(email) = attributes.potential_actions.send_email_message.clone() {
            enqueue_once(self.tasks.as_ref(), TaskData::SendEmailMessage(email), Utc::now())
                .await?;
        }
        Ok(delivered)
    }

    /// Moves the order to Delivered. Delivering a delivered order is a no-op.
    pub async fn deliver_order(&self, order_number: &str) -> Result<Order> {
        let order = self.orders.find_by_order_number(order_number).await?;
        if order.order_status == OrderStatus::Delivered {
            tracing::debug!(order_number, "order already delivered");
            return Ok(order);
        }
        if !order.order_status.can_deliver() {
            return Err(undeliverable(&order));
        }

        match self
            .orders
            .change_status(order_number, &OrderStatus::DELIVERABLE, OrderStatus::Delivered)
            .await?
        {
            Some(delivered) => {
                metrics::counter!("orders_delivered_total").increment(1);
                Ok(delivered)
            }
            None => {
                // lost a race; accept only a concurrent delivery
                let current = self.orders.find_by_order_number(order_number).await?;
                if current.order_status == OrderStatus::Delivered {
                    Ok(current)
                } else {
                    Err(undeliverable(&current))
                }
            }
        }
    }

    /// Reverses a delivered order for a confirmed ReturnOrder transaction and
    /// enqueues its refunds and notice.
    #[tracing::instrument(skip(self))]
    pub async fn return_order(&self, transaction_id: TransactionId) -> Result<Order> {
        let transaction = self
            .confirmed(TransactionType::ReturnOrder, transaction_id)
            .await?;
        let object = transaction.return_order_object().cloned().ok_or_else(|| {
            SagaError::argument(format!("{transaction_id} is not a ReturnOrder"))
        })?;
        let potential_actions = transaction
            .return_order_potential_actions()
            .map(|actions| actions.return_order.potential_actions.clone())
            .ok_or_else(|| {
                SagaError::not_found("potential actions", transaction_id.to_string())
            })?;
        let order = self
            .orders
            .find_by_order_number(&object.order_number)
            .await?;

        let attributes = ActionAttributes::new(
            ActionType::ReturnAction,
            transaction.agent.clone(),
            json!({ "order_number": order.order_number, "reason": object.reason }),
        )
        .with_purpose(ActionPurpose::transaction(
            TransactionType::ReturnOrder,
            transaction_id,
        ));
        let (_, returned) = self
            .ledger
            .run(attributes, || async {
                let now = Utc::now();
                let invalidated = self
                    .ownership_infos
                    .invalidate_by_order_number(&order.order_number, now)
                    .await?;
                tracing::debug!(invalidated, "ownership infos invalidated");
                for offer in &order.accepted_offers {
                    self.reservations.cancel(&offer.reservation_id).await?;
                }
                self.mark_returned(&order.order_number).await
            })
            .await?;

        let now = Utc::now();
        let follow_ups = [
            potential_actions.refund_credit_card.map(TaskData::RefundCreditCard),
            potential_actions.refund_pecorino.map(TaskData::RefundPecorino),
            potential_actions.send_email_message.map(TaskData::SendEmailMessage),
        ];
        for data in follow_ups.into_iter().flatten() {
            enqueue_once(self.tasks.as_ref(), data, now).await?;
        }

        Ok(returned)
    }

    async fn mark_returned(&self, order_number: &str) -> Result<Order> {
        if let Some(returned) = self
            .orders
            .change_status(order_number, &OrderStatus::RETURNABLE, OrderStatus::Returned)
            .await?
        {
            metrics::counter!("orders_returned_total").increment(1);
            return Ok(returned);
        }
        let current = self.orders.find_by_order_number(order_number).await?;
        if current.order_status == OrderStatus::Returned {
            return Ok(current);
        }
        Err(SagaError::argument(format!(
            "order {order_number} is {} and cannot be returned",
            current.order_status
        )))
    }

    /// Captures an authorized payment once.
    #[tracing::instrument(skip(self, attributes), fields(order_number = %attributes.order_number))]
    pub async fn pay(&self, attributes: &PaymentActionAttributes) -> Result<()> {
        if self.settled(ActionType::PayAction, attributes).await? {
            tracing::debug!("payment already captured");
            return Ok(());
        }
        let authorization_id = self.authorization_id(attributes).await?;

        let payments = self.payments.clone();
        self.ledger
            .run(payment_action(ActionType::PayAction, attributes)?, || async move {
                payments.capture(&authorization_id).await
            })
            .await?;
        metrics::counter!("payments_captured_total", "payment_method" => attributes.payment_method.as_str())
            .increment(1);
        Ok(())
    }

    /// Refunds a captured payment once.
    #[tracing::instrument(skip(self, attributes), fields(order_number = %attributes.order_number))]
    pub async fn refund(&self, attributes: &PaymentActionAttributes) -> Result<()> {
        if self.settled(ActionType::RefundAction, attributes).await? {
            tracing::debug!("payment already refunded");
            return Ok(());
        }
        let authorization_id = self.authorization_id(attributes).await?;

        let payments = self.payments.clone();
        let amount = attributes.amount;
        self.ledger
            .run(payment_action(ActionType::RefundAction, attributes)?, || async move {
                payments.refund(&authorization_id, amount).await
            })
            .await?;
        metrics::counter!("payments_refunded_total", "payment_method" => attributes.payment_method.as_str())
            .increment(1);
        Ok(())
    }

    pub async fn send_email_message(
        &self,
        attributes: &SendEmailMessageActionAttributes,
    ) -> Result<()> {
        let action = ActionAttributes::new(
            ActionType::SendAction,
            Agent::system(),
            serde_json::to_value(&attributes.message)?,
        );
        self.ledger
            .run(action, || self.mailer.send(&attributes.message))
            .await?;
        tracing::info!(identifier = %attributes.message.identifier, "email message sent");
        Ok(())
    }

    /// Releases the seat holds of an abandoned PlaceOrder transaction.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_seat_reservations(&self, transaction_id: TransactionId) -> Result<()> {
        let (transaction, authorizations) = self.abandoned(transaction_id).await?;

        for seat in &authorizations.seats {
            let attributes = ActionAttributes::new(
                ActionType::CancelAction,
                transaction.agent.clone(),
                json!({
                    "authorize_action_id": seat.action_id,
                    "reservation_id": seat.reservation_id,
                }),
            )
            .with_purpose(ActionPurpose::transaction(
                TransactionType::PlaceOrder,
                transaction_id,
            ));
            let reservation_id = seat.reservation_id.clone();
            self.ledger
                .run(attributes, || async move {
                    self.reservations.cancel(&reservation_id).await
                })
                .await?;
        }
        tracing::info!(seats = authorizations.seats.len(), "seat reservations canceled");
        Ok(())
    }

    /// Voids the payment holds of an abandoned PlaceOrder transaction.
    #[tracing::instrument(skip(self))]
    pub async fn void_payments(&self, transaction_id: TransactionId) -> Result<()> {
        let (transaction, authorizations) = self.abandoned(transaction_id).await?;

        for payment in &authorizations.payments {
            let attributes = ActionAttributes::new(
                ActionType::CancelAction,
                transaction.agent.clone(),
                json!({
                    "authorize_action_id": payment.action_id,
                    "authorization_id": payment.authorization_id,
                }),
            )
            .with_purpose(ActionPurpose::transaction(
                TransactionType::PlaceOrder,
                transaction_id,
            ));
            let authorization_id = payment.authorization_id.clone();
            self.ledger
                .run(attributes, || async move {
                    self.payments.void(&authorization_id).await
                })
                .await?;
        }
        tracing::info!(payments = authorizations.payments.len(), "payments voided");
        Ok(())
    }

    async fn confirmed(
        &self,
        type_of: TransactionType,
        transaction_id: TransactionId,
    ) -> Result<Transaction> {
        let transaction = self.transactions.find_by_id(type_of, transaction_id).await?;
        if transaction.status != TransactionStatus::Confirmed {
            return Err(SagaError::argument(format!(
                "transaction {transaction_id} is {}",
                transaction.status
            )));
        }
        Ok(transaction)
    }

    async fn abandoned(&self, transaction_id: TransactionId) -> Result<(Transaction, Authorizations)> {
        let transaction = self
            .transactions
            .find_by_id(TransactionType::PlaceOrder, transaction_id)
            .await?;
        if !matches!(
            transaction.status,
            TransactionStatus::Expired | TransactionStatus::Canceled
        ) {
            return Err(SagaError::argument(format!(
                "transaction {transaction_id} is {}",
                transaction.status
            )));
        }
        let actions = self
            .actions()
            .find_authorize_by_transaction_id(transaction_id)
            .await?;
        let authorizations = Authorizations::from_actions(&actions)?;
        Ok((transaction, authorizations))
    }

    /// Whether a completed action of `type_of` already settled this payment.
    async fn settled(
        &self,
        type_of: ActionType,
        attributes: &PaymentActionAttributes,
    ) -> Result<bool> {
        let authorize_action_id = attributes.authorize_action_id.to_string();
        let actions = self
            .actions()
            .find_by_order_number(&attributes.order_number)
            .await?;
        Ok(actions.iter().any(|action| {
            action.type_of == type_of
                && action.is_completed()
                && action.object.get("authorize_action_id").and_then(|v| v.as_str())
                    == Some(authorize_action_id.as_str())
        }))
    }

    async fn authorization_id(&self, attributes: &PaymentActionAttributes) -> Result<String> {
        let action = self
            .actions()
            .find_by_id(ActionType::AuthorizeAction, attributes.authorize_action_id)
            .await?;
        let authorizations = Authorizations::from_actions(std::slice::from_ref(&action))?;
        let payment = authorizations
            .payment_by_action(action.id)
            .ok_or_else(|| {
                SagaError::not_found(
                    "payment authorization",
                    attributes.authorize_action_id.to_string(),
                )
            })?;
        if payment.payment_method != attributes.payment_method {
            return Err(SagaError::argument(format!(
                "authorization {} is a {} payment, not {}",
                action.id, payment.payment_method, attributes.payment_method
            )));
        }
        Ok(payment.authorization_id.clone())
    }
}

fn payment_action(
    type_of: ActionType,
    attributes: &PaymentActionAttributes,
) -> Result<ActionAttributes> {
    Ok(
        ActionAttributes::new(type_of, Agent::system(), serde_json::to_value(attributes)?)
            .with_purpose(ActionPurpose::order(attributes.order_number.clone())),
    )
}

fn undeliverable(order: &Order) -> SagaError {
    SagaError::argument(format!(
        "order {} is {} and cannot be delivered",
        order.order_number, order.order_status
    ))
}
