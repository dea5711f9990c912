//! The PlaceOrder saga.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::TransactionId;
use domain::{
    AcceptedOffer, Action, ActionAttributes, ActionPurpose, ActionType, Agent, CustomerContact,
    Order, OrderActionAttributes, OrderPaymentMethod, OrderPotentialActions, OrderStatus,
    PaymentActionAttributes, PaymentMethod, PlaceOrderObject, PlaceOrderPotentialActions,
    PlaceOrderResult, PotentialActions, SendEmailMessageActionAttributes,
    SendOrderActionAttributes, SendOrderPotentialActions, Seller, Transaction,
    TransactionAttributes, TransactionObject, TransactionResult, TransactionType,
};
use store::TransactionRepository;

use crate::authorization::{AuthorizeObject, Authorizations};
use crate::error::{Result, SagaError};
use crate::ledger::ActionLedger;
use crate::services::{PaymentGateway, ReservationService};
use crate::{ensure_agent, message};

#[derive(Debug, Clone)]
pub struct StartPlaceOrder {
    pub agent: Agent,
    pub seller: Seller,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuthorizeSeat {
    pub agent_id: String,
    pub transaction_id: TransactionId,
    pub event_id: String,
    pub seat_number: String,
    pub price: i64,
}

#[derive(Debug, Clone)]
pub struct AuthorizePayment {
    pub agent_id: String,
    pub transaction_id: TransactionId,
    pub payment_method: PaymentMethod,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct ConfirmPlaceOrder {
    pub agent_id: String,
    pub transaction_id: TransactionId,
    /// Attach an order confirmation email to the delivery.
    pub send_email_message: bool,
    /// Confirm even if the payment does not cover the seats.
    pub forcibly: bool,
}

#[derive(Clone)]
pub struct PlaceOrderService {
    transactions: Arc<dyn TransactionRepository>,
    ledger: ActionLedger,
    reservations: Arc<dyn ReservationService>,
    payments: Arc<dyn PaymentGateway>,
}

impl PlaceOrderService {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        ledger: ActionLedger,
        reservations: Arc<dyn ReservationService>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            transactions,
            ledger,
            reservations,
            payments,
        }
    }

    #[tracing::instrument(skip(self, command), fields(agent_id = %command.agent.id))]
    pub async fn start(&self, command: StartPlaceOrder) -> Result<Transaction> {
        let transaction = self
            .transactions
            .start(TransactionAttributes {
                agent: command.agent,
                object: TransactionObject::PlaceOrder(PlaceOrderObject::new(command.seller)),
                expires: command.expires,
            })
            .await?;
        tracing::info!(transaction_id = %transaction.id, "place order started");
        Ok(transaction)
    }

    /// Holds a seat for the transaction and records the authorization.
    #[tracing::instrument(skip(self, command), fields(transaction_id = %command.transaction_id))]
    pub async fn authorize_seat_reservation(&self, command: AuthorizeSeat) -> Result<Action> {
        if command.price < 0 {
            return Err(SagaError::argument("seat price must not be negative"));
        }
        let transaction = self.in_progress(command.transaction_id).await?;
        ensure_agent(&transaction, &command.agent_id)?;

        let object = AuthorizeObject::SeatReservation {
            event_id: command.event_id.clone(),
            seat_number: command.seat_number.clone(),
            price: command.price,
        };
        let attributes = authorize_attributes(&transaction, &object)?;

        let reservations = self.reservations.clone();
        let (action, _) = self
            .ledger
            .run(attributes, move || async move {
                reservations
                    .reserve(&command.event_id, &command.seat_number)
                    .await
            })
            .await?;
        Ok(action)
    }

    /// Places a payment hold for the transaction and records the authorization.
    #[tracing::instrument(skip(self, command), fields(transaction_id = %command.transaction_id))]
    pub async fn authorize_payment(&self, command: AuthorizePayment) -> Result<Action> {
        if command.amount <= 0 {
            return Err(SagaError::argument("payment amount must be positive"));
        }
        let transaction = self.in_progress(command.transaction_id).await?;
        ensure_agent(&transaction, &command.agent_id)?;

        let object = AuthorizeObject::Payment {
            payment_method: command.payment_method,
            amount: command.amount,
        };
        let attributes = authorize_attributes(&transaction, &object)?;

        let payments = self.payments.clone();
        let reference = transaction.id.to_string();
        let (action, _) = self
            .ledger
            .run(attributes, move || async move {
                payments
                    .authorize(command.payment_method, command.amount, &reference)
                    .await
            })
            .await?;
        Ok(action)
    }

    pub async fn set_customer_contact(
        &self,
        agent_id: &str,
        transaction_id: TransactionId,
        contact: CustomerContact,
    ) -> Result<Transaction> {
        let transaction = self.in_progress(transaction_id).await?;
        ensure_agent(&transaction, agent_id)?;

        let mut object = place_order_object(&transaction)?;
        object.customer_contact = Some(contact);
        Ok(self
            .transactions
            .update_object(transaction_id, TransactionObject::PlaceOrder(object))
            .await?)
    }

    /// Abandons the transaction; its authorizations are released by the
    /// exported tasks.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, agent_id: &str, transaction_id: TransactionId) -> Result<Transaction> {
        let transaction = self.in_progress(transaction_id).await?;
        ensure_agent(&transaction, agent_id)?;

        let canceled = self
            .transactions
            .cancel(TransactionType::PlaceOrder, transaction_id)
            .await?;
        tracing::info!("place order canceled");
        Ok(canceled)
    }

    /// Confirms the transaction, fixing the order and the follow-up work.
    #[tracing::instrument(
        skip(self, command),
        fields(transaction_id = %command.transaction_id, forcibly = command.forcibly)
    )]
    pub async fn confirm(&self, command: ConfirmPlaceOrder) -> Result<Transaction> {
        let transaction = self.in_progress(command.transaction_id).await?;
        ensure_agent(&transaction, &command.agent_id)?;

        let mut object = place_order_object(&transaction)?;
        let contact = object
            .customer_contact
            .clone()
            .ok_or_else(|| SagaError::argument("customer contact is required"))?;

        let actions = self
            .ledger
            .actions()
            .find_authorize_by_transaction_id(transaction.id)
            .await?;
        let authorizations = Authorizations::from_actions(&actions)?;
        if authorizations.seats.is_empty() {
            return Err(SagaError::argument("no seat reservation has been authorized"));
        }
        for method in [PaymentMethod::CreditCard, PaymentMethod::Pecorino] {
            let count = authorizations
                .payments
                .iter()
                .filter(|p| p.payment_method == method)
                .count();
            if count > 1 {
                return Err(SagaError::argument(format!(
                    "more than one {method} authorization"
                )));
            }
        }

        // Out-of-range totals are never bypassable.
        authorizations.seat_total()?;
        authorizations.payment_total()?;
        if let Err(err) = validate_request(&authorizations) {
            if !command.forcibly {
                return Err(err);
            }
            tracing::warn!(
                agent_id = %command.agent_id,
                reason = %err,
                "place order validation bypassed by forcible confirmation"
            );
            object.forcibly_confirmed = true;
            self.transactions
                .update_object(transaction.id, TransactionObject::PlaceOrder(object.clone()))
                .await?;
        }

        let order = build_order(&transaction, &object, contact, &authorizations, Utc::now())?;
        let potential_actions =
            build_potential_actions(&transaction, &order, &authorizations, command.send_email_message);

        let confirmed = self
            .transactions
            .confirm(
                TransactionType::PlaceOrder,
                transaction.id,
                TransactionResult::PlaceOrder(PlaceOrderResult { order }),
                PotentialActions::PlaceOrder(potential_actions),
            )
            .await?;

        metrics::counter!("transactions_confirmed_total", "type_of" => "PlaceOrder").increment(1);
        tracing::info!("place order confirmed");
        Ok(confirmed)
    }

    async fn in_progress(&self, transaction_id: TransactionId) -> Result<Transaction> {
        Ok(self
            .transactions
            .find_in_progress_by_id(TransactionType::PlaceOrder, transaction_id)
            .await?)
    }
}

/// The payment must cover exactly the reserved seats.
pub fn validate_request(authorizations: &Authorizations) -> Result<()> {
    let seats = authorizations.seat_total()?;
    let paid = authorizations.payment_total()?;
    if seats != paid {
        return Err(SagaError::argument(format!(
            "authorized payment {paid} does not match seat total {seats}"
        )));
    }
    Ok(())
}

fn place_order_object(transaction: &Transaction) -> Result<PlaceOrderObject> {
    transaction
        .place_order_object()
        .cloned()
        .ok_or_else(|| SagaError::argument(format!("{} is not a PlaceOrder", transaction.id)))
}

fn authorize_attributes(
    transaction: &Transaction,
    object: &AuthorizeObject,
) -> Result<ActionAttributes> {
    Ok(ActionAttributes::new(
        ActionType::AuthorizeAction,
        transaction.agent.clone(),
        serde_json::to_value(object)?,
    )
    .with_purpose(ActionPurpose::transaction(
        TransactionType::PlaceOrder,
        transaction.id,
    )))
}

fn build_order(
    transaction: &Transaction,
    object: &PlaceOrderObject,
    contact: CustomerContact,
    authorizations: &Authorizations,
    now: DateTime<Utc>,
) -> Result<Order> {
    Ok(Order {
        order_number: Order::number_for(transaction.id, transaction.start_date),
        transaction_id: transaction.id,
        customer: transaction.agent.clone(),
        customer_contact: contact,
        seller: object.seller.clone(),
        accepted_offers: authorizations
            .seats
            .iter()
            .map(|seat| AcceptedOffer {
                reservation_id: seat.reservation_id.clone(),
                event_id: seat.event_id.clone(),
                seat_number: seat.seat_number.clone(),
                price: seat.price,
            })
            .collect(),
        payment_methods: authorizations
            .payments
            .iter()
            .map(|payment| OrderPaymentMethod {
                payment_method: payment.payment_method,
                authorize_action_id: payment.action_id,
                amount: payment.amount,
            })
            .collect(),
        price: authorizations.seat_total()?,
        order_status: OrderStatus::Processing,
        order_date: now,
    })
}

fn build_potential_actions(
    transaction: &Transaction,
    order: &Order,
    authorizations: &Authorizations,
    send_email_message: bool,
) -> PlaceOrderPotentialActions {
    let pay = |method: PaymentMethod| {
        authorizations
            .payment(method)
            .map(|payment| PaymentActionAttributes {
                order_number: order.order_number.clone(),
                authorize_action_id: payment.action_id,
                payment_method: method,
                amount: payment.amount,
            })
    };

    PlaceOrderPotentialActions {
        order: OrderActionAttributes {
            agent: transaction.agent.clone(),
            order_number: order.order_number.clone(),
            potential_actions: OrderPotentialActions {
                send_order: Some(SendOrderActionAttributes {
                    order_number: order.order_number.clone(),
                    potential_actions: SendOrderPotentialActions {
                        send_email_message: send_email_message.then(|| {
                            SendEmailMessageActionAttributes {
                                message: message::order_delivered(order),
                            }
                        }),
                    },
                }),
                pay_credit_card: pay(PaymentMethod::CreditCard),
                pay_pecorino: pay(PaymentMethod::Pecorino),
            },
        },
    }
}
