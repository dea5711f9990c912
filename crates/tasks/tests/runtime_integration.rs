//! End-to-end tests: saga confirmation, task export and the runtime.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::{
    Agent, CustomerContact, OrderStatus, PaymentMethod, Seller, TaskAttributes, TaskData,
    TaskName, TaskStatus, TransactionId, TransactionStatus, TransactionType,
};
use futures_util::future::join_all;
use saga::{
    AuthorizationStatus, AuthorizePayment, AuthorizeSeat, Collaborators, ConfirmPlaceOrder,
    EXPORTABLE, InMemoryMailer, InMemoryPaymentGateway, InMemoryReservationService,
    ReturnWindowPolicy, SagaServices, StartPlaceOrder,
};
use store::{Repositories, TaskSearch};
use tasks::{InMemoryNotifier, TaskRegistry, TaskRuntime};

struct TestHarness {
    services: SagaServices,
    repositories: Repositories,
    runtime: TaskRuntime,
    payments: InMemoryPaymentGateway,
    mailer: InMemoryMailer,
}

impl TestHarness {
    fn new() -> Self {
        let repositories = Repositories::in_memory();
        let payments = InMemoryPaymentGateway::new();
        let mailer = InMemoryMailer::new();
        let collaborators = Collaborators {
            payments: Arc::new(payments.clone()),
            reservations: Arc::new(InMemoryReservationService::new()),
            mailer: Arc::new(mailer.clone()),
        };
        let services = SagaServices::new(
            &repositories,
            &collaborators,
            Arc::new(ReturnWindowPolicy::default()),
        );
        let runtime = TaskRuntime::new(
            repositories.tasks.clone(),
            TaskRegistry::for_saga(services.orders.clone()),
            Arc::new(InMemoryNotifier::new()),
        );

        Self {
            services,
            repositories,
            runtime,
            payments,
            mailer,
        }
    }

    /// Exports every finished transaction and runs tasks until none is due.
    async fn drain(&self) -> usize {
        let mut executed = 0;
        loop {
            for (type_of, status) in EXPORTABLE {
                while self
                    .services
                    .exporter
                    .export_tasks(type_of, status)
                    .await
                    .unwrap()
                    .is_some()
                {}
            }

            let mut progressed = false;
            for name in TaskName::ALL {
                while self.runtime.execute_by_name(name).await.unwrap().is_some() {
                    executed += 1;
                    progressed = true;
                }
            }
            if !progressed {
                return executed;
            }
        }
    }
}

#[tokio::test]
async fn test_confirmed_order_is_fully_materialized() {
    let h = TestHarness::new();
    let place_order = &h.services.place_order;

    let transaction = place_order
        .start(StartPlaceOrder {
            agent: Agent::new("customer-1"),
            seller: Seller {
                id: "seller-1".to_string(),
                name: "Theater".to_string(),
                email: "box-office@example.com".to_string(),
            },
            expires: Utc::now() + Duration::minutes(15),
        })
        .await
        .unwrap();
    place_order
        .authorize_seat_reservation(AuthorizeSeat {
            agent_id: "customer-1".to_string(),
            transaction_id: transaction.id,
            event_id: "event-1".to_string(),
            seat_number: "A-1".to_string(),
            price: 2500,
        })
        .await
        .unwrap();
    place_order
        .authorize_payment(AuthorizePayment {
            agent_id: "customer-1".to_string(),
            transaction_id: transaction.id,
            payment_method: PaymentMethod::CreditCard,
            amount: 2500,
        })
        .await
        .unwrap();
    place_order
        .set_customer_contact(
            "customer-1",
            transaction.id,
            CustomerContact {
                name: "Jane".to_string(),
                email: "jane@example.com".to_string(),
                telephone: "+81-3-0000-0000".to_string(),
            },
        )
        .await
        .unwrap();
    let confirmed = place_order
        .confirm(ConfirmPlaceOrder {
            agent_id: "customer-1".to_string(),
            transaction_id: transaction.id,
            send_email_message: true,
            forcibly: false,
        })
        .await
        .unwrap();

    // PlaceOrder, SendOrder, PayCreditCard, SendEmailMessage
    assert_eq!(h.drain().await, 4);

    let order_number = &confirmed.place_order_result().unwrap().order.order_number;
    let order = h
        .repositories
        .orders
        .find_by_order_number(order_number)
        .await
        .unwrap();
    assert_eq!(order.order_status, OrderStatus::Delivered);
    assert_eq!(h.payments.count_in(AuthorizationStatus::Captured), 1);
    assert_eq!(h.mailer.sent().len(), 1);

    let executed = h
        .repositories
        .tasks
        .search(TaskSearch::new().status(TaskStatus::Executed))
        .await
        .unwrap();
    assert_eq!(executed.len(), 4);

    let exported = h
        .repositories
        .transactions
        .find_by_id(TransactionType::PlaceOrder, transaction.id)
        .await
        .unwrap();
    assert_eq!(exported.status, TransactionStatus::Confirmed);
    assert!(exported.tasks_exported_at.is_some());

    // nothing left to do
    assert_eq!(h.drain().await, 0);
}

#[tokio::test]
async fn test_concurrent_execution_claims_each_task_once() {
    let h = TestHarness::new();
    let mut ids = HashSet::new();
    for _ in 0..10 {
        // the transactions do not exist, so each handler fails; claims still count
        let task = h
            .repositories
            .tasks
            .save(TaskAttributes::asap(
                TaskData::VoidPayment {
                    transaction_id: TransactionId::new(),
                },
                Utc::now(),
            ))
            .await
            .unwrap();
        ids.insert(task.id);
    }

    let runs = (0..25).map(|_| h.runtime.execute_by_name(TaskName::VoidPayment));
    let claimed: Vec<_> = join_all(runs)
        .await
        .into_iter()
        .filter_map(|result| result.unwrap())
        .map(|task| task.id)
        .collect();

    assert_eq!(claimed.len(), 10);
    let unique: HashSet<_> = claimed.into_iter().collect();
    assert_eq!(unique, ids);
}
