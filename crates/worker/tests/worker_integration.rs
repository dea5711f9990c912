//! Integration tests for the worker: inspection routes and the scheduler.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use domain::{
    Agent, CustomerContact, OrderStatus, PaymentMethod, Seller, TaskAttributes, TaskData,
    TransactionId, TransactionStatus, TransactionType,
};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    AuthorizePayment, AuthorizeSeat, ConfirmPlaceOrder, ReturnWindowPolicy, StartPlaceOrder,
};
use store::Repositories;
use tasks::InMemoryNotifier;
use tokio::sync::watch;
use tower::ServiceExt;
use worker::scheduler::{Intervals, Scheduler};
use worker::{AppState, Engine};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn in_memory_engine() -> Engine {
    Engine::new(
        Repositories::in_memory(),
        &worker::in_memory_collaborators(),
        Arc::new(ReturnWindowPolicy::default()),
        Arc::new(InMemoryNotifier::new()),
    )
}

fn setup() -> (axum::Router, Engine) {
    let engine = in_memory_engine();
    let state = Arc::new(AppState::new(&engine, "memory"));
    (worker::create_app(state, get_metrics_handle()), engine)
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();
    let (status, json) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "memory");
    assert_eq!(json["task_handlers"].as_array().unwrap().len(), 10);
    assert_eq!(json["task_handlers"][0], "PlaceOrder");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_get_task() {
    let (app, engine) = setup();
    let task = engine
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

    let (status, json) = get_json(app, &format!("/tasks/{}", task.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], task.id.to_string());
    assert_eq!(json["status"], "Ready");
    assert_eq!(json["data"]["name"], "VoidPayment");
}

#[tokio::test]
async fn test_get_task_errors() {
    let (app, _) = setup();
    let (status, _) = get_json(app.clone(), "/tasks/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = get_json(app, &format!("/tasks/{}", TransactionId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_get_transaction() {
    let (app, engine) = setup();
    let transaction = start_place_order(&engine).await;

    let uri = format!("/transactions/PlaceOrder/{}", transaction);
    let (status, json) = get_json(app.clone(), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "InProgress");

    // the id exists only as a PlaceOrder
    let uri = format!("/transactions/ReturnOrder/{}", transaction);
    let (status, _) = get_json(app.clone(), &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/transactions/Refund/{}", transaction);
    let (status, _) = get_json(app, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

async fn start_place_order(engine: &Engine) -> TransactionId {
    engine
        .services
        .place_order
        .start(StartPlaceOrder {
            agent: Agent::new("customer-1"),
            seller: Seller {
                id: "seller-1".to_string(),
                name: "Theater".to_string(),
                email: "box-office@example.com".to_string(),
            },
            expires: Utc::now() + chrono::Duration::minutes(15),
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_scheduler_materializes_confirmed_order() {
    let engine = in_memory_engine();
    let place_order = &engine.services.place_order;

    let transaction_id = start_place_order(&engine).await;
    place_order
        .authorize_seat_reservation(AuthorizeSeat {
            agent_id: "customer-1".to_string(),
            transaction_id,
            event_id: "event-1".to_string(),
            seat_number: "A-1".to_string(),
            price: 1800,
        })
        .await
        .unwrap();
    place_order
        .authorize_payment(AuthorizePayment {
            agent_id: "customer-1".to_string(),
            transaction_id,
            payment_method: PaymentMethod::Pecorino,
            amount: 1800,
        })
        .await
        .unwrap();
    place_order
        .set_customer_contact(
            "customer-1",
            transaction_id,
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
            transaction_id,
            send_email_message: false,
            forcibly: false,
        })
        .await
        .unwrap();
    let order_number = confirmed.place_order_result().unwrap().order.order_number.clone();

    let intervals = Intervals {
        poll: Duration::from_millis(5),
        export: Duration::from_millis(5),
        sweep: Duration::from_millis(50),
        retry: chrono::Duration::minutes(10),
        abort: chrono::Duration::minutes(10),
        reexport: chrono::Duration::minutes(10),
    };
    let scheduler = Scheduler::new(
        engine.runtime.clone(),
        engine.services.exporter.clone(),
        intervals,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loops = scheduler.spawn(shutdown_rx);

    let orders = engine.repositories.orders.clone();
    let delivered = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(order) = orders.find_by_order_number(&order_number).await
                && order.order_status == OrderStatus::Delivered
            {
                return order;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("order was not delivered in time");
    assert_eq!(delivered.payment_methods.len(), 1);

    shutdown_tx.send(true).unwrap();
    for handle in loops {
        handle.await.unwrap();
    }

    let transaction = engine
        .repositories
        .transactions
        .find_by_id(TransactionType::PlaceOrder, transaction_id)
        .await
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Confirmed);
    assert!(transaction.tasks_exported_at.is_some());
}
