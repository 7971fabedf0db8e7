mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{TestLedger, ledger, wrong_code};
use fundflow::interfaces::http;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app(ledger: &TestLedger) -> Router {
    http::router(ledger.orchestrator.clone())
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_open_account_and_fetch() {
    let ledger = ledger();
    let router = app(&ledger);

    let (status, account) = send(
        &router,
        "POST",
        "/accounts",
        Some(json!({ "ownerId": "owner-1", "initialBalance": 100_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(account["balance"], 100_000);
    assert_eq!(account["status"], "active");

    let account_id = account["accountId"].as_str().unwrap();
    let (status, fetched) = send(&router, "GET", &format!("/accounts/{account_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["accountId"], account["accountId"]);

    let (status, _) = send(&router, "GET", "/accounts/ACC-MISSING", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_movement_lifecycle_over_http() {
    let ledger = ledger();
    let router = app(&ledger);
    let account = ledger.open_account("owner-1", 1_000_00).await;

    let idempotency_key = uuid::Uuid::new_v4();
    let request_body = json!({
        "idempotencyKey": idempotency_key,
        "kind": "deposit",
        "sourceAccountId": account.account_id.as_str(),
        "destinationAccountId": account.account_id.as_str(),
        "principalAmount": 50_000,
    });

    let (status, movement) = send(&router, "POST", "/movements", Some(request_body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(movement["status"], "otp_pending");
    assert_eq!(movement["feeAmount"], 1_500);
    assert_eq!(movement["totalAmount"], 51_500);

    // the same idempotency key returns the stored movement
    let (status, replayed) = send(&router, "POST", "/movements", Some(request_body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(replayed["movementId"], movement["movementId"]);

    let movement_id = movement["movementId"].as_str().unwrap().to_string();
    let code = ledger.code_for(idempotency_key).await;

    // wrong code burns an attempt
    let (status, error) = send(
        &router,
        "POST",
        &format!("/movements/{movement_id}/otp/verify"),
        Some(json!({ "code": wrong_code(&code) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["attemptsRemaining"], 4);

    // correct code commits and returns the receipt
    let (status, receipt) = send(
        &router,
        "POST",
        &format!("/movements/{movement_id}/otp/verify"),
        Some(json!({ "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "committed");
    assert_eq!(receipt["balanceAfter"], 98_500);
    assert!(
        receipt["reference"]
            .as_str()
            .unwrap()
            .starts_with("TXN_DEPOSIT_")
    );

    // replaying the used code is gone
    let (status, _) = send(
        &router,
        "POST",
        &format!("/movements/{movement_id}/otp/verify"),
        Some(json!({ "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);

    let (status, history) = send(
        &router,
        "GET",
        &format!("/accounts/{}/transactions?limit=10", account.account_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_insufficient_funds_conflict() {
    let ledger = ledger();
    let router = app(&ledger);
    let account = ledger.open_account("owner-1", 100_00).await;

    let (status, error) = send(
        &router,
        "POST",
        "/movements",
        Some(json!({
            "idempotencyKey": uuid::Uuid::new_v4(),
            "kind": "withdraw",
            "channel": "partner",
            "sourceAccountId": account.account_id.as_str(),
            "principalAmount": 10_000,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(
        error["error"]
            .as_str()
            .unwrap()
            .contains("insufficient funds")
    );
}

#[tokio::test]
async fn test_invalid_amount_bad_request() {
    let ledger = ledger();
    let router = app(&ledger);
    let account = ledger.open_account("owner-1", 1_000_00).await;

    // below the deposit minimum of 100.00
    let (status, _) = send(
        &router,
        "POST",
        "/movements",
        Some(json!({
            "idempotencyKey": uuid::Uuid::new_v4(),
            "kind": "deposit",
            "sourceAccountId": account.account_id.as_str(),
            "principalAmount": 50_00,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resend_throttled() {
    let ledger = ledger();
    let router = app(&ledger);
    let account = ledger.open_account("owner-1", 1_000_00).await;

    let movement = ledger
        .request(
            fundflow::domain::movement::MovementKind::Withdraw,
            None,
            &account.account_id,
            None,
            200_00,
        )
        .await;

    let (status, error) = send(
        &router,
        "POST",
        &format!("/movements/{}/otp/resend", movement.movement_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(error["retryAt"].is_string());
}
