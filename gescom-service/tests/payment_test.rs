//! Payment ledger integration tests: debt tracking, clamping and the
//! paid/debt invariant.

mod common;

use common::{create_test_client, create_test_invoice, dec_field, TestApp};
use serde_json::json;
use serial_test::serial;

async fn pay(app: &TestApp, invoice_id: &str, amount: &str) -> reqwest::Response {
    app.post(
        &format!("/api/invoices/{}/payments", invoice_id),
        &json!({
            "amount": amount,
            "payment_date": "2026-01-20",
            "method": "bank_transfer"
        }),
    )
    .await
}

#[tokio::test]
#[serial]
async fn payments_move_invoice_through_partially_paid_to_paid() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Paiement SARL").await;
    // 10 x 100, no tax: total = 1000.
    let invoice = create_test_invoice(&app, &client_id, 10, "100", "0", "bank_transfer").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();
    assert_eq!(dec_field(&invoice, "total"), 1000.0);
    assert_eq!(invoice["status"], "unpaid");

    let response = pay(&app, invoice_id, "400").await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(!body["clamped"].as_bool().unwrap());
    assert_eq!(dec_field(&body["invoice"], "amount_paid"), 400.0);
    assert_eq!(dec_field(&body["invoice"], "client_debt"), 600.0);
    assert_eq!(body["invoice"]["status"], "partially_paid");

    let response = pay(&app, invoice_id, "600").await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(dec_field(&body["invoice"], "amount_paid"), 1000.0);
    assert_eq!(dec_field(&body["invoice"], "client_debt"), 0.0);
    assert_eq!(body["invoice"]["status"], "paid");
}

#[tokio::test]
#[serial]
async fn paid_plus_debt_equals_total_after_add_and_delete() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Invariant SARL").await;
    let invoice = create_test_invoice(&app, &client_id, 10, "100", "19", "bank_transfer").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();
    let total = dec_field(&invoice, "total");

    let response = pay(&app, invoice_id, "350.50").await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let paid = dec_field(&body["invoice"], "amount_paid");
    let debt = dec_field(&body["invoice"], "client_debt");
    assert!((paid + debt - total).abs() < 0.01);

    let payment_id = body["payment"]["payment_id"].as_str().unwrap();
    let response = app
        .client
        .delete(app.url(&format!(
            "/api/invoices/{}/payments/{}",
            invoice_id, payment_id
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let invoice: serde_json::Value = response.json().await.unwrap();
    assert_eq!(dec_field(&invoice, "amount_paid"), 0.0);
    assert!((dec_field(&invoice, "client_debt") - total).abs() < 0.01);
    assert_eq!(invoice["status"], "unpaid");
}

#[tokio::test]
#[serial]
async fn overpayment_is_clamped_with_a_notice() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Clamp SARL").await;
    let invoice = create_test_invoice(&app, &client_id, 1, "500", "0", "bank_transfer").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = pay(&app, invoice_id, "800").await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["clamped"].as_bool().unwrap());
    assert!(body["notice"].as_str().is_some());
    assert_eq!(dec_field(&body["payment"], "amount"), 500.0);
    assert_eq!(body["invoice"]["status"], "paid");
}

#[tokio::test]
#[serial]
async fn payments_are_refused_on_settled_and_cancelled_invoices() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Refus SARL").await;

    // Fully paid invoice refuses more payments.
    let invoice = create_test_invoice(&app, &client_id, 1, "100", "0", "bank_transfer").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();
    assert_eq!(pay(&app, invoice_id, "100").await.status(), 201);
    assert_eq!(pay(&app, invoice_id, "1").await.status(), 400);

    // Cancelled invoice refuses payments outright.
    let invoice = create_test_invoice(&app, &client_id, 1, "100", "0", "bank_transfer").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();
    let response = app
        .post_empty(&format!("/api/invoices/{}/cancel", invoice_id))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(pay(&app, invoice_id, "50").await.status(), 400);
}

#[tokio::test]
#[serial]
async fn mark_paid_rejects_an_already_paid_invoice() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "MarkPaid SARL").await;
    let invoice = create_test_invoice(&app, &client_id, 2, "75", "0", "bank_transfer").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .post_empty(&format!("/api/invoices/{}/mark-paid", invoice_id))
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "paid");
    assert_eq!(dec_field(&body, "amount_paid"), 150.0);
    assert_eq!(dec_field(&body, "client_debt"), 0.0);

    // Second mark-paid must not double-credit.
    let response = app
        .post_empty(&format!("/api/invoices/{}/mark-paid", invoice_id))
        .await;
    assert_eq!(response.status(), 400);

    let body = app.get_json(&format!("/api/invoices/{}", invoice_id)).await;
    assert_eq!(dec_field(&body, "amount_paid"), 150.0);
}

#[tokio::test]
#[serial]
async fn revert_recomputes_aggregates_from_the_ledger() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Revert SARL").await;
    let invoice = create_test_invoice(&app, &client_id, 1, "1000", "0", "bank_transfer").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    // Mark paid without ledger rows, then revert: aggregates come back
    // from the (empty) ledger.
    app.post_empty(&format!("/api/invoices/{}/mark-paid", invoice_id))
        .await;
    let response = app
        .post_empty(&format!("/api/invoices/{}/revert", invoice_id))
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unpaid");
    assert_eq!(dec_field(&body, "amount_paid"), 0.0);
    assert_eq!(dec_field(&body, "client_debt"), 1000.0);

    // With ledger rows, revert of a cancelled invoice preserves them.
    assert_eq!(pay(&app, invoice_id, "250").await.status(), 201);
    let payments = app
        .get_json(&format!("/api/invoices/{}/payments", invoice_id))
        .await;
    assert_eq!(payments.as_array().unwrap().len(), 1);
    let body = app.get_json(&format!("/api/invoices/{}", invoice_id)).await;
    assert_eq!(dec_field(&body, "amount_paid"), 250.0);
    assert_eq!(dec_field(&body, "client_debt"), 750.0);
}
