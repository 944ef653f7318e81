//! Proforma lifecycle integration tests: transitions, conversion and
//! its undo.

mod common;

use common::{create_test_client, dec_field, TestApp};
use serde_json::{json, Value};
use serial_test::serial;

async fn create_draft_proforma(app: &TestApp, client_id: &str) -> Value {
    let response = app
        .post(
            "/api/proformas",
            &json!({
                "client_id": client_id,
                "payment_method": "cash",
                "issue_date": "2026-01-10",
                "items": [{
                    "name": "Installation",
                    "quantity": 10,
                    "unit_price": "100",
                    "tax_rate": "19"
                }]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    response.json().await.expect("Failed to parse proforma")
}

async fn transition(app: &TestApp, proforma_id: &str, action: &str) -> reqwest::Response {
    app.post_empty(&format!("/api/proformas/{}/{}", proforma_id, action))
        .await
}

#[tokio::test]
#[serial]
async fn proforma_walks_draft_sent_approved() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Lifecycle SARL").await;
    let proforma = create_draft_proforma(&app, &client_id).await;
    let proforma_id = proforma["proforma_id"].as_str().unwrap();
    assert_eq!(proforma["status"], "draft");
    // Cash above the 300 threshold: 1% stamp duty on the 1000 subtotal.
    assert_eq!(dec_field(&proforma, "subtotal"), 1000.0);
    assert_eq!(dec_field(&proforma, "stamp_tax"), 10.0);
    assert_eq!(dec_field(&proforma, "total"), 1200.0);

    let response = transition(&app, proforma_id, "send").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "sent");

    // Approving a draft is refused; sending twice is refused.
    assert_eq!(transition(&app, proforma_id, "send").await.status(), 400);

    let response = transition(&app, proforma_id, "approve").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "approved");

    // Unapprove returns to sent.
    let response = transition(&app, proforma_id, "unapprove").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "sent");
}

#[tokio::test]
#[serial]
async fn rejected_proforma_cannot_be_converted() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Rejet SARL").await;
    let proforma = create_draft_proforma(&app, &client_id).await;
    let proforma_id = proforma["proforma_id"].as_str().unwrap();

    transition(&app, proforma_id, "send").await;
    assert_eq!(transition(&app, proforma_id, "reject").await.status(), 200);
    assert_eq!(transition(&app, proforma_id, "convert").await.status(), 400);
}

#[tokio::test]
#[serial]
async fn conversion_creates_one_final_invoice_at_most() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Conversion SARL").await;
    let proforma = create_draft_proforma(&app, &client_id).await;
    let proforma_id = proforma["proforma_id"].as_str().unwrap();

    transition(&app, proforma_id, "send").await;
    transition(&app, proforma_id, "approve").await;

    let response = transition(&app, proforma_id, "convert").await;
    assert_eq!(response.status(), 201);
    let invoice: Value = response.json().await.unwrap();
    assert_eq!(invoice["status"], "unpaid");
    assert_eq!(dec_field(&invoice, "amount_paid"), 0.0);
    assert_eq!(
        dec_field(&invoice, "client_debt"),
        dec_field(&invoice, "total")
    );
    assert_eq!(invoice["proforma_id"].as_str().unwrap(), proforma_id);
    assert!(invoice["number"].as_str().unwrap().starts_with("F-"));

    // Totals were recalculated from the copied items.
    assert_eq!(dec_field(&invoice, "subtotal"), 1000.0);
    assert_eq!(dec_field(&invoice, "tax_total"), 190.0);

    // The proforma now links to the invoice and a second conversion fails.
    let body = app.get_json(&format!("/api/proformas/{}", proforma_id)).await;
    assert_eq!(
        body["final_invoice_id"].as_str().unwrap(),
        invoice["invoice_id"].as_str().unwrap()
    );
    assert_eq!(transition(&app, proforma_id, "convert").await.status(), 409);
}

#[tokio::test]
#[serial]
async fn undo_conversion_deletes_the_invoice_and_restores_approved() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Annulation SARL").await;
    let proforma = create_draft_proforma(&app, &client_id).await;
    let proforma_id = proforma["proforma_id"].as_str().unwrap();

    transition(&app, proforma_id, "send").await;
    transition(&app, proforma_id, "approve").await;
    let response = transition(&app, proforma_id, "convert").await;
    let invoice: Value = response.json().await.unwrap();
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = transition(&app, proforma_id, "undo-conversion").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "approved");
    assert!(body["final_invoice_id"].is_null());

    // The final invoice is gone.
    let response = app
        .client
        .get(app.url(&format!("/api/invoices/{}", invoice_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[serial]
async fn undo_conversion_is_blocked_once_payments_exist() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Blocage SARL").await;
    let proforma = create_draft_proforma(&app, &client_id).await;
    let proforma_id = proforma["proforma_id"].as_str().unwrap();

    transition(&app, proforma_id, "send").await;
    transition(&app, proforma_id, "approve").await;
    let response = transition(&app, proforma_id, "convert").await;
    let invoice: Value = response.json().await.unwrap();
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .post(
            &format!("/api/invoices/{}/payments", invoice_id),
            &json!({
                "amount": "100",
                "payment_date": "2026-01-20",
                "method": "cash"
            }),
        )
        .await;
    assert_eq!(response.status(), 201);

    assert_eq!(
        transition(&app, proforma_id, "undo-conversion").await.status(),
        409
    );
}

#[tokio::test]
#[serial]
async fn only_draft_proformas_can_be_updated_or_deleted() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Brouillon SARL").await;
    let proforma = create_draft_proforma(&app, &client_id).await;
    let proforma_id = proforma["proforma_id"].as_str().unwrap();

    transition(&app, proforma_id, "send").await;

    let response = app
        .client
        .put(app.url(&format!("/api/proformas/{}", proforma_id)))
        .json(&json!({ "notes": "modifié" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = app
        .client
        .delete(app.url(&format!("/api/proformas/{}", proforma_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[serial]
async fn updating_a_draft_recomputes_totals() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Recalcul SARL").await;
    let proforma = create_draft_proforma(&app, &client_id).await;
    let proforma_id = proforma["proforma_id"].as_str().unwrap();

    // Switching the payment method away from cash drops the stamp duty.
    let response = app
        .client
        .put(app.url(&format!("/api/proformas/{}", proforma_id)))
        .json(&json!({ "payment_method": "bank_transfer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(dec_field(&body, "stamp_tax"), 0.0);
    assert_eq!(dec_field(&body, "total"), 1190.0);

    // Replacing the items recomputes the line amounts.
    let response = app
        .client
        .put(app.url(&format!("/api/proformas/{}", proforma_id)))
        .json(&json!({
            "items": [{
                "name": "Installation",
                "quantity": 4,
                "unit_price": "250",
                "tax_rate": "19",
                "discount": "10"
            }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(dec_field(&body, "subtotal"), 900.0);
    assert_eq!(dec_field(&body, "tax_total"), 171.0);
}
