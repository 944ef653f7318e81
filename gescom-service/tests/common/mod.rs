//! Common test utilities for gescom-service integration tests.
//!
//! Integration tests need a PostgreSQL instance; they skip (returning
//! early) when `TEST_DATABASE_URL` is unset so the unit suite stays
//! runnable without infrastructure.

use gescom_core::config::Config as CommonConfig;
use gescom_service::config::{Config, DatabaseConfig};
use gescom_service::startup::Application;
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,gescom_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn a test application, or `None` when no test database is
    /// configured.
    pub async fn spawn() -> Option<Self> {
        init_tracing();

        let database_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set; skipping integration test");
                return None;
            }
        };

        let config = Config {
            common: CommonConfig { port: 0 }, // Random port
            database: DatabaseConfig {
                url: Secret::new(database_url),
                max_connections: 2,
                min_connections: 1,
            },
            enforce_capabilities: false,
            service_name: "gescom-service-test".to_string(),
            log_level: "debug".to_string(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint.
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        Some(TestApp { address, client })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_empty(&self, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_json(&self, path: &str) -> Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .expect("Failed to parse response body")
    }
}

/// Create a client and return its ID.
pub async fn create_test_client(app: &TestApp, name: &str) -> String {
    let response = app
        .post(
            "/api/clients",
            &json!({
                "name": name,
                "address": "12 rue des Oliviers",
                "city": "Alger",
                "tax_id": "099912345678901",
                "trade_register": "16/00-1234567"
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse client");
    body["client_id"].as_str().expect("Missing client_id").to_string()
}

/// Create a final invoice with one line and return the response body.
pub async fn create_test_invoice(
    app: &TestApp,
    client_id: &str,
    quantity: i32,
    unit_price: &str,
    tax_rate: &str,
    payment_method: &str,
) -> Value {
    let response = app
        .post(
            "/api/invoices",
            &json!({
                "client_id": client_id,
                "payment_method": payment_method,
                "issue_date": "2026-01-15",
                "items": [{
                    "name": "Prestation",
                    "quantity": quantity,
                    "unit_price": unit_price,
                    "tax_rate": tax_rate
                }]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    response.json().await.expect("Failed to parse invoice")
}

/// Parse a decimal-as-string JSON field.
pub fn dec_field(value: &Value, key: &str) -> f64 {
    value[key]
        .as_str()
        .unwrap_or_else(|| panic!("Missing decimal field '{}'", key))
        .parse()
        .unwrap_or_else(|_| panic!("Field '{}' is not numeric", key))
}
