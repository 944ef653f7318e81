//! Client model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A client: identity plus the fiscal fields printed on legal documents.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// NIF - fiscal identification number.
    pub tax_id: Option<String>,
    /// RC - trade register number.
    pub trade_register: Option<String>,
    /// AI - tax article number.
    pub tax_article: Option<String>,
    /// NIS - statistical identification number.
    pub statistical_id: Option<String>,
    /// RIB - bank account reference.
    pub bank_account: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a client.
#[derive(Debug, Clone)]
pub struct CreateClient {
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub trade_register: Option<String>,
    pub tax_article: Option<String>,
    pub statistical_id: Option<String>,
    pub bank_account: Option<String>,
}

/// Input for updating a client.
#[derive(Debug, Clone, Default)]
pub struct UpdateClient {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub trade_register: Option<String>,
    pub tax_article: Option<String>,
    pub statistical_id: Option<String>,
    pub bank_account: Option<String>,
}
