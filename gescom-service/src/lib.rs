//! gescom-service: invoicing administration service.
//!
//! Clients, products, proforma and final invoices, delivery notes and
//! payments, backed by PostgreSQL and exposed over HTTP.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{AppState, Application};
