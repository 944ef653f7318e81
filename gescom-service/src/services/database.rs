//! Database service for gescom-service.
//!
//! All writes that touch money cross this layer inside a single
//! transaction: payment add/delete recompute the invoice aggregates with
//! the invoice row locked, and proforma conversion inserts the final
//! invoice and links it back under the same lock.

use crate::models::{
    Client, CreateClient, CreateDeliveryNote, CreateInvoice, CreateItem, CreatePayment,
    CreateProduct, CreateProforma, DeliveryNote, DeliveryNoteStatus, DocumentItem, Invoice,
    InvoiceStatus, ListDeliveryNotesFilter, ListInvoicesFilter, ListProductsFilter,
    ListProformasFilter, Payment, PaymentMethod, Product, Proforma, ProformaStatus, UpdateClient,
    UpdateDeliveryNote, UpdateProduct, UpdateProforma,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::totals::{self, ItemAmounts};
use gescom_core::error::AppError;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const CLIENT_COLUMNS: &str = "client_id, name, address, city, phone, email, tax_id, \
     trade_register, tax_article, statistical_id, bank_account, created_utc";

const PRODUCT_COLUMNS: &str =
    "product_id, name, reference, unit_price, tax_rate, stock_quantity, unit, created_utc";

const PROFORMA_COLUMNS: &str = "proforma_id, number, status, client_id, client_name, \
     payment_method, purchase_order, issue_date, subtotal, tax_total, stamp_tax, total, notes, \
     final_invoice_id, created_utc";

const INVOICE_COLUMNS: &str = "invoice_id, number, status, client_id, client_name, \
     payment_method, purchase_order, issue_date, subtotal, tax_total, stamp_tax, total, \
     amount_paid, client_debt, notes, proforma_id, created_utc";

const DELIVERY_NOTE_COLUMNS: &str = "delivery_note_id, number, status, client_id, client_name, \
     invoice_id, issue_date, subtotal, tax_total, total, notes, created_utc";

const ITEM_COLUMNS: &str = "item_id, document_id, product_id, name, quantity, unit_price, \
     tax_rate, discount, total_excl, total_tax, total, sort_order, created_utc";

const PAYMENT_COLUMNS: &str =
    "payment_id, invoice_id, amount, payment_date, method, reference, notes, created_utc";

/// Item table for each document kind.
#[derive(Clone, Copy)]
enum ItemTable {
    Proforma,
    Invoice,
    DeliveryNote,
}

impl ItemTable {
    fn name(&self) -> &'static str {
        match self {
            ItemTable::Proforma => "proforma_items",
            ItemTable::Invoice => "invoice_items",
            ItemTable::DeliveryNote => "delivery_note_items",
        }
    }
}

/// Result of recording a payment. `clamped` is set when the requested
/// amount exceeded the remaining debt and was reduced to it.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub clamped: bool,
    pub invoice: Invoice,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "gescom-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    /// Create a new client.
    #[instrument(skip(self, input))]
    pub async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let sql = format!(
            "INSERT INTO clients (client_id, name, address, city, phone, email, tax_id, \
             trade_register, tax_article, statistical_id, bank_account) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {CLIENT_COLUMNS}"
        );
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(Uuid::new_v4())
            .bind(&input.name)
            .bind(&input.address)
            .bind(&input.city)
            .bind(&input.phone)
            .bind(&input.email)
            .bind(&input.tax_id)
            .bind(&input.trade_register)
            .bind(&input.tax_article)
            .bind(&input.statistical_id)
            .bind(&input.bank_account)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create client: {}", e)))?;

        timer.observe_duration();

        info!(client_id = %client.client_id, name = %client.name, "Client created");

        Ok(client)
    }

    /// Get a client by ID.
    pub async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE client_id = $1");
        sqlx::query_as::<_, Client>(&sql)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))
    }

    /// List clients, optionally filtered by a name search.
    pub async fn list_clients(
        &self,
        search: Option<&str>,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<Client>, AppError> {
        let limit = page_size.clamp(1, 100) as i64;
        let pattern = search.map(|s| format!("%{}%", s));

        let sql = format!(
            "SELECT {CLIENT_COLUMNS} FROM clients \
             WHERE ($1::text IS NULL OR name ILIKE $1) \
               AND ($2::uuid IS NULL OR client_id > $2) \
             ORDER BY client_id \
             LIMIT $3"
        );
        sqlx::query_as::<_, Client>(&sql)
            .bind(&pattern)
            .bind(page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list clients: {}", e)))
    }

    /// Update a client.
    #[instrument(skip(self, input), fields(client_id = %client_id))]
    pub async fn update_client(
        &self,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        let sql = format!(
            "UPDATE clients \
             SET name = COALESCE($2, name), \
                 address = COALESCE($3, address), \
                 city = COALESCE($4, city), \
                 phone = COALESCE($5, phone), \
                 email = COALESCE($6, email), \
                 tax_id = COALESCE($7, tax_id), \
                 trade_register = COALESCE($8, trade_register), \
                 tax_article = COALESCE($9, tax_article), \
                 statistical_id = COALESCE($10, statistical_id), \
                 bank_account = COALESCE($11, bank_account) \
             WHERE client_id = $1 \
             RETURNING {CLIENT_COLUMNS}"
        );
        sqlx::query_as::<_, Client>(&sql)
            .bind(client_id)
            .bind(&input.name)
            .bind(&input.address)
            .bind(&input.city)
            .bind(&input.phone)
            .bind(&input.email)
            .bind(&input.tax_id)
            .bind(&input.trade_register)
            .bind(&input.tax_article)
            .bind(&input.statistical_id)
            .bind(&input.bank_account)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update client: {}", e)))
    }

    /// Delete a client. Refused while any document references it.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn delete_client(&self, client_id: Uuid) -> Result<bool, AppError> {
        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM proformas WHERE client_id = $1) \
                 OR EXISTS (SELECT 1 FROM invoices WHERE client_id = $1) \
                 OR EXISTS (SELECT 1 FROM delivery_notes WHERE client_id = $1)",
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check client references: {}", e))
        })?;

        if referenced {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Client is referenced by invoices, proformas or delivery notes"
            )));
        }

        let result = sqlx::query("DELETE FROM clients WHERE client_id = $1")
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete client: {}", e)))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(client_id = %client_id, "Client deleted");
        }

        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Product Operations
    // -------------------------------------------------------------------------

    /// Create a new product.
    #[instrument(skip(self, input))]
    pub async fn create_product(&self, input: &CreateProduct) -> Result<Product, AppError> {
        let sql = format!(
            "INSERT INTO products (product_id, name, reference, unit_price, tax_rate, \
             stock_quantity, unit) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(Uuid::new_v4())
            .bind(&input.name)
            .bind(&input.reference)
            .bind(input.unit_price)
            .bind(input.tax_rate)
            .bind(input.stock_quantity)
            .bind(&input.unit)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create product: {}", e))
            })?;

        info!(product_id = %product.product_id, name = %product.name, "Product created");

        Ok(product)
    }

    /// Get a product by ID.
    pub async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, AppError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1");
        sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get product: {}", e)))
    }

    /// List products.
    pub async fn list_products(
        &self,
        filter: &ListProductsFilter,
    ) -> Result<Vec<Product>, AppError> {
        let limit = filter.page_size.clamp(1, 100) as i64;
        let pattern = filter.search.as_ref().map(|s| format!("%{}%", s));

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE ($1::text IS NULL OR name ILIKE $1 OR reference ILIKE $1) \
               AND ($2::uuid IS NULL OR product_id > $2) \
             ORDER BY product_id \
             LIMIT $3"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(&pattern)
            .bind(filter.page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list products: {}", e)))
    }

    /// Update a product.
    #[instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: &UpdateProduct,
    ) -> Result<Option<Product>, AppError> {
        let sql = format!(
            "UPDATE products \
             SET name = COALESCE($2, name), \
                 reference = COALESCE($3, reference), \
                 unit_price = COALESCE($4, unit_price), \
                 tax_rate = COALESCE($5, tax_rate), \
                 stock_quantity = COALESCE($6, stock_quantity), \
                 unit = COALESCE($7, unit) \
             WHERE product_id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .bind(&input.name)
            .bind(&input.reference)
            .bind(input.unit_price)
            .bind(input.tax_rate)
            .bind(input.stock_quantity)
            .bind(&input.unit)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update product: {}", e))
            })
    }

    /// Delete a product. Item rows keep their snapshot, so this never
    /// breaks existing documents.
    pub async fn delete_product(&self, product_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.begin().await?;
        for table in [
            ItemTable::Proforma,
            ItemTable::Invoice,
            ItemTable::DeliveryNote,
        ] {
            let sql = format!(
                "UPDATE {} SET product_id = NULL WHERE product_id = $1",
                table.name()
            );
            sqlx::query(&sql)
                .bind(product_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to detach product: {}", e))
                })?;
        }

        let result = sqlx::query("DELETE FROM products WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete product: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit product delete: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Proforma Operations
    // -------------------------------------------------------------------------

    /// Create a new draft proforma with its items.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_proforma(&self, input: &CreateProforma) -> Result<Proforma, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_proforma"])
            .start_timer();

        if input.items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A proforma requires at least one item"
            )));
        }

        let method = PaymentMethod::from_string(&input.payment_method);
        let (amounts, doc_totals) = totals::compute(&input.items, method);

        let mut tx = self.begin().await?;

        let client = self
            .get_client(input.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

        let number: String = sqlx::query_scalar("SELECT next_proforma_number()")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to allocate proforma number: {}", e))
            })?;

        let proforma_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO proformas (proforma_id, number, status, client_id, client_name, \
             payment_method, purchase_order, issue_date, subtotal, tax_total, stamp_tax, total, \
             notes) \
             VALUES ($1, $2, 'draft', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {PROFORMA_COLUMNS}"
        );
        let proforma = sqlx::query_as::<_, Proforma>(&sql)
            .bind(proforma_id)
            .bind(&number)
            .bind(input.client_id)
            .bind(&client.name)
            .bind(method.as_str())
            .bind(&input.purchase_order)
            .bind(input.issue_date)
            .bind(doc_totals.subtotal)
            .bind(doc_totals.tax_total)
            .bind(doc_totals.stamp_tax)
            .bind(doc_totals.total)
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create proforma: {}", e))
            })?;

        insert_items(&mut tx, ItemTable::Proforma, proforma_id, &input.items, &amounts).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit proforma: {}", e))
        })?;

        timer.observe_duration();

        info!(proforma_id = %proforma.proforma_id, number = %proforma.number, "Draft proforma created");

        Ok(proforma)
    }

    /// Get a proforma by ID.
    pub async fn get_proforma(&self, proforma_id: Uuid) -> Result<Option<Proforma>, AppError> {
        let sql = format!("SELECT {PROFORMA_COLUMNS} FROM proformas WHERE proforma_id = $1");
        sqlx::query_as::<_, Proforma>(&sql)
            .bind(proforma_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get proforma: {}", e)))
    }

    /// Get the items of a proforma.
    pub async fn get_proforma_items(
        &self,
        proforma_id: Uuid,
    ) -> Result<Vec<DocumentItem>, AppError> {
        self.get_items(ItemTable::Proforma, proforma_id).await
    }

    /// List proformas.
    #[instrument(skip(self, filter))]
    pub async fn list_proformas(
        &self,
        filter: &ListProformasFilter,
    ) -> Result<Vec<Proforma>, AppError> {
        let limit = filter.page_size.clamp(1, 100) as i64;
        let status_str = filter.status.map(|s| s.as_str().to_string());

        let sql = format!(
            "SELECT {PROFORMA_COLUMNS} FROM proformas \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR client_id = $2) \
               AND ($3::date IS NULL OR issue_date >= $3) \
               AND ($4::date IS NULL OR issue_date <= $4) \
               AND ($5::uuid IS NULL OR proforma_id > $5) \
             ORDER BY proforma_id \
             LIMIT $6"
        );
        sqlx::query_as::<_, Proforma>(&sql)
            .bind(&status_str)
            .bind(filter.client_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list proformas: {}", e)))
    }

    /// Update a draft proforma. A provided item list replaces the stored
    /// rows and all derived money fields are recomputed.
    #[instrument(skip(self, input), fields(proforma_id = %proforma_id))]
    pub async fn update_proforma(
        &self,
        proforma_id: Uuid,
        input: &UpdateProforma,
    ) -> Result<Option<Proforma>, AppError> {
        let mut tx = self.begin().await?;

        let sql = format!(
            "SELECT {PROFORMA_COLUMNS} FROM proformas WHERE proforma_id = $1 FOR UPDATE"
        );
        let existing = sqlx::query_as::<_, Proforma>(&sql)
            .bind(proforma_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get proforma: {}", e)))?;

        let existing = match existing {
            Some(p) if ProformaStatus::from_string(&p.status).can_modify() => p,
            Some(_) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only draft proformas can be updated"
                )))
            }
            None => return Ok(None),
        };

        let method = input
            .payment_method
            .as_deref()
            .map(PaymentMethod::from_string)
            .unwrap_or_else(|| PaymentMethod::from_string(&existing.payment_method));

        // Recompute totals from the replacement items, or from the stored
        // rows when only the header changes (the payment method may move
        // the stamp duty).
        let items_for_totals: Vec<CreateItem> = match &input.items {
            Some(items) => {
                if items.is_empty() {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "A proforma requires at least one item"
                    )));
                }
                items.clone()
            }
            None => self
                .get_items_in_tx(&mut tx, ItemTable::Proforma, proforma_id)
                .await?
                .iter()
                .map(item_to_input)
                .collect(),
        };
        let (amounts, doc_totals) = totals::compute(&items_for_totals, method);

        if let Some(items) = &input.items {
            let sql = format!(
                "DELETE FROM {} WHERE document_id = $1",
                ItemTable::Proforma.name()
            );
            sqlx::query(&sql)
                .bind(proforma_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to replace items: {}", e))
                })?;
            insert_items(&mut tx, ItemTable::Proforma, proforma_id, items, &amounts).await?;
        }

        let sql = format!(
            "UPDATE proformas \
             SET payment_method = $2, \
                 purchase_order = COALESCE($3, purchase_order), \
                 issue_date = COALESCE($4, issue_date), \
                 notes = COALESCE($5, notes), \
                 subtotal = $6, tax_total = $7, stamp_tax = $8, total = $9 \
             WHERE proforma_id = $1 \
             RETURNING {PROFORMA_COLUMNS}"
        );
        let proforma = sqlx::query_as::<_, Proforma>(&sql)
            .bind(proforma_id)
            .bind(method.as_str())
            .bind(&input.purchase_order)
            .bind(input.issue_date)
            .bind(&input.notes)
            .bind(doc_totals.subtotal)
            .bind(doc_totals.tax_total)
            .bind(doc_totals.stamp_tax)
            .bind(doc_totals.total)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update proforma: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit proforma update: {}", e))
        })?;

        info!(proforma_id = %proforma.proforma_id, "Proforma updated");

        Ok(Some(proforma))
    }

    /// Delete a draft proforma.
    #[instrument(skip(self), fields(proforma_id = %proforma_id))]
    pub async fn delete_proforma(&self, proforma_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM proformas WHERE proforma_id = $1 AND status = 'draft'",
        )
        .bind(proforma_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete proforma: {}", e)))?;

        if result.rows_affected() == 0 {
            if self.get_proforma(proforma_id).await?.is_some() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only draft proformas can be deleted"
                )));
            }
            return Ok(false);
        }

        info!(proforma_id = %proforma_id, "Draft proforma deleted");
        Ok(true)
    }

    /// Conditional status transition for a proforma.
    async fn set_proforma_status(
        &self,
        proforma_id: Uuid,
        from: ProformaStatus,
        to: ProformaStatus,
    ) -> Result<Option<Proforma>, AppError> {
        let sql = format!(
            "UPDATE proformas SET status = $3 \
             WHERE proforma_id = $1 AND status = $2 \
             RETURNING {PROFORMA_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Proforma>(&sql)
            .bind(proforma_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update proforma status: {}", e))
            })?;

        match updated {
            Some(p) => {
                info!(proforma_id = %proforma_id, status = to.as_str(), "Proforma transitioned");
                Ok(Some(p))
            }
            None => match self.get_proforma(proforma_id).await? {
                Some(p) => Err(AppError::BadRequest(anyhow::anyhow!(
                    "Cannot move proforma from '{}' to '{}'",
                    p.status,
                    to.as_str()
                ))),
                None => Ok(None),
            },
        }
    }

    /// draft -> sent.
    pub async fn send_proforma(&self, proforma_id: Uuid) -> Result<Option<Proforma>, AppError> {
        self.set_proforma_status(proforma_id, ProformaStatus::Draft, ProformaStatus::Sent)
            .await
    }

    /// sent -> approved.
    pub async fn approve_proforma(&self, proforma_id: Uuid) -> Result<Option<Proforma>, AppError> {
        self.set_proforma_status(proforma_id, ProformaStatus::Sent, ProformaStatus::Approved)
            .await
    }

    /// sent -> rejected.
    pub async fn reject_proforma(&self, proforma_id: Uuid) -> Result<Option<Proforma>, AppError> {
        self.set_proforma_status(proforma_id, ProformaStatus::Sent, ProformaStatus::Rejected)
            .await
    }

    /// approved -> sent. Refused once a final invoice is linked.
    pub async fn unapprove_proforma(
        &self,
        proforma_id: Uuid,
    ) -> Result<Option<Proforma>, AppError> {
        if let Some(p) = self.get_proforma(proforma_id).await? {
            if p.final_invoice_id.is_some() {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Proforma has been converted; undo the conversion first"
                )));
            }
        }
        self.set_proforma_status(proforma_id, ProformaStatus::Approved, ProformaStatus::Sent)
            .await
    }

    // -------------------------------------------------------------------------
    // Conversion
    // -------------------------------------------------------------------------

    /// Allocate the next final-invoice number, falling back to a
    /// timestamp-derived number when the allocator is unavailable.
    /// Fallback numbers are non-sequential by design.
    async fn allocate_invoice_number(&self) -> String {
        match sqlx::query_scalar::<_, String>("SELECT next_invoice_number()")
            .fetch_one(&self.pool)
            .await
        {
            Ok(number) => number,
            Err(e) => {
                warn!(error = %e, "Invoice number allocation failed, using timestamp fallback");
                format!("F-{}", chrono::Utc::now().format("%y%m%d%H%M%S"))
            }
        }
    }

    /// Convert an approved proforma into a final invoice.
    ///
    /// At most one final invoice can ever exist per proforma: the link is
    /// written with a conditional UPDATE under the proforma row lock, so a
    /// concurrent second attempt fails with a conflict.
    #[instrument(skip(self), fields(proforma_id = %proforma_id))]
    pub async fn convert_proforma(
        &self,
        proforma_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["convert_proforma"])
            .start_timer();

        let mut tx = self.begin().await?;

        let sql = format!(
            "SELECT {PROFORMA_COLUMNS} FROM proformas WHERE proforma_id = $1 FOR UPDATE"
        );
        let proforma = sqlx::query_as::<_, Proforma>(&sql)
            .bind(proforma_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get proforma: {}", e)))?;

        let proforma = match proforma {
            Some(p) => p,
            None => return Ok(None),
        };

        if proforma.final_invoice_id.is_some() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Proforma already has a final invoice"
            )));
        }
        if !ProformaStatus::from_string(&proforma.status).can_convert() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only approved proformas can be converted"
            )));
        }

        let items = self
            .get_items_in_tx(&mut tx, ItemTable::Proforma, proforma_id)
            .await?;
        let item_inputs: Vec<CreateItem> = items.iter().map(item_to_input).collect();
        let method = PaymentMethod::from_string(&proforma.payment_method);
        let (amounts, doc_totals) = totals::compute(&item_inputs, method);

        let number = self.allocate_invoice_number().await;

        let invoice_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO invoices (invoice_id, number, status, client_id, client_name, \
             payment_method, purchase_order, issue_date, subtotal, tax_total, stamp_tax, total, \
             amount_paid, client_debt, notes, proforma_id) \
             VALUES ($1, $2, 'unpaid', $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $11, $12, $13) \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .bind(&number)
            .bind(proforma.client_id)
            .bind(&proforma.client_name)
            .bind(method.as_str())
            .bind(&proforma.purchase_order)
            .bind(proforma.issue_date)
            .bind(doc_totals.subtotal)
            .bind(doc_totals.tax_total)
            .bind(doc_totals.stamp_tax)
            .bind(doc_totals.total)
            .bind(&proforma.notes)
            .bind(proforma_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create final invoice: {}", e))
            })?;

        insert_items(&mut tx, ItemTable::Invoice, invoice_id, &item_inputs, &amounts).await?;

        let result = sqlx::query(
            "UPDATE proformas SET final_invoice_id = $2 \
             WHERE proforma_id = $1 AND final_invoice_id IS NULL AND status = 'approved'",
        )
        .bind(proforma_id)
        .bind(invoice_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to link proforma: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Proforma was converted concurrently"
            )));
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit conversion: {}", e))
        })?;

        timer.observe_duration();

        info!(
            proforma_id = %proforma_id,
            invoice_id = %invoice.invoice_id,
            number = %invoice.number,
            "Proforma converted to final invoice"
        );

        Ok(Some(invoice))
    }

    /// Undo a conversion: delete the final invoice and return the
    /// proforma to approved. Refused once payments exist on the invoice.
    #[instrument(skip(self), fields(proforma_id = %proforma_id))]
    pub async fn undo_conversion(&self, proforma_id: Uuid) -> Result<Option<Proforma>, AppError> {
        let mut tx = self.begin().await?;

        let sql = format!(
            "SELECT {PROFORMA_COLUMNS} FROM proformas WHERE proforma_id = $1 FOR UPDATE"
        );
        let proforma = sqlx::query_as::<_, Proforma>(&sql)
            .bind(proforma_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get proforma: {}", e)))?;

        let proforma = match proforma {
            Some(p) => p,
            None => return Ok(None),
        };

        let invoice_id = proforma.final_invoice_id.ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Proforma has not been converted"))
        })?;

        let payment_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM invoice_payments WHERE invoice_id = $1")
                .bind(invoice_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to count payments: {}", e))
                })?;

        if payment_count > 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Cannot undo conversion: payments are recorded on the final invoice"
            )));
        }

        let number: Option<String> =
            sqlx::query_scalar("DELETE FROM invoices WHERE invoice_id = $1 RETURNING number")
                .bind(invoice_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to delete final invoice: {}", e))
                })?;

        if let Some(number) = number {
            sqlx::query("SELECT release_invoice_number($1)")
                .bind(&number)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to release number: {}", e))
                })?;
        }

        let sql = format!(
            "UPDATE proformas SET final_invoice_id = NULL, status = 'approved' \
             WHERE proforma_id = $1 \
             RETURNING {PROFORMA_COLUMNS}"
        );
        let proforma = sqlx::query_as::<_, Proforma>(&sql)
            .bind(proforma_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to unlink proforma: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit undo: {}", e))
        })?;

        info!(proforma_id = %proforma_id, invoice_id = %invoice_id, "Conversion undone");

        Ok(Some(proforma))
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Create a final invoice directly, without a proforma.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        if input.items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "An invoice requires at least one item"
            )));
        }

        let method = PaymentMethod::from_string(&input.payment_method);
        let (amounts, doc_totals) = totals::compute(&input.items, method);

        let client = self
            .get_client(input.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

        let number = self.allocate_invoice_number().await;

        let mut tx = self.begin().await?;

        let invoice_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO invoices (invoice_id, number, status, client_id, client_name, \
             payment_method, purchase_order, issue_date, subtotal, tax_total, stamp_tax, total, \
             amount_paid, client_debt, notes) \
             VALUES ($1, $2, 'unpaid', $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $11, $12) \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .bind(&number)
            .bind(input.client_id)
            .bind(&client.name)
            .bind(method.as_str())
            .bind(&input.purchase_order)
            .bind(input.issue_date)
            .bind(doc_totals.subtotal)
            .bind(doc_totals.tax_total)
            .bind(doc_totals.stamp_tax)
            .bind(doc_totals.total)
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e))
            })?;

        insert_items(&mut tx, ItemTable::Invoice, invoice_id, &input.items, &amounts).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, number = %invoice.number, "Final invoice created");

        Ok(invoice)
    }

    /// Get a final invoice by ID.
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1");
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))
    }

    /// Get the items of a final invoice.
    pub async fn get_invoice_items(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<DocumentItem>, AppError> {
        self.get_items(ItemTable::Invoice, invoice_id).await
    }

    /// List final invoices. The status filter matches the derived status,
    /// so it is applied after fetching a page.
    #[instrument(skip(self, filter))]
    pub async fn list_invoices(
        &self,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let limit = filter.page_size.clamp(1, 100) as i64;

        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE ($1::uuid IS NULL OR client_id = $1) \
               AND ($2::date IS NULL OR issue_date >= $2) \
               AND ($3::date IS NULL OR issue_date <= $3) \
               AND ($4::uuid IS NULL OR invoice_id > $4) \
             ORDER BY invoice_id \
             LIMIT $5"
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(filter.client_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        Ok(match filter.status {
            Some(status) => invoices
                .into_iter()
                .filter(|i| i.derived_status() == status)
                .collect(),
            None => invoices,
        })
    }

    /// Delete a final invoice. Only possible while unpaid with no
    /// recorded payments; the number returns to the recycling pool.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.begin().await?;

        let invoice = self.lock_invoice(&mut tx, invoice_id).await?;
        let invoice = match invoice {
            Some(i) => i,
            None => return Ok(false),
        };

        if invoice.derived_status() != InvoiceStatus::Unpaid
            || InvoiceStatus::from_string(&invoice.status).is_sticky()
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only unpaid invoices can be deleted"
            )));
        }

        sqlx::query("UPDATE proformas SET final_invoice_id = NULL WHERE final_invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to unlink proforma: {}", e))
            })?;

        sqlx::query("DELETE FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e)))?;

        sqlx::query("SELECT release_invoice_number($1)")
            .bind(&invoice.number)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to release number: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice delete: {}", e))
        })?;

        info!(invoice_id = %invoice_id, number = %invoice.number, "Invoice deleted, number pooled");

        Ok(true)
    }

    /// Mark an unpaid invoice as fully paid without ledger rows.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn mark_invoice_paid(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let mut tx = self.begin().await?;

        let invoice = match self.lock_invoice(&mut tx, invoice_id).await? {
            Some(i) => i,
            None => return Ok(None),
        };

        match invoice.derived_status() {
            InvoiceStatus::Unpaid => {}
            InvoiceStatus::Paid => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Invoice is already paid"
                )))
            }
            other => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Cannot mark a '{}' invoice as paid",
                    other.as_str()
                )))
            }
        }

        let sql = format!(
            "UPDATE invoices SET status = 'unpaid', amount_paid = total, client_debt = 0 \
             WHERE invoice_id = $1 \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to mark invoice paid: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit mark-paid: {}", e))
        })?;

        info!(invoice_id = %invoice_id, "Invoice marked as paid");

        Ok(Some(invoice))
    }

    /// Cancel an unpaid invoice (sticky administrative override).
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        self.set_sticky_status(invoice_id, InvoiceStatus::Cancelled, true)
            .await
    }

    /// Credit an invoice (sticky administrative override). Unlike cancel,
    /// this is allowed whatever the payment state.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn credit_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        self.set_sticky_status(invoice_id, InvoiceStatus::Credited, false)
            .await
    }

    async fn set_sticky_status(
        &self,
        invoice_id: Uuid,
        to: InvoiceStatus,
        require_unpaid: bool,
    ) -> Result<Option<Invoice>, AppError> {
        let mut tx = self.begin().await?;

        let invoice = match self.lock_invoice(&mut tx, invoice_id).await? {
            Some(i) => i,
            None => return Ok(None),
        };

        if InvoiceStatus::from_string(&invoice.status).is_sticky() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoice is already {}",
                invoice.status
            )));
        }
        if require_unpaid && invoice.derived_status() != InvoiceStatus::Unpaid {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only unpaid invoices can be {}",
                to.as_str()
            )));
        }

        let sql = format!(
            "UPDATE invoices SET status = $2 WHERE invoice_id = $1 RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .bind(to.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice status: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit status change: {}", e))
        })?;

        info!(invoice_id = %invoice_id, status = to.as_str(), "Invoice transitioned");

        Ok(Some(invoice))
    }

    /// Revert a paid, partially paid or cancelled invoice to unpaid.
    /// Recorded payments are preserved and the aggregates recomputed from
    /// the ledger, so the paid/debt invariant holds again afterwards.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn revert_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let mut tx = self.begin().await?;

        let invoice = match self.lock_invoice(&mut tx, invoice_id).await? {
            Some(i) => i,
            None => return Ok(None),
        };

        let stored = InvoiceStatus::from_string(&invoice.status);
        let derived = invoice.derived_status();
        let allowed = stored == InvoiceStatus::Cancelled
            || matches!(
                derived,
                InvoiceStatus::Paid | InvoiceStatus::PartiallyPaid
            );
        if !allowed {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot revert a '{}' invoice",
                derived.as_str()
            )));
        }

        let paid_sum = self.sum_payments(&mut tx, invoice_id).await?;
        let client_debt = (invoice.total - paid_sum).max(Decimal::ZERO);

        let sql = format!(
            "UPDATE invoices SET status = 'unpaid', amount_paid = $2, client_debt = $3 \
             WHERE invoice_id = $1 \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .bind(paid_sum)
            .bind(client_debt)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to revert invoice: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit revert: {}", e))
        })?;

        info!(invoice_id = %invoice_id, "Invoice reverted to unpaid");

        Ok(Some(invoice))
    }

    // -------------------------------------------------------------------------
    // Payment Operations
    // -------------------------------------------------------------------------

    /// Record a payment against a final invoice.
    ///
    /// The ledger insert and the aggregate recompute run in the same
    /// transaction with the invoice row locked: two concurrent submissions
    /// cannot both pass the clamp check against a stale remaining debt.
    #[instrument(skip(self, input), fields(invoice_id = %input.invoice_id))]
    pub async fn add_payment(
        &self,
        input: &CreatePayment,
    ) -> Result<Option<PaymentOutcome>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_payment"])
            .start_timer();

        if input.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be positive"
            )));
        }

        let mut tx = self.begin().await?;

        let invoice = match self.lock_invoice(&mut tx, input.invoice_id).await? {
            Some(i) => i,
            None => return Ok(None),
        };

        if InvoiceStatus::from_string(&invoice.status).is_sticky() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot record payments against a {} invoice",
                invoice.status
            )));
        }

        let remaining = (invoice.total - invoice.amount_paid).max(Decimal::ZERO);
        if remaining == Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoice is already settled"
            )));
        }

        let clamped = input.amount > remaining;
        let amount = if clamped { remaining } else { input.amount };

        let sql = format!(
            "INSERT INTO invoice_payments (payment_id, invoice_id, amount, payment_date, \
             method, reference, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {PAYMENT_COLUMNS}"
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.invoice_id)
            .bind(amount)
            .bind(input.payment_date)
            .bind(&input.method)
            .bind(&input.reference)
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)))?;

        let invoice = self
            .recompute_aggregates(&mut tx, input.invoice_id, invoice.total)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit payment: {}", e))
        })?;

        timer.observe_duration();

        info!(
            payment_id = %payment.payment_id,
            invoice_id = %payment.invoice_id,
            amount = %payment.amount,
            clamped = clamped,
            "Payment recorded"
        );

        Ok(Some(PaymentOutcome {
            payment,
            clamped,
            invoice,
        }))
    }

    /// Delete a payment and recompute the invoice aggregates in the same
    /// transaction.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, payment_id = %payment_id))]
    pub async fn delete_payment(
        &self,
        invoice_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let mut tx = self.begin().await?;

        let invoice = match self.lock_invoice(&mut tx, invoice_id).await? {
            Some(i) => i,
            None => return Ok(None),
        };

        let result =
            sqlx::query("DELETE FROM invoice_payments WHERE payment_id = $1 AND invoice_id = $2")
                .bind(payment_id)
                .bind(invoice_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to delete payment: {}", e))
                })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Payment not found")));
        }

        let invoice = self
            .recompute_aggregates(&mut tx, invoice_id, invoice.total)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit payment delete: {}", e))
        })?;

        info!(payment_id = %payment_id, invoice_id = %invoice_id, "Payment deleted");

        Ok(Some(invoice))
    }

    /// List the payments recorded against an invoice, in insertion order.
    pub async fn list_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM invoice_payments \
             WHERE invoice_id = $1 \
             ORDER BY created_utc, payment_id"
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))
    }

    // -------------------------------------------------------------------------
    // Delivery Note Operations
    // -------------------------------------------------------------------------

    /// Create a pending delivery note with its items.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_delivery_note(
        &self,
        input: &CreateDeliveryNote,
    ) -> Result<DeliveryNote, AppError> {
        if input.items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A delivery note requires at least one item"
            )));
        }

        // Delivery notes never carry stamp duty.
        let (amounts, doc_totals) = totals::compute(&input.items, PaymentMethod::BankTransfer);

        let client = self
            .get_client(input.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

        if let Some(invoice_id) = input.invoice_id {
            if self.get_invoice(invoice_id).await?.is_none() {
                return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
            }
        }

        let mut tx = self.begin().await?;

        let number: String = sqlx::query_scalar("SELECT next_delivery_note_number()")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to allocate delivery note number: {}",
                    e
                ))
            })?;

        let delivery_note_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO delivery_notes (delivery_note_id, number, status, client_id, \
             client_name, invoice_id, issue_date, subtotal, tax_total, total, notes) \
             VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {DELIVERY_NOTE_COLUMNS}"
        );
        let note = sqlx::query_as::<_, DeliveryNote>(&sql)
            .bind(delivery_note_id)
            .bind(&number)
            .bind(input.client_id)
            .bind(&client.name)
            .bind(input.invoice_id)
            .bind(input.issue_date)
            .bind(doc_totals.subtotal)
            .bind(doc_totals.tax_total)
            .bind(doc_totals.subtotal + doc_totals.tax_total)
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create delivery note: {}", e))
            })?;

        insert_items(
            &mut tx,
            ItemTable::DeliveryNote,
            delivery_note_id,
            &input.items,
            &amounts,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit delivery note: {}", e))
        })?;

        info!(delivery_note_id = %note.delivery_note_id, number = %note.number, "Delivery note created");

        Ok(note)
    }

    /// Get a delivery note by ID.
    pub async fn get_delivery_note(
        &self,
        delivery_note_id: Uuid,
    ) -> Result<Option<DeliveryNote>, AppError> {
        let sql = format!(
            "SELECT {DELIVERY_NOTE_COLUMNS} FROM delivery_notes WHERE delivery_note_id = $1"
        );
        sqlx::query_as::<_, DeliveryNote>(&sql)
            .bind(delivery_note_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get delivery note: {}", e))
            })
    }

    /// Get the items of a delivery note.
    pub async fn get_delivery_note_items(
        &self,
        delivery_note_id: Uuid,
    ) -> Result<Vec<DocumentItem>, AppError> {
        self.get_items(ItemTable::DeliveryNote, delivery_note_id).await
    }

    /// List delivery notes.
    pub async fn list_delivery_notes(
        &self,
        filter: &ListDeliveryNotesFilter,
    ) -> Result<Vec<DeliveryNote>, AppError> {
        let limit = filter.page_size.clamp(1, 100) as i64;
        let status_str = filter.status.map(|s| s.as_str().to_string());

        let sql = format!(
            "SELECT {DELIVERY_NOTE_COLUMNS} FROM delivery_notes \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR client_id = $2) \
               AND ($3::uuid IS NULL OR delivery_note_id > $3) \
             ORDER BY delivery_note_id \
             LIMIT $4"
        );
        sqlx::query_as::<_, DeliveryNote>(&sql)
            .bind(&status_str)
            .bind(filter.client_id)
            .bind(filter.page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to list delivery notes: {}", e))
            })
    }

    /// Update a pending delivery note.
    #[instrument(skip(self, input), fields(delivery_note_id = %delivery_note_id))]
    pub async fn update_delivery_note(
        &self,
        delivery_note_id: Uuid,
        input: &UpdateDeliveryNote,
    ) -> Result<Option<DeliveryNote>, AppError> {
        let mut tx = self.begin().await?;

        let sql = format!(
            "SELECT {DELIVERY_NOTE_COLUMNS} FROM delivery_notes \
             WHERE delivery_note_id = $1 FOR UPDATE"
        );
        let existing = sqlx::query_as::<_, DeliveryNote>(&sql)
            .bind(delivery_note_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get delivery note: {}", e))
            })?;

        let _existing = match existing {
            Some(n) if DeliveryNoteStatus::from_string(&n.status).can_modify() => n,
            Some(_) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only pending delivery notes can be updated"
                )))
            }
            None => return Ok(None),
        };

        let items_for_totals: Vec<CreateItem> = match &input.items {
            Some(items) => {
                if items.is_empty() {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "A delivery note requires at least one item"
                    )));
                }
                items.clone()
            }
            None => self
                .get_items_in_tx(&mut tx, ItemTable::DeliveryNote, delivery_note_id)
                .await?
                .iter()
                .map(item_to_input)
                .collect(),
        };
        let (amounts, doc_totals) =
            totals::compute(&items_for_totals, PaymentMethod::BankTransfer);

        if let Some(items) = &input.items {
            let sql = format!(
                "DELETE FROM {} WHERE document_id = $1",
                ItemTable::DeliveryNote.name()
            );
            sqlx::query(&sql)
                .bind(delivery_note_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to replace items: {}", e))
                })?;
            insert_items(
                &mut tx,
                ItemTable::DeliveryNote,
                delivery_note_id,
                items,
                &amounts,
            )
            .await?;
        }

        let sql = format!(
            "UPDATE delivery_notes \
             SET invoice_id = COALESCE($2, invoice_id), \
                 issue_date = COALESCE($3, issue_date), \
                 notes = COALESCE($4, notes), \
                 subtotal = $5, tax_total = $6, total = $7 \
             WHERE delivery_note_id = $1 \
             RETURNING {DELIVERY_NOTE_COLUMNS}"
        );
        let note = sqlx::query_as::<_, DeliveryNote>(&sql)
            .bind(delivery_note_id)
            .bind(input.invoice_id)
            .bind(input.issue_date)
            .bind(&input.notes)
            .bind(doc_totals.subtotal)
            .bind(doc_totals.tax_total)
            .bind(doc_totals.subtotal + doc_totals.tax_total)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update delivery note: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit delivery note update: {}", e))
        })?;

        Ok(Some(note))
    }

    /// Conditional status transition for a delivery note.
    async fn set_delivery_note_status(
        &self,
        delivery_note_id: Uuid,
        to: DeliveryNoteStatus,
    ) -> Result<Option<DeliveryNote>, AppError> {
        let sql = format!(
            "UPDATE delivery_notes SET status = $2 \
             WHERE delivery_note_id = $1 AND status = 'pending' \
             RETURNING {DELIVERY_NOTE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, DeliveryNote>(&sql)
            .bind(delivery_note_id)
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to update delivery note status: {}",
                    e
                ))
            })?;

        match updated {
            Some(n) => {
                info!(delivery_note_id = %delivery_note_id, status = to.as_str(), "Delivery note transitioned");
                Ok(Some(n))
            }
            None => match self.get_delivery_note(delivery_note_id).await? {
                Some(n) => Err(AppError::BadRequest(anyhow::anyhow!(
                    "Cannot move delivery note from '{}' to '{}'",
                    n.status,
                    to.as_str()
                ))),
                None => Ok(None),
            },
        }
    }

    /// pending -> delivered.
    pub async fn deliver_delivery_note(
        &self,
        delivery_note_id: Uuid,
    ) -> Result<Option<DeliveryNote>, AppError> {
        self.set_delivery_note_status(delivery_note_id, DeliveryNoteStatus::Delivered)
            .await
    }

    /// pending -> cancelled.
    pub async fn cancel_delivery_note(
        &self,
        delivery_note_id: Uuid,
    ) -> Result<Option<DeliveryNote>, AppError> {
        self.set_delivery_note_status(delivery_note_id, DeliveryNoteStatus::Cancelled)
            .await
    }

    /// Delete a pending delivery note.
    pub async fn delete_delivery_note(&self, delivery_note_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM delivery_notes WHERE delivery_note_id = $1 AND status = 'pending'",
        )
        .bind(delivery_note_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete delivery note: {}", e))
        })?;

        if result.rows_affected() == 0 {
            if self.get_delivery_note(delivery_note_id).await?.is_some() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only pending delivery notes can be deleted"
                )));
            }
            return Ok(false);
        }

        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Shared helpers
    // -------------------------------------------------------------------------

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    /// Fetch an invoice with its row locked for the transaction.
    async fn lock_invoice(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1 FOR UPDATE"
        );
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))
    }

    async fn sum_payments(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
    ) -> Result<Decimal, AppError> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM invoice_payments WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum payments: {}", e)))
    }

    /// Recompute `amount_paid`/`client_debt` from the ledger and persist
    /// them, returning the updated invoice. Must run inside the same
    /// transaction as the ledger write.
    async fn recompute_aggregates(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
        total: Decimal,
    ) -> Result<Invoice, AppError> {
        let paid_sum = self.sum_payments(tx, invoice_id).await?;
        let client_debt = (total - paid_sum).max(Decimal::ZERO);

        let sql = format!(
            "UPDATE invoices SET amount_paid = $2, client_debt = $3 \
             WHERE invoice_id = $1 \
             RETURNING {INVOICE_COLUMNS}"
        );
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .bind(paid_sum)
            .bind(client_debt)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update aggregates: {}", e))
            })
    }

    async fn get_items(
        &self,
        table: ItemTable,
        document_id: Uuid,
    ) -> Result<Vec<DocumentItem>, AppError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM {} WHERE document_id = $1 ORDER BY sort_order, created_utc",
            table.name()
        );
        sqlx::query_as::<_, DocumentItem>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get items: {}", e)))
    }

    async fn get_items_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        table: ItemTable,
        document_id: Uuid,
    ) -> Result<Vec<DocumentItem>, AppError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM {} WHERE document_id = $1 ORDER BY sort_order, created_utc",
            table.name()
        );
        sqlx::query_as::<_, DocumentItem>(&sql)
            .bind(document_id)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get items: {}", e)))
    }
}

/// Turn a stored item row back into calculator input.
fn item_to_input(item: &DocumentItem) -> CreateItem {
    CreateItem {
        product_id: item.product_id,
        name: item.name.clone(),
        quantity: item.quantity,
        unit_price: item.unit_price,
        tax_rate: item.tax_rate,
        discount: item.discount,
        sort_order: item.sort_order,
    }
}

/// Insert item rows with their derived amounts.
async fn insert_items(
    tx: &mut Transaction<'_, Postgres>,
    table: ItemTable,
    document_id: Uuid,
    items: &[CreateItem],
    amounts: &[ItemAmounts],
) -> Result<(), AppError> {
    let sql = format!(
        "INSERT INTO {} (item_id, document_id, product_id, name, quantity, unit_price, \
         tax_rate, discount, total_excl, total_tax, total, sort_order) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        table.name()
    );
    for (item, amount) in items.iter().zip(amounts) {
        sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.tax_rate)
            .bind(item.discount)
            .bind(amount.total_excl)
            .bind(amount.total_tax)
            .bind(amount.total)
            .bind(item.sort_order)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert item: {}", e)))?;
    }
    Ok(())
}
