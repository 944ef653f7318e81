//! Product handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use gescom_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{ListQuery, ProductRequest, ProductResponse, ProductUpdateRequest};
use crate::models::ListProductsFilter;
use crate::startup::AppState;

pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    payload.validate()?;

    let product = state.db.create_product(&payload.into()).await?;

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ProductResponse>, AppError> {
    let product = state
        .db
        .get_product(product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;

    Ok(Json(product))
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ProductResponse>>, AppError> {
    let filter = ListProductsFilter {
        search: query.search,
        page_size: query.page_size,
        page_token: query.page_token,
    };
    let products = state.db.list_products(&filter).await?;

    Ok(Json(products))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<ProductUpdateRequest>,
) -> Result<Json<ProductResponse>, AppError> {
    payload.validate()?;

    let product = state
        .db
        .update_product(product_id, &payload.into())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;

    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_product(product_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Product not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
