//! HTTP API surface.
//!
//! Write endpoints are year-scoped by the dates they carry: an expense
//! dated 2025-03-14 lands in the 2025 store. Read endpoints take the year
//! explicitly. `/records` and `/update_record` require the admin role.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

use spendtrack_core::{
    aggregate,
    dates::{date_to_str, parse_iso_date},
    models::write::{NewExpense, NewRecurringExpense, NewSalaryPeriod},
    DedupPolicy, Expense, ExpenseColumn, StorageBackend, StorageError,
};
use spendtrack_import::{ImportError, ImportReport};

use crate::auth::{auth_middleware, CallerIdentity};
use crate::config::AuthConfig;
use crate::convert::{ConvertError, CurrencyConverter};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageBackend>,
    pub converter: Arc<CurrencyConverter>,
}

pub fn router(state: AppState, auth: Arc<AuthConfig>, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(move || std::future::ready(metrics.render())))
        .route("/add_expense", post(add_expense))
        .route("/add_recurring", post(add_recurring))
        .route("/add_salary", post(add_salary))
        .route("/import", post(import))
        .route("/summary", get(summary))
        .route("/series", get(series))
        .route("/records", get(records))
        .route("/update_record", post(update_record))
        .layer(middleware::from_fn(auth_middleware))
        .layer(Extension(auth))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("record {0} not found")]
    NotFound(i64),
    #[error("admin role required")]
    Forbidden,
    #[error("{0}")]
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidColumn(_) | StorageError::InvalidValue { .. } => {
                ApiError::Validation(e.to_string())
            }
            StorageError::RecordNotFound(id) => ApiError::NotFound(id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(e: ConvertError) -> Self {
        match e {
            ConvertError::MissingRate { .. } => ApiError::Validation(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Storage(e) => e.into(),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Internal(detail) => {
                // Detail stays in the logs, not in the response body.
                tracing::error!(error = %detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error has occurred".to_string(),
                )
            }
        };
        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

fn require_date(value: &str, field: &str) -> Result<Date, ApiError> {
    parse_iso_date(value)
        .ok_or_else(|| ApiError::Validation(format!("{field} must be a YYYY-MM-DD date")))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct AddExpenseRequest {
    date: String,
    category: String,
    item: String,
    location: String,
    price: Decimal,
    currency: Option<String>,
}

#[derive(Serialize)]
struct AddedResponse {
    success: bool,
    id: i64,
}

async fn add_expense(
    State(state): State<AppState>,
    Json(req): Json<AddExpenseRequest>,
) -> Result<Json<AddedResponse>, ApiError> {
    let date = require_date(&req.date, "date")?;
    let currency = req
        .currency
        .unwrap_or_else(|| state.converter.base().to_string());
    let price_base = state.converter.to_base(req.price, &currency).await?;

    let record = NewExpense {
        date: Some(date),
        category: req.category,
        item: req.item,
        location: req.location,
        price: req.price,
        currency,
        price_base,
    };
    let id = state.storage.insert_expense(date.year(), &record)?;
    metrics::increment_counter!("spendtrack_expenses_added_total");
    tracing::info!(id, year = date.year(), category = %record.category, "Expense added");
    Ok(Json(AddedResponse { success: true, id }))
}

#[derive(Deserialize)]
struct AddRecurringRequest {
    start_date: String,
    end_date: Option<String>,
    category: String,
    item: String,
    location: String,
    price: Decimal,
    currency: Option<String>,
}

async fn add_recurring(
    State(state): State<AppState>,
    Json(req): Json<AddRecurringRequest>,
) -> Result<Json<AddedResponse>, ApiError> {
    let start = require_date(&req.start_date, "start_date")?;
    let end = req
        .end_date
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| require_date(s, "end_date"))
        .transpose()?;
    let currency = req
        .currency
        .unwrap_or_else(|| state.converter.base().to_string());

    // A closed span stores the per-month aliquot of the converted total;
    // an open-ended record recurs at full value.
    let total_base = state.converter.to_base(req.price, &currency).await?;
    let monthly = aggregate::live_monthly_amount(total_base, start, end);

    let record = NewRecurringExpense {
        start_date: Some(start),
        end_date: end,
        category: req.category,
        item: req.item,
        location: req.location,
        ori_price: req.price,
        currency,
        price_base: monthly,
    };
    let id = state.storage.insert_recurring(start.year(), &record)?;
    metrics::increment_counter!("spendtrack_recurring_added_total");
    tracing::info!(id, year = start.year(), category = %record.category, "Recurring expense added");
    Ok(Json(AddedResponse { success: true, id }))
}

#[derive(Deserialize)]
struct AddSalaryRequest {
    start_date: String,
    amount: Decimal,
    currency: Option<String>,
}

async fn add_salary(
    State(state): State<AppState>,
    Json(req): Json<AddSalaryRequest>,
) -> Result<Json<AddedResponse>, ApiError> {
    let start = require_date(&req.start_date, "start_date")?;
    let currency = req
        .currency
        .unwrap_or_else(|| state.converter.base().to_string());
    let amount = state.converter.to_base(req.amount, &currency).await?;

    // The open period, if any, ends the day before the new one starts.
    let close_date = start
        .previous_day()
        .ok_or_else(|| ApiError::Validation("start_date is out of range".to_string()))?;
    let year = start.year();
    let closed = state.storage.close_open_salary(year, close_date)?;
    let id = state
        .storage
        .insert_salary(year, &NewSalaryPeriod { start_date: start, amount })?;
    metrics::increment_counter!("spendtrack_salary_periods_added_total");
    tracing::info!(id, year, closed, "Salary period added");
    Ok(Json(AddedResponse { success: true, id }))
}

#[derive(Deserialize)]
struct ImportRequest {
    path: String,
    year: i32,
    dedup: Option<String>,
}

#[derive(Serialize)]
struct ImportResponse {
    success: bool,
    expenses_inserted: usize,
    expenses_skipped: usize,
    recurring_inserted: usize,
    recurring_skipped: usize,
}

impl ImportResponse {
    fn from_report(report: ImportReport) -> Self {
        Self {
            success: true,
            expenses_inserted: report.expenses_inserted,
            expenses_skipped: report.expenses_skipped,
            recurring_inserted: report.recurring_inserted,
            recurring_skipped: report.recurring_skipped,
        }
    }
}

fn parse_dedup(value: Option<&str>) -> Result<DedupPolicy, ApiError> {
    match value {
        None | Some("catalog_key") => Ok(DedupPolicy::CatalogKey),
        Some("catalog_key_and_date") => Ok(DedupPolicy::CatalogKeyAndDate),
        Some(other) => Err(ApiError::Validation(format!(
            "unknown dedup policy '{other}', expected catalog_key or catalog_key_and_date"
        ))),
    }
}

async fn import(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    let policy = parse_dedup(req.dedup.as_deref())?;
    let storage = state.storage.clone();
    let base = state.converter.base().to_string();
    let path = PathBuf::from(req.path);
    let year = req.year;

    // Workbook parsing is synchronous and file-bound.
    let report = tokio::task::spawn_blocking(move || {
        spendtrack_import::import_workbook(storage.as_ref(), &path, year, &base, policy)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    metrics::counter!(
        "spendtrack_import_rows_total",
        report.expenses_inserted as u64
    );
    Ok(Json(ImportResponse::from_report(report)))
}

#[derive(Deserialize)]
struct SummaryQuery {
    year: i32,
    month: u8,
}

async fn summary(
    State(state): State<AppState>,
    Query(q): Query<SummaryQuery>,
) -> Result<Response, ApiError> {
    if !(1..=12).contains(&q.month) {
        return Err(ApiError::Validation("month must be 1..=12".to_string()));
    }
    let summary = aggregate::monthly_summary(state.storage.as_ref(), q.year, q.month)?;
    Ok(Json(summary).into_response())
}

#[derive(Deserialize)]
struct SeriesQuery {
    year: i32,
    month: Option<u8>,
}

async fn series(
    State(state): State<AppState>,
    Query(q): Query<SeriesQuery>,
) -> Result<Response, ApiError> {
    match q.month {
        Some(month) => {
            if !(1..=12).contains(&month) {
                return Err(ApiError::Validation("month must be 1..=12".to_string()));
            }
            let points = aggregate::day_series(state.storage.as_ref(), q.year, month)?;
            Ok(Json(points).into_response())
        }
        None => {
            let points = aggregate::month_series(state.storage.as_ref(), q.year)?;
            Ok(Json(points).into_response())
        }
    }
}

#[derive(Deserialize)]
struct RecordsQuery {
    year: i32,
    start_date: String,
    end_date: String,
}

#[derive(Serialize)]
struct ExpenseRecord {
    id: i64,
    date: Option<String>,
    category: String,
    item: String,
    location: String,
    price: Decimal,
    currency: String,
    price_base: Decimal,
}

impl ExpenseRecord {
    fn from_expense(e: Expense) -> Self {
        Self {
            id: e.id,
            date: e.date.map(date_to_str),
            category: e.category,
            item: e.item,
            location: e.location,
            price: e.price,
            currency: e.currency,
            price_base: e.price_base,
        }
    }
}

async fn records(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(q): Query<RecordsQuery>,
) -> Result<Json<Vec<ExpenseRecord>>, ApiError> {
    if !caller.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let from = require_date(&q.start_date, "start_date")?;
    let to = require_date(&q.end_date, "end_date")?;
    let rows = state.storage.expenses_in_range(q.year, from, to)?;
    Ok(Json(rows.into_iter().map(ExpenseRecord::from_expense).collect()))
}

#[derive(Deserialize)]
struct UpdateRecordRequest {
    year: i32,
    id: i64,
    column: String,
    value: String,
}

#[derive(Serialize)]
struct UpdateRecordResponse {
    success: bool,
}

async fn update_record(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(req): Json<UpdateRecordRequest>,
) -> Result<Json<UpdateRecordResponse>, ApiError> {
    if !caller.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let column: ExpenseColumn = req.column.parse()?;
    state
        .storage
        .update_expense_field(req.year, req.id, column, &req.value)?;
    tracing::info!(id = req.id, year = req.year, column = %req.column, caller = %caller.name, "Record updated");
    Ok(Json(UpdateRecordResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_policy_names() {
        assert_eq!(parse_dedup(None).unwrap(), DedupPolicy::CatalogKey);
        assert_eq!(
            parse_dedup(Some("catalog_key")).unwrap(),
            DedupPolicy::CatalogKey
        );
        assert_eq!(
            parse_dedup(Some("catalog_key_and_date")).unwrap(),
            DedupPolicy::CatalogKeyAndDate
        );
        assert!(parse_dedup(Some("by_id")).is_err());
    }

    #[test]
    fn storage_errors_map_to_client_codes() {
        let e: ApiError = StorageError::InvalidColumn("price".to_string()).into();
        assert!(matches!(e, ApiError::Validation(_)));

        let e: ApiError = StorageError::RecordNotFound(7).into();
        assert!(matches!(e, ApiError::NotFound(7)));

        let e: ApiError = StorageError::Other("disk on fire".to_string()).into();
        assert!(matches!(e, ApiError::Internal(_)));
    }
}
