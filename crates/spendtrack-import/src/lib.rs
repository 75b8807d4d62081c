//! Spreadsheet workbook importer.
//!
//! Turns one workbook into expense and recurring-expense rows for a year
//! store. A workbook holds one "Recurring" sheet, any number of month
//! sheets, and "Summary" sheets which are ignored. The sheets are
//! hand-maintained, so parsing is deliberately lenient: a bad cell becomes
//! a null field and the row is still imported, while a structurally broken
//! workbook (unreadable file, header without the expected columns) fails
//! the whole import.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use rust_decimal::Decimal;
use thiserror::Error;
use time::{Date, Duration};

use spendtrack_core::{
    dates::{merge_end_date, merge_start_date, parse_iso_date},
    models::write::{NewExpense, NewRecurringExpense},
    DedupPolicy, StorageBackend, StorageError,
};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("sheet {sheet}: missing expected column {column}")]
    MissingColumn { sheet: String, column: &'static str },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Counts of what one import run did. Skipped rows are rows whose dedup
/// key already existed in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub expenses_inserted: usize,
    pub expenses_skipped: usize,
    pub recurring_inserted: usize,
    pub recurring_skipped: usize,
}

/// Imports every sheet of the workbook at `path` into the store for
/// `year`. Each row commits independently; a failure mid-way leaves the
/// rows inserted so far in place.
pub fn import_workbook(
    storage: &dyn StorageBackend,
    path: &Path,
    year: i32,
    base_currency: &str,
    policy: DedupPolicy,
) -> Result<ImportReport, ImportError> {
    let mut workbook = open_workbook_auto(path)?;
    let mut report = ImportReport::default();

    for sheet_name in workbook.sheet_names() {
        if sheet_name.contains("Recurring") {
            let range = workbook.worksheet_range(&sheet_name)?;
            import_recurring_sheet(
                storage,
                &sheet_name,
                &range,
                year,
                base_currency,
                policy,
                &mut report,
            )?;
        } else if !sheet_name.contains("Summary") {
            let range = workbook.worksheet_range(&sheet_name)?;
            import_month_sheet(
                storage,
                &sheet_name,
                &range,
                year,
                base_currency,
                policy,
                &mut report,
            )?;
        }
    }

    tracing::info!(
        year,
        expenses_inserted = report.expenses_inserted,
        expenses_skipped = report.expenses_skipped,
        recurring_inserted = report.recurring_inserted,
        recurring_skipped = report.recurring_skipped,
        "Workbook import finished"
    );
    Ok(report)
}

/// Parsed rows of a recurring sheet: the first row is a banner and the
/// second holds the real header.
pub fn parse_recurring_sheet(
    sheet: &str,
    range: &Range<Data>,
    base_currency: &str,
) -> Result<Vec<NewRecurringExpense>, ImportError> {
    let rows: Vec<&[Data]> = range.rows().collect();
    let Some(header) = rows.get(1) else {
        return Ok(Vec::new());
    };

    let col = |name: &'static str| -> Result<usize, ImportError> {
        find_column(header, name).ok_or(ImportError::MissingColumn {
            sheet: sheet.to_string(),
            column: name,
        })
    };
    let category_col = col("Category")?;
    let item_col = col("Item")?;
    let location_col = col("Location")?;
    let price_col = col("Price")?;
    let start_month_col = col("Start Month")?;
    let start_year_col = col("Start Year")?;
    let end_month_col = col("End Month")?;
    let end_year_col = col("End Year")?;

    let mut records = Vec::new();
    for row in rows.into_iter().skip(2) {
        let Some(category) = cell_str(row, category_col) else {
            continue;
        };
        let start_date = merge_start_date(
            cell_str(row, start_month_col).as_deref(),
            cell_int(row, start_year_col),
        );
        let end_date = merge_end_date(
            cell_str(row, end_month_col).as_deref(),
            cell_int(row, end_year_col),
        );
        // Import takes the sheet price as both the original and the
        // monthly amount, with no per-month amortization: the sheets
        // already record what the item costs per occurrence.
        let price = cell_int(row, price_col)
            .map(|v| Decimal::from(v.abs()))
            .unwrap_or(Decimal::ZERO);

        records.push(NewRecurringExpense {
            start_date,
            end_date,
            category,
            item: cell_str(row, item_col).unwrap_or_default(),
            location: cell_str(row, location_col).unwrap_or_default(),
            ori_price: price,
            currency: base_currency.to_string(),
            price_base: price,
        });
    }
    Ok(records)
}

/// Parsed rows of a month sheet. The title block has unknown height; the
/// first row whose second column is blank marks its end, the next row is
/// the header and everything after that is data. A sheet with no such row
/// yields nothing.
pub fn parse_month_sheet(
    sheet: &str,
    range: &Range<Data>,
    base_currency: &str,
) -> Result<Vec<NewExpense>, ImportError> {
    let rows: Vec<&[Data]> = range.rows().collect();
    let Some(blank_idx) = rows.iter().position(|row| cell_is_blank(row, 1)) else {
        tracing::debug!(sheet, "No header row found, skipping sheet");
        return Ok(Vec::new());
    };
    let Some(header) = rows.get(blank_idx + 1) else {
        return Ok(Vec::new());
    };

    let col = |name: &'static str| -> Result<usize, ImportError> {
        find_column(header, name).ok_or(ImportError::MissingColumn {
            sheet: sheet.to_string(),
            column: name,
        })
    };
    let date_col = col("Date")?;
    let category_col = col("Category")?;
    let item_col = col("Item")?;
    let location_col = col("Location")?;
    let price_col = col("Price")?;
    let remarks_col = find_column(header, "Remarks");

    let mut records = Vec::new();
    for row in rows.into_iter().skip(blank_idx + 2) {
        let Some(category) = cell_str(row, category_col) else {
            continue;
        };

        // A remarks cell like "20 USD" overrides the original amount and
        // currency; the Price column stays the base amount either way.
        let remarks_override = remarks_col
            .and_then(|c| cell_str(row, c))
            .and_then(|r| parse_remarks(&r));
        let (price, currency) = match remarks_override {
            Some((amount, currency)) => (amount, currency),
            None => (
                cell_decimal(row, price_col).unwrap_or(Decimal::ZERO),
                base_currency.to_string(),
            ),
        };
        let price_base = cell_int(row, price_col)
            .map(|v| Decimal::from(v.abs()))
            .unwrap_or(Decimal::ZERO);

        records.push(NewExpense {
            date: cell_date(row, date_col),
            category,
            item: cell_str(row, item_col).unwrap_or_default(),
            location: cell_str(row, location_col).unwrap_or_default(),
            price,
            currency,
            price_base,
        });
    }
    Ok(records)
}

fn import_recurring_sheet(
    storage: &dyn StorageBackend,
    sheet: &str,
    range: &Range<Data>,
    year: i32,
    base_currency: &str,
    policy: DedupPolicy,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    for record in parse_recurring_sheet(sheet, range, base_currency)? {
        match storage.insert_recurring_if_absent(year, &record, policy)? {
            Some(_) => report.recurring_inserted += 1,
            None => {
                tracing::debug!(
                    category = %record.category,
                    item = %record.item,
                    "Recurring row already present, skipped"
                );
                report.recurring_skipped += 1;
            }
        }
    }
    Ok(())
}

fn import_month_sheet(
    storage: &dyn StorageBackend,
    sheet: &str,
    range: &Range<Data>,
    year: i32,
    base_currency: &str,
    policy: DedupPolicy,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    for record in parse_month_sheet(sheet, range, base_currency)? {
        match storage.insert_expense_if_absent(year, &record, policy)? {
            Some(_) => report.expenses_inserted += 1,
            None => {
                tracing::debug!(
                    category = %record.category,
                    item = %record.item,
                    "Expense row already present, skipped"
                );
                report.expenses_skipped += 1;
            }
        }
    }
    Ok(())
}

/// `"<amount> <currency>"` remarks, recognized only when the first
/// whitespace token is purely numeric. A missing currency token falls back
/// to nothing here; the caller keeps the base currency.
fn parse_remarks(remarks: &str) -> Option<(Decimal, String)> {
    let mut tokens = remarks.split_whitespace();
    let first = tokens.next()?;
    if first.is_empty() || !first.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let amount = first.parse::<i64>().ok()?;
    let currency = tokens.next()?;
    Some((Decimal::from(amount.abs()), currency.to_string()))
}

fn find_column(header: &[Data], name: &str) -> Option<usize> {
    header.iter().position(|cell| match cell {
        Data::String(s) => s.trim() == name,
        _ => false,
    })
}

fn cell_is_blank(row: &[Data], idx: usize) -> bool {
    match row.get(idx) {
        None | Some(Data::Empty) => true,
        Some(Data::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_str(row: &[Data], idx: usize) -> Option<String> {
    match row.get(idx)? {
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

fn cell_int(row: &[Data], idx: usize) -> Option<i64> {
    match row.get(idx)? {
        Data::Int(i) => Some(*i),
        Data::Float(f) => Some(*f as i64),
        Data::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn cell_decimal(row: &[Data], idx: usize) -> Option<Decimal> {
    match row.get(idx)? {
        Data::Int(i) => Some(Decimal::from(*i)),
        Data::Float(f) => Decimal::from_f64_retain(*f),
        Data::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

fn cell_date(row: &[Data], idx: usize) -> Option<Date> {
    match row.get(idx)? {
        Data::String(s) => parse_iso_date(s),
        Data::DateTimeIso(s) => parse_iso_date(s.get(..10)?),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::Float(f) => excel_serial_to_date(*f),
        Data::Int(i) => excel_serial_to_date(*i as f64),
        _ => None,
    }
}

/// Excel serial day numbers count from 1899-12-30 (the off-by-two accounts
/// for the fictitious 1900-02-29).
fn excel_serial_to_date(serial: f64) -> Option<Date> {
    let base = Date::from_calendar_date(1899, time::Month::December, 30).ok()?;
    base.checked_add(Duration::days(serial as i64))
}
