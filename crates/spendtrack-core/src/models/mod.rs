use std::fmt::Display;
use std::str::FromStr;

use prettytable::{row, Table};
use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;

pub mod write;

/// A calendar month, the granularity at which recurring expenses and salary
/// periods are matched against a query. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthRef {
    pub year: i32,
    pub month: u8,
}

impl MonthRef {
    pub fn new(year: i32, month: u8) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: Date) -> Self {
        Self {
            year: date.year(),
            month: date.month() as u8,
        }
    }
}

impl Display for MonthRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A one-off expense row. `price`/`currency` hold the original amount as it
/// was paid, `price_base` the amount normalized to the base currency.
///
/// `date` is optional: bulk import keeps rows whose date cell could not be
/// parsed, and such rows simply never match a month query.
#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    pub id: i64,
    pub date: Option<Date>,
    pub category: String,
    pub item: String,
    pub location: String,
    pub price: Decimal,
    pub currency: String,
    pub price_base: Decimal,
}

/// A recurring expense row. `price_base` is the amount charged against every
/// covered month: the per-month aliquot for records created with a closed
/// span through the live-add path, or the full per-occurrence amount for
/// open-ended and bulk-imported records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringExpense {
    pub id: i64,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub category: String,
    pub item: String,
    pub location: String,
    pub ori_price: Decimal,
    pub currency: String,
    pub price_base: Decimal,
}

/// A salary period. Periods are contiguous: inserting a new one closes the
/// previously open period at `start_date - 1 day`, so at most one period per
/// store has `end_date = None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SalaryPeriod {
    pub id: i64,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub amount: Decimal,
}

/// Which fields form the identity of an expense row for deduplication.
///
/// The spreadsheets this tracker grew out of treat `(category, item,
/// location)` as a catalog-style key, which collapses repeat purchases made
/// on different dates. `CatalogKeyAndDate` is the stricter variant for
/// callers that want one row per day instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    #[default]
    CatalogKey,
    CatalogKeyAndDate,
}

/// Columns of the expenses table that the generic row-update operation may
/// target. Anything else is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseColumn {
    Date,
    Category,
    Item,
    Location,
    PriceBase,
}

impl ExpenseColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseColumn::Date => "date",
            ExpenseColumn::Category => "category",
            ExpenseColumn::Item => "item",
            ExpenseColumn::Location => "location",
            ExpenseColumn::PriceBase => "price_base",
        }
    }
}

impl FromStr for ExpenseColumn {
    type Err = crate::storage::StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(ExpenseColumn::Date),
            "category" => Ok(ExpenseColumn::Category),
            "item" => Ok(ExpenseColumn::Item),
            "location" => Ok(ExpenseColumn::Location),
            "price_base" => Ok(ExpenseColumn::PriceBase),
            other => Err(crate::storage::StorageError::InvalidColumn(
                other.to_string(),
            )),
        }
    }
}

/// Aggregated figures for one month of one year store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u8,
    pub one_off: Decimal,
    pub recurring: Decimal,
    pub salary: Decimal,
    pub balance: Decimal,
}

impl Display for MonthlySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new();
        table.add_row(row!["Month", "One-off", "Recurring", "Salary", "Balance"]);
        table.add_empty_row();
        table.add_row(row![
            MonthRef::new(self.year, self.month),
            self.one_off,
            self.recurring,
            self.salary,
            self.balance
        ]);
        write!(f, "\n{}\n", table)
    }
}

/// One point of the day-of-month spending series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTotal {
    pub day: u8,
    pub total: Decimal,
}

/// One point of the month-of-year spending series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotal {
    pub month: u8,
    pub total: Decimal,
}
