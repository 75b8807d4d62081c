//! In-memory `StorageBackend` for spendtrack.
//!
//! Year stores live in a `BTreeMap` behind a single `RwLock`; the
//! `*_if_absent` inserts hold the write lock across check and insert, which
//! makes deduplication atomic within the process.

use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::{
        atomic::{AtomicI64, Ordering},
        RwLock,
    },
};

use rust_decimal::Decimal;
use time::Date;

use spendtrack_core::{
    dates::parse_iso_date,
    models::write::{NewExpense, NewRecurringExpense, NewSalaryPeriod},
    DedupPolicy, Expense, ExpenseColumn, RecurringExpense, SalaryPeriod, StorageBackend,
    StorageError,
};

#[derive(Default)]
struct YearData {
    expenses: BTreeMap<i64, Expense>,
    recurring: BTreeMap<i64, RecurringExpense>,
    salary: BTreeMap<i64, SalaryPeriod>,
}

pub struct InMemoryStorage {
    years: RwLock<BTreeMap<i32, YearData>>,
    id_counter: AtomicI64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            years: RwLock::new(BTreeMap::new()),
            id_counter: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.id_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn list_years(&self) -> Vec<i32> {
        self.years.read().unwrap().keys().copied().collect()
    }
}

fn expense_matches(existing: &Expense, incoming: &NewExpense, policy: DedupPolicy) -> bool {
    let key_match = existing.category == incoming.category
        && existing.item == incoming.item
        && existing.location == incoming.location;
    match policy {
        DedupPolicy::CatalogKey => key_match,
        DedupPolicy::CatalogKeyAndDate => key_match && existing.date == incoming.date,
    }
}

fn recurring_matches(
    existing: &RecurringExpense,
    incoming: &NewRecurringExpense,
    policy: DedupPolicy,
) -> bool {
    let key_match = existing.category == incoming.category
        && existing.item == incoming.item
        && existing.location == incoming.location;
    match policy {
        DedupPolicy::CatalogKey => key_match,
        DedupPolicy::CatalogKeyAndDate => key_match && existing.start_date == incoming.start_date,
    }
}

impl StorageBackend for InMemoryStorage {
    fn insert_expense(&self, year: i32, expense: &NewExpense) -> Result<i64, StorageError> {
        let mut years = self.years.write().unwrap();
        let data = years.entry(year).or_default();
        let id = self.next_id();
        data.expenses.insert(
            id,
            Expense {
                id,
                date: expense.date,
                category: expense.category.clone(),
                item: expense.item.clone(),
                location: expense.location.clone(),
                price: expense.price,
                currency: expense.currency.clone(),
                price_base: expense.price_base,
            },
        );
        Ok(id)
    }

    fn insert_expense_if_absent(
        &self,
        year: i32,
        expense: &NewExpense,
        policy: DedupPolicy,
    ) -> Result<Option<i64>, StorageError> {
        let mut years = self.years.write().unwrap();
        let data = years.entry(year).or_default();
        if data
            .expenses
            .values()
            .any(|e| expense_matches(e, expense, policy))
        {
            return Ok(None);
        }
        let id = self.next_id();
        data.expenses.insert(
            id,
            Expense {
                id,
                date: expense.date,
                category: expense.category.clone(),
                item: expense.item.clone(),
                location: expense.location.clone(),
                price: expense.price,
                currency: expense.currency.clone(),
                price_base: expense.price_base,
            },
        );
        Ok(Some(id))
    }

    fn insert_recurring(
        &self,
        year: i32,
        recurring: &NewRecurringExpense,
    ) -> Result<i64, StorageError> {
        let mut years = self.years.write().unwrap();
        let data = years.entry(year).or_default();
        let id = self.next_id();
        data.recurring.insert(
            id,
            RecurringExpense {
                id,
                start_date: recurring.start_date,
                end_date: recurring.end_date,
                category: recurring.category.clone(),
                item: recurring.item.clone(),
                location: recurring.location.clone(),
                ori_price: recurring.ori_price,
                currency: recurring.currency.clone(),
                price_base: recurring.price_base,
            },
        );
        Ok(id)
    }

    fn insert_recurring_if_absent(
        &self,
        year: i32,
        recurring: &NewRecurringExpense,
        policy: DedupPolicy,
    ) -> Result<Option<i64>, StorageError> {
        let mut years = self.years.write().unwrap();
        let data = years.entry(year).or_default();
        if data
            .recurring
            .values()
            .any(|r| recurring_matches(r, recurring, policy))
        {
            return Ok(None);
        }
        let id = self.next_id();
        data.recurring.insert(
            id,
            RecurringExpense {
                id,
                start_date: recurring.start_date,
                end_date: recurring.end_date,
                category: recurring.category.clone(),
                item: recurring.item.clone(),
                location: recurring.location.clone(),
                ori_price: recurring.ori_price,
                currency: recurring.currency.clone(),
                price_base: recurring.price_base,
            },
        );
        Ok(Some(id))
    }

    fn insert_salary(&self, year: i32, salary: &NewSalaryPeriod) -> Result<i64, StorageError> {
        let mut years = self.years.write().unwrap();
        let data = years.entry(year).or_default();
        let id = self.next_id();
        data.salary.insert(
            id,
            SalaryPeriod {
                id,
                start_date: salary.start_date,
                end_date: None,
                amount: salary.amount,
            },
        );
        Ok(id)
    }

    fn close_open_salary(&self, year: i32, end_date: Date) -> Result<usize, StorageError> {
        let mut years = self.years.write().unwrap();
        let data = years.entry(year).or_default();
        let mut closed = 0;
        for period in data.salary.values_mut() {
            if period.end_date.is_none() {
                period.end_date = Some(end_date);
                closed += 1;
            }
        }
        tracing::debug!(year, closed, "Closed open salary periods");
        Ok(closed)
    }

    fn list_expenses(&self, year: i32) -> Result<Vec<Expense>, StorageError> {
        let years = self.years.read().unwrap();
        Ok(years
            .get(&year)
            .map(|d| d.expenses.values().cloned().collect())
            .unwrap_or_default())
    }

    fn expenses_for_month(&self, year: i32, month: u8) -> Result<Vec<Expense>, StorageError> {
        let years = self.years.read().unwrap();
        Ok(years
            .get(&year)
            .map(|d| {
                d.expenses
                    .values()
                    .filter(|e| e.date.map(|d| d.month() as u8) == Some(month))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn expenses_in_range(
        &self,
        year: i32,
        from: Date,
        to: Date,
    ) -> Result<Vec<Expense>, StorageError> {
        let years = self.years.read().unwrap();
        Ok(years
            .get(&year)
            .map(|d| {
                d.expenses
                    .values()
                    .filter(|e| e.date.map(|d| d >= from && d <= to).unwrap_or(false))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_recurring(&self, year: i32) -> Result<Vec<RecurringExpense>, StorageError> {
        let years = self.years.read().unwrap();
        Ok(years
            .get(&year)
            .map(|d| d.recurring.values().cloned().collect())
            .unwrap_or_default())
    }

    fn list_salary(&self, year: i32) -> Result<Vec<SalaryPeriod>, StorageError> {
        let years = self.years.read().unwrap();
        Ok(years
            .get(&year)
            .map(|d| d.salary.values().cloned().collect())
            .unwrap_or_default())
    }

    fn update_expense_field(
        &self,
        year: i32,
        id: i64,
        column: ExpenseColumn,
        value: &str,
    ) -> Result<(), StorageError> {
        let invalid = || StorageError::InvalidValue {
            column: column.as_str().to_string(),
            value: value.to_string(),
        };

        let mut years = self.years.write().unwrap();
        let data = years.entry(year).or_default();
        let expense = data
            .expenses
            .get_mut(&id)
            .ok_or(StorageError::RecordNotFound(id))?;

        match column {
            ExpenseColumn::Date => {
                expense.date = Some(parse_iso_date(value).ok_or_else(invalid)?);
            }
            ExpenseColumn::Category => expense.category = value.to_string(),
            ExpenseColumn::Item => expense.item = value.to_string(),
            ExpenseColumn::Location => expense.location = value.to_string(),
            ExpenseColumn::PriceBase => {
                expense.price_base = Decimal::from_str(value).map_err(|_| invalid())?;
            }
        }
        Ok(())
    }
}
