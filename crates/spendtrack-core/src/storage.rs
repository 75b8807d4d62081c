use thiserror::Error;
use time::Date;

use crate::models::{
    write::{NewExpense, NewRecurringExpense, NewSalaryPeriod},
    DedupPolicy, Expense, ExpenseColumn, RecurringExpense, SalaryPeriod,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
    #[error("record not found: {0}")]
    RecordNotFound(i64),
    #[error("column not updatable: {0}")]
    InvalidColumn(String),
    #[error("invalid value for column {column}: {value}")]
    InvalidValue { column: String, value: String },
}

/// Storage collaborator contract. Each year is an independent store with an
/// expenses table, a recurring-expenses table and a salary table; stores are
/// created lazily on first access and never destroyed.
///
/// Implementations serialize access internally. The `*_if_absent` inserts
/// are atomic with respect to their existence check, so concurrent imports
/// into the same store cannot double-insert a dedup key.
pub trait StorageBackend: Send + Sync {
    fn insert_expense(&self, year: i32, expense: &NewExpense) -> Result<i64, StorageError>;

    /// Inserts unless a row with the same dedup key already exists.
    /// Returns the new row id, or `None` when the row was skipped.
    fn insert_expense_if_absent(
        &self,
        year: i32,
        expense: &NewExpense,
        policy: DedupPolicy,
    ) -> Result<Option<i64>, StorageError>;

    fn insert_recurring(
        &self,
        year: i32,
        recurring: &NewRecurringExpense,
    ) -> Result<i64, StorageError>;

    fn insert_recurring_if_absent(
        &self,
        year: i32,
        recurring: &NewRecurringExpense,
        policy: DedupPolicy,
    ) -> Result<Option<i64>, StorageError>;

    /// Inserts a new open salary period.
    fn insert_salary(&self, year: i32, salary: &NewSalaryPeriod) -> Result<i64, StorageError>;

    /// Closes every currently-open salary period at `end_date`, returning
    /// how many rows were updated.
    fn close_open_salary(&self, year: i32, end_date: Date) -> Result<usize, StorageError>;

    fn list_expenses(&self, year: i32) -> Result<Vec<Expense>, StorageError>;

    /// Expenses whose date falls in the given calendar month. This is a
    /// month-of-year match, not a range scan; the store is already
    /// year-scoped.
    fn expenses_for_month(&self, year: i32, month: u8) -> Result<Vec<Expense>, StorageError>;

    fn expenses_in_range(
        &self,
        year: i32,
        from: Date,
        to: Date,
    ) -> Result<Vec<Expense>, StorageError>;

    fn list_recurring(&self, year: i32) -> Result<Vec<RecurringExpense>, StorageError>;

    fn list_salary(&self, year: i32) -> Result<Vec<SalaryPeriod>, StorageError>;

    /// Generic single-field update, restricted to the `ExpenseColumn`
    /// allow-list. The value arrives as text and is validated against the
    /// column's type before being applied.
    fn update_expense_field(
        &self,
        year: i32,
        id: i64,
        column: ExpenseColumn,
        value: &str,
    ) -> Result<(), StorageError>;
}
