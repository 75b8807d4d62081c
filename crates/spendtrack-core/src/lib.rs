//! Core types and logic for spendtrack.
//!
//! This crate defines the record models, the `StorageBackend` trait that
//! year-scoped storage implementations plug into, the date/month utilities
//! shared by the importer and the live-add paths, and the period aggregator
//! that turns stored records into monthly totals.

pub mod aggregate;
pub mod dates;
pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::{
    DedupPolicy, Expense, ExpenseColumn, MonthRef, MonthlySummary, RecurringExpense, SalaryPeriod,
};
pub use models::write::{NewExpense, NewRecurringExpense, NewSalaryPeriod};
pub use storage::{StorageBackend, StorageError};
