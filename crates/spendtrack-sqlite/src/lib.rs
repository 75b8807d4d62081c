//! SQLite `StorageBackend` for spendtrack.
//!
//! Each year store is its own database file, `expenses_{year}.db`, created
//! lazily under the configured data directory. Connections are cached and
//! serialized behind a single lock. Deduplicated inserts run as one
//! `INSERT ... SELECT ... WHERE NOT EXISTS` statement, so the existence
//! check and the insert are atomic inside SQLite.

use std::{
    collections::{hash_map::Entry, HashMap},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};

use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use time::Date;

use spendtrack_core::{
    dates::{date_to_str, parse_iso_date},
    models::write::{NewExpense, NewRecurringExpense, NewSalaryPeriod},
    DedupPolicy, Expense, ExpenseColumn, RecurringExpense, SalaryPeriod, StorageBackend,
    StorageError,
};

pub struct SqliteStorage {
    data_dir: PathBuf,
    conns: Mutex<HashMap<i32, Connection>>,
}

impl SqliteStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            conns: Mutex::new(HashMap::new()),
        })
    }

    pub fn year_db_path(&self, year: i32) -> PathBuf {
        self.data_dir.join(format!("expenses_{}.db", year))
    }

    fn open_year(path: &Path) -> Result<Connection, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::Other(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| StorageError::Other(e.to_string()))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT,
                category TEXT,
                item TEXT,
                location TEXT,
                price TEXT,
                currency TEXT,
                price_base TEXT
            );

            CREATE TABLE IF NOT EXISTS recurring_expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_date TEXT,
                end_date TEXT,
                category TEXT,
                item TEXT,
                location TEXT,
                ori_price TEXT,
                currency TEXT,
                price_base TEXT
            );

            CREATE TABLE IF NOT EXISTS salary (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_date TEXT,
                end_date TEXT,
                amount TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_catalog
                ON expenses(category, item, location);

            CREATE INDEX IF NOT EXISTS idx_recurring_catalog
                ON recurring_expenses(category, item, location);
            ",
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(conn)
    }

    fn with_conn<T>(
        &self,
        year: i32,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut conns = self.conns.lock().unwrap();
        let conn = match conns.entry(year) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let path = self.data_dir.join(format!("expenses_{}.db", year));
                tracing::debug!(year, path = %path.display(), "Opening year store");
                v.insert(Self::open_year(&path)?)
            }
        };
        f(conn)
    }
}

fn opt_date_to_str(d: Option<Date>) -> Option<String> {
    d.map(date_to_str)
}

fn col_date(row: &Row, idx: usize) -> rusqlite::Result<Option<Date>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().and_then(parse_iso_date))
}

fn col_decimal(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw
        .as_deref()
        .and_then(|s| Decimal::from_str(s).ok())
        .unwrap_or(Decimal::ZERO))
}

fn map_expense(row: &Row) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: row.get(0)?,
        date: col_date(row, 1)?,
        category: row.get(2)?,
        item: row.get(3)?,
        location: row.get(4)?,
        price: col_decimal(row, 5)?,
        currency: row.get(6)?,
        price_base: col_decimal(row, 7)?,
    })
}

fn map_recurring(row: &Row) -> rusqlite::Result<RecurringExpense> {
    Ok(RecurringExpense {
        id: row.get(0)?,
        start_date: col_date(row, 1)?,
        end_date: col_date(row, 2)?,
        category: row.get(3)?,
        item: row.get(4)?,
        location: row.get(5)?,
        ori_price: col_decimal(row, 6)?,
        currency: row.get(7)?,
        price_base: col_decimal(row, 8)?,
    })
}

fn map_salary(row: &Row) -> rusqlite::Result<Option<SalaryPeriod>> {
    let id: i64 = row.get(0)?;
    let start = col_date(row, 1)?;
    let end_date = col_date(row, 2)?;
    let amount = col_decimal(row, 3)?;
    Ok(start.map(|start_date| SalaryPeriod {
        id,
        start_date,
        end_date,
        amount,
    }))
}

const EXPENSE_COLS: &str = "id, date, category, item, location, price, currency, price_base";
const RECURRING_COLS: &str =
    "id, start_date, end_date, category, item, location, ori_price, currency, price_base";

impl StorageBackend for SqliteStorage {
    fn insert_expense(&self, year: i32, expense: &NewExpense) -> Result<i64, StorageError> {
        self.with_conn(year, |conn| {
            conn.execute(
                "INSERT INTO expenses (date, category, item, location, price, currency, price_base)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    opt_date_to_str(expense.date),
                    expense.category,
                    expense.item,
                    expense.location,
                    expense.price.to_string(),
                    expense.currency,
                    expense.price_base.to_string(),
                ],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn insert_expense_if_absent(
        &self,
        year: i32,
        expense: &NewExpense,
        policy: DedupPolicy,
    ) -> Result<Option<i64>, StorageError> {
        let sql = match policy {
            DedupPolicy::CatalogKey => {
                "INSERT INTO expenses (date, category, item, location, price, currency, price_base)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
                 WHERE NOT EXISTS (
                     SELECT 1 FROM expenses
                     WHERE category = ?2 AND item = ?3 AND location = ?4
                 )"
            }
            DedupPolicy::CatalogKeyAndDate => {
                "INSERT INTO expenses (date, category, item, location, price, currency, price_base)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
                 WHERE NOT EXISTS (
                     SELECT 1 FROM expenses
                     WHERE category = ?2 AND item = ?3 AND location = ?4 AND date IS ?1
                 )"
            }
        };
        self.with_conn(year, |conn| {
            let inserted = conn
                .execute(
                    sql,
                    params![
                        opt_date_to_str(expense.date),
                        expense.category,
                        expense.item,
                        expense.location,
                        expense.price.to_string(),
                        expense.currency,
                        expense.price_base.to_string(),
                    ],
                )
                .map_err(|e| StorageError::Other(e.to_string()))?;
            if inserted == 0 {
                Ok(None)
            } else {
                Ok(Some(conn.last_insert_rowid()))
            }
        })
    }

    fn insert_recurring(
        &self,
        year: i32,
        recurring: &NewRecurringExpense,
    ) -> Result<i64, StorageError> {
        self.with_conn(year, |conn| {
            conn.execute(
                "INSERT INTO recurring_expenses
                     (start_date, end_date, category, item, location, ori_price, currency, price_base)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    opt_date_to_str(recurring.start_date),
                    opt_date_to_str(recurring.end_date),
                    recurring.category,
                    recurring.item,
                    recurring.location,
                    recurring.ori_price.to_string(),
                    recurring.currency,
                    recurring.price_base.to_string(),
                ],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn insert_recurring_if_absent(
        &self,
        year: i32,
        recurring: &NewRecurringExpense,
        policy: DedupPolicy,
    ) -> Result<Option<i64>, StorageError> {
        let sql = match policy {
            DedupPolicy::CatalogKey => {
                "INSERT INTO recurring_expenses
                     (start_date, end_date, category, item, location, ori_price, currency, price_base)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
                 WHERE NOT EXISTS (
                     SELECT 1 FROM recurring_expenses
                     WHERE category = ?3 AND item = ?4 AND location = ?5
                 )"
            }
            DedupPolicy::CatalogKeyAndDate => {
                "INSERT INTO recurring_expenses
                     (start_date, end_date, category, item, location, ori_price, currency, price_base)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
                 WHERE NOT EXISTS (
                     SELECT 1 FROM recurring_expenses
                     WHERE category = ?3 AND item = ?4 AND location = ?5 AND start_date IS ?1
                 )"
            }
        };
        self.with_conn(year, |conn| {
            let inserted = conn
                .execute(
                    sql,
                    params![
                        opt_date_to_str(recurring.start_date),
                        opt_date_to_str(recurring.end_date),
                        recurring.category,
                        recurring.item,
                        recurring.location,
                        recurring.ori_price.to_string(),
                        recurring.currency,
                        recurring.price_base.to_string(),
                    ],
                )
                .map_err(|e| StorageError::Other(e.to_string()))?;
            if inserted == 0 {
                Ok(None)
            } else {
                Ok(Some(conn.last_insert_rowid()))
            }
        })
    }

    fn insert_salary(&self, year: i32, salary: &NewSalaryPeriod) -> Result<i64, StorageError> {
        self.with_conn(year, |conn| {
            conn.execute(
                "INSERT INTO salary (start_date, end_date, amount) VALUES (?1, NULL, ?2)",
                params![date_to_str(salary.start_date), salary.amount.to_string()],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn close_open_salary(&self, year: i32, end_date: Date) -> Result<usize, StorageError> {
        self.with_conn(year, |conn| {
            let updated = conn
                .execute(
                    "UPDATE salary SET end_date = ?1 WHERE end_date IS NULL",
                    params![date_to_str(end_date)],
                )
                .map_err(|e| StorageError::Other(e.to_string()))?;
            tracing::debug!(year, closed = updated, "Closed open salary periods");
            Ok(updated)
        })
    }

    fn list_expenses(&self, year: i32) -> Result<Vec<Expense>, StorageError> {
        self.with_conn(year, |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {} FROM expenses ORDER BY id", EXPENSE_COLS))
                .map_err(|e| StorageError::Other(e.to_string()))?;
            let rows = stmt
                .query_map([], map_expense)
                .map_err(|e| StorageError::Other(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Other(e.to_string()))?;
            Ok(rows)
        })
    }

    fn expenses_for_month(&self, year: i32, month: u8) -> Result<Vec<Expense>, StorageError> {
        self.with_conn(year, |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM expenses WHERE strftime('%m', date) = ?1 ORDER BY id",
                    EXPENSE_COLS
                ))
                .map_err(|e| StorageError::Other(e.to_string()))?;
            let rows = stmt
                .query_map(params![format!("{:02}", month)], map_expense)
                .map_err(|e| StorageError::Other(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Other(e.to_string()))?;
            Ok(rows)
        })
    }

    fn expenses_in_range(
        &self,
        year: i32,
        from: Date,
        to: Date,
    ) -> Result<Vec<Expense>, StorageError> {
        self.with_conn(year, |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM expenses WHERE date BETWEEN ?1 AND ?2 ORDER BY date, id",
                    EXPENSE_COLS
                ))
                .map_err(|e| StorageError::Other(e.to_string()))?;
            let rows = stmt
                .query_map(params![date_to_str(from), date_to_str(to)], map_expense)
                .map_err(|e| StorageError::Other(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Other(e.to_string()))?;
            Ok(rows)
        })
    }

    fn list_recurring(&self, year: i32) -> Result<Vec<RecurringExpense>, StorageError> {
        self.with_conn(year, |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM recurring_expenses ORDER BY id",
                    RECURRING_COLS
                ))
                .map_err(|e| StorageError::Other(e.to_string()))?;
            let rows = stmt
                .query_map([], map_recurring)
                .map_err(|e| StorageError::Other(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Other(e.to_string()))?;
            Ok(rows)
        })
    }

    fn list_salary(&self, year: i32) -> Result<Vec<SalaryPeriod>, StorageError> {
        self.with_conn(year, |conn| {
            let mut stmt = conn
                .prepare("SELECT id, start_date, end_date, amount FROM salary ORDER BY id")
                .map_err(|e| StorageError::Other(e.to_string()))?;
            let rows = stmt
                .query_map([], map_salary)
                .map_err(|e| StorageError::Other(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Other(e.to_string()))?;
            // Rows with an unreadable start date cannot participate in
            // period matching and are dropped here.
            Ok(rows.into_iter().flatten().collect())
        })
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
        // Validate the value against the column type before touching the row
        match column {
            ExpenseColumn::Date => {
                parse_iso_date(value).ok_or_else(invalid)?;
            }
            ExpenseColumn::PriceBase => {
                Decimal::from_str(value).map_err(|_| invalid())?;
            }
            ExpenseColumn::Category | ExpenseColumn::Item | ExpenseColumn::Location => {}
        }

        self.with_conn(year, |conn| {
            // Column name comes from the allow-list enum, never from input
            let updated = conn
                .execute(
                    &format!("UPDATE expenses SET {} = ?1 WHERE id = ?2", column.as_str()),
                    params![value, id],
                )
                .map_err(|e| StorageError::Other(e.to_string()))?;
            if updated == 0 {
                return Err(StorageError::RecordNotFound(id));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn groceries() -> NewExpense {
        NewExpense {
            date: Some(date!(2023 - 01 - 05)),
            category: "Food".into(),
            item: "Groceries".into(),
            location: "Supermarket".into(),
            price: dec!(50),
            currency: "SGD".into(),
            price_base: dec!(50),
        }
    }

    #[test]
    fn creates_one_db_file_per_year() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(dir.path()).unwrap();

        storage.insert_expense(2023, &groceries()).unwrap();
        storage.insert_expense(2024, &groceries()).unwrap();

        assert!(storage.year_db_path(2023).exists());
        assert!(storage.year_db_path(2024).exists());
        assert_eq!(storage.list_expenses(2023).unwrap().len(), 1);
        assert_eq!(storage.list_expenses(2024).unwrap().len(), 1);
    }

    #[test]
    fn conditional_insert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(dir.path()).unwrap();

        let first = storage
            .insert_expense_if_absent(2023, &groceries(), DedupPolicy::CatalogKey)
            .unwrap();
        let second = storage
            .insert_expense_if_absent(2023, &groceries(), DedupPolicy::CatalogKey)
            .unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(storage.list_expenses(2023).unwrap().len(), 1);
    }

    #[test]
    fn recurring_round_trip_preserves_open_end() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(dir.path()).unwrap();

        storage
            .insert_recurring(
                2023,
                &NewRecurringExpense {
                    start_date: Some(date!(2023 - 02 - 01)),
                    end_date: None,
                    category: "Subscription".into(),
                    item: "Streaming".into(),
                    location: "Online".into(),
                    ori_price: dec!(50),
                    currency: "SGD".into(),
                    price_base: dec!(50),
                },
            )
            .unwrap();

        let rows = storage.list_recurring(2023).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_date, Some(date!(2023 - 02 - 01)));
        assert_eq!(rows[0].end_date, None);
        assert_eq!(rows[0].price_base, dec!(50));
    }

    #[test]
    fn salary_close_then_insert_keeps_one_open_period() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(dir.path()).unwrap();

        storage
            .insert_salary(
                2025,
                &NewSalaryPeriod {
                    start_date: date!(2025 - 01 - 01),
                    amount: dec!(5000),
                },
            )
            .unwrap();
        storage
            .close_open_salary(2025, date!(2025 - 05 - 31))
            .unwrap();
        storage
            .insert_salary(
                2025,
                &NewSalaryPeriod {
                    start_date: date!(2025 - 06 - 01),
                    amount: dec!(6000),
                },
            )
            .unwrap();

        let periods = storage.list_salary(2025).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].end_date, Some(date!(2025 - 05 - 31)));
        assert_eq!(periods[1].end_date, None);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = SqliteStorage::new(dir.path()).unwrap();
            storage.insert_expense(2023, &groceries()).unwrap();
        }
        let reopened = SqliteStorage::new(dir.path()).unwrap();
        let rows = reopened.list_expenses(2023).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item, "Groceries");
        assert_eq!(rows[0].price_base, dec!(50));
    }

    #[test]
    fn update_expense_field_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(dir.path()).unwrap();
        let id = storage.insert_expense(2023, &groceries()).unwrap();

        storage
            .update_expense_field(2023, id, ExpenseColumn::Date, "2023-03-09")
            .unwrap();
        storage
            .update_expense_field(2023, id, ExpenseColumn::PriceBase, "75")
            .unwrap();

        let rows = storage.list_expenses(2023).unwrap();
        assert_eq!(rows[0].date, Some(date!(2023 - 03 - 09)));
        assert_eq!(rows[0].price_base, dec!(75));

        let err = storage
            .update_expense_field(2023, id, ExpenseColumn::PriceBase, "not-a-number")
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidValue { .. }));
    }
}
