//! Period aggregation: monthly totals and chart series.
//!
//! Recurring expenses and salary periods are matched against a target month
//! at month/year granularity. A recurring record covers every whole month of
//! its inclusive span; an open-ended record covers every month from its
//! start onward with no cutoff. A salary period covers the months from its
//! start up to, but not including, the month its close date falls in (the
//! successor period starts in that month or later).

use rust_decimal::Decimal;
use time::Date;

use crate::dates::month_span;
use crate::models::{
    DayTotal, Expense, MonthRef, MonthTotal, MonthlySummary, RecurringExpense, SalaryPeriod,
};
use crate::storage::{StorageBackend, StorageError};

/// Whether a recurring expense covers the target month. Records with a null
/// start date (lenient imports) never match.
pub fn recurring_covers(record: &RecurringExpense, target: MonthRef) -> bool {
    let Some(start) = record.start_date else {
        return false;
    };
    if MonthRef::from_date(start) > target {
        return false;
    }
    match record.end_date {
        None => true,
        Some(end) => MonthRef::from_date(end) >= target,
    }
}

/// Whether a salary period covers the target month. The close month itself
/// is excluded: a period closed on 2025-05-31 pays out through April, and
/// the successor period picks up from its own start month.
pub fn salary_covers(period: &SalaryPeriod, target: MonthRef) -> bool {
    if MonthRef::from_date(period.start_date) > target {
        return false;
    }
    match period.end_date {
        None => true,
        Some(end) => target < MonthRef::from_date(end),
    }
}

/// Monthly amount for a recurring expense created through the live-add
/// path: a closed span amortizes the converted total evenly across its
/// inclusive month count, an open-ended record recurs at full value.
pub fn live_monthly_amount(total_base: Decimal, start: Date, end: Option<Date>) -> Decimal {
    match end {
        Some(end) => total_base / Decimal::from(month_span(start, end)),
        None => total_base,
    }
}

/// Pure aggregation over already-fetched rows. `expenses` must be the
/// one-off rows for the target month.
pub fn summarize(
    expenses: &[Expense],
    recurring: &[RecurringExpense],
    salary: &[SalaryPeriod],
    target: MonthRef,
) -> MonthlySummary {
    let one_off: Decimal = expenses.iter().map(|e| e.price_base).sum();
    let recurring_total: Decimal = recurring
        .iter()
        .filter(|r| recurring_covers(r, target))
        .map(|r| r.price_base)
        .sum();
    let salary_total: Decimal = salary
        .iter()
        .filter(|s| salary_covers(s, target))
        .map(|s| s.amount)
        .sum();

    MonthlySummary {
        year: target.year,
        month: target.month,
        one_off,
        recurring: recurring_total,
        salary: salary_total,
        balance: salary_total - (one_off + recurring_total),
    }
}

/// Fetches the three tables for `year` and aggregates the target month.
/// Empty stores produce all-zero totals.
pub fn monthly_summary(
    storage: &dyn StorageBackend,
    year: i32,
    month: u8,
) -> Result<MonthlySummary, StorageError> {
    let expenses = storage.expenses_for_month(year, month)?;
    let recurring = storage.list_recurring(year)?;
    let salary = storage.list_salary(year)?;
    Ok(summarize(
        &expenses,
        &recurring,
        &salary,
        MonthRef::new(year, month),
    ))
}

/// Ordered day-of-month totals over one-off expenses in the target month.
pub fn day_series(
    storage: &dyn StorageBackend,
    year: i32,
    month: u8,
) -> Result<Vec<DayTotal>, StorageError> {
    let mut totals = std::collections::BTreeMap::new();
    for expense in storage.expenses_for_month(year, month)? {
        if let Some(date) = expense.date {
            *totals.entry(date.day()).or_insert(Decimal::ZERO) += expense.price_base;
        }
    }
    Ok(totals
        .into_iter()
        .map(|(day, total)| DayTotal { day, total })
        .collect())
}

/// Ordered month-of-year totals over the year's one-off expenses.
pub fn month_series(storage: &dyn StorageBackend, year: i32) -> Result<Vec<MonthTotal>, StorageError> {
    let mut totals = std::collections::BTreeMap::new();
    for expense in storage.list_expenses(year)? {
        if let Some(date) = expense.date {
            if date.year() == year {
                *totals.entry(date.month() as u8).or_insert(Decimal::ZERO) += expense.price_base;
            }
        }
    }
    Ok(totals
        .into_iter()
        .map(|(month, total)| MonthTotal { month, total })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn recurring(start: Option<Date>, end: Option<Date>, monthly: Decimal) -> RecurringExpense {
        RecurringExpense {
            id: 1,
            start_date: start,
            end_date: end,
            category: "Utilities".into(),
            item: "Electricity".into(),
            location: "Home".into(),
            ori_price: monthly,
            currency: "SGD".into(),
            price_base: monthly,
        }
    }

    fn expense(date: Date, base: Decimal) -> Expense {
        Expense {
            id: 1,
            date: Some(date),
            category: "Food".into(),
            item: "Lunch".into(),
            location: "CityX".into(),
            price: base,
            currency: "SGD".into(),
            price_base: base,
        }
    }

    fn salary(start: Date, end: Option<Date>, amount: Decimal) -> SalaryPeriod {
        SalaryPeriod {
            id: 1,
            start_date: start,
            end_date: end,
            amount,
        }
    }

    #[test]
    fn closed_span_amortizes_evenly() {
        // 2022-01 through 2023-03 inclusive is 15 months
        let monthly = live_monthly_amount(
            dec!(100),
            date!(2022 - 01 - 01),
            Some(date!(2023 - 03 - 01)),
        );
        assert_eq!(monthly.round_dp(2), dec!(6.67));

        let r = recurring(
            Some(date!(2022 - 01 - 01)),
            Some(date!(2023 - 03 - 01)),
            monthly,
        );
        assert!(recurring_covers(&r, MonthRef::new(2022, 1)));
        assert!(recurring_covers(&r, MonthRef::new(2022, 7)));
        assert!(recurring_covers(&r, MonthRef::new(2023, 3)));
        assert!(!recurring_covers(&r, MonthRef::new(2023, 4)));
        assert!(!recurring_covers(&r, MonthRef::new(2021, 12)));
    }

    #[test]
    fn open_ended_recurs_at_full_value_indefinitely() {
        let monthly = live_monthly_amount(dec!(50), date!(2023 - 02 - 01), None);
        assert_eq!(monthly, dec!(50));

        let r = recurring(Some(date!(2023 - 02 - 01)), None, monthly);
        assert!(!recurring_covers(&r, MonthRef::new(2023, 1)));
        assert!(recurring_covers(&r, MonthRef::new(2023, 2)));
        assert!(recurring_covers(&r, MonthRef::new(2030, 12)));
    }

    #[test]
    fn null_start_never_covers() {
        let r = recurring(None, None, dec!(10));
        assert!(!recurring_covers(&r, MonthRef::new(2023, 1)));
    }

    #[test]
    fn salary_close_month_is_excluded() {
        let first = salary(date!(2025 - 01 - 01), Some(date!(2025 - 05 - 31)), dec!(5000));
        let second = salary(date!(2025 - 06 - 01), None, dec!(6000));

        assert!(salary_covers(&first, MonthRef::new(2025, 1)));
        assert!(salary_covers(&first, MonthRef::new(2025, 4)));
        assert!(!salary_covers(&first, MonthRef::new(2025, 5)));
        assert!(!salary_covers(&first, MonthRef::new(2025, 6)));

        assert!(!salary_covers(&second, MonthRef::new(2025, 5)));
        assert!(salary_covers(&second, MonthRef::new(2025, 6)));
        assert!(salary_covers(&second, MonthRef::new(2026, 1)));
    }

    #[test]
    fn summarize_nets_salary_against_spend() {
        let expenses = vec![
            expense(date!(2023 - 02 - 03), dec!(40)),
            expense(date!(2023 - 02 - 14), dec!(60)),
        ];
        let recurring_rows = vec![recurring(Some(date!(2023 - 01 - 01)), None, dec!(25))];
        let salary_rows = vec![salary(date!(2023 - 01 - 01), None, dec!(4000))];

        let summary = summarize(
            &expenses,
            &recurring_rows,
            &salary_rows,
            MonthRef::new(2023, 2),
        );
        assert_eq!(summary.one_off, dec!(100));
        assert_eq!(summary.recurring, dec!(25));
        assert_eq!(summary.salary, dec!(4000));
        assert_eq!(summary.balance, dec!(3875));
    }

    #[test]
    fn empty_tables_total_zero() {
        let summary = summarize(&[], &[], &[], MonthRef::new(2023, 6));
        assert_eq!(summary.one_off, Decimal::ZERO);
        assert_eq!(summary.recurring, Decimal::ZERO);
        assert_eq!(summary.salary, Decimal::ZERO);
        assert_eq!(summary.balance, Decimal::ZERO);
    }

    #[test]
    fn summarize_is_pure() {
        let expenses = vec![expense(date!(2023 - 02 - 03), dec!(40))];
        let recurring_rows = vec![recurring(Some(date!(2023 - 01 - 01)), None, dec!(25))];
        let salary_rows = vec![salary(date!(2023 - 01 - 01), None, dec!(4000))];
        let target = MonthRef::new(2023, 2);

        let a = summarize(&expenses, &recurring_rows, &salary_rows, target);
        let b = summarize(&expenses, &recurring_rows, &salary_rows, target);
        assert_eq!(a, b);
    }
}
