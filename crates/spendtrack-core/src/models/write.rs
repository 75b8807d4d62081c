use rust_decimal::Decimal;
use time::Date;

/// Insert command for a one-off expense.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub date: Option<Date>,
    pub category: String,
    pub item: String,
    pub location: String,
    pub price: Decimal,
    pub currency: String,
    pub price_base: Decimal,
}

/// Insert command for a recurring expense. `price_base` is the monthly
/// amount, already amortized by the caller where applicable.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecurringExpense {
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub category: String,
    pub item: String,
    pub location: String,
    pub ori_price: Decimal,
    pub currency: String,
    pub price_base: Decimal,
}

/// Insert command for a salary period. The inserted period is open; closing
/// the previous one is the caller's responsibility via
/// `StorageBackend::close_open_salary`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSalaryPeriod {
    pub start_date: Date,
    pub amount: Decimal,
}
