use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use time::{Date, Month};

use spendtrack_core::{
    aggregate,
    models::write::{NewExpense, NewRecurringExpense, NewSalaryPeriod},
    MonthRef, StorageBackend,
};
use spendtrack_memory::InMemoryStorage;

fn seed_data(storage: &dyn StorageBackend) {
    // A year of daily spending plus a realistic recurring catalog.
    for month in 1..=12u8 {
        for day in 1..=28u8 {
            let date = Date::from_calendar_date(2023, Month::try_from(month).unwrap(), day)
                .unwrap();
            storage
                .insert_expense(
                    2023,
                    &NewExpense {
                        date: Some(date),
                        category: "Food".to_string(),
                        item: format!("Item {month}-{day}"),
                        location: "CityX".to_string(),
                        price: Decimal::from(10 + day as i64),
                        currency: "SGD".to_string(),
                        price_base: Decimal::from(10 + day as i64),
                    },
                )
                .unwrap();
        }
    }

    for i in 0..50i64 {
        let start = Date::from_calendar_date(2023, Month::January, 1).unwrap();
        let end = (i % 2 == 0)
            .then(|| Date::from_calendar_date(2023, Month::June, 30).unwrap());
        storage
            .insert_recurring(
                2023,
                &NewRecurringExpense {
                    start_date: Some(start),
                    end_date: end,
                    category: "Subscription".to_string(),
                    item: format!("Service {i}"),
                    location: "Online".to_string(),
                    ori_price: Decimal::from(120),
                    currency: "SGD".to_string(),
                    price_base: Decimal::from(10),
                },
            )
            .unwrap();
    }

    storage
        .insert_salary(
            2023,
            &NewSalaryPeriod {
                start_date: Date::from_calendar_date(2023, Month::January, 1).unwrap(),
                amount: Decimal::from(5000),
            },
        )
        .unwrap();
}

fn bench_monthly_summary(c: &mut Criterion) {
    let storage = InMemoryStorage::new();
    seed_data(&storage);

    c.bench_function("monthly_summary", |b| {
        b.iter(|| aggregate::monthly_summary(&storage, black_box(2023), black_box(7)).unwrap())
    });
}

fn bench_summarize_pure(c: &mut Criterion) {
    let storage = InMemoryStorage::new();
    seed_data(&storage);
    let expenses = storage.expenses_for_month(2023, 7).unwrap();
    let recurring = storage.list_recurring(2023).unwrap();
    let salary = storage.list_salary(2023).unwrap();
    let target = MonthRef::new(2023, 7);

    c.bench_function("summarize_prefetched", |b| {
        b.iter(|| {
            aggregate::summarize(
                black_box(&expenses),
                black_box(&recurring),
                black_box(&salary),
                target,
            )
        })
    });
}

fn bench_month_series(c: &mut Criterion) {
    let storage = InMemoryStorage::new();
    seed_data(&storage);

    c.bench_function("month_series", |b| {
        b.iter(|| aggregate::month_series(&storage, black_box(2023)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_monthly_summary,
    bench_summarize_pure,
    bench_month_series
);
criterion_main!(benches);
