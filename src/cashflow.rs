//! Monthly cash-flow aggregation

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::models::Transaction;

/// Calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    /// 1-12
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Months since year 0, for window arithmetic
    fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthBucket {
    pub month: YearMonth,
    pub money_in: f64,
    /// Positive magnitude of outgoing amounts
    pub money_out: f64,
    /// Net since the start of the window, up to and including this month
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CashFlow {
    /// Oldest month first
    pub buckets: Vec<MonthBucket>,
    pub total_balance: f64,
}

/// Bucket transactions into the `months` calendar months ending with the
/// month of `today`.
///
/// Every month in the window gets a bucket, empty or not. `account: None`
/// includes all accounts.
pub fn aggregate(
    transactions: &[Transaction],
    account: Option<&str>,
    months: u32,
    today: NaiveDate,
) -> CashFlow {
    if months == 0 {
        return CashFlow::default();
    }

    let end = YearMonth::of(today).index();
    let start = end - (months as i64 - 1);

    let mut buckets: Vec<MonthBucket> = (start..=end)
        .map(|index| MonthBucket {
            month: YearMonth::from_index(index),
            money_in: 0.0,
            money_out: 0.0,
            balance: 0.0,
        })
        .collect();

    for tx in transactions
        .iter()
        .filter(|tx| account.map_or(true, |id| tx.account_id == id))
    {
        let index = YearMonth::of(tx.date).index();
        if index < start || index > end {
            continue;
        }
        let bucket = &mut buckets[(index - start) as usize];
        if tx.amount >= 0.0 {
            bucket.money_in += tx.amount;
        } else {
            bucket.money_out += -tx.amount;
        }
    }

    let mut running = 0.0;
    for bucket in buckets.iter_mut() {
        running += bucket.money_in - bucket.money_out;
        bucket.balance = running;
    }

    CashFlow {
        buckets,
        total_balance: running,
    }
}
