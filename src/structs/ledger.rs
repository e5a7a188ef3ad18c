use chrono::NaiveDate;
use hashbrown::HashSet;
use rust_decimal::Decimal;

use super::{Currency, RateSubstitution, TransactionRecord};

/* One row of the ledger: the record and its amount in the reporting currency. */
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub record: TransactionRecord,
    pub converted_amount: Decimal,
    pub substitution: Option<RateSubstitution>,
}

/* The canonical ledger: sorted by date, unique composite keys, every amount converted to one currency.
It is rebuilt from the exports on every run. */
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub reporting_currency: Currency,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /* The entries must already be sorted, see LedgerManager for how a ledger is built */
    pub fn from_sorted(reporting_currency: Currency, entries: Vec<LedgerEntry>) -> Self {
        Self {
            reporting_currency,
            entries,
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.entries.last().map(|entry| entry.record.timestamp)
    }

    /* Distinct instruments in order of first appearance */
    pub fn instruments(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|entry| seen.insert(entry.record.instrument_id.as_str()))
            .map(|entry| entry.record.instrument_id.clone())
            .collect()
    }
}
