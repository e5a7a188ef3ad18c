use chrono::NaiveDate;
use hashbrown::HashSet;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::{
    errors::{MalformedRecordError, StageWarning},
    structs::{
        CompositeKey, Config, ConversionTiming, Currency, Ledger, LedgerEntry, RateTable,
        TransactionRecord,
    },
};

/* Largest accepted gap between amount and quantity x unit_price, in the record currency */
pub const AMOUNT_TOLERANCE: Decimal = dec!(0.01);

/* Collects records while dropping duplicates. Overlapping export windows repeat the same events, the first
occurrence wins so the input order of the survivors is kept. */
#[derive(Debug, Default)]
pub struct LedgerManager {
    records: Vec<TransactionRecord>,
    hash_set: HashSet<CompositeKey>,
    duplicates: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOptions {
    pub reporting_currency: Currency,
    pub conversion_timing: ConversionTiming,
    pub report_date: Option<NaiveDate>,
}

#[derive(Debug)]
pub struct LedgerBuild {
    pub ledger: Ledger,
    pub warnings: Vec<StageWarning>,
    pub duplicates: usize,
    pub excluded: usize,
}

impl LedgerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /* Returns false when the record was a duplicate */
    pub fn push(&mut self, record: TransactionRecord) -> bool {
        if self.hash_set.insert(record.composite_key()) {
            self.records.push(record);
            return true;
        }
        self.duplicates += 1;
        return false;
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

impl From<&Config> for LedgerOptions {
    fn from(config: &Config) -> Self {
        Self {
            reporting_currency: config.reporting_currency,
            conversion_timing: config.conversion_timing,
            report_date: config.report_date,
        }
    }
}

/* Builds the canonical ledger from extracted records:
- records whose amount does not match quantity x unit_price are excluded,
- duplicates are dropped,
- amounts are converted to the reporting currency, with the nearest earlier rate when the day has none,
- entries are sorted by date, ties keep the input order. */
pub fn build_ledger(
    records: &[TransactionRecord],
    rates: &RateTable,
    options: &LedgerOptions,
) -> LedgerBuild {
    let mut warnings = Vec::new();
    let mut excluded = 0;
    let mut manager = LedgerManager::new();

    for record in records {
        let mismatch = match (
            record.amount_deviation(),
            record.quantity.checked_mul(record.unit_price),
        ) {
            (Some(deviation), _) if deviation <= AMOUNT_TOLERANCE => None,
            (Some(_), Some(expected)) => Some(MalformedRecordError::AmountMismatch {
                record: record_label(record),
                amount: record.amount,
                expected,
                tolerance: AMOUNT_TOLERANCE,
            }),
            _ => Some(MalformedRecordError::Overflow {
                record: record_label(record),
                field: "amount",
            }),
        };
        if let Some(error) = mismatch {
            excluded += 1;
            warnings.push(StageWarning::MalformedRecord(error));
            continue;
        }
        manager.push(record.clone());
    }

    let report_date = options
        .report_date
        .or_else(|| manager.records().iter().map(|r| r.timestamp).max());

    let mut entries = Vec::with_capacity(manager.records().len());
    for record in manager.records() {
        let date = match (options.conversion_timing, report_date) {
            (ConversionTiming::ReportDate, Some(report_date)) => report_date,
            _ => record.timestamp,
        };
        match rates.convert_or_prior(record.amount, record.currency, options.reporting_currency, date) {
            Ok(conversion) => {
                if let Some(substitution) = conversion.substitution {
                    warnings.push(StageWarning::RateSubstituted {
                        instrument_id: record.instrument_id.clone(),
                        error: crate::errors::MissingRateError {
                            date,
                            from: record.currency,
                            to: options.reporting_currency,
                        },
                        used: substitution.used,
                    });
                }
                entries.push(LedgerEntry {
                    record: record.clone(),
                    converted_amount: conversion.value,
                    substitution: conversion.substitution,
                });
            }
            Err(error) => {
                excluded += 1;
                warnings.push(StageWarning::RateUnavailable {
                    instrument_id: record.instrument_id.clone(),
                    error,
                });
            }
        }
    }

    // sort_by_key is stable: same day entries keep their input order
    entries.sort_by_key(|entry| entry.record.timestamp);

    debug!(
        entries = entries.len(),
        duplicates = manager.duplicates(),
        excluded,
        "ledger built"
    );

    LedgerBuild {
        ledger: Ledger::from_sorted(options.reporting_currency, entries),
        warnings,
        duplicates: manager.duplicates(),
        excluded,
    }
}

fn record_label(record: &TransactionRecord) -> String {
    match &record.record_id {
        Some(id) => id.clone(),
        None => format!(
            "{} {} {}",
            record.instrument_id, record.action, record.timestamp
        ),
    }
}
