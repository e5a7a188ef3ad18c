use std::{fs::File, path::Path};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    errors::PipelineError,
    structs::{
        Action, Currency, FundingSource, Ledger, LedgerEntry, RateSubstitution, TransactionRecord,
    },
};

/* Column order of transactions.csv. The first eight columns are the ledger itself, the last three carry
the funding source, the rate audit note and the currency of converted_amount. */
#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    instrument_id: String,
    timestamp: NaiveDate,
    action: Action,
    quantity: Decimal,
    unit_price: Decimal,
    currency: Currency,
    amount: Decimal,
    converted_amount: Decimal,
    funding_source: FundingSource,
    audit_note: Option<String>,
    reporting_currency: Currency,
}

impl LedgerRow {
    fn new(entry: &LedgerEntry, reporting_currency: Currency) -> Self {
        let record = &entry.record;
        Self {
            instrument_id: record.instrument_id.clone(),
            timestamp: record.timestamp,
            action: record.action,
            quantity: record.quantity,
            unit_price: record.unit_price,
            currency: record.currency,
            amount: record.amount,
            converted_amount: entry.converted_amount,
            funding_source: record.funding_source,
            audit_note: entry.substitution.map(|s| s.note()),
            reporting_currency,
        }
    }
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        Self {
            substitution: row.audit_note.as_deref().and_then(RateSubstitution::from_note),
            converted_amount: row.converted_amount,
            record: TransactionRecord {
                instrument_id: row.instrument_id,
                timestamp: row.timestamp,
                action: row.action,
                quantity: row.quantity,
                unit_price: row.unit_price,
                currency: row.currency,
                amount: row.amount,
                funding_source: row.funding_source,
                record_id: None,
                commission_of: None,
            },
        }
    }
}

pub fn write_ledger(path: &Path, ledger: &Ledger) -> Result<(), PipelineError> {
    let csv_error = |source| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = csv::Writer::from_writer(file);
    for entry in ledger.entries() {
        writer
            .serialize(LedgerRow::new(entry, ledger.reporting_currency))
            .map_err(csv_error)?;
    }
    if ledger.is_empty() {
        // serialize writes the header with the first row, an empty ledger still gets one
        writer
            .write_record([
                "instrument_id",
                "timestamp",
                "action",
                "quantity",
                "unit_price",
                "currency",
                "amount",
                "converted_amount",
                "funding_source",
                "audit_note",
                "reporting_currency",
            ])
            .map_err(csv_error)?;
    }
    writer.flush().map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/* Rows are trusted to be in ledger order, the file is our own output. A ledger converted to another
currency than the requested one is refused: its amounts cannot be compared with prices in that currency. */
pub fn read_ledger(path: &Path, reporting_currency: Currency) -> Result<Ledger, PipelineError> {
    let file = File::open(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let mut entries = Vec::new();
    for row in reader.deserialize::<LedgerRow>() {
        let row = row.map_err(|source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if row.reporting_currency != reporting_currency {
            return Err(PipelineError::CurrencyMismatch {
                path: path.to_path_buf(),
                found: row.reporting_currency,
                expected: reporting_currency,
            });
        }
        entries.push(LedgerEntry::from(row));
    }
    Ok(Ledger::from_sorted(reporting_currency, entries))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn entry(substitution: Option<RateSubstitution>) -> LedgerEntry {
        LedgerEntry {
            record: TransactionRecord {
                instrument_id: "SAP.DE".to_string(),
                timestamp: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
                action: Action::Buy,
                quantity: dec!(10),
                unit_price: dec!(120.5),
                currency: Currency::Eur,
                amount: dec!(1205),
                funding_source: FundingSource::Espp,
                record_id: None,
                commission_of: None,
            },
            converted_amount: dec!(1301.4),
            substitution,
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.csv");
        let substitution = RateSubstitution {
            requested: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
            used: NaiveDate::from_ymd_opt(2023, 1, 13).unwrap(),
        };
        let ledger = Ledger::from_sorted(Currency::Usd, vec![entry(Some(substitution)), entry(None)]);

        write_ledger(&path, &ledger).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("instrument_id,timestamp,action,quantity,unit_price,currency,amount,converted_amount,funding_source,audit_note,reporting_currency")
        );
        assert_eq!(
            lines.next(),
            Some("SAP.DE,2023-01-15,BUY,10,120.5,EUR,1205,1301.4,ESPP,rate of 2023-01-13 substituted for 2023-01-15,USD")
        );

        let read = read_ledger(&path, Currency::Usd).unwrap();
        assert_eq!(read, ledger);
    }

    #[test]
    fn test_read_in_another_currency_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.csv");
        write_ledger(&path, &Ledger::from_sorted(Currency::Eur, vec![entry(None)])).unwrap();

        assert!(matches!(
            read_ledger(&path, Currency::Usd),
            Err(PipelineError::CurrencyMismatch {
                found: Currency::Eur,
                expected: Currency::Usd,
                ..
            })
        ));
        assert_eq!(read_ledger(&path, Currency::Eur).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_ledger_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.csv");
        write_ledger(&path, &Ledger::from_sorted(Currency::Usd, Vec::new())).unwrap();
        let read = read_ledger(&path, Currency::Usd).unwrap();
        assert!(read.is_empty());
    }
}
