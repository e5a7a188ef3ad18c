use rust_decimal::Decimal;
use thiserror::Error;

/* Raised by the export mapping for a single raw entry. The entry is skipped, the rest of the batch goes on. */
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedRecordError {
    #[error("record {record} is missing required field `{field}`")]
    MissingField { record: String, field: &'static str },

    #[error("record {record} has a non-numeric `{field}`: {value}")]
    NotNumeric {
        record: String,
        field: &'static str,
        value: String,
    },

    #[error("record {record} has an invalid date: {value}")]
    InvalidDate { record: String, value: String },

    #[error("record {record} has an unknown action code `{code}`")]
    UnknownAction { record: String, code: String },

    #[error("record {record} is in an unsupported currency `{code}`")]
    UnsupportedCurrency { record: String, code: String },

    #[error("record {record}: `{field}` is out of range")]
    Overflow { record: String, field: &'static str },

    #[error("record {record}: amount {amount} differs from quantity x price {expected} by more than {tolerance}")]
    AmountMismatch {
        record: String,
        amount: Decimal,
        expected: Decimal,
        tolerance: Decimal,
    },
}
