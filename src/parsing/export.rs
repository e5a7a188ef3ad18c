/* Mapping of the brokerage export format. This is the only place that knows the provider field names:

{"transactionsByPositionIdsMap": {"<position id>": {"transactions": [ {...}, ... ]}}}

Transactions are kept as raw json values until mapped, so a single broken entry only costs that entry. */

use std::{collections::BTreeMap, path::PathBuf, str::FromStr};

use hashbrown::HashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    errors::{MalformedRecordError, PipelineError, StageWarning},
    structs::{Action, Currency, FundingSource, TransactionRecord},
    utils::{parse_export_date, read_file},
};

#[derive(Debug, Default, Deserialize)]
pub struct ExportDocument {
    #[serde(rename = "transactionsByPositionIdsMap", default)]
    pub positions: BTreeMap<String, ExportPosition>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportPosition {
    #[serde(default)]
    pub transactions: Vec<Value>,
}

/* Listing currency per instrument, taken from the downloaded price histories */
pub type CurrencyHints = HashMap<String, Currency>;

#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<TransactionRecord>,
    pub warnings: Vec<StageWarning>,
    pub attempted: usize, // Raw entries seen, mapped or not
}

impl Extraction {
    pub fn merge(&mut self, other: Extraction) {
        self.records.extend(other.records);
        self.warnings.extend(other.warnings);
        self.attempted += other.attempted;
    }
}

pub fn parse_document(text: &str) -> Result<ExportDocument, serde_json::Error> {
    serde_json::from_str(text)
}

/* Pure mapping from one document to records. Positions are visited in id order. */
pub fn map_document(document: &ExportDocument, hints: &CurrencyHints) -> Extraction {
    let mut extraction = Extraction::default();
    for (position_id, position) in &document.positions {
        for (index, raw) in position.transactions.iter().enumerate() {
            extraction.attempted += 1;
            match map_transaction(raw, &format!("{position_id}#{index}"), hints) {
                Ok(records) => extraction.records.extend(records),
                Err(e) => extraction.warnings.push(StageWarning::MalformedRecord(e)),
            }
        }
    }
    extraction
}

/* Maps one raw entry. A commission on a trade becomes a separate FEE record right after the trade. */
pub fn map_transaction(
    raw: &Value,
    fallback_label: &str,
    hints: &CurrencyHints,
) -> Result<Vec<TransactionRecord>, MalformedRecordError> {
    let empty = Map::new();
    let fields = raw.as_object().unwrap_or(&empty);
    let record_id = fields.get("id").and_then(value_as_text);
    let label = record_id.clone().unwrap_or_else(|| fallback_label.to_string());

    let code = required_text(fields, "type", &label)?;
    let action = Action::from_provider_code(&code).ok_or(MalformedRecordError::UnknownAction {
        record: label.clone(),
        code,
    })?;
    let instrument_id = required_text(fields, "symbol", &label)?;

    let date_text = required_text(fields, "date", &label)?;
    let timestamp =
        parse_export_date(&date_text).ok_or(MalformedRecordError::InvalidDate {
            record: label.clone(),
            value: date_text,
        })?;

    let quantity = required_decimal(fields, "quantity", &label)?.abs();
    let unit_price = required_decimal(fields, "pricePerShare", &label)?;
    let commission = optional_decimal(fields, "commission", &label)?
        .unwrap_or(Decimal::ZERO)
        .abs();

    let amount = match optional_decimal(fields, "totalValue", &label)? {
        Some(total) => match action {
            Action::Buy | Action::TransferIn => total.abs().checked_sub(commission),
            Action::Sell | Action::TransferOut => total.abs().checked_add(commission),
            Action::Dividend | Action::Fee => Some(total.abs()),
        }
        .ok_or(MalformedRecordError::Overflow {
            record: label.clone(),
            field: "totalValue",
        })?,
        None => quantity
            .checked_mul(unit_price)
            .ok_or(MalformedRecordError::Overflow {
                record: label.clone(),
                field: "pricePerShare",
            })?,
    };

    let currency = match fields.get("currency").and_then(value_as_text) {
        Some(code) => Currency::from_code(&code).ok_or(MalformedRecordError::UnsupportedCurrency {
            record: label.clone(),
            code,
        })?,
        None => hints.get(&instrument_id).copied().unwrap_or_default(),
    };

    let funding_source = match action {
        Action::Buy => fields
            .get("comment")
            .and_then(Value::as_str)
            .map(FundingSource::from_comment)
            .unwrap_or_default(),
        _ => FundingSource::Funds,
    };

    let mut records = vec![TransactionRecord {
        instrument_id: instrument_id.clone(),
        timestamp,
        action,
        quantity,
        unit_price,
        currency,
        amount,
        funding_source,
        record_id: record_id.clone(),
        commission_of: None,
    }];

    if commission > Decimal::ZERO && matches!(action, Action::Buy | Action::Sell) {
        records.push(TransactionRecord {
            instrument_id,
            timestamp,
            action: Action::Fee,
            quantity: Decimal::ONE,
            unit_price: commission,
            currency,
            amount: commission,
            funding_source: FundingSource::Funds,
            record_id: record_id.map(|id| format!("{id}:fee")),
            commission_of: Some(amount),
        });
    }

    return Ok(records);
}

/* Reads every document, in the given order. Unreadable documents are skipped with a warning; the batch
only fails when nothing could be read or when every single entry was malformed. */
pub fn extract_documents(
    paths: &[PathBuf],
    hints: &CurrencyHints,
) -> Result<Extraction, PipelineError> {
    let mut extraction = Extraction::default();
    let mut documents_read = 0;

    for path in paths {
        let document = read_file(path)
            .map_err(|e| e.to_string())
            .and_then(|text| parse_document(&text).map_err(|e| e.to_string()));
        match document {
            Ok(document) => {
                documents_read += 1;
                let mapped = map_document(&document, hints);
                info!(
                    path = %path.display(),
                    records = mapped.records.len(),
                    skipped = mapped.warnings.len(),
                    "read export"
                );
                extraction.merge(mapped);
            }
            Err(reason) => {
                debug!(path = %path.display(), %reason, "unreadable export");
                extraction.warnings.push(StageWarning::UnreadableDocument {
                    path: path.clone(),
                    reason,
                })
            }
        }
    }

    if documents_read == 0 {
        return Err(PipelineError::NoReadableDocuments(paths.len()));
    }
    if extraction.attempted > 0 && extraction.records.is_empty() {
        return Err(PipelineError::AllRecordsMalformed(extraction.attempted));
    }
    Ok(extraction)
}

/* Symbols named by the documents, in first-seen order. Used to pick the price histories before mapping,
unreadable documents are simply ignored here. */
pub fn export_symbols(paths: &[PathBuf]) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for path in paths {
        let Ok(document) = read_file(path)
            .map_err(|e| e.to_string())
            .and_then(|text| parse_document(&text).map_err(|e| e.to_string()))
        else {
            continue;
        };
        for position in document.positions.values() {
            for raw in &position.transactions {
                if let Some(symbol) = raw.get("symbol").and_then(value_as_text) {
                    if !symbols.contains(&symbol) {
                        symbols.push(symbol);
                    }
                }
            }
        }
    }
    symbols
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_text(
    fields: &Map<String, Value>,
    field: &'static str,
    label: &str,
) -> Result<String, MalformedRecordError> {
    fields
        .get(field)
        .and_then(value_as_text)
        .ok_or(MalformedRecordError::MissingField {
            record: label.to_string(),
            field,
        })
}

fn optional_decimal(
    fields: &Map<String, Value>,
    field: &'static str,
    label: &str,
) -> Result<Option<Decimal>, MalformedRecordError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value_as_decimal(value).map(Some).ok_or_else(|| {
            MalformedRecordError::NotNumeric {
                record: label.to_string(),
                field,
                value: value.to_string(),
            }
        }),
    }
}

fn required_decimal(
    fields: &Map<String, Value>,
    field: &'static str,
    label: &str,
) -> Result<Decimal, MalformedRecordError> {
    optional_decimal(fields, field, label)?.ok_or(MalformedRecordError::MissingField {
        record: label.to_string(),
        field,
    })
}

fn value_as_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .ok()
        .or_else(|| Decimal::from_scientific(&text).ok())
}
