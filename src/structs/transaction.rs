use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Currency;

/* A TransactionRecord is one normalized brokerage event. It is built by the export mapping and never mutated
afterwards, the ledger wraps it with the converted amount.

The amount is always the gross value in the native currency: quantity x unit_price. Commissions are split
into their own FEE record during the mapping. */
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TransactionRecord {
    pub instrument_id: String,
    pub timestamp: NaiveDate,
    pub action: Action,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub currency: Currency,
    pub amount: Decimal,
    pub funding_source: FundingSource,
    pub record_id: Option<String>, // Diagnostics only, not part of the identity of the record
    pub commission_of: Option<Decimal>, // Gross amount of the trade a split FEE was charged on
}

#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    TransferIn,
    TransferOut,
    Dividend,
    Fee,
}

/* Where the money for an acquisition came from. Employment plans deliver shares without cash leaving the
portfolio, so they are drawn as their own source in the diagram. */
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FundingSource {
    #[default]
    Funds,
    Rsu,
    Espp,
    Psu,
}

/* Duplicates are detected on this key: overlapping export windows repeat the same events with new ids.
A commission split from a trade also carries the trade amount, so two same day trades charged the same flat
commission keep both fees while a repeated trade still drops its fee. */
#[derive(Hash, Eq, PartialEq, Debug, Clone)]
pub struct CompositeKey {
    pub instrument_id: String,
    pub timestamp: NaiveDate,
    pub action: Action,
    pub amount: Decimal,
    pub commission_of: Option<Decimal>,
}

impl TransactionRecord {
    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey {
            instrument_id: self.instrument_id.clone(),
            timestamp: self.timestamp,
            action: self.action,
            amount: self.amount.normalize(),
            commission_of: self.commission_of.map(|amount| amount.normalize()),
        }
    }

    /* |amount - quantity x unit_price|, None when the product or the difference does not fit a decimal */
    pub fn amount_deviation(&self) -> Option<Decimal> {
        let expected = self.quantity.checked_mul(self.unit_price)?;
        Some(self.amount.checked_sub(expected)?.abs())
    }
}

impl Action {
    pub fn code(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::TransferIn => "TRANSFER_IN",
            Action::TransferOut => "TRANSFER_OUT",
            Action::Dividend => "DIVIDEND",
            Action::Fee => "FEE",
        }
    }

    /* Provider codes, including the aliases seen in older exports */
    pub fn from_provider_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "BUY" => Some(Action::Buy),
            "SELL" => Some(Action::Sell),
            "TRANSFER_IN" => Some(Action::TransferIn),
            "TRANSFER_OUT" => Some(Action::TransferOut),
            "DIVIDEND" | "DIV" | "CASH_DIVIDEND" => Some(Action::Dividend),
            "FEE" | "COMMISSION" => Some(Action::Fee),
            _ => None,
        }
    }

    /* Order inside a single day: acquisitions first so a same day sale never sees a transient negative position */
    pub fn same_day_priority(&self) -> u8 {
        match self {
            Action::Buy | Action::TransferIn => 0,
            Action::Dividend | Action::Fee => 1,
            Action::Sell | Action::TransferOut => 2,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FundingSource {
    /* RSU is checked before ESPP and PSU, a comment naming several plans is attributed to the first match */
    pub fn from_comment(comment: &str) -> Self {
        let comment = comment.to_uppercase();
        if comment.contains("RSU") {
            FundingSource::Rsu
        } else if comment.contains("ESPP") {
            FundingSource::Espp
        } else if comment.contains("PSU") {
            FundingSource::Psu
        } else {
            FundingSource::Funds
        }
    }

    pub fn is_compensation(&self) -> bool {
        !matches!(self, FundingSource::Funds)
    }

    pub fn code(&self) -> &'static str {
        match self {
            FundingSource::Funds => "FUNDS",
            FundingSource::Rsu => "RSU",
            FundingSource::Espp => "ESPP",
            FundingSource::Psu => "PSU",
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn record(amount: Decimal) -> TransactionRecord {
        TransactionRecord {
            instrument_id: "AAPL".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
            action: Action::Buy,
            quantity: dec!(10),
            unit_price: dec!(150),
            currency: Currency::Usd,
            amount,
            funding_source: FundingSource::Funds,
            record_id: None,
            commission_of: None,
        }
    }

    #[test]
    fn test_composite_key_ignores_scale_and_record_id() {
        let a = record(dec!(1500));
        let mut b = record(dec!(1500.00));
        b.record_id = Some("tx_2".to_string());
        assert_eq!(a.composite_key(), b.composite_key());
    }

    #[test]
    fn test_split_commission_key_follows_its_trade() {
        let mut first = record(dec!(1));
        first.action = Action::Fee;
        first.commission_of = Some(dec!(1000));
        let mut second = first.clone();
        second.commission_of = Some(dec!(505));
        assert_ne!(first.composite_key(), second.composite_key());

        let mut repeated = first.clone();
        repeated.commission_of = Some(dec!(1000.00));
        assert_eq!(first.composite_key(), repeated.composite_key());
    }

    #[test]
    fn test_provider_codes() {
        assert_eq!(Action::from_provider_code("buy"), Some(Action::Buy));
        assert_eq!(Action::from_provider_code("CASH_DIVIDEND"), Some(Action::Dividend));
        assert_eq!(Action::from_provider_code("SPLIT"), None);
    }

    #[test]
    fn test_funding_source_from_comment() {
        assert_eq!(FundingSource::from_comment("Vested rsu grant"), FundingSource::Rsu);
        assert_eq!(FundingSource::from_comment("ESPP purchase"), FundingSource::Espp);
        assert_eq!(FundingSource::from_comment("psu"), FundingSource::Psu);
        assert_eq!(FundingSource::from_comment("monthly savings"), FundingSource::Funds);
    }

    #[test]
    fn test_amount_deviation() {
        assert_eq!(record(dec!(1500.004)).amount_deviation(), Some(dec!(0.004)));
    }
}
