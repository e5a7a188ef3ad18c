use std::collections::BTreeMap;

use chrono::NaiveDate;
use hashbrown::HashMap;
use rust_decimal::Decimal;

use super::Currency;

/* Daily closing prices of one instrument, in its listing currency. The series is a read-only input for the
ledger (listing currency, exchange rates) and for the flow aggregator (valuation at the report date). */
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub instrument_id: String,
    pub currency: Option<String>, // As reported by the provider, can be a currency we do not convert
    bars: BTreeMap<NaiveDate, PriceBar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBar {
    pub close: Decimal,
    pub stock_splits: Decimal, // Split ratio of the day, 0 when nothing happened
}

pub type PriceBook = HashMap<String, PriceSeries>;

impl PriceSeries {
    pub fn new(instrument_id: &str, currency: Option<String>) -> Self {
        Self {
            instrument_id: instrument_id.to_string(),
            currency,
            bars: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, date: NaiveDate, bar: PriceBar) {
        self.bars.insert(date, bar);
    }

    pub fn close_on(&self, date: NaiveDate) -> Option<Decimal> {
        self.bars.get(&date).map(|bar| bar.close)
    }

    /* Latest close at or before the date */
    pub fn close_on_or_before(&self, date: NaiveDate) -> Option<(NaiveDate, Decimal)> {
        self.bars
            .range(..=date)
            .next_back()
            .map(|(day, bar)| (*day, bar.close))
    }

    /* Product of the split ratios dated in (after, up_to]. Days without a split store 0. */
    pub fn split_factor(&self, after: NaiveDate, up_to: NaiveDate) -> Decimal {
        if up_to <= after {
            return Decimal::ONE;
        }
        self.bars
            .range(after.succ_opt().unwrap_or(after)..=up_to)
            .filter(|(_, bar)| bar.stock_splits > Decimal::ZERO)
            .fold(Decimal::ONE, |acc, (_, bar)| acc * bar.stock_splits)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.keys().next_back().copied()
    }

    pub fn listing_currency(&self) -> Option<Currency> {
        self.currency.as_deref().and_then(Currency::from_code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &PriceBar)> {
        self.bars.iter()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
