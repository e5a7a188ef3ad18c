use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::errors::MissingRateError;

use super::{Currency, PriceSeries};

/* Daily EUR/USD rates, expressed as USD per EUR (the close of the EURUSD=X series). */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    usd_per_eur: BTreeMap<NaiveDate, Decimal>,
}

/* Audit note of a conversion that had to use an older rate */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSubstitution {
    pub requested: NaiveDate,
    pub used: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub value: Decimal,
    pub substitution: Option<RateSubstitution>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series(series: &PriceSeries) -> Self {
        let mut table = Self::new();
        for (date, bar) in series.iter() {
            table.insert(*date, bar.close);
        }
        table
    }

    /* Zero or negative rates are ignored, they can only come from broken data */
    pub fn insert(&mut self, date: NaiveDate, usd_per_eur: Decimal) {
        if usd_per_eur > Decimal::ZERO {
            self.usd_per_eur.insert(date, usd_per_eur);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.usd_per_eur.is_empty()
    }

    /* Converts with the rate of that exact date. */
    pub fn convert(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
        date: NaiveDate,
    ) -> Result<Decimal, MissingRateError> {
        if from == to {
            return Ok(amount);
        }
        let rate = self
            .usd_per_eur
            .get(&date)
            .ok_or(MissingRateError { date, from, to })?;
        return Ok(apply(amount, from, *rate));
    }

    /* Same as convert, but falls back on the nearest earlier rate and reports the substitution.
    Fails only when no rate exists at or before the date. */
    pub fn convert_or_prior(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
        date: NaiveDate,
    ) -> Result<Conversion, MissingRateError> {
        match self.convert(amount, from, to, date) {
            Ok(value) => Ok(Conversion {
                value,
                substitution: None,
            }),
            Err(missing) => {
                let (used, rate) = self
                    .usd_per_eur
                    .range(..date)
                    .next_back()
                    .ok_or_else(|| missing.clone())?;
                Ok(Conversion {
                    value: apply(amount, from, *rate),
                    substitution: Some(RateSubstitution {
                        requested: date,
                        used: *used,
                    }),
                })
            }
        }
    }
}

fn apply(amount: Decimal, from: Currency, usd_per_eur: Decimal) -> Decimal {
    match from {
        Currency::Eur => amount * usd_per_eur,
        Currency::Usd => amount / usd_per_eur,
    }
}

impl RateSubstitution {
    const PREFIX: &'static str = "rate of ";
    const INFIX: &'static str = " substituted for ";

    /* Text stored in the audit_note column, e.g. "rate of 2023-01-13 substituted for 2023-01-15" */
    pub fn note(&self) -> String {
        format!(
            "{}{}{}{}",
            Self::PREFIX,
            self.used.format("%Y-%m-%d"),
            Self::INFIX,
            self.requested.format("%Y-%m-%d")
        )
    }

    pub fn from_note(note: &str) -> Option<Self> {
        let rest = note.trim().strip_prefix(Self::PREFIX)?;
        let (used, requested) = rest.split_once(Self::INFIX)?;
        Some(Self {
            requested: NaiveDate::parse_from_str(requested.trim(), "%Y-%m-%d").ok()?,
            used: NaiveDate::parse_from_str(used.trim(), "%Y-%m-%d").ok()?,
        })
    }
}
