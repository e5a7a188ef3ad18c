use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/* A disposal larger than the holding. The aggregator clips it to the held quantity and keeps going. */
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{instrument_id} on {date}: sold {requested} but only {held} held, clipped to {held}")]
pub struct InsufficientPositionError {
    pub instrument_id: String,
    pub date: NaiveDate,
    pub requested: Decimal,
    pub held: Decimal,
}
