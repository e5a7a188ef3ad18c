use chrono::NaiveDate;
use thiserror::Error;

use crate::structs::Currency;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no {from}/{to} rate available for {date}")]
pub struct MissingRateError {
    pub date: NaiveDate,
    pub from: Currency,
    pub to: Currency,
}
