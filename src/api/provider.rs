use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{errors::FetchError, structs::PriceSeries};

/* A source of daily closing prices. The fetch stage only knows this trait, tests plug a scripted provider. */
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn id(&self) -> &'static str;

    /* Daily bars in [start, end). An empty series is a valid answer: nothing traded in the window. */
    async fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError>;
}
