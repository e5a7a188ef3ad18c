use chrono::{DateTime, NaiveDate};

/* Export dates are YYYYMMDD, older exports sometimes carry an ISO date instead */
pub fn parse_export_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()) {
        return NaiveDate::parse_from_str(value, "%Y%m%d").ok();
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/* Stored histories may come from other tools that write "2023-01-12 00:00:00-05:00", only the day matters */
pub fn parse_history_date(value: &str) -> Option<NaiveDate> {
    let day = value.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/* Provider timestamps are unix seconds, shifted by the exchange offset so the day is the trading day */
pub fn timestamp_to_trading_day(timestamp: i64, gmt_offset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp + gmt_offset, 0).map(|dt| dt.date_naive())
}
