use std::collections::VecDeque;

use chrono::NaiveDate;
use hashbrown::HashMap;
use rust_decimal::Decimal;
use tracing::debug;

use crate::{
    errors::{InsufficientPositionError, MissingRateError, StageWarning},
    structs::{
        compensation_node, Action, Config, Currency, FlowDiagram, FlowEdge, FlowKind, FlowRouting,
        Ledger, LedgerEntry, Position, PriceBook, RateTable, CASH_NODE,
        DIVIDENDS_NODE, FEES_NODE, REALIZED_GAIN_NODE, REALIZED_LOSS_NODE, UNREALIZED_GAIN_NODE,
        UNREALIZED_LOSS_NODE,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowOptions {
    pub routing: FlowRouting,
    pub report_date: Option<NaiveDate>,
}

#[derive(Debug)]
pub struct FlowAggregation {
    pub diagram: FlowDiagram,
    pub warnings: Vec<StageWarning>,
}

impl From<&Config> for FlowOptions {
    fn from(config: &Config) -> Self {
        Self {
            routing: config.flow_routing,
            report_date: config.report_date,
        }
    }
}

/* Walks the ledger and keeps the running position of every instrument, like a wallet balance history.
Every event moves value between two nodes, the edges are summed per (source, target) pair.

For each instrument the capital edges balance to its value at the report date:
purchases + realized gains + unrealized gains - sales - losses = market value (or cost basis). */
pub struct FlowManager<'a> {
    prices: &'a PriceBook,
    rates: &'a RateTable,
    reporting_currency: Currency,
    routing: FlowRouting,
    positions: HashMap<String, Position>,
    position_order: Vec<String>,
    last_seen: HashMap<String, NaiveDate>, // Date up to which splits were applied
    edges: Vec<FlowEdge>,
    edge_index: HashMap<(String, String), usize>,
    proceeds: VecDeque<(String, Decimal)>, // Unallocated sale proceeds, DirectTransfer only
    warnings: Vec<StageWarning>,
}

impl<'a> FlowManager<'a> {
    pub fn new(
        prices: &'a PriceBook,
        rates: &'a RateTable,
        reporting_currency: Currency,
        routing: FlowRouting,
    ) -> Self {
        Self {
            prices,
            rates,
            reporting_currency,
            routing,
            positions: HashMap::new(),
            position_order: Vec::new(),
            last_seen: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
            proceeds: VecDeque::new(),
            warnings: Vec::new(),
        }
    }

    pub fn process(&mut self, entry: &LedgerEntry) {
        let record = &entry.record;
        let value = entry.converted_amount;
        self.apply_splits(&record.instrument_id, record.timestamp);

        match record.action {
            Action::Buy | Action::TransferIn => {
                let funding = record.funding_source;
                let (source, kind) = match record.action {
                    Action::TransferIn => (CASH_NODE.to_string(), FlowKind::TransferIn),
                    _ if funding.is_compensation() => {
                        (compensation_node(funding), FlowKind::Compensation)
                    }
                    _ => (CASH_NODE.to_string(), FlowKind::Purchase),
                };
                if kind == FlowKind::Purchase && self.routing == FlowRouting::DirectTransfer {
                    let remainder = self.draw_proceeds(&record.instrument_id, value);
                    self.add_edge(&source, &record.instrument_id, remainder, kind);
                } else {
                    self.add_edge(&source, &record.instrument_id, value, kind);
                }

                let position = self.position_mut(&record.instrument_id, record.currency);
                position.quantity += record.quantity;
                position.cost_basis += value;
                position.currency = record.currency;
            }
            Action::Sell | Action::TransferOut => {
                self.update_balance_from_position(entry);
            }
            Action::Dividend => {
                self.add_edge(&record.instrument_id, DIVIDENDS_NODE, value, FlowKind::Dividend);
            }
            Action::Fee => {
                self.add_edge(&record.instrument_id, FEES_NODE, value, FlowKind::Fee);
            }
        }
    }

    /* Disposal: proceeds leave the position, the proportional cost basis is removed and the difference is
    a realized gain or loss. Selling more than held is clipped to the holding. */
    fn update_balance_from_position(&mut self, entry: &LedgerEntry) {
        let record = &entry.record;
        let instrument = record.instrument_id.clone();
        let position = self.position_mut(&instrument, record.currency);
        let held = position.quantity;

        let (proceeds, removed_cost) = if record.quantity > held {
            let proceeds = if record.quantity.is_zero() {
                Decimal::ZERO
            } else {
                entry.converted_amount * held / record.quantity
            };
            let removed = position.cost_basis;
            position.quantity = Decimal::ZERO;
            position.cost_basis = Decimal::ZERO;
            self.warnings.push(StageWarning::InsufficientPosition(
                InsufficientPositionError {
                    instrument_id: instrument.clone(),
                    date: record.timestamp,
                    requested: record.quantity,
                    held,
                },
            ));
            (proceeds, removed)
        } else {
            let removed = if record.quantity == held {
                position.cost_basis
            } else {
                position.cost_basis * record.quantity / held
            };
            position.quantity -= record.quantity;
            position.cost_basis -= removed;
            (entry.converted_amount, removed)
        };

        if proceeds > removed_cost {
            self.add_edge(
                REALIZED_GAIN_NODE,
                &instrument,
                proceeds - removed_cost,
                FlowKind::RealizedGain,
            );
        } else if proceeds < removed_cost {
            self.add_edge(
                &instrument,
                REALIZED_LOSS_NODE,
                removed_cost - proceeds,
                FlowKind::RealizedLoss,
            );
        }

        match record.action {
            Action::Sell if self.routing == FlowRouting::DirectTransfer => {
                if proceeds > Decimal::ZERO {
                    self.proceeds.push_back((instrument, proceeds));
                }
            }
            Action::Sell => self.add_edge(&instrument, CASH_NODE, proceeds, FlowKind::Sale),
            _ => self.add_edge(&instrument, CASH_NODE, proceeds, FlowKind::TransferOut),
        }
    }

    /* Pays a purchase with queued proceeds first, oldest sale first. Returns what is left to pay from cash. */
    fn draw_proceeds(&mut self, target: &str, value: Decimal) -> Decimal {
        let mut remainder = value;
        while remainder > Decimal::ZERO {
            let Some((source, available)) = self.proceeds.front_mut() else {
                break;
            };
            let used = remainder.min(*available);
            *available -= used;
            remainder -= used;
            let source = source.clone();
            if available.is_zero() {
                self.proceeds.pop_front();
            }
            /* Buying back the instrument that was sold nets out on the same node */
            if source != target {
                self.add_edge(&source, target, used, FlowKind::Reinvestment);
            }
        }
        return remainder;
    }

    fn apply_splits(&mut self, instrument: &str, date: NaiveDate) {
        let previous = self.last_seen.insert(instrument.to_string(), date);
        let (Some(previous), Some(series)) = (previous, self.prices.get(instrument)) else {
            return;
        };
        let factor = series.split_factor(previous, date);
        if factor != Decimal::ONE {
            if let Some(position) = self.positions.get_mut(instrument) {
                debug!(instrument, %factor, "applied stock split");
                position.quantity *= factor;
            }
        }
    }

    fn position_mut(&mut self, instrument: &str, currency: Currency) -> &mut Position {
        if !self.positions.contains_key(instrument) {
            self.position_order.push(instrument.to_string());
        }
        self.positions
            .entry(instrument.to_string())
            .or_insert_with(|| Position::new(instrument, currency))
    }

    fn add_edge(&mut self, source: &str, target: &str, value: Decimal, kind: FlowKind) {
        if value.is_zero() {
            return;
        }
        let key = (source.to_string(), target.to_string());
        match self.edge_index.get(&key) {
            Some(index) => self.edges[*index].value += value,
            None => {
                self.edge_index.insert(key, self.edges.len());
                self.edges.push(FlowEdge::new(source, target, value, kind));
            }
        }
    }

    /* Marks every open position to market with the latest close on or before the report date */
    fn value_positions(&mut self, report_date: NaiveDate) {
        for instrument in self.position_order.clone() {
            self.apply_splits(&instrument, report_date);
            let Some(position) = self.positions.get(&instrument) else {
                continue;
            };
            if !position.is_open() {
                continue;
            }
            let quantity = position.quantity;
            let cost_basis = position.cost_basis;

            let quote = self.prices.get(&instrument).and_then(|series| {
                series
                    .close_on_or_before(report_date)
                    .map(|(_, close)| (close, series.listing_currency().unwrap_or(position.currency)))
            });
            let Some((close, currency)) = quote else {
                self.warnings.push(StageWarning::NoValuationPrice {
                    instrument_id: instrument.clone(),
                    date: report_date,
                });
                continue;
            };
            let market_value = match self.rates.convert_or_prior(
                close * quantity,
                currency,
                self.reporting_currency,
                report_date,
            ) {
                Ok(conversion) => {
                    if let Some(substitution) = conversion.substitution {
                        self.warnings.push(StageWarning::RateSubstituted {
                            instrument_id: instrument.clone(),
                            error: MissingRateError {
                                date: report_date,
                                from: currency,
                                to: self.reporting_currency,
                            },
                            used: substitution.used,
                        });
                    }
                    conversion.value
                }
                Err(error) => {
                    self.warnings.push(StageWarning::ValuationRateUnavailable {
                        instrument_id: instrument.clone(),
                        error,
                    });
                    continue;
                }
            };

            if market_value > cost_basis {
                self.add_edge(
                    UNREALIZED_GAIN_NODE,
                    &instrument,
                    market_value - cost_basis,
                    FlowKind::UnrealizedGain,
                );
            } else if market_value < cost_basis {
                self.add_edge(
                    &instrument,
                    UNREALIZED_LOSS_NODE,
                    cost_basis - market_value,
                    FlowKind::UnrealizedLoss,
                );
            }
            if let Some(position) = self.positions.get_mut(&instrument) {
                position.market_value = Some(market_value);
            }
        }
    }

    pub fn finish(mut self, report_date: Option<NaiveDate>) -> FlowAggregation {
        if let Some(report_date) = report_date {
            self.value_positions(report_date);
        }
        while let Some((source, value)) = self.proceeds.pop_front() {
            self.add_edge(&source, CASH_NODE, value, FlowKind::Sale);
        }

        let edges: Vec<FlowEdge> = self
            .edges
            .into_iter()
            .filter(|edge| !edge.value.is_zero())
            .collect();

        let mut nodes: Vec<String> = Vec::new();
        if edges
            .iter()
            .any(|edge| edge.source_node == CASH_NODE || edge.target_node == CASH_NODE)
        {
            nodes.push(CASH_NODE.to_string());
        }
        for edge in &edges {
            for node in [&edge.source_node, &edge.target_node] {
                if !nodes.contains(node) {
                    nodes.push(node.clone());
                }
            }
        }

        let mut positions_by_id = self.positions;
        let positions = self
            .position_order
            .iter()
            .filter_map(|instrument| positions_by_id.remove(instrument))
            .collect();

        FlowAggregation {
            diagram: FlowDiagram {
                reporting_currency: self.reporting_currency,
                nodes,
                edges,
                positions,
            },
            warnings: self.warnings,
        }
    }
}

/* Orders the ledger for the walk: by date, then acquisitions before income and fees before disposals */
pub fn processing_order(ledger: &Ledger) -> Vec<&LedgerEntry> {
    let mut entries: Vec<&LedgerEntry> = ledger.entries().iter().collect();
    entries.sort_by_key(|entry| (entry.record.timestamp, entry.record.action.same_day_priority()));
    entries
}

/* Walks the whole ledger up to the report date as a single time bucket: edges are summed per
(source, target) over every entry, per instrument. Open positions are valued at the report date. */
pub fn aggregate_flows(
    ledger: &Ledger,
    prices: &PriceBook,
    rates: &RateTable,
    options: &FlowOptions,
) -> FlowAggregation {
    let report_date = options.report_date.or_else(|| ledger.last_date());
    let mut manager = FlowManager::new(prices, rates, ledger.reporting_currency, options.routing);

    let mut skipped = 0;
    for entry in processing_order(ledger) {
        if report_date.is_some_and(|date| entry.record.timestamp > date) {
            skipped += 1;
            continue;
        }
        manager.process(entry);
    }
    if skipped > 0 {
        debug!(skipped, "ignored entries after the report date");
    }
    manager.finish(report_date)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::structs::{FundingSource, PriceBar, PriceSeries, TransactionRecord};

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    fn entry(id: &str, d: u32, action: Action, quantity: Decimal, price: Decimal) -> LedgerEntry {
        LedgerEntry {
            record: TransactionRecord {
                instrument_id: id.to_string(),
                timestamp: day(d),
                action,
                quantity,
                unit_price: price,
                currency: Currency::Usd,
                amount: quantity * price,
                funding_source: FundingSource::Funds,
                record_id: None,
                commission_of: None,
            },
            converted_amount: quantity * price,
            substitution: None,
        }
    }

    fn ledger(entries: Vec<LedgerEntry>) -> Ledger {
        Ledger::from_sorted(Currency::Usd, entries)
    }

    fn book(quotes: &[(&str, u32, Decimal)]) -> PriceBook {
        let mut book = PriceBook::new();
        for (id, d, close) in quotes {
            book.entry(id.to_string())
                .or_insert_with(|| PriceSeries::new(id, Some("USD".to_string())))
                .insert(
                    day(*d),
                    PriceBar {
                        close: *close,
                        stock_splits: dec!(0),
                    },
                );
        }
        book
    }

    fn assert_conservation(diagram: &FlowDiagram) {
        for position in &diagram.positions {
            assert_eq!(
                diagram.net_flow(&position.instrument_id),
                position.net_value(),
                "conservation broken for {}",
                position.instrument_id
            );
        }
    }

    #[test]
    fn test_same_day_buys_before_sell() {
        let ledger = ledger(vec![
            entry("AAPL", 3, Action::Sell, dec!(30), dec!(10)),
            entry("AAPL", 3, Action::Buy, dec!(50), dec!(10)),
            entry("AAPL", 3, Action::Buy, dec!(50), dec!(10)),
        ]);
        let result = aggregate_flows(&ledger, &book(&[]), &RateTable::new(), &FlowOptions::default());

        assert!(result
            .warnings
            .iter()
            .all(|w| !matches!(w, StageWarning::InsufficientPosition(_))));
        let position = result.diagram.position("AAPL").unwrap();
        assert_eq!(position.quantity, dec!(70));
        assert_eq!(position.cost_basis, dec!(700));
        assert_eq!(result.diagram.edge(CASH_NODE, "AAPL").unwrap().value, dec!(1000));
        assert_eq!(result.diagram.edge("AAPL", CASH_NODE).unwrap().value, dec!(300));
        assert_eq!(result.diagram.nodes[0], CASH_NODE);
    }

    #[test]
    fn test_oversell_is_clipped() {
        let ledger = ledger(vec![
            entry("AAPL", 3, Action::Buy, dec!(20), dec!(10)),
            entry("AAPL", 4, Action::Sell, dec!(50), dec!(12)),
        ]);
        let result = aggregate_flows(&ledger, &book(&[]), &RateTable::new(), &FlowOptions::default());

        let flagged: Vec<&InsufficientPositionError> = result
            .warnings
            .iter()
            .filter_map(|w| match w {
                StageWarning::InsufficientPosition(error) => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].requested, dec!(50));
        assert_eq!(flagged[0].held, dec!(20));

        let diagram = &result.diagram;
        assert_eq!(diagram.edge("AAPL", CASH_NODE).unwrap().value, dec!(240));
        assert_eq!(diagram.edge(REALIZED_GAIN_NODE, "AAPL").unwrap().value, dec!(40));
        assert_eq!(diagram.position("AAPL").unwrap().quantity, dec!(0));
        assert_conservation(diagram);
    }

    #[test]
    fn test_conservation_with_valuation() {
        let ledger = ledger(vec![
            entry("AAPL", 2, Action::Buy, dec!(10), dec!(100)),
            entry("MSFT", 2, Action::Buy, dec!(4), dec!(250)),
            entry("AAPL", 5, Action::Sell, dec!(3), dec!(90)),
            entry("AAPL", 6, Action::Dividend, dec!(1), dec!(5)),
            entry("MSFT", 6, Action::Fee, dec!(1), dec!(2)),
            entry("AAPL", 9, Action::Buy, dec!(1), dec!(95)),
        ]);
        let prices = book(&[("AAPL", 9, dec!(110)), ("MSFT", 8, dec!(240))]);
        let result = aggregate_flows(&ledger, &prices, &RateTable::new(), &FlowOptions::default());
        let diagram = &result.diagram;

        assert!(result.warnings.is_empty());
        assert_conservation(diagram);

        assert_eq!(diagram.edge("AAPL", REALIZED_LOSS_NODE).unwrap().value, dec!(30));
        assert_eq!(diagram.position("AAPL").unwrap().market_value, Some(dec!(880)));
        assert_eq!(diagram.edge(UNREALIZED_GAIN_NODE, "AAPL").unwrap().value, dec!(85));
        assert_eq!(diagram.position("MSFT").unwrap().market_value, Some(dec!(960)));
        assert_eq!(diagram.edge("MSFT", UNREALIZED_LOSS_NODE).unwrap().value, dec!(40));

        let dividend = diagram.edge("AAPL", DIVIDENDS_NODE).unwrap();
        assert_eq!(dividend.kind, FlowKind::Dividend);
        assert_eq!(dividend.value, dec!(5));
        assert_eq!(diagram.edge("MSFT", FEES_NODE).unwrap().kind, FlowKind::Fee);
    }

    #[test]
    fn test_unpriced_position_is_carried_at_cost() {
        let ledger = ledger(vec![entry("XYZ", 2, Action::Buy, dec!(2), dec!(50))]);
        let result = aggregate_flows(&ledger, &book(&[]), &RateTable::new(), &FlowOptions::default());

        assert!(matches!(
            result.warnings[0],
            StageWarning::NoValuationPrice { .. }
        ));
        let position = result.diagram.position("XYZ").unwrap();
        assert_eq!(position.market_value, None);
        assert_eq!(position.net_value(), dec!(100));
        assert_conservation(&result.diagram);
    }

    fn eur_listing(close: Decimal, d: u32) -> PriceBook {
        let mut series = PriceSeries::new("SAP.DE", Some("EUR".to_string()));
        series.insert(
            day(d),
            PriceBar {
                close,
                stock_splits: dec!(0),
            },
        );
        let mut book = PriceBook::new();
        book.insert("SAP.DE".to_string(), series);
        book
    }

    #[test]
    fn test_valuation_with_an_older_rate_is_reported() {
        let ledger = ledger(vec![entry("SAP.DE", 2, Action::Buy, dec!(5), dec!(110))]);
        let mut rates = RateTable::new();
        rates.insert(day(2), dec!(1.1));
        let options = FlowOptions {
            report_date: Some(day(5)),
            ..FlowOptions::default()
        };
        let result = aggregate_flows(&ledger, &eur_listing(dec!(100), 4), &rates, &options);

        assert_eq!(result.warnings.len(), 1);
        assert!(matches!(
            &result.warnings[0],
            StageWarning::RateSubstituted { instrument_id, used, .. }
                if instrument_id == "SAP.DE" && *used == day(2)
        ));
        let position = result.diagram.position("SAP.DE").unwrap();
        assert_eq!(position.market_value, Some(dec!(550)));
        assert!(result.diagram.edge(UNREALIZED_GAIN_NODE, "SAP.DE").is_none());
        assert_conservation(&result.diagram);
    }

    #[test]
    fn test_valuation_without_rate_is_carried_at_cost() {
        let ledger = ledger(vec![entry("SAP.DE", 2, Action::Buy, dec!(5), dec!(110))]);
        let result = aggregate_flows(
            &ledger,
            &eur_listing(dec!(100), 2),
            &RateTable::new(),
            &FlowOptions::default(),
        );

        assert!(matches!(
            result.warnings[0],
            StageWarning::ValuationRateUnavailable { .. }
        ));
        assert!(result.warnings[0].to_string().contains("carried at cost"));
        let position = result.diagram.position("SAP.DE").unwrap();
        assert_eq!(position.market_value, None);
        assert_eq!(position.net_value(), dec!(550));
        assert_conservation(&result.diagram);
    }

    #[test]
    fn test_compensation_source() {
        let mut vest = entry("GOOG", 2, Action::Buy, dec!(5), dec!(100));
        vest.record.funding_source = FundingSource::Rsu;
        let result = aggregate_flows(
            &ledger(vec![vest]),
            &book(&[("GOOG", 2, dec!(100))]),
            &RateTable::new(),
            &FlowOptions::default(),
        );
        let edge = result.diagram.edge("RSU Compensation", "GOOG").unwrap();
        assert_eq!(edge.kind, FlowKind::Compensation);
        assert_eq!(edge.value, dec!(500));
        assert!(result.diagram.edge(CASH_NODE, "GOOG").is_none());
    }

    #[test]
    fn test_direct_transfer_reinvestment() {
        let ledger = ledger(vec![
            entry("AAPL", 2, Action::Buy, dec!(10), dec!(100)),
            entry("AAPL", 3, Action::Sell, dec!(10), dec!(100)),
            entry("MSFT", 4, Action::Buy, dec!(2), dec!(300)),
            entry("GOOG", 5, Action::Buy, dec!(10), dec!(50)),
        ]);
        let prices = book(&[("MSFT", 5, dec!(300)), ("GOOG", 5, dec!(50))]);
        let options = FlowOptions {
            routing: FlowRouting::DirectTransfer,
            report_date: None,
        };
        let result = aggregate_flows(&ledger, &prices, &RateTable::new(), &options);
        let diagram = &result.diagram;

        let reinvested = diagram.edge("AAPL", "MSFT").unwrap();
        assert_eq!(reinvested.kind, FlowKind::Reinvestment);
        assert_eq!(reinvested.value, dec!(600));
        assert_eq!(diagram.edge("AAPL", "GOOG").unwrap().value, dec!(400));
        assert_eq!(diagram.edge(CASH_NODE, "GOOG").unwrap().value, dec!(100));
        assert!(diagram.edge("AAPL", CASH_NODE).is_none());
        assert!(diagram.edge(CASH_NODE, "MSFT").is_none());
        assert_conservation(diagram);
    }

    #[test]
    fn test_unallocated_proceeds_go_to_cash() {
        let ledger = ledger(vec![
            entry("AAPL", 2, Action::Buy, dec!(10), dec!(100)),
            entry("AAPL", 3, Action::Sell, dec!(5), dec!(100)),
        ]);
        let options = FlowOptions {
            routing: FlowRouting::DirectTransfer,
            report_date: None,
        };
        let result = aggregate_flows(
            &ledger,
            &book(&[("AAPL", 3, dec!(100))]),
            &RateTable::new(),
            &options,
        );
        let edge = result.diagram.edge("AAPL", CASH_NODE).unwrap();
        assert_eq!(edge.value, dec!(500));
        assert_eq!(edge.kind, FlowKind::Sale);
    }

    #[test]
    fn test_split_adjusts_quantity() {
        let ledger = ledger(vec![
            entry("NVDA", 2, Action::Buy, dec!(1), dec!(400)),
            entry("NVDA", 8, Action::Sell, dec!(2), dec!(110)),
        ]);
        let mut prices = book(&[("NVDA", 9, dec!(105))]);
        if let Some(series) = prices.get_mut("NVDA") {
            series.insert(
                day(6),
                PriceBar {
                    close: dec!(100),
                    stock_splits: dec!(4),
                },
            );
        }
        let result = aggregate_flows(&ledger, &prices, &RateTable::new(), &FlowOptions::default());

        assert!(result.warnings.is_empty());
        let position = result.diagram.position("NVDA").unwrap();
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.cost_basis, dec!(200));
        assert_conservation(&result.diagram);
    }
}
