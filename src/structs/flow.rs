use std::fmt;

use hashbrown::HashMap;
use rust_decimal::Decimal;

use super::{Currency, FundingSource};

pub const CASH_NODE: &str = "Cash";
pub const DIVIDENDS_NODE: &str = "Dividends";
pub const FEES_NODE: &str = "Fees";
pub const REALIZED_GAIN_NODE: &str = "Realized Gain";
pub const REALIZED_LOSS_NODE: &str = "Realized Loss";
pub const UNREALIZED_GAIN_NODE: &str = "Unrealized Gain";
pub const UNREALIZED_LOSS_NODE: &str = "Unrealized Loss";

/* What an edge represents. Dividends and fees have their own target nodes so summing edges per
(source, target) never mixes them with a sale. Sales and transfers out share the pair instrument -> Cash,
the summed edge keeps the kind of its first contribution. */
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
pub enum FlowKind {
    Purchase,
    TransferIn,
    Compensation,
    Reinvestment,
    Sale,
    TransferOut,
    Dividend,
    Fee,
    RealizedGain,
    RealizedLoss,
    UnrealizedGain,
    UnrealizedLoss,
}

impl FlowKind {
    /* Dividends and fees are income and expense annotations: they leave the holding untouched */
    pub fn moves_capital(&self) -> bool {
        !matches!(self, FlowKind::Dividend | FlowKind::Fee)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlowKind::Purchase => "Purchase",
            FlowKind::TransferIn => "Transfer in",
            FlowKind::Compensation => "Compensation",
            FlowKind::Reinvestment => "Reinvestment",
            FlowKind::Sale => "Sale",
            FlowKind::TransferOut => "Transfer out",
            FlowKind::Dividend => "Dividend",
            FlowKind::Fee => "Fee",
            FlowKind::RealizedGain => "Realized gain",
            FlowKind::RealizedLoss => "Realized loss",
            FlowKind::UnrealizedGain => "Unrealized gain",
            FlowKind::UnrealizedLoss => "Unrealized loss",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/* Value is in the reporting currency */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEdge {
    pub source_node: String,
    pub target_node: String,
    pub value: Decimal,
    pub kind: FlowKind,
}

impl FlowEdge {
    pub fn new(source: &str, target: &str, value: Decimal, kind: FlowKind) -> Self {
        Self {
            source_node: source.to_string(),
            target_node: target.to_string(),
            value,
            kind,
        }
    }
}

pub fn compensation_node(source: FundingSource) -> String {
    format!("{} Compensation", source.code())
}

/* Running holding of one instrument. Cost basis is the average cost in the reporting currency. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub instrument_id: String,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub currency: Currency, // Native currency of the last acquisition
    pub market_value: Option<Decimal>, // Set when the position is valued at the report date
}

impl Position {
    pub fn new(instrument_id: &str, currency: Currency) -> Self {
        Self {
            instrument_id: instrument_id.to_string(),
            quantity: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            currency,
            market_value: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /* Market value when priced, cost basis otherwise */
    pub fn net_value(&self) -> Decimal {
        self.market_value.unwrap_or(self.cost_basis)
    }
}

/* Output of the aggregation: one edge per node pair, the final positions and the nodes in drawing order */
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDiagram {
    pub reporting_currency: Currency,
    pub nodes: Vec<String>,
    pub edges: Vec<FlowEdge>,
    pub positions: Vec<Position>,
}

impl FlowDiagram {
    /* Sum of inbound minus outbound capital edges of a node */
    pub fn net_flow(&self, node: &str) -> Decimal {
        self.edges
            .iter()
            .filter(|edge| edge.kind.moves_capital())
            .fold(Decimal::ZERO, |acc, edge| {
                if edge.target_node == node {
                    acc + edge.value
                } else if edge.source_node == node {
                    acc - edge.value
                } else {
                    acc
                }
            })
    }

    pub fn position(&self, instrument_id: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|position| position.instrument_id == instrument_id)
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&FlowEdge> {
        self.edges
            .iter()
            .find(|edge| edge.source_node == source && edge.target_node == target)
    }

    pub fn node_index(&self) -> HashMap<&str, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.as_str(), index))
            .collect()
    }
}
