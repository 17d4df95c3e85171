//! Common types used throughout the application

use serde::{Deserialize, Serialize};

/// Session actions, in the order a session normally runs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    CreateTable,
    ExtendTable,
    Simulate,
    Distribute,
    Launch,
    Sell,
    Reclaim,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::CreateTable => "create-table",
            ActionKind::ExtendTable => "extend-table",
            ActionKind::Simulate => "simulate",
            ActionKind::Distribute => "distribute",
            ActionKind::Launch => "launch",
            ActionKind::Sell => "sell",
            ActionKind::Reclaim => "reclaim",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Token metadata passed to the create instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

/// Supply figure the sell guardrail is evaluated against
///
/// Allocations come from a simulated curve while the chain may have moved
/// since; the caller picks which one bounds the sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", content = "amount", rename_all = "kebab-case")]
pub enum SupplyBasis {
    /// Supply from the off-chain curve simulation
    Simulated(u64),
    /// Supply read from the mint at action time
    Live(u64),
}

impl SupplyBasis {
    pub fn amount(&self) -> u64 {
        match self {
            SupplyBasis::Simulated(a) | SupplyBasis::Live(a) => *a,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SupplyBasis::Simulated(_) => "simulated",
            SupplyBasis::Live(_) => "live",
        }
    }
}

/// Which supply figure to use, before it is resolved to an amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupplySource {
    Simulated,
    #[default]
    Live,
}

impl std::str::FromStr for SupplySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" => Ok(SupplySource::Simulated),
            "live" => Ok(SupplySource::Live),
            other => Err(format!("unknown supply source '{other}', expected 'simulated' or 'live'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_basis_amount_and_label() {
        assert_eq!(SupplyBasis::Live(5).amount(), 5);
        assert_eq!(SupplyBasis::Simulated(7).label(), "simulated");
    }

    #[test]
    fn test_supply_source_parse() {
        assert_eq!("LIVE".parse::<SupplySource>().unwrap(), SupplySource::Live);
        assert_eq!("simulated".parse::<SupplySource>().unwrap(), SupplySource::Simulated);
        assert!("stale".parse::<SupplySource>().is_err());
    }

    #[test]
    fn test_action_display() {
        assert_eq!(ActionKind::ExtendTable.to_string(), "extend-table");
    }
}
