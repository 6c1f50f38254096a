//! Steer points per dollar
//!
//! Each Steer strategy whose name carries a rewarded pool pair earns that
//! pair's rate, weighted by the share of vault debt it holds.

use crate::types::YearnVault;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SteerPointsCalculator {
    /// Lowercased pool pair -> points per dollar, positive rates only, in configured order
    rates: Vec<(String, f64)>,
}

impl SteerPointsCalculator {
    pub fn new(rates: &[(String, f64)]) -> Self {
        Self {
            rates: rates
                .iter()
                .filter(|(_, rate)| rate.is_finite() && *rate > 0.0)
                .map(|(pair, rate)| (pair.to_lowercase(), *rate))
                .collect(),
        }
    }

    fn rate_for(&self, strategy_name: &str) -> Option<f64> {
        let name = strategy_name.to_lowercase();
        self.rates
            .iter()
            .find(|(pair, _)| name.contains(pair.as_str()))
            .map(|(_, rate)| *rate)
    }

    pub fn calculate_for_vault(&self, vault: &YearnVault) -> f64 {
        vault
            .strategies
            .iter()
            .filter(|s| s.total_debt() > 0.0)
            .filter_map(|s| self.rate_for(&s.name).map(|rate| rate * s.debt_fraction()))
            .sum()
    }
}
