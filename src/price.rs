use crate::schedule::RouteIndex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Monetary price of traversing an edge.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PriceFunction {
    pub per_meter: f64,
    // Charged once per line; boarding a line already paid for is free.
    pub boarding_fare: f64,
}

impl PriceFunction {
    pub fn fare(boarding_fare: f64) -> Self {
        Self { per_meter: 0., boarding_fare }
    }

    /// Price of one hop of `distance` on `line`, given the sorted lines already paid for.
    pub fn price(&self, distance: f64, line: Option<RouteIndex>, paid_lines: &[RouteIndex]) -> f64 {
        let fare = match line {
            Some(line) if paid_lines.binary_search(&line).is_err() => self.boarding_fare,
            _ => 0.,
        };
        self.per_meter * distance + fare
    }
}
