//! Ordering strategies for the label-setting search and the per-label measures
//! they accumulate.

use std::cmp::Ordering;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::label::Label;
use crate::network::Edge;
use crate::schedule::RouteIndex;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum WeightError {
    #[error("Unknown weight function '{0}'.")]
    UnknownFunction(String),
    #[error("Weight function '{name}' takes {expected} parameter(s), got {got}.")]
    ParameterCount { name: String, expected: usize, got: usize },
}

/// Auxiliary values a label carries besides time and distance.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Measures {
    #[default]
    None,
    Price {
        price: f64,
        // Sorted; each line's boarding fare is paid once.
        lines: Vec<RouteIndex>,
    },
}

impl Measures {
    pub fn price(&self) -> Option<f64> {
        match self {
            Measures::Price { price, .. } => Some(*price),
            Measures::None => None,
        }
    }
}

/// Priority of a label in the search queue; compared lexicographically.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SortKey(pub f64, pub f64);

impl SortKey {
    pub fn cmp(&self, other: &SortKey) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.total_cmp(&other.1))
    }
}

/// The closed set of label orderings.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WeightFunction {
    #[default]
    TravelTime,
    PriceTravelTime,
    InterchangesTravelTime,
    MaxInterchangesTravelTime { max: u32 },
    ExpInterchangeTravelTime { factor: f64, base: f64 },
}

impl WeightFunction {
    pub const NAMES: [&'static str; 5] = ["tt", "price_tt", "interchanges_tt", "max_interchanges_tt", "exp_interchange_tt"];

    /// Selects a function by name; `params` must match its parameter count.
    pub fn from_name(name: &str, params: &[f64]) -> Result<Self, WeightError> {
        let expected = Self::parameter_count_of(name).ok_or_else(|| WeightError::UnknownFunction(name.to_owned()))?;
        if params.len() != expected {
            return Err(WeightError::ParameterCount { name: name.to_owned(), expected, got: params.len() });
        }
        Ok(match name {
            "tt" => WeightFunction::TravelTime,
            "price_tt" => WeightFunction::PriceTravelTime,
            "interchanges_tt" => WeightFunction::InterchangesTravelTime,
            "max_interchanges_tt" => WeightFunction::MaxInterchangesTravelTime { max: params[0].max(0.) as u32 },
            _ => WeightFunction::ExpInterchangeTravelTime { factor: params[0], base: params[1] },
        })
    }

    fn parameter_count_of(name: &str) -> Option<usize> {
        match name {
            "tt" | "price_tt" | "interchanges_tt" => Some(0),
            "max_interchanges_tt" => Some(1),
            "exp_interchange_tt" => Some(2),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WeightFunction::TravelTime => "tt",
            WeightFunction::PriceTravelTime => "price_tt",
            WeightFunction::InterchangesTravelTime => "interchanges_tt",
            WeightFunction::MaxInterchangesTravelTime { .. } => "max_interchanges_tt",
            WeightFunction::ExpInterchangeTravelTime { .. } => "exp_interchange_tt",
        }
    }

    pub fn parameter_count(&self) -> usize {
        Self::parameter_count_of(self.name()).unwrap_or(0)
    }

    pub fn key(&self, label: &Label) -> SortKey {
        match *self {
            WeightFunction::TravelTime | WeightFunction::MaxInterchangesTravelTime { .. } => SortKey(label.tt, 0.),
            WeightFunction::PriceTravelTime => SortKey(label.measures.price().unwrap_or(0.), label.tt),
            WeightFunction::InterchangesTravelTime => SortKey(label.transfers() as f64, label.tt),
            WeightFunction::ExpInterchangeTravelTime { factor, base } => {
                let scale = 1. + factor * base.powi(label.transfers() as i32) - factor;
                SortKey(label.tt * scale, label.tt)
            }
        }
    }

    pub fn compare(&self, a: &Label, b: &Label) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }

    /// Whether a label may enter the search at all.
    pub fn accepts(&self, label: &Label) -> bool {
        match *self {
            WeightFunction::MaxInterchangesTravelTime { max } => label.transfers() <= max,
            _ => true,
        }
    }

    /// Measures of the empty path at an origin.
    pub fn initial_measures(&self) -> Measures {
        match self {
            WeightFunction::PriceTravelTime => Measures::Price { price: 0., lines: Vec::new() },
            _ => Measures::None,
        }
    }

    /// Measures after extending `prev` over `edge` for `distance` meters on `line`.
    pub fn build_measures(&self, prev: &Measures, edge: &Edge, distance: f64, line: Option<RouteIndex>) -> Measures {
        match prev {
            Measures::Price { price, lines } => {
                let hop = edge.price.map(|f| f.price(distance, line, lines)).unwrap_or(0.);
                let mut lines = lines.clone();
                if let Some(line) = line {
                    if let Err(at) = lines.binary_search(&line) {
                        lines.insert(at, line);
                    }
                }
                Measures::Price { price: price + hop, lines }
            }
            Measures::None => Measures::None,
        }
    }
}
