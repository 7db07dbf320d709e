//! Search labels and the per-run arena holding them.
//!
//! Labels link to their predecessor by index, so a path is recovered by
//! walking `prev` from any label back to the origin label.

use std::ops::Index;

use crate::measure::Measures;
use crate::modes::{ModeId, ModeSet};
use crate::network::{EdgeId, NodeId};
use crate::schedule::{RouteIndex, TripIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub prev: Option<LabelId>,
    pub node: NodeId,
    // None for origin labels.
    pub edge: Option<EdgeId>,
    pub available_modes: ModeSet,
    pub used_mode: Option<ModeId>,
    pub line: Option<RouteIndex>,
    pub trip: Option<TripIndex>,
    // Cumulative meters and seconds since the origin.
    pub distance: f64,
    pub tt: f64,
    // Seconds added by the last hop, waiting included.
    pub hop_tt: f64,
    // Seconds waited before the last hop's departure.
    pub interchange_tt: f64,
    // The last hop ran along the twin of the edge it was asked for.
    pub was_opposite: bool,
    pub boardings: u32,
    pub measures: Measures,
    pub first: LabelId,
}

impl Label {
    pub fn transfers(&self) -> u32 {
        self.boardings.saturating_sub(1)
    }

    pub fn is_origin(&self) -> bool {
        self.prev.is_none()
    }
}

#[derive(Default)]
pub struct LabelStore {
    labels: Vec<Label>,
}

impl LabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { labels: Vec::with_capacity(capacity) }
    }

    /// Creates an origin label: no predecessor, zero time and distance.
    pub fn origin(&mut self, node: NodeId, modes: ModeSet, measures: Measures) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(Label {
            prev: None,
            node,
            edge: None,
            available_modes: modes,
            used_mode: None,
            line: None,
            trip: None,
            distance: 0.,
            tt: 0.,
            hop_tt: 0.,
            interchange_tt: 0.,
            was_opposite: false,
            boardings: 0,
            measures,
            first: id,
        });
        id
    }

    /// Stores a label extending another one. Its origin is taken from the predecessor.
    pub fn push(&mut self, mut label: Label) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        label.first = match label.prev {
            Some(prev) => self.labels[prev.0 as usize].first,
            None => id,
        };
        self.labels.push(label);
        id
    }

    pub fn get(&self, id: LabelId) -> Option<&Label> {
        self.labels.get(id.0 as usize)
    }

    pub fn len(&self) -> usize { self.labels.len() }

    pub fn is_empty(&self) -> bool { self.labels.is_empty() }

    /// The label and its predecessors, ending with the origin label.
    pub fn chain(&self, id: LabelId) -> impl Iterator<Item = LabelId> + '_ {
        std::iter::successors(Some(id), |&current| self[current].prev)
    }

    /// Number of hops between the label and its origin.
    pub fn depth(&self, id: LabelId) -> usize {
        self.chain(id).count() - 1
    }

    pub fn origin_of(&self, id: LabelId) -> LabelId {
        self[id].first
    }

    /// Whether any hop on the path to `id` rode a transit line.
    pub fn uses_transit(&self, id: LabelId) -> bool {
        self.chain(id).any(|label| self[label].line.is_some())
    }
}

impl Index<LabelId> for LabelStore {
    type Output = Label;

    fn index(&self, id: LabelId) -> &Label {
        &self.labels[id.0 as usize]
    }
}
