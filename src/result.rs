//! What a finished search exposes: best labels per node and per edge,
//! arrivals at points attached to edges, and reconstructed paths.

use std::fmt::{self, Display};

use crate::label::{Label, LabelId, LabelStore};
use crate::mapper::Attachment;
use crate::modes::{ModeId, ModeRegistry};
use crate::network::{Edge, EdgeId, Network, NodeId};
use crate::router::{road_mode, Origin};
use crate::schedule::{RouteIndex, Schedule, Timestamp};
use crate::utils;

/// Reaching a point on a destination edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arrival {
    // The label the final partial hop starts from.
    pub label: LabelId,
    pub distance: f64,
    pub tt: f64,
    pub was_opposite: bool,
    pub mode: Option<ModeId>,
}

/// One hop of a reconstructed path.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub edge: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    // The transit line's name, or the short name of the mode used.
    pub line_mode_id: String,
    pub mode: Option<ModeId>,
    pub line: Option<RouteIndex>,
    pub distance: f64,
    pub tt: f64,
    pub interchange_tt: f64,
    pub was_opposite: bool,
}

impl Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} to {}: {:.0}m in {}",
            self.line_mode_id,
            self.from.0,
            self.to.0,
            self.distance,
            utils::get_time_str(self.tt.round() as Timestamp)
        )?;
        if self.interchange_tt > 0. {
            write!(f, " (waiting {})", utils::get_time_str(self.interchange_tt.round() as Timestamp))?;
        }
        Ok(())
    }
}

pub struct SearchResult<'a> {
    network: &'a Network,
    registry: &'a ModeRegistry,
    schedule: Option<&'a Schedule>,
    store: LabelStore,
    best: Vec<Option<LabelId>>,
    origin: Origin,
    // Root label of an edge origin.
    root: Option<LabelId>,
    start_time: Timestamp,
}

impl<'a> SearchResult<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        network: &'a Network,
        registry: &'a ModeRegistry,
        schedule: Option<&'a Schedule>,
        store: LabelStore,
        best: Vec<Option<LabelId>>,
        origin: Origin,
        root: Option<LabelId>,
        start_time: Timestamp,
    ) -> Self {
        Self { network, registry, schedule, store, best, origin, root, start_time }
    }

    pub fn labels(&self) -> &LabelStore { &self.store }

    pub fn origin(&self) -> Origin { self.origin }

    pub fn start_time(&self) -> Timestamp { self.start_time }

    pub fn node_best(&self, node: NodeId) -> Option<LabelId> {
        self.best.get(node.0 as usize).copied().flatten()
    }

    /// The best label from which `edge` can be entered.
    pub fn edge_best(&self, edge: EdgeId) -> Option<LabelId> {
        self.node_best(self.network.edge(edge).from)
    }

    /// The label that reached `edge`'s end by traversing it, if that is the best label there.
    pub fn best_for_edge(&self, edge: EdgeId) -> Option<LabelId> {
        self.node_best(self.network.edge(edge).to).filter(|&id| self.store[id].edge == Some(edge))
    }

    /// Nodes reached by the search with their best labels.
    pub fn reached(&self) -> impl Iterator<Item = (NodeId, LabelId)> + '_ {
        self.best
            .iter()
            .enumerate()
            .filter_map(|(node, best)| best.map(|id| (NodeId(node as u32), id)))
    }

    /// Fastest arrival at a point on an edge, entering the edge or its twin
    /// from their start nodes, or moving directly along it from an origin on
    /// the same edge pair. `None` when unreachable.
    pub fn arrival(&self, destination: &Attachment) -> Option<Arrival> {
        let edge = self.network.edge(destination.edge);
        let offset = destination.offset.clamp(0., edge.length);
        let twin = edge.opposite.map(|twin| self.network.edge(twin)).filter(|twin| twin.is_active());
        let along_twin = |twin: &Edge| (edge.length - offset) * twin.length / edge.length.max(f64::MIN_POSITIVE);

        let mut candidates = Vec::with_capacity(4);
        if let Some(id) = self.node_best(edge.from) {
            candidates.push(self.finish(id, edge, offset, false));
        }
        if let Some(twin) = twin {
            if let Some(id) = self.node_best(twin.from) {
                candidates.push(self.finish(id, twin, along_twin(twin), true));
            }
        }
        if let (Origin::Edge(origin), Some(root)) = (self.origin, self.root) {
            // Origin position in this edge's own offsets.
            let start = if origin.edge == edge.id {
                Some(origin.offset.clamp(0., edge.length))
            } else {
                twin.filter(|twin| twin.id == origin.edge).map(|twin| {
                    let behind = (twin.length - origin.offset.clamp(0., twin.length)).max(0.);
                    behind * edge.length / twin.length.max(f64::MIN_POSITIVE)
                })
            };
            match (start, twin) {
                (Some(start), _) if start <= offset => candidates.push(self.finish(root, edge, offset - start, false)),
                (Some(start), Some(twin)) => {
                    candidates.push(self.finish(root, twin, (start - offset) * twin.length / edge.length.max(f64::MIN_POSITIVE), true))
                }
                _ => {}
            }
        }
        candidates.into_iter().flatten().min_by(|a, b| a.tt.total_cmp(&b.tt))
    }

    /// One entry per destination; unreachable ones are `None`.
    pub fn arrivals(&self, destinations: &[Attachment]) -> Vec<Option<Arrival>> {
        destinations.iter().map(|destination| self.arrival(destination)).collect()
    }

    // Continues from a label for `distance` meters along a road edge.
    fn finish(&self, id: LabelId, edge: &Edge, distance: f64, was_opposite: bool) -> Option<Arrival> {
        let label = &self.store[id];
        if edge.is_transit() {
            return None;
        }
        if distance <= 0. {
            return Some(Arrival { label: id, distance: label.distance, tt: label.tt, was_opposite, mode: label.used_mode });
        }
        let available = label.available_modes & edge.modes;
        let mode = road_mode(self.registry, label, available, edge.speed)?;
        let speed = self.registry.effective_speed(mode, edge.speed);
        if speed <= 0. {
            return None;
        }
        Some(Arrival {
            label: id,
            distance: label.distance + distance,
            tt: label.tt + distance / speed,
            was_opposite,
            mode: Some(mode),
        })
    }

    /// Whether the path to `id` rides at least one transit line.
    pub fn used_transit(&self, id: LabelId) -> bool {
        self.store.uses_transit(id)
    }

    pub fn line_mode_id(&self, label: &Label) -> String {
        match (label.line, label.used_mode) {
            (Some(line), _) => match self.schedule {
                Some(schedule) => schedule.route(line).line().to_owned(),
                None => line.to_string(),
            },
            (None, Some(mode)) => self.registry.get(mode).mml.to_string(),
            (None, None) => String::new(),
        }
    }

    /// The hops from the origin to `id`, in travel order.
    pub fn path(&self, id: LabelId) -> Vec<Segment> {
        let mut segments = Vec::new();
        for current in self.store.chain(id) {
            let label = &self.store[current];
            let (Some(edge), Some(prev)) = (label.edge, label.prev) else {
                continue;
            };
            let prev = &self.store[prev];
            segments.push(Segment {
                edge,
                from: self.network.edge(edge).from,
                to: label.node,
                line_mode_id: self.line_mode_id(label),
                mode: label.used_mode,
                line: label.line,
                distance: label.distance - prev.distance,
                tt: label.hop_tt,
                interchange_tt: label.interchange_tt,
                was_opposite: label.was_opposite,
            });
        }
        segments.reverse();
        segments
    }
}
