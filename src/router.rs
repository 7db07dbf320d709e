//! Time-dependent multimodal label-setting search.
//!
//! Each node keeps the best label known for it; a label is enqueued only when
//! it improves on that, and queue entries that were superseded in the meantime
//! are skipped when popped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::label::{Label, LabelId, LabelStore};
use crate::mapper::Attachment;
use crate::measure::{SortKey, WeightFunction};
use crate::modes::{EntrainmentMap, ModeId, ModeRegistry, ModeSet};
use crate::network::{Edge, EdgeId, Network, NodeId};
use crate::result::SearchResult;
use crate::schedule::{earliest_departure, Connection, Schedule, Timestamp};

/// Where a search starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Origin {
    Node(NodeId),
    // A point on an edge; both directions of the edge pair are usable.
    Edge(Attachment),
}

/// Limits beyond which labels are dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cutoff {
    pub max_time: Option<f64>,
    pub max_distance: Option<f64>,
    pub max_transfers: Option<u32>,
}

impl Cutoff {
    pub fn exceeded_by(&self, label: &Label) -> bool {
        self.max_time.is_some_and(|max| label.tt > max)
            || self.max_distance.is_some_and(|max| label.distance > max)
            || self.max_transfers.is_some_and(|max| label.transfers() > max)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Termination {
    #[default]
    Exhaust,
    // Stop once every destination edge can no longer improve.
    AllDestinations,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchOptions {
    pub start_time: Timestamp,
    pub modes: ModeSet,
    pub weight: WeightFunction,
    pub termination: Termination,
    pub cutoff: Cutoff,
    // Used when changing lines at a stop without a recorded interchange time.
    pub default_interchange_time: Timestamp,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            start_time: 0,
            // foot in the default registry
            modes: ModeSet::of(0),
            weight: WeightFunction::TravelTime,
            termination: Termination::Exhaust,
            cutoff: Cutoff::default(),
            default_interchange_time: 0,
        }
    }
}

struct QueueEntry {
    key: SortKey,
    seq: u32,
    label: LabelId,
}

// Reversed so that the max-heap pops the smallest key; ties go to the older entry.
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

/// Individual mode used to continue from `label` over an edge allowing `available`.
///
/// The current mode is kept while possible; otherwise the fastest one is picked.
pub(crate) fn road_mode(registry: &ModeRegistry, label: &Label, available: ModeSet, edge_speed: f64) -> Option<ModeId> {
    match label.used_mode {
        Some(mode)
            if available.contains(mode)
                && registry.modes().get(mode as usize).is_some_and(|m| !m.public_transit) =>
        {
            Some(mode)
        }
        _ => registry.fastest_individual(available, edge_speed),
    }
}

pub struct Router<'a> {
    network: &'a Network,
    registry: &'a ModeRegistry,
    schedule: Option<&'a Schedule>,
    no_entrainment: EntrainmentMap,
    carriers: ModeSet,
}

struct Search<'s> {
    options: &'s SearchOptions,
    store: LabelStore,
    best: Vec<Option<LabelId>>,
    settled: Vec<bool>,
    queue: BinaryHeap<QueueEntry>,
    seq: u32,
}

impl Search<'_> {
    // Enqueues the label if it strictly improves its node's best label.
    fn offer(&mut self, label: Label) -> bool {
        let weight = &self.options.weight;
        if !weight.accepts(&label) || self.options.cutoff.exceeded_by(&label) {
            return false;
        }
        let node = label.node.0 as usize;
        if self.settled[node] {
            return false;
        }
        if let Some(current) = self.best[node] {
            if weight.compare(&label, &self.store[current]) != Ordering::Less {
                return false;
            }
        }
        let key = weight.key(&label);
        let id = self.store.push(label);
        self.best[node] = Some(id);
        self.queue.push(QueueEntry { key, seq: self.seq, label: id });
        self.seq += 1;
        true
    }
}

impl<'a> Router<'a> {
    pub fn new(network: &'a Network, registry: &'a ModeRegistry) -> Self {
        Self { network, registry, schedule: None, no_entrainment: EntrainmentMap::new(), carriers: registry.transit_modes() }
    }

    pub fn with_schedule(mut self, schedule: &'a Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn network(&self) -> &'a Network { self.network }

    pub fn registry(&self) -> &'a ModeRegistry { self.registry }

    pub fn schedule(&self) -> Option<&'a Schedule> { self.schedule }

    fn entrainment(&self) -> &EntrainmentMap {
        self.schedule.map_or(&self.no_entrainment, |schedule| schedule.entrainment())
    }

    /// Runs one search from `origin`. `destinations` only matter for
    /// [`Termination::AllDestinations`]; every reached node is kept in the result.
    pub fn route(&self, origin: Origin, destinations: &[Attachment], options: &SearchOptions) -> SearchResult<'a> {
        let num_nodes = self.network.num_nodes();
        let mut search = Search {
            options,
            store: LabelStore::with_capacity(num_nodes),
            best: vec![None; num_nodes],
            settled: vec![false; num_nodes],
            queue: BinaryHeap::new(),
            seq: 0,
        };
        let root = self.seed(&mut search, origin);
        let (mut pending, mut remaining) = self.destination_nodes(destinations);

        let (mut settled, mut stale) = (0usize, 0usize);
        while let Some(QueueEntry { label: id, .. }) = search.queue.pop() {
            let node = search.store[id].node;
            if search.settled[node.0 as usize] || search.best[node.0 as usize] != Some(id) {
                stale += 1;
                continue;
            }
            search.settled[node.0 as usize] = true;
            settled += 1;
            if std::mem::take(&mut pending[node.0 as usize]) {
                remaining -= 1;
            }
            if options.termination == Termination::AllDestinations && remaining == 0 {
                break;
            }

            for &edge_id in &self.network.node(node).outgoing {
                let edge = self.network.edge(edge_id);
                let label = &search.store[id];
                let next = match &edge.connections {
                    Some(connections) => self.transit_hop(id, label, edge, connections, options),
                    None => self.road_hop(id, label, edge, edge.length, options),
                };
                if let Some(next) = next {
                    search.offer(next);
                }
            }
        }

        log::debug!(
            "Search finished: {} labels, {settled} nodes settled, {stale} stale entries skipped.",
            search.store.len()
        );
        SearchResult::new(self.network, self.registry, self.schedule, search.store, search.best, origin, root, options.start_time)
    }

    // Returns the root label of an edge origin, which is not itself placed on any node.
    fn seed(&self, search: &mut Search, origin: Origin) -> Option<LabelId> {
        let measures = search.options.weight.initial_measures();
        match origin {
            Origin::Node(node) => {
                let id = search.store.origin(node, search.options.modes, measures);
                let key = search.options.weight.key(&search.store[id]);
                search.best[node.0 as usize] = Some(id);
                search.queue.push(QueueEntry { key, seq: search.seq, label: id });
                search.seq += 1;
                None
            }
            Origin::Edge(attachment) => {
                let edge = self.network.edge(attachment.edge);
                let root = search.store.origin(edge.from, search.options.modes, measures);
                if edge.is_active() && !edge.is_transit() {
                    let ahead = (edge.length - attachment.offset).max(0.);
                    if let Some(label) = self.road_hop(root, &search.store[root], edge, ahead, search.options) {
                        search.offer(label);
                    }
                }
                let twin = edge.opposite.map(|twin| self.network.edge(twin)).filter(|twin| twin.is_active());
                if let Some(twin) = twin {
                    let behind = attachment.offset.clamp(0., edge.length) * twin.length / edge.length.max(f64::MIN_POSITIVE);
                    if let Some(mut label) = self.road_hop(root, &search.store[root], twin, behind, search.options) {
                        label.was_opposite = true;
                        search.offer(label);
                    }
                }
                Some(root)
            }
        }
    }

    // Start nodes a destination can be entered from, flagged per node, and how many there are.
    fn destination_nodes(&self, destinations: &[Attachment]) -> (Vec<bool>, usize) {
        let mut pending = vec![false; self.network.num_nodes()];
        let mut remaining = 0;
        for destination in destinations {
            let edge = self.network.edge(destination.edge);
            let twin = edge.opposite.map(|twin| self.network.edge(twin)).filter(|twin| twin.is_active());
            for node in std::iter::once(edge.from).chain(twin.map(|twin| twin.from)) {
                if !std::mem::replace(&mut pending[node.0 as usize], true) {
                    remaining += 1;
                }
            }
        }
        (pending, remaining)
    }

    // Moving `distance` meters along a road edge with an individual mode.
    fn road_hop(&self, prev_id: LabelId, prev: &Label, edge: &Edge, distance: f64, options: &SearchOptions) -> Option<Label> {
        let available = prev.available_modes & edge.modes;
        let mode = road_mode(self.registry, prev, available, edge.speed)?;
        let speed = self.registry.effective_speed(mode, edge.speed);
        if speed <= 0. {
            return None;
        }
        let tt = distance / speed;
        Some(Label {
            prev: Some(prev_id),
            node: edge.to,
            edge: Some(edge.id),
            available_modes: available,
            used_mode: Some(mode),
            line: None,
            trip: None,
            distance: prev.distance + distance,
            tt: prev.tt + tt,
            hop_tt: tt,
            interchange_tt: 0.,
            was_opposite: false,
            boardings: prev.boardings,
            measures: options.weight.build_measures(&prev.measures, edge, distance, None),
            first: prev.first,
        })
    }

    // Riding the earliest usable connection of a transit edge.
    fn transit_hop(
        &self,
        prev_id: LabelId,
        prev: &Label,
        edge: &Edge,
        connections: &[Connection],
        options: &SearchOptions,
    ) -> Option<Label> {
        let schedule = self.schedule?;
        let arrival = options.start_time as f64 + prev.tt;
        let threshold = arrival.ceil() as Timestamp;
        let first = earliest_departure(connections, threshold)?;

        for connection in &connections[first..] {
            let carrier = schedule.route(connection.route).mode;
            if !edge.allows(carrier) || !options.modes.contains(carrier) || !self.may_board(prev, carrier) {
                continue;
            }
            let penalty = match prev.line {
                Some(line) if line != connection.route => schedule
                    .interchange_time(prev.node, line, connection.route)
                    .unwrap_or(options.default_interchange_time),
                _ => 0,
            };
            if connection.departure < threshold + penalty {
                continue;
            }

            let wait = connection.departure as f64 - arrival;
            let hop_tt = wait + (connection.arrival - connection.departure) as f64;
            let boards = prev.trip != Some(connection.trip);
            let carried = self.entrainment().carried(carrier);
            let available = ModeSet::of(carrier) | (prev.available_modes & carried);
            return Some(Label {
                prev: Some(prev_id),
                node: edge.to,
                edge: Some(edge.id),
                available_modes: available,
                used_mode: Some(carrier),
                line: Some(connection.route),
                trip: Some(connection.trip),
                distance: prev.distance + edge.length,
                tt: prev.tt + hop_tt,
                hop_tt,
                interchange_tt: wait,
                was_opposite: false,
                boardings: prev.boardings + u32::from(boards),
                measures: options.weight.build_measures(&prev.measures, edge, edge.length, Some(connection.route)),
                first: prev.first,
            });
        }
        None
    }

    // A traveller on foot or bike needs the carrier to take that mode along. One
    // arriving by transit or starting out needs some held mode to be carried.
    fn may_board(&self, prev: &Label, carrier: ModeId) -> bool {
        match prev.used_mode {
            Some(mode) if mode == carrier => true,
            Some(mode) if !self.carriers.contains(mode) => self.entrainment().may_board(Some(mode), carrier),
            _ => !(prev.available_modes.without(self.carriers) & self.entrainment().carried(carrier)).is_empty(),
        }
    }

    /// The edges a search may enter from `node` under `modes`.
    pub fn permitted_edges(&self, node: NodeId, modes: ModeSet) -> impl Iterator<Item = EdgeId> + '_ {
        self.network
            .node(node)
            .outgoing
            .iter()
            .copied()
            .filter(move |&edge| self.network.edge(edge).allows_any(modes))
    }
}
