use std::collections::{HashMap, HashSet};

use geo::{BoundingRect, Coord, LineString, Rect};

use crate::geometry;
use crate::modes::ModeSet;
use crate::price::PriceFunction;
use crate::schedule::Connection;
use crate::spatial::{EdgeIndex, IndexedEdge};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Numeric edge id; also the edge's slot in the network's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

#[derive(thiserror::Error, Debug)]
pub enum NetworkError {
    #[error("Edge '{edge}' has an invalid geometry.")]
    InvalidGeometry { edge: String },
    #[error("Unknown node {0}.")]
    UnknownNode(i64),
    #[error("Unknown edge '{0}'.")]
    UnknownEdge(String),
}

pub struct Node {
    pub id: NodeId,
    pub ext_id: i64,
    pub pos: Coord,
    pub incoming: Vec<EdgeId>,
    pub outgoing: Vec<EdgeId>,
}

pub struct Edge {
    pub id: EdgeId,
    pub name: Box<str>,
    pub from: NodeId,
    pub to: NodeId,
    pub modes: ModeSet,
    // Free-flow speed in m/s.
    pub speed: f64,
    pub geometry: LineString,
    pub length: f64,
    pub opposite: Option<EdgeId>,
    pub price: Option<PriceFunction>,
    // Present on transit edges only; kept sorted by departure time.
    pub connections: Option<Vec<Connection>>,
    active: bool,
}

impl Edge {
    pub fn allows(&self, mode: u8) -> bool { self.modes.contains(mode) }

    pub fn allows_any(&self, modes: ModeSet) -> bool { self.modes.intersects(modes) }

    pub fn is_transit(&self) -> bool { self.connections.is_some() }

    pub fn is_active(&self) -> bool { self.active }
}

/// Everything needed to add an edge; the network assigns the id.
pub struct NewEdge {
    pub name: String,
    pub from: NodeId,
    pub to: NodeId,
    pub modes: ModeSet,
    pub speed: f64,
    pub geometry: LineString,
    // Computed from the geometry when absent.
    pub length: Option<f64>,
}

#[derive(Default)]
pub struct Network {
    nodes: Vec<Node>,
    node_index: HashMap<i64, NodeId>,
    edges: Vec<Edge>,
    name2edge: HashMap<Box<str>, EdgeId>,
    index: EdgeIndex,
    bounds: Option<Rect>,
    max_ext_id: i64,
}

impl Network {
    pub fn new() -> Self { Self::default() }

    /// Returns the node with the given external id, creating it at `pos` if unknown.
    pub fn get_or_create_node(&mut self, ext_id: i64, pos: Coord) -> NodeId {
        if let Some(&id) = self.node_index.get(&ext_id) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { id, ext_id, pos, incoming: Vec::new(), outgoing: Vec::new() });
        self.node_index.insert(ext_id, id);
        self.max_ext_id = self.max_ext_id.max(ext_id);
        id
    }

    /// Creates a node with a fresh external id above every id in use.
    pub fn create_node(&mut self, pos: Coord) -> NodeId {
        let ext_id = self.max_id() + 1;
        self.get_or_create_node(ext_id, pos)
    }

    pub fn node_by_ext_id(&self, ext_id: i64) -> Result<NodeId, NetworkError> {
        self.node_index.get(&ext_id).copied().ok_or(NetworkError::UnknownNode(ext_id))
    }

    /// Registers an edge, extends the bounds and indexes its bounding rectangle.
    pub fn add_edge(&mut self, edge: NewEdge) -> Result<EdgeId, NetworkError> {
        if edge.geometry.0.len() < 2 {
            return Err(NetworkError::InvalidGeometry { edge: edge.name });
        }
        let length = edge.length.unwrap_or_else(|| geometry::length(&edge.geometry));
        if !length.is_finite() || length < 0. {
            return Err(NetworkError::InvalidGeometry { edge: edge.name });
        }
        let id = EdgeId(self.edges.len() as u32);
        let entry = IndexedEdge::new(id, &edge.geometry)
            .ok_or_else(|| NetworkError::InvalidGeometry { edge: edge.name.clone() })?;
        self.index.insert(entry);
        if let Some(rect) = edge.geometry.bounding_rect() {
            self.bounds = Some(match self.bounds {
                Some(bounds) => Rect::new(
                    Coord { x: bounds.min().x.min(rect.min().x), y: bounds.min().y.min(rect.min().y) },
                    Coord { x: bounds.max().x.max(rect.max().x), y: bounds.max().y.max(rect.max().y) },
                ),
                None => rect,
            });
        }

        self.nodes[edge.from.0 as usize].outgoing.push(id);
        self.nodes[edge.to.0 as usize].incoming.push(id);
        let name: Box<str> = edge.name.into();
        self.name2edge.insert(name.clone(), id);
        self.edges.push(Edge {
            id,
            name,
            from: edge.from,
            to: edge.to,
            modes: edge.modes,
            speed: edge.speed,
            geometry: edge.geometry,
            length,
            opposite: None,
            price: None,
            connections: None,
            active: true,
        });
        Ok(id)
    }

    pub fn link_opposites(&mut self, a: EdgeId, b: EdgeId) {
        self.edges[a.0 as usize].opposite = Some(b);
        self.edges[b.0 as usize].opposite = Some(a);
    }

    /// Detaches the edge from both endpoints. The edge stays reachable by id
    /// and keeps its index entry, but is skipped by every query.
    pub fn remove_edge(&mut self, id: EdgeId) {
        let edge = &mut self.edges[id.0 as usize];
        if !edge.active {
            return;
        }
        edge.active = false;
        let (from, to) = (edge.from, edge.to);
        if self.name2edge.get(&edge.name) == Some(&id) {
            self.name2edge.remove(&edge.name);
        }
        self.nodes[from.0 as usize].outgoing.retain(|&e| e != id);
        self.nodes[to.0 as usize].incoming.retain(|&e| e != id);
    }

    pub fn node(&self, id: NodeId) -> &Node { &self.nodes[id.0 as usize] }

    pub fn edge(&self, id: EdgeId) -> &Edge { &self.edges[id.0 as usize] }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge { &mut self.edges[id.0 as usize] }

    pub fn edge_by_name(&self, name: &str) -> Option<EdgeId> { self.name2edge.get(name).copied() }

    pub fn nodes(&self) -> &[Node] { &self.nodes }

    /// Active edges.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|edge| edge.active)
    }

    pub fn num_nodes(&self) -> usize { self.nodes.len() }

    pub fn num_edges(&self) -> usize { self.edges().count() }

    /// Size of the edge arena, removed edges included.
    pub fn edge_capacity(&self) -> usize { self.edges.len() }

    pub fn bounds(&self) -> Option<Rect> { self.bounds }

    pub fn index(&self) -> &EdgeIndex { &self.index }

    /// The largest external node id or numeric edge id in use.
    pub fn max_id(&self) -> i64 {
        self.max_ext_id.max(self.edges.len() as i64 - 1)
    }

    pub fn edges_for_modes(&self, modes: ModeSet) -> HashMap<EdgeId, &Edge> {
        self.edges()
            .filter(|edge| edge.allows_any(modes))
            .map(|edge| (edge.id, edge))
            .collect()
    }

    /// A spatial index restricted to active edges allowing any of `modes`.
    pub fn moded_index(&self, modes: ModeSet) -> EdgeIndex {
        EdgeIndex::bulk_load(
            self.edges()
                .filter(|edge| edge.allows_any(modes))
                .filter_map(|edge| IndexedEdge::new(edge.id, &edge.geometry))
                .collect(),
        )
    }

    /// Removes every edge that allows none of `modes`. Returns the number removed.
    pub fn prune_for_modes(&mut self, modes: ModeSet) -> usize {
        let to_remove: Vec<EdgeId> = self
            .edges()
            .filter(|edge| !edge.allows_any(modes))
            .map(|edge| edge.id)
            .collect();
        for &id in &to_remove {
            self.remove_edge(id);
        }
        log::info!("Pruned {} edges not allowing modes {modes}.", to_remove.len());
        to_remove.len()
    }

    /// Keeps only the largest cluster of edges reachable from each other by
    /// following outgoing edges. Returns the number of edges removed.
    pub fn dismiss_unconnected_edges(&mut self) -> usize {
        let mut cluster_of: Vec<Option<usize>> = vec![None; self.edges.len()];
        let mut clusters: Vec<Vec<EdgeId>> = Vec::new();

        let starts: Vec<EdgeId> = self.edges().map(|edge| edge.id).collect();
        for start in starts {
            if cluster_of[start.0 as usize].is_some() {
                continue;
            }
            let current = clusters.len();
            clusters.push(Vec::new());
            let mut touched = HashSet::new();
            let mut next = vec![start];
            while let Some(edge) = next.pop() {
                match cluster_of[edge.0 as usize] {
                    Some(c) if c == current => {}
                    Some(c) => {
                        touched.insert(c);
                    }
                    None => {
                        cluster_of[edge.0 as usize] = Some(current);
                        clusters[current].push(edge);
                        let head = self.edge(edge).to;
                        next.extend(self.node(head).outgoing.iter().copied());
                    }
                }
            }

            // Rediscovering an earlier cluster joins this one (and everything it touched) into it.
            if let Some(&target) = touched.iter().min() {
                for source in touched.iter().copied().filter(|&c| c != target).chain([current]) {
                    let moved = std::mem::take(&mut clusters[source]);
                    for &edge in &moved {
                        cluster_of[edge.0 as usize] = Some(target);
                    }
                    clusters[target].extend(moved);
                }
            }
        }

        let major = clusters
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.len().cmp(&b.len()).then(ib.cmp(ia)))
            .map(|(i, _)| i);
        let mut removed = 0;
        for (i, cluster) in clusters.into_iter().enumerate() {
            if Some(i) == major {
                continue;
            }
            for edge in cluster {
                self.remove_edge(edge);
                removed += 1;
            }
        }
        log::info!("Dismissed {removed} edges not connected to the main network.");
        removed
    }
}
