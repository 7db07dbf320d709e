//! Snapping points to the nearest mode-permitted edge.
//!
//! Stops are spliced into the network (the target edge and its twin are split
//! around a new intermediate node, which is connected to the stop by access and
//! egress edges). Query origins and destinations are only attached: they keep a
//! reference to the mapped edge plus the offset along it.

use std::collections::BTreeMap;

use geo::{Coord, LineString};

use crate::geometry;
use crate::modes::ModeSet;
use crate::network::{EdgeId, Network, NetworkError, NewEdge, NodeId};

// Projections closer than this to an edge end reuse the end node.
const END_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug)]
pub struct MappablePoint {
    pub id: String,
    pub position: Coord,
    // Modes the point may be reached with; empty means any access mode.
    pub modes: ModeSet,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapResult {
    pub edge: EdgeId,
    pub point: Coord,
    pub offset: f64,
    pub distance: f64,
}

/// A point attached to an edge without splicing it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attachment {
    pub edge: EdgeId,
    pub offset: f64,
}

impl From<&MapResult> for Attachment {
    fn from(result: &MapResult) -> Self {
        Self { edge: result.edge, offset: result.offset }
    }
}

pub struct Mapping {
    // One entry per input point, in input order.
    pub results: Vec<Option<MapResult>>,
    pub unmapped: usize,
}

impl Mapping {
    pub fn attachments(&self) -> Vec<Option<Attachment>> {
        self.results.iter().map(|result| result.as_ref().map(Attachment::from)).collect()
    }
}

pub struct NearestEdgeFinder<'a> {
    network: &'a Network,
    index: crate::spatial::EdgeIndex,
    access_modes: ModeSet,
}

impl<'a> NearestEdgeFinder<'a> {
    pub fn new(network: &'a Network, access_modes: ModeSet) -> Self {
        Self { network, index: network.moded_index(access_modes), access_modes }
    }

    /// The nearest edge allowing one of the point's modes; ties go to the lower edge id.
    pub fn find(&self, point: &MappablePoint) -> Option<MapResult> {
        let wanted = if point.modes.is_empty() {
            self.access_modes
        } else {
            point.modes & self.access_modes
        };

        let mut best: Option<(EdgeId, f64)> = None;
        for (edge_id, distance) in self.index.nearest_iter(point.position) {
            if let Some((_, best_distance)) = best {
                if distance > best_distance + 1e-9 {
                    break;
                }
            }
            let edge = self.network.edge(edge_id);
            if !edge.is_active() || edge.is_transit() || !edge.allows_any(wanted) {
                continue;
            }
            best = match best {
                Some((best_id, best_distance)) if best_id <= edge_id => Some((best_id, best_distance)),
                Some((_, best_distance)) => Some((edge_id, best_distance)),
                None => Some((edge_id, distance)),
            };
        }

        let (edge_id, _) = best?;
        let projection = geometry::project(&self.network.edge(edge_id).geometry, point.position)?;
        Some(MapResult {
            edge: edge_id,
            point: projection.point,
            offset: projection.offset,
            distance: projection.distance,
        })
    }

    pub fn map_all(&self, points: &[MappablePoint]) -> Mapping {
        let results: Vec<Option<MapResult>> = points.iter().map(|point| self.find(point)).collect();
        let unmapped = results.iter().filter(|result| result.is_none()).count();
        if unmapped > 0 {
            log::warn!("{unmapped} of {} points could not be mapped onto the network.", points.len());
        }
        Mapping { results, unmapped }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplicedPoint {
    pub intermediate: NodeId,
    // intermediate node -> target
    pub access: EdgeId,
    // target -> intermediate node
    pub egress: EdgeId,
}

/// Access/egress edge parameters used when splicing.
#[derive(Clone, Copy, Debug)]
pub struct AccessEdges {
    pub modes: ModeSet,
    pub speed: f64,
}

/// Splices each mapped point into the network, connecting it to `targets[i]`.
///
/// All points on one edge (or on its twin) are handled together so that the
/// edge pair is split once at every projection offset.
pub fn splice(
    network: &mut Network,
    points: &[MappablePoint],
    mapping: &Mapping,
    targets: &[NodeId],
    access: AccessEdges,
) -> Result<Vec<Option<SplicedPoint>>, NetworkError> {
    let mut groups: BTreeMap<EdgeId, Vec<(f64, usize)>> = BTreeMap::new();
    for (i, result) in mapping.results.iter().enumerate() {
        if let Some(result) = result {
            let (edge, offset) = canonical(network, result);
            groups.entry(edge).or_default().push((offset, i));
        }
    }

    let mut spliced = vec![None; points.len()];
    for (edge, mut members) in groups {
        members.sort_by(|a, b| a.0.total_cmp(&b.0));
        let offsets: Vec<f64> = members.iter().map(|&(offset, _)| offset).collect();
        let nodes = split_edge(network, edge, &offsets)?;

        for (&(_, i), intermediate) in members.iter().zip(nodes) {
            let distance = mapping.results[i].map(|r| r.distance).unwrap_or_default();
            let target = targets[i];
            let (from_pos, to_pos) = (network.node(intermediate).pos, network.node(target).pos);
            let access_edge = network.add_edge(NewEdge {
                name: format!("on-{}", points[i].id),
                from: intermediate,
                to: target,
                modes: access.modes,
                speed: access.speed,
                geometry: LineString::new(vec![from_pos, to_pos]),
                length: Some(distance),
            })?;
            let egress_edge = network.add_edge(NewEdge {
                name: format!("off-{}", points[i].id),
                from: target,
                to: intermediate,
                modes: access.modes,
                speed: access.speed,
                geometry: LineString::new(vec![to_pos, from_pos]),
                length: Some(distance),
            })?;
            network.link_opposites(access_edge, egress_edge);
            spliced[i] = Some(SplicedPoint { intermediate, access: access_edge, egress: egress_edge });
        }
    }
    Ok(spliced)
}

// The lower-id edge of a twin pair, with the offset expressed along it.
fn canonical(network: &Network, result: &MapResult) -> (EdgeId, f64) {
    let edge = network.edge(result.edge);
    match edge.opposite {
        Some(opposite) if opposite < result.edge && network.edge(opposite).is_active() => {
            let scale = network.edge(opposite).length / edge.length.max(f64::MIN_POSITIVE);
            (opposite, (edge.length - result.offset) * scale)
        }
        _ => (result.edge, result.offset),
    }
}

/// Splits `edge` (and its twin) at the ascending `offsets`, returning the node found at each offset.
pub fn split_edge(network: &mut Network, edge: EdgeId, offsets: &[f64]) -> Result<Vec<NodeId>, NetworkError> {
    let (from, to, length) = {
        let e = network.edge(edge);
        (e.from, e.to, e.length)
    };

    // Interior cuts, deduplicated; end projections reuse the end nodes.
    let mut cuts: Vec<(f64, NodeId)> = Vec::new();
    let mut nodes = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        let node = if offset <= END_TOLERANCE {
            from
        } else if offset >= length - END_TOLERANCE {
            to
        } else if let Some(node) = reusable_cut(&cuts, offset) {
            node
        } else {
            let pos = geometry::point_at(&network.edge(edge).geometry, offset)
                .ok_or_else(|| NetworkError::InvalidGeometry { edge: network.edge(edge).name.to_string() })?;
            let node = network.create_node(pos);
            cuts.push((offset, node));
            node
        };
        nodes.push(node);
    }
    if cuts.is_empty() {
        return Ok(nodes);
    }

    let forward = split_into_pieces(network, edge, &cuts)?;
    let opposite = network.edge(edge).opposite.filter(|&opp| network.edge(opp).is_active());
    if let Some(opposite) = opposite {
        let scale = network.edge(opposite).length / length.max(f64::MIN_POSITIVE);
        let mirrored: Vec<(f64, NodeId)> =
            cuts.iter().rev().map(|&(offset, node)| ((length - offset) * scale, node)).collect();
        let backward = split_into_pieces(network, opposite, &mirrored)?;
        for (&f, &b) in forward.iter().zip(backward.iter().rev()) {
            network.link_opposites(f, b);
        }
    }
    Ok(nodes)
}

fn reusable_cut(cuts: &[(f64, NodeId)], offset: f64) -> Option<NodeId> {
    cuts.last().filter(|&&(cut, _)| offset - cut <= END_TOLERANCE).map(|&(_, node)| node)
}

fn split_into_pieces(network: &mut Network, edge: EdgeId, cuts: &[(f64, NodeId)]) -> Result<Vec<EdgeId>, NetworkError> {
    let (name, from, to, modes, speed, price, geometry) = {
        let e = network.edge(edge);
        (e.name.to_string(), e.from, e.to, e.modes, e.speed, e.price, e.geometry.clone())
    };
    network.remove_edge(edge);

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut remaining = geometry;
    let mut walked = 0.;
    let mut start = from;
    for (k, (offset, node)) in cuts.iter().copied().chain(std::iter::once((f64::INFINITY, to))).enumerate() {
        let piece_geometry = if offset.is_finite() {
            let (before, behind) = geometry::split_at(&remaining, offset - walked)
                .ok_or_else(|| NetworkError::InvalidGeometry { edge: name.clone() })?;
            remaining = behind;
            walked = offset;
            before
        } else {
            std::mem::replace(&mut remaining, LineString::new(Vec::new()))
        };
        let id = network.add_edge(NewEdge {
            name: format!("{name}#{k}"),
            from: start,
            to: node,
            modes,
            speed,
            geometry: piece_geometry,
            length: None,
        })?;
        network.edge_mut(id).price = price;
        pieces.push(id);
        start = node;
    }
    Ok(pieces)
}
