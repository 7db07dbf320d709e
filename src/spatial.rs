//! R-tree over edge bounding boxes.
//!
//! Entries keep a copy of the edge geometry so that the tree's nearest-neighbour
//! iteration yields edges ordered by their true (perpendicular) distance rather
//! than by bounding-box distance.

use geo::{BoundingRect, Coord, LineString};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geometry;
use crate::network::EdgeId;

#[derive(Clone, Debug)]
pub struct IndexedEdge {
    pub edge: EdgeId,
    geometry: LineString,
    aabb: AABB<[f64; 2]>,
}

impl IndexedEdge {
    pub fn new(edge: EdgeId, geometry: &LineString) -> Option<Self> {
        let rect = geometry.bounding_rect()?;
        let aabb = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        Some(Self { edge, geometry: geometry.clone(), aabb })
    }
}

impl RTreeObject for IndexedEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

impl PointDistance for IndexedEdge {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        match geometry::project(&self.geometry, Coord { x: point[0], y: point[1] }) {
            Some(projection) => projection.distance * projection.distance,
            None => f64::INFINITY,
        }
    }
}

#[derive(Default)]
pub struct EdgeIndex {
    tree: RTree<IndexedEdge>,
}

impl EdgeIndex {
    pub fn bulk_load(entries: Vec<IndexedEdge>) -> Self {
        Self { tree: RTree::bulk_load(entries) }
    }

    pub fn insert(&mut self, entry: IndexedEdge) {
        self.tree.insert(entry);
    }

    pub fn len(&self) -> usize { self.tree.size() }

    pub fn is_empty(&self) -> bool { self.tree.size() == 0 }

    /// Edges ordered by ascending distance to `point`, with that distance.
    pub fn nearest_iter(&self, point: Coord) -> impl Iterator<Item = (EdgeId, f64)> + '_ {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&[point.x, point.y])
            .map(|(entry, distance_2)| (entry.edge, distance_2.sqrt()))
    }

    /// Edges whose bounding box intersects the square of half-width `radius` around `point`.
    pub fn within(&self, point: Coord, radius: f64) -> impl Iterator<Item = EdgeId> + '_ {
        let envelope = AABB::from_corners(
            [point.x - radius, point.y - radius],
            [point.x + radius, point.y + radius],
        );
        self.tree.locate_in_envelope_intersecting(&envelope).map(|entry| entry.edge)
    }
}
