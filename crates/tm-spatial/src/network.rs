//! Grid road network and builder.
//!
//! # Data layout
//!
//! Nodes are the `width × height` integer coordinates of the grid, densely
//! numbered `index = y * width + x`.  Adjacency uses **Compressed Sparse
//! Row (CSR)** format: the neighbours of node `i` occupy
//!
//! ```text
//! adj_to[ adj_start[i] .. adj_start[i+1] ]
//! ```
//!
//! with the base traversal cost of each link at the same position in
//! `adj_cost`.  Segments are undirected, so every link is stored once per
//! direction.  The graph is immutable after [`RoadNetworkBuilder::build`].
//!
//! # Spatial index
//!
//! An R-tree (via `rstar`) over node coordinates answers the Euclidean
//! radius queries behind local-density aggregation.

use rstar::{PointDistance, RTree, RTreeObject, AABB};
use rustc_hash::{FxHashMap, FxHashSet};

use tm_core::{Direction, GridPos, Segment};

use crate::{SpatialError, SpatialResult};

/// Cost of a segment without an override.
pub const UNIT_COST: f64 = 1.0;

// ── R-tree node entry ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct NodeEntry {
    point: [f32; 2], // [x, y]
    pos:   GridPos,
}

impl RTreeObject for NodeEntry {
    type Envelope = AABB<[f32; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for NodeEntry {
    fn distance_2(&self, point: &[f32; 2]) -> f32 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

// ── RoadNetwork ───────────────────────────────────────────────────────────────

/// Static grid graph of intersections and road segments.
///
/// Do not construct directly; use [`RoadNetworkBuilder`].
pub struct RoadNetwork {
    width:  u32,
    height: u32,

    // ── CSR adjacency ─────────────────────────────────────────────────────
    /// Row pointer; length `node_count + 1`.
    adj_start: Vec<u32>,
    adj_to:    Vec<GridPos>,
    adj_cost:  Vec<f64>,

    // ── Spatial index ─────────────────────────────────────────────────────
    spatial_idx: RTree<NodeEntry>,
}

impl RoadNetwork {
    /// Shorthand for `RoadNetworkBuilder::grid(width, height).build()`.
    pub fn grid(width: u32, height: u32) -> SpatialResult<Self> {
        RoadNetworkBuilder::grid(width, height).build()
    }

    // ── Dimensions ────────────────────────────────────────────────────────

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn node_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of undirected segments.
    pub fn segment_count(&self) -> usize {
        self.adj_to.len() / 2
    }

    // ── Node indexing ─────────────────────────────────────────────────────

    #[inline]
    pub fn contains(&self, node: GridPos) -> bool {
        node.x >= 0
            && node.y >= 0
            && (node.x as u32) < self.width
            && (node.y as u32) < self.height
    }

    /// Dense index of `node`, or `None` if it lies outside the grid.
    #[inline]
    pub fn index_of(&self, node: GridPos) -> Option<usize> {
        self.contains(node)
            .then(|| node.y as usize * self.width as usize + node.x as usize)
    }

    /// Inverse of [`index_of`](Self::index_of).
    #[inline]
    pub fn node_at(&self, index: usize) -> GridPos {
        let w = self.width as usize;
        GridPos::new((index % w) as i32, (index / w) as i32)
    }

    /// All nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = GridPos> + '_ {
        (0..self.node_count()).map(|i| self.node_at(i))
    }

    // ── Graph traversal ───────────────────────────────────────────────────

    /// Nodes joined to `node` by a segment.
    pub fn neighbors(&self, node: GridPos) -> SpatialResult<&[GridPos]> {
        let i = self.index_of(node).ok_or(SpatialError::InvalidNode(node))?;
        Ok(&self.adj_to[self.row(i)])
    }

    /// Neighbours of `node` paired with the base cost of each link.
    pub fn links(
        &self,
        node: GridPos,
    ) -> SpatialResult<impl Iterator<Item = (GridPos, f64)> + '_> {
        let i = self.index_of(node).ok_or(SpatialError::InvalidNode(node))?;
        let row = self.row(i);
        Ok(self.adj_to[row.clone()].iter().copied().zip(self.adj_cost[row].iter().copied()))
    }

    /// Base traversal cost of the segment `u`–`v`.
    pub fn base_cost(&self, u: GridPos, v: GridPos) -> SpatialResult<f64> {
        if !self.contains(v) {
            return Err(SpatialError::InvalidNode(v));
        }
        self.links(u)?
            .find_map(|(to, cost)| (to == v).then_some(cost))
            .ok_or(SpatialError::NotAdjacent { from: u, to: v })
    }

    /// `true` if `u` and `v` are joined by a segment.
    pub fn has_segment(&self, u: GridPos, v: GridPos) -> bool {
        self.neighbors(u).is_ok_and(|n| n.contains(&v))
    }

    /// Every segment exactly once, in canonical order.
    pub fn segments(&self) -> Vec<Segment> {
        let mut out = Vec::with_capacity(self.segment_count());
        for (i, node) in self.nodes().enumerate() {
            for &to in &self.adj_to[self.row(i)] {
                if node < to {
                    out.push(Segment::new(node, to));
                }
            }
        }
        out.sort_unstable();
        out
    }

    #[inline]
    fn row(&self, i: usize) -> std::ops::Range<usize> {
        self.adj_start[i] as usize..self.adj_start[i + 1] as usize
    }

    // ── Spatial queries ───────────────────────────────────────────────────

    /// Nodes within Euclidean `radius` of `point` (inclusive).  `point` need
    /// not lie on the grid.
    pub fn nodes_within(&self, point: GridPos, radius: f64) -> Vec<GridPos> {
        if !(radius >= 0.0) {
            return Vec::new();
        }
        let query = [point.x as f32, point.y as f32];
        // Pad for f32 rounding; the exact check below is in f64.
        let r2 = (radius * radius) as f32 + 1e-3;
        let mut nodes: Vec<GridPos> = self
            .spatial_idx
            .locate_within_distance(query, r2)
            .map(|e| e.pos)
            .filter(|n| n.euclidean(point) <= radius)
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Nearest grid node to an arbitrary coordinate.
    pub fn nearest_node(&self, point: GridPos) -> Option<GridPos> {
        self.spatial_idx
            .nearest_neighbor(&[point.x as f32, point.y as f32])
            .map(|e| e.pos)
    }
}

impl std::fmt::Debug for RoadNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoadNetwork")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("segments", &self.segment_count())
            .finish()
    }
}

// ── RoadNetworkBuilder ────────────────────────────────────────────────────────

/// Construct a grid [`RoadNetwork`], optionally with per-segment cost
/// overrides and removed segments, then call [`build`](Self::build).
///
/// # Example
///
/// ```
/// use tm_core::GridPos;
/// use tm_spatial::RoadNetworkBuilder;
///
/// let net = RoadNetworkBuilder::grid(3, 2)
///     .segment_cost(GridPos::new(0, 0), GridPos::new(1, 0), 4.0)
///     .build()
///     .unwrap();
/// assert_eq!(net.node_count(), 6);
/// assert_eq!(net.segment_count(), 7);
/// ```
pub struct RoadNetworkBuilder {
    width:     u32,
    height:    u32,
    overrides: FxHashMap<Segment, f64>,
    removed:   FxHashSet<Segment>,
}

impl RoadNetworkBuilder {
    /// A fully connected `width × height` grid of unit-cost segments.
    pub fn grid(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            overrides: FxHashMap::default(),
            removed:   FxHashSet::default(),
        }
    }

    /// Override the base cost of the segment `u`–`v`.
    pub fn segment_cost(mut self, u: GridPos, v: GridPos, cost: f64) -> Self {
        self.overrides.insert(Segment::new(u, v), cost);
        self
    }

    /// Leave the segment `u`–`v` out of the graph.
    pub fn remove_segment(mut self, u: GridPos, v: GridPos) -> Self {
        self.removed.insert(Segment::new(u, v));
        self
    }

    /// Consume the builder and produce a [`RoadNetwork`].
    ///
    /// Fails if an override or removal names a pair that is not a grid
    /// segment, or if a cost is below 1 (which would make the Manhattan
    /// heuristic overestimate).
    pub fn build(self) -> SpatialResult<RoadNetwork> {
        let w = self.width as i32;
        let h = self.height as i32;
        let inside = |p: GridPos| p.x >= 0 && p.y >= 0 && p.x < w && p.y < h;

        for seg in self.overrides.keys().chain(self.removed.iter()) {
            let [a, b] = seg.endpoints();
            for n in [a, b] {
                if !inside(n) {
                    return Err(SpatialError::InvalidNode(n));
                }
            }
            if !a.is_adjacent(b) {
                return Err(SpatialError::NotAdjacent { from: a, to: b });
            }
        }
        for (&segment, &cost) in &self.overrides {
            if !(cost.is_finite() && cost >= UNIT_COST) {
                return Err(SpatialError::InvalidCost { segment, cost });
            }
        }

        let node_count = self.width as usize * self.height as usize;
        let mut adj_start = Vec::with_capacity(node_count + 1);
        let mut adj_to    = Vec::with_capacity(node_count * 4);
        let mut adj_cost  = Vec::with_capacity(node_count * 4);
        let mut entries   = Vec::with_capacity(node_count);

        adj_start.push(0u32);
        for y in 0..h {
            for x in 0..w {
                let node = GridPos::new(x, y);
                for dir in Direction::ALL {
                    let to = node.step(dir);
                    let seg = Segment::new(node, to);
                    if !inside(to) || self.removed.contains(&seg) {
                        continue;
                    }
                    adj_to.push(to);
                    adj_cost.push(self.overrides.get(&seg).copied().unwrap_or(UNIT_COST));
                }
                adj_start.push(adj_to.len() as u32);
                entries.push(NodeEntry { point: [x as f32, y as f32], pos: node });
            }
        }

        Ok(RoadNetwork {
            width: self.width,
            height: self.height,
            adj_start,
            adj_to,
            adj_cost,
            spatial_idx: RTree::bulk_load(entries),
        })
    }
}
