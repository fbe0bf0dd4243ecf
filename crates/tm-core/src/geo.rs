//! Grid coordinates, road segments and travel directions.
//!
//! The road network is a rectangular grid.  A node is an integer coordinate
//! `(x, y)`; `y` grows northwards and `x` grows eastwards.  A segment is an
//! undirected link between two adjacent nodes, stored in canonical
//! `(min, max)` order so `(u, v)` and `(v, u)` key the same record.

use std::fmt;

// ── GridPos ───────────────────────────────────────────────────────────────────

/// An intersection of the grid, identified by its integer coordinate.
///
/// Ordering is lexicographic on `(x, y)`; it is only used to normalize
/// segments.  On the wire a node is the two-element array `[x, y]`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "(i32, i32)", into = "(i32, i32)"))]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// `|dx| + |dy|` — the number of unit moves between two nodes.
    #[inline]
    pub fn manhattan(self, other: GridPos) -> u32 {
        self.x.abs_diff(other.x).saturating_add(self.y.abs_diff(other.y))
    }

    /// Straight-line distance, used for radius queries.
    #[inline]
    pub fn euclidean(self, other: GridPos) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt()
    }

    /// `true` if `other` is exactly one axis-aligned step away.
    #[inline]
    pub fn is_adjacent(self, other: GridPos) -> bool {
        self.manhattan(other) == 1
    }

    /// The node one step away in `dir`.
    #[inline]
    pub fn step(self, dir: Direction) -> GridPos {
        let (dx, dy) = dir.delta();
        GridPos::new(self.x + dx, self.y + dy)
    }
}

impl From<(i32, i32)> for GridPos {
    fn from((x, y): (i32, i32)) -> Self {
        GridPos::new(x, y)
    }
}

impl From<GridPos> for (i32, i32) {
    fn from(p: GridPos) -> Self {
        (p.x, p.y)
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ── Segment ───────────────────────────────────────────────────────────────────

/// An undirected road link between two nodes.
///
/// Always normalized so that `a <= b`.  Construct through [`Segment::new`]
/// (or `From<(GridPos, GridPos)>`); deserialization normalizes too.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(from = "(GridPos, GridPos)", into = "(GridPos, GridPos)")
)]
pub struct Segment {
    a: GridPos,
    b: GridPos,
}

impl Segment {
    /// Build the canonical segment for the pair `{u, v}`.
    #[inline]
    pub fn new(u: GridPos, v: GridPos) -> Self {
        if u <= v { Self { a: u, b: v } } else { Self { a: v, b: u } }
    }

    /// The lexicographically smaller endpoint.
    #[inline]
    pub fn a(self) -> GridPos {
        self.a
    }

    /// The lexicographically larger endpoint.
    #[inline]
    pub fn b(self) -> GridPos {
        self.b
    }

    #[inline]
    pub fn endpoints(self) -> [GridPos; 2] {
        [self.a, self.b]
    }

    #[inline]
    pub fn touches(self, node: GridPos) -> bool {
        self.a == node || self.b == node
    }

    /// Smallest Manhattan distance from `node` to either endpoint.
    #[inline]
    pub fn manhattan_to(self, node: GridPos) -> u32 {
        self.a.manhattan(node).min(self.b.manhattan(node))
    }
}

impl From<(GridPos, GridPos)> for Segment {
    fn from((u, v): (GridPos, GridPos)) -> Self {
        Segment::new(u, v)
    }
}

impl From<Segment> for (GridPos, GridPos) {
    fn from(s: Segment) -> Self {
        (s.a, s.b)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

// ── Direction ─────────────────────────────────────────────────────────────────

/// Compass direction of a single unit move.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    #[cfg_attr(feature = "serde", serde(rename = "N"))]
    North,
    #[cfg_attr(feature = "serde", serde(rename = "S"))]
    South,
    #[cfg_attr(feature = "serde", serde(rename = "E"))]
    East,
    #[cfg_attr(feature = "serde", serde(rename = "W"))]
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] =
        [Direction::North, Direction::South, Direction::East, Direction::West];

    /// Infer the direction of the move `from → to`.
    ///
    /// Returns `None` for zero, diagonal or multi-cell moves, including
    /// ones whose coordinate difference does not fit in an `i32`.
    pub fn between(from: GridPos, to: GridPos) -> Option<Direction> {
        match (to.x.checked_sub(from.x)?, to.y.checked_sub(from.y)?) {
            (1, 0)  => Some(Direction::East),
            (-1, 0) => Some(Direction::West),
            (0, 1)  => Some(Direction::North),
            (0, -1) => Some(Direction::South),
            _       => None,
        }
    }

    /// Unit `(dx, dy)` for this direction.
    #[inline]
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::East  => (1, 0),
            Direction::West  => (-1, 0),
        }
    }

    #[inline]
    pub fn is_north_south(self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }

    /// Single-letter label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "N",
            Direction::South => "S",
            Direction::East  => "E",
            Direction::West  => "W",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
