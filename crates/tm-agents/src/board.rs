//! Shared position board used for collision avoidance.
//!
//! # Collision rule
//!
//! | mover     | target holds              | allowed                       |
//! |-----------|---------------------------|-------------------------------|
//! | ordinary  | anyone else               | never                         |
//! | emergency | an ordinary vehicle       | never                         |
//! | emergency | only emergency vehicles   | only if the target is a hospital |
//!
//! The check and the write happen under one write lock, so when two agents
//! race for the same free node exactly one of them wins.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::{FxHashMap, FxHashSet};

use tm_core::{AgentId, GridPos, VehicleKind};

/// One vehicle's declared position.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoardEntry {
    pub kind: VehicleKind,
    pub pos:  GridPos,
}

/// Why [`PositionBoard::try_move`] refused a move.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MoveConflict {
    pub target:   GridPos,
    /// One of the vehicles standing on `target`.
    pub occupant: AgentId,
}

/// Concurrent map from vehicle to current node.
#[derive(Default)]
pub struct PositionBoard {
    entries: RwLock<FxHashMap<AgentId, BoardEntry>>,
}

impl PositionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `agent` at `pos` unconditionally (initial placement).
    pub fn place(&self, agent: AgentId, kind: VehicleKind, pos: GridPos) {
        self.write().insert(agent, BoardEntry { kind, pos });
    }

    /// Move `agent` to `to` if the collision rule allows it.
    pub fn try_move(
        &self,
        agent: AgentId,
        kind: VehicleKind,
        to: GridPos,
        hospitals: &[GridPos],
    ) -> Result<(), MoveConflict> {
        let mut map = self.write();
        let staging = kind.is_emergency() && hospitals.contains(&to);
        let blocker = map
            .iter()
            .filter(|(id, e)| **id != agent && e.pos == to)
            .find(|(_, e)| !(staging && e.kind.is_emergency()));
        if let Some((id, _)) = blocker {
            return Err(MoveConflict { target: to, occupant: *id });
        }
        map.insert(agent, BoardEntry { kind, pos: to });
        Ok(())
    }

    pub fn remove(&self, agent: AgentId) -> Option<BoardEntry> {
        self.write().remove(&agent)
    }

    pub fn position(&self, agent: AgentId) -> Option<GridPos> {
        self.read().get(&agent).map(|e| e.pos)
    }

    /// Vehicles currently declared at `node`, sorted.
    pub fn occupants_at(&self, node: GridPos) -> Vec<AgentId> {
        let mut out: Vec<AgentId> = self
            .read()
            .iter()
            .filter(|(_, e)| e.pos == node)
            .map(|(id, _)| *id)
            .collect();
        out.sort_unstable();
        out
    }

    pub fn is_occupied(&self, node: GridPos) -> bool {
        self.read().values().any(|e| e.pos == node)
    }

    /// Number of distinct nodes holding at least one vehicle.
    pub fn occupied_node_count(&self) -> usize {
        self.read().values().map(|e| e.pos).collect::<FxHashSet<_>>().len()
    }

    /// Every entry, sorted by agent, for visualization.
    pub fn snapshot(&self) -> Vec<(AgentId, BoardEntry)> {
        let mut out: Vec<(AgentId, BoardEntry)> =
            self.read().iter().map(|(id, e)| (*id, *e)).collect();
        out.sort_unstable_by_key(|(id, _)| *id);
        out
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<AgentId, BoardEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<AgentId, BoardEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
