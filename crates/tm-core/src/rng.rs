//! Deterministic per-agent and simulation-level RNG wrappers.
//!
//! # Determinism strategy
//!
//! Each agent gets its own independent `SmallRng` seeded by:
//!
//!   seed = global_seed XOR ((kind_salt + agent_id) * MIXING_CONSTANT)
//!
//! The mixing constant is the 64-bit fractional part of the golden ratio,
//! which spreads consecutive agent IDs uniformly across the seed space.
//! Ordinary and emergency vehicles use different salts so vehicle 0 and
//! ambulance 0 never share a stream.
//!
//! Task scheduling is not deterministic, so a whole run is not reproducible;
//! each agent's own sequence of goal choices and random-walk steps is.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{AgentId, VehicleKind};

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Offset separating the emergency seed space from the ordinary one.
const EMERGENCY_SALT: u64 = 1 << 32;

// ── AgentRng ──────────────────────────────────────────────────────────────────

/// Per-agent deterministic RNG, owned by that agent's control loop.
pub struct AgentRng(SmallRng);

impl AgentRng {
    /// Seed deterministically from the run's global seed and the agent identity.
    pub fn new(global_seed: u64, kind: VehicleKind, agent: AgentId) -> Self {
        let salt = match kind {
            VehicleKind::Ordinary  => 0,
            VehicleKind::Emergency => EMERGENCY_SALT,
        };
        let mixed = (salt + agent.0 as u64).wrapping_mul(MIXING_CONSTANT);
        AgentRng(SmallRng::seed_from_u64(global_seed ^ mixed))
    }

    /// Choose a random element from a slice.
    /// Returns `None` if the slice is empty.
    #[inline]
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        use rand::seq::SliceRandom;
        slice.choose(&mut self.0)
    }

    /// Choose up to `amount` distinct elements from a slice.
    pub fn choose_multiple<T: Clone>(&mut self, slice: &[T], amount: usize) -> Vec<T> {
        use rand::seq::SliceRandom;
        slice.choose_multiple(&mut self.0, amount).cloned().collect()
    }
}

// ── SimRng ────────────────────────────────────────────────────────────────────

/// Simulation-level RNG for global operations (incident injection, initial
/// placement).
///
/// Used only from a single task at a time.  Derive a [`child`](Self::child)
/// for every task that needs its own stream.
pub struct SimRng(SmallRng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(seed))
    }

    /// Derive a child `SimRng` with a different seed offset.
    pub fn child(&mut self, offset: u64) -> SimRng {
        let child_seed: u64 = self.0.r#gen::<u64>() ^ offset.wrapping_mul(MIXING_CONSTANT);
        SimRng(SmallRng::seed_from_u64(child_seed))
    }

    /// Choose up to `amount` distinct elements from a slice.
    pub fn choose_multiple<T: Clone>(&mut self, slice: &[T], amount: usize) -> Vec<T> {
        use rand::seq::SliceRandom;
        slice.choose_multiple(&mut self.0, amount).cloned().collect()
    }
}
