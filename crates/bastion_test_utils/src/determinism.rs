//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Every replica must end up with exactly the state the server computed,
//! and a replayed request log must rebuild the same world. Sources of
//! non-determinism include:
//!
//! - **Floating-point math**: We use fixed-point arithmetic via
//!   [`bastion_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   We always iterate in sorted entity ID order.
//!
//! - **System randomness**: Entity ids, team colors and spawn points are
//!   all derived from connection and entity ids.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual component determinism
//! 2. **Property tests**: Random request logs still replay identically
//! 3. **Integration tests**: Full sessions are reproducible
//! 4. **Parallel tests**: Running N sessions in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use bastion_core::components::ConnectionId;
use bastion_core::protocol::Request;
use bastion_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                self.unique_hashes().len(),
                self.hashes
            );
        }
    }
}

/// One logged request, applied just before `tick` runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedRequest {
    /// Tick before which the request is handled.
    pub tick: u64,
    /// Requesting connection.
    pub from: ConnectionId,
    /// The request.
    pub request: Request,
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use bastion_test_utils::determinism::verify_determinism;
/// use bastion_test_utils::fixtures::skirmish;
///
/// let result = verify_determinism(
///     5,   // Run 5 times
///     100, // 100 ticks each
///     skirmish,
///     |sim| { sim.tick().unwrap(); },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Advance one tick, treating a hard error as a test failure.
///
/// # Panics
///
/// Panics if the tick reports an invariant violation.
pub fn step(sim: &mut Simulation) {
    if let Err(e) = sim.tick() {
        panic!("tick {} failed: {e}", sim.get_tick());
    }
}

/// Runs a session twice with identical setup and verifies the final
/// state hashes match exactly.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(2, num_ticks, &setup_fn, step, Simulation::state_hash).is_deterministic
}

/// Apply a request log over `num_ticks` ticks.
///
/// Rejections are part of the replay; only hard errors abort it.
///
/// # Panics
///
/// Panics on a hard simulation error.
pub fn replay(sim: &mut Simulation, script: &[ScriptedRequest], num_ticks: u64) {
    for tick in 0..num_ticks {
        for entry in script.iter().filter(|e| e.tick == tick) {
            if let Err(e) = sim.handle_request(entry.from, entry.request.clone()) {
                panic!("request {entry:?} failed: {e}");
            }
        }
        step(sim);
    }
}

/// Replay the same request log twice and compare final hashes.
pub fn verify_replay_determinism<F>(setup_fn: F, script: &[ScriptedRequest], num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let run = || {
        let mut sim = setup_fn();
        replay(&mut sim, script, num_ticks);
        sim.state_hash()
    };
    run() == run()
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each simulation.
    pub hashes: Vec<u64>,
    /// Number of ticks each simulation ran.
    pub ticks: u64,
    /// Number of simulations run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all simulations produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all simulations matched.
    ///
    /// # Panics
    ///
    /// Panics if simulations produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            panic!(
                "Parallel simulations diverged!\n\
                 Simulations: {}\n\
                 Ticks: {}\n\
                 All hashes: {:?}",
                self.num_sims, self.ticks, self.hashes
            );
        }
    }
}

/// Run N simulations on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling or
/// memory layout differences.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> ParallelSimResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        step(&mut sim);
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        step(&mut sim1);
        step(&mut sim2);

        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for session testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based tests.
pub mod strategies {
    use bastion_core::components::{BuyableId, ConnectionId, EntityId};
    use bastion_core::math::{Fixed, Vec2Fixed};
    use bastion_core::protocol::Request;
    use proptest::prelude::*;

    use super::ScriptedRequest;

    /// One gold balance operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GoldOp {
        /// Credit gold.
        Add(u32),
        /// Try to deduct gold.
        Deduct(u32),
    }

    /// Generate a gold operation.
    pub fn arb_gold_op() -> impl Strategy<Value = GoldOp> {
        prop_oneof![
            (0u32..1000).prop_map(GoldOp::Add),
            (0u32..1500).prop_map(GoldOp::Deduct),
        ]
    }

    /// Generate a sequence of gold operations.
    pub fn arb_gold_ops(max_len: usize) -> impl Strategy<Value = Vec<GoldOp>> {
        proptest::collection::vec(arb_gold_op(), 0..max_len)
    }

    /// Generate a point on or near the default map.
    ///
    /// Range: -120 to 120, a little beyond the playable area.
    pub fn arb_map_position() -> impl Strategy<Value = Vec2Fixed> {
        (-120i32..120, -120i32..120).prop_map(|(x, y)| Vec2Fixed::from_ints(x, y))
    }

    /// Generate any fixed-point value, extremes included.
    pub fn arb_fixed() -> impl Strategy<Value = Fixed> {
        prop_oneof![
            Just(Fixed::MIN),
            Just(Fixed::MAX),
            any::<i64>().prop_map(Fixed::from_bits),
        ]
    }

    /// Generate a client-supplied point.
    ///
    /// Mostly on the map; one in four covers the full value range.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        prop_oneof![
            3 => arb_map_position(),
            1 => (arb_fixed(), arb_fixed()).prop_map(|(x, y)| Vec2Fixed::new(x, y)),
        ]
    }

    /// Generate a display name, valid or not.
    pub fn arb_display_name() -> impl Strategy<Value = String> {
        prop_oneof![
            "[A-Za-z0-9_]{1,24}",
            "[A-Za-z0-9_]{25,30}",
            "[A-Za-z]{1,5} [A-Za-z]{1,5}",
            Just(String::new()),
        ]
    }

    /// Generate an entity id among the first `max_entity` allocated.
    pub fn arb_entity(max_entity: u64) -> impl Strategy<Value = EntityId> {
        (1..=max_entity).prop_map(EntityId)
    }

    /// Generate any request naming entities below `max_entity`.
    pub fn arb_request(max_entity: u64) -> impl Strategy<Value = Request> {
        prop_oneof![
            arb_display_name().prop_map(|name| Request::SetDisplayName { name }),
            (0u32..5, arb_entity(max_entity), arb_vec2_position(), arb_fixed()).prop_map(
                |(buyable, base, position, heading)| Request::PlaceBuilding {
                    buyable: BuyableId(buyable),
                    base,
                    position,
                    heading,
                }
            ),
            arb_entity(max_entity).prop_map(|spawner| Request::TrainUnit { spawner }),
            (arb_entity(max_entity), arb_vec2_position())
                .prop_map(|(unit, destination)| Request::MoveUnit { unit, destination }),
            (arb_entity(max_entity), arb_entity(max_entity))
                .prop_map(|(unit, target)| Request::SetTarget { unit, target }),
        ]
    }

    /// Generate a request log for connections `1..=players`.
    pub fn arb_script(
        players: u32,
        max_entity: u64,
        max_tick: u64,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<ScriptedRequest>> {
        proptest::collection::vec(
            (0..max_tick, 1..=players, arb_request(max_entity)).prop_map(
                |(tick, from, request)| ScriptedRequest {
                    tick,
                    from: ConnectionId(from),
                    request,
                },
            ),
            0..max_len,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{session_with_players, skirmish};
    use proptest::prelude::*;

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 10, || 0u64, |n| *n += 1, |n| *n);
        result.assert_deterministic();
        assert_eq!(result.unique_hashes(), vec![10]);
    }

    #[test]
    fn test_empty_session_determinism() {
        assert!(verify_simulation_determinism(
            || Simulation::standard().unwrap(),
            50
        ));
    }

    #[test]
    fn test_skirmish_determinism() {
        assert!(verify_simulation_determinism(skirmish, 400));
    }

    #[test]
    fn test_find_divergence_on_deterministic_sim() {
        assert_eq!(find_first_divergence(skirmish, 200), None);
    }

    #[test]
    fn test_parallel_skirmish_simulations() {
        run_parallel_simulations(skirmish, 4, 300).assert_deterministic();
    }

    #[test]
    fn test_hash_changes_with_state() {
        let mut sim = session_with_players(2);
        let before = sim.state_hash();
        sim.add_gold(ConnectionId(1), 5).unwrap();
        assert_ne!(before, sim.state_hash());
    }

    // =========================================================================
    // Property-based tests using proptest
    // =========================================================================

    proptest! {
        /// Random request logs, mostly rejected, replay identically.
        #[test]
        fn prop_request_logs_are_replayable(
            script in strategies::arb_script(2, 12, 40, 30),
        ) {
            prop_assert!(verify_replay_determinism(|| session_with_players(2), &script, 60));
        }
    }
}
