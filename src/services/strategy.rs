//! Allocation strategies - which free spot satisfies a size-class request
//!
//! Every strategy owns the facility's `SpotInventory` behind a single mutex,
//! so the select-and-mark sequence in `reserve` is one critical section and
//! two concurrent reservations can never pick the same spot.
//!
//! Policies differ only in the order free spots are handed out:
//! - `NormalStrategy` - lowest unit first, then lowest registration sequence
//! - `ProximityStrategy` - shortest elevator distance, then unit, then sequence
//!
//! A released spot goes back into the free index at its ordering position, so
//! it becomes the next candidate again whenever it sorts first.

use crate::domain::error::{LotError, LotResult};
use crate::domain::spot::{Spot, SpotSpec};
use crate::domain::types::{SizeClass, SpotKey, UnitId};
use crate::services::inventory::{OccupancySnapshot, SpotInventory};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Policy that picks and reclaims spots.
///
/// Implementations must be safe to share across panels: `reserve` never hands
/// out a spot that is already reserved, and `None` means no capacity, not failure.
pub trait AllocationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register a spot; the inventory is private to the strategy
    fn add_spot(&self, spec: SpotSpec) -> LotResult<()>;

    /// Take one free spot of exactly `size`, or `None` when none is free
    fn reserve(&self, size: SizeClass) -> Option<Spot>;

    /// Return a spot to the free pool
    fn release(&self, key: SpotKey) -> LotResult<()>;

    fn is_available(&self, size: SizeClass) -> bool;

    fn spot(&self, key: SpotKey) -> Option<Spot>;

    fn snapshot(&self) -> OccupancySnapshot;
}

/// Which policy the facility runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Normal,
    Proximity,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Normal => "normal",
            StrategyKind::Proximity => "proximity",
        }
    }

    /// Construct the single strategy instance for a facility
    pub fn build(self) -> Arc<dyn AllocationStrategy> {
        match self {
            StrategyKind::Normal => Arc::new(NormalStrategy::new()),
            StrategyKind::Proximity => Arc::new(ProximityStrategy::new()),
        }
    }
}

/// Ordering of free spots for one policy
pub trait FreeOrder: Default + Send {
    const NAME: &'static str;

    fn insert(&mut self, spot: &Spot, handle: usize);

    /// Remove and return the handle of the first free spot of this size
    fn take_first(&mut self, size: SizeClass) -> Option<usize>;
}

/// Unit ascending, then size class, then registration sequence
#[derive(Debug, Default)]
pub struct UnitFirstOrder {
    groups: BTreeMap<UnitId, [BTreeSet<usize>; SizeClass::COUNT]>,
}

impl FreeOrder for UnitFirstOrder {
    const NAME: &'static str = "normal";

    fn insert(&mut self, spot: &Spot, handle: usize) {
        self.groups.entry(spot.key.unit).or_default()[spot.size.index()].insert(handle);
    }

    fn take_first(&mut self, size: SizeClass) -> Option<usize> {
        self.groups.values_mut().find_map(|by_size| by_size[size.index()].pop_first())
    }
}

/// Elevator distance, then unit, then registration sequence
#[derive(Debug, Default)]
pub struct ElevatorOrder {
    by_size: [BTreeSet<(u32, UnitId, usize)>; SizeClass::COUNT],
}

impl FreeOrder for ElevatorOrder {
    const NAME: &'static str = "proximity";

    fn insert(&mut self, spot: &Spot, handle: usize) {
        self.by_size[spot.size.index()].insert((spot.elevator_distance, spot.key.unit, handle));
    }

    fn take_first(&mut self, size: SizeClass) -> Option<usize> {
        self.by_size[size.index()].pop_first().map(|(_, _, handle)| handle)
    }
}

#[derive(Debug, Default)]
struct StrategyState<O> {
    inventory: SpotInventory,
    free: O,
}

/// Strategy over a mutex-guarded inventory plus a free-spot ordering
#[derive(Debug, Default)]
pub struct OrderedStrategy<O> {
    state: Mutex<StrategyState<O>>,
}

pub type NormalStrategy = OrderedStrategy<UnitFirstOrder>;
pub type ProximityStrategy = OrderedStrategy<ElevatorOrder>;

impl<O: FreeOrder> OrderedStrategy<O> {
    pub fn new() -> Self {
        Self { state: Mutex::new(StrategyState { inventory: SpotInventory::new(), free: O::default() }) }
    }
}

impl<O: FreeOrder> AllocationStrategy for OrderedStrategy<O> {
    fn name(&self) -> &'static str {
        O::NAME
    }

    fn add_spot(&self, spec: SpotSpec) -> LotResult<()> {
        let mut state = self.state.lock();
        let handle = state.inventory.add_spot(spec)?;
        let spot = *state.inventory.spot_at(handle);
        state.free.insert(&spot, handle);

        debug!(
            spot = %spec.key,
            size = %spec.size,
            seq = %spot.seq,
            elevator_distance = %spec.elevator_distance,
            "spot_registered"
        );
        Ok(())
    }

    fn reserve(&self, size: SizeClass) -> Option<Spot> {
        let mut state = self.state.lock();
        let handle = state.free.take_first(size)?;
        if !state.inventory.set_available(handle, false) {
            // Free index and inventory disagree; refuse the spot rather than double-book it
            let key = state.inventory.spot_at(handle).key;
            warn!(spot = %key, size = %size, "free_index_out_of_sync");
            return None;
        }
        let spot = *state.inventory.spot_at(handle);
        debug!(spot = %spot.key, size = %size, strategy = O::NAME, "spot_reserved");
        Some(spot)
    }

    fn release(&self, key: SpotKey) -> LotResult<()> {
        let mut state = self.state.lock();
        let handle = state.inventory.handle(key).ok_or(LotError::UnknownSpot(key))?;
        if !state.inventory.set_available(handle, true) {
            warn!(spot = %key, "spot_release_already_available");
            return Ok(());
        }
        let spot = *state.inventory.spot_at(handle);
        state.free.insert(&spot, handle);
        debug!(spot = %key, size = %spot.size, "spot_released");
        Ok(())
    }

    fn is_available(&self, size: SizeClass) -> bool {
        self.state.lock().inventory.has_available(size)
    }

    fn spot(&self, key: SpotKey) -> Option<Spot> {
        self.state.lock().inventory.get(key).copied()
    }

    fn snapshot(&self) -> OccupancySnapshot {
        self.state.lock().inventory.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::thread;

    fn normal_with(specs: &[SpotSpec]) -> NormalStrategy {
        let strategy = NormalStrategy::new();
        for spec in specs {
            strategy.add_spot(*spec).unwrap();
        }
        strategy
    }

    #[test]
    fn test_reserve_none_when_empty() {
        let strategy = NormalStrategy::new();
        assert!(strategy.reserve(SizeClass::Small).is_none());
        assert!(!strategy.is_available(SizeClass::Small));
    }

    #[test]
    fn test_reserve_exact_size_only() {
        let strategy = normal_with(&[SpotSpec::new(1, 1, SizeClass::Large)]);
        assert!(strategy.reserve(SizeClass::Medium).is_none());
        assert!(strategy.reserve(SizeClass::XLarge).is_none());
        assert_eq!(strategy.reserve(SizeClass::Large).unwrap().key, SpotKey::new(1, 1));
    }

    #[test]
    fn test_normal_prefers_lowest_unit_then_sequence() {
        // Registered out of unit order on purpose
        let strategy = normal_with(&[
            SpotSpec::new(2, 1, SizeClass::Small),
            SpotSpec::new(1, 5, SizeClass::Small),
            SpotSpec::new(1, 3, SizeClass::Small),
        ]);

        let order: Vec<SpotKey> =
            std::iter::from_fn(|| strategy.reserve(SizeClass::Small).map(|s| s.key)).collect();

        // Unit 1 first, registration order within it, then unit 2
        assert_eq!(order, vec![SpotKey::new(1, 5), SpotKey::new(1, 3), SpotKey::new(2, 1)]);
    }

    #[test]
    fn test_released_spot_is_next_candidate() {
        let strategy = normal_with(&[
            SpotSpec::new(1, 1, SizeClass::Medium),
            SpotSpec::new(1, 2, SizeClass::Medium),
        ]);

        let first = strategy.reserve(SizeClass::Medium).unwrap();
        let _second = strategy.reserve(SizeClass::Medium).unwrap();
        strategy.release(first.key).unwrap();

        assert_eq!(strategy.reserve(SizeClass::Medium).unwrap().key, first.key);
    }

    #[test]
    fn test_release_restores_availability() {
        let strategy = normal_with(&[SpotSpec::new(1, 1, SizeClass::XLarge)]);
        let before = strategy.is_available(SizeClass::XLarge);

        let spot = strategy.reserve(SizeClass::XLarge).unwrap();
        assert!(!strategy.is_available(SizeClass::XLarge));
        strategy.release(spot.key).unwrap();

        assert_eq!(strategy.is_available(SizeClass::XLarge), before);
    }

    #[test]
    fn test_double_release_does_not_duplicate() {
        let strategy = normal_with(&[SpotSpec::new(1, 1, SizeClass::Small)]);
        let spot = strategy.reserve(SizeClass::Small).unwrap();
        strategy.release(spot.key).unwrap();
        strategy.release(spot.key).unwrap();

        assert!(strategy.reserve(SizeClass::Small).is_some());
        assert!(strategy.reserve(SizeClass::Small).is_none());
    }

    #[test]
    fn test_release_unknown_spot() {
        let strategy = NormalStrategy::new();
        let key = SpotKey::new(3, 3);
        assert_eq!(strategy.release(key), Err(LotError::UnknownSpot(key)));
    }

    #[test]
    fn test_duplicate_registration() {
        let strategy = normal_with(&[SpotSpec::new(1, 1, SizeClass::Small)]);
        assert_eq!(
            strategy.add_spot(SpotSpec::new(1, 1, SizeClass::Small)),
            Err(LotError::DuplicateSpot(SpotKey::new(1, 1)))
        );
        assert_eq!(strategy.snapshot().capacity(SizeClass::Small), 1);
    }

    #[test]
    fn test_proximity_prefers_nearest_elevator() {
        let strategy = ProximityStrategy::new();
        strategy.add_spot(SpotSpec::new(1, 1, SizeClass::Medium).with_elevator_distance(40)).unwrap();
        strategy.add_spot(SpotSpec::new(2, 1, SizeClass::Medium).with_elevator_distance(5)).unwrap();
        strategy.add_spot(SpotSpec::new(1, 2, SizeClass::Medium).with_elevator_distance(5)).unwrap();

        assert_eq!(strategy.name(), "proximity");
        assert_eq!(strategy.reserve(SizeClass::Medium).unwrap().key, SpotKey::new(1, 2));
        assert_eq!(strategy.reserve(SizeClass::Medium).unwrap().key, SpotKey::new(2, 1));
    }

    #[test]
    fn test_build_from_kind() {
        assert_eq!(StrategyKind::Normal.build().name(), "normal");
        assert_eq!(StrategyKind::Proximity.build().name(), "proximity");
    }

    #[test]
    fn test_concurrent_reserve_no_double_assignment() {
        const SPOTS: u32 = 8;
        const CALLERS: usize = 32;

        let strategy = Arc::new(NormalStrategy::new());
        for id in 0..SPOTS {
            strategy.add_spot(SpotSpec::new(1 + id % 2, id, SizeClass::Small)).unwrap();
        }

        let barrier = Arc::new(Barrier::new(CALLERS));
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let strategy = strategy.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    strategy.reserve(SizeClass::Small).map(|s| s.key)
                })
            })
            .collect();

        let results: Vec<Option<SpotKey>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let won: Vec<SpotKey> = results.iter().flatten().copied().collect();
        let unique: HashSet<SpotKey> = won.iter().copied().collect();

        assert_eq!(won.len(), SPOTS as usize);
        assert_eq!(unique.len(), SPOTS as usize);
        assert_eq!(results.iter().filter(|r| r.is_none()).count(), CALLERS - SPOTS as usize);
    }
}
