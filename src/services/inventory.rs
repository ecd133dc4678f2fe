//! Spot inventory - arena of every registered spot
//!
//! Spots live in a `Vec` in registration order; the index into that vec is the
//! spot's sequence number and the handle strategies use for their own
//! ordering structures. Per-size availability counters are kept
//! incrementally so `has_available` never scans.
//!
//! The inventory is not synchronized. It is owned by exactly one allocation
//! strategy, which serializes access behind its own lock.

use crate::domain::error::{LotError, LotResult};
use crate::domain::spot::{Spot, SpotSpec};
use crate::domain::types::{SizeClass, SpotKey};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Capacity and availability per size class at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OccupancySnapshot {
    pub capacity: [usize; SizeClass::COUNT],
    pub available: [usize; SizeClass::COUNT],
}

impl OccupancySnapshot {
    #[inline]
    pub fn capacity(&self, size: SizeClass) -> usize {
        self.capacity[size.index()]
    }

    #[inline]
    pub fn available(&self, size: SizeClass) -> usize {
        self.available[size.index()]
    }

    #[inline]
    pub fn occupied(&self, size: SizeClass) -> usize {
        self.capacity(size) - self.available(size)
    }

    pub fn total_capacity(&self) -> usize {
        self.capacity.iter().sum()
    }

    pub fn total_available(&self) -> usize {
        self.available.iter().sum()
    }
}

#[derive(Debug, Default)]
pub struct SpotInventory {
    spots: Vec<Spot>,
    index: FxHashMap<SpotKey, usize>,
    capacity: [usize; SizeClass::COUNT],
    available: [usize; SizeClass::COUNT],
}

impl SpotInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new spot as available.
    /// Returns its arena handle (equal to its registration sequence).
    pub fn add_spot(&mut self, spec: SpotSpec) -> LotResult<usize> {
        if self.index.contains_key(&spec.key) {
            return Err(LotError::DuplicateSpot(spec.key));
        }

        let handle = self.spots.len();
        self.spots.push(Spot::from_spec(spec, handle as u64));
        self.index.insert(spec.key, handle);
        self.capacity[spec.size.index()] += 1;
        self.available[spec.size.index()] += 1;
        Ok(handle)
    }

    /// Mark a spot as taken. Returns false if it already was.
    pub fn mark_unavailable(&mut self, key: SpotKey) -> LotResult<bool> {
        let handle = self.handle(key).ok_or(LotError::UnknownSpot(key))?;
        Ok(self.set_available(handle, false))
    }

    /// Mark a spot as free. Returns false if it already was.
    pub fn mark_available(&mut self, key: SpotKey) -> LotResult<bool> {
        let handle = self.handle(key).ok_or(LotError::UnknownSpot(key))?;
        Ok(self.set_available(handle, true))
    }

    /// True iff a spot of exactly this size class is free on any unit
    #[inline]
    pub fn has_available(&self, size: SizeClass) -> bool {
        self.available[size.index()] > 0
    }

    pub fn get(&self, key: SpotKey) -> Option<&Spot> {
        self.handle(key).map(|h| &self.spots[h])
    }

    #[inline]
    pub fn handle(&self, key: SpotKey) -> Option<usize> {
        self.index.get(&key).copied()
    }

    /// Spot by arena handle. Handles come from `add_spot`, so they are always in range.
    #[inline]
    pub fn spot_at(&self, handle: usize) -> &Spot {
        &self.spots[handle]
    }

    pub(crate) fn set_available(&mut self, handle: usize, available: bool) -> bool {
        let spot = &mut self.spots[handle];
        if spot.available == available {
            return false;
        }
        spot.available = available;
        let counter = &mut self.available[spot.size.index()];
        if available {
            *counter += 1;
        } else {
            *counter -= 1;
        }
        true
    }

    pub fn capacity(&self, size: SizeClass) -> usize {
        self.capacity[size.index()]
    }

    pub fn available_count(&self, size: SizeClass) -> usize {
        self.available[size.index()]
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn spots(&self) -> impl Iterator<Item = &Spot> {
        self.spots.iter()
    }

    pub fn snapshot(&self) -> OccupancySnapshot {
        OccupancySnapshot { capacity: self.capacity, available: self.available }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_spot_registers_available() {
        let mut inv = SpotInventory::new();
        let h = inv.add_spot(SpotSpec::new(1, 10, SizeClass::Small)).unwrap();

        assert_eq!(h, 0);
        assert!(inv.has_available(SizeClass::Small));
        assert!(!inv.has_available(SizeClass::Medium));
        assert_eq!(inv.capacity(SizeClass::Small), 1);
        assert!(inv.get(SpotKey::new(1, 10)).unwrap().available);
    }

    #[test]
    fn test_duplicate_spot_rejected() {
        let mut inv = SpotInventory::new();
        inv.add_spot(SpotSpec::new(1, 10, SizeClass::Small)).unwrap();

        let err = inv.add_spot(SpotSpec::new(1, 10, SizeClass::Large)).unwrap_err();
        assert_eq!(err, LotError::DuplicateSpot(SpotKey::new(1, 10)));
        assert_eq!(inv.len(), 1);

        // Same spot id on another unit is a different spot
        assert!(inv.add_spot(SpotSpec::new(2, 10, SizeClass::Small)).is_ok());
    }

    #[test]
    fn test_mark_unknown_spot() {
        let mut inv = SpotInventory::new();
        let key = SpotKey::new(9, 9);
        assert_eq!(inv.mark_unavailable(key), Err(LotError::UnknownSpot(key)));
        assert_eq!(inv.mark_available(key), Err(LotError::UnknownSpot(key)));
    }

    #[test]
    fn test_toggle_updates_counters() {
        let mut inv = SpotInventory::new();
        inv.add_spot(SpotSpec::new(1, 1, SizeClass::Medium)).unwrap();
        inv.add_spot(SpotSpec::new(2, 1, SizeClass::Medium)).unwrap();
        let key = SpotKey::new(1, 1);

        assert_eq!(inv.mark_unavailable(key), Ok(true));
        assert_eq!(inv.mark_unavailable(key), Ok(false));
        assert_eq!(inv.available_count(SizeClass::Medium), 1);
        assert!(inv.has_available(SizeClass::Medium));

        inv.mark_unavailable(SpotKey::new(2, 1)).unwrap();
        assert!(!inv.has_available(SizeClass::Medium));

        assert_eq!(inv.mark_available(key), Ok(true));
        assert_eq!(inv.mark_available(key), Ok(false));
        assert_eq!(inv.available_count(SizeClass::Medium), 1);
    }

    #[test]
    fn test_snapshot() {
        let mut inv = SpotInventory::new();
        inv.add_spot(SpotSpec::new(1, 1, SizeClass::Small)).unwrap();
        inv.add_spot(SpotSpec::new(1, 2, SizeClass::Small)).unwrap();
        inv.add_spot(SpotSpec::new(1, 3, SizeClass::XLarge)).unwrap();
        inv.mark_unavailable(SpotKey::new(1, 2)).unwrap();

        let snap = inv.snapshot();
        assert_eq!(snap.capacity(SizeClass::Small), 2);
        assert_eq!(snap.available(SizeClass::Small), 1);
        assert_eq!(snap.occupied(SizeClass::Small), 1);
        assert_eq!(snap.total_capacity(), 3);
        assert_eq!(snap.total_available(), 2);
    }
}
