//! Precision promotion for mixed-precision operations.
//!
//! A [`Promoter`] collects the operands of one operation, lifts them all to
//! the widest precision among them, and puts outputs back to their original
//! precision afterwards:
//!
//! ```text
//! insert(a: half) ─┐
//! insert(b: float) ├─ promote() ──► target = max = double
//! output(c: double)┘                a, b: converted copies (cached when keyed)
//!                                   c:    untouched (already at target)
//! ... compute on operand(i) / split_output(i) ...
//! depromote() ──► outputs converted back, copies released
//! ```
//!
//! Inputs are never modified: they are redirected to converted copies.
//! Outputs are converted in place. Copies of tiles inserted with a
//! [`TileKey`] are kept in a [`TileCache`], which may outlive the promoter
//! and be shared by every step of a tiled algorithm.
//!
//! A cached tile must not be mutated while its copies are in the cache;
//! call [`TileCache::invalidate`] after writing to it.

use core::ops::Deref;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Conversion;
use crate::{Error, NumericArray, Precision, Result};

/// Identity of a tile inside its owning tiled matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Id of the owning matrix
    pub owner: u64,
    /// Slot index inside the owner
    pub index: usize,
}

/// Converted copies of tiles, keyed by tile identity and precision.
#[derive(Debug, Default)]
pub struct TileCache {
    entries: HashMap<TileKey, Vec<Rc<NumericArray>>>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached copy of `key` at `precision`, if any.
    pub fn get(&self, key: TileKey, precision: Precision) -> Option<Rc<NumericArray>> {
        self.entries
            .get(&key)?
            .iter()
            .find(|copy| copy.precision() == precision)
            .cloned()
    }

    /// Cached copy of `tile` at `precision`, converting and caching on a miss.
    pub fn get_or_convert(
        &mut self,
        key: TileKey,
        tile: &NumericArray,
        precision: Precision,
    ) -> Result<Rc<NumericArray>> {
        if let Some(copy) = self.get(key, precision) {
            return Ok(copy);
        }
        let copy = Rc::new(tile.converted(precision)?);
        tracing::debug!(
            owner = key.owner,
            index = key.index,
            conversion = %Conversion { from: tile.precision(), to: precision },
            "cached promoted tile"
        );
        self.entries.entry(key).or_default().push(copy.clone());
        Ok(copy)
    }

    /// Drop every copy of `key`.
    pub fn invalidate(&mut self, key: TileKey) {
        self.entries.remove(&key);
    }

    /// Number of cached copies.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A tile at the requested precision: either the original or a cached copy.
#[derive(Debug, Clone)]
pub enum PromotedTile<'t> {
    Original(&'t NumericArray),
    Promoted(Rc<NumericArray>),
}

impl Deref for PromotedTile<'_> {
    type Target = NumericArray;

    fn deref(&self) -> &NumericArray {
        match self {
            PromotedTile::Original(tile) => tile,
            PromotedTile::Promoted(copy) => copy,
        }
    }
}

enum Slot<'a> {
    Input {
        array: &'a NumericArray,
        key: Option<TileKey>,
        promoted: Option<Rc<NumericArray>>,
    },
    Output {
        array: &'a mut NumericArray,
        original: Precision,
    },
}

impl Slot<'_> {
    fn original(&self) -> Precision {
        match self {
            Slot::Input { array, .. } => array.precision(),
            Slot::Output { original, .. } => *original,
        }
    }
}

enum CacheRef<'a> {
    Owned(TileCache),
    Borrowed(&'a mut TileCache),
}

impl CacheRef<'_> {
    fn get_mut(&mut self) -> &mut TileCache {
        match self {
            CacheRef::Owned(cache) => cache,
            CacheRef::Borrowed(cache) => cache,
        }
    }
}

/// Operand set of one mixed-precision operation.
pub struct Promoter<'a> {
    capacity: usize,
    slots: Vec<Slot<'a>>,
    cache: CacheRef<'a>,
    target: Option<Precision>,
}

impl<'a> Promoter<'a> {
    /// Promoter for `capacity` operands with its own tile cache.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            cache: CacheRef::Owned(TileCache::new()),
            target: None,
        }
    }

    /// Promoter for `capacity` operands sharing an external tile cache.
    pub fn with_cache(capacity: usize, cache: &'a mut TileCache) -> Self {
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            cache: CacheRef::Borrowed(cache),
            target: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of inserted operands.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Precision every operand was lifted to, while promoted.
    pub fn target(&self) -> Option<Precision> {
        self.target
    }

    /// Precision of each operand at insertion, in slot order.
    pub fn original_precisions(&self) -> Vec<Precision> {
        self.slots.iter().map(Slot::original).collect()
    }

    fn push(&mut self, slot: Slot<'a>) -> Result<usize> {
        if self.slots.len() >= self.capacity {
            return Err(Error::Capacity {
                capacity: self.capacity,
            });
        }
        self.slots.push(slot);
        Ok(self.slots.len() - 1)
    }

    /// Record a read-only operand. Returns its slot index.
    pub fn insert(&mut self, array: &'a NumericArray) -> Result<usize> {
        self.push(Slot::Input {
            array,
            key: None,
            promoted: None,
        })
    }

    /// Record a read-only tile whose converted copies may be cached.
    pub fn insert_tile(&mut self, key: TileKey, array: &'a NumericArray) -> Result<usize> {
        self.push(Slot::Input {
            array,
            key: Some(key),
            promoted: None,
        })
    }

    /// Record an operand that will be written.
    pub fn insert_output(&mut self, array: &'a mut NumericArray) -> Result<usize> {
        let original = array.precision();
        self.push(Slot::Output { array, original })
    }

    /// Lift every operand to the widest recorded precision.
    pub fn promote(&mut self) -> Result<Precision> {
        self.promote_at_least(Precision::Half)
    }

    /// Lift every operand to the widest of the recorded precisions and
    /// `floor`.
    pub fn promote_at_least(&mut self, floor: Precision) -> Result<Precision> {
        let target = self
            .slots
            .iter()
            .map(Slot::original)
            .fold(floor, Precision::max);
        if self.target == Some(target) {
            return Ok(target);
        }
        self.depromote()?;
        self.target = Some(target);

        let cache = self.cache.get_mut();
        for slot in &mut self.slots {
            match slot {
                Slot::Input {
                    array,
                    key,
                    promoted,
                } => {
                    if array.precision() == target {
                        continue;
                    }
                    *promoted = Some(match key {
                        Some(key) => cache.get_or_convert(*key, *array, target)?,
                        None => Rc::new(array.converted(target)?),
                    });
                }
                Slot::Output { array, .. } => array.convert_precision(target)?,
            }
        }

        tracing::debug!(operands = self.slots.len(), %target, "promoted operands");
        Ok(target)
    }

    /// Operand `index`, redirected to its promoted copy if it has one.
    pub fn operand(&self, index: usize) -> Result<&NumericArray> {
        match self.slots.get(index) {
            Some(Slot::Input {
                array, promoted, ..
            }) => Ok(promoted.as_deref().unwrap_or(*array)),
            Some(Slot::Output { array, .. }) => Ok(&**array),
            None => Err(Error::Bounds {
                index,
                len: self.slots.len(),
            }),
        }
    }

    /// Every input operand in slot order, plus output `index` for writing.
    pub fn split_output(&mut self, index: usize) -> Result<(Vec<&NumericArray>, &mut NumericArray)> {
        let len = self.slots.len();
        let mut inputs = Vec::with_capacity(len);
        let mut output = None;

        for (i, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                Slot::Input {
                    array, promoted, ..
                } => inputs.push(match promoted {
                    Some(copy) => &**copy,
                    None => *array,
                }),
                Slot::Output { array, .. } if i == index => output = Some(&mut **array),
                Slot::Output { .. } => {}
            }
        }

        match output {
            Some(output) => Ok((inputs, output)),
            None if index < len => Err(Error::Type {
                expected: "output operand",
                actual: "input operand",
            }),
            None => Err(Error::Bounds { index, len }),
        }
    }

    /// Put outputs back to their original precision and drop input copies.
    ///
    /// Safe to call more than once.
    pub fn depromote(&mut self) -> Result<()> {
        if self.target.take().is_none() {
            return Ok(());
        }
        for slot in &mut self.slots {
            match slot {
                Slot::Input { promoted, .. } => *promoted = None,
                Slot::Output { array, original } => array.convert_precision(*original)?,
            }
        }
        tracing::debug!(operands = self.slots.len(), "depromoted operands");
        Ok(())
    }

    /// Depromote, then forget every operand and resize for reuse.
    ///
    /// An owned cache is cleared; a shared cache is left to its owner.
    pub fn reset(&mut self, capacity: usize) -> Result<()> {
        self.depromote()?;
        self.slots.clear();
        self.capacity = capacity;
        if let CacheRef::Owned(cache) = &mut self.cache {
            cache.clear();
        }
        Ok(())
    }

    /// `tile` at `precision`, from the cache when already converted.
    pub fn get_promoted_tile<'t>(
        &mut self,
        key: TileKey,
        tile: &'t NumericArray,
        precision: Precision,
    ) -> Result<PromotedTile<'t>> {
        if tile.precision() == precision {
            return Ok(PromotedTile::Original(tile));
        }
        self.cache
            .get_mut()
            .get_or_convert(key, tile, precision)
            .map(PromotedTile::Promoted)
    }

    /// Cached copies reachable from this promoter.
    pub fn cache(&mut self) -> &mut TileCache {
        self.cache.get_mut()
    }
}

impl Drop for Promoter<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.depromote() {
            tracing::warn!(%err, "failed to depromote operands on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(index: usize) -> TileKey {
        TileKey { owner: 7, index }
    }

    #[test]
    fn test_promote_to_widest() {
        let half = NumericArray::from_values(&[1.0], Precision::Half);
        let float = NumericArray::from_values(&[2.0], Precision::Float);
        let double = NumericArray::from_values(&[3.0], Precision::Double);

        let mut promoter = Promoter::new(3);
        promoter.insert(&half).unwrap();
        promoter.insert(&float).unwrap();
        promoter.insert(&double).unwrap();

        assert_eq!(promoter.promote().unwrap(), Precision::Double);
        for i in 0..3 {
            let operand = promoter.operand(i).unwrap();
            assert_eq!(operand.precision(), Precision::Double);
            assert_eq!(operand.get(0).unwrap(), (i + 1) as f64);
        }
        assert_eq!(
            promoter.original_precisions(),
            vec![Precision::Half, Precision::Float, Precision::Double]
        );
        drop(promoter);

        assert_eq!(half.precision(), Precision::Half);
        assert_eq!(float.precision(), Precision::Float);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let a = NumericArray::new(1, Precision::Float);
        let mut promoter = Promoter::new(1);
        promoter.insert(&a).unwrap();
        assert_eq!(
            promoter.insert(&a).unwrap_err(),
            Error::Capacity { capacity: 1 }
        );

        promoter.reset(2).unwrap();
        assert!(promoter.is_empty());
        promoter.insert(&a).unwrap();
        promoter.insert(&a).unwrap();
    }

    #[test]
    fn test_output_converted_in_place_and_back() {
        let input = NumericArray::from_values(&[0.25], Precision::Double);
        let mut output = NumericArray::from_values(&[0.5], Precision::Half);
        {
            let mut promoter = Promoter::new(2);
            promoter.insert(&input).unwrap();
            promoter.insert_output(&mut output).unwrap();
            promoter.promote().unwrap();

            let (inputs, out) = promoter.split_output(1).unwrap();
            assert_eq!(inputs.len(), 1);
            assert_eq!(out.precision(), Precision::Double);
            let value = inputs[0].get(0).unwrap() + out.get(0).unwrap();
            out.set(0, value).unwrap();

            promoter.depromote().unwrap();
            promoter.depromote().unwrap();
        }
        assert_eq!(output.precision(), Precision::Half);
        assert_eq!(output.get(0).unwrap(), 0.75);
    }

    #[test]
    fn test_drop_depromotes() {
        let mut output = NumericArray::from_values(&[1.0], Precision::Float);
        {
            let mut promoter = Promoter::new(1);
            promoter.insert_output(&mut output).unwrap();
            promoter.promote_at_least(Precision::Double).unwrap();
        }
        assert_eq!(output.precision(), Precision::Float);
    }

    #[test]
    fn test_split_output_rejects_input_slot() {
        let input = NumericArray::new(1, Precision::Float);
        let mut promoter = Promoter::new(1);
        promoter.insert(&input).unwrap();
        assert!(matches!(
            promoter.split_output(0),
            Err(Error::Type { .. })
        ));
        assert!(matches!(
            promoter.split_output(3),
            Err(Error::Bounds { index: 3, len: 1 })
        ));
    }

    #[test]
    fn test_promoted_tile_is_cached() {
        let tile = NumericArray::from_values(&[1.5, 2.5], Precision::Half);
        let mut promoter = Promoter::new(0);

        let first = promoter
            .get_promoted_tile(key(0), &tile, Precision::Double)
            .unwrap();
        let second = promoter
            .get_promoted_tile(key(0), &tile, Precision::Double)
            .unwrap();
        match (&first, &second) {
            (PromotedTile::Promoted(a), PromotedTile::Promoted(b)) => assert!(Rc::ptr_eq(a, b)),
            _ => panic!("expected cached copies"),
        }
        assert_eq!(second.get(1).unwrap(), 2.5);

        let same = promoter
            .get_promoted_tile(key(0), &tile, Precision::Half)
            .unwrap();
        assert!(matches!(same, PromotedTile::Original(_)));
        assert_eq!(promoter.cache().len(), 1);
    }

    #[test]
    fn test_shared_cache_outlives_promoter() {
        let tile = NumericArray::from_values(&[1.0], Precision::Float);
        let target = NumericArray::new(1, Precision::Double);
        let mut cache = TileCache::new();

        for _ in 0..2 {
            let mut promoter = Promoter::with_cache(2, &mut cache);
            promoter.insert_tile(key(3), &tile).unwrap();
            promoter.insert(&target).unwrap();
            promoter.promote().unwrap();
            promoter.reset(2).unwrap();
        }
        assert_eq!(cache.len(), 1);
        assert!(cache.get(key(3), Precision::Double).is_some());

        cache.invalidate(key(3));
        assert!(cache.is_empty());
    }
}
