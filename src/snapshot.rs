use crate::{read_group::ReadGroup, region::SnapshotRegion, Alignment, Type};
use hashbrown::HashMap;
use std::sync::Arc;

/// An ordered set of disjoint candidate regions, together with the read
/// groups backing them and aggregate counts over the current element shape.
#[derive(Debug, Clone)]
pub struct Snapshot {
    name: String,
    alignment: Alignment,
    regions: Vec<SnapshotRegion>,
    read_groups: Vec<Arc<ReadGroup>>,
    byte_count: u64,
    element_count: u64,
    /// Element shape of the last rebuild.
    element_size: usize,
    stride: usize,
}

impl Snapshot {
    /// Create a snapshot with one region spanning each read group.
    pub fn new(
        name: impl Into<String>,
        read_groups: Vec<Arc<ReadGroup>>,
        alignment: Alignment,
    ) -> Self {
        let regions = read_groups
            .iter()
            .map(|group| SnapshotRegion::spanning(group.clone()))
            .collect();

        Self::with_regions(name, alignment, regions, read_groups)
    }

    /// Create a snapshot from an arbitrary region set, deduplicating the
    /// backing read groups.
    pub fn from_regions(
        name: impl Into<String>,
        alignment: Alignment,
        regions: Vec<SnapshotRegion>,
    ) -> Self {
        let mut groups: HashMap<u64, Arc<ReadGroup>> = HashMap::new();

        for region in &regions {
            groups
                .entry(region.read_group().base_address())
                .or_insert_with(|| region.read_group().clone());
        }

        let mut read_groups: Vec<_> = groups.into_values().collect();
        read_groups.sort_by_key(|group| group.base_address());

        Self::with_regions(name, alignment, regions, read_groups)
    }

    fn with_regions(
        name: impl Into<String>,
        alignment: Alignment,
        mut regions: Vec<SnapshotRegion>,
        read_groups: Vec<Arc<ReadGroup>>,
    ) -> Self {
        regions.sort_by_key(|region| region.base_address());

        let mut snapshot = Self {
            name: name.into(),
            alignment,
            regions,
            read_groups,
            byte_count: 0,
            element_count: 0,
            element_size: 1,
            stride: 1,
        };

        snapshot.recompute();
        snapshot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn regions(&self) -> &[SnapshotRegion] {
        &self.regions
    }

    pub fn read_groups(&self) -> &[Arc<ReadGroup>] {
        &self.read_groups
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// The element stride of the last rebuild.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The element size of the last rebuild.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Resolve the snapshot's alignment against the given scan type and
    /// recompute aggregate counts and per-region element indexing.
    pub fn rebuild(&mut self, ty: Type) {
        self.element_size = ty.size();
        self.stride = self.alignment.resolve(ty);
        self.recompute();
    }

    fn recompute(&mut self) {
        let mut byte_count = 0u64;
        let mut element_count = 0u64;

        for region in &mut self.regions {
            region.set_base_element_index(element_count);
            byte_count += region.region_size() as u64;
            element_count += region.element_count(self.element_size, self.stride) as u64;
        }

        self.byte_count = byte_count;
        self.element_count = element_count;
    }

    /// Binary-search the region containing the given linear element index.
    ///
    /// This assumes counts are current, i.e. `rebuild` ran since the region
    /// set changed.
    pub fn find_region_by_element_index(&self, index: u64) -> Option<&SnapshotRegion> {
        // regions that hold zero elements at the current shape share their
        // successor's base index, so pick the last region at or below it
        let n = self
            .regions
            .partition_point(|region| region.base_element_index() <= index);

        let region = match n {
            0 => return None,
            n => &self.regions[n - 1],
        };

        let count = region.element_count(self.element_size, self.stride) as u64;

        if index < region.base_element_index() + count {
            return Some(region);
        }

        None
    }

    /// The address of the element at the given linear index.
    pub fn element_address(&self, index: u64) -> Option<u64> {
        let region = self.find_region_by_element_index(index)?;
        let local = (index - region.base_element_index()) as usize;
        Some(region.element_address(local, self.stride))
    }
}

/// The scan history for one session. Committing a filter pushes the
/// survivor snapshot; undo pops it.
#[derive(Default)]
pub struct SnapshotStack {
    snapshots: Vec<Snapshot>,
}

impl SnapshotStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }

    /// Undo the last filter, returning the snapshot that was dropped.
    ///
    /// Byte buffers are rewritten in place each scan, so undo restores the
    /// region set, not byte history beyond one generation.
    pub fn pop(&mut self) -> Option<Snapshot> {
        self.snapshots.pop()
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Snapshot;
    use crate::{Alignment, ReadGroup, SnapshotRegion, Type};
    use std::sync::Arc;

    fn snapshot() -> Snapshot {
        let a = Arc::new(ReadGroup::new(0x1000, 16));
        let b = Arc::new(ReadGroup::new(0x2000, 8));

        let regions = vec![
            SnapshotRegion::new(b.clone(), 0, 8),
            SnapshotRegion::new(a.clone(), 0, 8),
            SnapshotRegion::new(a.clone(), 12, 4),
        ];

        let mut snapshot = Snapshot::from_regions("test", Alignment::Four, regions);
        snapshot.rebuild(Type::I32);
        snapshot
    }

    #[test]
    fn test_counts_and_order() {
        let snapshot = snapshot();

        assert_eq!(3, snapshot.region_count());
        assert_eq!(20, snapshot.byte_count());
        assert_eq!(5, snapshot.element_count());
        assert_eq!(2, snapshot.read_groups().len());

        let bases: Vec<_> = snapshot
            .regions()
            .iter()
            .map(|region| region.base_address())
            .collect();
        assert_eq!(vec![0x1000, 0x100c, 0x2000], bases);
    }

    #[test]
    fn test_find_region_by_element_index() {
        let snapshot = snapshot();

        for index in 0..snapshot.element_count() {
            let region = snapshot
                .find_region_by_element_index(index)
                .expect("index in range");
            let count = region.element_count(4, 4) as u64;

            assert!(region.base_element_index() <= index);
            assert!(index < region.base_element_index() + count);
        }

        assert!(snapshot
            .find_region_by_element_index(snapshot.element_count())
            .is_none());
    }

    #[test]
    fn test_element_address() {
        let snapshot = snapshot();

        let addresses: Vec<_> = (0..snapshot.element_count())
            .map(|index| snapshot.element_address(index).expect("in range"))
            .collect();

        assert_eq!(vec![0x1000, 0x1004, 0x100c, 0x2000, 0x2004], addresses);
    }
}
