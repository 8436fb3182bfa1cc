use crate::read_group::ReadGroup;
use std::sync::Arc;

/// A candidate slice within a read group that is still passing all filters
/// applied so far.
#[derive(Debug, Clone)]
pub struct SnapshotRegion {
    read_group: Arc<ReadGroup>,
    offset_in_group: usize,
    region_size: usize,
    /// Linear index of this region's first element within the snapshot.
    /// Assigned by the enclosing snapshot when counts are rebuilt.
    base_element_index: u64,
}

impl SnapshotRegion {
    pub fn new(read_group: Arc<ReadGroup>, offset_in_group: usize, region_size: usize) -> Self {
        debug_assert!(offset_in_group + region_size <= read_group.size());

        Self {
            read_group,
            offset_in_group,
            region_size,
            base_element_index: 0,
        }
    }

    /// Create a region spanning a whole read group.
    pub fn spanning(read_group: Arc<ReadGroup>) -> Self {
        let region_size = read_group.size();
        Self::new(read_group, 0, region_size)
    }

    pub fn read_group(&self) -> &Arc<ReadGroup> {
        &self.read_group
    }

    pub fn offset_in_group(&self) -> usize {
        self.offset_in_group
    }

    pub fn region_size(&self) -> usize {
        self.region_size
    }

    pub fn base_address(&self) -> u64 {
        self.read_group.base_address() + self.offset_in_group as u64
    }

    pub fn base_element_index(&self) -> u64 {
        self.base_element_index
    }

    pub(crate) fn set_base_element_index(&mut self, index: u64) {
        self.base_element_index = index;
    }

    /// The number of elements this region holds at the given element size
    /// and stride: one for every stride-aligned offset where a whole element
    /// still fits.
    pub fn element_count(&self, element_size: usize, stride: usize) -> usize {
        if self.region_size < element_size {
            return 0;
        }

        (self.region_size - element_size) / stride + 1
    }

    /// The address of the element at the given index within this region.
    pub fn element_address(&self, index: usize, stride: usize) -> u64 {
        self.base_address() + (index * stride) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::SnapshotRegion;
    use crate::ReadGroup;
    use std::sync::Arc;

    #[test]
    fn test_element_count() {
        let group = Arc::new(ReadGroup::new(0x1000, 16));
        let region = SnapshotRegion::spanning(group);

        // element count matches a naive walk over fitting offsets
        for element_size in [1usize, 2, 4, 8] {
            for stride in [1usize, 2, 4, 8] {
                let naive = (0..region.region_size())
                    .step_by(stride)
                    .filter(|offset| offset + element_size <= region.region_size())
                    .count();

                assert_eq!(
                    naive,
                    region.element_count(element_size, stride),
                    "element_size={} stride={}",
                    element_size,
                    stride
                );
            }
        }
    }

    #[test]
    fn test_element_count_undersized_region() {
        let group = Arc::new(ReadGroup::new(0x1000, 3));
        let region = SnapshotRegion::spanning(group);
        assert_eq!(0, region.element_count(4, 1));
        assert_eq!(3, region.element_count(1, 1));
    }
}
