use crate::region::SnapshotRegion;

/// Compacts a left-to-right stream of per-element pass/fail outcomes over
/// one parent region into contiguous survivor regions.
///
/// Passing results only grow the open run (`encode_batch`); a run is closed
/// and emitted when a failing result arrives (`finalize_current_encode`), so
/// adjacent passing elements always coalesce into a single region.
pub(crate) struct RunLengthEncoder<'a> {
    parent: &'a SnapshotRegion,
    element_size: usize,
    stride: usize,
    /// Byte offset within the parent where the open run began.
    run_start: usize,
    /// Passing bytes accumulated in the open run (stride bytes per element).
    run_length: usize,
    regions: Vec<SnapshotRegion>,
}

impl<'a> RunLengthEncoder<'a> {
    pub(crate) fn new(parent: &'a SnapshotRegion, element_size: usize, stride: usize) -> Self {
        Self {
            parent,
            element_size,
            stride,
            run_start: 0,
            run_length: 0,
            regions: Vec::new(),
        }
    }

    /// Extend the open run by `bytes` of passing results.
    #[inline(always)]
    pub(crate) fn encode_batch(&mut self, bytes: usize) {
        self.run_length += bytes;
    }

    /// Close the open run, then skip `bytes` of failing results.
    ///
    /// An emitted region spans from the first passing element to the end of
    /// the last one, so its size is the run length widened by the tail of
    /// the final element (`element_size - stride` extra bytes).
    #[inline]
    pub(crate) fn finalize_current_encode(&mut self, bytes: usize) {
        if self.run_length > 0 {
            let size = self.run_length - self.stride + self.element_size;
            debug_assert!(self.run_start + size <= self.parent.region_size());

            self.regions.push(SnapshotRegion::new(
                self.parent.read_group().clone(),
                self.parent.offset_in_group() + self.run_start,
                size,
            ));
        }

        self.run_start += self.run_length + bytes;
        self.run_length = 0;
    }

    /// Close any open run and return the collected survivor regions in
    /// ascending offset order.
    pub(crate) fn gather_collected_regions(mut self) -> Vec<SnapshotRegion> {
        self.finalize_current_encode(0);
        self.regions
    }
}
