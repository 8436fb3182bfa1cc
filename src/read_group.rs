use crate::error::Error;
use parking_lot::{RwLock, RwLockReadGuard};

/// The callback through which the engine samples target process memory.
///
/// Returning `Ok(n)` with `n` less than `out.len()` is a tolerated short
/// read: the group keeps its partial current generation but becomes
/// ineligible for relative comparisons until the next full read. `Err` is a
/// reader contract failure and aborts the scan.
pub trait ByteReader: Send + Sync {
    fn read(&self, base_address: u64, out: &mut [u8]) -> anyhow::Result<usize>;
}

impl<F> ByteReader for F
where
    F: Fn(u64, &mut [u8]) -> anyhow::Result<usize> + Send + Sync,
{
    fn read(&self, base_address: u64, out: &mut [u8]) -> anyhow::Result<usize> {
        self(base_address, out)
    }
}

/// The two byte generations sampled for a read group.
///
/// Buffers may be longer than the group's logical size by the safe-read
/// padding; the padding bytes are always zero.
#[derive(Debug, Default)]
pub(crate) struct Buffers {
    current: Option<Vec<u8>>,
    previous: Option<Vec<u8>>,
    /// Whether the last read filled the full logical size.
    complete: bool,
    /// Extra zeroed bytes appended to both buffers for wide loads.
    padding: usize,
}

impl Buffers {
    pub(crate) fn current(&self) -> Option<&[u8]> {
        self.current.as_deref()
    }

    pub(crate) fn previous(&self) -> Option<&[u8]> {
        self.previous.as_deref()
    }

    pub(crate) fn can_compare(&self) -> bool {
        self.previous.is_some() && self.complete
    }

    pub(crate) fn padding(&self) -> usize {
        self.padding
    }
}

/// The owning container of sampled bytes for one contiguous range of target
/// memory. Multiple snapshot regions may view into a single group.
///
/// Buffers are written by exactly one writer during the read phase and are
/// read-only while scanners run, hence the reader/writer lock.
#[derive(Debug)]
pub struct ReadGroup {
    base_address: u64,
    size: usize,
    buffers: RwLock<Buffers>,
}

impl ReadGroup {
    /// Create a group for the given address range. No bytes are allocated
    /// until the first read.
    pub fn new(base_address: u64, size: usize) -> Self {
        Self {
            base_address,
            size,
            buffers: RwLock::new(Buffers::default()),
        }
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Test if the group holds a current generation.
    pub fn has_current(&self) -> bool {
        self.buffers.read().current.is_some()
    }

    /// Test if the group is eligible for relative comparisons.
    pub fn can_compare(&self) -> bool {
        self.buffers.read().can_compare()
    }

    /// Sample the group through the given reader.
    ///
    /// The old current generation becomes the previous generation and the
    /// new current generation is filled from the reader. Unread tail bytes
    /// after a short read are zeroed so buffer contents stay deterministic.
    pub fn read_all(&self, reader: &dyn ByteReader) -> Result<(), Error> {
        let mut buffers = self.buffers.write();
        let padding = buffers.padding;

        // Reuse the allocation rotating out of the previous slot.
        let mut next = buffers.previous.take().unwrap_or_default();
        next.clear();
        next.resize(self.size + padding, 0);

        buffers.previous = buffers.current.take();

        let read = reader
            .read(self.base_address, &mut next[..self.size])
            .map_err(Error::ReadFailed)?;

        buffers.complete = read >= self.size;

        if read < self.size {
            next[read..self.size].fill(0);
        }

        buffers.current = Some(next);
        Ok(())
    }

    /// Pad both generations with zeros so a `width`-wide load at any
    /// in-bounds element offset stays inside the allocation. The logical
    /// size is unchanged.
    pub fn resize_for_safe_reading(&self, width: usize) {
        let mut buffers = self.buffers.write();

        if buffers.padding >= width {
            return;
        }

        buffers.padding = width;
        let len = self.size + width;

        if let Some(current) = buffers.current.as_mut() {
            current.resize(len, 0);
        }

        if let Some(previous) = buffers.previous.as_mut() {
            previous.resize(len, 0);
        }
    }

    pub(crate) fn buffers(&self) -> RwLockReadGuard<'_, Buffers> {
        self.buffers.read()
    }
}

#[cfg(test)]
mod tests {
    use super::ReadGroup;

    fn reader(bytes: Vec<u8>) -> impl Fn(u64, &mut [u8]) -> anyhow::Result<usize> {
        move |_: u64, out: &mut [u8]| -> anyhow::Result<usize> {
            let len = usize::min(out.len(), bytes.len());
            out[..len].copy_from_slice(&bytes[..len]);
            Ok(len)
        }
    }

    #[test]
    fn test_generations_rotate() -> anyhow::Result<()> {
        let group = ReadGroup::new(0x1000, 4);
        assert!(!group.has_current());

        group.read_all(&reader(vec![1, 2, 3, 4]))?;
        assert!(group.has_current());
        assert!(!group.can_compare());

        group.read_all(&reader(vec![1, 2, 9, 4]))?;
        assert!(group.can_compare());

        let buffers = group.buffers();
        assert_eq!(Some(&[1, 2, 9, 4][..]), buffers.current());
        assert_eq!(Some(&[1, 2, 3, 4][..]), buffers.previous());
        Ok(())
    }

    #[test]
    fn test_short_read_blocks_comparisons() -> anyhow::Result<()> {
        let group = ReadGroup::new(0x1000, 4);
        group.read_all(&reader(vec![1, 2, 3, 4]))?;
        group.read_all(&reader(vec![5, 6]))?;

        assert!(!group.can_compare());

        {
            // the unread tail is zeroed, not stale
            let buffers = group.buffers();
            assert_eq!(Some(&[5, 6, 0, 0][..]), buffers.current());
        }

        group.read_all(&reader(vec![7, 8, 9, 10]))?;
        assert!(group.can_compare());
        Ok(())
    }

    #[test]
    fn test_safe_reading_pads_with_zeros() -> anyhow::Result<()> {
        let group = ReadGroup::new(0x1000, 4);
        group.read_all(&reader(vec![1, 2, 3, 4]))?;
        group.resize_for_safe_reading(16);

        let buffers = group.buffers();
        let current = buffers.current().unwrap();
        assert_eq!(20, current.len());
        assert_eq!(&[1, 2, 3, 4], &current[..4]);
        assert!(current[4..].iter().all(|b| *b == 0));
        Ok(())
    }
}
