//! The per-region scan loop.
//!
//! One scanner invocation walks a single parent region with a compiled
//! compare action and produces its surviving subregions through the
//! run-length encoder. Numeric types run the vectorized loop; byte arrays
//! run a seeded element-wise comparer.

use crate::{
    compare::{BytesComparer, CompareFn},
    region::SnapshotRegion,
    rle::RunLengthEncoder,
    token::Token,
    vector::{ByteVector, VECTOR_WIDTH},
};

/// Cancel poll cadence for vector rows.
const VECTOR_POLL_MASK: usize = 0x3ff;

/// Cancel poll cadence for element-wise positions.
const ELEMENT_POLL_MASK: usize = 0xfff;

/// Scan one region with a compiled numeric compare action.
///
/// With element size `S` and stride `A <= S`, each vector step evaluates the
/// compare action at every stride offset within an element slot, tagging
/// passing lanes with one bit per offset. A fully passing or fully failing
/// vector feeds the encoder in one batch; mixed vectors walk the flag byte
/// of each slot in address order. Trailing positions that do not fill a
/// whole vector (and regions smaller than one vector) are evaluated
/// element-wise through the same compare action, so both paths produce
/// bit-identical survivors.
pub(crate) fn scan_region(
    region: &SnapshotRegion,
    compare: &CompareFn,
    element_size: usize,
    stride: usize,
    relative: bool,
    cancel: &Token,
) -> Vec<SnapshotRegion> {
    let buffers = region.read_group().buffers();

    let current = match buffers.current() {
        Some(current) => current,
        None => return Vec::new(),
    };

    if relative && !buffers.can_compare() {
        return Vec::new();
    }

    // Absolute trees never dereference the previous generation; alias the
    // current buffer so the loop stays uniform.
    let previous = match buffers.previous() {
        Some(previous) if relative => previous,
        _ => current,
    };

    let positions = region.element_count(element_size, stride);

    if positions == 0 {
        return Vec::new();
    }

    // Every compare loads a whole vector, so the group must be padded.
    debug_assert!(buffers.padding() >= VECTOR_WIDTH);

    let offset = region.offset_in_group();
    let mut encoder = RunLengthEncoder::new(region, element_size, stride);
    let mut position = 0usize;

    if stride <= element_size && element_size <= VECTOR_WIDTH {
        let scans_per_vector = element_size / stride;
        let positions_per_vector = VECTOR_WIDTH / stride;
        let full_vectors = positions / positions_per_vector;
        let all_pass = ByteVector::splat(((1u16 << scans_per_vector) - 1) as u8);
        let slots = VECTOR_WIDTH / element_size;

        for vector in 0..full_vectors {
            if vector & VECTOR_POLL_MASK == 0 && cancel.is_set() {
                return Vec::new();
            }

            let vector_offset = offset + vector * VECTOR_WIDTH;
            let mut flags = ByteVector::ZERO;

            for scan in 0..scans_per_vector {
                let at = vector_offset + scan * stride;
                let mask = compare(&current[at..], &previous[at..]);
                flags |= mask & ByteVector::splat(1 << scan);
            }

            if flags == all_pass {
                encoder.encode_batch(VECTOR_WIDTH);
            } else if flags.is_zero() {
                encoder.finalize_current_encode(VECTOR_WIDTH);
            } else {
                for slot in 0..slots {
                    let slot_flags = flags.byte(slot * element_size);

                    for scan in 0..scans_per_vector {
                        if slot_flags & (1 << scan) != 0 {
                            encoder.encode_batch(stride);
                        } else {
                            encoder.finalize_current_encode(stride);
                        }
                    }
                }
            }
        }

        position = full_vectors * positions_per_vector;
    }

    // Element-wise fallback: lane 0 of a padded load is exactly the element
    // at the read position.
    for index in position..positions {
        if index & ELEMENT_POLL_MASK == 0 && cancel.is_set() {
            return Vec::new();
        }

        let at = offset + index * stride;
        let mask = compare(&current[at..], &previous[at..]);

        if mask.byte(0) != 0 {
            encoder.encode_batch(stride);
        } else {
            encoder.finalize_current_encode(stride);
        }
    }

    encoder.gather_collected_regions()
}

/// Scan one region with a compiled byte-array comparer.
///
/// When the whole tree is a single equality the first pattern byte seeds a
/// `memchr` skip over non-candidate positions.
pub(crate) fn scan_region_bytes(
    region: &SnapshotRegion,
    comparer: &BytesComparer,
    element_size: usize,
    stride: usize,
    relative: bool,
    cancel: &Token,
) -> Vec<SnapshotRegion> {
    let buffers = region.read_group().buffers();

    let current = match buffers.current() {
        Some(current) => current,
        None => return Vec::new(),
    };

    if relative && !buffers.can_compare() {
        return Vec::new();
    }

    let previous = match buffers.previous() {
        Some(previous) if relative => previous,
        _ => current,
    };

    let positions = region.element_count(element_size, stride);

    if positions == 0 {
        return Vec::new();
    }

    let offset = region.offset_in_group();
    let mut encoder = RunLengthEncoder::new(region, element_size, stride);

    match comparer.seed() {
        Some(seed) if stride == 1 => {
            let mut index = 0usize;

            while index < positions {
                if cancel.is_set() {
                    return Vec::new();
                }

                let at = offset + index;

                let skip = match memchr::memchr(seed, &current[at..offset + positions]) {
                    Some(skip) => skip,
                    None => {
                        encoder.finalize_current_encode(positions - index);
                        break;
                    }
                };

                if skip > 0 {
                    encoder.finalize_current_encode(skip);
                    index += skip;
                }

                let at = offset + index;

                if comparer.test(&current[at..], &previous[at..]) {
                    encoder.encode_batch(1);
                } else {
                    encoder.finalize_current_encode(1);
                }

                index += 1;
            }
        }
        _ => {
            for index in 0..positions {
                if index & ELEMENT_POLL_MASK == 0 && cancel.is_set() {
                    return Vec::new();
                }

                let at = offset + index * stride;

                if comparer.test(&current[at..], &previous[at..]) {
                    encoder.encode_batch(stride);
                } else {
                    encoder.finalize_current_encode(stride);
                }
            }
        }
    }

    encoder.gather_collected_regions()
}

#[cfg(test)]
mod tests {
    use super::{scan_region, scan_region_bytes};
    use crate::{
        compare::{compile, compile_bytes},
        constraint::{Constraint, ScanKind},
        ty::{Endianness, Type},
        value::Value,
        vector::VECTOR_WIDTH,
        ReadGroup, SnapshotRegion, Token,
    };
    use std::sync::Arc;

    fn group_with(bytes: &[u8]) -> Arc<ReadGroup> {
        let group = Arc::new(ReadGroup::new(0x1000, bytes.len()));
        let data = bytes.to_vec();
        group
            .read_all(&move |_: u64, out: &mut [u8]| -> anyhow::Result<usize> {
                out.copy_from_slice(&data[..out.len()]);
                Ok(out.len())
            })
            .expect("read");
        group.resize_for_safe_reading(VECTOR_WIDTH);
        group
    }

    #[test]
    fn test_vector_and_element_paths_agree() -> anyhow::Result<()> {
        // 64 bytes of u32 counters; every multiple of 3 passes.
        let mut bytes = Vec::new();

        for value in 0u32..16 {
            bytes.extend_from_slice(&(value % 3).to_le_bytes());
        }

        let constraint = Constraint::with_value(ScanKind::Eq, Value::U32(0));
        let action = compile(&constraint, Type::U32, Endianness::Little)?;

        let group = group_with(&bytes);
        let region = SnapshotRegion::spanning(group);
        let cancel = Token::new();

        let survivors = scan_region(&region, &action, 4, 4, false, &cancel);

        let addresses: Vec<_> = survivors
            .iter()
            .flat_map(|region| {
                (0..region.element_count(4, 4)).map(|index| region.element_address(index, 4))
            })
            .collect();

        let expected: Vec<_> = (0u64..16)
            .filter(|value| value % 3 == 0)
            .map(|value| 0x1000 + value * 4)
            .collect();

        assert_eq!(expected, addresses);
        Ok(())
    }

    #[test]
    fn test_misaligned_survivors() -> anyhow::Result<()> {
        // a 1000u32 planted at a non-4-aligned offset is only found at
        // stride 1
        let mut bytes = vec![0u8; 64];
        bytes[13..17].copy_from_slice(&1000u32.to_le_bytes());

        let constraint = Constraint::with_value(ScanKind::Eq, Value::U32(1000));
        let action = compile(&constraint, Type::U32, Endianness::Little)?;

        let group = group_with(&bytes);
        let region = SnapshotRegion::spanning(group.clone());
        let cancel = Token::new();

        let aligned = scan_region(&region, &action, 4, 4, false, &cancel);
        assert!(aligned.is_empty());

        let unaligned = scan_region(&region, &action, 4, 1, false, &cancel);
        assert_eq!(1, unaligned.len());
        assert_eq!(0x1000 + 13, unaligned[0].base_address());
        assert_eq!(4, unaligned[0].region_size());
        Ok(())
    }

    #[test]
    fn test_relative_requires_comparable_group() -> anyhow::Result<()> {
        let group = group_with(&[1u8; 32]);
        let region = SnapshotRegion::spanning(group);
        let cancel = Token::new();

        let constraint = Constraint::scan(ScanKind::Changed, None);
        let action = compile(&constraint, Type::U8, Endianness::Little)?;

        // only one generation read, so no previous to compare against
        let survivors = scan_region(&region, &action, 1, 1, true, &cancel);
        assert!(survivors.is_empty());
        Ok(())
    }

    #[test]
    fn test_bytes_seeded_scan() -> anyhow::Result<()> {
        let mut bytes = vec![0u8; 64];
        bytes[10..14].copy_from_slice(b"\xde\xad\xbe\xef");
        bytes[40..44].copy_from_slice(b"\xde\xad\xbe\xef");
        // a decoy first byte that does not complete the pattern
        bytes[20] = 0xde;

        let constraint =
            Constraint::with_value(ScanKind::Eq, Value::Bytes(b"\xde\xad\xbe\xef".to_vec()));
        let comparer = compile_bytes(&constraint, 4)?;

        let group = group_with(&bytes);
        let region = SnapshotRegion::spanning(group);
        let cancel = Token::new();

        let survivors = scan_region_bytes(&region, &comparer, 4, 1, false, &cancel);

        let spans: Vec<_> = survivors
            .iter()
            .map(|region| (region.base_address(), region.region_size()))
            .collect();

        assert_eq!(vec![(0x1000 + 10, 4), (0x1000 + 40, 4)], spans);
        Ok(())
    }

    #[test]
    fn test_cancel_yields_nothing() -> anyhow::Result<()> {
        let group = group_with(&[0u8; 256]);
        let region = SnapshotRegion::spanning(group);

        let constraint = Constraint::with_value(ScanKind::Eq, Value::U32(0));
        let action = compile(&constraint, Type::U32, Endianness::Little)?;

        let cancel = Token::new();
        cancel.set();

        let survivors = scan_region(&region, &action, 4, 4, false, &cancel);
        assert!(survivors.is_empty());
        Ok(())
    }
}
