//! Compiled compare actions.
//!
//! A constraint tree is compiled once per scan into a closure tree; the hot
//! loop invokes the root closure at each read position and never dispatches
//! on kind or type again. Each closure reads one vector's worth of elements
//! and returns a mask whose element-sized lanes are all-ones on pass.

use crate::{
    constraint::{BooleanOp, Constraint, ScanKind},
    error::Error,
    ty::{Endianness, Type},
    value::Value,
    vector::{ByteVector, VECTOR_WIDTH},
};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::mem;

/// A compiled compare action.
///
/// Arguments are the current and previous buffers starting at the read
/// position; both must extend at least `VECTOR_WIDTH` bytes (the read-group
/// padding guarantees this). Absolute trees never touch the second argument.
pub(crate) type CompareFn = Box<dyn Fn(&[u8], &[u8]) -> ByteVector + Send + Sync>;

/// One scannable numeric primitive, readable from raw bytes in either byte
/// order.
pub(crate) trait Element: Copy + PartialEq + PartialOrd + Send + Sync + 'static {
    const SIZE: usize;

    fn read<B: ByteOrder>(buf: &[u8]) -> Self;

    fn from_value(value: &Value) -> Option<Self>;

    /// Wrapping for integers, exact for floats.
    fn add(self, other: Self) -> Self;

    fn sub(self, other: Self) -> Self;
}

impl Element for u8 {
    const SIZE: usize = 1;

    #[inline(always)]
    fn read<B: ByteOrder>(buf: &[u8]) -> Self {
        buf[0]
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::U8(v) => Some(*v),
            _ => None,
        }
    }

    #[inline(always)]
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    #[inline(always)]
    fn sub(self, other: Self) -> Self {
        self.wrapping_sub(other)
    }
}

impl Element for i8 {
    const SIZE: usize = 1;

    #[inline(always)]
    fn read<B: ByteOrder>(buf: &[u8]) -> Self {
        buf[0] as i8
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::I8(v) => Some(*v),
            _ => None,
        }
    }

    #[inline(always)]
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    #[inline(always)]
    fn sub(self, other: Self) -> Self {
        self.wrapping_sub(other)
    }
}

macro_rules! impl_element_int {
    ($($ty:ty, $read:ident, $variant:ident;)*) => {$(
        impl Element for $ty {
            const SIZE: usize = mem::size_of::<$ty>();

            #[inline(always)]
            fn read<B: ByteOrder>(buf: &[u8]) -> Self {
                B::$read(buf)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            #[inline(always)]
            fn add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            #[inline(always)]
            fn sub(self, other: Self) -> Self {
                self.wrapping_sub(other)
            }
        }
    )*};
}

macro_rules! impl_element_float {
    ($($ty:ty, $read:ident, $variant:ident;)*) => {$(
        impl Element for $ty {
            const SIZE: usize = mem::size_of::<$ty>();

            #[inline(always)]
            fn read<B: ByteOrder>(buf: &[u8]) -> Self {
                B::$read(buf)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            #[inline(always)]
            fn add(self, other: Self) -> Self {
                self + other
            }

            #[inline(always)]
            fn sub(self, other: Self) -> Self {
                self - other
            }
        }
    )*};
}

impl_element_int! {
    u16, read_u16, U16;
    i16, read_i16, I16;
    u32, read_u32, U32;
    i32, read_i32, I32;
    u64, read_u64, U64;
    i64, read_i64, I64;
}

impl_element_float! {
    f32, read_f32, F32;
    f64, read_f64, F64;
}

/// Compare every element lane against an immediate.
fn immediate<T, B, P>(value: T, predicate: P) -> CompareFn
where
    T: Element,
    B: ByteOrder + 'static,
    P: Fn(T, T) -> bool + Send + Sync + 'static,
{
    Box::new(move |current, _| {
        let mut mask = ByteVector::ZERO;

        for (lane, chunk) in current[..VECTOR_WIDTH].chunks_exact(T::SIZE).enumerate() {
            if predicate(T::read::<B>(chunk), value) {
                mask.set_lane(lane * T::SIZE, T::SIZE);
            }
        }

        mask
    })
}

/// Compare every current element lane against its previous generation.
fn relative<T, B, P>(predicate: P) -> CompareFn
where
    T: Element,
    B: ByteOrder + 'static,
    P: Fn(T, T) -> bool + Send + Sync + 'static,
{
    Box::new(move |current, previous| {
        let mut mask = ByteVector::ZERO;

        let lanes = current[..VECTOR_WIDTH]
            .chunks_exact(T::SIZE)
            .zip(previous[..VECTOR_WIDTH].chunks_exact(T::SIZE));

        for (lane, (cur, prev)) in lanes.enumerate() {
            if predicate(T::read::<B>(cur), T::read::<B>(prev)) {
                mask.set_lane(lane * T::SIZE, T::SIZE);
            }
        }

        mask
    })
}

/// Compare current against previous and an immediate delta.
fn relative_immediate<T, B, P>(value: T, predicate: P) -> CompareFn
where
    T: Element,
    B: ByteOrder + 'static,
    P: Fn(T, T, T) -> bool + Send + Sync + 'static,
{
    Box::new(move |current, previous| {
        let mut mask = ByteVector::ZERO;

        let lanes = current[..VECTOR_WIDTH]
            .chunks_exact(T::SIZE)
            .zip(previous[..VECTOR_WIDTH].chunks_exact(T::SIZE));

        for (lane, (cur, prev)) in lanes.enumerate() {
            if predicate(T::read::<B>(cur), T::read::<B>(prev), value) {
                mask.set_lane(lane * T::SIZE, T::SIZE);
            }
        }

        mask
    })
}

/// Byte-wise lane equality between generations, independent of the element
/// type's interpretation. `NaN != NaN` by value, but an unchanged NaN still
/// has unchanged bytes.
fn byte_equality(size: usize, invert: bool) -> CompareFn {
    Box::new(move |current, previous| {
        let mut mask = ByteVector::ZERO;
        let mut offset = 0;

        while offset + size <= VECTOR_WIDTH {
            let equal = current[offset..offset + size] == previous[offset..offset + size];

            if equal != invert {
                mask.set_lane(offset, size);
            }

            offset += size;
        }

        mask
    })
}

fn leaf<T, B>(kind: ScanKind, value: Option<&Value>, ty: Type) -> Result<CompareFn, Error>
where
    T: Element,
    B: ByteOrder + 'static,
{
    let immediate_value = || -> Result<T, Error> {
        let value = value.ok_or_else(|| {
            Error::InvalidArguments(format!("scan kind `{}` requires a value", kind))
        })?;

        T::from_value(value).ok_or(Error::ValueTypeMismatch {
            expected: ty,
            found: value.ty(),
        })
    };

    let action = match kind {
        ScanKind::Eq => immediate::<T, B, _>(immediate_value()?, |a, b| a == b),
        ScanKind::Neq => immediate::<T, B, _>(immediate_value()?, |a, b| a != b),
        ScanKind::Gt => immediate::<T, B, _>(immediate_value()?, |a, b| a > b),
        ScanKind::Gte => immediate::<T, B, _>(immediate_value()?, |a, b| a >= b),
        ScanKind::Lt => immediate::<T, B, _>(immediate_value()?, |a, b| a < b),
        ScanKind::Lte => immediate::<T, B, _>(immediate_value()?, |a, b| a <= b),
        ScanKind::Unchanged => byte_equality(T::SIZE, false),
        ScanKind::Changed => byte_equality(T::SIZE, true),
        ScanKind::Increased => relative::<T, B, _>(|current, previous| current > previous),
        ScanKind::Decreased => relative::<T, B, _>(|current, previous| current < previous),
        ScanKind::IncreasedBy => {
            relative_immediate::<T, B, _>(immediate_value()?, |current, previous, delta| {
                current == previous.add(delta)
            })
        }
        ScanKind::DecreasedBy => {
            relative_immediate::<T, B, _>(immediate_value()?, |current, previous, delta| {
                current == previous.sub(delta)
            })
        }
    };

    Ok(action)
}

fn compile_leaf(
    kind: ScanKind,
    value: Option<&Value>,
    ty: Type,
    endianness: Endianness,
) -> Result<CompareFn, Error> {
    macro_rules! dispatch {
        ($ty:ty) => {
            match endianness {
                Endianness::Little => leaf::<$ty, LittleEndian>(kind, value, ty),
                Endianness::Big => leaf::<$ty, BigEndian>(kind, value, ty),
            }
        };
    }

    match ty {
        Type::U8 => dispatch!(u8),
        Type::I8 => dispatch!(i8),
        Type::U16 => dispatch!(u16),
        Type::I16 => dispatch!(i16),
        Type::U32 => dispatch!(u32),
        Type::I32 => dispatch!(i32),
        Type::U64 => dispatch!(u64),
        Type::I64 => dispatch!(i64),
        Type::F32 => dispatch!(f32),
        Type::F64 => dispatch!(f64),
        Type::Bytes(..) => Err(Error::UnsupportedType { kind, ty }),
    }
}

/// Compile a constraint tree for a numeric scan type.
///
/// Interior nodes close over their children's compiled actions; AND skips
/// the right child when the left mask is all-zeros, OR when it is all-ones.
/// XOR always evaluates both.
pub(crate) fn compile(
    constraint: &Constraint,
    ty: Type,
    endianness: Endianness,
) -> Result<CompareFn, Error> {
    match constraint {
        Constraint::Operation { op, left, right } => {
            let left = compile(left, ty, endianness)?;
            let right = compile(right, ty, endianness)?;

            let action: CompareFn = match op {
                BooleanOp::And => Box::new(move |current, previous| {
                    let mask = left(current, previous);

                    if mask.is_zero() {
                        return mask;
                    }

                    mask & right(current, previous)
                }),
                BooleanOp::Or => Box::new(move |current, previous| {
                    let mask = left(current, previous);

                    if mask == ByteVector::splat(u8::MAX) {
                        return mask;
                    }

                    mask | right(current, previous)
                }),
                BooleanOp::Xor => Box::new(move |current, previous| {
                    left(current, previous) ^ right(current, previous)
                }),
            };

            Ok(action)
        }
        Constraint::Scan { kind, value } => compile_leaf(*kind, value.as_ref(), ty, endianness),
    }
}

/// A compiled per-position test for byte-array scans.
///
/// Byte arrays have arbitrary element sizes and do not fit the lane model;
/// they are evaluated one position at a time. `seed` is the first pattern
/// byte when the whole tree is a single equality, enabling a seeded skip.
pub(crate) struct BytesComparer {
    test: Box<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>,
    seed: Option<u8>,
}

impl BytesComparer {
    #[inline(always)]
    pub(crate) fn test(&self, current: &[u8], previous: &[u8]) -> bool {
        (self.test)(current, previous)
    }

    pub(crate) fn seed(&self) -> Option<u8> {
        self.seed
    }
}

/// Compile a constraint tree for a byte-array scan type.
pub(crate) fn compile_bytes(constraint: &Constraint, len: usize) -> Result<BytesComparer, Error> {
    let test = compile_bytes_test(constraint, len)?;

    let seed = match constraint {
        Constraint::Scan {
            kind: ScanKind::Eq,
            value: Some(Value::Bytes(pattern)),
        } => pattern.first().copied(),
        _ => None,
    };

    Ok(BytesComparer { test, seed })
}

fn compile_bytes_test(
    constraint: &Constraint,
    len: usize,
) -> Result<Box<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>, Error> {
    let ty = Type::Bytes(len);

    match constraint {
        Constraint::Operation { op, left, right } => {
            let left = compile_bytes_test(left, len)?;
            let right = compile_bytes_test(right, len)?;

            let test: Box<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync> = match op {
                BooleanOp::And => {
                    Box::new(move |current, previous| {
                        left(current, previous) && right(current, previous)
                    })
                }
                BooleanOp::Or => {
                    Box::new(move |current, previous| {
                        left(current, previous) || right(current, previous)
                    })
                }
                BooleanOp::Xor => {
                    Box::new(move |current, previous| {
                        left(current, previous) ^ right(current, previous)
                    })
                }
            };

            Ok(test)
        }
        Constraint::Scan { kind, value } => match kind {
            ScanKind::Eq | ScanKind::Neq => {
                let pattern = match value {
                    Some(Value::Bytes(pattern)) => pattern.clone(),
                    Some(other) => {
                        return Err(Error::ValueTypeMismatch {
                            expected: ty,
                            found: other.ty(),
                        })
                    }
                    None => {
                        return Err(Error::InvalidArguments(format!(
                            "scan kind `{}` requires a value",
                            kind
                        )))
                    }
                };

                if pattern.len() != len {
                    return Err(Error::ValueTypeMismatch {
                        expected: ty,
                        found: Type::Bytes(pattern.len()),
                    });
                }

                let invert = *kind == ScanKind::Neq;

                Ok(Box::new(move |current, _| {
                    (current[..pattern.len()] == pattern[..]) != invert
                }))
            }
            ScanKind::Unchanged | ScanKind::Changed => {
                let invert = *kind == ScanKind::Changed;

                Ok(Box::new(move |current, previous| {
                    (current[..len] == previous[..len]) != invert
                }))
            }
            _ => Err(Error::UnsupportedType { kind: *kind, ty }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::compile;
    use crate::{
        constraint::{Constraint, ScanKind},
        ty::{Endianness, Type},
        value::Value,
        vector::VECTOR_WIDTH,
    };

    fn lanes(mask: &crate::vector::ByteVector, size: usize) -> Vec<bool> {
        (0..VECTOR_WIDTH / size)
            .map(|lane| mask.byte(lane * size) != 0)
            .collect()
    }

    #[test]
    fn test_eq_lanes() -> anyhow::Result<()> {
        let constraint = Constraint::with_value(ScanKind::Eq, Value::I32(1000));
        let action = compile(&constraint, Type::I32, Endianness::Little)?;

        let mut buf = [0u8; VECTOR_WIDTH];
        buf[4..8].copy_from_slice(&1000i32.to_le_bytes());
        buf[8..12].copy_from_slice(&1000i32.to_le_bytes());
        buf[12..16].copy_from_slice(&1i32.to_le_bytes());

        let mask = action(&buf, &buf);
        assert_eq!(vec![false, true, true, false], lanes(&mask, 4));
        Ok(())
    }

    #[test]
    fn test_big_endian_lanes() -> anyhow::Result<()> {
        let constraint = Constraint::with_value(ScanKind::Eq, Value::I32(1000));
        let action = compile(&constraint, Type::I32, Endianness::Big)?;

        let mut buf = [0u8; VECTOR_WIDTH];
        buf[0..4].copy_from_slice(&1000i32.to_be_bytes());
        buf[4..8].copy_from_slice(&1000i32.to_le_bytes());

        let mask = action(&buf, &buf);
        assert_eq!(vec![true, false, false, false], lanes(&mask, 4));
        Ok(())
    }

    #[test]
    fn test_nan_compares_false_except_neq() -> anyhow::Result<()> {
        let mut buf = [0u8; VECTOR_WIDTH];
        buf[0..4].copy_from_slice(&f32::NAN.to_le_bytes());

        let eq = compile(
            &Constraint::with_value(ScanKind::Eq, Value::F32(f32::NAN)),
            Type::F32,
            Endianness::Little,
        )?;
        assert!(eq(&buf, &buf).byte(0) == 0);

        let neq = compile(
            &Constraint::with_value(ScanKind::Neq, Value::F32(f32::NAN)),
            Type::F32,
            Endianness::Little,
        )?;
        assert!(neq(&buf, &buf).byte(0) != 0);

        // byte-wise: an unchanged NaN is still unchanged
        let unchanged = compile(
            &Constraint::scan(ScanKind::Unchanged, None),
            Type::F32,
            Endianness::Little,
        )?;
        assert!(unchanged(&buf, &buf).byte(0) != 0);
        Ok(())
    }

    #[test]
    fn test_increased_by_wraps() -> anyhow::Result<()> {
        let constraint = Constraint::with_value(ScanKind::IncreasedBy, Value::U8(10));
        let action = compile(&constraint, Type::U8, Endianness::Little)?;

        let previous = [250u8; VECTOR_WIDTH];
        let current = [4u8; VECTOR_WIDTH];

        let mask = action(&current, &previous);
        assert!((0..VECTOR_WIDTH).all(|lane| mask.byte(lane) != 0));
        Ok(())
    }

    #[test]
    fn test_and_or_masks() -> anyhow::Result<()> {
        let constraint = Constraint::and(
            Constraint::with_value(ScanKind::Gt, Value::U32(5)),
            Constraint::with_value(ScanKind::Lt, Value::U32(20)),
        );
        let action = compile(&constraint, Type::U32, Endianness::Little)?;

        let mut buf = [0u8; VECTOR_WIDTH];
        buf[0..4].copy_from_slice(&10u32.to_le_bytes());
        buf[4..8].copy_from_slice(&25u32.to_le_bytes());
        buf[8..12].copy_from_slice(&3u32.to_le_bytes());
        buf[12..16].copy_from_slice(&19u32.to_le_bytes());

        let mask = action(&buf, &buf);
        assert_eq!(vec![true, false, false, true], lanes(&mask, 4));
        Ok(())
    }
}
