//! A vectorized memory scanning engine.
//!
//! Snapshots of a target process's memory are filtered repeatedly by typed
//! constraint trees until the surviving addresses are few enough to inspect.
//! The engine is OS-agnostic: bytes arrive through a [`ByteReader`] callback
//! and results leave as [`Snapshot`]s.

mod alignment;
mod compare;
mod constraint;
mod error;
mod progress_reporter;
mod read_group;
mod region;
mod rle;
mod scan;
mod scanner;
mod snapshot;
mod token;
mod ty;
mod value;
mod vector;

pub use self::alignment::Alignment;
pub use self::constraint::{BooleanOp, Constraint, ScanKind};
pub use self::error::Error;
pub use self::read_group::{ByteReader, ReadGroup};
pub use self::region::SnapshotRegion;
pub use self::scan::{ScanProgress, ScanRequest, ScanState, Scanner};
pub use self::snapshot::{Snapshot, SnapshotStack};
pub use self::token::Token;
pub use self::ty::{Endianness, Type};
pub use self::value::Value;
pub use self::vector::VECTOR_WIDTH;
