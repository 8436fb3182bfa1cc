use crate::{constraint::ScanKind, Type};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("read failed: {0}")]
    ReadFailed(anyhow::Error),
    #[error("scan cancelled")]
    Cancelled,
    #[error("unsupported scan: {kind} on {ty}")]
    UnsupportedType { kind: ScanKind, ty: Type },
    #[error("value type mismatch: expected {expected}, found {found}")]
    ValueTypeMismatch { expected: Type, found: Type },
    #[error("a scan is already in progress")]
    ScanInProgress,
    #[error("failed to parse type: {0}")]
    TypeParse(String),
    #[error("failed to parse alignment: {0}")]
    AlignmentParse(String),
    #[error("failed to parse value: {0}")]
    ValueParse(String),
}
