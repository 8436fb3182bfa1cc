use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::{fmt, mem, str};

/// The type of a scanned element.
///
/// Buffers hold raw bytes; the type decides how many bytes one element
/// occupies and how an immediate value is interpreted during a compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    #[serde(rename = "u8")]
    U8,
    #[serde(rename = "i8")]
    I8,
    #[serde(rename = "u16")]
    U16,
    #[serde(rename = "i16")]
    I16,
    #[serde(rename = "u32")]
    U32,
    #[serde(rename = "i32")]
    I32,
    #[serde(rename = "u64")]
    U64,
    #[serde(rename = "i64")]
    I64,
    #[serde(rename = "f32")]
    F32,
    #[serde(rename = "f64")]
    F64,
    /// An opaque byte array of the given length.
    #[serde(rename = "bytes")]
    Bytes(usize),
}

impl Type {
    /// The size in bytes that a single element of this type occupies.
    #[inline]
    pub fn size(&self) -> usize {
        use self::Type::*;

        match *self {
            U8 => mem::size_of::<u8>(),
            I8 => mem::size_of::<i8>(),
            U16 => mem::size_of::<u16>(),
            I16 => mem::size_of::<i16>(),
            U32 => mem::size_of::<u32>(),
            I32 => mem::size_of::<i32>(),
            U64 => mem::size_of::<u64>(),
            I64 => mem::size_of::<i64>(),
            F32 => mem::size_of::<f32>(),
            F64 => mem::size_of::<f64>(),
            Bytes(len) => len,
        }
    }

    /// Test if this is a numeric primitive.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Type::Bytes(..))
    }
}

impl str::FromStr for Type {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let ty = match input {
            "u8" => Type::U8,
            "i8" => Type::I8,
            "u16" => Type::U16,
            "i16" => Type::I16,
            "u32" => Type::U32,
            "i32" => Type::I32,
            "u64" => Type::U64,
            "i64" => Type::I64,
            "f32" => Type::F32,
            "f64" => Type::F64,
            other => {
                // byte arrays are spelled `bytes/16`.
                let mut it = other.splitn(2, '/');

                match (it.next(), it.next()) {
                    (Some("bytes"), Some(len)) => {
                        let len = str::parse::<usize>(len)
                            .map_err(|_| Error::TypeParse(input.to_string()))?;
                        Type::Bytes(len)
                    }
                    _ => return Err(Error::TypeParse(input.to_string())),
                }
            }
        };

        Ok(ty)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::Type::*;

        match *self {
            U8 => "u8".fmt(fmt),
            I8 => "i8".fmt(fmt),
            U16 => "u16".fmt(fmt),
            I16 => "i16".fmt(fmt),
            U32 => "u32".fmt(fmt),
            I32 => "i32".fmt(fmt),
            U64 => "u64".fmt(fmt),
            I64 => "i64".fmt(fmt),
            F32 => "f32".fmt(fmt),
            F64 => "f64".fmt(fmt),
            Bytes(len) => write!(fmt, "bytes/{}", len),
        }
    }
}

/// The byte order elements are read with.
///
/// Endianness is a property of the scanned value, not of the buffer: buffers
/// always hold raw target bytes and big-endian variants are reversed on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    #[serde(rename = "little")]
    Little,
    #[serde(rename = "big")]
    Big,
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Little
    }
}

impl str::FromStr for Endianness {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "little" | "le" => Ok(Endianness::Little),
            "big" | "be" => Ok(Endianness::Big),
            _ => Err(Error::TypeParse(input.to_string())),
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => "little".fmt(fmt),
            Endianness::Big => "big".fmt(fmt),
        }
    }
}
