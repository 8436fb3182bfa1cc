use crate::{error::Error, Type};
use serde::{Deserialize, Serialize};
use std::{fmt, str};

/// A single dynamic literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    #[serde(rename = "u8")]
    U8(u8),
    #[serde(rename = "i8")]
    I8(i8),
    #[serde(rename = "u16")]
    U16(u16),
    #[serde(rename = "i16")]
    I16(i16),
    #[serde(rename = "u32")]
    U32(u32),
    #[serde(rename = "i32")]
    I32(i32),
    #[serde(rename = "u64")]
    U64(u64),
    #[serde(rename = "i64")]
    I64(i64),
    #[serde(rename = "f32")]
    F32(f32),
    #[serde(rename = "f64")]
    F64(f64),
    #[serde(rename = "bytes")]
    Bytes(Vec<u8>),
}

impl Value {
    /// Get the type of the value.
    pub fn ty(&self) -> Type {
        match self {
            Self::U8(..) => Type::U8,
            Self::I8(..) => Type::I8,
            Self::U16(..) => Type::U16,
            Self::I16(..) => Type::I16,
            Self::U32(..) => Type::U32,
            Self::I32(..) => Type::I32,
            Self::U64(..) => Type::U64,
            Self::I64(..) => Type::I64,
            Self::F32(..) => Type::F32,
            Self::F64(..) => Type::F64,
            Self::Bytes(bytes) => Type::Bytes(bytes.len()),
        }
    }

    /// Get the size in bytes of this value.
    pub fn size(&self) -> usize {
        self.ty().size()
    }
}

impl Type {
    /// Parse a string as a value of this type.
    pub fn parse(&self, input: &str) -> Result<Value, Error> {
        let err = || Error::ValueParse(input.to_string());

        let value = match *self {
            Type::U8 => Value::U8(str::parse::<u8>(input).map_err(|_| err())?),
            Type::I8 => Value::I8(str::parse::<i8>(input).map_err(|_| err())?),
            Type::U16 => Value::U16(str::parse::<u16>(input).map_err(|_| err())?),
            Type::I16 => Value::I16(str::parse::<i16>(input).map_err(|_| err())?),
            Type::U32 => Value::U32(str::parse::<u32>(input).map_err(|_| err())?),
            Type::I32 => Value::I32(str::parse::<i32>(input).map_err(|_| err())?),
            Type::U64 => Value::U64(str::parse::<u64>(input).map_err(|_| err())?),
            Type::I64 => Value::I64(str::parse::<i64>(input).map_err(|_| err())?),
            Type::F32 => Value::F32(str::parse::<f32>(input).map_err(|_| err())?),
            Type::F64 => Value::F64(str::parse::<f64>(input).map_err(|_| err())?),
            Type::Bytes(..) => return Err(err()),
        };

        Ok(value)
    }

    /// Parse a string as a hex value of this type.
    pub fn parse_hex(&self, input: &str) -> Result<Value, Error> {
        let err = || Error::ValueParse(input.to_string());

        let value = match *self {
            Type::U8 => Value::U8(u8::from_str_radix(input, 16).map_err(|_| err())?),
            Type::I8 => Value::I8(i8::from_str_radix(input, 16).map_err(|_| err())?),
            Type::U16 => Value::U16(u16::from_str_radix(input, 16).map_err(|_| err())?),
            Type::I16 => Value::I16(i16::from_str_radix(input, 16).map_err(|_| err())?),
            Type::U32 => Value::U32(u32::from_str_radix(input, 16).map_err(|_| err())?),
            Type::I32 => Value::I32(i32::from_str_radix(input, 16).map_err(|_| err())?),
            Type::U64 => Value::U64(u64::from_str_radix(input, 16).map_err(|_| err())?),
            Type::I64 => Value::I64(i64::from_str_radix(input, 16).map_err(|_| err())?),
            _ => return Err(err()),
        };

        Ok(value)
    }
}

impl str::FromStr for Value {
    type Err = Error;

    /// Parse a value with an optional type suffix, like `42u8` or `1.5f32`.
    ///
    /// Untyped input defaults to `i32`. A `0x` prefix parses the rest as hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const SUFFIXES: [(&str, Type); 10] = [
            ("u8", Type::U8),
            ("i8", Type::I8),
            ("u16", Type::U16),
            ("i16", Type::I16),
            ("u32", Type::U32),
            ("i32", Type::I32),
            ("u64", Type::U64),
            ("i64", Type::I64),
            ("f32", Type::F32),
            ("f64", Type::F64),
        ];

        let (hex, s) = match s.strip_prefix("0x") {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (s, ty) = SUFFIXES
            .iter()
            .find_map(|(suffix, ty)| {
                let base = s.strip_suffix(suffix)?;

                if base.is_empty() {
                    return None;
                }

                Some((base, *ty))
            })
            .unwrap_or((s, Type::I32));

        if hex {
            ty.parse_hex(s)
        } else {
            ty.parse(s)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(value) => write!(fmt, "{}", value),
            Value::I8(value) => write!(fmt, "{}", value),
            Value::U16(value) => write!(fmt, "{}", value),
            Value::I16(value) => write!(fmt, "{}", value),
            Value::U32(value) => write!(fmt, "{}", value),
            Value::I32(value) => write!(fmt, "{}", value),
            Value::U64(value) => write!(fmt, "{}", value),
            Value::I64(value) => write!(fmt, "{}", value),
            Value::F32(value) => write!(fmt, "{}", value),
            Value::F64(value) => write!(fmt, "{}", value),
            Value::Bytes(bytes) => {
                for (index, byte) in bytes.iter().enumerate() {
                    if index > 0 {
                        write!(fmt, " ")?;
                    }

                    write!(fmt, "{:02x}", byte)?;
                }

                Ok(())
            }
        }
    }
}
