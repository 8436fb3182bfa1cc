use crate::{error::Error, Type};
use serde::{Deserialize, Serialize};
use std::{fmt, str};

/// The byte stride between consecutive elements within a region.
///
/// `Auto` resolves against the scanned type: `min(size, 8)` for numerics,
/// always 1 for byte arrays. Illegal strides are unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alignment {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "auto")]
    Auto,
}

impl Alignment {
    /// Resolve to a concrete stride for the given type.
    pub fn resolve(self, ty: Type) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
            Self::Eight => 8,
            Self::Auto => {
                if ty.is_numeric() {
                    usize::min(ty.size(), 8)
                } else {
                    1
                }
            }
        }
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::Auto
    }
}

impl str::FromStr for Alignment {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "1" => Ok(Self::One),
            "2" => Ok(Self::Two),
            "4" => Ok(Self::Four),
            "8" => Ok(Self::Eight),
            "auto" => Ok(Self::Auto),
            _ => Err(Error::AlignmentParse(input.to_string())),
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => "1".fmt(fmt),
            Self::Two => "2".fmt(fmt),
            Self::Four => "4".fmt(fmt),
            Self::Eight => "8".fmt(fmt),
            Self::Auto => "auto".fmt(fmt),
        }
    }
}
