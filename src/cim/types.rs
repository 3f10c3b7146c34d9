use std::fmt;
use std::str::FromStr;

use crate::err::ValueError;

/// The CIM intrinsic types, as spelled in DSP0201 `TYPE`/`PARAMTYPE`
/// attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CimType {
    Boolean,
    String,
    Char16,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Sint8,
    Sint16,
    Sint32,
    Sint64,
    Real32,
    Real64,
    DateTime,
    Reference,
}

impl CimType {
    pub fn name(self) -> &'static str {
        match self {
            CimType::Boolean => "boolean",
            CimType::String => "string",
            CimType::Char16 => "char16",
            CimType::Uint8 => "uint8",
            CimType::Uint16 => "uint16",
            CimType::Uint32 => "uint32",
            CimType::Uint64 => "uint64",
            CimType::Sint8 => "sint8",
            CimType::Sint16 => "sint16",
            CimType::Sint32 => "sint32",
            CimType::Sint64 => "sint64",
            CimType::Real32 => "real32",
            CimType::Real64 => "real64",
            CimType::DateTime => "datetime",
            CimType::Reference => "reference",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            CimType::Uint8
                | CimType::Uint16
                | CimType::Uint32
                | CimType::Uint64
                | CimType::Sint8
                | CimType::Sint16
                | CimType::Sint32
                | CimType::Sint64
        )
    }

    pub fn is_real(self) -> bool {
        matches!(self, CimType::Real32 | CimType::Real64)
    }
}

impl fmt::Display for CimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CimType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "boolean" => CimType::Boolean,
            "string" => CimType::String,
            "char16" => CimType::Char16,
            "uint8" => CimType::Uint8,
            "uint16" => CimType::Uint16,
            "uint32" => CimType::Uint32,
            "uint64" => CimType::Uint64,
            "sint8" => CimType::Sint8,
            "sint16" => CimType::Sint16,
            "sint32" => CimType::Sint32,
            "sint64" => CimType::Sint64,
            "real32" => CimType::Real32,
            "real64" => CimType::Real64,
            "datetime" => CimType::DateTime,
            "reference" => CimType::Reference,
            _ => {
                return Err(ValueError::UnknownType {
                    name: s.to_owned(),
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for ty in [
            CimType::Boolean,
            CimType::String,
            CimType::Char16,
            CimType::Uint8,
            CimType::Uint16,
            CimType::Uint32,
            CimType::Uint64,
            CimType::Sint8,
            CimType::Sint16,
            CimType::Sint32,
            CimType::Sint64,
            CimType::Real32,
            CimType::Real64,
            CimType::DateTime,
            CimType::Reference,
        ] {
            assert_eq!(ty.name().parse::<CimType>().unwrap(), ty);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("UInt32".parse::<CimType>().unwrap(), CimType::Uint32);
        assert!("complex128".parse::<CimType>().is_err());
    }
}
