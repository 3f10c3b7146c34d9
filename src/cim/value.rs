use std::borrow::Cow;

use crate::cim::datetime::CimDateTime;
use crate::cim::object::{CimClass, CimInstance};
use crate::cim::path::CimObjectPath;
use crate::cim::types::CimType;
use crate::err::{ValueError, ValueResult};

/// A typed CIM value: one of the intrinsic scalar types, a reference, an
/// embedded object, or a homogeneous array.
#[derive(Debug, Clone, PartialEq)]
pub enum CimValue {
    Boolean(bool),
    String(String),
    Char16(char),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Sint8(i8),
    Sint16(i16),
    Sint32(i32),
    Sint64(i64),
    Real32(f32),
    Real64(f64),
    DateTime(CimDateTime),
    Reference(CimObjectPath),
    /// An embedded instance, carried on the wire as an escaped `INSTANCE`
    /// document inside a string-typed value.
    Instance(Box<CimInstance>),
    /// An embedded class, carried the same way.
    Class(Box<CimClass>),
    Array(CimArray),
}

impl CimValue {
    /// The CIM type this value serializes as. Embedded objects travel as
    /// strings; arrays report their element type (see [`CimValue::is_array`]).
    pub fn cim_type(&self) -> CimType {
        match self {
            CimValue::Boolean(_) => CimType::Boolean,
            CimValue::String(_) => CimType::String,
            CimValue::Char16(_) => CimType::Char16,
            CimValue::Uint8(_) => CimType::Uint8,
            CimValue::Uint16(_) => CimType::Uint16,
            CimValue::Uint32(_) => CimType::Uint32,
            CimValue::Uint64(_) => CimType::Uint64,
            CimValue::Sint8(_) => CimType::Sint8,
            CimValue::Sint16(_) => CimType::Sint16,
            CimValue::Sint32(_) => CimType::Sint32,
            CimValue::Sint64(_) => CimType::Sint64,
            CimValue::Real32(_) => CimType::Real32,
            CimValue::Real64(_) => CimType::Real64,
            CimValue::DateTime(_) => CimType::DateTime,
            CimValue::Reference(_) => CimType::Reference,
            CimValue::Instance(_) | CimValue::Class(_) => CimType::String,
            CimValue::Array(arr) => arr.element_type(),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, CimValue::Array(_))
    }

    /// Parse the text content of a CIM-XML `VALUE` element as `ty`.
    ///
    /// Integer literals may be decimal or `0x`-prefixed hexadecimal;
    /// width and signedness are enforced, never truncated.
    pub fn parse_scalar(text: &str, ty: CimType) -> ValueResult<CimValue> {
        Ok(match ty {
            CimType::Boolean => {
                if text.eq_ignore_ascii_case("true") {
                    CimValue::Boolean(true)
                } else if text.eq_ignore_ascii_case("false") {
                    CimValue::Boolean(false)
                } else {
                    return Err(malformed(text, ty, "expected 'true' or 'false'"));
                }
            }
            CimType::String => CimValue::String(text.to_owned()),
            CimType::Char16 => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => CimValue::Char16(c),
                    _ => return Err(malformed(text, ty, "expected exactly one character")),
                }
            }
            CimType::Uint8 => CimValue::Uint8(parse_unsigned(text, ty, u8::MAX as u64)? as u8),
            CimType::Uint16 => CimValue::Uint16(parse_unsigned(text, ty, u16::MAX as u64)? as u16),
            CimType::Uint32 => CimValue::Uint32(parse_unsigned(text, ty, u32::MAX as u64)? as u32),
            CimType::Uint64 => CimValue::Uint64(parse_unsigned(text, ty, u64::MAX)?),
            CimType::Sint8 => {
                CimValue::Sint8(parse_signed(text, ty, i8::MIN as i64, i8::MAX as i64)? as i8)
            }
            CimType::Sint16 => {
                CimValue::Sint16(parse_signed(text, ty, i16::MIN as i64, i16::MAX as i64)? as i16)
            }
            CimType::Sint32 => {
                CimValue::Sint32(parse_signed(text, ty, i32::MIN as i64, i32::MAX as i64)? as i32)
            }
            CimType::Sint64 => CimValue::Sint64(parse_signed(text, ty, i64::MIN, i64::MAX)?),
            CimType::Real32 => CimValue::Real32(
                text.parse::<f32>()
                    .map_err(|e| malformed(text, ty, e.to_string()))?,
            ),
            CimType::Real64 => CimValue::Real64(
                text.parse::<f64>()
                    .map_err(|e| malformed(text, ty, e.to_string()))?,
            ),
            CimType::DateTime => CimValue::DateTime(text.parse()?),
            CimType::Reference => {
                return Err(malformed(
                    text,
                    ty,
                    "references are VALUE.REFERENCE elements, not text",
                ));
            }
        })
    }

    /// The canonical CIM-XML text for a scalar value.
    ///
    /// Numeric round-trips preserve the numeric value, not necessarily the
    /// original literal spelling (hex input comes back decimal).
    pub fn to_text(&self) -> ValueResult<Cow<'_, str>> {
        Ok(match self {
            CimValue::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            CimValue::String(s) => Cow::Borrowed(s.as_str()),
            CimValue::Char16(c) => Cow::Owned(c.to_string()),
            CimValue::Uint8(v) => Cow::Owned(v.to_string()),
            CimValue::Uint16(v) => Cow::Owned(v.to_string()),
            CimValue::Uint32(v) => Cow::Owned(v.to_string()),
            CimValue::Uint64(v) => Cow::Owned(v.to_string()),
            CimValue::Sint8(v) => Cow::Owned(v.to_string()),
            CimValue::Sint16(v) => Cow::Owned(v.to_string()),
            CimValue::Sint32(v) => Cow::Owned(v.to_string()),
            CimValue::Sint64(v) => Cow::Owned(v.to_string()),
            CimValue::Real32(v) => {
                if !v.is_finite() {
                    return Err(malformed(&v.to_string(), CimType::Real32, "not finite"));
                }
                Cow::Owned(format!("{v:?}"))
            }
            CimValue::Real64(v) => {
                if !v.is_finite() {
                    return Err(malformed(&v.to_string(), CimType::Real64, "not finite"));
                }
                Cow::Owned(format!("{v:?}"))
            }
            CimValue::DateTime(dt) => Cow::Owned(dt.to_string()),
            CimValue::Reference(_)
            | CimValue::Instance(_)
            | CimValue::Class(_)
            | CimValue::Array(_) => {
                return Err(malformed(
                    self.cim_type().name(),
                    self.cim_type(),
                    "has no scalar text form",
                ));
            }
        })
    }
}

fn malformed(text: &str, ty: CimType, reason: impl Into<String>) -> ValueError {
    ValueError::Malformed {
        text: text.to_owned(),
        cim_type: ty.name(),
        reason: reason.into(),
    }
}

fn split_literal(text: &str) -> (bool, &str, u32) {
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        (negative, hex, 16)
    } else {
        (negative, rest, 10)
    }
}

fn parse_unsigned(text: &str, ty: CimType, max: u64) -> ValueResult<u64> {
    let (negative, digits, radix) = split_literal(text);
    let magnitude = u64::from_str_radix(digits, radix).map_err(|e| malformed(text, ty, e.to_string()))?;
    if negative && magnitude != 0 {
        return Err(ValueError::OutOfRange {
            text: text.to_owned(),
            cim_type: ty.name(),
        });
    }
    if magnitude > max {
        return Err(ValueError::OutOfRange {
            text: text.to_owned(),
            cim_type: ty.name(),
        });
    }
    Ok(magnitude)
}

fn parse_signed(text: &str, ty: CimType, min: i64, max: i64) -> ValueResult<i64> {
    let (negative, digits, radix) = split_literal(text);
    let magnitude =
        u64::from_str_radix(digits, radix).map_err(|e| malformed(text, ty, e.to_string()))?;
    let value = if negative {
        let limit = (min as i128).unsigned_abs() as u64;
        if magnitude > limit {
            return Err(ValueError::OutOfRange {
                text: text.to_owned(),
                cim_type: ty.name(),
            });
        }
        (magnitude as i128).wrapping_neg() as i64
    } else {
        if magnitude > max as u64 {
            return Err(ValueError::OutOfRange {
                text: text.to_owned(),
                cim_type: ty.name(),
            });
        }
        magnitude as i64
    };
    Ok(value)
}

/// An ordered array of values sharing one CIM type. Individual elements may
/// be NULL (`VALUE.NULL` on the wire).
#[derive(Debug, Clone, PartialEq)]
pub struct CimArray {
    element_type: CimType,
    elements: Vec<Option<CimValue>>,
}

impl CimArray {
    pub fn new(element_type: CimType, elements: Vec<CimValue>) -> ValueResult<Self> {
        Self::with_nulls(element_type, elements.into_iter().map(Some).collect())
    }

    pub fn with_nulls(element_type: CimType, elements: Vec<Option<CimValue>>) -> ValueResult<Self> {
        for element in elements.iter().flatten() {
            check_element(element_type, element)?;
        }
        Ok(CimArray {
            element_type,
            elements,
        })
    }

    /// Build an array by inferring the element type from the first element.
    /// Empty input carries no type and is rejected.
    pub fn infer(elements: Vec<CimValue>) -> ValueResult<Self> {
        let first = elements.first().ok_or(ValueError::Untypable)?;
        let element_type = infer_element_type(first)?;
        Self::new(element_type, elements)
    }

    pub fn element_type(&self) -> CimType {
        self.element_type
    }

    pub fn elements(&self) -> &[Option<CimValue>] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn infer_element_type(value: &CimValue) -> ValueResult<CimType> {
    if value.is_array() {
        return Err(ValueError::Heterogeneous {
            expected: "scalar elements",
            found: "nested array",
        });
    }
    Ok(value.cim_type())
}

fn check_element(element_type: CimType, element: &CimValue) -> ValueResult<()> {
    if element.is_array() {
        return Err(ValueError::Heterogeneous {
            expected: element_type.name(),
            found: "nested array",
        });
    }
    if element.cim_type() != element_type {
        return Err(ValueError::Heterogeneous {
            expected: element_type.name(),
            found: element.cim_type().name(),
        });
    }
    Ok(())
}

impl From<bool> for CimValue {
    fn from(v: bool) -> Self {
        CimValue::Boolean(v)
    }
}

impl From<&str> for CimValue {
    fn from(v: &str) -> Self {
        CimValue::String(v.to_owned())
    }
}

impl From<String> for CimValue {
    fn from(v: String) -> Self {
        CimValue::String(v)
    }
}

impl From<u8> for CimValue {
    fn from(v: u8) -> Self {
        CimValue::Uint8(v)
    }
}

impl From<u16> for CimValue {
    fn from(v: u16) -> Self {
        CimValue::Uint16(v)
    }
}

impl From<u32> for CimValue {
    fn from(v: u32) -> Self {
        CimValue::Uint32(v)
    }
}

impl From<u64> for CimValue {
    fn from(v: u64) -> Self {
        CimValue::Uint64(v)
    }
}

impl From<i8> for CimValue {
    fn from(v: i8) -> Self {
        CimValue::Sint8(v)
    }
}

impl From<i16> for CimValue {
    fn from(v: i16) -> Self {
        CimValue::Sint16(v)
    }
}

impl From<i32> for CimValue {
    fn from(v: i32) -> Self {
        CimValue::Sint32(v)
    }
}

impl From<i64> for CimValue {
    fn from(v: i64) -> Self {
        CimValue::Sint64(v)
    }
}

impl From<f32> for CimValue {
    fn from(v: f32) -> Self {
        CimValue::Real32(v)
    }
}

impl From<f64> for CimValue {
    fn from(v: f64) -> Self {
        CimValue::Real64(v)
    }
}

impl From<CimDateTime> for CimValue {
    fn from(v: CimDateTime) -> Self {
        CimValue::DateTime(v)
    }
}

impl From<CimObjectPath> for CimValue {
    fn from(v: CimObjectPath) -> Self {
        CimValue::Reference(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(value: CimValue) {
        let ty = value.cim_type();
        let text = value.to_text().unwrap().into_owned();
        assert_eq!(CimValue::parse_scalar(&text, ty).unwrap(), value);
    }

    #[test]
    fn integer_boundaries_round_trip() {
        round_trip(CimValue::Uint8(0));
        round_trip(CimValue::Uint8(u8::MAX));
        round_trip(CimValue::Uint16(u16::MAX));
        round_trip(CimValue::Uint32(u32::MAX));
        round_trip(CimValue::Uint64(u64::MAX));
        round_trip(CimValue::Sint8(i8::MIN));
        round_trip(CimValue::Sint8(-1));
        round_trip(CimValue::Sint16(i16::MIN));
        round_trip(CimValue::Sint32(i32::MAX));
        round_trip(CimValue::Sint64(i64::MIN));
        round_trip(CimValue::Sint64(i64::MAX));
    }

    #[test]
    fn non_integer_scalars_round_trip() {
        round_trip(CimValue::Boolean(true));
        round_trip(CimValue::Boolean(false));
        round_trip(CimValue::String("hello world".into()));
        round_trip(CimValue::Char16('x'));
        round_trip(CimValue::Real32(1.5));
        round_trip(CimValue::Real64(-0.0625));
        round_trip(CimValue::DateTime(
            "20250806120000.000000+000".parse().unwrap(),
        ));
    }

    #[test]
    fn out_of_range_is_rejected_not_wrapped() {
        for text in ["256", "-1", "999"] {
            let err = CimValue::parse_scalar(text, CimType::Uint8).unwrap_err();
            assert!(
                matches!(err, ValueError::OutOfRange { .. }),
                "{text}: {err:?}"
            );
        }
        assert!(matches!(
            CimValue::parse_scalar("128", CimType::Sint8).unwrap_err(),
            ValueError::OutOfRange { .. }
        ));
        assert_eq!(
            CimValue::parse_scalar("-128", CimType::Sint8).unwrap(),
            CimValue::Sint8(i8::MIN)
        );
    }

    #[test]
    fn hex_literals_parse_and_come_back_decimal() {
        assert_eq!(
            CimValue::parse_scalar("0xFF", CimType::Uint8).unwrap(),
            CimValue::Uint8(255)
        );
        assert_eq!(
            CimValue::parse_scalar("-0x80", CimType::Sint8).unwrap(),
            CimValue::Sint8(-128)
        );
        assert_eq!(
            CimValue::Uint8(255).to_text().unwrap().as_ref(),
            "255"
        );
    }

    #[test]
    fn boolean_text_is_case_insensitive() {
        assert_eq!(
            CimValue::parse_scalar("TRUE", CimType::Boolean).unwrap(),
            CimValue::Boolean(true)
        );
        assert!(CimValue::parse_scalar("yes", CimType::Boolean).is_err());
    }

    #[test]
    fn arrays_enforce_homogeneity() {
        let arr = CimArray::new(
            CimType::Uint32,
            vec![CimValue::Uint32(1), CimValue::Uint32(2)],
        )
        .unwrap();
        assert_eq!(arr.len(), 2);

        let err = CimArray::new(
            CimType::Uint32,
            vec![CimValue::Uint32(1), CimValue::String("x".into())],
        )
        .unwrap_err();
        assert!(matches!(err, ValueError::Heterogeneous { .. }));
    }

    #[test]
    fn array_inference_uses_first_element() {
        let arr = CimArray::infer(vec![CimValue::Boolean(true), CimValue::Boolean(false)]).unwrap();
        assert_eq!(arr.element_type(), CimType::Boolean);
        assert!(matches!(
            CimArray::infer(vec![]).unwrap_err(),
            ValueError::Untypable
        ));
    }

    #[test]
    fn non_finite_reals_are_rejected() {
        assert!(CimValue::Real64(f64::NAN).to_text().is_err());
        assert!(CimValue::Real32(f32::INFINITY).to_text().is_err());
    }
}
