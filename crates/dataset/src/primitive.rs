//! Scalar kinds stored in metadata fields and arrays.
//!
//! Every primitive has a lossless string form. Floating kinds are written
//! with 16 significant digits (the `%.16g` convention) so that values
//! survive a trip through JSON strings without precision loss.

use serde::{Deserialize, Serialize};

use datastore_common::{StoreError, StoreResult};

/// Significant digits used for floating point string forms.
pub const FLOAT_SIGNIFICANT_DIGITS: usize = 16;

/// Closed set of scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrimitiveType {
    Bool,
    Byte,
    Int,
    Float,
    Double,
    LongDouble,
    String,
    Size,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Byte => "BYTE",
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::LongDouble => "LONG_DOUBLE",
            Self::String => "STRING",
            Self::Size => "SIZE",
        }
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Float | Self::Double | Self::LongDouble)
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single scalar value of one of the [`PrimitiveType`] kinds.
///
/// `LongDouble` is carried at `f64` precision.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Bool(bool),
    Byte(u8),
    Int(i32),
    Float(f32),
    Double(f64),
    LongDouble(f64),
    String(String),
    Size(u64),
}

impl Primitive {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Self::Bool(_) => PrimitiveType::Bool,
            Self::Byte(_) => PrimitiveType::Byte,
            Self::Int(_) => PrimitiveType::Int,
            Self::Float(_) => PrimitiveType::Float,
            Self::Double(_) => PrimitiveType::Double,
            Self::LongDouble(_) => PrimitiveType::LongDouble,
            Self::String(_) => PrimitiveType::String,
            Self::Size(_) => PrimitiveType::Size,
        }
    }

    /// Decode the string form of a value of the given kind.
    pub fn parse(kind: PrimitiveType, text: &str) -> StoreResult<Self> {
        let fail = |e: &dyn std::fmt::Display| {
            StoreError::Parse(format!("'{}' is not a valid {}: {}", text, kind, e))
        };

        let value = match kind {
            PrimitiveType::Bool => match text.trim() {
                "true" | "1" => Self::Bool(true),
                "false" | "0" => Self::Bool(false),
                other => return Err(fail(&format!("unexpected token '{}'", other))),
            },
            PrimitiveType::Byte => Self::Byte(text.trim().parse().map_err(|e| fail(&e))?),
            PrimitiveType::Int => Self::Int(text.trim().parse().map_err(|e| fail(&e))?),
            PrimitiveType::Float => {
                let v: f32 = text.trim().parse().map_err(|e| fail(&e))?;
                Self::Float(if overflowed(v.is_infinite(), text) { f32::MAX.copysign(v) } else { v })
            }
            PrimitiveType::Double | PrimitiveType::LongDouble => {
                let mut v: f64 = text.trim().parse().map_err(|e| fail(&e))?;
                if overflowed(v.is_infinite(), text) {
                    v = f64::MAX.copysign(v);
                }
                if kind == PrimitiveType::Double {
                    Self::Double(v)
                } else {
                    Self::LongDouble(v)
                }
            }
            PrimitiveType::String => Self::String(text.to_string()),
            PrimitiveType::Size => Self::Size(text.trim().parse().map_err(|e| fail(&e))?),
        };
        Ok(value)
    }

    fn mismatch(&self, expected: PrimitiveType) -> StoreError {
        StoreError::type_mismatch(expected.as_str(), self.primitive_type().as_str())
    }

    pub fn as_bool(&self) -> StoreResult<bool> {
        match self {
            Self::Bool(v) => Ok(*v),
            _ => Err(self.mismatch(PrimitiveType::Bool)),
        }
    }

    pub fn as_byte(&self) -> StoreResult<u8> {
        match self {
            Self::Byte(v) => Ok(*v),
            _ => Err(self.mismatch(PrimitiveType::Byte)),
        }
    }

    pub fn as_i32(&self) -> StoreResult<i32> {
        match self {
            Self::Int(v) => Ok(*v),
            _ => Err(self.mismatch(PrimitiveType::Int)),
        }
    }

    pub fn as_f32(&self) -> StoreResult<f32> {
        match self {
            Self::Float(v) => Ok(*v),
            _ => Err(self.mismatch(PrimitiveType::Float)),
        }
    }

    pub fn as_f64(&self) -> StoreResult<f64> {
        match self {
            Self::Double(v) => Ok(*v),
            _ => Err(self.mismatch(PrimitiveType::Double)),
        }
    }

    pub fn as_long_double(&self) -> StoreResult<f64> {
        match self {
            Self::LongDouble(v) => Ok(*v),
            _ => Err(self.mismatch(PrimitiveType::LongDouble)),
        }
    }

    pub fn as_str(&self) -> StoreResult<&str> {
        match self {
            Self::String(v) => Ok(v),
            _ => Err(self.mismatch(PrimitiveType::String)),
        }
    }

    pub fn as_size(&self) -> StoreResult<u64> {
        match self {
            Self::Size(v) => Ok(*v),
            _ => Err(self.mismatch(PrimitiveType::Size)),
        }
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", format_significant(f64::from(*v), FLOAT_SIGNIFICANT_DIGITS)),
            Self::Double(v) | Self::LongDouble(v) => {
                write!(f, "{}", format_significant(*v, FLOAT_SIGNIFICANT_DIGITS))
            }
            Self::String(v) => write!(f, "{}", v),
            Self::Size(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_primitive_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Primitive {
                fn from(value: $ty) -> Self {
                    Primitive::$variant(value.into())
                }
            }
        )+
    };
}

impl_primitive_from! {
    bool => Bool,
    u8 => Byte,
    i32 => Int,
    f32 => Float,
    f64 => Double,
    String => String,
    &str => String,
    u64 => Size,
}

/// Format `value` with `digits` significant digits, trimming trailing zeros,
/// switching to exponent notation for very large or small magnitudes.
pub fn format_significant(value: f64, digits: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let digits = digits.max(1);
    let scientific = format!("{:.*e}", digits - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return scientific,
    };

    if exponent < -4 || exponent >= digits as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

/// A finite value whose 16-digit form rounds past the largest finite value
/// parses as infinity; only an explicit infinity literal may do so.
fn overflowed(infinite: bool, text: &str) -> bool {
    if !infinite {
        return false;
    }
    let magnitude = text.trim().trim_start_matches(['+', '-']);
    !(magnitude.eq_ignore_ascii_case("inf") || magnitude.eq_ignore_ascii_case("infinity"))
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_significant() {
        assert_eq!(format_significant(4546.789, 16), "4546.789");
        assert_eq!(format_significant(3.14159, 16), "3.14159");
        assert_eq!(format_significant(100.0, 16), "100");
        assert_eq!(format_significant(-0.5, 16), "-0.5");
        assert_eq!(format_significant(1.0e20, 16), "1e+20");
        assert_eq!(format_significant(1.5e-7, 16), "1.5e-07");
        assert_eq!(format_significant(0.1, 16), "0.1");
        assert_eq!(format_significant(0.0, 16), "0");
    }

    #[test]
    fn test_float_round_trip() {
        let value = Primitive::Double(4546.789);
        let text = value.to_string();
        assert_eq!(Primitive::parse(PrimitiveType::Double, &text).unwrap(), value);

        let value = Primitive::Float(3.14159);
        let text = value.to_string();
        assert_eq!(Primitive::parse(PrimitiveType::Float, &text).unwrap(), value);

        let value = Primitive::LongDouble(-1.0e-300);
        let text = value.to_string();
        assert_eq!(
            Primitive::parse(PrimitiveType::LongDouble, &text).unwrap(),
            value
        );
    }

    #[test]
    fn test_extreme_doubles_stay_finite() {
        for v in [f64::MAX, -f64::MAX] {
            let text = Primitive::Double(v).to_string();
            assert_eq!(Primitive::parse(PrimitiveType::Double, &text).unwrap().as_f64().unwrap(), v);
            let parsed = Primitive::parse(PrimitiveType::LongDouble, &text).unwrap();
            assert_eq!(parsed.as_long_double().unwrap(), v);
        }
        let text = Primitive::Float(-f32::MAX).to_string();
        assert_eq!(Primitive::parse(PrimitiveType::Float, &text).unwrap().as_f32().unwrap(), -f32::MAX);

        let inf = Primitive::parse(PrimitiveType::Double, "-inf").unwrap().as_f64().unwrap();
        assert!(inf.is_infinite() && inf < 0.0);
        assert!(Primitive::parse(PrimitiveType::Float, "inf").unwrap().as_f32().unwrap().is_infinite());
    }

    #[test]
    fn test_non_floating_round_trip() {
        let values = vec![
            Primitive::Bool(true),
            Primitive::Byte(255),
            Primitive::Int(-42),
            Primitive::String("hello world".to_string()),
            Primitive::Size(u64::MAX),
        ];
        for value in values {
            let parsed = Primitive::parse(value.primitive_type(), &value.to_string()).unwrap();
            assert_eq!(parsed, value);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(Primitive::parse(PrimitiveType::Int, "4.5").is_err());
        assert!(Primitive::parse(PrimitiveType::Byte, "256").is_err());
        assert!(Primitive::parse(PrimitiveType::Bool, "yes").is_err());
        assert!(matches!(
            Primitive::parse(PrimitiveType::Double, "abc"),
            Err(StoreError::Parse(_))
        ));
    }

    #[test]
    fn test_typed_getter_mismatch() {
        let value = Primitive::from(7i32);
        assert_eq!(value.as_i32().unwrap(), 7);
        assert!(value.as_f64().unwrap_err().is_type());
        assert!(value.as_str().unwrap_err().is_type());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(PrimitiveType::LongDouble.to_string(), "LONG_DOUBLE");
        assert_eq!(
            serde_json::to_string(&PrimitiveType::LongDouble).unwrap(),
            "\"LONG_DOUBLE\""
        );
        assert!(PrimitiveType::Float.is_floating());
        assert!(!PrimitiveType::Size.is_floating());
    }
}
