//! Scalar leaves of the metadata tree.

use datastore_common::{StoreError, StoreResult};

use crate::primitive::{Primitive, PrimitiveType};

/// A single primitive value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    value: Primitive,
}

impl Field {
    pub fn new(value: impl Into<Primitive>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Decode a field from its string form.
    pub fn parse(kind: PrimitiveType, text: &str) -> StoreResult<Self> {
        Primitive::parse(kind, text).map(|value| Self { value })
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.value.primitive_type()
    }

    /// A copy of the stored value.
    pub fn value(&self) -> Primitive {
        self.value.clone()
    }

    pub fn as_bool(&self) -> StoreResult<bool> {
        self.value.as_bool()
    }

    pub fn as_byte(&self) -> StoreResult<u8> {
        self.value.as_byte()
    }

    pub fn as_i32(&self) -> StoreResult<i32> {
        self.value.as_i32()
    }

    pub fn as_f32(&self) -> StoreResult<f32> {
        self.value.as_f32()
    }

    pub fn as_f64(&self) -> StoreResult<f64> {
        self.value.as_f64()
    }

    pub fn as_long_double(&self) -> StoreResult<f64> {
        self.value.as_long_double()
    }

    pub fn as_string(&self) -> StoreResult<String> {
        self.value.as_str().map(str::to_string)
    }

    pub fn as_size(&self) -> StoreResult<u64> {
        self.value.as_size()
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A homogeneous vector of primitive values.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    kind: PrimitiveType,
    values: Vec<Primitive>,
}

impl Array {
    pub fn new(kind: PrimitiveType) -> Self {
        Self {
            kind,
            values: Vec::new(),
        }
    }

    /// Build an array, rejecting values of a different kind.
    pub fn from_values(kind: PrimitiveType, values: Vec<Primitive>) -> StoreResult<Self> {
        let mut array = Self::new(kind);
        for value in values {
            array.push(value)?;
        }
        Ok(array)
    }

    /// Decode an array from the string forms of its values.
    pub fn parse<S: AsRef<str>>(kind: PrimitiveType, texts: &[S]) -> StoreResult<Self> {
        let values = texts
            .iter()
            .map(|t| Primitive::parse(kind, t.as_ref()))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Self { kind, values })
    }

    pub fn push(&mut self, value: impl Into<Primitive>) -> StoreResult<()> {
        let value = value.into();
        if value.primitive_type() != self.kind {
            return Err(StoreError::type_mismatch(
                self.kind.as_str(),
                value.primitive_type().as_str(),
            ));
        }
        self.values.push(value);
        Ok(())
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A copy of the element at `index`.
    pub fn get(&self, index: usize) -> StoreResult<Primitive> {
        self.values.get(index).cloned().ok_or_else(|| {
            StoreError::invalid_argument(format!(
                "index {} out of range for array of length {}",
                index,
                self.values.len()
            ))
        })
    }

    /// A copy of all values.
    pub fn values(&self) -> Vec<Primitive> {
        self.values.clone()
    }

    /// String forms of all values.
    pub fn to_strings(&self) -> Vec<String> {
        self.values.iter().map(|v| v.to_string()).collect()
    }

    fn typed<T>(&self, get: impl Fn(&Primitive) -> StoreResult<T>) -> StoreResult<Vec<T>> {
        self.values.iter().map(get).collect()
    }

    pub fn to_bool_vec(&self) -> StoreResult<Vec<bool>> {
        self.check(PrimitiveType::Bool)?;
        self.typed(Primitive::as_bool)
    }

    pub fn to_byte_vec(&self) -> StoreResult<Vec<u8>> {
        self.check(PrimitiveType::Byte)?;
        self.typed(Primitive::as_byte)
    }

    pub fn to_i32_vec(&self) -> StoreResult<Vec<i32>> {
        self.check(PrimitiveType::Int)?;
        self.typed(Primitive::as_i32)
    }

    pub fn to_f32_vec(&self) -> StoreResult<Vec<f32>> {
        self.check(PrimitiveType::Float)?;
        self.typed(Primitive::as_f32)
    }

    pub fn to_f64_vec(&self) -> StoreResult<Vec<f64>> {
        self.check(PrimitiveType::Double)?;
        self.typed(Primitive::as_f64)
    }

    pub fn to_long_double_vec(&self) -> StoreResult<Vec<f64>> {
        self.check(PrimitiveType::LongDouble)?;
        self.typed(Primitive::as_long_double)
    }

    pub fn to_string_vec(&self) -> StoreResult<Vec<String>> {
        self.check(PrimitiveType::String)?;
        self.typed(|p| p.as_str().map(str::to_string))
    }

    pub fn to_size_vec(&self) -> StoreResult<Vec<u64>> {
        self.check(PrimitiveType::Size)?;
        self.typed(Primitive::as_size)
    }

    // Empty arrays still carry a kind, so the check cannot rely on the values.
    fn check(&self, expected: PrimitiveType) -> StoreResult<()> {
        if self.kind != expected {
            return Err(StoreError::type_mismatch(expected.as_str(), self.kind.as_str()));
        }
        Ok(())
    }
}

macro_rules! impl_array_from_vec {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl From<Vec<$ty>> for Array {
                fn from(values: Vec<$ty>) -> Self {
                    Array {
                        kind: PrimitiveType::$kind,
                        values: values.into_iter().map(Primitive::from).collect(),
                    }
                }
            }
        )+
    };
}

impl_array_from_vec! {
    bool => Bool,
    u8 => Byte,
    i32 => Int,
    f32 => Float,
    f64 => Double,
    String => String,
    u64 => Size,
}
