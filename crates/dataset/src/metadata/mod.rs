//! Polymorphic metadata trees attached to dataset keys.
//!
//! A tree is built from five node kinds:
//!
//! - [`Field`]: one primitive value
//! - [`Array`]: a homogeneous vector of primitive values
//! - [`List`]: an ordered sequence of child nodes
//! - [`Map`]: named child nodes
//! - [`DataKey`]: a coordinate embedded as metadata
//!
//! Concrete node access goes through [`MetadataElement::cast`], which checks
//! the [`ElementType`] tag before handing out a reference.

mod collection;
mod field;

pub use collection::{List, Map};
pub use field::{Array, Field};

use serde::{Deserialize, Serialize};

use datastore_common::{StoreError, StoreResult};

use crate::key::DataKey;

/// Closed tag identifying a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementType {
    Field,
    Array,
    List,
    Map,
    Key,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Field => "FIELD",
            Self::Array => "ARRAY",
            Self::List => "LIST",
            Self::Map => "MAP",
            Self::Key => "KEY",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A node of a metadata tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataElement {
    Field(Field),
    Array(Array),
    List(List),
    Map(Map),
    Key(DataKey),
}

/// Concrete node types reachable through [`MetadataElement::cast`].
pub trait MetadataKind: Sized {
    const ELEMENT_TYPE: ElementType;

    fn downcast_ref(element: &MetadataElement) -> Option<&Self>;
    fn downcast_mut(element: &mut MetadataElement) -> Option<&mut Self>;
    fn downcast(element: MetadataElement) -> Option<Self>;
}

macro_rules! impl_metadata_kind {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl MetadataKind for $ty {
                const ELEMENT_TYPE: ElementType = ElementType::$variant;

                fn downcast_ref(element: &MetadataElement) -> Option<&Self> {
                    match element {
                        MetadataElement::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn downcast_mut(element: &mut MetadataElement) -> Option<&mut Self> {
                    match element {
                        MetadataElement::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn downcast(element: MetadataElement) -> Option<Self> {
                    match element {
                        MetadataElement::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for MetadataElement {
                fn from(inner: $ty) -> Self {
                    MetadataElement::$variant(inner)
                }
            }
        )+
    };
}

impl_metadata_kind! {
    Field => Field,
    Array => Array,
    List => List,
    Map => Map,
    DataKey => Key,
}

impl MetadataElement {
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Field(_) => ElementType::Field,
            Self::Array(_) => ElementType::Array,
            Self::List(_) => ElementType::List,
            Self::Map(_) => ElementType::Map,
            Self::Key(_) => ElementType::Key,
        }
    }

    /// Adopt an owned node.
    pub fn from_owned(node: impl Into<MetadataElement>) -> Self {
        node.into()
    }

    /// Copy a node owned elsewhere.
    pub fn from_clone(node: &MetadataElement) -> Self {
        node.clone()
    }

    fn check_type(&self, expected: ElementType) -> StoreResult<()> {
        let actual = self.element_type();
        if actual != expected {
            return Err(StoreError::type_mismatch(expected.as_str(), actual.as_str()));
        }
        Ok(())
    }

    /// Borrow this node as a concrete kind, failing with a type error on a
    /// tag mismatch.
    pub fn cast<T: MetadataKind>(&self) -> StoreResult<&T> {
        self.check_type(T::ELEMENT_TYPE)?;
        T::downcast_ref(self)
            .ok_or_else(|| StoreError::type_mismatch(T::ELEMENT_TYPE.as_str(), self.element_type().as_str()))
    }

    pub fn cast_mut<T: MetadataKind>(&mut self) -> StoreResult<&mut T> {
        self.check_type(T::ELEMENT_TYPE)?;
        let actual = self.element_type();
        T::downcast_mut(self)
            .ok_or_else(|| StoreError::type_mismatch(T::ELEMENT_TYPE.as_str(), actual.as_str()))
    }

    pub fn into_kind<T: MetadataKind>(self) -> StoreResult<T> {
        self.check_type(T::ELEMENT_TYPE)?;
        let actual = self.element_type();
        T::downcast(self)
            .ok_or_else(|| StoreError::type_mismatch(T::ELEMENT_TYPE.as_str(), actual.as_str()))
    }

    pub fn as_field(&self) -> StoreResult<&Field> {
        self.cast()
    }

    pub fn as_array(&self) -> StoreResult<&Array> {
        self.cast()
    }

    pub fn as_list(&self) -> StoreResult<&List> {
        self.cast()
    }

    pub fn as_map(&self) -> StoreResult<&Map> {
        self.cast()
    }

    pub fn as_key(&self) -> StoreResult<&DataKey> {
        self.cast()
    }

    pub fn as_list_mut(&mut self) -> StoreResult<&mut List> {
        self.cast_mut()
    }

    pub fn as_map_mut(&mut self) -> StoreResult<&mut Map> {
        self.cast_mut()
    }

    pub fn into_field(self) -> StoreResult<Field> {
        self.into_kind()
    }

    pub fn into_array(self) -> StoreResult<Array> {
        self.into_kind()
    }

    pub fn into_list(self) -> StoreResult<List> {
        self.into_kind()
    }

    pub fn into_map(self) -> StoreResult<Map> {
        self.into_kind()
    }

    pub fn into_key(self) -> StoreResult<DataKey> {
        self.into_kind()
    }
}
