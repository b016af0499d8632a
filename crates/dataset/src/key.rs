//! Composite coordinates: dimensions, elements and keys.
//!
//! A [`DataKey`] addresses one data file and/or one metadata subtree in a
//! [`Dataset`](crate::Dataset). It is a set of [`DataKeyElement`]s in which
//! every element lives on a distinct [`DataKeyDimension`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use datastore_common::{StoreError, StoreResult};

use crate::json::{ElementDoc, KeyDoc};

/// A named axis along which coordinate values vary (e.g. "ZOOM", "NAME").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataKeyDimension(String);

impl DataKeyDimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DataKeyDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DataKeyDimension {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One coordinate value on one dimension.
///
/// Field order matters: the derived ordering sorts by dimension first,
/// then by identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "ElementDoc", into = "ElementDoc")]
pub struct DataKeyElement {
    dimension: DataKeyDimension,
    identifier: String,
}

impl DataKeyElement {
    pub fn new(identifier: impl Into<String>, dimension: DataKeyDimension) -> Self {
        Self {
            dimension,
            identifier: identifier.into(),
        }
    }

    /// Shorthand for `DataKeyElement::new(identifier, DataKeyDimension::new(dimension))`.
    pub fn of(dimension: &str, identifier: &str) -> Self {
        Self::new(identifier, DataKeyDimension::new(dimension))
    }

    pub fn dimension(&self) -> &DataKeyDimension {
        &self.dimension
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl std::fmt::Display for DataKeyElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.dimension, self.identifier)
    }
}

impl From<ElementDoc> for DataKeyElement {
    fn from(doc: ElementDoc) -> Self {
        Self::new(doc.identifier, DataKeyDimension::new(doc.dimension_name))
    }
}

impl From<DataKeyElement> for ElementDoc {
    fn from(element: DataKeyElement) -> Self {
        ElementDoc {
            dimension_name: element.dimension.0,
            identifier: element.identifier,
        }
    }
}

/// A set of coordinate elements with pairwise distinct dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "KeyDoc", into = "KeyDoc")]
pub struct DataKey {
    elements: BTreeMap<DataKeyDimension, DataKeyElement>,
}

impl DataKey {
    /// An empty key with no elements.
    pub fn new() -> Self {
        Self::default()
    }

    /// A key holding a single element.
    pub fn from_element(element: DataKeyElement) -> Self {
        let mut elements = BTreeMap::new();
        elements.insert(element.dimension.clone(), element);
        Self { elements }
    }

    /// Build a key from elements, failing if two share a dimension.
    pub fn from_elements(elements: impl IntoIterator<Item = DataKeyElement>) -> StoreResult<Self> {
        let mut key = Self::new();
        for element in elements {
            key.add_element(element)?;
        }
        Ok(key)
    }

    /// Build a key from `(dimension, identifier)` pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> StoreResult<Self> {
        Self::from_elements(pairs.iter().map(|(dim, id)| DataKeyElement::of(dim, id)))
    }

    /// Add an element on a dimension the key does not yet cover.
    pub fn add_element(&mut self, element: DataKeyElement) -> StoreResult<()> {
        if let Some(existing) = self.elements.get(&element.dimension) {
            return Err(StoreError::invalid_argument(format!(
                "key already has element '{}' on dimension '{}', cannot add '{}'",
                existing.identifier, element.dimension, element.identifier
            )));
        }
        self.elements.insert(element.dimension.clone(), element);
        Ok(())
    }

    pub fn has_dimension(&self, dimension: &DataKeyDimension) -> bool {
        self.elements.contains_key(dimension)
    }

    pub fn element(&self, dimension: &DataKeyDimension) -> Option<&DataKeyElement> {
        self.elements.get(dimension)
    }

    /// Identifier on the dimension with the given name, if present.
    pub fn identifier(&self, dimension: &str) -> Option<&str> {
        self.elements
            .get(&DataKeyDimension::new(dimension))
            .map(|e| e.identifier())
    }

    /// Elements in dimension order.
    pub fn elements(&self) -> impl Iterator<Item = &DataKeyElement> {
        self.elements.values()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &DataKeyDimension> {
        self.elements.keys()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Union of two keys on disjoint dimensions.
    pub fn merge(&self, other: &DataKey) -> StoreResult<DataKey> {
        let mut builder = DataKeyBuilder::new();
        builder.add_key(self)?;
        builder.add_key(other)?;
        Ok(builder.build())
    }
}

impl std::fmt::Display for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, element) in self.elements.values().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", element)?;
        }
        write!(f, "}}")
    }
}

impl From<DataKeyElement> for DataKey {
    fn from(element: DataKeyElement) -> Self {
        Self::from_element(element)
    }
}

impl TryFrom<KeyDoc> for DataKey {
    type Error = StoreError;

    fn try_from(doc: KeyDoc) -> Result<Self, Self::Error> {
        Self::from_elements(doc.elements)
    }
}

impl From<DataKey> for KeyDoc {
    fn from(key: DataKey) -> Self {
        KeyDoc {
            elements: key.elements.into_values().collect(),
        }
    }
}

/// Accumulates elements from individual elements or whole keys into one
/// merged key.
///
/// Re-adding an identical element is a no-op; a different identifier on a
/// dimension that is already present is rejected.
#[derive(Debug, Clone, Default)]
pub struct DataKeyBuilder {
    elements: BTreeMap<DataKeyDimension, DataKeyElement>,
}

impl DataKeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(&mut self, element: DataKeyElement) -> StoreResult<()> {
        match self.elements.get(&element.dimension) {
            Some(existing) if *existing == element => Ok(()),
            Some(existing) => Err(StoreError::invalid_argument(format!(
                "conflicting elements on dimension '{}': '{}' and '{}'",
                element.dimension, existing.identifier, element.identifier
            ))),
            None => {
                self.elements.insert(element.dimension.clone(), element);
                Ok(())
            }
        }
    }

    pub fn add_key(&mut self, key: &DataKey) -> StoreResult<()> {
        for element in key.elements() {
            self.add_element(element.clone())?;
        }
        Ok(())
    }

    pub fn build(self) -> DataKey {
        DataKey {
            elements: self.elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_ordering_by_dimension_then_identifier() {
        let a = DataKeyElement::of("A", "z");
        let b = DataKeyElement::of("B", "a");
        let c = DataKeyElement::of("B", "b");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_add_element_rejects_duplicate_dimension() {
        let mut key = DataKey::from_element(DataKeyElement::of("ZOOM", "1"));
        let err = key.add_element(DataKeyElement::of("ZOOM", "2")).unwrap_err();
        assert!(err.is_invalid_argument());
        // The same element again is still a second element on the dimension.
        assert!(key.add_element(DataKeyElement::of("ZOOM", "1")).is_err());
        assert_eq!(key.len(), 1);
    }

    #[test]
    fn test_lookup_by_dimension() {
        let key = DataKey::from_pairs(&[("ZOOM", "3"), ("NAME", "tile")]).unwrap();
        assert!(key.has_dimension(&DataKeyDimension::new("ZOOM")));
        assert!(!key.has_dimension(&DataKeyDimension::new("BAND")));
        assert_eq!(key.identifier("NAME"), Some("tile"));
        assert_eq!(
            key.element(&"ZOOM".into()).map(|e| e.identifier()),
            Some("3")
        );
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a = DataKey::from_pairs(&[("X", "1"), ("Y", "2")]).unwrap();
        let b = DataKey::from_pairs(&[("Y", "2"), ("X", "1")]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{X=1,Y=2}");
    }

    #[test]
    fn test_builder_merges_keys() {
        let a = DataKey::from_pairs(&[("dim1", "val1")]).unwrap();
        let b = DataKey::from_pairs(&[("dim2", "val2")]).unwrap();

        let mut builder = DataKeyBuilder::new();
        builder.add_key(&a).unwrap();
        builder.add_key(&b).unwrap();
        let c = builder.build();

        assert_eq!(
            c,
            DataKey::from_pairs(&[("dim1", "val1"), ("dim2", "val2")]).unwrap()
        );
        assert_eq!(a.merge(&b).unwrap(), c);
    }

    #[test]
    fn test_builder_rejects_conflict() {
        let mut builder = DataKeyBuilder::new();
        builder.add_element(DataKeyElement::of("dim1", "a")).unwrap();
        builder.add_element(DataKeyElement::of("dim1", "a")).unwrap();
        let err = builder
            .add_element(DataKeyElement::of("dim1", "b"))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
