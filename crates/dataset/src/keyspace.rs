//! The observed universe of coordinate values across a set of keys.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use datastore_common::{StoreError, StoreResult};

use crate::json::{KeyspaceDimensionDoc, KeyspaceDoc};
use crate::key::{DataKey, DataKeyDimension, DataKeyElement};

/// The distinct elements observed on one dimension, in a stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceDimension {
    dimension: DataKeyDimension,
    elements: Vec<DataKeyElement>,
}

impl KeyspaceDimension {
    pub fn new(dimension: DataKeyDimension) -> Self {
        Self {
            dimension,
            elements: Vec::new(),
        }
    }

    /// Append an element; an element already present is ignored.
    pub fn add_element(&mut self, element: DataKeyElement) -> StoreResult<()> {
        if element.dimension() != &self.dimension {
            return Err(StoreError::invalid_argument(format!(
                "element '{}' does not belong to keyspace dimension '{}'",
                element, self.dimension
            )));
        }
        if !self.elements.contains(&element) {
            self.elements.push(element);
        }
        Ok(())
    }

    pub fn dimension(&self) -> &DataKeyDimension {
        &self.dimension
    }

    pub fn elements(&self) -> &[DataKeyElement] {
        &self.elements
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|e| e.identifier())
    }

    pub fn contains(&self, element: &DataKeyElement) -> bool {
        self.elements.contains(element)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// A set of keyspace dimensions, at most one per [`DataKeyDimension`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "KeyspaceDoc", into = "KeyspaceDoc")]
pub struct Keyspace {
    dimensions: BTreeMap<DataKeyDimension, KeyspaceDimension>,
}

impl Keyspace {
    /// Build a keyspace, rejecting two entries on the same dimension.
    pub fn new(dimensions: impl IntoIterator<Item = KeyspaceDimension>) -> StoreResult<Self> {
        let mut map = BTreeMap::new();
        for dimension in dimensions {
            let name = dimension.dimension.clone();
            if map.insert(name.clone(), dimension).is_some() {
                return Err(StoreError::invalid_argument(format!(
                    "keyspace already contains dimension '{}'",
                    name
                )));
            }
        }
        Ok(Self { dimensions: map })
    }

    /// A keyspace with no dimensions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True iff every dimension of `key` is present in this keyspace.
    pub fn includes_key(&self, key: &DataKey) -> bool {
        key.dimensions().all(|d| self.dimensions.contains_key(d))
    }

    pub fn validate_key(&self, key: &DataKey) -> StoreResult<()> {
        match key.dimensions().find(|d| !self.dimensions.contains_key(*d)) {
            Some(missing) => Err(StoreError::invalid_argument(format!(
                "key {} has dimension '{}' outside the keyspace",
                key, missing
            ))),
            None => Ok(()),
        }
    }

    pub fn includes_dimension(&self, dimension: &DataKeyDimension) -> bool {
        self.dimensions.contains_key(dimension)
    }

    pub fn dimension(&self, dimension: &DataKeyDimension) -> Option<&KeyspaceDimension> {
        self.dimensions.get(dimension)
    }

    /// Dimensions in name order.
    pub fn dimensions(&self) -> impl Iterator<Item = &KeyspaceDimension> {
        self.dimensions.values()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Number of keys in the cartesian product of all dimensions, or `None`
    /// when that does not fit in a `usize`.
    ///
    /// An empty keyspace spans no keys.
    pub fn key_count(&self) -> Option<usize> {
        if self.dimensions.is_empty() {
            return Some(0);
        }
        self.dimensions
            .values()
            .try_fold(1usize, |count, d| count.checked_mul(d.len()))
    }

    /// Every key of the cartesian product, one element per dimension.
    pub fn keys(&self) -> Vec<DataKey> {
        if self.dimensions.is_empty() {
            return Vec::new();
        }

        let mut keys = vec![DataKey::new()];
        for dimension in self.dimensions.values() {
            let mut next = Vec::with_capacity(keys.len() * dimension.len());
            for key in &keys {
                for element in &dimension.elements {
                    let mut extended = key.clone();
                    // Dimensions of a keyspace are distinct, so this cannot clash.
                    if extended.add_element(element.clone()).is_ok() {
                        next.push(extended);
                    }
                }
            }
            keys = next;
        }
        keys
    }
}

impl TryFrom<KeyspaceDoc> for Keyspace {
    type Error = StoreError;

    fn try_from(doc: KeyspaceDoc) -> Result<Self, Self::Error> {
        let mut dimensions = Vec::with_capacity(doc.dimensions.len());
        for dim_doc in doc.dimensions {
            let mut dimension = KeyspaceDimension::new(DataKeyDimension::new(dim_doc.dimension_name));
            for identifier in dim_doc.identifiers {
                let element = DataKeyElement::new(identifier, dimension.dimension.clone());
                dimension.add_element(element)?;
            }
            dimensions.push(dimension);
        }
        Keyspace::new(dimensions)
    }
}

impl From<Keyspace> for KeyspaceDoc {
    fn from(keyspace: Keyspace) -> Self {
        KeyspaceDoc {
            dimensions: keyspace
                .dimensions
                .into_values()
                .map(|d| KeyspaceDimensionDoc {
                    dimension_name: d.dimension.name().to_string(),
                    identifiers: d.elements.iter().map(|e| e.identifier().to_string()).collect(),
                })
                .collect(),
        }
    }
}

/// Accumulates keys and elements, then produces an immutable [`Keyspace`].
///
/// Elements are kept sorted, so the result does not depend on the order in
/// which keys were added.
#[derive(Debug, Clone, Default)]
pub struct KeyspaceBuilder {
    observed: BTreeMap<DataKeyDimension, BTreeSet<DataKeyElement>>,
}

impl KeyspaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(&mut self, element: DataKeyElement) -> &mut Self {
        self.observed
            .entry(element.dimension().clone())
            .or_default()
            .insert(element);
        self
    }

    pub fn add_key(&mut self, key: &DataKey) -> &mut Self {
        for element in key.elements() {
            self.add_element(element.clone());
        }
        self
    }

    pub fn add_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a DataKey>) -> &mut Self {
        for key in keys {
            self.add_key(key);
        }
        self
    }

    pub fn to_keyspace(&self) -> Keyspace {
        let dimensions = self
            .observed
            .iter()
            .map(|(dimension, elements)| {
                (
                    dimension.clone(),
                    KeyspaceDimension {
                        dimension: dimension.clone(),
                        elements: elements.iter().cloned().collect(),
                    },
                )
            })
            .collect();
        Keyspace { dimensions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pairs: &[(&str, &str)]) -> DataKey {
        DataKey::from_pairs(pairs).unwrap()
    }

    #[test]
    fn test_dimension_rejects_foreign_element() {
        let mut dim = KeyspaceDimension::new(DataKeyDimension::new("ZOOM"));
        dim.add_element(DataKeyElement::of("ZOOM", "1")).unwrap();
        dim.add_element(DataKeyElement::of("ZOOM", "1")).unwrap();
        assert_eq!(dim.len(), 1);

        let err = dim.add_element(DataKeyElement::of("NAME", "x")).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_keyspace_rejects_duplicate_dimension() {
        let a = KeyspaceDimension::new(DataKeyDimension::new("ZOOM"));
        let b = KeyspaceDimension::new(DataKeyDimension::new("ZOOM"));
        assert!(Keyspace::new(vec![a, b]).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_compound_key_union() {
        let a = key(&[("dim1", "val1")]);
        let b = key(&[("dim2", "val2")]);
        let c = a.merge(&b).unwrap();

        let keyspace = KeyspaceBuilder::new().add_keys([&a, &b, &c]).to_keyspace();

        assert_eq!(keyspace.len(), 2);
        let dim1 = keyspace.dimension(&"dim1".into()).unwrap();
        let dim2 = keyspace.dimension(&"dim2".into()).unwrap();
        assert_eq!(dim1.identifiers().collect::<Vec<_>>(), vec!["val1"]);
        assert_eq!(dim2.identifiers().collect::<Vec<_>>(), vec!["val2"]);
    }

    #[test]
    fn test_builder_is_order_independent() {
        let keys = vec![
            key(&[("X", "2"), ("Y", "a")]),
            key(&[("X", "1")]),
            key(&[("Y", "b"), ("Z", "q")]),
        ];

        let forward = KeyspaceBuilder::new().add_keys(keys.iter()).to_keyspace();
        let backward = KeyspaceBuilder::new().add_keys(keys.iter().rev()).to_keyspace();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_includes_and_validate() {
        let keyspace = KeyspaceBuilder::new()
            .add_key(&key(&[("X", "1"), ("Y", "2")]))
            .to_keyspace();

        assert!(keyspace.includes_key(&key(&[("X", "9")])));
        assert!(keyspace.includes_key(&DataKey::new()));
        assert!(!keyspace.includes_key(&key(&[("X", "1"), ("Q", "1")])));
        assert!(keyspace
            .validate_key(&key(&[("Q", "1")]))
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_cartesian_keys() {
        let keyspace = KeyspaceBuilder::new()
            .add_key(&key(&[("X", "1"), ("Y", "a")]))
            .add_key(&key(&[("X", "2"), ("Y", "b")]))
            .to_keyspace();

        assert_eq!(keyspace.key_count(), Some(4));
        let keys = keyspace.keys();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&key(&[("X", "2"), ("Y", "a")])));
        assert!(Keyspace::empty().keys().is_empty());
        assert_eq!(Keyspace::empty().key_count(), Some(0));
    }

    #[test]
    fn test_key_count_overflow() {
        let mut builder = KeyspaceBuilder::new();
        for d in 0..20 {
            for i in 0..10 {
                builder.add_element(DataKeyElement::of(&format!("D{:02}", d), &i.to_string()));
            }
        }
        let keyspace = builder.to_keyspace();
        assert_eq!(keyspace.len(), 20);
        assert_eq!(keyspace.key_count(), None);
    }
}
