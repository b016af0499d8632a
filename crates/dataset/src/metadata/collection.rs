//! Interior nodes of the metadata tree.

use std::collections::BTreeMap;

use datastore_common::{StoreError, StoreResult};

use super::{MetadataElement, MetadataKind};

/// An ordered, append-only sequence of heterogeneous elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct List {
    elements: Vec<MetadataElement>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element, taking ownership of it.
    pub fn add_element(&mut self, element: impl Into<MetadataElement>) {
        self.elements.push(element.into());
    }

    /// Append a clone of `element`; the caller keeps the original.
    pub fn add_cloned(&mut self, element: &MetadataElement) {
        self.elements.push(element.clone());
    }

    pub fn get(&self, index: usize) -> StoreResult<&MetadataElement> {
        self.elements.get(index).ok_or_else(|| {
            StoreError::invalid_argument(format!(
                "index {} out of range for list of length {}",
                index,
                self.elements.len()
            ))
        })
    }

    /// Element at `index`, cast to a concrete kind.
    pub fn get_as<T: MetadataKind>(&self, index: usize) -> StoreResult<&T> {
        self.get(index)?.cast::<T>()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetadataElement> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl FromIterator<MetadataElement> for List {
    fn from_iter<I: IntoIterator<Item = MetadataElement>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a List {
    type Item = &'a MetadataElement;
    type IntoIter = std::slice::Iter<'a, MetadataElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// Named heterogeneous elements; `put` replaces any previous entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map {
    elements: BTreeMap<String, MetadataElement>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the element under `name`, taking ownership of it.
    /// Returns the element previously stored under that name.
    pub fn put_element(
        &mut self,
        name: impl Into<String>,
        element: impl Into<MetadataElement>,
    ) -> Option<MetadataElement> {
        self.elements.insert(name.into(), element.into())
    }

    /// Insert or replace with a clone of `element`; the caller keeps the original.
    pub fn put_cloned(
        &mut self,
        name: impl Into<String>,
        element: &MetadataElement,
    ) -> Option<MetadataElement> {
        self.elements.insert(name.into(), element.clone())
    }

    pub fn get(&self, name: &str) -> StoreResult<&MetadataElement> {
        self.elements
            .get(name)
            .ok_or_else(|| StoreError::invalid_argument(format!("no metadata element named '{}'", name)))
    }

    /// Element under `name`, cast to a concrete kind.
    pub fn get_as<T: MetadataKind>(&self, name: &str) -> StoreResult<&T> {
        self.get(name)?.cast::<T>()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.elements.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<MetadataElement> {
        self.elements.remove(name)
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataElement)> {
        self.elements.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub(crate) fn entries(&self) -> &BTreeMap<String, MetadataElement> {
        &self.elements
    }

    pub(crate) fn from_entries(elements: BTreeMap<String, MetadataElement>) -> Self {
        Self { elements }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Field;

    #[test]
    fn test_list_adopt_and_clone() {
        let shared = MetadataElement::from(Field::new(5i32));
        let mut list = List::new();
        list.add_element(Field::new("first"));
        list.add_cloned(&shared);

        assert_eq!(list.len(), 2);
        assert_eq!(list.get_as::<Field>(1).unwrap().as_i32().unwrap(), 5);
        // The caller still owns its element.
        assert_eq!(shared.as_field().unwrap().as_i32().unwrap(), 5);
        assert!(list.get(2).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_map_last_write_wins() {
        let mut map = Map::new();
        assert!(map.put_element("units", Field::new("m")).is_none());
        let previous = map.put_element("units", Field::new("km"));

        assert_eq!(
            previous.unwrap().as_field().unwrap().as_string().unwrap(),
            "m"
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_as::<Field>("units").unwrap().as_string().unwrap(), "km");
    }

    #[test]
    fn test_map_missing_name() {
        let map = Map::new();
        assert!(map.get("nope").unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_map_wrong_kind() {
        let mut map = Map::new();
        map.put_element("child", List::new());
        assert!(map.get_as::<Field>("child").unwrap_err().is_type());
        assert!(map.get_as::<List>("child").is_ok());
    }
}
