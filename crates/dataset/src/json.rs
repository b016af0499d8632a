//! JSON wire encoding for keys, keyspaces, metadata trees, file stubs and
//! whole datasets.
//!
//! Primitive values always travel as strings in their canonical text form,
//! so floating values keep 16 significant digits regardless of the JSON
//! number handling on the other side. File payloads never appear in JSON;
//! a file is written as a stub carrying its content type and name.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use datastore_common::{StoreError, StoreResult};

use crate::dataset::{Dataset, MetadataMap};
use crate::file::DataFile;
use crate::key::{DataKey, DataKeyElement};
use crate::metadata::{Array, ElementType, Field, List, Map, MetadataElement};
use crate::primitive::{Primitive, PrimitiveType};

/// Content type of files created by [`Dataset::add_data_file_as_metadata`].
pub const JSON_CONTENT_TYPE: &str = "application/json";

// ============================================================================
// Keys and keyspaces
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ElementDoc {
    pub(crate) dimension_name: String,
    pub(crate) identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KeyDoc {
    pub(crate) elements: Vec<DataKeyElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KeyspaceDimensionDoc {
    pub(crate) dimension_name: String,
    pub(crate) identifiers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KeyspaceDoc {
    pub(crate) dimensions: Vec<KeyspaceDimensionDoc>,
}

// ============================================================================
// Metadata nodes
// ============================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldBody {
    primitive_type: PrimitiveType,
    value: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArrayBody {
    primitive_type: PrimitiveType,
    values: Vec<String>,
}

#[derive(Serialize)]
struct ListBodyOut<'a> {
    elements: Vec<&'a MetadataElement>,
}

#[derive(Deserialize)]
struct ListBodyIn {
    elements: Vec<MetadataElement>,
}

#[derive(Serialize)]
struct MapBodyOut<'a> {
    elements: &'a BTreeMap<String, MetadataElement>,
}

#[derive(Deserialize)]
struct MapBodyIn {
    elements: BTreeMap<String, MetadataElement>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum BodyOut<'a> {
    Field(FieldBody),
    Array(ArrayBody),
    List(ListBodyOut<'a>),
    Map(MapBodyOut<'a>),
    Key(&'a DataKey),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeOut<'a> {
    element: BodyOut<'a>,
    element_type: ElementType,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeIn {
    element: serde_json::Value,
    element_type: ElementType,
}

impl<'a> From<&'a MetadataElement> for NodeOut<'a> {
    fn from(node: &'a MetadataElement) -> Self {
        let element = match node {
            MetadataElement::Field(field) => BodyOut::Field(FieldBody {
                primitive_type: field.primitive_type(),
                value: field.value().to_string(),
            }),
            MetadataElement::Array(array) => BodyOut::Array(ArrayBody {
                primitive_type: array.primitive_type(),
                values: array.to_strings(),
            }),
            MetadataElement::List(list) => BodyOut::List(ListBodyOut {
                elements: list.iter().collect(),
            }),
            MetadataElement::Map(map) => BodyOut::Map(MapBodyOut {
                elements: map.entries(),
            }),
            MetadataElement::Key(key) => BodyOut::Key(key),
        };
        NodeOut {
            element,
            element_type: node.element_type(),
        }
    }
}

impl TryFrom<NodeIn> for MetadataElement {
    type Error = StoreError;

    fn try_from(node: NodeIn) -> Result<Self, Self::Error> {
        let element = match node.element_type {
            ElementType::Field => {
                let body: FieldBody = serde_json::from_value(node.element)?;
                MetadataElement::Field(Field::new(Primitive::parse(body.primitive_type, &body.value)?))
            }
            ElementType::Array => {
                let body: ArrayBody = serde_json::from_value(node.element)?;
                MetadataElement::Array(Array::parse(body.primitive_type, &body.values)?)
            }
            ElementType::List => {
                let body: ListBodyIn = serde_json::from_value(node.element)?;
                MetadataElement::List(body.elements.into_iter().collect::<List>())
            }
            ElementType::Map => {
                let body: MapBodyIn = serde_json::from_value(node.element)?;
                MetadataElement::Map(Map::from_entries(body.elements))
            }
            ElementType::Key => MetadataElement::Key(serde_json::from_value(node.element)?),
        };
        Ok(element)
    }
}

impl Serialize for MetadataElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NodeOut::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MetadataElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let node = NodeIn::deserialize(deserializer)?;
        MetadataElement::try_from(node).map_err(D::Error::custom)
    }
}

// ============================================================================
// Data files
// ============================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileDoc {
    content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
}

impl Serialize for DataFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FileDoc {
            content_type: self.content_type().to_string(),
            file_name: self.file_name(),
        }
        .serialize(serializer)
    }
}

/// Produces a stub without a source; see [`Dataset::attach_sources`].
impl<'de> Deserialize<'de> for DataFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let doc = FileDoc::deserialize(deserializer)?;
        let file = DataFile::new(doc.content_type);
        if let Some(name) = doc.file_name {
            file.set_file_name(name).map_err(D::Error::custom)?;
        }
        Ok(file)
    }
}

// ============================================================================
// Datasets
// ============================================================================

#[derive(Serialize)]
struct FileEntryOut<'a> {
    key: &'a DataKey,
    file: &'a DataFile,
}

#[derive(Serialize)]
struct MetadataEntryOut<'a> {
    key: &'a DataKey,
    metadata: &'a MetadataElement,
}

#[derive(Deserialize)]
struct FileEntryIn {
    key: DataKey,
    file: DataFile,
}

#[derive(Deserialize)]
struct MetadataEntryIn {
    key: DataKey,
    metadata: MetadataElement,
}

#[derive(Serialize)]
struct DatasetDocOut<'a> {
    files: Vec<FileEntryOut<'a>>,
    metadata: Vec<MetadataEntryOut<'a>>,
}

#[derive(Deserialize)]
struct DatasetDocIn {
    #[serde(default)]
    files: Vec<FileEntryIn>,
    #[serde(default)]
    metadata: Vec<MetadataEntryIn>,
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.with_locked_maps(|files, metadata| {
            DatasetDocOut {
                files: files
                    .iter()
                    .map(|(key, file)| FileEntryOut { key, file: file.as_ref() })
                    .collect(),
                metadata: metadata
                    .iter()
                    .map(|(key, node)| MetadataEntryOut {
                        key,
                        metadata: node.as_ref(),
                    })
                    .collect(),
            }
            .serialize(serializer)
        })
    }
}

/// Produces a context-free dataset whose files have no sources yet.
impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let doc = DatasetDocIn::deserialize(deserializer)?;
        let dataset = Dataset::new();
        for entry in doc.files {
            dataset
                .add_data_file(entry.key, entry.file)
                .map_err(D::Error::custom)?;
        }
        for entry in doc.metadata {
            dataset
                .add_metadata(entry.key, entry.metadata)
                .map_err(D::Error::custom)?;
        }
        Ok(dataset)
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn to_json_string<T: Serialize + ?Sized>(value: &T) -> StoreResult<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn to_json_string_pretty<T: Serialize + ?Sized>(value: &T) -> StoreResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T: DeserializeOwned>(text: &str) -> StoreResult<T> {
    Ok(serde_json::from_str(text)?)
}

pub fn from_json_slice<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn metadata_entries_to_map(entries: Vec<MetadataEntryIn>) -> StoreResult<MetadataMap> {
    let mut map = MetadataMap::new();
    for entry in entries {
        if map.contains_key(&entry.key) {
            return Err(StoreError::invalid_argument(format!(
                "metadata map lists key {} more than once",
                entry.key
            )));
        }
        map.insert(entry.key, entry.metadata);
    }
    Ok(map)
}

/// Encode a key to metadata mapping as `[{"key":..,"metadata":..}, ...]`.
pub fn metadata_map_to_json(map: &MetadataMap) -> StoreResult<String> {
    let entries: Vec<_> = map
        .iter()
        .map(|(key, metadata)| MetadataEntryOut { key, metadata })
        .collect();
    to_json_string(&entries)
}

pub fn metadata_map_from_json(text: &str) -> StoreResult<MetadataMap> {
    metadata_entries_to_map(from_json_str(text)?)
}

pub fn metadata_map_from_slice(bytes: &[u8]) -> StoreResult<MetadataMap> {
    metadata_entries_to_map(from_json_slice(bytes)?)
}
