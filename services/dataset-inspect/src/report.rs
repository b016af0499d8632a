//! Summary of a loaded dataset.

use serde::Serialize;
use std::fmt;

use dataset::{DataKey, Dataset, ElementType, Keyspace};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub key: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Present when the payload could be bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSummary {
    pub key: String,
    pub element_type: ElementType,
}

#[derive(Debug, Serialize)]
pub struct DatasetReport {
    pub files: Vec<FileSummary>,
    pub metadata: Vec<MetadataSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<Keyspace>,
}

impl DatasetReport {
    /// Summarize `dataset`; call `generate_keyspaces` first when including
    /// the keyspace.
    pub fn build(dataset: &Dataset, include_keyspace: bool) -> Self {
        let files = dataset
            .files()
            .into_iter()
            .map(|(key, file)| FileSummary {
                key: key.to_string(),
                content_type: file.content_type().to_string(),
                file_name: file.file_name(),
                size: if file.has_content() { file.size().ok() } else { None },
            })
            .collect();

        let metadata = dataset
            .metadata_entries()
            .into_iter()
            .map(|(key, node): (DataKey, _)| MetadataSummary {
                key: key.to_string(),
                element_type: node.element_type(),
            })
            .collect();

        Self {
            files,
            metadata,
            keyspace: include_keyspace.then(|| dataset.keyspace().as_ref().clone()),
        }
    }

    pub fn bound_files(&self) -> usize {
        self.files.iter().filter(|f| f.size.is_some()).count()
    }
}

impl fmt::Display for DatasetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files: {} ({} bound)", self.files.len(), self.bound_files())?;
        for file in &self.files {
            write!(f, "  {} {}", file.key, file.content_type)?;
            if let Some(name) = &file.file_name {
                write!(f, " {}", name)?;
            }
            match file.size {
                Some(size) => writeln!(f, " {} bytes", size)?,
                None => writeln!(f)?,
            }
        }

        writeln!(f, "Metadata: {}", self.metadata.len())?;
        for entry in &self.metadata {
            writeln!(f, "  {} {}", entry.key, entry.element_type)?;
        }

        if let Some(keyspace) = &self.keyspace {
            match keyspace.key_count() {
                Some(count) => writeln!(f, "Keyspace: {} dimensions, {} keys", keyspace.len(), count)?,
                None => writeln!(f, "Keyspace: {} dimensions, too many keys to count", keyspace.len())?,
            }
            for dimension in keyspace.dimensions() {
                let identifiers: Vec<&str> = dimension.identifiers().collect();
                writeln!(f, "  {}: {}", dimension.dimension(), identifiers.join(", "))?;
            }
        }
        Ok(())
    }
}
