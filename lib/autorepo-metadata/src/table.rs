use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::{EmitError, RepositoryMetainfo};

/// Read-only lookup contract over a compiled repository.
pub trait MetadataLookup: Send + Sync {
    /// Metadata for a method signature key, if the method was compiled.
    fn get_by_method(&self, signature: &str) -> Option<&RepositoryMetainfo>;

    /// Entity name the repository manages.
    fn entity_name(&self) -> &str;

    /// Declared identifier type.
    fn id_type(&self) -> &str;
}

/// Compiled metadata for one repository, keyed by method signature.
///
/// Built once by the compiler and shared immutably afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTable {
    pub repository: String,
    pub entity_name: String,
    pub id_type: String,
    pub entries: HashMap<String, RepositoryMetainfo>,
}

impl MetadataTable {
    pub fn new(
        repository: impl Into<String>,
        entity_name: impl Into<String>,
        id_type: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            entity_name: entity_name.into(),
            id_type: id_type.into(),
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, signature: impl Into<String>, metainfo: RepositoryMetainfo) {
        self.entries.insert(signature.into(), metainfo);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File name the table is emitted under.
    pub fn file_name(&self) -> String {
        format!("{}MetaData.json", self.repository)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EmitError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl MetadataLookup for MetadataTable {
    fn get_by_method(&self, signature: &str) -> Option<&RepositoryMetainfo> {
        self.entries.get(signature)
    }

    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    fn id_type(&self) -> &str {
        &self.id_type
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    Written(PathBuf),
    /// A table for this repository was already emitted; it was left untouched.
    Skipped(PathBuf),
}

/// Write the table as `<Repository>MetaData.json` under `dir`.
///
/// Never overwrites: an existing file means the repository was already
/// compiled, so emission is skipped with a warning. The table is staged in a
/// temporary file and moved into place only once fully written.
pub fn emit(table: &MetadataTable, dir: impl AsRef<Path>) -> Result<EmitOutcome, EmitError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(table.file_name());

    let contents = serde_json::to_string_pretty(table)?;
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(contents.as_bytes())?;
    staged.as_file().sync_all()?;

    match staged.persist_noclobber(&path) {
        Ok(_) => {
            info!(
                repository = %table.repository,
                path = %path.display(),
                entries = table.len(),
                "emitted metadata table"
            );
            Ok(EmitOutcome::Written(path))
        }
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            warn!(
                repository = %table.repository,
                path = %path.display(),
                "metadata table already exists, skipping"
            );
            Ok(EmitOutcome::Skipped(path))
        }
        Err(e) => Err(e.error.into()),
    }
}
