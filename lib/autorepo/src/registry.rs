//! Batch compilation of repository declarations.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use autorepo_metadata::{
    CompileError, EntityDescriptor, MetadataTable, RepositoryDeclaration, compile,
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::repository::{Entity, Repository, RepositoryDefinition};
use crate::{Dispatcher, PersistenceEngine, RepositoryError, SessionContext};

/// One repository declaration paired with its entity.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub declaration: RepositoryDeclaration,
    pub entity: EntityDescriptor,
}

impl CompilationUnit {
    pub fn of<D: RepositoryDefinition>() -> Self {
        Self {
            declaration: D::declaration(),
            entity: D::Entity::descriptor(),
        }
    }
}

/// Some declarations failed to compile.
///
/// Tables that did compile are kept in `registry`.
#[derive(Error, Debug)]
#[error("{} repository declaration(s) failed to compile: {}", .failures.len(), summary(.failures))]
pub struct RegistryError {
    pub failures: Vec<CompileError>,
    pub registry: RepositoryRegistry,
}

fn summary(failures: &[CompileError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Compiled metadata tables, by repository name.
#[derive(Debug, Default, Clone)]
pub struct RepositoryRegistry {
    tables: HashMap<String, Arc<MetadataTable>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every unit on a worker pool sized to the available parallelism.
    ///
    /// All units run to completion before this returns; one failure does not
    /// stop the others.
    pub fn compile(units: Vec<CompilationUnit>) -> Result<Self, RegistryError> {
        let total = units.len();
        let workers = thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(total.max(1));

        let queue = Mutex::new(units.into_iter());
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || {
                    loop {
                        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
                        let Some(unit) = next else {
                            break;
                        };
                        let result = compile(&unit.declaration, &unit.entity);
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut registry = Self::new();
        let mut failures = Vec::new();
        for result in rx {
            match result {
                Ok(table) => registry.register(table),
                Err(e) => {
                    error!(error = %e, "repository compilation failed");
                    failures.push(e);
                }
            }
        }

        info!(
            workers,
            compiled = registry.len(),
            failed = failures.len(),
            "repository compilation finished"
        );

        if failures.is_empty() {
            Ok(registry)
        } else {
            Err(RegistryError { failures, registry })
        }
    }

    pub fn register(&mut self, table: MetadataTable) {
        debug!(repository = %table.repository, entries = table.len(), "registered metadata table");
        self.tables.insert(table.repository.clone(), Arc::new(table));
    }

    pub fn table(&self, repository: &str) -> Option<Arc<MetadataTable>> {
        self.tables.get(repository).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Bind a typed repository to an engine and a session context.
    pub fn repository<D: RepositoryDefinition>(
        &self,
        engine: Arc<dyn PersistenceEngine>,
        context: SessionContext,
    ) -> Result<Repository<D::Entity>, RepositoryError> {
        let table = self
            .table(D::NAME)
            .ok_or_else(|| RepositoryError::MetadataResolution {
                repository: D::NAME.to_string(),
                signature: "*".to_string(),
            })?;

        Ok(Repository::new(Dispatcher::new(table, engine, context)))
    }
}
