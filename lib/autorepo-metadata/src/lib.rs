//! Autorepo Metadata - compile-time model for declarative repositories.
//!
//! This crate turns repository declarations into metadata tables that the
//! runtime dispatcher executes. It has no knowledge of sessions or engines.
//!
//! # Pipeline
//!
//! - [`parse`]: method name to [`ParsedQueryMethod`] (`findByNameAndAge`)
//! - [`generate`]: parsed method to query text
//! - [`compile`]: [`RepositoryDeclaration`] + [`EntityDescriptor`] to [`MetadataTable`]
//! - [`emit`]: write a table as plain JSON for later [`MetadataTable::load`]

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod compiler;
mod declaration;
mod error;
mod metainfo;
mod method_name;
mod query;
mod table;

pub use compiler::{compile, validate_method};
pub use declaration::{
    EntityDescriptor, FieldDescriptor, MethodDeclaration, ParamDeclaration, QueryAnnotation,
    RepositoryDeclaration, ReturnShape, is_primitive, normalize_type_name,
};
pub use error::{CompileError, EmitError};
pub use metainfo::{
    BASE_METHODS, MethodSignature, OperationType, RepositoryMetainfo, ReturnStrategy,
    is_base_method,
};
pub use method_name::{
    LogicalOperator, ParsedQueryMethod, QueryPrefix, lower_first, parse, to_camel_case,
};
pub use query::{
    count_all, delete_by_id, extract_bind_parameters, generate, is_data_modification,
    is_valid_native, is_valid_portable, select_all, select_by_id,
};
pub use table::{EmitOutcome, MetadataLookup, MetadataTable, emit};
