//! Metadata compiler: repository declarations in, metadata tables out.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::declaration::{
    EntityDescriptor, MethodDeclaration, RepositoryDeclaration, ReturnShape, is_primitive,
    normalize_type_name,
};
use crate::metainfo::{
    MethodSignature, OperationType, RepositoryMetainfo, ReturnStrategy, is_base_method,
};
use crate::method_name::{lower_first, parse};
use crate::query::{
    count_all, delete_by_id, extract_bind_parameters, generate, is_valid_native,
    is_valid_portable, select_all, select_by_id,
};
use crate::{CompileError, MetadataTable};

/// Check a single method without the entity's field list.
///
/// Covers everything that can be decided from the declaration alone, which is
/// what the `#[repository]` macro can see at expansion time. `entity` is the
/// entity's Rust type name.
pub fn validate_method(
    repository: &str,
    entity: &str,
    method: &MethodDeclaration,
) -> Result<(), CompileError> {
    if method.non_queryable {
        return Ok(());
    }

    if is_base_method(&method.name) {
        return Err(CompileError::ReservedMethod {
            repository: repository.to_string(),
            method: method.name.clone(),
        });
    }

    validate_return_shape(repository, entity, method)?;

    match &method.query {
        Some(annotation) => {
            let text = annotation.text.trim();
            if text.is_empty() {
                return Err(CompileError::EmptyQuery {
                    repository: repository.to_string(),
                    method: method.name.clone(),
                });
            }

            let (valid, dialect) = if annotation.native {
                (is_valid_native(text), "native")
            } else {
                (is_valid_portable(text), "portable")
            };
            if !valid {
                return Err(CompileError::InvalidQueryText {
                    repository: repository.to_string(),
                    method: method.name.clone(),
                    dialect,
                    query: text.to_string(),
                });
            }

            validate_bindings(repository, method, &extract_bind_parameters(text))
        }
        None => {
            let parsed = parse(&method.name).ok_or_else(|| CompileError::NotDerivable {
                repository: repository.to_string(),
                method: method.name.clone(),
            })?;

            if parsed.has_repeated_operator() {
                return Err(CompileError::RepeatedOperator {
                    repository: repository.to_string(),
                    method: method.name.clone(),
                });
            }

            if parsed.properties.len() != method.params.len() {
                return Err(CompileError::ArityMismatch {
                    repository: repository.to_string(),
                    method: method.name.clone(),
                    properties: parsed.properties.len(),
                    params: method.params.len(),
                });
            }

            Ok(())
        }
    }
}

fn validate_return_shape(
    repository: &str,
    entity: &str,
    method: &MethodDeclaration,
) -> Result<(), CompileError> {
    let supported = match &method.return_type {
        ReturnShape::Unit => true,
        ReturnShape::Primitive(ty) => is_primitive(ty),
        ReturnShape::Entity(ty) | ReturnShape::Optional(ty) | ReturnShape::Collection(ty) => {
            normalize_type_name(ty) == entity
        }
    };

    if supported {
        Ok(())
    } else {
        Err(CompileError::UnsupportedReturnType {
            repository: repository.to_string(),
            method: method.name.clone(),
            found: method.return_type.to_string(),
            entity: entity.to_string(),
        })
    }
}

/// Method parameters and query bind names must correspond one to one.
fn validate_bindings(
    repository: &str,
    method: &MethodDeclaration,
    binds: &BTreeSet<String>,
) -> Result<(), CompileError> {
    let mut bound = HashSet::new();

    for param in &method.params {
        let bind = param.effective_bind_name();
        if !bound.insert(bind) {
            return Err(CompileError::DuplicateBinding {
                repository: repository.to_string(),
                method: method.name.clone(),
                bind: bind.to_string(),
            });
        }
        if !binds.contains(bind) {
            return Err(CompileError::UnboundParameter {
                repository: repository.to_string(),
                method: method.name.clone(),
                param: param.name.clone(),
            });
        }
    }

    if let Some(orphan) = binds.iter().find(|b| !bound.contains(b.as_str())) {
        return Err(CompileError::OrphanBindParameter {
            repository: repository.to_string(),
            method: method.name.clone(),
            bind: orphan.clone(),
        });
    }

    Ok(())
}

/// Compile a repository declaration against its entity.
///
/// Emits the base CRUD entries plus one entry per queryable method.
pub fn compile(
    declaration: &RepositoryDeclaration,
    entity: &EntityDescriptor,
) -> Result<MetadataTable, CompileError> {
    if normalize_type_name(&declaration.entity) != entity.type_name {
        return Err(CompileError::EntityMismatch {
            repository: declaration.name.clone(),
            declared: declaration.entity.clone(),
            found: entity.type_name.clone(),
        });
    }

    if normalize_type_name(&declaration.id_type) != normalize_type_name(&entity.id_type) {
        return Err(CompileError::IdTypeMismatch {
            repository: declaration.name.clone(),
            entity: entity.type_name.clone(),
            field: entity.id_property.clone(),
            field_type: entity.id_type.clone(),
            id_type: declaration.id_type.clone(),
        });
    }

    let mut table = MetadataTable::new(&declaration.name, &entity.name, &declaration.id_type);
    insert_base_entries(&mut table, entity);

    for method in &declaration.methods {
        if method.non_queryable {
            debug!(
                repository = %declaration.name,
                method = %method.name,
                "skipping non-queryable method"
            );
            continue;
        }

        validate_method(&declaration.name, &declaration.entity, method)?;
        let metainfo = compile_method(&declaration.name, entity, method)?;
        table.insert(
            MethodSignature::key(&method.name, &method.param_types()),
            metainfo,
        );
    }

    debug!(
        repository = %declaration.name,
        entity = %entity.name,
        entries = table.len(),
        "compiled repository metadata"
    );

    Ok(table)
}

fn compile_method(
    repository: &str,
    entity: &EntityDescriptor,
    method: &MethodDeclaration,
) -> Result<RepositoryMetainfo, CompileError> {
    let (strategy, result_type) = match &method.return_type {
        ReturnShape::Unit => (ReturnStrategy::Void, "()".to_string()),
        ReturnShape::Entity(_) => (ReturnStrategy::SingleEntity, entity.name.clone()),
        ReturnShape::Optional(_) => (ReturnStrategy::Optional, entity.name.clone()),
        ReturnShape::Collection(_) => (ReturnStrategy::Collection, entity.name.clone()),
        ReturnShape::Primitive(ty) => (ReturnStrategy::Primitive, normalize_type_name(ty)),
    };

    let mut metainfo =
        RepositoryMetainfo::new(&method.name, OperationType::Query, strategy, result_type)
            .with_auto_flush(method.auto_flush);

    if let Some(annotation) = &method.query {
        metainfo = metainfo.with_query(annotation.text.trim(), annotation.native);
        for (idx, param) in method.params.iter().enumerate() {
            metainfo = metainfo.bind(idx, param.effective_bind_name());
        }
        return Ok(metainfo);
    }

    let parsed = parse(&method.name).ok_or_else(|| CompileError::NotDerivable {
        repository: repository.to_string(),
        method: method.name.clone(),
    })?;

    for (idx, (property, param)) in parsed.properties.iter().zip(&method.params).enumerate() {
        let property = lower_first(property);
        let field =
            entity
                .field_by_property(&property)
                .ok_or_else(|| CompileError::UnknownProperty {
                    repository: repository.to_string(),
                    method: method.name.clone(),
                    property: property.clone(),
                    entity: entity.name.clone(),
                })?;

        if normalize_type_name(&param.type_name) != normalize_type_name(&field.type_name) {
            return Err(CompileError::ParameterTypeMismatch {
                repository: repository.to_string(),
                method: method.name.clone(),
                index: idx,
                param: param.name.clone(),
                param_type: param.type_name.clone(),
                entity: entity.name.clone(),
                field: field.field.clone(),
                field_type: field.type_name.clone(),
            });
        }

        metainfo = metainfo.bind(idx, property);
    }

    Ok(metainfo.with_query(generate(&parsed, &entity.name), false))
}

fn insert_base_entries(table: &mut MetadataTable, entity: &EntityDescriptor) {
    let name = entity.name.as_str();
    let id = entity.id_property.as_str();

    let entries = [
        RepositoryMetainfo::new("save", OperationType::Save, ReturnStrategy::SingleEntity, name),
        RepositoryMetainfo::new(
            "saveAndFlush",
            OperationType::Save,
            ReturnStrategy::SingleEntity,
            name,
        )
        .with_auto_flush(true),
        RepositoryMetainfo::new(
            "saveAll",
            OperationType::SaveAll,
            ReturnStrategy::Collection,
            name,
        ),
        RepositoryMetainfo::new("delete", OperationType::Delete, ReturnStrategy::Void, name),
        RepositoryMetainfo::new(
            "deleteAndFlush",
            OperationType::Delete,
            ReturnStrategy::Void,
            name,
        )
        .with_auto_flush(true),
        RepositoryMetainfo::new(
            "deleteById",
            OperationType::DeleteById,
            ReturnStrategy::Void,
            name,
        )
        .with_query(delete_by_id(name, id), false)
        .bind(0, id),
        RepositoryMetainfo::new(
            "findAll",
            OperationType::FindAll,
            ReturnStrategy::Collection,
            name,
        )
        .with_query(select_all(name), false),
        RepositoryMetainfo::new(
            "findById",
            OperationType::FindById,
            ReturnStrategy::Optional,
            name,
        )
        .with_query(select_by_id(name, id), false)
        .bind(0, id),
        RepositoryMetainfo::new("count", OperationType::Count, ReturnStrategy::Primitive, "i64")
            .with_query(count_all(name), false),
    ];

    for entry in entries {
        table.insert(entry.method_name.clone(), entry);
    }
}
