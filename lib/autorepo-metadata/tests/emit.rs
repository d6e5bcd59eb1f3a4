#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use autorepo_metadata::{
    EmitOutcome, EntityDescriptor, FieldDescriptor, MetadataLookup, MetadataTable,
    MethodDeclaration, RepositoryDeclaration, ReturnShape, compile, emit,
};

fn declaration() -> (RepositoryDeclaration, EntityDescriptor) {
    let entity = EntityDescriptor {
        type_name: "Product".into(),
        name: "Product".into(),
        id_property: "sku".into(),
        id_type: "String".into(),
        fields: vec![
            FieldDescriptor {
                field: "sku".into(),
                property: "sku".into(),
                type_name: "String".into(),
            },
            FieldDescriptor {
                field: "brand".into(),
                property: "brand".into(),
                type_name: "String".into(),
            },
        ],
    };

    let declaration = RepositoryDeclaration {
        name: "ProductRepository".into(),
        entity: "Product".into(),
        id_type: "String".into(),
        methods: vec![
            MethodDeclaration::new("findByBrand", ReturnShape::Collection("Product".into()))
                .param("brand", "&str"),
        ],
    };

    (declaration, entity)
}

#[test]
fn emitted_table_round_trips_through_load() {
    let dir = tempfile::tempdir().unwrap();
    let (declaration, entity) = declaration();
    let table = compile(&declaration, &entity).unwrap();

    let outcome = emit(&table, dir.path()).unwrap();
    let path = match outcome {
        EmitOutcome::Written(path) => path,
        EmitOutcome::Skipped(path) => panic!("unexpected skip of {}", path.display()),
    };
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("ProductRepositoryMetaData.json")
    );

    let loaded = MetadataTable::load(&path).unwrap();
    assert_eq!(loaded, table);
    assert_eq!(loaded.entity_name(), "Product");
    assert!(loaded.get_by_method("findByBrand[&str]").is_some());
}

#[test]
fn existing_table_is_skipped_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let (declaration, entity) = declaration();
    let table = compile(&declaration, &entity).unwrap();

    let first = emit(&table, dir.path()).unwrap();
    assert!(matches!(first, EmitOutcome::Written(_)));

    let mut changed = table.clone();
    changed.entries.clear();
    let second = emit(&changed, dir.path()).unwrap();
    let path = match second {
        EmitOutcome::Skipped(path) => path,
        EmitOutcome::Written(path) => panic!("overwrote {}", path.display()),
    };

    let on_disk = MetadataTable::load(path).unwrap();
    assert_eq!(on_disk.len(), table.len());
}

#[test]
fn emit_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("generated").join("metadata");
    let (declaration, entity) = declaration();
    let table = compile(&declaration, &entity).unwrap();

    assert!(matches!(
        emit(&table, &nested).unwrap(),
        EmitOutcome::Written(_)
    ));
    assert!(nested.join(table.file_name()).exists());
}

#[test]
fn emission_leaves_only_complete_tables_behind() {
    let dir = tempfile::tempdir().unwrap();
    let (declaration, entity) = declaration();
    let table = compile(&declaration, &entity).unwrap();

    emit(&table, dir.path()).unwrap();
    assert!(matches!(
        emit(&table, dir.path()).unwrap(),
        EmitOutcome::Skipped(_)
    ));

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![table.file_name()]);
}
