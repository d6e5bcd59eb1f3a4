use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, ItemTrait, parse_macro_input};

mod entity;
mod repository;

/// Check if attributes contain a specific marker
pub(crate) fn has_attr(attrs: &[syn::Attribute], attr_name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(attr_name))
}

/// Token text of a type, as used in signature keys and declarations
pub(crate) fn type_string(ty: &syn::Type) -> String {
    quote!(#ty).to_string()
}

/// Derive macro for Entity - describes a struct to the metadata compiler.
///
/// Generates an `autorepo::Entity` implementation with `Id` set to the type
/// of the `#[id]` field.
///
/// Struct attributes:
/// - `#[entity(name = "...")]`: name used in generated queries (default: the struct name)
///
/// Field attributes:
/// - `#[id]`: the identifier field (exactly one required)
/// - `#[property(name = "...")]`: property name (default: camelCase of the field name)
/// - `#[property(skip)]`: leave the field out of the descriptor
///
/// Example:
/// ```text
/// #[derive(Entity, Serialize, Deserialize)]
/// #[entity(name = "Customer")]
/// pub struct CustomerRecord {
///     #[id]
///     pub id: i64,
///     pub first_name: String,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity, id, property))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    entity::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Attribute macro for repository traits.
///
/// Each method is checked against the query grammar at expansion time, then
/// implemented on `autorepo::Repository<Entity>` by dispatching its
/// signature key. A `<Trait>Metadata` type implementing
/// `autorepo::RepositoryDefinition` is generated alongside, and
/// `CrudRepository<Entity>` is added as a supertrait.
///
/// Attributes:
/// - `entity`: the entity type (required)
/// - `id`: the entity's id type (required, checked against `Entity::Id`)
///
/// Method attributes:
/// - `#[query("...")]` / `#[query(value = "...", native)]`: explicit query text
/// - `#[auto_flush]`: flush before and after the query
/// - `#[non_queryable]`: leave a default-bodied method alone
///
/// Parameter attributes:
/// - `#[param("name")]`: bind name for an explicit query
///
/// Methods without `#[query]` derive their query from the name
/// (`find_by_name_and_age`). Every method takes `&self` and returns
/// `Result<T, E>` where `E: From<autorepo::RepositoryError>`.
///
/// Example:
/// ```text
/// #[repository(entity = User, id = i64)]
/// pub trait UserRepository {
///     fn find_by_name(&self, name: &str) -> Result<Vec<User>, RepositoryError>;
///
///     #[query("SELECT u FROM User u WHERE u.age > :age")]
///     fn older_than(&self, #[param("age")] min: i32) -> Result<Vec<User>, RepositoryError>;
/// }
/// ```
#[proc_macro_attribute]
pub fn repository(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = repository::RepositoryArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);
    let item = parse_macro_input!(item as ItemTrait);

    repository::expand(args, item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
