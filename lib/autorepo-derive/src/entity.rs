use autorepo_metadata::to_camel_case;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Lit};

use crate::{has_attr, type_string};

/// Get the query name from #[entity(name = "...")], if any
fn get_entity_name(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut name = None;
    for attr in &input.attrs {
        if attr.path().is_ident("entity") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    meta.input.parse::<syn::Token![=]>()?;
                    let lit: Lit = meta.input.parse()?;
                    if let Lit::Str(s) = lit {
                        name = Some(s.value());
                    }
                    Ok(())
                } else {
                    Err(meta.error("unsupported entity attribute, expected `name`"))
                }
            })?;
        }
    }
    Ok(name)
}

/// Options from #[property(skip)] and #[property(name = "...")]
#[derive(Default)]
struct PropertyAttr {
    skip: bool,
    name: Option<String>,
}

fn get_property_attr(field: &syn::Field) -> syn::Result<PropertyAttr> {
    let mut property = PropertyAttr::default();
    for attr in &field.attrs {
        if attr.path().is_ident("property") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    property.skip = true;
                    Ok(())
                } else if meta.path.is_ident("name") {
                    let lit: syn::LitStr = meta.value()?.parse()?;
                    property.name = Some(lit.value());
                    Ok(())
                } else {
                    Err(meta.error("unsupported property attribute, expected `skip` or `name`"))
                }
            })?;
        }
    }
    Ok(property)
}

pub(crate) fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Entity can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                ident,
                "Entity can only be derived for structs",
            ));
        }
    };

    let type_name = ident.to_string();
    let entity_name = get_entity_name(&input)?.unwrap_or_else(|| type_name.clone());

    let mut id = None;
    let mut descriptors = Vec::new();

    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let is_id = has_attr(&field.attrs, "id");
        let attr = get_property_attr(field)?;

        if attr.skip {
            if is_id {
                return Err(syn::Error::new_spanned(
                    field,
                    "the #[id] field cannot be skipped",
                ));
            }
            continue;
        }

        let field_name = field_ident.to_string();
        let property = attr.name.unwrap_or_else(|| to_camel_case(&field_name));
        let field_type = type_string(&field.ty);

        if is_id {
            if id.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "an entity must have exactly one #[id] field",
                ));
            }
            id = Some((field.ty.clone(), property.clone(), field_type.clone()));
        }

        descriptors.push(quote! {
            ::autorepo::FieldDescriptor {
                field: #field_name.to_string(),
                property: #property.to_string(),
                type_name: #field_type.to_string(),
            }
        });
    }

    let Some((id_ty, id_property, id_type)) = id else {
        return Err(syn::Error::new_spanned(
            ident,
            "an entity must have exactly one #[id] field",
        ));
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::autorepo::Entity for #ident #ty_generics #where_clause {
            type Id = #id_ty;

            fn descriptor() -> ::autorepo::EntityDescriptor {
                ::autorepo::EntityDescriptor {
                    type_name: #type_name.to_string(),
                    name: #entity_name.to_string(),
                    id_property: #id_property.to_string(),
                    id_type: #id_type.to_string(),
                    fields: vec![#(#descriptors),*],
                }
            }
        }
    })
}
