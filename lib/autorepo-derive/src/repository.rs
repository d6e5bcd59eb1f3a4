use autorepo_metadata::{
    MethodDeclaration, MethodSignature, ReturnShape, is_primitive, to_camel_case, validate_method,
};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{
    FnArg, GenericArgument, ItemTrait, LitStr, Pat, PathArguments, ReturnType, TraitItem,
    TraitItemFn, Type, TypeParamBound,
};

use crate::{has_attr, type_string};

const METHOD_ATTRS: [&str; 3] = ["query", "auto_flush", "non_queryable"];

/// Arguments of `#[repository(entity = .., id = ..)]`.
#[derive(Default)]
pub(crate) struct RepositoryArgs {
    entity: Option<Type>,
    id: Option<Type>,
}

impl RepositoryArgs {
    pub(crate) fn parse(&mut self, meta: syn::meta::ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("entity") {
            self.entity = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("id") {
            self.id = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported repository property, expected `entity` or `id`"))
        }
    }
}

/// `#[query("...")]` or `#[query(value = "...", native)]`
fn parse_query_attr(method: &TraitItemFn) -> syn::Result<Option<(String, bool)>> {
    let Some(attr) = method.attrs.iter().find(|a| a.path().is_ident("query")) else {
        return Ok(None);
    };

    if let Ok(lit) = attr.parse_args::<LitStr>() {
        return Ok(Some((lit.value(), false)));
    }

    let mut text = None;
    let mut native = false;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("value") {
            let lit: LitStr = meta.value()?.parse()?;
            text = Some(lit.value());
            Ok(())
        } else if meta.path.is_ident("native") {
            native = true;
            Ok(())
        } else {
            Err(meta.error("unsupported query property, expected `value` or `native`"))
        }
    })?;

    match text {
        Some(text) => Ok(Some((text, native))),
        None => Err(syn::Error::new_spanned(attr, "missing query text")),
    }
}

/// `#[param("name")]` on a method parameter
fn parse_param_attr(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    match attrs.iter().find(|a| a.path().is_ident("param")) {
        Some(attr) => Ok(Some(attr.parse_args::<LitStr>()?.value())),
        None => Ok(None),
    }
}

fn last_segment_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        Type::Reference(reference) => last_segment_name(&reference.elem),
        Type::Paren(paren) => last_segment_name(&paren.elem),
        _ => None,
    }
}

/// The single generic argument of `Wrapper<T>`, if `ty` is one.
fn generic_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

/// Classify `Result<T, _>` into a return shape and the `Outcome` conversion.
fn return_shape(output: &ReturnType) -> syn::Result<(ReturnShape, &'static str)> {
    let ReturnType::Type(_, ty) = output else {
        return Err(syn::Error::new_spanned(
            output,
            "repository methods must return Result<T, E>",
        ));
    };
    let Some(inner) = generic_argument(ty, "Result") else {
        return Err(syn::Error::new_spanned(
            ty,
            "repository methods must return Result<T, E>",
        ));
    };

    if matches!(inner, Type::Tuple(tuple) if tuple.elems.is_empty()) {
        return Ok((ReturnShape::Unit, "into_unit"));
    }

    let entity_name = |ty: &Type| last_segment_name(ty).unwrap_or_else(|| type_string(ty));

    if let Some(element) = generic_argument(inner, "Vec") {
        return Ok((
            ReturnShape::Collection(entity_name(element)),
            "into_collection",
        ));
    }
    if let Some(element) = generic_argument(inner, "Option") {
        return Ok((ReturnShape::Optional(entity_name(element)), "into_optional"));
    }

    let name = type_string(inner);
    if is_primitive(&name) {
        return Ok((ReturnShape::Primitive(name), "into_scalar"));
    }

    Ok((ReturnShape::Entity(entity_name(inner)), "into_single"))
}

struct Param {
    ident: syn::Ident,
    type_name: String,
    bind_name: Option<String>,
}

fn method_params(method: &TraitItemFn) -> syn::Result<Vec<Param>> {
    let mut inputs = method.sig.inputs.iter();

    match inputs.next() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new_spanned(
                &method.sig,
                "repository methods must take &self",
            ));
        }
    }

    inputs
        .map(|input| {
            let FnArg::Typed(typed) = input else {
                return Err(syn::Error::new_spanned(input, "unexpected receiver"));
            };
            let Pat::Ident(pat) = typed.pat.as_ref() else {
                return Err(syn::Error::new_spanned(
                    &typed.pat,
                    "repository parameters must be plain identifiers",
                ));
            };
            Ok(Param {
                ident: pat.ident.clone(),
                type_name: type_string(&typed.ty),
                bind_name: parse_param_attr(&typed.attrs)?,
            })
        })
        .collect()
}

fn strip_attrs(method: &mut TraitItemFn) {
    method
        .attrs
        .retain(|attr| !METHOD_ATTRS.iter().any(|name| attr.path().is_ident(name)));
    for input in &mut method.sig.inputs {
        if let FnArg::Typed(typed) = input {
            typed.attrs.retain(|attr| !attr.path().is_ident("param"));
        }
    }
}

pub(crate) fn expand(args: RepositoryArgs, mut item: ItemTrait) -> syn::Result<TokenStream> {
    let trait_ident = item.ident.clone();
    let Some(entity) = args.entity else {
        return Err(syn::Error::new_spanned(
            &trait_ident,
            "missing `entity` in #[repository(...)]",
        ));
    };
    let Some(id) = args.id else {
        return Err(syn::Error::new_spanned(
            &trait_ident,
            "missing `id` in #[repository(...)]",
        ));
    };
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "repository traits cannot be generic",
        ));
    }

    let repository_name = trait_ident.to_string();
    let entity_name = last_segment_name(&entity).unwrap_or_else(|| type_string(&entity));
    let id_type = type_string(&id);

    let mut declarations = Vec::new();
    let mut impls = Vec::new();

    for trait_item in &mut item.items {
        let TraitItem::Fn(method) = trait_item else {
            continue;
        };

        let non_queryable = has_attr(&method.attrs, "non_queryable");
        if non_queryable {
            if method.default.is_none() {
                return Err(syn::Error::new_spanned(
                    &method.sig,
                    "#[non_queryable] methods must have a default body",
                ));
            }
            strip_attrs(method);
            let name = to_camel_case(&method.sig.ident.to_string());
            declarations.push(quote! {
                ::autorepo::MethodDeclaration::new(#name, ::autorepo::ReturnShape::Unit)
                    .non_queryable()
            });
            continue;
        }

        let name = to_camel_case(&method.sig.ident.to_string());
        let (shape, conversion) = return_shape(&method.sig.output)?;
        let query = parse_query_attr(method)?;
        let auto_flush = has_attr(&method.attrs, "auto_flush");
        let params = method_params(method)?;

        let mut declaration = MethodDeclaration::new(&name, shape.clone());
        for param in &params {
            let param_name = param.ident.to_string();
            declaration = match &param.bind_name {
                Some(bind) => declaration.bound_param(&param_name, &param.type_name, bind),
                None => declaration.param(&param_name, &param.type_name),
            };
        }
        if let Some((text, native)) = &query {
            declaration = declaration.query(text, *native);
        }
        if auto_flush {
            declaration = declaration.auto_flush();
        }

        validate_method(&repository_name, &entity_name, &declaration)
            .map_err(|e| syn::Error::new_spanned(&method.sig, e.to_string()))?;

        declarations.push(declaration_tokens(&declaration, &shape));

        strip_attrs(method);

        let signature = MethodSignature::key(&name, &declaration.param_types());
        let conversion = format_ident!("{}", conversion);
        let sig = &method.sig;
        let args = params.iter().map(|p| &p.ident);
        impls.push(quote! {
            #sig {
                match self
                    .invoke(#signature, vec![#(::autorepo::Value::from(#args)),*])
                    .and_then(::autorepo::Outcome::#conversion)
                {
                    Ok(value) => Ok(value),
                    Err(e) => Err(::core::convert::From::from(e)),
                }
            }
        });
    }

    let has_crud = item.supertraits.iter().any(|bound| match bound {
        TypeParamBound::Trait(t) => t
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == "CrudRepository"),
        _ => false,
    });
    if !has_crud {
        item.supertraits
            .push(syn::parse_quote!(::autorepo::CrudRepository<#entity>));
    }

    let vis = &item.vis;
    let metadata_ident = format_ident!("{}Metadata", trait_ident);

    Ok(quote! {
        #item

        /// Compiled description of the repository trait.
        #vis struct #metadata_ident;

        impl ::autorepo::RepositoryDefinition for #metadata_ident {
            type Entity = #entity;

            const NAME: &'static str = #repository_name;

            fn declaration() -> ::autorepo::RepositoryDeclaration {
                ::autorepo::RepositoryDeclaration {
                    name: #repository_name.to_string(),
                    entity: #entity_name.to_string(),
                    id_type: #id_type.to_string(),
                    methods: vec![#(#declarations),*],
                }
            }
        }

        const _: fn(<#entity as ::autorepo::Entity>::Id) -> #id = |id| id;

        impl #trait_ident for ::autorepo::Repository<#entity> {
            #(#impls)*
        }
    })
}

fn declaration_tokens(declaration: &MethodDeclaration, shape: &ReturnShape) -> TokenStream {
    let name = &declaration.name;
    let shape = match shape {
        ReturnShape::Unit => quote!(::autorepo::ReturnShape::Unit),
        ReturnShape::Entity(ty) => quote!(::autorepo::ReturnShape::Entity(#ty.to_string())),
        ReturnShape::Optional(ty) => quote!(::autorepo::ReturnShape::Optional(#ty.to_string())),
        ReturnShape::Collection(ty) => {
            quote!(::autorepo::ReturnShape::Collection(#ty.to_string()))
        }
        ReturnShape::Primitive(ty) => quote!(::autorepo::ReturnShape::Primitive(#ty.to_string())),
    };

    let params = declaration.params.iter().map(|p| {
        let param_name = &p.name;
        let type_name = &p.type_name;
        match &p.bind_name {
            Some(bind) => quote!(.bound_param(#param_name, #type_name, #bind)),
            None => quote!(.param(#param_name, #type_name)),
        }
    });
    let query = declaration.query.as_ref().map(|q| {
        let text = &q.text;
        let native = q.native;
        quote!(.query(#text, #native))
    });
    let auto_flush = declaration.auto_flush.then(|| quote!(.auto_flush()));

    quote! {
        ::autorepo::MethodDeclaration::new(#name, #shape)
            #(#params)*
            #query
            #auto_flush
    }
}
