//! Derive macro for table declarations.
//!
//! This crate provides `#[derive(Table)]`, which turns a struct into a
//! `TableDecl`: the table name plus one column declaration per field,
//! carrying the field's Rust type and its `#[column(...)]` tags.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Expr, Fields, GenericArgument, Ident, Lit, Meta,
    PathArguments, Type, parse_macro_input,
};

/// Derives `TableDecl` for a struct with named fields.
///
/// # Attributes
///
/// - `#[table(name = "table_name")]` - Specifies the SQL table name (optional,
///   defaults to snake_case of struct name)
///
/// # Field Attributes
///
/// Every `key = value` or bare `key` inside `#[column(...)]` becomes a
/// column tag; a bare key means `true`. Common tags:
///
/// - `#[column(name = "column_name")]` - SQL column name
/// - `#[column(width = 64)]` - Type width
/// - `#[column(primary, auto_increment)]` - Key flags
/// - `#[column(default = "new!")]` - Default value
/// - `#[column(index)]`, `#[column(unique_index = "ix_a,ix_b")]` - Indexes
/// - `#[column(skip)]` - Not a column
///
/// `Option<T>` fields are declared as nullable pointers to `T`.
#[proc_macro_derive(Table, attributes(table, column))]
pub fn derive_table(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_table_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_table_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let table_name = get_table_name(&input.attrs, struct_name)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Table derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Table derive only supports structs",
            ));
        }
    };

    let mut column_decls: Vec<TokenStream2> = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let tags = parse_column_tags(&field.attrs)?;
        if tags.iter().any(|(k, _)| k == "skip") {
            continue;
        }
        let (inner_type, is_pointer) = unwrap_option(&field.ty);
        let rust_type = quote!(#inner_type).to_string().replace(' ', "");
        let name = field_name.to_string();
        let tag_calls = tags.iter().map(|(k, v)| quote! { .tag(#k, #v) });

        column_decls.push(quote! {
            ::oxide_schema_core::columns::ColumnDecl::new(#name, #rust_type)
                .pointer(#is_pointer)
                #(#tag_calls)*
        });
    }

    let expanded = quote! {
        impl ::oxide_schema_core::table::TableDecl for #struct_name {
            const NAME: &'static str = #table_name;

            fn columns() -> ::std::vec::Vec<::oxide_schema_core::columns::ColumnDecl> {
                ::std::vec![#(#column_decls),*]
            }
        }
    };

    Ok(expanded)
}

/// Splits `Option<T>` into `(T, true)`; any other type is `(ty, false)`.
fn unwrap_option(ty: &Type) -> (&Type, bool) {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return (inner, true);
                    }
                }
            }
        }
    }
    (ty, false)
}

fn get_table_name(attrs: &[Attribute], struct_name: &Ident) -> syn::Result<String> {
    for attr in attrs {
        if attr.path().is_ident("table") {
            let mut table_name = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let value: Expr = meta.value()?.parse()?;
                    table_name = Some(lit_to_string(&value)?);
                }
                Ok(())
            })?;
            if let Some(name) = table_name {
                return Ok(name);
            }
        }
    }
    // Default to snake_case of struct name
    Ok(to_snake_case(&struct_name.to_string()))
}

fn lit_to_string(value: &Expr) -> syn::Result<String> {
    if let Expr::Lit(lit) = value {
        match &lit.lit {
            Lit::Str(s) => return Ok(s.value()),
            Lit::Int(i) => return Ok(i.base10_digits().to_string()),
            Lit::Float(f) => return Ok(f.base10_digits().to_string()),
            Lit::Bool(b) => return Ok(b.value.to_string()),
            _ => {}
        }
    }
    Err(syn::Error::new_spanned(
        value,
        "expected a string, integer, float or boolean literal",
    ))
}

/// Collects `#[column(...)]` entries as tag pairs, in source order.
fn parse_column_tags(attrs: &[Attribute]) -> syn::Result<Vec<(String, String)>> {
    let mut tags = Vec::new();

    for attr in attrs {
        if attr.path().is_ident("column") {
            // Handle empty attribute like #[column]
            if matches!(attr.meta, Meta::Path(_)) {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                let key = meta
                    .path
                    .get_ident()
                    .ok_or_else(|| meta.error("expected a tag name"))?
                    .to_string();
                let value = if meta.input.peek(syn::Token![=]) {
                    let value: Expr = meta.value()?.parse()?;
                    lit_to_string(&value)?
                } else {
                    "true".to_string()
                };
                tags.push((key, value));
                Ok(())
            })?;
        }
    }

    Ok(tags)
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
