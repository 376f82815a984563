//! Proc macros for the D&D rules engine.
//!
//! Provides `#[derive(NamedVariants)]`, which lets a fieldless enum be
//! resolved by member name from rule expressions (e.g. `Athletics` or
//! `athletics` both resolve to `Skill::Athletics`).
//!
//! # Example
//!
//! ```ignore
//! #[derive(NamedVariants)]
//! #[variant(type_name = "Skill")]
//! enum Skill {
//!     Athletics,
//!     #[variant(rename = "SleightOfHand")]
//!     SleightOfHand,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Lit, Meta, Variant};

/// Derive macro implementing `dnd_rules::expressions::NamedVariants`.
///
/// # Attributes
///
/// - `#[variant(type_name = "...")]` on the enum - Override the type name
///   reported to rule expressions (defaults to the enum ident)
/// - `#[variant(rename = "...")]` on a variant - Override the member name
///   used for lookup
#[proc_macro_derive(NamedVariants, attributes(variant))]
pub fn derive_named_variants(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_named_variants(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_named_variants(input: DeriveInput) -> syn::Result<TokenStream2> {
    let enum_name = &input.ident;
    let type_name = get_type_name(&input)?;

    let variants = match &input.data {
        syn::Data::Enum(data) => &data.variants,
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "NamedVariants derive only supports enums",
            ))
        }
    };

    let mut idents = Vec::new();
    let mut names = Vec::new();

    for variant in variants {
        if !matches!(variant.fields, syn::Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "NamedVariants derive only supports fieldless variants",
            ));
        }
        idents.push(&variant.ident);
        names.push(get_variant_name(variant)?);
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::dnd_rules::expressions::NamedVariants for #enum_name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;

            fn variant_names() -> &'static [&'static str] {
                &[#(#names),*]
            }

            fn variant_name(&self) -> &'static str {
                match self {
                    #(Self::#idents => #names,)*
                }
            }

            fn from_variant_name(name: &str) -> Option<Self> {
                let name = name.trim();
                #(
                    if name.eq_ignore_ascii_case(#names) {
                        return Some(Self::#idents);
                    }
                )*
                None
            }
        }
    })
}

fn get_type_name(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if attr.path().is_ident("variant") {
            let meta = attr.parse_args::<Meta>()?;
            if let Some(value) = name_value(&meta, "type_name") {
                return Ok(value);
            }
        }
    }

    Ok(input.ident.to_string())
}

fn get_variant_name(variant: &Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if attr.path().is_ident("variant") {
            let meta = attr.parse_args::<Meta>()?;
            if let Some(value) = name_value(&meta, "rename") {
                return Ok(value);
            }
        }
    }

    Ok(variant.ident.to_string())
}

fn name_value(meta: &Meta, key: &str) -> Option<String> {
    if let Meta::NameValue(nv) = meta {
        if nv.path.is_ident(key) {
            if let syn::Expr::Lit(expr_lit) = &nv.value {
                if let Lit::Str(s) = &expr_lit.lit {
                    return Some(s.value());
                }
            }
        }
    }
    None
}
