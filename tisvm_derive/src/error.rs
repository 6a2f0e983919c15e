//! Derive macro for error types.
//!
//! # Usage
//!
//! ```ignore
//! use tisvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum LoadError {
//!     #[error("no such node: {0}")]
//!     NoSuchNode(usize),
//!
//!     #[error("node {index} failed to compile: {source}")]
//!     Compile { index: usize, source: Diagnostic },
//!
//!     #[error("grid is empty")]
//!     Empty,
//! }
//! ```
//!
//! Messages are ordinary format strings. Fields are bound by name before the
//! `write!`, so `{field}` and `{field:?}` interpolate through inline capture;
//! tuple fields are addressed positionally as `{0}`, `{1}`, ...
//!
//! A named field called `source` is returned from `Error::source()`, so its
//! type must implement `std::error::Error + 'static`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Ident, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// How one set of fields is destructured for `Display` and `source()`.
struct Bindings {
    /// Pattern following the variant (or `Self`) path.
    pattern: TokenStream2,
    /// Whether a named field called `source` exists.
    has_source: bool,
    /// Number of tuple fields, used to rewrite `{0}` into `{f0}`.
    positional: usize,
}

fn bindings(fields: &Fields) -> Bindings {
    match fields {
        Fields::Unit => Bindings {
            pattern: TokenStream2::new(),
            has_source: false,
            positional: 0,
        },
        Fields::Unnamed(unnamed) => {
            let idents: Vec<Ident> = (0..unnamed.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            Bindings {
                pattern: quote! { ( #(#idents),* ) },
                has_source: false,
                positional: idents.len(),
            }
        }
        Fields::Named(named) => {
            let idents: Vec<&Ident> = named.named.iter().filter_map(|f| f.ident.as_ref()).collect();
            Bindings {
                pattern: quote! { { #(#idents),* } },
                has_source: idents.iter().any(|ident| *ident == "source"),
                positional: 0,
            }
        }
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (display_body, source_body) = match &input.data {
        Data::Enum(data) => {
            let mut display_arms = Vec::with_capacity(data.variants.len());
            let mut source_arms = Vec::new();
            for variant in &data.variants {
                let ident = &variant.ident;
                let message = message(
                    &variant.attrs,
                    ident,
                    &format!("variant `{}`", ident),
                )?;
                let Bindings {
                    pattern,
                    has_source,
                    positional,
                } = bindings(&variant.fields);
                let message = positional_to_named(&message, positional);
                display_arms.push(quote! {
                    Self::#ident #pattern => ::std::write!(__formatter, #message),
                });
                if has_source {
                    source_arms.push(quote! {
                        Self::#ident { source, .. } => ::std::option::Option::Some(
                            source as &(dyn ::std::error::Error + 'static)
                        ),
                    });
                }
            }
            let display = quote! {
                match self {
                    #(#display_arms)*
                }
            };
            let source = if source_arms.is_empty() {
                quote! { ::std::option::Option::None }
            } else {
                quote! {
                    match self {
                        #(#source_arms)*
                        _ => ::std::option::Option::None,
                    }
                }
            };
            (display, source)
        }
        Data::Struct(data) => {
            let message = message(&input.attrs, &input.ident, &format!("type `{}`", name))?;
            let Bindings {
                pattern,
                has_source,
                positional,
            } = bindings(&data.fields);
            let message = positional_to_named(&message, positional);
            let display = quote! {
                let Self #pattern = self;
                ::std::write!(__formatter, #message)
            };
            let source = if has_source {
                quote! {
                    ::std::option::Option::Some(
                        &self.source as &(dyn ::std::error::Error + 'static)
                    )
                }
            } else {
                quote! { ::std::option::Option::None }
            };
            (display, source)
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn fmt(&self, __formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
            #[allow(unreachable_patterns)]
            fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                #source_body
            }
        }
    })
}

/// Reads the string literal out of the `#[error("...")]` attribute.
fn message<T: ToTokens>(attrs: &[Attribute], target: &T, target_desc: &str) -> syn::Result<String> {
    let Some(attr) = attrs.iter().find(|attr| attr.path().is_ident("error")) else {
        return Err(syn::Error::new_spanned(
            target,
            format!("missing #[error(\"...\")] attribute on {target_desc}"),
        ));
    };

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };

    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] message must be a single string literal",
        )),
    }
}

/// Rewrites `{0}` / `{0:?}` style placeholders into the `f0` bindings.
fn positional_to_named(message: &str, count: usize) -> String {
    let mut out = message.to_string();
    for i in (0..count).rev() {
        out = out
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_placeholders_are_renamed() {
        assert_eq!(positional_to_named("bad {0} and {1:?}", 2), "bad {f0} and {f1:?}");
    }

    #[test]
    fn named_placeholders_untouched() {
        assert_eq!(positional_to_named("line {line}: {cause}", 0), "line {line}: {cause}");
    }
}
