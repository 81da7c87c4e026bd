//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations and,
//! for enums annotated with `#[error_code(Type)]`, a `code()` accessor mapping
//! each variant onto a variant of that numeric code type.
//!
//! # Usage
//!
//! ```ignore
//! use bytemachine_derive::Error;
//!
//! #[derive(Debug, Error)]
//! #[error_code(ErrorCode)]
//! pub enum VMError {
//!     #[error("unimplemented instruction ID {id} at {address:#x}")]
//!     #[error_code(UnimplementedInstructionId)]
//!     UnimplementedInstruction { id: u16, address: u64 },
//!
//!     #[error("io error: {0}")]
//!     #[error_code(NoError)]
//!     Io(String),
//! }
//! ```
//!
//! # Supported Features
//!
//! - Unit variants: `#[error("message")]`
//! - Tuple variants with positional args: `#[error("error: {0}")]`
//! - Struct variants with named args and format specs: `#[error("at {address:#x}")]`
//! - Fields not referenced by the message are ignored
//! - Optional `#[error_code(..)]` mapping, which must then cover every variant

use proc_macro::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Ident, Lit, Meta, Path, parse_macro_input};

/// Derives `Display` and `Error` for an enum or struct.
///
/// Each variant must have an `#[error("...")]` attribute specifying
/// the display message. Supports field interpolation using `{0}`, `{1}`
/// for tuple fields or `{field_name}` for struct fields.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    match &input.data {
        Data::Enum(data_enum) => {
            let code_type = extract_code_path(&input.attrs)?;
            let mut display_arms = Vec::with_capacity(data_enum.variants.len());
            let mut code_arms = Vec::with_capacity(data_enum.variants.len());

            for variant in &data_enum.variants {
                let variant_name = &variant.ident;
                let error_msg = extract_error_message_from_attrs(
                    &variant.attrs,
                    &variant.ident,
                    &format!("variant `{}`", variant_name),
                )?;
                display_arms.push(display_arm(variant_name, &variant.fields, &error_msg));

                if let Some(code_type) = &code_type {
                    let code = extract_code_path(&variant.attrs)?.ok_or_else(|| {
                        syn::Error::new_spanned(
                            &variant.ident,
                            format!(
                                "missing #[error_code(..)] on variant `{}`; the enum declares an error code type",
                                variant_name
                            ),
                        )
                    })?;
                    let pattern = match &variant.fields {
                        Fields::Unit => quote! { Self::#variant_name },
                        Fields::Unnamed(_) => quote! { Self::#variant_name(..) },
                        Fields::Named(_) => quote! { Self::#variant_name { .. } },
                    };
                    code_arms.push(quote! { #pattern => #code_type::#code, });
                }
            }

            let code_impl = code_type.map(|code_type| {
                quote! {
                    impl #impl_generics #name #ty_generics #where_clause {
                        /// Returns the numeric error code reported for this error.
                        pub const fn code(&self) -> #code_type {
                            match self {
                                #(#code_arms)*
                            }
                        }
                    }
                }
            });

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        match self {
                            #(#display_arms)*
                        }
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}

                #code_impl
            })
        }
        Data::Struct(data_struct) => {
            let error_msg = extract_error_message_from_attrs(
                &input.attrs,
                &input.ident,
                &format!("type `{}`", input.ident),
            )?;

            let display_body = match &data_struct.fields {
                Fields::Unit => quote! { write!(f, #error_msg) },
                Fields::Named(fields) => {
                    let used: Vec<&Ident> = fields
                        .named
                        .iter()
                        .filter_map(|f| f.ident.as_ref())
                        .filter(|ident| references_name(&error_msg, &ident.to_string()))
                        .collect();
                    quote! { write!(f, #error_msg, #(#used = self.#used),*) }
                }
                Fields::Unnamed(fields) => {
                    let format_str = convert_positional_to_named(&error_msg, fields.unnamed.len());
                    let (idents, indices): (Vec<_>, Vec<_>) = (0..fields.unnamed.len())
                        .filter(|i| references_name(&format_str, &format!("f{}", i)))
                        .map(|i| (format_ident!("f{}", i), syn::Index::from(i)))
                        .unzip();
                    quote! { write!(f, #format_str, #(#idents = self.#indices),*) }
                }
            };

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        #display_body
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
            })
        }
        Data::Union(_) => Err(syn::Error::new_spanned(
            input,
            "Error derive does not support unions",
        )),
    }
}

/// Builds the `Display` match arm for one variant, binding only the fields
/// that the message interpolates.
fn display_arm(variant_name: &Ident, fields: &Fields, error_msg: &str) -> proc_macro2::TokenStream {
    match fields {
        Fields::Unit => quote! {
            Self::#variant_name => write!(f, #error_msg),
        },
        Fields::Unnamed(fields) => {
            let format_str = convert_positional_to_named(error_msg, fields.unnamed.len());
            let bindings: Vec<_> = (0..fields.unnamed.len())
                .map(|i| {
                    if references_name(&format_str, &format!("f{}", i)) {
                        format_ident!("f{}", i).into_token_stream()
                    } else {
                        quote! { _ }
                    }
                })
                .collect();
            let used: Vec<_> = (0..fields.unnamed.len())
                .filter(|i| references_name(&format_str, &format!("f{}", i)))
                .map(|i| format_ident!("f{}", i))
                .collect();
            quote! {
                Self::#variant_name(#(#bindings),*) => write!(f, #format_str, #(#used = #used),*),
            }
        }
        Fields::Named(fields) => {
            let used: Vec<&Ident> = fields
                .named
                .iter()
                .filter_map(|f| f.ident.as_ref())
                .filter(|ident| references_name(error_msg, &ident.to_string()))
                .collect();
            quote! {
                Self::#variant_name { #(#used,)* .. } => write!(f, #error_msg, #(#used = #used),*),
            }
        }
    }
}

/// Returns true if `format_str` interpolates `name` as `{name}` or `{name:spec}`.
fn references_name(format_str: &str, name: &str) -> bool {
    let plain = format!("{{{}}}", name);
    let with_spec = format!("{{{}:", name);
    format_str.contains(&plain) || format_str.contains(&with_spec)
}

/// Extracts the path given to an `#[error_code(...)]` attribute, if present.
fn extract_code_path(attrs: &[syn::Attribute]) -> syn::Result<Option<Path>> {
    for attr in attrs {
        if attr.path().is_ident("error_code") {
            return match &attr.meta {
                Meta::List(meta_list) => syn::parse2::<Path>(meta_list.tokens.clone())
                    .map(Some)
                    .map_err(|_| {
                        syn::Error::new_spanned(
                            &attr.meta,
                            "invalid #[error_code] attribute; expected a path like #[error_code(InvalidInputBuffer)]",
                        )
                    }),
                _ => Err(syn::Error::new_spanned(
                    &attr.meta,
                    "invalid #[error_code] attribute; use #[error_code(Name)]",
                )),
            };
        }
    }
    Ok(None)
}

/// Extracts the error message from attributes.
fn extract_error_message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        };
        let lit = syn::parse2::<Lit>(meta_list.tokens.clone()).map_err(|_| {
            syn::Error::new_spanned(
                &attr.meta,
                "failed to parse #[error] attribute; expected a string literal like #[error(\"bad opcode: {0}\")]",
            )
        })?;
        return match lit {
            Lit::Str(lit_str) => Ok(lit_str.value()),
            _ => Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute: message must be a string literal",
            )),
        };
    }

    Err(syn::Error::new_spanned(
        target,
        format!(
            "missing #[error(\"...\")] attribute on {}; every error variant must declare a display message",
            target_desc
        ),
    ))
}

/// Converts positional format args `{0}`, `{1:x}` to named args `{f0}`, `{f1:x}`.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{}}}", i), &format!("{{f{}}}", i))
            .replace(&format!("{{{}:", i), &format!("{{f{}:", i));
    }
    result
}
