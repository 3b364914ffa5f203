//! Procedural macros for the methods service.
//!
//! - `#[derive(Label)]`: implements `methods::Label` for an enum, returning the
//!   variant name. The label doubles as the `messageType` tag written into
//!   every envelope, so renaming a variant is a wire-format change.
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, parse_macro_input};

#[proc_macro_derive(Label)]
pub fn derive_label(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = input.ident.clone();

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data_enum) = &input.data else {
        return Error::new_spanned(&input.ident, "Label can only be derived for enums")
            .to_compile_error()
            .into();
    };

    let match_arms = data_enum.variants.iter().map(|variant| {
        let variant_ident = &variant.ident;
        let variant_name = variant_ident.to_string();

        let pattern = match &variant.fields {
            Fields::Unit => quote! { Self::#variant_ident },
            Fields::Unnamed(_) => quote! { Self::#variant_ident(..) },
            Fields::Named(_) => quote! { Self::#variant_ident { .. } },
        };

        quote! {
            #pattern => ::std::borrow::Cow::Borrowed(#variant_name)
        }
    });

    let expanded = quote! {
        impl #impl_generics ::methods::Label for #ident #ty_generics #where_clause {
            fn label(&self) -> ::std::borrow::Cow<'static, str> {
                match self {
                    #(#match_arms),*
                }
            }
        }
    };
    TokenStream::from(expanded)
}
