//! `#[derive(Record)]`: struct-field-reflection change tracking. Our
//! records (`Node`, `Nic`, …) are plain structs, so this derive walks
//! named fields and generates one `set_<field>` setter per field that
//! both assigns the value and records the field name into a `changed`
//! set — the change-tracking contract §4.2 requires (`changed_fields()`).
//!
//! The annotated struct must have a field named `changed` of type
//! `std::collections::HashSet<&'static str>`; it is excluded from
//! setter generation, as is any field named `id`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

#[proc_macro_derive(Record)]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input: DeriveInput = parse_macro_input!(input);
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => panic!("Record can only be derived for structs with named fields"),
        },
        _ => panic!("Record can only be derived for structs"),
    };

    let setters = fields.iter().filter_map(|f| {
        let ident = f.ident.as_ref().unwrap();
        if ident == "changed" || ident == "id" {
            return None;
        }
        let ty = &f.ty;
        let setter = quote::format_ident!("set_{}", ident);
        let field_name = ident.to_string();
        Some(quote! {
            pub fn #setter(&mut self, value: #ty) {
                self.#ident = value;
                self.changed.insert(#field_name);
            }
        })
    });

    let expanded = quote! {
        impl #name {
            #(#setters)*

            /// Fields set since load (§4.2 change-tracking contract).
            pub fn changed_fields(&self) -> &std::collections::HashSet<&'static str> {
                &self.changed
            }

            /// Clear the change set, e.g. right after a successful save.
            pub fn clear_changed(&mut self) {
                self.changed.clear();
            }

            pub fn is_changed(&self) -> bool {
                !self.changed.is_empty()
            }
        }
    };

    TokenStream::from(expanded)
}
