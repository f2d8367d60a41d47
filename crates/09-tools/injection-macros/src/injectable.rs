//! `#[derive(Injectable)]` 实现

use crate::utils::option_arc_inner;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Meta, Result, Type};

/// 单个字段的注入参数
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InjectArgs {
    /// 名称标识；缺省时使用字段的目标类型
    pub id: Option<String>,
    /// 是否可选
    pub optional: bool,
    /// 名称约束
    pub named: Option<String>,
    /// 标签约束
    pub tag: Option<(String, String)>,
}

impl InjectArgs {
    /// 解析字段上的 `#[inject]`；没有该属性时返回 `None`
    pub fn from_field(field: &Field) -> Result<Option<Self>> {
        let mut found = None;

        for attr in &field.attrs {
            if !attr.path().is_ident("inject") {
                continue;
            }
            if found.is_some() {
                return Err(Error::new_spanned(attr, "重复的 #[inject] 属性"));
            }

            let mut args = InjectArgs::default();
            if !matches!(attr.meta, Meta::Path(_)) {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("id") {
                        let lit: LitStr = meta.value()?.parse()?;
                        if lit.value().trim().is_empty() {
                            return Err(meta.error("id 不能为空"));
                        }
                        args.id = Some(lit.value());
                    } else if meta.path.is_ident("optional") {
                        args.optional = true;
                    } else if meta.path.is_ident("named") {
                        let lit: LitStr = meta.value()?.parse()?;
                        args.named = Some(lit.value());
                    } else if meta.path.is_ident("tag") {
                        let mut key = None;
                        let mut value = None;
                        meta.parse_nested_meta(|inner| {
                            if inner.path.is_ident("key") {
                                key = Some(inner.value()?.parse::<LitStr>()?.value());
                            } else if inner.path.is_ident("value") {
                                value = Some(inner.value()?.parse::<LitStr>()?.value());
                            } else {
                                return Err(inner.error("tag 只接受 key 与 value"));
                            }
                            Ok(())
                        })?;
                        match (key, value) {
                            (Some(key), Some(value)) => args.tag = Some((key, value)),
                            _ => return Err(meta.error("tag 需要同时指定 key 与 value")),
                        }
                    } else {
                        return Err(meta.error("未知的 inject 选项"));
                    }
                    Ok(())
                })?;
            }
            found = Some(args);
        }

        Ok(found)
    }
}

/// 一个注入字段
struct InjectField<'a> {
    ident: &'a Ident,
    target: &'a Type,
    args: InjectArgs,
}

impl InjectField<'_> {
    fn declaration(&self) -> TokenStream {
        let member = self.ident.to_string();
        let target = self.target;
        let identifier = match &self.args.id {
            Some(id) => quote! { ::infrastructure_common::ServiceIdentifier::name(#id) },
            None => quote! { ::infrastructure_common::ServiceIdentifier::of::<#target>() },
        };
        let optional = self.args.optional.then(|| quote! { .optional() });
        let named = self.args.named.as_ref().map(|name| quote! { .named(#name) });
        let tag = self
            .args
            .tag
            .as_ref()
            .map(|(key, value)| quote! { .tagged(#key, #value) });

        quote! {
            ::di_abstractions::InjectionDeclaration::new(#member, #identifier)
                #optional #named #tag
        }
    }

    fn setter_arm(&self) -> TokenStream {
        let ident = self.ident;
        let member = ident.to_string();
        let target = self.target;
        quote! {
            #member => {
                self.#ident = ::infrastructure_common::downcast_property::<#target>(member, value)?;
                ::core::result::Result::Ok(())
            }
        }
    }
}

/// 实现 #[derive(Injectable)] 宏
pub fn derive_injectable_impl(input: DeriveInput) -> Result<TokenStream> {
    let struct_name = &input.ident;
    let type_name = struct_name.to_string();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            Fields::Unit => {
                return Ok(expand(&input, Vec::new()));
            }
            Fields::Unnamed(_) => {
                return Err(Error::new_spanned(
                    struct_name,
                    "Injectable 只支持具名字段的结构体",
                ))
            }
        },
        _ => {
            return Err(Error::new_spanned(
                struct_name,
                format!("Injectable 只能用于结构体: {}", type_name),
            ))
        }
    };

    let mut inject_fields = Vec::new();
    for field in fields {
        let Some(args) = InjectArgs::from_field(field)? else {
            continue;
        };
        let target = option_arc_inner(&field.ty).ok_or_else(|| {
            Error::new_spanned(&field.ty, "#[inject] 字段的类型必须是 Option<Arc<T>>")
        })?;
        if let Some(ident) = field.ident.as_ref() {
            inject_fields.push(InjectField {
                ident,
                target,
                args,
            });
        }
    }

    Ok(expand(&input, inject_fields))
}

fn expand(input: &DeriveInput, fields: Vec<InjectField<'_>>) -> TokenStream {
    let struct_name = &input.ident;
    let type_name = struct_name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let arms = fields.iter().map(InjectField::setter_arm);
    let declarations = fields.iter().map(InjectField::declaration);

    quote! {
        impl #impl_generics ::infrastructure_common::Injectable for #struct_name #ty_generics #where_clause {
            fn set_property(
                &mut self,
                member: &str,
                value: ::core::option::Option<::infrastructure_common::Instance>,
            ) -> ::infrastructure_common::DependencyResult<()> {
                let _ = &value;
                match member {
                    #(#arms)*
                    _ => ::core::result::Result::Err(
                        ::infrastructure_common::DependencyError::UnknownMember {
                            type_name: ::std::string::String::from(#type_name),
                            member: ::std::string::String::from(member),
                        },
                    ),
                }
            }

            fn into_instance(
                self: ::std::boxed::Box<Self>,
            ) -> ::infrastructure_common::Instance {
                ::std::sync::Arc::new(*self)
            }
        }

        impl #impl_generics ::di_abstractions::InjectionSchema for #struct_name #ty_generics #where_clause {
            fn injection_declarations() -> ::std::vec::Vec<::di_abstractions::InjectionDeclaration> {
                ::std::vec![#(#declarations),*]
            }
        }
    }
}
