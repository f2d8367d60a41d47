//! 宏工具函数

use syn::{GenericArgument, PathArguments, Type};

/// 从类型中提取第一个泛型参数
pub fn extract_generic_type(ty: &Type) -> Option<&Type> {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if let PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(GenericArgument::Type(inner_type)) = args.args.first() {
                    return Some(inner_type);
                }
            }
        }
    }
    None
}

/// 检查类型的最后一段是否为指定名称
pub fn is_type_named(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == name)
            .unwrap_or(false),
        _ => false,
    }
}

/// 从 `Option<Arc<T>>` 中取出 `T`
pub fn option_arc_inner(ty: &Type) -> Option<&Type> {
    if !is_type_named(ty, "Option") {
        return None;
    }
    let arc = extract_generic_type(ty)?;
    if !is_type_named(arc, "Arc") {
        return None;
    }
    extract_generic_type(arc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;
    use syn::parse_quote;

    #[test]
    fn test_option_arc_inner() {
        let ty: Type = parse_quote!(Option<Arc<Logger>>);
        let inner = option_arc_inner(&ty).unwrap();
        assert_eq!(inner.to_token_stream().to_string(), "Logger");

        let qualified: Type = parse_quote!(std::option::Option<std::sync::Arc<crate::Formatter>>);
        assert!(option_arc_inner(&qualified).is_some());
    }

    #[test]
    fn test_rejects_other_shapes() {
        let plain: Type = parse_quote!(Arc<Logger>);
        assert!(option_arc_inner(&plain).is_none());

        let boxed: Type = parse_quote!(Option<Box<Logger>>);
        assert!(option_arc_inner(&boxed).is_none());

        let reference: Type = parse_quote!(&'static Logger);
        assert!(!is_type_named(&reference, "Option"));
    }
}
