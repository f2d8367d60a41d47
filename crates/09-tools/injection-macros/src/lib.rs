//! # Injection Macros
//!
//! 为结构体生成属性注入所需的 `Injectable` 与 `InjectionSchema` 实现。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use injection_macros::Injectable;
//! use std::sync::Arc;
//!
//! #[derive(Default, Injectable)]
//! pub struct ReportService {
//!     #[inject(id = "Logger")]
//!     logger: Option<Arc<Logger>>,
//!     #[inject(id = "Formatter", named = "csv", optional)]
//!     formatter: Option<Arc<CsvFormatter>>,
//!     #[inject(tag(key = "region", value = "eu"))]
//!     storage: Option<Arc<Storage>>,
//!     /// 未标注的字段不参与注入
//!     title: String,
//! }
//!
//! reflector.register_schema::<ReportService>()?;
//! ```

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod injectable;
mod utils;

/// 可注入组件派生宏
///
/// 字段属性 `#[inject(...)]` 只能用于 `Option<Arc<T>>` 字段：
///
/// - `id = "Name"` - 按名称标识解析（缺省为 `ServiceIdentifier::of::<T>()`）
/// - `optional` - 无法解析时置为 `None` 而不是失败
/// - `named = "name"` - 名称约束
/// - `tag(key = "k", value = "v")` - 标签约束
///
/// 继承关系不由宏声明，需通过反射器的 `TypeDescriptor::extends` 注册。
#[proc_macro_derive(Injectable, attributes(inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    injectable::derive_injectable_impl(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
