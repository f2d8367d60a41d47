//! # Infrastructure Common
//!
//! 组合根运行时的公共类型：服务标识、元数据存储、生命周期与错误定义，
//! 以及可注入组件的契约。
//!
//! ## 核心组件
//!
//! - [`ServiceIdentifier`] / [`ContextKey`] - 服务标识与消费者上下文键
//! - [`MetadataStore`] - 以实体为作用域的元数据存储
//! - [`Injectable`] - 支持属性注入的组件契约
//! - [`Lifetime`] / [`LifecycleState`] - 绑定生命周期与注册表状态

pub mod component;
pub mod errors;
pub mod identifier;
pub mod lifecycle;
pub mod metadata;

pub use component::*;
pub use errors::*;
pub use identifier::*;
pub use lifecycle::*;
pub use metadata::*;
