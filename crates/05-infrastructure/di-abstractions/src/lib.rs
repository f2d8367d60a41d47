//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义容器、绑定与服务提供者之间的对象安全接口。
//!
//! ## 核心接口
//!
//! - [`ServiceContainer`] - 服务容器接口（服务提供者在其上注册绑定）
//! - [`ResolutionContext`] - 工厂与属性注入使用的解析上下文
//! - [`Binding`] - 标识到实现策略与生命周期的绑定
//! - [`ServiceProvider`] - 服务提供者能力契约
//! - [`InjectionDeclaration`] - 属性注入声明

pub mod binding;
pub mod container;
pub mod contextual;
pub mod injection;
pub mod provider;
pub mod resolver;

pub use binding::*;
pub use container::*;
pub use contextual::*;
pub use injection::*;
pub use provider::*;
pub use resolver::*;
