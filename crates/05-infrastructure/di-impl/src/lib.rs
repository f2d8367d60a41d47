//! # 依赖注入具体实现
//!
//! 提供容器、反射器、属性注入解析器与上下文绑定管理器。
//!
//! ```
//! use di_abstractions::{ContainerExt, Implementation};
//! use di_impl::Container;
//! use infrastructure_common::ServiceIdentifier;
//!
//! let container = Container::new();
//! container.singleton("Logger", Implementation::supplier(|| String::from("stdout")));
//!
//! let logger = container
//!     .resolve::<String>(&ServiceIdentifier::name("Logger"))
//!     .unwrap();
//! assert_eq!(logger.as_str(), "stdout");
//! ```

pub mod container;
pub mod contextual;
pub mod injector;
pub mod reflector;

pub use container::{Container, RequestScope};
pub use contextual::{ContextualBindingManager, NeedsBuilder, WhenBuilder};
pub use injector::PropertyInjector;
pub use reflector::{MemberKind, Reflector, TypeDescriptor};

pub use di_abstractions::ContainerExt;
