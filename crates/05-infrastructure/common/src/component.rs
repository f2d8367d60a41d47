//! 可注入组件契约
//!
//! 容器中的实例统一以 [`Instance`] 形式共享；复合实例在封装为
//! [`Instance`] 之前以 `Box<dyn Injectable>` 的形式接受属性注入。

use crate::errors::{DependencyError, DependencyResult};
use crate::identifier::ServiceIdentifier;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 容器内共享的实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 可注入组件 trait
///
/// 属性注入按成员名称调用 [`Injectable::set_property`]；
/// `None` 表示可选依赖未能解析，成员被显式置为缺省。
pub trait Injectable: Any + Send + Sync {
    /// 组件具体类型的 `TypeId`
    fn injectable_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// 组件具体类型名称
    fn injectable_type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// 为成员赋值
    fn set_property(&mut self, member: &str, value: Option<Instance>) -> DependencyResult<()>;

    /// 封装为共享实例
    fn into_instance(self: Box<Self>) -> Instance;
}

/// 工厂的产出
pub enum Materialized {
    /// 原始值或已共享的值，不做属性注入
    Value(Instance),
    /// 复合值，封装前执行属性注入
    Composite(Box<dyn Injectable>),
}

impl Materialized {
    /// 包装普通值
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// 包装复合值
    pub fn composite<T: Injectable>(value: T) -> Self {
        Self::Composite(Box::new(value))
    }
}

impl fmt::Debug for Materialized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Materialized::Value(..)"),
            Self::Composite(inner) => write!(f, "Materialized::Composite({})", inner.injectable_type_name()),
        }
    }
}

/// 将注入值转换为成员的具体类型
///
/// 供手写或宏生成的 [`Injectable::set_property`] 使用。
pub fn downcast_property<T: Any + Send + Sync>(
    member: &str,
    value: Option<Instance>,
) -> DependencyResult<Option<Arc<T>>> {
    match value {
        None => Ok(None),
        Some(instance) => instance
            .downcast::<T>()
            .map(Some)
            .map_err(|_| DependencyError::TypeMismatch {
                identifier: ServiceIdentifier::name(member),
                expected: std::any::type_name::<T>(),
            }),
    }
}

/// 将共享实例转换为具体类型
pub fn downcast_instance<T: Any + Send + Sync>(
    identifier: &ServiceIdentifier,
    instance: Instance,
) -> DependencyResult<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| DependencyError::TypeMismatch {
            identifier: identifier.clone(),
            expected: std::any::type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Consumer {
        logger: Option<Arc<String>>,
    }

    impl Injectable for Consumer {
        fn set_property(&mut self, member: &str, value: Option<Instance>) -> DependencyResult<()> {
            match member {
                "logger" => {
                    self.logger = downcast_property(member, value)?;
                    Ok(())
                }
                _ => Err(DependencyError::UnknownMember {
                    type_name: self.injectable_type_name().to_string(),
                    member: member.to_string(),
                }),
            }
        }

        fn into_instance(self: Box<Self>) -> Instance {
            Arc::new(*self)
        }
    }

    #[test]
    fn test_set_property_downcasts() {
        let mut consumer = Consumer::default();
        let value: Instance = Arc::new("stdout".to_string());

        consumer.set_property("logger", Some(value)).unwrap();
        assert_eq!(consumer.logger.as_deref().map(String::as_str), Some("stdout"));

        consumer.set_property("logger", None).unwrap();
        assert!(consumer.logger.is_none());
    }

    #[test]
    fn test_set_property_type_mismatch() {
        let mut consumer = Consumer::default();
        let wrong: Instance = Arc::new(42_u32);

        let err = consumer.set_property("logger", Some(wrong)).unwrap_err();
        assert!(matches!(err, DependencyError::TypeMismatch { .. }));
        assert!(matches!(
            consumer.set_property("missing", None),
            Err(DependencyError::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_boxed_type_identity() {
        let boxed: Box<dyn Injectable> = Box::new(Consumer::default());
        assert_eq!(boxed.injectable_type(), TypeId::of::<Consumer>());

        let instance = boxed.into_instance();
        assert!(instance.downcast::<Consumer>().is_ok());
    }
}
