//! 绑定定义
//!
//! 绑定把服务标识映射到实现策略（常量、工厂、可构造类型）与生命周期。

use crate::resolver::ResolutionContext;
use infrastructure_common::{
    downcast_instance, DependencyResult, Instance, Lifetime, Materialized, ServiceIdentifier,
    TypeInfo,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 工厂函数类型
pub type FactoryFn =
    Arc<dyn Fn(&mut dyn ResolutionContext) -> DependencyResult<Materialized> + Send + Sync>;

/// 构造函数类型：参数按构造依赖声明的顺序给出
pub type ConstructorFn = Arc<dyn Fn(ConstructorArgs) -> DependencyResult<Materialized> + Send + Sync>;

/// 绑定约束
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum BindingConstraint {
    #[default]
    None,
    /// 具名绑定
    Named(String),
    /// 标签绑定 (key, value)
    Tagged(String, String),
}

impl BindingConstraint {
    /// 名称约束
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// 标签约束
    pub fn tagged(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Tagged(key.into(), value.into())
    }

    /// 是否无约束
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for BindingConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Named(name) => write!(f, "@named({})", name),
            Self::Tagged(key, value) => write!(f, "@tagged({}={})", key, value),
        }
    }
}

/// 构造函数参数
///
/// 按构造依赖的声明顺序保存已解析的实例。
#[derive(Clone, Default)]
pub struct ConstructorArgs {
    identifiers: Vec<ServiceIdentifier>,
    values: Vec<Instance>,
}

impl ConstructorArgs {
    /// 按声明顺序组装参数
    pub fn new(identifiers: Vec<ServiceIdentifier>, values: Vec<Instance>) -> Self {
        Self { identifiers, values }
    }

    /// 参数个数
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否无参数
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 取出第 `index` 个参数并转换为具体类型
    pub fn arg<T: Any + Send + Sync>(&self, index: usize) -> DependencyResult<Arc<T>> {
        let identifier = self
            .identifiers
            .get(index)
            .cloned()
            .unwrap_or_else(|| ServiceIdentifier::name(format!("#{}", index)));
        let value = self
            .values
            .get(index)
            .cloned()
            .ok_or_else(|| infrastructure_common::DependencyError::binding_not_found(&identifier))?;
        downcast_instance(&identifier, value)
    }
}

/// 可构造类型的绑定
#[derive(Clone)]
pub struct ConstructorBinding {
    /// 被构造的类型
    pub type_info: TypeInfo,
    /// 构造函数
    pub construct: ConstructorFn,
}

impl ConstructorBinding {
    /// 为类型 `T` 创建构造绑定
    pub fn of<T, F>(construct: F) -> Self
    where
        T: ?Sized + 'static,
        F: Fn(ConstructorArgs) -> DependencyResult<Materialized> + Send + Sync + 'static,
    {
        Self {
            type_info: TypeInfo::of::<T>(),
            construct: Arc::new(construct),
        }
    }
}

/// 实现策略
#[derive(Clone)]
pub enum Implementation {
    /// 常量：原样返回
    Constant(Instance),
    /// 工厂：每次物化时调用
    Factory(FactoryFn),
    /// 可构造类型：先解析构造依赖再构造
    Constructor(ConstructorBinding),
}

impl Implementation {
    /// 常量实现
    pub fn constant<T: Any + Send + Sync>(value: T) -> Self {
        Self::Constant(Arc::new(value))
    }

    /// 工厂实现
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&mut dyn ResolutionContext) -> DependencyResult<Materialized> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    /// 无依赖的普通值工厂
    pub fn supplier<T, F>(supplier: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(move |_ctx: &mut dyn ResolutionContext| {
            Ok(Materialized::value(supplier()))
        }))
    }

    /// 策略名称，用于日志
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Constant(_) => "constant",
            Self::Factory(_) => "factory",
            Self::Constructor(_) => "constructor",
        }
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constructor(binding) => write!(f, "Constructor({})", binding.type_info.name),
            other => f.write_str(other.kind()),
        }
    }
}

/// 绑定
#[derive(Debug, Clone)]
pub struct Binding {
    /// 服务标识
    pub identifier: ServiceIdentifier,
    /// 绑定约束
    pub constraint: BindingConstraint,
    /// 实现方式
    pub implementation: Implementation,
    /// 生命周期
    pub scope: Lifetime,
}

impl Binding {
    /// 创建无约束的绑定
    pub fn new(identifier: ServiceIdentifier, implementation: Implementation, scope: Lifetime) -> Self {
        Self {
            identifier,
            constraint: BindingConstraint::None,
            implementation,
            scope,
        }
    }

    /// 设为具名绑定
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.constraint = BindingConstraint::named(name);
        self
    }

    /// 设为标签绑定
    pub fn tagged(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraint = BindingConstraint::tagged(key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_args_downcast() {
        let args = ConstructorArgs::new(
            vec![ServiceIdentifier::name("Port")],
            vec![Arc::new(8080_u16) as Instance],
        );

        assert_eq!(*args.arg::<u16>(0).unwrap(), 8080);
        assert!(args.arg::<String>(0).is_err());
        assert!(args.arg::<u16>(1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_binding_constraints() {
        let binding = Binding::new(
            ServiceIdentifier::name("Cache"),
            Implementation::constant(1_u8),
            Lifetime::Singleton,
        )
        .tagged("region", "eu");

        assert_eq!(binding.constraint, BindingConstraint::tagged("region", "eu"));
        assert_eq!(binding.constraint.to_string(), "@tagged(region=eu)");
        assert_eq!(binding.implementation.kind(), "constant");
        assert!(BindingConstraint::default().is_none());
    }
}
