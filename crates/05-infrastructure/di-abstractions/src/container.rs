//! 服务容器抽象接口
//!
//! 服务提供者只依赖对象安全的 [`ServiceContainer`]；
//! 泛型便捷方法由 [`ContainerExt`] 提供。

use crate::binding::{Binding, BindingConstraint, Implementation};
use crate::contextual::ContextualBindingSpec;
use crate::resolver::ResolutionContext;
use infrastructure_common::{
    downcast_instance, ContextKey, DependencyResult, Instance, Lifetime, Materialized,
    ServiceIdentifier,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// 服务容器 trait
pub trait ServiceContainer: Send + Sync {
    /// 注册绑定；相同标识与约束的旧绑定被替换
    fn add_binding(&self, binding: Binding);

    /// 注册上下文绑定
    fn add_contextual(&self, spec: ContextualBindingSpec) -> DependencyResult<()>;

    /// 解析标识；`context` 为显式指定的消费者
    fn get(
        &self,
        identifier: &ServiceIdentifier,
        context: Option<&ContextKey>,
    ) -> DependencyResult<Instance>;

    /// 按名称或标签约束解析
    fn get_constrained(
        &self,
        identifier: &ServiceIdentifier,
        constraint: &BindingConstraint,
    ) -> DependencyResult<Instance>;

    /// 上下文绑定、普通绑定、延迟服务提供者三者之一能解析该标识
    fn can_resolve(&self, identifier: &ServiceIdentifier, context: Option<&ContextKey>) -> bool;

    /// 是否存在普通绑定（含父容器）
    fn is_bound(&self, identifier: &ServiceIdentifier) -> bool;

    /// 移除本容器中该标识的全部绑定
    fn unbind(&self, identifier: &ServiceIdentifier) -> bool;
}

/// 服务容器的泛型便捷方法
pub trait ContainerExt: ServiceContainer {
    /// 注册瞬时绑定
    fn bind(&self, identifier: impl Into<ServiceIdentifier>, implementation: Implementation) {
        self.add_binding(Binding::new(identifier.into(), implementation, Lifetime::Transient));
    }

    /// 注册单例绑定
    fn singleton(&self, identifier: impl Into<ServiceIdentifier>, implementation: Implementation) {
        self.add_binding(Binding::new(identifier.into(), implementation, Lifetime::Singleton));
    }

    /// 注册瞬时绑定
    fn transient(&self, identifier: impl Into<ServiceIdentifier>, implementation: Implementation) {
        self.add_binding(Binding::new(identifier.into(), implementation, Lifetime::Transient));
    }

    /// 注册请求作用域绑定
    fn request(&self, identifier: impl Into<ServiceIdentifier>, implementation: Implementation) {
        self.add_binding(Binding::new(identifier.into(), implementation, Lifetime::Request));
    }

    /// 注册常量
    fn constant<T: Any + Send + Sync>(&self, identifier: impl Into<ServiceIdentifier>, value: T) {
        self.add_binding(Binding::new(
            identifier.into(),
            Implementation::constant(value),
            Lifetime::Singleton,
        ));
    }

    /// 注册工厂
    fn factory<F>(&self, identifier: impl Into<ServiceIdentifier>, scope: Lifetime, factory: F)
    where
        F: Fn(&mut dyn ResolutionContext) -> DependencyResult<Materialized> + Send + Sync + 'static,
    {
        self.add_binding(Binding::new(
            identifier.into(),
            Implementation::factory(factory),
            scope,
        ));
    }

    /// 解析并转换为具体类型
    fn resolve<T: Any + Send + Sync>(
        &self,
        identifier: &ServiceIdentifier,
    ) -> DependencyResult<Arc<T>> {
        let instance = self.get(identifier, None)?;
        downcast_instance(identifier, instance)
    }

    /// 解析具名绑定
    fn get_named(&self, identifier: &ServiceIdentifier, name: &str) -> DependencyResult<Instance> {
        self.get_constrained(identifier, &BindingConstraint::named(name))
    }

    /// 解析标签绑定
    fn get_tagged(
        &self,
        identifier: &ServiceIdentifier,
        key: &str,
        value: &str,
    ) -> DependencyResult<Instance> {
        self.get_constrained(identifier, &BindingConstraint::tagged(key, value))
    }
}

impl<C: ServiceContainer + ?Sized> ContainerExt for C {}

/// 延迟服务提供者加载接口
///
/// 容器在找不到绑定时询问加载器，由其提升声明了该标识的延迟服务提供者。
pub trait DeferredLoader: Send + Sync {
    /// 是否有尚未加载的延迟服务提供者声明了该标识
    fn can_provide(&self, identifier: &ServiceIdentifier) -> bool;

    /// 提升声明了该标识的延迟服务提供者，返回是否发生了加载
    fn load_for(&self, identifier: &ServiceIdentifier) -> DependencyResult<bool>;
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 是否启用循环依赖检测
    pub enable_circular_dependency_detection: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 是否对复合实例执行属性注入
    pub enable_property_injection: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enable_circular_dependency_detection: true,
            max_resolution_depth: 100,
            enable_property_injection: true,
        }
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    /// 本容器中的绑定数量
    pub bindings: usize,
    /// 已缓存的单例数量
    pub singletons_cached: usize,
    /// 解析总次数
    pub resolutions: u64,
    /// 解析错误次数
    pub resolution_errors: u64,
}
