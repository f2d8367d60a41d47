//! 解析上下文抽象接口
//!
//! 工厂、构造函数与属性注入通过解析上下文回调容器，
//! 上下文记录当前正在物化的消费者，用于上下文绑定与循环检测。

use crate::binding::BindingConstraint;
use infrastructure_common::{
    downcast_instance, ContextKey, DependencyResult, Instance, ServiceIdentifier,
};
use std::any::Any;
use std::sync::Arc;

/// 解析上下文 trait
///
/// 以当前消费者的身份解析依赖：若当前消费者存在上下文绑定，优先使用。
pub trait ResolutionContext {
    /// 以当前消费者身份解析标识
    fn get(&mut self, identifier: &ServiceIdentifier) -> DependencyResult<Instance>;

    /// 按名称或标签约束解析标识
    fn get_constrained(
        &mut self,
        identifier: &ServiceIdentifier,
        constraint: &BindingConstraint,
    ) -> DependencyResult<Instance>;

    /// 检查标识是否可解析（不物化）
    fn can_resolve(&self, identifier: &ServiceIdentifier) -> bool;

    /// 当前消费者的上下文键
    fn consumer(&self) -> Option<&ContextKey>;

    /// 当前解析深度
    fn depth(&self) -> usize;
}

/// 解析上下文的类型化辅助方法
pub trait ResolutionContextExt: ResolutionContext {
    /// 解析并转换为具体类型
    fn resolve<T: Any + Send + Sync>(
        &mut self,
        identifier: &ServiceIdentifier,
    ) -> DependencyResult<Arc<T>> {
        let instance = self.get(identifier)?;
        downcast_instance(identifier, instance)
    }

    /// 按名称约束解析并转换为具体类型
    fn resolve_named<T: Any + Send + Sync>(
        &mut self,
        identifier: &ServiceIdentifier,
        name: &str,
    ) -> DependencyResult<Arc<T>> {
        let instance = self.get_constrained(identifier, &BindingConstraint::named(name))?;
        downcast_instance(identifier, instance)
    }
}

impl<R: ResolutionContext + ?Sized> ResolutionContextExt for R {}
