//! 上下文绑定定义
//!
//! "当消费者 X 需要标识 Y 时，提供 Z"。

use crate::resolver::ResolutionContext;
use infrastructure_common::{
    ContextKey, DependencyError, DependencyResult, Instance, Lifetime, ServiceIdentifier,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 上下文工厂
pub type ContextualFactory =
    Arc<dyn Fn(&mut dyn ResolutionContext) -> DependencyResult<Instance> + Send + Sync>;

/// 上下文绑定的实现
#[derive(Clone)]
pub enum ContextualImplementation {
    Value(Instance),
    Factory(ContextualFactory),
}

impl ContextualImplementation {
    /// 固定值
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// 工厂
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&mut dyn ResolutionContext) -> DependencyResult<Instance> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }
}

impl fmt::Debug for ContextualImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value(..)"),
            Self::Factory(_) => f.write_str("Factory(<function>)"),
        }
    }
}

/// 待校验的上下文绑定
///
/// 各字段可缺省，由 [`ContextualBindingSpec::validate`] 统一校验。
#[derive(Debug, Clone, Default)]
pub struct ContextualBindingSpec {
    /// 消费方
    pub when: Option<ContextKey>,
    /// 被请求的标识
    pub needs: Option<ServiceIdentifier>,
    /// 替代实现
    pub give: Option<ContextualImplementation>,
    /// 生命周期
    pub scope: Lifetime,
}

impl ContextualBindingSpec {
    /// 创建描述
    pub fn new(
        when: impl Into<ContextKey>,
        needs: impl Into<ServiceIdentifier>,
        give: ContextualImplementation,
    ) -> Self {
        Self {
            when: Some(when.into()),
            needs: Some(needs.into()),
            give: Some(give),
            scope: Lifetime::Transient,
        }
    }

    /// 指定生命周期
    pub fn with_scope(mut self, scope: Lifetime) -> Self {
        self.scope = scope;
        self
    }

    /// 按名称设置生命周期（`transient` / `singleton` / `request`）
    pub fn with_scope_name(mut self, scope: &str) -> DependencyResult<Self> {
        self.scope = scope.parse().map_err(DependencyError::contextual)?;
        Ok(self)
    }

    /// 校验 when / needs / give 均已提供
    pub fn validate(self) -> DependencyResult<ContextualBinding> {
        let when = self
            .when
            .ok_or_else(|| DependencyError::contextual("缺少 when（消费者上下文）"))?;
        if when.is_empty() {
            return Err(DependencyError::contextual("when（消费者上下文）不能为空"));
        }
        let needs = self
            .needs
            .ok_or_else(|| DependencyError::contextual("缺少 needs（所需标识）"))?;
        if needs.is_empty() {
            return Err(DependencyError::contextual("needs（所需标识）不能为空"));
        }
        let give = self
            .give
            .ok_or_else(|| DependencyError::contextual("缺少 give（实现）"))?;

        Ok(ContextualBinding {
            when,
            needs,
            give,
            scope: self.scope,
        })
    }
}

/// 已校验的上下文绑定
#[derive(Debug, Clone)]
pub struct ContextualBinding {
    /// 消费方
    pub when: ContextKey,
    /// 被请求的标识
    pub needs: ServiceIdentifier,
    /// 替代实现
    pub give: ContextualImplementation,
    /// 生命周期
    pub scope: Lifetime,
}
