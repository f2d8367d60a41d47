//! 服务提供者能力契约
//!
//! 服务提供者必须具备 register / boot；可选地具备延迟加载能力
//! （[`DeferredProvider`]）或终止能力（[`TerminableProvider`]）。

use crate::container::ServiceContainer;
use async_trait::async_trait;
use infrastructure_common::ServiceIdentifier;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// 服务提供者 trait
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// 服务提供者名称（注册表内唯一）
    fn name(&self) -> &str;

    /// 向容器注册绑定
    async fn register(&self, container: &dyn ServiceContainer) -> anyhow::Result<()>;

    /// 启动
    async fn boot(&self, _container: &dyn ServiceContainer) -> anyhow::Result<()> {
        Ok(())
    }

    /// 延迟加载能力
    fn as_deferred(&self) -> Option<&dyn DeferredProvider> {
        None
    }

    /// 终止能力
    fn as_terminable(&self) -> Option<&dyn TerminableProvider> {
        None
    }
}

/// 延迟服务提供者
///
/// 直到所声明的标识第一次被请求时才注册与启动。
pub trait DeferredProvider: Send + Sync {
    /// 声明提供的标识
    fn provides(&self) -> Vec<ServiceIdentifier>;

    /// 是否已加载
    fn is_loaded(&self) -> bool;

    /// 标记为已加载
    fn mark_loaded(&self);
}

/// 可终止的服务提供者
#[async_trait]
pub trait TerminableProvider: Send + Sync {
    /// 释放资源
    async fn terminate(&self) -> anyhow::Result<()>;
}

/// 加载状态标记
///
/// 供延迟服务提供者内嵌使用。
#[derive(Debug, Default)]
pub struct LoadState(AtomicBool);

impl LoadState {
    /// 创建未加载状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否已加载
    pub fn is_loaded(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// 标记为已加载
    pub fn mark_loaded(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// 服务提供者配置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// 启动优先级，数值越大越先启动
    pub priority: i32,
    /// 推迟 register 到 boot 阶段
    pub deferred: bool,
}

impl ProviderConfig {
    /// 指定优先级，其余取默认值
    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority,
            deferred: false,
        }
    }
}
