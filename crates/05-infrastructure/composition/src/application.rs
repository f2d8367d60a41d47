//! 应用组合根

use crate::builder::ApplicationBuilder;
use crate::registry::{ServiceProviderRegistry, TerminationReport};
use di_abstractions::ServiceContainer;
use di_impl::{Container, Reflector};
use infrastructure_common::{
    DependencyResult, InfrastructureError, Instance, LifecycleState, ServiceIdentifier,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tracing::{error, info};

/// 应用
///
/// 进程内唯一的长生命周期上下文：持有根容器与服务提供者注册表，
/// 由入口显式构造并传递给需要它的子系统。
pub struct Application {
    registry: ServiceProviderRegistry,
    status: RwLock<ApplicationStatus>,
    metrics: RwLock<ApplicationMetrics>,
}

impl Application {
    /// 创建应用构建器
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub(crate) fn new(registry: ServiceProviderRegistry) -> Self {
        Self {
            registry,
            status: RwLock::new(ApplicationStatus::Initialized),
            metrics: RwLock::new(ApplicationMetrics::default()),
        }
    }

    /// 启动全部服务提供者
    pub async fn start(&self) -> Result<(), InfrastructureError> {
        info!("启动应用");
        *self.status.write() = ApplicationStatus::Starting;
        self.metrics.write().start_time = Some(chrono::Utc::now());

        if let Err(e) = self.registry.boot().await {
            error!("服务提供者启动失败: {}", e);
            *self.status.write() = ApplicationStatus::Failed;
            return Err(e.into());
        }

        *self.status.write() = ApplicationStatus::Running;
        info!(providers = ?self.registry.active_providers(), "应用启动完成");
        Ok(())
    }

    /// 终止全部服务提供者
    ///
    /// 单个服务提供者的终止失败记录在报告中，不会使本方法失败。
    pub async fn stop(&self) -> Result<TerminationReport, InfrastructureError> {
        info!("停止应用");
        let failed = *self.status.read() == ApplicationStatus::Failed;
        if !failed {
            *self.status.write() = ApplicationStatus::Stopping;
        }

        let report = self.registry.terminate().await?;

        if !failed {
            *self.status.write() = ApplicationStatus::Stopped;
        }
        self.metrics.write().stop_time = Some(chrono::Utc::now());
        info!(clean = report.is_clean(), "应用停止完成");
        Ok(report)
    }

    /// 同步解析；未加载的延迟服务提供者在此被提升
    pub fn resolve<T: Any + Send + Sync>(
        &self,
        identifier: &ServiceIdentifier,
    ) -> DependencyResult<Arc<T>> {
        self.registry.container().resolve::<T>(identifier)
    }

    /// 异步解析
    pub async fn resolve_async<T: Any + Send + Sync>(
        &self,
        identifier: &ServiceIdentifier,
    ) -> DependencyResult<Arc<T>> {
        self.registry.resolve_as::<T>(identifier).await
    }

    /// 解析为未定型实例
    pub fn get(&self, identifier: &ServiceIdentifier) -> DependencyResult<Instance> {
        self.registry.container().get(identifier, None)
    }

    /// 已绑定，或由尚未加载的延迟服务提供者声明
    pub fn is_bound(&self, identifier: &ServiceIdentifier) -> bool {
        self.registry.container().is_bound(identifier) || self.registry.provides(identifier)
    }

    /// 创建子容器
    pub fn create_child(&self) -> Container {
        self.registry.container().create_child()
    }

    /// 根容器
    pub fn container(&self) -> &Container {
        self.registry.container()
    }

    /// 服务提供者注册表
    pub fn registry(&self) -> &ServiceProviderRegistry {
        &self.registry
    }

    /// 共享反射器
    pub fn reflector(&self) -> &Reflector {
        self.registry.container().reflector()
    }

    /// 运行状态
    pub fn status(&self) -> ApplicationStatus {
        *self.status.read()
    }

    /// 注册表生命周期状态
    pub fn lifecycle(&self) -> LifecycleState {
        self.registry.state()
    }

    /// 统计信息
    pub fn metrics(&self) -> ApplicationMetrics {
        let stats = self.registry.container().stats();
        let mut metrics = self.metrics.read().clone();
        metrics.bindings = stats.bindings;
        metrics.resolutions = stats.resolutions;
        metrics.resolution_errors = stats.resolution_errors;
        metrics.active_providers = self.registry.active_providers().len();
        metrics.deferred_providers = self.registry.deferred_providers().len();
        metrics
    }
}

/// 应用运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// 已初始化
    Initialized,
    /// 启动中
    Starting,
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
    /// 失败
    Failed,
}

/// 应用统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationMetrics {
    /// 启动时间
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 停止时间
    pub stop_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 根容器中的绑定数
    pub bindings: usize,
    /// 根容器的解析次数
    pub resolutions: u64,
    /// 根容器的解析失败次数
    pub resolution_errors: u64,
    /// 活动服务提供者数量
    pub active_providers: usize,
    /// 尚未加载的延迟服务提供者数量
    pub deferred_providers: usize,
}

impl ApplicationMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(chrono::Utc::now() - start),
            _ => None,
        }
    }
}
