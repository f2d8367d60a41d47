//! 应用构建器

use crate::application::Application;
use crate::logging::{init_logging, LoggingConfig};
use crate::registry::ServiceProviderRegistry;
use crate::settings::CompositionSettings;
use di_abstractions::{ContainerConfig, ProviderConfig, ServiceProvider};
use di_impl::{Container, Reflector};
use infrastructure_common::InfrastructureError;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 应用构建器
///
/// 使用建造者模式组装容器、注册表与服务提供者
pub struct ApplicationBuilder {
    /// 组合根配置
    settings: CompositionSettings,
    /// 显式指定的容器配置，优先于 `settings.container`
    container_config: Option<ContainerConfig>,
    /// 共享的反射器
    reflector: Option<Reflector>,
    /// 日志配置；未设置时不初始化日志
    logging: Option<LoggingConfig>,
    providers: Vec<(Arc<dyn ServiceProvider>, ProviderConfig)>,
}

impl ApplicationBuilder {
    /// 创建新的应用构建器
    pub fn new() -> Self {
        Self {
            settings: CompositionSettings::default(),
            container_config: None,
            reflector: None,
            logging: None,
            providers: Vec::new(),
        }
    }

    /// 使用已加载的配置
    pub fn with_settings(mut self, settings: CompositionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 从文件加载配置（文件必须存在）
    pub fn load_settings<P: AsRef<Path>>(mut self, path: P) -> Result<Self, InfrastructureError> {
        let path = path.as_ref();
        info!("加载组合根配置: {}", path.display());
        self.settings = CompositionSettings::from_file(path)?;
        Ok(self)
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// 按配置中的 `logging` 段初始化日志
    pub fn with_logging_from_settings(mut self) -> Result<Self, InfrastructureError> {
        self.logging = Some(self.settings.logging.to_logging_config()?);
        Ok(self)
    }

    /// 覆盖容器配置
    pub fn with_container_config(mut self, config: ContainerConfig) -> Self {
        self.container_config = Some(config);
        self
    }

    /// 使用共享的反射器
    pub fn with_reflector(mut self, reflector: Reflector) -> Self {
        self.reflector = Some(reflector);
        self
    }

    /// 添加服务提供者
    pub fn add_provider<P: ServiceProvider + 'static>(self, provider: P, config: ProviderConfig) -> Self {
        self.add_shared_provider(Arc::new(provider), config)
    }

    /// 添加共享的服务提供者
    pub fn add_shared_provider(
        mut self,
        provider: Arc<dyn ServiceProvider>,
        config: ProviderConfig,
    ) -> Self {
        debug!(provider = provider.name(), priority = config.priority, "添加服务提供者");
        self.providers.push((provider, config));
        self
    }

    /// 构建应用
    ///
    /// 注册全部服务提供者；任一注册失败时汇总所有失败并返回
    /// [`InfrastructureError::RegistrationFailed`]。
    pub async fn build(self) -> Result<Application, InfrastructureError> {
        info!("开始构建应用");

        // 只有在明确配置了日志时才初始化日志
        if let Some(logging) = &self.logging {
            init_logging(logging)?;
        }

        let config = self
            .container_config
            .unwrap_or_else(|| self.settings.container.clone());
        let container = match self.reflector {
            Some(reflector) => Container::with_reflector(config, reflector),
            None => Container::with_config(config),
        };

        let registry = ServiceProviderRegistry::with_overrides(container, self.settings.providers);
        registry
            .register_all(self.providers)
            .await
            .map_err(|errors| InfrastructureError::RegistrationFailed { errors })?;

        info!(
            active = registry.active_providers().len(),
            deferred = registry.deferred_providers().len(),
            "应用构建完成"
        );
        Ok(Application::new(registry))
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
