//! 组合根配置
//!
//! 依次叠加：可选的配置文件（默认 `config/composition`，格式由扩展名决定）、
//! 以 `COMPOSITION` 为前缀、`__` 为分隔符的环境变量。

use crate::logging::LoggingConfig;
use di_abstractions::{ContainerConfig, ProviderConfig};
use infrastructure_common::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error};

/// 默认配置文件（不含扩展名）
pub const DEFAULT_SETTINGS_FILE: &str = "config/composition";

/// 环境变量前缀
pub const ENV_PREFIX: &str = "COMPOSITION";

/// 组合根配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionSettings {
    /// 容器配置
    pub container: ContainerConfig,
    /// 按服务提供者名称覆盖代码中的配置
    pub providers: HashMap<String, ProviderSettings>,
    /// 日志配置
    pub logging: LoggingSettings,
}

impl CompositionSettings {
    /// 从默认位置加载
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(DEFAULT_SETTINGS_FILE)
    }

    /// 从指定文件加载；文件不存在时只使用环境变量与默认值
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::build(path.as_ref(), false)
    }

    /// 从指定文件加载；文件必须存在
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::build(path, true)
    }

    fn build(path: &Path, required: bool) -> ConfigResult<Self> {
        debug!(path = %path.display(), required, "加载组合根配置");

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                error!("配置构建失败: {}", e);
                ConfigError::ParseError {
                    source: Box::new(e),
                }
            })?;

        let settings: Self = settings.try_deserialize().map_err(|e| {
            error!("配置绑定失败: {}", e);
            ConfigError::ParseError {
                source: Box::new(e),
            }
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验取值范围
    pub fn validate(&self) -> ConfigResult<()> {
        if self.container.max_resolution_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "container.max_resolution_depth 必须大于 0".to_string(),
            });
        }
        self.logging.level()?;
        Ok(())
    }

    /// 查找服务提供者的覆盖配置
    ///
    /// 先按原名查找，再按小写名查找（环境变量来源的键总是小写）。
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers
            .get(name)
            .or_else(|| self.providers.get(&name.to_lowercase()))
    }
}

/// 单个服务提供者的覆盖配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// 覆盖优先级
    pub priority: Option<i32>,
    /// 覆盖是否推迟注册
    pub deferred: Option<bool>,
    /// 是否启用
    pub enabled: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            priority: None,
            deferred: None,
            enabled: true,
        }
    }
}

impl ProviderSettings {
    /// 用覆盖值替换代码中的配置
    pub fn apply(&self, config: ProviderConfig) -> ProviderConfig {
        ProviderConfig {
            priority: self.priority.unwrap_or(config.priority),
            deferred: self.deferred.unwrap_or(config.deferred),
        }
    }
}

/// 日志配置段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 默认日志级别
    pub level: String,
    /// 是否输出 JSON
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingSettings {
    /// 解析日志级别
    pub fn level(&self) -> ConfigResult<tracing::Level> {
        tracing::Level::from_str(self.level.trim()).map_err(|_| ConfigError::ValidationError {
            message: format!("无效的日志级别: {}", self.level),
        })
    }

    /// 转换为订阅器配置
    pub fn to_logging_config(&self) -> ConfigResult<LoggingConfig> {
        let base = if self.json {
            LoggingConfig::production()
        } else {
            LoggingConfig::default()
        };
        Ok(LoggingConfig {
            level: self.level()?,
            ..base
        })
    }
}
