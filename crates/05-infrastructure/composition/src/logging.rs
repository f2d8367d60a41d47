//! 日志订阅器初始化

use infrastructure_common::InfrastructureError;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 存在时以其为准）
    pub level: tracing::Level,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_string().to_lowercase()))
    }
}

/// 安装全局日志订阅器
///
/// 已存在全局订阅器时返回错误而不是 panic。
pub fn init_logging(config: &LoggingConfig) -> Result<(), InfrastructureError> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| InfrastructureError::BootstrapFailed {
        message: format!("日志初始化失败: {}", e),
    })?;

    info!(level = %config.level, json = config.json_format, "日志系统初始化完成");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let dev = LoggingConfig::development();
        assert_eq!(dev.level, tracing::Level::DEBUG);
        assert!(dev.show_line_number);
        assert!(!dev.json_format);

        let prod = LoggingConfig::production();
        assert!(prod.json_format);
        assert!(!prod.show_target);
    }

    #[test]
    fn test_second_initialisation_reports_error() {
        let config = LoggingConfig::default();
        // 其它测试可能已经安装过订阅器，第二次调用一定失败
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
