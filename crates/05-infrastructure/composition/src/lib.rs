//! # 组合根
//!
//! 将依赖注入容器与服务提供者注册表组合成一个可运行的应用。
//!
//! ## 主要功能
//!
//! - **服务提供者注册表**: 按优先级启动、延迟加载、尽力而为的终止
//! - **配置加载**: 配置文件与环境变量叠加
//! - **日志初始化**: 基于 `tracing-subscriber`
//! - **应用构建器**: 使用构建者模式组装应用
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use infrastructure_composition::{ApplicationBuilder, LoggingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = ApplicationBuilder::new()
//!         .with_logging(LoggingConfig::development())
//!         .build()
//!         .await?;
//!
//!     app.start().await?;
//!     let report = app.stop().await?;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod builder;
pub mod logging;
pub mod registry;
pub mod settings;

// 重新导出主要类型
pub use application::{Application, ApplicationMetrics, ApplicationStatus};
pub use builder::ApplicationBuilder;
pub use logging::{init_logging, LoggingConfig};
pub use registry::{ServiceProviderRegistry, TerminationReport};
pub use settings::{CompositionSettings, LoggingSettings, ProviderSettings};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
