//! 错误类型定义

use crate::identifier::ServiceIdentifier;
use thiserror::Error;

/// 依赖注入错误类型
///
/// 解析阶段（`get`、属性注入、上下文绑定注册）产生的全部错误。
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("未找到绑定: {identifier}")]
    BindingNotFound { identifier: ServiceIdentifier },

    #[error("属性注入失败: {type_name}.{member} <- {identifier}, 原因: {source}")]
    InjectionFailure {
        member: String,
        type_name: String,
        identifier: ServiceIdentifier,
        #[source]
        source: Box<DependencyError>,
    },

    #[error("循环依赖检测到: {chain}")]
    CyclicDependency { chain: String },

    #[error("超过最大解析深度 {max_depth}: {chain}")]
    MaxDepthExceeded { max_depth: usize, chain: String },

    #[error("类型不匹配: {identifier}, 期望 {expected}")]
    TypeMismatch {
        identifier: ServiceIdentifier,
        expected: &'static str,
    },

    #[error("上下文绑定无效: {message}")]
    ContextualBindingValidation { message: String },

    #[error("类型 {type_name} 没有可注入成员 {member}")]
    UnknownMember { type_name: String, member: String },

    #[error("类型不可构造: {type_name}")]
    NotConstructible { type_name: String },

    #[error("组件创建失败: {type_name}, 原因: {source}")]
    ComponentCreationFailed {
        type_name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("延迟服务提供者加载失败: {provider}, 原因: {message}")]
    DeferredProviderFailed { provider: String, message: String },

    #[error("注入元数据无效: {source}")]
    InvalidMetadata {
        #[from]
        source: MetadataError,
    },
}

impl DependencyError {
    /// 创建绑定未找到错误
    pub fn binding_not_found(identifier: &ServiceIdentifier) -> Self {
        Self::BindingNotFound {
            identifier: identifier.clone(),
        }
    }

    /// 创建上下文绑定校验错误
    pub fn contextual(message: impl Into<String>) -> Self {
        Self::ContextualBindingValidation {
            message: message.into(),
        }
    }

    /// 包装任意错误为组件创建失败
    pub fn creation_failed(
        type_name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ComponentCreationFailed {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// 是否为"未找到绑定"错误
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BindingNotFound { .. })
    }
}

/// 服务提供者错误类型
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("服务提供者无效: {name}, 原因: {reason}")]
    InvalidProvider { name: String, reason: String },

    #[error("服务提供者注册失败: {name}, 原因: {source}")]
    Registration {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("服务提供者启动失败: {name}, 原因: {source}")]
    ProviderBoot {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("服务提供者终止失败: {name}, 原因: {source}")]
    ProviderTermination {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("当前状态 {state} 下不允许执行 {operation}")]
    InvalidState {
        operation: &'static str,
        state: crate::lifecycle::LifecycleState,
    },
}

impl ProviderError {
    /// 创建无效提供者错误
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProvider {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// 出错的提供者名称
    pub fn provider_name(&self) -> Option<&str> {
        match self {
            Self::InvalidProvider { name, .. }
            | Self::Registration { name, .. }
            | Self::ProviderBoot { name, .. }
            | Self::ProviderTermination { name, .. } => Some(name),
            Self::InvalidState { .. } => None,
        }
    }
}

/// 元数据解码错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("元数据结构不符: 期望 {expected}")]
    UnexpectedShape { expected: &'static str },

    #[error("元数据缺少字段: {field}")]
    MissingField { field: &'static str },
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("依赖注入错误: {source}")]
    DependencyError {
        #[from]
        source: DependencyError,
    },

    #[error("服务提供者错误: {source}")]
    ProviderError {
        #[from]
        source: ProviderError,
    },

    #[error("服务提供者注册失败 ({} 个错误)", .errors.len())]
    RegistrationFailed { errors: Vec<ProviderError> },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },
}

/// 结果类型别名
pub type DependencyResult<T> = Result<T, DependencyError>;
/// 服务提供者操作结果
pub type ProviderResult<T> = Result<T, ProviderError>;
/// 元数据操作结果
pub type MetadataResult<T> = Result<T, MetadataError>;
/// 配置操作结果
pub type ConfigResult<T> = Result<T, ConfigError>;
/// 基础设施操作结果
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;
