//! 绑定生命周期与注册表生命周期状态

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 绑定的生命周期类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// 瞬时模式 - 每次解析都创建新实例
    #[default]
    Transient,
    /// 单例模式 - 容器生命周期内只创建一个实例
    Singleton,
    /// 请求模式 - 在同一请求边界内共享实例
    Request,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Singleton => write!(f, "singleton"),
            Self::Request => write!(f, "request"),
        }
    }
}

impl FromStr for Lifetime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transient" => Ok(Self::Transient),
            "singleton" => Ok(Self::Singleton),
            "request" => Ok(Self::Request),
            other => Err(format!(
                "无效的生命周期: '{}'，可选值为 transient、singleton、request",
                other
            )),
        }
    }
}

/// 请求边界
///
/// 调用方定义的一个工作单元；请求生命周期的实例在边界内共享。
#[derive(Debug, Clone)]
pub struct RequestBoundary {
    /// 边界 ID
    pub id: uuid::Uuid,
    /// 边界名称，用于日志
    pub name: String,
    /// 创建时间
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl RequestBoundary {
    /// 创建新的请求边界
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// 注册表生命周期状态
///
/// 除 `Error` 外单调前进；`Error` 可从任意状态进入，且为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// 刚创建，尚无服务提供者
    #[default]
    Created,
    /// 已有服务提供者登记
    Registered,
    /// 启动中
    Booting,
    /// 已启动
    Booted,
    /// 终止中
    Terminating,
    /// 已终止
    Terminated,
    /// 启动失败
    Error,
}

impl LifecycleState {
    /// 是否允许从当前状态迁移到 `next`
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, next) {
            (Error, _) => false,
            (_, Error) => true,
            (Created, Registered | Booting) => true,
            (Registered, Booting) => true,
            (Booting, Booted) => true,
            (Created | Registered | Booted, Terminating) => true,
            (Terminating, Terminated) => true,
            _ => false,
        }
    }

    /// 是否还能接受新的服务提供者
    pub fn accepts_registration(self) -> bool {
        matches!(
            self,
            LifecycleState::Created | LifecycleState::Registered | LifecycleState::Booted
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Registered => "REGISTERED",
            Self::Booting => "BOOTING",
            Self::Booted => "BOOTED",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_parsing() {
        assert_eq!("singleton".parse::<Lifetime>(), Ok(Lifetime::Singleton));
        assert_eq!(" Request ".parse::<Lifetime>(), Ok(Lifetime::Request));
        assert_eq!(Lifetime::default(), Lifetime::Transient);
        assert!("scoped".parse::<Lifetime>().is_err());
        assert_eq!(Lifetime::Singleton.to_string(), "singleton");
    }

    #[test]
    fn test_state_transitions() {
        use LifecycleState::*;

        assert!(Created.can_transition_to(Registered));
        assert!(Registered.can_transition_to(Booting));
        assert!(Booting.can_transition_to(Booted));
        assert!(Booted.can_transition_to(Terminating));
        assert!(Terminating.can_transition_to(Terminated));
        assert!(Booting.can_transition_to(Error));

        assert!(!Booted.can_transition_to(Booting));
        assert!(!Terminated.can_transition_to(Created));
        assert!(!Error.can_transition_to(Terminating));
        assert!(!Error.can_transition_to(Error));
    }
}
