//! 服务标识与消费者上下文键

use crate::errors::{MetadataError, MetadataResult};
use crate::metadata::MetadataValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 服务标识
///
/// 服务在容器中绑定时使用的键，可以是符号名称，也可以是类型标签。
/// 类型标签使用 `std::any::type_name` 的完整路径，因此可以序列化往返。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ServiceIdentifier {
    /// 符号名称，例如 `"Logger"`
    Name(String),
    /// 类型标签（完整类型路径）
    Type(String),
}

impl ServiceIdentifier {
    /// 按名称创建标识
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// 按类型创建标识
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type(std::any::type_name::<T>().to_string())
    }

    /// 标识的原始文本
    pub fn as_str(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Type(path) => path,
        }
    }

    /// 短名称：类型标签去掉模块路径，名称原样返回
    pub fn short_name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Type(path) => short_type_name(path),
        }
    }

    /// 标识是否为空
    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }

    /// 编码为元数据值
    pub fn to_metadata(&self) -> MetadataValue {
        let (kind, value) = match self {
            Self::Name(name) => ("name", name),
            Self::Type(path) => ("type", path),
        };
        let mut mapping = BTreeMap::new();
        mapping.insert("kind".to_string(), MetadataValue::from(kind));
        mapping.insert("value".to_string(), MetadataValue::from(value.as_str()));
        MetadataValue::Mapping(mapping)
    }

    /// 从元数据值解码
    pub fn from_metadata(value: &MetadataValue) -> MetadataResult<Self> {
        let mapping = value.as_mapping().ok_or(MetadataError::UnexpectedShape {
            expected: "mapping",
        })?;
        let kind = mapping
            .get("kind")
            .and_then(MetadataValue::as_text)
            .ok_or(MetadataError::MissingField { field: "kind" })?;
        let value = mapping
            .get("value")
            .and_then(MetadataValue::as_text)
            .ok_or(MetadataError::MissingField { field: "value" })?;

        match kind {
            "name" => Ok(Self::Name(value.to_string())),
            "type" => Ok(Self::Type(value.to_string())),
            _ => Err(MetadataError::UnexpectedShape {
                expected: "kind = name | type",
            }),
        }
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name),
            Self::Type(path) => write!(f, "<{}>", path),
        }
    }
}

impl From<&str> for ServiceIdentifier {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ServiceIdentifier {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// 消费者上下文键
///
/// 上下文绑定以消费者的字符串身份为键：有类型的消费者使用类型短名，
/// 否则使用标识本身。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextKey(String);

impl ContextKey {
    /// 创建上下文键
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// 由类型推导上下文键
    pub fn of_type<T: ?Sized + 'static>() -> Self {
        Self(short_type_name(std::any::type_name::<T>()).to_string())
    }

    /// 由类型名推导上下文键
    pub fn from_type_name(type_name: &str) -> Self {
        Self(short_type_name(type_name).to_string())
    }

    /// 上下文键文本
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 是否为空键
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ContextKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&ServiceIdentifier> for ContextKey {
    fn from(identifier: &ServiceIdentifier) -> Self {
        Self(identifier.short_name().to_string())
    }
}

/// 去掉模块路径的类型名，泛型参数保持原样
pub fn short_type_name(type_name: &str) -> &str {
    let base = match type_name.find('<') {
        Some(index) => &type_name[..index],
        None => type_name,
    };
    match base.rfind("::") {
        Some(index) => &type_name[index + 2..],
        None => type_name,
    }
}
