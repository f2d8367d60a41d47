//! 属性注入声明
//!
//! 声明保存在声明类型的实体元数据中，键为 [`PROPERTY_INJECTIONS_KEY`]，
//! 值为映射组成的序列。

use crate::binding::BindingConstraint;
use crate::resolver::ResolutionContext;
use infrastructure_common::{
    DependencyResult, Instance, MetadataError, MetadataResult, MetadataValue, OpaqueValue,
    ServiceIdentifier,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// 属性注入声明的元数据键
pub const PROPERTY_INJECTIONS_KEY: &str = "di:property-injections";

/// 构造依赖的元数据键
pub const CONSTRUCTOR_DEPENDENCIES_KEY: &str = "di:constructor-dependencies";

/// 自定义属性工厂
pub type PropertyFactory =
    Arc<dyn Fn(&mut dyn ResolutionContext) -> DependencyResult<Instance> + Send + Sync>;

/// 属性注入声明
#[derive(Clone)]
pub struct InjectionDeclaration {
    /// 成员名称
    pub member: String,
    /// 所需的服务标识
    pub identifier: ServiceIdentifier,
    /// 是否可选
    pub optional: bool,
    /// 自定义工厂（优先级最高）
    pub factory: Option<PropertyFactory>,
    /// 名称约束
    pub named: Option<String>,
    /// 标签约束
    pub tag: Option<(String, String)>,
}

impl InjectionDeclaration {
    /// 创建必需的注入声明
    pub fn new(member: impl Into<String>, identifier: ServiceIdentifier) -> Self {
        Self {
            member: member.into(),
            identifier,
            optional: false,
            factory: None,
            named: None,
            tag: None,
        }
    }

    /// 标记为可选
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// 按名称约束解析
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.named = Some(name.into());
        self
    }

    /// 按标签约束解析
    pub fn tagged(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag = Some((key.into(), value.into()));
        self
    }

    /// 使用自定义工厂解析
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&mut dyn ResolutionContext) -> DependencyResult<Instance> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// 名称约束优先于标签约束
    pub fn constraint(&self) -> Option<BindingConstraint> {
        if let Some(name) = &self.named {
            return Some(BindingConstraint::Named(name.clone()));
        }
        self.tag
            .as_ref()
            .map(|(key, value)| BindingConstraint::Tagged(key.clone(), value.clone()))
    }

    /// 编码为元数据映射
    pub fn to_metadata(&self) -> MetadataValue {
        let mut mapping = BTreeMap::new();
        mapping.insert("member".to_string(), MetadataValue::from(self.member.as_str()));
        mapping.insert("identifier".to_string(), self.identifier.to_metadata());
        mapping.insert("optional".to_string(), MetadataValue::from(self.optional));
        if let Some(name) = &self.named {
            mapping.insert("named".to_string(), MetadataValue::from(name.as_str()));
        }
        if let Some((key, value)) = &self.tag {
            let mut tag = BTreeMap::new();
            tag.insert("key".to_string(), MetadataValue::from(key.as_str()));
            tag.insert("value".to_string(), MetadataValue::from(value.as_str()));
            mapping.insert("tag".to_string(), MetadataValue::Mapping(tag));
        }
        if let Some(factory) = &self.factory {
            mapping.insert(
                "factory".to_string(),
                MetadataValue::Opaque(OpaqueValue::new(factory.clone())),
            );
        }
        MetadataValue::Mapping(mapping)
    }

    /// 从元数据映射解码
    pub fn from_metadata(value: &MetadataValue) -> MetadataResult<Self> {
        let mapping = value.as_mapping().ok_or(MetadataError::UnexpectedShape {
            expected: "mapping",
        })?;

        let member = mapping
            .get("member")
            .and_then(MetadataValue::as_text)
            .ok_or(MetadataError::MissingField { field: "member" })?;
        let identifier = mapping
            .get("identifier")
            .ok_or(MetadataError::MissingField { field: "identifier" })
            .and_then(ServiceIdentifier::from_metadata)?;
        let optional = mapping
            .get("optional")
            .and_then(MetadataValue::as_bool)
            .unwrap_or(false);
        let named = mapping
            .get("named")
            .and_then(MetadataValue::as_text)
            .map(str::to_string);
        let tag = match mapping.get("tag") {
            None => None,
            Some(tag) => {
                let tag = tag.as_mapping().ok_or(MetadataError::UnexpectedShape {
                    expected: "tag mapping",
                })?;
                let key = tag
                    .get("key")
                    .and_then(MetadataValue::as_text)
                    .ok_or(MetadataError::MissingField { field: "tag.key" })?;
                let value = tag
                    .get("value")
                    .and_then(MetadataValue::as_text)
                    .ok_or(MetadataError::MissingField { field: "tag.value" })?;
                Some((key.to_string(), value.to_string()))
            }
        };
        let factory = match mapping.get("factory") {
            None => None,
            Some(factory) => Some(
                factory
                    .as_opaque()
                    .and_then(|opaque| opaque.downcast_ref::<PropertyFactory>())
                    .cloned()
                    .ok_or(MetadataError::UnexpectedShape {
                        expected: "opaque property factory",
                    })?,
            ),
        };

        Ok(Self {
            member: member.to_string(),
            identifier,
            optional,
            factory,
            named,
            tag,
        })
    }

    /// 将声明列表编码为序列
    pub fn encode_all(declarations: &[InjectionDeclaration]) -> MetadataValue {
        MetadataValue::Sequence(declarations.iter().map(Self::to_metadata).collect())
    }

    /// 从序列解码声明列表
    pub fn decode_all(value: &MetadataValue) -> MetadataResult<Vec<InjectionDeclaration>> {
        value
            .as_sequence()
            .ok_or(MetadataError::UnexpectedShape {
                expected: "sequence",
            })?
            .iter()
            .map(Self::from_metadata)
            .collect()
    }
}

impl fmt::Debug for InjectionDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionDeclaration")
            .field("member", &self.member)
            .field("identifier", &self.identifier)
            .field("optional", &self.optional)
            .field("factory", &self.factory.as_ref().map(|_| "<function>"))
            .field("named", &self.named)
            .field("tag", &self.tag)
            .finish()
    }
}

/// 注入声明清单
///
/// 通常由 `#[derive(Injectable)]` 生成，交给反射器登记。
pub trait InjectionSchema: 'static {
    /// 本类型自身声明的注入（不含继承）
    fn injection_declarations() -> Vec<InjectionDeclaration>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_metadata_encoding() {
        let declaration = InjectionDeclaration::new("formatter", ServiceIdentifier::name("Formatter"))
            .optional()
            .tagged("format", "csv");

        let decoded = InjectionDeclaration::from_metadata(&declaration.to_metadata()).unwrap();
        assert_eq!(decoded.member, "formatter");
        assert_eq!(decoded.identifier, ServiceIdentifier::name("Formatter"));
        assert!(decoded.optional);
        assert_eq!(decoded.tag, Some(("format".to_string(), "csv".to_string())));
        assert!(decoded.factory.is_none());
    }

    #[test]
    fn test_factory_survives_metadata_encoding() {
        let declaration = InjectionDeclaration::new("clock", ServiceIdentifier::name("Clock"))
            .with_factory(|_ctx| Ok(Arc::new(7_u64) as Instance));

        let decoded = InjectionDeclaration::decode_all(&InjectionDeclaration::encode_all(&[
            declaration.clone(),
        ]))
        .unwrap();

        let original = declaration.factory.unwrap();
        let restored = decoded[0].factory.clone().unwrap();
        assert!(Arc::ptr_eq(&original, &restored));
    }

    #[test]
    fn test_named_constraint_wins_over_tag() {
        let declaration = InjectionDeclaration::new("db", ServiceIdentifier::name("Db"))
            .tagged("role", "replica")
            .named("primary");

        assert_eq!(declaration.constraint(), Some(BindingConstraint::named("primary")));
        assert!(InjectionDeclaration::from_metadata(&MetadataValue::Null).is_err());
    }
}
