//! 属性注入解析器

use crate::reflector::Reflector;
use di_abstractions::{InjectionDeclaration, ResolutionContext};
use infrastructure_common::{
    short_type_name, DependencyError, DependencyResult, Injectable, Instance,
};
use tracing::debug;

/// 属性注入解析器
///
/// 按反射器合并后的声明逐个填充成员。解析优先级：
/// 自定义工厂 → 名称约束 → 标签约束 → 普通标识。
#[derive(Debug, Clone)]
pub struct PropertyInjector {
    reflector: Reflector,
}

impl PropertyInjector {
    /// 基于反射器创建
    pub fn new(reflector: Reflector) -> Self {
        Self { reflector }
    }

    /// 对实例执行属性注入
    ///
    /// 可选成员解析失败时被置为缺省并继续；必需成员失败时立即返回
    /// [`DependencyError::InjectionFailure`]，已注入的成员保持原样。
    pub fn inject(
        &self,
        target: &mut dyn Injectable,
        ctx: &mut dyn ResolutionContext,
    ) -> DependencyResult<()> {
        let declarations = self
            .reflector
            .get_injection_declarations(target.injectable_type())?;
        let type_name = short_type_name(target.injectable_type_name());

        for declaration in declarations.iter() {
            let outcome = Self::resolve_declaration(declaration, ctx)
                .and_then(|value| target.set_property(&declaration.member, Some(value)));

            match outcome {
                Ok(()) => {
                    debug!(
                        type_name,
                        member = %declaration.member,
                        identifier = %declaration.identifier,
                        "属性已注入"
                    );
                }
                Err(err) if declaration.optional => {
                    debug!(
                        type_name,
                        member = %declaration.member,
                        error = %err,
                        "可选属性无法解析，置为缺省"
                    );
                    target.set_property(&declaration.member, None)?;
                }
                Err(err) => {
                    return Err(DependencyError::InjectionFailure {
                        member: declaration.member.clone(),
                        type_name: type_name.to_string(),
                        identifier: declaration.identifier.clone(),
                        source: Box::new(err),
                    });
                }
            }
        }

        Ok(())
    }

    fn resolve_declaration(
        declaration: &InjectionDeclaration,
        ctx: &mut dyn ResolutionContext,
    ) -> DependencyResult<Instance> {
        if let Some(factory) = &declaration.factory {
            return factory(ctx);
        }
        match declaration.constraint() {
            Some(constraint) => ctx.get_constrained(&declaration.identifier, &constraint),
            None => ctx.get(&declaration.identifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::BindingConstraint;
    use infrastructure_common::{downcast_property, ContextKey, ServiceIdentifier};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// 以固定表应答的解析上下文
    #[derive(Default)]
    struct TableContext {
        plain: HashMap<ServiceIdentifier, Instance>,
        constrained: HashMap<(ServiceIdentifier, BindingConstraint), Instance>,
    }

    impl ResolutionContext for TableContext {
        fn get(&mut self, identifier: &ServiceIdentifier) -> DependencyResult<Instance> {
            self.plain
                .get(identifier)
                .cloned()
                .ok_or_else(|| DependencyError::binding_not_found(identifier))
        }

        fn get_constrained(
            &mut self,
            identifier: &ServiceIdentifier,
            constraint: &BindingConstraint,
        ) -> DependencyResult<Instance> {
            self.constrained
                .get(&(identifier.clone(), constraint.clone()))
                .cloned()
                .ok_or_else(|| DependencyError::binding_not_found(identifier))
        }

        fn can_resolve(&self, identifier: &ServiceIdentifier) -> bool {
            self.plain.contains_key(identifier)
        }

        fn consumer(&self) -> Option<&ContextKey> {
            None
        }

        fn depth(&self) -> usize {
            0
        }
    }

    #[derive(Default)]
    struct ReportService {
        logger: Option<Arc<String>>,
        formatter: Option<Arc<String>>,
    }

    impl Injectable for ReportService {
        fn set_property(&mut self, member: &str, value: Option<Instance>) -> DependencyResult<()> {
            match member {
                "logger" => self.logger = downcast_property(member, value)?,
                "formatter" => self.formatter = downcast_property(member, value)?,
                _ => {
                    return Err(DependencyError::UnknownMember {
                        type_name: "ReportService".to_string(),
                        member: member.to_string(),
                    })
                }
            }
            Ok(())
        }

        fn into_instance(self: Box<Self>) -> Instance {
            Arc::new(*self)
        }
    }

    fn text(value: &str) -> Instance {
        Arc::new(value.to_string())
    }

    #[test]
    fn test_precedence_factory_then_named_then_plain() {
        let reflector = Reflector::new();
        reflector
            .register_property::<ReportService>(
                InjectionDeclaration::new("logger", ServiceIdentifier::name("Logger"))
                    .named("audit")
                    .with_factory(|_ctx| Ok(text("factory"))),
            )
            .unwrap();
        reflector
            .register_property::<ReportService>(
                InjectionDeclaration::new("formatter", ServiceIdentifier::name("Formatter"))
                    .named("csv"),
            )
            .unwrap();

        let mut ctx = TableContext::default();
        ctx.plain.insert(ServiceIdentifier::name("Formatter"), text("json"));
        ctx.constrained.insert(
            (ServiceIdentifier::name("Formatter"), BindingConstraint::named("csv")),
            text("csv"),
        );

        let mut service = ReportService::default();
        PropertyInjector::new(reflector)
            .inject(&mut service, &mut ctx)
            .unwrap();

        assert_eq!(service.logger.as_deref().map(String::as_str), Some("factory"));
        assert_eq!(service.formatter.as_deref().map(String::as_str), Some("csv"));
    }

    #[test]
    fn test_optional_member_becomes_absent() {
        let reflector = Reflector::new();
        reflector
            .register_property::<ReportService>(
                InjectionDeclaration::new("logger", ServiceIdentifier::name("Logger")).optional(),
            )
            .unwrap();

        let mut service = ReportService {
            logger: Some(Arc::new("stale".to_string())),
            formatter: None,
        };
        PropertyInjector::new(reflector)
            .inject(&mut service, &mut TableContext::default())
            .unwrap();

        assert!(service.logger.is_none());
    }

    #[test]
    fn test_required_member_failure_names_member_and_type() {
        let reflector = Reflector::new();
        reflector
            .register_property::<ReportService>(InjectionDeclaration::new(
                "formatter",
                ServiceIdentifier::name("Formatter"),
            ))
            .unwrap();

        let err = PropertyInjector::new(reflector)
            .inject(&mut ReportService::default(), &mut TableContext::default())
            .unwrap_err();

        match err {
            DependencyError::InjectionFailure {
                member,
                type_name,
                identifier,
                source,
            } => {
                assert_eq!(member, "formatter");
                assert_eq!(type_name, "ReportService");
                assert_eq!(identifier, ServiceIdentifier::name("Formatter"));
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tag_constraint_lookup() {
        let reflector = Reflector::new();
        reflector
            .register_property::<ReportService>(
                InjectionDeclaration::new("formatter", ServiceIdentifier::name("Formatter"))
                    .tagged("format", "xml"),
            )
            .unwrap();

        let mut ctx = TableContext::default();
        ctx.constrained.insert(
            (
                ServiceIdentifier::name("Formatter"),
                BindingConstraint::tagged("format", "xml"),
            ),
            text("xml"),
        );

        let mut service = ReportService::default();
        PropertyInjector::new(reflector)
            .inject(&mut service, &mut ctx)
            .unwrap();
        assert_eq!(service.formatter.as_deref().map(String::as_str), Some("xml"));
    }
}
