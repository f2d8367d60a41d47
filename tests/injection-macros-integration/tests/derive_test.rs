//! 派生宏集成测试

use di_abstractions::{Binding, ContainerExt, Implementation, InjectionSchema, ServiceContainer};
use di_impl::{Container, TypeDescriptor};
use infrastructure_common::{
    DependencyError, Injectable, Lifetime, Materialized, ServiceIdentifier,
};
use injection_macros::Injectable;
use std::sync::Arc;

#[derive(Debug, PartialEq)]
struct Logger(&'static str);

#[derive(Debug, PartialEq)]
struct Formatter(&'static str);

#[derive(Debug, PartialEq)]
struct Clock(u64);

#[derive(Default, Injectable)]
struct ReportService {
    #[inject(id = "Logger")]
    logger: Option<Arc<Logger>>,
    #[inject(id = "Formatter", optional)]
    formatter: Option<Arc<Formatter>>,
    #[inject]
    clock: Option<Arc<Clock>>,
    title: String,
}

fn report_container() -> Container {
    let container = Container::new();
    container
        .reflector()
        .register_schema::<ReportService>()
        .unwrap();
    container.transient(
        "ReportService",
        Implementation::factory(|_ctx| {
            Ok(Materialized::composite(ReportService {
                title: "weekly".to_string(),
                ..Default::default()
            }))
        }),
    );
    container
}

#[test]
fn test_generated_declarations() {
    let declarations = ReportService::injection_declarations();
    let members: Vec<&str> = declarations.iter().map(|d| d.member.as_str()).collect();
    assert_eq!(members, vec!["logger", "formatter", "clock"]);

    assert_eq!(declarations[0].identifier, ServiceIdentifier::name("Logger"));
    assert!(!declarations[0].optional);
    assert!(declarations[1].optional);
    assert_eq!(declarations[2].identifier, ServiceIdentifier::of::<Clock>());
}

#[test]
fn test_derived_component_is_injected() {
    let container = report_container();
    container.singleton("Logger", Implementation::supplier(|| Logger("stdout")));
    container.constant(ServiceIdentifier::of::<Clock>(), Clock(42));

    let service = container
        .resolve::<ReportService>(&ServiceIdentifier::name("ReportService"))
        .unwrap();
    assert_eq!(service.logger.as_deref(), Some(&Logger("stdout")));
    assert_eq!(service.clock.as_deref(), Some(&Clock(42)));
    assert!(service.formatter.is_none());
    assert_eq!(service.title, "weekly");
}

#[test]
fn test_missing_required_member_names_member() {
    let container = report_container();
    container.constant(ServiceIdentifier::of::<Clock>(), Clock(1));

    match container.get(&ServiceIdentifier::name("ReportService"), None) {
        Err(DependencyError::InjectionFailure {
            member, type_name, ..
        }) => {
            assert_eq!(member, "logger");
            assert_eq!(type_name, "ReportService");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("resolution should fail"),
    }
}

#[test]
fn test_wrong_type_and_unknown_member() {
    let mut service = ReportService::default();

    let err = service
        .set_property("logger", Some(Arc::new(Formatter("csv"))))
        .unwrap_err();
    assert!(matches!(err, DependencyError::TypeMismatch { .. }));

    let err = service.set_property("title", None).unwrap_err();
    assert!(matches!(err, DependencyError::UnknownMember { ref member, .. } if member == "title"));
}

#[derive(Default, Injectable)]
struct Exporter {
    #[inject(id = "Formatter", named = "csv")]
    csv: Option<Arc<Formatter>>,
    #[inject(id = "Formatter", tag(key = "format", value = "xml"))]
    xml: Option<Arc<Formatter>>,
}

#[test]
fn test_named_and_tagged_members() {
    let container = Container::new();
    container.reflector().register_schema::<Exporter>().unwrap();
    container.add_binding(
        Binding::new(
            ServiceIdentifier::name("Formatter"),
            Implementation::constant(Formatter("csv")),
            Lifetime::Singleton,
        )
        .named("csv"),
    );
    container.add_binding(
        Binding::new(
            ServiceIdentifier::name("Formatter"),
            Implementation::constant(Formatter("xml")),
            Lifetime::Singleton,
        )
        .tagged("format", "xml"),
    );
    container.transient(
        "Exporter",
        Implementation::factory(|_ctx| Ok(Materialized::composite(Exporter::default()))),
    );

    let exporter = container
        .resolve::<Exporter>(&ServiceIdentifier::name("Exporter"))
        .unwrap();
    assert_eq!(exporter.csv.as_deref(), Some(&Formatter("csv")));
    assert_eq!(exporter.xml.as_deref(), Some(&Formatter("xml")));
}

/// 基类声明 logger
#[derive(Default, Injectable)]
struct BaseJob {
    #[inject(id = "Logger")]
    logger: Option<Arc<Logger>>,
}

/// 派生类以自己的声明覆盖 logger，并追加 clock
#[derive(Default, Injectable)]
struct AuditJob {
    #[inject(id = "AuditLogger")]
    logger: Option<Arc<Logger>>,
    #[inject(optional)]
    clock: Option<Arc<Clock>>,
}

#[test]
fn test_derived_declaration_overrides_inherited_member() {
    let container = Container::new();
    let reflector = container.reflector();
    reflector.register_type::<BaseJob>(TypeDescriptor::new().field("logger"));
    reflector.register_type::<AuditJob>(
        TypeDescriptor::new()
            .extends::<BaseJob>()
            .field("logger")
            .field("clock"),
    );
    reflector.register_schema::<BaseJob>().unwrap();
    reflector.register_schema::<AuditJob>().unwrap();

    let merged = reflector
        .get_injection_declarations(std::any::TypeId::of::<AuditJob>())
        .unwrap();
    assert_eq!(merged.len(), 2);

    container.constant("Logger", Logger("base"));
    container.constant("AuditLogger", Logger("audit"));
    container.transient(
        "AuditJob",
        Implementation::factory(|_ctx| Ok(Materialized::composite(AuditJob::default()))),
    );

    let job = container
        .resolve::<AuditJob>(&ServiceIdentifier::name("AuditJob"))
        .unwrap();
    assert_eq!(job.logger.as_deref(), Some(&Logger("audit")));
    assert!(job.clock.is_none());

    let base = container.get(&ServiceIdentifier::name("Logger"), None).unwrap();
    assert!(base.downcast_ref::<Logger>().is_some());
}
