//! 容器与服务提供者注册表的端到端场景

use async_trait::async_trait;
use di_abstractions::{
    ContainerExt, DeferredProvider, Implementation, InjectionDeclaration, LoadState,
    ProviderConfig, ServiceContainer, ServiceProvider, TerminableProvider,
};
use di_impl::Container;
use infrastructure_common::{
    downcast_property, ContextKey, DependencyError, DependencyResult, Injectable, Instance,
    LifecycleState, Materialized, MetadataStore, ServiceIdentifier,
};
use infrastructure_composition::{
    ApplicationBuilder, ApplicationStatus, CompositionSettings, InfrastructureError,
};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

trait Formatter: Send + Sync {
    fn format(&self, rows: &[&str]) -> String;
}

struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, rows: &[&str]) -> String {
        format!("[{}]", rows.iter().map(|r| format!("\"{r}\"")).collect::<Vec<_>>().join(","))
    }
}

struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, rows: &[&str]) -> String {
        rows.join(",")
    }
}

type SharedFormatter = Box<dyn Formatter>;

#[test]
fn test_logger_singleton_identity() {
    let container = Container::new();
    container.singleton("Logger", Implementation::supplier(|| String::from("stdout")));

    let logger = ServiceIdentifier::name("Logger");
    let first = assert_ok!(container.get(&logger, None));
    let second = assert_ok!(container.get(&logger, None));
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_transient_instances_are_distinct_but_equal() {
    let container = Container::new();
    container.transient("Clock", Implementation::supplier(|| vec![1_u8, 2, 3]));

    let clock = ServiceIdentifier::name("Clock");
    let first = assert_ok!(container.resolve::<Vec<u8>>(&clock));
    let second = assert_ok!(container.resolve::<Vec<u8>>(&clock));
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first, second);
}

#[derive(Default)]
struct ReportService {
    formatter: Option<Arc<SharedFormatter>>,
}

impl ReportService {
    fn render(&self, rows: &[&str]) -> Option<String> {
        self.formatter.as_ref().map(|f| f.format(rows))
    }
}

impl Injectable for ReportService {
    fn set_property(&mut self, member: &str, value: Option<Instance>) -> DependencyResult<()> {
        match member {
            "formatter" => {
                self.formatter = downcast_property(member, value)?;
                Ok(())
            }
            _ => Err(DependencyError::UnknownMember {
                type_name: "ReportService".to_string(),
                member: member.to_string(),
            }),
        }
    }

    fn into_instance(self: Box<Self>) -> Instance {
        Arc::new(*self)
    }
}

#[test]
fn test_report_service_formatter_contextual_binding() {
    let container = Container::new();
    container.singleton(
        "Formatter",
        Implementation::supplier(|| -> SharedFormatter { Box::new(JsonFormatter) }),
    );
    assert_ok!(container
        .when("ReportService")
        .needs("Formatter")
        .give_value::<SharedFormatter>(Box::new(CsvFormatter)));

    let formatter = ServiceIdentifier::name("Formatter");
    let default = assert_ok!(container.resolve::<SharedFormatter>(&formatter));
    assert_eq!(default.format(&["a", "b"]), "[\"a\",\"b\"]");

    let contextual = assert_ok!(container.get(&formatter, Some(&ContextKey::new("ReportService"))));
    let contextual = contextual.downcast::<SharedFormatter>().ok().unwrap();
    assert_eq!(contextual.format(&["a", "b"]), "a,b");

    // 其它消费者仍得到默认绑定
    let other = assert_ok!(container.get(&formatter, Some(&ContextKey::new("InvoiceService"))));
    assert!(Arc::ptr_eq(&other, &(default.clone() as Instance)));

    // 通过属性注入时，消费者由解析调用栈推导
    assert_ok!(container
        .reflector()
        .register_property::<ReportService>(InjectionDeclaration::new("formatter", formatter.clone())));
    container.transient(
        "ReportService",
        Implementation::factory(|_ctx| Ok(Materialized::composite(ReportService::default()))),
    );
    let report = assert_ok!(container.resolve::<ReportService>(&ServiceIdentifier::name("ReportService")));
    assert_eq!(report.render(&["x", "y"]).as_deref(), Some("x,y"));
}

#[test]
fn test_entity_and_member_metadata_are_independent() {
    let store = MetadataStore::new();
    let entity = store.entity("ReportService");

    store.set("role", "entity".into(), &entity, None);
    store.set("role", "member".into(), &entity, Some("formatter"));

    assert_eq!(store.get("role", &entity, None).unwrap().as_text(), Some("entity"));
    assert_eq!(
        store.get("role", &entity, Some("formatter")).unwrap().as_text(),
        Some("member")
    );
    assert!(store.get("role", &entity, Some("logger")).is_none());

    assert!(store.delete("role", &entity, Some("formatter")));
    assert!(store.has("role", &entity, None));

    // 仍有克隆存活时元数据保留
    let probe = entity.clone();
    drop(entity);
    assert!(store.has("role", &probe, None));
}

#[test]
fn test_request_scope_shares_within_boundary() {
    let container = Container::new();
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    container.factory("Session", infrastructure_common::Lifetime::Request, move |_ctx| {
        Ok(Materialized::value(counter.fetch_add(1, Ordering::SeqCst)))
    });
    let session = ServiceIdentifier::name("Session");

    {
        let _request = container.begin_request("GET /reports");
        let a = assert_ok!(container.get(&session, None));
        let b = assert_ok!(container.get(&session, None));
        assert!(Arc::ptr_eq(&a, &b));

        // 子容器在同一边界内共享实例
        let child = container.create_child();
        let c = assert_ok!(child.get(&session, None));
        assert!(Arc::ptr_eq(&a, &c));
    }

    {
        let _request = container.begin_request("GET /invoices");
        assert_ok!(container.get(&session, None));
    }
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cycle_is_reported_with_chain() {
    let container = Container::new();
    container.factory("A", infrastructure_common::Lifetime::Transient, |ctx| {
        ctx.get(&ServiceIdentifier::name("B"))?;
        Ok(Materialized::value(()))
    });
    container.factory("B", infrastructure_common::Lifetime::Transient, |ctx| {
        ctx.get(&ServiceIdentifier::name("A"))?;
        Ok(Materialized::value(()))
    });

    match assert_err!(container.get(&ServiceIdentifier::name("A"), None)) {
        DependencyError::CyclicDependency { chain } => assert_eq!(chain, "A -> B -> A"),
        other => panic!("unexpected error: {other}"),
    }
}

/// 延迟邮件服务提供者
struct MailProvider {
    loaded: LoadState,
    registers: AtomicUsize,
    boots: AtomicUsize,
}

impl MailProvider {
    fn new() -> Self {
        Self {
            loaded: LoadState::new(),
            registers: AtomicUsize::new(0),
            boots: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ServiceProvider for MailProvider {
    fn name(&self) -> &str {
        "MailProvider"
    }

    async fn register(&self, container: &dyn ServiceContainer) -> anyhow::Result<()> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        container.singleton("Mailer", Implementation::supplier(|| String::from("smtp://mail")));
        Ok(())
    }

    async fn boot(&self, _container: &dyn ServiceContainer) -> anyhow::Result<()> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_deferred(&self) -> Option<&dyn DeferredProvider> {
        Some(self)
    }
}

impl DeferredProvider for MailProvider {
    fn provides(&self) -> Vec<ServiceIdentifier> {
        vec![ServiceIdentifier::name("Mailer")]
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_loaded()
    }

    fn mark_loaded(&self) {
        self.loaded.mark_loaded();
    }
}

#[tokio::test]
async fn test_mailer_deferred_provider() {
    let mail = Arc::new(MailProvider::new());
    let app = assert_ok!(
        ApplicationBuilder::new()
            .add_shared_provider(mail.clone(), ProviderConfig::default())
            .build()
            .await
    );

    let mailer = ServiceIdentifier::name("Mailer");
    assert!(!mail.is_loaded());
    assert!(!app.registry().active_providers().contains(&"MailProvider".to_string()));
    assert!(app.is_bound(&mailer));

    let first = assert_ok!(app.resolve::<String>(&mailer));
    assert!(mail.is_loaded());
    assert!(app.registry().active_providers().contains(&"MailProvider".to_string()));

    assert_ok!(app.start().await);
    let second = assert_ok!(app.resolve_async::<String>(&mailer).await);
    let third = assert_ok!(app.resolve::<String>(&mailer));
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&second, &third));

    assert_eq!(mail.registers.load(Ordering::SeqCst), 1);
    assert_eq!(mail.boots.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mailer_promoted_after_boot_is_booted_once() {
    let mail = Arc::new(MailProvider::new());
    let app = assert_ok!(
        ApplicationBuilder::new()
            .add_shared_provider(mail.clone(), ProviderConfig::default())
            .build()
            .await
    );
    assert_ok!(app.start().await);
    assert_eq!(mail.boots.load(Ordering::SeqCst), 0);

    let mailer = ServiceIdentifier::name("Mailer");
    for _ in 0..3 {
        assert_ok!(app.resolve_async::<String>(&mailer).await);
    }
    assert_eq!(mail.registers.load(Ordering::SeqCst), 1);
    assert_eq!(mail.boots.load(Ordering::SeqCst), 1);
}

/// 记录启动顺序的服务提供者
struct OrderedProvider {
    name: String,
    fail: bool,
    booted: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ServiceProvider for OrderedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register(&self, _container: &dyn ServiceContainer) -> anyhow::Result<()> {
        Ok(())
    }

    async fn boot(&self, _container: &dyn ServiceContainer) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("{} 无法连接", self.name);
        }
        if let Ok(mut booted) = self.booted.lock() {
            booted.push(self.name.clone());
        }
        Ok(())
    }
}

fn ordered(name: &str, fail: bool, booted: &Arc<Mutex<Vec<String>>>) -> OrderedProvider {
    OrderedProvider {
        name: name.to_string(),
        fail,
        booted: booted.clone(),
    }
}

#[tokio::test]
async fn test_priority_ten_failure_stops_boot() {
    let booted = Arc::new(Mutex::new(Vec::new()));
    let app = assert_ok!(
        ApplicationBuilder::new()
            .add_provider(ordered("five", false, &booted), ProviderConfig::with_priority(5))
            .add_provider(ordered("ten", true, &booted), ProviderConfig::with_priority(10))
            .build()
            .await
    );

    let err = assert_err!(app.start().await);
    assert!(matches!(err, InfrastructureError::ProviderError { .. }));
    assert_eq!(app.lifecycle(), LifecycleState::Error);
    assert_eq!(app.status(), ApplicationStatus::Failed);
    assert!(booted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_settings_override_priority() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("composition.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(
        br#"
[providers.cache]
priority = 50

[providers.audit]
enabled = false
"#,
    )
    .unwrap();

    let booted = Arc::new(Mutex::new(Vec::new()));
    let app = assert_ok!(
        assert_ok!(ApplicationBuilder::new().load_settings(&path))
            .add_provider(ordered("db", false, &booted), ProviderConfig::with_priority(10))
            .add_provider(ordered("cache", false, &booted), ProviderConfig::with_priority(1))
            .add_provider(ordered("audit", false, &booted), ProviderConfig::with_priority(99))
            .build()
            .await
    );
    assert_ok!(app.start().await);

    assert_eq!(*booted.lock().unwrap(), vec!["cache", "db"]);
    assert_eq!(app.registry().active_providers(), vec!["db", "cache"]);
}

#[tokio::test]
async fn test_settings_container_section_applies() {
    let settings = CompositionSettings {
        container: di_abstractions::ContainerConfig {
            enable_property_injection: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let app = assert_ok!(ApplicationBuilder::new().with_settings(settings).build().await);
    assert!(!app.container().config().enable_property_injection);
}

/// 终止时可能失败的服务提供者
struct PoolProvider {
    name: &'static str,
    fail: bool,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl ServiceProvider for PoolProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn register(&self, _container: &dyn ServiceContainer) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_terminable(&self) -> Option<&dyn TerminableProvider> {
        Some(self)
    }
}

#[async_trait]
impl TerminableProvider for PoolProvider {
    async fn terminate(&self) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        if self.fail {
            anyhow::bail!("{} 关闭超时", self.name);
        }
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_concurrent_terminate_is_best_effort() {
    let closed = Arc::new(AtomicUsize::new(0));
    let mut builder = ApplicationBuilder::new();
    for (name, fail) in [("mysql", false), ("redis", true), ("kafka", false)] {
        builder = builder.add_provider(
            PoolProvider {
                name,
                fail,
                closed: closed.clone(),
            },
            ProviderConfig::default(),
        );
    }
    let app = assert_ok!(builder.build().await);
    assert_ok!(app.start().await);

    let report = assert_ok!(app.stop().await);
    assert_eq!(closed.load(Ordering::SeqCst), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].provider_name(), Some("redis"));
    assert_eq!(app.lifecycle(), LifecycleState::Terminated);
    assert_eq!(app.status(), ApplicationStatus::Stopped);

    let metrics = app.metrics();
    assert!(metrics.start_time.is_some());
    assert!(metrics.stop_time.is_some());
    assert_eq!(metrics.active_providers, 3);
}

/// 终止时等待其它服务提供者同时到达的服务提供者
struct RendezvousProvider {
    name: &'static str,
    barrier: Arc<tokio::sync::Barrier>,
}

#[async_trait]
impl ServiceProvider for RendezvousProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn register(&self, _container: &dyn ServiceContainer) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_terminable(&self) -> Option<&dyn TerminableProvider> {
        Some(self)
    }
}

#[async_trait]
impl TerminableProvider for RendezvousProvider {
    async fn terminate(&self) -> anyhow::Result<()> {
        self.barrier.wait().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_terminate_runs_providers_concurrently() {
    // 两个服务提供者互相等待；逐个终止会永远卡在第一个
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let mut builder = ApplicationBuilder::new();
    for name in ["mysql", "redis"] {
        builder = builder.add_provider(
            RendezvousProvider {
                name,
                barrier: barrier.clone(),
            },
            ProviderConfig::default(),
        );
    }
    let app = assert_ok!(builder.build().await);
    assert_ok!(app.start().await);

    let stopped = tokio::time::timeout(std::time::Duration::from_secs(5), app.stop()).await;
    let report = assert_ok!(assert_ok!(stopped));
    assert!(report.is_clean());
    assert_eq!(report.terminated.len(), 2);
    assert_eq!(app.lifecycle(), LifecycleState::Terminated);
}
