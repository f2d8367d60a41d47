//! 服务提供者注册表
//!
//! 生命周期：CREATED → REGISTERED → BOOTING → BOOTED → TERMINATING → TERMINATED，
//! 启动失败进入 ERROR（终态）。延迟服务提供者在其声明的标识第一次被请求时
//! 才注册，若注册表已启动则同时启动。

use crate::settings::ProviderSettings;
use di_abstractions::{DeferredLoader, ProviderConfig, ServiceContainer, ServiceProvider};
use di_impl::Container;
use futures::future::join_all;
use infrastructure_common::{
    downcast_instance, DependencyError, DependencyResult, Instance, LifecycleState,
    ProviderError, ProviderResult, ServiceIdentifier,
};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// 已进入活动集合的服务提供者
struct ActiveEntry {
    provider: Arc<dyn ServiceProvider>,
    config: ProviderConfig,
    sequence: usize,
    registered: bool,
    booted: bool,
}

/// 尚未加载的延迟服务提供者
struct DeferredEntry {
    provider: Arc<dyn ServiceProvider>,
    config: ProviderConfig,
    sequence: usize,
    provides: Vec<ServiceIdentifier>,
}

/// 终止结果
///
/// 终止是尽力而为的：单个服务提供者失败不会阻止其它服务提供者终止。
#[derive(Debug, Default)]
pub struct TerminationReport {
    /// 成功终止的服务提供者
    pub terminated: Vec<String>,
    /// 终止失败（均为 [`ProviderError::ProviderTermination`]）
    pub failures: Vec<ProviderError>,
}

impl TerminationReport {
    /// 是否全部成功终止
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct RegistryInner {
    container: Container,
    overrides: HashMap<String, ProviderSettings>,
    state: RwLock<LifecycleState>,
    names: Mutex<HashSet<String>>,
    active: RwLock<Vec<ActiveEntry>>,
    deferred: Mutex<Vec<DeferredEntry>>,
    sequence: AtomicUsize,
}

/// 服务提供者注册表
///
/// 可克隆；克隆共享同一份状态。创建时把自身作为延迟加载器挂到容器上，
/// 容器同步解析找不到绑定时会回调注册表提升延迟服务提供者。
#[derive(Clone)]
pub struct ServiceProviderRegistry {
    inner: Arc<RegistryInner>,
}

impl ServiceProviderRegistry {
    /// 创建注册表并挂接到容器
    pub fn new(container: Container) -> Self {
        Self::with_overrides(container, HashMap::new())
    }

    /// 使用按名称的配置覆盖创建注册表
    pub fn with_overrides(
        container: Container,
        overrides: HashMap<String, ProviderSettings>,
    ) -> Self {
        let inner = Arc::new(RegistryInner {
            container,
            overrides,
            state: RwLock::new(LifecycleState::Created),
            names: Mutex::new(HashSet::new()),
            active: RwLock::new(Vec::new()),
            deferred: Mutex::new(Vec::new()),
            sequence: AtomicUsize::new(0),
        });
        let loader: Weak<RegistryInner> = Arc::downgrade(&inner);
        let loader: Weak<dyn DeferredLoader> = loader;
        inner.container.set_deferred_loader(loader);
        Self { inner }
    }

    /// 注册表使用的容器
    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    /// 当前生命周期状态
    pub fn state(&self) -> LifecycleState {
        *self.inner.state.read()
    }

    /// 活动服务提供者名称（按注册顺序）
    pub fn active_providers(&self) -> Vec<String> {
        let mut active: Vec<(usize, String)> = self
            .inner
            .active
            .read()
            .iter()
            .map(|entry| (entry.sequence, entry.provider.name().to_string()))
            .collect();
        active.sort_by_key(|(sequence, _)| *sequence);
        active.into_iter().map(|(_, name)| name).collect()
    }

    /// 尚未加载的延迟服务提供者名称
    pub fn deferred_providers(&self) -> Vec<String> {
        self.inner
            .deferred
            .lock()
            .iter()
            .map(|entry| entry.provider.name().to_string())
            .collect()
    }

    /// 是否有尚未加载的延迟服务提供者声明了该标识
    pub fn provides(&self, identifier: &ServiceIdentifier) -> bool {
        self.inner.can_provide(identifier)
    }

    /// 注册服务提供者
    ///
    /// 延迟服务提供者只登记不注册；普通服务提供者立即注册，`config.deferred`
    /// 为真时推迟到 [`boot`](Self::boot)。注册表已启动时新注册的服务提供者
    /// 立即启动。
    pub async fn register(
        &self,
        provider: Arc<dyn ServiceProvider>,
        config: ProviderConfig,
    ) -> ProviderResult<()> {
        let state = self.state();
        if !state.accepts_registration() {
            return Err(ProviderError::InvalidState {
                operation: "register",
                state,
            });
        }

        let name = provider.name().trim().to_string();
        if name.is_empty() {
            return Err(ProviderError::invalid("<unnamed>", "名称为空"));
        }

        let config = match self.inner.override_for(&name) {
            Some(settings) if !settings.enabled => {
                info!(provider = %name, "服务提供者已在配置中禁用，跳过");
                return Ok(());
            }
            Some(settings) => settings.apply(config),
            None => config,
        };

        let provides = match provider.as_deferred() {
            Some(deferred) => {
                let provides = deferred.provides();
                if provides.is_empty() {
                    return Err(ProviderError::invalid(&name, "延迟服务提供者未声明 provides"));
                }
                if deferred.is_loaded() {
                    return Err(ProviderError::invalid(&name, "延迟服务提供者已处于加载状态"));
                }
                Some(provides)
            }
            None => None,
        };

        if !self.inner.names.lock().insert(name.clone()) {
            return Err(ProviderError::invalid(&name, "名称重复"));
        }
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);

        if let Some(provides) = provides {
            info!(provider = %name, provides = ?provides, "登记延迟服务提供者");
            self.inner.deferred.lock().push(DeferredEntry {
                provider,
                config,
                sequence,
                provides,
            });
            self.inner.mark_registered();
            return Ok(());
        }

        let boot_now = state == LifecycleState::Booted;
        let register_now = boot_now || !config.deferred;
        if register_now {
            if let Err(source) = provider.register(&self.inner.container).await {
                self.inner.names.lock().remove(&name);
                return Err(ProviderError::Registration { name, source });
            }
        }

        let mut entry = ActiveEntry {
            provider: provider.clone(),
            config,
            sequence,
            registered: register_now,
            booted: false,
        };

        if boot_now {
            if let Err(source) = provider.boot(&self.inner.container).await {
                error!(provider = %name, error = %source, "服务提供者启动失败");
                self.inner.active.write().push(entry);
                self.inner.transition(LifecycleState::Error);
                return Err(ProviderError::ProviderBoot { name, source });
            }
            entry.booted = true;
        }

        self.inner.active.write().push(entry);
        self.inner.mark_registered();
        info!(
            provider = %name,
            priority = config.priority,
            registered = register_now,
            booted = boot_now,
            "服务提供者已注册"
        );
        Ok(())
    }

    /// 依次注册，汇总全部失败
    pub async fn register_all<I>(&self, providers: I) -> Result<(), Vec<ProviderError>>
    where
        I: IntoIterator<Item = (Arc<dyn ServiceProvider>, ProviderConfig)>,
    {
        let mut errors = Vec::new();
        for (provider, config) in providers {
            if let Err(err) = self.register(provider, config).await {
                warn!(error = %err, "服务提供者注册失败");
                errors.push(err);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 启动全部活动服务提供者
    ///
    /// 按优先级降序（同优先级保持注册顺序）逐个启动；第一个失败使注册表进入
    /// ERROR 并立即返回，其余服务提供者不再启动。
    pub async fn boot(&self) -> ProviderResult<()> {
        match self.state() {
            LifecycleState::Booted => {
                debug!("注册表已启动，忽略重复启动");
                return Ok(());
            }
            LifecycleState::Created | LifecycleState::Registered => {}
            state => {
                return Err(ProviderError::InvalidState {
                    operation: "boot",
                    state,
                })
            }
        }

        self.inner.transition(LifecycleState::Booting);

        let mut order: Vec<(Arc<dyn ServiceProvider>, i32, usize, bool, bool)> = self
            .inner
            .active
            .read()
            .iter()
            .map(|entry| {
                (
                    entry.provider.clone(),
                    entry.config.priority,
                    entry.sequence,
                    entry.registered,
                    entry.booted,
                )
            })
            .collect();
        order.sort_by_key(|(_, priority, sequence, _, _)| (Reverse(*priority), *sequence));

        for (provider, priority, sequence, registered, booted) in order {
            let name = provider.name().to_string();
            if !registered {
                if let Err(source) = provider.register(&self.inner.container).await {
                    error!(provider = %name, error = %source, "推迟的注册失败");
                    self.inner.transition(LifecycleState::Error);
                    return Err(ProviderError::Registration { name, source });
                }
                self.inner.update(sequence, |entry| entry.registered = true);
            }
            if booted {
                continue;
            }

            debug!(provider = %name, priority, "启动服务提供者");
            if let Err(source) = provider.boot(&self.inner.container).await {
                error!(provider = %name, error = %source, "服务提供者启动失败");
                self.inner.transition(LifecycleState::Error);
                return Err(ProviderError::ProviderBoot { name, source });
            }
            self.inner.update(sequence, |entry| entry.booted = true);
        }

        self.inner.transition(LifecycleState::Booted);
        info!(providers = self.inner.active.read().len(), "服务提供者注册表已启动");
        Ok(())
    }

    /// 并发终止全部活动的可终止服务提供者
    ///
    /// 失败被记录并收集到报告中，不会中断其它服务提供者。处于 ERROR 的注册表
    /// 同样执行清理，但保持 ERROR 状态。
    pub async fn terminate(&self) -> ProviderResult<TerminationReport> {
        let state = self.state();
        if matches!(
            state,
            LifecycleState::Booting | LifecycleState::Terminating | LifecycleState::Terminated
        ) {
            return Err(ProviderError::InvalidState {
                operation: "terminate",
                state,
            });
        }
        let failed = state == LifecycleState::Error;
        if !failed {
            self.inner.transition(LifecycleState::Terminating);
        }

        let providers: Vec<Arc<dyn ServiceProvider>> = self
            .inner
            .active
            .read()
            .iter()
            .filter(|entry| entry.registered)
            .map(|entry| entry.provider.clone())
            .collect();

        let outcomes = join_all(providers.into_iter().map(|provider| async move {
            let name = provider.name().to_string();
            let outcome = match provider.as_terminable() {
                Some(terminable) => Some(terminable.terminate().await),
                None => None,
            };
            (name, outcome)
        }))
        .await;

        let mut report = TerminationReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Some(Ok(())) => report.terminated.push(name),
                Some(Err(source)) => {
                    warn!(provider = %name, error = %source, "服务提供者终止失败");
                    report
                        .failures
                        .push(ProviderError::ProviderTermination { name, source });
                }
                None => {}
            }
        }

        if !failed {
            self.inner.transition(LifecycleState::Terminated);
        }
        info!(
            terminated = report.terminated.len(),
            failures = report.failures.len(),
            "服务提供者注册表已终止"
        );
        Ok(report)
    }

    /// 解析标识；必要时先提升声明了该标识的延迟服务提供者
    pub async fn resolve(&self, identifier: &ServiceIdentifier) -> DependencyResult<Instance> {
        if let Some(entry) = self.inner.claim(identifier) {
            self.inner.promote(entry).await?;
        }
        self.inner.container.get(identifier, None)
    }

    /// 解析并转换为具体类型
    pub async fn resolve_as<T: Any + Send + Sync>(
        &self,
        identifier: &ServiceIdentifier,
    ) -> DependencyResult<Arc<T>> {
        let instance = self.resolve(identifier).await?;
        downcast_instance(identifier, instance)
    }
}

impl fmt::Debug for ServiceProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProviderRegistry")
            .field("state", &self.state())
            .field("active", &self.active_providers())
            .field("deferred", &self.deferred_providers())
            .finish()
    }
}

impl RegistryInner {
    fn override_for(&self, name: &str) -> Option<&ProviderSettings> {
        self.overrides
            .get(name)
            .or_else(|| self.overrides.get(&name.to_lowercase()))
    }

    fn transition(&self, next: LifecycleState) {
        let mut state = self.state.write();
        let current = *state;
        if current.can_transition_to(next) {
            info!(from = %current, to = %next, "注册表状态迁移");
            *state = next;
        } else {
            debug!(from = %current, to = %next, "忽略无效的状态迁移");
        }
    }

    fn mark_registered(&self) {
        if *self.state.read() == LifecycleState::Created {
            self.transition(LifecycleState::Registered);
        }
    }

    fn update(&self, sequence: usize, apply: impl FnOnce(&mut ActiveEntry)) {
        if let Some(entry) = self
            .active
            .write()
            .iter_mut()
            .find(|entry| entry.sequence == sequence)
        {
            apply(entry);
        }
    }

    /// 取出声明了该标识的延迟服务提供者；取出即占用，保证至多提升一次
    fn claim(&self, identifier: &ServiceIdentifier) -> Option<DeferredEntry> {
        let mut deferred = self.deferred.lock();
        let index = deferred
            .iter()
            .position(|entry| entry.provides.contains(identifier))?;
        Some(deferred.remove(index))
    }

    /// 归还提升失败的延迟服务提供者，按原登记顺序放回，等待下次请求重试
    fn restore(&self, entry: DeferredEntry) {
        let mut deferred = self.deferred.lock();
        let index = deferred
            .iter()
            .position(|other| other.sequence > entry.sequence)
            .unwrap_or(deferred.len());
        deferred.insert(index, entry);
    }

    async fn promote(&self, entry: DeferredEntry) -> DependencyResult<()> {
        match self.load(&entry).await {
            Ok(booted) => {
                if let Some(deferred) = entry.provider.as_deferred() {
                    deferred.mark_loaded();
                }
                debug!(provider = %entry.provider.name(), booted, "延迟服务提供者已加载");
                self.active.write().push(ActiveEntry {
                    provider: entry.provider,
                    config: entry.config,
                    sequence: entry.sequence,
                    registered: true,
                    booted,
                });
                Ok(())
            }
            Err(err) => {
                self.restore(entry);
                Err(err)
            }
        }
    }

    /// 注册（必要时启动）延迟服务提供者，返回是否已启动
    async fn load(&self, entry: &DeferredEntry) -> DependencyResult<bool> {
        let name = entry.provider.name().to_string();
        let state = *self.state.read();
        if !state.accepts_registration() && state != LifecycleState::Booting {
            return Err(DependencyError::DeferredProviderFailed {
                provider: name,
                message: format!("注册表处于 {} 状态", state),
            });
        }

        info!(provider = %name, "提升延迟服务提供者");
        if let Err(err) = entry.provider.register(&self.container).await {
            return Err(deferred_failure(name, err));
        }

        let boot_now = matches!(state, LifecycleState::Booting | LifecycleState::Booted);
        if boot_now {
            if let Err(err) = entry.provider.boot(&self.container).await {
                return Err(deferred_failure(name, err));
            }
        }
        Ok(boot_now)
    }
}

fn deferred_failure(provider: String, err: anyhow::Error) -> DependencyError {
    error!(provider = %provider, error = %err, "延迟服务提供者加载失败");
    DependencyError::DeferredProviderFailed {
        provider,
        message: format!("{err:#}"),
    }
}

impl DeferredLoader for RegistryInner {
    fn can_provide(&self, identifier: &ServiceIdentifier) -> bool {
        self.deferred
            .lock()
            .iter()
            .any(|entry| entry.provides.contains(identifier))
    }

    fn load_for(&self, identifier: &ServiceIdentifier) -> DependencyResult<bool> {
        let Some(entry) = self.claim(identifier) else {
            return Ok(false);
        };
        futures::executor::block_on(self.promote(entry))?;
        Ok(true)
    }
}
