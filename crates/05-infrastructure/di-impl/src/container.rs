//! 依赖注入容器
//!
//! 解析顺序：上下文覆盖 → 绑定查找（必要时提升延迟服务提供者）
//! → 按生命周期物化 → 对复合实例执行属性注入。

use crate::contextual::{ContextualBindingManager, WhenBuilder};
use crate::injector::PropertyInjector;
use crate::reflector::Reflector;
use di_abstractions::{
    Binding, BindingConstraint, ConstructorArgs, ConstructorBinding, ContainerConfig,
    ContainerStats, ContextualBindingSpec, DeferredLoader, Implementation, ResolutionContext,
    ServiceContainer,
};
use infrastructure_common::{
    downcast_instance, ContextKey, DependencyError, DependencyResult, Instance, Lifetime,
    Materialized, RequestBoundary, ServiceIdentifier,
};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BindingKey {
    identifier: ServiceIdentifier,
    constraint: BindingConstraint,
}

impl BindingKey {
    fn new(identifier: &ServiceIdentifier, constraint: &BindingConstraint) -> Self {
        Self {
            identifier: identifier.clone(),
            constraint: constraint.clone(),
        }
    }
}

/// 解析调用栈中的一帧
#[derive(Debug, Clone)]
struct Frame {
    key: BindingKey,
    /// 该帧作为消费者时的上下文键
    context_key: ContextKey,
}

struct RequestFrame {
    boundary: RequestBoundary,
    /// (绑定所属容器, 绑定键) -> 实例
    instances: HashMap<(Uuid, BindingKey), Instance>,
}

#[derive(Default)]
struct Counters {
    resolutions: AtomicU64,
    resolution_errors: AtomicU64,
}

struct ContainerInner {
    id: Uuid,
    config: ContainerConfig,
    parent: Option<Container>,
    bindings: RwLock<HashMap<BindingKey, Binding>>,
    singletons: RwLock<HashMap<BindingKey, Instance>>,
    requests: Mutex<Vec<RequestFrame>>,
    contextual: ContextualBindingManager,
    reflector: Reflector,
    injector: PropertyInjector,
    deferred_loader: RwLock<Option<Weak<dyn DeferredLoader>>>,
    counters: Counters,
}

/// 依赖注入容器
///
/// 可克隆；克隆共享同一份绑定与缓存。子容器查找失败时回退到父容器。
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// 创建新的容器
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// 使用指定配置创建容器
    pub fn with_config(config: ContainerConfig) -> Self {
        Self::build(config, Reflector::new(), None)
    }

    /// 使用共享的反射器创建容器
    pub fn with_reflector(config: ContainerConfig, reflector: Reflector) -> Self {
        Self::build(config, reflector, None)
    }

    fn build(config: ContainerConfig, reflector: Reflector, parent: Option<Container>) -> Self {
        let id = Uuid::new_v4();
        debug!(container = %id, parent = ?parent.as_ref().map(Container::id), "创建容器");
        Self {
            inner: Arc::new(ContainerInner {
                id,
                config,
                parent,
                bindings: RwLock::new(HashMap::new()),
                singletons: RwLock::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                contextual: ContextualBindingManager::new(),
                injector: PropertyInjector::new(reflector.clone()),
                reflector,
                deferred_loader: RwLock::new(None),
                counters: Counters::default(),
            }),
        }
    }

    /// 容器 ID
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 共享反射器
    pub fn reflector(&self) -> &Reflector {
        &self.inner.reflector
    }

    /// 上下文绑定管理器
    pub fn contextual(&self) -> &ContextualBindingManager {
        &self.inner.contextual
    }

    /// 父容器
    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    /// 创建子容器
    ///
    /// 子容器共享反射器，拥有独立的绑定、单例与上下文绑定。
    pub fn create_child(&self) -> Container {
        Self::build(
            self.inner.config.clone(),
            self.inner.reflector.clone(),
            Some(self.clone()),
        )
    }

    /// 安装延迟服务提供者加载器
    pub fn set_deferred_loader(&self, loader: Weak<dyn DeferredLoader>) {
        *self.inner.deferred_loader.write() = Some(loader);
    }

    /// 上下文绑定构建器
    pub fn when(&self, context: impl Into<ContextKey>) -> WhenBuilder<'_> {
        self.inner.contextual.when(context)
    }

    /// 绑定可构造类型
    ///
    /// 构造依赖登记到反射器，物化时按顺序解析后传给构造函数。
    pub fn bind_constructor<T, F>(
        &self,
        identifier: impl Into<ServiceIdentifier>,
        dependencies: Vec<ServiceIdentifier>,
        scope: Lifetime,
        construct: F,
    ) where
        T: Any + Send + Sync,
        F: Fn(ConstructorArgs) -> DependencyResult<Materialized> + Send + Sync + 'static,
    {
        self.inner.reflector.register_injectable::<T>(dependencies);
        self.add_binding(Binding::new(
            identifier.into(),
            Implementation::Constructor(ConstructorBinding::of::<T, _>(construct)),
            scope,
        ));
    }

    /// 解析并转换为具体类型
    pub fn resolve<T: Any + Send + Sync>(
        &self,
        identifier: &ServiceIdentifier,
    ) -> DependencyResult<Arc<T>> {
        let instance = self.get(identifier, None)?;
        downcast_instance(identifier, instance)
    }

    /// 解析；标识本身无法解析时返回 `None`，其他错误照常返回
    pub fn try_get(&self, identifier: &ServiceIdentifier) -> DependencyResult<Option<Instance>> {
        match self.get(identifier, None) {
            Ok(instance) => Ok(Some(instance)),
            Err(DependencyError::BindingNotFound { identifier: missing })
                if &missing == identifier =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// 开启请求边界
    ///
    /// 请求生命周期的实例在边界内共享；守卫释放时边界及其实例一并结束。
    pub fn begin_request(&self, name: impl Into<String>) -> RequestScope {
        let boundary = RequestBoundary::new(name);
        debug!(container = %self.inner.id, request = %boundary.id, name = %boundary.name, "开启请求边界");
        self.inner.requests.lock().push(RequestFrame {
            boundary: boundary.clone(),
            instances: HashMap::new(),
        });
        RequestScope {
            container: self.clone(),
            boundary,
        }
    }

    /// 当前最内层的请求边界
    pub fn current_request(&self) -> Option<RequestBoundary> {
        let (holder, id) = self.active_request()?;
        let requests = holder.inner.requests.lock();
        let boundary = requests
            .iter()
            .find(|frame| frame.boundary.id == id)
            .map(|frame| frame.boundary.clone());
        boundary
    }

    /// 统计信息
    pub fn stats(&self) -> ContainerStats {
        ContainerStats {
            bindings: self.inner.bindings.read().len(),
            singletons_cached: self.inner.singletons.read().len(),
            resolutions: self.inner.counters.resolutions.load(Ordering::Relaxed),
            resolution_errors: self.inner.counters.resolution_errors.load(Ordering::Relaxed),
        }
    }

    fn end_request(&self, request: Uuid) {
        self.inner
            .requests
            .lock()
            .retain(|frame| frame.boundary.id != request);
        let mut current = Some(self);
        while let Some(container) = current {
            container.inner.contextual.end_request(request);
            current = container.parent();
        }
        debug!(container = %self.inner.id, request = %request, "结束请求边界");
    }

    /// 沿父链查找持有活动请求边界的容器
    fn active_request(&self) -> Option<(Container, Uuid)> {
        let mut current = Some(self);
        while let Some(container) = current {
            if let Some(frame) = container.inner.requests.lock().last() {
                return Some((container.clone(), frame.boundary.id));
            }
            current = container.parent();
        }
        None
    }

    fn find_binding(&self, key: &BindingKey) -> Option<(Container, Binding)> {
        let mut current = Some(self);
        while let Some(container) = current {
            if let Some(binding) = container.inner.bindings.read().get(key).cloned() {
                return Some((container.clone(), binding));
            }
            current = container.parent();
        }
        None
    }

    fn deferred_loader(&self) -> Option<Arc<dyn DeferredLoader>> {
        let mut current = Some(self);
        while let Some(container) = current {
            let loader = container
                .inner
                .deferred_loader
                .read()
                .as_ref()
                .and_then(Weak::upgrade);
            if loader.is_some() {
                return loader;
            }
            current = container.parent();
        }
        None
    }

    /// 沿父链查找声明了 (上下文, 标识) 覆盖的容器
    fn contextual_owner(&self, context: &ContextKey, identifier: &ServiceIdentifier) -> Option<Container> {
        let mut current = Some(self);
        while let Some(container) = current {
            if container.inner.contextual.has_override(context, identifier) {
                return Some(container.clone());
            }
            current = container.parent();
        }
        None
    }

    fn resolve_in(
        &self,
        identifier: &ServiceIdentifier,
        constraint: &BindingConstraint,
        explicit: Option<&ContextKey>,
        chain: &mut Vec<Frame>,
    ) -> DependencyResult<Instance> {
        self.inner.counters.resolutions.fetch_add(1, Ordering::Relaxed);
        let result = self.resolve_uncounted(identifier, constraint, explicit, chain);
        if let Err(err) = &result {
            self.inner
                .counters
                .resolution_errors
                .fetch_add(1, Ordering::Relaxed);
            debug!(identifier = %identifier, error = %err, "解析失败");
        }
        result
    }

    fn resolve_uncounted(
        &self,
        identifier: &ServiceIdentifier,
        constraint: &BindingConstraint,
        explicit: Option<&ContextKey>,
        chain: &mut Vec<Frame>,
    ) -> DependencyResult<Instance> {
        let key = BindingKey::new(identifier, constraint);
        self.guard_chain(&key, chain)?;

        // 上下文覆盖只作用于无约束的查找
        let consumer = explicit.cloned().or_else(|| chain.last().map(|f| f.context_key.clone()));
        if let (Some(consumer), true) = (consumer, constraint.is_none()) {
            if let Some(owner) = self.contextual_owner(&consumer, identifier) {
                let request = self.active_request().map(|(_, id)| id);
                chain.push(Frame {
                    key: key.clone(),
                    context_key: ContextKey::from(identifier),
                });
                let resolved = {
                    let mut ctx = ResolveContext::new(self, chain);
                    owner
                        .inner
                        .contextual
                        .resolve_contextual(&consumer, identifier, request, &mut ctx)
                };
                chain.pop();
                if let Some(instance) = resolved? {
                    debug!(consumer = %consumer, identifier = %identifier, "使用上下文绑定");
                    return Ok(instance);
                }
            }
        }

        let (owner, binding) = match self.find_binding(&key) {
            Some(found) => found,
            None => self.promote_deferred(&key)?,
        };

        let context_key = match &binding.implementation {
            Implementation::Constructor(constructor) => {
                ContextKey::from_type_name(&constructor.type_info.module_path)
            }
            _ => ContextKey::from(identifier),
        };
        chain.push(Frame {
            key: key.clone(),
            context_key,
        });
        let result = self.materialize_scoped(&owner, &key, &binding, chain);
        chain.pop();
        result
    }

    fn guard_chain(&self, key: &BindingKey, chain: &[Frame]) -> DependencyResult<()> {
        let describe = |last: &BindingKey| {
            chain
                .iter()
                .map(|frame| format!("{}{}", frame.key.identifier, frame.key.constraint))
                .chain(std::iter::once(format!("{}{}", last.identifier, last.constraint)))
                .collect::<Vec<_>>()
                .join(" -> ")
        };

        if self.inner.config.enable_circular_dependency_detection
            && chain.iter().any(|frame| &frame.key == key)
        {
            return Err(DependencyError::CyclicDependency {
                chain: describe(key),
            });
        }
        if chain.len() >= self.inner.config.max_resolution_depth {
            return Err(DependencyError::MaxDepthExceeded {
                max_depth: self.inner.config.max_resolution_depth,
                chain: describe(key),
            });
        }
        Ok(())
    }

    fn promote_deferred(&self, key: &BindingKey) -> DependencyResult<(Container, Binding)> {
        if let Some(loader) = self.deferred_loader() {
            if loader.load_for(&key.identifier)? {
                if let Some(found) = self.find_binding(key) {
                    return Ok(found);
                }
                warn!(identifier = %key.identifier, "延迟服务提供者已加载，但未注册该绑定");
            }
        }
        Err(DependencyError::binding_not_found(&key.identifier))
    }

    fn materialize_scoped(
        &self,
        owner: &Container,
        key: &BindingKey,
        binding: &Binding,
        chain: &mut Vec<Frame>,
    ) -> DependencyResult<Instance> {
        match binding.scope {
            Lifetime::Transient => self.materialize(binding, chain),
            Lifetime::Singleton => {
                if let Some(cached) = owner.inner.singletons.read().get(key).cloned() {
                    debug!(identifier = %key.identifier, "单例缓存命中");
                    return Ok(cached);
                }
                // 单例的依赖在持有绑定的容器中解析
                let instance = owner.materialize(binding, chain)?;
                let stored = owner
                    .inner
                    .singletons
                    .write()
                    .entry(key.clone())
                    .or_insert(instance)
                    .clone();
                Ok(stored)
            }
            Lifetime::Request => {
                let Some((holder, request)) = self.active_request() else {
                    return self.materialize(binding, chain);
                };
                let cache_key = (owner.inner.id, key.clone());
                let cached = holder
                    .inner
                    .requests
                    .lock()
                    .iter()
                    .find(|frame| frame.boundary.id == request)
                    .and_then(|frame| frame.instances.get(&cache_key).cloned());
                if let Some(cached) = cached {
                    return Ok(cached);
                }

                let instance = self.materialize(binding, chain)?;
                let mut requests = holder.inner.requests.lock();
                let stored = match requests.iter_mut().find(|frame| frame.boundary.id == request) {
                    Some(frame) => frame.instances.entry(cache_key).or_insert(instance).clone(),
                    // 边界已在物化期间结束
                    None => instance,
                };
                Ok(stored)
            }
        }
    }

    fn materialize(&self, binding: &Binding, chain: &mut Vec<Frame>) -> DependencyResult<Instance> {
        let materialized = match &binding.implementation {
            Implementation::Constant(value) => return Ok(value.clone()),
            Implementation::Factory(factory) => {
                let mut ctx = ResolveContext::new(self, chain);
                factory(&mut ctx)?
            }
            Implementation::Constructor(constructor) => {
                let type_id = constructor.type_info.id;
                if !self.inner.reflector.is_constructible(type_id) {
                    return Err(DependencyError::NotConstructible {
                        type_name: constructor.type_info.name.clone(),
                    });
                }
                let dependencies = self.inner.reflector.constructor_dependencies(type_id)?;
                let mut values = Vec::with_capacity(dependencies.len());
                for dependency in dependencies.iter() {
                    values.push(self.resolve_in(dependency, &BindingConstraint::None, None, chain)?);
                }
                (constructor.construct)(ConstructorArgs::new(dependencies.to_vec(), values))?
            }
        };

        match materialized {
            Materialized::Value(value) => Ok(value),
            Materialized::Composite(mut composite) => {
                if self.inner.config.enable_property_injection {
                    let mut ctx = ResolveContext::new(self, chain);
                    self.inner.injector.inject(composite.as_mut(), &mut ctx)?;
                }
                Ok(composite.into_instance())
            }
        }
    }

    fn can_resolve_for(&self, identifier: &ServiceIdentifier, consumer: Option<&ContextKey>) -> bool {
        if let Some(consumer) = consumer {
            if self.contextual_owner(consumer, identifier).is_some() {
                return true;
            }
        }
        self.find_binding(&BindingKey::new(identifier, &BindingConstraint::None))
            .is_some()
            || self
                .deferred_loader()
                .map(|loader| loader.can_provide(identifier))
                .unwrap_or(false)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("parent", &self.inner.parent.as_ref().map(Container::id))
            .field("bindings", &self.inner.bindings.read().len())
            .finish()
    }
}

impl ServiceContainer for Container {
    fn add_binding(&self, binding: Binding) {
        let key = BindingKey::new(&binding.identifier, &binding.constraint);
        info!(
            identifier = %binding.identifier,
            constraint = %binding.constraint,
            kind = binding.implementation.kind(),
            scope = %binding.scope,
            "注册绑定"
        );
        let replaced = self.inner.bindings.write().insert(key.clone(), binding).is_some();
        if replaced {
            self.inner.singletons.write().remove(&key);
            debug!(identifier = %key.identifier, "替换已有绑定");
        }
    }

    fn add_contextual(&self, spec: ContextualBindingSpec) -> DependencyResult<()> {
        self.inner.contextual.register_binding(spec)
    }

    fn get(
        &self,
        identifier: &ServiceIdentifier,
        context: Option<&ContextKey>,
    ) -> DependencyResult<Instance> {
        let mut chain = Vec::new();
        self.resolve_in(identifier, &BindingConstraint::None, context, &mut chain)
    }

    fn get_constrained(
        &self,
        identifier: &ServiceIdentifier,
        constraint: &BindingConstraint,
    ) -> DependencyResult<Instance> {
        let mut chain = Vec::new();
        self.resolve_in(identifier, constraint, None, &mut chain)
    }

    fn can_resolve(&self, identifier: &ServiceIdentifier, context: Option<&ContextKey>) -> bool {
        self.can_resolve_for(identifier, context)
    }

    fn is_bound(&self, identifier: &ServiceIdentifier) -> bool {
        let mut current = Some(self);
        while let Some(container) = current {
            if container
                .inner
                .bindings
                .read()
                .keys()
                .any(|key| &key.identifier == identifier)
            {
                return true;
            }
            current = container.parent();
        }
        false
    }

    fn unbind(&self, identifier: &ServiceIdentifier) -> bool {
        let removed: Vec<BindingKey> = {
            let mut bindings = self.inner.bindings.write();
            let keys: Vec<_> = bindings
                .keys()
                .filter(|key| &key.identifier == identifier)
                .cloned()
                .collect();
            for key in &keys {
                bindings.remove(key);
            }
            keys
        };
        let mut singletons = self.inner.singletons.write();
        for key in &removed {
            singletons.remove(key);
        }
        if !removed.is_empty() {
            info!(identifier = %identifier, count = removed.len(), "移除绑定");
        }
        !removed.is_empty()
    }
}

/// 请求边界守卫
pub struct RequestScope {
    container: Container,
    boundary: RequestBoundary,
}

impl RequestScope {
    /// 请求边界 ID
    pub fn id(&self) -> Uuid {
        self.boundary.id
    }

    /// 请求边界
    pub fn boundary(&self) -> &RequestBoundary {
        &self.boundary
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.container.end_request(self.boundary.id);
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.boundary.id)
            .field("name", &self.boundary.name)
            .finish()
    }
}

/// 容器解析上下文
///
/// 持有解析调用栈；工厂、构造函数与属性注入经由它回调容器。
struct ResolveContext<'a> {
    container: &'a Container,
    chain: &'a mut Vec<Frame>,
}

impl<'a> ResolveContext<'a> {
    fn new(container: &'a Container, chain: &'a mut Vec<Frame>) -> Self {
        Self { container, chain }
    }
}

impl ResolutionContext for ResolveContext<'_> {
    fn get(&mut self, identifier: &ServiceIdentifier) -> DependencyResult<Instance> {
        self.container
            .resolve_in(identifier, &BindingConstraint::None, None, self.chain)
    }

    fn get_constrained(
        &mut self,
        identifier: &ServiceIdentifier,
        constraint: &BindingConstraint,
    ) -> DependencyResult<Instance> {
        self.container.resolve_in(identifier, constraint, None, self.chain)
    }

    fn can_resolve(&self, identifier: &ServiceIdentifier) -> bool {
        self.container.can_resolve_for(identifier, self.consumer())
    }

    fn consumer(&self) -> Option<&ContextKey> {
        self.chain.last().map(|frame| &frame.context_key)
    }

    fn depth(&self) -> usize {
        self.chain.len()
    }
}
