//! 上下文绑定管理器

use dashmap::DashMap;
use di_abstractions::{
    ContextualBinding, ContextualBindingSpec, ContextualImplementation, ResolutionContext,
};
use infrastructure_common::{
    ContextKey, DependencyResult, Instance, Lifetime, ServiceIdentifier,
};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

type CacheKey = (ContextKey, ServiceIdentifier);

/// 上下文绑定管理器
///
/// 绑定以消费者上下文键分组；同一 (上下文, 标识) 的新绑定替换旧绑定，
/// 并丢弃旧绑定的缓存实例。
#[derive(Default)]
pub struct ContextualBindingManager {
    bindings: RwLock<HashMap<ContextKey, HashMap<ServiceIdentifier, ContextualBinding>>>,
    singletons: DashMap<CacheKey, Instance>,
    requests: DashMap<(ContextKey, ServiceIdentifier, Uuid), Instance>,
}

impl ContextualBindingManager {
    /// 创建空的管理器
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验并登记上下文绑定
    pub fn register_binding(&self, spec: ContextualBindingSpec) -> DependencyResult<()> {
        let binding = spec.validate()?;
        let when = binding.when.clone();
        let needs = binding.needs.clone();
        let scope = binding.scope;

        let replaced = self
            .bindings
            .write()
            .entry(when.clone())
            .or_default()
            .insert(needs.clone(), binding)
            .is_some();
        if replaced {
            self.drop_cached(&when, &needs);
        }

        info!(when = %when, needs = %needs, scope = %scope, replaced, "登记上下文绑定");
        Ok(())
    }

    /// 解析上下文覆盖；`None` 表示没有覆盖
    pub fn resolve_contextual(
        &self,
        context: &ContextKey,
        identifier: &ServiceIdentifier,
        request: Option<Uuid>,
        ctx: &mut dyn ResolutionContext,
    ) -> DependencyResult<Option<Instance>> {
        let Some(binding) = self.binding(context, identifier) else {
            return Ok(None);
        };

        let cache_key = (context.clone(), identifier.clone());
        match (binding.scope, request) {
            (Lifetime::Singleton, _) => {
                if let Some(cached) = self.singletons.get(&cache_key) {
                    debug!(context = %context, identifier = %identifier, "上下文单例缓存命中");
                    return Ok(Some(cached.value().clone()));
                }
                let instance = Self::materialize(&binding.give, ctx)?;
                let stored = self.singletons.entry(cache_key).or_insert(instance).value().clone();
                Ok(Some(stored))
            }
            (Lifetime::Request, Some(request)) => {
                let request_key = (cache_key.0, cache_key.1, request);
                if let Some(cached) = self.requests.get(&request_key) {
                    return Ok(Some(cached.value().clone()));
                }
                let instance = Self::materialize(&binding.give, ctx)?;
                let stored = self.requests.entry(request_key).or_insert(instance).value().clone();
                Ok(Some(stored))
            }
            _ => Self::materialize(&binding.give, ctx).map(Some),
        }
    }

    /// 是否存在 (上下文, 标识) 的覆盖
    pub fn has_override(&self, context: &ContextKey, identifier: &ServiceIdentifier) -> bool {
        self.bindings
            .read()
            .get(context)
            .map(|needs| needs.contains_key(identifier))
            .unwrap_or(false)
    }

    /// 移除覆盖及其缓存
    pub fn remove(&self, context: &ContextKey, identifier: &ServiceIdentifier) -> bool {
        let removed = {
            let mut bindings = self.bindings.write();
            let removed = bindings
                .get_mut(context)
                .map(|needs| needs.remove(identifier).is_some())
                .unwrap_or(false);
            if bindings.get(context).map(HashMap::is_empty).unwrap_or(false) {
                bindings.remove(context);
            }
            removed
        };
        if removed {
            self.drop_cached(context, identifier);
        }
        removed
    }

    /// 清空全部上下文绑定与缓存
    pub fn clear(&self) {
        self.bindings.write().clear();
        self.singletons.clear();
        self.requests.clear();
    }

    /// 丢弃某个请求边界内缓存的实例
    pub fn end_request(&self, request: Uuid) {
        self.requests.retain(|(_, _, cached), _| *cached != request);
    }

    /// 已登记的覆盖数量
    pub fn len(&self) -> usize {
        self.bindings.read().values().map(HashMap::len).sum()
    }

    /// 是否没有任何上下文绑定
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 两段式构建：`when(ctx).needs(id).give(impl)`
    pub fn when(&self, context: impl Into<ContextKey>) -> WhenBuilder<'_> {
        WhenBuilder {
            manager: self,
            when: context.into(),
        }
    }

    fn binding(&self, context: &ContextKey, identifier: &ServiceIdentifier) -> Option<ContextualBinding> {
        self.bindings
            .read()
            .get(context)
            .and_then(|needs| needs.get(identifier).cloned())
    }

    fn drop_cached(&self, context: &ContextKey, identifier: &ServiceIdentifier) {
        self.singletons
            .remove(&(context.clone(), identifier.clone()));
        self.requests
            .retain(|(c, i, _), _| !(c == context && i == identifier));
    }

    fn materialize(
        give: &ContextualImplementation,
        ctx: &mut dyn ResolutionContext,
    ) -> DependencyResult<Instance> {
        match give {
            ContextualImplementation::Value(value) => Ok(value.clone()),
            ContextualImplementation::Factory(factory) => factory(ctx),
        }
    }
}

impl fmt::Debug for ContextualBindingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualBindingManager")
            .field("bindings", &self.len())
            .field("cached_singletons", &self.singletons.len())
            .finish()
    }
}

/// `when(ctx)` 阶段
pub struct WhenBuilder<'a> {
    manager: &'a ContextualBindingManager,
    when: ContextKey,
}

impl<'a> WhenBuilder<'a> {
    /// 指定被替换的标识
    pub fn needs(self, identifier: impl Into<ServiceIdentifier>) -> NeedsBuilder<'a> {
        NeedsBuilder {
            manager: self.manager,
            when: self.when,
            needs: identifier.into(),
        }
    }
}

/// `needs(id)` 阶段
pub struct NeedsBuilder<'a> {
    manager: &'a ContextualBindingManager,
    when: ContextKey,
    needs: ServiceIdentifier,
}

impl NeedsBuilder<'_> {
    /// 以瞬时生命周期登记
    pub fn give(self, implementation: ContextualImplementation) -> DependencyResult<()> {
        self.give_scoped(implementation, Lifetime::Transient)
    }

    /// 登记常量
    pub fn give_value<T: Any + Send + Sync>(self, value: T) -> DependencyResult<()> {
        self.give(ContextualImplementation::value(value))
    }

    /// 登记工厂
    pub fn give_factory<F>(self, factory: F) -> DependencyResult<()>
    where
        F: Fn(&mut dyn ResolutionContext) -> DependencyResult<Instance> + Send + Sync + 'static,
    {
        self.give(ContextualImplementation::factory(factory))
    }

    /// 指定替代实现与生命周期
    pub fn give_scoped(
        self,
        implementation: ContextualImplementation,
        scope: Lifetime,
    ) -> DependencyResult<()> {
        self.manager.register_binding(
            ContextualBindingSpec::new(self.when, self.needs, implementation).with_scope(scope),
        )
    }
}
