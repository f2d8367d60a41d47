//! 反射器
//!
//! 宿主通过显式登记提供类型身份、祖先链与成员信息；
//! 注入声明与构造依赖保存在元数据存储中。查询结果按 (类型, 查询) 缓存。

use dashmap::DashMap;
use di_abstractions::{
    InjectionDeclaration, InjectionSchema, CONSTRUCTOR_DEPENDENCIES_KEY, PROPERTY_INJECTIONS_KEY,
};
use infrastructure_common::{
    Entity, MetadataError, MetadataResult, MetadataStore, MetadataValue, ServiceIdentifier,
    TypeInfo,
};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 成员种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Accessor,
    Field,
}

/// 类型描述
///
/// 由宿主在启动阶段登记，替代运行时反射。
#[derive(Debug, Clone, Default)]
pub struct TypeDescriptor {
    parent: Option<TypeInfo>,
    constructible: bool,
    members: HashMap<String, MemberKind>,
}

impl TypeDescriptor {
    /// 创建空描述
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明父类型
    pub fn extends<P: ?Sized + 'static>(mut self) -> Self {
        self.parent = Some(TypeInfo::of::<P>());
        self
    }

    /// 声明可构造
    pub fn constructible(mut self) -> Self {
        self.constructible = true;
        self
    }

    /// 声明成员
    pub fn member(mut self, name: impl Into<String>, kind: MemberKind) -> Self {
        self.members.insert(name.into(), kind);
        self
    }

    /// 声明字段成员
    pub fn field(self, name: impl Into<String>) -> Self {
        self.member(name, MemberKind::Field)
    }

    /// 声明方法成员
    pub fn method(self, name: impl Into<String>) -> Self {
        self.member(name, MemberKind::Method)
    }

    /// 声明访问器成员
    pub fn accessor(self, name: impl Into<String>) -> Self {
        self.member(name, MemberKind::Accessor)
    }

    /// 父类型
    pub fn parent(&self) -> Option<&TypeInfo> {
        self.parent.as_ref()
    }
}

struct TypeRecord {
    info: TypeInfo,
    descriptor: TypeDescriptor,
    entity: Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ReflectionQuery {
    InjectionDeclarations,
    Constructible,
    MemberKind(String),
    Ancestry,
    ConstructorDependencies,
}

#[derive(Clone)]
enum ReflectionFact {
    Declarations(Arc<Vec<InjectionDeclaration>>),
    Flag(bool),
    Member(Option<MemberKind>),
    Ancestry(Arc<Vec<TypeInfo>>),
    Dependencies(Arc<Vec<ServiceIdentifier>>),
}

#[derive(Default)]
struct ReflectorInner {
    store: MetadataStore,
    types: DashMap<TypeId, TypeRecord>,
    cache: DashMap<(TypeId, ReflectionQuery), ReflectionFact>,
}

/// 反射器
///
/// 可克隆；克隆共享同一份登记信息、元数据存储与缓存。
#[derive(Clone, Default)]
pub struct Reflector {
    inner: Arc<ReflectorInner>,
}

impl Reflector {
    /// 创建使用独立元数据存储的反射器
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定的元数据存储
    pub fn with_store(store: MetadataStore) -> Self {
        Self {
            inner: Arc::new(ReflectorInner {
                store,
                ..Default::default()
            }),
        }
    }

    /// 底层元数据存储
    pub fn metadata(&self) -> &MetadataStore {
        &self.inner.store
    }

    /// 登记类型描述；重复登记只更新描述，已有元数据保留
    pub fn register_type<T: ?Sized + 'static>(&self, descriptor: TypeDescriptor) {
        self.register_type_info(TypeInfo::of::<T>(), descriptor);
    }

    /// 按类型信息注册
    pub fn register_type_info(&self, info: TypeInfo, descriptor: TypeDescriptor) {
        let parent = descriptor.parent.as_ref().map(|p| p.name.clone());
        match self.inner.types.get_mut(&info.id) {
            Some(mut record) => record.descriptor = descriptor,
            None => {
                let entity = self.inner.store.entity(info.name.clone());
                self.inner.types.insert(
                    info.id,
                    TypeRecord {
                        info: info.clone(),
                        descriptor,
                        entity,
                    },
                );
            }
        }
        self.invalidate();
        debug!(type_name = %info.name, parent = ?parent, "登记类型");
    }

    /// 标记类型可构造并记录构造依赖
    pub fn register_injectable<T: ?Sized + 'static>(&self, dependencies: Vec<ServiceIdentifier>) {
        let info = TypeInfo::of::<T>();
        let entity = self.ensure_record(&info);
        if let Some(mut record) = self.inner.types.get_mut(&info.id) {
            record.descriptor.constructible = true;
        }

        let encoded = dependencies.iter().map(ServiceIdentifier::to_metadata).collect::<Vec<_>>();
        self.inner.store.set(
            CONSTRUCTOR_DEPENDENCIES_KEY,
            MetadataValue::Sequence(encoded),
            &entity,
            None,
        );
        self.invalidate();
        info!(type_name = %info.name, dependencies = dependencies.len(), "登记可注入类型");
    }

    /// 为类型追加一条属性注入声明；同一层级的同名成员被替换
    pub fn register_property<T: ?Sized + 'static>(
        &self,
        declaration: InjectionDeclaration,
    ) -> MetadataResult<()> {
        self.register_property_for(&TypeInfo::of::<T>(), declaration)
    }

    /// 按类型信息登记属性注入声明
    pub fn register_property_for(
        &self,
        info: &TypeInfo,
        declaration: InjectionDeclaration,
    ) -> MetadataResult<()> {
        let entity = self.ensure_record(info);
        let mut declarations = self.own_declarations(&entity)?;

        match declarations
            .iter_mut()
            .find(|existing| existing.member == declaration.member)
        {
            Some(existing) => *existing = declaration.clone(),
            None => declarations.push(declaration.clone()),
        }

        self.inner.store.set(
            PROPERTY_INJECTIONS_KEY,
            InjectionDeclaration::encode_all(&declarations),
            &entity,
            None,
        );
        self.invalidate();
        debug!(
            type_name = %info.name,
            member = %declaration.member,
            identifier = %declaration.identifier,
            optional = declaration.optional,
            "登记属性注入"
        );
        Ok(())
    }

    /// 登记派生宏生成的全部声明
    pub fn register_schema<T: InjectionSchema>(&self) -> MetadataResult<()> {
        let info = TypeInfo::of::<T>();
        for declaration in T::injection_declarations() {
            self.register_property_for(&info, declaration)?;
        }
        Ok(())
    }

    /// 注销类型，其元数据随实体一并清除
    pub fn unregister_type<T: ?Sized + 'static>(&self) -> bool {
        let removed = self.inner.types.remove(&TypeId::of::<T>());
        self.invalidate();
        match removed {
            Some((_, record)) => {
                self.inner.store.release(&record.entity);
                info!(type_name = %record.info.name, "注销类型");
                true
            }
            None => false,
        }
    }

    /// 类型是否已注册
    pub fn is_registered(&self, type_id: TypeId) -> bool {
        self.inner.types.contains_key(&type_id)
    }

    /// 类型对应的元数据实体
    pub fn entity_of(&self, type_id: TypeId) -> Option<Entity> {
        self.inner.types.get(&type_id).map(|record| record.entity.clone())
    }

    /// 已注册类型的信息
    pub fn type_info(&self, type_id: TypeId) -> Option<TypeInfo> {
        self.inner.types.get(&type_id).map(|record| record.info.clone())
    }

    /// 合并祖先链上的注入声明
    ///
    /// 从类型自身向根类型遍历，按成员名去重，派生层优先。
    pub fn get_injection_declarations(
        &self,
        type_id: TypeId,
    ) -> MetadataResult<Arc<Vec<InjectionDeclaration>>> {
        let key = (type_id, ReflectionQuery::InjectionDeclarations);
        if let Some(ReflectionFact::Declarations(cached)) = self.cached(&key) {
            return Ok(cached);
        }

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for level in self.ancestry(type_id).iter() {
            let Some(entity) = self.entity_of(level.id) else {
                continue;
            };
            for declaration in self.own_declarations(&entity)? {
                if seen.insert(declaration.member.clone()) {
                    merged.push(declaration);
                }
            }
        }

        let merged = Arc::new(merged);
        self.inner
            .cache
            .insert(key, ReflectionFact::Declarations(merged.clone()));
        Ok(merged)
    }

    /// 类型是否可构造
    pub fn is_constructible(&self, type_id: TypeId) -> bool {
        let key = (type_id, ReflectionQuery::Constructible);
        if let Some(ReflectionFact::Flag(flag)) = self.cached(&key) {
            return flag;
        }

        let flag = self
            .inner
            .types
            .get(&type_id)
            .map(|record| record.descriptor.constructible)
            .unwrap_or(false);
        self.inner.cache.insert(key, ReflectionFact::Flag(flag));
        flag
    }

    /// 成员种类，沿祖先链查找
    pub fn member_kind(&self, type_id: TypeId, member: &str) -> Option<MemberKind> {
        let key = (type_id, ReflectionQuery::MemberKind(member.to_string()));
        if let Some(ReflectionFact::Member(kind)) = self.cached(&key) {
            return kind;
        }

        let kind = self.ancestry(type_id).iter().find_map(|level| {
            self.inner
                .types
                .get(&level.id)
                .and_then(|record| record.descriptor.members.get(member).copied())
        });
        self.inner.cache.insert(key, ReflectionFact::Member(kind));
        kind
    }

    /// 构造依赖
    pub fn constructor_dependencies(
        &self,
        type_id: TypeId,
    ) -> MetadataResult<Arc<Vec<ServiceIdentifier>>> {
        let key = (type_id, ReflectionQuery::ConstructorDependencies);
        if let Some(ReflectionFact::Dependencies(cached)) = self.cached(&key) {
            return Ok(cached);
        }

        let dependencies = match self.entity_of(type_id).and_then(|entity| {
            self.inner
                .store
                .get(CONSTRUCTOR_DEPENDENCIES_KEY, &entity, None)
        }) {
            None => Vec::new(),
            Some(value) => value
                .as_sequence()
                .ok_or(MetadataError::UnexpectedShape {
                    expected: "sequence",
                })?
                .iter()
                .map(ServiceIdentifier::from_metadata)
                .collect::<MetadataResult<Vec<_>>>()?,
        };

        let dependencies = Arc::new(dependencies);
        self.inner
            .cache
            .insert(key, ReflectionFact::Dependencies(dependencies.clone()));
        Ok(dependencies)
    }

    /// 祖先链：类型自身在前，根类型在后；未登记的类型返回空
    pub fn ancestry(&self, type_id: TypeId) -> Arc<Vec<TypeInfo>> {
        let key = (type_id, ReflectionQuery::Ancestry);
        if let Some(ReflectionFact::Ancestry(cached)) = self.cached(&key) {
            return cached;
        }

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.type_info(type_id);
        while let Some(info) = current {
            if !visited.insert(info.id) {
                break;
            }
            current = self
                .inner
                .types
                .get(&info.id)
                .and_then(|record| record.descriptor.parent.clone());
            chain.push(info);
        }

        let chain = Arc::new(chain);
        self.inner
            .cache
            .insert(key, ReflectionFact::Ancestry(chain.clone()));
        chain
    }

    /// 清除缓存；`None` 清除全部
    pub fn clear_cache(&self, type_id: Option<TypeId>) {
        match type_id {
            None => self.inner.cache.clear(),
            Some(type_id) => self.inner.cache.retain(|(cached, _), _| *cached != type_id),
        }
    }

    fn cached(&self, key: &(TypeId, ReflectionQuery)) -> Option<ReflectionFact> {
        let fact = self.inner.cache.get(key).map(|fact| fact.value().clone());
        if fact.is_some() {
            debug!(query = ?key.1, "反射缓存命中");
        }
        fact
    }

    fn invalidate(&self) {
        self.inner.cache.clear();
    }

    fn ensure_record(&self, info: &TypeInfo) -> Entity {
        if let Some(entity) = self.entity_of(info.id) {
            return entity;
        }
        self.inner
            .types
            .entry(info.id)
            .or_insert_with(|| TypeRecord {
                info: info.clone(),
                descriptor: TypeDescriptor::default(),
                entity: self.inner.store.entity(info.name.clone()),
            })
            .entity
            .clone()
    }

    fn own_declarations(&self, entity: &Entity) -> MetadataResult<Vec<InjectionDeclaration>> {
        match self.inner.store.get(PROPERTY_INJECTIONS_KEY, entity, None) {
            None => Ok(Vec::new()),
            Some(value) => InjectionDeclaration::decode_all(&value),
        }
    }
}

impl fmt::Debug for Reflector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reflector")
            .field("types", &self.inner.types.len())
            .field("cached_facts", &self.inner.cache.len())
            .finish()
    }
}
