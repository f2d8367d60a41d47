//! 元数据定义与元数据存储
//!
//! 元数据以 (实体, 可选成员名, 键) 为地址保存值。实体句柄由存储签发，
//! 句柄的最后一个强引用释放时，该实体的全部元数据随之清除；
//! 存储本身不提供对全部实体的枚举。

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// 类型信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// 类型短名称
    pub name: String,
    /// 类型ID
    pub id: TypeId,
    /// 完整类型路径
    pub module_path: String,
}

impl TypeInfo {
    /// 从类型获取类型信息
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full_name = std::any::type_name::<T>();
        Self {
            name: crate::identifier::short_type_name(full_name).to_string(),
            id: TypeId::of::<T>(),
            module_path: full_name.to_string(),
        }
    }

    /// 获取简短的类型名称（不包含模块路径）
    pub fn short_name(&self) -> &str {
        &self.name
    }
}

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);
static NEXT_ENTITY: AtomicU64 = AtomicU64::new(1);

/// 符号标签
///
/// 进程内唯一；描述相同的两个符号互不相等。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    id: u64,
    description: Arc<str>,
}

impl Symbol {
    /// 创建新的符号
    pub fn new(description: &str) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: Arc::from(description),
        }
    }

    /// 符号描述
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// 元数据键：字符串或符号标签
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetadataKey {
    Name(String),
    Symbol(Symbol),
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Symbol(symbol) => write!(f, "Symbol({})", symbol.description()),
        }
    }
}

impl From<&str> for MetadataKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for MetadataKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Symbol> for MetadataKey {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

impl From<&Symbol> for MetadataKey {
    fn from(symbol: &Symbol) -> Self {
        Self::Symbol(symbol.clone())
    }
}

/// 不透明值
///
/// 保存无法序列化的宿主对象（例如自定义属性工厂）。按指针比较相等。
#[derive(Clone)]
pub struct OpaqueValue(Arc<dyn Any + Send + Sync>);

impl OpaqueValue {
    /// 包装任意值
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// 按具体类型取出
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OpaqueValue(..)")
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// 元数据值
///
/// 封闭的标签联合。除 `Opaque` 外的所有变体都可以经 serde 编码往返。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Sequence(Vec<MetadataValue>),
    Mapping(BTreeMap<String, MetadataValue>),
    #[serde(skip)]
    Opaque(OpaqueValue),
}

impl MetadataValue {
    /// 布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// 整数值
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// 文本值
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// 序列值
    pub fn as_sequence(&self) -> Option<&[MetadataValue]> {
        match self {
            Self::Sequence(values) => Some(values),
            _ => None,
        }
    }

    /// 映射值
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, MetadataValue>> {
        match self {
            Self::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    /// 不透明值
    pub fn as_opaque(&self) -> Option<&OpaqueValue> {
        match self {
            Self::Opaque(value) => Some(value),
            _ => None,
        }
    }

    /// 是否为空值
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<MetadataValue>> for MetadataValue {
    fn from(values: Vec<MetadataValue>) -> Self {
        Self::Sequence(values)
    }
}

/// 实体标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct EntityCell {
    id: EntityId,
    label: String,
    store: Weak<StoreInner>,
}

impl Drop for EntityCell {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.forget(self.id);
            debug!(entity = %self.id, label = %self.label, "实体释放，元数据已清除");
        }
    }
}

/// 实体句柄
///
/// 可克隆；所有克隆共享同一身份。最后一个克隆释放时元数据自动清除。
#[derive(Clone)]
pub struct Entity(Arc<EntityCell>);

impl Entity {
    /// 实体 ID
    pub fn id(&self) -> EntityId {
        self.0.id
    }

    /// 实体标签
    pub fn label(&self) -> &str {
        &self.0.label
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.0.id)
            .field("label", &self.0.label)
            .finish()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Entity {}

type Entries = HashMap<MetadataKey, MetadataValue>;

#[derive(Default)]
struct StoreInner {
    /// entity -> (key -> value)
    entity_entries: DashMap<EntityId, Entries>,
    /// entity -> (member -> (key -> value))
    member_entries: DashMap<EntityId, HashMap<String, Entries>>,
}

impl StoreInner {
    fn forget(&self, id: EntityId) {
        self.entity_entries.remove(&id);
        self.member_entries.remove(&id);
    }
}

/// 元数据存储
///
/// 实体级与成员级两层相互独立：同一个键在两层中的条目互不可见。
#[derive(Clone, Default)]
pub struct MetadataStore {
    inner: Arc<StoreInner>,
}

impl MetadataStore {
    /// 创建新的元数据存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 签发新的实体句柄
    pub fn entity(&self, label: impl Into<String>) -> Entity {
        Entity(Arc::new(EntityCell {
            id: EntityId(NEXT_ENTITY.fetch_add(1, Ordering::Relaxed)),
            label: label.into(),
            store: Arc::downgrade(&self.inner),
        }))
    }

    /// 设置元数据
    pub fn set(
        &self,
        key: impl Into<MetadataKey>,
        value: MetadataValue,
        entity: &Entity,
        member: Option<&str>,
    ) {
        let key = key.into();
        match member {
            None => {
                self.inner
                    .entity_entries
                    .entry(entity.id())
                    .or_default()
                    .insert(key, value);
            }
            Some(member) => {
                self.inner
                    .member_entries
                    .entry(entity.id())
                    .or_default()
                    .entry(member.to_string())
                    .or_default()
                    .insert(key, value);
            }
        }
    }

    /// 读取元数据
    pub fn get(
        &self,
        key: impl Into<MetadataKey>,
        entity: &Entity,
        member: Option<&str>,
    ) -> Option<MetadataValue> {
        let key = key.into();
        match member {
            None => self
                .inner
                .entity_entries
                .get(&entity.id())
                .and_then(|entries| entries.get(&key).cloned()),
            Some(member) => self
                .inner
                .member_entries
                .get(&entity.id())
                .and_then(|members| members.get(member).and_then(|e| e.get(&key).cloned())),
        }
    }

    /// 是否存在元数据
    pub fn has(&self, key: impl Into<MetadataKey>, entity: &Entity, member: Option<&str>) -> bool {
        let key = key.into();
        match member {
            None => self
                .inner
                .entity_entries
                .get(&entity.id())
                .map(|entries| entries.contains_key(&key))
                .unwrap_or(false),
            Some(member) => self
                .inner
                .member_entries
                .get(&entity.id())
                .and_then(|members| members.get(member).map(|e| e.contains_key(&key)))
                .unwrap_or(false),
        }
    }

    /// 删除元数据，返回是否删除了条目
    pub fn delete(
        &self,
        key: impl Into<MetadataKey>,
        entity: &Entity,
        member: Option<&str>,
    ) -> bool {
        let key = key.into();
        match member {
            None => self
                .inner
                .entity_entries
                .get_mut(&entity.id())
                .map(|mut entries| entries.remove(&key).is_some())
                .unwrap_or(false),
            Some(member) => self
                .inner
                .member_entries
                .get_mut(&entity.id())
                .and_then(|mut members| {
                    members
                        .get_mut(member)
                        .map(|entries| entries.remove(&key).is_some())
                })
                .unwrap_or(false),
        }
    }

    /// 列出实体（或成员）下的全部键
    pub fn keys(&self, entity: &Entity, member: Option<&str>) -> Vec<MetadataKey> {
        let mut keys: Vec<MetadataKey> = match member {
            None => self
                .inner
                .entity_entries
                .get(&entity.id())
                .map(|entries| entries.keys().cloned().collect())
                .unwrap_or_default(),
            Some(member) => self
                .inner
                .member_entries
                .get(&entity.id())
                .and_then(|members| members.get(member).map(|e| e.keys().cloned().collect()))
                .unwrap_or_default(),
        };
        keys.sort();
        keys
    }

    /// 清除实体级条目（`member` 为 `None`）或某个成员的条目
    pub fn clear(&self, entity: &Entity, member: Option<&str>) {
        match member {
            None => {
                self.inner.entity_entries.remove(&entity.id());
            }
            Some(member) => {
                if let Some(mut members) = self.inner.member_entries.get_mut(&entity.id()) {
                    members.remove(member);
                }
            }
        }
    }

    /// 立即清除实体的全部条目（实体级与成员级）
    pub fn release(&self, entity: &Entity) {
        self.inner.forget(entity.id());
    }

    /// 全量清除：按约定不执行任何操作
    ///
    /// 存储不枚举实体；条目随实体句柄释放而清除。
    pub fn clear_all(&self) {
        debug!("MetadataStore::clear_all 为空操作，条目随实体释放自动清除");
    }
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore").finish_non_exhaustive()
    }
}
