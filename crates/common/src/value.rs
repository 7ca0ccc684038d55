//! 服务值模型
//!
//! 容器中的服务、参数与字面量统一用 [`Value`] 表示。对象、可调用体与延迟句柄
//! 以 `Arc` 共享，引用相等性由 [`Value::same`] 判断。

use crate::errors::{DiError, DiResult};
use crate::locator::ServiceLocator;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// 服务值
#[derive(Clone, Default)]
pub enum Value {
    /// 空值
    #[default]
    Null,
    /// 布尔值
    Bool(bool),
    /// 整数
    Int(i64),
    /// 浮点数
    Float(f64),
    /// 字符串
    Str(String),
    /// 列表
    List(Vec<Value>),
    /// 有序映射
    Map(BTreeMap<String, Value>),
    /// 对象实例
    Object(Arc<Instance>),
    /// 可调用体（作为值保存时不会被容器调用）
    Callable(Invocable),
    /// 延迟服务句柄
    Lazy(Arc<LazyService>),
}

impl Value {
    /// 引用相等：对象、可调用体、延迟句柄比较指针，其余比较内容
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
            (Self::Lazy(a), Self::Lazy(b)) => Arc::ptr_eq(a, b),
            (a, b) => a == b,
        }
    }

    /// 是否为空值
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// 获取整数
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// 获取字符串
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// 获取列表
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// 获取映射
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// 获取对象实例
    pub const fn as_object(&self) -> Option<&Arc<Instance>> {
        match self {
            Self::Object(instance) => Some(instance),
            _ => None,
        }
    }

    /// 获取可调用体
    pub const fn as_callable(&self) -> Option<&Invocable> {
        match self {
            Self::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    /// 获取延迟句柄
    pub const fn as_lazy(&self) -> Option<&Arc<LazyService>> {
        match self {
            Self::Lazy(lazy) => Some(lazy),
            _ => None,
        }
    }

    /// 解开延迟句柄，得到真实服务
    pub fn resolved(&self) -> DiResult<Self> {
        match self {
            Self::Lazy(lazy) => lazy.force(),
            other => Ok(other.clone()),
        }
    }

    /// 转换为 JSON 表示
    ///
    /// JSON 无法表示 NaN 与无穷大，这类浮点数转换为 `null`；
    /// 序列化（编译输出）时则直接报错。
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Null => Json::Null,
            Self::Bool(value) => Json::Bool(*value),
            Self::Int(value) => Json::from(*value),
            Self::Float(value) => serde_json::Number::from_f64(*value).map_or(Json::Null, Json::Number),
            Self::Str(value) => Json::String(value.clone()),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Json::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Self::Object(instance) => serde_json::json!({ "$object": instance.class() }),
            Self::Callable(callable) => serde_json::json!({ "$callable": callable.name() }),
            Self::Lazy(lazy) => serde_json::json!({ "$lazy": lazy.id() }),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
            (Self::Lazy(a), Self::Lazy(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Int(value) => write!(f, "Int({value})"),
            Self::Float(value) => write!(f, "Float({value})"),
            Self::Str(value) => write!(f, "Str({value:?})"),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Map(map) => f.debug_map().entries(map).finish(),
            Self::Object(instance) => fmt::Debug::fmt(instance, f),
            Self::Callable(callable) => fmt::Debug::fmt(callable, f),
            Self::Lazy(lazy) => fmt::Debug::fmt(lazy, f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Float(value) if !value.is_finite() => {
                Err(S::Error::custom(format!("浮点数 {value} 无法表示为 JSON")))
            }
            Self::List(items) => serializer.collect_seq(items),
            Self::Map(map) => serializer.collect_map(map),
            other => other.to_json().serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Self::Object(Arc::new(instance))
    }
}

impl From<Arc<Instance>> for Value {
    fn from(instance: Arc<Instance>) -> Self {
        Self::Object(instance)
    }
}

impl From<Invocable> for Value {
    fn from(callable: Invocable) -> Self {
        Self::Callable(callable)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Null,
            Json::Bool(value) => Self::Bool(value),
            Json::Number(number) => number
                .as_i64()
                .map_or_else(|| Self::Float(number.as_f64().unwrap_or_default()), Self::Int),
            Json::String(value) => Self::Str(value),
            Json::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Json::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

/// 对象实例
///
/// 属性可在构造后由绑定写入，因此使用内部可变性。
pub struct Instance {
    class: String,
    properties: RwLock<BTreeMap<String, Value>>,
}

impl Instance {
    /// 创建指定类的空实例
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            properties: RwLock::new(BTreeMap::new()),
        }
    }

    /// 设置初始属性
    #[must_use]
    pub fn with_property(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.write().insert(name.into(), value.into());
        self
    }

    /// 类名
    pub fn class(&self) -> &str {
        &self.class
    }

    /// 读取属性
    pub fn property(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).cloned()
    }

    /// 写入属性
    pub fn set_property(&self, name: impl Into<String>, value: Value) {
        self.properties.write().insert(name.into(), value);
    }

    /// 所有属性名
    pub fn property_names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class)
            .field("properties", &self.property_names())
            .finish()
    }
}

/// 调用参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    /// 位置参数
    pub positional: Vec<Value>,
    /// 命名参数
    pub named: BTreeMap<String, Value>,
}

impl CallArgs {
    /// 创建空参数
    pub fn new() -> Self {
        Self::default()
    }

    /// 仅含位置参数
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: BTreeMap::new(),
        }
    }

    /// 追加命名参数
    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// 按位置取参数
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// 按名称取参数
    pub fn named(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// 是否没有任何参数
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

type InvocableFn = dyn Fn(&dyn ServiceLocator, CallArgs) -> DiResult<Value> + Send + Sync;

/// 可调用体
///
/// 名称用于日志与编译输出，`returns` 是自动装配时使用的声明返回类型。
#[derive(Clone)]
pub struct Invocable {
    name: String,
    returns: Vec<String>,
    func: Arc<InvocableFn>,
}

impl Invocable {
    /// 包装闭包
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&dyn ServiceLocator, CallArgs) -> DiResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            returns: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// 声明返回类型
    #[must_use]
    pub fn returning<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returns = types.into_iter().map(Into::into).collect();
        self
    }

    /// 名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 声明的返回类型
    pub fn returns(&self) -> &[String] {
        &self.returns
    }

    /// 调用
    pub fn invoke(&self, locator: &dyn ServiceLocator, args: CallArgs) -> DiResult<Value> {
        (self.func)(locator, args)
    }

    /// 是否为同一个闭包
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Invocable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocable")
            .field("name", &self.name)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// 延迟服务句柄
///
/// 首次 [`force`](Self::force) 时才通过所属容器解析目标服务，之后复用结果。
pub struct LazyService {
    id: String,
    locator: Weak<dyn ServiceLocator>,
    cell: OnceCell<Value>,
}

impl LazyService {
    /// 创建延迟句柄
    pub fn new(id: impl Into<String>, locator: Weak<dyn ServiceLocator>) -> Self {
        Self {
            id: id.into(),
            locator,
            cell: OnceCell::new(),
        }
    }

    /// 目标服务 id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 是否已经解析
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// 解析目标服务
    ///
    /// 解析过程中不持有单元锁，目标服务可以在构造时再次引用本句柄。
    pub fn force(&self) -> DiResult<Value> {
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }

        let locator = self
            .locator
            .upgrade()
            .ok_or_else(|| DiError::ContainerDropped { id: self.id.clone() })?;
        let value = locator.resolve_reference(&self.id)?;

        Ok(self.cell.get_or_init(|| value).clone())
    }
}

impl fmt::Debug for LazyService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyService")
            .field("id", &self.id)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_identity() {
        let first = Value::from(Instance::new("Foo"));
        let second = Value::from(Instance::new("Foo"));

        assert!(first.same(&first.clone()));
        assert!(!first.same(&second));
        assert_ne!(first, second);
    }

    #[test]
    fn test_scalars_compare_by_content() {
        assert!(Value::from(5).same(&Value::Int(5)));
        assert_eq!(Value::from("a"), Value::Str("a".into()));
        assert_ne!(Value::from(1), Value::from(1.0));
    }

    #[test]
    fn test_json_conversion() {
        let value = Value::from(serde_json::json!({
            "name": "db",
            "port": 5432,
            "ratio": 0.5,
            "hosts": ["a", "b"],
        }));

        let map = value.as_map().expect("应为映射");
        assert_eq!(map["port"], Value::Int(5432));
        assert_eq!(map["ratio"], Value::Float(0.5));
        assert_eq!(map["hosts"].as_list().map(<[Value]>::len), Some(2));
    }

    #[test]
    fn test_serialize_marks_opaque_values() {
        let callable = Invocable::new("make_foo", |_, _| Ok(Value::Null));
        let value = Value::List(vec![Value::from(Instance::new("Foo")), Value::from(callable)]);

        let json = serde_json::to_string(&value).expect("序列化失败");
        assert_eq!(json, r#"[{"$object":"Foo"},{"$callable":"make_foo"}]"#);
    }

    #[test]
    fn test_non_finite_float_fails_serialization() {
        assert!(serde_json::to_string(&Value::Float(f64::NAN)).is_err());

        let nested = Value::List(vec![Value::Int(1), Value::Float(f64::INFINITY)]);
        assert!(serde_json::to_string(&nested).is_err());
        assert_eq!(nested.to_json(), serde_json::json!([1, null]));
    }

    #[test]
    fn test_instance_properties() {
        let instance = Instance::new("Foo").with_property("name", "bar");
        instance.set_property("count", Value::Int(2));

        assert_eq!(instance.property("name"), Some(Value::from("bar")));
        assert_eq!(instance.property_names(), vec!["count".to_string(), "name".to_string()]);
        assert!(instance.property("missing").is_none());
    }
}
