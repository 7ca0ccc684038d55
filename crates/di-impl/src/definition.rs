//! 服务定义
//!
//! [`Definition`] 描述如何产生一个服务：构造实体、构造参数、构造后的绑定、
//! 生命周期标记与废弃声明。定义在首次解析后冻结，之后的替换会被拒绝。

use bitflags::bitflags;
use di_common::{default_message, CallArgs, DiResult, Deprecation, Invocable, ServiceLocator, TypeCatalog, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// 绑定额外代码时使用的键
pub const EXTRA_BIND: &str = "@code@";

bitflags! {
    /// 定义标记
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DefinitionFlags: u8 {
        /// 每次解析都产生新实例
        const FACTORY = 1 << 0;
        /// 被引用时以延迟句柄注入
        const LAZY = 1 << 1;
        /// 不出现在公开 id 列表中
        const PRIVATE = 1 << 2;
        /// 参与按类型解析
        const AUTOWIRED = 1 << 3;
    }
}

/// 构造实体
#[derive(Debug, Clone)]
pub enum Entity {
    /// 按类名实例化
    Type(String),
    /// 原样返回的值
    Value(Value),
    /// 调用闭包
    Invocable(Invocable),
    /// 延迟语句
    Statement(Statement),
}

/// 语句的调用目标
#[derive(Debug, Clone)]
pub enum Callee {
    /// 调用闭包
    Invocable(Invocable),
    /// 实例化类
    Type(String),
    /// 调用另一个服务（服务值需为可调用体）
    Service(String),
    /// 调用另一个服务的方法
    Method {
        /// 服务 id
        service: String,
        /// 方法名
        method: String,
    },
}

/// 延迟语句：调用目标加参数，在解析时才执行
#[derive(Debug, Clone)]
pub struct Statement {
    /// 调用目标
    pub callee: Callee,
    /// 参数
    pub args: Arguments,
}

impl Statement {
    /// 创建语句
    pub fn new(callee: Callee) -> Self {
        Self {
            callee,
            args: Arguments::new(),
        }
    }

    /// 实例化类
    pub fn construct(class: impl Into<String>) -> Self {
        Self::new(Callee::Type(class.into()))
    }

    /// 调用闭包
    pub fn call(invocable: Invocable) -> Self {
        Self::new(Callee::Invocable(invocable))
    }

    /// 调用服务
    pub fn service(id: impl Into<String>) -> Self {
        Self::new(Callee::Service(id.into()))
    }

    /// 调用服务方法
    pub fn method(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(Callee::Method {
            service: service.into(),
            method: method.into(),
        })
    }

    /// 追加位置参数
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<Argument>) -> Self {
        self.args.push(arg);
        self
    }

    /// 设置命名参数
    #[must_use]
    pub fn with_named_arg(mut self, name: impl Into<String>, arg: impl Into<Argument>) -> Self {
        self.args.insert_named(name, arg);
        self
    }
}

/// 参数
#[derive(Debug, Clone)]
pub enum Argument {
    /// 字面量
    Value(Value),
    /// 引用服务 id、别名或类型
    Reference(String),
    /// 引用参数
    Parameter(String),
    /// 某类型的全部服务
    Collection(String),
    /// 嵌套语句
    Statement(Box<Statement>),
    /// 参数列表
    List(Vec<Argument>),
}

impl Argument {
    /// 引用服务
    pub fn reference(id: impl Into<String>) -> Self {
        Self::Reference(id.into())
    }

    /// 引用参数
    pub fn parameter(name: impl Into<String>) -> Self {
        Self::Parameter(name.into())
    }

    /// 某类型的全部服务
    pub fn collection(type_name: impl Into<String>) -> Self {
        Self::Collection(type_name.into())
    }

    /// 字面量
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Statement> for Argument {
    fn from(statement: Statement) -> Self {
        Self::Statement(Box::new(statement))
    }
}

impl From<Invocable> for Argument {
    fn from(invocable: Invocable) -> Self {
        Self::Value(Value::Callable(invocable))
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        Self::Value(Value::Int(value))
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for Argument {
    fn from(value: bool) -> Self {
        Self::Value(Value::Bool(value))
    }
}

impl From<Vec<Argument>> for Argument {
    fn from(items: Vec<Argument>) -> Self {
        Self::List(items)
    }
}

/// 参数序列：位置参数加命名参数
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    positional: Vec<Argument>,
    named: IndexMap<String, Argument>,
}

impl Arguments {
    /// 创建空参数
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加位置参数
    pub fn push(&mut self, arg: impl Into<Argument>) {
        self.positional.push(arg.into());
    }

    /// 替换位置参数，越界时以空值补齐
    pub fn set(&mut self, index: usize, arg: impl Into<Argument>) {
        if index >= self.positional.len() {
            self.positional.resize(index + 1, Argument::Value(Value::Null));
        }
        self.positional[index] = arg.into();
    }

    /// 设置命名参数，同名替换
    pub fn insert_named(&mut self, name: impl Into<String>, arg: impl Into<Argument>) {
        self.named.insert(name.into(), arg.into());
    }

    /// 位置参数
    pub fn positional(&self) -> &[Argument] {
        &self.positional
    }

    /// 命名参数
    pub const fn named(&self) -> &IndexMap<String, Argument> {
        &self.named
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// 在当前参数后追加另一组参数，命名参数同名时以后者为准
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.positional.extend(other.positional.iter().cloned());
        for (name, arg) in &other.named {
            merged.named.insert(name.clone(), arg.clone());
        }
        merged
    }

    /// 对每个参数求值，得到调用参数
    pub fn evaluate<F>(&self, mut eval: F) -> DiResult<CallArgs>
    where
        F: FnMut(&Argument) -> DiResult<Value>,
    {
        let mut args = CallArgs::new();
        for arg in &self.positional {
            args.positional.push(eval(arg)?);
        }
        for (name, arg) in &self.named {
            args.named.insert(name.clone(), eval(arg)?);
        }
        Ok(args)
    }
}

/// 构造后绑定
#[derive(Debug, Clone)]
pub enum Binding {
    /// 设置属性或调用方法
    Member {
        /// 属性名或方法名
        name: String,
        /// 绑定值
        value: Argument,
    },
    /// 额外代码：值为可调用体时以新实例为参数调用
    Extra(Argument),
}

/// 装饰器：接收原服务值与容器，返回新的服务值
#[derive(Clone)]
pub struct Decorator {
    name: String,
    func: Arc<dyn Fn(Value, &dyn ServiceLocator) -> DiResult<Value> + Send + Sync>,
}

impl Decorator {
    /// 包装闭包
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value, &dyn ServiceLocator) -> DiResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// 名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 应用装饰
    pub fn apply(&self, value: Value, locator: &dyn ServiceLocator) -> DiResult<Value> {
        (self.func)(value, locator)
    }
}

impl fmt::Debug for Decorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorator").field("name", &self.name).finish_non_exhaustive()
    }
}

/// 服务定义
#[derive(Debug, Clone)]
pub struct Definition {
    id: Option<String>,
    entity: Entity,
    arguments: Arguments,
    bindings: Vec<Binding>,
    flags: DefinitionFlags,
    types: Vec<String>,
    deprecation: Option<Deprecation>,
    decorators: Vec<Decorator>,
}

impl Definition {
    /// 以实体创建定义
    pub fn new(entity: Entity) -> Self {
        Self {
            id: None,
            entity,
            arguments: Arguments::new(),
            bindings: Vec::new(),
            flags: DefinitionFlags::empty(),
            types: Vec::new(),
            deprecation: None,
            decorators: Vec::new(),
        }
    }

    /// 按类名实例化
    pub fn of_type(class: impl Into<String>) -> Self {
        Self::new(Entity::Type(class.into()))
    }

    /// 原样值
    pub fn value(value: impl Into<Value>) -> Self {
        Self::new(Entity::Value(value.into()))
    }

    /// 闭包工厂
    pub fn invocable(invocable: Invocable) -> Self {
        Self::new(Entity::Invocable(invocable))
    }

    /// 延迟语句
    pub fn statement(statement: Statement) -> Self {
        Self::new(Entity::Statement(statement))
    }

    /// 绑定 id，仅第一次生效
    pub(crate) fn attach(&mut self, id: &str) -> bool {
        match &self.id {
            Some(existing) if existing != id => {
                warn!("定义已绑定到 {}, 忽略重新绑定到 {}", existing, id);
                false
            }
            Some(_) => true,
            None => {
                self.id = Some(id.to_string());
                if let Some(deprecation) = &mut self.deprecation {
                    if deprecation.message.is_empty() {
                        deprecation.message = default_message(id);
                    }
                }
                true
            }
        }
    }

    /// 条件成立时替换实体
    #[must_use]
    pub fn replace(mut self, entity: Entity, condition: bool) -> Self {
        if condition {
            self.entity = entity;
        }
        self
    }

    /// 替换全部参数
    #[must_use]
    pub fn args(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    /// 追加位置参数
    #[must_use]
    pub fn arg(mut self, arg: impl Into<Argument>) -> Self {
        self.arguments.push(arg);
        self
    }

    /// 替换指定位置的参数
    #[must_use]
    pub fn arg_at(mut self, index: usize, arg: impl Into<Argument>) -> Self {
        self.arguments.set(index, arg);
        self
    }

    /// 设置命名参数
    #[must_use]
    pub fn named_arg(mut self, name: impl Into<String>, arg: impl Into<Argument>) -> Self {
        self.arguments.insert_named(name, arg);
        self
    }

    /// 绑定属性、方法或额外代码
    ///
    /// 同名绑定原位替换，[`EXTRA_BIND`] 每次追加。
    #[must_use]
    pub fn bind(mut self, name: &str, value: impl Into<Argument>) -> Self {
        let value = value.into();

        if name == EXTRA_BIND {
            self.bindings.push(Binding::Extra(value));
            return self;
        }

        let binding = Binding::Member {
            name: name.to_string(),
            value,
        };
        let existing = self
            .bindings
            .iter()
            .position(|bound| matches!(bound, Binding::Member { name: existing, .. } if existing == name));
        match existing {
            Some(index) => self.bindings[index] = binding,
            None => self.bindings.push(binding),
        }
        self
    }

    /// 追加额外代码
    #[must_use]
    pub fn extra(self, value: impl Into<Argument>) -> Self {
        self.bind(EXTRA_BIND, value)
    }

    /// 打开标记
    #[must_use]
    pub fn should(self, flags: DefinitionFlags) -> Self {
        self.with_flags(flags, true)
    }

    /// 打开或关闭标记
    #[must_use]
    pub fn with_flags(mut self, flags: DefinitionFlags, enabled: bool) -> Self {
        self.flags.set(flags, enabled);
        self
    }

    /// 启用自动装配，类型为空时自动推断
    #[must_use]
    pub fn autowire<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.insert(DefinitionFlags::AUTOWIRED);
        self.type_of(types)
    }

    /// 声明类型
    #[must_use]
    pub fn type_of<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// 标记为废弃，未给出提示时使用默认提示
    #[must_use]
    pub fn deprecate(mut self, package: &str, version: &str, message: Option<&str>) -> Self {
        let message = match (message, &self.id) {
            (Some(message), _) => message.to_string(),
            (None, Some(id)) => default_message(id),
            (None, None) => String::new(),
        };
        self.deprecation = Some(Deprecation::new(package, version, message));
        self
    }

    /// 追加装饰器
    pub(crate) fn decorate(&mut self, decorator: Decorator) {
        self.decorators.push(decorator);
    }

    /// 服务 id
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// 构造实体
    pub const fn entity(&self) -> &Entity {
        &self.entity
    }

    /// 构造参数
    pub const fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// 绑定
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// 标记
    pub const fn flags(&self) -> DefinitionFlags {
        self.flags
    }

    /// 是否带有全部指定标记
    pub const fn is(&self, flags: DefinitionFlags) -> bool {
        self.flags.contains(flags)
    }

    /// 是否为原样值定义
    pub const fn is_raw(&self) -> bool {
        matches!(self.entity, Entity::Value(_))
    }

    /// 显式声明的类型
    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// 废弃声明
    pub const fn deprecation(&self) -> Option<&Deprecation> {
        self.deprecation.as_ref()
    }

    /// 装饰器
    pub fn decorators(&self) -> &[Decorator] {
        &self.decorators
    }

    /// 用于自动装配的类型：显式声明优先，否则按实体推断
    pub fn declared_types(&self, catalog: &TypeCatalog) -> Vec<String> {
        if !self.types.is_empty() {
            return self.types.clone();
        }

        match &self.entity {
            Entity::Type(class) => catalog.types_of(class),
            Entity::Invocable(invocable) => invocable.returns().to_vec(),
            Entity::Value(Value::Object(instance)) => catalog.types_of(instance.class()),
            Entity::Statement(statement) => match &statement.callee {
                Callee::Type(class) => catalog.types_of(class),
                Callee::Invocable(invocable) => invocable.returns().to_vec(),
                Callee::Service(_) | Callee::Method { .. } => Vec::new(),
            },
            Entity::Value(_) => Vec::new(),
        }
    }
}

impl From<Entity> for Definition {
    fn from(entity: Entity) -> Self {
        Self::new(entity)
    }
}

impl From<Value> for Definition {
    fn from(value: Value) -> Self {
        Self::value(value)
    }
}

impl From<Invocable> for Definition {
    fn from(invocable: Invocable) -> Self {
        Self::invocable(invocable)
    }
}

impl From<Statement> for Definition {
    fn from(statement: Statement) -> Self {
        Self::statement(statement)
    }
}
