//! 类型元数据
//!
//! 容器不做运行时反射，类的构造方式、实现的接口、方法与重置能力
//! 都由调用方通过 [`TypeCatalog`] 提前声明。

use crate::errors::{DiError, DiResult};
use crate::value::{CallArgs, Instance, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// 构造函数
pub type Constructor = Arc<dyn Fn(CallArgs) -> DiResult<Instance> + Send + Sync>;

/// 实例方法
pub type Method = Arc<dyn Fn(&Arc<Instance>, CallArgs) -> DiResult<Value> + Send + Sync>;

/// 重置回调
pub type Teardown = Arc<dyn Fn(&Instance) + Send + Sync>;

/// 类描述
#[derive(Clone)]
pub struct ClassSpec {
    name: String,
    is_abstract: bool,
    implements: Vec<String>,
    params: Vec<String>,
    constructor: Option<Constructor>,
    methods: BTreeMap<String, Method>,
    teardown: Option<Teardown>,
}

impl ClassSpec {
    /// 创建类描述
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_abstract: false,
            implements: Vec::new(),
            params: Vec::new(),
            constructor: None,
            methods: BTreeMap::new(),
            teardown: None,
        }
    }

    /// 标记为抽象类型
    #[must_use]
    pub const fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// 声明实现的接口或父类
    #[must_use]
    pub fn implements<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.implements.extend(types.into_iter().map(Into::into));
        self
    }

    /// 声明构造参数名，位置参数按顺序写入同名属性
    #[must_use]
    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = names.into_iter().map(Into::into).collect();
        self
    }

    /// 自定义构造函数
    #[must_use]
    pub fn constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(CallArgs) -> DiResult<Instance> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    /// 声明方法
    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Arc<Instance>, CallArgs) -> DiResult<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// 声明重置能力
    #[must_use]
    pub fn teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn(&Instance) + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(teardown));
        self
    }

    /// 类名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 是否抽象
    pub const fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// 是否声明了方法
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }
}

impl fmt::Debug for ClassSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSpec")
            .field("name", &self.name)
            .field("is_abstract", &self.is_abstract)
            .field("implements", &self.implements)
            .field("params", &self.params)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// 类型目录
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    classes: BTreeMap<String, ClassSpec>,
}

impl TypeCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册类描述，同名覆盖
    pub fn register(&mut self, spec: ClassSpec) {
        self.classes.insert(spec.name.clone(), spec);
    }

    /// 构建时注册
    #[must_use]
    pub fn with_class(mut self, spec: ClassSpec) -> Self {
        self.register(spec);
        self
    }

    /// 查找类描述
    pub fn get(&self, class: &str) -> Option<&ClassSpec> {
        self.classes.get(class)
    }

    /// 类自身及其声明实现的全部类型（按声明顺序，去重）
    pub fn types_of(&self, class: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut types = Vec::new();
        let mut pending = vec![class.to_string()];

        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(spec) = self.classes.get(&current) {
                pending.extend(spec.implements.iter().rev().cloned());
            }
            types.push(current);
        }

        types
    }

    /// 检查类能否以给定数量的位置参数实例化
    pub fn ensure_instantiable(&self, id: &str, class: &str, positional: usize) -> DiResult<()> {
        let spec = self.classes.get(class);

        if spec.is_some_and(ClassSpec::is_abstract) {
            return Err(DiError::invalid_entity(
                id,
                format!("类 {class} 是抽象类型, 无法实例化"),
            ));
        }

        if spec.is_some_and(|spec| spec.constructor.is_some()) {
            return Ok(());
        }

        let accepted = spec.map_or(0, |spec| spec.params.len());
        if positional > accepted {
            let reason = if accepted == 0 {
                format!("无法传递参数, 类 {class} 没有构造函数或构造函数不公开")
            } else {
                format!("类 {class} 最多接受 {accepted} 个位置参数")
            };
            return Err(DiError::invalid_entity(id, reason));
        }

        Ok(())
    }

    /// 实例化类
    pub fn instantiate(&self, id: &str, class: &str, args: CallArgs) -> DiResult<Value> {
        self.ensure_instantiable(id, class, args.positional.len())?;

        let spec = self.classes.get(class);
        if let Some(constructor) = spec.and_then(|spec| spec.constructor.as_ref()) {
            return constructor(args).map(Value::from);
        }

        let params = spec.map(|spec| spec.params.as_slice()).unwrap_or_default();
        let instance = Instance::new(class);
        for (name, value) in params.iter().zip(args.positional) {
            instance.set_property(name.clone(), value);
        }
        for (name, value) in args.named {
            instance.set_property(name, value);
        }

        Ok(Value::from(instance))
    }

    /// 对实例应用绑定：类声明了同名方法则调用，否则写入属性
    ///
    /// 调用方法时列表值展开为位置参数。
    pub fn apply_member(&self, instance: &Arc<Instance>, name: &str, value: Value) -> DiResult<()> {
        let method = self
            .classes
            .get(instance.class())
            .and_then(|spec| spec.methods.get(name));

        match method {
            Some(method) => {
                let args = match value {
                    Value::List(items) => CallArgs::positional(items),
                    Value::Null => CallArgs::new(),
                    other => CallArgs::positional(vec![other]),
                };
                method(instance, args).map(|_| ())
            }
            None => {
                instance.set_property(name, value);
                Ok(())
            }
        }
    }

    /// 调用实例方法
    pub fn call_method(&self, id: &str, instance: &Arc<Instance>, name: &str, args: CallArgs) -> DiResult<Value> {
        let method = self
            .classes
            .get(instance.class())
            .and_then(|spec| spec.methods.get(name))
            .ok_or_else(|| {
                DiError::invalid_entity(id, format!("类 {} 没有方法 {name}", instance.class()))
            })?;

        method(instance, args)
    }

    /// 调用实例的重置能力，返回是否执行
    pub fn teardown(&self, instance: &Instance) -> bool {
        match self.classes.get(instance.class()).and_then(|spec| spec.teardown.as_ref()) {
            Some(teardown) => {
                teardown(instance);
                true
            }
            None => false,
        }
    }
}
