//! 解释执行的容器
//!
//! 首次访问时按定义创建服务并缓存，之后直接返回缓存实例。
//! 解析过程通过 [`LoadingSet`] 检测循环引用，守卫在任何退出路径上都会释放。

use crate::definition::{Argument, Arguments, Binding, Callee, Decorator, Definition, DefinitionFlags, Entity, Statement};
use crate::provider::ServiceProvider;
use crate::registry::ServiceRegistry;
use di_common::{
    CallArgs, ClassSpec, ContainerConfig, DeprecationHandler, DiError, DiResult, LazyService, LoadingSet,
    ResolveOptions, ServiceLocator, TracingDeprecationHandler, TypeCatalog, Value,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// 服务容器
///
/// 克隆得到的是同一个容器的另一个句柄。
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    this: Weak<ContainerInner>,
    registry: RwLock<ServiceRegistry>,
    services: RwLock<IndexMap<String, Value>>,
    loading: LoadingSet,
    deprecations: RwLock<Arc<dyn DeprecationHandler>>,
    config: ContainerConfig,
}

impl Container {
    /// 创建新的容器
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// 使用配置创建容器
    pub fn with_config(config: ContainerConfig) -> Self {
        Self::from_registry(ServiceRegistry::new(), config)
    }

    /// 基于已有注册表创建容器
    pub fn from_registry(registry: ServiceRegistry, config: ContainerConfig) -> Self {
        let inner = Arc::new_cyclic(|this| ContainerInner {
            this: this.clone(),
            registry: RwLock::new(registry),
            services: RwLock::new(IndexMap::new()),
            loading: LoadingSet::new(config.resolver.max_depth),
            deprecations: RwLock::new(Arc::new(TracingDeprecationHandler)),
            config,
        });

        Self { inner }
    }

    /// 替换废弃通知处理器
    #[must_use]
    pub fn with_deprecation_handler(self, handler: Arc<dyn DeprecationHandler>) -> Self {
        *self.inner.deprecations.write() = handler;
        self
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 注册服务
    pub fn set(&self, id: &str, definition: impl Into<Definition>) -> DiResult<()> {
        self.inner.registry.write().set(id, definition)
    }

    /// 注册自动装配的服务，类型为空时自动推断
    pub fn autowire(&self, id: &str, definition: impl Into<Definition>, types: &[&str]) -> DiResult<()> {
        self.inner.registry.write().autowire(id, definition, types)
    }

    /// 修改尚未解析的定义
    pub fn update<F>(&self, id: &str, update: F) -> DiResult<()>
    where
        F: FnOnce(Definition) -> Definition,
    {
        self.inner.registry.write().update(id, update)
    }

    /// 移除服务及其缓存
    pub fn remove(&self, id: &str) -> Option<Definition> {
        self.inner.services.write().shift_remove(id);
        self.inner.registry.write().remove(id)
    }

    /// 登记别名
    pub fn alias(&self, alias: &str, target: &str) -> DiResult<()> {
        self.inner.registry.write().alias(alias, target)
    }

    /// 为一组服务打上一组标签
    pub fn tag(&self, ids: &[&str], tags: &[&str]) {
        let mut registry = self.inner.registry.write();
        for id in ids {
            for tag in tags {
                registry.tag(id, tag, Value::Null);
            }
        }
    }

    /// 打标签并附带属性
    pub fn tag_with(&self, id: &str, tag: &str, attributes: impl Into<Value>) {
        self.inner.registry.write().tag(id, tag, attributes.into());
    }

    /// 扩展尚未解析的服务
    ///
    /// 装饰器在服务创建时以原值和容器为参数调用，返回值替换原值。
    pub fn extend(&self, id: &str, decorator: Decorator) -> DiResult<()> {
        let canonical = self.inner.registry.read().resolve_alias(id).to_string();

        if self.inner.services.read().contains_key(&canonical) {
            return Err(DiError::FrozenConflict { id: canonical });
        }

        self.inner.registry.write().decorate(&canonical, decorator)
    }

    /// 设置参数
    pub fn set_parameter(&self, name: &str, value: impl Into<Value>) {
        self.inner.registry.write().set_parameter(name, value);
    }

    /// 注册服务提供者
    pub fn register(&self, provider: Arc<dyn ServiceProvider>, config: impl Into<Value>) -> DiResult<()> {
        self.inner.registry.write().register_provider(provider, config.into())
    }

    /// 注册类描述
    pub fn register_class(&self, spec: ClassSpec) {
        self.inner.registry.write().register_class(spec);
    }

    /// 排除类型，不再参与按类型解析
    pub fn exclude(&self, type_name: &str) {
        self.inner.registry.write().exclude(type_name);
    }

    /// 服务是否已创建并缓存
    pub fn initialized(&self, id: &str) -> bool {
        let canonical = self.inner.registry.read().resolve_alias(id).to_string();
        self.inner.services.read().contains_key(&canonical)
    }

    /// 读取定义副本
    pub fn definition(&self, id: &str) -> Option<Definition> {
        let registry = self.inner.registry.read();
        registry.definition(registry.resolve_alias(id)).cloned()
    }

    /// 注册表快照
    pub fn registry(&self) -> ServiceRegistry {
        self.inner.registry.read().clone()
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
            .field("registry", &*self.inner.registry.read())
            .field("services", &self.inner.services.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ServiceLocator for Container {
    fn get_with(&self, id: &str, options: ResolveOptions) -> DiResult<Value> {
        self.inner.get_with(id, options)
    }

    fn has(&self, id: &str) -> bool {
        self.inner.has(id)
    }

    fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    fn parameter(&self, name: &str) -> DiResult<Value> {
        self.inner.parameter(name)
    }

    fn tagged(&self, tag: &str) -> DiResult<Vec<(Value, Value)>> {
        self.inner.tagged(tag)
    }

    fn reset(&self) {
        self.inner.reset();
    }

    fn resolve_reference(&self, id: &str) -> DiResult<Value> {
        self.inner.resolve_reference(id)
    }
}

impl ContainerInner {
    fn catalog(&self) -> Arc<TypeCatalog> {
        self.registry.read().catalog()
    }

    /// 解析 id：别名 → 定义 → 类型索引
    fn resolve(&self, id: &str, options: ResolveOptions, public: bool) -> DiResult<Value> {
        let (canonical, flags) = {
            let registry = self.registry.read();
            let canonical = registry.resolve_alias(id).to_string();
            let flags = registry.definition(&canonical).map(Definition::flags);
            (canonical, flags)
        };

        match flags {
            Some(flags) if public && flags.contains(DefinitionFlags::PRIVATE) => Err(DiError::not_found(id)),
            Some(flags) => self.resolve_definition(&canonical, flags, options),
            None => self.resolve_type(&canonical, options),
        }
    }

    fn resolve_type(&self, type_name: &str, options: ResolveOptions) -> DiResult<Value> {
        let candidates = self.registry.read().candidates(type_name);
        debug!("按类型解析: {} -> {:?}", type_name, candidates);

        match candidates.as_slice() {
            [] => Err(DiError::not_found(type_name)),
            [id] => self.resolve(id, options, false),
            ids if options.ignore_ambiguity => ids
                .iter()
                .map(|id| self.resolve(id, options, false))
                .collect::<DiResult<Vec<_>>>()
                .map(Value::List),
            ids => Err(DiError::AmbiguousType {
                type_name: type_name.to_string(),
                ids: ids.to_vec(),
            }),
        }
    }

    fn resolve_definition(&self, id: &str, flags: DefinitionFlags, options: ResolveOptions) -> DiResult<Value> {
        let shared = !flags.contains(DefinitionFlags::FACTORY);

        if shared {
            let cached = self.services.read().get(id).cloned();
            if let Some(service) = cached {
                debug!("命中缓存: {}", id);
                return Ok(service);
            }
        }

        let definition = self
            .registry
            .read()
            .definition(id)
            .cloned()
            .ok_or_else(|| DiError::not_found(id))?;

        let _guard = self.loading.enter(id)?;
        debug!("创建服务: {}", id);
        let service = self.create(id, &definition)?;

        if let Some(deprecation) = definition.deprecation() {
            let handler = Arc::clone(&*self.deprecations.read());
            handler.notify(id, deprecation);
        }

        if shared && !options.ignore_freezing {
            self.services.write().insert(id.to_string(), service.clone());
            self.registry.write().freeze(id);
        }

        Ok(service)
    }

    fn create(&self, id: &str, definition: &Definition) -> DiResult<Value> {
        let catalog = self.catalog();

        let mut service = match definition.entity() {
            Entity::Value(value) => value.clone(),
            Entity::Type(class) => {
                let args = self.evaluate_arguments(id, definition.arguments())?;
                catalog.instantiate(id, class, args)?
            }
            Entity::Invocable(invocable) => {
                let args = self.evaluate_arguments(id, definition.arguments())?;
                invocable.invoke(self, args)?
            }
            Entity::Statement(statement) => self.run_statement(id, statement, definition.arguments())?,
        };

        for binding in definition.bindings() {
            self.apply_binding(id, &catalog, &service, binding)?;
        }

        for decorator in definition.decorators() {
            service = decorator.apply(service, self)?;
        }

        Ok(service)
    }

    fn run_statement(&self, id: &str, statement: &Statement, extra: &Arguments) -> DiResult<Value> {
        let args = if extra.is_empty() {
            self.evaluate_arguments(id, &statement.args)?
        } else {
            self.evaluate_arguments(id, &statement.args.merged(extra))?
        };

        match &statement.callee {
            Callee::Invocable(invocable) => invocable.invoke(self, args),
            Callee::Type(class) => self.catalog().instantiate(id, class, args),
            Callee::Service(service) => match self.resolve(service, ResolveOptions::default(), false)? {
                Value::Callable(callable) => callable.invoke(self, args),
                value if args.is_empty() => Ok(value),
                _ => Err(DiError::invalid_entity(id, format!("服务 {service} 不可调用"))),
            },
            Callee::Method { service, method } => {
                let target = self.resolve(service, ResolveOptions::default(), false)?;
                let instance = target
                    .as_object()
                    .ok_or_else(|| DiError::invalid_entity(id, format!("服务 {service} 不是对象")))?;
                self.catalog().call_method(id, instance, method, args)
            }
        }
    }

    fn apply_binding(&self, id: &str, catalog: &TypeCatalog, service: &Value, binding: &Binding) -> DiResult<()> {
        match binding {
            Binding::Member { name, value } => {
                let instance = service
                    .as_object()
                    .ok_or_else(|| DiError::invalid_entity(id, format!("无法在非对象服务上绑定 {name}")))?;
                let value = self.evaluate(id, value)?;
                catalog.apply_member(instance, name, value)
            }
            Binding::Extra(code) => {
                if let Value::Callable(callable) = self.evaluate(id, code)? {
                    callable.invoke(self, CallArgs::positional(vec![service.clone()]))?;
                }
                Ok(())
            }
        }
    }

    fn evaluate_arguments(&self, id: &str, arguments: &Arguments) -> DiResult<CallArgs> {
        arguments.evaluate(|argument| self.evaluate(id, argument))
    }

    fn evaluate(&self, id: &str, argument: &Argument) -> DiResult<Value> {
        match argument {
            Argument::Value(value) => Ok(value.clone()),
            Argument::Reference(target) => self.reference(target),
            Argument::Parameter(name) => self.registry.read().parameter(name),
            Argument::Collection(type_name) => {
                let ids = self.registry.read().candidates(type_name);
                ids.iter()
                    .map(|candidate| self.reference(candidate))
                    .collect::<DiResult<Vec<_>>>()
                    .map(Value::List)
            }
            Argument::Statement(statement) => self.run_statement(id, statement, &Arguments::new()),
            Argument::List(items) => items
                .iter()
                .map(|item| self.evaluate(id, item))
                .collect::<DiResult<Vec<_>>>()
                .map(Value::List),
        }
    }

    /// 定义间引用：目标为延迟定义时注入延迟句柄，否则立即解析
    fn reference(&self, target: &str) -> DiResult<Value> {
        let lazy = {
            let registry = self.registry.read();
            let canonical = registry.resolve_alias(target);
            let id = if registry.contains(canonical) {
                Some(canonical.to_string())
            } else {
                match registry.candidates(canonical).as_slice() {
                    [only] => Some(only.clone()),
                    _ => None,
                }
            };
            id.filter(|id| {
                registry
                    .definition(id)
                    .is_some_and(|definition| definition.is(DefinitionFlags::LAZY))
            })
        };

        match lazy {
            Some(id) => {
                debug!("注入延迟服务: {}", id);
                let locator: Weak<dyn ServiceLocator> = self.this.clone();
                Ok(Value::Lazy(Arc::new(LazyService::new(id, locator))))
            }
            None => self.resolve(target, ResolveOptions::default(), false),
        }
    }
}

impl ServiceLocator for ContainerInner {
    fn get_with(&self, id: &str, options: ResolveOptions) -> DiResult<Value> {
        self.resolve(id, options, true)
    }

    fn has(&self, id: &str) -> bool {
        self.registry.read().has(id)
    }

    fn keys(&self) -> Vec<String> {
        self.registry.read().keys()
    }

    fn parameter(&self, name: &str) -> DiResult<Value> {
        self.registry.read().parameter(name)
    }

    fn tagged(&self, tag: &str) -> DiResult<Vec<(Value, Value)>> {
        let tagged = self.registry.read().tagged(tag);
        tagged
            .into_iter()
            .map(|(id, attributes)| Ok((self.resolve(&id, ResolveOptions::default(), false)?, attributes)))
            .collect()
    }

    fn reset(&self) {
        let cached = std::mem::take(&mut *self.services.write());
        let catalog = self.catalog();

        for (id, service) in &cached {
            if let Value::Object(instance) = service {
                if catalog.teardown(instance) {
                    debug!("重置服务: {}", id);
                }
            }
        }

        self.registry.write().reset_runtime_state();
        info!("容器已重置, 释放 {} 个服务", cached.len());
    }

    fn resolve_reference(&self, id: &str) -> DiResult<Value> {
        self.resolve(id, ResolveOptions::default(), false)
    }
}
