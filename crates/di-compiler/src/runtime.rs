//! 编译后容器的运行时
//!
//! 按例程下标直接分派，不再查询定义或类型索引。公开服务与私有服务
//! 分别缓存在两张表中，缓存命中时不进入加载集合。

use crate::program::{BindingOp, CacheTable, CompiledProgram, Expr, ExprArgs, Routine};
use di_common::{
    CallArgs, ContainerConfig, DeprecationHandler, DiError, DiResult, LazyService, LoadingSet, ResolveOptions,
    ServiceLocator, TracingDeprecationHandler, TypeCatalog, Value,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// 编译后的容器
///
/// 克隆得到的是同一个容器的另一个句柄。
#[derive(Clone)]
pub struct CompiledContainer {
    inner: Arc<CompiledInner>,
}

struct CompiledInner {
    this: Weak<CompiledInner>,
    program: CompiledProgram,
    catalog: Arc<TypeCatalog>,
    services: RwLock<BTreeMap<String, Value>>,
    privates: RwLock<BTreeMap<String, Value>>,
    tags: RwLock<BTreeMap<String, BTreeMap<String, Value>>>,
    loading: LoadingSet,
    deprecations: RwLock<Arc<dyn DeprecationHandler>>,
}

impl CompiledContainer {
    /// 加载编译产物
    pub fn new(program: CompiledProgram, catalog: Arc<TypeCatalog>, config: &ContainerConfig) -> Self {
        info!(
            "加载编译容器 {}: {} 个例程",
            program.container_class,
            program.routines.len()
        );

        let inner = Arc::new_cyclic(|this| CompiledInner {
            this: this.clone(),
            catalog,
            services: RwLock::new(BTreeMap::new()),
            privates: RwLock::new(BTreeMap::new()),
            tags: RwLock::new(program.tags.clone()),
            loading: LoadingSet::new(config.resolver.max_depth),
            deprecations: RwLock::new(Arc::new(TracingDeprecationHandler)),
            program,
        });

        Self { inner }
    }

    /// 替换废弃通知处理器
    #[must_use]
    pub fn with_deprecation_handler(self, handler: Arc<dyn DeprecationHandler>) -> Self {
        *self.inner.deprecations.write() = handler;
        self
    }

    /// 编译产物
    pub fn program(&self) -> &CompiledProgram {
        &self.inner.program
    }

    /// 容器类名
    pub fn container_class(&self) -> &str {
        &self.inner.program.container_class
    }

    /// 服务是否已创建并缓存（含私有服务）
    pub fn initialized(&self, id: &str) -> bool {
        let canonical = self.inner.canonical(id);
        self.inner.services.read().contains_key(&canonical) || self.inner.privates.read().contains_key(&canonical)
    }
}

impl fmt::Debug for CompiledContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledContainer")
            .field("container_class", &self.inner.program.container_class)
            .field("routines", &self.inner.program.routines.len())
            .field("services", &self.inner.services.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ServiceLocator for CompiledContainer {
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

impl CompiledInner {
    fn canonical(&self, id: &str) -> String {
        self.program
            .aliases
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn table(&self, table: CacheTable) -> &RwLock<BTreeMap<String, Value>> {
        match table {
            CacheTable::Services => &self.services,
            CacheTable::Privates => &self.privates,
        }
    }

    /// 别名 → 例程 → 类型表，私有例程同样可达
    fn resolve(&self, id: &str, options: ResolveOptions) -> DiResult<Value> {
        let canonical = self.canonical(id);
        match self.program.position(&canonical) {
            Some(position) => self.run(position, options),
            None => self.resolve_type(&canonical, options),
        }
    }

    fn resolve_type(&self, type_name: &str, options: ResolveOptions) -> DiResult<Value> {
        let candidates = self
            .program
            .types
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or_default();

        match candidates {
            [] => Err(DiError::not_found(type_name)),
            [id] => self.resolve(id, options),
            ids if options.ignore_ambiguity => ids
                .iter()
                .map(|id| self.resolve(id, options))
                .collect::<DiResult<Vec<_>>>()
                .map(Value::List),
            ids => Err(DiError::AmbiguousType {
                type_name: type_name.to_string(),
                ids: ids.to_vec(),
            }),
        }
    }

    fn run(&self, position: usize, options: ResolveOptions) -> DiResult<Value> {
        let routine = &self.program.routines[position];

        if let Some(table) = routine.cache {
            let cached = self.table(table).read().get(&routine.id).cloned();
            if let Some(service) = cached {
                return Ok(service);
            }
        }

        let _guard = self.loading.enter(&routine.id)?;
        debug!("执行例程: {}", routine.method);
        let service = self.create(routine)?;

        if let Some(deprecation) = &routine.deprecation {
            let handler = Arc::clone(&*self.deprecations.read());
            handler.notify(&routine.id, deprecation);
        }

        if let Some(table) = routine.cache {
            if !options.ignore_freezing {
                self.table(table).write().insert(routine.id.clone(), service.clone());
            }
        }

        Ok(service)
    }

    fn create(&self, routine: &Routine) -> DiResult<Value> {
        let id = routine.id.as_str();
        let mut service = self.eval(id, &routine.body)?;

        for op in &routine.bindings {
            self.apply_binding(id, &service, op)?;
        }

        for decorator in &routine.decorators {
            service = decorator.apply(service, self)?;
        }

        Ok(service)
    }

    fn apply_binding(&self, id: &str, service: &Value, op: &BindingOp) -> DiResult<()> {
        match op {
            BindingOp::Member { name, value } => {
                let instance = service
                    .as_object()
                    .ok_or_else(|| DiError::invalid_entity(id, format!("无法在非对象服务上绑定 {name}")))?;
                let value = self.eval(id, value)?;
                self.catalog.apply_member(instance, name, value)
            }
            BindingOp::Extra { code } => {
                if let Value::Callable(callable) = self.eval(id, code)? {
                    callable.invoke(self, CallArgs::positional(vec![service.clone()]))?;
                }
                Ok(())
            }
        }
    }

    fn eval_args(&self, id: &str, args: &ExprArgs) -> DiResult<CallArgs> {
        let mut call = CallArgs::new();
        for expr in &args.positional {
            call.positional.push(self.eval(id, expr)?);
        }
        for (name, expr) in &args.named {
            call.named.insert(name.clone(), self.eval(id, expr)?);
        }
        Ok(call)
    }

    fn eval(&self, id: &str, expr: &Expr) -> DiResult<Value> {
        match expr {
            Expr::Literal { value } => Ok(value.clone()),
            Expr::New { class, args } => {
                let args = self.eval_args(id, args)?;
                self.catalog.instantiate(id, class, args)
            }
            Expr::Invoke { callable, args } => {
                let args = self.eval_args(id, args)?;
                callable.invoke(self, args)
            }
            Expr::CallService { service, args } => {
                let args = self.eval_args(id, args)?;
                match self.eval(id, service)? {
                    Value::Callable(callable) => callable.invoke(self, args),
                    value if args.is_empty() => Ok(value),
                    _ => Err(DiError::invalid_entity(
                        id,
                        format!("服务 {} 不可调用", callee_name(service)),
                    )),
                }
            }
            Expr::CallMethod { service, method, args } => {
                let args = self.eval_args(id, args)?;
                let target = self.eval(id, service)?;
                let instance = target.as_object().ok_or_else(|| {
                    DiError::invalid_entity(id, format!("服务 {} 不是对象", callee_name(service)))
                })?;
                self.catalog.call_method(id, instance, method, args)
            }
            Expr::Service { routine, .. } => self.run(*routine, ResolveOptions::default()),
            Expr::Lazy { id: target, .. } => {
                let locator: Weak<dyn ServiceLocator> = self.this.clone();
                Ok(Value::Lazy(Arc::new(LazyService::new(target.clone(), locator))))
            }
            Expr::Parameter { name } => self.parameter(name),
            Expr::List { items } => items
                .iter()
                .map(|item| self.eval(id, item))
                .collect::<DiResult<Vec<_>>>()
                .map(Value::List),
        }
    }
}

fn callee_name(expr: &Expr) -> &str {
    match expr {
        Expr::Service { id, .. } | Expr::Lazy { id, .. } => id.as_str(),
        _ => "",
    }
}

impl ServiceLocator for CompiledInner {
    fn get_with(&self, id: &str, options: ResolveOptions) -> DiResult<Value> {
        let canonical = self.canonical(id);

        if self.program.methods_map.contains_key(&canonical) {
            return self.resolve(&canonical, options);
        }
        if self.program.position(&canonical).is_some() {
            return Err(DiError::not_found(id));
        }

        self.resolve_type(&canonical, options)
    }

    fn has(&self, id: &str) -> bool {
        let canonical = self.canonical(id);
        match self.program.routine(&canonical) {
            Some(_) => self.program.methods_map.contains_key(&canonical),
            None => self
                .program
                .types
                .get(&canonical)
                .is_some_and(|ids| !ids.is_empty()),
        }
    }

    fn keys(&self) -> Vec<String> {
        self.program.methods_map.keys().cloned().collect()
    }

    fn parameter(&self, name: &str) -> DiResult<Value> {
        self.program
            .parameters
            .get(name)
            .cloned()
            .ok_or_else(|| DiError::ParameterNotFound {
                name: name.to_string(),
            })
    }

    fn tagged(&self, tag: &str) -> DiResult<Vec<(Value, Value)>> {
        let tagged = self.tags.read().get(tag).cloned().unwrap_or_default();
        tagged
            .into_iter()
            .map(|(id, attributes)| Ok((self.resolve(&id, ResolveOptions::default())?, attributes)))
            .collect()
    }

    fn reset(&self) {
        let services = std::mem::take(&mut *self.services.write());
        let privates = std::mem::take(&mut *self.privates.write());

        for (id, service) in services.iter().chain(privates.iter()) {
            if let Value::Object(instance) = service {
                if self.catalog.teardown(instance) {
                    debug!("重置服务: {}", id);
                }
            }
        }

        self.tags.write().clear();
        info!("编译容器已重置, 释放 {} 个服务", services.len() + privates.len());
    }

    fn resolve_reference(&self, id: &str) -> DiResult<Value> {
        self.resolve(id, ResolveOptions::default())
    }
}
