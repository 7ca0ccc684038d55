//! 容器构建器
//!
//! 收集定义，执行服务提供者的编译前钩子，然后交给 [`GraphCompiler`]。

use crate::compiler::GraphCompiler;
use crate::emitter::{Emitter, JsonEmitter};
use crate::program::CompiledProgram;
use crate::runtime::CompiledContainer;
use di_common::{ClassSpec, ContainerConfig, DeprecationHandler, DiResult, TracingDeprecationHandler, Value};
use di_impl::{Decorator, Definition, ServiceProvider, ServiceRegistry};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// 容器构建器
pub struct ContainerBuilder {
    registry: ServiceRegistry,
    config: ContainerConfig,
    deprecations: Arc<dyn DeprecationHandler>,
}

impl ContainerBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// 使用配置创建
    pub fn with_config(config: ContainerConfig) -> Self {
        Self::from_registry(ServiceRegistry::new(), config)
    }

    /// 基于已有注册表创建
    pub fn from_registry(registry: ServiceRegistry, config: ContainerConfig) -> Self {
        Self {
            registry,
            config,
            deprecations: Arc::new(TracingDeprecationHandler),
        }
    }

    /// 编译后容器使用的废弃通知处理器
    #[must_use]
    pub fn with_deprecation_handler(mut self, handler: Arc<dyn DeprecationHandler>) -> Self {
        self.deprecations = handler;
        self
    }

    /// 配置
    pub const fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 注册表
    pub const fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// 可变注册表
    pub fn registry_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.registry
    }

    /// 注册服务
    pub fn set(&mut self, id: &str, definition: impl Into<Definition>) -> DiResult<&mut Self> {
        self.registry.set(id, definition)?;
        Ok(self)
    }

    /// 注册自动装配的服务
    pub fn autowire(&mut self, id: &str, definition: impl Into<Definition>, types: &[&str]) -> DiResult<&mut Self> {
        self.registry.autowire(id, definition, types)?;
        Ok(self)
    }

    /// 修改定义
    pub fn update<F>(&mut self, id: &str, update: F) -> DiResult<&mut Self>
    where
        F: FnOnce(Definition) -> Definition,
    {
        self.registry.update(id, update)?;
        Ok(self)
    }

    /// 移除定义
    pub fn remove(&mut self, id: &str) -> Option<Definition> {
        self.registry.remove(id)
    }

    /// 登记别名
    pub fn alias(&mut self, alias: &str, target: &str) -> DiResult<&mut Self> {
        self.registry.alias(alias, target)?;
        Ok(self)
    }

    /// 打标签
    pub fn tag(&mut self, id: &str, tag: &str, attributes: impl Into<Value>) -> &mut Self {
        self.registry.tag(id, tag, attributes.into());
        self
    }

    /// 追加装饰器
    pub fn extend(&mut self, id: &str, decorator: Decorator) -> DiResult<&mut Self> {
        let canonical = self.registry.resolve_alias(id).to_string();
        self.registry.decorate(&canonical, decorator)?;
        Ok(self)
    }

    /// 设置参数
    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.registry.set_parameter(name, value);
        self
    }

    /// 注册服务提供者
    pub fn register(&mut self, provider: Arc<dyn ServiceProvider>, config: impl Into<Value>) -> DiResult<&mut Self> {
        self.registry.register_provider(provider, config.into())?;
        Ok(self)
    }

    /// 注册类描述
    pub fn register_class(&mut self, spec: ClassSpec) -> &mut Self {
        self.registry.register_class(spec);
        self
    }

    /// 排除类型
    pub fn exclude(&mut self, type_name: &str) -> &mut Self {
        self.registry.exclude(type_name);
        self
    }

    /// 执行编译前钩子并编译
    pub fn compile(&mut self) -> DiResult<CompiledProgram> {
        self.registry.run_before_compile()?;
        GraphCompiler::new(&self.registry, &self.config).compile()
    }

    /// 编译并用指定后端渲染
    pub fn compile_to_string(&mut self, emitter: &dyn Emitter) -> DiResult<String> {
        let program = self.compile()?;
        let output = emitter.emit(&program)?;
        info!("{} 后端输出 {} 字节", emitter.name(), output.len());
        Ok(output)
    }

    /// 编译并按配置渲染为 JSON
    pub fn dump(&mut self) -> DiResult<String> {
        let emitter = JsonEmitter::new(self.config.compiler.pretty);
        self.compile_to_string(&emitter)
    }

    /// 编译并加载为容器
    pub fn build(&mut self) -> DiResult<CompiledContainer> {
        let program = self.compile()?;
        Ok(CompiledContainer::new(program, self.registry.catalog(), &self.config)
            .with_deprecation_handler(Arc::clone(&self.deprecations)))
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
