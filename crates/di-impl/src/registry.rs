//! 服务注册表
//!
//! 保存定义、别名、类型索引、标签与参数。解释执行的容器和图编译器
//! 读取的是同一种注册状态。

use crate::alias::AliasTable;
use crate::definition::{Decorator, Definition, DefinitionFlags};
use crate::provider::ServiceProvider;
use crate::type_index::{select_candidates, TypeIndex};
use di_common::{ClassSpec, DiError, DiResult, TypeCatalog, Value};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 服务注册表
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    definitions: IndexMap<String, Definition>,
    aliases: AliasTable,
    types: TypeIndex,
    tags: IndexMap<String, IndexMap<String, Value>>,
    parameters: BTreeMap<String, Value>,
    catalog: Arc<TypeCatalog>,
    providers: Vec<Arc<dyn ServiceProvider>>,
    frozen: BTreeSet<String>,
}

impl ServiceRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用类型目录创建
    pub fn with_catalog(catalog: TypeCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            ..Self::default()
        }
    }

    /// 注册定义，同 id 替换
    ///
    /// 已冻结的 id 返回 [`DiError::FrozenConflict`]。同名别名会被移除。
    pub fn set(&mut self, id: &str, definition: impl Into<Definition>) -> DiResult<()> {
        self.ensure_not_frozen(id)?;

        let mut definition = definition.into();
        definition.attach(id);
        self.aliases.remove(id);
        self.index_types(id, &definition);

        info!("注册服务: {}", id);
        self.definitions.insert(id.to_string(), definition);
        Ok(())
    }

    /// 注册自动装配的定义，类型为空时自动推断
    pub fn autowire(&mut self, id: &str, definition: impl Into<Definition>, types: &[&str]) -> DiResult<()> {
        let definition = definition.into().autowire(types.iter().copied());
        self.set(id, definition)
    }

    /// 修改已注册的定义
    pub fn update<F>(&mut self, id: &str, update: F) -> DiResult<()>
    where
        F: FnOnce(Definition) -> Definition,
    {
        self.ensure_not_frozen(id)?;

        let definition = self
            .definitions
            .get(id)
            .cloned()
            .ok_or_else(|| DiError::not_found(id))?;
        let mut definition = update(definition);
        definition.attach(id);
        self.index_types(id, &definition);
        self.definitions.insert(id.to_string(), definition);
        Ok(())
    }

    /// 追加装饰器
    pub fn decorate(&mut self, id: &str, decorator: Decorator) -> DiResult<()> {
        self.ensure_not_frozen(id)?;

        let definition = self
            .definitions
            .get_mut(id)
            .ok_or_else(|| DiError::not_found(id))?;
        debug!("扩展服务: {} ({})", id, decorator.name());
        definition.decorate(decorator);
        Ok(())
    }

    /// 移除定义及其类型、标签和指向它的别名
    pub fn remove(&mut self, id: &str) -> Option<Definition> {
        let removed = self.definitions.shift_remove(id);
        self.types.remove(id);
        self.tags.shift_remove(id);
        self.aliases.remove(id);
        self.aliases.remove_targeting(id);
        self.frozen.remove(id);
        removed
    }

    /// 登记别名，目标需为已知的服务、别名或类型
    pub fn alias(&mut self, alias: &str, target: &str) -> DiResult<()> {
        if alias == target {
            return Err(DiError::AliasToItself {
                id: alias.to_string(),
            });
        }

        let resolved = self.aliases.resolve(target);
        if !self.definitions.contains_key(resolved) && !self.types.contains(resolved) {
            return Err(DiError::not_found(target));
        }

        self.aliases.insert(alias, target)
    }

    /// 传递解析别名
    pub fn resolve_alias<'a>(&'a self, id: &'a str) -> &'a str {
        self.aliases.resolve(id)
    }

    /// 别名表
    pub const fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// 为服务打标签
    pub fn tag(&mut self, id: &str, tag: &str, attributes: Value) {
        self.tags
            .entry(id.to_string())
            .or_default()
            .insert(tag.to_string(), attributes);
    }

    /// 带有指定标签的服务 id 与标签属性，按打标签顺序
    pub fn tagged(&self, tag: &str) -> Vec<(String, Value)> {
        self.tags
            .iter()
            .filter_map(|(id, tags)| tags.get(tag).map(|attributes| (id.clone(), attributes.clone())))
            .collect()
    }

    /// 全部标签
    pub const fn tags(&self) -> &IndexMap<String, IndexMap<String, Value>> {
        &self.tags
    }

    /// 查找定义
    pub fn definition(&self, id: &str) -> Option<&Definition> {
        self.definitions.get(id)
    }

    /// 遍历全部定义（注册顺序）
    pub fn definitions(&self) -> impl Iterator<Item = (&String, &Definition)> {
        self.definitions.iter()
    }

    /// 是否注册了定义
    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// 是否为私有定义
    pub fn is_private(&self, id: &str) -> bool {
        self.definitions
            .get(id)
            .is_some_and(|definition| definition.is(DefinitionFlags::PRIVATE))
    }

    /// 公开服务 id（注册顺序）
    pub fn keys(&self) -> Vec<String> {
        self.definitions
            .iter()
            .filter(|(_, definition)| !definition.is(DefinitionFlags::PRIVATE))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// 排序后的全部 id
    pub fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.definitions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 是否能公开解析该 id、别名或类型
    pub fn has(&self, id: &str) -> bool {
        let id = self.resolve_alias(id);
        match self.definitions.get(id) {
            Some(definition) => !definition.is(DefinitionFlags::PRIVATE),
            None => !self.candidates(id).is_empty(),
        }
    }

    /// 类型的候选服务，多个候选时隐藏私有服务
    pub fn candidates(&self, type_name: &str) -> Vec<String> {
        select_candidates(self.types.lookup(type_name), |id| self.is_private(id))
    }

    /// 类型索引
    pub const fn types(&self) -> &TypeIndex {
        &self.types
    }

    /// 排除类型
    pub fn exclude(&mut self, type_name: &str) {
        self.types.exclude(type_name);
    }

    /// 类型目录
    pub fn catalog(&self) -> Arc<TypeCatalog> {
        Arc::clone(&self.catalog)
    }

    /// 注册类描述并重建类型索引
    pub fn register_class(&mut self, spec: ClassSpec) {
        debug!("注册类型描述: {}", spec.name());
        Arc::make_mut(&mut self.catalog).register(spec);
        self.reindex();
    }

    /// 按注册顺序重建类型索引
    pub fn reindex(&mut self) {
        self.types.clear();
        let catalog = Arc::clone(&self.catalog);
        for (id, definition) in &self.definitions {
            if definition.is(DefinitionFlags::AUTOWIRED) {
                self.types.register(id, definition.declared_types(&catalog));
            }
        }
    }

    /// 设置参数
    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) {
        self.parameters.insert(name.to_string(), value.into());
    }

    /// 读取参数
    pub fn parameter(&self, name: &str) -> DiResult<Value> {
        self.parameters
            .get(name)
            .cloned()
            .ok_or_else(|| DiError::ParameterNotFound {
                name: name.to_string(),
            })
    }

    /// 全部参数
    pub const fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    /// 注册服务提供者
    ///
    /// 非空配置保存为 `<name>.config` 服务与同名参数，然后调用提供者注册服务。
    pub fn register_provider(&mut self, provider: Arc<dyn ServiceProvider>, config: Value) -> DiResult<()> {
        let name = provider.name().to_string();

        if !is_empty_config(&config) {
            self.set(&format!("{name}.config"), Definition::value(config.clone()))?;
            self.parameters.insert(name.clone(), config.clone());
        }

        provider.register(self, &config)?;
        info!("注册服务提供者: {}", name);
        self.providers.push(provider);
        Ok(())
    }

    /// 已注册的服务提供者
    pub fn providers(&self) -> &[Arc<dyn ServiceProvider>] {
        &self.providers
    }

    /// 依次执行提供者的编译前钩子
    pub fn run_before_compile(&mut self) -> DiResult<()> {
        let providers = self.providers.clone();
        for provider in providers {
            debug!("执行编译前钩子: {}", provider.name());
            provider.before_compile(self)?;
        }
        Ok(())
    }

    /// 冻结 id
    pub fn freeze(&mut self, id: &str) {
        self.frozen.insert(id.to_string());
    }

    /// 是否已冻结
    pub fn is_frozen(&self, id: &str) -> bool {
        self.frozen.contains(id)
    }

    /// 清除冻结与标签，定义和登记的别名保持不变
    pub fn reset_runtime_state(&mut self) {
        self.frozen.clear();
        self.tags.clear();
    }

    fn ensure_not_frozen(&self, id: &str) -> DiResult<()> {
        if self.frozen.contains(id) {
            return Err(DiError::FrozenConflict { id: id.to_string() });
        }
        Ok(())
    }

    fn index_types(&mut self, id: &str, definition: &Definition) {
        if definition.is(DefinitionFlags::AUTOWIRED) {
            self.types.register(id, definition.declared_types(&self.catalog));
        } else {
            self.types.remove(id);
        }
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .field("types", &self.types)
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .field(
                "providers",
                &self.providers.iter().map(|provider| provider.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

fn is_empty_config(config: &Value) -> bool {
    match config {
        Value::Null => true,
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        _ => false,
    }
}
