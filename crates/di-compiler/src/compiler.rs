//! 图编译器
//!
//! 按 id 排序后对每个定义编译一次，把定义间引用解析为例程下标。
//! 延迟目标只生成句柄，不在编译期递归，因此循环判定与解释执行一致。
//! 编译是整体性的：任何一个定义失败，整个编译失败。

use crate::program::{BindingOp, CacheTable, CompiledProgram, Expr, ExprArgs, Routine, Visibility};
use di_common::{ContainerConfig, DiError, DiResult, LoadingSet, TypeCatalog};
use di_impl::{
    select_candidates, Argument, Arguments, Binding, Callee, Definition, DefinitionFlags, Entity, ServiceRegistry,
    Statement, TypeIndex,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// 图编译器
///
/// 一次性使用：[`compile`](Self::compile) 消耗编译器本身。
pub struct GraphCompiler<'a> {
    registry: &'a ServiceRegistry,
    container_class: String,
    ids: Vec<String>,
    methods: Vec<String>,
    types: TypeIndex,
    catalog: Arc<TypeCatalog>,
    routines: Vec<Option<Routine>>,
    loading: Arc<LoadingSet>,
}

impl<'a> GraphCompiler<'a> {
    /// 基于注册表创建编译器
    ///
    /// 类型索引按排序后的 id 重新建立，候选顺序与注册顺序无关。
    pub fn new(registry: &'a ServiceRegistry, config: &ContainerConfig) -> Self {
        let ids = registry.sorted_ids();
        let catalog = registry.catalog();

        let mut types = registry.types().clone();
        types.clear();
        for id in &ids {
            if let Some(definition) = registry
                .definition(id)
                .filter(|definition| definition.is(DefinitionFlags::AUTOWIRED))
            {
                types.register(id, definition.declared_types(&catalog));
            }
        }

        Self {
            registry,
            container_class: config.compiler.container_class.clone(),
            methods: method_names(&ids),
            routines: vec![None; ids.len()],
            ids,
            types,
            catalog,
            loading: Arc::new(LoadingSet::new(config.resolver.max_depth)),
        }
    }

    /// 编译全部定义
    pub fn compile(mut self) -> DiResult<CompiledProgram> {
        info!("开始编译容器 {}: {} 个定义", self.container_class, self.ids.len());

        for position in 0..self.ids.len() {
            self.compile_routine(position)?;
        }

        let registry = self.registry;
        let routines: Vec<Routine> = self.routines.into_iter().flatten().collect();

        let methods_map = routines
            .iter()
            .filter(|routine| routine.visibility == Visibility::Public)
            .map(|routine| (routine.id.clone(), routine.method.clone()))
            .collect();

        let types = self
            .types
            .iter()
            .map(|(type_name, ids)| {
                (
                    type_name.clone(),
                    select_candidates(ids, |id| registry.is_private(id)),
                )
            })
            .filter(|(_, ids)| !ids.is_empty())
            .collect();

        let aliases = registry
            .aliases()
            .flatten()
            .into_iter()
            .filter(|(_, target)| !registry.is_private(target))
            .collect();

        let mut tags: BTreeMap<String, BTreeMap<String, _>> = BTreeMap::new();
        for (id, service_tags) in registry.tags() {
            for (tag, attributes) in service_tags {
                tags.entry(tag.clone())
                    .or_default()
                    .insert(id.clone(), attributes.clone());
            }
        }

        let private_services = routines
            .iter()
            .filter(|routine| routine.visibility == Visibility::Private)
            .count();

        info!("编译完成: {} 个例程, {} 个私有服务", routines.len(), private_services);

        Ok(CompiledProgram {
            container_class: self.container_class,
            routines,
            methods_map,
            types,
            aliases,
            parameters: registry.parameters().clone(),
            tags,
            private_services,
        })
    }

    /// 编译单个定义，已编译的直接返回
    fn compile_routine(&mut self, position: usize) -> DiResult<usize> {
        if self.routines[position].is_some() {
            return Ok(position);
        }

        let registry = self.registry;
        let id = self.ids[position].clone();
        let definition = registry.definition(&id).ok_or_else(|| DiError::not_found(&id))?;

        let loading = Arc::clone(&self.loading);
        let _guard = loading.enter(&id)?;
        debug!("编译服务: {}", id);

        let routine = self
            .build_routine(position, &id, definition)
            .map_err(|error| error.within_compilation(&id))?;
        self.routines[position] = Some(routine);
        Ok(position)
    }

    fn build_routine(&mut self, position: usize, id: &str, definition: &Definition) -> DiResult<Routine> {
        let body = match definition.entity() {
            Entity::Value(value) => Expr::Literal { value: value.clone() },
            Entity::Type(class) => {
                let args = self.compile_arguments(id, definition.arguments())?;
                self.catalog.ensure_instantiable(id, class, args.positional.len())?;
                Expr::New {
                    class: class.clone(),
                    args,
                }
            }
            Entity::Invocable(invocable) => Expr::Invoke {
                callable: invocable.clone(),
                args: self.compile_arguments(id, definition.arguments())?,
            },
            Entity::Statement(statement) => self.compile_statement(id, statement, definition.arguments())?,
        };

        let bindings = definition
            .bindings()
            .iter()
            .map(|binding| self.compile_binding(id, binding))
            .collect::<DiResult<Vec<_>>>()?;

        let private = definition.is(DefinitionFlags::PRIVATE);
        let cache = match (definition.is(DefinitionFlags::FACTORY), private) {
            (true, _) => None,
            (false, true) => Some(CacheTable::Privates),
            (false, false) => Some(CacheTable::Services),
        };

        Ok(Routine {
            id: id.to_string(),
            method: self.methods[position].clone(),
            visibility: if private { Visibility::Private } else { Visibility::Public },
            cache,
            lazy: definition.is(DefinitionFlags::LAZY),
            return_types: definition.declared_types(&self.catalog),
            deprecation: definition.deprecation().cloned(),
            body,
            bindings,
            decorators: definition.decorators().to_vec(),
        })
    }

    fn compile_binding(&mut self, id: &str, binding: &Binding) -> DiResult<BindingOp> {
        Ok(match binding {
            Binding::Member { name, value } => BindingOp::Member {
                name: name.clone(),
                value: self.compile_argument(id, value)?,
            },
            Binding::Extra(code) => BindingOp::Extra {
                code: self.compile_argument(id, code)?,
            },
        })
    }

    fn compile_statement(&mut self, id: &str, statement: &Statement, extra: &Arguments) -> DiResult<Expr> {
        let args = if extra.is_empty() {
            self.compile_arguments(id, &statement.args)?
        } else {
            self.compile_arguments(id, &statement.args.merged(extra))?
        };

        Ok(match &statement.callee {
            Callee::Invocable(invocable) => Expr::Invoke {
                callable: invocable.clone(),
                args,
            },
            Callee::Type(class) => {
                self.catalog.ensure_instantiable(id, class, args.positional.len())?;
                Expr::New {
                    class: class.clone(),
                    args,
                }
            }
            Callee::Service(service) => Expr::CallService {
                service: Box::new(self.eager_reference(service)?),
                args,
            },
            Callee::Method { service, method } => Expr::CallMethod {
                service: Box::new(self.eager_reference(service)?),
                method: method.clone(),
                args,
            },
        })
    }

    fn compile_arguments(&mut self, id: &str, arguments: &Arguments) -> DiResult<ExprArgs> {
        let mut args = ExprArgs::default();
        for argument in arguments.positional() {
            args.positional.push(self.compile_argument(id, argument)?);
        }
        for (name, argument) in arguments.named() {
            args.named.push((name.clone(), self.compile_argument(id, argument)?));
        }
        Ok(args)
    }

    fn compile_argument(&mut self, id: &str, argument: &Argument) -> DiResult<Expr> {
        match argument {
            Argument::Value(value) => Ok(Expr::Literal { value: value.clone() }),
            Argument::Reference(target) => self.reference(target),
            Argument::Parameter(name) => {
                self.registry.parameter(name)?;
                Ok(Expr::Parameter { name: name.clone() })
            }
            Argument::Collection(type_name) => {
                let ids = self.candidates(type_name);
                let items = ids
                    .iter()
                    .map(|candidate| self.reference(candidate))
                    .collect::<DiResult<Vec<_>>>()?;
                Ok(Expr::List { items })
            }
            Argument::Statement(statement) => self.compile_statement(id, statement, &Arguments::new()),
            Argument::List(items) => Ok(Expr::List {
                items: items
                    .iter()
                    .map(|item| self.compile_argument(id, item))
                    .collect::<DiResult<Vec<_>>>()?,
            }),
        }
    }

    /// 定义间引用：目标为延迟定义时只生成句柄
    fn reference(&mut self, target: &str) -> DiResult<Expr> {
        let id = self.target_of(target)?;
        let position = self.position(&id)?;

        let lazy = self
            .registry
            .definition(&id)
            .is_some_and(|definition| definition.is(DefinitionFlags::LAZY));
        if lazy {
            debug!("延迟引用: {}", id);
            return Ok(Expr::Lazy { id, routine: position });
        }

        self.compile_routine(position)?;
        Ok(Expr::Service { id, routine: position })
    }

    /// 语句调用目标总是立即解析
    fn eager_reference(&mut self, target: &str) -> DiResult<Expr> {
        let id = self.target_of(target)?;
        let position = self.compile_routine(self.position(&id)?)?;
        Ok(Expr::Service { id, routine: position })
    }

    /// 别名 → 定义 → 类型索引
    fn target_of(&self, target: &str) -> DiResult<String> {
        let canonical = self.registry.resolve_alias(target);
        if self.registry.contains(canonical) {
            return Ok(canonical.to_string());
        }

        match self.candidates(canonical).as_slice() {
            [] => Err(DiError::not_found(canonical)),
            [only] => Ok(only.clone()),
            ids => Err(DiError::AmbiguousType {
                type_name: canonical.to_string(),
                ids: ids.to_vec(),
            }),
        }
    }

    fn candidates(&self, type_name: &str) -> Vec<String> {
        select_candidates(self.types.lookup(type_name), |id| self.registry.is_private(id))
    }

    fn position(&self, id: &str) -> DiResult<usize> {
        self.ids
            .binary_search_by(|candidate| candidate.as_str().cmp(id))
            .map_err(|_| DiError::not_found(id))
    }
}

/// 为排序后的 id 生成互不相同的方法名
fn method_names(ids: &[String]) -> Vec<String> {
    let mut used = BTreeSet::new();

    ids.iter()
        .map(|id| {
            let base = format!("get_{}", sanitize(id));
            let mut name = base.clone();
            let mut suffix = 2;
            while !used.insert(name.clone()) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }
            name
        })
        .collect()
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
