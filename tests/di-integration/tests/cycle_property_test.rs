//! 循环判定的性质测试
//!
//! 随机生成引用图（构造参数、命名参数、绑定、嵌套语句、语句调用目标），
//! 随机标记延迟定义，断言编译器与解释执行的容器对循环的判定一致。

use di_common::{CallArgs, ClassSpec, ContainerConfig, DiError, Instance, Invocable, ServiceLocator, TypeCatalog, Value};
use di_compiler::ContainerBuilder;
use di_impl::{Argument, Container, Definition, DefinitionFlags, ServiceRegistry, Statement};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Edge {
    Positional,
    Named,
    Binding,
    Nested,
    Callee,
}

type Node = (bool, Vec<(usize, Edge)>);

fn edge() -> impl Strategy<Value = Edge> {
    prop_oneof![
        Just(Edge::Positional),
        Just(Edge::Named),
        Just(Edge::Binding),
        Just(Edge::Nested),
        Just(Edge::Callee),
    ]
}

fn graph() -> impl Strategy<Value = Vec<Node>> {
    (2usize..=6).prop_flat_map(|size| {
        prop::collection::vec(
            (any::<bool>(), prop::collection::vec((0..size, edge()), 0..=3)),
            size,
        )
    })
}

fn id(index: usize) -> String {
    format!("s{index}")
}

fn first_argument() -> Invocable {
    Invocable::new("first", |_, args: CallArgs| Ok(args.get(0).cloned().unwrap_or_default()))
}

fn build_registry(nodes: &[Node]) -> ServiceRegistry {
    let catalog = TypeCatalog::new().with_class(ClassSpec::new("Node").constructor(|args: CallArgs| {
        let node = Instance::new("Node");
        for (name, value) in args.named {
            node.set_property(name, value);
        }
        Ok(node)
    }));
    let mut registry = ServiceRegistry::with_catalog(catalog);

    for (index, (lazy, edges)) in nodes.iter().enumerate() {
        let mut definition = Definition::of_type("Node").with_flags(DefinitionFlags::LAZY, *lazy);

        for (position, (target, kind)) in edges.iter().enumerate() {
            let target = id(*target);
            definition = match kind {
                Edge::Positional => definition.arg(Argument::reference(target)),
                Edge::Named => definition.named_arg(format!("n{position}"), Argument::reference(target)),
                Edge::Binding => definition.bind(&format!("b{position}"), Argument::reference(target)),
                Edge::Nested => definition.named_arg(
                    format!("s{position}"),
                    Statement::call(first_argument()).with_arg(Argument::reference(target)),
                ),
                Edge::Callee => definition.named_arg(format!("c{position}"), Statement::service(target)),
            };
        }

        registry.set(&id(index), definition).unwrap();
    }

    registry
}

/// 按 id 顺序在同一个容器上依次解析，返回第一个失败
fn first_interpreted_failure(registry: &ServiceRegistry) -> Option<DiError> {
    let container = Container::from_registry(registry.clone(), ContainerConfig::default());
    registry
        .sorted_ids()
        .iter()
        .find_map(|service| container.get(service).err())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_compiler_and_interpreter_agree_on_cycles(nodes in graph()) {
        let registry = build_registry(&nodes);

        let interpreted = first_interpreted_failure(&registry);
        let compiled = ContainerBuilder::from_registry(registry.clone(), ContainerConfig::default()).build();

        match (&interpreted, &compiled) {
            (None, Ok(container)) => {
                for service in registry.sorted_ids() {
                    prop_assert!(container.get(&service).is_ok());
                }
            }
            (Some(interpreted), Err(compiled)) => {
                prop_assert!(interpreted.is_circular());
                prop_assert!(compiled.is_circular());
                prop_assert_eq!(interpreted.circular_path(), compiled.circular_path());
            }
            (interpreted, compiled) => {
                prop_assert!(
                    false,
                    "judgements differ: interpreted {:?}, compiled {:?}",
                    interpreted,
                    compiled.as_ref().err()
                );
            }
        }
    }

    #[test]
    fn test_lazy_handles_resolve_to_shared_instances(nodes in graph()) {
        let registry = build_registry(&nodes);
        prop_assume!(first_interpreted_failure(&registry).is_none());

        let container = ContainerBuilder::from_registry(registry.clone(), ContainerConfig::default())
            .build()
            .unwrap();

        for (index, (_, edges)) in nodes.iter().enumerate() {
            let service = container.resolve_reference(&id(index)).unwrap();
            let instance = service.as_object().unwrap();
            for (position, (target, kind)) in edges.iter().enumerate() {
                if matches!(kind, Edge::Named) {
                    let value = instance.property(&format!("n{position}")).unwrap();
                    let expected = container.resolve_reference(&id(*target)).unwrap();
                    prop_assert!(value.resolved().unwrap().same(&expected));
                    prop_assert_eq!(matches!(value, Value::Lazy(_)), nodes[*target].0);
                }
            }
        }
    }
}
