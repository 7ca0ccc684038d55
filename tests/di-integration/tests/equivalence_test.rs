//! 解释执行与预编译两种容器的行为一致性测试
//!
//! 每个场景用同一份注册表分别构造两种容器，断言结果相同。

use di_common::{
    CallArgs, ClassSpec, ContainerConfig, DeprecationHandler, DeprecationLog, DiError, Instance, Invocable,
    ResolveOptions, ServiceLocator, TypeCatalog, Value,
};
use di_compiler::ContainerBuilder;
use di_impl::{Argument, Container, Decorator, Definition, DefinitionFlags, ServiceProvider, ServiceRegistry, Statement};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Once};
use std::thread;
use std::time::Duration;

static INIT_LOGGER: Once = Once::new();

/// 初始化测试日志系统（只初始化一次）
fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 同一份注册表构造的两种容器
fn engines(registry: &ServiceRegistry) -> Vec<(&'static str, Box<dyn ServiceLocator>)> {
    engines_with(registry, Arc::new(DeprecationLog::new()))
}

fn engines_with(
    registry: &ServiceRegistry,
    handler: Arc<dyn DeprecationHandler>,
) -> Vec<(&'static str, Box<dyn ServiceLocator>)> {
    init_test_logger();
    let config = ContainerConfig::default();

    let interpreted =
        Container::from_registry(registry.clone(), config.clone()).with_deprecation_handler(Arc::clone(&handler));
    let compiled = ContainerBuilder::from_registry(registry.clone(), config)
        .with_deprecation_handler(handler)
        .build()
        .unwrap();

    vec![
        ("interpreted", Box::new(interpreted) as Box<dyn ServiceLocator>),
        ("compiled", Box::new(compiled) as Box<dyn ServiceLocator>),
    ]
}

#[test]
fn test_shared_and_factory_lifetimes() {
    let mut registry = ServiceRegistry::new();
    registry.set("shared", Definition::of_type("Shared")).unwrap();
    registry
        .set("factory", Definition::of_type("Factory").should(DefinitionFlags::FACTORY))
        .unwrap();

    for (engine, container) in engines(&registry) {
        let first = container.get("shared").unwrap();
        assert!(first.same(&container.get("shared").unwrap()), "{engine}");

        let first = container.get("factory").unwrap();
        assert!(!first.same(&container.get("factory").unwrap()), "{engine}");
    }
}

#[test]
fn test_lazy_edge_breaks_mutual_reference() {
    let mut registry = ServiceRegistry::new();
    registry
        .set("a", Definition::of_type("A").named_arg("b", Argument::reference("b")))
        .unwrap();
    registry
        .set(
            "b",
            Definition::of_type("B")
                .named_arg("a", Argument::reference("a"))
                .should(DefinitionFlags::LAZY),
        )
        .unwrap();

    for (engine, container) in engines(&registry) {
        let a = container.get("a").unwrap();
        let handle = a.as_object().unwrap().property("b").unwrap();
        let lazy = handle.as_lazy().unwrap();
        assert!(!lazy.is_initialized(), "{engine}");

        let b = handle.resolved().unwrap();
        let back = b.as_object().unwrap().property("a").unwrap();
        assert!(back.same(&a), "{engine}");
        assert!(b.same(&container.get("b").unwrap()), "{engine}");
    }
}

#[test]
fn test_cycle_through_constructor_arguments() {
    let mut registry = ServiceRegistry::new();
    registry
        .set("a", Definition::of_type("A").named_arg("b", Argument::reference("b")))
        .unwrap();
    registry
        .set("b", Definition::of_type("B").named_arg("a", Argument::reference("a")))
        .unwrap();

    let interpreted = Container::from_registry(registry.clone(), ContainerConfig::default());
    let error = interpreted.get("a").unwrap_err();
    assert_eq!(error.circular_path().unwrap(), ["a", "b", "a"]);

    let error = ContainerBuilder::from_registry(registry, ContainerConfig::default())
        .build()
        .unwrap_err();
    assert_eq!(error.circular_path().unwrap(), ["a", "b", "a"]);
}

#[test]
fn test_aliases_and_private_services() {
    let mut registry = ServiceRegistry::new();
    registry.set("mailer", Definition::value("smtp")).unwrap();
    registry
        .set("transport", Definition::value("tcp").should(DefinitionFlags::PRIVATE))
        .unwrap();
    registry.alias("mail", "mailer").unwrap();
    registry.alias("outbox", "mail").unwrap();
    registry.alias("wire", "transport").unwrap();

    for (engine, container) in engines(&registry) {
        assert_eq!(container.get("outbox").unwrap(), Value::from("smtp"), "{engine}");
        assert!(container.has("outbox"), "{engine}");

        assert!(matches!(container.get("transport"), Err(DiError::NotFound { .. })), "{engine}");
        assert!(matches!(container.get("wire"), Err(DiError::NotFound { .. })), "{engine}");
        assert!(!container.has("transport"), "{engine}");
        assert_eq!(container.resolve_reference("transport").unwrap(), Value::from("tcp"), "{engine}");

        let mut keys = container.keys();
        keys.sort();
        assert_eq!(keys, vec!["mailer"], "{engine}");
    }
}

#[test]
fn test_type_resolution_and_ambiguity() {
    let catalog = TypeCatalog::new()
        .with_class(ClassSpec::new("FileLogger").implements(["Logger"]))
        .with_class(ClassSpec::new("SyslogLogger").implements(["Logger"]))
        .with_class(ClassSpec::new("HttpClient"));
    let mut registry = ServiceRegistry::with_catalog(catalog);
    registry.autowire("file", Definition::of_type("FileLogger"), &[]).unwrap();
    registry.autowire("syslog", Definition::of_type("SyslogLogger"), &[]).unwrap();
    registry.autowire("http", Definition::of_type("HttpClient"), &[]).unwrap();

    for (engine, container) in engines(&registry) {
        let http = container.get("HttpClient").unwrap();
        assert!(http.same(&container.get("http").unwrap()), "{engine}");

        let error = container.get("Logger").unwrap_err();
        assert!(
            matches!(&error, DiError::AmbiguousType { ids, .. } if ids == &["file", "syslog"]),
            "{engine}: {error}"
        );

        let all = container
            .get_with("Logger", ResolveOptions::new().ignore_ambiguity())
            .unwrap();
        assert_eq!(all.as_list().map(<[Value]>::len), Some(2), "{engine}");
        assert!(container.has("Logger"), "{engine}");
        assert!(!container.has("Unknown"), "{engine}");
    }
}

#[test]
fn test_private_sole_candidate_is_resolvable_by_type() {
    let catalog = TypeCatalog::new().with_class(ClassSpec::new("Clock").implements(["TimeSource"]));
    let mut registry = ServiceRegistry::with_catalog(catalog);
    registry
        .autowire("clock", Definition::of_type("Clock").should(DefinitionFlags::PRIVATE), &[])
        .unwrap();

    for (engine, container) in engines(&registry) {
        assert!(container.get("TimeSource").is_ok(), "{engine}");
        assert!(matches!(container.get("clock"), Err(DiError::NotFound { .. })), "{engine}");
    }
}

#[test]
fn test_bindings_statements_and_parameters() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let catalog = TypeCatalog::new().with_class(ClassSpec::new("Router").method("add", |instance, args| {
        let mut routes = instance
            .property("routes")
            .and_then(|routes| routes.as_list().map(<[Value]>::to_vec))
            .unwrap_or_default();
        routes.extend(args.positional);
        instance.set_property("routes", Value::List(routes));
        Ok(Value::Null)
    }));

    let mut registry = ServiceRegistry::with_catalog(catalog);
    registry.set_parameter("prefix", "/api");
    registry
        .set(
            "router",
            Definition::of_type("Router")
                .bind("add", Argument::List(vec![Argument::value("/home"), Argument::value("/about")]))
                .bind("prefix", Argument::parameter("prefix"))
                .extra(Invocable::new("count", move |_, _| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                })),
        )
        .unwrap();
    registry
        .set(
            "route_count",
            Definition::statement(Statement::call(Invocable::new("len", |_, args: CallArgs| {
                let router = args.get(0).and_then(Value::as_object).cloned();
                let routes = router.and_then(|router| router.property("routes"));
                Ok(Value::Int(
                    routes.and_then(|routes| routes.as_list().map(<[Value]>::len)).unwrap_or_default() as i64,
                ))
            })))
            .arg(Argument::reference("router")),
        )
        .unwrap();

    for (engine, container) in engines(&registry) {
        let router = container.get("router").unwrap();
        let instance = router.as_object().unwrap();
        assert_eq!(
            instance.property("routes"),
            Some(Value::List(vec![Value::from("/home"), Value::from("/about")])),
            "{engine}"
        );
        assert_eq!(instance.property("prefix"), Some(Value::from("/api")), "{engine}");
        assert_eq!(container.get("route_count").unwrap(), Value::Int(2), "{engine}");
        assert_eq!(container.parameter("prefix").unwrap(), Value::from("/api"), "{engine}");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_collection_argument_gathers_candidates() {
    let catalog = TypeCatalog::new()
        .with_class(ClassSpec::new("JsonEncoder").implements(["Encoder"]))
        .with_class(ClassSpec::new("XmlEncoder").implements(["Encoder"]));
    let mut registry = ServiceRegistry::with_catalog(catalog);
    registry.autowire("json", Definition::of_type("JsonEncoder"), &[]).unwrap();
    registry.autowire("xml", Definition::of_type("XmlEncoder"), &[]).unwrap();
    registry
        .set(
            "serializer",
            Definition::of_type("Serializer").named_arg("encoders", Argument::collection("Encoder")),
        )
        .unwrap();

    for (engine, container) in engines(&registry) {
        let serializer = container.get("serializer").unwrap();
        let encoders = serializer.as_object().unwrap().property("encoders").unwrap();
        let encoders = encoders.as_list().unwrap();
        assert_eq!(encoders.len(), 2, "{engine}");
        assert!(encoders[0].same(&container.get("json").unwrap()), "{engine}");
    }
}

#[test]
fn test_decorators_and_self_reentry() {
    let mut registry = ServiceRegistry::new();
    registry.set("num", Definition::value(5)).unwrap();
    registry
        .decorate(
            "num",
            Decorator::new("add_five", |value, _| Ok(Value::Int(value.as_int().unwrap_or_default() + 5))),
        )
        .unwrap();
    registry.set("loop", Definition::value(1)).unwrap();
    registry
        .decorate("loop", Decorator::new("reenter", |_, locator| locator.get("loop")))
        .unwrap();

    for (engine, container) in engines(&registry) {
        assert_eq!(container.get("num").unwrap(), Value::Int(10), "{engine}");

        let error = container.get("loop").unwrap_err();
        assert_eq!(error.circular_path().unwrap(), ["loop", "loop"], "{engine}");
    }
}

#[test]
fn test_deprecation_notified_once_per_creation() {
    let mut registry = ServiceRegistry::new();
    registry
        .set("old", Definition::of_type("Old").deprecate("acme/core", "2.1", None))
        .unwrap();
    registry
        .set(
            "old_factory",
            Definition::of_type("OldFactory")
                .deprecate("acme/core", "2.1", Some("use the new one"))
                .should(DefinitionFlags::FACTORY),
        )
        .unwrap();

    let log = DeprecationLog::new();
    for (engine, container) in engines_with(&registry, Arc::new(log.clone())) {
        let before = log.len();
        container.get("old").unwrap();
        container.get("old").unwrap();
        assert_eq!(log.len() - before, 1, "{engine}");

        container.get("old_factory").unwrap();
        container.get("old_factory").unwrap();
        assert_eq!(log.len() - before, 3, "{engine}");
    }

    let entries = log.entries();
    assert!(entries[0].1.message.contains("\"old\" service is deprecated"));
    assert_eq!(entries[1].1.message, "use the new one");
}

#[test]
fn test_ignore_freezing_does_not_cache() {
    let mut registry = ServiceRegistry::new();
    registry.set("svc", Definition::of_type("Svc")).unwrap();

    for (engine, container) in engines(&registry) {
        let transient = container
            .get_with("svc", ResolveOptions::new().ignore_freezing())
            .unwrap();
        let shared = container.get("svc").unwrap();
        assert!(!transient.same(&shared), "{engine}");

        let again = container
            .get_with("svc", ResolveOptions::new().ignore_freezing())
            .unwrap();
        assert!(again.same(&shared), "{engine}");
    }
}

#[test]
fn test_reset_tears_down_and_keeps_aliases() {
    let resets = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&resets);
    let catalog = TypeCatalog::new().with_class(ClassSpec::new("Pool").teardown(move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    }));
    let mut registry = ServiceRegistry::with_catalog(catalog);
    registry.set("pool", Definition::of_type("Pool")).unwrap();
    registry.alias("connections", "pool").unwrap();
    registry.tag("pool", "resource", Value::Null);
    registry
        .set(
            "repo",
            Definition::of_type("Repo").named_arg("pool", Argument::reference("connections")),
        )
        .unwrap();

    for (engine, container) in engines(&registry) {
        let before = container.get("repo").unwrap();
        assert_eq!(container.tagged("resource").unwrap().len(), 1, "{engine}");
        container.reset();

        assert!(container.has("connections"), "{engine}");
        assert!(container.tagged("resource").unwrap().is_empty(), "{engine}");

        let after = container.get("repo").unwrap();
        assert!(!before.same(&after), "{engine}");
        let pool = after.as_object().unwrap().property("pool").unwrap();
        assert!(pool.same(&container.get("connections").unwrap()), "{engine}");
        assert!(pool.same(&container.get("pool").unwrap()), "{engine}");
    }

    assert_eq!(resets.load(Ordering::SeqCst), 2);
}

#[test]
fn test_tagged_services_with_attributes() {
    let mut registry = ServiceRegistry::new();
    registry.set("a", Definition::value("first")).unwrap();
    registry.set("b", Definition::value("second")).unwrap();
    registry.tag("a", "listener", Value::from(serde_json::json!({"priority": 10})));
    registry.tag("b", "listener", Value::from(serde_json::json!({"priority": 5})));

    for (engine, container) in engines(&registry) {
        let tagged = container.tagged("listener").unwrap();
        let services: Vec<Value> = tagged.iter().map(|(service, _)| service.clone()).collect();
        assert_eq!(services, vec![Value::from("first"), Value::from("second")], "{engine}");

        let priority = tagged[0].1.as_map().and_then(|attributes| attributes.get("priority")).cloned();
        assert_eq!(priority, Some(Value::Int(10)), "{engine}");
        assert!(container.tagged("missing").unwrap().is_empty(), "{engine}");
    }
}

struct QueueProvider;

impl ServiceProvider for QueueProvider {
    fn name(&self) -> &str {
        "queue"
    }

    fn register(&self, registry: &mut ServiceRegistry, config: &Value) -> di_common::DiResult<()> {
        let workers = config
            .as_map()
            .and_then(|config| config.get("workers"))
            .cloned()
            .unwrap_or(Value::Int(1));
        registry.set(
            "queue",
            Definition::of_type("Queue")
                .named_arg("workers", workers)
                .named_arg("config", Argument::reference("queue.config")),
        )
    }
}

#[test]
fn test_provider_configuration_is_visible() {
    let mut registry = ServiceRegistry::new();
    registry
        .register_provider(
            Arc::new(QueueProvider),
            Value::from(serde_json::json!({"workers": 4})),
        )
        .unwrap();

    for (engine, container) in engines(&registry) {
        let queue = container.get("queue").unwrap();
        assert_eq!(queue.as_object().unwrap().property("workers"), Some(Value::Int(4)), "{engine}");
        assert!(container.has("queue.config"), "{engine}");
        assert!(container.parameter("queue").is_ok(), "{engine}");
    }
}

#[test]
fn test_raw_instance_is_returned_as_is() {
    let instance = Arc::new(Instance::new("Preset").with_property("name", "preset"));
    let mut registry = ServiceRegistry::new();
    registry
        .set("preset", Definition::value(Value::Object(Arc::clone(&instance))))
        .unwrap();

    for (engine, container) in engines(&registry) {
        let value = container.get("preset").unwrap();
        assert!(Arc::ptr_eq(value.as_object().unwrap(), &instance), "{engine}");
    }
}

#[test]
fn test_concurrent_first_resolution_is_not_circular() {
    let catalog = TypeCatalog::new().with_class(ClassSpec::new("Slow").constructor(|_| {
        thread::sleep(Duration::from_millis(50));
        Ok(Instance::new("Slow"))
    }));
    let mut registry = ServiceRegistry::with_catalog(catalog);
    registry.set("slow", Definition::of_type("Slow")).unwrap();

    for (engine, container) in engines(&registry) {
        let container = container.as_ref();
        let barrier = Barrier::new(2);

        thread::scope(|scope| {
            let worker = || {
                barrier.wait();
                container.get("slow").map(|_| ())
            };
            let first = scope.spawn(worker);
            let second = scope.spawn(worker);

            for result in [first.join().unwrap(), second.join().unwrap()] {
                assert!(result.is_ok(), "{engine}: {result:?}");
            }
        });

        assert!(container.get("slow").is_ok(), "{engine}");
    }
}
