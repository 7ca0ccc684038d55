//! 编译输出的确定性测试

use di_common::{ClassSpec, ContainerConfig, TypeCatalog, Value};
use di_compiler::{ContainerBuilder, Emitter, JsonEmitter};
use di_impl::{Argument, Definition, DefinitionFlags, ServiceRegistry};

fn catalog() -> TypeCatalog {
    TypeCatalog::new()
        .with_class(ClassSpec::new("SmtpTransport").implements(["Transport"]))
        .with_class(ClassSpec::new("Mailer").params(["transport"]))
}

/// 按给定顺序注册同一组定义
fn registry(order: &[&str]) -> ServiceRegistry {
    let mut registry = ServiceRegistry::with_catalog(catalog());
    for id in order {
        match *id {
            "transport" => registry
                .autowire("transport", Definition::of_type("SmtpTransport"), &[])
                .unwrap(),
            "mailer" => registry
                .set("mailer", Definition::of_type("Mailer").arg(Argument::reference("Transport")))
                .unwrap(),
            "newsletter" => registry
                .set(
                    "newsletter",
                    Definition::of_type("Newsletter")
                        .named_arg("mailer", Argument::reference("mailer"))
                        .should(DefinitionFlags::LAZY),
                )
                .unwrap(),
            "secret" => registry
                .set("secret", Definition::value("s3cr3t").should(DefinitionFlags::PRIVATE))
                .unwrap(),
            other => panic!("unknown id {other}"),
        }
    }
    registry.set_parameter("sender", Value::from("noreply@example.com"));
    registry.set_parameter("retries", 3);
    registry
}

fn dump(registry: ServiceRegistry) -> String {
    ContainerBuilder::from_registry(registry, ContainerConfig::default())
        .dump()
        .unwrap()
}

#[test]
fn test_compiling_twice_is_byte_identical() {
    let mut builder = ContainerBuilder::from_registry(
        registry(&["transport", "mailer", "newsletter", "secret"]),
        ContainerConfig::default(),
    );
    let emitter = JsonEmitter::compact();

    let first = builder.compile_to_string(&emitter).unwrap();
    let second = builder.compile_to_string(&emitter).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_registration_order_does_not_change_output() {
    let forward = dump(registry(&["transport", "mailer", "newsletter", "secret"]));
    let backward = dump(registry(&["secret", "newsletter", "mailer", "transport"]));
    assert_eq!(forward, backward);
}

#[test]
fn test_output_lists_routines_in_id_order() {
    let program = ContainerBuilder::from_registry(
        registry(&["transport", "mailer", "newsletter", "secret"]),
        ContainerConfig::default(),
    )
    .compile()
    .unwrap();

    let ids: Vec<&str> = program.routines.iter().map(|routine| routine.id.as_str()).collect();
    assert_eq!(ids, vec!["mailer", "newsletter", "secret", "transport"]);
    assert_eq!(program.private_services, 1);

    let json: serde_json::Value = serde_json::from_str(&JsonEmitter::default().emit(&program).unwrap()).unwrap();
    assert_eq!(json["types"]["Transport"], serde_json::json!(["transport"]));
    assert_eq!(json["routines"][1]["body"]["args"]["named"][0][1]["kind"], "service");
    assert!(json["methods_map"].get("secret").is_none());
}
