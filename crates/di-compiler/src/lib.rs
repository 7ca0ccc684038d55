//! # 容器预编译
//!
//! 把注册表中的全部定义提前编译为与后端无关的 [`CompiledProgram`]，
//! 再由 [`Emitter`] 渲染输出或由 [`CompiledContainer`] 直接加载。
//!
//! 编译后的容器与解释执行的容器行为一致：共享服务只创建一次，
//! 工厂服务每次新建，延迟引用注入句柄，循环引用在编译期报告。
//!
//! ## 核心组件
//!
//! - [`ContainerBuilder`] - 收集定义并驱动编译
//! - [`GraphCompiler`] - 一次性的图编译过程
//! - [`CompiledProgram`] - 编译产物
//! - [`JsonEmitter`] - JSON 输出后端
//! - [`CompiledContainer`] - 加载编译产物的容器
//!
//! ## 示例
//!
//! ```
//! use di_common::{ServiceLocator, Value};
//! use di_compiler::ContainerBuilder;
//! use di_impl::{Argument, Definition};
//!
//! let mut builder = ContainerBuilder::new();
//! builder.set("dsn", Definition::value("sqlite://memory")).unwrap();
//! builder
//!     .set("db", Definition::of_type("Database").named_arg("dsn", Argument::reference("dsn")))
//!     .unwrap();
//!
//! let container = builder.build().unwrap();
//! let db = container.get("db").unwrap();
//! assert_eq!(db.as_object().unwrap().property("dsn"), Some(Value::from("sqlite://memory")));
//! ```

pub mod builder;
pub mod compiler;
pub mod emitter;
pub mod program;
pub mod runtime;

pub use builder::ContainerBuilder;
pub use compiler::GraphCompiler;
pub use emitter::{Emitter, JsonEmitter};
pub use program::{BindingOp, CacheTable, CompiledProgram, Expr, ExprArgs, Routine, Visibility};
pub use runtime::CompiledContainer;
