//! # 依赖注入具体实现
//!
//! 提供服务定义、类型索引、别名表、服务注册表，以及解释执行的容器。
//!
//! ## 核心组件
//!
//! - [`Definition`] - 服务定义
//! - [`TypeIndex`] - 类型到服务 id 的索引
//! - [`AliasTable`] - 别名表
//! - [`ServiceRegistry`] - 注册状态，解释执行与预编译共用
//! - [`Container`] - 首次访问时创建并缓存服务的容器
//!
//! ## 示例
//!
//! ```
//! use di_common::{ServiceLocator, Value};
//! use di_impl::{Container, Decorator, Definition};
//!
//! let container = Container::new();
//! container.set("num", Definition::value(5)).unwrap();
//! container
//!     .extend(
//!         "num",
//!         Decorator::new("add_five", |value, _| Ok(Value::Int(value.as_int().unwrap_or_default() + 5))),
//!     )
//!     .unwrap();
//!
//! assert_eq!(container.get("num").unwrap(), Value::Int(10));
//! ```

pub mod alias;
pub mod container;
pub mod definition;
pub mod provider;
pub mod registry;
pub mod type_index;

pub use alias::AliasTable;
pub use container::Container;
pub use definition::{
    Argument, Arguments, Binding, Callee, Decorator, Definition, DefinitionFlags, Entity, Statement, EXTRA_BIND,
};
pub use provider::ServiceProvider;
pub use registry::ServiceRegistry;
pub use type_index::{select_candidates, TypeIndex};
