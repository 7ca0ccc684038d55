//! # DI Common
//!
//! 服务容器的公共基础：错误类型、服务值模型、服务定位接口、
//! 循环引用检测、废弃通知、类型目录与容器配置。
//!
//! ## 核心组件
//!
//! - [`Value`] - 服务值
//! - [`ServiceLocator`] - 解释执行与编译生成的容器共用的解析接口
//! - [`LoadingSet`] - 作用域化的循环引用检测
//! - [`TypeCatalog`] - 代替运行时反射的类型描述
//! - [`ContainerConfig`] - 容器配置

pub mod configuration;
pub mod errors;
pub mod lifecycle;
pub mod loading;
pub mod locator;
pub mod metadata;
pub mod value;

pub use configuration::*;
pub use errors::*;
pub use lifecycle::*;
pub use loading::*;
pub use locator::*;
pub use metadata::*;
pub use value::*;
