//! 编译产物
//!
//! [`CompiledProgram`] 是与后端无关的中间表示：每个定义对应一个
//! [`Routine`]，定义之间的引用在编译期已经解析为例程下标。

use di_common::{Deprecation, Invocable, Value};
use di_impl::Decorator;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// 编译后的容器程序
#[derive(Debug, Clone, Serialize)]
pub struct CompiledProgram {
    /// 生成的容器类名
    pub container_class: String,
    /// 全部例程，按 id 排序
    pub routines: Vec<Routine>,
    /// 公开 id → 方法名
    pub methods_map: BTreeMap<String, String>,
    /// 类型 → 候选 id
    pub types: BTreeMap<String, Vec<String>>,
    /// 已展开的别名，指向私有服务的别名不会导出
    pub aliases: BTreeMap<String, String>,
    /// 参数
    pub parameters: BTreeMap<String, Value>,
    /// 标签 → 服务 id → 标签属性
    pub tags: BTreeMap<String, BTreeMap<String, Value>>,
    /// 私有服务数量
    pub private_services: usize,
}

impl CompiledProgram {
    /// 按 id 查找例程下标
    pub fn position(&self, id: &str) -> Option<usize> {
        self.routines
            .binary_search_by(|routine| routine.id.as_str().cmp(id))
            .ok()
    }

    /// 按 id 查找例程
    pub fn routine(&self, id: &str) -> Option<&Routine> {
        self.position(id).map(|index| &self.routines[index])
    }
}

/// 可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// 可以通过公开接口获取
    Public,
    /// 只能被其他定义引用
    Private,
}

/// 缓存表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTable {
    /// 公开服务缓存
    Services,
    /// 私有服务缓存
    Privates,
}

/// 一个定义编译得到的创建例程
#[derive(Debug, Clone, Serialize)]
pub struct Routine {
    /// 服务 id
    pub id: String,
    /// 方法名
    pub method: String,
    /// 可见性
    pub visibility: Visibility,
    /// 缓存位置，工厂服务不缓存
    pub cache: Option<CacheTable>,
    /// 是否延迟
    pub lazy: bool,
    /// 返回类型
    pub return_types: Vec<String>,
    /// 废弃信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<Deprecation>,
    /// 创建表达式
    pub body: Expr,
    /// 绑定操作
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<BindingOp>,
    /// 装饰器
    #[serde(serialize_with = "serialize_decorators", skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<Decorator>,
}

/// 表达式
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// 字面值
    Literal {
        /// 值
        value: Value,
    },
    /// 实例化类
    New {
        /// 类名
        class: String,
        /// 参数
        args: ExprArgs,
    },
    /// 调用可调用体
    Invoke {
        /// 可调用体
        #[serde(serialize_with = "serialize_invocable")]
        callable: Invocable,
        /// 参数
        args: ExprArgs,
    },
    /// 调用服务本身
    CallService {
        /// 被调用的服务
        service: Box<Expr>,
        /// 参数
        args: ExprArgs,
    },
    /// 调用服务的方法
    CallMethod {
        /// 被调用的服务
        service: Box<Expr>,
        /// 方法名
        method: String,
        /// 参数
        args: ExprArgs,
    },
    /// 立即获取服务
    Service {
        /// 服务 id
        id: String,
        /// 例程下标
        routine: usize,
    },
    /// 延迟句柄
    Lazy {
        /// 服务 id
        id: String,
        /// 例程下标
        routine: usize,
    },
    /// 参数
    Parameter {
        /// 参数名
        name: String,
    },
    /// 列表
    List {
        /// 元素
        items: Vec<Expr>,
    },
}

/// 编译后的参数列表
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExprArgs {
    /// 位置参数
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub positional: Vec<Expr>,
    /// 命名参数，保持声明顺序
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub named: Vec<(String, Expr)>,
}

impl ExprArgs {
    /// 是否没有任何参数
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// 绑定操作
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingOp {
    /// 调用方法或写入属性
    Member {
        /// 成员名
        name: String,
        /// 值
        value: Expr,
    },
    /// 以服务为参数调用
    Extra {
        /// 可调用表达式
        code: Expr,
    },
}

fn serialize_invocable<S: Serializer>(invocable: &Invocable, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(invocable.name())
}

fn serialize_decorators<S: Serializer>(decorators: &[Decorator], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(decorators.iter().map(Decorator::name))
}
