//! 服务定位接口
//!
//! 解释执行的容器与编译生成的容器都实现 [`ServiceLocator`]，
//! 调用方可以在两者之间切换而不修改代码。

use crate::errors::DiResult;
use crate::value::Value;

/// 解析选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// 按类型解析遇到多个候选时返回全部候选而不是报错
    pub ignore_ambiguity: bool,
    /// 解析但不写入缓存，也不冻结定义
    pub ignore_freezing: bool,
}

impl ResolveOptions {
    /// 默认选项
    pub const fn new() -> Self {
        Self {
            ignore_ambiguity: false,
            ignore_freezing: false,
        }
    }

    /// 忽略类型歧义
    #[must_use]
    pub const fn ignore_ambiguity(mut self) -> Self {
        self.ignore_ambiguity = true;
        self
    }

    /// 忽略冻结
    #[must_use]
    pub const fn ignore_freezing(mut self) -> Self {
        self.ignore_freezing = true;
        self
    }
}

/// 服务定位器
pub trait ServiceLocator: Send + Sync {
    /// 按选项解析服务 id、别名或类型
    fn get_with(&self, id: &str, options: ResolveOptions) -> DiResult<Value>;

    /// 解析服务
    fn get(&self, id: &str) -> DiResult<Value> {
        self.get_with(id, ResolveOptions::default())
    }

    /// 是否能够公开解析该 id
    fn has(&self, id: &str) -> bool;

    /// 所有公开服务 id
    fn keys(&self) -> Vec<String>;

    /// 读取参数
    fn parameter(&self, name: &str) -> DiResult<Value>;

    /// 解析所有带有指定标签的服务，返回 (服务, 标签属性)
    fn tagged(&self, tag: &str) -> DiResult<Vec<(Value, Value)>>;

    /// 重置容器：释放缓存实例与标签，登记的别名保留
    fn reset(&self);

    /// 内部引用解析
    ///
    /// 与 [`get`](Self::get) 不同，可以解析私有服务，供延迟句柄和定义间引用使用。
    fn resolve_reference(&self, id: &str) -> DiResult<Value>;
}
