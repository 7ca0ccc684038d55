//! 类型索引
//!
//! 类型名到服务 id 列表的映射，支撑按类型解析。

use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::debug;

/// 类型索引
#[derive(Debug, Clone, Default)]
pub struct TypeIndex {
    types: IndexMap<String, Vec<String>>,
    excluded: BTreeSet<String>,
}

impl TypeIndex {
    /// 创建空索引
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记服务的类型，替换该 id 之前的全部登记
    pub fn register<I, S>(&mut self, id: &str, types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.remove(id);

        for type_name in types {
            let type_name = type_name.as_ref();
            if self.excluded.contains(type_name) {
                continue;
            }

            let ids = self.types.entry(type_name.to_string()).or_default();
            if !ids.iter().any(|existing| existing == id) {
                debug!("登记类型: {} -> {}", type_name, id);
                ids.push(id.to_string());
            }
        }
    }

    /// 移除服务的全部类型登记
    pub fn remove(&mut self, id: &str) {
        self.types.retain(|_, ids| {
            ids.retain(|existing| existing != id);
            !ids.is_empty()
        });
    }

    /// 排除类型，之后不再登记
    pub fn exclude(&mut self, type_name: impl Into<String>) {
        let type_name = type_name.into();
        self.types.shift_remove(&type_name);
        self.excluded.insert(type_name);
    }

    /// 查找类型对应的服务 id
    pub fn lookup(&self, type_name: &str) -> &[String] {
        self.types.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 是否登记了该类型
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// 遍历全部登记
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.types.iter()
    }

    /// 清空登记（保留排除列表）
    pub fn clear(&mut self) {
        self.types.clear();
    }
}

/// 从候选中去掉私有服务，唯一候选时保留
///
/// 解释执行的解析与编译输出的类型表共用这一规则。
pub fn select_candidates<F>(ids: &[String], is_private: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    if ids.len() <= 1 {
        return ids.to_vec();
    }

    ids.iter().filter(|id| !is_private(id)).cloned().collect()
}
