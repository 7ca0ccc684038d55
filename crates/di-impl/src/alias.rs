//! 别名表

use di_common::{DiError, DiResult};
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// 别名到目标 id 的映射，查找时按链传递解析
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: IndexMap<String, String>,
}

impl AliasTable {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记别名
    ///
    /// 别名不能指向自身，也不能经由链条回到自身。
    pub fn insert(&mut self, alias: &str, target: &str) -> DiResult<()> {
        if alias == target || self.resolve(target) == alias {
            return Err(DiError::AliasToItself {
                id: alias.to_string(),
            });
        }

        self.aliases.insert(alias.to_string(), target.to_string());
        Ok(())
    }

    /// 传递解析到最终 id，不是别名时原样返回
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        // 插入时已拒绝回环，长度上限只是兜底
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(current) {
                Some(target) => current = target,
                None => break,
            }
        }
        current
    }

    /// 直接目标
    pub fn target(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// 是否为别名
    pub fn contains(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// 移除别名
    pub fn remove(&mut self, alias: &str) -> Option<String> {
        self.aliases.shift_remove(alias)
    }

    /// 移除最终指向该 id 的全部别名
    pub fn remove_targeting(&mut self, id: &str) {
        let dangling: Vec<String> = self
            .aliases
            .keys()
            .filter(|alias| self.resolve(alias) == id)
            .cloned()
            .collect();

        for alias in dangling {
            self.aliases.shift_remove(&alias);
        }
    }

    /// 展开为别名到最终 id 的有序映射
    pub fn flatten(&self) -> BTreeMap<String, String> {
        self.aliases
            .keys()
            .map(|alias| (alias.clone(), self.resolve(alias).to_string()))
            .collect()
    }

    /// 别名数量
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
