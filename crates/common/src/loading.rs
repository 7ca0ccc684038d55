//! 循环引用检测
//!
//! [`LoadingSet`] 记录当前调用树中正在解析的服务 id。每个线程拥有独立的解析链，
//! 进入时压栈，[`LoadingGuard`] 释放时出栈，任何退出路径都不会残留条目。

use crate::errors::{DiError, DiResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::{self, ThreadId};

/// 默认最大解析深度
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// 正在解析的服务集合
///
/// 一次顶层解析只在调用线程上展开，因此按线程区分解析链，
/// 并发解析同一个服务不会被误判为循环引用。
#[derive(Debug)]
pub struct LoadingSet {
    chains: Mutex<HashMap<ThreadId, Vec<String>>>,
    max_depth: usize,
}

impl LoadingSet {
    /// 创建新的集合
    pub fn new(max_depth: usize) -> Self {
        Self {
            chains: Mutex::new(HashMap::new()),
            max_depth,
        }
    }

    /// 进入服务解析
    ///
    /// 该 id 已在当前线程的解析链中时返回 [`DiError::CircularReference`]，路径从首次出现处开始。
    pub fn enter(&self, id: &str) -> DiResult<LoadingGuard<'_>> {
        let thread = thread::current().id();
        let mut chains = self.chains.lock();
        let chain = chains.entry(thread).or_default();

        if let Some(position) = chain.iter().position(|loading| loading == id) {
            let mut path = chain[position..].to_vec();
            path.push(id.to_string());
            return Err(DiError::CircularReference {
                id: id.to_string(),
                path,
            });
        }

        if chain.len() >= self.max_depth {
            return Err(DiError::ResolutionDepthExceeded {
                id: id.to_string(),
                max_depth: self.max_depth,
            });
        }

        chain.push(id.to_string());
        Ok(LoadingGuard {
            set: self,
            thread,
            depth: chain.len(),
        })
    }

    /// 当前线程是否正在解析
    pub fn contains(&self, id: &str) -> bool {
        self.chains
            .lock()
            .get(&thread::current().id())
            .is_some_and(|chain| chain.iter().any(|loading| loading == id))
    }

    /// 当前线程的解析深度
    pub fn depth(&self) -> usize {
        self.chains
            .lock()
            .get(&thread::current().id())
            .map_or(0, Vec::len)
    }

    /// 当前线程的解析链
    pub fn chain(&self) -> Vec<String> {
        self.chains
            .lock()
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_default()
    }

    /// 是否没有任何线程在解析
    pub fn is_idle(&self) -> bool {
        self.chains.lock().is_empty()
    }
}

impl Default for LoadingSet {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

/// 解析作用域守卫
#[derive(Debug)]
pub struct LoadingGuard<'a> {
    set: &'a LoadingSet,
    thread: ThreadId,
    depth: usize,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut chains = self.set.chains.lock();
        if let Some(chain) = chains.get_mut(&self.thread) {
            // 截断到进入前的深度，内层守卫先于外层释放
            chain.truncate(self.depth - 1);
            if chain.is_empty() {
                chains.remove(&self.thread);
            }
        }
    }
}
