//! 服务生命周期通知
//!
//! 废弃通知走旁路通道，不会中断解析。

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// 废弃声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deprecation {
    /// 触发废弃的包名
    pub package: String,
    /// 引入废弃的版本
    pub version: String,
    /// 提示信息
    pub message: String,
}

impl Deprecation {
    /// 创建废弃声明
    pub fn new(package: impl Into<String>, version: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            message: message.into(),
        }
    }

    /// 使用默认提示信息
    pub fn for_service(id: &str, package: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(package, version, default_message(id))
    }
}

/// 默认的废弃提示
pub fn default_message(id: &str) -> String {
    format!("The \"{id}\" service is deprecated. You should stop using it, as it will be removed in the future.")
}

/// 废弃通知处理器
pub trait DeprecationHandler: Send + Sync {
    /// 服务被解析时调用
    fn notify(&self, id: &str, deprecation: &Deprecation);
}

/// 写入 tracing 日志的处理器
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDeprecationHandler;

impl DeprecationHandler for TracingDeprecationHandler {
    fn notify(&self, id: &str, deprecation: &Deprecation) {
        warn!(
            service = id,
            package = %deprecation.package,
            version = %deprecation.version,
            "{}",
            deprecation.message
        );
    }
}

/// 收集通知的处理器，多用于测试
#[derive(Debug, Default, Clone)]
pub struct DeprecationLog {
    entries: Arc<Mutex<Vec<(String, Deprecation)>>>,
}

impl DeprecationLog {
    /// 创建空记录
    pub fn new() -> Self {
        Self::default()
    }

    /// 已收到的通知
    pub fn entries(&self) -> Vec<(String, Deprecation)> {
        self.entries.lock().clone()
    }

    /// 通知数量
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// 是否没有通知
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DeprecationHandler for DeprecationLog {
    fn notify(&self, id: &str, deprecation: &Deprecation) {
        self.entries.lock().push((id.to_string(), deprecation.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_message() {
        let deprecation = Deprecation::for_service("mailer", "acme/mail", "2.1");

        assert_eq!(
            deprecation.message,
            "The \"mailer\" service is deprecated. You should stop using it, as it will be removed in the future."
        );
        assert_eq!(deprecation.package, "acme/mail");
    }

    #[test]
    fn test_log_collects_entries() {
        let log = DeprecationLog::new();
        let handler: &dyn DeprecationHandler = &log;

        handler.notify("a", &Deprecation::new("p", "1.0", "gone"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].0, "a");
    }
}
