//! 容器配置
//!
//! 支持从 TOML 或 JSON 加载，缺省字段使用默认值。

use crate::errors::ConfigError;
use crate::loading::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 容器配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 解析引擎配置
    pub resolver: ResolverConfig,
    /// 图编译器配置
    pub compiler: CompilerConfig,
}

/// 解析引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// 最大解析深度
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// 图编译器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// 生成的容器类名
    pub container_class: String,
    /// 是否美化输出
    pub pretty: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            container_class: "CompiledContainer".to_string(),
            pretty: true,
        }
    }
}

impl ContainerConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置最大解析深度
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.resolver.max_depth = max_depth;
        self
    }

    /// 设置生成的容器类名
    #[must_use]
    pub fn with_container_class(mut self, class: impl Into<String>) -> Self {
        self.compiler.container_class = class.into();
        self
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            source: Box::new(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文本解析
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载，按扩展名选择格式
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.max_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "resolver.max_depth 必须大于 0".to_string(),
            });
        }

        if self.compiler.container_class.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "compiler.container_class 不能为空".to_string(),
            });
        }

        Ok(())
    }
}
