//! 错误类型定义

use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件读取失败: {source}")]
    FileReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置序列化失败: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("不支持的配置文件格式: {path}")]
    UnsupportedFormat { path: String },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 容器错误类型
///
/// 解释执行的解析引擎与预编译的图编译器共用同一套错误分类，
/// 编译期发现的问题统一包装为 [`DiError::Compilation`]。
#[derive(Error, Debug)]
pub enum DiError {
    #[error("服务未定义: \"{id}\"")]
    NotFound { id: String },

    #[error("检测到服务 \"{id}\" 的循环引用, 路径: \"{}\"", path.join(" -> "))]
    CircularReference { id: String, path: Vec<String> },

    #[error("服务 \"{id}\" 已被解析并冻结, 不能再修改")]
    FrozenConflict { id: String },

    #[error("类型 {type_name} 对应多个服务: {}", ids.join(", "))]
    AmbiguousType { type_name: String, ids: Vec<String> },

    #[error("服务 \"{id}\" 的实体无法实例化: {reason}")]
    InvalidEntity { id: String, reason: String },

    #[error("编译服务 \"{id}\" 失败: {source}")]
    Compilation {
        id: String,
        #[source]
        source: Box<DiError>,
    },

    #[error("[{id}] 不能作为自身的别名")]
    AliasToItself { id: String },

    #[error("参数未定义: \"{name}\"")]
    ParameterNotFound { name: String },

    #[error("解析服务 \"{id}\" 超过最大深度 {max_depth}")]
    ResolutionDepthExceeded { id: String, max_depth: usize },

    #[error("服务 \"{id}\" 所属的容器已被释放")]
    ContainerDropped { id: String },

    #[error("代码输出失败: {message}")]
    Emission { message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DiError {
    /// 创建服务未定义错误
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// 创建实体无法实例化错误
    pub fn invalid_entity(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntity {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// 将错误标注为某个定义在编译期间产生的错误
    ///
    /// 已经是编译错误时保持最内层的标注不变。
    #[must_use]
    pub fn within_compilation(self, id: &str) -> Self {
        match self {
            Self::Compilation { .. } => self,
            other => Self::Compilation {
                id: id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// 剥离编译包装后的原始错误
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Compilation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// 是否为循环引用错误（含编译包装）
    pub fn is_circular(&self) -> bool {
        matches!(self.root_cause(), Self::CircularReference { .. })
    }

    /// 循环引用路径
    pub fn circular_path(&self) -> Option<&[String]> {
        match self.root_cause() {
            Self::CircularReference { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// 容器操作结果类型
pub type DiResult<T> = Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_message_shows_full_path() {
        let error = DiError::CircularReference {
            id: "a".to_string(),
            path: vec!["a".into(), "b".into(), "c".into(), "a".into()],
        };

        assert!(error.to_string().contains("\"a -> b -> c -> a\""));
    }

    #[test]
    fn test_within_compilation_keeps_innermost_id() {
        let error = DiError::not_found("missing")
            .within_compilation("inner")
            .within_compilation("outer");

        match &error {
            DiError::Compilation { id, .. } => assert_eq!(id, "inner"),
            other => panic!("意外的错误类型: {other:?}"),
        }
        assert!(matches!(error.root_cause(), DiError::NotFound { id } if id == "missing"));
        assert!(!error.is_circular());
    }

    #[test]
    fn test_ambiguous_message_lists_candidates() {
        let error = DiError::AmbiguousType {
            type_name: "Service".to_string(),
            ids: vec!["service_1".into(), "service_2".into()],
        };

        assert!(error.to_string().ends_with("service_1, service_2"));
    }
}
