//! 输出后端
//!
//! 编译产物与后端无关，[`Emitter`] 负责把它渲染为具体格式。
//! 同一份产物多次渲染得到逐字节相同的输出。

use crate::program::CompiledProgram;
use di_common::{DiError, DiResult};

/// 输出后端
pub trait Emitter {
    /// 后端名称
    fn name(&self) -> &str;

    /// 渲染编译产物
    fn emit(&self, program: &CompiledProgram) -> DiResult<String>;
}

/// JSON 输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonEmitter {
    pretty: bool,
}

impl JsonEmitter {
    /// 创建 JSON 后端
    pub const fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// 紧凑输出
    pub const fn compact() -> Self {
        Self::new(false)
    }
}

impl Default for JsonEmitter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Emitter for JsonEmitter {
    fn name(&self) -> &str {
        "json"
    }

    fn emit(&self, program: &CompiledProgram) -> DiResult<String> {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(program)
        } else {
            serde_json::to_string(program)
        };

        rendered.map_err(|error| DiError::Emission {
            message: error.to_string(),
        })
    }
}
