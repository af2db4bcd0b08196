//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("规则编译失败: {0}")]
    CompileError(String),

    #[error("规则执行失败: {0}")]
    ExecutionError(String),

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("未定义的事实: {0}")]
    UndefinedFact(String),

    #[error("无效的参数: {0}")]
    InvalidArgument(String),

    #[error("事实计算失败: {fact_id} - {message}")]
    ComputeFailed { fact_id: String, message: String },

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl RuleError {
    /// 构造事实计算失败错误，供事实计算函数使用
    pub fn compute_failed(fact_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ComputeFailed {
            fact_id: fact_id.into(),
            message: message.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "PARSE_ERROR",
            Self::CompileError(_) => "COMPILE_ERROR",
            Self::ExecutionError(_) => "EXECUTION_ERROR",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::UndefinedFact(_) => "UNDEFINED_FACT",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::ComputeFailed { .. } => "COMPUTE_FAILED",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::JsonError(_) => "JSON_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
