//! Almanac 规则引擎
//!
//! 提供带缓存的事实解析与规则评估能力，支持：
//! - 事实定义、运行时事实覆盖与未定义事实策略
//! - 带过期时间和容量上限的事实缓存，并发下同一键至多计算一次
//! - JSON 规则定义、编译和存储
//! - 按优先级分层的短路求值执行

pub mod almanac;
pub mod cache;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod fact;
pub mod models;
pub mod operators;
pub mod path;
pub mod store;

pub use almanac::{Almanac, AlmanacOptions};
pub use cache::{CacheKey, CacheStats, CacheStore};
pub use compiler::{CompiledRule, RuleCompiler};
pub use engine::{Engine, EngineOptions};
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use executor::RuleExecutor;
pub use fact::{Fact, FactCompute, FactOptions, FactParams};
pub use models::{
    Condition, ConditionValue, EngineResult, Event, FactReference, LogicalGroup, NotNode, Rule,
    RuleNode, RuleResult,
};
pub use operators::{LogicalOperator, Operator};
pub use path::{DotPathResolver, PathResolver};
pub use store::{RuleStore, RuleStoreStats};
