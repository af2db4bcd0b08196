//! 事实定义
//!
//! 事实是一个具名的值来源：可以是常量，也可以是带参数的异步计算。
//! 每个事实携带自己的缓存策略，由 [`Almanac`](crate::almanac::Almanac) 在解析时应用。

use crate::almanac::Almanac;
use crate::error::{Result, RuleError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 事实参数，同一事实的不同参数组合分别缓存
pub type FactParams = Map<String, Value>;

/// 事实计算函数
///
/// 计算过程中可以通过 `almanac` 重入解析其他事实。
/// 可缓存的事实以相同参数解析自身时会等待自己持有的计算锁，永远不会返回；
/// 不缓存的事实则会无限递归。调用方需要避免自引用的事实图。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FactCompute: Send + Sync {
    async fn compute(&self, params: FactParams, almanac: Almanac) -> Result<Value>;
}

/// 常量计算：始终返回同一个值
struct ConstantCompute(Value);

#[async_trait]
impl FactCompute for ConstantCompute {
    async fn compute(&self, _params: FactParams, _almanac: Almanac) -> Result<Value> {
        Ok(self.0.clone())
    }
}

/// 闭包计算
struct FnCompute<F>(F);

#[async_trait]
impl<F, Fut> FactCompute for FnCompute<F>
where
    F: Fn(FactParams, Almanac) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn compute(&self, params: FactParams, almanac: Almanac) -> Result<Value> {
        (self.0)(params, almanac).await
    }
}

/// 事实选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactOptions {
    /// 是否缓存计算结果
    pub cache: bool,
    /// 缓存过期秒数，0 表示永不过期
    pub cache_expiration_secs: u64,
    /// 建议的评估优先级，数值越大越先评估
    pub priority: i32,
}

impl Default for FactOptions {
    fn default() -> Self {
        Self {
            cache: true,
            cache_expiration_secs: 0,
            priority: 1,
        }
    }
}

impl FactOptions {
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_expiration_secs(mut self, secs: u64) -> Self {
        self.cache_expiration_secs = secs;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// 事实定义
///
/// 构造后不可变，克隆只增加计算函数的引用计数。
#[derive(Clone)]
pub struct Fact {
    id: String,
    compute: Arc<dyn FactCompute>,
    options: FactOptions,
}

impl Fact {
    /// 使用自定义计算函数创建事实
    pub fn new(id: impl Into<String>, compute: impl FactCompute + 'static) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RuleError::InvalidArgument("事实 ID 不能为空".to_string()));
        }

        Ok(Self {
            id,
            compute: Arc::new(compute),
            options: FactOptions::default(),
        })
    }

    /// 使用异步闭包创建事实
    ///
    /// ```ignore
    /// let fact = Fact::from_fn("account", |params, _almanac| async move {
    ///     let id = params.get("id").cloned().unwrap_or_default();
    ///     Ok(json!({ "id": id, "balance": 100 }))
    /// })?;
    /// ```
    pub fn from_fn<F, Fut>(id: impl Into<String>, f: F) -> Result<Self>
    where
        F: Fn(FactParams, Almanac) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(id, FnCompute(f))
    }

    /// 创建常量事实
    ///
    /// 常量事实同样经过缓存路径，重复计算没有额外开销。
    pub fn constant(id: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::new(id, ConstantCompute(value.into()))
    }

    pub fn with_options(mut self, options: FactOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &FactOptions {
        &self.options
    }

    pub fn cache_enabled(&self) -> bool {
        self.options.cache
    }

    pub fn priority(&self) -> i32 {
        self.options.priority
    }

    /// 调用计算函数
    pub async fn calculate(&self, params: FactParams, almanac: Almanac) -> Result<Value> {
        self.compute.compute(params, almanac).await
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fact")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
