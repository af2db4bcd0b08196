//! 事实解析引擎 (Almanac)
//!
//! 回答"事实 X 在参数 P 下当前的值是什么"，解析顺序为：
//! 运行时事实 → 缓存 → 计算。一个 Almanac 对应一次评估会话，
//! 调用方显式传入同一个实例时缓存可以跨多次运行复用。
//!
//! ## 并发语义
//!
//! 可缓存的事实在并发访问下对同一 (事实 ID, 参数) 至多计算一次：
//! 每个缓存键对应一把异步互斥锁，拿到锁后先复查缓存，未命中才调用计算函数。
//! 等待者在锁释放后直接读到已写入的值。不同键之间互不阻塞，
//! 计算函数内部重入解析其他事实是安全的。

use almanac_shared::config::EngineConfig;
use almanac_shared::observability::metrics as names;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStats, CacheStore};
use crate::error::{Result, RuleError};
use crate::fact::{Fact, FactParams};
use crate::path::{DotPathResolver, PathResolver};

/// Almanac 选项，构造后固定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlmanacOptions {
    /// 为 true 时，未注册的事实解析为 null；否则返回 UndefinedFact 错误
    pub allow_undefined_facts: bool,
    /// 缓存总开关，关闭后不读也不写缓存
    pub enable_fact_caching: bool,
    /// 缓存条目上限，0 表示不限制
    pub cache_max_size: usize,
}

impl Default for AlmanacOptions {
    fn default() -> Self {
        Self {
            allow_undefined_facts: false,
            enable_fact_caching: true,
            cache_max_size: 0,
        }
    }
}

impl AlmanacOptions {
    pub fn with_allow_undefined_facts(mut self, allow: bool) -> Self {
        self.allow_undefined_facts = allow;
        self
    }

    pub fn with_fact_caching(mut self, enabled: bool) -> Self {
        self.enable_fact_caching = enabled;
        self
    }

    pub fn with_cache_max_size(mut self, max_size: usize) -> Self {
        self.cache_max_size = max_size;
        self
    }
}

impl From<&EngineConfig> for AlmanacOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            allow_undefined_facts: config.allow_undefined_facts,
            enable_fact_caching: config.enable_fact_caching,
            cache_max_size: config.cache_max_size,
        }
    }
}

struct AlmanacInner {
    options: AlmanacOptions,
    /// 事实定义注册表
    facts: DashMap<String, Fact>,
    /// 运行时事实，优先于注册的事实，不参与缓存
    runtime_facts: DashMap<String, Value>,
    cache: CacheStore,
    /// 正在计算的缓存键
    in_flight: DashMap<CacheKey, Arc<Mutex<()>>>,
    path_resolver: Arc<dyn PathResolver>,
}

/// 事实解析引擎
///
/// 克隆只复制内部引用，所有克隆共享同一份注册表和缓存。
#[derive(Clone)]
pub struct Almanac {
    inner: Arc<AlmanacInner>,
}

impl Almanac {
    pub fn new(options: AlmanacOptions) -> Self {
        Self::with_path_resolver(options, Arc::new(DotPathResolver))
    }

    pub fn with_path_resolver(options: AlmanacOptions, path_resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            inner: Arc::new(AlmanacInner {
                options,
                facts: DashMap::new(),
                runtime_facts: DashMap::new(),
                cache: CacheStore::new(options.cache_max_size),
                in_flight: DashMap::new(),
                path_resolver,
            }),
        }
    }

    pub fn options(&self) -> &AlmanacOptions {
        &self.inner.options
    }

    /// 注册事实定义
    ///
    /// 同 ID 重复注册时静默覆盖旧定义，并丢弃旧定义留下的缓存条目。
    pub fn add_fact(&self, fact: Fact) {
        let fact_id = fact.id().to_string();
        if self.inner.facts.insert(fact_id.clone(), fact).is_some() {
            let dropped = self.inner.cache.invalidate_fact(&fact_id);
            debug!(fact_id = %fact_id, dropped, "事实定义已覆盖");
        } else {
            debug!(fact_id = %fact_id, "事实已注册");
        }
    }

    /// 设置运行时事实，后写覆盖先写
    ///
    /// 运行时事实在会话剩余时间内遮蔽同名的注册事实。
    pub fn add_runtime_fact(&self, fact_id: impl Into<String>, value: impl Into<Value>) {
        let fact_id = fact_id.into();
        debug!(fact_id = %fact_id, "运行时事实已设置");
        self.inner.runtime_facts.insert(fact_id, value.into());
    }

    /// 是否存在该事实（运行时事实或注册事实）
    pub fn has_fact(&self, fact_id: &str) -> bool {
        self.inner.runtime_facts.contains_key(fact_id) || self.inner.facts.contains_key(fact_id)
    }

    /// 获取事实的建议优先级，运行时事实与未知事实为 None
    pub fn fact_priority(&self, fact_id: &str) -> Option<i32> {
        if self.inner.runtime_facts.contains_key(fact_id) {
            return None;
        }
        self.inner.facts.get(fact_id).map(|f| f.priority())
    }

    /// 解析事实值
    ///
    /// 解析顺序：
    /// 1. 运行时事实直接返回，忽略参数
    /// 2. 未注册的事实按 `allow_undefined_facts` 返回 null 或 UndefinedFact 错误
    /// 3. 全局与事实自身缓存均开启时，命中缓存直接返回，不调用计算函数
    /// 4. 否则调用计算函数，可缓存时写入结果
    ///
    /// 计算函数的错误原样返回，失败的结果不会被缓存。
    pub async fn fact_value(&self, fact_id: &str, params: Option<&FactParams>) -> Result<Value> {
        if let Some(value) = self.inner.runtime_facts.get(fact_id) {
            return Ok(value.clone());
        }

        // 克隆出事实定义，避免跨 await 持有 DashMap 的分片锁
        let fact = match self.inner.facts.get(fact_id) {
            Some(fact) => fact.clone(),
            None if self.inner.options.allow_undefined_facts => {
                debug!(fact_id = %fact_id, "未定义的事实，返回 null");
                return Ok(Value::Null);
            }
            None => {
                warn!(fact_id = %fact_id, "解析未定义的事实");
                return Err(RuleError::UndefinedFact(fact_id.to_string()));
            }
        };

        let params = params.cloned().unwrap_or_default();

        if !self.is_cacheable(&fact) {
            metrics::counter!(names::FACT_CACHE_MISSES).increment(1);
            return self.compute(&fact, params).await;
        }

        let key = CacheKey::new(fact_id, &params);
        if let Some(value) = self.inner.cache.get(&key) {
            metrics::counter!(names::FACT_CACHE_HITS).increment(1);
            debug!(key = %key, "事实缓存命中");
            return Ok(value);
        }

        let flight = self.in_flight(&key);
        let result = {
            let _guard = flight.lock().lock().await;

            // 等待期间其他任务可能已完成计算
            if let Some(value) = self.inner.cache.get(&key) {
                metrics::counter!(names::FACT_CACHE_HITS).increment(1);
                debug!(key = %key, "等待并发计算后命中缓存");
                Ok(value)
            } else {
                metrics::counter!(names::FACT_CACHE_MISSES).increment(1);
                let result = self.compute(&fact, params).await;
                if let Ok(value) = &result {
                    self.inner.cache.put(
                        key.clone(),
                        value.clone(),
                        fact.options().cache_expiration_secs,
                    );
                }
                result
            }
        };
        drop(flight);

        result
    }

    /// 解析事实值并按路径取出嵌套属性，路径不存在时返回 null
    pub async fn fact_value_at(
        &self,
        fact_id: &str,
        params: Option<&FactParams>,
        path: Option<&str>,
    ) -> Result<Value> {
        let value = self.fact_value(fact_id, params).await?;

        match path {
            Some(path) => Ok(self
                .inner
                .path_resolver
                .resolve(&value, path)
                .unwrap_or(Value::Null)),
            None => Ok(value),
        }
    }

    /// 清空缓存，不影响运行时事实与事实注册
    pub fn clear_cache(&self) {
        let cleared = self.inner.cache.clear();
        debug!(cleared, "事实缓存已清空");
    }

    /// 使某个事实的全部参数变体失效，不影响运行时事实与事实注册
    pub fn invalidate_cache(&self, fact_id: &str) {
        let removed = self.inner.cache.invalidate_fact(fact_id);
        debug!(fact_id = %fact_id, removed, "事实缓存已失效");
    }

    /// 当前缓存条目数
    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    /// 某个事实与参数组合是否有未过期的缓存
    pub fn is_cached(&self, fact_id: &str, params: Option<&FactParams>) -> bool {
        let key = match params {
            Some(params) => CacheKey::new(fact_id, params),
            None => CacheKey::new(fact_id, &FactParams::new()),
        };
        self.inner.cache.contains(&key)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    fn is_cacheable(&self, fact: &Fact) -> bool {
        self.inner.options.enable_fact_caching && fact.cache_enabled()
    }

    async fn compute(&self, fact: &Fact, params: FactParams) -> Result<Value> {
        metrics::counter!(names::FACT_COMPUTATIONS).increment(1);
        debug!(fact_id = %fact.id(), "计算事实");

        let result = fact.calculate(params, self.clone()).await;
        if let Err(e) = &result {
            metrics::counter!(names::FACT_COMPUTE_FAILURES).increment(1);
            warn!(fact_id = %fact.id(), error = %e, "事实计算失败");
        }
        result
    }

    /// 取得该键的计算锁，返回的守卫被丢弃时（包括 future 被取消）释放登记
    fn in_flight(&self, key: &CacheKey) -> InFlight<'_> {
        let lock = self
            .inner
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        InFlight {
            table: &self.inner.in_flight,
            key: key.clone(),
            lock: Some(lock),
        }
    }
}

/// 正在计算的键的登记
///
/// 丢弃时先释放自己的引用，再在没有其他持有者时从登记表移除该键。
/// 判断与移除在同一个分片锁内完成，新的等待者只能通过同一分片取得锁的引用。
struct InFlight<'a> {
    table: &'a DashMap<CacheKey, Arc<Mutex<()>>>,
    key: CacheKey,
    lock: Option<Arc<Mutex<()>>>,
}

impl InFlight<'_> {
    fn lock(&self) -> &Mutex<()> {
        match &self.lock {
            Some(lock) => lock,
            None => unreachable!("锁引用只在 drop 时取走"),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.lock.take();
        self.table
            .remove_if(&self.key, |_, held| Arc::strong_count(held) == 1);
    }
}

impl fmt::Debug for Almanac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Almanac")
            .field("options", &self.inner.options)
            .field("facts", &self.inner.facts.len())
            .field("runtime_facts", &self.inner.runtime_facts.len())
            .field("cache", &self.inner.cache)
            .finish()
    }
}
