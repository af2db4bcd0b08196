//! 事实缓存存储
//!
//! 以 (事实 ID, 规范化参数) 为键缓存事实计算结果，支持三种失效方式：
//! 显式失效、TTL 过期、容量淘汰。
//!
//! ## 设计决策
//!
//! - 过期在读取时惰性检查，不启动后台清理任务；过期但再未被读取的条目
//!   会一直占用空间，直到被清空、失效或因容量压力被淘汰
//! - 容量淘汰按创建时间选择最早的条目，读取不会刷新条目的位置；
//!   覆盖写入会重新打上创建时间
//! - 条目与创建顺序索引由同一把锁保护，保证两者始终一致

use almanac_shared::observability::metrics as names;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::fact::FactParams;

/// 缓存键
///
/// 参数按键名排序后序列化，插入顺序不同的等价参数得到同一个键。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    fact_id: String,
    params: String,
}

impl CacheKey {
    pub fn new(fact_id: &str, params: &FactParams) -> Self {
        Self {
            fact_id: fact_id.to_string(),
            params: canonical_params(params),
        }
    }

    pub fn fact_id(&self) -> &str {
        &self.fact_id
    }

    pub fn params(&self) -> &str {
        &self.params
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.fact_id)
        } else {
            write!(f, "{}{}", self.fact_id, self.params)
        }
    }
}

/// 规范化参数
///
/// 空参数返回空串；否则按键名排序后序列化为 JSON 对象。
fn canonical_params(params: &FactParams) -> String {
    if params.is_empty() {
        return String::new();
    }

    let sorted: BTreeMap<&String, &Value> = params.iter().collect();
    // 键为字符串的 BTreeMap 序列化不会失败
    serde_json::to_string(&sorted).unwrap_or_default()
}

/// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Value,
    created_at: Instant,
    /// None 表示永不过期
    expiration: Option<Duration>,
    /// 创建序号，用于淘汰时定位最早的条目
    seq: u64,
}

impl CacheEntry {
    fn new(value: Value, expiration_secs: u64, seq: u64) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            expiration: (expiration_secs > 0).then(|| Duration::from_secs(expiration_secs)),
            seq,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expiration {
            // 无法表示的截止时间视为永不过期
            Some(ttl) => self
                .created_at
                .checked_add(ttl)
                .is_some_and(|deadline| now >= deadline),
            None => false,
        }
    }
}

struct StoreInner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// 创建序号 -> 键，首个元素即最早创建的条目
    order: BTreeMap<u64, CacheKey>,
    next_seq: u64,
    inserts: u64,
    evictions: u64,
    expirations: u64,
}

impl StoreInner {
    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<CacheKey> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// 缓存存储
pub struct CacheStore {
    inner: Mutex<StoreInner>,
    /// 0 表示不限制
    max_size: usize,
}

impl CacheStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
                inserts: 0,
                evictions: 0,
                expirations: 0,
            }),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// 读取缓存
    ///
    /// 条目已过期时在本次检查中将其清除，并按未命中返回。
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(),
        };

        if expired {
            inner.remove(key);
            inner.expirations += 1;
            metrics::counter!(names::CACHE_EXPIRATIONS).increment(1);
            debug!(key = %key, "缓存条目已过期，已清除");
            return None;
        }

        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// 写入缓存
    ///
    /// 写入新键且存储已满时，先淘汰创建时间最早的条目。覆盖已有键不触发淘汰。
    pub fn put(&self, key: CacheKey, value: Value, expiration_secs: u64) {
        let mut inner = self.inner.lock();

        if inner.remove(&key).is_none() && self.max_size > 0 {
            while inner.entries.len() >= self.max_size {
                match inner.evict_oldest() {
                    Some(evicted) => {
                        inner.evictions += 1;
                        metrics::counter!(names::CACHE_EVICTIONS).increment(1);
                        debug!(evicted = %evicted, "缓存已满，淘汰最早创建的条目");
                    }
                    None => break,
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.inserts += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(key, CacheEntry::new(value, expiration_secs, seq));
    }

    /// 移除某个事实的全部参数变体，返回移除数量
    pub fn invalidate_fact(&self, fact_id: &str) -> usize {
        let mut inner = self.inner.lock();

        let keys: Vec<CacheKey> = inner
            .entries
            .keys()
            .filter(|key| key.fact_id == fact_id)
            .cloned()
            .collect();

        for key in &keys {
            inner.remove(key);
        }

        keys.len()
    }

    /// 清空全部条目，返回移除数量
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        count
    }

    /// 当前条目数（包括尚未被读取清除的过期条目）
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// 是否存在未过期的条目，不会清除过期条目
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// 按创建顺序（从早到晚）列出当前的键
    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner.lock().order.values().cloned().collect()
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            max_size: self.max_size,
            inserts: inner.inserts,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .finish()
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// 当前条目数
    pub entries: usize,
    /// 容量上限，0 表示不限制
    pub max_size: usize,
    /// 累计写入次数
    pub inserts: u64,
    /// 累计容量淘汰次数
    pub evictions: u64,
    /// 累计过期清除次数
    pub expirations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> FactParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn key(fact_id: &str) -> CacheKey {
        CacheKey::new(fact_id, &FactParams::new())
    }

    #[test]
    fn test_key_is_order_independent() {
        let mut a = FactParams::new();
        a.insert("userId".to_string(), json!("A"));
        a.insert("region".to_string(), json!("cn"));

        let mut b = FactParams::new();
        b.insert("region".to_string(), json!("cn"));
        b.insert("userId".to_string(), json!("A"));

        assert_eq!(CacheKey::new("profile", &a), CacheKey::new("profile", &b));
        assert_eq!(
            CacheKey::new("profile", &a).params(),
            r#"{"region":"cn","userId":"A"}"#
        );
    }

    #[test]
    fn test_key_distinguishes_params_and_fact() {
        let a = CacheKey::new("profile", &params(&[("userId", json!("A"))]));
        let b = CacheKey::new("profile", &params(&[("userId", json!("B"))]));
        let c = CacheKey::new("account", &params(&[("userId", json!("A"))]));

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(key("profile").to_string(), "profile");
        assert_eq!(a.to_string(), r#"profile{"userId":"A"}"#);
    }

    #[test]
    fn test_put_and_get() {
        let store = CacheStore::new(0);
        store.put(key("user"), json!({"id": 1}), 0);

        assert_eq!(store.get(&key("user")), Some(json!({"id": 1})));
        assert_eq!(store.get(&key("missing")), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let store = CacheStore::new(0);
        store.put(key("user"), json!(1), 0);
        store.put(key("user"), json!(2), 0);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key("user")), Some(json!(2)));
        assert_eq!(store.stats().inserts, 2);
    }

    #[test]
    fn test_zero_expiration_never_expires() {
        let entry = CacheEntry::new(json!(1), 0, 0);
        let far_future = entry.created_at() + Duration::from_secs(365 * 24 * 3600);
        assert!(!entry.is_expired_at(far_future));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_expiration_never_expires() {
        let store = CacheStore::new(0);
        store.put(key("cfg"), json!(1), u64::MAX);

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;

        assert!(store.contains(&key("cfg")));
        assert_eq!(store.get(&key("cfg")), Some(json!(1)));
        assert_eq!(store.get(&key("cfg")), Some(json!(1)));
        assert_eq!(store.stats().expirations, 0);
    }

    #[test]
    fn test_expiration_boundary() {
        let entry = CacheEntry::new(json!(1), 1, 0);
        let created = entry.created_at();

        assert!(!entry.is_expired_at(created + Duration::from_millis(999)));
        assert!(entry.is_expired_at(created + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_purged_on_get() {
        let store = CacheStore::new(0);
        store.put(key("rate"), json!(6.5), 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(store.get(&key("rate")), Some(json!(6.5)));

        tokio::time::advance(Duration::from_millis(600)).await;
        // 过期条目在读取前仍然占用空间
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&key("rate")));

        assert_eq!(store.get(&key("rate")), None);
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_capacity_evicts_oldest_created() {
        let store = CacheStore::new(3);
        for i in 1..=5 {
            store.put(key(&format!("fact-{}", i)), json!(i), 0);
            assert!(store.len() <= 3);
        }

        assert_eq!(
            store.keys(),
            vec![key("fact-3"), key("fact-4"), key("fact-5")]
        );
        assert_eq!(store.stats().evictions, 2);
    }

    #[test]
    fn test_read_does_not_refresh_position() {
        let store = CacheStore::new(2);
        store.put(key("a"), json!(1), 0);
        store.put(key("b"), json!(2), 0);

        // 读取 a 不会改变其淘汰顺序
        assert!(store.get(&key("a")).is_some());
        store.put(key("c"), json!(3), 0);

        assert!(!store.contains(&key("a")));
        assert!(store.contains(&key("b")));
        assert!(store.contains(&key("c")));
    }

    #[test]
    fn test_overwrite_does_not_evict_and_refreshes_creation() {
        let store = CacheStore::new(2);
        store.put(key("a"), json!(1), 0);
        store.put(key("b"), json!(2), 0);

        // 覆盖已有键不触发淘汰
        store.put(key("a"), json!(10), 0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions, 0);

        // a 重新创建后，b 成为最早的条目
        store.put(key("c"), json!(3), 0);
        assert_eq!(store.keys(), vec![key("a"), key("c")]);
    }

    #[test]
    fn test_invalidate_fact_removes_all_variants() {
        let store = CacheStore::new(0);
        store.put(CacheKey::new("profile", &params(&[("userId", json!("A"))])), json!("a"), 0);
        store.put(CacheKey::new("profile", &params(&[("userId", json!("B"))])), json!("b"), 0);
        store.put(key("profile"), json!("none"), 0);
        store.put(key("account"), json!(1), 0);

        assert_eq!(store.invalidate_fact("profile"), 3);
        assert_eq!(store.keys(), vec![key("account")]);
        assert_eq!(store.invalidate_fact("missing"), 0);
    }

    #[test]
    fn test_clear() {
        let store = CacheStore::new(0);
        store.put(key("a"), json!(1), 0);
        store.put(key("b"), json!(2), 0);

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
        assert!(store.keys().is_empty());
    }
}
