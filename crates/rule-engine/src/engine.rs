//! 规则引擎
//!
//! 持有规则存储与事实定义。每次运行创建（或复用调用方传入的）Almanac，
//! 按优先级从高到低分层评估规则，同一层内的规则并发评估。

use almanac_shared::config::EngineConfig;
use almanac_shared::observability::metrics as names;
use dashmap::DashMap;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::almanac::{Almanac, AlmanacOptions};
use crate::compiler::CompiledRule;
use crate::error::Result;
use crate::executor::RuleExecutor;
use crate::fact::Fact;
use crate::models::{EngineResult, Rule};
use crate::path::{DotPathResolver, PathResolver};
use crate::store::RuleStore;

/// 引擎选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// 每次运行创建 Almanac 时使用的选项
    pub almanac: AlmanacOptions,
    pub trace_enabled: bool,
}

impl From<&EngineConfig> for EngineOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            almanac: AlmanacOptions::from(config),
            trace_enabled: config.trace_enabled,
        }
    }
}

/// 规则引擎
#[derive(Clone)]
pub struct Engine {
    store: RuleStore,
    facts: Arc<DashMap<String, Fact>>,
    options: EngineOptions,
    path_resolver: Arc<dyn PathResolver>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            store: RuleStore::new(),
            facts: Arc::new(DashMap::new()),
            options,
            path_resolver: Arc::new(DotPathResolver),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(EngineOptions::from(config))
    }

    /// 替换默认的路径解析器
    pub fn with_path_resolver(mut self, path_resolver: Arc<dyn PathResolver>) -> Self {
        self.path_resolver = path_resolver;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// 规则存储，可直接用于批量加载或统计
    pub fn rules(&self) -> &RuleStore {
        &self.store
    }

    pub fn add_rule(&self, rule: Rule) -> Result<()> {
        self.store.load(rule)
    }

    pub fn add_rule_from_json(&self, json: &str) -> Result<String> {
        self.store.load_from_json(json)
    }

    pub fn remove_rule(&self, rule_id: &str) -> Result<()> {
        self.store.delete(rule_id)
    }

    /// 注册事实定义，之后创建的 Almanac 都会带上它
    pub fn add_fact(&self, fact: Fact) {
        debug!(fact_id = %fact.id(), "引擎注册事实");
        self.facts.insert(fact.id().to_string(), fact);
    }

    pub fn remove_fact(&self, fact_id: &str) -> bool {
        self.facts.remove(fact_id).is_some()
    }

    /// 创建一个带有全部已注册事实的 Almanac
    pub fn create_almanac(&self) -> Almanac {
        let almanac = Almanac::with_path_resolver(self.options.almanac, self.path_resolver.clone());
        for fact in self.facts.iter() {
            almanac.add_fact(fact.value().clone());
        }
        almanac
    }

    /// 以给定的运行时事实运行全部规则
    pub async fn run(&self, facts: Map<String, Value>) -> Result<EngineResult> {
        let almanac = self.create_almanac();
        self.run_with_almanac(almanac, facts).await
    }

    /// 复用调用方传入的 Almanac 运行全部规则
    ///
    /// 传入的运行时事实会覆盖 Almanac 中的同名值，缓存保持不变。
    #[instrument(skip(self, almanac, facts), fields(rules = self.store.len(), facts = facts.len()))]
    pub async fn run_with_almanac(
        &self,
        almanac: Almanac,
        facts: Map<String, Value>,
    ) -> Result<EngineResult> {
        let start = Instant::now();

        for (fact_id, value) in facts {
            almanac.add_runtime_fact(fact_id, value);
        }

        let executor = if self.options.trace_enabled {
            RuleExecutor::new().with_trace()
        } else {
            RuleExecutor::new()
        };

        let mut results = Vec::new();
        let mut failure_results = Vec::new();

        for tier in self.store.by_priority() {
            let tier_results = self.evaluate_tier(&executor, &tier, &almanac).await?;
            for result in tier_results {
                metrics::counter!(names::RULE_EVALUATIONS, "matched" => result.matched.to_string())
                    .increment(1);
                if result.matched {
                    results.push(result);
                } else {
                    failure_results.push(result);
                }
            }
        }

        let elapsed = start.elapsed();
        metrics::histogram!(names::ENGINE_RUN_DURATION).record(elapsed.as_secs_f64());
        info!(
            matched = results.len(),
            unmatched = failure_results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "规则评估完成"
        );

        Ok(EngineResult {
            events: results.iter().map(|r| r.event.clone()).collect(),
            failure_events: failure_results.iter().map(|r| r.event.clone()).collect(),
            results,
            failure_results,
            almanac,
        })
    }

    /// 并发评估同一优先级的规则，任一规则出错即中止
    async fn evaluate_tier(
        &self,
        executor: &RuleExecutor,
        tier: &[CompiledRule],
        almanac: &Almanac,
    ) -> Result<Vec<crate::models::RuleResult>> {
        debug!(
            priority = tier.first().map(|r| r.priority()),
            size = tier.len(),
            "评估优先级层"
        );
        try_join_all(tier.iter().map(|rule| executor.execute(rule, almanac))).await
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("rules", &self.store.len())
            .field("facts", &self.facts.len())
            .field("options", &self.options)
            .finish()
    }
}
