//! 规则存储管理
//!
//! 使用 DashMap 提供线程安全的规则存储，支持规则的加载、更新、删除，
//! 以及按优先级分层取出规则供引擎评估。

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::{Result, RuleError};
use crate::models::Rule;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则存储
#[derive(Clone)]
pub struct RuleStore {
    rules: Arc<DashMap<String, CompiledRule>>,
    compiler: Arc<parking_lot::Mutex<RuleCompiler>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
            compiler: Arc::new(parking_lot::Mutex::new(RuleCompiler::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 加载规则，同 ID 的规则会被替换
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, rule_name = %rule.name))]
    pub fn load(&self, rule: Rule) -> Result<()> {
        let compiled = self.compiler.lock().compile(rule)?;

        let rule_id = compiled.id().to_string();
        self.rules.insert(rule_id.clone(), compiled);

        info!("规则已加载: {}", rule_id);
        Ok(())
    }

    /// 加载规则（从 JSON 字符串）
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<String> {
        let compiled = self.compiler.lock().compile_from_json(json)?;

        let rule_id = compiled.id().to_string();
        self.rules.insert(rule_id.clone(), compiled);

        info!("规则已加载: {}", rule_id);
        Ok(rule_id)
    }

    /// 更新已存在的规则
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub fn update(&self, rule: Rule) -> Result<()> {
        if !self.rules.contains_key(&rule.id) {
            warn!("更新不存在的规则: {}", rule.id);
            return Err(RuleError::RuleNotFound(rule.id));
        }

        self.load(rule)
    }

    /// 删除规则
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<()> {
        if self.rules.remove(rule_id).is_some() {
            info!("规则已删除: {}", rule_id);
            Ok(())
        } else {
            warn!("删除不存在的规则: {}", rule_id);
            Err(RuleError::RuleNotFound(rule_id.to_string()))
        }
    }

    pub fn get(&self, rule_id: &str) -> Option<CompiledRule> {
        self.rules.get(rule_id).map(|r| r.clone())
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.key().clone()).collect()
    }

    pub fn list_all(&self) -> Vec<CompiledRule> {
        self.rules.iter().map(|r| r.value().clone()).collect()
    }

    /// 按优先级分层
    ///
    /// 外层按优先级从高到低排列，同一层内按规则 ID 排序以保证结果稳定。
    pub fn by_priority(&self) -> Vec<Vec<CompiledRule>> {
        let mut tiers: BTreeMap<i32, Vec<CompiledRule>> = BTreeMap::new();
        for rule in self.rules.iter() {
            tiers
                .entry(rule.priority())
                .or_default()
                .push(rule.value().clone());
        }

        tiers
            .into_values()
            .rev()
            .map(|mut tier| {
                tier.sort_by(|a, b| a.id().cmp(b.id()));
                tier
            })
            .collect()
    }

    /// 批量加载规则，单条失败不影响其余规则
    #[instrument(skip(self, rules))]
    pub fn load_batch(&self, rules: Vec<Rule>) -> Result<Vec<String>> {
        let mut loaded_ids = Vec::with_capacity(rules.len());
        let mut errors = Vec::new();

        for rule in rules {
            let rule_id = rule.id.clone();
            match self.load(rule) {
                Ok(()) => loaded_ids.push(rule_id),
                Err(e) => errors.push((rule_id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded_ids.len(), errors.len());
        Ok(loaded_ids)
    }

    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }

    /// 获取规则统计信息
    pub fn stats(&self) -> RuleStoreStats {
        let rules_count = self.rules.len();
        let total_facts: usize = self.rules.iter().map(|r| r.required_facts.len()).sum();

        RuleStoreStats {
            rules_count,
            total_facts,
            avg_facts_per_rule: if rules_count > 0 {
                total_facts as f64 / rules_count as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 规则存储统计信息
#[derive(Debug, Clone)]
pub struct RuleStoreStats {
    pub rules_count: usize,
    /// 所有规则引用的事实总数
    pub total_facts: usize,
    pub avg_facts_per_rule: f64,
}
