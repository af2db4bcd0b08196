//! 规则执行器
//!
//! 针对 Almanac 对规则条件树做短路求值，返回匹配结果和评估追踪信息。
//! 条件所需的事实值全部经由 Almanac 解析，因此同一会话中重复引用的事实只计算一次。

use crate::almanac::Almanac;
use crate::compiler::CompiledRule;
use crate::error::Result;
use crate::evaluator::ConditionEvaluator;
use crate::models::{Condition, LogicalGroup, RuleNode, RuleResult};
use crate::operators::LogicalOperator;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Instant;

/// 规则执行器
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleExecutor {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 执行规则评估
    pub async fn execute(&self, rule: &CompiledRule, almanac: &Almanac) -> Result<RuleResult> {
        let start = Instant::now();

        let mut result = RuleResult::new(
            rule.id().to_string(),
            rule.name().to_string(),
            rule.priority(),
            rule.event().clone(),
        );

        let matched = self
            .evaluate_node(rule.conditions(), almanac, &mut result, "conditions".to_string())
            .await?;

        result.matched = matched;
        result.evaluation_time_ms = start.elapsed().as_millis() as i64;

        Ok(result)
    }

    /// 递归评估规则节点
    fn evaluate_node<'a>(
        &'a self,
        node: &'a RuleNode,
        almanac: &'a Almanac,
        result: &'a mut RuleResult,
        path: String,
    ) -> BoxFuture<'a, Result<bool>> {
        async move {
            match node {
                RuleNode::Condition(cond) => {
                    self.evaluate_condition(cond, almanac, result, &path).await
                }
                RuleNode::Group(group) => self.evaluate_group(group, almanac, result, &path).await,
                RuleNode::Not(not) => {
                    let child_path = format!("{}.not", path);
                    let matched = self
                        .evaluate_node(&not.condition, almanac, result, child_path)
                        .await?;
                    if self.trace_enabled {
                        result
                            .evaluation_trace
                            .push(format!("{}: NOT => {}", path, !matched));
                    }
                    Ok(!matched)
                }
            }
        }
        .boxed()
    }

    /// 评估条件节点
    async fn evaluate_condition(
        &self,
        cond: &Condition,
        almanac: &Almanac,
        result: &mut RuleResult,
        path: &str,
    ) -> Result<bool> {
        let fact_value = almanac
            .fact_value_at(&cond.fact, cond.params.as_ref(), cond.path.as_deref())
            .await?;
        let expected = cond.value.resolve(almanac).await?;

        let matched = ConditionEvaluator::evaluate(&fact_value, cond.operator, &expected)?;

        if self.trace_enabled {
            result.evaluation_trace.push(format!(
                "{}: {}({}) {} {} => {}",
                path,
                cond.fact,
                fact_value,
                cond.operator,
                expected,
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            ));
        }

        if matched {
            result.matched_conditions.push(format!(
                "{}.{} {} {}",
                path, cond.fact, cond.operator, cond.value
            ));
        }

        Ok(matched)
    }

    /// 评估逻辑组节点（短路求值）
    ///
    /// 子节点按所引用事实的建议优先级从高到低评估，同优先级保持定义顺序。
    async fn evaluate_group(
        &self,
        group: &LogicalGroup,
        almanac: &Almanac,
        result: &mut RuleResult,
        path: &str,
    ) -> Result<bool> {
        if self.trace_enabled {
            result.evaluation_trace.push(format!(
                "{}: 开始评估 {} 组 (共 {} 个子节点)",
                path,
                group.operator,
                group.children.len()
            ));
        }

        let mut order: Vec<usize> = (0..group.children.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(Self::node_priority(&group.children[i], almanac)));

        let short_circuit_on = match group.operator {
            LogicalOperator::And => false,
            LogicalOperator::Or => true,
        };

        for i in order {
            let child_path = format!("{}.children[{}]", path, i);
            let child_matched = self
                .evaluate_node(&group.children[i], almanac, result, child_path)
                .await?;

            if child_matched == short_circuit_on {
                if self.trace_enabled {
                    let verdict = if child_matched { "匹配" } else { "不匹配" };
                    result.evaluation_trace.push(format!(
                        "{}: {} 短路 - 子节点 {} {}",
                        path, group.operator, i, verdict
                    ));
                }
                return Ok(short_circuit_on);
            }
        }

        if self.trace_enabled {
            let summary = match group.operator {
                LogicalOperator::And => "AND 组全部匹配",
                LogicalOperator::Or => "OR 组无匹配",
            };
            result.evaluation_trace.push(format!("{}: {}", path, summary));
        }
        Ok(!short_circuit_on)
    }

    /// 节点的建议优先级：取其引用事实中的最大值，未注册或运行时事实按 1 计
    fn node_priority(node: &RuleNode, almanac: &Almanac) -> i32 {
        match node {
            RuleNode::Condition(cond) => almanac.fact_priority(&cond.fact).unwrap_or(1),
            RuleNode::Group(group) => group
                .children
                .iter()
                .map(|child| Self::node_priority(child, almanac))
                .max()
                .unwrap_or(1),
            RuleNode::Not(not) => Self::node_priority(&not.condition, almanac),
        }
    }
}
