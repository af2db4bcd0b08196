//! 规则编译器
//!
//! 将 JSON 规则解析并校验，预先提取规则引用的全部事实 ID。

use crate::error::{Result, RuleError};
use crate::models::{Condition, ConditionValue, Event, Rule, RuleNode};
use std::collections::HashSet;

/// 编译后的规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// 原始规则
    pub rule: Rule,
    /// 规则引用的所有事实 ID（包括作为比较值引用的事实）
    pub required_facts: HashSet<String>,
    /// 编译版本号
    pub compile_version: u64,
}

impl CompiledRule {
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn name(&self) -> &str {
        &self.rule.name
    }

    pub fn priority(&self) -> i32 {
        self.rule.priority
    }

    pub fn conditions(&self) -> &RuleNode {
        &self.rule.conditions
    }

    pub fn event(&self) -> &Event {
        &self.rule.event
    }
}

/// 规则编译器
pub struct RuleCompiler {
    compile_version: u64,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self { compile_version: 0 }
    }

    /// 从 JSON 字符串编译规则
    pub fn compile_from_json(&mut self, json: &str) -> Result<CompiledRule> {
        let rule: Rule = serde_json::from_str(json)?;
        self.compile(rule)
    }

    /// 编译规则
    pub fn compile(&mut self, rule: Rule) -> Result<CompiledRule> {
        self.validate_rule(&rule)?;

        let mut required_facts = HashSet::new();
        Self::collect_facts(&rule.conditions, &mut required_facts);

        self.compile_version += 1;

        Ok(CompiledRule {
            rule,
            required_facts,
            compile_version: self.compile_version,
        })
    }

    /// 验证规则结构
    fn validate_rule(&self, rule: &Rule) -> Result<()> {
        if rule.id.is_empty() {
            return Err(RuleError::ParseError("规则 ID 不能为空".to_string()));
        }

        if rule.name.is_empty() {
            return Err(RuleError::ParseError("规则名称不能为空".to_string()));
        }

        if rule.event.event_type.is_empty() {
            return Err(RuleError::ParseError(format!(
                "规则 '{}' 的事件类型不能为空",
                rule.id
            )));
        }

        self.validate_node(&rule.conditions, "conditions")
    }

    /// 验证规则节点
    fn validate_node(&self, node: &RuleNode, path: &str) -> Result<()> {
        match node {
            RuleNode::Condition(cond) => self.validate_condition(cond, path),
            RuleNode::Group(group) => {
                if group.children.is_empty() {
                    return Err(RuleError::ParseError(format!(
                        "逻辑组 '{}' 不能为空",
                        path
                    )));
                }

                for (i, child) in group.children.iter().enumerate() {
                    let child_path = format!("{}.children[{}]", path, i);
                    self.validate_node(child, &child_path)?;
                }
                Ok(())
            }
            RuleNode::Not(not) => self.validate_node(&not.condition, &format!("{}.not", path)),
        }
    }

    /// 验证条件
    fn validate_condition(&self, cond: &Condition, path: &str) -> Result<()> {
        if cond.fact.is_empty() {
            return Err(RuleError::ParseError(format!(
                "条件 '{}' 的事实不能为空",
                path
            )));
        }

        match &cond.value {
            ConditionValue::Fact(reference) if reference.fact.is_empty() => {
                Err(RuleError::ParseError(format!(
                    "条件 '{}' 引用的事实不能为空",
                    path
                )))
            }
            // 事实引用的值在运行时才能确定，这里只校验字面值
            ConditionValue::Literal(value) if cond.operator.expects_array() && !value.is_array() => {
                Err(RuleError::ParseError(format!(
                    "条件 '{}' 的 {} 操作符需要数组值",
                    path, cond.operator
                )))
            }
            _ => Ok(()),
        }
    }

    /// 递归收集事实 ID
    fn collect_facts(node: &RuleNode, facts: &mut HashSet<String>) {
        match node {
            RuleNode::Condition(cond) => {
                facts.insert(cond.fact.clone());
                if let ConditionValue::Fact(reference) = &cond.value {
                    facts.insert(reference.fact.clone());
                }
            }
            RuleNode::Group(group) => {
                for child in &group.children {
                    Self::collect_facts(child, facts);
                }
            }
            RuleNode::Not(not) => Self::collect_facts(&not.condition, facts),
        }
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}
