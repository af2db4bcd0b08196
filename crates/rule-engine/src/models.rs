//! 规则引擎领域模型

use crate::almanac::Almanac;
use crate::fact::FactParams;
use crate::operators::{LogicalOperator, Operator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

fn default_priority() -> i32 {
    1
}

/// 规则定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    /// 优先级高的规则先评估，同优先级的规则并发评估
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub conditions: RuleNode,
    pub event: Event,
}

impl Rule {
    pub fn new(name: impl Into<String>, conditions: RuleNode, event: Event) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            priority: default_priority(),
            conditions,
            event,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// 规则匹配（或不匹配）时产出的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub params: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// 规则节点（条件、逻辑组或取反）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleNode {
    Condition(Condition),
    Group(LogicalGroup),
    Not(NotNode),
}

impl RuleNode {
    pub fn not(node: RuleNode) -> Self {
        Self::Not(NotNode {
            condition: Box::new(node),
        })
    }
}

/// 条件节点
///
/// 左侧为事实（可带参数与路径），右侧为字面值或另一个事实的引用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub fact: String,
    pub operator: Operator,
    pub value: ConditionValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<FactParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Condition {
    pub fn new(fact: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            fact: fact.into(),
            operator,
            value: ConditionValue::Literal(value.into()),
            params: None,
            path: None,
        }
    }

    /// 右侧为另一个事实的条件
    pub fn compare_fact(fact: impl Into<String>, operator: Operator, other: FactReference) -> Self {
        Self {
            fact: fact.into(),
            operator,
            value: ConditionValue::Fact(other),
            params: None,
            path: None,
        }
    }

    pub fn with_params(mut self, params: FactParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// 条件右侧的值
///
/// 形如 `{"fact": "..."}` 且不含其他字段的对象解析为事实引用，其余都是字面值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Fact(FactReference),
    Literal(Value),
}

impl ConditionValue {
    /// 解析为实际比较值
    pub async fn resolve(&self, almanac: &Almanac) -> crate::Result<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Fact(reference) => {
                almanac
                    .fact_value_at(
                        &reference.fact,
                        reference.params.as_ref(),
                        reference.path.as_deref(),
                    )
                    .await
            }
        }
    }
}

impl std::fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{}", value),
            Self::Fact(reference) => write!(f, "fact:{}", reference.fact),
        }
    }
}

/// 事实引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactReference {
    pub fact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<FactParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl FactReference {
    pub fn new(fact: impl Into<String>) -> Self {
        Self {
            fact: fact.into(),
            params: None,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// 逻辑组节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalGroup {
    pub operator: LogicalOperator,
    pub children: Vec<RuleNode>,
}

impl LogicalGroup {
    pub fn new(operator: LogicalOperator, children: Vec<RuleNode>) -> Self {
        Self { operator, children }
    }

    pub fn and(children: Vec<RuleNode>) -> Self {
        Self::new(LogicalOperator::And, children)
    }

    pub fn or(children: Vec<RuleNode>) -> Self {
        Self::new(LogicalOperator::Or, children)
    }
}

/// 取反节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotNode {
    pub condition: Box<RuleNode>,
}

/// 单条规则的评估结果
#[derive(Debug, Clone, Serialize)]
pub struct RuleResult {
    pub matched: bool,
    pub rule_id: String,
    pub rule_name: String,
    pub priority: i32,
    pub event: Event,
    pub matched_conditions: Vec<String>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_ms: i64,
}

impl RuleResult {
    pub fn new(rule_id: String, rule_name: String, priority: i32, event: Event) -> Self {
        Self {
            matched: false,
            rule_id,
            rule_name,
            priority,
            event,
            matched_conditions: Vec::new(),
            evaluation_trace: Vec::new(),
            evaluation_time_ms: 0,
        }
    }
}

/// 一次引擎运行的结果
///
/// 附带本次运行使用的 Almanac，调用方可以继续查询事实或复用缓存。
#[derive(Debug, Clone)]
pub struct EngineResult {
    /// 匹配规则产出的事件，按评估顺序排列
    pub events: Vec<Event>,
    /// 未匹配规则的事件
    pub failure_events: Vec<Event>,
    pub results: Vec<RuleResult>,
    pub failure_results: Vec<RuleResult>,
    pub almanac: Almanac,
}

impl EngineResult {
    /// 某类事件是否被触发
    pub fn has_event(&self, event_type: &str) -> bool {
        self.events.iter().any(|e| e.event_type == event_type)
    }
}
