//! 条件评估器
//!
//! 实现各操作符的比较逻辑。事实值形状不符（包括缺失）时比较结果为 false；
//! 规则中的期望值形状不符时视为规则定义错误，返回 TypeMismatch。

use crate::error::{Result, RuleError};
use crate::operators::Operator;
use serde_json::Value;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `fact_value` - 从 Almanac 解析得到的事实值，缺失时为 null
    /// * `operator` - 操作符
    /// * `expected_value` - 规则中定义（或由事实引用解析）的期望值
    pub fn evaluate(fact_value: &Value, operator: Operator, expected_value: &Value) -> Result<bool> {
        match operator {
            Operator::Equal => Ok(Self::eq(fact_value, expected_value)),
            Operator::NotEqual => Ok(!Self::eq(fact_value, expected_value)),
            Operator::LessThan => Self::compare(fact_value, expected_value, |a, b| a < b),
            Operator::LessThanInclusive => Self::compare(fact_value, expected_value, |a, b| a <= b),
            Operator::GreaterThan => Self::compare(fact_value, expected_value, |a, b| a > b),
            Operator::GreaterThanInclusive => {
                Self::compare(fact_value, expected_value, |a, b| a >= b)
            }
            Operator::In => Self::in_list(fact_value, expected_value),
            Operator::NotIn => Self::in_list(fact_value, expected_value).map(|r| !r),
            Operator::Contains => {
                Self::contains(fact_value, expected_value).map(|r| r.unwrap_or(false))
            }
            Operator::DoesNotContain => {
                Self::contains(fact_value, expected_value).map(|r| r.is_some_and(|found| !found))
            }
            Operator::StartsWith => {
                Self::string_test(fact_value, expected_value, |s, prefix| s.starts_with(prefix))
            }
            Operator::EndsWith => {
                Self::string_test(fact_value, expected_value, |s, suffix| s.ends_with(suffix))
            }
        }
    }

    /// 相等比较
    fn eq(fact: &Value, expected: &Value) -> bool {
        let (Value::Number(a), Value::Number(b)) = (fact, expected) else {
            return fact == expected;
        };

        // 整数精确比较，超过 2^53 的整数转成 f64 会丢失精度
        if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
            return a == b;
        }

        // 任一侧是浮点数时按 f64 比较，避免 100 与 100.0 不相等
        if a.is_f64() || b.is_f64() {
            return match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                _ => false,
            };
        }

        // 负数与超出 i64 范围的正数
        false
    }

    /// 数值比较
    fn compare<F>(fact: &Value, expected: &Value, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let expected_num = expected.as_f64().ok_or_else(|| RuleError::TypeMismatch {
            expected: "number".to_string(),
            actual: Self::type_name(expected).to_string(),
        })?;

        Ok(fact.as_f64().is_some_and(|fact_num| cmp(fact_num, expected_num)))
    }

    /// 列表包含检查 (in)
    fn in_list(fact: &Value, expected: &Value) -> Result<bool> {
        let arr = expected.as_array().ok_or_else(|| RuleError::TypeMismatch {
            expected: "array".to_string(),
            actual: Self::type_name(expected).to_string(),
        })?;

        Ok(arr.iter().any(|item| Self::eq(fact, item)))
    }

    /// 字符串/数组包含检查
    ///
    /// 事实值既不是字符串也不是数组时返回 None。
    fn contains(fact: &Value, expected: &Value) -> Result<Option<bool>> {
        match fact {
            Value::String(s) => {
                let substr = expected.as_str().ok_or_else(|| RuleError::TypeMismatch {
                    expected: "string".to_string(),
                    actual: Self::type_name(expected).to_string(),
                })?;
                Ok(Some(s.contains(substr)))
            }
            Value::Array(arr) => Ok(Some(arr.iter().any(|item| Self::eq(item, expected)))),
            _ => Ok(None),
        }
    }

    /// 字符串前后缀检查
    fn string_test<F>(fact: &Value, expected: &Value, test: F) -> Result<bool>
    where
        F: Fn(&str, &str) -> bool,
    {
        let pattern = expected.as_str().ok_or_else(|| RuleError::TypeMismatch {
            expected: "string".to_string(),
            actual: Self::type_name(expected).to_string(),
        })?;

        Ok(fact.as_str().is_some_and(|s| test(s, pattern)))
    }

    /// 获取值的类型名称
    fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(fact: Value, op: Operator, expected: Value) -> bool {
        ConditionEvaluator::evaluate(&fact, op, &expected).unwrap()
    }

    #[test]
    fn test_equal_numbers() {
        assert!(eval(json!(100), Operator::Equal, json!(100)));
        assert!(eval(json!(100.0), Operator::Equal, json!(100)));
        assert!(!eval(json!(100), Operator::Equal, json!("100")));
    }

    #[test]
    fn test_equal_large_integers_exact() {
        assert!(!eval(json!(9007199254740993u64), Operator::Equal, json!(9007199254740992u64)));
        assert!(eval(json!(9007199254740993u64), Operator::Equal, json!(9007199254740993u64)));
        assert!(eval(json!(u64::MAX), Operator::Equal, json!(u64::MAX)));
        assert!(!eval(json!(-1), Operator::Equal, json!(u64::MAX)));
        assert!(eval(json!(9007199254740993u64), Operator::NotEqual, json!(9007199254740992u64)));
        assert!(eval(json!(-5), Operator::In, json!([1, -5])));
    }

    #[test]
    fn test_equal_strings_and_objects() {
        assert!(eval(json!("hello"), Operator::Equal, json!("hello")));
        assert!(!eval(json!("hello"), Operator::Equal, json!("world")));
        assert!(eval(json!({"a": 1}), Operator::Equal, json!({"a": 1})));
        assert!(eval(json!("hello"), Operator::NotEqual, json!("world")));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(eval(json!(100), Operator::GreaterThan, json!(50)));
        assert!(eval(json!(100), Operator::GreaterThanInclusive, json!(100)));
        assert!(eval(json!(50), Operator::LessThan, json!(100)));
        assert!(eval(json!(100), Operator::LessThanInclusive, json!(100)));
        assert!(!eval(json!(100), Operator::LessThan, json!(100)));
    }

    #[test]
    fn test_numeric_comparison_with_non_number_fact() {
        assert!(!eval(json!("abc"), Operator::GreaterThan, json!(1)));
        assert!(!eval(Value::Null, Operator::LessThan, json!(1)));
    }

    #[test]
    fn test_numeric_comparison_with_invalid_expected() {
        let err = ConditionEvaluator::evaluate(&json!(1), Operator::GreaterThan, &json!("a"))
            .unwrap_err();
        assert!(matches!(err, RuleError::TypeMismatch { .. }));
    }

    #[test]
    fn test_in_list() {
        assert!(eval(json!("a"), Operator::In, json!(["a", "b", "c"])));
        assert!(!eval(json!("d"), Operator::In, json!(["a", "b", "c"])));
        assert!(eval(json!("d"), Operator::NotIn, json!(["a", "b", "c"])));

        let err =
            ConditionEvaluator::evaluate(&json!("a"), Operator::In, &json!("abc")).unwrap_err();
        assert!(matches!(err, RuleError::TypeMismatch { .. }));
    }

    #[test]
    fn test_contains() {
        assert!(eval(json!("hello world"), Operator::Contains, json!("world")));
        assert!(eval(json!(["a", "b", "c"]), Operator::Contains, json!("b")));
        assert!(!eval(json!(["a", "b", "c"]), Operator::Contains, json!("x")));
        assert!(!eval(json!(42), Operator::Contains, json!(4)));
    }

    #[test]
    fn test_does_not_contain() {
        assert!(eval(json!(["a", "b"]), Operator::DoesNotContain, json!("x")));
        assert!(!eval(json!(["a", "b"]), Operator::DoesNotContain, json!("a")));
        // 非数组/字符串的事实值不满足任何包含类比较
        assert!(!eval(Value::Null, Operator::DoesNotContain, json!("a")));
    }

    #[test]
    fn test_starts_and_ends_with() {
        assert!(eval(json!("hello world"), Operator::StartsWith, json!("hello")));
        assert!(eval(json!("hello world"), Operator::EndsWith, json!("world")));
        assert!(!eval(json!(12), Operator::StartsWith, json!("1")));
    }

    #[test]
    fn test_missing_fact() {
        assert!(!eval(Value::Null, Operator::Equal, json!("test")));
        assert!(eval(Value::Null, Operator::NotEqual, json!("test")));
        assert!(eval(Value::Null, Operator::Equal, Value::Null));
    }
}
