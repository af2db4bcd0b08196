//! 事实属性路径解析

use serde_json::Value;

/// 路径解析器
///
/// 从事实值中取出嵌套属性，取不到时返回 None。
pub trait PathResolver: Send + Sync {
    fn resolve(&self, value: &Value, path: &str) -> Option<Value>;
}

/// 默认路径解析器
///
/// 支持三种写法：
/// - `$.user.tags[0]`
/// - `user.tags.0`
/// - JSON Pointer：`/user/tags/0`
#[derive(Debug, Default, Clone, Copy)]
pub struct DotPathResolver;

impl PathResolver for DotPathResolver {
    fn resolve(&self, value: &Value, path: &str) -> Option<Value> {
        if path.starts_with('/') {
            return value.pointer(path).cloned();
        }

        let path = path.strip_prefix('$').unwrap_or(path);
        let mut current = value;

        for segment in path.split('.').filter(|s| !s.is_empty()) {
            let (name, indexes) = split_indexes(segment)?;

            if !name.is_empty() {
                current = step(current, name)?;
            }
            for index in indexes {
                current = current.as_array()?.get(index)?;
            }
        }

        Some(current.clone())
    }
}

/// 单步访问：对象按键取值，数组按数字下标取值
fn step<'a>(current: &'a Value, part: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(part),
        Value::Array(arr) => {
            let index: usize = part.parse().ok()?;
            arr.get(index)
        }
        _ => None,
    }
}

/// 拆分 `items[0][1]` 形式的段
fn split_indexes(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(open) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };

    let name = &segment[..open];
    let mut indexes = Vec::new();
    let mut rest = &segment[open..];

    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        indexes.push(inner[..close].trim().parse().ok()?);
        rest = &inner[close + 1..];
    }

    Some((name, indexes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "user": {
                "id": "user-123",
                "tags": ["vip", "frequent"],
                "orders": [{"amount": 100}, {"amount": 250}]
            }
        })
    }

    #[test]
    fn test_dot_path() {
        let resolver = DotPathResolver;
        assert_eq!(resolver.resolve(&sample(), "user.id"), Some(json!("user-123")));
        assert_eq!(resolver.resolve(&sample(), "user.tags.1"), Some(json!("frequent")));
    }

    #[test]
    fn test_dollar_prefix_and_brackets() {
        let resolver = DotPathResolver;
        assert_eq!(resolver.resolve(&sample(), "$.user.tags[0]"), Some(json!("vip")));
        assert_eq!(
            resolver.resolve(&sample(), "$.user.orders[1].amount"),
            Some(json!(250))
        );
    }

    #[test]
    fn test_json_pointer() {
        let resolver = DotPathResolver;
        assert_eq!(
            resolver.resolve(&sample(), "/user/orders/0/amount"),
            Some(json!(100))
        );
    }

    #[test]
    fn test_root_path_returns_whole_value() {
        let resolver = DotPathResolver;
        assert_eq!(resolver.resolve(&json!(42), "$"), Some(json!(42)));
    }

    #[test]
    fn test_missing_path() {
        let resolver = DotPathResolver;
        assert_eq!(resolver.resolve(&sample(), "user.email"), None);
        assert_eq!(resolver.resolve(&sample(), "user.tags[9]"), None);
        assert_eq!(resolver.resolve(&sample(), "user.id.length"), None);
        assert_eq!(resolver.resolve(&sample(), "user.tags[x]"), None);
    }
}
