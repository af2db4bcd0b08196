//! 测试工具模块
//!
//! 提供集成测试所需的配置与测试数据生成器，简化测试代码编写。

use serde_json::{json, Map, Value};

use crate::config::EngineConfig;

// ==================== 测试配置辅助 ====================

/// 创建测试用引擎配置
///
/// 打开评估追踪，其余与默认值一致。
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        trace_enabled: true,
        ..EngineConfig::default()
    }
}

/// 创建带容量上限的测试用引擎配置
pub fn bounded_engine_config(cache_max_size: usize) -> EngineConfig {
    EngineConfig {
        cache_max_size,
        ..test_engine_config()
    }
}

// ==================== 测试数据生成 ====================

/// 模拟一次购买场景的运行时事实
pub fn purchase_facts() -> Map<String, Value> {
    let value = json!({
        "event": {
            "type": "PURCHASE",
            "source": "mobile_app"
        },
        "order": {
            "id": "order-12345",
            "amount": 1500,
            "currency": "CNY",
            "items": [
                {"sku": "TICKET-001", "price": 500, "quantity": 2},
                {"sku": "FOOD-001", "price": 500, "quantity": 1}
            ]
        },
        "user": {
            "id": "user-67890",
            "level": "gold",
            "is_vip": true,
            "tags": ["frequent_visitor", "annual_pass"]
        }
    });

    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// 模拟用户档案（通常由外部服务计算得到）
pub fn user_profile(user_id: &str) -> Value {
    json!({
        "id": user_id,
        "level": if user_id.ends_with('A') { "gold" } else { "silver" },
        "total_purchases": 15000,
        "tags": ["frequent_visitor"]
    })
}
