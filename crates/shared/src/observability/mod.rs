//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 的统一初始化。
//! 规则引擎的各个组件只依赖 `tracing` 与 `metrics` 门面，由入口程序决定输出方式。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. Metrics（注册指标描述）
///
/// # Example
///
/// ```ignore
/// use almanac_shared::config::AppConfig;
/// use almanac_shared::observability;
///
/// let config = AppConfig::load("rule-engine")?;
/// observability::init(&config.service_name, &config.observability)?;
/// ```
pub fn init(service_name: &str, config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;
    metrics::describe();

    info!(
        service = %service_name,
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Observability initialized"
    );

    Ok(())
}
