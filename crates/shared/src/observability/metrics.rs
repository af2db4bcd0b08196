//! 指标定义
//!
//! 集中声明指标名称，避免各模块各自拼写字符串。未安装 recorder 时这些指标是空操作。

/// 事实缓存命中次数
pub const FACT_CACHE_HITS: &str = "almanac_fact_cache_hits_total";
/// 事实缓存未命中次数（包括缓存被禁用的情况）
pub const FACT_CACHE_MISSES: &str = "almanac_fact_cache_misses_total";
/// 事实计算函数调用次数
pub const FACT_COMPUTATIONS: &str = "almanac_fact_computations_total";
/// 事实计算失败次数
pub const FACT_COMPUTE_FAILURES: &str = "almanac_fact_compute_failures_total";
/// 因容量上限被淘汰的缓存条目数
pub const CACHE_EVICTIONS: &str = "almanac_cache_evictions_total";
/// 读取时发现过期并被清除的缓存条目数
pub const CACHE_EXPIRATIONS: &str = "almanac_cache_expirations_total";
/// 规则评估次数
pub const RULE_EVALUATIONS: &str = "rule_evaluations_total";
/// 单次引擎运行耗时
pub const ENGINE_RUN_DURATION: &str = "rule_engine_run_duration_seconds";

/// 注册指标描述
///
/// 这些描述会出现在导出端的 HELP 注释中。
pub fn describe() {
    metrics::describe_counter!(FACT_CACHE_HITS, "Total number of fact cache hits");
    metrics::describe_counter!(FACT_CACHE_MISSES, "Total number of fact cache misses");
    metrics::describe_counter!(FACT_COMPUTATIONS, "Total number of fact computations");
    metrics::describe_counter!(
        FACT_COMPUTE_FAILURES,
        "Total number of failed fact computations"
    );
    metrics::describe_counter!(CACHE_EVICTIONS, "Total number of capacity evictions");
    metrics::describe_counter!(CACHE_EXPIRATIONS, "Total number of expired cache entries purged");
    metrics::describe_counter!(RULE_EVALUATIONS, "Total number of rule evaluations");
    metrics::describe_histogram!(
        ENGINE_RUN_DURATION,
        "Rule engine run duration in seconds"
    );
}
