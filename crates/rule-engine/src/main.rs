//! 规则引擎命令行入口
//!
//! 用法：`rule-engine <rules.json> <facts.json>`
//!
//! rules.json 为规则数组，facts.json 为运行时事实对象，评估结果以 JSON 输出到标准输出。

use almanac_shared::config::AppConfig;
use almanac_shared::observability;
use anyhow::{bail, Context, Result};
use rule_engine::{Engine, Rule};
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::info;

const SERVICE_NAME: &str = "rule-engine";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        bail!("{}", usage(&args));
    }

    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    observability::init(SERVICE_NAME, &config.observability)?;

    let engine = Engine::from_config(&config.engine);

    let rules = load_rules(Path::new(&args[1]))?;
    let loaded = engine.rules().load_batch(rules)?;
    info!("Loaded {} rules", loaded.len());

    let facts = load_facts(Path::new(&args[2]))?;
    let result = engine.run(facts).await?;

    let output = json!({
        "events": result.events,
        "failureEvents": result.failure_events,
        "results": result.results,
        "failureResults": result.failure_results,
        "cache": {
            "entries": result.almanac.cache_len(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// 用法说明，argv 可能为空
fn usage(args: &[String]) -> String {
    let program = args.first().map(String::as_str).unwrap_or(SERVICE_NAME);
    format!("用法: {} <rules.json> <facts.json>", program)
}

/// 读取规则数组
fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取规则文件失败: {}", path.display()))?;
    let rules = serde_json::from_str(&content)
        .with_context(|| format!("解析规则文件失败: {}", path.display()))?;
    Ok(rules)
}

/// 读取运行时事实对象
fn load_facts(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取事实文件失败: {}", path.display()))?;
    match serde_json::from_str::<Value>(&content)
        .with_context(|| format!("解析事实文件失败: {}", path.display()))?
    {
        Value::Object(facts) => Ok(facts),
        other => bail!("事实文件必须是 JSON 对象，实际为: {}", other),
    }
}
