//! 共享库
//!
//! 包含规则引擎各入口共用的配置与可观测性基础设施代码。

pub mod config;
pub mod observability;
pub mod test_utils;
