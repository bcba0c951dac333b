//! Polaris Config - 分层地图/场景文档的配置协调引擎
//!
//! 接收完整的新文档，与当前基线按 id 比对，只分发真正变化的细粒度事件：
//! - 文档校验（id 唯一性与引用完整性）
//! - 基于 id 的差异计算与固定顺序的事件分发
//! - JSON/TOML 文档加载与文件热重载
//! - 结构化日志记录

pub mod cli;
pub mod compare;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;

// 重新导出主要类型
pub use config::{ConfigManager, Document, Layer, LayerSelection, Scene, Stage};
pub use error::{ManagerError, PolarisError, UsageError, ValidationError};
pub use events::{ChangeEvent, EventKind, SubscriptionId};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
