//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use crate::config::types::Collection;
use thiserror::Error;

/// Polaris 配置引擎的主要错误类型
#[derive(Error, Debug)]
pub enum PolarisError {
    /// 引擎调用错误（文档无效或调用顺序错误）
    #[error("引擎错误: {0}")]
    Manager(#[from] ManagerError),

    /// 文档加载错误
    #[error("加载错误: {0}")]
    Load(#[from] LoadError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 文档校验错误
///
/// 校验按固定顺序执行，遇到第一个违反的约束即返回
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 同一集合内出现重复 id
    #[error("{collection} 中存在重复的 id: {id}")]
    DuplicateId { collection: Collection, id: String },

    /// stage/scene 引用了不存在的 layer
    #[error("{owner} 中的 {owner_id} 引用了不存在的 layer: {layer_id}")]
    UnknownLayer {
        owner: Collection,
        owner_id: String,
        layer_id: String,
    },

    /// 通配符与具体 layer id 混用
    #[error("{owner} 中的 {owner_id} 把通配符 \"*\" 与具体 layer id 混用")]
    MixedWildcard { owner: Collection, owner_id: String },

    /// scene 引用了不存在的 stage
    #[error("scene {scene_id} 引用了不存在的 stage: {stage_id}")]
    UnknownStage { scene_id: String, stage_id: String },

    /// 同一个 layer 被多个 stage 显式占用
    #[error("layer {layer_id} 同时属于 stage {first_stage} 和 {second_stage}")]
    LayerClaimedTwice {
        layer_id: String,
        first_stage: String,
        second_stage: String,
    },

    /// 多个 stage 使用通配符，归属不明确
    #[error("stage {first_stage} 和 {second_stage} 同时使用通配符 \"*\"")]
    AmbiguousWildcard {
        first_stage: String,
        second_stage: String,
    },
}

/// 调用顺序错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// 尚未调用 init
    #[error("{operation} 调用前必须先调用 init")]
    NotInitialized { operation: &'static str },

    /// 在事件分发期间重入
    #[error("事件分发期间不允许重入调用 {operation}")]
    Reentrant { operation: &'static str },
}

/// 引擎入口（init / set_config）返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// 文档校验失败
    #[error("文档校验失败: {0}")]
    Validation(#[from] ValidationError),

    /// 调用顺序错误
    #[error("调用错误: {0}")]
    Usage(#[from] UsageError),
}

/// 文档加载错误类型
#[derive(Error, Debug)]
pub enum LoadError {
    /// 文档解析错误
    #[error("文档解析失败: {0}")]
    Parse(String),

    /// 文档校验错误
    #[error("文档校验失败: {0}")]
    Validation(#[from] ValidationError),

    /// 文件不存在
    #[error("文档文件不存在: {path}")]
    FileNotFound { path: String },

    /// 不支持的文件格式
    #[error("不支持的文档格式: {path}（仅支持 .json / .toml）")]
    UnsupportedFormat { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVar { var: String },
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, PolarisError>;
