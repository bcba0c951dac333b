//! 文档数据结构定义
//!
//! 定义配置文档及其四个实体集合（layer、stage、scene、dataStub）

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 通配符，表示"所有适用的 layer"
pub const WILDCARD: &str = "*";

/// 主文档结构，描述应用的完整可视状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// 文档版本（不透明字符串）
    pub version: String,
    /// 应用全局配置（扁平键值对）
    #[serde(default)]
    pub app: Map<String, Value>,
    /// 所有 layer 实例
    #[serde(default)]
    pub layers: Vec<Layer>,
    /// 所有 stage（layer 实例的容器）
    #[serde(default)]
    pub stages: Vec<Stage>,
    /// 所有 scene（一组镜位与 layer 显隐的编排）
    #[serde(default)]
    pub scenes: Vec<Scene>,
    /// 数据源占位
    #[serde(default)]
    pub data_stubs: Vec<DataStub>,
}

/// layer 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// 唯一标识
    pub id: String,
    /// 显示名称
    pub name: String,
    /// 外部注册的 layer 工厂名，引擎不做解析
    pub class: String,
    /// layer 属性（任意深度）
    #[serde(default)]
    pub props: Map<String, Value>,
    /// 数据绑定属性
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_props: Option<Map<String, Value>>,
}

/// stage 配置
///
/// 一个 layer 只能从属于一个 stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub layers: LayerSelection,
    /// 投影描述（不透明）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Value>,
}

/// scene 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub name: String,
    /// 序列化后的相机姿态
    pub camera_state_code: String,
    /// 所属 stage 的 id
    pub stage: String,
    #[serde(default)]
    pub layers: LayerSelection,
}

/// 数据源占位，只校验 id 唯一性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStub {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<Value>,
    #[serde(default)]
    pub dynamic: bool,
}

/// layer 引用列表
///
/// 序列化为字符串数组，只由 `"*"` 组成的数组即为 [`LayerSelection::All`]。
/// `"*"` 与具体 id 混用时保留为 `Explicit`，由校验拒绝。
/// 对 stage 而言 `All` 表示"文档中未被其他 stage 显式占用的全部 layer"，
/// 对 scene 而言表示"所属 stage 的全部 layer"。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum LayerSelection {
    /// 通配
    All,
    /// 显式列出的 layer id
    Explicit(Vec<String>),
}

impl LayerSelection {
    /// 是否为通配
    pub fn is_all(&self) -> bool {
        matches!(self, LayerSelection::All)
    }

    /// 显式列出的 id，通配时为空
    pub fn explicit_ids(&self) -> &[String] {
        match self {
            LayerSelection::All => &[],
            LayerSelection::Explicit(ids) => ids,
        }
    }
}

impl Default for LayerSelection {
    fn default() -> Self {
        LayerSelection::Explicit(Vec::new())
    }
}

impl From<Vec<String>> for LayerSelection {
    fn from(ids: Vec<String>) -> Self {
        if !ids.is_empty() && ids.iter().all(|id| id == WILDCARD) {
            LayerSelection::All
        } else {
            LayerSelection::Explicit(ids)
        }
    }
}

impl From<LayerSelection> for Vec<String> {
    fn from(selection: LayerSelection) -> Self {
        match selection {
            LayerSelection::All => vec![WILDCARD.to_string()],
            LayerSelection::Explicit(ids) => ids,
        }
    }
}

impl fmt::Display for LayerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSelection::All => write!(f, "[{WILDCARD}]"),
            LayerSelection::Explicit(ids) => write!(f, "[{}]", ids.join(", ")),
        }
    }
}

/// 文档中的实体集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Layers,
    Stages,
    Scenes,
    DataStubs,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Layers => "layers",
            Collection::Stages => "stages",
            Collection::Scenes => "scenes",
            Collection::DataStubs => "dataStubs",
        };
        f.write_str(name)
    }
}

/// 带稳定 id 的实体
pub trait Entity {
    /// 实体 id
    fn id(&self) -> &str;
}

impl Entity for Layer {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Stage {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Scene {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for DataStub {
    fn id(&self) -> &str {
        &self.id
    }
}
