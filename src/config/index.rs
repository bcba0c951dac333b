//! 文档索引模块
//!
//! 每次校验/差异计算时从文档重建 id → 实体 的映射，
//! 并把 [`LayerSelection`] 解析为具体的 layer id 列表

use crate::config::types::{Collection, Document, Entity, Layer, LayerSelection, Scene, Stage};
use crate::error::ValidationError;
use std::collections::{HashMap, HashSet};

/// 单个文档的 id 索引
#[derive(Debug)]
pub struct DocumentIndex<'a> {
    document: &'a Document,
    layers: HashMap<&'a str, &'a Layer>,
    stages: HashMap<&'a str, &'a Stage>,
    scenes: HashMap<&'a str, &'a Scene>,
    /// layer id → 显式占用它的第一个 stage
    explicit_owners: HashMap<&'a str, &'a str>,
}

impl<'a> DocumentIndex<'a> {
    /// 构建索引
    ///
    /// 按 layers、stages、scenes、dataStubs 的顺序建立映射，
    /// 遇到重复 id 立即返回错误
    ///
    /// # 参数
    /// * `document` - 要索引的文档
    ///
    /// # 返回
    /// * `Result<Self, ValidationError>` - 索引或重复 id 错误
    pub fn build(document: &'a Document) -> Result<Self, ValidationError> {
        let layers = index_by_id(&document.layers, Collection::Layers)?;
        let stages = index_by_id(&document.stages, Collection::Stages)?;
        let scenes = index_by_id(&document.scenes, Collection::Scenes)?;
        // dataStub 只需检查唯一性
        index_by_id(&document.data_stubs, Collection::DataStubs)?;

        let mut explicit_owners = HashMap::new();
        for stage in &document.stages {
            for layer_id in stage.layers.explicit_ids() {
                explicit_owners
                    .entry(layer_id.as_str())
                    .or_insert(stage.id.as_str());
            }
        }

        Ok(Self {
            document,
            layers,
            stages,
            scenes,
            explicit_owners,
        })
    }

    /// 被索引的文档
    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn layer(&self, id: &str) -> Option<&'a Layer> {
        self.layers.get(id).copied()
    }

    pub fn stage(&self, id: &str) -> Option<&'a Stage> {
        self.stages.get(id).copied()
    }

    pub fn scene(&self, id: &str) -> Option<&'a Scene> {
        self.scenes.get(id).copied()
    }

    pub fn contains_layer(&self, id: &str) -> bool {
        self.layers.contains_key(id)
    }

    pub fn contains_stage(&self, id: &str) -> bool {
        self.stages.contains_key(id)
    }

    /// 查找 layer 所属的 stage
    ///
    /// 显式占用优先，否则归属使用通配符的 stage
    pub fn owning_stage(&self, layer_id: &str) -> Option<&'a str> {
        if !self.contains_layer(layer_id) {
            return None;
        }

        if let Some(owner) = self.explicit_owners.get(layer_id) {
            return Some(*owner);
        }

        self.document
            .stages
            .iter()
            .find(|stage| stage.layers.is_all())
            .map(|stage| stage.id.as_str())
    }

    /// 解析 stage 包含的 layer id
    ///
    /// 通配时按文档顺序返回未被其他 stage 显式占用的 layer
    pub fn stage_layers(&self, stage_id: &str) -> Option<Vec<&'a str>> {
        let stage = self.stage(stage_id)?;

        let ids = match &stage.layers {
            LayerSelection::All => self
                .document
                .layers
                .iter()
                .map(|layer| layer.id.as_str())
                .filter(|id| match self.explicit_owners.get(id) {
                    Some(owner) => *owner == stage.id,
                    None => true,
                })
                .collect(),
            LayerSelection::Explicit(ids) => self.existing_unique(ids),
        };

        Some(ids)
    }

    /// 解析 scene 显示的 layer id
    ///
    /// 通配时等于所属 stage 的全部 layer
    pub fn scene_layers(&self, scene_id: &str) -> Option<Vec<&'a str>> {
        let scene = self.scene(scene_id)?;

        match &scene.layers {
            LayerSelection::All => self.stage_layers(&scene.stage),
            LayerSelection::Explicit(ids) => Some(self.existing_unique(ids)),
        }
    }

    fn existing_unique(&self, ids: &'a [String]) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        ids.iter()
            .map(String::as_str)
            .filter(|id| self.contains_layer(id) && seen.insert(*id))
            .collect()
    }
}

fn index_by_id<T: Entity>(
    items: &[T],
    collection: Collection,
) -> Result<HashMap<&str, &T>, ValidationError> {
    let mut map = HashMap::with_capacity(items.len());
    for item in items {
        let id = item.id();
        if map.insert(id, item).is_some() {
            return Err(ValidationError::DuplicateId {
                collection,
                id: id.to_string(),
            });
        }
    }
    Ok(map)
}
