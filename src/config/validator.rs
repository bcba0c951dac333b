//! 文档校验模块
//!
//! 在任何状态变更之前检查文档的唯一性与引用完整性

use crate::config::index::DocumentIndex;
use crate::config::types::{Collection, Document, LayerSelection, Stage, WILDCARD};
use crate::error::ValidationError;
use std::collections::HashMap;
use tracing::debug;

/// 校验文档
///
/// 只依据传入的文档本身，不读取引擎当前状态。按以下顺序检查，
/// 遇到第一个违反的约束即返回：
/// 1. 各集合内 id 唯一
/// 2. stage、scene 的显式 layer 引用存在，且通配符不与具体 id 混用
/// 3. scene 引用的 stage 存在
/// 4. 一个 layer 最多被一个 stage 显式占用，最多一个 stage 使用通配符
///
/// # 参数
/// * `document` - 要校验的文档
///
/// # 返回
/// * `Result<(), ValidationError>` - 校验结果
pub fn validate_document(document: &Document) -> Result<(), ValidationError> {
    let index = DocumentIndex::build(document)?;

    for stage in &document.stages {
        check_layer_refs(&index, Collection::Stages, &stage.id, &stage.layers)?;
    }

    for scene in &document.scenes {
        check_layer_refs(&index, Collection::Scenes, &scene.id, &scene.layers)?;
    }

    for scene in &document.scenes {
        if !index.contains_stage(&scene.stage) {
            return Err(ValidationError::UnknownStage {
                scene_id: scene.id.clone(),
                stage_id: scene.stage.clone(),
            });
        }
    }

    check_stage_ownership(&document.stages)?;

    debug!(
        "文档校验通过: {} layers, {} stages, {} scenes, {} dataStubs",
        document.layers.len(),
        document.stages.len(),
        document.scenes.len(),
        document.data_stubs.len()
    );

    Ok(())
}

fn check_layer_refs(
    index: &DocumentIndex<'_>,
    owner: Collection,
    owner_id: &str,
    layers: &LayerSelection,
) -> Result<(), ValidationError> {
    for layer_id in layers.explicit_ids() {
        if layer_id == WILDCARD {
            return Err(ValidationError::MixedWildcard {
                owner,
                owner_id: owner_id.to_string(),
            });
        }
        if !index.contains_layer(layer_id) {
            return Err(ValidationError::UnknownLayer {
                owner,
                owner_id: owner_id.to_string(),
                layer_id: layer_id.clone(),
            });
        }
    }
    Ok(())
}

fn check_stage_ownership(stages: &[Stage]) -> Result<(), ValidationError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    let mut wildcard_stage: Option<&str> = None;

    for stage in stages {
        if stage.layers.is_all() {
            if let Some(first) = wildcard_stage {
                return Err(ValidationError::AmbiguousWildcard {
                    first_stage: first.to_string(),
                    second_stage: stage.id.clone(),
                });
            }
            wildcard_stage = Some(stage.id.as_str());
            continue;
        }

        for layer_id in stage.layers.explicit_ids() {
            match owners.get(layer_id.as_str()) {
                // 同一 stage 内重复列出不算冲突
                Some(owner) if *owner == stage.id => {}
                Some(owner) => {
                    return Err(ValidationError::LayerClaimedTwice {
                        layer_id: layer_id.clone(),
                        first_stage: owner.to_string(),
                        second_stage: stage.id.clone(),
                    });
                }
                None => {
                    owners.insert(layer_id.as_str(), stage.id.as_str());
                }
            }
        }
    }

    Ok(())
}
