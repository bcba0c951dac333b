//! 文档差异计算模块
//!
//! 按 id 对比基线文档与新文档，生成有序的变更事件列表

use crate::compare::{deep_diff, deep_equal, ids_equal, maps_deep_equal, shallow_equal};
use crate::config::index::DocumentIndex;
use crate::config::types::{Document, Entity, Layer, LayerSelection, Scene, Stage};
use crate::error::ValidationError;
use crate::events::ChangeEvent;
use serde_json::Value;
use tracing::debug;

/// 计算两个文档之间的变更事件
///
/// 事件顺序：`app:change` 在前，然后依次是 layers、stages、scenes，
/// 每个集合内先删除（按旧文档顺序）、再新增（按新文档顺序）、最后字段变更（按新文档顺序）
///
/// # 参数
/// * `old` - 基线文档
/// * `new` - 已通过校验的新文档
///
/// # 返回
/// * `Result<Vec<ChangeEvent>, ValidationError>` - 事件列表，任一文档含重复 id 时返回错误
pub fn diff_documents(old: &Document, new: &Document) -> Result<Vec<ChangeEvent>, ValidationError> {
    let old_index = DocumentIndex::build(old)?;
    let new_index = DocumentIndex::build(new)?;
    Ok(diff_indexed(&old_index, &new_index))
}

/// 基于已建立的索引计算变更事件
pub fn diff_indexed(old: &DocumentIndex<'_>, new: &DocumentIndex<'_>) -> Vec<ChangeEvent> {
    let old_doc = old.document();
    let new_doc = new.document();
    let mut events = Vec::new();

    if !shallow_equal(&old_doc.app, &new_doc.app) {
        let keys = deep_diff(&old_doc.app, &new_doc.app);
        if !keys.is_empty() {
            events.push(ChangeEvent::AppChange {
                keys,
                app: new_doc.app.clone(),
            });
        }
    }

    if old_doc.version != new_doc.version {
        debug!("文档版本变化: {} -> {}", old_doc.version, new_doc.version);
    }
    if old_doc.data_stubs != new_doc.data_stubs {
        debug!(
            "dataStubs 变化 ({} -> {})，不产生事件",
            old_doc.data_stubs.len(),
            new_doc.data_stubs.len()
        );
    }

    diff_layers(old, new, &mut events);
    diff_stages(old, new, &mut events);
    diff_scenes(old, new, &mut events);

    events
}

/// 一个集合的分组结果
struct Partition<'a, T> {
    removed: Vec<&'a T>,
    added: Vec<&'a T>,
    kept: Vec<(&'a T, &'a T)>,
}

/// 按 id 把实体分为删除、新增、保留三组
///
/// `replaced` 返回 true 的同 id 实体同时进入删除与新增两组
fn partition<'a, T, R>(
    old_items: &'a [T],
    new_items: &'a [T],
    old_lookup: impl Fn(&str) -> Option<&'a T>,
    new_lookup: impl Fn(&str) -> Option<&'a T>,
    replaced: R,
) -> Partition<'a, T>
where
    T: Entity,
    R: Fn(&T, &T) -> bool,
{
    let removed = old_items
        .iter()
        .filter(|old| match new_lookup(old.id()) {
            Some(new) => replaced(*old, new),
            None => true,
        })
        .collect();

    let mut added = Vec::new();
    let mut kept = Vec::new();
    for new in new_items {
        match old_lookup(new.id()) {
            Some(old) if !replaced(old, new) => kept.push((old, new)),
            _ => added.push(new),
        }
    }

    Partition {
        removed,
        added,
        kept,
    }
}

/// class 或 dataProps 变化的 layer 无法原地更新，按替换处理
fn layer_replaced(old: &Layer, new: &Layer) -> bool {
    if old.class != new.class {
        return true;
    }

    match (&old.data_props, &new.data_props) {
        (None, None) => false,
        (Some(a), Some(b)) => !maps_deep_equal(a, b),
        _ => true,
    }
}

fn diff_layers(old: &DocumentIndex<'_>, new: &DocumentIndex<'_>, events: &mut Vec<ChangeEvent>) {
    let groups = partition(
        &old.document().layers,
        &new.document().layers,
        |id| old.layer(id),
        |id| new.layer(id),
        layer_replaced,
    );

    events.extend(groups.removed.into_iter().map(|layer| ChangeEvent::LayerRemove {
        layer: layer.clone(),
    }));
    events.extend(groups.added.into_iter().map(|layer| ChangeEvent::LayerAdd {
        layer: layer.clone(),
    }));

    for (before, after) in groups.kept {
        if before.name != after.name {
            events.push(ChangeEvent::LayerChangeName {
                id: after.id.clone(),
                old: before.name.clone(),
                new: after.name.clone(),
            });
        }

        if !maps_deep_equal(&before.props, &after.props) {
            events.push(ChangeEvent::LayerChangeProps {
                id: after.id.clone(),
                keys: deep_diff(&before.props, &after.props),
                old: before.props.clone(),
                new: after.props.clone(),
            });
        }
    }
}

fn diff_stages(old: &DocumentIndex<'_>, new: &DocumentIndex<'_>, events: &mut Vec<ChangeEvent>) {
    let groups = partition(
        &old.document().stages,
        &new.document().stages,
        |id| old.stage(id),
        |id| new.stage(id),
        |_: &Stage, _: &Stage| false,
    );

    events.extend(groups.removed.into_iter().map(|stage| ChangeEvent::StageRemove {
        stage: stage.clone(),
    }));
    events.extend(groups.added.into_iter().map(|stage| ChangeEvent::StageAdd {
        stage: stage.clone(),
    }));

    for (before, after) in groups.kept {
        if before.name != after.name {
            events.push(ChangeEvent::StageChangeName {
                id: after.id.clone(),
                old: before.name.clone(),
                new: after.name.clone(),
            });
        }

        if !selection_equal(&before.layers, &after.layers) {
            events.push(ChangeEvent::StageChangeLayers {
                id: after.id.clone(),
                old: before.layers.clone(),
                new: after.layers.clone(),
            });
        }

        if !optional_equal(before.projection.as_ref(), after.projection.as_ref()) {
            events.push(ChangeEvent::StageChangeProjection {
                id: after.id.clone(),
                old: before.projection.clone(),
                new: after.projection.clone(),
            });
        }
    }
}

fn diff_scenes(old: &DocumentIndex<'_>, new: &DocumentIndex<'_>, events: &mut Vec<ChangeEvent>) {
    let groups = partition(
        &old.document().scenes,
        &new.document().scenes,
        |id| old.scene(id),
        |id| new.scene(id),
        |_: &Scene, _: &Scene| false,
    );

    events.extend(groups.removed.into_iter().map(|scene| ChangeEvent::SceneRemove {
        scene: scene.clone(),
    }));
    events.extend(groups.added.into_iter().map(|scene| ChangeEvent::SceneAdd {
        scene: scene.clone(),
    }));

    for (before, after) in groups.kept {
        if before.name != after.name {
            events.push(ChangeEvent::SceneChangeName {
                id: after.id.clone(),
                old: before.name.clone(),
                new: after.name.clone(),
            });
        }

        if before.camera_state_code != after.camera_state_code {
            events.push(ChangeEvent::SceneChangeCameraStateCode {
                id: after.id.clone(),
                old: before.camera_state_code.clone(),
                new: after.camera_state_code.clone(),
            });
        }

        if before.stage != after.stage {
            events.push(ChangeEvent::SceneChangeStage {
                id: after.id.clone(),
                old: before.stage.clone(),
                new: after.stage.clone(),
            });
        }

        if !selection_equal(&before.layers, &after.layers) {
            events.push(ChangeEvent::SceneChangeLayers {
                id: after.id.clone(),
                old: before.layers.clone(),
                new: after.layers.clone(),
            });
        }
    }
}

/// 比较两个 layer 引用列表
///
/// 通配符只与通配符相等，显式列表按集合比较
pub fn selection_equal(a: &LayerSelection, b: &LayerSelection) -> bool {
    match (a, b) {
        (LayerSelection::All, LayerSelection::All) => true,
        (LayerSelection::Explicit(x), LayerSelection::Explicit(y)) => {
            ids_equal(x.as_slice(), y.as_slice())
        }
        _ => false,
    }
}

fn optional_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => deep_equal(x, y),
        _ => false,
    }
}
