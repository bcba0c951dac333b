//! 配置引擎模块
//!
//! 持有基线文档，校验并比对新文档，按固定顺序分发变更事件

use crate::config::diff::diff_indexed;
use crate::config::index::DocumentIndex;
use crate::config::types::Document;
use crate::config::validator::validate_document;
use crate::error::{ManagerError, UsageError};
use crate::events::{ChangeEvent, EventDispatcher, EventKind, SubscriptionId};
use crate::logging::reconcile_log;
use std::cell::{Cell, RefCell};
use std::time::Instant;
use tracing::{debug, info, warn};

/// 配置引擎
///
/// 单线程同步执行。每个实例拥有独立的基线，多个实例可以共存。
/// 监听器在事件分发期间再次调用 [`ConfigManager::init`] 或
/// [`ConfigManager::set_config`] 会得到 [`UsageError::Reentrant`]。
#[derive(Debug, Default)]
pub struct ConfigManager {
    /// 当前基线
    baseline: RefCell<Option<Document>>,
    /// 事件分发器
    dispatcher: EventDispatcher,
    /// 是否正在分发事件
    dispatching: Cell<bool>,
    /// 基线修订号，`init` 以及产生事件的 `set_config` 会递增
    revision: Cell<u64>,
}

/// 分发期间置位，离开作用域时复位（包括监听器 panic 的情况）
struct DispatchGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> DispatchGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

impl ConfigManager {
    /// 创建未初始化的引擎
    pub fn new() -> Self {
        Self::default()
    }

    /// 用文档建立基线并分发一次 `init` 事件
    ///
    /// 可以重复调用以重新建立基线，每次都会分发 `init`
    ///
    /// # 参数
    /// * `document` - 初始文档，引擎保存其深拷贝
    ///
    /// # 返回
    /// * `Result<u64, ManagerError>` - 新的修订号
    pub fn init(&self, document: &Document) -> Result<u64, ManagerError> {
        self.ensure_not_dispatching("init")?;

        if let Err(e) = validate_document(document) {
            warn!("初始文档校验失败: {}", e);
            return Err(e.into());
        }

        let snapshot = document.clone();
        let event = ChangeEvent::Init {
            document: Box::new(snapshot.clone()),
        };

        {
            let _guard = DispatchGuard::enter(&self.dispatching);
            self.dispatcher.emit(&event);
        }

        *self.baseline.borrow_mut() = Some(snapshot);
        let revision = self.revision.get() + 1;
        self.revision.set(revision);

        info!(
            "配置引擎初始化完成，版本: {}，修订号: {}",
            document.version, revision
        );
        Ok(revision)
    }

    /// 用新文档更新基线
    ///
    /// 先单独校验新文档，失败时不计算差异、不分发事件、不修改基线。
    /// 校验通过后与基线比对，按顺序分发事件，最后提交新基线。
    ///
    /// # 参数
    /// * `document` - 完整的新文档
    ///
    /// # 返回
    /// * `Result<u64, ManagerError>` - 提交后的修订号，没有产生事件时保持不变
    ///   （例如只调整了顺序，或只修改了 version、dataStubs）
    pub fn set_config(&self, document: &Document) -> Result<u64, ManagerError> {
        self.ensure_not_dispatching("set_config")?;

        if self.baseline.borrow().is_none() {
            return Err(UsageError::NotInitialized {
                operation: "set_config",
            }
            .into());
        }

        if let Err(e) = validate_document(document) {
            warn!("新文档校验失败，保留当前基线: {}", e);
            return Err(e.into());
        }

        let started = Instant::now();
        let snapshot = document.clone();

        let events = {
            let baseline = self.baseline.borrow();
            let Some(old) = baseline.as_ref() else {
                return Err(UsageError::NotInitialized {
                    operation: "set_config",
                }
                .into());
            };
            let old_index = DocumentIndex::build(old)?;
            let new_index = DocumentIndex::build(&snapshot)?;
            diff_indexed(&old_index, &new_index)
        };

        debug!("差异计算得到 {} 个事件", events.len());

        let delivered = {
            let _guard = DispatchGuard::enter(&self.dispatching);
            events
                .iter()
                .map(|event| self.dispatcher.emit(event))
                .sum::<usize>()
        };

        *self.baseline.borrow_mut() = Some(snapshot);

        let revision = if events.is_empty() {
            self.revision.get()
        } else {
            self.revision.get() + 1
        };
        self.revision.set(revision);

        reconcile_log(revision, &events, delivered, started.elapsed());
        Ok(revision)
    }

    fn ensure_not_dispatching(&self, operation: &'static str) -> Result<(), ManagerError> {
        if self.dispatching.get() {
            warn!("事件分发期间拒绝重入调用: {}", operation);
            return Err(UsageError::Reentrant { operation }.into());
        }
        Ok(())
    }

    /// 订阅某一类事件
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        self.dispatcher.subscribe(kind, listener)
    }

    /// 订阅全部事件
    pub fn subscribe_all<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        self.dispatcher.subscribe_all(listener)
    }

    /// 取消订阅
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// 当前基线的快照
    pub fn document(&self) -> Option<Document> {
        self.baseline.borrow().clone()
    }

    /// 是否已经初始化
    pub fn is_initialized(&self) -> bool {
        self.baseline.borrow().is_some()
    }

    /// 当前修订号，未初始化时为 0
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    /// 解析基线中 scene 实际显示的 layer id
    pub fn resolved_scene_layers(&self, scene_id: &str) -> Option<Vec<String>> {
        let baseline = self.baseline.borrow();
        let index = DocumentIndex::build(baseline.as_ref()?).ok()?;
        let ids = index.scene_layers(scene_id)?;
        Some(owned_ids(ids))
    }

    /// 解析基线中 stage 实际包含的 layer id
    pub fn resolved_stage_layers(&self, stage_id: &str) -> Option<Vec<String>> {
        let baseline = self.baseline.borrow();
        let index = DocumentIndex::build(baseline.as_ref()?).ok()?;
        let ids = index.stage_layers(stage_id)?;
        Some(owned_ids(ids))
    }
}

fn owned_ids(ids: Vec<&str>) -> Vec<String> {
    ids.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{Layer, Scene, Stage};
    use crate::error::ValidationError;
    use serde_json::{json, Map};
    use std::rc::Rc;

    fn layer(id: &str, name: &str) -> Layer {
        Layer {
            id: id.to_string(),
            name: name.to_string(),
            class: "GridLayer".to_string(),
            props: Map::new(),
            data_props: None,
        }
    }

    fn create_test_document() -> Document {
        Document {
            version: "0.0.1".to_string(),
            app: Map::new(),
            layers: vec![layer("A", "x"), layer("B", "y")],
            stages: vec![Stage {
                id: "MAIN".to_string(),
                name: "MainStage".to_string(),
                layers: vec!["*".to_string()].into(),
                projection: None,
            }],
            scenes: vec![Scene {
                id: "DEFAULT".to_string(),
                name: "DefaultScene".to_string(),
                camera_state_code: "1|0|0|0|1|0.2|18".to_string(),
                stage: "MAIN".to_string(),
                layers: vec!["B".to_string()].into(),
            }],
            data_stubs: vec![],
        }
    }

    fn recording_manager() -> (ConfigManager, Rc<RefCell<Vec<ChangeEvent>>>) {
        let manager = ConfigManager::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        manager.subscribe_all(move |event| sink.borrow_mut().push(event.clone()));
        (manager, events)
    }

    #[test]
    fn test_set_config_before_init() {
        let manager = ConfigManager::new();
        let err = manager.set_config(&create_test_document()).unwrap_err();
        assert_eq!(
            err,
            ManagerError::Usage(UsageError::NotInitialized {
                operation: "set_config"
            })
        );
        assert!(!manager.is_initialized());
        assert_eq!(manager.revision(), 0);
    }

    #[test]
    fn test_init_emits_once() {
        let (manager, events) = recording_manager();
        let revision = manager.init(&create_test_document()).unwrap();

        assert_eq!(revision, 1);
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(events.borrow()[0].kind(), EventKind::Init);
        assert_eq!(manager.document(), Some(create_test_document()));
    }

    #[test]
    fn test_invalid_init_leaves_manager_uninitialized() {
        let (manager, events) = recording_manager();
        let mut document = create_test_document();
        document.layers.push(layer("A", "dup"));

        assert!(matches!(
            manager.init(&document),
            Err(ManagerError::Validation(ValidationError::DuplicateId { .. }))
        ));
        assert!(!manager.is_initialized());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_layer_rename_scenario() {
        let (manager, events) = recording_manager();
        manager.init(&create_test_document()).unwrap();
        events.borrow_mut().clear();

        let mut next = create_test_document();
        next.layers[1].name = "z".to_string();
        let revision = manager.set_config(&next).unwrap();

        assert_eq!(revision, 2);
        assert_eq!(
            *events.borrow(),
            vec![ChangeEvent::LayerChangeName {
                id: "B".to_string(),
                old: "y".to_string(),
                new: "z".to_string(),
            }]
        );
        assert_eq!(manager.document(), Some(next));
    }

    #[test]
    fn test_rejected_document_keeps_baseline() {
        let (manager, events) = recording_manager();
        manager.init(&create_test_document()).unwrap();
        events.borrow_mut().clear();

        let mut bad = create_test_document();
        bad.layers[1].name = "z".to_string();
        bad.scenes[0].stage = "MISSING".to_string();

        assert!(manager.set_config(&bad).is_err());
        assert!(events.borrow().is_empty());
        assert_eq!(manager.document(), Some(create_test_document()));
        assert_eq!(manager.revision(), 1);
    }

    #[test]
    fn test_identical_document_is_idempotent() {
        let (manager, events) = recording_manager();
        manager.init(&create_test_document()).unwrap();
        events.borrow_mut().clear();

        assert_eq!(manager.set_config(&create_test_document()).unwrap(), 1);
        assert_eq!(manager.set_config(&create_test_document()).unwrap(), 1);
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_caller_mutation_does_not_leak_into_baseline() {
        let manager = ConfigManager::new();
        let mut document = create_test_document();
        manager.init(&document).unwrap();

        document.layers[0].props.insert("color".to_string(), json!("red"));
        assert!(manager.document().unwrap().layers[0].props.is_empty());
    }

    #[test]
    fn test_reentrant_call_is_rejected() {
        let manager = Rc::new(ConfigManager::new());
        manager.init(&create_test_document()).unwrap();

        let outcome = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&manager);
        let slot = Rc::clone(&outcome);
        manager.subscribe(EventKind::LayerChangeName, move |_| {
            *slot.borrow_mut() = Some(inner.set_config(&create_test_document()));
        });

        let mut next = create_test_document();
        next.layers[0].name = "renamed".to_string();
        assert_eq!(manager.set_config(&next).unwrap(), 2);

        assert_eq!(
            outcome.borrow_mut().take(),
            Some(Err(ManagerError::Usage(UsageError::Reentrant {
                operation: "set_config"
            })))
        );
        assert_eq!(manager.document(), Some(next));
    }

    #[test]
    fn test_reentrant_init_is_rejected() {
        let manager = Rc::new(ConfigManager::new());

        let outcome = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&manager);
        let slot = Rc::clone(&outcome);
        manager.subscribe(EventKind::Init, move |_| {
            *slot.borrow_mut() = Some(inner.init(&Document::default()));
        });

        assert_eq!(manager.init(&create_test_document()).unwrap(), 1);
        assert_eq!(
            outcome.borrow_mut().take(),
            Some(Err(ManagerError::Usage(UsageError::Reentrant {
                operation: "init"
            })))
        );
        assert_eq!(manager.document(), Some(create_test_document()));
        assert_eq!(manager.revision(), 1);
    }

    #[test]
    fn test_revision_unchanged_without_events() {
        let (manager, events) = recording_manager();
        manager.init(&create_test_document()).unwrap();
        events.borrow_mut().clear();

        let mut reordered = create_test_document();
        reordered.layers.reverse();
        reordered.version = "0.0.2".to_string();
        reordered.app.insert("width".to_string(), json!(1400));

        let mut base = create_test_document();
        base.app.insert("width".to_string(), json!(1400.0));
        assert_eq!(manager.set_config(&base).unwrap(), 2);
        events.borrow_mut().clear();

        assert_eq!(manager.set_config(&reordered).unwrap(), 2);
        assert!(events.borrow().is_empty());
        // 无事件的文档仍然成为新基线
        assert_eq!(manager.document(), Some(reordered));
    }

    #[test]
    fn test_large_integer_prop_change_emits_event() {
        let (manager, events) = recording_manager();
        let mut document = create_test_document();
        document.layers[0]
            .props
            .insert("seed".to_string(), json!(9_007_199_254_740_993_u64));
        manager.init(&document).unwrap();
        events.borrow_mut().clear();

        document.layers[0]
            .props
            .insert("seed".to_string(), json!(9_007_199_254_740_992_u64));
        assert_eq!(manager.set_config(&document).unwrap(), 2);

        let kinds: Vec<EventKind> = events.borrow().iter().map(ChangeEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::LayerChangeProps]);
    }

    #[test]
    fn test_listener_sees_previous_baseline_during_dispatch() {
        let manager = Rc::new(ConfigManager::new());
        manager.init(&create_test_document()).unwrap();

        let seen = Rc::new(RefCell::new(String::new()));
        let inner = Rc::clone(&manager);
        let slot = Rc::clone(&seen);
        manager.subscribe(EventKind::LayerChangeName, move |_| {
            if let Some(document) = inner.document() {
                *slot.borrow_mut() = document.layers[1].name.clone();
            }
        });

        let mut next = create_test_document();
        next.layers[1].name = "z".to_string();
        manager.set_config(&next).unwrap();

        assert_eq!(*seen.borrow(), "y");
    }

    #[test]
    fn test_resolved_layers() {
        let manager = ConfigManager::new();
        assert!(manager.resolved_stage_layers("MAIN").is_none());

        manager.init(&create_test_document()).unwrap();
        assert_eq!(
            manager.resolved_stage_layers("MAIN"),
            Some(vec!["A".to_string(), "B".to_string()])
        );
        assert_eq!(
            manager.resolved_scene_layers("DEFAULT"),
            Some(vec!["B".to_string()])
        );
        assert!(manager.resolved_scene_layers("NOPE").is_none());
    }

    #[test]
    fn test_reinit_emits_init_again() {
        let (manager, events) = recording_manager();
        manager.init(&create_test_document()).unwrap();
        manager.init(&Document::default()).unwrap();

        let kinds: Vec<EventKind> = events.borrow().iter().map(ChangeEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::Init, EventKind::Init]);
        assert_eq!(manager.revision(), 2);
    }
}
