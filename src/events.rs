//! 变更事件模块
//!
//! 定义事件类型、事件负载以及同步的发布/订阅分发器

use crate::config::types::{Document, Layer, LayerSelection, Scene, Stage};
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Init,
    AppChange,
    LayerAdd,
    LayerRemove,
    LayerChangeName,
    LayerChangeProps,
    StageAdd,
    StageRemove,
    StageChangeName,
    StageChangeLayers,
    StageChangeProjection,
    SceneAdd,
    SceneRemove,
    SceneChangeName,
    SceneChangeCameraStateCode,
    SceneChangeStage,
    SceneChangeLayers,
}

impl EventKind {
    /// 全部事件类型
    pub const ALL: [EventKind; 17] = [
        EventKind::Init,
        EventKind::AppChange,
        EventKind::LayerAdd,
        EventKind::LayerRemove,
        EventKind::LayerChangeName,
        EventKind::LayerChangeProps,
        EventKind::StageAdd,
        EventKind::StageRemove,
        EventKind::StageChangeName,
        EventKind::StageChangeLayers,
        EventKind::StageChangeProjection,
        EventKind::SceneAdd,
        EventKind::SceneRemove,
        EventKind::SceneChangeName,
        EventKind::SceneChangeCameraStateCode,
        EventKind::SceneChangeStage,
        EventKind::SceneChangeLayers,
    ];

    /// 事件名称
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Init => "init",
            EventKind::AppChange => "app:change",
            EventKind::LayerAdd => "layer:add",
            EventKind::LayerRemove => "layer:remove",
            EventKind::LayerChangeName => "layer:change:name",
            EventKind::LayerChangeProps => "layer:change:props",
            EventKind::StageAdd => "stage:add",
            EventKind::StageRemove => "stage:remove",
            EventKind::StageChangeName => "stage:change:name",
            EventKind::StageChangeLayers => "stage:change:layers",
            EventKind::StageChangeProjection => "stage:change:projection",
            EventKind::SceneAdd => "scene:add",
            EventKind::SceneRemove => "scene:remove",
            EventKind::SceneChangeName => "scene:change:name",
            EventKind::SceneChangeCameraStateCode => "scene:change:cameraStateCode",
            EventKind::SceneChangeStage => "scene:change:stage",
            EventKind::SceneChangeLayers => "scene:change:layers",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的事件名称
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的事件类型: {0}")]
pub struct ParseEventKindError(pub String);

impl FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEventKindError(s.to_string()))
    }
}

/// 变更事件
///
/// 每种事件只携带与之相关的字段；新增事件携带完整的新实体，
/// 删除事件携带最后一次已知的实体快照，字段变更携带新旧值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    #[serde(rename = "init")]
    Init { document: Box<Document> },

    #[serde(rename = "app:change")]
    AppChange {
        /// 值发生变化的键
        keys: Vec<String>,
        /// 新的全局配置
        app: Map<String, Value>,
    },

    #[serde(rename = "layer:add")]
    LayerAdd { layer: Layer },
    #[serde(rename = "layer:remove")]
    LayerRemove { layer: Layer },
    #[serde(rename = "layer:change:name")]
    LayerChangeName { id: String, old: String, new: String },
    #[serde(rename = "layer:change:props")]
    LayerChangeProps {
        id: String,
        keys: Vec<String>,
        old: Map<String, Value>,
        new: Map<String, Value>,
    },

    #[serde(rename = "stage:add")]
    StageAdd { stage: Stage },
    #[serde(rename = "stage:remove")]
    StageRemove { stage: Stage },
    #[serde(rename = "stage:change:name")]
    StageChangeName { id: String, old: String, new: String },
    #[serde(rename = "stage:change:layers")]
    StageChangeLayers {
        id: String,
        old: LayerSelection,
        new: LayerSelection,
    },
    #[serde(rename = "stage:change:projection")]
    StageChangeProjection {
        id: String,
        old: Option<Value>,
        new: Option<Value>,
    },

    #[serde(rename = "scene:add")]
    SceneAdd { scene: Scene },
    #[serde(rename = "scene:remove")]
    SceneRemove { scene: Scene },
    #[serde(rename = "scene:change:name")]
    SceneChangeName { id: String, old: String, new: String },
    #[serde(rename = "scene:change:cameraStateCode")]
    SceneChangeCameraStateCode { id: String, old: String, new: String },
    #[serde(rename = "scene:change:stage")]
    SceneChangeStage { id: String, old: String, new: String },
    #[serde(rename = "scene:change:layers")]
    SceneChangeLayers {
        id: String,
        old: LayerSelection,
        new: LayerSelection,
    },
}

impl ChangeEvent {
    /// 事件类型
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::Init { .. } => EventKind::Init,
            ChangeEvent::AppChange { .. } => EventKind::AppChange,
            ChangeEvent::LayerAdd { .. } => EventKind::LayerAdd,
            ChangeEvent::LayerRemove { .. } => EventKind::LayerRemove,
            ChangeEvent::LayerChangeName { .. } => EventKind::LayerChangeName,
            ChangeEvent::LayerChangeProps { .. } => EventKind::LayerChangeProps,
            ChangeEvent::StageAdd { .. } => EventKind::StageAdd,
            ChangeEvent::StageRemove { .. } => EventKind::StageRemove,
            ChangeEvent::StageChangeName { .. } => EventKind::StageChangeName,
            ChangeEvent::StageChangeLayers { .. } => EventKind::StageChangeLayers,
            ChangeEvent::StageChangeProjection { .. } => EventKind::StageChangeProjection,
            ChangeEvent::SceneAdd { .. } => EventKind::SceneAdd,
            ChangeEvent::SceneRemove { .. } => EventKind::SceneRemove,
            ChangeEvent::SceneChangeName { .. } => EventKind::SceneChangeName,
            ChangeEvent::SceneChangeCameraStateCode { .. } => {
                EventKind::SceneChangeCameraStateCode
            }
            ChangeEvent::SceneChangeStage { .. } => EventKind::SceneChangeStage,
            ChangeEvent::SceneChangeLayers { .. } => EventKind::SceneChangeLayers,
        }
    }

    /// 受影响实体的 id，`init` 与 `app:change` 没有
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            ChangeEvent::Init { .. } | ChangeEvent::AppChange { .. } => None,
            ChangeEvent::LayerAdd { layer } | ChangeEvent::LayerRemove { layer } => {
                Some(layer.id.as_str())
            }
            ChangeEvent::StageAdd { stage } | ChangeEvent::StageRemove { stage } => {
                Some(stage.id.as_str())
            }
            ChangeEvent::SceneAdd { scene } | ChangeEvent::SceneRemove { scene } => {
                Some(scene.id.as_str())
            }
            ChangeEvent::LayerChangeName { id, .. }
            | ChangeEvent::LayerChangeProps { id, .. }
            | ChangeEvent::StageChangeName { id, .. }
            | ChangeEvent::StageChangeLayers { id, .. }
            | ChangeEvent::StageChangeProjection { id, .. }
            | ChangeEvent::SceneChangeName { id, .. }
            | ChangeEvent::SceneChangeCameraStateCode { id, .. }
            | ChangeEvent::SceneChangeStage { id, .. }
            | ChangeEvent::SceneChangeLayers { id, .. } => Some(id.as_str()),
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::Init { document } => write!(
                f,
                "init (version {}, {} layers, {} stages, {} scenes)",
                document.version,
                document.layers.len(),
                document.stages.len(),
                document.scenes.len()
            ),
            ChangeEvent::AppChange { keys, .. } => write!(f, "app:change [{}]", keys.join(", ")),
            ChangeEvent::LayerChangeName { id, old, new }
            | ChangeEvent::StageChangeName { id, old, new }
            | ChangeEvent::SceneChangeName { id, old, new }
            | ChangeEvent::SceneChangeCameraStateCode { id, old, new }
            | ChangeEvent::SceneChangeStage { id, old, new } => {
                write!(f, "{} {id}: {old:?} -> {new:?}", self.kind())
            }
            ChangeEvent::LayerChangeProps { id, keys, .. } => {
                write!(f, "{} {id}: [{}]", self.kind(), keys.join(", "))
            }
            ChangeEvent::StageChangeLayers { id, old, new }
            | ChangeEvent::SceneChangeLayers { id, old, new } => {
                write!(f, "{} {id}: {old} -> {new}", self.kind())
            }
            ChangeEvent::StageChangeProjection { id, .. } => write!(f, "{} {id}", self.kind()),
            _ => write!(f, "{} {}", self.kind(), self.entity_id().unwrap_or_default()),
        }
    }
}

/// 事件监听器
pub type Listener = Rc<dyn Fn(&ChangeEvent)>;

/// 订阅句柄，用于取消订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    /// `None` 表示订阅全部事件
    kind: Option<EventKind>,
    listener: Listener,
}

/// 同步事件分发器
///
/// 按订阅顺序调用监听器。每次分发前对监听器列表做快照，
/// 因此监听器在回调中订阅或取消订阅不会影响当前这次分发。
#[derive(Default)]
pub struct EventDispatcher {
    registrations: RefCell<Vec<Registration>>,
    next_id: Cell<u64>,
}

impl EventDispatcher {
    /// 创建新的事件分发器
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅某一类事件
    ///
    /// # 参数
    /// * `kind` - 事件类型
    /// * `listener` - 回调
    ///
    /// # 返回
    /// * `SubscriptionId` - 订阅句柄
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        self.register(Some(kind), Rc::new(listener))
    }

    /// 订阅全部事件
    pub fn subscribe_all<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        self.register(None, Rc::new(listener))
    }

    fn register(&self, kind: Option<EventKind>, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.registrations.borrow_mut().push(Registration { id, kind, listener });
        id
    }

    /// 取消订阅
    ///
    /// # 返回
    /// * `bool` - 句柄是否存在
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registrations = self.registrations.borrow_mut();
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        registrations.len() != before
    }

    /// 某类事件的监听器数量（包含订阅全部事件的监听器）
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registrations
            .borrow()
            .iter()
            .filter(|registration| registration.kind.map_or(true, |k| k == kind))
            .count()
    }

    /// 分发一个事件
    ///
    /// # 返回
    /// * `usize` - 被调用的监听器数量
    pub fn emit(&self, event: &ChangeEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = self
            .registrations
            .borrow()
            .iter()
            .filter(|registration| registration.kind.map_or(true, |k| k == kind))
            .map(|registration| Rc::clone(&registration.listener))
            .collect();

        for listener in &snapshot {
            listener(event);
        }

        snapshot.len()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.registrations.borrow().len())
            .field("next_id", &self.next_id.get())
            .finish()
    }
}
