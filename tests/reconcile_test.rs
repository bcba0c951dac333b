//! 配置协调集成测试
//!
//! 通过公开 API 验证引擎的原子性、幂等性和事件粒度

use polaris_config::config::{
    DocumentFormat, DocumentLoader, FileDocumentLoader, Layer, LayerSelection, Scene, Stage,
};
use polaris_config::{
    ChangeEvent, ConfigManager, Document, EventKind, ManagerError, UsageError, ValidationError,
};
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn layer(id: &str, name: &str) -> Layer {
    Layer {
        id: id.to_string(),
        name: name.to_string(),
        class: "GridLayer".to_string(),
        props: object(json!({
            "width": 10000,
            "color": "#004a75",
            "style": { "lineWidth": 2, "dash": [1, 2] }
        })),
        data_props: None,
    }
}

fn create_test_document() -> Document {
    Document {
        version: "0.0.1".to_string(),
        app: object(json!({ "width": 1400, "height": 700, "pitchLimit": [0, 2.2] })),
        layers: vec![layer("A", "x"), layer("B", "y")],
        stages: vec![Stage {
            id: "LOCAL_STAGE_MAIN".to_string(),
            name: "MainStage".to_string(),
            layers: vec!["*".to_string()].into(),
            projection: Some(json!({ "type": "Mercator" })),
        }],
        scenes: vec![Scene {
            id: "LOCAL_SCENE_DEFAULT".to_string(),
            name: "DefaultScene".to_string(),
            camera_state_code: "1|0|0|0|1|0.2|18".to_string(),
            stage: "LOCAL_STAGE_MAIN".to_string(),
            layers: vec!["*".to_string()].into(),
        }],
        data_stubs: vec![],
    }
}

/// 初始化引擎并记录之后的全部事件（不含 init）
fn initialized_manager() -> (ConfigManager, Rc<RefCell<Vec<ChangeEvent>>>) {
    let manager = ConfigManager::new();
    manager.init(&create_test_document()).unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    manager.subscribe_all(move |event| sink.borrow_mut().push(event.clone()));
    (manager, events)
}

fn kinds(events: &Rc<RefCell<Vec<ChangeEvent>>>) -> Vec<EventKind> {
    events.borrow().iter().map(ChangeEvent::kind).collect()
}

#[test]
fn test_rename_scenario_emits_single_event() {
    let (manager, events) = initialized_manager();

    let mut next = create_test_document();
    next.layers[1].name = "z".to_string();
    manager.set_config(&next).unwrap();

    assert_eq!(
        *events.borrow(),
        vec![ChangeEvent::LayerChangeName {
            id: "B".to_string(),
            old: "y".to_string(),
            new: "z".to_string(),
        }]
    );
}

#[test]
fn test_atomicity_on_invalid_document() {
    let (manager, events) = initialized_manager();
    let before = manager.document();

    let mut invalid = create_test_document();
    invalid.layers[0].name = "changed".to_string();
    invalid.app.insert("fov".to_string(), json!(30));
    invalid.scenes[0].layers = vec!["MISSING".to_string()].into();

    let err = manager.set_config(&invalid).unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Validation(ValidationError::UnknownLayer { .. })
    ));
    assert!(events.borrow().is_empty());
    assert_eq!(manager.document(), before);

    // 之后的合法更新仍以原基线为准
    let mut next = create_test_document();
    next.layers[0].name = "changed".to_string();
    manager.set_config(&next).unwrap();
    assert_eq!(kinds(&events), vec![EventKind::LayerChangeName]);
}

#[test]
fn test_duplicate_layer_rejected_baseline_kept() {
    let (manager, events) = initialized_manager();

    let mut duplicated = create_test_document();
    duplicated.layers.push(layer("B", "another"));

    assert_eq!(
        manager.set_config(&duplicated),
        Err(ManagerError::Validation(ValidationError::DuplicateId {
            collection: polaris_config::config::Collection::Layers,
            id: "B".to_string(),
        }))
    );
    assert!(events.borrow().is_empty());
    assert_eq!(manager.document(), Some(create_test_document()));
}

#[test]
fn test_idempotent_resubmission() {
    let (manager, events) = initialized_manager();

    let mut next = create_test_document();
    next.layers[0].props.insert("color".to_string(), json!("#ffffff"));
    manager.set_config(&next).unwrap();
    events.borrow_mut().clear();

    let copy: Document = serde_json::from_value(serde_json::to_value(&next).unwrap()).unwrap();
    manager.set_config(&copy).unwrap();
    manager.set_config(&copy).unwrap();
    assert!(events.borrow().is_empty());
}

#[test]
fn test_reordering_emits_nothing() {
    let (manager, events) = initialized_manager();

    let mut reordered = create_test_document();
    reordered.layers.reverse();
    let props = &mut reordered.layers[0].props;
    let color = props.remove("color").unwrap();
    props.insert("color".to_string(), color);

    manager.set_config(&reordered).unwrap();
    assert!(events.borrow().is_empty());
}

#[test]
fn test_name_change_has_no_props_event() {
    let (manager, events) = initialized_manager();

    let mut next = create_test_document();
    next.layers[1].name = "renamed".to_string();
    manager.set_config(&next).unwrap();

    assert_eq!(kinds(&events), vec![EventKind::LayerChangeName]);
}

#[test]
fn test_nested_props_change_has_no_name_event() {
    let (manager, events) = initialized_manager();

    let mut next = create_test_document();
    next.layers[1].props["style"]["dash"] = json!([4, 4]);
    manager.set_config(&next).unwrap();

    let recorded = events.borrow();
    assert_eq!(recorded.len(), 1);
    match &recorded[0] {
        ChangeEvent::LayerChangeProps { id, keys, old, new } => {
            assert_eq!(id, "B");
            assert_eq!(keys, &vec!["style".to_string()]);
            assert_eq!(old["style"]["dash"], json!([1, 2]));
            assert_eq!(new["style"]["dash"], json!([4, 4]));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_append_and_remove_last_layer() {
    let (manager, events) = initialized_manager();

    let mut appended = create_test_document();
    appended.layers.push(layer("C", "new"));
    manager.set_config(&appended).unwrap();
    assert_eq!(kinds(&events), vec![EventKind::LayerAdd]);
    assert_eq!(events.borrow()[0].entity_id(), Some("C"));

    events.borrow_mut().clear();
    manager.set_config(&create_test_document()).unwrap();
    assert_eq!(kinds(&events), vec![EventKind::LayerRemove]);
    match &events.borrow()[0] {
        ChangeEvent::LayerRemove { layer } => assert_eq!(layer.name, "new"),
        other => panic!("unexpected event: {other:?}"),
    };
}

#[test]
fn test_caller_mutation_after_set_config() {
    let (manager, events) = initialized_manager();

    let mut next = create_test_document();
    next.layers[0].name = "first".to_string();
    manager.set_config(&next).unwrap();
    events.borrow_mut().clear();

    // 修改调用方持有的文档不影响引擎的基线
    next.layers[0].name = "mutated".to_string();
    next.layers[1].props.clear();

    let mut again = create_test_document();
    again.layers[0].name = "first".to_string();
    manager.set_config(&again).unwrap();
    assert!(events.borrow().is_empty());
}

#[test]
fn test_full_emission_order() {
    let (manager, events) = initialized_manager();

    let mut next = create_test_document();
    next.app.insert("width".to_string(), json!(1920));
    next.layers.remove(0);
    next.layers.push(layer("C", "added"));
    next.layers[0].name = "b".to_string();
    next.stages.push(Stage {
        id: "LOCAL_STAGE_SIDE".to_string(),
        name: "SideStage".to_string(),
        layers: vec!["C".to_string()].into(),
        projection: None,
    });
    next.scenes[0].stage = "LOCAL_STAGE_SIDE".to_string();
    next.scenes[0].camera_state_code = "1|1|1|1|1|1|1".to_string();

    manager.set_config(&next).unwrap();

    assert_eq!(
        kinds(&events),
        vec![
            EventKind::AppChange,
            EventKind::LayerRemove,
            EventKind::LayerAdd,
            EventKind::LayerChangeName,
            EventKind::StageAdd,
            EventKind::SceneChangeCameraStateCode,
            EventKind::SceneChangeStage,
        ]
    );
}

#[test]
fn test_wildcard_and_explicit_selection_changes() {
    let (manager, events) = initialized_manager();

    let mut explicit = create_test_document();
    explicit.stages[0].layers = vec!["A".to_string(), "B".to_string()].into();
    manager.set_config(&explicit).unwrap();

    match &events.borrow()[0] {
        ChangeEvent::StageChangeLayers { old, new, .. } => {
            assert_eq!(old, &LayerSelection::All);
            assert_eq!(
                new,
                &LayerSelection::Explicit(vec!["A".to_string(), "B".to_string()])
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }

    events.borrow_mut().clear();
    let mut swapped = explicit.clone();
    swapped.stages[0].layers = vec!["B".to_string(), "A".to_string()].into();
    manager.set_config(&swapped).unwrap();
    assert!(events.borrow().is_empty());
}

#[test]
fn test_independent_managers_coexist() {
    let first = ConfigManager::new();
    let second = ConfigManager::new();
    first.init(&create_test_document()).unwrap();

    assert!(first.is_initialized());
    assert_eq!(
        second.set_config(&create_test_document()),
        Err(ManagerError::Usage(UsageError::NotInitialized {
            operation: "set_config"
        }))
    );
}

#[test]
fn test_subscription_by_kind_and_unsubscribe() {
    let manager = ConfigManager::new();
    manager.init(&create_test_document()).unwrap();

    let names = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&names);
    let id = manager.subscribe(EventKind::LayerChangeName, move |event| {
        if let ChangeEvent::LayerChangeName { new, .. } = event {
            sink.borrow_mut().push(new.clone());
        }
    });

    let mut next = create_test_document();
    next.layers[0].name = "one".to_string();
    next.app.insert("fov".to_string(), json!(20));
    manager.set_config(&next).unwrap();

    assert!(manager.unsubscribe(id));
    next.layers[0].name = "two".to_string();
    manager.set_config(&next).unwrap();

    assert_eq!(*names.borrow(), vec!["one".to_string()]);
}

#[tokio::test]
async fn test_loaded_documents_drive_manager() {
    let loader = FileDocumentLoader::new(false);
    let json_text = serde_json::to_string(&create_test_document()).unwrap();
    let document = loader
        .load_from_string(&json_text, DocumentFormat::Json)
        .await
        .unwrap();

    let manager = ConfigManager::new();
    manager.init(&document).unwrap();
    assert_eq!(
        manager.resolved_scene_layers("LOCAL_SCENE_DEFAULT"),
        Some(vec!["A".to_string(), "B".to_string()])
    );

    let changed = json_text.replace("\"name\":\"y\"", "\"name\":\"z\"");
    let next = loader
        .load_from_string(&changed, DocumentFormat::Json)
        .await
        .unwrap();
    assert_eq!(manager.set_config(&next).unwrap(), 2);
}

#[test]
fn test_large_integer_change_is_not_lost() {
    let manager = ConfigManager::new();
    let mut document = create_test_document();
    document.layers[0]
        .props
        .insert("seed".to_string(), json!(9_007_199_254_740_993_u64));
    manager.init(&document).unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    manager.subscribe_all(move |event| sink.borrow_mut().push(event.clone()));

    document.layers[0]
        .props
        .insert("seed".to_string(), json!(9_007_199_254_740_992_u64));
    assert_eq!(manager.set_config(&document).unwrap(), 2);
    assert_eq!(kinds(&events), vec![EventKind::LayerChangeProps]);
    assert_eq!(
        manager.document().unwrap().layers[0].props["seed"],
        json!(9_007_199_254_740_992_u64)
    );
}

#[test]
fn test_wildcard_mixed_with_ids_rejected() {
    let (manager, events) = initialized_manager();

    let text = serde_json::to_string(&create_test_document())
        .unwrap()
        .replacen("\"layers\":[\"*\"]", "\"layers\":[\"*\",\"GHOST\"]", 1);
    let document: Document = serde_json::from_str(&text).unwrap();

    assert_eq!(
        manager.set_config(&document),
        Err(ManagerError::Validation(ValidationError::MixedWildcard {
            owner: polaris_config::config::Collection::Stages,
            owner_id: "LOCAL_STAGE_MAIN".to_string(),
        }))
    );
    assert!(events.borrow().is_empty());
    assert_eq!(manager.document(), Some(create_test_document()));
}
