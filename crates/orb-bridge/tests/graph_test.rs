//! Object-graph topology tests: duplicates, cycles, and the fixup
//! scripts that carry them across the wire.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use orb_bridge::{
    BeanDescriptor, Bridge, BridgeConfig, ClassDescriptor, SerializerOptions, SerializerRegistry,
    SerializerState, TypeDesc, TypeRegistry, Value,
};
use orb_common::protocol::fixups::apply_fixups;
use orb_common::protocol::PathToken;
use serde_json::json;

fn node_bean() -> BeanDescriptor {
    BeanDescriptor::new("Node")
        .field("n", TypeDesc::Int)
        .field("next", TypeDesc::bean("Node"))
}

fn node(n: i32) -> Value {
    Value::object(
        "Node",
        BTreeMap::from([
            ("n".to_string(), Value::Int(n)),
            ("next".to_string(), Value::Null),
        ]),
    )
}

fn registry() -> SerializerRegistry {
    let types = TypeRegistry::new();
    types.register_bean(node_bean());
    SerializerRegistry::new(SerializerOptions::default(), Arc::new(types))
}

// ---------------------------------------------------------------------------
// Registry-level round trips
// ---------------------------------------------------------------------------

#[test]
fn test_acyclic_graph_round_trips_by_deep_equality() {
    let registry = registry();
    let graph = Value::list(vec![node(1), node(2), node(3)]);

    let mut state = SerializerState::new();
    let wire = registry.marshal(&mut state, "result", &graph).unwrap();
    assert!(!state.has_fixups());

    let mut in_state = SerializerState::new();
    let back = registry
        .unmarshal(
            &mut in_state,
            vec![PathToken::ident("params"), PathToken::Index(0)],
            &TypeDesc::list(TypeDesc::bean("Node")),
            &wire,
        )
        .unwrap();
    assert_eq!(back, graph);
}

#[test]
fn test_duplicate_emits_placeholder_and_fixup() {
    let registry = registry();
    let shared = node(7);
    let graph = Value::list(vec![shared.clone(), shared]);

    let mut state = SerializerState::new();
    let wire = registry.marshal(&mut state, "result", &graph).unwrap();
    assert_eq!(
        wire,
        json!({"javaClass": "List", "list": [{"javaClass": "Node", "n": 7}, null]})
    );

    let fixups = state.take_fixups();
    assert_eq!(fixups.len(), 1);
    assert_eq!(
        fixups[0].target,
        vec![
            PathToken::ident("result"),
            PathToken::key("list"),
            PathToken::Index(1)
        ]
    );
    assert_eq!(
        fixups[0].source,
        vec![
            PathToken::ident("result"),
            PathToken::key("list"),
            PathToken::Index(0)
        ]
    );

    // Self-produced fixups resolve cleanly against the envelope.
    let mut envelope = json!({"result": wire});
    apply_fixups(&mut envelope, &fixups).unwrap();
    assert_eq!(envelope["result"]["list"][1], envelope["result"]["list"][0]);
}

#[test]
fn test_cycle_emits_placeholder_and_fixup() {
    let registry = registry();
    let looped = node(1);
    assert!(looped.assign_child(&PathToken::key("next"), looped.clone()));

    let mut state = SerializerState::new();
    let wire = registry.marshal(&mut state, "result", &looped).unwrap();
    assert_eq!(wire, json!({"javaClass": "Node", "n": 1, "next": null}));

    let fixups = state.take_fixups();
    assert_eq!(fixups.len(), 1);
    assert_eq!(
        fixups[0].target,
        vec![PathToken::ident("result"), PathToken::key("next")]
    );
    assert_eq!(fixups[0].source, vec![PathToken::ident("result")]);
}

#[test]
fn test_cycle_fails_when_circular_fixups_disabled() {
    let types = TypeRegistry::new();
    types.register_bean(node_bean());
    let registry = SerializerRegistry::new(
        SerializerOptions {
            fixup_circ_refs: false,
            fixup_duplicates: true,
        },
        Arc::new(types),
    );

    let looped = node(1);
    looped.assign_child(&PathToken::key("next"), looped.clone());

    let mut state = SerializerState::new();
    let err = registry.marshal(&mut state, "result", &looped).unwrap_err();
    assert_eq!(err.to_string(), "circular reference detected");
}

#[test]
fn test_string_scalars_are_not_deduplicated() {
    let registry = registry();
    let text = Value::string("repeated");
    let graph = Value::list(vec![text.clone(), text]);

    let mut state = SerializerState::new();
    let wire = registry.marshal(&mut state, "result", &graph).unwrap();
    assert_eq!(
        wire,
        json!({"javaClass": "List", "list": ["repeated", "repeated"]})
    );
    assert!(!state.has_fixups());
}

// ---------------------------------------------------------------------------
// Bridge-level: inbound identity reconstruction and outbound emission
// ---------------------------------------------------------------------------

struct GraphService {
    saw_shared_args: Arc<AtomicBool>,
    saw_cycle: Arc<AtomicBool>,
}

fn graph_class() -> (Arc<ClassDescriptor>, Arc<AtomicBool>, Arc<AtomicBool>) {
    let saw_shared_args = Arc::new(AtomicBool::new(false));
    let saw_cycle = Arc::new(AtomicBool::new(false));
    let class = ClassDescriptor::builder("GraphService")
        .instance_method(
            "pair",
            vec![TypeDesc::bean("Node"), TypeDesc::bean("Node")],
            |svc: &GraphService, args| {
                svc.saw_shared_args
                    .store(Value::same_cell(&args[0], &args[1]), Ordering::SeqCst);
                Ok(Value::array(vec![args[0].clone(), args[1].clone()]))
            },
        )
        .instance_method("identity", vec![TypeDesc::bean("Node")], |svc: &GraphService, args| {
            if let Value::Object(cell) = &args[0] {
                let next = cell.read().unwrap().fields.get("next").cloned();
                if let Some(next) = next {
                    svc.saw_cycle
                        .store(Value::same_cell(&args[0], &next), Ordering::SeqCst);
                }
            }
            Ok(args[0].clone())
        })
        .build();
    (class, saw_shared_args, saw_cycle)
}

fn graph_bridge() -> (Arc<Bridge>, Arc<AtomicBool>, Arc<AtomicBool>) {
    let (class, saw_shared_args, saw_cycle) = graph_class();
    let bridge = Bridge::new();
    bridge.register_bean(node_bean());
    bridge
        .register_object(
            "svc",
            Arc::new(GraphService {
                saw_shared_args: saw_shared_args.clone(),
                saw_cycle: saw_cycle.clone(),
            }),
            &class,
        )
        .unwrap();
    (bridge, saw_shared_args, saw_cycle)
}

#[test]
fn test_duplicate_round_trip_through_dispatch() {
    let (bridge, saw_shared_args, _) = graph_bridge();

    let response = bridge.call(
        &[],
        &json!({
            "id": 2,
            "method": "svc.pair",
            "params": [{"javaClass": "Node", "n": 1}, null],
            "fixups": "params[1]=params[0]",
        }),
    );

    // The handler observed one shared instance, not two copies.
    assert!(saw_shared_args.load(Ordering::SeqCst));

    // And the duplicate goes back out as a placeholder plus fixup.
    let envelope = response.to_value();
    assert_eq!(envelope["result"], json!([{"javaClass": "Node", "n": 1}, null]));
    assert_eq!(
        envelope["fixups"],
        json!([[["result", "[1]"], ["result", "[0]"]]])
    );
}

#[test]
fn test_cycle_round_trip_through_dispatch() {
    let (bridge, _, saw_cycle) = graph_bridge();

    let response = bridge.call(
        &[],
        &json!({
            "id": 3,
            "method": "svc.identity",
            "params": [{"javaClass": "Node", "n": 1, "next": null}],
            "fixups": "params[0][\"next\"]=params[0]",
        }),
    );

    // The argument arrived as a true cycle.
    assert!(saw_cycle.load(Ordering::SeqCst));

    let envelope = response.to_value();
    assert_eq!(
        envelope["result"],
        json!({"javaClass": "Node", "n": 1, "next": null})
    );
    assert_eq!(
        envelope["fixups"],
        json!([[["result", "[\"next\"]"], ["result"]]])
    );
}

#[test]
fn test_cycle_result_fails_with_circular_fixups_disabled() {
    let (class, _, _) = graph_class();
    let mut config = BridgeConfig::default();
    config.options.fixup_circ_refs = false;

    let bridge = Bridge::with_config(config);
    bridge.register_bean(node_bean());
    bridge
        .register_object(
            "svc",
            Arc::new(GraphService {
                saw_shared_args: Arc::new(AtomicBool::new(false)),
                saw_cycle: Arc::new(AtomicBool::new(false)),
            }),
            &class,
        )
        .unwrap();

    let response = bridge.call(
        &[],
        &json!({
            "id": 4,
            "method": "svc.identity",
            "params": [{"javaClass": "Node", "n": 1, "next": null}],
            "fixups": "params[0][\"next\"]=params[0]",
        }),
    );
    let envelope = response.to_value();
    assert_eq!(envelope["error"]["code"], json!(593));
    assert_eq!(envelope["error"]["msg"], json!("circular reference detected"));
}

#[test]
fn test_structured_fixups_accepted_on_requests() {
    let (bridge, saw_shared_args, _) = graph_bridge();

    let response = bridge.call(
        &[],
        &json!({
            "id": 5,
            "method": "svc.pair",
            "params": [{"javaClass": "Node", "n": 2}, null],
            "fixups": [[["params", "[1]"], ["params", "[0]"]]],
        }),
    );
    assert!(response.is_success());
    assert!(saw_shared_args.load(Ordering::SeqCst));
}

#[test]
fn test_missing_fixup_source_is_a_parse_error() {
    let (bridge, _, _) = graph_bridge();

    let response = bridge.call(
        &[],
        &json!({
            "id": 6,
            "method": "svc.pair",
            "params": [{"javaClass": "Node", "n": 1}, null],
            "fixups": "params[1]=params[9]",
        }),
    );
    assert_eq!(response.error_code(), 590);
}

// ---------------------------------------------------------------------------
// Container and codec round trips through dispatch
// ---------------------------------------------------------------------------

struct CodecService;

fn codec_class() -> Arc<ClassDescriptor> {
    ClassDescriptor::builder("CodecService")
        .instance_method(
            "bounce_list",
            vec![TypeDesc::list(TypeDesc::Int)],
            |_: &CodecService, args| Ok(args[0].clone()),
        )
        .instance_method(
            "bounce_map",
            vec![TypeDesc::map(TypeDesc::String)],
            |_: &CodecService, args| Ok(args[0].clone()),
        )
        .instance_method("bounce_date", vec![TypeDesc::Date], |_: &CodecService, args| {
            Ok(args[0].clone())
        })
        .instance_method(
            "bounce_enum",
            vec![TypeDesc::enumeration("Color")],
            |_: &CodecService, args| Ok(args[0].clone()),
        )
        .instance_method("bounce_raw", vec![TypeDesc::Raw], |_: &CodecService, args| {
            Ok(args[0].clone())
        })
        .build()
}

fn codec_bridge() -> Arc<Bridge> {
    let bridge = Bridge::new();
    bridge.register_enum("Color", vec!["RED".into(), "GREEN".into()]);
    bridge
        .register_object("codec", Arc::new(CodecService), &codec_class())
        .unwrap();
    bridge
}

#[test]
fn test_container_codecs_through_dispatch() {
    let bridge = codec_bridge();

    let list = json!({"javaClass": "List", "list": [1, 2, 3]});
    let response = bridge.call(
        &[],
        &json!({"id": 1, "method": "codec.bounce_list", "params": [list]}),
    );
    assert_eq!(response.result(), Some(&list));

    let map = json!({"javaClass": "Map", "map": {"a": "x", "b": "y"}});
    let response = bridge.call(
        &[],
        &json!({"id": 2, "method": "codec.bounce_map", "params": [map]}),
    );
    assert_eq!(response.result(), Some(&map));
}

#[test]
fn test_date_enum_raw_through_dispatch() {
    let bridge = codec_bridge();

    let date = json!({"javaClass": "Date", "time": 1_234_567_890});
    let response = bridge.call(
        &[],
        &json!({"id": 1, "method": "codec.bounce_date", "params": [date]}),
    );
    assert_eq!(response.result(), Some(&date));

    let response = bridge.call(
        &[],
        &json!({"id": 2, "method": "codec.bounce_enum", "params": ["GREEN"]}),
    );
    assert_eq!(response.result(), Some(&json!("GREEN")));

    let response = bridge.call(
        &[],
        &json!({"id": 3, "method": "codec.bounce_enum", "params": ["MAUVE"]}),
    );
    assert_eq!(response.error_code(), 592);

    let blob = json!({"arbitrary": [1, {"deep": true}]});
    let response = bridge.call(
        &[],
        &json!({"id": 4, "method": "codec.bounce_raw", "params": [blob]}),
    );
    assert_eq!(response.result(), Some(&blob));
}
