//! Integration Tests
//!
//! End-to-end tests for the routing engine on the software host.

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use test_case::test_case;

use cablebus::engine::{EffectId, EngineStatus, NodeId, RouteId, SignalStage};
use cablebus::host::SineSource;
use cablebus::{
    ContextState, DeviceDescriptor, DeviceDirection, EffectKind, RoutingEngine, SoftwareHost,
};

/// Engine with two capture and two playback devices, already started
fn running_engine() -> RoutingEngine {
    let host = SoftwareHost::default()
        .with_capture_device(
            DeviceDescriptor::new("mic", "Microphone", DeviceDirection::Capture).as_default(),
            SineSource::new(440.0, 0.5),
        )
        .with_capture_device(
            DeviceDescriptor::new("line", "Line In", DeviceDirection::Capture),
            SineSource::new(220.0, 0.5),
        )
        .with_playback_device(DeviceDescriptor::new(
            "spk",
            "Speakers",
            DeviceDirection::Playback,
        ))
        .with_playback_device(DeviceDescriptor::new(
            "phones",
            "Headphones",
            DeviceDirection::Playback,
        ));
    let mut engine = RoutingEngine::with_defaults(host);
    engine.start().unwrap();
    engine
}

fn routed_engine() -> (RoutingEngine, RouteId) {
    let mut engine = running_engine();
    let mic = engine.create_input_node("mic").unwrap();
    let spk = engine.create_output_node("spk").unwrap();
    let route = engine.create_route(&mic, &spk).unwrap();
    (engine, route)
}

fn effect_path(engine: &RoutingEngine, route: &RouteId) -> Vec<SignalStage> {
    engine.route_signal_path(route).unwrap()
}

// === Node Registry ===

#[test]
fn test_duplicate_input_node_keeps_one() {
    let mut engine = running_engine();
    engine.create_input_node("mic").unwrap();
    engine.set_node_volume(&NodeId::input("mic"), 30.0).unwrap();

    let err = engine.create_input_node("mic").unwrap_err();
    assert_eq!(err.error_code(), "DUPLICATE_NODE");
    assert_eq!(engine.status().input_node_count, 1);
    assert_eq!(engine.host().open_capture_count(), 1);
    assert_relative_eq!(
        engine.node(&NodeId::input("mic")).unwrap().volume.percent(),
        30.0
    );
}

#[test]
fn test_same_device_in_both_directions_is_allowed() {
    let mut engine = running_engine();
    engine.create_input_node("mic").unwrap();
    engine.create_output_node("mic").unwrap();
    assert_eq!(engine.nodes().len(), 2);
}

#[test]
fn test_unknown_capture_device() {
    let mut engine = running_engine();
    let err = engine.create_input_node("ghost").unwrap_err();
    assert_eq!(err.error_code(), "DEVICE_UNAVAILABLE");
    assert!(engine.nodes().is_empty());
}

#[test]
fn test_default_capture_device_resolves() {
    let mut engine = running_engine();
    engine.create_input_node("default").unwrap();
    assert_eq!(engine.host().capturing_devices(), vec!["mic".to_string()]);
}

#[test]
fn test_default_alias_and_device_id_share_one_capture() {
    let mut engine = running_engine();
    engine.create_input_node("default").unwrap();
    let stages = engine.host().stage_count();

    let err = engine.create_input_node("mic").unwrap_err();
    assert_eq!(err.error_code(), "DUPLICATE_NODE");
    assert_eq!(engine.status().input_node_count, 1);
    assert_eq!(engine.host().open_capture_count(), 1);
    assert_eq!(engine.host().stage_count(), stages);
    assert!(engine.node(&NodeId::input("mic")).is_none());
}

#[test]
fn test_device_id_then_default_alias_is_duplicate() {
    let mut engine = running_engine();
    engine.create_input_node("mic").unwrap();
    let err = engine.create_input_node("default").unwrap_err();
    assert_eq!(err.error_code(), "DUPLICATE_NODE");
    assert_eq!(engine.host().capturing_devices(), vec!["mic".to_string()]);
}

#[test]
fn test_remove_unknown_node_is_noop() {
    let mut engine = running_engine();
    engine.remove_node(&NodeId::input("nothing")).unwrap();
}

#[test]
fn test_remove_node_releases_capture() {
    let mut engine = running_engine();
    let mic = engine.create_input_node("mic").unwrap();
    engine.remove_node(&mic).unwrap();
    assert_eq!(engine.host().open_capture_count(), 0);
    // master only
    assert_eq!(engine.host().stage_count(), 1);
}

#[test]
fn test_node_volume_missing_node() {
    let mut engine = running_engine();
    let err = engine
        .set_node_volume(&NodeId::output("spk"), 50.0)
        .unwrap_err();
    assert_eq!(err.error_code(), "NODE_NOT_FOUND");
}

// === Route Legality ===

#[test_case("input-mic", "output-spk", None ; "capture to playback")]
#[test_case("output-spk", "input-mic", Some("INVALID_ROUTE_ENDPOINTS") ; "reversed")]
#[test_case("input-mic", "input-line", Some("INVALID_ROUTE_ENDPOINTS") ; "capture to capture")]
#[test_case("output-spk", "output-phones", Some("INVALID_ROUTE_ENDPOINTS") ; "playback to playback")]
#[test_case("input-mic", "output-nowhere", Some("NODE_NOT_FOUND") ; "missing target")]
#[test_case("input-nowhere", "output-spk", Some("NODE_NOT_FOUND") ; "missing source")]
fn test_route_legality(source: &str, target: &str, expected: Option<&str>) {
    let mut engine = running_engine();
    engine.create_input_node("mic").unwrap();
    engine.create_input_node("line").unwrap();
    engine.create_output_node("spk").unwrap();
    engine.create_output_node("phones").unwrap();
    let stages_before = engine.host().stage_count();

    let result = engine.create_route(&source.parse().unwrap(), &target.parse().unwrap());
    match expected {
        None => {
            assert!(result.is_ok());
            assert_eq!(engine.status().route_count, 1);
        }
        Some(code) => {
            assert_eq!(result.unwrap_err().error_code(), code);
            assert_eq!(engine.status().route_count, 0);
            assert_eq!(engine.host().stage_count(), stages_before);
        }
    }
}

#[test]
fn test_inactive_endpoint_rejected() {
    let mut engine = running_engine();
    let mic = engine.create_input_node("mic").unwrap();
    let spk = engine.create_output_node("spk").unwrap();
    engine.set_node_active(&spk, false).unwrap();

    let err = engine.create_route(&mic, &spk).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_ROUTE_ENDPOINTS");

    engine.set_node_active(&spk, true).unwrap();
    engine.create_route(&mic, &spk).unwrap();
}

#[test]
fn test_connect_disconnect_scenario() {
    let mut engine = running_engine();
    let a = engine.create_input_node("mic").unwrap();
    let b = engine.create_output_node("spk").unwrap();

    let route = engine.create_route(&a, &b).unwrap();
    assert_eq!(route.to_string(), "input-mic-output-spk");

    let err = engine.create_route(&a, &b).unwrap_err();
    assert_eq!(err.error_code(), "DUPLICATE_ROUTE");
    assert_eq!(engine.status().route_count, 1);

    engine.remove_node(&a).unwrap();
    assert_eq!(engine.status().route_count, 0);
    assert!(engine.route(&route).is_none());
}

#[test]
fn test_remove_node_cascades_every_touching_route() {
    let mut engine = running_engine();
    let mic = engine.create_input_node("mic").unwrap();
    let line = engine.create_input_node("line").unwrap();
    let spk = engine.create_output_node("spk").unwrap();
    let phones = engine.create_output_node("phones").unwrap();
    engine.create_route(&mic, &spk).unwrap();
    engine.create_route(&mic, &phones).unwrap();
    let kept = engine.create_route(&line, &phones).unwrap();
    let to_spk = engine.create_route(&line, &spk).unwrap();
    engine.add_effect(&to_spk, EffectKind::Delay).unwrap();

    engine.remove_node(&spk).unwrap();
    engine.remove_node(&mic).unwrap();

    let remaining: Vec<RouteId> = engine.routes().into_iter().map(|r| r.id).collect();
    assert_eq!(remaining, vec![kept]);
    for route in engine.routes() {
        assert!(engine.node(&route.source).is_some());
        assert!(engine.node(&route.target).is_some());
    }
}

#[test]
fn test_remove_unknown_route_is_noop() {
    let (mut engine, route) = routed_engine();
    engine.remove_route(&route).unwrap();
    engine.remove_route(&route).unwrap();
    assert_eq!(engine.status().route_count, 0);
}

// === Effect Chains ===

#[test]
fn test_append_then_remove_restores_connectivity() {
    let (mut engine, route) = routed_engine();
    let before = effect_path(&engine, &route);
    let edges_before = engine.host().edge_count();

    let effect = engine.add_effect(&route, EffectKind::Reverb).unwrap();
    assert_eq!(effect_path(&engine, &route).len(), before.len() + 1);

    engine.remove_effect(&route, &effect).unwrap();
    assert_eq!(effect_path(&engine, &route), before);
    assert_eq!(engine.host().edge_count(), edges_before);
}

#[test]
fn test_remove_first_effect_keeps_successor_linked() {
    let (mut engine, route) = routed_engine();
    let eq = engine.add_effect(&route, EffectKind::Equalizer).unwrap();
    let comp = engine.add_effect(&route, EffectKind::Compressor).unwrap();

    engine.remove_effect(&route, &eq).unwrap();
    assert_eq!(
        effect_path(&engine, &route),
        vec![
            SignalStage::RouteGain,
            SignalStage::Effect(comp),
            SignalStage::Target(NodeId::output("spk")),
        ]
    );
}

#[test]
fn test_effects_take_default_parameters() {
    let (mut engine, route) = routed_engine();
    let comp = engine.add_effect(&route, EffectKind::Compressor).unwrap();
    let info = engine.route(&route).unwrap();
    let unit = info.effects.iter().find(|e| e.id == comp).unwrap();
    assert_eq!(unit.kind, EffectKind::Compressor);
    assert!(unit.enabled);
    assert_eq!(unit.parameters["threshold_db"], -24.0);
    assert_eq!(unit.parameters["ratio"], 4.0);
    assert_eq!(unit.parameters["attack_ms"], 3.0);
    assert_eq!(unit.parameters["release_ms"], 250.0);
}

#[test]
fn test_remove_unknown_effect_is_noop() {
    let (mut engine, route) = routed_engine();
    engine.add_effect(&route, EffectKind::Filter).unwrap();
    engine.remove_effect(&route, &EffectId::generate()).unwrap();
    assert_eq!(engine.route(&route).unwrap().effects.len(), 1);
}

#[test]
fn test_add_effect_to_missing_route() {
    let mut engine = running_engine();
    let route = RouteId::new(NodeId::input("mic"), NodeId::output("spk"));
    let err = engine.add_effect(&route, EffectKind::Delay).unwrap_err();
    assert_eq!(err.error_code(), "ROUTE_NOT_FOUND");
}

#[test]
fn test_effect_on_inactive_route_keeps_settings() {
    let (mut engine, route) = routed_engine();
    let delay = engine.add_effect(&route, EffectKind::Delay).unwrap();
    engine.set_route_active(&route, false).unwrap();
    engine
        .set_effect_parameter(&route, &delay, "time_ms", 120.0)
        .unwrap();
    engine.set_route_active(&route, true).unwrap();

    let info = engine.route(&route).unwrap();
    assert!(info.active);
    assert_eq!(info.effects[0].parameters["time_ms"], 120.0);
}

// === Volume ===

#[test_case(-20.0, 0.0 ; "below range")]
#[test_case(55.0, 55.0 ; "in range")]
#[test_case(180.0, 100.0 ; "above range")]
fn test_volume_setters_clamp(input: f32, expected: f32) {
    let (mut engine, route) = routed_engine();
    let mic = NodeId::input("mic");

    engine.set_node_volume(&mic, input).unwrap();
    engine.set_route_volume(&route, input).unwrap();
    engine.set_master_volume(input).unwrap();

    assert_eq!(engine.node(&mic).unwrap().volume.percent(), expected);
    assert_eq!(engine.route(&route).unwrap().volume.percent(), expected);
    assert_eq!(engine.master_volume().percent(), expected);
}

#[test]
fn test_volume_is_idempotent() {
    let (mut engine, route) = routed_engine();
    engine.set_route_volume(&route, 62.0).unwrap();
    let first = engine.route(&route).unwrap().volume;
    engine.set_route_volume(&route, 62.0).unwrap();
    assert_eq!(engine.route(&route).unwrap().volume, first);
}

// === Lifecycle ===

#[test]
fn test_mutations_require_running_context() {
    let mut engine = RoutingEngine::with_defaults(SoftwareHost::default());
    let err = engine.create_output_node("spk").unwrap_err();
    assert_eq!(err.error_code(), "CONTEXT_NOT_READY");

    engine.start().unwrap();
    engine.suspend().unwrap();
    let err = engine.create_output_node("spk").unwrap_err();
    assert_eq!(err.error_code(), "CONTEXT_NOT_READY");

    engine.start().unwrap();
    engine.create_output_node("spk").unwrap();
}

#[test]
fn test_stop_then_mutate_fails() {
    let (mut engine, route) = routed_engine();
    engine.stop().unwrap();
    assert_eq!(engine.status().context_state, ContextState::Closed);
    assert!(engine.status().sample_rate.is_none());

    let mic = NodeId::input("mic");
    let errors = vec![
        engine.create_input_node("line").unwrap_err(),
        engine.create_output_node("phones").unwrap_err(),
        engine.remove_node(&mic).unwrap_err(),
        engine.create_route(&mic, &NodeId::output("spk")).unwrap_err(),
        engine.remove_route(&route).unwrap_err(),
        engine.set_node_volume(&mic, 10.0).unwrap_err(),
        engine.set_route_volume(&route, 10.0).unwrap_err(),
        engine.set_master_volume(10.0).unwrap_err(),
        engine.add_effect(&route, EffectKind::Reverb).unwrap_err(),
        engine.start().unwrap_err(),
    ];
    for err in errors {
        assert_eq!(err.error_code(), "CONTEXT_NOT_READY");
    }
}

#[test]
fn test_stop_tears_down_all_hardware() {
    let (mut engine, route) = routed_engine();
    engine.add_effect(&route, EffectKind::Equalizer).unwrap();
    engine.stop().unwrap();
    assert_eq!(engine.host().open_capture_count(), 0);
    assert_eq!(engine.host().stage_count(), 0);
    assert_eq!(engine.status().input_node_count, 0);
    assert_eq!(engine.status().output_node_count, 0);
}

#[test]
fn test_failed_initialize_is_fatal() {
    let mut engine = RoutingEngine::with_defaults(SoftwareHost::unavailable());
    let err = engine.start().unwrap_err();
    assert_eq!(err.error_code(), "CONTEXT_INIT_ERROR");
    assert!(!err.is_recoverable());
    assert_eq!(engine.status().context_state, ContextState::Closed);
    assert_eq!(engine.start().unwrap_err().error_code(), "CONTEXT_NOT_READY");
}

#[test]
fn test_close_failure_is_surfaced() {
    let (mut engine, _route) = routed_engine();
    engine.host_mut().fail_on_close();
    let err = engine.stop().unwrap_err();
    assert_eq!(err.error_code(), "HOST_ERROR");
    assert_eq!(engine.status().context_state, ContextState::Closed);
}

#[test]
fn test_status_counts() {
    let (mut engine, _route) = routed_engine();
    engine.create_output_node("phones").unwrap();
    let status = engine.status();
    assert_eq!(status.context_state, ContextState::Running);
    assert_eq!(status.input_node_count, 1);
    assert_eq!(status.output_node_count, 2);
    assert_eq!(status.route_count, 1);
    assert_eq!(status.sample_rate, Some(48000));
}

// === All-Or-Nothing Mutations ===

/// Everything a failed mutation must leave untouched
#[derive(Debug, PartialEq)]
struct Footprint {
    stages: usize,
    edges: usize,
    captures: usize,
    status: EngineStatus,
    path: Vec<SignalStage>,
}

fn footprint(engine: &RoutingEngine, route: &RouteId) -> Footprint {
    Footprint {
        stages: engine.host().stage_count(),
        edges: engine.host().edge_count(),
        captures: engine.host().open_capture_count(),
        status: engine.status(),
        path: effect_path(engine, route),
    }
}

#[test]
fn test_failed_output_node_leaves_no_stages() {
    let (mut engine, route) = routed_engine();
    let before = footprint(&engine, &route);
    assert_eq!(before.stages, 7);
    assert_eq!(before.edges, 7);

    engine.host_mut().limit_stages(1);
    let err = engine.create_output_node("phones").unwrap_err();
    assert_eq!(err.error_code(), "HOST_ERROR");
    assert_eq!(footprint(&engine, &route), before);
    assert!(engine.node(&NodeId::output("phones")).is_none());
}

#[test_case(0 ; "before the capture stage")]
#[test_case(1 ; "before the gain stage")]
#[test_case(2 ; "before the analyzer stage")]
fn test_failed_input_node_stops_its_capture(budget: usize) {
    let (mut engine, route) = routed_engine();
    let before = footprint(&engine, &route);

    engine.host_mut().limit_stages(budget);
    let err = engine.create_input_node("line").unwrap_err();
    assert_eq!(err.error_code(), "HOST_ERROR");
    assert_eq!(footprint(&engine, &route), before);
    assert_eq!(engine.host().capturing_devices(), vec!["mic".to_string()]);
}

#[test]
fn test_failed_route_leaves_endpoints_unwired() {
    let (mut engine, route) = routed_engine();
    let phones = engine.create_output_node("phones").unwrap();
    let before = footprint(&engine, &route);

    engine.host_mut().limit_stages(0);
    let err = engine
        .create_route(&NodeId::input("mic"), &phones)
        .unwrap_err();
    assert_eq!(err.error_code(), "HOST_ERROR");
    assert_eq!(footprint(&engine, &route), before);
    assert!(engine
        .route(&RouteId::new(NodeId::input("mic"), phones))
        .is_none());
}

#[test]
fn test_failed_effect_leaves_chain_intact() {
    let (mut engine, route) = routed_engine();
    let eq = engine.add_effect(&route, EffectKind::Equalizer).unwrap();
    let before = footprint(&engine, &route);

    engine.host_mut().limit_stages(0);
    let err = engine.add_effect(&route, EffectKind::Reverb).unwrap_err();
    assert_eq!(err.error_code(), "HOST_ERROR");
    assert_eq!(footprint(&engine, &route), before);
    let effects: Vec<EffectId> = engine
        .route(&route)
        .unwrap()
        .effects
        .iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(effects, vec![eq]);
}

#[test]
fn test_engine_recovers_after_failed_mutation() {
    let (mut engine, route) = routed_engine();
    engine.host_mut().limit_stages(0);
    assert!(engine.create_input_node("line").is_err());

    engine.host_mut().limit_stages(16);
    let line = engine.create_input_node("line").unwrap();
    engine
        .create_route(&line, &NodeId::output("spk"))
        .unwrap();
    engine.add_effect(&route, EffectKind::Delay).unwrap();
    assert_eq!(engine.status().route_count, 2);
    assert_eq!(engine.host().open_capture_count(), 2);
}
