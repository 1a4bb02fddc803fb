//! Set-mode behaviour end to end: input sample → scheduler → store write.

use std::sync::Arc;

use assert_approx_eq::assert_approx_eq;
use midibind::clock::ManualClock;
use midibind::input::{InputSample, SourceKey};
use midibind::mapping::{MappingPatch, Mode, Range, Registry, SourceSelector};
use midibind::property::{Property, PropertyStore, PropertyValue};
use midibind::runtime::{Outcome, Runtime, RuntimeSettings};
use midibind::scheduler::Scheduler;

fn engine(store: Arc<PropertyStore>) -> Scheduler {
    Scheduler::new(
        Arc::new(Registry::new()),
        Runtime::new(store, RuntimeSettings::default()),
        Arc::new(ManualClock::new(24.0)),
    )
}

fn cc(number: u8, raw: f64) -> InputSample {
    InputSample::new(SourceKey::cc(0, number), raw)
}

#[test]
fn identity_hits_range_endpoints() {
    let store = Arc::new(PropertyStore::new());
    store.insert("obj.value", Property::float(0.0)).unwrap();
    let s = engine(store.clone());
    s.registry()
        .create(SourceSelector::cc(1), "obj.value", Mode::Set, Range::new(-3.0, 7.0), "x")
        .unwrap();

    s.dispatch(&cc(1, 0.0));
    assert_approx_eq!(store.value("obj.value").unwrap(), -3.0);
    s.dispatch(&cc(1, 1.0));
    assert_approx_eq!(store.value("obj.value").unwrap(), 7.0);
}

#[test]
fn quantized_knob() {
    let store = Arc::new(PropertyStore::new());
    store.insert("obj.value", Property::float(0.0)).unwrap();
    let s = engine(store.clone());
    s.registry()
        .create(
            SourceSelector::cc(1),
            "obj.value",
            Mode::Set,
            Range::new(0.0, 1.0),
            "round(x*4)/4",
        )
        .unwrap();

    let out = s.dispatch(&cc(1, 0.6));
    assert_eq!(out[0].1, Outcome::Applied(0.5));
    assert_approx_eq!(store.value("obj.value").unwrap(), 0.5);
}

#[test]
fn division_by_zero_keeps_previous_value() {
    let store = Arc::new(PropertyStore::new());
    store.insert("obj.value", Property::float(0.0)).unwrap();
    let s = engine(store.clone());
    s.registry()
        .create(
            SourceSelector::cc(1),
            "obj.value",
            Mode::Set,
            Range::new(-10.0, 10.0),
            "1/(x-1)",
        )
        .unwrap();

    s.dispatch(&cc(1, 0.5));
    // 1/(0.5-1) = -2, lerped to -50 and clamped to the range.
    let before = store.value("obj.value").unwrap();
    assert_approx_eq!(before, -10.0);

    let out = s.dispatch(&cc(1, 1.0));
    assert_eq!(out[0].1, Outcome::Held);
    assert_eq!(store.value("obj.value").unwrap(), before);
}

#[test]
fn two_mappings_same_target_apply_in_order() {
    let store = Arc::new(PropertyStore::with_history());
    store.insert("obj.value", Property::float(0.0)).unwrap();
    let s = engine(store.clone());
    s.registry()
        .create(SourceSelector::cc(1), "obj.value", Mode::Set, Range::new(0.0, 1.0), "")
        .unwrap();
    s.registry()
        .create(SourceSelector::cc(2), "obj.value", Mode::Set, Range::new(100.0, 200.0), "")
        .unwrap();

    s.dispatch(&cc(1, 0.5));
    s.dispatch(&cc(2, 0.5));
    s.dispatch(&cc(1, 0.25));

    let writes: Vec<f64> = store.history().iter().map(|w| w.value).collect();
    assert_eq!(writes, vec![0.5, 150.0, 0.25]);
    assert_approx_eq!(store.value("obj.value").unwrap(), 0.25);
}

#[test]
fn writes_are_coerced_by_the_host() {
    let store = Arc::new(PropertyStore::new());
    store.insert("obj.count", Property::int(0)).unwrap();
    store.insert("obj.visible", Property::boolean(false)).unwrap();
    store
        .insert("obj.alpha", Property::float(0.0).with_range(0.0, 0.5))
        .unwrap();
    let s = engine(store.clone());
    s.registry()
        .create(SourceSelector::cc(1), "obj.count", Mode::Set, Range::new(0.0, 10.0), "")
        .unwrap();
    s.registry()
        .create(SourceSelector::cc(1), "obj.visible", Mode::Set, Range::default(), "")
        .unwrap();
    s.registry()
        .create(SourceSelector::cc(1), "obj.alpha", Mode::Set, Range::default(), "")
        .unwrap();

    s.dispatch(&cc(1, 0.65));
    let snapshot = store.snapshot();
    assert!(snapshot.contains(&("obj.count".to_string(), PropertyValue::Int(6))));
    assert!(snapshot.contains(&("obj.visible".to_string(), PropertyValue::Bool(true))));
    assert!(snapshot.contains(&("obj.alpha".to_string(), PropertyValue::Float(0.5))));
}

#[test]
fn array_component_targets() {
    let store = Arc::new(PropertyStore::new());
    store
        .insert(r#"objects["Cube.001"].location"#, Property::array(vec![0.0; 3]))
        .unwrap();
    let s = engine(store.clone());
    s.registry()
        .create(
            SourceSelector::cc(1),
            "objects['Cube.001'].location[2]",
            Mode::Set,
            Range::new(0.0, 4.0),
            "",
        )
        .unwrap();

    s.dispatch(&cc(1, 0.5));
    assert_approx_eq!(store.value(r#"objects["Cube.001"].location[2]"#).unwrap(), 2.0);
    assert_eq!(store.value(r#"objects["Cube.001"].location[0]"#).unwrap(), 0.0);
}

#[test]
fn removed_owner_degrades_until_reresolved() {
    let store = Arc::new(PropertyStore::new());
    store.insert(r#"objects["Cube"].scale"#, Property::float(1.0)).unwrap();
    let s = engine(store.clone());
    let id = s
        .registry()
        .create(SourceSelector::cc(1), r#"objects["Cube"].scale"#, Mode::Set, Range::default(), "")
        .unwrap();

    store.remove_prefix(r#"objects["Cube"]"#).unwrap();
    assert!(matches!(s.dispatch(&cc(1, 0.5))[0].1, Outcome::Unresolved(_)));
    assert!(!s.registry().get(id).unwrap().health.is_healthy());

    store.insert(r#"objects["Cube"].scale"#, Property::float(1.0)).unwrap();
    assert_eq!(s.dispatch(&cc(1, 0.5))[0].1, Outcome::Skipped);

    s.registry().reresolve(id).unwrap();
    assert_eq!(s.dispatch(&cc(1, 0.5))[0].1, Outcome::Applied(0.5));
}

#[test]
fn update_retargets_and_resets() {
    let store = Arc::new(PropertyStore::new());
    store.insert("a", Property::float(0.0)).unwrap();
    store.insert("b", Property::float(0.0)).unwrap();
    let s = engine(store.clone());
    let id = s
        .registry()
        .create(SourceSelector::cc(1), "a", Mode::Set, Range::default(), "x")
        .unwrap();
    s.dispatch(&cc(1, 1.0));

    s.registry()
        .update(id, MappingPatch::default().target("b").expression("1 - x"))
        .unwrap();
    assert!(s.registry().get(id).unwrap().last_applied.is_none());

    s.dispatch(&cc(1, 0.25));
    assert_approx_eq!(store.value("a").unwrap(), 1.0);
    assert_approx_eq!(store.value("b").unwrap(), 0.75);
}

#[test]
fn sine_of_time_animates_on_tick() {
    let store = Arc::new(PropertyStore::new());
    store.insert("a", Property::float(0.0)).unwrap();
    let clock = Arc::new(ManualClock::new(24.0));
    let s = Scheduler::new(
        Arc::new(Registry::new()),
        Runtime::new(store.clone(), RuntimeSettings::default()),
        clock.clone(),
    );
    s.registry()
        .create(SourceSelector::cc(1), "a", Mode::Set, Range::new(-1.0, 1.0), "0.5 + 0.5 * sin(time) * x")
        .unwrap();

    assert!(s.tick().is_empty());
    s.dispatch(&cc(1, 1.0));
    clock.advance(std::f64::consts::FRAC_PI_2);
    s.tick();
    assert_approx_eq!(store.value("a").unwrap(), 1.0, 1e-9);
}
