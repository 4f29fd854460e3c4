//! End-to-end tests for the module lifecycle.
//!
//! These tests exercise the manager the way a serialization layer would:
//! create a module, generate routines into it from several threads, invoke
//! them, and check the run-only contract.

use std::sync::Arc;
use std::thread;

use dynmod::error::{ExecError, ModuleError, RoutineError};
use dynmod::module::{Capability, DynamicModuleManager, ModuleState};
use dynmod::routine::{Instr, RoutineSignature};
use dynmod::value::{Value, ValueKind};

fn define_encode_point(manager: &DynamicModuleManager) {
    let mut b = manager
        .handle()
        .define_routine("EncodePoint", RoutineSignature::unary(ValueKind::Record))
        .unwrap();
    b.emit_all([
        Instr::WriteRaw("{\"x\":".into()),
        Instr::LoadArg(0),
        Instr::Field("x".into()),
        Instr::WriteInt,
        Instr::WriteRaw(",\"y\":".into()),
        Instr::LoadArg(0),
        Instr::Field("y".into()),
        Instr::WriteInt,
        Instr::WriteRaw("}".into()),
    ]);
    b.finish().unwrap();
}

fn point(x: i64, y: i64) -> Value {
    Value::record([("x", Value::Int(x)), ("y", Value::Int(y))])
}

#[test]
fn run_only_module_generates_and_invokes() {
    let manager = DynamicModuleManager::create("Converters", Capability::RunOnly).unwrap();
    assert_eq!(manager.capability(), Capability::RunOnly);
    define_encode_point(&manager);

    let out = manager.handle().invoke("EncodePoint", &[point(1, 2)]).unwrap();
    assert_eq!(out, br#"{"x":1,"y":2}"#);
}

#[test]
fn run_only_save_is_unsupported_and_module_stays_usable() {
    let manager = DynamicModuleManager::create("Converters", Capability::RunOnly).unwrap();

    let err = manager.save().unwrap_err();
    assert!(matches!(err, ModuleError::UnsupportedOperation { ref module } if module == "Converters"));
    assert_eq!(manager.state(), ModuleState::Active);
    assert_eq!(manager.save_count(), 0);

    // Definitions keep working after the failed save.
    define_encode_point(&manager);
    assert!(manager.handle().contains("EncodePoint"));
    assert!(manager.save().is_err());
}

#[test]
fn same_name_different_capability_do_not_interfere() {
    let run_only = DynamicModuleManager::create("Converters", Capability::RunOnly).unwrap();
    let run_and_save = DynamicModuleManager::create("Converters", Capability::RunAndSave).unwrap();

    define_encode_point(&run_only);

    assert!(run_only.handle().contains("EncodePoint"));
    assert!(run_and_save.handle().is_empty());
    let err = run_and_save
        .handle()
        .invoke("EncodePoint", &[point(0, 0)])
        .unwrap_err();
    assert!(matches!(err, ExecError::UnknownRoutine { .. }));
}

#[test]
fn routines_compose_by_name() {
    let manager = DynamicModuleManager::create("Converters", Capability::RunOnly).unwrap();
    let module = manager.handle();

    // A routine may reference one that is generated later.
    let mut polygon = module
        .define_routine("EncodePolygon", RoutineSignature::unary(ValueKind::Record))
        .unwrap();
    polygon.emit_all([
        Instr::WriteRaw("{\"label\":".into()),
        Instr::LoadArg(0),
        Instr::Field("label".into()),
        Instr::WriteStr,
        Instr::WriteRaw(",\"points\":".into()),
        Instr::LoadArg(0),
        Instr::Field("points".into()),
        Instr::ForEach("EncodePoint".into()),
        Instr::WriteRaw("}".into()),
    ]);
    polygon.finish().unwrap();

    let poly = Value::record([
        ("label", Value::from("tri")),
        ("points", Value::List(vec![point(0, 0), point(4, 0), point(0, 3)])),
    ]);
    let err = module.invoke("EncodePolygon", &[poly.clone()]).unwrap_err();
    assert!(matches!(
        err,
        ExecError::UnknownRoutine { ref module, ref name } if module == "Converters" && name == "EncodePoint"
    ));

    define_encode_point(&manager);
    let out = module.invoke("EncodePolygon", &[poly]).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        r#"{"label":"tri","points":[{"x":0,"y":0},{"x":4,"y":0},{"x":0,"y":3}]}"#
    );
}

#[test]
fn json_arguments_keep_field_order() {
    let manager = DynamicModuleManager::create("Converters", Capability::RunOnly).unwrap();
    let mut b = manager
        .handle()
        .define_routine("Echo", RoutineSignature::unary(ValueKind::Any))
        .unwrap();
    b.emit_all([Instr::LoadArg(0), Instr::WriteValue]);
    b.finish().unwrap();

    let arg = Value::from(serde_json::json!({"y": 1, "x": 2}));
    let out = manager.handle().invoke("Echo", &[arg]).unwrap();
    assert_eq!(out, br#"{"y":1,"x":2}"#);
}

#[test]
fn concurrent_generation_lands_every_routine() {
    let manager = Arc::new(DynamicModuleManager::create("Converters", Capability::RunOnly).unwrap());

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for i in 0..16 {
                    let name = format!("Encode_{t}_{i}");
                    let mut b = manager
                        .handle()
                        .define_routine(name, RoutineSignature::unary(ValueKind::Any))
                        .unwrap();
                    b.emit_all([Instr::LoadArg(0), Instr::WriteValue]);
                    b.finish().unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let module = manager.handle();
    assert_eq!(module.len(), 8 * 16);
    // Once definition has stopped, a snapshot sees every routine with no gaps.
    let ordinals: Vec<u32> = module.snapshot().iter().map(|r| r.ordinal).collect();
    assert_eq!(ordinals, (0..8 * 16).collect::<Vec<u32>>());
    assert_eq!(module.invoke("Encode_3_7", &[Value::Int(37)]).unwrap(), b"37");
}

#[test]
fn concurrent_duplicate_has_one_winner() {
    let manager = Arc::new(DynamicModuleManager::create("Converters", Capability::RunOnly).unwrap());

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let result = manager
                    .handle()
                    .define_routine("EncodeShared", RoutineSignature::unary(ValueKind::Any))
                    .and_then(|mut b| {
                        b.emit_all([Instr::LoadArg(0), Instr::WriteValue]);
                        b.finish()
                    });
                match result {
                    Ok(_) => true,
                    Err(RoutineError::DuplicateRoutine { .. }) => false,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            })
        })
        .collect();

    let winners = workers
        .into_iter()
        .map(|w| w.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(manager.handle().len(), 1);
}
