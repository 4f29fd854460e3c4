//! Save and reload tests.
//!
//! These tests verify that a saved module is a faithful, independently
//! loadable snapshot: exactly the routines defined before the save, with the
//! same behavior as in-process.

use std::path::Path;

use dynmod::artifact::{LoadedModule, artifact_file_name};
use dynmod::config::ManagerConfig;
use dynmod::error::ModuleError;
use dynmod::module::{Capability, DynamicModuleManager, HostProfile, ModuleState};
use dynmod::routine::{Instr, RoutineSignature};
use dynmod::value::{Value, ValueKind};

fn saving_manager(dir: &Path) -> DynamicModuleManager {
    let cfg = ManagerConfig::new("Converters", Capability::RunAndSave).with_output_dir(dir);
    DynamicModuleManager::from_config_with_host(&cfg, HostProfile::persistent()).unwrap()
}

fn define_echo(manager: &DynamicModuleManager, name: &str) {
    let mut b = manager
        .handle()
        .define_routine(name, RoutineSignature::unary(ValueKind::Any))
        .unwrap();
    b.emit_all([Instr::LoadArg(0), Instr::WriteValue]);
    b.finish().unwrap();
}

fn define_encode_point(manager: &DynamicModuleManager) {
    let mut b = manager
        .handle()
        .define_routine("EncodePoint", RoutineSignature::unary(ValueKind::Record))
        .unwrap();
    b.emit_all([
        Instr::WriteRaw("{\"x\":".into()),
        Instr::LoadArg(0),
        Instr::Field("x".into()),
        Instr::WriteFloat,
        Instr::WriteRaw(",\"y\":".into()),
        Instr::LoadArg(0),
        Instr::Field("y".into()),
        Instr::WriteFloat,
        Instr::WriteRaw("}".into()),
    ]);
    b.finish().unwrap();
}

#[test]
fn saved_routine_behaves_like_the_original() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = saving_manager(dir.path());
    define_encode_point(&manager);

    let saved = manager.save().unwrap();
    assert_eq!(saved.path, dir.path().join("Converters.dmod"));
    assert_eq!(saved.routine_count, 1);
    assert!(saved.path.exists());
    assert_eq!(manager.state(), ModuleState::Saved);

    let loaded = LoadedModule::load(&saved.path).unwrap();
    assert_eq!(loaded.name(), "Converters");
    assert_eq!(loaded.routine_names(), vec!["EncodePoint"]);

    let p = Value::record([("x", Value::Float(1.5)), ("y", Value::Float(-2.25))]);
    let in_process = manager.handle().invoke("EncodePoint", &[p.clone()]).unwrap();
    let from_disk = loaded.invoke("EncodePoint", &[p]).unwrap();
    assert_eq!(in_process, from_disk);
    assert_eq!(from_disk, br#"{"x":1.5,"y":-2.25}"#);
}

#[test]
fn artifact_contains_only_routines_defined_before_save() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = saving_manager(dir.path());
    define_echo(&manager, "First");
    define_echo(&manager, "Second");

    let first_save = manager.save().unwrap();
    let snapshot = std::fs::read(&first_save.path).unwrap();

    define_echo(&manager, "Third");

    let loaded = LoadedModule::from_bytes(&snapshot, &first_save.path).unwrap();
    assert_eq!(loaded.routine_names(), vec!["First", "Second"]);
    assert!(loaded.routine("Third").is_none());

    // A second save after more definitions is a complete re-snapshot.
    let second_save = manager.save().unwrap();
    assert_eq!(second_save.routine_count, 3);
    assert_eq!(manager.save_count(), 2);
    let reloaded = LoadedModule::load(&second_save.path).unwrap();
    assert_eq!(reloaded.routine_names(), vec!["First", "Second", "Third"]);
}

#[test]
fn saving_twice_without_changes_is_identical() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = saving_manager(dir.path());
    define_encode_point(&manager);
    define_echo(&manager, "Echo");

    let a = manager.save().unwrap();
    let first = std::fs::read(&a.path).unwrap();
    let b = manager.save().unwrap();
    let second = std::fs::read(&b.path).unwrap();

    assert_eq!(a, b);
    assert_eq!(first, second);
}

#[test]
fn failed_save_reports_storage_failure_and_keeps_manager_usable() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist");
    let manager = saving_manager(&missing);
    define_echo(&manager, "Echo");

    let err = manager.save().unwrap_err();
    assert!(matches!(err, ModuleError::StorageFailure { .. }));
    assert!(!missing.join(artifact_file_name("Converters")).exists());
    assert_eq!(manager.state(), ModuleState::Active);
    assert!(manager.last_artifact().is_none());

    // Still usable: define more, then save somewhere valid.
    define_echo(&manager, "Echo2");
    let saved = manager.save_in(dir.path()).unwrap();
    assert_eq!(saved.routine_count, 2);
    assert_eq!(manager.state(), ModuleState::Saved);
}

#[test]
fn save_overwrites_previous_artifact() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("Converters.dmod"), b"stale bytes").unwrap();

    let manager = saving_manager(dir.path());
    define_echo(&manager, "Echo");
    let saved = manager.save().unwrap();

    let loaded = LoadedModule::load(&saved.path).unwrap();
    assert_eq!(loaded.len(), 1);
}

#[test]
fn saved_composed_routines_resolve_after_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = saving_manager(dir.path());
    define_encode_point(&manager);

    let mut b = manager
        .handle()
        .define_routine("EncodeSegment", RoutineSignature::unary(ValueKind::Record))
        .unwrap();
    b.emit_all([
        Instr::WriteRaw("{\"from\":".into()),
        Instr::LoadArg(0),
        Instr::Field("from".into()),
        Instr::Call("EncodePoint".into()),
        Instr::WriteRaw(",\"to\":".into()),
        Instr::LoadArg(0),
        Instr::Field("to".into()),
        Instr::CallOrNull("EncodePoint".into()),
        Instr::WriteRaw("}".into()),
    ]);
    b.finish().unwrap();

    let saved = manager.save().unwrap();
    drop(manager);

    let loaded = LoadedModule::load(&saved.path).unwrap();
    let segment = Value::record([
        (
            "from",
            Value::record([("x", Value::Float(0.0)), ("y", Value::Float(1.0))]),
        ),
        ("to", Value::Null),
    ]);
    let out = loaded.invoke("EncodeSegment", &[segment]).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        r#"{"from":{"x":0.0,"y":1.0},"to":null}"#
    );
}
