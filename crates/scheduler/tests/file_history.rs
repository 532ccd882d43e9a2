//! End-to-end runs against the filesystem-backed history.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use uuid::Uuid;

use reportd_core::SchedulerConfig;
use reportd_scheduler::{
    DataSet, DefinitionRef, FileHistory, MemoryDesignStore, ModeRef, Priority, RendererRegistry, ReportDefinition,
    ReportDesign, ReportError, ReportRequest, ReportScheduler, ReportStatus, StaticEvaluator,
};

fn evaluator() -> (Arc<StaticEvaluator>, ReportDefinition) {
    let evaluator = StaticEvaluator::new();
    let definition = ReportDefinition::new(Uuid::new_v4(), "Clinic attendance");
    let mut data_sets = IndexMap::new();
    data_sets.insert(
        "attendance".to_string(),
        DataSet {
            columns: vec!["clinic".into(), "visits".into()],
            rows: vec![vec!["east".into(), 41.into()]],
        },
    );
    data_sets.insert(
        "staff".to_string(),
        DataSet {
            columns: vec!["clinic".into(), "nurses".into()],
            rows: vec![vec!["east".into(), 3.into()]],
        },
    );
    evaluator.register(definition.clone(), data_sets);
    (Arc::new(evaluator), definition)
}

fn open(dir: &std::path::Path, evaluator: &Arc<StaticEvaluator>) -> Arc<ReportScheduler> {
    ReportScheduler::new(
        SchedulerConfig::default(),
        Arc::new(RendererRegistry::with_builtin()),
        evaluator.clone(),
        Arc::new(FileHistory::new(dir).unwrap()),
        Arc::new(MemoryDesignStore::new()),
    )
    .unwrap()
}

fn request(definition: &ReportDefinition, renderer: &str, argument: &str) -> ReportRequest {
    ReportRequest::new(
        DefinitionRef::new(definition.uuid, definition.name.clone()),
        ModeRef::new(renderer, argument),
        Priority::Normal,
        "nurse.jackie",
    )
}

#[test]
fn artifact_is_written_and_removed_with_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let (evaluator, definition) = evaluator();
    let scheduler = open(dir.path(), &evaluator);

    let report = scheduler.run_report(request(&definition, "json", "")).unwrap();
    let uuid = report.request_uuid();
    let artifact_path = dir.path().join("artifacts").join(format!("{}.bin", uuid));
    assert!(artifact_path.exists());
    assert_eq!(std::fs::read(&artifact_path).unwrap(), report.artifact().unwrap().content);

    assert!(scheduler.delete_from_history(&uuid).unwrap());
    assert!(!artifact_path.exists());
    assert!(!dir.path().join("requests").join(format!("{}.json", uuid)).exists());
}

#[test]
fn requeue_discards_the_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (evaluator, definition) = evaluator();
    let scheduler = open(dir.path(), &evaluator);

    let report = scheduler.run_report(request(&definition, "json", "")).unwrap();
    let uuid = report.request_uuid();
    let artifact_path = dir.path().join("artifacts").join(format!("{}.bin", uuid));
    assert!(artifact_path.exists());

    scheduler.requeue_report(&uuid).unwrap();
    assert!(!artifact_path.exists());
    assert!(scheduler.get_report_by_uuid(&uuid).unwrap().is_none());
    assert!(dir.path().join("requests").join(format!("{}.json", uuid)).exists());

    assert!(scheduler.wait_until_idle(Duration::from_secs(10)));
    assert!(artifact_path.exists());
    assert_eq!(scheduler.get_report_request_by_uuid(&uuid).unwrap().status(), ReportStatus::Completed);
}

#[test]
fn queued_requests_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (evaluator, definition) = evaluator();

    let uuid = {
        let scheduler = open(dir.path(), &evaluator);
        let queued = scheduler.queue_report(request(&definition, "web", "")).unwrap();
        queued.uuid().unwrap()
    };

    let scheduler = open(dir.path(), &evaluator);
    assert_eq!(scheduler.queue_depth(), 1);
    assert!(scheduler.wait_until_idle(Duration::from_secs(10)));

    let stored = scheduler.get_report_request_by_uuid(&uuid).unwrap();
    assert_eq!(stored.status(), ReportStatus::Completed);
    let report = scheduler.get_report_by_uuid(&uuid).unwrap().unwrap();
    assert_eq!(report.data().unwrap().data_sets.len(), 2);
    assert!(report.artifact().is_none());
}

#[test]
fn design_modes_drive_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let (evaluator, definition) = evaluator();
    let scheduler = open(dir.path(), &evaluator);

    let design = scheduler
        .save_report_design(
            ReportDesign::new("Attendance only", definition.uuid, "json")
                .with_property("data_sets", "attendance")
                .with_property("pretty", "false"),
        )
        .unwrap();

    let modes = scheduler.get_rendering_modes(&definition).unwrap();
    let labels: Vec<&str> = modes.iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, vec!["Web Preview", "JSON", "Attendance only"]);

    let design_mode = modes.iter().find(|m| m.argument == design.uuid.to_string()).unwrap();
    let mode = design_mode.to_ref();
    let report = scheduler
        .run_report(request(&definition, &mode.renderer, &mode.argument))
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&report.artifact().unwrap().content).unwrap();
    let data_sets = body["data_sets"].as_object().unwrap();
    assert!(data_sets.contains_key("attendance"));
    assert!(!data_sets.contains_key("staff"));

    assert!(scheduler.purge_report_design(&design.uuid).unwrap());
    assert_eq!(scheduler.get_rendering_modes(&definition).unwrap().len(), 2);

    // A purged design no longer resolves, so its mode fails to render.
    let err = scheduler
        .run_report(request(&definition, "json", &design.uuid.to_string()))
        .unwrap_err();
    assert!(matches!(err, ReportError::Render(_)));
}

#[test]
fn last_request_per_definition_tracks_reruns() {
    let dir = tempfile::tempdir().unwrap();
    let (evaluator, definition) = evaluator();
    let scheduler = open(dir.path(), &evaluator);

    let first = scheduler.run_report(request(&definition, "web", "")).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    let second = scheduler.run_report(request(&definition, "json", "")).unwrap();

    let latest = scheduler.get_last_report_requests_by_report().unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[&definition.uuid].uuid(), Some(second.request_uuid()));
    assert_ne!(first.request_uuid(), second.request_uuid());
}
