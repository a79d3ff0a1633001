//! Reconciliation scenarios: init, status and deploy against an in-memory
//! registry and a recording snapshot store.

mod common;

use std::fs;
use std::path::PathBuf;

use common::{Fleet, RecordingSnapshots, SnapshotCall};
use drift_tracker::core::errors::DtsError;
use drift_tracker::core::identity::Instance;
use drift_tracker::engine::{Action, StatusOutcome};
use drift_tracker::registry::model::TrackedEntry;
use drift_tracker::snapshot::DiffReport;

fn entry(name: &str, work_tree: &PathBuf, app_dir: &PathBuf, git_dir: PathBuf) -> TrackedEntry {
    TrackedEntry::new(name, work_tree, app_dir, &git_dir)
}

// ──────────────────── init ────────────────────

#[test]
fn init_tracks_a_plain_application() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("billing");
    let key = fleet.register_app("1200", &app, "billing");
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Init);
    engine.init(&app).unwrap();
    let state = engine.into_state();

    let tool = fleet.tool_record();
    assert_eq!(tool.appl_id, "5118");
    assert_eq!(tool.application_name, "DTS");
    assert_eq!(tool.stand, "prod");

    let tracked = tool.tracked(key.instance).expect("tracked entry");
    assert!(tracked.enabled);
    assert_eq!(tracked.app_name, "billing");
    assert_eq!(tracked.work_tree, app);
    assert_eq!(tracked.app_dir, app);
    assert_eq!(tracked.git_dir, fleet.snapshot_root().join(key.instance.to_string()));

    let jobs = tool.emon_json.expect("job spec");
    assert_eq!(jobs.job_instances(), vec![key.instance.to_string()]);
    let command = &jobs.measurements[0].configuration.commands[0];
    assert_eq!(
        command,
        &format!(
            "{} -a status -i {}",
            fleet.tool_dir().join("dts").display(),
            key.instance
        )
    );

    let calls = snaps.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1],
        SnapshotCall::Commit {
            work_tree: app.clone(),
            files: vec![PathBuf::from("README"), PathBuf::from("conf/app.yml")],
        }
    );
    assert_eq!(fleet.registry.puts_of("dts_settings"), 1);
    assert_eq!(fleet.registry.puts_of("emon_json"), 1);
    assert_eq!(state.files[&key.instance].trackable.len(), 2);
    assert!(!state.pushed_keys.is_empty());
}

#[cfg(unix)]
#[test]
fn init_through_current_link_tracks_the_release() {
    let mut fleet = Fleet::new();
    let app = fleet.versioned_app("gateway", &["v1"], "v1");
    let key = fleet.register_app("1300", &app, "gateway");
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Init);
    engine.init(&app.join("current")).unwrap();
    drop(engine);

    let tool = fleet.tool_record();
    let tracked = tool.tracked(key.instance).unwrap();
    assert_eq!(tracked.app_dir, app);
    assert_eq!(tracked.work_tree, app.join("versions").join("v1"));
    assert!(tracked.is_version_managed());
}

#[test]
fn init_requires_a_registry_record() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("orphan");
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Init);
    let err = engine.init(&app).unwrap_err();
    drop(engine);

    assert!(matches!(err, DtsError::TargetAppNotFound { .. }), "{err}");
    assert!(fleet.registry.puts().is_empty());
    assert!(snaps.calls().is_empty());
}

#[test]
fn init_refuses_an_already_tracked_instance() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("billing");
    let key = fleet.register_app("1200", &app, "billing");
    fleet.register_tool(&[(
        key.instance,
        entry("billing", &app, &app, fleet.snapshot_root().join("x")),
    )]);
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Init);
    let err = engine.init(&app).unwrap_err();
    drop(engine);

    assert!(matches!(err, DtsError::InstanceAlreadyTracked { .. }), "{err}");
    assert!(fleet.registry.puts().is_empty());
}

#[test]
fn init_refuses_a_record_declaring_another_directory() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("billing");
    let instance = Instance::for_path(&app);
    let key = drift_tracker::registry::tree::AppKey {
        appl_id: "1200".to_string(),
        instance,
    };
    fleet
        .registry
        .seed(
            &key,
            &drift_tracker::registry::model::AppRecord {
                app_dir: "/somewhere/else".to_string(),
                application_name: "billing".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Init);
    let err = engine.init(&app).unwrap_err();
    drop(engine);

    assert!(matches!(err, DtsError::AppDirMismatch { .. }), "{err}");
    assert!(fleet.registry.puts().is_empty());
    assert!(snaps.calls().is_empty());
}

// ──────────────────── status ────────────────────

#[test]
fn status_reports_diff_for_a_healthy_instance() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("billing");
    let key = fleet.register_app("1200", &app, "billing");
    let git_dir = fleet.snapshot_root().join(key.instance.to_string());
    fleet.register_tool(&[(key.instance, entry("billing", &app, &app, git_dir.clone()))]);

    let mut report = DiffReport::default();
    report.changes.insert("conf/app.yml".to_string(), 2);
    let snaps = RecordingSnapshots::with_report(report.clone());

    let mut engine = fleet.engine(&snaps, Action::Status);
    let outcome = engine.status(key.instance).unwrap();
    let state = engine.into_state();

    assert_eq!(
        outcome,
        StatusOutcome::Report {
            label: "billing".to_string(),
            diff: report.clone(),
        }
    );
    assert_eq!(state.diff, Some(report));
    assert_eq!(
        snaps.calls(),
        vec![SnapshotCall::Numstat {
            work_tree: app,
            snapshot_dir: git_dir,
        }]
    );
    assert!(fleet.registry.puts().is_empty());
}

#[test]
fn status_with_renamed_application_fails_without_mutation() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("billing");
    let key = fleet.register_app("1200", &app, "billing-ng");
    fleet.register_tool(&[(
        key.instance,
        entry("billing", &app, &app, fleet.snapshot_root().join("1")),
    )]);
    let before = fleet.tool_record();
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Status);
    let err = engine.status(key.instance).unwrap_err();
    let state = engine.into_state();

    assert!(matches!(err, DtsError::AppNameMismatch { .. }), "{err}");
    assert!(fleet.registry.puts().is_empty());
    assert!(snaps.calls().is_empty());
    assert!(state.diff.is_none());
    assert_eq!(fleet.tool_record(), before);
}

#[test]
fn status_of_untracked_instance_fails() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("billing");
    let key = fleet.register_app("1200", &app, "billing");
    fleet.register_tool(&[]);
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Status);
    let err = engine.status(key.instance).unwrap_err();
    assert!(matches!(err, DtsError::InstanceNotTracked { .. }), "{err}");
}

#[test]
fn status_without_tool_record_fails() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("billing");
    let key = fleet.register_app("1200", &app, "billing");
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Status);
    let err = engine.status(key.instance).unwrap_err();
    assert!(matches!(err, DtsError::ToolAppNotFound { .. }), "{err}");
}

#[test]
fn status_of_unknown_target_fails() {
    let mut fleet = Fleet::new();
    fleet.register_tool(&[]);
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Status);
    let err = engine.status(Instance::identify("/nowhere")).unwrap_err();
    assert!(matches!(err, DtsError::TargetAppNotFound { .. }), "{err}");
}

#[test]
fn disabled_plain_instance_cannot_self_heal() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("billing");
    let key = fleet.register_app("1200", &app, "billing");
    let mut disabled = entry("billing", &app, &app, fleet.snapshot_root().join("1"));
    disabled.enabled = false;
    fleet.register_tool(&[(key.instance, disabled)]);
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Status);
    let err = engine.status(key.instance).unwrap_err();
    drop(engine);

    assert!(matches!(err, DtsError::InstanceDisabled { .. }), "{err}");
    assert!(fleet.registry.puts().is_empty());
}

#[cfg(unix)]
#[test]
fn disabled_versioned_instance_without_new_release_stays_disabled() {
    let mut fleet = Fleet::new();
    let app = fleet.versioned_app("gateway", &["v1"], "v1");
    let key = fleet.register_app("1300", &app, "gateway");
    let mut disabled = entry(
        "gateway",
        &app.join("versions").join("v1"),
        &app,
        fleet.snapshot_root().join("1"),
    );
    disabled.enabled = false;
    fleet.register_tool(&[(key.instance, disabled)]);
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Status);
    let err = engine.status(key.instance).unwrap_err();
    drop(engine);

    assert!(matches!(err, DtsError::InstanceDisabled { .. }), "{err}");
    assert!(fleet.registry.puts().is_empty());
}

#[cfg(unix)]
#[test]
fn redeployed_instance_is_re_tracked_under_new_release() {
    let mut fleet = Fleet::new();
    let app = fleet.versioned_app("gateway", &["v1", "v2"], "v2");
    let key = fleet.register_app("1300", &app, "gateway");
    let old_tree = app.join("versions").join("v1");
    let old_snapshot = fleet.snapshot_root().join(key.instance.to_string());
    fs::create_dir_all(&old_snapshot).unwrap();
    fs::write(old_snapshot.join("stale-object"), b"v1 history").unwrap();

    let mut disabled = entry("gateway", &old_tree, &app, old_snapshot.clone());
    disabled.enabled = false;
    fleet.register_tool(&[(key.instance, disabled)]);
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Status);
    let outcome = engine.status(key.instance).unwrap();
    let state = engine.into_state();

    let new_tree = app.join("versions").join("v2");
    assert_eq!(
        outcome,
        StatusOutcome::Redeployed {
            instance: key.instance,
            work_tree: new_tree.clone(),
        }
    );
    assert!(!old_snapshot.join("stale-object").exists());

    let tool = fleet.tool_record();
    let tracked = tool.tracked(key.instance).unwrap();
    assert!(tracked.enabled);
    assert_eq!(tracked.work_tree, new_tree);
    assert_eq!(tracked.app_dir, app);
    assert_eq!(
        tool.emon_json.unwrap().job_instances(),
        vec![key.instance.to_string()]
    );

    assert_eq!(fleet.registry.puts_of("dts_settings"), 1);
    assert!(state.diff.is_none());
    let drift = state.drift.expect("drift recorded");
    assert_eq!(drift.previous_work_tree, old_tree);
    assert_eq!(drift.work_tree, new_tree);
    assert!(!snaps
        .calls()
        .iter()
        .any(|call| matches!(call, SnapshotCall::Numstat { .. })));
}

// ──────────────────── deploy ────────────────────

#[test]
fn deploy_adds_only_new_unexcluded_applications() {
    let mut fleet = Fleet::new();
    let tracked_app = fleet.plain_app("billing");
    let excluded_app = fleet.plain_app("monitoring");
    let new_app = fleet.plain_app("payments");

    let tracked_key = fleet.register_app("1200", &tracked_app, "billing");
    let excluded_key = fleet.register_app("9000", &excluded_app, "monitoring");
    let new_key = fleet.register_app("1400", &new_app, "payments");
    fleet.register_tool(&[(
        tracked_key.instance,
        entry(
            "billing",
            &tracked_app,
            &tracked_app,
            fleet.snapshot_root().join(tracked_key.instance.to_string()),
        ),
    )]);
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Deploy);
    let deployed = engine.deploy(&["9000".to_string()]).unwrap();
    drop(engine);

    assert_eq!(deployed, vec![new_key.instance]);
    assert_eq!(fleet.registry.puts_of("dts_settings"), 1);
    assert_eq!(fleet.registry.puts_of("emon_json"), 1);

    let tool = fleet.tool_record();
    assert!(tool.is_tracking(tracked_key.instance));
    assert!(tool.is_tracking(new_key.instance));
    assert!(!tool.is_tracking(excluded_key.instance));
    assert!(!tool.is_tracking(fleet.tool_key().instance));
}

#[test]
fn deploy_skips_entries_whose_directory_does_not_match_instance() {
    let mut fleet = Fleet::new();
    let app = fleet.plain_app("billing");
    let key = drift_tracker::registry::tree::AppKey {
        appl_id: "1200".to_string(),
        instance: Instance::identify("/not/the/declared/dir"),
    };
    fleet
        .registry
        .seed(
            &key,
            &drift_tracker::registry::model::AppRecord {
                app_dir: app.display().to_string(),
                application_name: "billing".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    let good_app = fleet.plain_app("payments");
    let good_key = fleet.register_app("1400", &good_app, "payments");
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Deploy);
    let deployed = engine.deploy(&[]).unwrap();
    drop(engine);

    assert_eq!(deployed, vec![good_key.instance]);
    assert!(fleet.log.contains("instance mismatch"));
    assert!(!fleet.tool_record().is_tracking(key.instance));
}

#[test]
fn deploy_with_nothing_new_does_not_push() {
    let mut fleet = Fleet::new();
    fleet.register_tool(&[]);
    let snaps = RecordingSnapshots::default();

    let mut engine = fleet.engine(&snaps, Action::Deploy);
    let deployed = engine.deploy(&[]).unwrap();
    drop(engine);

    assert!(deployed.is_empty());
    assert!(fleet.registry.puts().is_empty());
}
