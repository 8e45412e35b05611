//! Orchestrator behaviour against an in-memory runtime.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{FakeRuntime, ScriptedBuild, cookie, profile, settings};
use rocked_common::constants::{MONITOR_BIN, REPORTER_SCRIPT};
use rocked_common::error::RockedError;
use rocked_common::types::{ContainerId, ContainerStatus, ImageId};
use rocked_runtime::orchestrator::Orchestrator;
use serde_json::json;

const IMAGE: &str = "rocked_firefox:latest";

fn id(n: u32) -> ContainerId {
    ContainerId::new(n)
}

// ── exec ─────────────────────────────────────────────────────────────

#[test]
fn exec_creates_missing_container_and_wraps_command() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", vec![cookie("c0ffee")]);
    let profile = profile(json!({"command": "firefox --new-instance"}));
    let runtime = FakeRuntime::new();
    runtime.state.borrow_mut().tag("img1", IMAGE);

    Orchestrator::new(&runtime, &settings, &profile)
        .exec(id(0), &[])
        .expect("exec");

    let state = runtime.state.borrow();
    assert_eq!(state.runs.len(), 1);
    assert_eq!(state.runs[0].name, "rocked_firefox_0");
    assert_eq!(state.runs[0].command, vec![MONITOR_BIN]);
    assert_eq!(
        state.interactive,
        vec![(
            "rocked_firefox_0".to_string(),
            "alice".to_string(),
            vec![
                REPORTER_SCRIPT.to_string(),
                ":0".to_string(),
                "firefox".to_string(),
                "--new-instance".to_string(),
            ],
        )]
    );
}

#[test]
fn exec_forwards_display_for_root_and_user() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", vec![cookie("c0ffee"), cookie("ignored")]);
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    runtime.state.borrow_mut().tag("img1", IMAGE);

    Orchestrator::new(&runtime, &settings, &profile)
        .exec(id(3), &["xterm".to_string()])
        .expect("exec");

    let state = runtime.state.borrow();
    let users: Vec<&str> = state.execs.iter().map(|(_, user, _)| user.as_str()).collect();
    assert_eq!(users, vec!["root", "alice"]);
    assert!(state
        .execs
        .iter()
        .all(|(_, _, cmd)| cmd == &["xauth", "add", ":0", ".", "c0ffee"]));
}

#[test]
fn exec_starts_exited_container() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({"command": "firefox"}));
    let runtime = FakeRuntime::new();
    runtime
        .state
        .borrow_mut()
        .add_container("rocked_firefox_1", ContainerStatus::Exited, "img1");

    Orchestrator::new(&runtime, &settings, &profile)
        .exec(id(1), &[])
        .expect("exec");

    assert_eq!(runtime.calls(), vec!["start rocked_firefox_1"]);
    assert!(runtime.state.borrow().runs.is_empty());
}

#[test]
fn exec_builds_missing_image_before_create() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({"command": "firefox"}));
    let runtime = FakeRuntime::new();
    runtime.state.borrow_mut().builds.push_back(ScriptedBuild {
        image_id: Some("img1".into()),
        base_id: None,
    });

    Orchestrator::new(&runtime, &settings, &profile)
        .exec(id(0), &[])
        .expect("exec");

    assert_eq!(
        runtime.calls(),
        vec!["build rocked_firefox", "run rocked_firefox_0"]
    );
    let state = runtime.state.borrow();
    assert!(!state.build_requests[0].pull);
    assert!(state.build_requests[0].force_remove_intermediate);
}

#[test]
fn exec_without_any_command_fails_before_runtime_calls() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();

    let err = Orchestrator::new(&runtime, &settings, &profile)
        .exec(id(0), &[])
        .unwrap_err();
    assert!(matches!(err, RockedError::Config { .. }));
    assert!(runtime.calls().is_empty());
}

#[test]
fn failed_build_aborts_exec() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({"command": "firefox"}));
    let runtime = FakeRuntime::new();

    let err = Orchestrator::new(&runtime, &settings, &profile)
        .exec(id(0), &[])
        .unwrap_err();
    assert!(matches!(err, RockedError::BuildFailed { ref log, .. } if log.contains("step failed")));
    assert!(runtime.state.borrow().containers.is_empty());
}

// ── stop / remove ────────────────────────────────────────────────────

#[test]
fn stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    runtime
        .state
        .borrow_mut()
        .add_container("rocked_firefox_0", ContainerStatus::Running, "img1");
    let orchestrator = Orchestrator::new(&runtime, &settings, &profile);

    orchestrator.stop(id(0)).expect("stop running");
    orchestrator.stop(id(0)).expect("stop stopped");
    orchestrator.stop(id(7)).expect("stop absent");

    assert_eq!(
        runtime.calls(),
        vec!["stop rocked_firefox_0 60", "wait rocked_firefox_0"]
    );
}

#[test]
fn remove_only_touches_exited_containers() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    {
        let mut state = runtime.state.borrow_mut();
        state.add_container("rocked_firefox_0", ContainerStatus::Running, "img1");
        state.add_container("rocked_firefox_1", ContainerStatus::Exited, "img0");
    }
    let orchestrator = Orchestrator::new(&runtime, &settings, &profile);

    assert_eq!(orchestrator.remove(id(0)).expect("running"), None);
    assert_eq!(
        orchestrator.remove(id(1)).expect("exited"),
        Some(ImageId::new("img0"))
    );
    assert_eq!(orchestrator.remove(id(1)).expect("absent"), None);
    assert_eq!(runtime.calls(), vec!["rm rocked_firefox_1"]);
}

// ── listing / allocation ─────────────────────────────────────────────

#[test]
fn list_containers_matches_profile_names_only() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    {
        let mut state = runtime.state.borrow_mut();
        state.add_container("rocked_firefox_0", ContainerStatus::Running, "img1");
        state.add_container("rocked_firefox_2", ContainerStatus::Exited, "img0");
        state.add_container("rocked_firefox_3", ContainerStatus::Exited, "img1");
        state.add_container("rocked_firefox_x", ContainerStatus::Exited, "img1");
        state.add_container("rocked_firefoxy_1", ContainerStatus::Exited, "img9");
        state.add_container("rocked_firefox_4_old", ContainerStatus::Exited, "img9");
    }
    let orchestrator = Orchestrator::new(&runtime, &settings, &profile);

    let listing = orchestrator.list_containers().expect("list");
    assert_eq!(listing.ids, vec![id(0), id(2), id(3)]);
    assert_eq!(listing.image_ids, vec![ImageId::new("img1"), ImageId::new("img0")]);
    assert_eq!(orchestrator.allocate_id().expect("allocate"), id(1));
}

// ── images ───────────────────────────────────────────────────────────

#[test]
fn remove_image_respects_tags_and_tolerates_absence() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    {
        let mut state = runtime.state.borrow_mut();
        state.tag("tagged", IMAGE);
        state.add_untagged("stale");
    }
    let orchestrator = Orchestrator::new(&runtime, &settings, &profile);

    orchestrator
        .remove_image(&ImageId::new("tagged"), true)
        .expect("tagged kept");
    orchestrator
        .remove_image(&ImageId::new("stale"), true)
        .expect("untagged removed");
    orchestrator
        .remove_image(&ImageId::new("stale"), true)
        .expect("already removed");
    orchestrator
        .remove_image(&ImageId::new("stale"), false)
        .expect("already removed, unconditional");
    orchestrator.remove_image(&ImageId::new(""), false).expect("empty");

    let state = runtime.state.borrow();
    assert!(state.has_image("tagged"));
    assert!(!state.has_image("stale"));
    assert_eq!(state.calls, vec!["rmi stale", "rmi stale"]);
}

#[test]
fn remove_image_conflict_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    {
        let mut state = runtime.state.borrow_mut();
        state.add_untagged("parent");
        state.conflicts.push(ImageId::new("parent"));
    }

    Orchestrator::new(&runtime, &settings, &profile)
        .remove_image(&ImageId::new("parent"), false)
        .expect("conflict tolerated");
    assert!(runtime.state.borrow().has_image("parent"));
}

#[test]
fn update_collects_replaced_images() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    {
        let mut state = runtime.state.borrow_mut();
        state.tag("old", IMAGE);
        state.tag("base1", "archlinux:latest");
        state.builds.push_back(ScriptedBuild {
            image_id: Some("new".into()),
            base_id: Some("base2".into()),
        });
    }

    let name = Orchestrator::new(&runtime, &settings, &profile)
        .update_image(true)
        .expect("update");

    assert_eq!(name.as_deref(), Some("rocked_firefox"));
    let state = runtime.state.borrow();
    assert!(state.build_requests[0].pull);
    assert!(state.build_requests[0].no_cache);
    assert!(state.has_image("new"));
    assert!(state.has_image("base2"));
    assert!(!state.has_image("old"));
    assert!(!state.has_image("base1"));
}

#[test]
fn update_without_changes_removes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    {
        let mut state = runtime.state.borrow_mut();
        state.tag("same", IMAGE);
        state.tag("base1", "archlinux:latest");
        state.builds.push_back(ScriptedBuild {
            image_id: Some("same".into()),
            base_id: None,
        });
    }

    let name = Orchestrator::new(&runtime, &settings, &profile)
        .update_image(false)
        .expect("update");

    assert!(name.is_some());
    assert_eq!(runtime.calls(), vec!["build rocked_firefox"]);
    assert!(!runtime.state.borrow().build_requests[0].no_cache);
}

#[test]
fn update_build_failure_keeps_old_image() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    runtime.state.borrow_mut().tag("old", IMAGE);

    let name = Orchestrator::new(&runtime, &settings, &profile)
        .update_image(false)
        .expect("update");

    assert_eq!(name, None);
    assert!(runtime.state.borrow().has_image("old"));
}

#[test]
fn update_builds_missing_image() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    runtime.state.borrow_mut().builds.push_back(ScriptedBuild {
        image_id: Some("first".into()),
        base_id: None,
    });

    let name = Orchestrator::new(&runtime, &settings, &profile)
        .update_image(false)
        .expect("update");

    assert_eq!(name.as_deref(), Some("rocked_firefox"));
    assert_eq!(runtime.calls(), vec!["build rocked_firefox"]);
}

// ── bulk ─────────────────────────────────────────────────────────────

#[test]
fn destroy_removes_everything_and_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    {
        let mut state = runtime.state.borrow_mut();
        state.tag("current", IMAGE);
        state.add_untagged("stale");
        state.tag("base1", "archlinux:latest");
        state.add_container("rocked_firefox_0", ContainerStatus::Running, "current");
        state.add_container("rocked_firefox_1", ContainerStatus::Exited, "stale");
        state.add_container("rocked_chromium_0", ContainerStatus::Running, "other");
    }
    let orchestrator = Orchestrator::new(&runtime, &settings, &profile);

    orchestrator.destroy().expect("destroy");
    orchestrator.destroy().expect("destroy again");

    let state = runtime.state.borrow();
    assert!(!state.has_image("current"));
    assert!(!state.has_image("stale"));
    assert!(state.has_image("base1"));
    assert_eq!(state.containers.len(), 1);
    assert_eq!(state.containers[0].name, "rocked_chromium_0");
}

#[test]
fn stop_all_and_remove_all_cover_every_container() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    {
        let mut state = runtime.state.borrow_mut();
        state.add_container("rocked_firefox_0", ContainerStatus::Running, "img");
        state.add_container("rocked_firefox_1", ContainerStatus::Running, "img");
    }
    let orchestrator = Orchestrator::new(&runtime, &settings, &profile);

    orchestrator.stop_all().expect("stop all");
    assert!(runtime
        .state
        .borrow()
        .containers
        .iter()
        .all(|c| c.status == ContainerStatus::Exited));

    let removal = orchestrator.remove_all().expect("remove all");
    assert_eq!(removal.listing.ids.len(), 2);
    assert_eq!(removal.removed.len(), 2);
    assert!(runtime.state.borrow().containers.is_empty());
}

#[test]
fn remove_all_counts_only_removed_containers() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), ":0", Vec::new());
    let profile = profile(json!({}));
    let runtime = FakeRuntime::new();
    {
        let mut state = runtime.state.borrow_mut();
        state.add_container("rocked_firefox_0", ContainerStatus::Running, "img");
        state.add_container("rocked_firefox_1", ContainerStatus::Created, "img");
    }
    let orchestrator = Orchestrator::new(&runtime, &settings, &profile);

    let removal = orchestrator.remove_all().expect("remove all");
    assert_eq!(removal.listing.ids, vec![id(0), id(1)]);
    assert_eq!(removal.removed, vec![id(0)]);

    let state = runtime.state.borrow();
    assert_eq!(state.containers.len(), 1);
    assert_eq!(state.containers[0].name, "rocked_firefox_1");
}
