//! Repo Manager Handler against the in-memory runtime

mod common;

use common::{Harness, PRIVATE_KEY};
use ignite_container::testing::ExecReply;
use ignite_container::{
    derive_repo_container_name, labels, ContainerSpec, ContainerState, RepoContainerKind,
};
use ignite_foundation::{Envelope, ErrorCode};
use ignite_plugin::{CleanupResult, RepoInfo};
use serde_json::json;
use std::sync::atomic::Ordering;

fn local_name(h: &Harness, session: bool) -> String {
    derive_repo_container_name(RepoContainerKind::Local, &h.repo_path(), "default", session).unwrap()
}

fn repo_container(name: &str) -> ContainerSpec {
    ContainerSpec::new(name, "node:20-bookworm").with_label(labels::PLUGIN, labels::REPO_MANAGER)
}

// ============================================================================
// mount / unmount / cleanup
// ============================================================================

#[tokio::test]
async fn test_persistent_mount_twice_reuses() {
    let h = Harness::new();
    let rm = h.orchestrator.repo_manager();

    let first = rm.mount(&h.repo_path(), true).await.into_result().unwrap();
    let second = rm.mount(&h.repo_path(), true).await.into_result().unwrap();

    assert_eq!(first.container_name, second.container_name);
    assert_eq!(first.container_name, local_name(&h, false));
    assert!(!first.reused);
    assert!(second.reused);
    assert_eq!(h.runtime.created().len(), 1);
    assert_eq!(h.runtime.state_of(&first.container_name), ContainerState::Running);
}

#[tokio::test]
async fn test_mount_spec_and_labels() {
    let h = Harness::new();
    let mounted = h
        .orchestrator
        .repo_manager()
        .mount(&h.repo_path(), false)
        .await
        .into_result()
        .unwrap();

    assert!(mounted.container_name.ends_with("-session"));
    assert_eq!(mounted.workspace_path, "/workspace");

    let spec = h.runtime.spec_of(&mounted.container_name).unwrap();
    assert!(spec.auto_remove);
    assert_eq!(spec.command, vec!["sleep", "infinity"]);
    assert_eq!(spec.binds(), vec![format!("{}:/workspace", h.repo_path())]);
    assert_eq!(spec.labels[labels::TYPE], "local-repo");
    assert_eq!(spec.labels[labels::PLUGIN], "repo-manager");
    assert_eq!(spec.labels[labels::HOST_PATH], h.repo_path());
    assert_eq!(spec.labels[labels::WORKSPACE], h.repo_path());
    assert_eq!(spec.labels[labels::SESSION], "true");
    assert!(spec.labels.contains_key(labels::CREATED));
}

#[tokio::test]
async fn test_mount_starts_stopped_container() {
    let h = Harness::new();
    let name = local_name(&h, false);
    h.runtime.insert(repo_container(&name), ContainerState::Stopped);

    let mounted = h
        .orchestrator
        .repo_manager()
        .mount(&h.repo_path(), true)
        .await
        .into_result()
        .unwrap();

    assert!(mounted.reused);
    assert_eq!(h.runtime.state_of(&name), ContainerState::Running);
    assert!(h.runtime.created().is_empty());
}

#[tokio::test]
async fn test_mount_conflict_counts_as_reuse() {
    let h = Harness::new();
    let name = local_name(&h, false);
    h.runtime.race_create_of(&name);

    let mounted = h
        .orchestrator
        .repo_manager()
        .mount(&h.repo_path(), true)
        .await
        .into_result()
        .unwrap();
    assert!(mounted.reused);
    assert_eq!(mounted.container_name, name);
}

#[tokio::test]
async fn test_concurrent_mounts_create_once() {
    let h = Harness::new();
    let rm = h.orchestrator.repo_manager().clone();
    let path = h.repo_path();

    let (a, b) = tokio::join!(rm.mount(&path, true), rm.mount(&path, true));
    let a = a.into_result().unwrap();
    let b = b.into_result().unwrap();
    assert_eq!(a.container_name, b.container_name);
    assert_eq!(h.runtime.created().len(), 1);
    assert!(a.reused != b.reused);
}

#[tokio::test]
async fn test_mount_rejects_missing_dir_and_urls() {
    let h = Harness::new();
    let rm = h.orchestrator.repo_manager();

    let missing = rm.mount("/definitely/not/here/ignite", true).await;
    let body = missing.error().unwrap();
    assert_eq!(body.code, "MOUNT_FAILED");
    assert_eq!(body.details.as_ref().unwrap()["cause"], "RESOLUTION_FAILED");

    let url = rm.mount("https://github.com/acme/app.git", true).await;
    assert_eq!(url.error().unwrap().code, "MOUNT_FAILED");
    assert!(h.runtime.created().is_empty());
}

#[tokio::test]
async fn test_unmount_session_container() {
    let h = Harness::new();
    let rm = h.orchestrator.repo_manager();
    let mounted = rm.mount(&h.repo_path(), false).await.into_result().unwrap();

    // auto-remove takes the container away on stop; remove then sees 404
    let result = rm.unmount(&mounted.container_name).await;
    assert!(result.is_success(), "{:?}", result);
    assert_eq!(h.runtime.state_of(&mounted.container_name), ContainerState::Absent);
    assert_eq!(h.runtime.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.runtime.remove_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unmount_attempts_remove_even_if_stop_fails() {
    let h = Harness::new();
    let result = h.orchestrator.repo_manager().unmount("ignite-local-gone-00000000-default").await;

    let body = result.error().unwrap();
    assert_eq!(body.code, "UNMOUNT_FAILED");
    assert_eq!(body.details.as_ref().unwrap()["cause"], "CONTAINER_NOT_FOUND");
    assert_eq!(h.runtime.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.runtime.remove_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cleanup_continues_past_failures() {
    let h = Harness::new();
    h.runtime.insert(repo_container("ignite-a"), ContainerState::Running);
    h.runtime.insert(repo_container("ignite-b"), ContainerState::Stopped);
    h.runtime.insert(repo_container("ignite-c"), ContainerState::Running);
    h.runtime.insert(ContainerSpec::new("unrelated", "postgres"), ContainerState::Running);
    h.runtime.fail_removal_of("ignite-b");

    let result = h.orchestrator.repo_manager().cleanup().await;
    assert_eq!(result, Envelope::ok(CleanupResult { cleaned: 2 }));
    assert_eq!(h.runtime.container_names(), vec!["ignite-b", "unrelated"]);
}

// ============================================================================
// repository operations
// ============================================================================

#[tokio::test]
async fn test_operations_never_create() {
    let h = Harness::new();
    let result = h
        .orchestrator
        .repo_manager()
        .checkout_branch(&h.repo_path(), "main")
        .await;

    let body = result.error().unwrap();
    assert_eq!(body.code, "CHECKOUT_BRANCH_FAILED");
    let details = body.details.as_ref().unwrap();
    assert_eq!(details["cause"], "CONTAINER_NOT_FOUND");
    assert_eq!(details["candidates"].as_array().unwrap().len(), 2);
    assert!(h.runtime.created().is_empty());
    assert!(h.runtime.execs().is_empty());
}

#[tokio::test]
async fn test_session_container_is_found_and_started() {
    let h = Harness::new();
    let session = local_name(&h, true);
    h.runtime.insert(repo_container(&session), ContainerState::Stopped);
    h.runtime.on_exec(|_| ExecReply::success(json!(["main", "dev"])));

    let result = h.orchestrator.repo_manager().get_branches(&h.repo_path()).await;
    assert_eq!(result.data(), Some(&json!(["main", "dev"])));
    assert_eq!(h.runtime.state_of(&session), ContainerState::Running);

    let exec = &h.runtime.execs()[0];
    assert_eq!(exec.container, session);
    assert_eq!(exec.operation, "getBranches");
    assert_eq!(exec.params["workspacePath"], "/workspace");
    assert_eq!(exec.working_dir.as_deref(), Some("/workspace"));
}

#[tokio::test]
async fn test_persistent_container_wins_over_session() {
    let h = Harness::new();
    let persistent = local_name(&h, false);
    h.runtime.insert(repo_container(&persistent), ContainerState::Running);
    h.runtime.insert(repo_container(&local_name(&h, true)), ContainerState::Running);

    h.orchestrator.repo_manager().checkout_commit(&h.repo_path(), "abc123").await;
    assert_eq!(h.runtime.execs()[0].container, persistent);
}

#[tokio::test]
async fn test_dispatch_forwards_typed_fields_and_extras() {
    let h = Harness::new();
    h.runtime.insert(repo_container(&local_name(&h, false)), ContainerState::Running);
    let repo = h.repo_path();
    let dispatch = |operation: &str, options: serde_json::Value| {
        h.orchestrator
            .execute("repo-manager", ignite_foundation::OperationRequest::new(operation, options))
    };

    dispatch("checkoutBranch", json!({ "pathOrUrl": repo, "branch": "dev", "force": true })).await;
    dispatch("checkoutCommit", json!({ "pathOrUrl": repo, "commit": "abc123" })).await;
    dispatch("pullChanges", json!({ "pathOrUrl": repo, "rebase": true })).await;

    let execs = h.runtime.execs();
    assert_eq!(execs.len(), 3);
    assert_eq!(execs[0].params["branch"], "dev");
    assert_eq!(execs[0].params["force"], true);
    assert_eq!(execs[1].params["commit"], "abc123");
    assert_eq!(execs[2].params["branch"], serde_json::Value::Null);
    assert_eq!(execs[2].params["rebase"], true);
    for exec in &execs {
        assert_eq!(exec.params["pathOrUrl"], repo.as_str());
        assert_eq!(exec.params["workspacePath"], "/workspace");
    }

    let result = dispatch("checkoutBranch", json!({ "pathOrUrl": repo, "branch": 7 })).await;
    assert_eq!(result.error().unwrap().code, "INVALID_OPTIONS");
    let result = dispatch("checkoutCommit", json!({ "pathOrUrl": repo })).await;
    assert_eq!(result.error().unwrap().code, "INVALID_OPTIONS");
    assert_eq!(h.runtime.execs().len(), 3);
}

#[tokio::test]
async fn test_init_local_mounts_then_runs() {
    let h = Harness::new();
    h.runtime.on_exec(|_| ExecReply::success(json!({ "initialized": true })));

    let result = h
        .orchestrator
        .repo_manager()
        .init(&h.repo_path(), Some("main"), true, &json!({}))
        .await;
    assert_eq!(result.data(), Some(&json!({ "initialized": true })));

    let created = h.runtime.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, local_name(&h, false));

    let exec = &h.runtime.execs()[0];
    assert_eq!(exec.operation, "init");
    assert_eq!(exec.params["branch"], "main");
    // local checkout without origin remote: nothing to inject
    assert!(exec.env_value("IGNITE_SSH_PRIVATE_KEY").is_none());
}

#[tokio::test]
async fn test_init_cloned_injects_credentials() {
    let h = Harness::new();
    let url = "git@github.com:acme/private-contracts.git";

    let result = h.orchestrator.repo_manager().init(url, None, true, &json!({})).await;
    assert!(result.is_success(), "{:?}", result);

    let created = h.runtime.created();
    assert_eq!(created.len(), 1);
    assert!(created[0].name.starts_with("ignite-cloned-acme-private-contracts-"));
    assert!(created[0].volumes.is_empty());
    assert_eq!(created[0].labels[labels::TYPE], "cloned-repo");
    assert_eq!(created[0].labels[labels::REPO_URL], url);

    let exec = &h.runtime.execs()[0];
    assert_eq!(exec.params["repoUrl"], url);
    assert_eq!(exec.env_value("IGNITE_SSH_PRIVATE_KEY"), Some(PRIVATE_KEY));
    assert_eq!(exec.env_value("GIT_TERMINAL_PROMPT"), Some("0"));
    assert!(exec.env_value("GIT_SSH_COMMAND").unwrap().contains("IdentitiesOnly=yes"));
}

#[tokio::test]
async fn test_checkout_commit_gets_no_credentials() {
    let h = Harness::new();
    let url = "git@github.com:acme/private-contracts.git";
    let name = derive_repo_container_name(RepoContainerKind::Cloned, url, "default", false).unwrap();
    h.runtime.insert(repo_container(&name), ContainerState::Running);

    h.orchestrator.repo_manager().checkout_commit(url, "deadbeef").await;
    h.orchestrator.repo_manager().pull_changes(url, None).await;

    let execs = h.runtime.execs();
    assert!(execs[0].env_value("IGNITE_SSH_PRIVATE_KEY").is_none());
    assert!(execs[0].env.iter().all(|pair| pair.starts_with("IGNITE_EXEC_ID=")));
    assert!(execs[1].env_value("IGNITE_SSH_PRIVATE_KEY").is_some());
}

#[tokio::test]
async fn test_repo_info_is_validated() {
    let h = Harness::new();
    h.runtime.insert(repo_container(&local_name(&h, false)), ContainerState::Running);
    h.runtime.on_exec(|_| {
        ExecReply::success(json!({
            "branch": null,
            "commit": "abc123",
            "dirty": false,
            "upToDate": true
        }))
    });

    let info = h
        .orchestrator
        .repo_manager()
        .get_repo_info(&h.repo_path())
        .await
        .into_result()
        .unwrap();
    assert_eq!(
        info,
        RepoInfo {
            branch: None,
            commit: "abc123".into(),
            dirty: false,
            up_to_date: true,
        }
    );

    h.runtime.on_exec(|_| ExecReply::success(json!({ "branch": "main" })));
    let bad = h.orchestrator.repo_manager().get_repo_info(&h.repo_path()).await;
    let body = bad.error().unwrap();
    assert_eq!(body.code, ErrorCode::RepoInfoFailed.as_str());
    assert_eq!(body.details.as_ref().unwrap()["cause"], "PLUGIN_OUTPUT_INVALID_ENVELOPE");
}

#[tokio::test]
async fn test_plugin_domain_failure_passes_through() {
    let h = Harness::new();
    h.runtime.insert(repo_container(&local_name(&h, false)), ContainerState::Running);
    h.runtime.on_exec(|_| ExecReply::failure("INVALID_COMMIT", "no such commit"));

    let result = h
        .orchestrator
        .repo_manager()
        .checkout_commit(&h.repo_path(), "zzz")
        .await;
    let body = result.error().unwrap();
    assert_eq!(body.code, "INVALID_COMMIT");
    assert!(body.details.is_none());
}

#[tokio::test]
async fn test_protocol_error_carries_cause_and_output() {
    let h = Harness::new();
    h.runtime.insert(repo_container(&local_name(&h, false)), ContainerState::Running);
    h.runtime.on_exec(|_| ExecReply::stdout("fatal: not a git repository"));

    let result = h.orchestrator.repo_manager().pull_changes(&h.repo_path(), None).await;
    let body = result.error().unwrap();
    assert_eq!(body.code, "PULL_FAILED");
    let details = body.details.as_ref().unwrap();
    assert_eq!(details["cause"], "PLUGIN_OUTPUT_NO_JSON");
    assert_eq!(details["stdout"], "fatal: not a git repository");
}
