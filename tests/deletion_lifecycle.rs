mod support;

use std::sync::Arc;

use dayplan::deletion::{DeletionRecord, DeletionStore};
use dayplan::reconcile::idle_instance_id;
use dayplan::storage::FileStore;
use dayplan::vault::{FsVault, Vault};
use serde_json::json;
use support::{date, task_path, titles, TestVault, DAILY};

// 2100-01-01T00:00:00Z
const FAR_FUTURE_MS: i64 = 4_102_444_800_000;

fn deletions(vault: &TestVault) -> DeletionStore {
    DeletionStore::new(Arc::new(FileStore::new(vault.storage().state_dir())))
}

#[tokio::test]
async fn permanent_deletion_holds_on_later_days_only() {
    let vault = TestVault::new();
    vault.write_task("Walk", DAILY);
    vault.write_task("Read", DAILY);
    vault.write_state(
        "deleted-instances-2024-01-15",
        &json!([{ "path": task_path("Walk"), "deletionType": "permanent", "deletedAt": FAR_FUTURE_MS }]),
    );

    assert_eq!(titles(&vault.reconcile(date(2024, 1, 14)).await), vec!["Read", "Walk"]);
    assert_eq!(titles(&vault.reconcile(date(2024, 1, 15)).await), vec!["Read"]);
    assert_eq!(titles(&vault.reconcile(date(2024, 1, 16)).await), vec!["Read"]);
    assert_eq!(titles(&vault.reconcile(date(2024, 3, 1)).await), vec!["Read"]);
}

#[tokio::test]
async fn temporary_deletion_only_affects_its_instance_and_day() {
    let vault = TestVault::new();
    vault.write_task("Walk", DAILY);
    let day = date(2024, 1, 15);
    deletions(&vault)
        .record(
            day,
            &[DeletionRecord::temporary(
                task_path("Walk"),
                idle_instance_id(&task_path("Walk"), day),
            )],
        )
        .expect("record deletion");

    assert!(vault.reconcile(day).await.instances.is_empty());
    assert_eq!(titles(&vault.reconcile(date(2024, 1, 16)).await), vec!["Walk"]);
}

#[tokio::test]
async fn recreated_file_outlives_an_older_permanent_deletion() {
    let vault = TestVault::new();
    vault.write_task("Walk", DAILY);
    vault.write_state(
        "deleted-instances-2024-01-15",
        &json!([{ "path": task_path("Walk"), "deletionType": "permanent", "deletedAt": 0 }]),
    );

    // Later days see the file as newer than the deletion.
    assert_eq!(titles(&vault.reconcile(date(2024, 1, 16)).await), vec!["Walk"]);
    let stored = vault
        .read_state("deleted-instances-2024-01-15")
        .expect("record kept until its own day loads");
    assert_eq!(stored.as_array().map(Vec::len), Some(1));

    // Loading the deletion's own day prunes it.
    assert_eq!(titles(&vault.reconcile(date(2024, 1, 15)).await), vec!["Walk"]);
    assert_eq!(vault.read_state("deleted-instances-2024-01-15"), Some(json!([])));
}

#[tokio::test]
async fn cleanup_keeps_deletions_newer_than_the_file() {
    let vault = TestVault::new();
    vault.write_task("Walk", DAILY);
    vault.write_task("Read", DAILY);
    let day = date(2024, 1, 15);
    vault.write_state(
        "deleted-instances-2024-01-15",
        &json!([
            { "path": task_path("Walk"), "deletionType": "permanent", "deletedAt": FAR_FUTURE_MS },
            { "path": task_path("Read"), "deletionType": "permanent", "deletedAt": 0 },
            { "path": task_path("Gone"), "deletionType": "permanent", "deletedAt": 0 },
            { "path": task_path("Read"), "instanceId": "x", "deletionType": "temporary", "deletedAt": 0 }
        ]),
    );

    let fs_vault = FsVault::new(vault.storage());
    let pruned = deletions(&vault)
        .cleanup_stale(day, |path| fs_vault.stat(path))
        .expect("cleanup");
    assert_eq!(pruned, 1);

    let remaining = deletions(&vault).deleted_records(day);
    let paths: Vec<_> = remaining.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            task_path("Walk").as_str(),
            task_path("Gone").as_str(),
            task_path("Read").as_str()
        ]
    );
}

#[tokio::test]
async fn hidden_routine_comes_back_the_next_day() {
    let vault = TestVault::new();
    vault.write_task("Walk", DAILY);
    vault.write_state(
        "hidden-routines-2024-01-15",
        &json!([{ "path": task_path("Walk"), "instanceId": null }]),
    );

    assert!(vault.reconcile(date(2024, 1, 15)).await.instances.is_empty());
    assert_eq!(titles(&vault.reconcile(date(2024, 1, 16)).await), vec!["Walk"]);
    assert!(vault.exists(&task_path("Walk")));
}

#[tokio::test]
async fn deleted_log_entry_is_not_rebuilt() {
    let vault = TestVault::new();
    vault.write_log(
        2024,
        1,
        &json!({
            "taskExecutions": {
                "2024-01-15": [
                    { "instanceId": "e1", "taskTitle": "Call bank", "startTime": "09:00", "stopTime": "09:10" },
                    { "instanceId": "e2", "taskTitle": "Call bank", "startTime": "14:00", "stopTime": "14:05" }
                ]
            }
        }),
    );
    deletions(&vault)
        .record(
            date(2024, 1, 15),
            &[DeletionRecord::temporary(task_path("Call bank"), "e1")],
        )
        .expect("record deletion");

    let outcome = vault.reconcile(date(2024, 1, 15)).await;
    let ids: Vec<_> = outcome.instances.iter().map(|i| i.instance_id.as_str()).collect();
    assert_eq!(ids, vec!["e2"]);
    assert!(FsVault::new(vault.storage()).list_task_files().await.is_empty());
}
