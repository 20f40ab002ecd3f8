use super::*;
use crate::sync::captures::Capture;
use crate::sync::resolver::ResolveError;
use crate::sync::retention::{RetentionPolicy, SkipReason};
use crate::sync::test_drive::{FakeDrive, ROOT_REAL_ID};
use gdocs_core::{DocumentKind, RemoteFile};
use std::time::SystemTime;
use tempfile::tempdir;
use time::macros::datetime;

const PLAN_MODIFIED: OffsetDateTime = datetime!(2024-03-01 9:00 UTC);

fn drive() -> FakeDrive {
    FakeDrive::new()
        .folder("reports", "Reports", Some(ROOT_REAL_ID))
        .folder("archive", "Archive", Some("reports"))
        .document("plan", "Plan", DocumentKind::Document, "reports", PLAN_MODIFIED)
        .document(
            "budget",
            "Budget: 2024",
            DocumentKind::Spreadsheet,
            "reports",
            datetime!(2024-02-10 14:30 UTC),
        )
        .document(
            "old",
            "Old notes",
            DocumentKind::Presentation,
            "archive",
            datetime!(2023-11-05 7:15 UTC),
        )
}

fn options(root: &Path) -> EngineOptions {
    EngineOptions {
        backup_root: root.to_path_buf(),
        ..EngineOptions::default()
    }
}

fn write_with_mtime(path: &Path, body: &[u8], at: OffsetDateTime) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::from(at))
        .unwrap();
}

fn mtime(path: &Path) -> OffsetDateTime {
    OffsetDateTime::from(std::fs::metadata(path).unwrap().modified().unwrap())
}

fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>, SystemTime)> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(next) = pending.pop() {
        for entry in std::fs::read_dir(&next).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let modified = entry.metadata().unwrap().modified().unwrap();
                out.push((path.clone(), std::fs::read(&path).unwrap(), modified));
            }
        }
    }
    out.sort();
    out
}

fn decisions(report: &MirrorReport) -> Vec<(&str, &str)> {
    report
        .outcomes
        .iter()
        .map(|o| (o.file_id.as_str(), o.decision.label()))
        .collect()
}

#[tokio::test]
async fn mirror_folder_fetches_tree_and_stamps_remote_times() {
    let dir = tempdir().unwrap();
    let local = dir.path().join("Reports");
    let mut engine = MirrorEngine::new(drive(), options(dir.path()));

    let report = engine.mirror_folder("reports", &local).await.unwrap();

    assert_eq!(
        decisions(&report),
        vec![("plan", "fetch"), ("budget", "fetch"), ("old", "fetch")]
    );
    assert_eq!(report.failure_count(), 0);
    let plan = local.join("Plan.gdoc.docx");
    assert_eq!(std::fs::read(&plan).unwrap(), b"body of plan");
    assert_eq!(mtime(&plan), PLAN_MODIFIED);
    assert!(local.join("Budget  2024.gsheet.xlsx").exists());
    assert!(local.join("Archive/Old notes.gslides.pptx").exists());
}

#[tokio::test]
async fn second_run_without_remote_change_skips_everything() {
    let dir = tempdir().unwrap();
    let local = dir.path().join("Reports");
    let mut engine = MirrorEngine::new(
        drive(),
        EngineOptions {
            retention: RetentionOptions {
                policy: RetentionPolicy::NewestN(1),
                ..RetentionOptions::default()
            },
            ..options(dir.path())
        },
    );

    engine.mirror_folder("reports", &local).await.unwrap();
    let exports = engine.drive().export_calls.get();
    let before = snapshot(dir.path());
    let report = engine.mirror_folder("reports", &local).await.unwrap();

    assert!(
        report
            .outcomes
            .iter()
            .all(|o| o.decision == Decision::Skip(SkipReason::UpToDate) && o.prune.is_none())
    );
    assert_eq!(engine.drive().export_calls.get(), exports);
    assert_eq!(snapshot(dir.path()), before);
}

#[tokio::test]
async fn remote_change_moves_plain_copy_to_backup() {
    let dir = tempdir().unwrap();
    let local = dir.path().join("Reports");
    let mut engine = MirrorEngine::new(drive(), options(dir.path()));
    engine.mirror_folder("reports", &local).await.unwrap();

    let changed = datetime!(2024-03-05 16:45:10 UTC);
    engine.drive().set_modified("plan", changed);
    let report = engine.mirror_folder("reports", &local).await.unwrap();

    assert_eq!(
        decisions(&report),
        vec![("plan", "rename+fetch"), ("budget", "skip"), ("old", "skip")]
    );
    let backup = local.join("Plan.gdoc_2024-03-05_16-45-10.docx");
    assert_eq!(std::fs::read(&backup).unwrap(), b"body of plan");
    assert!(!local.join("Plan.gdoc_2024-03-01_09-00-00.docx").exists());
    assert_eq!(mtime(&local.join("Plan.gdoc.docx")), changed);
}

#[tokio::test]
async fn no_clobber_leaves_existing_plain_copy() {
    let dir = tempdir().unwrap();
    let local = dir.path().join("Reports");
    let plain = local.join("Plan.gdoc.docx");
    write_with_mtime(&plain, b"hand edited", datetime!(2020-01-01 0:00 UTC));
    let mut engine = MirrorEngine::new(
        drive(),
        EngineOptions {
            max_depth: Some(0),
            retention: RetentionOptions {
                no_clobber: true,
                ..RetentionOptions::default()
            },
            ..options(dir.path())
        },
    );

    let report = engine.mirror_folder("reports", &local).await.unwrap();

    assert_eq!(
        report.outcomes[0].decision,
        Decision::Skip(SkipReason::NoClobber)
    );
    assert_eq!(std::fs::read(&plain).unwrap(), b"hand edited");
}

#[tokio::test]
async fn timestamped_mode_writes_captures_and_prunes_to_newest() {
    let dir = tempdir().unwrap();
    let local = dir.path().join("Reports");
    for day in 1..=4 {
        write_with_mtime(
            &local.join(format!("Plan.gdoc_2023-01-0{day}_00-00-00.docx")),
            b"old",
            datetime!(2023-01-01 0:00 UTC),
        );
    }
    let mut engine = MirrorEngine::new(
        drive(),
        EngineOptions {
            max_depth: Some(0),
            retention: RetentionOptions {
                timestamped: true,
                no_clobber: true,
                policy: RetentionPolicy::NewestN(2),
            },
            ..options(dir.path())
        },
    );

    let report = engine.mirror_folder("reports", &local).await.unwrap();

    let fresh = local.join("Plan.gdoc_2024-03-01_09-00-00.docx");
    assert_eq!(std::fs::read(&fresh).unwrap(), b"body of plan");
    assert!(!local.join("Plan.gdoc.docx").exists());
    let prune = report.outcomes[0].prune.clone().unwrap();
    assert_eq!(
        prune.keep,
        vec![
            Capture::new(
                local.join("Plan.gdoc_2023-01-04_00-00-00.docx"),
                datetime!(2023-01-04 0:00 UTC)
            ),
            Capture::new(fresh.clone(), PLAN_MODIFIED),
        ]
    );
    assert_eq!(prune.remove.len(), 3);
    for day in 1..=3 {
        assert!(
            !local
                .join(format!("Plan.gdoc_2023-01-0{day}_00-00-00.docx"))
                .exists()
        );
    }
    assert!(local.join("Budget  2024.gsheet_2024-02-10_14-30-00.xlsx").exists());
}

#[tokio::test]
async fn dry_run_reaches_live_decisions_without_touching_disk() {
    let dir = tempdir().unwrap();
    let local = dir.path().join("Reports");
    write_with_mtime(
        &local.join("Plan.gdoc.docx"),
        b"stale",
        datetime!(2024-01-20 12:00 UTC),
    );
    for day in 1..=3 {
        write_with_mtime(
            &local.join(format!("Plan.gdoc_2024-01-0{day}_00-00-00.docx")),
            b"old",
            datetime!(2024-01-01 0:00 UTC),
        );
    }
    let configured = |dry_run| EngineOptions {
        dry_run,
        retention: RetentionOptions {
            policy: RetentionPolicy::Staggered(3),
            ..RetentionOptions::default()
        },
        ..options(dir.path())
    };

    let before = snapshot(dir.path());
    let mut dry = MirrorEngine::new(drive(), configured(true));
    let dry_report = dry.mirror_folder("reports", &local).await.unwrap();
    assert_eq!(snapshot(dir.path()), before);
    assert_eq!(dry.drive().export_calls.get(), 0);

    let mut live = MirrorEngine::new(drive(), configured(false));
    let live_report = live.mirror_folder("reports", &local).await.unwrap();

    assert_eq!(dry_report, live_report);
    let prune = live_report.outcomes[0].prune.clone().unwrap();
    assert_eq!(prune.keep.len(), 3);
    assert_eq!(
        prune.remove,
        vec![Capture::new(
            local.join("Plan.gdoc_2024-01-02_00-00-00.docx"),
            datetime!(2024-01-02 0:00 UTC)
        )]
    );
    let backup = local.join("Plan.gdoc_2024-03-01_09-00-00.docx");
    assert_eq!(std::fs::read(&backup).unwrap(), b"stale");
    assert!(!local.join("Plan.gdoc_2024-01-20_12-00-00.docx").exists());
    assert!(!local.join("Plan.gdoc_2024-01-02_00-00-00.docx").exists());
    assert!(local.join("Plan.gdoc_2024-01-03_00-00-00.docx").exists());
}

#[tokio::test]
async fn failed_export_is_recorded_and_run_continues() {
    let dir = tempdir().unwrap();
    let local = dir.path().join("Reports");
    let plain = local.join("Plan.gdoc.docx");
    write_with_mtime(&plain, b"previous", datetime!(2024-01-01 0:00 UTC));
    let mut engine = MirrorEngine::new(drive().failing_export("plan"), options(dir.path()));

    let report = engine.mirror_folder("reports", &local).await.unwrap();

    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.failures[0].subject, "plan");
    assert_eq!(decisions(&report), vec![("budget", "fetch"), ("old", "fetch")]);
    assert_eq!(std::fs::read(&plain).unwrap(), b"previous");
}

#[tokio::test]
async fn unsupported_kind_is_rejected_per_document() {
    let dir = tempdir().unwrap();
    let mut engine = MirrorEngine::new(drive(), options(dir.path()));
    let pdf = RemoteFile {
        id: "pdf".into(),
        title: "Scan".into(),
        mime_type: "application/pdf".into(),
        modified_at: PLAN_MODIFIED,
        created_at: PLAN_MODIFIED,
        parents: vec!["reports".into()],
    };

    let err = engine
        .mirror_document(&pdf, "Scan", dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UnsupportedKind { ref id, .. } if id == "pdf"));
}

#[tokio::test]
async fn depth_bound_stops_descent() {
    let dir = tempdir().unwrap();
    let local = dir.path().join("Reports");
    let mut engine = MirrorEngine::new(
        drive(),
        EngineOptions {
            max_depth: Some(0),
            ..options(dir.path())
        },
    );

    let report = engine.mirror_folder("reports", &local).await.unwrap();

    assert_eq!(decisions(&report), vec![("plan", "fetch"), ("budget", "fetch")]);
    assert!(!local.join("Archive").exists());
}

#[tokio::test]
async fn modified_window_filters_documents() {
    let dir = tempdir().unwrap();
    let mut engine = MirrorEngine::new(
        drive(),
        EngineOptions {
            modified_after: Some(datetime!(2024-02-15 0:00 UTC)),
            ..options(dir.path())
        },
    );

    let report = engine
        .mirror_folder("reports", &dir.path().join("Reports"))
        .await
        .unwrap();

    assert_eq!(decisions(&report), vec![("plan", "fetch")]);
}

#[tokio::test]
async fn duplicate_titles_get_numbered_names() {
    let dir = tempdir().unwrap();
    let notes = |id: &str, created: OffsetDateTime| RemoteFile {
        id: id.into(),
        title: "Notes".into(),
        mime_type: DocumentKind::Document.mime().into(),
        modified_at: PLAN_MODIFIED,
        created_at: created,
        parents: vec!["inbox".into()],
    };
    let drive = FakeDrive::new()
        .folder("inbox", "Inbox", Some(ROOT_REAL_ID))
        .file(notes("late", datetime!(2022-06-01 0:00 UTC)))
        .file(notes("early", datetime!(2021-06-01 0:00 UTC)));
    let mut engine = MirrorEngine::new(drive, options(dir.path()));

    let report = engine
        .mirror_folder("inbox", &dir.path().join("Inbox"))
        .await
        .unwrap();

    let names: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| (o.file_id.as_str(), o.base_name.as_str()))
        .collect();
    assert_eq!(names, vec![("late", "Notes (2).gdoc"), ("early", "Notes.gdoc")]);
}

#[tokio::test]
async fn mirror_path_resolves_directory_under_mount() {
    let dir = tempdir().unwrap();
    let mut engine = MirrorEngine::new(
        drive(),
        EngineOptions {
            drive_mount: Some(PathBuf::from("/mnt/drive")),
            ..options(dir.path())
        },
    );

    let report = engine
        .mirror_path(Path::new("/mnt/drive/My Drive/Reports"))
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert!(report.diagnostics.is_empty());
    assert!(dir.path().join("Reports/Plan.gdoc.docx").exists());
    assert!(dir.path().join("Reports/Archive/Old notes.gslides.pptx").exists());
}

#[tokio::test]
async fn mirror_path_without_mount_is_an_error() {
    let dir = tempdir().unwrap();
    let mut engine = MirrorEngine::new(drive(), options(dir.path()));

    let err = engine.mirror_path(Path::new("/anywhere")).await.unwrap_err();

    assert!(matches!(err, EngineError::NoDriveMount));
}

#[tokio::test]
async fn mirror_path_follows_pointer_id() {
    let mount = tempdir().unwrap();
    let backup = tempdir().unwrap();
    let pointer = mount.path().join("Reports/Plan.gdoc");
    std::fs::create_dir_all(pointer.parent().unwrap()).unwrap();
    std::fs::write(&pointer, r#"{"doc_id": "plan"}"#).unwrap();
    let mut engine = MirrorEngine::new(
        drive(),
        EngineOptions {
            drive_mount: Some(mount.path().to_path_buf()),
            ..options(backup.path())
        },
    );

    let report = engine.mirror_path(&pointer).await.unwrap();

    assert_eq!(decisions(&report), vec![("plan", "fetch")]);
    assert!(backup.path().join("Reports/Plan.gdoc.docx").exists());
}

#[tokio::test]
async fn pointer_without_id_is_looked_up_by_title() {
    let mount = tempdir().unwrap();
    let backup = tempdir().unwrap();
    let reports = mount.path().join("Reports");
    std::fs::create_dir_all(&reports).unwrap();
    std::fs::write(reports.join("Budget  2024.gsheet"), "{}").unwrap();
    std::fs::write(reports.join("Ghost.gdoc"), "{}").unwrap();
    let mut engine = MirrorEngine::new(
        drive(),
        EngineOptions {
            drive_mount: Some(mount.path().to_path_buf()),
            ..options(backup.path())
        },
    );

    let report = engine
        .mirror_path(&reports.join("Budget  2024.gsheet"))
        .await
        .unwrap();
    assert_eq!(decisions(&report), vec![("budget", "fetch")]);
    assert!(backup.path().join("Reports/Budget  2024.gsheet.xlsx").exists());

    let err = engine
        .mirror_path(&reports.join("Ghost.gdoc"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Resolve(ResolveError::LeafNotFound { .. })
    ));
}

#[tokio::test]
async fn search_hits_land_in_rebuilt_directories() {
    let dir = tempdir().unwrap();
    let drive = drive().folder("team", "Team Space", None).document(
        "team-plan",
        "Team plan",
        DocumentKind::Document,
        "team",
        datetime!(2024-01-15 10:00 UTC),
    );
    let mut engine = MirrorEngine::new(drive, options(dir.path()));

    let report = engine.mirror_search("plan").await.unwrap();

    assert_eq!(decisions(&report), vec![("plan", "fetch"), ("team-plan", "fetch")]);
    assert!(dir.path().join("Reports/Plan.gdoc.docx").exists());
    assert!(
        dir.path()
            .join("Shared/Team Space/Team plan.gdoc.docx")
            .exists()
    );
}

#[tokio::test]
async fn trashed_documents_are_left_out() {
    let dir = tempdir().unwrap();
    let mut engine = MirrorEngine::new(drive().trashed("budget"), options(dir.path()));

    let report = engine
        .mirror_folder("reports", &dir.path().join("Reports"))
        .await
        .unwrap();

    assert_eq!(decisions(&report), vec![("plan", "fetch"), ("old", "fetch")]);
}
