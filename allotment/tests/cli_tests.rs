use anyhow::{Context, Result};
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A copy of the demo allotment project in a temp dir.
struct AllotmentTestEnv {
    _tmp: TempDir,
    root: PathBuf,
}

impl AllotmentTestEnv {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let project_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .context("Workspace root not found")?
            .join("demos/kgv");

        let dest = tmp.path().join("kgv");
        Self::copy_dir(&project_root, &dest)?;

        Ok(Self {
            _tmp: tmp,
            root: dest,
        })
    }

    fn copy_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
        let mut options = fs_extra::dir::CopyOptions::new();
        options.skip_exist = true;
        options.content_only = true;

        std::fs::create_dir_all(dst)?;
        fs_extra::dir::copy(src, dst, &options)
            .map(|_| ())
            .map_err(|e| std::io::Error::other(e.to_string()))
    }

    fn allotment(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("allotment"));
        cmd.current_dir(&self.root);
        cmd
    }

    fn db(&self) -> Result<duckdb::Connection> {
        Ok(duckdb::Connection::open(self.root.join("target/kgv.duckdb"))?)
    }

    fn count(&self, table: &str) -> Result<i64> {
        let conn = self.db()?;
        Ok(conn.query_row(&format!("SELECT count(*) FROM {}", table), [], |r| r.get(0))?)
    }

    fn ingest_and_migrate(&self) -> Result<()> {
        self.allotment()
            .arg("ingest")
            .assert()
            .success()
            .stdout(predicate::str::contains("Batch 1 staged"));
        self.allotment().arg("migrate").assert().success();
        Ok(())
    }
}

#[test]
fn test_migration_is_idempotent() -> Result<()> {
    let env = AllotmentTestEnv::new()?;
    env.ingest_and_migrate()?;

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        env.root.join("target/migration_report_1.json"),
    )?)?;
    assert_eq!(report["record_counts"]["districts"], 3);
    assert_eq!(report["integrity_checks"]["orphaned_cadastral_districts"], 0);
    assert_eq!(env.count("districts")?, 3);
    assert_eq!(env.count("cadastral_districts")?, 3);
    assert_eq!(env.count("applications")?, 4);
    assert_eq!(env.count("application_history")?, 3);

    // Cadastral 102 carries no district reference and resolves through the junction export
    let district: String = env.db()?.query_row(
        "SELECT district_id FROM cadastral_districts WHERE id = '102'",
        [],
        |r| r.get(0),
    )?;
    assert_eq!(district, "1");

    env.allotment().args(["migrate", "--batch", "1"]).assert().success();
    assert_eq!(env.count("applications")?, 4);
    assert_eq!(env.count("application_history")?, 3);
    assert_eq!(env.count("file_references")?, 3);
    Ok(())
}

#[test]
fn test_migrate_without_batch_fails() -> Result<()> {
    let env = AllotmentTestEnv::new()?;
    env.allotment()
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No MIGRATION batch found"));
    Ok(())
}

#[test]
fn test_migrate_rejects_unknown_entity() -> Result<()> {
    let env = AllotmentTestEnv::new()?;
    env.allotment().arg("ingest").assert().success();
    env.allotment()
        .args(["migrate", "--select", "plots"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_quality_strict_fails_on_error_violations() -> Result<()> {
    let env = AllotmentTestEnv::new()?;
    env.ingest_and_migrate()?;

    env.allotment()
        .args(["quality", "--strict"])
        .assert()
        .success()
        .stdout(predicate::str::contains("orphaned_cadastral_districts"));

    env.db()?.execute(
        "UPDATE cadastral_districts SET district_id = 'ghost' WHERE id = '101'",
        [],
    )?;

    env.allotment()
        .args(["quality", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--strict mode"));

    // Without --strict the violations are reported but do not fail
    env.allotment()
        .args(["quality", "--severity", "ERROR"])
        .assert()
        .success();
    Ok(())
}

#[test]
fn test_monitor_once_and_acknowledge() -> Result<()> {
    let env = AllotmentTestEnv::new()?;
    env.ingest_and_migrate()?;
    std::fs::write(
        env.root.join("config/alerts.yml"),
        "alerts:\n  - name: applications_present\n    metric_name: active_applications\n    operator: \">\"\n    threshold: 0\n    severity: INFO\n",
    )?;

    env.allotment()
        .args(["monitor", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 triggered"));

    // Condition still holds: no second event
    env.allotment()
        .args(["monitor", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 triggered"));

    let event_id: i64 = env.db()?.query_row(
        "SELECT id FROM alert_events WHERE state = 'TRIGGERED'",
        [],
        |r| r.get(0),
    )?;

    env.allotment()
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 open alert"));

    env.allotment()
        .args(["ack", &event_id.to_string(), "--actor", "gartenamt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("acknowledged by gartenamt"));

    env.allotment()
        .args(["ack", &event_id.to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No open alert"));
    Ok(())
}

#[test]
fn test_status_json_reports_every_entity() -> Result<()> {
    let env = AllotmentTestEnv::new()?;
    env.ingest_and_migrate()?;

    let output = env.allotment().args(["status", "--json"]).output()?;
    assert!(output.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(doc["batch_id"], 1);
    assert_eq!(doc["entities"].as_array().map(Vec::len), Some(9));
    assert_eq!(doc["entities"][0]["entity"], "district");
    assert_eq!(doc["entities"][0]["completion_pct"], 100.0);
    assert_eq!(doc["recent_batches"][0]["id"], 1);
    Ok(())
}

#[test]
fn test_init_scaffolds_once() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("fresh");
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("allotment"));
    cmd.args(["init", "--name", "kgv", "--project-dir"])
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 quality rules"));

    assert!(dir.join("allotment.yaml").exists());
    assert!(dir.join("config/alerts.yml").exists());

    let mut again = Command::new(assert_cmd::cargo::cargo_bin!("allotment"));
    again
        .args(["init", "--project-dir"])
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing written"));
    Ok(())
}

#[test]
fn test_inspect_staging_table() -> Result<()> {
    let env = AllotmentTestEnv::new()?;
    env.allotment().arg("ingest").assert().success();

    env.allotment()
        .args(["inspect", "--table", "raw_districts", "--limit", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("district_id"))
        .stdout(predicate::str::contains("3 total"));

    env.allotment()
        .args(["inspect", "--table", "plots"])
        .assert()
        .failure();
    Ok(())
}
