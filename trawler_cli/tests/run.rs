use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

fn test_target(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../test_targets")
        .join(name)
}

fn trawler() -> Command {
    Command::new(env!("CARGO_BIN_EXE_trawler"))
}

#[test]
fn fixed_run_writes_summary_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let run_dir = dir.path().join("run");

    let output = trawler()
        .arg("--target")
        .arg(test_target("ok.sh"))
        .args(["--seed", "42", "--min-ops", "3", "--max-ops", "3"])
        .args(["--no-corpus", "--workers", "1", "--cases", "10"])
        .arg("--run-dir")
        .arg(&run_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary = std::fs::read_to_string(run_dir.join("run_summary.txt")).unwrap();
    assert!(summary.lines().any(|l| l == "total=10"), "{summary}");
    assert!(summary.lines().any(|l| l == "exit[0]=10"), "{summary}");
    assert!(!run_dir.join("worker_0_stats.txt").exists());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("=== Run Summary ==="));
    assert!(stdout.contains("Total cases:    10"));
}

#[test]
fn saved_crash_can_be_reproduced_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let run_dir = dir.path().join("run");

    let status = trawler()
        .arg("--target")
        .arg(test_target("crash.sh"))
        .args(["--seed", "7", "--no-corpus", "--workers", "2", "--cases", "4"])
        .arg("--run-dir")
        .arg(&run_dir)
        .output()
        .unwrap()
        .status;
    assert!(status.success());
    for id in 0..4 {
        assert!(run_dir.join(format!("case_{id}.meta.txt")).is_file());
    }

    let output = trawler()
        .arg("--target")
        .arg(test_target("crash.sh"))
        .args(["--repro-case", "3"])
        .arg("--run-dir")
        .arg(&run_dir)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("exit=139 signal=11 timed_out=false"), "{stdout}");
    assert!(stdout.contains("(matches)"), "{stdout}");
}

#[test]
fn missing_target_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let output = trawler()
        .arg("--target")
        .arg(dir.path().join("no-such-binary"))
        .args(["--cases", "1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn inverted_op_bounds_are_rejected() {
    let output = trawler()
        .arg("--target")
        .arg(test_target("ok.sh"))
        .args(["--min-ops", "5", "--max-ops", "2", "--cases", "1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("min-ops"));
}

/// Copies a test target into `dir` under `name` with the given mode.
fn install_target(dir: &Path, name: &str, source: &str, mode: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::copy(test_target(source), &path).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    path
}

#[test]
fn unexecutable_target_aborts_the_run_with_a_summary() {
    let dir = tempfile::tempdir().unwrap();
    let target = install_target(dir.path(), "fiskta", "ok.sh", 0o644);
    let run_dir = dir.path().join("run");

    let output = trawler()
        .arg("--target")
        .arg(&target)
        .args(["--no-corpus", "--workers", "1", "--cases", "5"])
        .arg("--run-dir")
        .arg(&run_dir)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("worker 0 failed"), "{stderr}");

    let summary = std::fs::read_to_string(run_dir.join("run_summary.txt")).unwrap();
    assert!(summary.lines().any(|l| l == "total=0"), "{summary}");
    assert!(!run_dir.join("worker_0_stats.txt").exists());
}

#[test]
fn run_dir_from_config_file_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let run_dir = dir.path().join("from_config");
    let config = dir.path().join("trawler.toml");
    std::fs::write(
        &config,
        format!(
            "target = {:?}\nrun-dir = {:?}\ncases = 3\nworkers = 1\nuse-corpus = false\n",
            test_target("ok.sh").display().to_string(),
            run_dir.display().to_string(),
        ),
    )
    .unwrap();

    let output = trawler().arg("--config").arg(&config).output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary = std::fs::read_to_string(run_dir.join("run_summary.txt")).unwrap();
    assert!(summary.lines().any(|l| l == "total=3"), "{summary}");
}

#[test]
fn target_is_detected_in_the_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    install_target(dir.path(), "fiskta", "ok.sh", 0o755);
    let run_dir = dir.path().join("run");

    let output = trawler()
        .current_dir(dir.path())
        .args(["--no-corpus", "--workers", "1", "--cases", "2"])
        .arg("--run-dir")
        .arg(&run_dir)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("trawler [release"), "{stdout}");
    assert!(stdout.contains("fiskta\n"), "{stdout}");

    // A sanitizer build wins over a release build.
    install_target(dir.path(), "fiskta-asan", "ok.sh", 0o755);
    let output = trawler()
        .current_dir(dir.path())
        .args(["--no-corpus", "--workers", "1", "--cases", "2"])
        .arg("--run-dir")
        .arg(dir.path().join("run_asan"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("trawler [ASAN"), "{stdout}");
}

#[test]
fn no_target_anywhere_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = trawler()
        .current_dir(dir.path())
        .args(["--cases", "1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("fiskta"));
}

#[test]
fn quick_preset_uses_two_workers() {
    let dir = tempfile::tempdir().unwrap();
    let run_dir = dir.path().join("run");

    // --cases still overrides the preset's case count.
    let output = trawler()
        .arg("--target")
        .arg(test_target("ok.sh"))
        .args(["--quick", "--cases", "4", "--no-corpus"])
        .arg("--run-dir")
        .arg(&run_dir)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Mode: 4 cases (2 workers)"), "{stdout}");
    let summary = std::fs::read_to_string(run_dir.join("run_summary.txt")).unwrap();
    assert!(summary.lines().any(|l| l == "total=4"), "{summary}");
}
