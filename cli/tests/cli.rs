use assert_cmd::Command;

fn hostedsys() -> Command {
    let mut cmd = Command::cargo_bin("hostedsys").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("CATTLE_TEST_CONFIG");
    cmd
}

#[test]
fn lists_scenarios_as_json() {
    let output = hostedsys()
        .args(["list", "--json", "--provider", "eks"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert!(rows.iter().all(|r| r["provider"] == "eks"));
    assert!(rows.iter().any(|r| r["name"] == "eks-141"));
    assert!(rows
        .iter()
        .any(|r| r["name"] == "eks-148" && r["pending"] == true));
}

#[test]
fn lists_scenarios_as_table() {
    let output = hostedsys().args(["list", "300"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("NAME"), "{}", stdout);
    assert!(stdout.contains("gke-300"), "{}", stdout);
    assert!(!stdout.contains("eks-141"), "{}", stdout);
}

#[test]
fn run_without_matching_scenarios_fails() {
    hostedsys()
        .args(["run", "99999"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn run_without_config_fails() {
    let output = hostedsys().args(["run", "141"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("CATTLE_TEST_CONFIG"));
}
