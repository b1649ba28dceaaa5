#![cfg(unix)]

use hosted_harness::provider::{EksResource, Eksctl, Gcloud, GkeResource, Location};
use hosted_harness::{EnvVarGuard, Error};
use hosted_model::constants::ENV_KUBECONFIG;
use hosted_selftest::FakeCli;
use maplit::btreemap;

const NODE_GROUPS: &str = r#"[
  {"Name": "ranchernodes", "Version": "1.29", "DesiredCapacity": 1},
  {"Name": "ng-abcde", "Version": "1.29", "DesiredCapacity": 2}
]"#;

#[test]
fn eksctl_output_is_queried() {
    let fake = FakeCli::printing("eksctl", NODE_GROUPS).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let eksctl = Eksctl::new(fake.program(), "us-west-2", dir.path());

    let versions = eksctl
        .get(EksResource::NodeGroup, "hosted-abcde", ".[]|.Version", &[])
        .unwrap();
    assert_eq!(versions.lines().collect::<Vec<_>>(), vec!["1.29", "1.29"]);
    let count = eksctl
        .get(EksResource::NodeGroup, "hosted-abcde", ".|length", &[])
        .unwrap();
    assert_eq!(count.trim(), "2");

    let calls = fake.invocations().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0].args,
        "get nodegroup --region=us-west-2 --cluster=hosted-abcde -ojson"
    );
}

// The only test in this binary that touches KUBECONFIG.
#[test]
fn failed_create_restores_kubeconfig() {
    let fake = FakeCli::failing("eksctl", "AlreadyExistsException", 1).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let eksctl = Eksctl::new(fake.program(), "us-west-2", dir.path());
    let _restore = EnvVarGuard::set(ENV_KUBECONFIG, "/home/tester/.kube/config");

    let tags = btreemap! { "owner".to_string() => "hosted-e2e".to_string() };
    let err = eksctl
        .create_cluster("hosted-abcde", "1.29", 1, &tags, &[])
        .unwrap_err();
    assert!(matches!(err, Error::Subprocess { .. }), "{}", err);
    assert!(err.to_string().contains("AlreadyExistsException"));

    assert_eq!(
        std::env::var(ENV_KUBECONFIG).unwrap(),
        "/home/tester/.kube/config"
    );
    let calls = fake.invocations().unwrap();
    let downstream = eksctl.downstream_kubeconfig("hosted-abcde");
    assert_eq!(
        calls[0].kubeconfig.as_deref(),
        Some(downstream.to_string_lossy().as_ref())
    );
    assert!(calls[0].args.contains("--tags owner=hosted-e2e"));
}

#[test]
fn gcloud_output_is_queried() {
    let fake = FakeCli::printing(
        "gcloud",
        r#"{"name": "hosted-abcde", "currentMasterVersion": "1.30.2-gke.1587003"}"#,
    )
    .unwrap();
    let gcloud = Gcloud::new(fake.program(), Some("project-a".to_string()));
    let location = Location::Zone("asia-south2-c".to_string());

    let version = gcloud
        .get(
            GkeResource::Cluster,
            "hosted-abcde",
            &location,
            ".currentMasterVersion",
        )
        .unwrap();
    assert_eq!(version.trim(), "1.30.2-gke.1587003");
    assert_eq!(
        fake.invocations().unwrap()[0].args,
        "container clusters describe hosted-abcde --zone=asia-south2-c --project=project-a \
         --format=json"
    );
}

#[test]
fn gcloud_failure_is_a_subprocess_error() {
    let fake = FakeCli::failing("gcloud", "ERROR: (gcloud.container) NOT_FOUND", 1).unwrap();
    let gcloud = Gcloud::new(fake.program(), None);
    let err = gcloud
        .get(
            GkeResource::NodePools,
            "hosted-abcde",
            &Location::Region("asia-south2".to_string()),
            ".[].version",
        )
        .unwrap_err();
    assert!(err.to_string().contains("NOT_FOUND"), "{}", err);
}
