#![cfg(unix)]

use futures::future::BoxFuture;
use futures::FutureExt;
use hosted_harness::scenario::{Fixture, Outcome, Runner, Scenario, Setup};
use hosted_harness::{Harness, HarnessConfig, Result, ScenarioContext, Settings};
use hosted_model::Provider;
use hosted_selftest::{FakeCli, FakeManagementApi};
use std::sync::Arc;

const CONFIG: &str = r#"
rancher:
  host: rancher.example.com
  adminToken: token-abcde:secret
eksClusterConfig:
  region: us-west-2
  nodeGroups:
    - nodegroupName: ng
      instanceType: t3.large
      desiredSize: 1
kubernetesVersions:
  eks: ["1.29", "1.30"]
"#;

fn imported<'a>(_: &'a ScenarioContext, fx: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
    async move {
        assert!(fx.imported);
        assert!(fx.cluster("inspect")?.desired().imported);
        Ok(())
    }
    .boxed()
}

fn sync_scenario() -> Scenario {
    Scenario {
        case_id: None,
        title: "imports a cluster created with eksctl",
        provider: Provider::Eks,
        is_upgrade: false,
        pending: false,
        regional: false,
        setup: Setup::SyncCluster,
        body: imported,
    }
}

fn runner(api: &Arc<FakeManagementApi>, eksctl: &FakeCli, dir: &std::path::Path) -> Runner {
    let settings = Settings::from_vars(vec![
        ("IS_IMPORT", "true".to_string()),
        ("EKSCTL_PATH", eksctl.program()),
    ])
    .unwrap();
    let config: HarnessConfig = serde_yaml::from_str(CONFIG).unwrap();
    Runner::new(Harness::new(
        Arc::<FakeManagementApi>::clone(api),
        settings,
        config,
        dir.to_path_buf(),
    ))
}

// Both cases share one test since eksctl calls change KUBECONFIG for the whole process.
#[tokio::test(start_paused = true)]
async fn imported_clusters_are_deleted_with_eksctl() {
    let dir = tempfile::tempdir().unwrap();

    let api = Arc::new(FakeManagementApi::with_lag(1));
    let eksctl = FakeCli::printing("eksctl", "[]").unwrap();
    let reports = runner(&api, &eksctl, dir.path())
        .run(&[sync_scenario()])
        .await
        .unwrap();
    assert_eq!(reports[0].outcome, Outcome::Passed);
    assert_eq!(api.create_count(), 1);
    assert_eq!(api.delete_count(), 1);
    let calls = eksctl.invocations().unwrap();
    assert!(calls[0].args.starts_with("create cluster"), "{:?}", calls);
    assert!(calls[0].args.contains("--version=1.30"), "{:?}", calls);
    assert!(calls.iter().any(|c| c.args.starts_with("delete cluster")));

    // A stack that failed half way through creation is still torn down.
    let api = Arc::new(FakeManagementApi::with_lag(1));
    let eksctl = FakeCli::failing("eksctl", "CREATE_FAILED", 1).unwrap();
    let reports = runner(&api, &eksctl, dir.path())
        .run(&[sync_scenario()])
        .await
        .unwrap();
    match &reports[0].outcome {
        Outcome::Failed(reason) => assert!(reason.contains("CREATE_FAILED"), "{}", reason),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(api.create_count(), 0);
    let calls = eksctl.invocations().unwrap();
    assert_eq!(calls.len(), 2, "{:?}", calls);
    assert!(calls[0].args.starts_with("create cluster"));
    assert!(calls[1].args.starts_with("get nodegroup"));
}
