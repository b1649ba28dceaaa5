use hosted_harness::mutator::{create_hosted_cluster, update_cluster};
use hosted_harness::operations::{
    add_node_groups, delete_node_group, scale_node_groups, update_access, update_cluster_tags,
    update_logging, update_node_group_metadata, update_public_access_sources,
    upgrade_cluster_kubernetes_version, upgrade_node_kubernetes_version, wait_cluster_in_upgrade,
    wait_for_transitioning_error, wait_until_cluster_is_ready, Checks,
};
use hosted_harness::Error;
use hosted_model::{ClusterConfig, ClusterResource, ConvergenceWindow, NodeGroupSpec, Provider};
use hosted_selftest::{DuplicateWording, FakeManagementApi};
use maplit::btreemap;

const DUPLICATE_WORDINGS: [&str; 2] = [
    "is not unique within the cluster",
    "NodePool names must be unique",
];

fn node_group(name: &str) -> NodeGroupSpec {
    NodeGroupSpec {
        name: name.to_string(),
        instance_type: Some("t3.large".to_string()),
        desired_size: Some(1),
        min_size: Some(1),
        max_size: Some(1),
        ..Default::default()
    }
}

fn config(name: &str) -> ClusterConfig {
    ClusterConfig {
        display_name: name.to_string(),
        region: Some("us-west-2".to_string()),
        kubernetes_version: Some("1.29".to_string()),
        public_access: Some(true),
        private_access: Some(false),
        node_groups: vec![node_group("ng")],
        ..Default::default()
    }
}

async fn ready_cluster(api: &FakeManagementApi, name: &str) -> ClusterResource {
    let created = create_hosted_cluster(api, Provider::Eks, config(name))
        .await
        .unwrap();
    wait_until_cluster_is_ready(api, &created).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn scaling_converges_within_node_group_window() {
    let api = FakeManagementApi::with_lag(3);
    let cluster = ready_cluster(&api, "scale").await;
    assert!(cluster.is_active());

    let scaled = scale_node_groups(&api, &cluster, 2, Checks::ALL).await.unwrap();
    let upstream = scaled.upstream_spec().unwrap();
    assert_eq!(upstream.node_groups[0].desired_size, Some(2));
    assert_eq!(upstream.node_groups[0].max_size, Some(2));
    assert!(ConvergenceWindow::NODE_GROUP.max_samples() > 3);
}

#[tokio::test(start_paused = true)]
async fn lagging_upstream_is_awaited_not_failed() {
    let api = FakeManagementApi::with_lag(5);
    let cluster = ready_cluster(&api, "logging").await;

    let updated = update_logging(&api, &cluster, &["audit", "api"], true)
        .await
        .unwrap();
    let mut types = updated.upstream_spec().unwrap().logging_types.clone();
    types.sort();
    assert_eq!(types, vec!["api".to_string(), "audit".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn never_reconciling_cluster_times_out() {
    let api = FakeManagementApi::with_lag(u32::MAX);
    let created = create_hosted_cluster(&api, Provider::Eks, config("stuck"))
        .await
        .unwrap();
    let err = wait_until_cluster_is_ready(&api, &created).await.unwrap_err();
    assert!(err.is_convergence_timeout(), "{}", err);
    let message = err.to_string();
    assert!(message.contains("(false, false)"), "{}", message);
}

#[tokio::test(start_paused = true)]
async fn disabling_both_endpoints_is_rejected() {
    let api = FakeManagementApi::with_lag(0);
    let cluster = ready_cluster(&api, "access").await;
    let updates = api.update_count();

    let err = update_access(&api, &cluster, false, false, true)
        .await
        .unwrap_err();
    assert!(err.is_rejection(), "{}", err);
    assert!(!err.is_convergence_timeout());
    match err {
        Error::Rejected { message, .. } => assert!(message.contains("must be enabled")),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(api.update_count(), updates);
    let stored = api.peek(&cluster.id).unwrap();
    assert_eq!(stored.desired().public_access, Some(true));
}

#[tokio::test(start_paused = true)]
async fn security_groups_without_subnets_are_rejected() {
    let api = FakeManagementApi::with_lag(0);
    let cluster = ready_cluster(&api, "sg").await;

    let err = update_cluster(&api, &cluster, |c| {
        c.security_groups = vec!["sg-0123456789".to_string()];
        c.subnets.clear();
    })
    .await
    .unwrap_err();
    assert!(err.is_rejection(), "{}", err);
    assert!(err.to_string().contains("subnets must be provided"));
}

#[tokio::test(start_paused = true)]
async fn duplicate_node_group_names_match_either_wording() {
    for wording in [DuplicateWording::Legacy, DuplicateWording::Current] {
        let api = FakeManagementApi::with_lag(1).with_duplicate_wording(wording);
        let mut duplicate = config("duplicate");
        duplicate.node_groups = vec![node_group("dup"), node_group("dup"), node_group("dup")];
        let created = create_hosted_cluster(&api, Provider::Eks, duplicate)
            .await
            .unwrap();

        let flagged = wait_for_transitioning_error(
            &api,
            &created.id,
            &DUPLICATE_WORDINGS,
            ConvergenceWindow::VALIDATION_ERROR,
        )
        .await
        .unwrap();
        assert!(flagged.has_error_containing(&DUPLICATE_WORDINGS), "{:?}", wording);
        assert!(!flagged.is_active());
    }
}

#[tokio::test(start_paused = true)]
async fn provider_side_changes_are_synced_back() {
    let api = FakeManagementApi::with_lag(2);
    let cluster = ready_cluster(&api, "sync").await;

    assert!(api.change_on_provider(&cluster.id, |c| {
        c.kubernetes_version = Some("1.30".to_string());
    }));
    let synced = hosted_harness::operations::wait_for_upstream(
        &api,
        &cluster.id,
        "the provider upgrade to be synced",
        ConvergenceWindow::PROVIDER_SYNC,
        hosted_harness::wait::Condition::equals(Some("1.30".to_string())),
        |u| u.kubernetes_version.clone(),
    )
    .await
    .unwrap();
    assert_eq!(synced.desired().kubernetes_version.as_deref(), Some("1.30"));
}

#[tokio::test(start_paused = true)]
async fn logging_update_during_control_plane_upgrade() {
    let api = FakeManagementApi::with_lag(2);
    let cluster = ready_cluster(&api, "busy").await;

    let upgrading = upgrade_cluster_kubernetes_version(&api, &cluster, "1.30", false)
        .await
        .unwrap();
    let in_upgrade = wait_cluster_in_upgrade(&api, &upgrading.id).await.unwrap();
    assert!(in_upgrade.is_updating());
    assert_eq!(
        in_upgrade.upstream_spec().unwrap().kubernetes_version.as_deref(),
        Some("1.29")
    );

    let updated = update_logging(&api, &in_upgrade, &["api"], true)
        .await
        .unwrap();
    let upstream = updated.upstream_spec().unwrap();
    assert_eq!(upstream.logging_types, vec!["api".to_string()]);
    assert_eq!(upstream.kubernetes_version.as_deref(), Some("1.30"));
    assert_eq!(upstream.node_groups[0].version.as_deref(), Some("1.29"));
}

#[tokio::test(start_paused = true)]
async fn control_plane_then_node_groups_upgrade() {
    let api = FakeManagementApi::with_lag(1);
    let cluster = ready_cluster(&api, "upgrade").await;

    let cluster = upgrade_cluster_kubernetes_version(&api, &cluster, "1.30", true)
        .await
        .unwrap();
    let upstream = cluster.upstream_spec().unwrap();
    assert_eq!(upstream.kubernetes_version.as_deref(), Some("1.30"));
    assert_eq!(upstream.node_groups[0].version.as_deref(), Some("1.29"));

    let cluster = upgrade_node_kubernetes_version(&api, &cluster, "1.30", Checks::ALL)
        .await
        .unwrap();
    assert!(cluster.is_active());
    assert_eq!(
        cluster.upstream_spec().unwrap().node_groups[0].version.as_deref(),
        Some("1.30")
    );
}

#[tokio::test(start_paused = true)]
async fn node_group_beyond_control_plane_is_flagged() {
    let api = FakeManagementApi::with_lag(1);
    let cluster = ready_cluster(&api, "beyond").await;

    let accepted = upgrade_node_kubernetes_version(&api, &cluster, "1.30", Checks::NONE)
        .await
        .unwrap();
    let flagged = wait_for_transitioning_error(
        &api,
        &accepted.id,
        &["not compatible"],
        ConvergenceWindow::VALIDATION_ERROR,
    )
    .await
    .unwrap();
    assert!(flagged.transitioning_message.contains("[1.29]"));
}

#[tokio::test(start_paused = true)]
async fn node_groups_added_and_deleted() {
    let api = FakeManagementApi::with_lag(2);
    let cluster = ready_cluster(&api, "pools").await;

    let cluster = add_node_groups(&api, &cluster, 2, &node_group("template"), Checks::ALL)
        .await
        .unwrap();
    let names = cluster.upstream_spec().unwrap().node_group_names();
    assert_eq!(names.len(), 3);
    assert_eq!(names[2], "ng");
    assert!(names[..2].iter().all(|n| n != "template"));

    let cluster = delete_node_group(&api, &cluster, Checks::ALL).await.unwrap();
    assert_eq!(cluster.upstream_spec().unwrap().node_group_names(), vec![names[0].clone()]);
}

#[tokio::test(start_paused = true)]
async fn public_access_sources_are_added() {
    let api = FakeManagementApi::with_lag(1);
    let cluster = ready_cluster(&api, "cidrs").await;

    let sources = vec!["203.0.113.0/24".to_string()];
    let cluster = update_public_access_sources(&api, &cluster, &sources, true)
        .await
        .unwrap();
    assert_eq!(cluster.upstream_spec().unwrap().public_access_sources, sources);
}

#[tokio::test(start_paused = true)]
async fn tags_and_labels_are_removed_again() {
    let api = FakeManagementApi::with_lag(1);
    let cluster = ready_cluster(&api, "tags").await;
    let original = btreemap! {"owner".to_string() => "hosted".to_string()};
    let added = btreemap! {
        "owner".to_string() => "hosted".to_string(),
        "foo".to_string() => "bar".to_string(),
    };

    let cluster = update_cluster_tags(&api, &cluster, &original, true).await.unwrap();
    let cluster = update_cluster_tags(&api, &cluster, &added, true).await.unwrap();
    assert_eq!(cluster.upstream_spec().unwrap().tags, added);
    let cluster = update_cluster_tags(&api, &cluster, &original, true).await.unwrap();
    assert_eq!(cluster.upstream_spec().unwrap().tags, original);

    let labels = btreemap! {"testCaseID".to_string() => "142".to_string()};
    let cluster = update_node_group_metadata(&api, &cluster, &added, &labels, true)
        .await
        .unwrap();
    let cluster = update_node_group_metadata(&api, &cluster, &original, &Default::default(), true)
        .await
        .unwrap();
    let ng = &cluster.upstream_spec().unwrap().node_groups[0];
    assert_eq!(ng.tags, original);
    assert!(ng.labels.is_empty());
}
