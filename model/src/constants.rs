/// Helper macro to avoid retyping the prefix shared by every cluster the harness creates. When
/// given no parameters, this returns the prefix itself. When given a string literal parameter it
/// adds `-parameter` to the end.
macro_rules! hosted {
    () => {
        "auto"
    };
    ($s:literal) => {
        concat!(hosted!(), "-", $s)
    };
}

// Naming
pub const CLUSTER_NAME_PREFIX: &str = hosted!("hosted");
pub const NODE_GROUP_NAME_PREFIX: &str = "ng";
pub const EKSCTL_NODE_GROUP_NAME: &str = "ranchernodes";

// Management API
pub const CLUSTERS_PATH: &str = "v3/clusters";
pub const TOKENS_PATH: &str = "v3/tokens";
pub const GKE_VERSIONS_PATH: &str = "meta/gkeVersions";

// Cluster lifecycle states reported by the management API
pub const STATE_ACTIVE: &str = "active";
pub const STATE_UPDATING: &str = "updating";
pub const STATE_UPGRADING: &str = "upgrading";
pub const STATE_PROVISIONING: &str = "provisioning";

// Provider defaults
pub const DEFAULT_EKS_REGION: &str = "us-west-2";
pub const DEFAULT_GKE_ZONE: &str = "asia-south2-c";
pub const DOCKER_ROOT_DIR: &str = "/var/lib/docker";

// Tags added to every cluster so that leaked resources can be traced back to the harness
pub const TAG_OWNER: &str = "owner";
pub const TAG_OWNER_VALUE: &str = hosted!("e2e");
pub const TAG_CLUSTER_NAME: &str = "cluster-name";

// Environment variables
pub const ENV_KUBECONFIG: &str = "KUBECONFIG";
pub const ENV_CONFIG_PATH: &str = "CATTLE_TEST_CONFIG";
