use crate::clients::error::{self, Result};
use crate::clients::management_client::Token;
use crate::clients::wire::{from_wire, merge_for_update, to_wire};
use crate::clients::{Error, ManagementClient, StatusCode};
use crate::constants::{CLUSTERS_PATH, GKE_VERSIONS_PATH, TOKENS_PATH};
use crate::{ClusterConfig, ClusterResource, Provider};
use log::{debug, trace};
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use snafu::ResultExt;
use url::Url;

/// A [`ManagementClient`] that talks to the management API's `v3` REST endpoints using an admin
/// bearer token.
#[derive(Clone, Debug)]
pub struct RancherClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl RancherClient {
    /// `host` may be a bare hostname or a full url. Bare hostnames are reached over https. When
    /// `insecure` is set, the server's certificate is not verified.
    pub fn new<S1, S2>(host: S1, admin_token: S2, insecure: bool) -> Result<Self>
    where
        S1: AsRef<str>,
        S2: Into<String>,
    {
        let host = host.as_ref().trim_end_matches('/');
        let url = if host.contains("://") {
            format!("{}/", host)
        } else {
            format!("https://{}/", host)
        };
        let base = Url::parse(&url).context(error::UrlSnafu { url: &url })?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()
            .context(error::InitializationSnafu)?;
        Ok(Self {
            http,
            base,
            token: admin_token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self
            .base
            .join(path)
            .context(error::UrlSnafu { url: path })?)
    }

    fn cluster_url(&self, id: &str) -> Result<Url> {
        self.endpoint(&format!("{}/{}", CLUSTERS_PATH, id))
    }

    async fn send(&self, request: RequestBuilder, method: &str, what: &str) -> Result<Value> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .context(error::RequestSnafu { method, what })?;
        read_response(response, method, what).await
    }

    /// GKE versions depend on the project and location, and are looked up with the cluster's
    /// cloud credential.
    fn gke_versions_url(&self, config: &ClusterConfig) -> Result<Url> {
        let mut url = self.endpoint(GKE_VERSIONS_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("cloudCredentialId", &config.cloud_credential);
            if let Some(project) = &config.project_id {
                query.append_pair("projectId", project);
            }
            if let Some(region) = &config.region {
                query.append_pair("region", region);
            } else if let Some(zone) = &config.zone {
                query.append_pair("zone", zone);
            }
        }
        Ok(url)
    }

    /// The cluster object exactly as the API stores it, including fields the model ignores.
    async fn get_raw(&self, id: &str) -> Result<Value> {
        let url = self.cluster_url(id)?;
        self.send(self.http.get(url), "get", &format!("cluster '{}'", id))
            .await
    }
}

async fn read_response(response: Response, method: &str, what: &str) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .context(error::RequestSnafu { method, what })?;
    trace!("{} {} responded {}: {}", method, what, status, body);
    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        return Ok(serde_json::from_str(&body).context(error::SerdeSnafu { what })?);
    }
    match status {
        StatusCode::NOT_FOUND => Err(Error::not_found(what)),
        status if status.is_client_error() && !is_auth_failure(status) => {
            Err(Error::rejected(status, api_message(&body)))
        }
        status => Err(error::StatusSnafu {
            method,
            what,
            status,
        }
        .build()
        .into()),
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Extracts the `message` field from an API error body, falling back to the raw body.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// The control plane versions from a `gkeVersions` response.
fn valid_master_versions(value: &Value) -> Vec<String> {
    value
        .get("validMasterVersions")
        .and_then(Value::as_array)
        .map(|versions| {
            versions
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_cluster(value: Value, what: &str) -> Result<ClusterResource> {
    Ok(from_wire(value).context(error::SerdeSnafu { what })?)
}

#[async_trait::async_trait]
impl ManagementClient for RancherClient {
    async fn create(&self, cluster: &ClusterResource) -> Result<ClusterResource> {
        let what = format!("cluster '{}'", cluster.name);
        let body = to_wire(cluster).context(error::SerdeSnafu { what: &what })?;
        debug!("Creating {}", what);
        let url = self.endpoint(CLUSTERS_PATH)?;
        let created = self.send(self.http.post(url).json(&body), "create", &what).await?;
        parse_cluster(created, &what)
    }

    async fn update(&self, cluster: &ClusterResource) -> Result<ClusterResource> {
        let what = format!("cluster '{}'", cluster.id);
        let raw = self.get_raw(&cluster.id).await?;
        let desired = to_wire(cluster).context(error::SerdeSnafu { what: &what })?;
        let body = merge_for_update(raw, desired);
        debug!("Updating {}", what);
        let url = self.cluster_url(&cluster.id)?;
        let updated = self.send(self.http.put(url).json(&body), "update", &what).await?;
        parse_cluster(updated, &what)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let what = format!("cluster '{}'", id);
        debug!("Deleting {}", what);
        let url = self.cluster_url(id)?;
        self.send(self.http.delete(url), "delete", &what).await?;
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<ClusterResource> {
        let what = format!("cluster '{}'", id);
        let raw = self.get_raw(id).await?;
        parse_cluster(raw, &what)
    }

    async fn create_token(&self, description: &str) -> Result<Token> {
        let what = "token";
        let url = self.endpoint(TOKENS_PATH)?;
        let body = json!({"type": "token", "description": description});
        let value = self.send(self.http.post(url).json(&body), "create", what).await?;
        let token: Token = serde_json::from_value(value).context(error::SerdeSnafu { what })?;
        if token.token.is_empty() {
            return Err(error::ResponseSnafu {
                what: "the created token has no bearer value",
            }
            .build()
            .into());
        }
        Ok(token)
    }

    async fn kubernetes_versions(&self, template: &ClusterResource) -> Result<Vec<String>> {
        // EKS versions are not published by the management API.
        if template.provider != Provider::Gke {
            return Ok(Vec::new());
        }
        let what = "GKE versions";
        let url = self.gke_versions_url(&template.desired())?;
        let value = self.send(self.http.get(url), "get", what).await?;
        Ok(valid_master_versions(&value))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bare_host_uses_https() {
        let client = RancherClient::new("rancher.example.com", "token-abc:secret", false).unwrap();
        assert_eq!(client.base_url().as_str(), "https://rancher.example.com/");
        assert_eq!(
            client.cluster_url("c-123").unwrap().as_str(),
            "https://rancher.example.com/v3/clusters/c-123"
        );
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let client = RancherClient::new("http://localhost:8080/", "t", true).unwrap();
        assert_eq!(
            client.endpoint(TOKENS_PATH).unwrap().as_str(),
            "http://localhost:8080/v3/tokens"
        );
    }

    #[test]
    fn api_message_prefers_message_field() {
        let body = r#"{"type":"error","status":422,"code":"InvalidBodyContent","message":"subnets must be provided if security groups are provided"}"#;
        assert_eq!(
            api_message(body),
            "subnets must be provided if security groups are provided"
        );
        assert_eq!(api_message(" plain text "), "plain text");
    }

    #[test]
    fn gke_versions_are_queried_by_location() {
        let client = RancherClient::new("rancher.example.com", "t", false).unwrap();
        let zonal = ClusterConfig {
            cloud_credential: "cattle-global-data:cc-abcde".to_string(),
            project_id: Some("project".to_string()),
            zone: Some("asia-south2-c".to_string()),
            ..Default::default()
        };
        assert_eq!(
            client.gke_versions_url(&zonal).unwrap().as_str(),
            "https://rancher.example.com/meta/gkeVersions?cloudCredentialId=cattle-global-data%3Acc-abcde&projectId=project&zone=asia-south2-c"
        );
        let regional = ClusterConfig {
            region: Some("asia-south2".to_string()),
            ..zonal
        };
        let url = client.gke_versions_url(&regional).unwrap();
        assert!(url.as_str().ends_with("&region=asia-south2"), "{}", url);
    }

    #[test]
    fn master_versions_are_read_from_response() {
        let response = json!({
            "defaultClusterVersion": "1.30.4-gke.1",
            "validMasterVersions": ["1.31.1-gke.2", "1.30.4-gke.1"],
            "validNodeVersions": ["1.31.1-gke.2", "1.30.4-gke.1", "1.29.8-gke.1"]
        });
        assert_eq!(
            valid_master_versions(&response),
            vec!["1.31.1-gke.2".to_string(), "1.30.4-gke.1".to_string()]
        );
        assert!(valid_master_versions(&json!({})).is_empty());
    }
}
