// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compute Engine access session.
//!
//! ## Flow
//!
//! ```text
//! open(tag)
//!   GET  self-IP service                      -> 203.0.113.7
//!   GET  global/firewalls?filter=name = ".."  -> exists?
//!   PATCH global/firewalls/{name}             (exists)
//!   POST  global/firewalls                    (missing)
//!   GET  aggregated/instances                 -> first RUNNING, tagged, NAT'd
//! close()
//!   PATCH global/firewalls/{name} {"disabled": true}
//! ```
//!
//! Authentication uses the instance metadata server unless a project id and
//! bearer token are configured explicitly.
//!
//! Firewall writes return a long-running operation that is not awaited: the
//! rule normally propagates well before the WebDriver session is created.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{AccessSession, SessionError, SessionHandle, WEBDRIVER_PORT};

/// Name of the single ingress rule owned by this service.
pub const GRANT_NAME: &str = "temporary-compute-session-handle";

/// Rule priority. Lower wins; 1000 is the platform default.
pub const GRANT_PRIORITY: u32 = 1000;

/// Network the rule applies to.
pub const GRANT_NETWORK: &str = "global/networks/default";

/// Service answering with the caller's public address as plain text.
pub const SELF_IP_URL: &str = "https://checkip.amazonaws.com/";

pub const DEFAULT_COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";
pub const DEFAULT_METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

/// Per-request timeout for every Compute, metadata and self-IP call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh metadata tokens this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ComputeApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("self IP service returned {0:?}")]
    InvalidSelfIp(String),
}

/// Where to reach the platform APIs and how to authenticate.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub compute_base_url: String,
    pub metadata_base_url: String,
    pub self_ip_url: String,
    /// Overrides the metadata server's project id.
    pub project_id: Option<String>,
    /// Static bearer token. Overrides metadata server tokens.
    pub access_token: Option<String>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            compute_base_url: DEFAULT_COMPUTE_BASE_URL.to_string(),
            metadata_base_url: DEFAULT_METADATA_BASE_URL.to_string(),
            self_ip_url: SELF_IP_URL.to_string(),
            project_id: None,
            access_token: None,
        }
    }
}

// =============================================================================
// API Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
struct FirewallList {
    #[serde(default)]
    items: Vec<Firewall>,
}

#[derive(Debug, Deserialize)]
struct Firewall {
    name: String,
}

/// Scopes are keyed by zone; iteration is in zone-name order.
#[derive(Debug, Deserialize)]
struct AggregatedInstances {
    #[serde(default)]
    items: BTreeMap<String, InstancesScopedList>,
}

#[derive(Debug, Deserialize)]
struct InstancesScopedList {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instance {
    #[serde(default)]
    status: String,
    #[serde(default)]
    tags: Option<Tags>,
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Deserialize)]
struct Tags {
    #[serde(default)]
    items: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    #[serde(default)]
    access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfig {
    #[serde(default)]
    name: String,
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

impl Instance {
    fn is_running_with_tag(&self, tag: &str) -> bool {
        self.status == "RUNNING"
            && self
                .tags
                .as_ref()
                .is_some_and(|tags| tags.items.iter().any(|t| t == tag))
    }

    fn external_nat_ip(&self) -> Option<&str> {
        self.network_interfaces
            .iter()
            .flat_map(|iface| &iface.access_configs)
            .find(|config| config.name == "External NAT")
            .and_then(|config| config.nat_ip.as_deref())
    }
}

/// The rule body written on open. Patching with the full body also re-enables it.
fn grant_rule(self_ip: IpAddr, tag: &str) -> Value {
    let prefix = if self_ip.is_ipv4() { 32 } else { 128 };
    json!({
        "name": GRANT_NAME,
        "description": format!("Temporary handle to {tag} compute session instance."),
        "network": GRANT_NETWORK,
        "priority": GRANT_PRIORITY,
        "direction": "INGRESS",
        "sourceRanges": [format!("{self_ip}/{prefix}")],
        "targetTags": [tag],
        "allowed": [{ "IPProtocol": "tcp", "ports": [WEBDRIVER_PORT.to_string()] }],
        "logConfig": { "enable": true },
        "disabled": false,
    })
}

// =============================================================================
// Compute Session
// =============================================================================

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Access session backed by a Compute Engine firewall rule.
#[derive(Clone)]
pub struct ComputeSession {
    client: reqwest::Client,
    config: ComputeConfig,
    token: Arc<RwLock<Option<CachedToken>>>,
    project: Arc<RwLock<Option<String>>>,
}

impl ComputeSession {
    pub fn new(config: ComputeConfig) -> Result<Self, ComputeApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            project: Arc::new(RwLock::new(config.project_id.clone())),
            config,
            token: Arc::new(RwLock::new(None)),
        })
    }

    fn compute_url(&self, project: &str, path: &str) -> String {
        format!(
            "{}/projects/{project}/{path}",
            self.config.compute_base_url.trim_end_matches('/')
        )
    }

    fn metadata_url(&self, path: &str) -> String {
        format!(
            "{}/{path}",
            self.config.metadata_base_url.trim_end_matches('/')
        )
    }

    async fn check(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComputeApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ComputeApiError::Status {
            endpoint,
            status: status.as_u16(),
            body,
        })
    }

    async fn metadata_get(
        &self,
        endpoint: &'static str,
        path: &str,
    ) -> Result<reqwest::Response, ComputeApiError> {
        let response = self
            .client
            .get(self.metadata_url(path))
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        Self::check(endpoint, response).await
    }

    async fn project_id(&self) -> Result<String, ComputeApiError> {
        if let Some(project) = &*self.project.read().await {
            return Ok(project.clone());
        }
        let project = self
            .metadata_get("metadata project-id", "project/project-id")
            .await?
            .text()
            .await?
            .trim()
            .to_string();
        *self.project.write().await = Some(project.clone());
        Ok(project)
    }

    async fn bearer_token(&self) -> Result<String, ComputeApiError> {
        if let Some(token) = &self.config.access_token {
            return Ok(token.clone());
        }
        {
            let cache = self.token.read().await;
            if let Some(entry) = &*cache {
                if Instant::now() < entry.expires_at {
                    return Ok(entry.value.clone());
                }
            }
        }

        let token: MetadataToken = self
            .metadata_get("metadata token", "instance/service-accounts/default/token")
            .await?
            .json()
            .await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *self.token.write().await = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// This host's public address as seen from the internet.
    async fn self_ip(&self) -> Result<IpAddr, ComputeApiError> {
        let response = self.client.get(&self.config.self_ip_url).send().await?;
        let text = Self::check("self IP service", response).await?.text().await?;
        let trimmed = text.trim();
        trimmed
            .parse()
            .map_err(|_| ComputeApiError::InvalidSelfIp(trimmed.to_string()))
    }

    async fn grant_exists(&self, project: &str, token: &str) -> Result<bool, ComputeApiError> {
        let response = self
            .client
            .get(self.compute_url(project, "global/firewalls"))
            .bearer_auth(token)
            .query(&[("filter", format!("name = \"{GRANT_NAME}\""))])
            .send()
            .await?;
        let list: FirewallList = Self::check("firewalls.list", response).await?.json().await?;
        Ok(list.items.iter().any(|rule| rule.name == GRANT_NAME))
    }

    async fn patch_grant(
        &self,
        project: &str,
        token: &str,
        body: &Value,
    ) -> Result<(), ComputeApiError> {
        let response = self
            .client
            .patch(self.compute_url(project, &format!("global/firewalls/{GRANT_NAME}")))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Self::check("firewalls.patch", response).await?;
        Ok(())
    }

    /// Create the rule, or point the existing one at `self_ip` and enable it.
    async fn upsert_grant(&self, self_ip: IpAddr, tag: &str) -> Result<(), ComputeApiError> {
        let project = self.project_id().await?;
        let token = self.bearer_token().await?;
        let rule = grant_rule(self_ip, tag);

        if self.grant_exists(&project, &token).await? {
            debug!(grant = GRANT_NAME, "Patching existing access grant");
            self.patch_grant(&project, &token, &rule).await?;
        } else {
            debug!(grant = GRANT_NAME, "Creating access grant");
            let response = self
                .client
                .post(self.compute_url(&project, "global/firewalls"))
                .bearer_auth(&token)
                .json(&rule)
                .send()
                .await?;
            Self::check("firewalls.insert", response).await?;
        }

        info!(grant = GRANT_NAME, source = %self_ip, target_tag = tag, "Access grant enabled");
        Ok(())
    }

    /// External NAT address of the first running instance carrying `tag`.
    async fn find_instance_ip(&self, tag: &str) -> Result<Option<String>, ComputeApiError> {
        let project = self.project_id().await?;
        let token = self.bearer_token().await?;
        let response = self
            .client
            .get(self.compute_url(&project, "aggregated/instances"))
            .bearer_auth(&token)
            .send()
            .await?;
        let aggregated: AggregatedInstances = Self::check("instances.aggregatedList", response)
            .await?
            .json()
            .await?;

        Ok(aggregated
            .items
            .values()
            .flat_map(|scope| &scope.instances)
            .filter(|instance| instance.is_running_with_tag(tag))
            .find_map(|instance| instance.external_nat_ip())
            .map(str::to_string))
    }
}

impl AccessSession for ComputeSession {
    async fn open(&self, target_tag: &str) -> Result<SessionHandle, SessionError> {
        let self_ip = self.self_ip().await.map_err(SessionError::Acquisition)?;
        self.upsert_grant(self_ip, target_tag)
            .await
            .map_err(SessionError::Acquisition)?;

        match self
            .find_instance_ip(target_tag)
            .await
            .map_err(SessionError::Acquisition)?
        {
            Some(ip) => Ok(SessionHandle::new(format!("{ip}:{WEBDRIVER_PORT}"))),
            None => Err(SessionError::NoEndpoint {
                tag: target_tag.to_string(),
            }),
        }
    }

    async fn close(&self) -> Result<(), SessionError> {
        let project = self.project_id().await.map_err(SessionError::Release)?;
        let token = self.bearer_token().await.map_err(SessionError::Release)?;
        self.patch_grant(&project, &token, &json!({ "disabled": true }))
            .await
            .map_err(SessionError::Release)?;
        info!(grant = GRANT_NAME, "Access grant disabled");
        Ok(())
    }

    fn is_remote(&self) -> bool {
        true
    }
}
