// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`Config`] loaded from them
//! once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the redb database | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `GAE_INSTANCE` | Set on managed hosting; selects the Compute access session | unset |
//! | `REMOTE_NETWORK_TAG` | Network tag of the WebDriver instance | `selenium` |
//! | `MOCK_REMOTE_ADDRESS` | WebDriver endpoint when running unmanaged | `localhost:4444` |
//! | `GCP_PROJECT_ID` | Project id override (else metadata server) | unset |
//! | `GCP_ACCESS_TOKEN` | Static bearer token (else metadata server) | unset |
//! | `WEBDRIVER_HEADLESS` | Run the remote browser headless | `true` |

use std::path::PathBuf;

use crate::session::ComputeConfig;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Presence of this variable marks managed infrastructure. Its value is ignored.
pub const GAE_INSTANCE_ENV: &str = "GAE_INSTANCE";

pub const REMOTE_NETWORK_TAG_ENV: &str = "REMOTE_NETWORK_TAG";
pub const MOCK_REMOTE_ADDRESS_ENV: &str = "MOCK_REMOTE_ADDRESS";
pub const GCP_PROJECT_ID_ENV: &str = "GCP_PROJECT_ID";
pub const GCP_ACCESS_TOKEN_ENV: &str = "GCP_ACCESS_TOKEN";
pub const WEBDRIVER_HEADLESS_ENV: &str = "WEBDRIVER_HEADLESS";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REMOTE_NETWORK_TAG: &str = "selenium";
pub const DEFAULT_MOCK_REMOTE_ADDRESS: &str = "localhost:4444";

/// Database file name inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "reloader.redb";

/// Most card aliases kept in memory.
pub const ALIAS_CACHE_CAPACITY: usize = 256;

/// Transactions shown on the status page.
pub const STATUS_PAGE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub managed_infrastructure: bool,
    pub remote_network_tag: String,
    pub mock_remote_address: String,
    pub gcp_project_id: Option<String>,
    pub gcp_access_token: Option<String>,
    pub webdriver_headless: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let optional = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let or_default = |name: &str, default: &str| {
            optional(name).unwrap_or_else(|| default.to_string())
        };

        Self {
            data_dir: PathBuf::from(or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            host: or_default(HOST_ENV, DEFAULT_HOST),
            port: optional(PORT_ENV)
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            log_format: match optional(LOG_FORMAT_ENV).as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            managed_infrastructure: lookup(GAE_INSTANCE_ENV).is_some(),
            remote_network_tag: or_default(REMOTE_NETWORK_TAG_ENV, DEFAULT_REMOTE_NETWORK_TAG),
            mock_remote_address: or_default(MOCK_REMOTE_ADDRESS_ENV, DEFAULT_MOCK_REMOTE_ADDRESS),
            gcp_project_id: optional(GCP_PROJECT_ID_ENV),
            gcp_access_token: optional(GCP_ACCESS_TOKEN_ENV),
            webdriver_headless: !matches!(
                optional(WEBDRIVER_HEADLESS_ENV)
                    .map(|v| v.to_ascii_lowercase())
                    .as_deref(),
                Some("false" | "0" | "no" | "off")
            ),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn compute_config(&self) -> ComputeConfig {
        ComputeConfig {
            project_id: self.gcp_project_id.clone(),
            access_token: self.gcp_access_token.clone(),
            ..ComputeConfig::default()
        }
    }
}
