use std::{path::PathBuf, time::Duration};

use chrono::TimeDelta;
use serde::Deserialize;
use url::Url;

use crate::{store::StoreConfig, transactions::DEFAULT_LIMIT};

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub port: u16,
    #[serde(default = "default_route")]
    pub route: String,

    pub store: StoreConfig,
    #[serde(default)]
    pub keys: StoreKeys,

    /// JSON file with `email` and `password`, typically mounted from a secret store.
    pub credentials_path: PathBuf,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// The feed download of one linked account.
    pub transactions_url: Url,

    #[serde(default = "default_rate_limit_seconds")]
    rate_limit_seconds: f64,
    #[serde(default = "default_session_ttl_minutes")]
    session_ttl_minutes: i64,
    #[serde(default = "default_transaction_limit")]
    pub transaction_limit: usize,
}

impl Config {
    pub fn rate_limit_interval(&self) -> anyhow::Result<Duration> {
        Ok(Duration::try_from_secs_f64(self.rate_limit_seconds)?)
    }

    pub fn session_ttl(&self) -> anyhow::Result<TimeDelta> {
        TimeDelta::try_minutes(self.session_ttl_minutes).ok_or_else(|| {
            anyhow::anyhow!(
                "session_ttl_minutes is out of range: {}",
                self.session_ttl_minutes
            )
        })
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_owned()
}
fn default_route() -> String {
    "/".to_owned()
}
fn default_rate_limit_seconds() -> f64 {
    5.
}
fn default_session_ttl_minutes() -> i64 {
    60
}
fn default_transaction_limit() -> usize {
    DEFAULT_LIMIT
}

/// Names of the entries kept in the store.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreKeys {
    pub last_request_time: String,
    pub session: String,
}
impl Default for StoreKeys {
    fn default() -> Self {
        Self {
            last_request_time: "last_request_time".to_owned(),
            session: "gocardless_session".to_owned(),
        }
    }
}

/// Endpoints and identifiers of the portal and its identity provider.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    pub login_url: Url,
    pub token_endpoint: Url,
    pub redirect_uri: Url,
    pub client_id: String,
    pub tenant: String,
    pub connection: String,
    /// `name` of the self-submitting form returned after a successful credential check.
    pub form_name: String,
    /// Text that only appears on the portal once logged in.
    pub success_marker: String,
}
impl Default for UpstreamConfig {
    fn default() -> Self {
        let url = |s: &str| Url::parse(s).expect("Hard-coded URL is invalid");
        Self {
            login_url: url(concat!(
                "https://bankaccountdata.gocardless.com/login",
                "?pd&utm_source=gc_payments&utm_medium=product&utm_campaign=p_bad_signin_page",
            )),
            token_endpoint: url("https://auth0.gocardless.com/usernamepassword/login"),
            redirect_uri: url("https://bankaccountdata.gocardless.com/complete/auth0/"),
            client_id: "30l50SqMzsszNZuzElA3L3wBZhPdTTz9".to_owned(),
            tenant: "gocardless-live-production".to_owned(),
            connection: "custom-database".to_owned(),
            form_name: "hiddenform".to_owned(),
            success_marker:
                "Bank Account Data portal will let you configure your project settings."
                    .to_owned(),
        }
    }
}
