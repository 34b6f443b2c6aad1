use anyhow::{bail, Context};
use bank_data_scraping_utils::{
    credentials::{Credentials, Email, Password},
    selector,
};
use itertools::Itertools;
use log::{debug, info, warn};
use scraper::Html;
use serde::Serialize;
use url::Url;

use crate::{config::UpstreamConfig, session::Session};

/// Produces a freshly logged-in session.
pub trait Authenticator {
    /// `Ok(None)` means the portal rejected the login (wrong credentials, unexpected page).
    /// `Err` is reserved for transport errors and pages that cannot be scraped at all.
    async fn login(&self) -> anyhow::Result<Option<Session>>;
}

/// Logs in to the bank account data portal the way a browser does:
/// the portal redirects to the identity provider, which accepts the credentials as JSON
/// and answers with a self-submitting form that carries the result back to the portal.
pub struct GoCardlessAuthenticator {
    upstream: UpstreamConfig,
    credentials: Credentials,
}

impl GoCardlessAuthenticator {
    pub fn new(upstream: UpstreamConfig, credentials: Credentials) -> Self {
        Self {
            upstream,
            credentials,
        }
    }
}

impl Authenticator for GoCardlessAuthenticator {
    async fn login(&self) -> anyhow::Result<Option<Session>> {
        info!("Trying to log in.");
        let session = Session::new()?;
        let client = session.reqwest();

        let response = client
            .get(self.upstream.login_url.clone())
            .send()
            .await?;
        let state = extract_state(response.url())?;
        debug!("Obtained the login state token.");

        let payload = LoginPayload::new(&self.upstream, &self.credentials, &state);
        let response = client
            .post(self.upstream.token_endpoint.clone())
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let page_url = response.url().clone();
        let form = parse_hidden_form(
            &Html::parse_document(&response.text().await?),
            &self.upstream.form_name,
            &page_url,
        )?;
        let Some(form) = form else {
            warn!("The identity provider did not return the callback form (status {status}).");
            return Ok(None);
        };
        debug!(
            "Submitting {} callback fields to {}",
            form.fields.len(),
            form.action
        );

        let response = client.post(form.action).form(&form.fields).send().await?;
        let response = client.get(response.url().clone()).send().await?;
        let landing_url = response.url().clone();
        if response.text().await?.contains(&self.upstream.success_marker) {
            info!("Successfully logged in.");
            Ok(Some(session))
        } else {
            warn!("Login did not reach the portal; ended at {landing_url}");
            Ok(None)
        }
    }
}

/// The one-time `state` parameter the identity provider was given by the portal.
pub fn extract_state(url: &Url) -> anyhow::Result<String> {
    match url.query_pairs().find(|(key, _)| key == "state") {
        Some((_, state)) => Ok(state.into_owned()),
        None => bail!("The login page did not redirect with a `state` parameter: {url}"),
    }
}

#[derive(Debug, Serialize)]
struct LoginPayload<'a> {
    client_id: &'a str,
    redirect_uri: &'a str,
    tenant: &'a str,
    response_type: &'static str,
    scope: &'static str,
    state: &'a str,
    connection: &'a str,
    username: &'a Email,
    password: &'a Password,
    sso: &'static str,
    protocol: &'static str,
    #[serde(rename = "_intstate")]
    intstate: &'static str,
}
impl<'a> LoginPayload<'a> {
    fn new(upstream: &'a UpstreamConfig, credentials: &'a Credentials, state: &'a str) -> Self {
        Self {
            client_id: &upstream.client_id,
            redirect_uri: upstream.redirect_uri.as_str(),
            tenant: &upstream.tenant,
            response_type: "code",
            scope: "openid profile email",
            state,
            connection: &upstream.connection,
            username: &credentials.email,
            password: &credentials.password,
            sso: "true",
            protocol: "oauth2",
            intstate: "deprecated",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct HiddenForm {
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

/// Finds the form called `form_name` and collects what a browser would submit from it.
///
/// Returns `None` if there is no such form.
pub fn parse_hidden_form(
    html: &Html,
    form_name: &str,
    page_url: &Url,
) -> anyhow::Result<Option<HiddenForm>> {
    let Some(form) = html
        .select(selector!("form"))
        .find(|form| form.value().attr("name") == Some(form_name))
    else {
        return Ok(None);
    };
    let action = form
        .value()
        .attr("action")
        .with_context(|| format!("The form {form_name:?} has no action"))?;
    let action = page_url
        .join(action)
        .with_context(|| format!("Invalid form action: {action:?}"))?;
    let fields = form
        .select(selector!("input"))
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_owned(), value.to_owned()))
        })
        .collect_vec();
    Ok(Some(HiddenForm { action, fields }))
}
