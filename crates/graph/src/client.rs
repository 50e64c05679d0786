//! Versioned Graph API client.
//!
//! Every authenticated call carries the access token plus an
//! `appsecret_proof` supplied by a [`RequestSigner`], and every call honors a
//! caller-supplied [`Deadline`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    hmac::{Hmac, Mac},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, de::DeserializeOwned},
    sha2::Sha256,
    tokio::time::Instant,
    tracing::debug,
};

use crate::{
    batch::BATCH_LIMIT,
    error::{Error, GraphError, Result},
};

type HmacSha256 = Hmac<Sha256>;

/// Upper bound on followed `paging.next` links for a single edge read.
const MAX_PAGES: usize = 100;

/// Point in time after which an outbound call must not be attempted.
/// `None` means the call is only bounded by the HTTP client defaults.
pub type Deadline = Option<Instant>;

/// Produces the per-token request signing proof.
pub trait RequestSigner: Send + Sync {
    fn proof(&self, access_token: &str) -> String;
}

/// `hex(HMAC-SHA256(key = app secret, message = access token))`.
#[must_use]
pub fn appsecret_proof(app_secret: &str, access_token: &str) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(access_token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Base URL and API version of the Graph API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEndpoint {
    pub base_url: String,
    pub version: String,
}

impl GraphEndpoint {
    #[must_use]
    pub fn new(base_url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            version: version.into(),
        }
    }

    /// `<base>/<version>` or `<base>/<version>/<path>`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{}/{}", self.base_url, self.version)
        } else {
            format!("{}/{}/{}", self.base_url, self.version, path)
        }
    }
}

#[derive(Deserialize)]
struct EdgePage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: GraphError,
}

/// Graph API client shared by the token broker and the platform crates.
#[derive(Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    endpoint: GraphEndpoint,
    signer: Arc<dyn RequestSigner>,
}

impl GraphClient {
    pub fn new(endpoint: GraphEndpoint, signer: Arc<dyn RequestSigner>) -> Self {
        Self::with_http(reqwest::Client::new(), endpoint, signer)
    }

    pub fn with_http(
        http: reqwest::Client,
        endpoint: GraphEndpoint,
        signer: Arc<dyn RequestSigner>,
    ) -> Self {
        Self {
            http,
            endpoint,
            signer,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &GraphEndpoint {
        &self.endpoint
    }

    /// `access_token` and `appsecret_proof` parameters for `token`.
    #[must_use]
    pub fn auth_params(&self, token: &Secret<String>) -> Vec<(String, String)> {
        let token = token.expose_secret();
        vec![
            ("access_token".to_string(), token.clone()),
            ("appsecret_proof".to_string(), self.signer.proof(token)),
        ]
    }

    /// GET `path` with query `params`, decoding either `T` or the error envelope.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        token: Option<&Secret<String>>,
        deadline: Deadline,
    ) -> Result<T> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        if let Some(token) = token {
            query.extend(self.auth_params(token));
        }
        let req = self.http.get(self.endpoint.url(path)).query(&query);
        let body = self.send(req, deadline).await?;
        decode_response(path, &body)
    }

    /// Read several nodes with `GET ?ids=a,b&fields=...`, at most
    /// [`BATCH_LIMIT`] ids per call.
    ///
    /// Each response is an object keyed by node id. Ids the caller cannot see
    /// are reported by the remote side as an error for the whole call.
    pub async fn get_nodes<T: DeserializeOwned>(
        &self,
        ids: &[String],
        fields: &str,
        token: &Secret<String>,
        deadline: Deadline,
    ) -> Result<HashMap<String, T>> {
        let mut nodes = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_LIMIT) {
            let ids = chunk.join(",");
            let page: HashMap<String, T> = self
                .get("", &[("ids", ids.as_str()), ("fields", fields)], Some(token), deadline)
                .await?;
            nodes.extend(page);
        }
        Ok(nodes)
    }

    /// Read every item of an edge, following `paging.next` links.
    pub async fn get_edge<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: &str,
        token: &Secret<String>,
        deadline: Deadline,
    ) -> Result<Vec<T>> {
        let first: EdgePage<T> = self
            .get(path, &[("fields", fields)], Some(token), deadline)
            .await?;
        let mut items = first.data;
        let mut next = first.paging.and_then(|p| p.next);

        for _ in 1..MAX_PAGES {
            let Some(url) = next.take() else {
                break;
            };
            debug!(path, "following edge page");
            let body = self.send(self.http.get(url), deadline).await?;
            let page: EdgePage<T> = decode_response(path, &body)?;
            items.extend(page.data);
            next = page.paging.and_then(|p| p.next);
        }

        Ok(items)
    }

    /// POST a form to `path` and return the raw response body.
    pub async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
        deadline: Deadline,
    ) -> Result<Vec<u8>> {
        let req = self.http.post(self.endpoint.url(path)).form(form);
        self.send(req, deadline).await
    }

    async fn send(&self, req: reqwest::RequestBuilder, deadline: Deadline) -> Result<Vec<u8>> {
        let req = match remaining(deadline)? {
            Some(timeout) => req.timeout(timeout),
            None => req,
        };
        let resp = req.send().await.map_err(|e| timeout_or(e, deadline))?;
        let bytes = resp.bytes().await.map_err(|e| timeout_or(e, deadline))?;
        Ok(bytes.to_vec())
    }
}

/// Time left before `deadline`, or `DeadlineExceeded` if it already passed.
pub fn remaining(deadline: Deadline) -> Result<Option<Duration>> {
    match deadline {
        None => Ok(None),
        Some(at) => {
            let now = Instant::now();
            if at <= now {
                Err(Error::DeadlineExceeded)
            } else {
                Ok(Some(at - now))
            }
        },
    }
}

fn timeout_or(e: reqwest::Error, deadline: Deadline) -> Error {
    if e.is_timeout() && deadline.is_some() {
        Error::DeadlineExceeded
    } else {
        Error::Http(e)
    }
}

/// Decode a Graph response body into `T`, surfacing the error envelope.
pub(crate) fn decode_response<T: DeserializeOwned>(context: &str, body: &[u8]) -> Result<T> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Error::protocol(context, e))?;
    if value.get("error").is_some_and(|e| e.is_object()) {
        let envelope: ErrorEnvelope =
            serde_json::from_value(value).map_err(|e| Error::protocol(context, e))?;
        return Err(Error::Remote(envelope.error));
    }
    serde_json::from_value(value).map_err(|e| Error::protocol(context, e))
}
