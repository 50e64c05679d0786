//! Batch request correlation.
//!
//! N independent operations are packed into one `POST` to the versioned root
//! with a `batch` form field. The response is a JSON array whose element `i`
//! answers operation `i`. A failure of one element never affects the others;
//! only a malformed outer response fails the whole call.

use std::fmt;

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
    tracing::debug,
    url::form_urlencoded,
};

use crate::{
    client::{Deadline, GraphClient, decode_response},
    error::{Error, GraphError, Result},
};

/// Maximum number of operations the remote side accepts in one batch.
pub const BATCH_LIMIT: usize = 50;

/// How per-item remote errors are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Every remote error is a failure.
    Apply,
    /// Removing a link that does not exist counts as success.
    Unlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

/// A single header of a batched operation or result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// One operation of a batch, individually authorized.
#[derive(Clone)]
pub struct BatchOperation {
    pub method: Method,
    pub relative_url: String,
    /// Must be unique within a batch when set.
    pub name: Option<String>,
    pub headers: Vec<Header>,
    pub params: Vec<(String, String)>,
    pub access_token: Option<Secret<String>>,
}

impl fmt::Debug for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOperation")
            .field("method", &self.method)
            .field("relative_url", &self.relative_url)
            .field("name", &self.name)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl BatchOperation {
    #[must_use]
    pub fn new(method: Method, relative_url: impl Into<String>) -> Self {
        Self {
            method,
            relative_url: relative_url.into(),
            name: None,
            headers: Vec::new(),
            params: Vec::new(),
            access_token: None,
        }
    }

    #[must_use]
    pub fn get(relative_url: impl Into<String>) -> Self {
        Self::new(Method::Get, relative_url)
    }

    #[must_use]
    pub fn post(relative_url: impl Into<String>) -> Self {
        Self::new(Method::Post, relative_url)
    }

    #[must_use]
    pub fn delete(relative_url: impl Into<String>) -> Self {
        Self::new(Method::Delete, relative_url)
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn authorized(mut self, access_token: Secret<String>) -> Self {
        self.access_token = Some(access_token);
        self
    }

    /// Wire form: parameters (including per-item authorization) go to the
    /// body for POST and to the relative URL query otherwise.
    fn to_wire(&self, client: &GraphClient) -> WireOperation {
        let mut params = self.params.clone();
        if let Some(token) = &self.access_token {
            params.extend(client.auth_params(token));
        }
        let encoded = (!params.is_empty()).then(|| {
            form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish()
        });

        let (relative_url, body) = match (self.method, encoded) {
            (Method::Post, body) => (self.relative_url.clone(), body),
            (_, None) => (self.relative_url.clone(), None),
            (_, Some(query)) => {
                let sep = if self.relative_url.contains('?') {
                    '&'
                } else {
                    '?'
                };
                (format!("{}{sep}{query}", self.relative_url), None)
            },
        };

        WireOperation {
            method: self.method.as_str(),
            relative_url,
            name: self.name.clone(),
            headers: self.headers.clone(),
            body,
        }
    }
}

#[derive(Serialize)]
struct WireOperation {
    method: &'static str,
    relative_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    headers: Vec<Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

/// One element of the batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub code: u16,
    #[serde(default)]
    pub headers: Vec<Header>,
    /// JSON document encoded as a string.
    #[serde(default)]
    pub body: String,
}

/// Body of a mutating operation's result.
#[derive(Deserialize)]
struct ItemBody {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<GraphError>,
}

/// Why a single batch item failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// The remote side reported an error for this item.
    Remote(GraphError),
    /// The item body carried neither an error nor a success marker.
    NotConfirmed { code: u16 },
    /// The item body was not valid JSON.
    Undecodable { code: u16, detail: String },
    /// The remote side returned `null` for this item.
    Missing,
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(e) => write!(f, "{e}"),
            Self::NotConfirmed { code } => write!(f, "success not confirmed (status {code})"),
            Self::Undecodable { code, detail } => {
                write!(f, "undecodable result (status {code}): {detail}")
            },
            Self::Missing => f.write_str("no result returned"),
        }
    }
}

impl std::error::Error for ItemError {}

/// Correlated result for one account of a batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    pub account: T,
    pub error: Option<ItemError>,
}

impl<T> BatchOutcome<T> {
    #[must_use]
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

impl GraphClient {
    /// Build one operation per account, send them as a single call, and
    /// correlate the results positionally.
    ///
    /// Returns exactly one outcome per account, in input order. Per-item
    /// failures are reported in the outcome; only a malformed outer
    /// response (or a transport failure) fails the call.
    pub async fn execute_batch<T, F>(
        &self,
        accounts: Vec<T>,
        kind: BatchKind,
        build: F,
        deadline: Deadline,
    ) -> Result<Vec<BatchOutcome<T>>>
    where
        F: Fn(&T) -> BatchOperation,
    {
        if accounts.is_empty() {
            return Ok(Vec::new());
        }
        let ops: Vec<BatchOperation> = accounts.iter().map(&build).collect();
        let results = self.execute_raw(&ops, deadline).await?;
        let outcomes = correlate(accounts, &results, kind);
        debug!(
            total = outcomes.len(),
            failed = outcomes.iter().filter(|o| !o.ok()).count(),
            "batch correlated"
        );
        Ok(outcomes)
    }

    /// Send `ops` as one batch and return the raw results, one per operation.
    pub async fn execute_raw(
        &self,
        ops: &[BatchOperation],
        deadline: Deadline,
    ) -> Result<Vec<Option<BatchResult>>> {
        if ops.len() > BATCH_LIMIT {
            return Err(Error::invalid_input(format!(
                "{} operations exceed the batch limit of {BATCH_LIMIT}",
                ops.len()
            )));
        }
        let call_token = ops
            .iter()
            .find_map(|op| op.access_token.as_ref())
            .ok_or_else(|| Error::invalid_input("batch has no authorized operation"))?;

        let wire: Vec<WireOperation> = ops.iter().map(|op| op.to_wire(self)).collect();
        let batch = serde_json::to_string(&wire).map_err(Error::invalid_input)?;

        let mut form = vec![
            ("include_headers".to_string(), "false".to_string()),
            ("batch".to_string(), batch),
        ];
        form.extend(self.auth_params(call_token));

        let body = self.post_form("", &form, deadline).await?;
        let results: Vec<Option<BatchResult>> = decode_response("batch", &body)?;
        if results.len() != ops.len() {
            return Err(Error::protocol(
                "batch",
                format!("expected {} results, got {}", ops.len(), results.len()),
            ));
        }
        Ok(results)
    }
}

/// Pair `accounts[i]` with `results[i]`.
///
/// `results` must have the same length as `accounts`; surplus entries on
/// either side are treated as missing results.
pub fn correlate<T>(
    accounts: Vec<T>,
    results: &[Option<BatchResult>],
    kind: BatchKind,
) -> Vec<BatchOutcome<T>> {
    accounts
        .into_iter()
        .enumerate()
        .map(|(i, account)| BatchOutcome {
            account,
            error: decode_item(results.get(i).and_then(Option::as_ref), kind),
        })
        .collect()
}

fn decode_item(result: Option<&BatchResult>, kind: BatchKind) -> Option<ItemError> {
    let Some(result) = result else {
        return Some(ItemError::Missing);
    };
    let body: ItemBody = match serde_json::from_str(&result.body) {
        Ok(b) => b,
        Err(e) => {
            return Some(ItemError::Undecodable {
                code: result.code,
                detail: e.to_string(),
            });
        },
    };
    match body.error {
        Some(e) if kind == BatchKind::Unlink && e.is_not_linked() => None,
        Some(e) => Some(ItemError::Remote(e)),
        None if body.success == Some(true) => None,
        None => Some(ItemError::NotConfirmed { code: result.code }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::client::{GraphEndpoint, RequestSigner},
        std::sync::Arc,
    };

    struct FixedSigner;

    impl RequestSigner for FixedSigner {
        fn proof(&self, access_token: &str) -> String {
            format!("proof-{access_token}")
        }
    }

    fn client() -> GraphClient {
        GraphClient::new(
            GraphEndpoint::new("https://graph.example", "v12.0"),
            Arc::new(FixedSigner),
        )
    }

    fn result(code: u16, body: &str) -> Option<BatchResult> {
        Some(BatchResult {
            code,
            headers: Vec::new(),
            body: body.to_string(),
        })
    }

    #[test]
    fn get_operation_carries_auth_in_query() {
        let op = BatchOperation::get("123/subscribed_apps")
            .param("fields", "subscribed_fields")
            .authorized(Secret::new("tok".into()));
        let wire = op.to_wire(&client());
        assert_eq!(wire.method, "GET");
        assert_eq!(
            wire.relative_url,
            "123/subscribed_apps?fields=subscribed_fields&access_token=tok&appsecret_proof=proof-tok"
        );
        assert!(wire.body.is_none());
    }

    #[test]
    fn post_operation_carries_auth_in_body() {
        let op = BatchOperation::post("123/subscribed_apps")
            .param("subscribed_fields", "messages,messaging_postbacks")
            .authorized(Secret::new("tok".into()));
        let wire = op.to_wire(&client());
        assert_eq!(wire.relative_url, "123/subscribed_apps");
        assert_eq!(
            wire.body.as_deref(),
            Some(
                "subscribed_fields=messages%2Cmessaging_postbacks&access_token=tok&appsecret_proof=proof-tok"
            )
        );
        let json = serde_json::to_value(&wire).unwrap();
        assert!(json.get("headers").is_none());
        assert!(json.get("name").is_none());
    }

    #[test]
    fn correlation_keeps_order_and_isolates_failures() {
        let results = vec![
            result(200, r#"{"success":true}"#),
            result(
                400,
                r#"{"error":{"message":"Error validating access token","code":190}}"#,
            ),
            result(200, r#"{"success":true}"#),
        ];
        let outcomes = correlate(vec!["a", "b", "c"], &results, BatchKind::Apply);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].account, "a");
        assert!(outcomes[0].ok());
        assert_eq!(outcomes[1].account, "b");
        assert!(matches!(
            outcomes[1].error,
            Some(ItemError::Remote(ref e)) if e.is_invalid_token()
        ));
        assert!(outcomes[2].ok());
    }

    #[test]
    fn missing_success_marker_is_failure() {
        let outcomes = correlate(vec![1], &[result(200, "{}")], BatchKind::Apply);
        assert_eq!(outcomes[0].error, Some(ItemError::NotConfirmed { code: 200 }));

        let outcomes = correlate(vec![1], &[result(200, r#"{"success":false}"#)], BatchKind::Apply);
        assert!(!outcomes[0].ok());
    }

    #[test]
    fn null_and_garbage_items_fail_alone() {
        let results = vec![None, result(500, "oops"), result(200, r#"{"success":true}"#)];
        let outcomes = correlate(vec![1, 2, 3], &results, BatchKind::Apply);
        assert_eq!(outcomes[0].error, Some(ItemError::Missing));
        assert!(matches!(
            outcomes[1].error,
            Some(ItemError::Undecodable { code: 500, .. })
        ));
        assert!(outcomes[2].ok());
    }

    #[test]
    fn not_linked_is_success_only_when_unlinking() {
        let body = r#"{"error":{"message":"(#100) App is not installed: 42","code":100}}"#;
        let unlink = correlate(vec![1], &[result(400, body)], BatchKind::Unlink);
        assert!(unlink[0].ok());
        let apply = correlate(vec![1], &[result(400, body)], BatchKind::Apply);
        assert!(!apply[0].ok());
    }

    #[test]
    fn debug_redacts_token() {
        let op = BatchOperation::delete("1/subscribed_apps").authorized(Secret::new("tok".into()));
        let rendered = format!("{op:?}");
        assert!(!rendered.contains("tok\""));
        assert!(rendered.contains("[REDACTED]"));
    }
}
