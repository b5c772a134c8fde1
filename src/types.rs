use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Username and HTTP password used for Digest authentication against Gerrit.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Metadata for a single patch set of a change.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RevisionInfo {
    /// Patch set number.
    #[serde(rename = "_number")]
    pub number: Option<u64>,
}

/// A change as returned by the Gerrit changes-search endpoint.
///
/// Only the identifier and the revision map are retained; every other field
/// in the server's `ChangeInfo` is ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Change {
    pub id: String,
    #[serde(default)]
    pub revisions: BTreeMap<String, RevisionInfo>,
}

impl Change {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revisions: BTreeMap::new(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>, number: u64) -> Self {
        self.revisions.insert(
            revision.into(),
            RevisionInfo {
                number: Some(number),
            },
        );
        self
    }

    /// Returns the id of the newest revision.
    ///
    /// The search only asks for `CURRENT_REVISION`, so there is normally a
    /// single entry. If the server sends more, the highest patch set number
    /// wins.
    pub fn current_revision(&self) -> Result<&str, ChangeError> {
        self.revisions
            .iter()
            .max_by_key(|(_, info)| info.number)
            .map(|(id, _)| id.as_str())
            .ok_or_else(|| ChangeError::NoRevisions {
                change_id: self.id.clone(),
            })
    }
}

/// Problems with an individual change that prevent acting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeError {
    NoRevisions { change_id: String },
}

impl std::fmt::Display for ChangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeError::NoRevisions { change_id } => {
                write!(f, "change {} has no revisions in the response", change_id)
            }
        }
    }
}

impl std::error::Error for ChangeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// The single mutation applied to every matched change in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeAction {
    /// Post a review on the current revision with Code-Review and Workflow
    /// votes.
    Review {
        message: String,
        vote: i8,
        workflow: i8,
    },
    Abandon {
        message: Option<String>,
    },
    /// Replace the change's topic.
    Topic {
        topic: String,
    },
}

impl ChangeAction {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeAction::Review { .. } => "review",
            ChangeAction::Abandon { .. } => "abandon",
            ChangeAction::Topic { .. } => "topic",
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            ChangeAction::Review { .. } | ChangeAction::Abandon { .. } => HttpMethod::Post,
            ChangeAction::Topic { .. } => HttpMethod::Put,
        }
    }

    /// Column label used when echoing the request body to the console.
    pub fn log_label(&self) -> &'static str {
        match self {
            ChangeAction::Review { .. } => "Voting ",
            ChangeAction::Abandon { .. } => "Abandon",
            ChangeAction::Topic { .. } => "Topic  ",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            ChangeAction::Review {
                message,
                vote,
                workflow,
            } => json!({
                "message": message,
                "labels": {
                    "Code-Review": vote,
                    "Workflow": workflow,
                }
            }),
            ChangeAction::Abandon { message } => json!({ "message": message }),
            ChangeAction::Topic { topic } => json!({ "topic": topic }),
        }
    }

    /// Builds the outbound request for `change` on `host`.
    ///
    /// Only reviews need a revision, so abandon and topic changes succeed
    /// even for a change whose revision map is empty.
    pub fn build_request(&self, host: &str, change: &Change) -> Result<ActionRequest, ChangeError> {
        let url = match self {
            ChangeAction::Review { .. } => format!(
                "https://{}/a/changes/{}/revisions/{}/review",
                host,
                change.id,
                change.current_revision()?
            ),
            ChangeAction::Abandon { .. } => {
                format!("https://{}/a/changes/{}/abandon", host, change.id)
            }
            ChangeAction::Topic { .. } => {
                format!("https://{}/a/changes/{}/topic", host, change.id)
            }
        };

        Ok(ActionRequest {
            method: self.method(),
            url,
            change_id: change.id.clone(),
            body: self.body(),
        })
    }
}

/// A fully-resolved mutation ready to be sent (or skipped in a dry run).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub method: HttpMethod,
    pub url: String,
    pub change_id: String,
    pub body: serde_json::Value,
}

/// Status and body text of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Formats the status code with its canonical reason, e.g. `404 Not Found`.
    pub fn status_line(&self) -> String {
        reqwest::StatusCode::from_u16(self.status)
            .map(|code| code.to_string())
            .unwrap_or_else(|_| self.status.to_string())
    }
}

/// Immutable configuration for a single run, built once from the command
/// line.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub host: String,
    pub credentials: Credentials,
    pub query: String,
    pub action: ChangeAction,
    pub dry_run: bool,
    /// Maximum number of actions to attempt; 0 means unlimited.
    pub limit: usize,
}

impl RunSpec {
    pub fn limit_reached(&self, attempted: usize) -> bool {
        self.limit > 0 && attempted >= self.limit
    }
}

/// Counters describing what a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub matched: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dry_run_skipped: usize,
    pub malformed: usize,
    pub stopped_early: bool,
}

/// Network access to a Gerrit server.
///
/// Implementations only move bytes; interpreting status codes and bodies is
/// left to the caller.
#[async_trait]
pub trait GerritApi {
    /// Performs an unauthenticated GET.
    async fn get(&self, url: &str) -> anyhow::Result<HttpReply>;

    /// Sends a mutation with a JSON body under HTTP Digest authentication.
    async fn send(
        &self,
        request: &ActionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<HttpReply>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review() -> ChangeAction {
        ChangeAction::Review {
            message: "recheck".to_string(),
            vote: -1,
            workflow: 0,
        }
    }

    #[test]
    fn test_current_revision_single() {
        let change = Change::new("proj~master~I1").with_revision("abc123", 3);
        assert_eq!(change.current_revision(), Ok("abc123"));
    }

    #[test]
    fn test_current_revision_picks_highest_patch_set() {
        let change = Change::new("proj~master~I1")
            .with_revision("aaa", 7)
            .with_revision("bbb", 2);
        assert_eq!(change.current_revision(), Ok("aaa"));
    }

    #[test]
    fn test_current_revision_missing() {
        let change = Change::new("proj~master~I1");
        assert_eq!(
            change.current_revision(),
            Err(ChangeError::NoRevisions {
                change_id: "proj~master~I1".to_string()
            })
        );
    }

    #[test]
    fn test_review_request() {
        let change = Change::new("proj~master~I1").with_revision("abc123", 1);
        let request = review().build_request("review.example.org", &change).unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.url,
            "https://review.example.org/a/changes/proj~master~I1/revisions/abc123/review"
        );
        assert_eq!(request.change_id, "proj~master~I1");
        assert_eq!(
            request.body,
            json!({"message": "recheck", "labels": {"Code-Review": -1, "Workflow": 0}})
        );
    }

    #[test]
    fn test_review_request_without_revision_fails() {
        let change = Change::new("proj~master~I1");
        assert!(matches!(
            review().build_request("review.example.org", &change),
            Err(ChangeError::NoRevisions { .. })
        ));
    }

    #[test]
    fn test_abandon_request_does_not_need_revision() {
        let action = ChangeAction::Abandon {
            message: Some("stale".to_string()),
        };
        let request = action
            .build_request("review.example.org", &Change::new("42"))
            .unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://review.example.org/a/changes/42/abandon");
        assert_eq!(request.body, json!({"message": "stale"}));
    }

    #[test]
    fn test_abandon_without_message_sends_null() {
        let action = ChangeAction::Abandon { message: None };
        assert_eq!(action.body(), json!({"message": null}));
    }

    #[test]
    fn test_topic_request_uses_put() {
        let action = ChangeAction::Topic {
            topic: "foo".to_string(),
        };
        let request = action
            .build_request("review.example.org", &Change::new("42").with_revision("r", 1))
            .unwrap();

        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.url, "https://review.example.org/a/changes/42/topic");
        assert_eq!(request.body, json!({"topic": "foo"}));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("alice", "hunter2");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_limit_reached() {
        let mut spec = RunSpec {
            host: "review.example.org".to_string(),
            credentials: Credentials::new("u", "p"),
            query: "status:open".to_string(),
            action: review(),
            dry_run: true,
            limit: 0,
        };
        assert!(!spec.limit_reached(1000));

        spec.limit = 2;
        assert!(!spec.limit_reached(1));
        assert!(spec.limit_reached(2));
    }

    #[test]
    fn test_status_line() {
        assert_eq!(HttpReply::new(404, "").status_line(), "404 Not Found");
        assert_eq!(HttpReply::new(200, "").status_line(), "200 OK");
    }
}
