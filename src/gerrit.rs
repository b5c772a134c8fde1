use std::io::Write;

use anyhow::{Context, Result};
use async_trait::async_trait;
use diqwest::WithDigestAuth;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, warn};

use crate::types::{ActionRequest, Change, Credentials, GerritApi, HttpReply};

pub const DEFAULT_HOST: &str = "review.openstack.org";

/// Length of the `)]}'` line Gerrit puts in front of every JSON body.
const XSSI_PREFIX_LEN: usize = 4;

/// Characters left untouched in a search query. Besides the unreserved set,
/// `/ : = > <` pass through because they carry meaning in Gerrit's query
/// syntax. Space is kept here and turned into `+` afterwards.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/')
    .remove(b':')
    .remove(b'=')
    .remove(b'>')
    .remove(b'<')
    .remove(b' ');

/// Percent-encodes a query for use as a form value (spaces become `+`).
pub fn encode_query(query: &str) -> String {
    utf8_percent_encode(query, QUERY_ENCODE_SET)
        .to_string()
        .replace(' ', "+")
}

pub fn changes_query_url(host: &str, query: &str) -> String {
    format!(
        "https://{}/changes/?q={}&o=CURRENT_REVISION",
        host,
        encode_query(query)
    )
}

/// Validates a `--host` value: a bare hostname, optionally with a port.
pub fn parse_host(host: &str) -> Result<String> {
    let host = host.trim();
    if host.is_empty() {
        anyhow::bail!("Host must not be empty");
    }
    if host.contains("://") || host.contains('/') {
        anyhow::bail!(
            "Host must be a bare hostname such as '{}', got: '{}'",
            DEFAULT_HOST,
            host
        );
    }

    let url = url::Url::parse(&format!("https://{}/", host))
        .with_context(|| format!("Invalid host: '{}'", host))?;
    if url.host_str().is_none() || url.path() != "/" || url.query().is_some() {
        anyhow::bail!("Invalid host: '{}'", host);
    }

    Ok(host.to_string())
}

/// Decodes the body of a changes-search response.
///
/// Non-200 replies decode to an empty list; the caller cannot tell them
/// apart from a query with no matches, except via `reply.status`.
pub fn decode_changes(reply: &HttpReply) -> Result<Vec<Change>> {
    if !reply.is_ok() {
        return Ok(Vec::new());
    }

    let json = reply.body.get(XSSI_PREFIX_LEN..).unwrap_or_default();
    serde_json::from_str(json).context("Failed to decode change list from Gerrit response")
}

/// Runs `query` against the changes-search endpoint and returns the matches.
///
/// A non-200 reply is reported on `writer` and treated as no matches. A
/// successful query with an empty result is reported separately so the two
/// cases can be told apart in the log.
pub async fn get_reviews<A, W>(
    api: &A,
    host: &str,
    query: &str,
    writer: &mut W,
) -> Result<Vec<Change>>
where
    A: GerritApi + Sync,
    W: Write,
{
    writeln!(writer, "Running: {}", query)?;

    let url = changes_query_url(host, query);
    debug!(%url, "querying changes");
    let reply = api
        .get(&url)
        .await
        .with_context(|| format!("Failed to query changes from {}", host))?;

    if !reply.is_ok() {
        warn!(status = reply.status, %url, "change query was not successful");
        writeln!(
            writer,
            "Warning: query failed with HTTP {}; treating as no matching changes",
            reply.status_line()
        )?;
        return Ok(Vec::new());
    }

    let changes = decode_changes(&reply)?;
    if changes.is_empty() {
        writeln!(writer, "No changes matched")?;
    }
    Ok(changes)
}

/// Production transport backed by reqwest.
pub struct GerritHttp {
    client: reqwest::Client,
}

impl GerritHttp {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

async fn into_reply(response: reqwest::Response) -> Result<HttpReply> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .context("Failed to read response body")?;
    Ok(HttpReply { status, body })
}

#[async_trait]
impl GerritApi for GerritHttp {
    async fn get(&self, url: &str) -> Result<HttpReply> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        into_reply(response).await
    }

    async fn send(&self, request: &ActionRequest, credentials: &Credentials) -> Result<HttpReply> {
        let body = serde_json::to_vec(&request.body).context("Failed to encode request body")?;
        let response = self
            .client
            .request(request.method.into(), request.url.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send_with_digest_auth(&credentials.username, &credentials.password)
            .await
            .with_context(|| format!("{} {} failed", request.method, request.url))?;
        into_reply(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_query_keeps_gerrit_syntax() {
        assert_eq!(
            encode_query("status:open project:openstack/nova age>=1d"),
            "status:open+project:openstack/nova+age>=1d"
        );
        assert_eq!(encode_query("a<b"), "a<b");
    }

    #[test]
    fn test_encode_query_escapes_reserved() {
        assert_eq!(encode_query("a&b"), "a%26b");
        assert_eq!(encode_query("a+b"), "a%2Bb");
        assert_eq!(encode_query("a?b#c"), "a%3Fb%23c");
        assert_eq!(encode_query("\"quoted\""), "%22quoted%22");
        assert_eq!(encode_query("(a OR b)"), "%28a+OR+b%29");
        assert_eq!(encode_query("a,b;c@d"), "a%2Cb%3Bc%40d");
    }

    #[test]
    fn test_encode_query_utf8() {
        assert_eq!(encode_query("owner:jörg"), "owner:j%C3%B6rg");
    }

    #[test]
    fn test_changes_query_url() {
        assert_eq!(
            changes_query_url("review.example.org", "is:open topic:foo"),
            "https://review.example.org/changes/?q=is:open+topic:foo&o=CURRENT_REVISION"
        );
    }

    #[test]
    fn test_decode_changes_strips_prefix() {
        let body = ")]}'\n[{\"id\":\"proj~master~I1\",\"project\":\"proj\",\"revisions\":{\"abc\":{\"_number\":2,\"kind\":\"REWORK\"}}}]";
        let changes = decode_changes(&HttpReply::new(200, body)).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].id, "proj~master~I1");
        assert_eq!(changes[0].current_revision(), Ok("abc"));
    }

    #[test]
    fn test_decode_changes_missing_revisions() {
        let body = ")]}'\n[{\"id\":\"42\"}]";
        let changes = decode_changes(&HttpReply::new(200, body)).unwrap();

        assert_eq!(changes.len(), 1);
        assert!(changes[0].current_revision().is_err());
    }

    #[test]
    fn test_decode_changes_empty_list() {
        let changes = decode_changes(&HttpReply::new(200, ")]}'\n[]")).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_decode_changes_non_200_is_empty() {
        for status in [301, 400, 401, 404, 500, 503] {
            let changes = decode_changes(&HttpReply::new(status, "Not found")).unwrap();
            assert!(changes.is_empty(), "status {} should yield no changes", status);
        }
    }

    #[test]
    fn test_decode_changes_garbage_body_fails() {
        assert!(decode_changes(&HttpReply::new(200, ")]}'\n<html>")).is_err());
    }

    #[test]
    fn test_parse_host() {
        assert_eq!(parse_host("review.openstack.org").unwrap(), "review.openstack.org");
        assert_eq!(parse_host("gerrit.local:8443").unwrap(), "gerrit.local:8443");

        for invalid in ["", "  ", "https://review.openstack.org", "review.org/path", "a b"] {
            assert!(parse_host(invalid).is_err(), "'{}' should be rejected", invalid);
        }
    }
}
