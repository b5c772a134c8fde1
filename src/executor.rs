use std::io::Write;

use anyhow::Result;
use tracing::{debug, warn};

use crate::types::{ActionRequest, ChangeAction, Credentials, GerritApi};

/// What happened to a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    DryRun,
    Succeeded,
    Failed,
}

/// Logs `request` and, unless `dry_run` is set, sends it.
///
/// Failures (a non-200 status or a transport error) are written to `writer`
/// and reported as [`Outcome::Failed`]; only errors writing to `writer`
/// propagate.
pub async fn execute<A, W>(
    api: &A,
    action: &ChangeAction,
    request: &ActionRequest,
    credentials: &Credentials,
    dry_run: bool,
    writer: &mut W,
) -> Result<Outcome>
where
    A: GerritApi + Sync,
    W: Write,
{
    writeln!(writer, "{}: {}", action.log_label(), request.body)?;
    writeln!(writer, "On     : {}", request.change_id)?;

    if dry_run {
        debug!(method = %request.method, url = %request.url, "dry run, not sending");
        writeln!(writer, "       : ...skipping as this is a dry run")?;
        return Ok(Outcome::DryRun);
    }

    debug!(method = %request.method, url = %request.url, "sending {}", action.name());
    match api.send(request, credentials).await {
        Ok(reply) if reply.is_ok() => {
            writeln!(writer, "Status : OK")?;
            Ok(Outcome::Succeeded)
        }
        Ok(reply) => {
            warn!(status = reply.status, change = %request.change_id, "{} failed", action.name());
            writeln!(writer, "Status : Failed")?;
            writeln!(writer, "       : HTTP {}", reply.status_line())?;
            writeln!(writer, "       : {}", reply.body.trim_end())?;
            Ok(Outcome::Failed)
        }
        Err(err) => {
            warn!(change = %request.change_id, "{} failed: {:#}", action.name(), err);
            writeln!(writer, "Status : Failed")?;
            writeln!(writer, "       : {:#}", err)?;
            Ok(Outcome::Failed)
        }
    }
}
