use std::io::Write;

use anyhow::Result;
use tracing::{debug, warn};

use crate::{
    executor::{Outcome, execute},
    gerrit::get_reviews,
    types::{GerritApi, RunSpec, RunSummary},
};

/// Queries Gerrit and applies the configured action to every matching change.
///
/// Changes are processed one at a time in the order the server returned
/// them. Each attempted action (sent, failed or skipped as a dry run) counts
/// toward `spec.limit`; once the limit is reached the rest of the batch is
/// left untouched. A change that cannot be acted on, such as one with no
/// revisions, is reported and skipped without counting.
pub async fn run<A, W>(spec: &RunSpec, api: &A, writer: &mut W) -> Result<RunSummary>
where
    A: GerritApi + Sync,
    W: Write,
{
    let changes = get_reviews(api, &spec.host, &spec.query, writer).await?;
    let mut summary = RunSummary {
        matched: changes.len(),
        ..RunSummary::default()
    };

    for (index, change) in changes.iter().enumerate() {
        let request = match spec.action.build_request(&spec.host, change) {
            Ok(request) => request,
            Err(err) => {
                warn!(change = %change.id, "skipping change: {}", err);
                writeln!(writer, "Error  : {}", err)?;
                summary.malformed += 1;
                continue;
            }
        };

        let outcome = execute(
            api,
            &spec.action,
            &request,
            &spec.credentials,
            spec.dry_run,
            writer,
        )
        .await?;

        summary.attempted += 1;
        match outcome {
            Outcome::DryRun => summary.dry_run_skipped += 1,
            Outcome::Succeeded => summary.succeeded += 1,
            Outcome::Failed => summary.failed += 1,
        }

        if spec.limit_reached(summary.attempted) {
            summary.stopped_early = index + 1 < changes.len();
            if summary.stopped_early {
                writeln!(
                    writer,
                    "Limit of {} action{} reached, stopping",
                    spec.limit,
                    if spec.limit == 1 { "" } else { "s" }
                )?;
            }
            break;
        }
    }

    debug!(?summary, "run complete");
    Ok(summary)
}
