//! The retest loop: read the pull request's statuses, ask for a retest while
//! any of them fail, and wait between rounds.

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{
    CheckReport, Error, Gateway, Outcome, PullRequestTarget, RETEST_COMMENT, RemoteError,
};

/// Fetches the head commit of `target`, lists its statuses and classifies
/// them.
///
/// An empty status list is a valid, empty report. The first failing call
/// ends the lookup.
pub async fn get_checks<G>(gateway: &G, target: &PullRequestTarget) -> Result<CheckReport, RemoteError>
where
    G: Gateway + ?Sized,
{
    debug!("Reading checks for {target}");
    let commit = gateway.fetch_head_commit(target).await?;

    info!(%commit, "Resolved head commit of {target}");
    let records = gateway.fetch_statuses(target, &commit).await?;
    let report = CheckReport::classify(records);

    info!(
        success = report.successes.len(),
        pending = report.pendings.len(),
        failure = report.failures.len(),
        "Classified checks"
    );
    for context in &report.failures {
        debug!(%context, "Failing check");
    }

    Ok(report)
}

/// Runs `fut` unless `cancel` has fired, abandoning it if `cancel` fires
/// while it is in flight.
async fn unless_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    if cancel.is_cancelled() {
        return None;
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

/// Polls `target` and posts [`RETEST_COMMENT`] whenever a check is failing.
///
/// With a zero `interval` the checks are read once and the comment is posted
/// at most once. Otherwise the loop sleeps `interval` after each comment and
/// polls again until no failures remain. Every remote error ends the loop;
/// nothing is retried before the next scheduled poll.
///
/// `cancel` is honoured before each remote call and during the sleep.
pub async fn retest_until_green<G>(
    gateway: &G,
    target: &PullRequestTarget,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<Outcome, Error>
where
    G: Gateway + ?Sized,
{
    let mut polls: u64 = 0;

    loop {
        info!("Polling {target} for failing checks");
        let Some(report) = unless_cancelled(cancel, get_checks(gateway, target)).await else {
            warn!("Cancelled before checks were read");
            return Ok(Outcome::Cancelled);
        };
        let report = report?;
        polls += 1;

        if !report.has_failures() {
            info!(polls, "No failing checks on {target}");
            return Ok(Outcome::AllPassing { polls });
        }

        let Some(posted) =
            unless_cancelled(cancel, gateway.post_comment(target, RETEST_COMMENT)).await
        else {
            warn!("Cancelled before the retest comment was posted");
            return Ok(Outcome::Cancelled);
        };
        posted?;
        info!("Posted {RETEST_COMMENT} on {target}");

        if interval.is_zero() {
            return Ok(Outcome::RetestRequested);
        }

        match chrono::Duration::from_std(interval)
            .ok()
            .and_then(|delta| chrono::Local::now().checked_add_signed(delta))
        {
            Some(next) => info!(
                "Sleeping for {} seconds (next check at {})",
                interval.as_secs(),
                next.format("%H:%M:%S")
            ),
            None => info!("Sleeping for {} seconds", interval.as_secs()),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelled while waiting for the next poll");
                return Ok(Outcome::Cancelled);
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
