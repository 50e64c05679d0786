//! Webhook subscription changes across many accounts.

use std::collections::BTreeSet;

use {
    serde::Serialize,
    switchboard_graph::{BATCH_LIMIT, BatchKind, BatchOperation, Deadline, GraphClient},
    tracing::{info, warn},
};

use crate::{
    account::{Account, AccountSummary},
    error::{Error, FailedAccount, Result},
    registry::AccountRegistry,
};

/// Per-account outcome of a subscribe/unsubscribe request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionReport {
    pub succeeded: Vec<AccountSummary>,
    pub failed: Vec<FailedAccount>,
}

impl SubscriptionReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `PartialBatchFailure` carrying the failed accounts, if any failed.
    #[must_use]
    pub fn partial_failure(&self) -> Option<Error> {
        (!self.failed.is_empty()).then(|| Error::PartialBatchFailure {
            failed: self.failed.clone(),
        })
    }

    fn fail(&mut self, id: &str, error: impl ToString) {
        self.failed.push(FailedAccount {
            id: id.to_string(),
            error: error.to_string(),
        });
    }
}

/// Whether accounts are being subscribed or unsubscribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Subscribe,
    Unsubscribe,
}

impl Direction {
    fn kind(self) -> BatchKind {
        match self {
            Self::Subscribe => BatchKind::Apply,
            Self::Unsubscribe => BatchKind::Unlink,
        }
    }
}

/// Send one batched operation per account, in chunks of [`BATCH_LIMIT`], and
/// record the new subscription state of every account that succeeded.
///
/// Accounts already subscribed to exactly `fields` are reported as succeeded
/// and accounts without a credential as failed, both without a remote call.
/// If the first chunk fails as a whole the error is returned and nothing
/// changes; a later whole-chunk failure is reported per account for the
/// remaining accounts.
pub async fn apply<F>(
    graph: &GraphClient,
    registry: &AccountRegistry,
    accounts: Vec<Account>,
    direction: Direction,
    fields: &[String],
    build: F,
    deadline: Deadline,
) -> Result<SubscriptionReport>
where
    F: Fn(&Account) -> BatchOperation,
{
    let mut report = SubscriptionReport::default();
    let new_fields = match direction {
        Direction::Subscribe => fields.to_vec(),
        Direction::Unsubscribe => Vec::new(),
    };

    let mut ready = Vec::with_capacity(accounts.len());
    for account in accounts {
        if direction == Direction::Subscribe
            && same_fields(&account.subscribed_fields, &new_fields)
        {
            report.succeeded.push(account.summary());
        } else if account.credential.is_none() {
            report.fail(&account.id, "no credential; re-authorize the account");
        } else {
            ready.push(account);
        }
    }

    let mut remaining = ready.into_iter().peekable();
    let mut first = true;
    while remaining.peek().is_some() {
        let chunk: Vec<Account> = remaining.by_ref().take(BATCH_LIMIT).collect();
        let ids: Vec<String> = chunk.iter().map(|a| a.id.clone()).collect();

        let outcomes = match graph
            .execute_batch(chunk, direction.kind(), &build, deadline)
            .await
        {
            Ok(outcomes) => outcomes,
            Err(e) if first => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, ?direction, "subscription batch failed");
                for id in ids.into_iter().chain(remaining.by_ref().map(|a| a.id)) {
                    report.fail(&id, &e);
                }
                break;
            },
        };
        first = false;

        let mut updates = Vec::new();
        for outcome in outcomes {
            match outcome.error {
                None => {
                    updates.push((outcome.account.id.clone(), new_fields.clone()));
                    let mut account = outcome.account;
                    account.subscribed_fields = new_fields.clone();
                    report.succeeded.push(account.summary());
                },
                Some(error) => report.fail(&outcome.account.id, error),
            }
        }
        registry.set_subscriptions(&updates);
    }

    match report.partial_failure() {
        Some(error) => warn!(
            platform = %registry.platform(),
            ?direction,
            succeeded = report.succeeded.len(),
            %error,
            "subscriptions partially updated"
        ),
        None => info!(
            platform = %registry.platform(),
            ?direction,
            succeeded = report.succeeded.len(),
            "subscriptions updated"
        ),
    }
    Ok(report)
}

/// Field lists are compared as sets; the remote side does not keep order.
fn same_fields(current: &[String], wanted: &[String]) -> bool {
    let current: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let wanted: BTreeSet<&str> = wanted.iter().map(String::as_str).collect();
    current == wanted
}
