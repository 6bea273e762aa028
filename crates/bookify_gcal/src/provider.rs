// --- File: crates/bookify_gcal/src/provider.rs ---
//! Busy-block fan-out across connected accounts.
//!
//! One free/busy request per account (calendars coalesced), accounts queried
//! concurrently under a per-account deadline. A failing or timed-out account
//! contributes an empty list and is recorded in the fetch's side channel;
//! nothing propagates past the availability engine.

use bookify_common::services::{
    BoxFuture, BoxedError, BusyBlock, BusyFetch, BusySource, CalendarApi,
};
use bookify_db::AccountRepository;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct GoogleBusyProvider {
    accounts: Arc<dyn AccountRepository>,
    api: Arc<dyn CalendarApi>,
    /// Deadline for each account's upstream request.
    deadline: Duration,
}

impl GoogleBusyProvider {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        api: Arc<dyn CalendarApi>,
        deadline: Duration,
    ) -> Self {
        Self {
            accounts,
            api,
            deadline,
        }
    }
}

impl BusySource for GoogleBusyProvider {
    fn busy_blocks(
        &self,
        host_id: &str,
        participating: &[String],
        host_tz: Tz,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> BoxFuture<'_, BusyFetch, BoxedError> {
        let host_id = host_id.to_string();
        let participating = participating.to_vec();
        Box::pin(async move {
            let targets = self
                .accounts
                .busy_targets(&host_id)
                .await
                .map_err(BoxedError::new)?;

            // Resolve each target to (account id, external calendar ids),
            // honoring the event type's participating-calendar filter.
            let requests: Vec<(String, Vec<String>)> = targets
                .into_iter()
                .filter_map(|target| {
                    let calendar_ids: Vec<String> = target
                        .calendars
                        .iter()
                        .filter(|c| participating.is_empty() || participating.contains(&c.id))
                        .map(|c| c.external_calendar_id.clone())
                        .collect();
                    if calendar_ids.is_empty() {
                        None
                    } else {
                        Some((target.account.id, calendar_ids))
                    }
                })
                .collect();

            let fetches = requests.iter().map(|(account_id, calendar_ids)| async move {
                let outcome = tokio::time::timeout(
                    self.deadline,
                    self.api
                        .free_busy(account_id, calendar_ids, host_tz, time_min, time_max),
                )
                .await;

                match outcome {
                    Ok(Ok(blocks)) => Ok(blocks),
                    Ok(Err(e)) => {
                        warn!("Free/busy failed for account {}: {}", account_id, e);
                        Err(account_id.clone())
                    }
                    Err(_) => {
                        warn!(
                            "Free/busy timed out for account {} after {:?}",
                            account_id, self.deadline
                        );
                        Err(account_id.clone())
                    }
                }
            });

            let results = futures::future::join_all(fetches).await;

            let mut blocks: Vec<BusyBlock> = Vec::new();
            let mut failed_accounts = Vec::new();
            for result in results {
                match result {
                    Ok(fetched) => blocks.extend(fetched),
                    Err(account_id) => failed_accounts.push(account_id),
                }
            }

            // Clip to the requested window.
            blocks.retain(|b| b.start < time_max && b.end > time_min);
            for block in &mut blocks {
                if block.start < time_min {
                    block.start = time_min;
                }
                if block.end > time_max {
                    block.end = time_max;
                }
            }
            blocks.sort_by_key(|b| b.start);

            Ok(BusyFetch {
                blocks,
                failed_accounts,
            })
        })
    }
}
