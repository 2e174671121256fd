//! One aggregation pass over a set of accounts.
//!
//! Every account moves through its own state machine:
//! `pending -> (cooldown check) -> skipped | fetching -> ok | failed`.
//! A failing account never stops the others; its outcome is recorded and the
//! pass moves on. Results are merged newest-first with a stable sort, so
//! equal timestamps keep account order and provider order within an account.
use crate::rate::{CooldownTracker, GlobalQuota, RateKey};
use futures::future::join_all;
use lookout_common::{AccountConfig, DispatchMode, FeedItem, FetchOutcome, ResolvedUser};
use lookout_http::{Sleeper, TokioSleeper};
use lookout_social::{SocialError, TimelineSource, UserDirectory};
use std::sync::Arc;
use std::time::Duration;

const RATE_LIMITED: &str = "Rate limited";
const USER_NOT_FOUND: &str = "User not found";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    /// Newest first.
    pub items: Vec<FeedItem>,
    /// One outcome per requested account, in request order.
    pub summary: Vec<FetchOutcome>,
    /// Some account hit a provider or local rate limit, or the quota was exhausted.
    pub rate_limited: bool,
    /// The global quota short-circuited the pass before any account ran.
    pub quota_exhausted: bool,
}

pub struct FeedAggregator {
    users: Arc<dyn UserDirectory>,
    timelines: Arc<dyn TimelineSource>,
    cooldown: CooldownTracker,
    quota: Option<GlobalQuota>,
    mode: DispatchMode,
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
    max_results: u32,
}

impl FeedAggregator {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        timelines: Arc<dyn TimelineSource>,
        cooldown: CooldownTracker,
    ) -> Self {
        Self {
            users,
            timelines,
            cooldown,
            quota: None,
            mode: DispatchMode::Sequential,
            delay: Duration::ZERO,
            sleeper: Arc::new(TokioSleeper),
            max_results: 10,
        }
    }

    pub fn with_quota(mut self, quota: GlobalQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    /// `delay` is the pause between accounts in sequential mode.
    pub fn with_dispatch(mut self, mode: DispatchMode, delay: Duration) -> Self {
        self.mode = mode;
        self.delay = delay;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_max_results(mut self, n: u32) -> Self {
        self.max_results = n;
        self
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    /// Run one pass. Never fails; per-account problems land in the summary.
    pub async fn aggregate(&self, accounts: &[AccountConfig]) -> AggregateResult {
        if let Some(quota) = &self.quota {
            if !quota.try_acquire(&RateKey::global()) {
                tracing::warn!(
                    max_calls = quota.max_calls(),
                    accounts = accounts.len(),
                    "feed.quota.exhausted"
                );
                return AggregateResult {
                    rate_limited: true,
                    quota_exhausted: true,
                    ..AggregateResult::default()
                };
            }
        }

        let mut outcomes: Vec<Option<FetchOutcome>> = vec![None; accounts.len()];
        let mut eligible = Vec::new();
        for (idx, account) in accounts.iter().enumerate() {
            let key = RateKey::account(&account.username);
            // Claimed before any provider call so an overlapping pass sees the cooldown.
            if self.cooldown.try_claim(&key) {
                eligible.push(idx);
            } else {
                tracing::info!(
                    username = %account.username,
                    remaining_secs = ?self.cooldown.remaining(&key).map(|d| d.as_secs()),
                    "feed.account.skipped"
                );
                outcomes[idx] = Some(FetchOutcome::rate_limited(&account.username, RATE_LIMITED));
            }
        }

        let mut per_account: Vec<Vec<FeedItem>> = vec![Vec::new(); accounts.len()];
        if !eligible.is_empty() {
            let names: Vec<String> = eligible
                .iter()
                .map(|&i| accounts[i].username.clone())
                .collect();
            match self.users.resolve(&names).await {
                Err(e) => {
                    for &i in &eligible {
                        outcomes[i] = Some(self.failure(&accounts[i], &e));
                    }
                }
                Ok(users) => {
                    let mut jobs = Vec::with_capacity(eligible.len());
                    for &i in &eligible {
                        match users.get(&accounts[i].username) {
                            Some(user) => jobs.push((i, user.clone())),
                            None => {
                                tracing::warn!(
                                    username = %accounts[i].username,
                                    error = USER_NOT_FOUND,
                                    "feed.account.failed"
                                );
                                outcomes[i] =
                                    Some(FetchOutcome::failed(&accounts[i].username, USER_NOT_FOUND));
                            }
                        }
                    }
                    for (i, outcome, items) in self.dispatch(accounts, jobs).await {
                        outcomes[i] = Some(outcome);
                        per_account[i] = items;
                    }
                }
            }
        }

        let mut items: Vec<FeedItem> = per_account.into_iter().flatten().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let summary: Vec<FetchOutcome> = outcomes
            .into_iter()
            .zip(accounts)
            .map(|(o, a)| o.unwrap_or_else(|| FetchOutcome::failed(&a.username, USER_NOT_FOUND)))
            .collect();
        let rate_limited = summary.iter().any(|o| o.rate_limited);

        tracing::info!(
            accounts = accounts.len(),
            succeeded = summary.iter().filter(|o| o.success).count(),
            items = items.len(),
            rate_limited,
            "feed.aggregate.done"
        );

        AggregateResult {
            items,
            summary,
            rate_limited,
            quota_exhausted: false,
        }
    }

    async fn dispatch(
        &self,
        accounts: &[AccountConfig],
        jobs: Vec<(usize, ResolvedUser)>,
    ) -> Vec<(usize, FetchOutcome, Vec<FeedItem>)> {
        match self.mode {
            DispatchMode::Concurrent => {
                join_all(jobs.iter().map(|(i, user)| async move {
                    let (outcome, items) = self.fetch_one(&accounts[*i], user).await;
                    (*i, outcome, items)
                }))
                .await
            }
            DispatchMode::Sequential => {
                let mut out = Vec::with_capacity(jobs.len());
                for (n, (i, user)) in jobs.iter().enumerate() {
                    if n > 0 && !self.delay.is_zero() {
                        self.sleeper.sleep(self.delay).await;
                    }
                    let (outcome, items) = self.fetch_one(&accounts[*i], user).await;
                    out.push((*i, outcome, items));
                }
                out
            }
        }
    }

    async fn fetch_one(
        &self,
        account: &AccountConfig,
        user: &ResolvedUser,
    ) -> (FetchOutcome, Vec<FeedItem>) {
        match self.timelines.fetch_recent(user, self.max_results).await {
            Ok(mut items) => {
                for item in &mut items {
                    item.source_label = account.display_name.clone();
                }
                tracing::info!(
                    username = %account.username,
                    count = items.len(),
                    "feed.account.ok"
                );
                (FetchOutcome::succeeded(&account.username, items.len()), items)
            }
            Err(e) => (self.failure(account, &e), Vec::new()),
        }
    }

    fn failure(&self, account: &AccountConfig, e: &SocialError) -> FetchOutcome {
        tracing::warn!(
            username = %account.username,
            error = %e,
            rate_limited = e.is_rate_limited(),
            "feed.account.failed"
        );
        if e.is_rate_limited() {
            FetchOutcome::rate_limited(&account.username, e.to_string())
        } else {
            FetchOutcome::failed(&account.username, e.to_string())
        }
    }
}
