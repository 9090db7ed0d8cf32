//! Quota-gated relay
//!
//! Runs one inbound message through the relay state machine:
//!
//! ```text
//! CheckingQuota -> Exhausted | CallingCompletion
//! CallingCompletion -> RepliedSuccess | RepliedFailure
//! RepliedSuccess -> QuotaUpdating -> Done
//! ```
//!
//! Redemption requests bypass the machine entirely and only ever credit quota.

use crate::classifier::{MessageClassifier, SkipReason, TriggerContext};
use crate::completion::{status_label, CompletionClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::InboundMessage;
use crate::quota::QuotaStore;
use crate::redemption::{RedemptionClient, RedemptionOutcome};
use crate::reply::{self, ReplySink};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shown when the completion backend fails
pub const COMPLETION_ERROR_MESSAGE: &str = "🤖️：AI机器人摆烂了，请稍后再试～";
pub const REDEMPTION_FAILED_MESSAGE: &str = "兑换失败:今日未激活该验证码或者已兑换.";
/// Shown when the quota database cannot be reached
pub const STORE_UNAVAILABLE_MESSAGE: &str = "🤖️：额度服务暂时不可用，请稍后再试～";

/// Line between the quoted question and the answer
const QUESTION_SEPARATOR: &str = "\n----------\n";

/// Prompt used to check the completion backend at startup
pub const SELF_TEST_PROMPT: &str = "Say Hello World";

/// How a message was handled
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Skipped(SkipReason),
    /// No request left today; `fresh_user` when no record existed yet
    QuotaExhausted { fresh_user: bool },
    Replied { success: bool },
    Redeemed { accepted: bool },
    StoreUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RelayState {
    CheckingQuota,
    Exhausted,
    CallingCompletion,
    RepliedSuccess,
    RepliedFailure,
    QuotaUpdating,
    Done,
}

/// Reply texts and limits taken from the config
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub redemption_marker: String,
    pub redemption_credit: u32,
    pub daily_free_quota: u32,
    pub free_question_on_first_contact: bool,
    pub contact_hint: String,
    pub max_chunk_size: usize,
    pub signature: String,
}

impl From<&Config> for RelaySettings {
    fn from(config: &Config) -> Self {
        Self {
            redemption_marker: config.redemption_marker.clone(),
            redemption_credit: config.redemption_credit,
            daily_free_quota: config.daily_free_quota,
            free_question_on_first_contact: config.free_question_on_first_contact,
            contact_hint: config.contact_hint.clone(),
            max_chunk_size: config.max_chunk_size,
            signature: config.signature.clone(),
        }
    }
}

impl RelaySettings {
    fn quota_notice(&self) -> String {
        format!(
            "每人每天免费问{}个问题, 兑换码兑换后可以增加{}次 ,想问更多可以私聊'{}'询问.",
            self.daily_free_quota, self.redemption_credit, self.contact_hint
        )
    }

    fn redemption_success(&self) -> String {
        format!("兑换成功,本日提问次数+{}.", self.redemption_credit)
    }
}

/// Orchestrates classification, quota, completion and reply delivery
pub struct RelayEngine {
    classifier: MessageClassifier,
    store: Arc<dyn QuotaStore>,
    completion: Arc<dyn CompletionClient>,
    redemption: Arc<dyn RedemptionClient>,
    settings: RelaySettings,
}

impl RelayEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn QuotaStore>,
        completion: Arc<dyn CompletionClient>,
        redemption: Arc<dyn RedemptionClient>,
    ) -> Self {
        Self {
            classifier: MessageClassifier::new(config),
            store,
            completion,
            redemption,
            settings: RelaySettings::from(config),
        }
    }

    /// Log the bot identity and ask the backend one question
    pub async fn self_test(&self) -> bool {
        info!("Bot name is: {}", self.classifier.bot_name());
        info!(
            "Trigger keyword in private chat is: {:?}",
            self.classifier.trigger_keyword()
        );
        info!(
            "Trigger keyword in group chat is: {:?}",
            self.classifier.group_trigger()
        );

        match self.completion.complete(SELF_TEST_PROMPT).await {
            Ok(_) => {
                info!("Completion backend reachable, ready to handle messages");
                true
            }
            Err(e) => {
                error!("Completion backend self-test failed: {}", e);
                false
            }
        }
    }

    /// Handle a message using today's (UTC) quota day
    pub async fn handle(&self, msg: &InboundMessage, sink: &dyn ReplySink) -> Result<Outcome> {
        self.handle_on(msg, Utc::now().date_naive(), sink).await
    }

    /// Handle a message against the quota of `date`.
    ///
    /// Only delivery failures are returned as `Err`; every other failure is
    /// answered in chat and reported through the `Outcome`.
    pub async fn handle_on(
        &self,
        msg: &InboundMessage,
        date: NaiveDate,
        sink: &dyn ReplySink,
    ) -> Result<Outcome> {
        let ctx = match self.classifier.classify(msg) {
            Ok(ctx) => ctx,
            Err(reason) => {
                debug!("Skipping message from {}: {}", msg.sender_id, reason);
                return Ok(Outcome::Skipped(reason));
            }
        };

        let user = msg.sender_id.as_str();
        let marker = self.settings.redemption_marker.as_str();
        if !marker.is_empty() {
            if let Some(code) = ctx.cleaned_text.strip_prefix(marker) {
                return self.redeem(user, code.trim(), date, &ctx, sink).await;
            }
        }

        self.relay(user, date, &ctx, sink).await
    }

    async fn relay(
        &self,
        user: &str,
        date: NaiveDate,
        ctx: &TriggerContext,
        sink: &dyn ReplySink,
    ) -> Result<Outcome> {
        let question = ctx.cleaned_text.as_str();

        self.enter(user, RelayState::CheckingQuota);
        let owner = user.to_string();
        let record = match self.with_store(move |store| store.get(&owner, date)).await {
            Ok(record) => record,
            Err(e) => return self.store_unavailable(user, e, question, sink).await,
        };

        let exhausted = match &record {
            None => !self.settings.free_question_on_first_contact,
            Some(r) => r.request_count == 0,
        };
        if exhausted {
            self.enter(user, RelayState::Exhausted);
            info!("User {} has no quota left for {}", user, date);
            self.system_reply(sink, question, &self.settings.quota_notice())
                .await?;
            self.enter(user, RelayState::Done);
            return Ok(Outcome::QuotaExhausted {
                fresh_user: record.is_none(),
            });
        }

        self.enter(user, RelayState::CallingCompletion);
        let (answer, success) = match self.completion.complete(question).await {
            Ok(answer) => (answer, true),
            Err(e) => {
                warn!("Completion failed for {}: {}", user, e);
                (
                    format!("{}code: {}", COMPLETION_ERROR_MESSAGE, status_label(&e.status)),
                    false,
                )
            }
        };

        self.enter(
            user,
            if success {
                RelayState::RepliedSuccess
            } else {
                RelayState::RepliedFailure
            },
        );
        let text = compose_answer(ctx, &answer, &self.settings.signature);
        reply::reply(sink, &text, self.settings.max_chunk_size).await?;

        if !success {
            self.enter(user, RelayState::Done);
            return Ok(Outcome::Replied { success: false });
        }

        self.enter(user, RelayState::QuotaUpdating);
        let owner = user.to_string();
        let update = match record {
            Some(_) => self
                .with_store(move |store| store.consume_one(&owner, date))
                .await
                .map(|consumed| {
                    if !consumed {
                        warn!(
                            "Quota for {} on {} was used up by a concurrent message",
                            user, date
                        );
                    }
                }),
            None => {
                self.with_store(move |store| store.initialize_day(&owner, date))
                    .await
            }
        };
        self.enter(user, RelayState::Done);

        match update {
            Ok(()) => Ok(Outcome::Replied { success: true }),
            Err(e) => {
                error!("Failed to record quota usage for {}: {}", user, e);
                Ok(Outcome::StoreUnavailable)
            }
        }
    }

    async fn redeem(
        &self,
        user: &str,
        code: &str,
        date: NaiveDate,
        ctx: &TriggerContext,
        sink: &dyn ReplySink,
    ) -> Result<Outcome> {
        let question = ctx.cleaned_text.as_str();
        info!("User {} is redeeming a code", user);

        let accepted = match self.redemption.redeem(code).await {
            Ok(RedemptionOutcome::Accepted) => true,
            Ok(RedemptionOutcome::Rejected { code: status, message }) => {
                info!("Code rejected for {} ({}): {}", user, status, message);
                false
            }
            Err(e) => {
                warn!("Redemption call failed for {}: {}", user, e);
                false
            }
        };

        if !accepted {
            self.system_reply(sink, question, REDEMPTION_FAILED_MESSAGE)
                .await?;
            return Ok(Outcome::Redeemed { accepted: false });
        }

        let owner = user.to_string();
        let amount = self.settings.redemption_credit;
        match self
            .with_store(move |store| store.credit(&owner, date, amount))
            .await
        {
            Ok(count) => {
                info!("Credited {} with {}, now {}", user, self.settings.redemption_credit, count);
                self.system_reply(sink, question, &self.settings.redemption_success())
                    .await?;
                Ok(Outcome::Redeemed { accepted: true })
            }
            Err(e) => {
                error!(
                    user = user,
                    code = code,
                    "Code was consumed but the credit could not be stored"
                );
                self.store_unavailable(user, e, question, sink).await
            }
        }
    }

    async fn store_unavailable(
        &self,
        user: &str,
        err: Error,
        question: &str,
        sink: &dyn ReplySink,
    ) -> Result<Outcome> {
        error!("Quota store unavailable while handling {}: {}", user, err);
        self.system_reply(sink, question, STORE_UNAVAILABLE_MESSAGE)
            .await?;
        Ok(Outcome::StoreUnavailable)
    }

    /// Run a store call on the blocking pool; SQLite may wait on the file lock
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn QuotaStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref())).await?
    }

    /// Reply that quotes the question above a fixed notice
    async fn system_reply(&self, sink: &dyn ReplySink, question: &str, body: &str) -> Result<()> {
        let text = format!(
            "{}{}{}{}",
            question, QUESTION_SEPARATOR, body, self.settings.signature
        );
        reply::reply(sink, &text, self.settings.max_chunk_size).await
    }

    fn enter(&self, user: &str, state: RelayState) {
        debug!(user = user, state = ?state, "Relay state");
    }
}

/// Private replies carry just the answer, group replies quote the question first
pub fn compose_answer(ctx: &TriggerContext, answer: &str, signature: &str) -> String {
    if ctx.is_private_chat {
        format!("{}{}", answer, signature)
    } else {
        format!(
            "{}{}{}{}",
            ctx.cleaned_text, QUESTION_SEPARATOR, answer, signature
        )
    }
}
