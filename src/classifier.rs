//! Message classification
//!
//! Filters out messages the bot must never answer (its own, non-text, platform
//! service accounts, system notices) and detects whether a message addresses the bot.

use crate::config::Config;
use crate::message::{InboundMessage, MessageKind};
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

/// Why a message was not handed to the relay
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    SelfMessage,
    NonText(MessageKind),
    SystemAccount,
    Noise(&'static str),
    NotTriggered,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::SelfMessage => write!(f, "self_message"),
            SkipReason::NonText(kind) => write!(f, "non_text:{:?}", kind),
            SkipReason::SystemAccount => write!(f, "system_account"),
            SkipReason::Noise(name) => write!(f, "noise:{}", name),
            SkipReason::NotTriggered => write!(f, "not_triggered"),
        }
    }
}

/// Per-message trigger result
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerContext {
    pub is_private_chat: bool,
    pub triggered: bool,
    /// Question text with quote, mention and keyword removed
    pub cleaned_text: String,
    /// Full group trigger, `@<bot> <keyword>`
    pub bot_mention: String,
}

/// Reserved platform account that posts system notifications
const SYSTEM_ACCOUNT: &str = "微信团队";

/// Sender name fragments that mark official service accounts
static SERVICE_MARKERS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([regex::escape("微信"), regex::escape("腾讯")])
        .expect("Invalid service marker regex")
});

/// Client notices that carry no question
static NOISE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("收到一条视频/语音聊天消息，请在手机上查看", "call_notice"),
        ("收到红包，请在手机上查看", "red_envelope"),
        ("/cgi-bin/mmwebwx-bin/webwxgetpubliclinkimg", "media_link"),
    ]
    .into_iter()
    .map(|(literal, name)| {
        (
            Regex::new(&regex::escape(literal)).expect("Invalid noise regex"),
            name,
        )
    })
    .collect()
});

/// Separator clients insert between a quoted message and the reply to it
pub const QUOTE_SEPARATOR: &str = "- - - - - - - - - - - - - - -";

/// Decide whether a message may be processed at all
pub fn check_eligibility(
    is_self: bool,
    sender_name: &str,
    kind: MessageKind,
    raw_text: &str,
) -> Result<(), SkipReason> {
    if is_self {
        return Err(SkipReason::SelfMessage);
    }
    if kind != MessageKind::Text {
        return Err(SkipReason::NonText(kind));
    }
    if sender_name == SYSTEM_ACCOUNT || SERVICE_MARKERS.is_match(sender_name) {
        return Err(SkipReason::SystemAccount);
    }
    for (pattern, name) in NOISE_PATTERNS.iter() {
        if pattern.is_match(raw_text) {
            return Err(SkipReason::Noise(name));
        }
    }
    Ok(())
}

pub fn is_eligible(is_self: bool, sender_name: &str, kind: MessageKind, raw_text: &str) -> bool {
    check_eligibility(is_self, sender_name, kind, raw_text).is_ok()
}

/// Group trigger as typed by users: `@<bot> <keyword>`
pub fn group_trigger(bot_name: &str, trigger_keyword: &str) -> String {
    format!("@{} {}", bot_name, trigger_keyword)
}

/// Detect whether `raw_text` addresses the bot and extract the question
pub fn detect_trigger(
    raw_text: &str,
    is_private_chat: bool,
    bot_name: &str,
    trigger_keyword: &str,
) -> TriggerContext {
    let bot_mention = group_trigger(bot_name, trigger_keyword);

    let triggered = if is_private_chat {
        trigger_keyword.is_empty() || raw_text.starts_with(trigger_keyword)
    } else {
        // The character after the mention differs between clients, so skip
        // it rather than matching a space.
        let mention = format!("@{}", bot_name);
        raw_text.starts_with(&mention)
            && skip_chars(raw_text, mention.chars().count() + 1).starts_with(trigger_keyword)
    };

    let prefix_len = if is_private_chat {
        trigger_keyword.chars().count()
    } else {
        bot_mention.chars().count()
    };
    let cleaned_text = skip_chars(strip_quote(raw_text), prefix_len);

    TriggerContext {
        is_private_chat,
        triggered,
        cleaned_text,
        bot_mention,
    }
}

/// Keep only the text after the last quote separator
fn strip_quote(raw_text: &str) -> &str {
    raw_text
        .rsplit_once(QUOTE_SEPARATOR)
        .map(|(_, reply)| reply)
        .unwrap_or(raw_text)
}

fn skip_chars(text: &str, n: usize) -> String {
    text.chars().skip(n).collect()
}

/// Eligibility + trigger detection bound to the configured bot identity
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    bot_name: String,
    trigger_keyword: String,
}

impl MessageClassifier {
    pub fn new(config: &Config) -> Self {
        Self::with_identity(&config.bot_name, &config.trigger_keyword)
    }

    pub fn with_identity(bot_name: &str, trigger_keyword: &str) -> Self {
        Self {
            bot_name: bot_name.to_string(),
            trigger_keyword: trigger_keyword.to_string(),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn trigger_keyword(&self) -> &str {
        &self.trigger_keyword
    }

    pub fn group_trigger(&self) -> String {
        group_trigger(&self.bot_name, &self.trigger_keyword)
    }

    /// Classify a message; Ok only when it is eligible and triggered
    pub fn classify(&self, msg: &InboundMessage) -> Result<TriggerContext, SkipReason> {
        check_eligibility(msg.is_self, &msg.sender_name, msg.kind, &msg.text)?;

        let ctx = detect_trigger(
            &msg.text,
            msg.is_private_chat(),
            &self.bot_name,
            &self.trigger_keyword,
        );
        if !ctx.triggered {
            return Err(SkipReason::NotTriggered);
        }
        tracing::info!("Bot triggered: {}", msg.text);
        Ok(ctx)
    }
}
