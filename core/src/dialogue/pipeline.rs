//! The inbound-turn pipeline (§4.6.2): the hardest piece of the dialogue
//! engine, because it fuses five independently-evolved heuristics (media-
//! spam detection, interest scoring, rejection detection, link-request
//! detection, goal-delivery detection) into one mutually-exclusive branch
//! selection. Grounded step-for-step on the original `DialogueService`
//! methods of the same name, reproduced here as free functions over
//! [`Dialogue`]/[`Campaign`] rather than methods on a service object with
//! injected repositories — the repository side effects (saving the target,
//! bumping campaign stats, appending to the result file) are reported back
//! to the caller via [`TurnOutcome`] instead of being performed inline,
//! since this module has no persistence dependency of its own.

use crate::model::{Campaign, Dialogue, DialogueStatus, Message, MessageRole};

use super::firstmsg;
use super::humanizer::humanize_text;
use super::lexicon::*;
use super::llm::{generate_with_fallback, ChatMessage, GenerateRequest, LlmProvider};
use super::parser::{self, DialogueAction};

/// Why a dialogue/target terminated mid-turn, for the caller to propagate
/// into target/campaign state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    MediaSpam,
    UserRejected,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Messages to actually send, in order. Empty means no reply goes out
    /// this turn (the media-spam gate tripped).
    pub reply_parts: Vec<String>,
    pub ai_generated: bool,
    pub tokens_used: u32,
    /// Set when this turn ended the dialogue outright.
    pub terminated: Option<TerminationReason>,
    /// Set when this turn is the one that satisfied the campaign goal.
    pub goal_reached: bool,
    /// Set when the dialogue moved from `initiated` to `active` this turn.
    pub became_active: bool,
    /// The parsed action from an LLM-generated reply; `Continue` for every
    /// scripted/link branch, since those never carry a command tag.
    pub action: DialogueAction,
}

impl TurnOutcome {
    fn spam_gated() -> Self {
        Self {
            reply_parts: Vec::new(),
            ai_generated: false,
            tokens_used: 0,
            terminated: Some(TerminationReason::MediaSpam),
            goal_reached: false,
            became_active: false,
            action: DialogueAction::Continue,
        }
    }
}

/// Runs the full §4.6.2 pipeline for one incoming (already batched) user
/// turn against an active dialogue, mutating it in place, and returns what
/// the caller (the account worker) needs to send and record.
pub async fn process_inbound_turn(
    dialogue: &mut Dialogue,
    campaign: &Campaign,
    llm: &dyn LlmProvider,
    text: &str,
) -> Result<TurnOutcome, crate::error::LlmError> {
    // a. Media-spam gate — evaluated against history as it stood before this
    // turn, exactly like the consecutive-media count in the source.
    if is_media_spam(dialogue, text) {
        dialogue.mark_failed("media_spam");
        return Ok(TurnOutcome::spam_gated());
    }

    let goal_already_sent = dialogue.goal_message_sent;
    let status_before = dialogue.status;

    // b. Append user message.
    let _ = dialogue.add_message(MessageRole::User, text.to_string(), None, false, 0, false);

    // c. Interest score update.
    dialogue.interest_score = (dialogue.interest_score + interest_delta(text)).clamp(0, INTEREST_CAP);

    // d. Rejection gate, only once the goal has been offered.
    if goal_already_sent && is_rejection(text) {
        let reply = REJECTION_RESPONSE_POOL[rand::random::<usize>() % REJECTION_RESPONSE_POOL.len()];
        let _ = dialogue.add_message(MessageRole::Account, reply.to_string(), None, false, 0, false);
        dialogue.mark_failed("user_rejected");
        return Ok(TurnOutcome {
            reply_parts: vec![reply.to_string()],
            ai_generated: false,
            tokens_used: 0,
            terminated: Some(TerminationReason::UserRejected),
            goal_reached: false,
            became_active: false,
            action: DialogueAction::Continue,
        });
    }

    // e. State transition (add_message already flipped initiated→active).
    let became_active = status_before == DialogueStatus::Initiated && dialogue.status == DialogueStatus::Active;

    // f. Branch selection, first match wins.
    let (reply_parts, ai_generated, tokens_used, action) =
        if is_explicit_link_request(text) && !dialogue.goal_message_sent {
            (vec![compose_link_response(dialogue, campaign)], false, 0, DialogueAction::Continue)
        } else if is_consent_after_channel_mention(dialogue, text) && !dialogue.goal_message_sent {
            (vec![compose_link_response(dialogue, campaign)], false, 0, DialogueAction::Continue)
        } else if is_soft_interest(text)
            && dialogue.user_message_count() >= 3
            && dialogue.interest_score >= 1
            && !dialogue.goal_message_sent
        {
            (vec![compose_link_response(dialogue, campaign)], false, 0, DialogueAction::Continue)
        } else if dialogue.account_message_count() == 1 {
            let msg = SECOND_MESSAGE_POOL[rand::random::<usize>() % SECOND_MESSAGE_POOL.len()];
            (vec![msg.to_string()], false, 0, DialogueAction::Continue)
        } else {
            let response = generate_response(dialogue, campaign, llm).await?;
            let parsed = parser::parse(&response.content);
            let humanized: Vec<String> = parsed
                .messages
                .iter()
                .map(|m| humanize_text(m))
                .filter(|m| !m.is_empty())
                .collect();
            (humanized, true, response.total_tokens, parsed.action)
        };

    // g. Append our reply.
    let joined_reply = reply_parts.join(" ");
    if !reply_parts.is_empty() {
        let _ = dialogue.add_message(
            MessageRole::Account,
            joined_reply.clone(),
            None,
            ai_generated,
            tokens_used,
            false,
        );
    }

    // h. Goal check — only the turn that first satisfies it counts, so a
    // repeat link resend doesn't re-trigger campaign stats.
    let goal_reached = !goal_already_sent && goal_satisfied(campaign, &joined_reply);
    if goal_reached {
        dialogue.mark_goal_reached();
    }

    // i. Schedule next action.
    dialogue.next_action_at = Some(chrono::Utc::now() + chrono::Duration::hours(24));

    Ok(TurnOutcome {
        reply_parts,
        ai_generated,
        tokens_used,
        terminated: None,
        goal_reached,
        became_active,
        action,
    })
}

/// Picks the scripted first outbound message for a brand-new dialogue
/// (§4.6.6) — a thin re-export so callers only need this module.
pub fn first_message() -> String {
    firstmsg::generate_first_message()
}

fn is_media_spam(dialogue: &Dialogue, current_text: &str) -> bool {
    if !is_media_message(current_text) {
        return false;
    }
    let mut consecutive = 1usize;
    for msg in dialogue.messages.iter().rev().filter(|m| m.role == MessageRole::User) {
        if is_media_message(&msg.content) {
            consecutive += 1;
        } else {
            break;
        }
    }
    consecutive >= MEDIA_SPAM_THRESHOLD
}

fn is_media_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    MEDIA_SPAM_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn interest_delta(text: &str) -> i32 {
    let t = text.to_lowercase();
    let mut delta = 0;
    if INTEREST_TRADING_APPROACH.0.iter().any(|w| t.contains(w)) {
        delta += INTEREST_TRADING_APPROACH.1;
    }
    if INTEREST_SIGNALS.0.iter().any(|w| t.contains(w)) {
        delta += INTEREST_SIGNALS.1;
    }
    if INTEREST_CHANNEL_MENTION.0.iter().any(|w| t.contains(w)) {
        delta += INTEREST_CHANNEL_MENTION.1;
    }
    if INTEREST_POSITIVE.0.iter().any(|w| t.contains(w)) {
        delta += INTEREST_POSITIVE.1;
    }
    delta.min(INTEREST_CAP)
}

fn is_explicit_link_request(text: &str) -> bool {
    let t = text.to_lowercase();
    EXPLICIT_LINK_REQUEST_TRIGGERS.iter().any(|tr| t.contains(tr))
}

fn is_soft_interest(text: &str) -> bool {
    let t = text.to_lowercase();
    let t = t.trim();
    if is_rejection(text) {
        return false;
    }
    if SOFT_INTEREST_SHORT_POSITIVES.contains(&t) {
        return true;
    }
    SOFT_INTEREST_KEYWORDS.iter().any(|k| t.contains(k))
}

fn is_rejection(text: &str) -> bool {
    let t = text.to_lowercase();
    let t = t.trim();
    if REJECTION_EXACT.contains(&t) {
        return true;
    }
    if REJECTION_PHRASES.iter().any(|p| t.contains(p)) {
        return true;
    }
    if t.chars().count() < REJECTION_PREFIX_MAX_LEN
        && REJECTION_PREFIXES.iter().any(|p| t.starts_with(p))
    {
        return true;
    }
    false
}

fn is_consent_after_channel_mention(dialogue: &Dialogue, text: &str) -> bool {
    let t = text.to_lowercase();
    let t = t.trim();
    if !CONSENT_SHORT_POSITIVES.contains(&t) {
        return false;
    }
    let Some(last_our) = dialogue.last_account_message() else {
        return false;
    };
    let last_text = last_our.content.to_lowercase();
    CHANNEL_MENTION_WORDS.iter().any(|w| last_text.contains(w))
}

/// Public so the worker's `SEND_LINKS` action side-effect (§4.8 inbound
/// handling step 6) can compose the same link message outside the
/// branch-selection pipeline.
pub fn compose_link_response(dialogue: &mut Dialogue, campaign: &Campaign) -> String {
    dialogue.goal_message_sent = true;
    dialogue.goal_message_sent_at = Some(chrono::Utc::now());

    let intro = if dialogue.link_sent_count > 0 {
        LINK_INTRO_REPEAT.to_string()
    } else {
        LINK_INTROS_SINGLE[rand::random::<usize>() % LINK_INTROS_SINGLE.len()].to_string()
    };
    dialogue.link_sent_count += 1;

    let link = campaign.goal.target_url.clone().unwrap_or_default();
    let post = LINK_POST_MESSAGES[rand::random::<usize>() % LINK_POST_MESSAGES.len()];

    format!("{intro}\n\n{link}\n\n{post}")
}

fn goal_satisfied(campaign: &Campaign, reply: &str) -> bool {
    if let Some(url) = &campaign.goal.target_url {
        if !url.is_empty() {
            return reply.contains(url.as_str());
        }
    }
    if let Some(target_message) = &campaign.goal.target_message {
        let target_message_lower = target_message.to_lowercase();
        let keywords: Vec<&str> = target_message_lower.split_whitespace().take(5).collect();
        if keywords.is_empty() {
            return false;
        }
        let reply_lower = reply.to_lowercase();
        let matches = keywords.iter().filter(|kw| reply_lower.contains(*kw)).count();
        return matches as f64 >= keywords.len() as f64 * 0.6;
    }
    false
}

async fn generate_response(
    dialogue: &Dialogue,
    campaign: &Campaign,
    llm: &dyn LlmProvider,
) -> Result<super::llm::GenerateResponse, crate::error::LlmError> {
    let mut system_prompt = if campaign.prompt.system_prompt.trim().is_empty() {
        DEFAULT_SYSTEM_PROMPT.to_string()
    } else {
        campaign.system_prompt()
    };
    system_prompt.push_str(CRITICAL_RULES_BLOCK);

    let recent_questions: Vec<&str> = dialogue
        .messages
        .iter()
        .rev()
        .take(6)
        .filter(|m| m.role == MessageRole::Account && m.content.contains('?'))
        .map(|m| m.content.as_str())
        .take(3)
        .collect();
    if !recent_questions.is_empty() {
        system_prompt.push_str(&format!(
            "\n\nТы уже спрашивал: {}\nНЕ ПОВТОРЯЙ эти вопросы.",
            recent_questions.join("; ")
        ));
    }

    let our_messages = dialogue.account_message_count() as u32;
    let min_before_goal = if campaign.goal.min_messages_before_goal > 0 {
        campaign.goal.min_messages_before_goal
    } else {
        5
    };
    if !dialogue.goal_message_sent {
        if our_messages >= min_before_goal {
            system_prompt.push_str(STAGE_HINT_CHANNEL_NOW);
        } else if our_messages + 2 >= min_before_goal {
            system_prompt.push_str(STAGE_HINT_CHANNEL_SOON);
        }
    }

    let history: Vec<ChatMessage> = dialogue
        .conversation_history(8)
        .into_iter()
        .map(|(role, content)| ChatMessage { role, content: content.to_string() })
        .collect();

    let request = GenerateRequest {
        system_prompt: &system_prompt,
        history,
        model: &campaign.ai.model,
        temperature: 0.8,
        max_tokens: campaign.ai.max_tokens,
    };

    generate_with_fallback(llm, request, None).await
}

#[allow(dead_code)]
fn mark_message_role(message: &Message) -> MessageRole {
    message.role
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct StubLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn generate(
            &self,
            _request: GenerateRequest<'_>,
        ) -> Result<super::super::llm::GenerateResponse, crate::error::LlmError> {
            Ok(super::super::llm::GenerateResponse {
                content: self.response.clone(),
                total_tokens: 12,
            })
        }
    }

    fn dialogue_with(account_messages: usize) -> Dialogue {
        let mut d = Dialogue::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 1);
        d.mark_initiated();
        for i in 0..account_messages {
            d.add_message(MessageRole::Account, format!("msg{i}"), None, true, 0, false).unwrap();
        }
        d
    }

    fn campaign_with_url(url: &str) -> Campaign {
        let mut c = Campaign::new("test".into());
        c.prompt.system_prompt = "персона".into();
        c.goal.target_url = Some(url.to_string());
        c
    }

    #[tokio::test]
    async fn media_spam_after_three_in_a_row_ends_dialogue() {
        let mut d = dialogue_with(0);
        d.add_message(MessageRole::User, "[стикер]".into(), None, false, 0, false).unwrap();
        d.add_message(MessageRole::User, "[фото]".into(), None, false, 0, false).unwrap();
        let campaign = campaign_with_url("https://t.me/x");
        let llm = StubLlm { response: "irrelevant".into() };
        let outcome = process_inbound_turn(&mut d, &campaign, &llm, "[видео]").await.unwrap();
        assert_eq!(outcome.terminated, Some(TerminationReason::MediaSpam));
        assert!(outcome.reply_parts.is_empty());
        assert_eq!(d.status, DialogueStatus::Failed);
    }

    #[tokio::test]
    async fn explicit_link_request_sends_link_without_calling_llm() {
        let mut d = dialogue_with(2);
        let campaign = campaign_with_url("https://t.me/x");
        let llm = StubLlm { response: "should not be used".into() };
        let outcome = process_inbound_turn(&mut d, &campaign, &llm, "скинь ссылку плиз").await.unwrap();
        assert!(!outcome.ai_generated);
        assert!(outcome.reply_parts[0].contains("https://t.me/x"));
        assert!(d.goal_message_sent);
    }

    #[tokio::test]
    async fn second_outbound_shortcut_skips_llm() {
        let mut d = dialogue_with(1);
        let campaign = campaign_with_url("https://t.me/x");
        let llm = StubLlm { response: "should not be used".into() };
        let outcome = process_inbound_turn(&mut d, &campaign, &llm, "норм").await.unwrap();
        assert!(!outcome.ai_generated);
        assert!(SECOND_MESSAGE_POOL.contains(&outcome.reply_parts[0].as_str()));
    }

    #[tokio::test]
    async fn rejection_after_goal_offered_ends_dialogue() {
        let mut d = dialogue_with(2);
        d.goal_message_sent = true;
        let campaign = campaign_with_url("https://t.me/x");
        let llm = StubLlm { response: "irrelevant".into() };
        let outcome = process_inbound_turn(&mut d, &campaign, &llm, "не, спасибо").await.unwrap();
        assert_eq!(outcome.terminated, Some(TerminationReason::UserRejected));
        assert_eq!(d.status, DialogueStatus::Failed);
    }

    #[tokio::test]
    async fn llm_branch_detects_goal_delivery_from_reply_content() {
        let mut d = dialogue_with(3);
        let campaign = campaign_with_url("https://t.me/mychannel");
        let llm = StubLlm { response: "го го вот https://t.me/mychannel заходи".into() };
        let outcome = process_inbound_turn(&mut d, &campaign, &llm, "расскажи про канал подробнее пожалуйста").await.unwrap();
        assert!(outcome.goal_reached);
        assert_eq!(d.status, DialogueStatus::GoalReached);
    }
}
