//! Parses a raw LLM completion into the messages it wants sent plus the
//! out-of-band action it requested (§4.6.1/§8). Grounded on the original
//! `ResponseParser`: a command-tag extraction pass, a `|||`-delimited split,
//! then a per-message cleanup pass (lowercase the leading character,
//! strip trailing periods, collapse whitespace).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueAction {
    Continue,
    SendLinks,
    NegativeFinish,
    CreativeSent,
    Handoff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub messages: Vec<String>,
    pub action: DialogueAction,
    pub raw: String,
}

impl ParsedResponse {
    pub fn has_messages(&self) -> bool {
        self.messages.iter().any(|m| !m.trim().is_empty())
    }
}

const SEPARATOR: &str = "|||";

/// Parses a raw completion. Commands are matched case-insensitively and the
/// first one found wins precedence in the order SEND_LINKS, NEGATIVE_FINISH,
/// CREATIVE_SENT, HANDOFF — an LLM emitting more than one in the same
/// response is malformed input, not something worth modeling further.
pub fn parse(response: &str) -> ParsedResponse {
    if response.is_empty() {
        return ParsedResponse {
            messages: Vec::new(),
            action: DialogueAction::Continue,
            raw: response.to_string(),
        };
    }

    let action = extract_action(response);
    let clean_text = strip_commands(response);
    let messages: Vec<String> = split_messages(&clean_text)
        .into_iter()
        .map(clean_message)
        .filter(|m| !m.is_empty())
        .collect();

    ParsedResponse {
        messages,
        action,
        raw: response.to_string(),
    }
}

fn extract_action(text: &str) -> DialogueAction {
    let upper = text.to_uppercase();
    if upper.contains("[SEND_LINKS]") {
        DialogueAction::SendLinks
    } else if upper.contains("[NEGATIVE_FINISH]") {
        DialogueAction::NegativeFinish
    } else if upper.contains("[CREATIVE_SENT]") {
        DialogueAction::CreativeSent
    } else if upper.contains("[HANDOFF]") {
        DialogueAction::Handoff
    } else {
        DialogueAction::Continue
    }
}

const COMMANDS: &[&str] = &["SEND_LINKS", "NEGATIVE_FINISH", "CREATIVE_SENT", "HANDOFF"];

/// Removes every `[COMMAND]` tag from the text, case-insensitively,
/// regardless of how many appear.
fn strip_commands(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = rest.find('[') else {
            result.push_str(rest);
            break;
        };
        let Some(end_rel) = rest[start..].find(']') else {
            result.push_str(rest);
            break;
        };
        let end = start + end_rel;
        let inner = &rest[start + 1..end];
        if COMMANDS.iter().any(|c| c.eq_ignore_ascii_case(inner)) {
            result.push_str(&rest[..start]);
        } else {
            result.push_str(&rest[..=end]);
        }
        rest = &rest[end + 1..];
    }
    result.trim().to_string()
}

fn split_messages(text: &str) -> Vec<String> {
    if !text.contains(SEPARATOR) {
        let trimmed = text.trim();
        return if trimmed.is_empty() { Vec::new() } else { vec![trimmed.to_string()] };
    }
    text.split(SEPARATOR)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn clean_message(text: String) -> String {
    let mut text = text.trim().to_string();
    if text.is_empty() {
        return text;
    }

    let mut chars = text.chars();
    if let (Some(first), Some(second)) = (chars.next(), chars.next()) {
        if first.is_uppercase() && second.is_lowercase() {
            let rest: String = text.chars().skip(1).collect();
            text = first.to_lowercase().collect::<String>() + &rest;
        }
    }

    while text.ends_with('.') {
        text.truncate(text.len() - 1);
        text = text.trim_end().to_string();
    }

    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_matches('|').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_continues() {
        let parsed = parse("привет, как дела");
        assert_eq!(parsed.messages, vec!["привет, как дела"]);
        assert_eq!(parsed.action, DialogueAction::Continue);
    }

    #[test]
    fn separator_splits_into_multiple_messages() {
        let parsed = parse("первое ||| второе");
        assert_eq!(parsed.messages, vec!["первое", "второе"]);
        assert_eq!(parsed.action, DialogueAction::Continue);
    }

    #[test]
    fn send_links_command_extracted_and_stripped() {
        let parsed = parse("лови ссылку [SEND_LINKS]");
        assert_eq!(parsed.messages, vec!["лови ссылку"]);
        assert_eq!(parsed.action, DialogueAction::SendLinks);
    }

    #[test]
    fn negative_finish_command_extracted_and_stripped() {
        let parsed = parse("ок, удачи [NEGATIVE_FINISH]");
        assert_eq!(parsed.messages, vec!["ок, удачи"]);
        assert_eq!(parsed.action, DialogueAction::NegativeFinish);
    }

    #[test]
    fn bare_handoff_yields_no_messages() {
        let parsed = parse("[HANDOFF]");
        assert!(parsed.messages.is_empty());
        assert_eq!(parsed.action, DialogueAction::Handoff);
    }

    #[test]
    fn empty_separator_segments_are_dropped() {
        let parsed = parse("раз ||| ||| два");
        assert_eq!(parsed.messages, vec!["раз", "два"]);
    }

    #[test]
    fn leading_capital_is_lowercased_and_trailing_period_stripped() {
        let parsed = parse("Всё понял.");
        assert_eq!(parsed.messages, vec!["всё понял"]);
    }

    #[test]
    fn empty_response_yields_continue_with_no_messages() {
        let parsed = parse("");
        assert!(parsed.messages.is_empty());
        assert_eq!(parsed.action, DialogueAction::Continue);
    }
}
