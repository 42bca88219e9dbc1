//! Makes an LLM-generated reply read like something a person typed in a
//! hurry rather than a model's output: strips any command tags that leaked
//! through, collapses the reply to at most one question, and applies small
//! randomized imperfections (dropped commas, lowercase start, no trailing
//! period) so repeated outbound messages don't share an obvious shape.
//! Grounded on the original `Humanizer.humanize_text`/`_limit_questions`.

use rand::Rng;

use super::lexicon::FORMAL_PREFIX_REPLACEMENTS;

const LOWERCASE_FIRST_PROBABILITY: f64 = 0.7;
const DROP_COMMA_PROBABILITY: f64 = 0.25;
const DROP_TRAILING_PERIOD_PROBABILITY: f64 = 0.3;

/// Applies the full humanization pipeline to one message, in the fixed
/// order the original uses: strip commands → limit to one question →
/// lowercase first letter → drop commas → collapse double spaces → maybe
/// drop trailing period → turn `!` into `.` → apply one formal→casual
/// prefix swap.
pub fn humanize_text(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let mut result = strip_command_artifacts(text);
    result = limit_questions(&result);

    let mut rng = rand::thread_rng();

    if let Some(first) = result.chars().next() {
        if first.is_uppercase() && rng.gen_bool(LOWERCASE_FIRST_PROBABILITY) {
            let rest: String = result.chars().skip(1).collect();
            result = first.to_lowercase().collect::<String>() + &rest;
        }
    }

    result = result
        .chars()
        .filter(|&c| !(c == ',' && rng.gen_bool(DROP_COMMA_PROBABILITY)))
        .collect();

    while result.contains("  ") {
        result = result.replace("  ", " ");
    }

    if result.ends_with('.') && rng.gen_bool(DROP_TRAILING_PERIOD_PROBABILITY) {
        result.pop();
    }

    result = result.replace('!', ".");

    for (formal, casual) in FORMAL_PREFIX_REPLACEMENTS {
        if let Some(rest) = result.strip_prefix(formal) {
            result = format!("{casual}{rest}");
            break;
        }
    }

    result.trim().to_string()
}

/// Strips the four known dialogue-action tags plus any other
/// `[SOME_THING_LIKE_THAT]` bracketed artifact an LLM occasionally echoes
/// back — the original matches any bracketed span containing an
/// underscore, not just the known command set, since stray tags wander
/// outside that set too.
fn strip_command_artifacts(text: &str) -> String {
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
        if inner.contains('_') {
            result.push_str(&rest[..start]);
        } else {
            result.push_str(&rest[..=end]);
        }
        rest = &rest[end + 1..];
    }
    result.trim().to_string()
}

/// Keeps every non-question sentence plus only the first question sentence,
/// dropping any further questions entirely (not just their `?`). Sentences
/// are delimited by `.`, `!`, `?`, each kept attached to its punctuation;
/// a final fragment with no terminator is kept as-is.
fn limit_questions(text: &str) -> String {
    if !text.contains('?') {
        return text.to_string();
    }

    let mut sentences = Vec::new();
    let mut buf = String::new();
    for ch in text.chars() {
        buf.push(ch);
        if ch == '.' || ch == '!' || ch == '?' {
            let trimmed = buf.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            buf.clear();
        }
    }
    let trailing = buf.trim();
    if !trailing.is_empty() {
        sentences.push(trailing.to_string());
    }

    if sentences.is_empty() {
        return text.to_string();
    }

    let mut kept = Vec::new();
    let mut seen_question = false;
    for sentence in sentences {
        if sentence.contains('?') {
            if !seen_question {
                kept.push(sentence);
                seen_question = true;
            }
        } else {
            kept.push(sentence);
        }
    }

    let joined = kept.join(" ").trim().to_string();
    if joined.is_empty() { text.to_string() } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_first_question() {
        let result = limit_questions("норм тема. ты сам торгуешь? а на чем сидишь? заходи если че.");
        assert_eq!(result, "норм тема. ты сам торгуешь? заходи если че.");
    }

    #[test]
    fn leaves_question_free_text_untouched() {
        let result = limit_questions("просто текст без вопросов.");
        assert_eq!(result, "просто текст без вопросов.");
    }

    #[test]
    fn strips_known_and_unknown_bracket_artifacts() {
        let result = strip_command_artifacts("го покидаю [SEND_LINKS] окей [RANDOM_TAG] го");
        assert_eq!(result, "го покидаю  окей  го");
    }

    #[test]
    fn leaves_non_underscore_brackets_alone() {
        let result = strip_command_artifacts("курс [BTC] растет");
        assert_eq!(result, "курс [BTC] растет");
    }

    #[test]
    fn exclamation_always_becomes_period() {
        let result = humanize_text("огонь!");
        assert!(!result.contains('!'));
    }
}
