//! Spoken mode commands
//!
//! Transcripts are normalized before matching: Unicode NFKC (folds full-width
//! punctuation, ideographic spaces and half-width katakana), surrounding
//! whitespace trimmed, trailing sentence punctuation dropped.
//!
//! - `パーソナル<sep><name>` switches to PERSONAL. The separator must follow the
//!   keyword directly and exactly one name token must follow it.
//! - `ルーム` or `ルームに戻る` switches back to ROOM. Exact match only.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

const TRAILING_PUNCTUATION: &[char] = &['。', '．', '.', '！', '!', '？', '?', '、', ','];

const ROOM_COMMANDS: &[&str] = &["ルーム", "ルームに戻る"];

/// A recognized mode command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Personal { name: String },
    Room,
}

fn personal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^パーソナル[、,\s]+([^、,\s]+)$").expect("personal command pattern is valid")
    })
}

/// Normalize a transcript for command matching and chat input
pub fn normalize_utterance(text: &str) -> String {
    let folded: String = text.nfkc().collect();
    folded
        .trim()
        .trim_end_matches(TRAILING_PUNCTUATION)
        .trim_end()
        .to_string()
}

/// Recognize a mode command in an already normalized utterance
pub fn parse_command(normalized: &str) -> Option<Command> {
    if ROOM_COMMANDS.contains(&normalized) {
        return Some(Command::Room);
    }

    personal_pattern()
        .captures(normalized)
        .and_then(|caps| caps.get(1))
        .map(|name| Command::Personal {
            name: name.as_str().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<Command> {
        parse_command(&normalize_utterance(text))
    }

    #[test]
    fn test_personal_with_separator() {
        assert_eq!(
            parse("パーソナル、ゆうた"),
            Some(Command::Personal {
                name: "ゆうた".to_string()
            })
        );
    }

    #[test]
    fn test_personal_with_full_width_space_and_period() {
        assert_eq!(
            parse("パーソナル　さくら。"),
            Some(Command::Personal {
                name: "さくら".to_string()
            })
        );
    }

    #[test]
    fn test_personal_without_separator_is_not_a_command() {
        assert_eq!(parse("パーソナルください"), None);
        assert_eq!(parse("パーソナルゆうた"), None);
    }

    #[test]
    fn test_personal_requires_exactly_one_name() {
        assert_eq!(parse("パーソナル、ゆうた くん"), None);
        assert_eq!(parse("パーソナル、"), None);
        assert_eq!(parse("ねえ パーソナル、ゆうた"), None);
    }

    #[test]
    fn test_room_exact_match() {
        assert_eq!(parse("ルームに戻る"), Some(Command::Room));
        assert_eq!(parse("ルーム"), Some(Command::Room));
        assert_eq!(parse("ルームに戻る！"), Some(Command::Room));
    }

    #[test]
    fn test_room_with_trailing_text_is_not_a_command() {
        assert_eq!(parse("ルームに戻るよ"), None);
        assert_eq!(parse("ルームって何"), None);
    }

    #[test]
    fn test_half_width_katakana_is_folded() {
        assert_eq!(parse("ﾙｰﾑ"), Some(Command::Room));
    }

    #[test]
    fn test_normalize_trims() {
        assert_eq!(normalize_utterance("  こんにちは！ "), "こんにちは");
        assert_eq!(normalize_utterance("   "), "");
    }
}
