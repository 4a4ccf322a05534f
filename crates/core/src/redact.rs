//! Log-safe renderings of fields a production deployment must never write to
//! disk in full: phone numbers and caller transcript text. Handlers format
//! with these instead of the raw `String` when a value is headed for
//! `tracing`, never when it's headed for the LLM, history sink, or carrier.

use std::fmt;

/// Keeps the last 2 digits of a phone number, masks the rest. Short enough
/// values (no recognizable number) are masked entirely rather than risk
/// leaking a partial match.
pub struct RedactedPhone<'a>(pub &'a str);

impl fmt::Display for RedactedPhone<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits: Vec<char> = self.0.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() <= 2 {
            write!(f, "***")
        } else {
            let tail: String = digits[digits.len() - 2..].iter().collect();
            write!(f, "***{tail}")
        }
    }
}

/// Replaces transcript/utterance text with its length only. The content
/// itself is never a safe thing to persist in a log line.
pub struct RedactedText<'a>(pub &'a str);

impl fmt::Display for RedactedText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} chars redacted>", self.0.chars().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_keeps_only_last_two_digits() {
        assert_eq!(RedactedPhone("+15550100").to_string(), "***00");
    }

    #[test]
    fn short_input_fully_masked() {
        assert_eq!(RedactedPhone("5").to_string(), "***");
    }

    #[test]
    fn text_reports_length_not_content() {
        assert_eq!(RedactedText("transfer me please").to_string(), "<19 chars redacted>");
    }
}
