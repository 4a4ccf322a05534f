//! `TelephonyResponse`: the six carrier verbs a turn can emit, rendered to a
//! TwiML-shaped XML document via a small hand-rolled `elem()` helper. No full
//! XML writer dependency is justified for five verbs (§4.10).

pub use quick_xml::escape::escape;

/// Build an XML element as a string. Mirrors the pack's minimal
/// encode-to-string approach for small, fixed element vocabularies.
fn elem(name: &str, attrs: &[(&str, String)], content: &str) -> String {
    let attrs_str = attrs
        .iter()
        .map(|(name, value)| format!("{name}=\"{}\"", escape(value)))
        .collect::<Vec<_>>()
        .join(" ");
    let escaped_content = escape(content);

    [
        "<",
        name,
        if attrs_str.is_empty() { "" } else { " " },
        &attrs_str,
        ">",
        &escaped_content,
        "</",
        name,
        ">",
    ]
    .concat()
}

fn self_closing(name: &str, attrs: &[(&str, String)]) -> String {
    let attrs_str = attrs
        .iter()
        .map(|(name, value)| format!("{name}=\"{}\"", escape(value)))
        .collect::<Vec<_>>()
        .join(" ");

    ["<", name, if attrs_str.is_empty() { "" } else { " " }, &attrs_str, "/>"].concat()
}

/// One carrier verb, or a sequence of them for turns that emit more than one
/// (e.g. `say` then `gather`).
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyResponse {
    Gather {
        prompt: Option<String>,
        action: String,
        timeout_secs: u32,
    },
    Say {
        text: String,
    },
    Pause {
        seconds: u32,
    },
    Dial {
        number: String,
        action: String,
        timeout_secs: u32,
        answer_on_media: bool,
    },
    Redirect {
        url: String,
    },
    Hangup,
    Sequence(Vec<TelephonyResponse>),
}

impl TelephonyResponse {
    pub fn say_then_gather(text: impl Into<String>, action: impl Into<String>, timeout_secs: u32) -> Self {
        Self::Sequence(vec![
            Self::Say { text: text.into() },
            Self::Gather {
                prompt: None,
                action: action.into(),
                timeout_secs,
            },
        ])
    }

    pub fn say_then_hangup(text: impl Into<String>) -> Self {
        Self::Sequence(vec![Self::Say { text: text.into() }, Self::Hangup])
    }

    /// Warm-transfer handoff: speak a brief hold message, then dial the
    /// human destination with answer-on-media so the two legs bridge as
    /// soon as audio arrives, without waiting for a carrier-level answer
    /// signal (§4.6 step 7, GLOSSARY "answer-on-media").
    pub fn say_then_dial(
        text: impl Into<String>,
        number: impl Into<String>,
        action: impl Into<String>,
        timeout_secs: u32,
    ) -> Self {
        Self::Sequence(vec![
            Self::Say { text: text.into() },
            Self::Dial {
                number: number.into(),
                action: action.into(),
                timeout_secs,
                answer_on_media: true,
            },
        ])
    }

    /// Render to the carrier's XML-shaped document, `<Response>` root
    /// wrapping one element per verb (a `Sequence` flattens to siblings).
    pub fn render(&self) -> String {
        let body = self.render_body();
        elem("Response", &[], &body)
    }

    fn render_body(&self) -> String {
        match self {
            Self::Gather {
                prompt,
                action,
                timeout_secs,
            } => {
                let inner = prompt
                    .as_deref()
                    .map(|text| elem("Say", &[], text))
                    .unwrap_or_default();
                elem(
                    "Gather",
                    &[
                        ("input", "dtmf speech".to_string()),
                        ("action", action.clone()),
                        ("timeout", timeout_secs.to_string()),
                    ],
                    &inner,
                )
            }
            Self::Say { text } => elem("Say", &[], text),
            Self::Pause { seconds } => self_closing("Pause", &[("length", seconds.to_string())]),
            Self::Dial {
                number,
                action,
                timeout_secs,
                answer_on_media,
            } => elem(
                "Dial",
                &[
                    ("action", action.clone()),
                    ("timeout", timeout_secs.to_string()),
                    ("answerOnBridge", answer_on_media.to_string()),
                ],
                number,
            ),
            Self::Redirect { url } => elem("Redirect", &[], url),
            Self::Hangup => self_closing("Hangup", &[]),
            Self::Sequence(items) => items.iter().map(Self::render_body).collect::<Vec<_>>().concat(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn say_renders_escaped_text() {
        let response = TelephonyResponse::Say {
            text: "Press 1 & wait".to_string(),
        };
        assert_eq!(response.render(), "<Response><Say>Press 1 &amp; wait</Say></Response>");
    }

    #[test]
    fn hangup_renders_self_closing() {
        assert_eq!(TelephonyResponse::Hangup.render(), "<Response><Hangup/></Response>");
    }

    #[test]
    fn say_then_gather_renders_both_verbs_in_order() {
        let response = TelephonyResponse::say_then_gather("thanks", "/voice/speech-turn", 5);
        let rendered = response.render();
        let say_pos = rendered.find("<Say>").unwrap();
        let gather_pos = rendered.find("<Gather").unwrap();
        assert!(say_pos < gather_pos);
    }

    #[test]
    fn dial_renders_number_as_content_and_answer_on_media_as_attribute() {
        let response = TelephonyResponse::Dial {
            number: "+1 555 0100".to_string(),
            action: "/voice/transfer-status".to_string(),
            timeout_secs: 30,
            answer_on_media: true,
        };
        let rendered = response.render();
        assert!(rendered.contains("<Dial action=\"/voice/transfer-status\" timeout=\"30\" answerOnBridge=\"true\">+1 555 0100</Dial>"));
    }

    #[test]
    fn say_then_dial_renders_both_verbs_in_order() {
        let response = TelephonyResponse::say_then_dial("Hold on, please.", "+15559999", "/voice/transfer-status", 30);
        let rendered = response.render();
        let say_pos = rendered.find("<Say>").unwrap();
        let dial_pos = rendered.find("<Dial").unwrap();
        assert!(say_pos < dial_pos);
    }
}
