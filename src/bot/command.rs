//! Classification of inbound text into commands.

use crate::bot::prompts;

/// What an inbound text message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`, optionally carrying a deep-link payload.
    Start { payload: Option<String> },
    /// The "talk" menu button.
    Talk,
    /// The "my materials" menu button.
    Materials,
    /// `/learn`, the operator's learning-mode toggle.
    Learn,
    /// Anything else.
    Text,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();

        // Menu labels are matched literally.
        if trimmed == prompts::TALK_LABEL {
            return Self::Talk;
        }
        if trimmed == prompts::MATERIALS_LABEL {
            return Self::Materials;
        }

        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Text;
        };
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        // `/start@my_bot` in group chats.
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        match name.as_str() {
            "start" => Self::Start {
                payload: (!args.is_empty()).then(|| args.to_string()),
            },
            "learn" => Self::Learn,
            _ => Self::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_with_and_without_payload() {
        assert_eq!(Command::parse("/start"), Command::Start { payload: None });
        assert_eq!(
            Command::parse("/start promo1"),
            Command::Start {
                payload: Some("promo1".into())
            }
        );
        assert_eq!(
            Command::parse("  /start@lead_bot   promo1 "),
            Command::Start {
                payload: Some("promo1".into())
            }
        );
    }

    #[test]
    fn menu_labels_are_exact() {
        assert_eq!(Command::parse(prompts::TALK_LABEL), Command::Talk);
        assert_eq!(Command::parse(prompts::MATERIALS_LABEL), Command::Materials);
        assert_eq!(Command::parse("Talk to me"), Command::Text);
    }

    #[test]
    fn learn_and_unknown_commands() {
        assert_eq!(Command::parse("/learn"), Command::Learn);
        assert_eq!(Command::parse("/LEARN"), Command::Learn);
        assert_eq!(Command::parse("/help"), Command::Text);
        assert_eq!(Command::parse("hello /start"), Command::Text);
    }
}
