//! Conversation transcript

use serde::Serialize;

use crate::network::upload::HistoryEntry;
use crate::state::config::Persona;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The person at the microphone
    User,
    /// The assistant
    Assistant,
}

impl ChatRole {
    /// Display name
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "Assistant",
        }
    }
}

/// One chat line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Speaker
    pub role: ChatRole,
    /// Text
    pub text: String,
    /// Persona styling tag; only assistant messages under a non-default persona carry one
    pub persona_tag: Option<&'static str>,
}

/// Ordered list of chat messages
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user message
    pub fn push_user(&mut self, text: impl Into<String>) -> &ChatMessage {
        self.push(ChatMessage {
            role: ChatRole::User,
            text: text.into(),
            persona_tag: None,
        })
    }

    /// Append an assistant message tagged with the active persona
    pub fn push_assistant(&mut self, text: impl Into<String>, persona: Persona) -> &ChatMessage {
        self.push(ChatMessage {
            role: ChatRole::Assistant,
            text: text.into(),
            persona_tag: persona.tag(),
        })
    }

    /// Replace the log with the server's history
    pub fn replace_with_history(&mut self, history: &[HistoryEntry], persona: Persona) {
        self.messages.clear();
        for entry in history {
            if entry.role == "user" {
                self.push_user(entry.content.clone());
            } else {
                self.push_assistant(entry.content.clone(), persona);
            }
        }
    }

    /// All messages, oldest first
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Most recent message
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Remove every message
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn push(&mut self, message: ChatMessage) -> &ChatMessage {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }
}

/// Header shown above the chat, e.g. `Chat History (Pirate)`
pub fn chat_header(persona: Persona) -> String {
    format!("Chat History ({})", persona.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_tag_only_on_assistant() {
        let mut log = ChatLog::new();
        log.push_user("hi");
        log.push_assistant("arr", Persona::Pirate);
        log.push_assistant("hello", Persona::Default);

        let messages = log.messages();
        assert_eq!(messages[0].persona_tag, None);
        assert_eq!(messages[1].persona_tag, Some("pirate"));
        assert_eq!(messages[2].persona_tag, None);
        assert_eq!(messages[0].role.label(), "You");
    }

    #[test]
    fn test_replace_with_history() {
        let mut log = ChatLog::new();
        log.push_user("stale");

        let history = vec![
            HistoryEntry {
                role: "user".into(),
                content: "what's up".into(),
            },
            HistoryEntry {
                role: "assistant".into(),
                content: "beep boop".into(),
            },
        ];
        log.replace_with_history(&history, Persona::Robot);

        assert_eq!(log.len(), 2);
        assert_eq!(log.messages()[0].role, ChatRole::User);
        assert_eq!(log.last().map(|m| m.persona_tag), Some(Some("robot")));
    }

    #[test]
    fn test_chat_header() {
        assert_eq!(chat_header(Persona::Default), "Chat History (Default Assistant)");
        assert_eq!(chat_header(Persona::Madara), "Chat History (Madara Uchiha)");
    }
}
