//! Turn segmentation for windowing.
//!
//! Consecutive messages from the same author form one turn. Turns are the
//! unit the windower accepts or drops, so a turn is never split.

use crate::message::{Author, Message};

/// One or more consecutive messages from the same author.
#[derive(Debug, Clone)]
pub struct Turn {
    pub author: Author,
    pub messages: Vec<Message>,
}

impl Turn {
    fn from_message(message: Message) -> Self {
        Self {
            author: message.author,
            messages: vec![message],
        }
    }

    /// Text of every message in the turn, joined by newlines.
    pub fn content(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text().into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }
}

#[derive(Debug, Default)]
pub struct TurnSegmenter;

impl TurnSegmenter {
    pub fn new() -> Self {
        Self
    }

    /// Group messages into turns, oldest first.
    pub fn segment(&self, messages: &[Message]) -> Vec<Turn> {
        let mut turns: Vec<Turn> = Vec::new();

        for message in messages {
            match turns.last_mut() {
                Some(turn) if turn.author == message.author => turn.messages.push(message.clone()),
                _ => turns.push(Turn::from_message(message.clone())),
            }
        }

        turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_has_no_turns() {
        assert!(TurnSegmenter::new().segment(&[]).is_empty());
    }

    #[test]
    fn consecutive_same_author_messages_merge() {
        let messages = vec![
            Message::user("first"),
            Message::user("second"),
            Message::model("reply"),
            Message::user("third"),
        ];

        let turns = TurnSegmenter::new().segment(&messages);

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].len(), 2);
        assert_eq!(turns[0].content(), "first\nsecond");
        assert!(turns[0].is_user());
        assert_eq!(turns[1].author, Author::Model);
        assert_eq!(turns[2].content(), "third");
    }

    #[test]
    fn alternating_messages_stay_separate() {
        let messages: Vec<Message> = (0..6)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("q{}", i))
                } else {
                    Message::model(format!("a{}", i))
                }
            })
            .collect();

        let turns = TurnSegmenter::new().segment(&messages);
        assert_eq!(turns.len(), 6);
        assert!(turns.iter().all(|t| t.len() == 1));
    }
}
