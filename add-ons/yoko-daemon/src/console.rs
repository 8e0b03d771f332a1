//! Transcript bubbles on the terminal.

use yoko_core::{LogEntry, MessageLog, Sender, Subscription};

pub fn render_line(entry: &LogEntry) -> String {
    let speaker = match entry.message.sender() {
        Sender::User => "あなた",
        Sender::Ai => "ようこ",
    };
    format!("{}: {}", speaker, entry.message.text())
}

/// Prints every message, history first. Drop the handle to stop.
pub fn spawn(log: &MessageLog) -> Subscription {
    log.subscribe_from_beginning(|entry| println!("{}", render_line(&entry)))
}
