use std::sync::{Mutex, MutexGuard};

use finsight_core::{ChatMessage, ChatRequest};
use log::warn;

use crate::services::ChatApi;

pub const GREETING: &str = "Hello! I'm FinSight AI, your financial advisor. I can see your \
transaction data and help you understand your business finances, reduce costs and plan ahead. \
What would you like to know?";

/// Messages sent along with each question, oldest first.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug)]
struct Transcript {
    messages: Vec<ChatMessage>,
    pending: bool,
}

/// Client-side conversation with the assistant. Errors are echoed into the
/// transcript rather than returned.
pub struct ChatSession {
    api: ChatApi,
    transcript: Mutex<Transcript>,
}

impl ChatSession {
    pub fn new(api: ChatApi) -> Self {
        Self {
            api,
            transcript: Mutex::new(Transcript {
                messages: vec![ChatMessage::assistant(GREETING)],
                pending: false,
            }),
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Sends one question and returns the assistant message appended for it.
    /// Blank input, or input while a reply is pending, is ignored.
    pub async fn send(&self, text: &str) -> Option<ChatMessage> {
        let text = text.trim();
        let request = {
            let mut transcript = self.lock();
            if text.is_empty() || transcript.pending {
                return None;
            }
            let start = transcript.messages.len().saturating_sub(HISTORY_LIMIT);
            let history = transcript.messages[start..].to_vec();
            transcript.messages.push(ChatMessage::user(text));
            transcript.pending = true;
            ChatRequest {
                message: text.to_string(),
                history,
            }
        };

        let reply = match self.api.send(&request).await {
            Ok(reply) => ChatMessage::assistant(reply.reply),
            Err(err) => {
                warn!("chat request failed: {}", err);
                ChatMessage::assistant(format!(
                    "Sorry, I encountered an error: {}. Please try again.",
                    err
                ))
            }
        };

        let mut transcript = self.lock();
        transcript.messages.push(reply.clone());
        transcript.pending = false;
        Some(reply)
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
