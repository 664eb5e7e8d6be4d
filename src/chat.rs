//! Client side of the relay: the chat widget's transcript and transport.
//!
//! The transcript is append-only. A send is split in two halves so the UI can
//! show a pending indicator in between: [`ChatSession::begin_send`] appends the
//! user's message and hands back a ticket, [`ChatSession::complete`] appends
//! the reply. Dismissing the widget invalidates outstanding tickets, so a reply
//! that lands afterwards is dropped instead of mutating a closed session.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::relay::RelayRequest;
use crate::ChatMessage;

/// Client-side bound on one relay round trip.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Who the assistant speaks for, and what it is told.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProfile {
    pub greeting: String,
    pub contact_email: String,
    /// System instruction sent with every request.
    pub context: String,
}

impl SessionProfile {
    pub fn fallback_message(&self) -> String {
        format!(
            "Sorry, I'm having trouble connecting right now. Please try again or reach out directly at {} 📧",
            self.contact_email
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub ticket: Ticket,
    pub request: RelayRequest,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    profile: SessionProfile,
    messages: Vec<ChatMessage>,
    generation: u64,
    pending: Option<Ticket>,
}

impl ChatSession {
    pub fn new(profile: SessionProfile) -> Self {
        let messages = vec![ChatMessage::assistant(profile.greeting.clone())];
        Self {
            profile,
            messages,
            generation: 0,
            pending: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Append the user's message and build the relay request. Returns `None`
    /// for blank input or while a reply is still pending.
    pub fn begin_send(&mut self, input: &str) -> Option<PendingSend> {
        let text = input.trim();
        if text.is_empty() || self.pending.is_some() {
            return None;
        }
        self.messages.push(ChatMessage::user(text));
        let ticket = Ticket(self.generation);
        self.pending = Some(ticket);
        Some(PendingSend {
            ticket,
            request: RelayRequest {
                messages: self.messages.clone(),
                context: self.profile.context.clone(),
            },
        })
    }

    /// Append the reply for `ticket`, or the fallback message on failure.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        result: Result<String, ChatError>,
    ) -> Result<&ChatMessage, ChatError> {
        if self.pending != Some(ticket) {
            debug!(?ticket, "dropping reply for stale ticket");
            return Err(ChatError::StaleTicket);
        }
        self.pending = None;
        let content = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "chat relay failed; showing fallback");
                self.profile.fallback_message()
            }
        };
        self.messages.push(ChatMessage::assistant(content));
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Close the widget: any in-flight reply will be discarded.
    pub fn dismiss(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.pending = None;
    }

    /// Convenience round trip for callers that can hold the session across
    /// the await.
    pub async fn send(&mut self, client: &ChatClient, input: &str) -> Option<&ChatMessage> {
        let pending = self.begin_send(input)?;
        let result = client.send(&pending.request).await;
        self.complete(pending.ticket, result).ok()
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ReplyBody {
    message: String,
}

pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ChatClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn send(&self, request: &RelayRequest) -> Result<String, ChatError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        if !response.status().is_success() {
            return Err(ChatError::Status(response.status().as_u16()));
        }
        let body: ReplyBody = response.json().await?;
        Ok(body.message)
    }
}
