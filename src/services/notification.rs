// cohort-service/src/services/notification.rs
use crate::models::ServiceError;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

/// Delivers one response token per invited member and answers
/// token -> (proposal, member) and member -> token lookups.
pub trait NotificationChannel: Send + Sync {
    // All-or-nothing: on error no token of the batch is resolvable
    fn dispatch(
        &self,
        proposal_id: &str,
        member_tokens: &BTreeMap<String, String>,
    ) -> Result<(), ServiceError>;

    fn resolve_token(&self, token: &str) -> Result<Option<(String, String)>, ServiceError>;

    fn token_for(&self, proposal_id: &str, student_id: &str) -> Result<Option<String>, ServiceError>;

    // Forget every token of a proposal; returns how many were dropped
    fn revoke(&self, proposal_id: &str) -> Result<usize, ServiceError>;
}

#[derive(Serialize, Debug, Clone)]
pub struct Delivery {
    pub recipient: String,
    pub proposal_id: String,
    pub accept_link: String,
    pub decline_link: String,
    pub sent_at: DateTime<Utc>,
}

/// Channel that keeps its token index in memory and records every
/// delivery in an outbox instead of handing it to a mail relay.
pub struct OutboxChannel {
    public_url: String,
    online: AtomicBool,
    tokens: RwLock<HashMap<String, (String, String)>>,
    outbox: Mutex<Vec<Delivery>>,
}

impl OutboxChannel {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into().trim_end_matches('/').to_string(),
            online: AtomicBool::new(true),
            tokens: RwLock::new(HashMap::new()),
            outbox: Mutex::new(Vec::new()),
        }
    }

    // Simulate the relay being unreachable (or back again)
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }

    fn link(&self, token: &str, action: &str) -> String {
        format!("{}/proposals/respond/{}/{}", self.public_url, token, action)
    }

    fn lock_error<E: std::fmt::Debug>(e: E) -> ServiceError {
        error!("Notification channel lock poisoned: {:?}", e);
        ServiceError::InternalServerError
    }
}

impl NotificationChannel for OutboxChannel {
    fn dispatch(
        &self,
        proposal_id: &str,
        member_tokens: &BTreeMap<String, String>,
    ) -> Result<(), ServiceError> {
        if !self.online.load(Ordering::SeqCst) {
            warn!("📭 Relay unreachable, cannot notify members of proposal {}", proposal_id);
            return Err(ServiceError::DispatchFailure(
                "notification relay unreachable".to_string(),
            ));
        }

        let now = Utc::now();
        let deliveries: Vec<Delivery> = member_tokens
            .iter()
            .map(|(student_id, token)| Delivery {
                recipient: student_id.clone(),
                proposal_id: proposal_id.to_string(),
                accept_link: self.link(token, "accept"),
                decline_link: self.link(token, "decline"),
                sent_at: now,
            })
            .collect();

        {
            let mut tokens = self.tokens.write().map_err(Self::lock_error)?;
            for (student_id, token) in member_tokens {
                tokens.insert(token.clone(), (proposal_id.to_string(), student_id.clone()));
            }
        }

        let mut outbox = self.outbox.lock().map_err(Self::lock_error)?;
        for delivery in deliveries {
            debug!("📧 To {}: accept {} / decline {}", delivery.recipient, delivery.accept_link, delivery.decline_link);
            outbox.push(delivery);
        }

        info!("📧 Notified {} members of proposal {}", member_tokens.len(), proposal_id);
        Ok(())
    }

    fn resolve_token(&self, token: &str) -> Result<Option<(String, String)>, ServiceError> {
        Ok(self.tokens.read().map_err(Self::lock_error)?.get(token).cloned())
    }

    fn token_for(&self, proposal_id: &str, student_id: &str) -> Result<Option<String>, ServiceError> {
        Ok(self
            .tokens
            .read()
            .map_err(Self::lock_error)?
            .iter()
            .find(|(_, (p, s))| p == proposal_id && s == student_id)
            .map(|(token, _)| token.clone()))
    }

    fn revoke(&self, proposal_id: &str) -> Result<usize, ServiceError> {
        let mut tokens = self.tokens.write().map_err(Self::lock_error)?;
        let before = tokens.len();
        tokens.retain(|_, (p, _)| p != proposal_id);
        Ok(before - tokens.len())
    }
}
