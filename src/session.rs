//! Explicit session context handed to every backend call.
//!
//! The token is issued elsewhere (login is not handled here); this type only
//! carries it, together with the identity of the cashier at the terminal.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::{normalize_api_url, PosConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cashier {
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl Cashier {
    /// Owners and admins may leave the POS screen for the dashboard.
    pub fn is_manager(&self) -> bool {
        matches!(self.role.as_str(), "owner" | "admin")
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

pub struct Session {
    session_id: Uuid,
    base_url: String,
    token: Zeroizing<String>,
    cashier: Cashier,
    started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(base_url: &str, token: &str, cashier: Cashier) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            base_url: normalize_api_url(base_url),
            token: Zeroizing::new(token.trim().to_string()),
            cashier,
            started_at: Utc::now(),
        }
    }

    pub fn from_config(cfg: &PosConfig) -> Self {
        Self::new(
            &cfg.api_url,
            &cfg.api_token,
            Cashier {
                first_name: cfg.cashier_first_name.clone(),
                last_name: cfg.cashier_last_name.clone(),
                role: cfg.cashier_role.clone(),
            },
        )
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cashier(&self) -> &Cashier {
        &self.cashier
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Value for the `Authorization` header.
    pub(crate) fn authorization(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("Token {}", self.token.as_str()))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("cashier", &self.cashier)
            .field("started_at", &self.started_at)
            .finish()
    }
}
