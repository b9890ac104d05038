use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub expires_at_unix: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl TokenSet {
    const EXPIRY_SKEW_SECS: u64 = 30;
    const MODIFY_SCOPE: &'static str = "https://www.googleapis.com/auth/gmail.modify";

    pub fn bare(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at_unix: None,
            scope: None,
            email: None,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        let Some(expires_at) = self.expires_at_unix else {
            return false;
        };

        let Ok(duration) = now.duration_since(UNIX_EPOCH) else {
            return false;
        };

        duration.as_secs().saturating_add(Self::EXPIRY_SKEW_SECS) >= expires_at
    }

    /// False only when the token lists its scopes and none allows moving mail.
    pub fn can_modify(&self) -> bool {
        let Some(scope) = self.scope.as_deref() else {
            return true;
        };
        scope
            .split_whitespace()
            .any(|granted| granted == Self::MODIFY_SCOPE || granted == "https://mail.google.com/")
    }
}
