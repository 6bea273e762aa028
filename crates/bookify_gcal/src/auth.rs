// --- File: crates/bookify_gcal/src/auth.rs ---
//! Per-account OAuth token management.
//!
//! Refresh is a critical section per account: two concurrent requests for
//! the same account serialize on the account's mutex, and the refreshed
//! token is persisted (sealed) before either of them uses it. A refresh
//! failure flips the account invalid and mails the host; the account stays
//! excluded from availability until the host re-consents.

use crate::error::GcalError;
use bookify_common::services::{MailMessage, Mailer};
use bookify_common::Clock;
use bookify_config::secrets::{ensure_decrypted, ensure_encrypted};
use bookify_config::GoogleConfig;
use bookify_db::{AccountRepository, ConnectedAccount};
use chrono::Duration;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// How close to expiry a stored access token is considered stale.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Deserialize, Debug)]
struct TokenRefreshResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

pub struct TokenManager {
    accounts: Arc<dyn AccountRepository>,
    google: GoogleConfig,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    mailer: Option<Arc<dyn Mailer>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        google: GoogleConfig,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self {
            accounts,
            google,
            http,
            clock,
            mailer,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, account_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Returns a currently valid access token for the account, refreshing it
    /// first when it is within the expiry skew.
    pub async fn access_token(&self, account_id: &str) -> Result<String, GcalError> {
        let lock = self.lock_for(account_id);
        let _guard = lock.lock().await;

        // Re-read under the lock: a task that held the lock before us may
        // have refreshed already.
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| GcalError::UnknownAccount(account_id.to_string()))?;

        if !account.is_valid {
            return Err(GcalError::AccountInvalid(account.id));
        }

        let now = self.clock.now();
        if let (Some(sealed), Some(expires_at)) =
            (&account.access_token_enc, account.token_expires_at)
        {
            if expires_at - now > Duration::seconds(EXPIRY_SKEW_SECS) {
                return ensure_decrypted(sealed)
                    .map_err(|e| GcalError::Vault(e.to_string()));
            }
        }

        self.refresh(&account).await
    }

    async fn refresh(&self, account: &ConnectedAccount) -> Result<String, GcalError> {
        debug!("Refreshing access token for account {}", account.id);

        let sealed_refresh = account.refresh_token_enc.as_ref().ok_or_else(|| {
            GcalError::AccountInvalid(format!("{} has no refresh token", account.id))
        })?;
        let refresh_token =
            ensure_decrypted(sealed_refresh).map_err(|e| GcalError::Vault(e.to_string()))?;

        let params = [
            ("client_id", self.google.client_id.as_str()),
            ("client_secret", self.google.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(self.google.token_uri())
            .form(&params)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("Token refresh transport failure for {}: {}", account.id, e);
                self.invalidate(account).await?;
                return Err(GcalError::RefreshFailed(account.id.clone()));
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Token refresh rejected for {} (status {}): {}",
                account.id, status, body
            );
            self.invalidate(account).await?;
            return Err(GcalError::RefreshFailed(account.id.clone()));
        }

        let tokens: TokenRefreshResponse = match response.json().await {
            Ok(t) => t,
            Err(e) => {
                warn!("Token refresh parse failure for {}: {}", account.id, e);
                self.invalidate(account).await?;
                return Err(GcalError::RefreshFailed(account.id.clone()));
            }
        };

        let now = self.clock.now();
        let expires_at = now + Duration::seconds(tokens.expires_in);

        let sealed_access = ensure_encrypted(&tokens.access_token)
            .map_err(|e| GcalError::Vault(e.to_string()))?;
        let sealed_refresh = tokens
            .refresh_token
            .as_deref()
            .map(ensure_encrypted)
            .transpose()
            .map_err(|e| GcalError::Vault(e.to_string()))?;

        // Persisted before any request uses the new token.
        self.accounts
            .update_tokens(
                &account.id,
                &sealed_access,
                sealed_refresh.as_deref(),
                expires_at,
                now,
            )
            .await?;

        info!("Refreshed access token for account {}", account.id);
        Ok(tokens.access_token)
    }

    /// Flips the account invalid and tells the host their calendar went
    /// dark. The mail is best-effort; the invalidation is not.
    async fn invalidate(&self, account: &ConnectedAccount) -> Result<(), GcalError> {
        self.accounts.mark_invalid(&account.id).await?;

        let Some(mailer) = self.mailer.as_ref() else {
            return Ok(());
        };
        let message = MailMessage {
            to: account.external_identity.clone(),
            subject: "Your calendar connection needs attention".to_string(),
            body: format!(
                "We could no longer refresh access to the calendar account {}. \
                 It has been disconnected: its busy times are not considered for \
                 new bookings and no events will be written to it until you \
                 reconnect it from your account settings.",
                account.external_identity
            ),
            ics: None,
        };
        if let Err(e) = mailer.send(message).await {
            warn!(
                "Could not notify host about invalid account {}: {}",
                account.id, e
            );
        }
        Ok(())
    }
}
