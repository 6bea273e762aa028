// --- File: crates/bookify_gcal/src/error.rs ---
use bookify_db::DbError;
use thiserror::Error;

/// Errors from the Google Calendar integration.
#[derive(Error, Debug)]
pub enum GcalError {
    /// Transport-level failure talking to Google
    #[error("Google API request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Google answered with a non-success status
    #[error("Google API returned an error: {message} (Status: {status_code})")]
    ApiError { status_code: u16, message: String },

    /// The refresh-token exchange failed; the account has been marked invalid
    #[error("Token refresh failed for account {0}")]
    RefreshFailed(String),

    /// The account is flagged invalid or has no usable tokens
    #[error("Account {0} is not usable")]
    AccountInvalid(String),

    /// No such connected account
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    /// Sealing or unsealing a stored token failed
    #[error("Token vault error: {0}")]
    Vault(String),

    /// Ledger access failed
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// A timestamp in a Google response could not be parsed
    #[error("Failed to parse time: {0}")]
    TimeParseError(String),
}
