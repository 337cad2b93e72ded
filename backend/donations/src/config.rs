//! Application configuration loaded from environment variables.

use crate::errors::{AppError, Result};
use crate::mailer::MailSettings;
use crate::payments::PaymentSettings;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Recipient for new-donation operator notifications
    pub operator_email: Option<String>,
    /// Transactional-mail API settings; mail is disabled when unset
    pub mail: Option<MailSettings>,
    /// Payment-gateway settings; gateway calls fail when unset
    pub payment: Option<PaymentSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./donations.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid API_PORT".to_string()))?,
            operator_email: env_var("OPERATOR_EMAIL").ok(),
            mail: mail_from_env(),
            payment: payment_from_env(),
        })
    }
}

/// All three mail keys must be present for mail to be enabled.
fn mail_from_env() -> Option<MailSettings> {
    Some(MailSettings {
        api_url: env_var("MAIL_API_URL").ok()?,
        api_key: env_var("MAIL_API_KEY").ok()?,
        from: env_var("MAIL_FROM").ok()?,
    })
}

fn payment_from_env() -> Option<PaymentSettings> {
    Some(PaymentSettings {
        api_url: env_var("PAYMENT_API_URL").ok()?,
        key_id: env_var("PAYMENT_KEY_ID").ok()?,
        key_secret: env_var("PAYMENT_KEY_SECRET").ok()?,
    })
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AppError::Config(format!("Missing env var: {key}")))
}
