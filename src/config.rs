use std::env;

use crate::error::AppError;
use crate::gateway::stripe::DEFAULT_API_BASE;
use crate::identity::firebase::DEFAULT_LOOKUP_URL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub site_domain: String,
    pub checkout_currency: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub mock_gateway_auto_pay: bool,
    pub firebase_api_key: Option<String>,
    pub firebase_lookup_url: String,
    pub dev_identity_tokens: Vec<(String, String)>,
    pub admin_emails: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact or json"
                )));
            }
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            site_domain: env::var("SITE_DOMAIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            checkout_currency: env::var("CHECKOUT_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            stripe_secret_key: non_empty("STRIPE_SECRET_KEY"),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            mock_gateway_auto_pay: parse_or_default("MOCK_GATEWAY_AUTO_PAY", true)?,
            firebase_api_key: non_empty("FIREBASE_API_KEY"),
            firebase_lookup_url: env::var("FIREBASE_LOOKUP_URL")
                .unwrap_or_else(|_| DEFAULT_LOOKUP_URL.to_string()),
            dev_identity_tokens: parse_token_pairs(
                &env::var("DEV_IDENTITY_TOKENS").unwrap_or_default(),
            )?,
            admin_emails: parse_list(&env::var("ADMIN_EMAILS").unwrap_or_default()),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `token=email,token=email`.
fn parse_token_pairs(raw: &str) -> Result<Vec<(String, String)>, AppError> {
    parse_list(raw)
        .into_iter()
        .map(|pair| match pair.split_once('=') {
            Some((token, email)) if !token.is_empty() && !email.is_empty() => {
                Ok((token.trim().to_string(), email.trim().to_string()))
            }
            _ => Err(AppError::Internal(format!(
                "invalid DEV_IDENTITY_TOKENS entry: {pair}"
            ))),
        })
        .collect()
}
