//! The public contact form: rate limit, checks, bot verification, email.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::config::SiteConfig;
use crate::error::{Error, Result, ResultExt};
use crate::fetch::Fetch;
use crate::rate_limit::{now_millis, RateLimiter};

const NAME_MAX: usize = 100;
const EMAIL_MAX: usize = 100;
const MESSAGE_MAX: usize = 2000;
const PHONE_MAX: usize = 20;

/// A submitted contact form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub cf_turnstile_response: Option<String>,
}

/// Escape the characters HTML treats specially.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .rsplit_once('.')
                    .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.trim().is_empty())
}

#[derive(Serialize)]
struct TurnstileRequest<'a> {
    secret: &'a str,
    response: &'a str,
    remoteip: &'a str,
}

#[derive(Deserialize)]
struct TurnstileResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

#[derive(Serialize)]
struct EmailHeader {
    header: String,
    value: String,
}

#[derive(Serialize)]
struct EmailPayload {
    sender: String,
    to: Vec<String>,
    subject: String,
    html_body: String,
    custom_headers: Vec<EmailHeader>,
}

/// Cleaned fields of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
struct Submission {
    name: String,
    email: String,
    phone: Option<String>,
    message: String,
    token: String,
}

impl Submission {
    fn validate(request: &ContactRequest) -> Result<Self> {
        let (name, email, message, token) = match (
            present(&request.name),
            present(&request.email),
            present(&request.message),
            present(&request.cf_turnstile_response),
        ) {
            (Some(name), Some(email), Some(message), Some(token)) => (name, email, message, token),
            _ => return Err(Error::validation("Missing required fields")),
        };
        if !is_valid_email(email.trim()) {
            return Err(Error::validation("Invalid email format"));
        }
        let phone = present(&request.phone);
        if name.chars().count() > NAME_MAX
            || email.chars().count() > EMAIL_MAX
            || message.chars().count() > MESSAGE_MAX
            || phone.map_or(false, |phone| phone.chars().count() > PHONE_MAX)
        {
            return Err(Error::validation("Input too long"));
        }

        Ok(Self {
            name: escape_html(name.trim()),
            email: escape_html(email.trim()),
            phone: phone.map(|phone| escape_html(phone.trim())),
            message: escape_html(message.trim()),
            token: token.to_string(),
        })
    }

    fn html(&self) -> String {
        let phone = self
            .phone
            .as_ref()
            .map(|phone| format!("<p><strong>Phone:</strong> {}</p>", phone))
            .unwrap_or_default();
        format!(
            concat!(
                "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;\">",
                "<h2 style=\"color: #333; border-bottom: 2px solid #3b7d98; padding-bottom: 10px;\">",
                "New Contact Form Submission - Topos Collective</h2>",
                "<div style=\"background-color: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0;\">",
                "<h3 style=\"color: #495057; margin-top: 0;\">Contact Information</h3>",
                "<p><strong>Name:</strong> {name}</p>",
                "<p><strong>Email:</strong> {email}</p>",
                "{phone}</div>",
                "<div style=\"background-color: #fff; border: 1px solid #dee2e6; padding: 20px; border-radius: 8px; margin: 20px 0;\">",
                "<h3 style=\"color: #495057; margin-top: 0;\">Message</h3>",
                "<p style=\"white-space: pre-wrap; line-height: 1.6;\">{message}</p></div>",
                "<div style=\"margin-top: 30px; padding-top: 20px; border-top: 1px solid #dee2e6; color: #6c757d; font-size: 14px;\">",
                "<p>This message was sent from the Topos Collective contact form.</p>",
                "<p>Submitted on: {submitted}</p></div></div>"
            ),
            name = self.name,
            email = self.email,
            phone = phone,
            message = self.message,
            submitted = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

/// Message carried by an SMTP2GO error body.
fn smtp2go_error(body: &Value) -> String {
    if let Some(error) = body.pointer("/data/error").and_then(Value::as_str) {
        let fields = match body.pointer("/data/field_validation_errors") {
            Some(Value::Array(items)) => items.iter().map(field_error).collect::<Vec<_>>().join("; "),
            Some(item @ Value::Object(_)) => field_error(item),
            _ => String::new(),
        };
        return if fields.is_empty() {
            error.to_string()
        } else {
            format!("{} ({})", error, fields)
        };
    }
    body.get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| body.as_str().map(str::to_string))
        .unwrap_or_else(|| "Failed to send email".to_string())
}

fn field_error(item: &Value) -> String {
    format!(
        "{}: {}",
        item.get("fieldname").and_then(Value::as_str).unwrap_or_default(),
        item.get("message").and_then(Value::as_str).unwrap_or_default()
    )
}

/// Caller-facing summary of a delivery failure.
fn delivery_message(detail: &str) -> String {
    if detail.contains("API key") || detail.contains("api_key") {
        "SMTP2GO API key invalid or missing".to_string()
    } else if detail.contains("sender") || detail.contains("from") {
        "Sender email not verified in SMTP2GO".to_string()
    } else {
        detail.to_string()
    }
}

pub struct ContactService {
    http: reqwest::Client,
    limiter: RateLimiter,
    turnstile_secret: Option<String>,
    turnstile_url: String,
    smtp2go_key: Option<String>,
    smtp2go_url: String,
    from_email: Option<String>,
    to_email: Option<String>,
    sender_name: String,
}

impl ContactService {
    pub fn new(config: &SiteConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            limiter: RateLimiter::new(config.contact_rate_limit, config.contact_rate_window),
            turnstile_secret: config.turnstile_secret_key.clone(),
            turnstile_url: config.turnstile_verify_url.clone(),
            smtp2go_key: config.smtp2go_api_key.clone(),
            smtp2go_url: config.smtp2go_send_url.clone(),
            from_email: config.smtp2go_from_email.clone(),
            to_email: config.contact_email.clone(),
            sender_name: config.sender_name.clone(),
        }
    }

    /// Run one submission from `client_ip` through the whole pipeline.
    pub async fn submit(&self, client_ip: &str, request: &ContactRequest) -> Result<()> {
        let decision = self.limiter.check(&format!("contact:{}", client_ip));
        if !decision.allowed {
            info!(target: "contact", "rate limited {}", client_ip);
            return Err(Error::RateLimited {
                limit: decision.limit,
                retry_after: decision.retry_after(now_millis()),
                reset_at: decision.reset_at,
            });
        }

        let submission = Submission::validate(request)?;
        self.verify_token(&submission.token, client_ip).await?;
        self.send(&submission).await?;

        info!(target: "contact", "contact form from {} delivered", submission.email);
        Ok(())
    }

    async fn verify_token(&self, token: &str, client_ip: &str) -> Result<()> {
        let secret = match &self.turnstile_secret {
            Some(secret) => secret,
            None => {
                info!(target: "contact", "skipping Turnstile verification, no secret key configured");
                return Ok(());
            }
        };

        let result: TurnstileResponse = Fetch::post(&self.http, &self.turnstile_url)
            .json(&TurnstileRequest {
                secret,
                response: token,
                remoteip: client_ip,
            })?
            .execute()
            .await
            .context("Spam protection verification failed")?;

        if !result.success {
            error!(target: "contact", "Turnstile verification failed: {:?}", result.error_codes);
            return Err(Error::validation("Spam protection verification failed"));
        }
        Ok(())
    }

    async fn send(&self, submission: &Submission) -> Result<()> {
        let (api_key, from, to) = match (&self.smtp2go_key, &self.from_email, &self.to_email) {
            (Some(api_key), Some(from), Some(to)) => (api_key, from, to),
            _ => {
                error!(target: "contact", "SMTP2GO is not configured");
                return Err(Error::config("SMTP2GO_API_KEY, SMTP2GO_FROM_EMAIL and CONTACT_EMAIL must be set"))
                    .context("Email service not configured");
            }
        };

        let mut custom_headers = vec![EmailHeader {
            header: "Reply-To".to_string(),
            value: submission.email.clone(),
        }];
        for (header, value) in [
            ("X-Form-Type", "contact"),
            ("X-Submitter-Name", submission.name.as_str()),
            ("X-Submitter-Email", submission.email.as_str()),
        ] {
            custom_headers.push(EmailHeader {
                header: header.to_string(),
                value: value.to_string(),
            });
        }

        let payload = EmailPayload {
            sender: format!("{} <{}>", self.sender_name, from),
            to: vec![to.clone()],
            subject: format!("New Contact Form Submission from {}", submission.name),
            html_body: submission.html(),
            custom_headers,
        };

        let response = Fetch::post(&self.http, &self.smtp2go_url)
            .header("X-Smtp2go-Api-Key", api_key)?
            .json(&payload)?
            .execute_raw()
            .await
            .context("Failed to send email")?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let failure = if !status.is_success() {
            Some(smtp2go_error(&body))
        } else {
            body.get("error").and_then(Value::as_str).map(str::to_string)
        };

        if let Some(detail) = failure {
            error!(target: "contact", "SMTP2GO rejected the message ({}): {}", status, detail);
            return Err(Error::upstream(detail.clone())).context(&delivery_message(&detail));
        }
        Ok(())
    }
}
