//! Welcome email carrying freshly minted credentials.
//!
//! Uses SMTP via lettre for delivery with Askama templates. Sending is best
//! effort: callers log failures and report `emailSent: false`.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use insight_library_core::{Role, UserCredentials};

use crate::config::EmailConfig;

/// Subject line of the welcome email.
pub const WELCOME_SUBJECT: &str = "Welcome to Game Industry Insight - Your Account Credentials";

/// HTML template for the welcome email.
#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeEmailHtml<'a> {
    site_url: &'a str,
    login_url: &'a str,
    email: &'a str,
    password: &'a str,
    role: &'a str,
}

/// Plain text template for the welcome email.
#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeEmailText<'a> {
    site_url: &'a str,
    login_url: &'a str,
    email: &'a str,
    password: &'a str,
    role: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Delivery channel for the welcome email.
#[async_trait]
pub trait WelcomeMailer: Send + Sync {
    async fn send_welcome(&self, credentials: &UserCredentials) -> Result<(), MailError>;
}

/// Rendered welcome email bodies: `(text, html)`.
///
/// # Errors
///
/// Returns an error if a template fails to render.
pub fn render_welcome(credentials: &UserCredentials) -> Result<(String, String), MailError> {
    let site_url = credentials.site_url.as_str();
    let login_url = format!("{}/login", site_url.trim_end_matches('/'));
    let role = credentials.role.unwrap_or(Role::User).as_str();

    let html = WelcomeEmailHtml {
        site_url,
        login_url: &login_url,
        email: &credentials.email,
        password: &credentials.password,
        role,
    }
    .render()?;
    let text = WelcomeEmailText {
        site_url,
        login_url: &login_url,
        email: &credentials.email,
        password: &credentials.password,
        role,
    }
    .render()?;

    Ok((text, html))
}

/// SMTP implementation of [`WelcomeMailer`].
#[derive(Clone)]
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Create a new mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), MailError> {
        let from = format!("Game Industry Insight <{}>", self.from_address);
        let email = Message::builder()
            .from(
                from.parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| MailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[async_trait]
impl WelcomeMailer for SmtpMailer {
    async fn send_welcome(&self, credentials: &UserCredentials) -> Result<(), MailError> {
        let (text, html) = render_welcome(credentials)?;
        self.send_multipart_email(&credentials.email, WELCOME_SUBJECT, text, html)
            .await
    }
}
