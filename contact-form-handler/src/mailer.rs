use crate::secrets::{SecretRepository, SmtpCredentials, SMTP_CREDENTIALS_NAME};
use async_once_cell::OnceCell;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::{Credentials, Mechanism},
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::{borrow::Cow, fmt::Display};
use tracing::{error, info};

const SMTP_URL: &str = "smtps://email-smtp.eu-north-1.amazonaws.com";
pub const SMTP_URL_ENV: &str = "SMTP_URL";

/// The person who filled in the form, used as the Reply-To of the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTo {
    pub name: String,
    pub email: String,
}

impl ReplyTo {
    /// Returns `None` when no email address was given.
    pub fn from_sender(first_name: &str, last_name: &str, email: &str) -> Option<Self> {
        if email.is_empty() {
            return None;
        }
        let name = [first_name, last_name]
            .into_iter()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Some(Self {
            name,
            email: email.into(),
        })
    }

    fn to_mailbox(&self) -> Result<Mailbox, MailError> {
        let address: Address = self
            .email
            .parse()
            .map_err(|_| MailError::InvalidAddress(self.email.clone()))?;
        let name = Some(self.name.clone()).filter(|name| !name.is_empty());
        Ok(Mailbox::new(name, address))
    }
}

impl Display for ReplyTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "<{}>", self.email)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub reply_to: Option<ReplyTo>,
}

/// Hands a notification to a mail transport.
#[async_trait]
pub trait MailDispatcher {
    /// Returns whether the transport accepted the message.
    async fn send(&self, mail: &OutgoingMail) -> bool;
}

pub struct SmtpMailDispatcher<SecretRepositoryT: SecretRepository> {
    secrets_repository: SecretRepositoryT,
    sender: String,
    smtp_url: Cow<'static, str>,
    mailer: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

impl<SecretRepositoryT: SecretRepository> SmtpMailDispatcher<SecretRepositoryT> {
    /// Connects to the server in `SMTP_URL`, or to SES when it is not set.
    pub fn new(secrets_repository: SecretRepositoryT, sender: impl Into<String>) -> Self {
        Self::with_smtp_url(secrets_repository, sender, Self::smtp_url())
    }

    pub fn with_smtp_url(
        secrets_repository: SecretRepositoryT,
        sender: impl Into<String>,
        smtp_url: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            secrets_repository,
            sender: sender.into(),
            smtp_url: smtp_url.into(),
            mailer: Default::default(),
        }
    }

    fn smtp_url() -> Cow<'static, str> {
        std::env::var(SMTP_URL_ENV)
            .map(Cow::Owned)
            .unwrap_or(SMTP_URL.into())
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message, MailError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.sender)?)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &mail.to {
            builder = builder.to(parse_mailbox(recipient)?);
        }
        if let Some(reply_to) = &mail.reply_to {
            builder = builder.reply_to(reply_to.to_mailbox()?);
        }
        builder.body(mail.body.clone()).map_err(MailError::Build)
    }

    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = self.build_message(mail)?;
        let mailer = self
            .mailer
            .get_or_try_init(self.initialise_mailer())
            .await
            .map_err(MailError::Connect)?;
        mailer.send(message).await.map_err(MailError::Send)?;
        Ok(())
    }

    async fn initialise_mailer(
        &self,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, lambda_http::Error> {
        info!("Connecting to SMTP server {}", self.smtp_url);
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&self.smtp_url)?
            .authentication(vec![Mechanism::Plain]);

        // Credentials are only ever sent over TLS. A misconfigured plain connection is rejected
        // by the server instead.
        if self.smtp_url.starts_with("smtps://") {
            let credentials: SmtpCredentials = self
                .secrets_repository
                .get_secret(SMTP_CREDENTIALS_NAME)
                .await?;
            builder = builder.credentials(Credentials::new(
                credentials.username,
                credentials.password,
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl<SecretRepositoryT: SecretRepository + Send + Sync> MailDispatcher
    for SmtpMailDispatcher<SecretRepositoryT>
{
    async fn send(&self, mail: &OutgoingMail) -> bool {
        match self.deliver(mail).await {
            Ok(()) => true,
            Err(error) => {
                error!("Error sending contact form email: {error}");
                false
            }
        }
    }
}

fn parse_mailbox(mailbox: &str) -> Result<Mailbox, MailError> {
    mailbox
        .parse()
        .map_err(|_| MailError::InvalidAddress(mailbox.into()))
}

#[derive(Debug)]
pub enum MailError {
    InvalidAddress(String),
    Build(lettre::error::Error),
    Connect(lambda_http::Error),
    Send(lettre::transport::smtp::Error),
}

impl Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::InvalidAddress(address) => write!(f, "Invalid email address {address}"),
            MailError::Build(error) => write!(f, "Error building message: {error}"),
            MailError::Connect(error) => write!(f, "Unable to connect to SMTP server: {error}"),
            MailError::Send(error) => write!(f, "Error sending message: {error}"),
        }
    }
}

impl std::error::Error for MailError {}
