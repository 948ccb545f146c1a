use async_trait::async_trait;
use aws_config::BehaviorVersion;
use serde::{de::DeserializeOwned, Deserialize};
use std::fmt::Display;
use tracing::warn;

pub const SMTP_CREDENTIALS_NAME: &str = "smtp-ses-credentials";
pub const RECAPTCHA_DATA_NAME: &str = "recaptcha-data";

#[async_trait]
pub trait SecretRepository {
    async fn open() -> Self;

    async fn get_secret<T: DeserializeOwned>(
        &self,
        name: &'static str,
    ) -> Result<T, lambda_http::Error>;
}

pub struct AwsSecretsManagerSecretRepository(aws_sdk_secretsmanager::Client);

#[async_trait]
impl SecretRepository for AwsSecretsManagerSecretRepository {
    async fn open() -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Ok(url) = std::env::var("AWS_ENDPOINT_URL") {
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;
        Self(aws_sdk_secretsmanager::Client::new(&config))
    }

    async fn get_secret<T: DeserializeOwned>(
        &self,
        name: &'static str,
    ) -> Result<T, lambda_http::Error> {
        let secret = self.0.get_secret_value().secret_id(name).send().await?;
        let Some(secret_value) = secret.secret_string() else {
            return Err(Box::new(EnvironmentError::MissingSecret(name)));
        };
        Ok(serde_json::from_str(secret_value)?)
    }
}

#[derive(Deserialize)]
pub struct SmtpCredentials {
    #[serde(rename = "SMTP_USERNAME")]
    pub username: String,
    #[serde(rename = "SMTP_PASSWORD")]
    pub password: String,
}

#[derive(Deserialize)]
pub struct RecaptchaData {
    #[serde(rename = "RECAPTCHA_SECRET")]
    pub secret: String,
}

/// The reCAPTCHA secret stored under [`RECAPTCHA_DATA_NAME`], or `None` with a warning when it
/// cannot be read.
pub async fn load_recaptcha_secret<SecretRepositoryT: SecretRepository>(
    secrets_repository: &SecretRepositoryT,
) -> Option<String> {
    match secrets_repository
        .get_secret::<RecaptchaData>(RECAPTCHA_DATA_NAME)
        .await
    {
        Ok(data) => Some(data.secret),
        Err(error) => {
            warn!("Could not retrieve reCAPTCHA secret {RECAPTCHA_DATA_NAME}: {error}");
            None
        }
    }
}

#[derive(Debug)]
pub enum EnvironmentError {
    MissingSecret(&'static str),
}

impl Display for EnvironmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentError::MissingSecret(key) => write!(f, "Missing secret {key}"),
        }
    }
}

impl std::error::Error for EnvironmentError {}
