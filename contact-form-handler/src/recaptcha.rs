use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::borrow::Cow;
use tracing::{debug, warn};

const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
pub const RECAPTCHA_VERIFY_URL_ENV: &str = "RECAPTCHA_VERIFY_URL";

/// Confirms that a submission was made by a person.
#[async_trait]
pub trait RecaptchaChecker {
    /// Returns `true` only when the verification service positively confirms the token.
    async fn verify(&self, secret: &str, response_token: &str, client_ip: &str) -> bool;
}

/// Checks tokens against the Google reCAPTCHA `siteverify` endpoint. Anything other than a clean
/// `"success": true` answer counts as a failed check.
pub struct GoogleRecaptchaVerifier {
    client: Client,
    verification_url: Cow<'static, str>,
}

impl GoogleRecaptchaVerifier {
    pub fn new() -> Self {
        Self::with_url(Self::verification_url())
    }

    pub fn with_url(verification_url: impl Into<Cow<'static, str>>) -> Self {
        Self {
            client: Client::new(),
            verification_url: verification_url.into(),
        }
    }

    fn verification_url() -> Cow<'static, str> {
        std::env::var(RECAPTCHA_VERIFY_URL_ENV)
            .map(Cow::Owned)
            .unwrap_or(RECAPTCHA_VERIFY_URL.into())
    }

    async fn request_verification(
        &self,
        secret: &str,
        response_token: &str,
        client_ip: &str,
    ) -> Result<RecaptchaResponse, reqwest::Error> {
        self.client
            .get(self.verification_url.as_ref())
            .query(&[
                ("secret", secret),
                ("response", response_token),
                ("remoteip", client_ip),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

impl Default for GoogleRecaptchaVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecaptchaChecker for GoogleRecaptchaVerifier {
    async fn verify(&self, secret: &str, response_token: &str, client_ip: &str) -> bool {
        if response_token.is_empty() {
            debug!("No reCAPTCHA response token submitted");
            return false;
        }
        match self
            .request_verification(secret, response_token, client_ip)
            .await
        {
            Ok(RecaptchaResponse { success: true, .. }) => true,
            Ok(RecaptchaResponse { error_codes, .. }) => {
                debug!("reCAPTCHA rejected the response token: {error_codes:?}");
                false
            }
            Err(error) => {
                warn!("Error verifying reCAPTCHA response token: {error}");
                false
            }
        }
    }
}

#[derive(Deserialize)]
struct RecaptchaResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}
