use crate::validation::ValidationRule;
use anyhow::Context;
use lettre::message::Mailbox;
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
};

pub const OPTIONS_ENV: &str = "CONTACT_FORM_OPTIONS";

pub const DEFAULT_SUBMIT_BUTTON_NAME: &str = "contact_form_submit";
pub const RECAPTCHA_RESPONSE_FIELD: &str = "g-recaptcha-response";
const DEFAULT_SUBJECT: &str = "Contact inquiry from the website";
const DEFAULT_SENDER: &str = "Web contact form <noreply@localhost>";

pub const FIRST_NAME_FIELD: &str = "first_name";
pub const LAST_NAME_FIELD: &str = "last_name";
pub const EMAIL_FIELD: &str = "email";
pub const MESSAGE_FIELD: &str = "message";

/// Fields read when composing the notification email.
pub const MAIL_FIELDS: [&str; 4] = [FIRST_NAME_FIELD, LAST_NAME_FIELD, EMAIL_FIELD, MESSAGE_FIELD];

/// Settings for one deployment of the form. Built once from [`FormOptions`] laid over the
/// defaults and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FormConfig {
    pub submit_button_name: String,
    pub validation_info: HashMap<String, ValidationRule>,
    pub not_required: HashSet<String>,
    pub ignore: HashSet<String>,
    pub subject: String,
    pub recaptcha_key: Option<String>,
    pub recaptcha_site_key: Option<String>,
    pub recipients: Vec<String>,
    pub sender: String,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            submit_button_name: DEFAULT_SUBMIT_BUTTON_NAME.into(),
            validation_info: HashMap::from([
                (FIRST_NAME_FIELD.into(), ValidationRule::SanitizeText),
                (LAST_NAME_FIELD.into(), ValidationRule::SanitizeText),
                (EMAIL_FIELD.into(), ValidationRule::ValidateEmail),
                (MESSAGE_FIELD.into(), ValidationRule::SanitizeText),
                (
                    DEFAULT_SUBMIT_BUTTON_NAME.into(),
                    ValidationRule::SanitizeText,
                ),
            ]),
            not_required: HashSet::from([DEFAULT_SUBMIT_BUTTON_NAME.into()]),
            ignore: HashSet::from([RECAPTCHA_RESPONSE_FIELD.into()]),
            subject: DEFAULT_SUBJECT.into(),
            recaptcha_key: None,
            recaptcha_site_key: None,
            recipients: Vec::new(),
            sender: DEFAULT_SENDER.into(),
        }
    }
}

impl FormConfig {
    /// Lays the given options over the defaults. An option replaces the default value of the same
    /// key as a whole; maps and sets are not merged entry by entry.
    pub fn from_options(options: FormOptions) -> Self {
        let defaults = Self::default();
        Self {
            submit_button_name: options
                .submit_button_name
                .unwrap_or(defaults.submit_button_name),
            validation_info: options
                .validation_info
                .unwrap_or(defaults.validation_info),
            not_required: options.not_required.unwrap_or(defaults.not_required),
            ignore: options.ignore.unwrap_or(defaults.ignore),
            subject: options.subject.unwrap_or(defaults.subject),
            recaptcha_key: options.recaptcha_key.or(defaults.recaptcha_key),
            recaptcha_site_key: options.recaptcha_site_key.or(defaults.recaptcha_site_key),
            recipients: options
                .recipients
                .map(Recipients::into_vec)
                .unwrap_or(defaults.recipients),
            sender: options.sender.unwrap_or(defaults.sender),
        }
    }

    /// The verification secret, if human verification is switched on.
    pub fn recaptcha_secret(&self) -> Option<&str> {
        self.recaptcha_key
            .as_deref()
            .filter(|secret| !secret.is_empty())
    }

    /// Checks the settings which would otherwise only fail once a submission arrives.
    pub fn check(&self) -> Result<(), ConfigurationError> {
        let recaptcha_field = self
            .recaptcha_secret()
            .map(|_| RECAPTCHA_RESPONSE_FIELD);
        for field in std::iter::once(self.submit_button_name.as_str())
            .chain(MAIL_FIELDS)
            .chain(recaptcha_field)
        {
            if !self.ignore.contains(field) && !self.validation_info.contains_key(field) {
                return Err(ConfigurationError::MissingRule(field.into()));
            }
        }
        if self.recipients.is_empty() {
            return Err(ConfigurationError::NoRecipient);
        }
        for mailbox in self.recipients.iter().chain(std::iter::once(&self.sender)) {
            if mailbox.parse::<Mailbox>().is_err() {
                return Err(ConfigurationError::InvalidMailbox(mailbox.clone()));
            }
        }
        Ok(())
    }
}

/// Options supplied by the deployment. Every key is optional and falls back to the default.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FormOptions {
    pub submit_button_name: Option<String>,
    pub validation_info: Option<HashMap<String, ValidationRule>>,
    pub not_required: Option<HashSet<String>>,
    pub ignore: Option<HashSet<String>>,
    pub subject: Option<String>,
    #[serde(rename = "recaptchaKey")]
    pub recaptcha_key: Option<String>,
    #[serde(rename = "recaptchaSiteKey")]
    pub recaptcha_site_key: Option<String>,
    #[serde(rename = "reciever_email")]
    pub recipients: Option<Recipients>,
    pub sender: Option<String>,
}

impl FormOptions {
    /// Reads options from the JSON in `CONTACT_FORM_OPTIONS`. No variable means no options.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var(OPTIONS_ENV) {
            Ok(json) => Self::from_json(&json),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).with_context(|| format!("Unable to parse {OPTIONS_ENV}"))
    }

    pub fn has_recaptcha_key(&self) -> bool {
        self.recaptcha_key.is_some()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    fn into_vec(self) -> Vec<String> {
        match self {
            Recipients::One(recipient) => vec![recipient],
            Recipients::Many(recipients) => recipients,
        }
    }
}

/// A deployment mistake, as opposed to a problem with what was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    MissingRule(String),
    NoRecipient,
    InvalidMailbox(String),
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::MissingRule(field) => {
                write!(f, "No validation rule for field {field}")
            }
            ConfigurationError::NoRecipient => write!(f, "No recipient email address configured"),
            ConfigurationError::InvalidMailbox(mailbox) => {
                write!(f, "Invalid mailbox {mailbox}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

#[cfg(test)]
mod tests {
    use super::{ConfigurationError, FormConfig, FormOptions, DEFAULT_SUBMIT_BUTTON_NAME};
    use crate::validation::ValidationRule;
    use googletest::prelude::*;
    use std::collections::{HashMap, HashSet};

    fn options(json: &str) -> FormOptions {
        FormOptions::from_json(json).unwrap()
    }

    #[test]
    fn defaults_cover_the_contact_form() -> Result<()> {
        let config = FormConfig::default();

        verify_that!(config.submit_button_name, eq(DEFAULT_SUBMIT_BUTTON_NAME))?;
        verify_that!(
            config.validation_info.get("email"),
            some(eq(&ValidationRule::ValidateEmail))
        )?;
        verify_that!(config.ignore.contains("g-recaptcha-response"), eq(true))?;
        verify_that!(config.not_required.contains("contact_form_submit"), eq(true))?;
        verify_that!(config.recaptcha_secret(), none())
    }

    #[test]
    fn user_options_override_defaults_of_the_same_key() -> Result<()> {
        let config = FormConfig::from_options(options(
            r#"{
                "subject": "Hello from the site",
                "reciever_email": "owner@example.com",
                "ignore": ["honeypot"]
            }"#,
        ));

        verify_that!(config.subject, eq("Hello from the site"))?;
        verify_that!(config.recipients, elements_are![eq("owner@example.com")])?;
        verify_that!(config.ignore, eq(HashSet::from(["honeypot".to_string()])))?;
        verify_that!(config.submit_button_name, eq(DEFAULT_SUBMIT_BUTTON_NAME))
    }

    #[test]
    fn validation_info_option_replaces_the_whole_map() -> Result<()> {
        let config = FormConfig::from_options(options(
            r#"{"validation_info": {"email": "validate_email"}}"#,
        ));

        verify_that!(
            config.validation_info,
            eq(HashMap::from([(
                "email".to_string(),
                ValidationRule::ValidateEmail
            )]))
        )
    }

    #[test]
    fn accepts_list_of_recipients() -> Result<()> {
        let config = FormConfig::from_options(options(
            r#"{"reciever_email": ["a@example.com", "Sales <b@example.com>"]}"#,
        ));

        verify_that!(
            config.recipients,
            elements_are![eq("a@example.com"), eq("Sales <b@example.com>")]
        )
    }

    #[test]
    fn rejects_unknown_option() -> Result<()> {
        verify_that!(FormOptions::from_json(r#"{"recipient": "a@example.com"}"#), err(anything()))
    }

    #[test]
    fn empty_recaptcha_key_disables_verification() -> Result<()> {
        let config = FormConfig::from_options(options(r#"{"recaptchaKey": ""}"#));

        verify_that!(config.recaptcha_secret(), none())
    }

    #[test]
    fn check_accepts_defaults_with_recipient() -> Result<()> {
        let config = FormConfig::from_options(options(r#"{"reciever_email": "owner@example.com"}"#));

        verify_that!(config.check(), ok(anything()))
    }

    #[test]
    fn check_requires_recipient() -> Result<()> {
        verify_that!(
            FormConfig::default().check(),
            err(eq(ConfigurationError::NoRecipient))
        )
    }

    #[test]
    fn check_rejects_unparsable_recipient() -> Result<()> {
        let config = FormConfig::from_options(options(r#"{"reciever_email": "not a mailbox"}"#));

        verify_that!(
            config.check(),
            err(eq(ConfigurationError::InvalidMailbox("not a mailbox".into())))
        )
    }

    #[test]
    fn check_requires_rule_for_renamed_submit_button() -> Result<()> {
        let config = FormConfig::from_options(options(
            r#"{"reciever_email": "owner@example.com", "submit_button_name": "send"}"#,
        ));

        verify_that!(
            config.check(),
            err(eq(ConfigurationError::MissingRule("send".into())))
        )
    }

    #[test]
    fn check_requires_rule_for_fields_used_in_mail() -> Result<()> {
        let config = FormConfig::from_options(options(
            r#"{
                "reciever_email": "owner@example.com",
                "validation_info": {
                    "contact_form_submit": "sanitize_text",
                    "first_name": "sanitize_text",
                    "last_name": "sanitize_text",
                    "email": "validate_email"
                }
            }"#,
        ));

        verify_that!(
            config.check(),
            err(eq(ConfigurationError::MissingRule("message".into())))
        )
    }

    #[test]
    fn check_requires_rule_for_recaptcha_field_when_not_ignored() -> Result<()> {
        let config = FormConfig::from_options(options(
            r#"{
                "reciever_email": "owner@example.com",
                "ignore": ["honeypot"],
                "recaptchaKey": "secret"
            }"#,
        ));

        verify_that!(
            config.check(),
            err(eq(ConfigurationError::MissingRule(
                "g-recaptcha-response".into()
            )))
        )
    }

    #[test]
    fn check_allows_unruled_recaptcha_field_without_secret() -> Result<()> {
        let config = FormConfig::from_options(options(
            r#"{"reciever_email": "owner@example.com", "ignore": ["honeypot"]}"#,
        ));

        verify_that!(config.check(), ok(anything()))
    }
}
