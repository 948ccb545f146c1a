use crate::{
    config::{
        ConfigurationError, FormConfig, EMAIL_FIELD, FIRST_NAME_FIELD, LAST_NAME_FIELD,
        MESSAGE_FIELD, RECAPTCHA_RESPONSE_FIELD,
    },
    mailer::{MailDispatcher, OutgoingMail, ReplyTo},
    messages::MessageSet,
    recaptcha::RecaptchaChecker,
    validation::{FieldValidator, SubmittedFields, ValidationOutcome},
};
use tracing::{debug, info};

pub const ROBOT_CHECK_FAILED: &str =
    "Are you a robot? Our robot senses are tingling... Please verify that you're not a robot.";
pub const DELIVERY_FAILED: &str = "There was an error sending your message. Please try again.";
pub const MESSAGE_SENT: &str = "Your message has been sent!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    RobotCheck,
    Delivery,
}

/// Where handling of a submission ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    /// The request did not carry the submit marker.
    Idle,
    Failed(FailureKind),
    Succeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormOutcome {
    pub state: FormState,
    pub messages: MessageSet,
}

/// Runs one submission through validation, human verification and mail dispatch. Each step only
/// runs when the previous one passed, and the outcome is recorded as exactly one message unless
/// validation already recorded its own.
///
/// Fields that were not submitted at all are not checked, so a request carrying only the submit
/// marker passes validation and sends a mail with an empty body and no Reply-To.
pub struct FormController<RecaptchaCheckerT, MailDispatcherT> {
    config: FormConfig,
    recaptcha_checker: RecaptchaCheckerT,
    mail_dispatcher: MailDispatcherT,
}

impl<RecaptchaCheckerT: RecaptchaChecker, MailDispatcherT: MailDispatcher>
    FormController<RecaptchaCheckerT, MailDispatcherT>
{
    pub fn new(
        config: FormConfig,
        recaptcha_checker: RecaptchaCheckerT,
        mail_dispatcher: MailDispatcherT,
    ) -> Self {
        Self {
            config,
            recaptcha_checker,
            mail_dispatcher,
        }
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub async fn handle(
        &self,
        fields: &SubmittedFields,
        client_ip: &str,
    ) -> Result<FormOutcome, ConfigurationError> {
        let mut messages = MessageSet::new();
        if !fields.contains(&self.config.submit_button_name) {
            debug!("No submission marker in request");
            return Ok(FormOutcome {
                state: FormState::Idle,
                messages,
            });
        }
        let state = self.process(fields, client_ip, &mut messages).await?;
        info!("Contact form submission finished as {state:?}");
        Ok(FormOutcome { state, messages })
    }

    async fn process(
        &self,
        fields: &SubmittedFields,
        client_ip: &str,
        messages: &mut MessageSet,
    ) -> Result<FormState, ConfigurationError> {
        let ValidationOutcome::Valid(values) =
            FieldValidator::from_config(&self.config).validate(fields, messages)?
        else {
            return Ok(FormState::Failed(FailureKind::Validation));
        };

        if !self.verify_human(fields, client_ip).await {
            messages.add_error(ROBOT_CHECK_FAILED, Some(RECAPTCHA_RESPONSE_FIELD));
            return Ok(FormState::Failed(FailureKind::RobotCheck));
        }

        if self.mail_dispatcher.send(&self.compose_mail(&values)).await {
            messages.add_success(MESSAGE_SENT);
            Ok(FormState::Succeeded)
        } else {
            messages.add_error(DELIVERY_FAILED, None);
            Ok(FormState::Failed(FailureKind::Delivery))
        }
    }

    async fn verify_human(&self, fields: &SubmittedFields, client_ip: &str) -> bool {
        let Some(secret) = self.config.recaptcha_secret() else {
            return true;
        };
        let token = fields.get(RECAPTCHA_RESPONSE_FIELD).unwrap_or_default();
        self.recaptcha_checker
            .verify(secret, token, client_ip)
            .await
    }

    fn compose_mail(&self, values: &SubmittedFields) -> OutgoingMail {
        let value = |name| values.get(name).unwrap_or_default();
        OutgoingMail {
            to: self.config.recipients.clone(),
            subject: self.config.subject.clone(),
            body: value(MESSAGE_FIELD).into(),
            reply_to: ReplyTo::from_sender(
                value(FIRST_NAME_FIELD),
                value(LAST_NAME_FIELD),
                value(EMAIL_FIELD),
            ),
        }
    }
}
