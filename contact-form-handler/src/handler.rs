use crate::{
    controller::{FailureKind, FormController, FormOutcome, FormState},
    mailer::MailDispatcher,
    page::{render_form_page, INTERNAL_ERROR_PAGE},
    recaptcha::RecaptchaChecker,
    validation::SubmittedFields,
};
use lambda_http::{http::StatusCode, Body, Error, Request, RequestPayloadExt, Response};
use tracing::{error, warn};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Serves the contact form: shows it on plain requests and processes it on submissions.
pub struct ContactFormHandler<RecaptchaCheckerT, MailDispatcherT> {
    controller: FormController<RecaptchaCheckerT, MailDispatcherT>,
}

impl<RecaptchaCheckerT: RecaptchaChecker, MailDispatcherT: MailDispatcher>
    ContactFormHandler<RecaptchaCheckerT, MailDispatcherT>
{
    pub fn new(controller: FormController<RecaptchaCheckerT, MailDispatcherT>) -> Self {
        Self { controller }
    }

    pub async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        let fields: SubmittedFields = match event.payload() {
            Ok(fields) => fields.unwrap_or_default(),
            Err(error) => {
                warn!("Unable to parse submitted form: {error}");
                return Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(format!("Client error: {error}").into())?);
            }
        };
        let client_ip = client_ip(&event);
        match self.controller.handle(&fields, client_ip).await {
            Ok(outcome) => self.render_outcome(&fields, &outcome),
            Err(error) => {
                error!("Contact form is misconfigured: {error}");
                Self::internal_error()
            }
        }
    }

    fn render_outcome(
        &self,
        fields: &SubmittedFields,
        outcome: &FormOutcome,
    ) -> Result<Response<Body>, Error> {
        let page = match render_form_page(self.controller.config(), fields, outcome) {
            Ok(page) => page,
            Err(error) => {
                error!("Error rendering contact form page: {error}");
                return Self::internal_error();
            }
        };
        Ok(Response::builder()
            .status(status_for(outcome.state))
            .header("Content-Type", HTML_CONTENT_TYPE)
            .body(page.into())?)
    }

    fn internal_error() -> Result<Response<Body>, Error> {
        Ok(Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .header("Content-Type", HTML_CONTENT_TYPE)
            .body(INTERNAL_ERROR_PAGE.into())?)
    }
}

fn status_for(state: FormState) -> StatusCode {
    match state {
        FormState::Idle | FormState::Succeeded => StatusCode::OK,
        FormState::Failed(FailureKind::Validation | FailureKind::RobotCheck) => {
            StatusCode::BAD_REQUEST
        }
        FormState::Failed(FailureKind::Delivery) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The originating client as reported by the HTTP trigger, or an empty string.
fn client_ip(event: &Request) -> &str {
    event
        .headers()
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .unwrap_or_default()
}
