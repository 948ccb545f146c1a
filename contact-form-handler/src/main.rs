use anyhow::Context;
use contact_form_handler::{
    config::{FormConfig, FormOptions},
    controller::FormController,
    handler::ContactFormHandler,
    mailer::SmtpMailDispatcher,
    recaptcha::GoogleRecaptchaVerifier,
    secrets::{load_recaptcha_secret, AwsSecretsManagerSecretRepository, SecretRepository},
};
use lambda_http::{run, service_fn, Error};
use tracing::info;

type ProductionHandler = ContactFormHandler<
    GoogleRecaptchaVerifier,
    SmtpMailDispatcher<AwsSecretsManagerSecretRepository>,
>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let handler = build_handler().await?;
    run(service_fn(|event| handler.handle(event))).await
}

async fn build_handler() -> anyhow::Result<ProductionHandler> {
    let secrets_repository = AwsSecretsManagerSecretRepository::open().await;
    let mut options = FormOptions::from_env()?;
    if !options.has_recaptcha_key() {
        options.recaptcha_key = load_recaptcha_secret(&secrets_repository).await;
    }
    let config = FormConfig::from_options(options);
    config
        .check()
        .context("Invalid contact form configuration")?;
    if config.recaptcha_secret().is_none() {
        info!("reCAPTCHA verification is disabled");
    }

    let mail_dispatcher = SmtpMailDispatcher::new(secrets_repository, config.sender.clone());
    Ok(ContactFormHandler::new(FormController::new(
        config,
        GoogleRecaptchaVerifier::new(),
        mail_dispatcher,
    )))
}
