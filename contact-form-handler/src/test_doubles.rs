use crate::{
    mailer::{MailDispatcher, OutgoingMail},
    recaptcha::RecaptchaChecker,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct FakeRecaptchaChecker {
    verdict: bool,
    calls: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl FakeRecaptchaChecker {
    pub fn passing() -> Self {
        Self {
            verdict: true,
            calls: Default::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            verdict: false,
            ..Self::passing()
        }
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecaptchaChecker for FakeRecaptchaChecker {
    async fn verify(&self, secret: &str, response_token: &str, client_ip: &str) -> bool {
        self.calls.lock().unwrap().push((
            secret.into(),
            response_token.into(),
            client_ip.into(),
        ));
        self.verdict
    }
}

#[derive(Clone)]
pub struct RecordingMailDispatcher {
    accept: bool,
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl RecordingMailDispatcher {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            sent: Default::default(),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            ..Self::accepting()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailDispatcher for RecordingMailDispatcher {
    async fn send(&self, mail: &OutgoingMail) -> bool {
        self.sent.lock().unwrap().push(mail.clone());
        self.accept
    }
}
