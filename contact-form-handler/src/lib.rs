pub mod config;
pub mod controller;
pub mod handler;
pub mod mailer;
pub mod messages;
pub mod page;
pub mod recaptcha;
pub mod secrets;
pub mod validation;

#[cfg(test)]
mod test_doubles;
