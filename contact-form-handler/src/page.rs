use crate::{
    config::{FormConfig, EMAIL_FIELD, MAIL_FIELDS, MESSAGE_FIELD, RECAPTCHA_RESPONSE_FIELD},
    controller::{FormOutcome, FormState},
    messages::MessageSet,
    validation::{humanize, SubmittedFields},
};
use serde::Serialize;
use tinytemplate::{error::Error, TinyTemplate};

pub const DEFAULT_ERRORS_BEFORE: &str = r#"<div class="alert alert-errors">"#;
pub const DEFAULT_ERRORS_AFTER: &str = "</div>";
pub const DEFAULT_SUCCESS_BEFORE: &str = "<div class='alert alert-success'>";
pub const DEFAULT_SUCCESS_AFTER: &str = "</div>";
pub const DEFAULT_ERROR_CLASS: &str = "has-error";

const ERROR_LIST_TEMPLATE_NAME: &str = "error-list";
const ERROR_LIST_TEMPLATE: &str = "<ul>{{ for error in errors }}<li>{error}</li>{{ endfor }}</ul>";
const SUCCESS_LIST_TEMPLATE_NAME: &str = "success-list";
const SUCCESS_LIST_TEMPLATE: &str = "{{ for success in successes }}{success}{{ endfor }}";
const CONTACT_FORM_TEMPLATE_NAME: &str = "contact-form";
const CONTACT_FORM_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/contact-form.html"
));
pub const INTERNAL_ERROR_PAGE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/internal-error.html"
));

#[derive(Serialize)]
struct ErrorListContext<'a> {
    errors: Vec<&'a str>,
}

#[derive(Serialize)]
struct SuccessListContext<'a> {
    successes: &'a [String],
}

#[derive(Serialize)]
struct PageContext<'a> {
    successes: String,
    errors: String,
    fields: Vec<FieldContext<'a>>,
    submit_button_name: &'a str,
    recaptcha_site_key: Option<&'a str>,
    recaptcha_error: &'a str,
}

#[derive(Serialize)]
struct FieldContext<'a> {
    name: &'a str,
    label: String,
    value: &'a str,
    input_type: &'static str,
    multiline: bool,
    error_class: &'a str,
    error_message: &'a str,
}

/// Renders every error as a list between `before` and `after`, or nothing when there are no
/// errors. Message text is escaped; `before` and `after` are inserted as they are.
pub fn render_errors(messages: &MessageSet, before: &str, after: &str) -> Result<String, Error> {
    if !messages.has_errors() {
        return Ok(String::new());
    }
    let context = ErrorListContext {
        errors: messages
            .errors()
            .iter()
            .map(|error| error.text.as_str())
            .collect(),
    };
    let list = render_template(ERROR_LIST_TEMPLATE_NAME, ERROR_LIST_TEMPLATE, &context)?;
    Ok(format!("{before}{list}{after}"))
}

/// Like [`render_errors`] for success messages, which are concatenated without a list.
pub fn render_successes(messages: &MessageSet, before: &str, after: &str) -> Result<String, Error> {
    if messages.successes().is_empty() {
        return Ok(String::new());
    }
    let context = SuccessListContext {
        successes: messages.successes(),
    };
    let list = render_template(SUCCESS_LIST_TEMPLATE_NAME, SUCCESS_LIST_TEMPLATE, &context)?;
    Ok(format!("{before}{list}{after}"))
}

/// `class` if the field has an error, otherwise an empty string.
pub fn error_class<'a>(messages: &MessageSet, field: &str, class: &'a str) -> &'a str {
    if messages.has_error(field) {
        class
    } else {
        ""
    }
}

pub fn error_message<'a>(messages: &'a MessageSet, field: &str) -> &'a str {
    messages.error_for(field).unwrap_or_default()
}

/// Renders the contact form with the outcome of the submission. Submitted values are filled back
/// in unless the message was sent.
pub fn render_form_page(
    config: &FormConfig,
    fields: &SubmittedFields,
    outcome: &FormOutcome,
) -> Result<String, Error> {
    let messages = &outcome.messages;
    let keep_values = outcome.state != FormState::Succeeded;
    let context = PageContext {
        successes: render_successes(messages, DEFAULT_SUCCESS_BEFORE, DEFAULT_SUCCESS_AFTER)?,
        errors: render_errors(messages, DEFAULT_ERRORS_BEFORE, DEFAULT_ERRORS_AFTER)?,
        fields: MAIL_FIELDS
            .into_iter()
            .map(|name| FieldContext {
                name,
                label: label(name),
                value: fields
                    .get(name)
                    .filter(|_| keep_values)
                    .unwrap_or_default(),
                input_type: if name == EMAIL_FIELD { "email" } else { "text" },
                multiline: name == MESSAGE_FIELD,
                error_class: error_class(messages, name, DEFAULT_ERROR_CLASS),
                error_message: error_message(messages, name),
            })
            .collect(),
        submit_button_name: &config.submit_button_name,
        recaptcha_site_key: config.recaptcha_site_key.as_deref(),
        recaptcha_error: error_message(messages, RECAPTCHA_RESPONSE_FIELD),
    };
    render_template(CONTACT_FORM_TEMPLATE_NAME, CONTACT_FORM_TEMPLATE, &context)
}

fn render_template<C: Serialize>(name: &str, template: &str, context: &C) -> Result<String, Error> {
    let mut tt = TinyTemplate::new();
    tt.add_template(name, template)?;
    tt.render(name, context)
}

fn label(field: &str) -> String {
    let text = humanize(field);
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => text,
    }
}
