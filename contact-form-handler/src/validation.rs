use crate::{
    config::{ConfigurationError, FormConfig},
    messages::MessageSet,
};
use lettre::Address;
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};
use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    fmt,
};

/// How a single submitted field is checked.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// Accepts any value and strips markup from it.
    SanitizeText,
    /// Rejects values which are not a syntactically valid email address.
    ValidateEmail,
}

impl ValidationRule {
    /// Returns the value to pass on, or `None` if the rule rejects it.
    fn apply(self, value: &str) -> Option<Cow<'_, str>> {
        match self {
            ValidationRule::SanitizeText => Some(strip_tags(value)),
            ValidationRule::ValidateEmail => value
                .parse::<Address>()
                .ok()
                .map(|_| Cow::Borrowed(value)),
        }
    }
}

/// Form fields in the order in which they were submitted. A repeated name keeps its first
/// position and takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmittedFields(Vec<(String, String)>);

impl SubmittedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing_value)) => *existing_value = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<NameT: Into<String>, ValueT: Into<String>> FromIterator<(NameT, ValueT)> for SubmittedFields {
    fn from_iter<T: IntoIterator<Item = (NameT, ValueT)>>(iter: T) -> Self {
        let mut fields = Self::new();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

impl<'de> Deserialize<'de> for SubmittedFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SubmittedFieldsVisitor;

        impl<'de> Visitor<'de> for SubmittedFieldsVisitor {
            type Value = SubmittedFields;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of form field names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut fields = SubmittedFields::new();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    fields.insert(name, value);
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(SubmittedFieldsVisitor)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Every field passed. Carries the submitted fields with sanitizing rules applied.
    Valid(SubmittedFields),
    /// At least one field was rejected. The reasons are in the [`MessageSet`].
    Invalid,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }
}

pub struct FieldValidator<'a> {
    rules: &'a HashMap<String, ValidationRule>,
    not_required: &'a HashSet<String>,
    ignore: &'a HashSet<String>,
}

impl<'a> FieldValidator<'a> {
    pub fn new(
        rules: &'a HashMap<String, ValidationRule>,
        not_required: &'a HashSet<String>,
        ignore: &'a HashSet<String>,
    ) -> Self {
        Self {
            rules,
            not_required,
            ignore,
        }
    }

    pub fn from_config(config: &'a FormConfig) -> Self {
        Self::new(
            &config.validation_info,
            &config.not_required,
            &config.ignore,
        )
    }

    /// Checks every submitted field, recording an error keyed by field name for each one that is
    /// rejected. Fails only when a field which has to be checked has no rule.
    pub fn validate(
        &self,
        fields: &SubmittedFields,
        messages: &mut MessageSet,
    ) -> Result<ValidationOutcome, ConfigurationError> {
        let mut valid = true;
        let mut accepted = SubmittedFields::new();
        for (name, value) in fields.iter() {
            if self.ignore.contains(name) {
                accepted.insert(name, value);
                continue;
            }
            if value.is_empty() {
                if !self.not_required.contains(name) {
                    messages.add_error(format!("{} is required.", humanize(name)), Some(name));
                    valid = false;
                }
                accepted.insert(name, value);
                continue;
            }
            let Some(rule) = self.rules.get(name) else {
                return Err(ConfigurationError::MissingRule(name.into()));
            };
            match rule.apply(value) {
                Some(cleaned) => accepted.insert(name, cleaned),
                None => {
                    messages.add_error(
                        format!("Please provide a valid {}.", humanize(name)),
                        Some(name),
                    );
                    valid = false;
                }
            }
        }
        Ok(if valid {
            ValidationOutcome::Valid(accepted)
        } else {
            ValidationOutcome::Invalid
        })
    }
}

/// Turns a field name into text for messages: `first_name` becomes `first name`.
pub fn humanize(field: &str) -> String {
    field.replace('_', " ")
}

fn strip_tags(value: &str) -> Cow<'_, str> {
    if !value.contains('<') {
        return Cow::Borrowed(value);
    }
    let mut stripped = String::with_capacity(value.len());
    let mut in_tag = false;
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if in_tag {
            in_tag = c != '>';
        } else if c == '<'
            && chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?'))
        {
            in_tag = true;
        } else {
            stripped.push(c);
        }
    }
    Cow::Owned(stripped)
}

#[cfg(test)]
mod tests {
    use super::{humanize, FieldValidator, SubmittedFields, ValidationOutcome, ValidationRule};
    use crate::{config::ConfigurationError, messages::MessageSet};
    use googletest::prelude::*;
    use std::collections::{HashMap, HashSet};

    struct Rules {
        rules: HashMap<String, ValidationRule>,
        not_required: HashSet<String>,
        ignore: HashSet<String>,
    }

    impl Rules {
        fn contact_form() -> Self {
            Self {
                rules: HashMap::from([
                    ("first_name".into(), ValidationRule::SanitizeText),
                    ("last_name".into(), ValidationRule::SanitizeText),
                    ("email".into(), ValidationRule::ValidateEmail),
                    ("message".into(), ValidationRule::SanitizeText),
                ]),
                not_required: HashSet::new(),
                ignore: HashSet::from(["g-recaptcha-response".into()]),
            }
        }

        fn with_optional(mut self, field: &str) -> Self {
            self.not_required.insert(field.into());
            self
        }

        fn validator(&self) -> FieldValidator<'_> {
            FieldValidator::new(&self.rules, &self.not_required, &self.ignore)
        }
    }

    fn valid_fields() -> SubmittedFields {
        SubmittedFields::from_iter([
            ("first_name", "Jo"),
            ("last_name", "Doe"),
            ("email", "jo@x.com"),
            ("message", "Hi"),
        ])
    }

    fn keyed_errors(messages: &MessageSet) -> Vec<(Option<String>, String)> {
        messages
            .errors()
            .iter()
            .map(|error| (error.key.clone(), error.text.clone()))
            .collect()
    }

    #[test]
    fn accepts_complete_submission_without_errors() -> Result<()> {
        let rules = Rules::contact_form();
        let mut messages = MessageSet::new();

        let outcome = rules.validator().validate(&valid_fields(), &mut messages);

        verify_that!(outcome, ok(eq(ValidationOutcome::Valid(valid_fields()))))?;
        verify_that!(messages.has_errors(), eq(false))
    }

    #[test]
    fn reports_empty_required_field_with_humanized_name() -> Result<()> {
        let rules = Rules::contact_form();
        let mut fields = valid_fields();
        fields.insert("first_name", "");
        let mut messages = MessageSet::new();

        let outcome = rules.validator().validate(&fields, &mut messages);

        verify_that!(outcome, ok(eq(ValidationOutcome::Invalid)))?;
        verify_that!(
            keyed_errors(&messages),
            elements_are![eq((
                Some("first_name".to_string()),
                "first name is required.".to_string()
            ))]
        )
    }

    #[test]
    fn skips_format_check_for_empty_required_field() -> Result<()> {
        let rules = Rules::contact_form();
        let mut fields = valid_fields();
        fields.insert("email", "");
        let mut messages = MessageSet::new();

        rules.validator().validate(&fields, &mut messages)?;

        verify_that!(messages.error_for("email"), some(eq("email is required.")))
    }

    #[test]
    fn accepts_empty_optional_field() -> Result<()> {
        let rules = Rules::contact_form().with_optional("last_name");
        let mut fields = valid_fields();
        fields.insert("last_name", "");
        let mut messages = MessageSet::new();

        let outcome = rules.validator().validate(&fields, &mut messages)?;

        verify_that!(outcome.is_valid(), eq(true))?;
        verify_that!(messages.has_errors(), eq(false))
    }

    #[test]
    fn still_checks_format_of_non_empty_optional_field() -> Result<()> {
        let rules = Rules::contact_form().with_optional("email");
        let mut fields = valid_fields();
        fields.insert("email", "not an address");
        let mut messages = MessageSet::new();

        let outcome = rules.validator().validate(&fields, &mut messages)?;

        verify_that!(outcome, eq(ValidationOutcome::Invalid))?;
        verify_that!(
            messages.error_for("email"),
            some(eq("Please provide a valid email."))
        )
    }

    #[test]
    fn rejects_malformed_email_address() -> Result<()> {
        let rules = Rules::contact_form();
        let mut fields = valid_fields();
        fields.insert("email", "jo@");
        let mut messages = MessageSet::new();

        let outcome = rules.validator().validate(&fields, &mut messages)?;

        verify_that!(outcome, eq(ValidationOutcome::Invalid))?;
        verify_that!(
            keyed_errors(&messages),
            elements_are![eq((
                Some("email".to_string()),
                "Please provide a valid email.".to_string()
            ))]
        )
    }

    #[test]
    fn never_reports_ignored_field() -> Result<()> {
        let rules = Rules::contact_form();
        for value in ["", "anything", "<script>"] {
            let mut fields = valid_fields();
            fields.insert("g-recaptcha-response", value);
            let mut messages = MessageSet::new();

            let outcome = rules.validator().validate(&fields, &mut messages)?;

            verify_that!(outcome.is_valid(), eq(true))?;
            verify_that!(messages.has_error("g-recaptcha-response"), eq(false))?;
        }
        Ok(())
    }

    #[test]
    fn checks_every_field_before_returning() -> Result<()> {
        let rules = Rules::contact_form();
        let fields = SubmittedFields::from_iter([
            ("first_name", ""),
            ("last_name", ""),
            ("email", "nope"),
            ("message", "Hi"),
        ]);
        let mut messages = MessageSet::new();

        rules.validator().validate(&fields, &mut messages)?;

        verify_that!(
            keyed_errors(&messages),
            elements_are![
                eq((
                    Some("first_name".to_string()),
                    "first name is required.".to_string()
                )),
                eq((
                    Some("last_name".to_string()),
                    "last name is required.".to_string()
                )),
                eq((
                    Some("email".to_string()),
                    "Please provide a valid email.".to_string()
                )),
            ]
        )
    }

    #[test]
    fn fails_when_field_has_no_rule() -> Result<()> {
        let rules = Rules::contact_form();
        let mut fields = valid_fields();
        fields.insert("phone", "12345");
        let mut messages = MessageSet::new();

        let outcome = rules.validator().validate(&fields, &mut messages);

        verify_that!(
            outcome,
            err(eq(ConfigurationError::MissingRule("phone".into())))
        )
    }

    #[test]
    fn does_not_need_rule_for_empty_optional_field() -> Result<()> {
        let rules = Rules::contact_form().with_optional("contact_form_submit");
        let mut fields = valid_fields();
        fields.insert("contact_form_submit", "");
        let mut messages = MessageSet::new();

        let outcome = rules.validator().validate(&fields, &mut messages);

        verify_that!(outcome, ok(predicate(ValidationOutcome::is_valid)))
    }

    #[test]
    fn sanitizing_rule_strips_markup_without_rejecting() -> Result<()> {
        let rules = Rules::contact_form();
        let mut fields = valid_fields();
        fields.insert("message", "<b>Hello</b> there, 1 < 2");
        let mut messages = MessageSet::new();

        let outcome = rules.validator().validate(&fields, &mut messages)?;

        let ValidationOutcome::Valid(accepted) = outcome else {
            panic!("Expected submission to be accepted");
        };
        verify_that!(accepted.get("message"), some(eq("Hello there, 1 < 2")))
    }

    #[test]
    fn sanitizing_rule_accepts_value_which_is_only_markup() -> Result<()> {
        let rules = Rules::contact_form();
        let mut fields = valid_fields();
        fields.insert("first_name", "<i></i>");
        let mut messages = MessageSet::new();

        let outcome = rules.validator().validate(&fields, &mut messages)?;

        verify_that!(outcome.is_valid(), eq(true))
    }

    #[test]
    fn humanize_replaces_every_underscore() -> Result<()> {
        verify_that!(humanize("your_last_name"), eq("your last name"))
    }

    #[test]
    fn submitted_fields_keep_submission_order_and_last_value() -> Result<()> {
        let fields = SubmittedFields::from_iter([("b", "1"), ("a", "2"), ("b", "3")]);

        verify_that!(
            fields.iter().collect::<Vec<_>>(),
            elements_are![eq(("b", "3")), eq(("a", "2"))]
        )
    }

    #[test]
    fn submitted_fields_deserialize_from_json_object_in_order() -> Result<()> {
        let fields: SubmittedFields =
            serde_json::from_str(r#"{"message":"Hi","email":"jo@x.com"}"#)?;

        verify_that!(
            fields.iter().collect::<Vec<_>>(),
            elements_are![eq(("message", "Hi")), eq(("email", "jo@x.com"))]
        )
    }
}
