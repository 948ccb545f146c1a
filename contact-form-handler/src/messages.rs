/// An error shown to the person submitting the form. Keyed errors belong to a single form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub key: Option<String>,
    pub text: String,
}

/// The messages collected while handling one submission.
///
/// Errors keep their insertion order. Adding a keyed error for a field which already has one
/// replaces the text in place, so each field carries at most one error. Unkeyed errors are
/// appended and may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSet {
    errors: Vec<ErrorMessage>,
    successes: Vec<String>,
}

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty key is treated the same as no key.
    pub fn add_error(&mut self, text: impl Into<String>, key: Option<&str>) {
        let text = text.into();
        match key.filter(|key| !key.is_empty()) {
            Some(key) => {
                if let Some(existing) = self
                    .errors
                    .iter_mut()
                    .find(|error| error.key.as_deref() == Some(key))
                {
                    existing.text = text;
                } else {
                    self.errors.push(ErrorMessage {
                        key: Some(key.into()),
                        text,
                    });
                }
            }
            None => self.errors.push(ErrorMessage { key: None, text }),
        }
    }

    pub fn add_success(&mut self, text: impl Into<String>) {
        self.successes.push(text.into());
    }

    pub fn errors(&self) -> &[ErrorMessage] {
        &self.errors
    }

    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.error_for(field).is_some()
    }

    pub fn error_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| error.key.as_deref() == Some(field))
            .map(|error| error.text.as_str())
    }
}
