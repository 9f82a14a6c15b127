//! Form field configuration and validation.
//!
//! Requests carry `{"formFields": [{"id": "email", "value": "..."}, ...]}`.
//! Every configured field is checked: missing non-optional fields and
//! validator failures are collected into one [`Error::FieldErrors`].

use std::sync::Arc;

use keyward_core::{Error, FieldError, Result};
use serde_json::Value;

use crate::utils::{is_valid_email, normalise_email};

/// Id of the email field.
pub const EMAIL: &str = "email";
/// Id of the password field.
pub const PASSWORD: &str = "password";

/// Returns `Some(message)` when the value is rejected.
pub type Validator = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A submitted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    /// Field id.
    pub id: String,
    /// Submitted value. Emails are trimmed.
    pub value: String,
}

/// Configuration of one accepted field.
#[derive(Clone)]
pub struct FormFieldConfig {
    /// Field id.
    pub id: String,
    /// May the field be absent or empty?
    pub optional: bool,
    validator: Option<Validator>,
}

impl FormFieldConfig {
    /// Required field accepting any value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            optional: false,
            validator: None,
        }
    }

    /// Mark the field optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Attach a validator.
    #[must_use]
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    fn validate(&self, value: &str) -> Option<String> {
        self.validator.as_ref().and_then(|validator| validator(value))
    }
}

impl std::fmt::Debug for FormFieldConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormFieldConfig")
            .field("id", &self.id)
            .field("optional", &self.optional)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// Default email validator.
#[must_use]
pub fn default_email_validator(value: &str) -> Option<String> {
    if is_valid_email(value) {
        None
    } else {
        Some("Email is invalid".to_string())
    }
}

/// Default password policy: 8 to 99 characters with a letter and a digit.
#[must_use]
pub fn default_password_validator(value: &str) -> Option<String> {
    let length = value.chars().count();
    if length < 8 {
        return Some("Password must contain at least 8 characters, including a number".to_string());
    }
    if length >= 100 {
        return Some("Password's length must be lesser than 100 characters".to_string());
    }
    if !value.chars().any(char::is_alphabetic) {
        return Some("Password must contain at least one alphabet".to_string());
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Some("Password must contain at least one number".to_string());
    }
    None
}

/// Normalised sign-up fields: the configured ones, with `email` and
/// `password` always present and falling back to the default validators.
#[must_use]
pub fn normalise_sign_up_fields(configured: &[FormFieldConfig]) -> Vec<FormFieldConfig> {
    let mut fields: Vec<FormFieldConfig> = configured
        .iter()
        .map(|field| {
            let mut field = field.clone();
            if field.id == EMAIL || field.id == PASSWORD {
                field.optional = false;
            }
            if field.validator.is_none() {
                if field.id == EMAIL {
                    field = field.with_validator(default_email_validator);
                } else if field.id == PASSWORD {
                    field = field.with_validator(default_password_validator);
                }
            }
            field
        })
        .collect();

    for (id, validator) in [
        (EMAIL, default_email_validator as fn(&str) -> Option<String>),
        (PASSWORD, default_password_validator),
    ] {
        if !fields.iter().any(|field| field.id == id) {
            fields.push(FormFieldConfig::new(id).with_validator(validator));
        }
    }
    fields
}

/// Sign-in fields: the sign-up email field and an unchecked password.
#[must_use]
pub fn sign_in_fields(sign_up: &[FormFieldConfig]) -> Vec<FormFieldConfig> {
    let email = sign_up
        .iter()
        .find(|field| field.id == EMAIL)
        .cloned()
        .unwrap_or_else(|| FormFieldConfig::new(EMAIL).with_validator(default_email_validator));
    vec![email, FormFieldConfig::new(PASSWORD)]
}

/// Fields with the given ids, taken from the sign-up configuration.
#[must_use]
pub fn subset(sign_up: &[FormFieldConfig], ids: &[&str]) -> Vec<FormFieldConfig> {
    sign_up
        .iter()
        .filter(|field| ids.contains(&field.id.as_str()))
        .cloned()
        .collect()
}

/// Parse `formFields` out of a JSON body.
///
/// # Errors
///
/// [`Error::BadInput`] when `formFields` is missing or not a list of
/// `{id, value}` string pairs.
pub fn parse_form_fields(body: &Value) -> Result<Vec<FormField>> {
    let malformed =
        || Error::bad_input("formFields must be an array of objects containing id and value of type string");

    let Some(raw) = body.get("formFields") else {
        return Err(Error::bad_input("Missing input param: formFields"));
    };
    raw.as_array()
        .ok_or_else(malformed)?
        .iter()
        .map(|item| {
            let id = item.get("id").and_then(Value::as_str).ok_or_else(malformed)?;
            let value = item.get("value").and_then(Value::as_str).ok_or_else(malformed)?;
            let value = if id == EMAIL {
                normalise_email(value)
            } else {
                value.to_string()
            };
            Ok(FormField {
                id: id.to_string(),
                value,
            })
        })
        .collect()
}

/// Check `inputs` against `configs`.
///
/// # Errors
///
/// [`Error::BadInput`] for more inputs than configured fields,
/// [`Error::FieldErrors`] listing every failing field in configuration order.
pub fn validate(configs: &[FormFieldConfig], inputs: &[FormField]) -> Result<()> {
    if inputs.len() > configs.len() {
        return Err(Error::bad_input("Are you sending too many formFields?"));
    }

    let errors: Vec<FieldError> = configs
        .iter()
        .filter_map(|config| {
            let value = inputs
                .iter()
                .find(|input| input.id == config.id)
                .map(|input| input.value.as_str())
                .filter(|value| !value.is_empty());
            match value {
                None if config.optional => None,
                None => Some(FieldError::new(&config.id, "Field is not optional")),
                Some(value) => config
                    .validate(value)
                    .map(|message| FieldError::new(&config.id, message)),
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::FieldErrors(errors))
    }
}

/// Parse and validate in one go.
///
/// # Errors
///
/// See [`parse_form_fields`] and [`validate`].
pub fn parse_and_validate(configs: &[FormFieldConfig], body: &Value) -> Result<Vec<FormField>> {
    let inputs = parse_form_fields(body)?;
    validate(configs, &inputs)?;
    Ok(inputs)
}

/// Value of field `id`, empty when absent.
#[must_use]
pub fn value_of<'a>(fields: &'a [FormField], id: &str) -> &'a str {
    fields
        .iter()
        .find(|field| field.id == id)
        .map_or("", |field| field.value.as_str())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, &str)]) -> Value {
        json!({
            "formFields": pairs
                .iter()
                .map(|(id, value)| json!({ "id": id, "value": value }))
                .collect::<Vec<_>>()
        })
    }

    #[test]
    fn password_policy_messages() {
        assert_eq!(
            default_password_validator("short1").as_deref(),
            Some("Password must contain at least 8 characters, including a number")
        );
        assert_eq!(
            default_password_validator("12345678").as_deref(),
            Some("Password must contain at least one alphabet")
        );
        assert_eq!(
            default_password_validator("abcdefgh").as_deref(),
            Some("Password must contain at least one number")
        );
        assert!(default_password_validator(&"a1".repeat(50)).is_some());
        assert_eq!(default_password_validator("validPass123"), None);
    }

    #[test]
    fn defaults_are_added_to_sign_up_fields() {
        let configured = normalise_sign_up_fields(&[FormFieldConfig::new("name").optional()]);
        let ids: Vec<_> = configured.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["name", EMAIL, PASSWORD]);
    }

    #[test]
    fn custom_validator_replaces_default() {
        let configured = normalise_sign_up_fields(&[FormFieldConfig::new(PASSWORD).with_validator(|_| None)]);
        let body = fields(&[("email", "e1@test.com"), ("password", "pw1")]);
        assert!(parse_and_validate(&configured, &body).is_ok());
    }

    #[test]
    fn collects_all_field_errors() {
        let configured = normalise_sign_up_fields(&[]);
        let body = fields(&[("email", "not-an-email")]);
        let Err(Error::FieldErrors(errors)) = parse_and_validate(&configured, &body) else {
            panic!("expected field errors");
        };
        assert_eq!(
            errors,
            vec![
                FieldError::new(EMAIL, "Email is invalid"),
                FieldError::new(PASSWORD, "Field is not optional"),
            ]
        );
    }

    #[test]
    fn too_many_fields_is_bad_input() {
        let configured = sign_in_fields(&normalise_sign_up_fields(&[]));
        let body = fields(&[("email", "a@b.com"), ("password", "x"), ("extra", "y")]);
        assert!(matches!(parse_and_validate(&configured, &body), Err(Error::BadInput(_))));
    }

    #[test]
    fn malformed_form_fields_is_bad_input() {
        let configured = normalise_sign_up_fields(&[]);
        for body in [json!({}), json!({ "formFields": "x" }), json!({ "formFields": [{ "id": 1 }] })] {
            assert!(matches!(parse_and_validate(&configured, &body), Err(Error::BadInput(_))));
        }
    }

    #[test]
    fn emails_are_trimmed() {
        let parsed = parse_form_fields(&fields(&[("email", "  a@B.com ")])).unwrap();
        assert_eq!(value_of(&parsed, EMAIL), "a@b.com");
        assert_eq!(value_of(&parsed, PASSWORD), "");
    }

    proptest::proptest! {
        #[test]
        fn well_formed_credentials_pass_default_validation(
            email in keyward_testing::properties::email(),
            password in keyward_testing::properties::valid_password(),
        ) {
            let configured = normalise_sign_up_fields(&[]);
            let body = fields(&[("email", email.as_str()), ("password", password.as_str())]);
            proptest::prop_assert!(parse_and_validate(&configured, &body).is_ok());
        }
    }
}
