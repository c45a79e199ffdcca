//! Field-by-field request validation that reports every problem at once.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::intake::ContentRules;
use crate::models::task::ServiceCategory;
use crate::{AppError, Result};

/// Collects missing and invalid field names while reading a JSON body.
///
/// Readers return `None` for a bad field and record its name; call
/// [`Fields::finish`] before using any value.
pub struct Fields<'a> {
    body: &'a Map<String, Value>,
    missing: Vec<String>,
    invalid: Vec<String>,
}

impl<'a> Fields<'a> {
    /// Start validating `body`.
    #[must_use]
    pub fn new(body: &'a Map<String, Value>) -> Self {
        Self {
            body,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    fn value(&self, name: &str) -> Option<&'a Value> {
        self.body.get(name)
    }

    fn present(&self, name: &str) -> Option<&'a Value> {
        self.value(name).filter(|value| !value.is_null())
    }

    fn invalid(&mut self, name: &str) {
        self.invalid.push(name.to_owned());
    }

    /// Required non-blank string.
    pub fn required_str(&mut self, name: &str) -> Option<String> {
        if self.present(name).is_none() {
            self.missing.push(name.to_owned());
            return None;
        }
        self.patch_str(name)
    }

    /// Optional non-blank string; absent yields `None` without complaint.
    pub fn patch_str(&mut self, name: &str) -> Option<String> {
        match self.value(name)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            _ => {
                self.invalid(name);
                None
            }
        }
    }

    /// Nullable string: absent → `None`, `null` or blank → `Some(None)`.
    pub fn nullable_str(&mut self, name: &str) -> Option<Option<String>> {
        match self.value(name)? {
            Value::Null => Some(None),
            Value::String(s) if s.trim().is_empty() => Some(None),
            Value::String(s) => Some(Some(s.trim().to_owned())),
            _ => {
                self.invalid(name);
                None
            }
        }
    }

    /// Required positive integer id.
    pub fn required_id(&mut self, name: &str) -> Option<i64> {
        if self.present(name).is_none() {
            self.missing.push(name.to_owned());
            return None;
        }
        match self.nullable_id(name) {
            Some(Some(id)) => Some(id),
            _ => None,
        }
    }

    /// Nullable id: absent → `None`, `null` → `Some(None)`.
    pub fn nullable_id(&mut self, name: &str) -> Option<Option<i64>> {
        match self.value(name)? {
            Value::Null => Some(None),
            value => match value.as_i64().filter(|id| *id > 0) {
                Some(id) => Some(Some(id)),
                None => {
                    self.invalid(name);
                    None
                }
            },
        }
    }

    /// Required value of a closed string enumeration.
    pub fn required_code<T>(&mut self, name: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
        if self.present(name).is_none() {
            self.missing.push(name.to_owned());
            return None;
        }
        self.patch_code(name, parse)
    }

    /// Optional value of a closed string enumeration.
    pub fn patch_code<T>(&mut self, name: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
        let value = self.value(name)?;
        match value.as_str().and_then(parse) {
            Some(code) => Some(code),
            None => {
                self.invalid(name);
                None
            }
        }
    }

    /// Optional array of service category codes.
    pub fn services(&mut self, name: &str) -> Option<Vec<ServiceCategory>> {
        let Value::Array(items) = self.value(name)? else {
            self.invalid(name);
            return None;
        };
        let parsed: Option<Vec<ServiceCategory>> = items
            .iter()
            .map(|item| item.as_str().and_then(ServiceCategory::parse))
            .collect();
        if parsed.is_none() {
            self.invalid(name);
        }
        parsed
    }

    /// Required array of service category codes.
    pub fn required_services(&mut self, name: &str) -> Option<Vec<ServiceCategory>> {
        if self.present(name).is_none() {
            self.missing.push(name.to_owned());
            return None;
        }
        self.services(name)
    }

    /// Optional email address checked against `rules`.
    pub fn patch_email(&mut self, name: &str, rules: &ContentRules) -> Option<String> {
        let email = self.patch_str(name)?;
        if rules.is_valid_address(&email) {
            Some(email)
        } else {
            self.invalid(name);
            None
        }
    }

    /// Required email address checked against `rules`.
    pub fn required_email(&mut self, name: &str, rules: &ContentRules) -> Option<String> {
        if self.present(name).is_none() {
            self.missing.push(name.to_owned());
            return None;
        }
        self.patch_email(name, rules)
    }

    /// Optional RFC 3339 timestamp.
    pub fn timestamp(&mut self, name: &str) -> Option<DateTime<Utc>> {
        match self.value(name)? {
            Value::Null => None,
            Value::String(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(at) => Some(at.with_timezone(&Utc)),
                Err(_) => {
                    self.invalid(name);
                    None
                }
            },
            _ => {
                self.invalid(name);
                None
            }
        }
    }

    /// Fail with a validation error if any field was missing or invalid.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` listing every problem field.
    pub fn finish(self) -> Result<()> {
        if self.missing.is_empty() && self.invalid.is_empty() {
            return Ok(());
        }
        let message = if self.missing.is_empty() {
            "Invalid fields"
        } else {
            "Missing required fields"
        };
        Err(AppError::validation(message, self.missing, self.invalid))
    }
}

/// Query-string filters with typed accessors.
pub struct Filters<'a> {
    params: &'a HashMap<String, String>,
    invalid: Vec<String>,
}

impl<'a> Filters<'a> {
    /// Start reading `params`.
    #[must_use]
    pub fn new(params: &'a HashMap<String, String>) -> Self {
        Self {
            params,
            invalid: Vec::new(),
        }
    }

    /// Optional positive integer id parameter.
    pub fn id(&mut self, name: &str) -> Option<i64> {
        let raw = self.params.get(name).filter(|raw| !raw.is_empty())?;
        match raw.parse::<i64>() {
            Ok(id) if id > 0 => Some(id),
            _ => {
                self.invalid.push(name.to_owned());
                None
            }
        }
    }

    /// Optional enumeration parameter.
    pub fn code<T>(&mut self, name: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.params.get(name).filter(|raw| !raw.is_empty())?;
        let parsed = parse(raw);
        if parsed.is_none() {
            self.invalid.push(name.to_owned());
        }
        parsed
    }

    /// Boolean flag: present as `true` or `1`.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.params
            .get(name)
            .is_some_and(|raw| raw == "true" || raw == "1")
    }

    /// Fail if any parameter was malformed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` listing every malformed parameter.
    pub fn finish(self) -> Result<()> {
        if self.invalid.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(
                "Invalid query parameters",
                Vec::new(),
                self.invalid,
            ))
        }
    }
}
