//! Per-row sanitization and validation.
//!
//! Turns one data row into a [`MappedRecord`] using a [`ConfirmedMapping`],
//! or reports the first rule the row breaks as a [`RowErrorKind`].

use crate::import::error::RowErrorKind;
use crate::import::mapping::ConfirmedMapping;
use regex::Regex;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

pub const NAME_MAX: usize = 200;
pub const NAME_MIN: usize = 3;
pub const ADDRESS_MAX: usize = 300;
pub const COMPLEMENT_MAX: usize = 200;
pub const SHORT_CODE_MAX: usize = 50;
pub const EMAIL_MAX: usize = 100;
pub const PHONE_MIN_DIGITS: usize = 10;
pub const PHONE_MAX_DIGITS: usize = 11;
/// Characters of the address used when a row leaves the short code blank.
pub const SHORT_CODE_FROM_ADDRESS: usize = 20;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

/// A sanitized resident row ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MappedRecord {
    pub name: String,
    pub address: String,
    pub complement: String,
    pub short_code: String,
    /// Digits only, 10 or 11 long.
    pub phone: String,
    /// Lower-cased.
    pub email: String,
    /// Injected from the caller's tenant context, never read from the file.
    pub tenant_id: Uuid,
}

pub struct RowSanitizer<'a> {
    mapping: &'a ConfirmedMapping,
    tenant_id: Uuid,
}

impl<'a> RowSanitizer<'a> {
    pub fn new(mapping: &'a ConfirmedMapping, tenant_id: Uuid) -> Self {
        Self { mapping, tenant_id }
    }

    pub fn sanitize(&self, row: &[String]) -> Result<MappedRecord, RowErrorKind> {
        let name = capped(row, self.mapping.name(), NAME_MAX);
        let address = capped(row, self.mapping.address(), ADDRESS_MAX);
        let complement = self
            .mapping
            .complement()
            .map(|index| capped(row, index, COMPLEMENT_MAX))
            .unwrap_or_default();
        let short_code = self
            .mapping
            .short_code()
            .map(|index| capped(row, index, SHORT_CODE_MAX))
            .unwrap_or_default();
        let phone = cell(row, self.mapping.phone());
        let email = capped(row, self.mapping.email(), EMAIL_MAX);

        if name.is_empty() || address.is_empty() || phone.is_empty() || email.is_empty() {
            return Err(RowErrorKind::RequiredFieldEmpty);
        }

        if name.chars().count() < NAME_MIN {
            return Err(RowErrorKind::NameTooShort);
        }

        let phone = normalize_phone(phone).ok_or(RowErrorKind::InvalidPhone)?;
        let email = normalize_email(&email).ok_or(RowErrorKind::InvalidEmail)?;

        let short_code = if short_code.is_empty() {
            truncate(&address, SHORT_CODE_FROM_ADDRESS)
        } else {
            short_code
        };

        Ok(MappedRecord {
            name,
            address,
            complement,
            short_code,
            phone,
            email,
            tenant_id: self.tenant_id,
        })
    }
}

/// Keep digits only, capped at 11; `None` when fewer than 10 remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(PHONE_MAX_DIGITS)
        .collect();

    (digits.len() >= PHONE_MIN_DIGITS).then_some(digits)
}

/// Lower-case and cap an email; `None` when it does not match the basic grammar.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = truncate(&raw.to_lowercase(), EMAIL_MAX);
    email_regex().is_match(&email).then_some(email)
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(|value| value.trim()).unwrap_or("")
}

fn capped(row: &[String], index: usize, max: usize) -> String {
    truncate(cell(row, index), max)
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
