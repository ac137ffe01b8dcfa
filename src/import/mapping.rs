//! Header normalization and field-to-column mapping.
//!
//! The mapper proposes a [`FieldMapping`] by matching normalized headers
//! against a fixed alias list per field. Callers may overwrite any entry;
//! the mapping only becomes usable once [`FieldMapping::confirm`] proves it
//! complete and in range, yielding a [`ConfirmedMapping`].

use crate::import::error::ImportError;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Resident fields a file column can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ImportField {
    Name,
    Address,
    Complement,
    ShortCode,
    Phone,
    Email,
}

impl ImportField {
    pub const ALL: [ImportField; 6] = [
        ImportField::Name,
        ImportField::Address,
        ImportField::Complement,
        ImportField::ShortCode,
        ImportField::Phone,
        ImportField::Email,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImportField::Name => "name",
            ImportField::Address => "address",
            ImportField::Complement => "complement",
            ImportField::ShortCode => "shortCode",
            ImportField::Phone => "phone",
            ImportField::Email => "email",
        }
    }

    pub fn is_required(self) -> bool {
        !matches!(self, ImportField::Complement | ImportField::ShortCode)
    }

    /// Normalized header spellings recognized for this field (pt-BR and English).
    fn aliases(self) -> &'static [&'static str] {
        match self {
            ImportField::Name => &["nome", "name"],
            ImportField::Address => &["endereco", "address", "unidade", "apartamento", "apto"],
            ImportField::Complement => &["complemento", "complement", "bloco", "torre"],
            ImportField::ShortCode => &["shortcode", "short code", "codigo", "sigla"],
            ImportField::Phone => &["telefone", "phone", "celular", "whatsapp", "fone"],
            ImportField::Email => &["email", "mail", "correio"],
        }
    }
}

impl fmt::Display for ImportField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a header for alias matching.
///
/// Lowercases, strips diacritics via NFD decomposition, keeps ASCII
/// alphanumerics and whitespace, then trims. Trimming last keeps the
/// function idempotent.
pub fn normalize_header(raw: &str) -> String {
    let folded: String = raw
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    folded.trim().to_string()
}

/// Column index per field; `None` means unmapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    #[serde(default)]
    pub name: Option<usize>,
    #[serde(default)]
    pub address: Option<usize>,
    #[serde(default)]
    pub complement: Option<usize>,
    #[serde(default)]
    pub short_code: Option<usize>,
    #[serde(default)]
    pub phone: Option<usize>,
    #[serde(default)]
    pub email: Option<usize>,
}

impl FieldMapping {
    /// Propose a mapping from raw headers.
    ///
    /// For each field, the first header whose normalized form contains an
    /// alias (or is contained by one) wins.
    pub fn propose(headers: &[String]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut mapping = FieldMapping::default();

        for field in ImportField::ALL {
            let index = normalized.iter().position(|header| {
                !header.is_empty()
                    && field.aliases().iter().any(|alias| {
                        header.contains(alias) || alias.contains(header.as_str())
                    })
            });
            mapping.set(field, index);
        }

        mapping
    }

    pub fn get(&self, field: ImportField) -> Option<usize> {
        match field {
            ImportField::Name => self.name,
            ImportField::Address => self.address,
            ImportField::Complement => self.complement,
            ImportField::ShortCode => self.short_code,
            ImportField::Phone => self.phone,
            ImportField::Email => self.email,
        }
    }

    pub fn set(&mut self, field: ImportField, index: Option<usize>) {
        let slot = match field {
            ImportField::Name => &mut self.name,
            ImportField::Address => &mut self.address,
            ImportField::Complement => &mut self.complement,
            ImportField::ShortCode => &mut self.short_code,
            ImportField::Phone => &mut self.phone,
            ImportField::Email => &mut self.email,
        };
        *slot = index;
    }

    /// Required fields that are still unmapped, in declaration order.
    pub fn missing_required(&self) -> Vec<ImportField> {
        ImportField::ALL
            .into_iter()
            .filter(|field| field.is_required() && self.get(*field).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// Validate the mapping against a table with `columns` columns.
    pub fn confirm(self, columns: usize) -> Result<ConfirmedMapping, ImportError> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            return Err(ImportError::MappingIncomplete { missing });
        }

        for field in ImportField::ALL {
            if let Some(index) = self.get(field) {
                if index >= columns {
                    return Err(ImportError::MappingOutOfRange {
                        field,
                        index,
                        columns,
                    });
                }
            }
        }

        Ok(ConfirmedMapping(self))
    }
}

/// A mapping with every required field set and every index in range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedMapping(FieldMapping);

impl ConfirmedMapping {
    fn required(&self, field: ImportField) -> usize {
        // Only constructed by `FieldMapping::confirm`, which rejects unmapped required fields.
        self.0.get(field).unwrap_or_default()
    }

    pub fn name(&self) -> usize {
        self.required(ImportField::Name)
    }

    pub fn address(&self) -> usize {
        self.required(ImportField::Address)
    }

    pub fn phone(&self) -> usize {
        self.required(ImportField::Phone)
    }

    pub fn email(&self) -> usize {
        self.required(ImportField::Email)
    }

    pub fn complement(&self) -> Option<usize> {
        self.0.complement
    }

    pub fn short_code(&self) -> Option<usize> {
        self.0.short_code
    }

    pub fn as_mapping(&self) -> &FieldMapping {
        &self.0
    }

    pub fn into_mapping(self) -> FieldMapping {
        self.0
    }
}
