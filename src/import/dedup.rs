//! In-run email de-duplication.
//!
//! Only protects against repeats within one uploaded file. Emails that
//! already exist in storage are caught by the store's own uniqueness
//! constraint, if it has one.

use crate::import::error::RowErrorKind;
use crate::import::sanitize::MappedRecord;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DedupGuard {
    seen: HashSet<String>,
}

impl DedupGuard {
    /// Accept the record unless its (already normalized) email was accepted earlier.
    pub fn admit(&mut self, record: MappedRecord) -> Result<MappedRecord, RowErrorKind> {
        if self.seen.insert(record.email.clone()) {
            Ok(record)
        } else {
            Err(RowErrorKind::DuplicateEmailInFile)
        }
    }

    pub fn accepted(&self) -> usize {
        self.seen.len()
    }
}
