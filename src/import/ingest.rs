//! Upload intake: extension allow-list, size ceiling and text decoding.

use crate::import::config::ImportConfig;
use crate::import::error::ImportError;
use encoding_rs::WINDOWS_1252;
use std::path::Path;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const TEXT_EXTENSIONS: [&str; 1] = ["csv"];

/// An uploaded file as received. Dropped once parsed.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub file_name: String,
    /// Lower-cased, without the dot. Empty when the name has none.
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let extension = Path::new(&file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        Self {
            file_name,
            extension,
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Content of an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestedFile {
    /// Decoded delimited text.
    Text(String),
    /// Workbook bytes for the spreadsheet decoder.
    Spreadsheet(Vec<u8>),
}

pub struct FileIngester<'a> {
    config: &'a ImportConfig,
}

impl<'a> FileIngester<'a> {
    pub fn new(config: &'a ImportConfig) -> Self {
        Self { config }
    }

    pub fn ingest(&self, file: RawFile) -> Result<IngestedFile, ImportError> {
        if !self.config.accepts(&file.extension) {
            return Err(ImportError::UnsupportedFormat {
                extension: file.extension,
                accepted: self.config.accepted_extensions.join(", "),
            });
        }

        if file.size() > self.config.max_file_bytes {
            return Err(ImportError::TooLarge {
                limit: self.config.max_file_bytes,
            });
        }

        if file.bytes.is_empty() {
            return Err(ImportError::EmptyFile);
        }

        if !TEXT_EXTENSIONS.contains(&file.extension.as_str()) {
            return Ok(IngestedFile::Spreadsheet(file.bytes));
        }

        let text = decode_text(file.bytes);
        if text.trim().is_empty() {
            return Err(ImportError::EmptyFile);
        }

        Ok(IngestedFile::Text(text))
    }
}

/// UTF-8 with an optional BOM, falling back to Windows-1252.
pub fn decode_text(bytes: Vec<u8>) -> String {
    let bytes = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => rest.to_vec(),
        None => bytes,
    };

    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            log::debug!("upload is not valid UTF-8, decoding as windows-1252");
            let (text, _, _) = WINDOWS_1252.decode(err.as_bytes());
            text.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest(name: &str, bytes: &[u8]) -> Result<IngestedFile, ImportError> {
        let config = ImportConfig::default();
        FileIngester::new(&config).ingest(RawFile::new(name, bytes.to_vec()))
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(matches!(
            ingest("residents.txt", b"a,b"),
            Err(ImportError::UnsupportedFormat { extension, .. }) if extension == "txt"
        ));
        assert!(matches!(
            ingest("residents", b"a,b"),
            Err(ImportError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn rejects_oversize_files() {
        let config = ImportConfig {
            max_file_bytes: 4,
            ..ImportConfig::default()
        };
        let result = FileIngester::new(&config).ingest(RawFile::new("a.csv", b"12345".to_vec()));
        assert!(matches!(result, Err(ImportError::TooLarge { limit: 4 })));
    }

    #[test]
    fn blank_text_is_empty() {
        assert!(matches!(ingest("a.csv", b""), Err(ImportError::EmptyFile)));
        assert!(matches!(ingest("a.csv", b" \r\n\n"), Err(ImportError::EmptyFile)));
        assert!(matches!(ingest("a.xlsx", b""), Err(ImportError::EmptyFile)));
    }

    #[test]
    fn strips_bom_and_accepts_uppercase_extension() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("Nome,Endereço\n".as_bytes());
        assert_eq!(
            ingest("MORADORES.CSV", &bytes).expect("accepted"),
            IngestedFile::Text("Nome,Endereço\n".to_string())
        );
    }

    #[test]
    fn falls_back_to_windows_1252() {
        // "Endereço" as exported by a legacy spreadsheet tool.
        let bytes = b"Nome,Endere\xE7o\n";
        assert_eq!(
            ingest("a.csv", bytes).expect("accepted"),
            IngestedFile::Text("Nome,Endereço\n".to_string())
        );
    }

    #[test]
    fn binary_formats_pass_through() {
        assert_eq!(
            ingest("a.xlsx", b"PK\x03\x04").expect("accepted"),
            IngestedFile::Spreadsheet(b"PK\x03\x04".to_vec())
        );
    }
}
