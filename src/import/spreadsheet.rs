//! Workbook decoding (`.xlsx`, `.xls`, `.ods`).
//!
//! Only the first worksheet is read. Cells are rendered as text so the
//! result feeds the same mapping and sanitizing stages as a CSV upload.

use crate::import::error::ImportError;
use crate::import::parser::ParsedTable;
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use std::io::Cursor;

pub fn decode_workbook(bytes: Vec<u8>) -> Result<ParsedTable, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|err| ImportError::Spreadsheet(err.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::NoColumns)?
        .map_err(|err| ImportError::Spreadsheet(err.to_string()))?;

    let records: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    log::debug!("decoded {} non-blank worksheet rows", records.len());

    ParsedTable::from_records(records)
}

/// Render a cell the way it would appear in a CSV export.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.trim().to_string(),
        // Phone numbers typed into a numeric column come back as floats.
        Data::Float(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            (*value as i64).to_string()
        }
        other => other.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_floats_render_without_fraction() {
        assert_eq!(cell_text(&Data::Float(11987654321.0)), "11987654321");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::Int(42)), "42");
    }

    #[test]
    fn strings_are_trimmed() {
        assert_eq!(cell_text(&Data::String("  Maria ".into())), "Maria");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn reads_first_sheet_and_skips_blank_rows() {
        let bytes = include_bytes!("../../tests/fixtures/residents.xlsx").to_vec();
        let table = decode_workbook(bytes).expect("fixture decodes");

        assert_eq!(table.headers, vec!["Nome", "Endereço", "Telefone", "E-mail"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.rows[0],
            vec!["Maria Silva", "Rua A 10", "11987654321", "maria@example.com"]
        );
        assert_eq!(table.rows[1][0], "Ana Lima");
        assert!(table.rows.iter().flatten().all(|cell| cell != "Notas"));
    }

    #[test]
    fn garbage_bytes_are_a_spreadsheet_error() {
        let err = decode_workbook(b"definitely not a workbook".to_vec()).unwrap_err();
        assert!(matches!(err, ImportError::Spreadsheet(_)));
    }
}
