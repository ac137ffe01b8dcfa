//! Downloadable CSV template.

use crate::import::error::ReportError;

pub const TEMPLATE_FILE_NAME: &str = "residents_template.csv";

pub const TEMPLATE_HEADERS: [&str; 6] = [
    "Name",
    "Address",
    "Complement",
    "ShortCode",
    "Phone",
    "Email",
];

const TEMPLATE_EXAMPLES: [[&str; 6]; 2] = [
    [
        "Maria Silva",
        "Rua das Flores, 100",
        "Apto 12",
        "FLORES100-12",
        "(11) 98765-4321",
        "maria.silva@example.com",
    ],
    [
        "João Souza",
        "Avenida Brasil, 2000",
        "Bloco B",
        "",
        "(21) 3456-7890",
        "joao.souza@example.com",
    ],
];

pub fn template_csv() -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TEMPLATE_HEADERS)?;
    for example in TEMPLATE_EXAMPLES {
        writer.write_record(example)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
