use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use condo_api::db::run_migrations;
use condo_api::import::{
    FieldMapping, ImportConfig, ImportField, ImportRun, ProcessOptions, RawFile,
};
use condo_api::residents::PgResidentStore;

#[derive(Parser, Debug)]
#[command(
    name = "import_residents",
    about = "Bulk-import residents of one condominium from a CSV or spreadsheet file"
)]
struct Args {
    /// File to import (.csv, .xlsx, .xls or .ods).
    #[arg(long)]
    file: PathBuf,

    /// Tenant (condominium) id the residents belong to.
    #[arg(long)]
    tenant: Uuid,

    /// Zero-based column for the resident name, overriding header detection.
    #[arg(long)]
    map_name: Option<usize>,

    #[arg(long)]
    map_address: Option<usize>,

    #[arg(long)]
    map_complement: Option<usize>,

    #[arg(long)]
    map_short_code: Option<usize>,

    #[arg(long)]
    map_phone: Option<usize>,

    #[arg(long)]
    map_email: Option<usize>,

    /// Write the `Line,Reason` error report to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Skip the large-import confirmation.
    #[arg(long)]
    yes: bool,
}

impl Args {
    fn apply_overrides(&self, mapping: &mut FieldMapping) {
        let overrides = [
            (ImportField::Name, self.map_name),
            (ImportField::Address, self.map_address),
            (ImportField::Complement, self.map_complement),
            (ImportField::ShortCode, self.map_short_code),
            (ImportField::Phone, self.map_phone),
            (ImportField::Email, self.map_email),
        ];

        for (field, index) in overrides {
            if index.is_some() {
                mapping.set(field, index);
            }
        }
    }
}

fn fail(message: impl std::fmt::Display) -> Result<(), Box<dyn std::error::Error>> {
    writeln!(io::stderr(), "error: {message}")?;
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let config = ImportConfig::from_env();

    let bytes = std::fs::read(&args.file)?;
    let file_name = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();

    let run = match ImportRun::new(args.tenant, RawFile::new(file_name, bytes)).parse(&config) {
        Ok(run) => run,
        Err(err) => return fail(err),
    };

    let mut mapping = run.proposed_mapping();
    args.apply_overrides(&mut mapping);

    let headers = &run.table().headers;
    for field in ImportField::ALL {
        let column = mapping
            .get(field)
            .and_then(|index| headers.get(index).map(|header| format!("{index} ({header})")))
            .unwrap_or_else(|| "-".to_string());
        println!("{:>10} <- {}", field.as_str(), column);
    }

    let confirmed = match run.validate_mapping(mapping) {
        Ok(confirmed) => confirmed,
        Err(err) => return fail(format!("{err}. Use --map-<field> <column> to set it.")),
    };
    let run = run.confirm(confirmed);

    if run.needs_confirmation(config.confirm_threshold) && !args.yes {
        return fail(format!(
            "{} rows exceed the confirmation threshold of {}; rerun with --yes",
            run.row_count(),
            config.confirm_threshold
        ));
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(config.batch_size.clamp(1, 32) as u32)
        .connect(&database_url)
        .await?;
    run_migrations(&pool).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, stopping after the current batch");
            ctrl_c.cancel();
        }
    });

    let store = PgResidentStore::new(pool);
    let options = ProcessOptions::from_config(&config).with_cancel(cancel);
    let reported = run.execute(&store, &options).await;
    let result = reported.result();

    println!(
        "Imported {} of {} rows ({} ignored)",
        result.succeeded, result.total_rows, result.ignored
    );
    for error in &result.errors {
        println!("  line {}: {}", error.line, error.reason);
    }

    if let Some(path) = &args.report {
        std::fs::write(path, result.error_report_csv()?)?;
        println!("Error report written to {}", path.display());
    }

    Ok(())
}
