use std::{error::Error, path::Path, process::exit};

use clap::Parser;
use rusqlite::Connection;
use time::{Date, OffsetDateTime, macros::format_description};

use financeasy::{DEMO_EMAIL, DEMO_PASSWORD, PasswordHash, create_demo_data, initialize_db};

/// Creates a FinancEasy database filled with a demo user, a card, an
/// installment purchase and three months of income and expenses.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Where to create the SQLite database. The file must not exist yet.
    #[arg(long, short)]
    output_path: String,

    /// The first day of the sample data as YYYY-MM-DD. Defaults to the first
    /// day of the current month.
    #[arg(long, short)]
    start: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let output_path = Path::new(&args.output_path);

    if let Err(message) = check_output_path(output_path) {
        eprintln!("{message}");
        exit(1);
    }

    let start = match args.start {
        Some(text) => Date::parse(&text, format_description!("[year]-[month]-[day]"))
            .map_err(|error| format!("Invalid start date \"{text}\": {error}"))?,
        None => OffsetDateTime::now_utc().date().replace_day(1)?,
    };

    let conn = Connection::open(output_path)?;
    initialize_db(&conn)?;
    println!("Created tables in {output_path:#?}");

    let user = create_demo_data(start, PasswordHash::DEFAULT_COST, &conn)?;
    println!("Added sample data for {} starting {start}", user.nome);
    println!("Email: {DEMO_EMAIL}");
    println!("Senha: {DEMO_PASSWORD}");

    Ok(())
}

fn check_output_path(path: &Path) -> Result<(), String> {
    if path.extension().is_none_or(|extension| extension.is_empty()) {
        return Err("The output path needs a file extension, e.g. 'financeasy.db'.".to_owned());
    }

    if path.exists() {
        return Err(format!("Refusing to overwrite {path:#?}."));
    }

    Ok(())
}
