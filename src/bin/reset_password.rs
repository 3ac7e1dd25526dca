use std::{error::Error, io, path::Path, process::exit};

use clap::Parser;
use rusqlite::Connection;

use financeasy::{PasswordHash, User, ValidatedPassword, get_user_by_email, update_password};

/// Sets a new password for a FinancEasy user, e.g. when they have forgotten it.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The SQLite database used by the server.
    #[arg(long)]
    db_path: String,

    /// The email address the user registered with.
    #[arg(long)]
    email: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let db_path = Path::new(&args.db_path);

    if !db_path.is_file() {
        print_error(format!("no database at {db_path:#?}"));
        exit(1);
    }

    let conn = Connection::open(db_path)?;

    let Ok(user) = get_user_by_email(&args.email, &conn) else {
        print_error(format!("no user is registered with {}", args.email));
        exit(1);
    };
    println!("Changing the password of {} <{}>", user.nome, user.email);

    let Some(password_hash) = choose_password(&user) else {
        println!("Password left unchanged.");
        return Ok(());
    };

    update_password(user.id, &password_hash, &conn)?;
    println!("Password changed.");

    Ok(())
}

/// Prompt until the user enters a strong password twice.
///
/// Returns `None` if stdin is closed or cannot be read.
fn choose_password(user: &User) -> Option<PasswordHash> {
    loop {
        println!();
        let password = prompt("New password: ")?;

        let validated = match ValidatedPassword::new(&password, &[&user.nome, &user.email]) {
            Ok(validated) => validated,
            Err(error) => {
                print_error(error);
                continue;
            }
        };

        if prompt("Repeat the password: ")? != password {
            print_error("the passwords do not match");
            continue;
        }

        match PasswordHash::new(validated, PasswordHash::DEFAULT_COST) {
            Ok(hash) => return Some(hash),
            Err(error) => print_error(error),
        }
    }
}

fn prompt(label: &str) -> Option<String> {
    match rpassword::prompt_password(label) {
        Ok(text) => Some(text),
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => None,
        Err(error) => {
            print_error(format!("could not read stdin: {error}"));
            None
        }
    }
}

/// Print `error` in bold red with its first letter capitalised.
fn print_error(error: impl ToString) {
    let message = error.to_string();
    let mut chars = message.chars();
    let capitalised: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };

    eprintln!("\x1b[31;1m{capitalised}\x1b[0m");
}
