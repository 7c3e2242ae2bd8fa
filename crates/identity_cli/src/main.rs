//! Operator CLI over a contact database file.
//!
//! # Responsibility
//! - Run one reconciliation from the command line and print the response.
//! - Audit stored clusters for invariant breaches.
//! - Dump active contacts as JSON.
//!
//! Exit codes: 0 success, 1 failure or violations found, 2 usage or
//! validation error.

use identity_core::db::open_db;
use identity_core::{
    audit_clusters, core_version, ContactStore, IdentifyError, IdentifyResponse,
    IdentityResolver, SqliteContactStore,
};
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "usage:
  identity_cli identify --db <path> [--email <email>] [--phone <phone>]
  identity_cli audit --db <path>
  identity_cli contacts --db <path>
  identity_cli version";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Identify {
        db: PathBuf,
        email: Option<String>,
        phone: Option<String>,
    },
    Audit {
        db: PathBuf,
    },
    Contacts {
        db: PathBuf,
    },
    Version,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match command {
        Command::Version => {
            println!("identity_core version={}", core_version());
            ExitCode::SUCCESS
        }
        Command::Identify { db, email, phone } => run_identify(db, email, phone),
        Command::Audit { db } => run_audit(db),
        Command::Contacts { db } => run_contacts(db),
    }
}

fn run_identify(db: PathBuf, email: Option<String>, phone: Option<String>) -> ExitCode {
    let conn = match open_db(&db) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("cannot open {}: {err}", db.display());
            return ExitCode::FAILURE;
        }
    };
    let store = match SqliteContactStore::try_new(&conn) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match IdentityResolver::new(store).identify(email.as_deref(), phone.as_deref()) {
        Ok(summary) => match serde_json::to_string_pretty(&IdentifyResponse::from(summary)) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{err}");
                ExitCode::FAILURE
            }
        },
        Err(IdentifyError::Validation(err)) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run_audit(db: PathBuf) -> ExitCode {
    let conn = match open_db(&db) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("cannot open {}: {err}", db.display());
            return ExitCode::FAILURE;
        }
    };
    let violations = SqliteContactStore::try_new(&conn).and_then(|store| audit_clusters(&store));

    match violations {
        Ok(violations) if violations.is_empty() => {
            println!("ok: no cluster violations");
            ExitCode::SUCCESS
        }
        Ok(violations) => {
            for violation in &violations {
                println!("{violation}");
            }
            println!("{} violation(s)", violations.len());
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run_contacts(db: PathBuf) -> ExitCode {
    let conn = match open_db(&db) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("cannot open {}: {err}", db.display());
            return ExitCode::FAILURE;
        }
    };
    let contacts = match SqliteContactStore::try_new(&conn).and_then(|store| store.list_active())
    {
        Ok(contacts) => contacts,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&contacts) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let (name, rest) = args
        .split_first()
        .ok_or_else(|| "missing command".to_string())?;

    let mut db = None;
    let mut email = None;
    let mut phone = None;
    let mut iter = rest.iter();
    while let Some(flag) = iter.next() {
        let slot = match flag.as_str() {
            "--db" => &mut db,
            "--email" => &mut email,
            "--phone" => &mut phone,
            other => return Err(format!("unknown argument `{other}`")),
        };
        let value = iter
            .next()
            .ok_or_else(|| format!("`{flag}` needs a value"))?;
        *slot = Some(value.clone());
    }

    let require_db = |db: Option<String>| {
        db.map(PathBuf::from)
            .ok_or_else(|| "`--db <path>` is required".to_string())
    };

    match name.as_str() {
        "identify" => Ok(Command::Identify {
            db: require_db(db)?,
            email,
            phone,
        }),
        "audit" if email.is_none() && phone.is_none() => Ok(Command::Audit {
            db: require_db(db)?,
        }),
        "audit" => Err("`audit` takes only `--db`".to_string()),
        "contacts" if email.is_none() && phone.is_none() => Ok(Command::Contacts {
            db: require_db(db)?,
        }),
        "contacts" => Err("`contacts` takes only `--db`".to_string()),
        "version" if rest.is_empty() => Ok(Command::Version),
        "version" => Err("`version` takes no arguments".to_string()),
        other => Err(format!("unknown command `{other}`")),
    }
}
