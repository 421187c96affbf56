//! Command-line front end for the database engine.
//!
//! This binary is the spec's "external collaborator": it owns stdin/file
//! reading, statement batching, and result printing, but none of the
//! compilation or execution logic itself lives here — every line of SQL is
//! handed straight to [`database::Database`].

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use common::Config;
use database::Database;
use executor::QueryResult;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tabled::builder::Builder;
use tabled::settings::Style;

#[derive(Parser, Debug)]
#[command(name = "sqldb", about = "Educational single-user SQL engine")]
struct Args {
    /// Directory holding catalog.json, table_files.json, and pages/
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Execute the given SQL text and exit instead of starting the prompt
    #[arg(short = 'e', long = "execute")]
    execute: Option<String>,

    /// Batch-execute a .sql file and exit
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = Config::builder().data_dir(args.data_dir.clone()).build();
    let mut db = Database::open(&config)?;

    if let Some(sql) = &args.execute {
        run_batch(&mut db, sql);
    } else if let Some(path) = &args.file {
        run_file(&mut db, path);
    } else {
        interactive_loop(&mut db)?;
    }

    Ok(())
}

fn interactive_loop(db: &mut Database) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "sql> " } else { "...> " };
        match editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if buffer.is_empty() {
                    let lowered = trimmed.trim_end_matches(';').to_ascii_lowercase();
                    if lowered == "quit" || lowered == "exit" {
                        break;
                    }
                    if let Some(path) = trimmed.strip_prefix(":read ").or_else(|| trimmed.strip_prefix(":r ")) {
                        let _ = editor.add_history_entry(line.as_str());
                        run_file(db, &PathBuf::from(path.trim()));
                        continue;
                    }
                }
                let _ = editor.add_history_entry(line.as_str());
                buffer.push_str(&line);
                buffer.push('\n');
                if ready_to_execute(&buffer) {
                    run_batch(db, &buffer);
                    buffer.clear();
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }
    Ok(())
}

fn run_file(db: &mut Database, path: &PathBuf) {
    match fs::read_to_string(path) {
        Ok(contents) => run_batch(db, &contents),
        Err(e) => eprintln!("could not read '{}': {e}", path.display()),
    }
}

/// Splits `sql` on semicolons outside quotes and runs each statement in
/// turn, independent of whether earlier statements in the same batch
/// failed: a failing statement prints its error and the loop moves on to
/// the next one, matching the engine's fail-fast-per-statement contract.
fn run_batch(db: &mut Database, sql: &str) {
    for stmt_text in database::split_statements(sql) {
        match db.execute_one(&stmt_text) {
            Ok(result) => print_result(&stmt_text, &result),
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn print_result(stmt_text: &str, result: &QueryResult) {
    match result {
        QueryResult::Rows(batch) => {
            if !batch.columns.is_empty() {
                println!("{}", render_table(batch));
            }
            println!("{}", database::describe_result(stmt_text, result));
        }
        QueryResult::RowsAffected(_) | QueryResult::Message(_) => {
            println!("{}", database::describe_result(stmt_text, result));
        }
    }
}

fn render_table(batch: &common::RecordBatch) -> String {
    let mut builder = Builder::default();
    builder.push_record(batch.columns.clone());
    for row in &batch.rows {
        let rendered: Vec<String> =
            batch.columns.iter().map(|c| row.get(c).map(|v| v.as_display_string()).unwrap_or_default()).collect();
        builder.push_record(rendered);
    }
    let mut table = builder.build();
    table.with(Style::ascii());
    table.to_string()
}

fn in_string_at_end(s: &str) -> bool {
    let mut in_string = false;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if in_string && chars.peek() == Some(&'\'') {
                chars.next();
            } else {
                in_string = !in_string;
            }
        }
    }
    in_string
}

fn ready_to_execute(buffer: &str) -> bool {
    !in_string_at_end(buffer) && buffer.trim_end().ends_with(';')
}
