//! Interactive question loop.

use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::render::{self, OutputFormat};
use crate::session::Session;

/// Run the interactive loop: one question per line, dot-commands for the
/// rest.
pub async fn run_repl(session: &mut Session, format: OutputFormat) {
    println!(
        "{} {}",
        "askdb".cyan().bold(),
        format!("— connected to {}", session.backend()).dimmed()
    );
    println!("{}", "Type a question in plain language. Commands:".dimmed());
    println!("  {}    - Exit", ".exit".yellow());
    println!("  {}  - Show the connected schema", ".schema".yellow());
    println!("  {}    - Show this help", ".help".yellow());
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{} {}", "Failed to initialize REPL:".red(), e);
            return;
        }
    };

    let history_path = dirs::home_dir()
        .map(|p| p.join(".askdb_history"))
        .unwrap_or_default();
    let _ = rl.load_history(&history_path);

    loop {
        let prompt = "askdb> ".cyan().bold().to_string();
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    ".exit" | ".quit" | "exit" | "quit" => break,
                    ".help" | "help" => {
                        show_help();
                        continue;
                    }
                    ".clear" | "clear" => {
                        print!("\x1B[2J\x1B[1;1H");
                        continue;
                    }
                    ".schema" => {
                        match session.schema().await {
                            Ok(schema) => render::print_schema(schema),
                            Err(e) => eprintln!("{} {}", "✗".red(), e.to_string().red()),
                        }
                        continue;
                    }
                    _ => {}
                }

                match session.ask(line).await {
                    Ok(turn) => {
                        println!("{} {}", "→".green(), turn.query.sql.white().bold());
                        render::print_outcome(&turn.outcome, format);
                        println!();
                    }
                    Err(e) => eprintln!("{} {}", "✗".red(), e.to_string().red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".dimmed());
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{} {:?}", "Error:".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
}

fn show_help() {
    println!("{}", "askdb commands:".cyan().bold());
    println!("  {}    - Exit the loop", ".exit".yellow());
    println!("  {}    - Show this help", ".help".yellow());
    println!("  {}   - Clear the screen", ".clear".yellow());
    println!("  {}  - Show the connected schema", ".schema".yellow());
    println!();
    println!("{}", "Anything else is sent to the model as a question:".dimmed());
    println!("  patients with cholesterol above 200");
    println!("  average lab result by test name");
    println!("  upcoming appointments for cardiology");
    println!();
}
