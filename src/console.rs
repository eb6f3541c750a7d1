use chrono::NaiveDate;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use todo_sync::core::todo::{FieldValue, NewTodo, Priority, TodoField, TodoId};
use todo_sync::sync::{CredentialPrompt, Credentials};

pub const USAGE: &str = "\
usage: todo-sync [--config PATH] [--debug] <command>

commands:
  list
  add <title> <YYYY-MM-DD> <priority 1-5> [done]
  remove <id>
  clear
  set <id> <title|date|priority|completed> <value>";

/// Asks for credentials on the terminal. An empty username cancels.
pub struct ConsolePrompt;

impl ConsolePrompt {
    fn read_line(label: &str) -> Option<String> {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "{}: ", label);
        let _ = stderr.flush();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl CredentialPrompt for ConsolePrompt {
    fn display_error(&self, text: &str) {
        eprintln!("{}", text);
    }

    fn prompt_for_credentials(&self) -> Option<Credentials> {
        let username = Self::read_line("Username (empty to cancel)")?;
        if username.is_empty() {
            return None;
        }
        let password = Self::read_line("Password")?;
        Some(Credentials::new(username, password))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Add(NewTodo),
    Remove(TodoId),
    Clear,
    Set(TodoId, FieldValue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<PathBuf>,
    pub debug: bool,
    pub command: Command,
}

fn parse_id(raw: &str) -> Result<TodoId, String> {
    raw.parse::<i64>()
        .map(TodoId)
        .map_err(|_| format!("Invalid id '{}'", raw))
}

pub fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut config_path = None;
    let mut debug = false;
    let mut rest = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            "--debug" => debug = true,
            _ => rest.push(arg.as_str()),
        }
    }

    let command = match rest.as_slice() {
        [] | ["list"] => Command::List,
        ["add", title, date, priority, flags @ ..] => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| format!("Invalid date '{}': {}", date, e))?;
            let priority = priority
                .parse::<i64>()
                .ok()
                .and_then(Priority::new)
                .ok_or_else(|| format!("Invalid priority '{}'", priority))?;
            let completed = match flags {
                [] => false,
                ["done"] => true,
                _ => return Err(format!("Unexpected arguments: {}", flags.join(" "))),
            };
            Command::Add(NewTodo {
                title: title.to_string(),
                date,
                priority,
                completed,
            })
        }
        ["remove", id] => Command::Remove(parse_id(id)?),
        ["clear"] => Command::Clear,
        ["set", id, field, value] => {
            let field =
                TodoField::from_name(field).ok_or_else(|| format!("Unknown field '{}'", field))?;
            Command::Set(parse_id(id)?, FieldValue::parse(field, value)?)
        }
        other => return Err(format!("Unknown command: {}", other.join(" "))),
    };

    Ok(Invocation {
        config_path,
        debug,
        command,
    })
}

pub fn priority_marker(p: Priority) -> String {
    "!".repeat(p.get() as usize)
}
