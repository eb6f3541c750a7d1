use std::process::ExitCode;
use std::sync::Arc;

mod console;

use todo_sync::config::{self, SyncConfig};
use todo_sync::core::todo::TodoItem;
use todo_sync::sync::{
    AuthChallengeCoordinator, CredentialStore, ItemMirror, RemoteClient, SyncError,
};

use console::{Command, ConsolePrompt, USAGE};

/// Log to the systemd user journal (`journalctl --user -t todo-sync -f`).
/// This crate at info/debug (per flag), everything else at warn.
fn init_logging() {
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("todo_sync") {
                let max = if todo_sync::debug_logging() {
                    log::LevelFilter::Debug
                } else {
                    log::LevelFilter::Info
                };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    let journal = match systemd_journal_logger::JournalLog::new() {
        Ok(j) => j.with_syslog_identifier("todo-sync".to_string()),
        Err(e) => {
            eprintln!("Journal unavailable, running without logs: {}", e);
            return;
        }
    };

    if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
        // Global max must be Debug so our debug logs can pass through when toggled
        log::set_max_level(log::LevelFilter::Debug);
    }
}

fn print_items(items: &[TodoItem]) {
    if items.is_empty() {
        println!("(no todos)");
        return;
    }
    for item in items {
        println!(
            "{:>4}  [{}] {}  {:<5} {}",
            item.id,
            if item.completed { "x" } else { " " },
            item.date.format("%Y-%m-%d"),
            console::priority_marker(item.priority),
            item.title
        );
    }
}

async fn run(mirror: &mut ItemMirror, command: Command) -> Result<(), SyncError> {
    mirror.load_initial_data().await?;

    match command {
        Command::List => {}
        Command::Add(new) => {
            let item = mirror.create(new).await?;
            println!("Created todo {}", item.id);
        }
        Command::Remove(id) => mirror.remove(id).await?,
        Command::Clear => mirror.clear().await?,
        Command::Set(id, value) => {
            if let Err(e) = mirror.update_field(id, value).await {
                if let Some(restored) = &e.restored {
                    eprintln!("Kept {} = {}", e.field, restored);
                }
                return Err(e.source);
            }
        }
    }

    print_items(mirror.items());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match console::parse_args(&args) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    init_logging();

    let settings_path = invocation
        .config_path
        .clone()
        .unwrap_or_else(config::default_settings_path);
    let settings = match SyncConfig::load(&settings_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    todo_sync::set_debug_logging(settings.debug_logging || invocation.debug);

    let credentials = Arc::new(CredentialStore::new());
    credentials.set_username(&settings.user_name);
    let auth = Arc::new(AuthChallengeCoordinator::new(
        credentials,
        Arc::new(ConsolePrompt),
    ));

    let client = match settings.request_timeout() {
        Some(timeout) => RemoteClient::with_timeout(&settings.root_endpoint, auth, timeout),
        None => RemoteClient::new(&settings.root_endpoint, auth),
    };
    let client = match client {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return ExitCode::FAILURE;
        }
    };

    log::info!("Using {}", client.root_endpoint());
    let mut mirror = ItemMirror::new(Arc::new(client));

    match run(&mut mirror, invocation.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{} ({})", e, e.kind());
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
