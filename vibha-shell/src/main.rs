use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vibha::prelude::*;
use vibha::{ENGINE_NAME, VERSION as LIB_VERSION};

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let rule = "-".repeat(72);
    println!("{}", rule.dimmed());
    println!("          Shell   v{:<8} Library   v{:<8}", SHELL_VERSION, LIB_VERSION);
    println!("{}", rule.dimmed());
}

fn paint_urgency(text: String, urgency: UrgencyLevel) -> ColoredString {
    match urgency {
        UrgencyLevel::Normal => text.green(),
        UrgencyLevel::Warning => text.yellow(),
        UrgencyLevel::Urgent => text.red().bold(),
    }
}

/// Prints the event streams a shell user cares about. Countdown ticks are
/// left out; `countdown list` shows the latest breakdown instead.
fn spawn_event_listeners(engine: &AdmissionsEngine, is_listening_to_ticks: Arc<AtomicBool>) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            println!("\n<-- [SYSTEM EVENT] {:?}", event);
        }
    });

    let mut countdown_rx = engine.subscribe_countdown_events();
    tokio::spawn(async move {
        while let Ok(event) = countdown_rx.recv().await {
            if let CountdownEvent::Completed { id, at } = event {
                let headline = UrgencyLevel::Urgent.headline().unwrap_or_default();
                println!("\n<-- [COUNTDOWN] {:?} reached zero at {}. {}", id, at, headline.red());
            }
        }
    });

    let mut wizard_rx = engine.subscribe_wizard_events();
    tokio::spawn(async move {
        while let Ok(event) = wizard_rx.recv().await {
            match event {
                WizardEvent::Submitted { receipt, .. } => {
                    println!("\n<-- [FORM] Submitted. Reference {}", receipt.reference.green().bold());
                }
                WizardEvent::SubmissionFailed { reason, .. } => {
                    println!("\n<-- [FORM] Submission failed: {}. Try 'form retry' or 'form edit'.", reason.red());
                }
                other => println!("\n<-- [FORM] {:?}", other),
            }
        }
    });

    let mut rotator_rx = engine.subscribe_rotator_events();
    tokio::spawn(async move {
        while let Ok(event) = rotator_rx.recv().await {
            println!("\n<-- [ROTATOR] {:?}", event);
        }
    });

    let mut tick_rx = engine.subscribe_tick_events();
    tokio::spawn(async move {
        while let Ok(event) = tick_rx.recv().await {
            if is_listening_to_ticks.load(Ordering::Relaxed) && event.tick_count % 5 == 0 {
                println!("<-- [RAW TICK] Tick #{}", event.tick_count);
            }
        }
    });
}

/// Parses `SECS` as an offset from now, or an RFC 3339 timestamp.
/// Offsets too large for a timestamp are rejected.
fn parse_target(arg: &str) -> Option<DateTime<Utc>> {
    if let Ok(seconds) = arg.parse::<i64>() {
        return chrono::TimeDelta::try_seconds(seconds)
            .and_then(|offset| Utc::now().checked_add_signed(offset));
    }
    DateTime::parse_from_rfc3339(arg)
        .ok()
        .map(|target| target.with_timezone(&Utc))
}

fn parse_handle(arg: Option<&&str>) -> Option<usize> {
    arg.and_then(|handle| handle.trim_start_matches('#').parse().ok())
}

/// The shell's state: the engine handle, one admission session, and the
/// numbered handles of everything mounted from the prompt.
struct Shell {
    engine: AdmissionsEngine,
    session: SessionId,
    countdowns: BTreeMap<usize, CountdownId>,
    rotators: BTreeMap<usize, RotatorId>,
    next_handle: usize,
    is_listening_to_ticks: Arc<AtomicBool>,
}

impl Shell {
    fn take_handle(&mut self) -> usize {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    async fn countdown(&mut self, args: &[&str]) {
        match args.first() {
            Some(&"add") => {
                let Some(target) = args.get(1).and_then(|arg| parse_target(arg)) else {
                    println!("Usage: countdown add <SECS|RFC3339>");
                    return;
                };
                let id = self.engine.watch_deadline(target).await;
                let handle = self.take_handle();
                self.countdowns.insert(handle, id);
                println!("--> Countdown to {} added with handle: #{}", target, handle);
            }
            Some(&"list") => {
                println!("Active countdowns:");
                for (handle, id) in &self.countdowns {
                    let target = self.engine.countdown_target(*id).await;
                    match (target, self.engine.countdown_remaining(*id).await) {
                        (Some(target), Some(remaining)) => {
                            let line = format!("{} ({})", remaining, remaining.urgency);
                            println!("  Handle #{}: {} until {}", handle, paint_urgency(line, remaining.urgency), target);
                        }
                        _ => println!("  Handle #{}: {:?} (not mounted)", handle, id),
                    }
                }
            }
            Some(&"remove") => {
                let Some(handle) = parse_handle(args.get(1)) else {
                    println!("Usage: countdown remove <HANDLE>");
                    return;
                };
                match self.countdowns.remove(&handle) {
                    Some(id) if self.engine.unmount_countdown(id).await => {
                        println!("--> Countdown #{} removed.", handle)
                    }
                    Some(_) => println!("--> Error: Countdown not found in engine."),
                    None => println!("Error: Invalid handle #{}. Use 'countdown list'.", handle),
                }
            }
            _ => println!("Usage: countdown add <SECS|RFC3339> | list | remove <HANDLE>"),
        }
    }

    async fn form(&mut self, args: &[&str]) {
        let session = self.session;
        let outcome = match args.first() {
            Some(&"show") | None => {
                self.show_form().await;
                return;
            }
            Some(&"set") => {
                let (Some(name), Some(_)) = (args.get(1), args.get(2)) else {
                    println!("Usage: form set <FIELD> <VALUE...>");
                    return;
                };
                let known = self
                    .engine
                    .with_wizard(session, |wizard| wizard.schema().field(name).is_some())
                    .await
                    .unwrap_or(false);
                if !known {
                    println!("Error: '{}' is not a field of this form. Use 'form show'.", name);
                    return;
                }
                let value = args[2..].join(" ");
                self.engine.update_field(session, *name, value).await
            }
            Some(&"next") => self
                .engine
                .next_step(session)
                .await
                .map(|step| println!("--> On step {}.", step)),
            Some(&"prev") => self
                .engine
                .prev_step(session)
                .await
                .map(|step| println!("--> On step {}.", step)),
            Some(&"submit") => self
                .engine
                .submit(session)
                .await
                .map(|_| println!("--> Submitting...")),
            Some(&"retry") => self
                .engine
                .retry(session)
                .await
                .map(|_| println!("--> Retrying...")),
            Some(&"edit") => self
                .engine
                .edit(session)
                .await
                .map(|_| println!("--> Back to editing.")),
            Some(&"reset") => self
                .engine
                .reset(session)
                .await
                .map(|_| println!("--> Form cleared.")),
            Some(other) => {
                println!("Unknown 'form' command '{}'. Type 'help'.", other);
                return;
            }
        };
        if let Err(e) = outcome {
            println!("Error: {}", e.to_string().red());
        }
    }

    async fn show_form(&self) {
        let rendered = self
            .engine
            .with_wizard(self.session, |wizard| {
                let mut out = Vec::new();
                let step = wizard.current_step();
                let title = wizard.schema().step(step).map(|spec| spec.title).unwrap_or("");
                out.push(format!(
                    "Step {} of {}: {} ({}%) [{:?}]",
                    step,
                    wizard.total_steps(),
                    title.bold(),
                    wizard.progress_percent(),
                    wizard.status()
                ));
                if let Some(spec) = wizard.schema().step(step) {
                    for field in &spec.fields {
                        let marker = if field.required { "*" } else { " " };
                        out.push(format!(
                            "  {}{:<12} {:<22} {}",
                            marker,
                            field.name,
                            field.label.dimmed(),
                            wizard.field(field.name)
                        ));
                    }
                }
                if let Some(pending) = wizard.pending() {
                    if let Ok(json) = pending.to_json() {
                        out.push(format!("  pending payload: {}", json.dimmed()));
                    }
                }
                out
            })
            .await;
        match rendered {
            Ok(lines) => lines.iter().for_each(|line| println!("{}", line)),
            Err(e) => println!("Error: {}", e),
        }
    }

    async fn rotator(&mut self, args: &[&str]) {
        match args.first() {
            Some(&"add") => {
                let len = args.get(1).and_then(|arg| arg.parse::<usize>().ok());
                let seconds = args.get(2).and_then(|arg| arg.parse::<u64>().ok());
                let (Some(len), Some(seconds)) = (len, seconds) else {
                    println!("Usage: rotator add <ITEMS> <SECS>");
                    return;
                };
                match self
                    .engine
                    .mount_rotator_with_interval(len, Duration::from_secs(seconds))
                    .await
                {
                    Ok(id) => {
                        let handle = self.take_handle();
                        self.rotators.insert(handle, id);
                        println!("--> Rotator over {} items added with handle: #{}", len, handle);
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            Some(&"list") => {
                println!("Active rotators:");
                for (handle, id) in &self.rotators {
                    match self.engine.rotator_index(*id).await {
                        Some(index) => println!("  Handle #{}: showing item {}", handle, index),
                        None => println!("  Handle #{}: {:?} (not mounted)", handle, id),
                    }
                }
            }
            Some(action @ (&"next" | &"prev" | &"pause" | &"resume" | &"remove")) => {
                let Some(id) = parse_handle(args.get(1)).and_then(|handle| self.rotators.get(&handle).copied())
                else {
                    println!("Usage: rotator {} <HANDLE>", action);
                    return;
                };
                let outcome = match *action {
                    "next" => self.engine.rotator_next(id).await.map(|index| println!("--> Showing item {}.", index)),
                    "prev" => self.engine.rotator_prev(id).await.map(|index| println!("--> Showing item {}.", index)),
                    "pause" => self.engine.pause_rotator(id).await.map(|_| println!("--> Paused.")),
                    "resume" => self.engine.resume_rotator(id).await.map(|_| println!("--> Resumed.")),
                    _ => {
                        self.rotators.retain(|_, mounted| *mounted != id);
                        if self.engine.unmount_rotator(id).await {
                            println!("--> Rotator removed.");
                        }
                        Ok(())
                    }
                };
                if let Err(e) = outcome {
                    println!("Error: {}", e);
                }
            }
            _ => println!("Usage: rotator add <ITEMS> <SECS> | list | next|prev|pause|resume|remove <HANDLE>"),
        }
    }

    async fn newsletter(&self, args: &[&str]) {
        let Some(email) = args.first() else {
            println!("Usage: newsletter <EMAIL>");
            return;
        };
        println!("--> Subscribing {}...", email);
        match self.engine.subscribe_newsletter(email).await {
            Ok(receipt) => println!("--> Subscribed. Reference {}", receipt.reference.green()),
            Err(e) => println!("Error: {}", e.to_string().red()),
        }
    }

    fn ticks(&self, start: bool, args: &[&str]) {
        if args.first() != Some(&"ticks") {
            let verb = if start { "start" } else { "stop" };
            println!("Unknown '{}' command. Try '{} ticks'.", verb, verb);
            return;
        }
        self.is_listening_to_ticks.store(start, Ordering::Relaxed);
        if start {
            println!("--> Started listening to raw tick stream.");
        } else {
            println!("--> Stopped listening to raw tick stream.");
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  countdown add <SECS|RFC3339>     - Mounts a countdown to a deadline.");
    println!("  countdown list                   - Shows countdowns and their time left.");
    println!("  countdown remove <H>             - Unmounts a countdown by its handle.");
    println!("  form show                        - Shows the current step of the admission form.");
    println!("  form set <FIELD> <VALUE...>      - Fills in a field.");
    println!("  form next | prev                 - Moves between steps (next validates).");
    println!("  form submit | retry | edit       - Submits, retries a failure, or returns to editing.");
    println!("  form reset                       - Clears the form.");
    println!("  rotator add <N> <SECS>           - Mounts a rotator over N items.");
    println!("  rotator list                     - Shows rotators and their current item.");
    println!("  rotator next|prev|pause|resume|remove <H>");
    println!("  newsletter <EMAIL>               - Subscribes an address to the newsletter.");
    println!("  start ticks | stop ticks         - Toggles printing the raw tick stream.");
    println!("  exit                             - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let config = SiteConfig::load(None)?;
    let engine = AdmissionsEngine::new(config);

    let is_listening_to_ticks = Arc::new(AtomicBool::new(false));
    spawn_event_listeners(&engine, is_listening_to_ticks.clone());

    info!("Spawning {} in the background...", ENGINE_NAME);
    let runner = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            eprintln!("\nEngine stopped with an error: {}", e);
        }
    });

    let session = engine.open_wizard(FormSchema::admission()).await;
    let mut shell = Shell {
        engine,
        session,
        countdowns: BTreeMap::new(),
        rotators: BTreeMap::new(),
        next_handle: 0,
        is_listening_to_ticks,
    };
    for (name, id) in shell.engine.mount_configured_deadlines().await {
        let handle = shell.take_handle();
        shell.countdowns.insert(handle, id);
        println!("--> Deadline '{}' mounted with handle: #{}", name, handle);
    }

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();
                let Some((command, rest)) = args.split_first() else {
                    continue;
                };
                match *command {
                    "countdown" => shell.countdown(rest).await,
                    "form" => shell.form(rest).await,
                    "rotator" => shell.rotator(rest).await,
                    "newsletter" => shell.newsletter(rest).await,
                    "start" => shell.ticks(true, rest),
                    "stop" => shell.ticks(false, rest),
                    "help" => print_help(),
                    "exit" => break,
                    _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
                }
            }
            Err(_) => {
                println!("Exiting vibhashell...");
                break;
            }
        }
    }

    Ok(())
}
