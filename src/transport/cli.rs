//! CLI transport for direct terminal interaction

use anyhow::{bail, Context, Result};
use colored::{ColoredString, Colorize};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::mpsc;

use crate::api::{AudioFile, ConversationSummary, HttpTranscriptApi, TranscriptApi};
use crate::config::{AnswerMode, Config};
use crate::core::{ListAction, SessionCoordinator, SessionUpdate, UploadDisplay, UploadPhase};

fn ok_tag() -> ColoredString {
    "[OK]".green().bold()
}

fn error_tag() -> ColoredString {
    "[ERROR]".red().bold()
}

fn warning_tag() -> ColoredString {
    "[WARNING]".yellow().bold()
}

fn info_tag() -> ColoredString {
    "[INFO]".cyan().bold()
}

fn connect(config: &Config) -> Result<Arc<HttpTranscriptApi>> {
    let api = HttpTranscriptApi::new(&config.server)?;
    Ok(Arc::new(api))
}

fn coordinator(config: &Config) -> Result<SessionCoordinator> {
    let api: Arc<dyn TranscriptApi> = connect(config)?;
    Ok(SessionCoordinator::new(api, &config.session))
}

/// Drive the coordinator until `matches` accepts an update
async fn wait_for(
    coordinator: &mut SessionCoordinator,
    matches: impl Fn(&SessionUpdate) -> bool,
) -> Result<SessionUpdate> {
    while let Some(update) = coordinator.next_update().await {
        if matches(&update) {
            return Ok(update);
        }
    }
    bail!("Session ended unexpectedly")
}

fn progress_line(display: &UploadDisplay) -> String {
    let mut line = format!("{} {:>3}%", display.phase, display.percent);
    if let Some(stage) = &display.stage {
        line.push_str(&format!(" | {}", stage));
    }
    if let Some(estimate) = &display.estimate {
        line.push_str(&format!(" | {}", estimate));
    }
    line
}

/// Prints a streamed answer incrementally
#[derive(Default)]
struct AnswerPrinter {
    shown: String,
}

impl AnswerPrinter {
    fn update(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        match text.strip_prefix(self.shown.as_str()) {
            Some(suffix) => write!(stdout, "{}", suffix)?,
            // Replaced wholesale (e.g. final text differs from the last delta)
            None => write!(stdout, "\n{}", text)?,
        }
        stdout.flush()?;
        self.shown = text.to_string();
        Ok(())
    }

    fn finish(&mut self, text: &str) -> io::Result<()> {
        self.update(text)?;
        println!();
        self.shown.clear();
        Ok(())
    }

    fn abort(&mut self) {
        if !self.shown.is_empty() {
            println!();
        }
        self.shown.clear();
    }
}

/// Check server health
pub async fn run_health(config: &Config) -> Result<()> {
    let api = connect(config)?;
    match api.health().await {
        Ok(report) => {
            println!(
                "{} Server {} is {}",
                ok_tag(),
                config.server.base_url,
                report.status
            );
            println!("  Active conversations: {}", report.active_conversations);
            println!("  Active tasks:         {}", report.active_tasks);
            Ok(())
        }
        Err(e) => bail!("Server {} is unreachable: {}", config.server.base_url, e),
    }
}

/// Upload a file and follow it until the conversation is ready
pub async fn run_upload(config: &Config, path: &Path) -> Result<()> {
    let file = AudioFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if file.is_empty() {
        bail!("{} is empty", path.display());
    }

    let mut coordinator = coordinator(config)?;
    println!(
        "{} Uploading {} ({} bytes)",
        info_tag(),
        file.file_name,
        file.len()
    );
    coordinator.submit_file(file);

    let mut last_line = String::new();
    while let Some(update) = coordinator.next_update().await {
        match update {
            SessionUpdate::Upload(display) => {
                let line = progress_line(&display);
                if line != last_line {
                    println!("  {}", line);
                    last_line = line;
                }
            }
            SessionUpdate::ConversationReady { conversation_id } => {
                println!("{} Conversation ready: {}", ok_tag(), conversation_id);
                return Ok(());
            }
            SessionUpdate::UploadFailed { detail } => bail!("Upload failed: {}", detail),
            _ => {}
        }
    }
    bail!("Session ended unexpectedly")
}

/// Ask one question and print the answer, streamed unless polling is configured
pub async fn run_ask(config: &Config, conversation: &str, question: &str) -> Result<()> {
    let mut coordinator = coordinator(config)?;
    coordinator.switch_to(conversation);
    coordinator.send(question)?;

    let mut printer = AnswerPrinter::default();
    while let Some(update) = coordinator.next_update().await {
        match update {
            SessionUpdate::AnswerDelta { text } => printer.update(&text)?,
            SessionUpdate::AnswerCompleted { text } => {
                printer.finish(&text)?;
                return Ok(());
            }
            SessionUpdate::AnswerFailed { detail } => {
                printer.abort();
                bail!("Answer failed: {}", detail);
            }
            _ => {}
        }
    }
    bail!("Session ended unexpectedly")
}

#[derive(Tabled)]
struct ConversationRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Created")]
    created: String,
}

fn conversation_table(conversations: &[ConversationSummary]) -> Table {
    let rows = conversations.iter().enumerate().map(|(i, c)| ConversationRow {
        index: i + 1,
        id: c.id.clone(),
        title: c.display_title().to_string(),
        created: c.created_at.clone().unwrap_or_default(),
    });
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table
}

/// List conversations of the user
pub async fn run_list(config: &Config) -> Result<()> {
    let api = connect(config)?;
    let conversations = api.get_conversations(&config.session.user_id).await?;
    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }
    println!("{}", conversation_table(&conversations));
    Ok(())
}

pub async fn run_rename(config: &Config, id: &str, title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        bail!("Title must not be empty");
    }
    let api = connect(config)?;
    api.rename_conversation(id, title).await?;
    println!("{} Renamed {} to \"{}\"", ok_tag(), id, title);
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let api = connect(config)?;
    api.delete_conversation(id).await?;
    println!("{} Deleted {}", ok_tag(), id);
    Ok(())
}

/// Delete every conversation of the user
pub async fn run_clear(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "This deletes all conversations of {}. Re-run with --yes to confirm.",
            config.session.user_id
        );
    }
    let api = connect(config)?;
    api.clear_history(&config.session.user_id).await?;
    println!("{} History cleared", ok_tag());
    Ok(())
}

/// Write a Markdown report of a conversation
pub async fn run_export(config: &Config, conversation: &str, output: Option<&Path>) -> Result<()> {
    let mut coordinator = coordinator(config)?;

    coordinator.refresh_conversations();
    wait_for(&mut coordinator, |u| {
        matches!(u, SessionUpdate::ConversationsLoaded { .. })
    })
    .await?;

    coordinator.switch_to(conversation);
    let loaded = wait_for(&mut coordinator, |u| {
        matches!(u, SessionUpdate::MessagesLoaded { .. })
    })
    .await?;
    if matches!(loaded, SessionUpdate::MessagesLoaded { count: 0, .. }) {
        eprintln!("{} No messages found for {}", warning_tag(), conversation);
    }

    let report = coordinator.export_report();
    match output {
        Some(path) => {
            tokio::fs::write(path, &report)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Report written to {}", ok_tag(), path.display());
        }
        None => print!("{}", report),
    }
    Ok(())
}

const CONSOLE_HELP: &str = "\
Commands:
  help              Show this help
  status            Show the session state
  upload <path>     Upload an audio file
  switch <id|#>     Open a conversation (id or number from `list`)
  new               Close the conversation to start a new upload
  list              List conversations
  suggest           Show suggested questions
  use <#>           Ask a suggested question
  export [path]     Write the conversation as Markdown
  streaming         Toggle streamed answers (off: poll for the full answer)
  clear             Delete all conversations
  quit              Exit
Anything else is sent as a question.";

enum ConsoleInput {
    Line(Option<String>),
    Update(Option<SessionUpdate>),
}

enum Flow {
    Continue,
    Quit,
}

#[derive(Default)]
struct Console {
    printer: AnswerPrinter,
    last_progress: String,
    show_list: bool,
}

/// Read stdin on a dedicated thread so the event loop never blocks on it
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

fn prompt() {
    print!("{} ", ">".bold());
    let _ = io::stdout().flush();
}

/// Run the interactive console
pub async fn run_chat(config: &Config, conversation: Option<String>) -> Result<()> {
    let api = connect(config)?;

    println!("{}", "=== Transcript Console ===".bold().cyan());
    match api.health().await {
        Ok(report) => println!(
            "{} Connected to {} ({})",
            ok_tag(),
            config.server.base_url,
            report.status
        ),
        Err(e) => {
            println!(
                "{} Cannot reach server at {}: {}",
                error_tag(),
                config.server.base_url,
                e
            );
            bail!("Server {} is unreachable", config.server.base_url);
        }
    }
    println!("Type `help` for commands.");

    let mut coordinator = SessionCoordinator::new(api, &config.session);
    coordinator.refresh_conversations();
    if let Some(id) = conversation {
        coordinator.switch_to(&id);
    }

    let mut console = Console::default();
    let mut lines = spawn_stdin_reader();
    prompt();

    loop {
        let input = tokio::select! {
            line = lines.recv() => ConsoleInput::Line(line),
            update = coordinator.next_update() => ConsoleInput::Update(update),
        };

        match input {
            ConsoleInput::Line(Some(line)) => {
                if let Flow::Quit = console.handle_line(&mut coordinator, line.trim()).await? {
                    break;
                }
                if !coordinator.is_busy() {
                    prompt();
                }
            }
            ConsoleInput::Update(Some(update)) => console.render(&coordinator, update)?,
            ConsoleInput::Line(None) | ConsoleInput::Update(None) => break,
        }
    }

    println!("Goodbye!");
    Ok(())
}

impl Console {
    async fn handle_line(
        &mut self,
        coordinator: &mut SessionCoordinator,
        line: &str,
    ) -> Result<Flow> {
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "help" => println!("{}", CONSOLE_HELP),
            "quit" | "exit" => return Ok(Flow::Quit),
            "status" => print_status(coordinator),
            "upload" => {
                if arg.is_empty() {
                    println!("{} Usage: upload <path>", warning_tag());
                    return Ok(Flow::Continue);
                }
                match AudioFile::from_path(Path::new(arg)).await {
                    Ok(file) if file.is_empty() => {
                        println!("{} {} is empty", error_tag(), arg);
                    }
                    Ok(file) => {
                        println!("{} Uploading {}", info_tag(), file.file_name);
                        self.last_progress.clear();
                        coordinator.submit_file(file);
                    }
                    Err(e) => println!("{} Cannot read {}: {}", error_tag(), arg, e),
                }
            }
            "switch" => {
                let id = match arg.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= coordinator.conversations().len() => {
                        coordinator.conversations()[n - 1].id.clone()
                    }
                    _ => arg.to_string(),
                };
                if id.is_empty() {
                    println!("{} Usage: switch <id|#>", warning_tag());
                } else {
                    self.printer.abort();
                    coordinator.switch_to(&id);
                    println!("{} Switched to {}", info_tag(), id);
                }
            }
            "new" => {
                self.printer.abort();
                coordinator.start_new_upload();
                println!("{} Ready for a new upload", info_tag());
            }
            "list" => {
                self.show_list = true;
                coordinator.refresh_conversations();
            }
            "suggest" => {
                if coordinator.suggestions().is_empty() {
                    println!("No suggestions available.");
                }
                for (i, suggestion) in coordinator.suggestions().iter().enumerate() {
                    println!("  {}. {}", i + 1, suggestion.label);
                }
            }
            "use" => {
                let id = arg
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| coordinator.suggestions().get(i))
                    .map(|s| s.id.clone());
                match id {
                    Some(id) => match coordinator.use_suggestion(&id) {
                        Ok(()) => print!("{} ", "Agent:".bold().blue()),
                        Err(e) => println!("{} {}", warning_tag(), e),
                    },
                    None => println!("{} Usage: use <#> (see `suggest`)", warning_tag()),
                }
            }
            "export" => {
                let report = coordinator.export_report();
                if arg.is_empty() {
                    println!("{}", report);
                } else {
                    match tokio::fs::write(arg, report).await {
                        Ok(()) => println!("{} Report written to {}", ok_tag(), arg),
                        Err(e) => println!("{} Cannot write {}: {}", error_tag(), arg, e),
                    }
                }
            }
            "streaming" => {
                let mode = coordinator.answer_mode().toggled();
                coordinator.set_answer_mode(mode);
                println!("{} Streaming mode {}", info_tag(), mode_label(mode));
            }
            "clear" => {
                self.printer.abort();
                coordinator.clear_all();
                println!("{} Clearing history...", info_tag());
            }
            _ => match coordinator.send(line) {
                Ok(()) => print!("{} ", "Agent:".bold().blue()),
                Err(e) => println!("{} {}", warning_tag(), e),
            },
        }
        Ok(Flow::Continue)
    }

    fn render(&mut self, coordinator: &SessionCoordinator, update: SessionUpdate) -> Result<()> {
        match update {
            SessionUpdate::Upload(display) => {
                let line = progress_line(&display);
                if line != self.last_progress {
                    println!("  {}", line);
                    self.last_progress = line;
                }
            }
            SessionUpdate::ConversationReady { conversation_id } => {
                println!("{} Conversation ready: {}", ok_tag(), conversation_id);
                prompt();
            }
            SessionUpdate::UploadFailed { detail } => {
                println!("{} Upload failed: {}", error_tag(), detail);
                prompt();
            }
            SessionUpdate::MessagesLoaded { count, .. } => {
                if count > 0 {
                    println!();
                    for message in coordinator.messages().iter().take(count) {
                        println!("{} {}", format!("{}:", message.role).bold(), message.text);
                    }
                    prompt();
                }
            }
            SessionUpdate::AnswerStarted => {}
            SessionUpdate::AnswerDelta { text } => self.printer.update(&text)?,
            SessionUpdate::AnswerCompleted { text } => {
                self.printer.finish(&text)?;
                prompt();
            }
            SessionUpdate::AnswerFailed { detail } => {
                self.printer.abort();
                println!("{} {}", error_tag(), detail);
                prompt();
            }
            SessionUpdate::SuggestionsLoaded { count } => {
                if count > 0 {
                    println!(
                        "{} {} suggested questions, type `suggest` to see them",
                        info_tag(),
                        count
                    );
                }
            }
            SessionUpdate::ConversationsLoaded { count } => {
                if std::mem::take(&mut self.show_list) {
                    if count == 0 {
                        println!("No conversations yet.");
                    } else {
                        println!("{}", conversation_table(coordinator.conversations()));
                    }
                    prompt();
                }
            }
            SessionUpdate::ListActionDone(action) => {
                if action == ListAction::ClearHistory {
                    println!("{} History cleared", ok_tag());
                    prompt();
                }
            }
            SessionUpdate::ListActionFailed { detail, .. } => {
                println!("{} {}", error_tag(), detail);
                prompt();
            }
        }
        Ok(())
    }
}

fn mode_label(mode: AnswerMode) -> &'static str {
    match mode {
        AnswerMode::Stream => "ON",
        AnswerMode::Poll => "OFF",
    }
}

fn print_status(coordinator: &SessionCoordinator) {
    let display = coordinator.upload_display();
    let active = coordinator
        .active_summary()
        .map(|c| format!("{} ({})", c.display_title(), c.id))
        .or_else(|| coordinator.active_conversation().map(str::to_string))
        .unwrap_or_else(|| "none".to_string());

    println!("  User:          {}", coordinator.user_id());
    println!("  Conversation:  {}", active);
    if display.phase != UploadPhase::Idle {
        println!("  Upload:        {}", progress_line(display));
    }
    if let Some(error) = &display.error {
        println!("  Upload error:  {}", error);
    }
    println!("  Streaming:     {}", mode_label(coordinator.answer_mode()));
    println!("  Messages:      {}", coordinator.messages().len());
    println!("  Suggestions:   {}", coordinator.suggestions().len());
    println!(
        "  Busy:          {}",
        if coordinator.is_busy() { "yes" } else { "no" }
    );
    if let Some(error) = coordinator.last_error() {
        println!("  Last error:    {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::core::test_support::FakeApi;

    #[test]
    fn test_progress_line() {
        let display = UploadDisplay {
            phase: UploadPhase::Processing,
            percent: 40,
            stage: Some("Transcribing".into()),
            estimate: Some("~12s remaining".into()),
            ..UploadDisplay::default()
        };
        assert_eq!(
            progress_line(&display),
            "processing  40% | Transcribing | ~12s remaining"
        );
    }

    #[tokio::test]
    async fn test_streaming_command_toggles_answer_mode() {
        let api: Arc<dyn TranscriptApi> = Arc::new(FakeApi::default());
        let mut coordinator = SessionCoordinator::new(api, &SessionConfig::default());
        let mut console = Console::default();

        console
            .handle_line(&mut coordinator, "streaming")
            .await
            .unwrap();
        assert_eq!(coordinator.answer_mode(), AnswerMode::Poll);
        console
            .handle_line(&mut coordinator, "streaming")
            .await
            .unwrap();
        assert_eq!(coordinator.answer_mode(), AnswerMode::Stream);
    }

    #[test]
    fn test_conversation_table_lists_titles() {
        let rows = vec![ConversationSummary {
            id: "c1".into(),
            title: None,
            fingerprint: None,
            created_at: None,
        }];
        let rendered = conversation_table(&rows).to_string();
        assert!(rendered.contains("Untitled conversation"));
        assert!(rendered.contains("c1"));
    }
}
