use agentdeck::api::{ApiClient, CreateChatRequest};
use agentdeck::config::Config;
use agentdeck::logging::init_logging;
use agentdeck::session::{
    SessionContext, SessionError, SessionManager, SessionUpdate, TransportMessage,
};
use agentdeck::state::{ApprovalCoordinator, EntryKind, Timeline, TimelineEntry, TimelineUpdate};
use agentdeck::tool_preview::{
    preview_lines, preview_tool_call, truncate_to_width, DEFAULT_PREVIEW_LINES,
};
use agentdeck::types::{ChatSummary, DoneStatus, ToolCallRequest};
use agentdeck::util::parse_bool_str;
use anyhow::Result;
use clap::{Parser, Subcommand};
use crossterm::style::{Color, Stylize};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const RESULT_PREVIEW_LINES: usize = 6;
const FALLBACK_WIDTH: usize = 100;

#[derive(Parser)]
#[command(name = "deck", version, about = "Terminal client for agent chat sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List chats, optionally filtered by a search query.
    List {
        #[arg(long)]
        query: Option<String>,
        /// Keep refreshing on the configured poll interval.
        #[arg(long)]
        watch: bool,
    },
    /// Start a new chat and attach to it.
    New {
        prompt: String,
        #[arg(long = "bot")]
        bot_name: Option<String>,
        #[arg(long)]
        auto_approve: bool,
    },
    /// Attach to an existing chat.
    Open { chat_id: String },
    /// Create a share link for a chat.
    Share {
        chat_id: String,
        #[arg(long)]
        message_id: Option<String>,
    },
    /// Print a shared chat snapshot.
    ViewShare { share_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logging = init_logging()?;

    let config = Config::load()?;
    config.validate()?;
    let client = Arc::new(ApiClient::new(&config)?);
    let printer = Printer::detect();

    match cli.command {
        Command::List { query, watch } => {
            let interval = watch.then_some(config.list_poll_interval);
            list_chats(&client, &printer, query.as_deref(), interval).await
        }
        Command::New {
            prompt,
            bot_name,
            auto_approve,
        } => {
            let chat_id = client
                .create_chat(&CreateChatRequest {
                    prompt,
                    bot_name,
                    chat_id: None,
                    auto_approve,
                })
                .await?;
            printer.notice(&format!("created chat {chat_id}"));
            run_session(client, &printer, chat_id).await
        }
        Command::Open { chat_id } => run_session(client, &printer, chat_id).await,
        Command::Share {
            chat_id,
            message_id,
        } => {
            let share_id = client.share(&chat_id, message_id.as_deref()).await?;
            println!("{share_id}");
            Ok(())
        }
        Command::ViewShare { share_id } => view_share(&client, &printer, &share_id).await,
    }
}

async fn list_chats(
    client: &ApiClient,
    printer: &Printer,
    query: Option<&str>,
    watch: Option<Duration>,
) -> Result<()> {
    loop {
        match client.list_chats(query).await {
            Ok(chats) => printer.chat_list(&chats),
            Err(error) if watch.is_none() || error.is_auth() => return Err(error.into()),
            Err(error) => printer.error(&format!("refresh failed: {error}")),
        }

        let Some(interval) = watch else {
            return Ok(());
        };
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn view_share(client: &ApiClient, printer: &Printer, share_id: &str) -> Result<()> {
    let shared = client.fetch_shared(share_id).await?;
    let (timeline, skipped) = Timeline::from_snapshot(&shared.messages);

    printer.notice(&format!("shared chat {}", shared.chat_id));
    if let Some(origin) = &shared.origin_chat_id {
        printer.notice(&format!("from chat {origin}"));
    }
    for entry in timeline.entries() {
        printer.entry(entry);
    }
    if skipped > 0 {
        printer.error(&format!("{skipped} messages could not be shown"));
    }
    Ok(())
}

async fn auto_approve_flag(client: &ApiClient, chat_id: &str) -> Option<bool> {
    match client.chat_detail(chat_id).await {
        Ok(detail) => Some(detail.auto_approve),
        Err(error) => {
            tracing::warn!(chat_id, "chat detail unavailable: {error}");
            None
        }
    }
}

async fn run_session(client: Arc<ApiClient>, printer: &Printer, chat_id: String) -> Result<()> {
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let mut manager =
        SessionManager::new(SessionContext::from_client(Arc::clone(&client))).with_updates(update_tx);

    let auto_approve = auto_approve_flag(&client, &chat_id).await;
    manager.select(&chat_id, auto_approve)?;
    printer.session_banner(&chat_id, auto_approve);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut running = true;
    while running {
        let live = manager.active().is_some_and(|session| session.is_live());
        tokio::select! {
            message = recv_active(&mut manager), if live => {
                if let (Some(message), Some(session)) = (message, manager.active_mut()) {
                    session.handle_transport(message);
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => running = handle_input(&mut manager, &client, printer, &line).await,
                    None => running = false,
                }
            }
            _ = tokio::signal::ctrl_c() => running = false,
        }

        while let Ok(update) = update_rx.try_recv() {
            if !render_update(&client, printer, update).await {
                running = false;
            }
        }
        if manager.active().is_none() {
            running = false;
        }
    }

    manager.close_all();
    Ok(())
}

async fn recv_active(manager: &mut SessionManager) -> Option<TransportMessage> {
    match manager.active_mut() {
        Some(session) => session.recv_transport().await,
        None => None,
    }
}

/// Returns false once the session can no longer continue.
async fn render_update(client: &ApiClient, printer: &Printer, update: SessionUpdate) -> bool {
    match update {
        SessionUpdate::Timeline(TimelineUpdate::Appended { entry, .. }) => printer.entry(&entry),
        SessionUpdate::Timeline(TimelineUpdate::Resolved { entry, .. }) => printer.entry(&entry),
        SessionUpdate::ApprovalRequested(calls) => printer.approval_prompt(&calls),
        SessionUpdate::ApprovalsSubmitted => printer.notice("decisions submitted"),
        SessionUpdate::Completed(DoneStatus::Completed) => printer.notice("run completed"),
        SessionUpdate::Completed(DoneStatus::Interrupted) => printer.notice("run interrupted"),
        SessionUpdate::ChatListStale => match client.list_chats(None).await {
            Ok(chats) => tracing::debug!(chats = chats.len(), "chat list refreshed"),
            Err(error) => tracing::warn!("chat list refresh failed: {error}"),
        },
        SessionUpdate::AutoApprove(enabled) => {
            printer.notice(&format!("auto-approve {}", on_off(enabled)))
        }
        SessionUpdate::ServerError(message) => printer.error(&format!("server: {message}")),
        SessionUpdate::TransportLost(reason) => printer.error(&format!(
            "stream lost: {reason}; type /reconnect to resume"
        )),
        SessionUpdate::LoggedOut => {
            printer.error("credential rejected; set AGENTDECK_TOKEN and try again");
            return false;
        }
        SessionUpdate::Phase(phase) => tracing::debug!(phase = phase.as_str(), "phase"),
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputCommand {
    Empty,
    Quit,
    Stop,
    Reconnect,
    Share,
    AutoApprove(bool),
    Open(String),
    DecideAll(bool),
    Decide(String, bool),
    Submit,
    DenyWithReason(String),
    Message(String),
    Invalid(String),
}

fn parse_command(line: &str, awaiting_approval: bool) -> InputCommand {
    let line = line.trim();
    if line.is_empty() {
        return InputCommand::Empty;
    }

    if let Some(command) = line.strip_prefix('/') {
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((command, ""));
        return match name {
            "quit" | "exit" => InputCommand::Quit,
            "stop" => InputCommand::Stop,
            "reconnect" => InputCommand::Reconnect,
            "share" => InputCommand::Share,
            "auto" => match parse_bool_str(rest) {
                Some(enabled) => InputCommand::AutoApprove(enabled),
                None => InputCommand::Invalid("usage: /auto on|off".to_string()),
            },
            "open" if !rest.is_empty() => InputCommand::Open(rest.to_string()),
            "open" => InputCommand::Invalid("usage: /open <chat_id>".to_string()),
            other => InputCommand::Invalid(format!("unknown command /{other}")),
        };
    }

    if !awaiting_approval {
        return InputCommand::Message(line.to_string());
    }

    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((line, ""));
    match (word, rest) {
        ("y", "") => InputCommand::DecideAll(true),
        ("n", "") => InputCommand::DecideAll(false),
        ("y", id) => InputCommand::Decide(id.to_string(), true),
        ("n", id) => InputCommand::Decide(id.to_string(), false),
        ("submit", "") => InputCommand::Submit,
        ("deny", "") => InputCommand::Invalid("usage: deny <reason>".to_string()),
        ("deny", reason) => InputCommand::DenyWithReason(reason.to_string()),
        _ => InputCommand::Message(line.to_string()),
    }
}

/// Returns false when the user asked to leave.
async fn handle_input(
    manager: &mut SessionManager,
    client: &ApiClient,
    printer: &Printer,
    line: &str,
) -> bool {
    let Some(session) = manager.active_mut() else {
        return false;
    };
    let command = parse_command(line, session.approvals().is_awaiting());

    let result: Result<(), SessionError> = match command {
        InputCommand::Empty => Ok(()),
        InputCommand::Quit => return false,
        InputCommand::Invalid(message) => {
            printer.error(&message);
            Ok(())
        }
        InputCommand::Stop => session.stop().await,
        InputCommand::Reconnect => session.reconnect().map(|()| {
            printer.notice(&format!(
                "reconnecting from #{}",
                session.state().last_consumed_ordinal
            ))
        }),
        InputCommand::Share => session
            .share(None)
            .await
            .map(|share_id| printer.notice(&format!("share id: {share_id}"))),
        InputCommand::AutoApprove(enabled) => session.set_auto_approve(enabled).await.map(|_| ()),
        InputCommand::Open(chat_id) => {
            let auto_approve = auto_approve_flag(client, &chat_id).await;
            manager
                .select(&chat_id, auto_approve)
                .map(|_| printer.session_banner(&chat_id, auto_approve))
        }
        InputCommand::DecideAll(approved) => session
            .decide_all(approved)
            .map(|()| printer.approval_status(session.approvals())),
        InputCommand::Decide(tool_id, approved) => session
            .decide(&tool_id, approved)
            .map(|()| printer.approval_status(session.approvals())),
        InputCommand::Submit => session.submit_decisions(None).await.map(|_| ()),
        InputCommand::DenyWithReason(reason) => match session.decide_all(false) {
            Ok(()) => session.submit_decisions(Some(&reason)).await.map(|_| ()),
            Err(error) => Err(error),
        },
        InputCommand::Message(text) => session.send_message(&text).await,
    };

    if let Err(error) = result {
        printer.error(&error.to_string());
        return !error.is_auth();
    }
    true
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

struct Printer {
    colors: bool,
    width: usize,
}

impl Printer {
    fn detect() -> Self {
        let colors = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        let width = crossterm::terminal::size()
            .map(|(columns, _)| columns as usize)
            .unwrap_or(FALLBACK_WIDTH);
        Self { colors, width }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.colors {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn notice(&self, message: &str) {
        println!("{}", self.paint(&format!("· {message}"), Color::DarkGrey));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", self.paint(&format!("* Error: {message}"), Color::Red));
    }

    fn session_banner(&self, chat_id: &str, auto_approve: Option<bool>) {
        let auto = auto_approve.map(on_off).unwrap_or("unknown");
        self.notice(&format!(
            "attached to {chat_id} (auto-approve {auto}); /stop /auto on|off /reconnect /share /open <id> /quit"
        ));
    }

    fn chat_list(&self, chats: &[ChatSummary]) {
        if chats.is_empty() {
            self.notice("no chats");
            return;
        }
        for chat in chats {
            let title = truncate_to_width(chat.display_title(), self.width.saturating_sub(40));
            println!(
                "{}  {}  {}",
                self.paint(&chat.chat_id, Color::Cyan),
                title,
                self.paint(&chat.display_updated_at(), Color::DarkGrey)
            );
        }
    }

    fn entry(&self, entry: &TimelineEntry) {
        let tool = entry.tool_name.as_deref().unwrap_or("tool");
        let id = entry.correlation_id.as_deref().unwrap_or("-");
        match entry.kind {
            EntryKind::User => println!("{}", self.paint(&format!("> {}", entry.content), Color::Cyan)),
            EntryKind::Assistant => println!("{}", entry.content),
            EntryKind::System => {
                println!("{}", self.paint(&format!("[system] {}", entry.content), Color::DarkGrey))
            }
            EntryKind::ToolPending => {
                println!("{}", self.paint(&format!("● {tool} [{id}]"), Color::Yellow));
                let arguments = entry.arguments.clone().unwrap_or_default();
                let preview = preview_tool_call(tool, &arguments, DEFAULT_PREVIEW_LINES);
                print!("{}", indent(&preview));
            }
            EntryKind::ToolResult => {
                println!("{}", self.paint(&format!("✓ {tool} [{id}]"), Color::Green));
                print!(
                    "{}",
                    preview_lines(None, &entry.content, RESULT_PREVIEW_LINES, "  └ ")
                );
            }
            EntryKind::ToolDenied => {
                println!("{}", self.paint(&format!("✗ {tool} [{id}] denied"), Color::Red));
            }
        }
    }

    fn approval_prompt(&self, calls: &[ToolCallRequest]) {
        println!("{}", self.paint("approval required:", Color::Yellow));
        for call in calls {
            println!("  {} {}", self.paint(&call.id, Color::Cyan), call.name);
            print!(
                "{}",
                indent(&indent(&preview_tool_call(
                    &call.name,
                    &call.arguments(),
                    DEFAULT_PREVIEW_LINES
                )))
            );
        }
        self.notice("y/n decide all · y <id> / n <id> decide one · submit · deny <reason>");
    }

    fn approval_status(&self, approvals: &ApprovalCoordinator) {
        let parts: Vec<String> = approvals
            .pending()
            .iter()
            .map(|call| {
                let state = match approvals.decision(&call.id) {
                    Some(true) => "approve",
                    Some(false) => "deny",
                    None => "undecided (deny)",
                };
                format!("{} {}: {state}", call.id, call.name)
            })
            .collect();
        self.notice(&parts.join(" | "));
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("  {line}\n")).collect()
}
