//! Line-oriented front-end: slash commands in, rendered session events out.

use std::io::Write;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::common::{
    ChatError, ChatId, ChatSummary, ConnectionStatus, Message, Origin, Rejection, SessionCommand,
    SessionEvent, SessionState, User,
};
use crate::content::{Inline, Segment, segment};

const HELP: &str = "\
/login <username>   sign in (password asked next)
/logout             sign out
/new                start a new chat
/list               refresh and show conversations
/open <n|id>        open a conversation by list number or id
/delete <n|id>      delete a conversation
/reconnect          reopen the connection
/profile <name>     change your display name
/avatar <path>      upload a new avatar image
/quit               exit
anything else is sent as a message";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(String),
    Login(String),
    Logout,
    NewChat,
    List,
    Open(String),
    Delete(String),
    Reconnect,
    Profile(String),
    Avatar(String),
    Help,
    Quit,
}

fn parse_line(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Input::Send(line.to_string()));
    };

    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (command, ""),
    };
    let required = |usage: &str| {
        if argument.is_empty() {
            Err(format!("usage: /{name} {usage}"))
        } else {
            Ok(argument.to_string())
        }
    };

    match name {
        "login" => required("<username>").map(Input::Login),
        "logout" => Ok(Input::Logout),
        "new" => Ok(Input::NewChat),
        "list" => Ok(Input::List),
        "open" => required("<n|id>").map(Input::Open),
        "delete" => required("<n|id>").map(Input::Delete),
        "reconnect" => Ok(Input::Reconnect),
        "profile" => required("<name>").map(Input::Profile),
        "avatar" => required("<path>").map(Input::Avatar),
        "help" => Ok(Input::Help),
        "quit" | "exit" => Ok(Input::Quit),
        other => Err(format!("unknown command /{other}; try /help")),
    }
}

/// List numbers are 1-based positions in the last printed listing.
fn resolve_chat(reference: &str, conversations: &[ChatSummary]) -> ChatId {
    reference
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| conversations.get(index))
        .map(|chat| chat.id.clone())
        .unwrap_or_else(|| ChatId::from(reference))
}

fn render_message(message: &Message) -> String {
    let speaker = match message.origin {
        Origin::Local => "you",
        Origin::Remote => "assistant",
    };
    let mut out = format!("[{}] {speaker}:", message.created_at.format("%H:%M"));
    for part in segment(&message.content) {
        match part {
            Segment::Text(inlines) => {
                out.push(' ');
                for inline in inlines {
                    match inline {
                        Inline::Text(text) => out.push_str(text.trim_matches('\n')),
                        Inline::Code(code) => {
                            out.push('`');
                            out.push_str(&code);
                            out.push('`');
                        }
                    }
                }
            }
            Segment::Code { language, code } => {
                out.push_str(&format!("\n  --- {language} ---\n"));
                for line in code.lines() {
                    out.push_str("  ");
                    out.push_str(line);
                    out.push('\n');
                }
                out.push_str("  ---");
            }
        }
    }
    out
}

/// Terminal counterpart of the disabled send button.
fn send_blocked(state: Option<&SessionState>) -> Option<Rejection> {
    match state {
        None => Some(Rejection::NoSession),
        Some(state) if state.connection != ConnectionStatus::Connected => {
            Some(Rejection::NotConnected)
        }
        Some(state) if state.pending => Some(Rejection::Pending),
        Some(_) => None,
    }
}

/// Tracks what has been printed so only new log entries are shown.
#[derive(Default)]
struct Transcript {
    first_id: Option<String>,
    printed: usize,
    pending: bool,
}

impl Transcript {
    fn unseen(&mut self, state: &SessionState) -> Vec<String> {
        // a replaced log is reprinted from the top
        let first_id = state.log.first().map(|message| message.id.clone());
        if first_id != self.first_id || state.log.len() < self.printed {
            self.printed = 0;
        }
        self.first_id = first_id;

        let mut lines: Vec<String> = state.log[self.printed..]
            .iter()
            .map(render_message)
            .collect();
        self.printed = state.log.len();
        if state.pending && !self.pending {
            lines.push("(assistant is thinking...)".to_string());
        }
        self.pending = state.pending;
        lines
    }
}

pub async fn run(
    commands: mpsc::Sender<SessionCommand>,
    mut events: mpsc::Receiver<SessionEvent>,
    username: Option<String>,
    password: Option<String>,
) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut transcript = Transcript::default();
    let mut conversations: Vec<ChatSummary> = Vec::new();
    let mut latest: Option<SessionState> = None;
    let mut user: Option<User> = None;
    let mut auto_login = username;
    let mut awaiting_password: Option<String> = None;

    println!("Type /help for commands.");
    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        log::error!("Failed to read stdin: {err}");
                        break;
                    }
                };

                if let Some(username) = awaiting_password.take() {
                    submit(&commands, SessionCommand::Login { username, password: line }).await;
                    continue;
                }

                let command = match parse_line(&line) {
                    Ok(Input::Send(content)) if content.is_empty() => continue,
                    Ok(Input::Send(content)) => match send_blocked(latest.as_ref()) {
                        Some(rejection) => {
                            println!("error: {}", ChatError::SendRejected(rejection));
                            continue;
                        }
                        None => SessionCommand::SendMessage(content),
                    },
                    Ok(Input::Login(username)) => {
                        prompt("Password: ");
                        awaiting_password = Some(username);
                        continue;
                    }
                    Ok(Input::Logout) => SessionCommand::Logout,
                    Ok(Input::NewChat) => SessionCommand::NewChat,
                    Ok(Input::List) => {
                        print_conversations(&conversations);
                        SessionCommand::RefreshConversations
                    }
                    Ok(Input::Open(reference)) => {
                        SessionCommand::SelectConversation(resolve_chat(&reference, &conversations))
                    }
                    Ok(Input::Delete(reference)) => {
                        SessionCommand::DeleteConversation(resolve_chat(&reference, &conversations))
                    }
                    Ok(Input::Reconnect) => SessionCommand::Reconnect,
                    Ok(Input::Profile(name)) => SessionCommand::UpdateProfile { name, image: None },
                    Ok(Input::Avatar(path)) => {
                        let Some(current) = &user else {
                            println!("Not signed in.");
                            continue;
                        };
                        SessionCommand::UpdateProfile {
                            name: current.display_name().to_string(),
                            image: Some(PathBuf::from(path)),
                        }
                    }
                    Ok(Input::Help) => {
                        println!("{HELP}");
                        continue;
                    }
                    Ok(Input::Quit) => break,
                    Err(usage) => {
                        println!("{usage}");
                        continue;
                    }
                };
                submit(&commands, command).await;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    SessionEvent::LoggedIn(signed_in) => {
                        println!("Signed in as {}.", signed_in.display_name());
                        user = Some(signed_in);
                    }
                    SessionEvent::ProfileUpdated(updated) => {
                        println!("Profile updated: {}.", updated.display_name());
                        user = Some(updated);
                    }
                    SessionEvent::LoggedOut { expired } => {
                        transcript = Transcript::default();
                        user = None;
                        conversations.clear();
                        latest = None;
                        if expired {
                            println!("Session expired.");
                        }
                        match (auto_login.take(), password.clone()) {
                            (Some(username), Some(password)) => {
                                submit(&commands, SessionCommand::Login { username, password }).await;
                            }
                            (Some(username), None) => {
                                prompt(&format!("Password for {username}: "));
                                awaiting_password = Some(username);
                            }
                            (None, _) => println!("Not signed in. Use /login <username>."),
                        }
                    }
                    SessionEvent::StateChanged(state) => {
                        if latest.as_ref().map(|prev| prev.connection) != Some(state.connection) {
                            println!("({})", state.connection);
                        }
                        for line in transcript.unseen(&state) {
                            println!("{line}");
                        }
                        latest = Some(state);
                    }
                    SessionEvent::ConversationsLoaded(list) => conversations = list,
                    SessionEvent::Error(err) => println!("error: {err}"),
                }
            }
        }
    }
}

fn print_conversations(conversations: &[ChatSummary]) {
    if conversations.is_empty() {
        println!("No conversations yet.");
    }
    for (index, chat) in conversations.iter().enumerate() {
        println!("{:>3}. {} ({})", index + 1, chat.display_title(), chat.id);
    }
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

async fn submit(commands: &mpsc::Sender<SessionCommand>, command: SessionCommand) {
    if let Err(err) = commands.send(command).await {
        log::error!("Session loop is gone: {err}");
    }
}
