//! The line-oriented director console.
//!
//! Protocol:
//! - Lines starting with `#` are commands (scene, participants, relationships, history, files)
//! - Any other line is a director command and runs one generation round
//! - Output lines are tagged (`[EVENT]`, `[ERROR]`, ...) so the transcript is easy to scan

use crate::prompt::{PromptCredentials, SharedInput};
use crate::render;
use blur_core::{
    ContextKey, EdgeField, EdgeId, EventType, GeminiBackend, GenerationError, ParticipantSelection,
    RelationshipEdge, RoundRequest, SceneType, Session, SessionConfig, SessionError,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

/// Save file used when neither `#save <path>` nor a configured path is given.
const DEFAULT_SAVE_FILE: &str = "blur_save.json";

/// Events shown by `#history` without a count.
const DEFAULT_HISTORY_LINES: usize = 20;

/// Run the console on stdin/stdout until `#quit` or end of input.
pub async fn run(config: SessionConfig) -> anyhow::Result<()> {
    let input: SharedInput = Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()));

    let session = Session::new(
        config,
        Arc::new(GeminiBackend::default()),
        Arc::new(PromptCredentials::new(input.clone())),
    );
    let mut console = Console::new(session);

    console.print_banner();

    loop {
        let line = {
            let mut lines = input.lock().await;
            lines.next_line().await?
        };
        let Some(line) = line else { break };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Command::parse(line) {
            Ok(Command::Quit) => {
                println!("Goodbye!");
                break;
            }
            Ok(command) => console.execute(command).await,
            Err(usage) => println!("[ERROR] {usage}"),
        }
        std::io::stdout().flush().ok();
    }

    Ok(())
}

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Scene(SceneType),
    SubScene(Option<String>),
    With(String),
    Rel(RelCommand),
    History(Option<usize>),
    Filter(Option<EventType>),
    Save(Option<PathBuf>),
    Load(Option<PathBuf>),
    Status,
    Help,
    Quit,
    Direct(String),
}

#[derive(Debug, Clone, PartialEq)]
enum RelCommand {
    List,
    Add(RelationshipEdge),
    Set(EdgeId, EdgeField),
    Remove(EdgeId),
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let Some(body) = line.strip_prefix('#') else {
            return Ok(Command::Direct(line.to_string()));
        };

        let (word, rest) = match body.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (body, ""),
        };
        let rest = (!rest.is_empty()).then_some(rest);

        match word {
            "quit" | "exit" => Ok(Command::Quit),
            "help" => Ok(Command::Help),
            "status" => Ok(Command::Status),
            "scene" => {
                let name = rest.ok_or_else(|| format!("Usage: #scene <{}>", scene_names()))?;
                name.parse()
                    .map(Command::Scene)
                    .map_err(|e| format!("{e} (expected one of {})", scene_names()))
            }
            "sub" => Ok(Command::SubScene(rest.map(String::from))),
            "with" => rest
                .map(|id| Command::With(id.to_string()))
                .ok_or_else(|| "Usage: #with <persona>".to_string()),
            "rel" => RelCommand::parse(rest.unwrap_or_default()).map(Command::Rel),
            "history" => match rest {
                None => Ok(Command::History(None)),
                Some(n) => n
                    .parse()
                    .map(|n| Command::History(Some(n)))
                    .map_err(|_| "Usage: #history [count]".to_string()),
            },
            "filter" => match rest {
                None => Err("Usage: #filter <event type|all>".to_string()),
                Some("all") => Ok(Command::Filter(None)),
                Some(kind) => Ok(Command::Filter(Some(EventType::parse(kind)))),
            },
            "save" => Ok(Command::Save(rest.map(PathBuf::from))),
            "load" => Ok(Command::Load(rest.map(PathBuf::from))),
            _ => Err("Unknown command. Type #help for help.".to_string()),
        }
    }
}

impl RelCommand {
    fn parse(args: &str) -> Result<Self, String> {
        let mut parts = args.split_whitespace();
        match parts.next() {
            None | Some("list") => Ok(RelCommand::List),
            Some("add") => {
                const USAGE: &str = "Usage: #rel add <from> <to> <type> <level> [note]";
                let (Some(from), Some(to), Some(kind), Some(level)) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(USAGE.to_string());
                };
                let level = parse_level(level).ok_or(USAGE)?;
                let note = parts.collect::<Vec<_>>().join(" ");
                Ok(RelCommand::Add(
                    RelationshipEdge::new(from, to, kind, level).with_note(note),
                ))
            }
            Some("set") => {
                const USAGE: &str = "Usage: #rel set <id> <from|to|type|level|note> <value>";
                let id = parse_edge_id(parts.next()).ok_or(USAGE)?;
                let field = parts.next().ok_or(USAGE)?;
                let value = parts.collect::<Vec<_>>().join(" ");
                let field = match field {
                    "from" => EdgeField::From(value),
                    "to" => EdgeField::To(value),
                    "type" => EdgeField::Kind(value),
                    "note" => EdgeField::Note(value),
                    "level" => EdgeField::Level(parse_level(&value).ok_or(USAGE)?),
                    _ => return Err(USAGE.to_string()),
                };
                Ok(RelCommand::Set(id, field))
            }
            Some("rm") | Some("remove") => parse_edge_id(parts.next())
                .map(RelCommand::Remove)
                .ok_or_else(|| "Usage: #rel rm <id>".to_string()),
            Some(_) => Err("Usage: #rel [list|add|set|rm]".to_string()),
        }
    }
}

fn parse_level(value: &str) -> Option<u8> {
    value
        .trim()
        .trim_end_matches('%')
        .parse::<u32>()
        .ok()
        .map(|level| level.min(100) as u8)
}

fn parse_edge_id(value: Option<&str>) -> Option<EdgeId> {
    value.and_then(|v| v.parse().ok())
}

fn scene_names() -> String {
    SceneType::ALL
        .iter()
        .map(SceneType::as_str)
        .collect::<Vec<_>>()
        .join("|")
}

/// Where the director is looking.
struct Console {
    session: Session,
    scene: SceneType,
    sub_scene: String,
    selection: ParticipantSelection,
    filter: Option<EventType>,
}

impl Console {
    fn new(session: Session) -> Self {
        Self {
            session,
            scene: SceneType::GroupChat,
            sub_scene: String::new(),
            selection: ParticipantSelection::default(),
            filter: None,
        }
    }

    fn current_round(&self) -> RoundRequest {
        RoundRequest::new(self.scene)
            .with_sub_scene(&self.sub_scene)
            .with_participants(self.selection.ids().iter().cloned())
    }

    fn current_key(&self) -> ContextKey {
        self.current_round().context_key()
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Scene(scene) => {
                self.scene = scene;
                self.sub_scene.clear();
                println!("[SCENE] {} ({})", scene.label(), scene);
                let options = scene.sub_scene_options();
                if !options.is_empty() {
                    println!("  Sub-scenes: {}", options.join(", "));
                }
                if scene == SceneType::RelationshipMap {
                    self.print_relationships();
                }
            }
            Command::SubScene(sub) => {
                self.sub_scene = sub.unwrap_or_default();
                println!("[THREAD] {}", self.current_key());
            }
            Command::With(id) => {
                if self.session.roster().get(&id).is_none() {
                    println!(
                        "[ERROR] Unknown persona {id}. Known: {}",
                        self.session.roster().ids().join(", ")
                    );
                    return;
                }
                self.selection.toggle(id);
                println!("[WITH] {}", self.selection.ids().join(", "));
            }
            Command::Rel(rel) => self.relationship(rel),
            Command::History(count) => self.print_history(count.unwrap_or(DEFAULT_HISTORY_LINES)),
            Command::Filter(filter) => {
                match &filter {
                    Some(kind) => println!("[FILTER] {kind}"),
                    None => println!("[FILTER] all"),
                }
                self.filter = filter;
            }
            Command::Save(path) => {
                let path = self.file_path(path);
                match self.session.save(&path).await {
                    Ok(()) => println!("[SAVED] {}", path.display()),
                    Err(e) => println!("[ERROR] Save failed: {e}"),
                }
            }
            Command::Load(path) => {
                let path = self.file_path(path);
                match self.session.load(&path).await {
                    Ok(()) => println!(
                        "[LOADED] {} ({} threads)",
                        path.display(),
                        self.session.threads().len()
                    ),
                    Err(e) => println!("[ERROR] Load failed: {e}"),
                }
            }
            Command::Status => self.print_status(),
            Command::Help => print_help(),
            Command::Quit => {}
            Command::Direct(text) => self.generate(text).await,
        }
    }

    async fn generate(&mut self, command: String) {
        if self.scene == SceneType::RelationshipMap {
            println!("[ERROR] The relationship map has no story. Use #rel, or pick another #scene.");
            return;
        }
        if self.scene.is_direct_message() && self.selection.ids().len() < ParticipantSelection::CAPACITY {
            println!("[ERROR] Pick two personas with #with before opening a DM thread.");
            return;
        }

        let round = self.current_round().with_command(command);
        println!("[GENERATING] {}", round.context_key());
        std::io::stdout().flush().ok();

        match self.session.advance(round).await {
            // The console awaits each round, so the outcome is always for the current thread
            Ok(outcome) => {
                for event in &outcome.block.events {
                    println!("[EVENT] {}", render::event(event));
                }
                println!();
            }
            Err(SessionError::Generation(GenerationError::CredentialMissing)) => {
                println!("[ERROR] No Gemini key. Set GEMINI_API_KEY or enter one when asked.");
            }
            Err(SessionError::Generation(e)) if e.is_auth_failure() => {
                println!("[ERROR] {e}");
                println!("[KEY] Key updated. Send the command again to retry.");
            }
            Err(e) => println!("[ERROR] {e}"),
        }
    }

    fn relationship(&self, command: RelCommand) {
        match command {
            RelCommand::List => self.print_relationships(),
            RelCommand::Add(edge) => {
                let id = self.session.add_relationship(edge);
                println!("[REL] added {id}");
            }
            RelCommand::Set(id, field) => match self.session.update_relationship(id, field) {
                Ok(edge) => println!("[REL] {}", render::edge(&edge)),
                Err(e) => println!("[ERROR] {e}"),
            },
            RelCommand::Remove(id) => match self.session.remove_relationship(id) {
                Ok(edge) => println!("[REL] removed {}", edge.digest_line()),
                Err(e) => println!("[ERROR] {e}"),
            },
        }
    }

    fn print_relationships(&self) {
        let graph = self.session.relationships();
        if graph.is_empty() {
            println!("[REL] (none)");
        }
        for edge in graph.edges() {
            println!("[REL] {}", render::edge(edge));
        }
    }

    fn print_history(&self, count: usize) {
        let key = self.current_key();
        let events = match &self.filter {
            Some(kind) => self.session.events_of_type(&key, kind),
            None => self.session.history(&key),
        };
        if events.is_empty() {
            println!("[HISTORY] {key}: nothing yet");
            return;
        }
        println!("[HISTORY] {key}: {} events", events.len());
        for event in &events[events.len().saturating_sub(count)..] {
            println!("[EVENT] {}", render::event(event));
        }
    }

    fn print_status(&self) {
        let key = self.current_key();
        println!("[STATUS]");
        println!("  Scene: {} ({})", self.scene.label(), self.scene);
        if !self.sub_scene.is_empty() {
            println!("  Sub-scene: {}", self.sub_scene);
        }
        if !self.selection.ids().is_empty() {
            println!("  With: {}", self.selection.ids().join(", "));
        }
        println!("  Thread: {key} ({} events)", self.session.history(&key).len());
        println!("  Threads: {}", self.session.threads().len());
        println!("  Relationships: {}", self.session.relationships().len());
        if let Some(kind) = &self.filter {
            println!("  Filter: {kind}");
        }
    }

    fn file_path(&self, explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| self.session.config().save_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_FILE))
    }

    fn print_banner(&self) {
        println!("=== BLUR GOD VIEW ===");
        println!("Members: {}", self.session.roster().ids().join(", "));
        println!("Scene: {} ({})", self.scene.label(), self.scene);
        println!();
        print_help();
        println!();
    }
}

fn print_help() {
    println!("[HELP]");
    println!("  #scene <name>            - Switch scene ({})", scene_names());
    println!("  #sub [name]              - Set or clear the sub-scene");
    println!("  #with <persona>          - Toggle a DM participant (max 2)");
    println!("  #rel [list]              - Show relationships");
    println!("  #rel add <from> <to> <type> <level> [note]");
    println!("  #rel set <id> <field> <value>");
    println!("  #rel rm <id>");
    println!("  #history [count]         - Show the current thread");
    println!("  #filter <type|all>       - Filter #history by event type");
    println!("  #save [path] / #load [path]");
    println!("  #status                  - Show where you are");
    println!("  #quit                    - Exit");
    println!("  (anything else is sent as a director command)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines_are_director_commands() {
        assert_eq!(
            Command::parse("RAHI 偷吃了 Chloe 的布丁"),
            Ok(Command::Direct("RAHI 偷吃了 Chloe 的布丁".to_string()))
        );
    }

    #[test]
    fn test_sub_scene_keeps_spaces() {
        assert_eq!(
            Command::parse("#sub M Countdown"),
            Ok(Command::SubScene(Some("M Countdown".to_string())))
        );
        assert_eq!(Command::parse("#sub"), Ok(Command::SubScene(None)));
    }

    #[test]
    fn test_scene_names() {
        assert_eq!(Command::parse("#scene stage"), Ok(Command::Scene(SceneType::Stage)));
        assert!(Command::parse("#scene concert").is_err());
        assert!(Command::parse("#scene").is_err());
    }

    #[test]
    fn test_rel_add_and_set() {
        let Ok(Command::Rel(RelCommand::Add(edge))) =
            Command::parse("#rel add Sera Nanae 室友 140% 半夜 追劇")
        else {
            panic!("expected #rel add to parse");
        };
        assert_eq!(edge.level, 100);
        assert_eq!(edge.note, "半夜 追劇");

        let id = EdgeId::new();
        assert_eq!(
            Command::parse(&format!("#rel set {id} level 40")),
            Ok(Command::Rel(RelCommand::Set(id, EdgeField::Level(40))))
        );
        assert!(Command::parse("#rel set not-an-id level 40").is_err());
        assert!(Command::parse(&format!("#rel set {id} mood happy")).is_err());
    }

    #[test]
    fn test_filter_and_history() {
        assert_eq!(
            Command::parse("#filter forum_reply"),
            Ok(Command::Filter(Some(EventType::ForumReply)))
        );
        assert_eq!(Command::parse("#filter all"), Ok(Command::Filter(None)));
        assert_eq!(Command::parse("#history 5"), Ok(Command::History(Some(5))));
        assert!(Command::parse("#history lots").is_err());
    }
}
