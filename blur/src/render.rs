//! Plain-text rendering of events and relationships.

use blur_core::block::{ForumReply, Utterance};
use blur_core::{EventContent, RelationshipEdge, SimulationEvent};

/// One event as transcript lines.
pub fn event(event: &SimulationEvent) -> String {
    let header = format!("[{}] {}", event.ts, event.event_type);
    match &event.content {
        EventContent::Dialogue(base) => format!("{header} {}", utterance(base)),
        EventContent::Stage(stage) => {
            let mut out = format!(
                "{header} <{}> {}",
                stage.phase.as_deref().unwrap_or("?"),
                utterance(&stage.base)
            );
            for (label, value) in [
                ("outfit", &stage.outfit),
                ("lighting", &stage.lighting),
                ("camera", &stage.camera),
                ("choreography", &stage.choreography),
            ] {
                if let Some(value) = value {
                    out.push_str(&format!("\n    {label}: {value}"));
                }
            }
            out
        }
        EventContent::Variety(variety) => {
            let mut out = format!("{header} {}", utterance(&variety.base));
            if let Some(persona) = &variety.persona {
                out.push_str(&format!(" ({persona})"));
            }
            if let Some(caption) = &variety.caption {
                out.push_str(&format!("\n    {caption}"));
            }
            out
        }
        EventContent::Workplace(work) => {
            let mut out = format!("{header} {}", utterance(&work.base));
            if let Some(note) = &work.note {
                out.push_str(&format!("\n    ({note})"));
            }
            out
        }
        EventContent::Forum(forum) => {
            let mut out = format!(
                "{header} [{}] {}",
                forum.board.as_deref().unwrap_or("forum"),
                forum.title.as_deref().unwrap_or("(untitled)")
            );
            if !forum.base.text.as_deref().unwrap_or_default().is_empty() {
                out.push_str(&format!("\n  {}", utterance(&forum.base)));
            }
            for r in &forum.replies {
                out.push_str(&format!("\n    ↳ {}", reply(r)));
            }
            out
        }
    }
}

/// One edge with its id, for `#rel`.
pub fn edge(edge: &RelationshipEdge) -> String {
    format!("{}  {}", edge.id, edge.digest_line())
}

fn utterance(base: &Utterance) -> String {
    let mut out = String::new();
    if let Some(speaker) = &base.speaker {
        out.push_str(speaker);
        out.push_str(": ");
    }
    if let Some(action) = &base.action {
        out.push_str(&format!("*{action}* "));
    }
    out.push_str(base.text.as_deref().unwrap_or_default());
    out.trim_end().to_string()
}

fn reply(reply: &ForumReply) -> String {
    format!(
        "{} ({}): {}",
        reply.author.as_deref().unwrap_or("匿名"),
        reply.kind.as_deref().unwrap_or("-"),
        reply.text.as_deref().unwrap_or_default()
    )
}
