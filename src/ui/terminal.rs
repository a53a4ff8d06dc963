//! Plain-text rendering of projected frames

use chrono::{DateTime, Utc};
use std::io::Write;
use tracing::warn;

use crate::projection::{
    Frame, ListItem, PodiumPlace, RenderedElement, ResultRow, Screen, SponsorLayout,
};
use crate::sync::FrameSink;

/// Render a screen as text lines. `now` drives clocks and countdowns.
pub fn render_lines(screen: &Screen, now: DateTime<Utc>) -> Vec<String> {
    match screen {
        Screen::Loading => vec!["Loading StageRunner...".to_string()],
        Screen::NotConfigured(what) => vec![format!("StageRunner is not configured for {}", what)],
        Screen::Empty => vec!["No active slides".to_string()],
        Screen::Slide(frame) => render_frame(frame, now),
    }
}

fn render_frame(frame: &Frame, now: DateTime<Utc>) -> Vec<String> {
    let mut lines = vec![format!(
        "[{}/{}] {} ({}) bg={}",
        frame.position + 1,
        frame.slide_count,
        frame.slide_name,
        frame.slide_type.as_str(),
        frame.background.as_str()
    )];

    for element in &frame.elements {
        render_element(&element.content, now, &mut lines);
    }
    lines
}

fn render_element(element: &RenderedElement, now: DateTime<Utc>, lines: &mut Vec<String>) {
    match element {
        RenderedElement::Text(text) => lines.push(text.clone()),
        RenderedElement::ScrollingText(text) => lines.push(format!("~ {} ~", text)),
        RenderedElement::Image(src) | RenderedElement::Video(src) => {
            let kind = if matches!(element, RenderedElement::Image(_)) { "image" } else { "video" };
            match src {
                Some(src) => lines.push(format!("[{} {}]", kind, src)),
                None => lines.push(format!("[{}]", kind)),
            }
        }
        RenderedElement::ExternalVideo => {
            lines.push("Video playing on external monitor".to_string())
        }
        RenderedElement::Clock => lines.push(now.format("%H:%M:%S").to_string()),
        RenderedElement::Countdown { target, label } => {
            let remaining = match target {
                Some(target) => format_remaining(*target - now),
                None => "--:--:--".to_string(),
            };
            if label.is_empty() {
                lines.push(remaining);
            } else {
                lines.push(format!("{} {}", label, remaining));
            }
        }
        RenderedElement::ProductionNumber { number, total } => {
            lines.push(format!("{} / {}", number, total))
        }
        RenderedElement::ProductionList(items) => {
            lines.extend(items.iter().map(list_line));
        }
        RenderedElement::ResultsTable { rows, show_position, show_score } => {
            lines.extend(rows.iter().map(|row| result_line(row, *show_position, *show_score)));
        }
        RenderedElement::Podium { places, show_points } => {
            lines.extend(places.iter().map(|place| podium_line(place, *show_points)));
        }
        RenderedElement::Sponsors { names, layout } => match layout {
            SponsorLayout::Bar => lines.push(names.join(" | ")),
            SponsorLayout::Grid => lines.extend(names.iter().cloned()),
        },
        RenderedElement::Blank => {}
        RenderedElement::Unsupported(tag) => lines.push(format!("[unsupported element {}]", tag)),
    }
}

fn format_remaining(remaining: chrono::Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn list_line(item: &ListItem) -> String {
    let marker = if item.current { ">" } else { " " };
    let mut line = match item.number {
        Some(n) => format!("{} {}. {}", marker, n, item.title),
        None => format!("{} {}", marker, item.title),
    };
    if let Some(authors) = &item.authors {
        line.push_str(&format!(" by {}", authors));
    }
    line
}

fn result_line(row: &ResultRow, show_position: bool, show_score: bool) -> String {
    match row {
        ResultRow::Obscured { position } => format!("#{}  ???", position),
        ResultRow::Revealed {
            position,
            title,
            authors,
            score,
            just_revealed,
        } => {
            let mut line = if show_position {
                format!("#{}  {}", position, title)
            } else {
                title.clone()
            };
            if !authors.is_empty() {
                line.push_str(&format!(" by {}", authors));
            }
            if show_score {
                line.push_str(&format!("  {:.1}", score));
            }
            if *just_revealed {
                line.push_str("  *");
            }
            line
        }
    }
}

fn podium_line(place: &PodiumPlace, show_points: bool) -> String {
    if show_points {
        format!("{}. {} by {} ({:.1} pts)", place.position, place.title, place.authors, place.score)
    } else {
        format!("{}. {} by {}", place.position, place.title, place.authors)
    }
}

/// Sink printing every frame to stdout
pub struct TerminalSink {
    /// Clear the terminal before each frame
    clear: bool,
}

impl TerminalSink {
    pub fn new(clear: bool) -> Self {
        Self { clear }
    }
}

impl FrameSink for TerminalSink {
    fn show(&mut self, screen: &Screen) {
        let mut stdout = std::io::stdout().lock();
        let mut output = String::new();
        if self.clear {
            output.push_str("\x1b[2J\x1b[H");
        }
        for line in render_lines(screen, Utc::now()) {
            output.push_str(&line);
            output.push('\n');
        }
        if let Err(e) = stdout.write_all(output.as_bytes()).and_then(|_| stdout.flush()) {
            warn!("Failed to write frame: {}", e);
        }
    }
}
