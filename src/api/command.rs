//! Command vocabulary accepted by the control endpoints

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use crate::data::{ControlId, PresentationId, SlideId};

/// A mutation of the shared control state.
///
/// Commands are only ever applied by the server; clients never compute a
/// new state locally.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Next,
    Previous,
    TogglePlay,
    Navigate {
        slide_id: SlideId,
        slide_index: Option<u32>,
    },
    RevealNext,
    ResetReveal,
    /// `None` clears the active presentation
    SetPresentation {
        presentation_id: Option<PresentationId>,
    },
    SetProduction {
        index: u32,
        direction: ProductionStep,
    },
    /// Reveal every row; `total` is the results count of the active compo
    RevealAll {
        total: u32,
    },
    SetCountdown {
        target: Option<DateTime<Utc>>,
    },
}

/// Tag recorded with a production index change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductionStep {
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// POST to an action endpoint of the control record
    Post { action: &'static str },
    /// PATCH the control record itself
    Patch,
}

/// How a command maps onto the HTTP API
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub method: Method,
    pub body: Value,
}

impl CommandRequest {
    /// Path of the endpoint relative to the API base URL
    pub fn path(&self, control_id: ControlId) -> String {
        match self.method {
            Method::Post { action } => format!("/api/stage-control/{}/{}/", control_id, action),
            Method::Patch => format!("/api/stage-control/{}/", control_id),
        }
    }
}

impl Command {
    pub fn request(&self) -> CommandRequest {
        let post = |action: &'static str, body: Value| CommandRequest {
            method: Method::Post { action },
            body,
        };
        let patch = |body: Value| CommandRequest {
            method: Method::Patch,
            body,
        };

        match self {
            Self::Next => post("next", json!({})),
            Self::Previous => post("previous", json!({})),
            Self::TogglePlay => post("toggle-play", json!({})),
            Self::Navigate { slide_id, slide_index } => post(
                "navigate",
                json!({ "slide_id": slide_id, "slide_index": slide_index }),
            ),
            Self::RevealNext => post("reveal-next", json!({})),
            Self::ResetReveal => post("reset-reveal", json!({})),
            Self::SetPresentation { presentation_id } => post(
                "set-presentation",
                json!({ "presentation_id": presentation_id }),
            ),
            Self::SetCountdown { target } => post(
                "set-countdown",
                json!({ "target": target.as_ref().map(|t| t.to_rfc3339()) }),
            ),
            Self::SetProduction { index, direction } => patch(json!({
                "current_production_index": index,
                "command": match direction {
                    ProductionStep::Next => "next_production",
                    ProductionStep::Previous => "prev_production",
                },
            })),
            Self::RevealAll { total } => patch(json!({
                "revealed_positions": total,
                "command": "reveal_all",
            })),
        }
    }

    /// Whether applying this command changes which slides are addressable
    pub fn invalidates_slides(&self) -> bool {
        matches!(self, Self::SetPresentation { .. })
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Previous => "previous",
            Self::TogglePlay => "toggle-play",
            Self::Navigate { .. } => "navigate",
            Self::RevealNext => "reveal-next",
            Self::ResetReveal => "reset-reveal",
            Self::SetPresentation { .. } => "set-presentation",
            Self::SetProduction { .. } => "set-production",
            Self::RevealAll { .. } => "reveal-all",
            Self::SetCountdown { .. } => "set-countdown",
        }
    }

    /// Parse an operator command line such as `goto 12 3` or `reveal`
    pub fn parse(tokens: &[&str]) -> Result<Self, CommandParseError> {
        let (head, args) = tokens.split_first().ok_or(CommandParseError::Empty)?;

        let command = match head.to_ascii_lowercase().as_str() {
            "next" | "n" => Self::Next,
            "prev" | "previous" | "p" => Self::Previous,
            "play" | "pause" | "toggle-play" => Self::TogglePlay,
            "goto" | "navigate" => {
                let slide_id = parse_arg(args, 0, "slide id")?;
                let slide_index = match args.get(1) {
                    Some(_) => Some(parse_arg(args, 1, "slide index")?),
                    None => None,
                };
                Self::Navigate { slide_id, slide_index }
            }
            "reveal" | "reveal-next" => Self::RevealNext,
            "reset-reveal" | "reset" => Self::ResetReveal,
            "reveal-all" => Self::RevealAll {
                total: parse_arg(args, 0, "results count")?,
            },
            "presentation" | "set-presentation" => {
                let presentation_id = match args.first() {
                    Some(&"none") => None,
                    Some(_) => Some(parse_arg(args, 0, "presentation id")?),
                    None => return Err(CommandParseError::MissingArgument("presentation id")),
                };
                Self::SetPresentation { presentation_id }
            }
            "production" => Self::SetProduction {
                index: parse_arg(args, 0, "production index")?,
                direction: ProductionStep::Next,
            },
            "countdown" => {
                let target = match args.first() {
                    Some(&"none") => None,
                    Some(raw) => Some(
                        DateTime::parse_from_rfc3339(raw)
                            .map_err(|_| CommandParseError::InvalidArgument {
                                name: "countdown target",
                                value: raw.to_string(),
                            })?
                            .with_timezone(&Utc),
                    ),
                    None => return Err(CommandParseError::MissingArgument("countdown target")),
                };
                Self::SetCountdown { target }
            }
            other => return Err(CommandParseError::Unknown(other.to_string())),
        };

        Ok(command)
    }
}

fn parse_arg<T: std::str::FromStr>(
    args: &[&str],
    position: usize,
    name: &'static str,
) -> Result<T, CommandParseError> {
    let raw = args
        .get(position)
        .ok_or(CommandParseError::MissingArgument(name))?;
    raw.parse().map_err(|_| CommandParseError::InvalidArgument {
        name,
        value: raw.to_string(),
    })
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("missing {0}")]
    MissingArgument(&'static str),

    #[error("invalid {name}: '{value}'")]
    InvalidArgument { name: &'static str, value: String },
}
