//! Shared control state polled by every client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConfigId, ControlId, PresentationId, SlideId};

/// Snapshot of the live control record for one configuration.
///
/// The server copy is authoritative; clients only hold disposable local
/// copies that are replaced by polling or by command responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub id: ControlId,

    pub config: ConfigId,

    #[serde(default)]
    pub current_presentation: Option<PresentationId>,

    /// Only present on detailed responses
    #[serde(default)]
    pub current_presentation_name: Option<String>,

    #[serde(default)]
    pub current_slide: Option<SlideId>,

    /// Index into the active slides of the configuration
    #[serde(default)]
    pub current_slide_index: u32,

    #[serde(default)]
    pub current_production_index: u32,

    #[serde(default)]
    pub current_production_title: Option<String>,

    /// Whether production auto-advance is running
    #[serde(default)]
    pub is_playing: bool,

    #[serde(default)]
    pub is_video_playing: bool,

    /// Number of result rows unmasked, counted from last place upward
    #[serde(default)]
    pub revealed_positions: u32,

    #[serde(default)]
    pub countdown_target: Option<DateTime<Utc>>,

    /// Tag of the last command applied (may be empty)
    #[serde(default)]
    pub command: String,

    /// Server-side modification time, non-decreasing per control record
    pub command_timestamp: DateTime<Utc>,
}

/// The fields whose change is meaningful to a viewer.
///
/// Two snapshots with equal keys render identically, so a poll that
/// returns an equal key must not notify anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncKey {
    pub slide_index: u32,
    pub production_index: u32,
    pub revealed_positions: u32,
    pub is_playing: bool,
    pub command_timestamp: DateTime<Utc>,
}

impl ControlState {
    pub fn sync_key(&self) -> SyncKey {
        SyncKey {
            slide_index: self.current_slide_index,
            production_index: self.current_production_index,
            revealed_positions: self.revealed_positions,
            is_playing: self.is_playing,
            command_timestamp: self.command_timestamp,
        }
    }

    /// Monotonic version of this snapshot
    pub fn version(&self) -> DateTime<Utc> {
        self.command_timestamp
    }

    pub fn last_command(&self) -> LastCommand {
        LastCommand::from_tag(&self.command)
    }
}

/// Last command recorded on the control record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastCommand {
    None,
    Next,
    Previous,
    Play,
    Pause,
    NextProduction,
    PreviousProduction,
    RevealNext,
    RevealAll,
    ResetReveal,
    Navigate,
    Unknown(String),
}

impl LastCommand {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "" => Self::None,
            "next" => Self::Next,
            "prev" => Self::Previous,
            "play" => Self::Play,
            "pause" => Self::Pause,
            "next_production" => Self::NextProduction,
            "prev_production" => Self::PreviousProduction,
            "reveal_next" => Self::RevealNext,
            "reveal_all" => Self::RevealAll,
            "reset_reveal" => Self::ResetReveal,
            "navigate" => Self::Navigate,
            other => Self::Unknown(other.to_string()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::control_at;
    use super::*;

    #[test]
    fn test_deserialize_detail_response() {
        let json = serde_json::json!({
            "id": 3,
            "config": 1,
            "config_detail": {"id": 1, "edition": 2},
            "current_presentation": 4,
            "current_presentation_name": "Demo Compo",
            "current_slide": 11,
            "current_slide_index": 2,
            "current_slide_detail": null,
            "current_production": null,
            "current_production_title": null,
            "current_production_index": 5,
            "is_playing": true,
            "is_video_playing": false,
            "revealed_positions": 3,
            "countdown_target": null,
            "command": "reveal_next",
            "command_timestamp": "2025-08-01T21:15:03.120000+02:00",
            "created": "2025-08-01T10:00:00Z",
            "modified": "2025-08-01T19:15:03Z"
        });

        let state: ControlState = serde_json::from_value(json).unwrap();
        assert_eq!(state.id, 3);
        assert_eq!(state.current_presentation, Some(4));
        assert_eq!(state.current_slide_index, 2);
        assert_eq!(state.current_production_index, 5);
        assert_eq!(state.revealed_positions, 3);
        assert!(state.is_playing);
        assert_eq!(state.last_command(), LastCommand::RevealNext);
        assert_eq!(state.command_timestamp.to_rfc3339(), "2025-08-01T19:15:03.120+00:00");
    }

    #[test]
    fn test_deserialize_patch_response_without_detail_fields() {
        let json = serde_json::json!({
            "id": 3,
            "config": 1,
            "current_production_index": 1,
            "command": "next_production",
            "command_timestamp": "2025-08-01T19:15:03Z"
        });

        let state: ControlState = serde_json::from_value(json).unwrap();
        assert_eq!(state.current_presentation_name, None);
        assert_eq!(state.revealed_positions, 0);
        assert_eq!(state.last_command(), LastCommand::NextProduction);
    }

    #[test]
    fn test_sync_key_ignores_display_only_fields() {
        let a = control_at(0);
        let mut b = a.clone();
        b.current_presentation_name = Some("Awards".to_string());
        b.is_video_playing = true;
        assert_eq!(a.sync_key(), b.sync_key());

        b.revealed_positions = 1;
        assert_ne!(a.sync_key(), b.sync_key());
    }

    #[test]
    fn test_unknown_command_tag() {
        assert_eq!(LastCommand::from_tag(""), LastCommand::None);
        assert_eq!(
            LastCommand::from_tag("warp"),
            LastCommand::Unknown("warp".to_string())
        );
    }
}
