//! Local navigation with remote override

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{active_slide, clamp_index};
use crate::data::{ControlState, SlideType, StageConfig};

/// Viewer keyboard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Right,
    Enter,
    Space,
    Left,
    Home,
    End,
    Escape,
    Fullscreen,
    /// Jump to slide 1-9
    Digit(u8),
    Quit,
}

impl Key {
    /// Parse one line of terminal input
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Some(if input.contains(' ') { Self::Space } else { Self::Enter });
        }

        let key = match trimmed.to_ascii_lowercase().as_str() {
            "right" | "n" | "l" | ">" => Self::Right,
            "enter" => Self::Enter,
            "space" => Self::Space,
            "left" | "p" | "h" | "<" => Self::Left,
            "home" | "g" => Self::Home,
            "end" => Self::End,
            "esc" | "escape" => Self::Escape,
            "f" | "f11" => Self::Fullscreen,
            "q" | "quit" | "exit" => Self::Quit,
            other => match other.parse::<u8>() {
                Ok(digit @ 1..=9) => Self::Digit(digit),
                _ => return None,
            },
        };
        Some(key)
    }
}

/// Indices the projection is computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub slide_index: u32,
    pub production_index: u32,
    pub revealed_positions: u32,
    pub countdown_target: Option<DateTime<Utc>>,
}

/// Navigation state of one viewer.
///
/// The viewer can be driven locally (keyboard, auto-advance) but every
/// remote control state overrides the local indices. Auto-advance ticks
/// carry the epoch they were armed in; any remote update or local slide
/// change starts a new epoch so a tick armed earlier has no effect.
#[derive(Debug, Clone, Default)]
pub struct ViewerState {
    slide_index: u32,
    production_index: u32,
    revealed_positions: u32,
    countdown_target: Option<DateTime<Utc>>,
    remote: Option<ControlState>,
    fullscreen: bool,
    epoch: u64,
}

impl ViewerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> View {
        View {
            slide_index: self.slide_index,
            production_index: self.production_index,
            revealed_positions: self.revealed_positions,
            countdown_target: self.countdown_target,
        }
    }

    /// Whether a remote state has been received; local input is a preview only
    pub fn is_live(&self) -> bool {
        self.remote.is_some()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn remote(&self) -> Option<&ControlState> {
        self.remote.as_ref()
    }

    /// Token identifying the current auto-advance epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Adopt a remote control state. Returns whether the view changed.
    pub fn apply_remote(&mut self, state: &ControlState) -> bool {
        let before = self.view();

        self.slide_index = state.current_slide_index;
        self.production_index = state.current_production_index;
        self.revealed_positions = state.revealed_positions;
        self.countdown_target = state.countdown_target;
        self.remote = Some(state.clone());
        self.epoch += 1;

        self.view() != before
    }

    /// Move back onto the last remote state if local input drifted away
    /// from it. Returns whether the view changed.
    pub fn resync_remote(&mut self) -> bool {
        let Some(remote) = self.remote.clone() else {
            return false;
        };
        let drifted = self.slide_index != remote.current_slide_index
            || self.production_index != remote.current_production_index
            || self.revealed_positions != remote.revealed_positions
            || self.countdown_target != remote.countdown_target;
        if !drifted {
            return false;
        }
        debug!(
            "Local view drifted to slide {} production {}, restoring remote",
            self.slide_index, self.production_index
        );
        self.apply_remote(&remote)
    }

    /// Whether productions on the current slide should advance locally
    pub fn auto_advance_active(&self, config: &StageConfig) -> bool {
        let Some(slide) = active_slide(config, self.slide_index) else {
            return false;
        };
        slide.slide_type == SlideType::ProductionShow
            && slide.auto_advance_productions
            && self.remote.as_ref().map_or(true, |r| r.is_playing)
    }

    /// Advance to the next production if the tick belongs to the current
    /// epoch. Stops at the last production. Returns whether the view changed.
    pub fn auto_advance_tick(&mut self, epoch: u64, production_count: usize) -> bool {
        if epoch != self.epoch {
            debug!("Ignoring auto-advance tick from epoch {} (now {})", epoch, self.epoch);
            return false;
        }
        self.step_production(production_count)
    }

    fn step_production(&mut self, production_count: usize) -> bool {
        match clamp_index(self.production_index, production_count) {
            Some(current) if current + 1 < production_count => {
                self.production_index = current as u32 + 1;
                true
            }
            _ => false,
        }
    }

    fn go_to_slide(&mut self, index: usize) -> bool {
        let index = index as u32;
        if index == self.slide_index {
            return false;
        }
        self.slide_index = index;
        self.production_index = 0;
        self.epoch += 1;
        true
    }

    /// Apply a key press. Returns whether the view changed.
    pub fn handle_key(&mut self, key: Key, config: &StageConfig, production_count: usize) -> bool {
        if key == Key::Fullscreen {
            self.fullscreen = !self.fullscreen;
            return true;
        }

        let slide_count = config.active_slides().len();
        let Some(current) = clamp_index(self.slide_index, slide_count) else {
            return false;
        };
        let on_production_slide = active_slide(config, self.slide_index)
            .map_or(false, |s| s.slide_type == SlideType::ProductionShow);

        match key {
            Key::Right | Key::Enter | Key::Space => {
                if on_production_slide && self.step_production(production_count) {
                    return true;
                }
                self.go_to_slide((current + 1) % slide_count)
            }
            Key::Left => {
                let production = clamp_index(self.production_index, production_count);
                if on_production_slide && matches!(production, Some(p) if p > 0) {
                    self.production_index = production.map_or(0, |p| p as u32 - 1);
                    return true;
                }
                self.go_to_slide((current + slide_count - 1) % slide_count)
            }
            Key::Home | Key::Escape => self.go_to_slide(0),
            Key::End => self.go_to_slide(slide_count - 1),
            Key::Digit(n) => {
                let index = (n as usize).saturating_sub(1);
                if index < slide_count {
                    self.go_to_slide(index)
                } else {
                    false
                }
            }
            Key::Fullscreen | Key::Quit => false,
        }
    }
}
