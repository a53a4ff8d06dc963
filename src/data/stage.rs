//! Stage configuration: slides, elements and presentations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConfigId, EditionId, ElementId, HasCompoId, PresentationId, ProductionId, SlideId};

/// Full state of a StageRunner configuration as served to the visualizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub id: ConfigId,

    pub edition: EditionId,

    #[serde(default)]
    pub edition_title: Option<String>,

    #[serde(default)]
    pub edition_logo: Option<String>,

    #[serde(default)]
    pub edition_poster: Option<String>,

    #[serde(default)]
    pub default_background_effect: BackgroundEffect,

    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,

    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,

    /// Slide auto-advance interval (ms)
    #[serde(default = "default_auto_advance_interval")]
    pub auto_advance_interval: u64,

    #[serde(default)]
    pub slides: Vec<Slide>,

    #[serde(default)]
    pub presentations: Vec<PresentationSummary>,
}

fn default_canvas_width() -> u32 {
    1920
}

fn default_canvas_height() -> u32 {
    1080
}

fn default_auto_advance_interval() -> u64 {
    5000
}

fn default_production_display_time() -> u64 {
    10000
}

fn default_true() -> bool {
    true
}

impl StageConfig {
    /// Slides addressable by the control index, in display order.
    ///
    /// The server computes `current_slide_index` over exactly this list.
    pub fn active_slides(&self) -> Vec<&Slide> {
        let mut slides: Vec<&Slide> = self.slides.iter().filter(|s| s.is_active).collect();
        slides.sort_by_key(|s| s.display_order);
        slides
    }

    /// Resolve `inherit` against the configuration default
    pub fn effective_background(&self, slide: &Slide) -> BackgroundEffect {
        match slide.background_effect {
            BackgroundEffect::Inherit => match self.default_background_effect {
                BackgroundEffect::Inherit => BackgroundEffect::None,
                effect => effect,
            },
            effect => effect,
        }
    }

    pub fn presentation(&self, id: PresentationId) -> Option<&PresentationSummary> {
        self.presentations.iter().find(|p| p.id == id)
    }
}

/// One screen of the stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slide {
    pub id: SlideId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub slide_type: SlideType,

    #[serde(default)]
    pub background_effect: BackgroundEffect,

    #[serde(default)]
    pub background_image: Option<String>,

    #[serde(default = "default_background_color")]
    pub background_color: String,

    /// Compo shown by compo and results slides
    #[serde(default)]
    pub has_compo: Option<HasCompoId>,

    #[serde(default)]
    pub production: Option<ProductionId>,

    #[serde(default)]
    pub countdown_target: Option<DateTime<Utc>>,

    #[serde(default)]
    pub countdown_label: String,

    #[serde(default)]
    pub auto_advance_productions: bool,

    /// Time per production when auto-advancing (ms)
    #[serde(default = "default_production_display_time")]
    pub production_display_time: u64,

    #[serde(default)]
    pub display_order: u32,

    /// Slide duration (ms), 0 means manual advance
    #[serde(default)]
    pub duration: u64,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub elements: Vec<Element>,
}

fn default_background_color() -> String {
    "#000000".to_string()
}

impl Slide {
    pub fn shows_results(&self) -> bool {
        matches!(
            self.slide_type,
            SlideType::ResultsLive | SlideType::ResultsFinal | SlideType::Podium
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideType {
    Idle,
    CompoIntro,
    ProductionList,
    ProductionShow,
    ResultsLive,
    ResultsFinal,
    Podium,
    Countdown,
    Sponsors,
    Video,
    #[default]
    #[serde(other)]
    Custom,
}

impl SlideType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Idle => "idle",
            Self::CompoIntro => "compo_intro",
            Self::ProductionList => "production_list",
            Self::ProductionShow => "production_show",
            Self::ResultsLive => "results_live",
            Self::ResultsFinal => "results_final",
            Self::Podium => "podium",
            Self::Countdown => "countdown",
            Self::Sponsors => "sponsors",
            Self::Video => "video",
        }
    }
}

/// Background effect behind a slide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundEffect {
    Wave,
    EnergyGrid,
    TronGrid,
    WuhuBoxes,
    WuhuBoxesFire,
    WuhuBoxesPurple,
    FloatingSpheres,
    SpinningToroids,
    CrystalPyramids,
    InfiniteTunnel,
    None,
    Inherit,
    #[default]
    #[serde(other)]
    Hyperspace,
}

impl BackgroundEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hyperspace => "hyperspace",
            Self::Wave => "wave",
            Self::EnergyGrid => "energy-grid",
            Self::TronGrid => "tron-grid",
            Self::WuhuBoxes => "wuhu-boxes",
            Self::WuhuBoxesFire => "wuhu-boxes-fire",
            Self::WuhuBoxesPurple => "wuhu-boxes-purple",
            Self::FloatingSpheres => "floating-spheres",
            Self::SpinningToroids => "spinning-toroids",
            Self::CrystalPyramids => "crystal-pyramids",
            Self::InfiniteTunnel => "infinite-tunnel",
            Self::None => "none",
            Self::Inherit => "inherit",
        }
    }
}

/// A positioned visual element within a slide.
///
/// Position and size are percentages of the canvas (0-100).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,

    #[serde(rename = "element_type")]
    pub kind: ElementKind,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub z_index: u32,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub video: Option<String>,

    /// Free-form style map, passed through untouched
    #[serde(default)]
    pub styles: serde_json::Value,

    #[serde(default = "default_list_max_items")]
    pub list_max_items: u32,

    #[serde(default = "default_true")]
    pub list_show_position: bool,

    #[serde(default)]
    pub list_show_score: bool,

    #[serde(default = "default_true")]
    pub podium_show_points: bool,

    #[serde(default)]
    pub video_mode: VideoMode,

    #[serde(default)]
    pub enter_transition: Transition,

    #[serde(default)]
    pub exit_transition: Transition,

    #[serde(default = "default_transition_duration")]
    pub enter_duration: u32,

    #[serde(default = "default_transition_duration")]
    pub exit_duration: u32,

    #[serde(default)]
    pub enter_delay: u32,

    #[serde(default = "default_true")]
    pub is_visible: bool,
}

fn default_list_max_items() -> u32 {
    10
}

fn default_transition_duration() -> u32 {
    500
}

/// Element type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ElementKind {
    Text,
    Image,
    Video,
    ScrollingText,
    Clock,
    Countdown,
    CompoName,
    CompoDescription,
    ProductionNumber,
    ProductionTitle,
    ProductionAuthors,
    ProductionVideo,
    ProductionList,
    ResultsTable,
    Podium,
    SponsorBar,
    SponsorGrid,
    EditionLogo,
    EditionPoster,
    Unknown(String),
}

impl From<String> for ElementKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "video" => Self::Video,
            "scrolling_text" => Self::ScrollingText,
            "clock" => Self::Clock,
            "countdown" => Self::Countdown,
            "compo_name" => Self::CompoName,
            "compo_description" => Self::CompoDescription,
            "production_number" => Self::ProductionNumber,
            "production_title" => Self::ProductionTitle,
            "production_authors" => Self::ProductionAuthors,
            "production_video" => Self::ProductionVideo,
            "production_list" => Self::ProductionList,
            "results_table" => Self::ResultsTable,
            "podium" => Self::Podium,
            "sponsor_bar" => Self::SponsorBar,
            "sponsor_grid" => Self::SponsorGrid,
            "edition_logo" => Self::EditionLogo,
            "edition_poster" => Self::EditionPoster,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<ElementKind> for String {
    fn from(kind: ElementKind) -> Self {
        let tag = match kind {
            ElementKind::Text => "text",
            ElementKind::Image => "image",
            ElementKind::Video => "video",
            ElementKind::ScrollingText => "scrolling_text",
            ElementKind::Clock => "clock",
            ElementKind::Countdown => "countdown",
            ElementKind::CompoName => "compo_name",
            ElementKind::CompoDescription => "compo_description",
            ElementKind::ProductionNumber => "production_number",
            ElementKind::ProductionTitle => "production_title",
            ElementKind::ProductionAuthors => "production_authors",
            ElementKind::ProductionVideo => "production_video",
            ElementKind::ProductionList => "production_list",
            ElementKind::ResultsTable => "results_table",
            ElementKind::Podium => "podium",
            ElementKind::SponsorBar => "sponsor_bar",
            ElementKind::SponsorGrid => "sponsor_grid",
            ElementKind::EditionLogo => "edition_logo",
            ElementKind::EditionPoster => "edition_poster",
            ElementKind::Unknown(tag) => return tag,
        };
        tag.to_string()
    }
}

/// How a production video element behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoMode {
    External,
    None,
    #[default]
    #[serde(other)]
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    None,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    Zoom,
    Bounce,
    #[default]
    #[serde(other)]
    Fade,
}

/// Named group of slides (idle loop, compo walkthrough, awards ceremony)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationSummary {
    pub id: PresentationId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub presentation_type: PresentationType,

    #[serde(default)]
    pub has_compo: Option<HasCompoId>,

    #[serde(default)]
    pub slide_count: u32,

    #[serde(default)]
    pub slides: Vec<PresentationSlideRef>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationSlideRef {
    pub id: SlideId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slide_type: SlideType,
    #[serde(default)]
    pub display_order: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationType {
    Idle,
    Compo,
    Awards,
    #[default]
    #[serde(other)]
    Custom,
}
