//! Viewer projection
//!
//! Turns a stage configuration, the navigation view and the fetched content
//! into a `Screen`: the slide to show, its background and each visible
//! element resolved to concrete display data. Everything here is pure so
//! that any two clients holding the same state project the same frame.

mod navigation;
mod results;

pub use navigation::{Key, View, ViewerState};
pub use results::{obscured_count, podium, reveal_rows, PodiumPlace, ResultRow};

use chrono::{DateTime, Utc};

use crate::data::{
    BackgroundEffect, Element, ElementKind, Production, Slide, SlideId, SlideType, StageConfig,
    StageContent, VideoMode,
};

/// Clamp an index into `0..len`; `None` for an empty sequence
pub fn clamp_index(index: u32, len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some((index as usize).min(len - 1))
    }
}

/// Slide addressed by `index` among the active slides, clamped into range
pub fn active_slide(config: &StageConfig, index: u32) -> Option<&Slide> {
    let slides = config.active_slides();
    clamp_index(index, slides.len()).map(|i| slides[i])
}

/// Production addressed by `index`, clamped into range
pub fn current_production(productions: &[Production], index: u32) -> Option<&Production> {
    clamp_index(index, productions.len()).map(|i| &productions[i])
}

/// What the viewer shows
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Loading,
    /// No configuration exists for the requested identifier
    NotConfigured(String),
    /// Configuration has no active slides
    Empty,
    Slide(Frame),
}

/// A projected slide
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub slide_id: SlideId,
    pub slide_name: String,
    pub slide_type: SlideType,
    /// Clamped position among the active slides
    pub position: usize,
    pub slide_count: usize,
    pub background: BackgroundEffect,
    pub background_color: String,
    pub background_image: Option<String>,
    /// Elements in paint order (ascending z-index)
    pub elements: Vec<PlacedElement>,
}

/// An element with its geometry (percent of the canvas) and resolved content
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedElement {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub z_index: u32,
    pub content: RenderedElement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub number: Option<usize>,
    pub title: String,
    pub authors: Option<String>,
    /// Production currently on stage
    pub current: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SponsorLayout {
    Bar,
    Grid,
}

/// Display data of one element, dispatched on the element kind
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedElement {
    Text(String),
    ScrollingText(String),
    Image(Option<String>),
    Video(Option<String>),
    /// Video running on a separate output
    ExternalVideo,
    Clock,
    Countdown {
        target: Option<DateTime<Utc>>,
        label: String,
    },
    ProductionNumber {
        number: usize,
        total: usize,
    },
    ProductionList(Vec<ListItem>),
    ResultsTable {
        rows: Vec<ResultRow>,
        show_position: bool,
        show_score: bool,
    },
    Podium {
        places: Vec<PodiumPlace>,
        show_points: bool,
    },
    Sponsors {
        names: Vec<String>,
        layout: SponsorLayout,
    },
    /// Element whose data is not available
    Blank,
    Unsupported(String),
}

/// Project the current view onto the configuration
pub fn project(config: &StageConfig, view: &View, content: &StageContent) -> Screen {
    let slides = config.active_slides();
    let Some(position) = clamp_index(view.slide_index, slides.len()) else {
        return Screen::Empty;
    };
    let slide = slides[position];

    let mut visible: Vec<&Element> = slide.elements.iter().filter(|e| e.is_visible).collect();
    visible.sort_by_key(|e| e.z_index);

    let elements = visible
        .into_iter()
        .map(|element| PlacedElement {
            id: element.id,
            x: element.x,
            y: element.y,
            width: element.width,
            height: element.height,
            z_index: element.z_index,
            content: render_element(element, slide, config, view, content),
        })
        .collect();

    Screen::Slide(Frame {
        slide_id: slide.id,
        slide_name: slide.name.clone(),
        slide_type: slide.slide_type,
        position,
        slide_count: slides.len(),
        background: config.effective_background(slide),
        background_color: slide.background_color.clone(),
        background_image: slide.background_image.clone(),
        elements,
    })
}

fn text_or_blank(text: Option<&str>) -> RenderedElement {
    match text.filter(|t| !t.is_empty()) {
        Some(t) => RenderedElement::Text(t.to_string()),
        None => RenderedElement::Blank,
    }
}

fn render_element(
    element: &Element,
    slide: &Slide,
    config: &StageConfig,
    view: &View,
    content: &StageContent,
) -> RenderedElement {
    let productions = content.productions();
    let production = current_production(productions, view.production_index);
    let show_authors = content.compo.as_ref().map_or(true, |c| c.compo.show_authors);

    match &element.kind {
        ElementKind::Text => RenderedElement::Text(element.content.clone()),
        ElementKind::ScrollingText => RenderedElement::ScrollingText(element.content.clone()),
        ElementKind::Image => RenderedElement::Image(element.image.clone()),
        ElementKind::Video => RenderedElement::Video(element.video.clone()),
        ElementKind::Clock => RenderedElement::Clock,
        ElementKind::Countdown => RenderedElement::Countdown {
            target: view.countdown_target.or(slide.countdown_target),
            label: if slide.countdown_label.is_empty() {
                element.content.clone()
            } else {
                slide.countdown_label.clone()
            },
        },
        ElementKind::CompoName => {
            text_or_blank(content.compo.as_ref().map(|c| c.compo.name.as_str()))
        }
        ElementKind::CompoDescription => {
            text_or_blank(content.compo.as_ref().map(|c| c.compo.description.as_str()))
        }
        ElementKind::ProductionNumber => match clamp_index(view.production_index, productions.len())
        {
            Some(i) => RenderedElement::ProductionNumber {
                number: i + 1,
                total: productions.len(),
            },
            None => RenderedElement::Blank,
        },
        ElementKind::ProductionTitle => text_or_blank(production.map(|p| p.title.as_str())),
        ElementKind::ProductionAuthors => {
            if show_authors {
                text_or_blank(production.map(|p| p.authors.as_str()))
            } else {
                RenderedElement::Blank
            }
        }
        ElementKind::ProductionVideo => {
            match (element.video_mode, production.and_then(|p| p.video_url.clone())) {
                (VideoMode::None, _) | (_, None) => RenderedElement::Blank,
                (VideoMode::External, Some(_)) => RenderedElement::ExternalVideo,
                (VideoMode::Inline, Some(url)) => RenderedElement::Video(Some(url)),
            }
        }
        ElementKind::ProductionList => {
            let current = clamp_index(view.production_index, productions.len());
            let items = productions
                .iter()
                .enumerate()
                .take(element.list_max_items as usize)
                .map(|(i, p)| ListItem {
                    number: element.list_show_position.then_some(i + 1),
                    title: p.title.clone(),
                    authors: (show_authors && !p.authors.is_empty()).then(|| p.authors.clone()),
                    current: slide.slide_type == SlideType::ProductionShow && current == Some(i),
                })
                .collect();
            RenderedElement::ProductionList(items)
        }
        ElementKind::ResultsTable => RenderedElement::ResultsTable {
            rows: reveal_rows(content.results(), view.revealed_positions),
            show_position: element.list_show_position,
            show_score: element.list_show_score,
        },
        ElementKind::Podium => RenderedElement::Podium {
            places: podium(content.results()),
            show_points: element.podium_show_points,
        },
        ElementKind::SponsorBar | ElementKind::SponsorGrid => {
            let mut sponsors: Vec<_> = content.sponsors.iter().collect();
            sponsors.sort_by_key(|s| s.display_order);
            RenderedElement::Sponsors {
                names: sponsors.into_iter().map(|s| s.name.clone()).collect(),
                layout: if element.kind == ElementKind::SponsorBar {
                    SponsorLayout::Bar
                } else {
                    SponsorLayout::Grid
                },
            }
        }
        ElementKind::EditionLogo => RenderedElement::Image(
            content
                .edition
                .as_ref()
                .and_then(|e| e.logo.clone())
                .or_else(|| config.edition_logo.clone()),
        ),
        ElementKind::EditionPoster => RenderedElement::Image(
            content
                .edition
                .as_ref()
                .and_then(|e| e.poster.clone())
                .or_else(|| config.edition_poster.clone()),
        ),
        ElementKind::Unknown(tag) => RenderedElement::Unsupported(tag.clone()),
    }
}
