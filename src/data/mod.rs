//! Wire data model shared by the viewer, the console and the poller

mod content;
mod control;
mod stage;

pub use content::*;
pub use control::*;
pub use stage::*;

/// Identifier of a StageRunner configuration (one per edition)
pub type ConfigId = u64;
/// Identifier of the control record attached to a configuration
pub type ControlId = u64;
pub type SlideId = u64;
pub type ElementId = u64;
pub type PresentationId = u64;
/// Identifier of a compo within an edition ("has compo" link)
pub type HasCompoId = u64;
pub type EditionId = u64;
pub type ProductionId = u64;

#[cfg(test)]
pub(crate) mod fixtures {
    pub(crate) use super::content::fixtures::*;
    pub(crate) use super::control::fixtures::*;
    pub(crate) use super::stage::fixtures::*;
}
