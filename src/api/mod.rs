//! Client bindings for the stage control and content APIs

mod command;
mod error;
mod http;

pub use command::{Command, CommandParseError, CommandRequest, Method, ProductionStep};
pub use error::ApiError;
pub use http::HttpStageApi;

use std::future::Future;

use crate::data::{
    CompoData, CompoResults, ConfigId, ControlId, ControlState, EditionId, EditionInfo,
    HasCompoId, PresentationSummary, Sponsor, StageConfig,
};

/// Trait for stage API backends
///
/// The sync components only talk to the backend through this trait so the
/// HTTP client can be swapped for an in-memory fake.
pub trait StageApi: Send + Sync {
    /// Read the control state of a configuration
    fn fetch_control(
        &self,
        config_id: ConfigId,
    ) -> impl Future<Output = Result<ControlState, ApiError>> + Send;

    /// Apply a command; the response is the authoritative new state
    fn send_command(
        &self,
        control_id: ControlId,
        command: &Command,
    ) -> impl Future<Output = Result<ControlState, ApiError>> + Send;

    /// Full state (config, slides with elements, presentations)
    fn fetch_stage(
        &self,
        config_id: ConfigId,
    ) -> impl Future<Output = Result<StageConfig, ApiError>> + Send;

    /// Resolve the configuration of an edition
    fn find_config(
        &self,
        edition_id: EditionId,
    ) -> impl Future<Output = Result<ConfigId, ApiError>> + Send;

    fn fetch_presentations(
        &self,
        config_id: ConfigId,
    ) -> impl Future<Output = Result<Vec<PresentationSummary>, ApiError>> + Send;

    fn fetch_compo(
        &self,
        has_compo_id: HasCompoId,
    ) -> impl Future<Output = Result<CompoData, ApiError>> + Send;

    fn fetch_results(
        &self,
        has_compo_id: HasCompoId,
    ) -> impl Future<Output = Result<CompoResults, ApiError>> + Send;

    fn fetch_sponsors(
        &self,
        edition_id: EditionId,
    ) -> impl Future<Output = Result<Vec<Sponsor>, ApiError>> + Send;

    fn fetch_edition(
        &self,
        edition_id: EditionId,
    ) -> impl Future<Output = Result<EditionInfo, ApiError>> + Send;
}
