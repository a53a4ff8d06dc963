//! Command console
//!
//! Operator side of the live control: sends commands to the server and
//! reconciles the local copy of the control state. The server response to a
//! command is authoritative and replaces the local copy as is. Background
//! polls are merged through the version-guarded cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Command, ProductionStep, StageApi};
use crate::data::{ConfigId, ControlState, HasCompoId, PresentationSummary, StageConfig};
use crate::projection::{active_slide, clamp_index};

use super::cache::{Offer, SnapshotCache};

#[derive(Debug, Error)]
pub enum CommandError {
    /// Another command is still waiting for its response
    #[error("a command is already in progress")]
    Busy,

    #[error("no control state loaded")]
    NoControlState,

    #[error("no StageRunner configuration for {0}")]
    NotConfigured(String),

    #[error("current slide has no compo")]
    NoCompo,

    #[error(transparent)]
    Api(ApiError),
}

impl From<ApiError> for CommandError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotConfigured(what) => Self::NotConfigured(what),
            other => Self::Api(other),
        }
    }
}

#[derive(Default)]
struct ConsoleState {
    config_id: Option<ConfigId>,
    cache: SnapshotCache,
    stage: Option<StageConfig>,
    presentations: Vec<PresentationSummary>,
    last_error: Option<String>,
}

/// Clears the syncing flag when the command completes or is dropped
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Admin remote control for one configuration
pub struct CommandConsole<A: StageApi> {
    api: Arc<A>,
    state: Mutex<ConsoleState>,
    syncing: AtomicBool,
}

impl<A: StageApi> CommandConsole<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: Mutex::new(ConsoleState::default()),
            syncing: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load slides, presentations and control state of a configuration
    pub async fn load(&self, config_id: ConfigId) -> Result<(), CommandError> {
        let stage = self.api.fetch_stage(config_id).await?;
        let presentations = match self.api.fetch_presentations(config_id).await {
            Ok(presentations) => presentations,
            Err(e) => {
                warn!("Failed to fetch presentations: {}", e);
                stage.presentations.clone()
            }
        };
        let control = self.api.fetch_control(config_id).await?;

        info!(
            "Loaded config {}: {} active slides, {} presentations",
            config_id,
            stage.active_slides().len(),
            presentations.len()
        );

        let mut state = self.state();
        state.config_id = Some(config_id);
        state.stage = Some(stage);
        state.presentations = presentations;
        state.cache.clear();
        state.cache.offer(control);
        state.last_error = None;
        Ok(())
    }

    /// Send a command and adopt the server's response.
    ///
    /// Rejected with `Busy` while another command is in flight. On failure
    /// the local state is left as it was and the error is kept for display.
    pub async fn send_command(&self, command: Command) -> Result<ControlState, CommandError> {
        let _guard = SyncGuard::acquire(&self.syncing).ok_or(CommandError::Busy)?;

        let (control_id, config_id) = {
            let state = self.state();
            let control_id = state
                .cache
                .current()
                .map(|c| c.id)
                .ok_or(CommandError::NoControlState)?;
            (control_id, state.config_id)
        };

        info!("Sending command {}", command.name());
        let response = match self.api.send_command(control_id, &command).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Command {} failed: {}", command.name(), e);
                self.state().last_error = Some(format!("{} failed: {}", command.name(), e));
                return Err(e.into());
            }
        };

        {
            let mut state = self.state();
            state.cache.replace(response.clone());
            state.last_error = None;
        }

        if command.invalidates_slides() {
            if let Some(config_id) = config_id {
                if let Err(e) = self.reload_slides(config_id).await {
                    warn!("Failed to reload slides after {}: {}", command.name(), e);
                    self.state().last_error = Some(format!("Failed to reload slides: {}", e));
                }
            }
        }

        Ok(response)
    }

    async fn reload_slides(&self, config_id: ConfigId) -> Result<(), ApiError> {
        let stage = self.api.fetch_stage(config_id).await?;
        let presentations = self.api.fetch_presentations(config_id).await?;
        debug!("Reloaded {} slides", stage.slides.len());

        let mut state = self.state();
        state.stage = Some(stage);
        state.presentations = presentations;
        Ok(())
    }

    /// Merge a polled snapshot into the local state
    pub fn apply_poll(&self, polled: ControlState) -> Offer {
        let mut state = self.state();
        if state.config_id.is_some_and(|id| id != polled.config) {
            debug!("Ignoring poll for config {}", polled.config);
            return Offer::Stale;
        }
        state.cache.offer(polled)
    }

    /// Compo shown on the current slide and the current production index
    fn compo_target(&self) -> Result<(HasCompoId, u32), CommandError> {
        let state = self.state();
        let control = state.cache.current().ok_or(CommandError::NoControlState)?;
        let stage = state.stage.as_ref().ok_or(CommandError::NoControlState)?;
        let has_compo = active_slide(stage, control.current_slide_index)
            .and_then(|s| s.has_compo)
            .ok_or(CommandError::NoCompo)?;
        Ok((has_compo, control.current_production_index))
    }

    async fn production_count(&self, has_compo: HasCompoId) -> Result<usize, CommandError> {
        let compo = self.api.fetch_compo(has_compo).await?;
        Ok(compo.productions.len())
    }

    /// Move to the next production; `None` when already on the last one
    pub async fn next_production(&self) -> Result<Option<ControlState>, CommandError> {
        let (has_compo, current) = self.compo_target()?;
        let count = self.production_count(has_compo).await?;
        if current as usize + 1 >= count {
            debug!("Already on the last production ({} of {})", current + 1, count);
            return Ok(None);
        }
        self.send_command(Command::SetProduction {
            index: current + 1,
            direction: ProductionStep::Next,
        })
        .await
        .map(Some)
    }

    /// Move to the previous production; `None` when already on the first one
    pub async fn previous_production(&self) -> Result<Option<ControlState>, CommandError> {
        let (_, current) = self.compo_target()?;
        if current == 0 {
            return Ok(None);
        }
        self.send_command(Command::SetProduction {
            index: current - 1,
            direction: ProductionStep::Previous,
        })
        .await
        .map(Some)
    }

    /// Jump to a production, clamped to the compo's production count
    pub async fn go_to_production(&self, index: u32) -> Result<Option<ControlState>, CommandError> {
        let (has_compo, current) = self.compo_target()?;
        let count = self.production_count(has_compo).await?;
        let Some(target) = clamp_index(index, count) else {
            return Ok(None);
        };
        let target = target as u32;
        if target == current {
            return Ok(None);
        }
        let direction = if target > current {
            ProductionStep::Next
        } else {
            ProductionStep::Previous
        };
        self.send_command(Command::SetProduction { index: target, direction })
            .await
            .map(Some)
    }

    /// Reveal every result of the current slide's compo
    pub async fn reveal_all(&self) -> Result<ControlState, CommandError> {
        let (has_compo, _) = self.compo_target()?;
        let results = self.api.fetch_results(has_compo).await?;
        self.send_command(Command::RevealAll {
            total: results.results.len() as u32,
        })
        .await
    }

    pub fn control(&self) -> Option<ControlState> {
        self.state().cache.current().cloned()
    }

    pub fn stage(&self) -> Option<StageConfig> {
        self.state().stage.clone()
    }

    pub fn presentations(&self) -> Vec<PresentationSummary> {
        self.state().presentations.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// One-line operator status, plus the last error if any
    pub fn summary(&self) -> String {
        let state = self.state();
        let Some(control) = state.cache.current() else {
            return "no control state".to_string();
        };

        let slide = match &state.stage {
            Some(stage) => {
                let count = stage.active_slides().len();
                match (
                    clamp_index(control.current_slide_index, count),
                    active_slide(stage, control.current_slide_index),
                ) {
                    (Some(i), Some(s)) => format!(
                        "slide {}/{} {} ({})",
                        i + 1,
                        count,
                        s.name,
                        s.slide_type.as_str()
                    ),
                    _ => "no active slides".to_string(),
                }
            }
            None => format!("slide index {}", control.current_slide_index),
        };

        let production = match &control.current_production_title {
            Some(title) => format!("production {} {}", control.current_production_index + 1, title),
            None => format!("production {}", control.current_production_index + 1),
        };

        let presentation = control
            .current_presentation_name
            .clone()
            .or_else(|| {
                control.current_presentation.and_then(|id| {
                    state
                        .presentations
                        .iter()
                        .find(|p| p.id == id)
                        .map(|p| p.name.clone())
                })
            })
            .unwrap_or_else(|| "none".to_string());

        let mut summary = format!(
            "{} | {} | revealed {} | {} | presentation {}",
            slide,
            production,
            control.revealed_positions,
            if control.is_playing { "playing" } else { "paused" },
            presentation
        );
        if let Some(error) = &state.last_error {
            summary.push_str("\nlast error: ");
            summary.push_str(error);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeStageApi;
    use crate::data::fixtures::*;
    use crate::data::SlideType;

    fn compo_stage() -> StageConfig {
        let mut show = slide(2, SlideType::ProductionShow, 1);
        show.has_compo = Some(3);
        let mut results_slide = slide(3, SlideType::ResultsLive, 2);
        results_slide.has_compo = Some(3);
        stage(vec![slide(1, SlideType::Idle, 0), show, results_slide])
    }

    async fn loaded(api: FakeStageApi) -> (Arc<FakeStageApi>, CommandConsole<FakeStageApi>) {
        let api = Arc::new(api);
        api.set_stage(compo_stage());
        let console = CommandConsole::new(api.clone());
        console.load(7).await.unwrap();
        (api, console)
    }

    fn with_api(api: FakeStageApi, state: ControlState) -> FakeStageApi {
        api.push_control(state);
        api
    }

    #[tokio::test]
    async fn test_load_missing_config() {
        let api = Arc::new(FakeStageApi::new());
        let console = CommandConsole::new(api);
        let err = console.load(99).await.unwrap_err();
        assert!(matches!(err, CommandError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_command_without_state_is_rejected() {
        let api = Arc::new(FakeStageApi::new());
        let console = CommandConsole::new(api.clone());
        let err = console.send_command(Command::Next).await.unwrap_err();
        assert!(matches!(err, CommandError::NoControlState));
        assert!(api.commands().is_empty());
    }

    #[tokio::test]
    async fn test_response_replaces_local_state() {
        let (api, console) = loaded(with_api(FakeStageApi::new(), control_at(10))).await;

        // The response is authoritative even if its timestamp looks older
        let mut response = control_at(5);
        response.revealed_positions = 1;
        api.push_command_response(response);

        let state = console.send_command(Command::RevealNext).await.unwrap();
        assert_eq!(state.revealed_positions, 1);
        assert_eq!(console.control().map(|c| c.revealed_positions), Some(1));
        assert_eq!(api.commands(), vec![Command::RevealNext]);
    }

    #[tokio::test]
    async fn test_failure_keeps_state_and_records_error() {
        let (api, console) = loaded(with_api(FakeStageApi::new(), control_at(0))).await;
        api.push_command_failure("No active slides");

        let err = console.send_command(Command::Next).await.unwrap_err();
        assert!(matches!(err, CommandError::Api(ApiError::Status { status: 400, .. })));
        assert_eq!(console.control(), Some(control_at(0)));
        assert!(console.last_error().unwrap().contains("No active slides"));
        assert!(console.summary().contains("last error"));
    }

    #[tokio::test]
    async fn test_concurrent_command_is_busy() {
        let (api, console) = loaded(with_api(FakeStageApi::gated(), control_at(0))).await;
        let console = Arc::new(console);
        api.push_command_response(control_at(1));

        let first = {
            let console = console.clone();
            tokio::spawn(async move { console.send_command(Command::Next).await })
        };
        while !console.is_syncing() {
            tokio::task::yield_now().await;
        }

        let err = console.send_command(Command::Previous).await.unwrap_err();
        assert!(matches!(err, CommandError::Busy));

        api.release_command();
        assert!(first.await.unwrap().is_ok());
        assert!(!console.is_syncing());
        assert_eq!(api.commands(), vec![Command::Next]);
    }

    #[tokio::test]
    async fn test_set_presentation_reloads_slides() {
        let (api, console) = loaded(with_api(FakeStageApi::new(), control_at(0))).await;
        assert_eq!(api.stage_fetches(), 1);

        api.push_command_response(control_at(1));
        console
            .send_command(Command::SetPresentation { presentation_id: Some(4) })
            .await
            .unwrap();
        assert_eq!(api.stage_fetches(), 2);

        api.push_command_response(control_at(2));
        console.send_command(Command::Next).await.unwrap();
        assert_eq!(api.stage_fetches(), 2);
    }

    #[tokio::test]
    async fn test_apply_poll_is_version_guarded() {
        let (_api, console) = loaded(with_api(FakeStageApi::new(), control_at(10))).await;

        assert_eq!(console.apply_poll(control_at(3)), Offer::Stale);
        let mut newer = control_at(12);
        newer.current_slide_index = 2;
        assert_eq!(console.apply_poll(newer), Offer::Changed);

        let mut other_config = control_at(20);
        other_config.config = 8;
        assert_eq!(console.apply_poll(other_config), Offer::Stale);
        assert_eq!(console.control().map(|c| c.current_slide_index), Some(2));
    }

    #[tokio::test]
    async fn test_production_navigation_is_bounded() {
        let mut on_show = control_at(0);
        on_show.current_slide_index = 1;
        on_show.current_production_index = 1;
        let (api, console) = loaded(with_api(FakeStageApi::new(), on_show.clone())).await;
        api.set_compo(3, compo(vec![production(1, "Elevated"), production(2, "fr-041")]));

        assert!(console.next_production().await.unwrap().is_none());
        assert!(api.commands().is_empty());

        let mut moved = on_show.clone();
        moved.current_production_index = 0;
        api.push_command_response(moved);
        assert!(console.previous_production().await.unwrap().is_some());
        assert_eq!(
            api.commands(),
            vec![Command::SetProduction { index: 0, direction: ProductionStep::Previous }]
        );

        api.push_command_response(on_show);
        console.go_to_production(9).await.unwrap();
        assert_eq!(
            api.commands()[1],
            Command::SetProduction { index: 1, direction: ProductionStep::Next }
        );
    }

    #[tokio::test]
    async fn test_production_navigation_needs_compo_slide() {
        let (_api, console) = loaded(with_api(FakeStageApi::new(), control_at(0))).await;
        let err = console.next_production().await.unwrap_err();
        assert!(matches!(err, CommandError::NoCompo));
    }

    #[tokio::test]
    async fn test_reveal_all_uses_results_count() {
        let mut on_results = control_at(0);
        on_results.current_slide_index = 2;
        let (api, console) = loaded(with_api(FakeStageApi::new(), on_results.clone())).await;
        api.set_results(3, results(&["Elevated", "fr-041", "Stargazer"]));

        let mut revealed = on_results;
        revealed.revealed_positions = 3;
        api.push_command_response(revealed);
        console.reveal_all().await.unwrap();
        assert_eq!(api.commands(), vec![Command::RevealAll { total: 3 }]);
    }

    #[tokio::test]
    async fn test_summary() {
        let mut state = control_at(0);
        state.current_slide_index = 1;
        state.revealed_positions = 2;
        state.is_playing = true;
        let (_api, console) = loaded(with_api(FakeStageApi::new(), state)).await;

        let summary = console.summary();
        assert!(summary.starts_with("slide 2/3 Slide 2 (production_show)"));
        assert!(summary.contains("revealed 2"));
        assert!(summary.contains("playing"));
        assert!(summary.contains("presentation none"));
    }
}
