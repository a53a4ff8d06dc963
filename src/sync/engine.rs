//! Viewer engine
//!
//! Drives a beamer client: resolves the configuration, follows the shared
//! control state through a poller, applies local key input and production
//! auto-advance, fetches the content the current slide needs and hands every
//! changed frame to a sink.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{ApiError, StageApi};
use crate::data::{
    ConfigId, ControlState, EditionId, HasCompoId, PresentationId, SlideId, StageConfig,
    StageContent,
};
use crate::projection::{active_slide, project, Key, Screen, ViewerState};

use super::poller::{ControlPoller, PollerStatus};
use super::{ViewerCommand, ViewerStatus};

/// Receives every frame that differs from the previous one
pub trait FrameSink: Send {
    fn show(&mut self, screen: &Screen);
}

/// Which configuration the viewer shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerTarget {
    Config(ConfigId),
    /// Resolved through the by-edition lookup
    Edition(EditionId),
}

/// Armed auto-advance timer and the epoch it belongs to
struct AutoAdvance {
    timer: Interval,
    epoch: u64,
}

/// Viewer engine
pub struct ViewerEngine<A: StageApi + 'static, S: FrameSink> {
    api: Arc<A>,
    sink: S,
    target: ViewerTarget,
    /// Control poll interval, `None` polls once only
    poll_interval: Option<Duration>,
    /// Whether production slides may advance locally
    auto_advance: bool,
    cmd_rx: mpsc::Receiver<ViewerCommand>,
    status_tx: broadcast::Sender<ViewerStatus>,
    stage: Option<StageConfig>,
    content: StageContent,
    /// Slide the content was last refreshed for
    content_slide: Option<SlideId>,
    /// Compo the loaded compo data and results belong to
    content_compo: Option<HasCompoId>,
    /// Presentation of the last remote state, `None` before the first one
    presentation: Option<Option<PresentationId>>,
    viewer: ViewerState,
    last_screen: Option<Screen>,
}

impl<A: StageApi + 'static, S: FrameSink> ViewerEngine<A, S> {
    /// Create a new viewer engine
    pub fn new(
        api: Arc<A>,
        sink: S,
        target: ViewerTarget,
        poll_interval: Option<Duration>,
        auto_advance: bool,
        cmd_rx: mpsc::Receiver<ViewerCommand>,
        status_tx: broadcast::Sender<ViewerStatus>,
    ) -> Self {
        Self {
            api,
            sink,
            target,
            poll_interval,
            auto_advance,
            cmd_rx,
            status_tx,
            stage: None,
            content: StageContent::default(),
            content_slide: None,
            content_compo: None,
            presentation: None,
            viewer: ViewerState::new(),
            last_screen: None,
        }
    }

    /// Run the engine until shutdown
    pub async fn run(&mut self) -> Result<()> {
        info!("Viewer starting for {:?}", self.target);
        let _ = self.status_tx.send(ViewerStatus::Loading);
        self.show(Screen::Loading);

        let config_id = match self.load().await {
            Ok(config_id) => config_id,
            Err(ApiError::NotConfigured(what)) => {
                warn!("No StageRunner configuration for {}", what);
                let _ = self.status_tx.send(ViewerStatus::NotConfigured(what.clone()));
                self.show(Screen::NotConfigured(what));
                self.wait_for_shutdown().await;
                let _ = self.status_tx.send(ViewerStatus::Stopped);
                return Ok(());
            }
            Err(e) => {
                let _ = self.status_tx.send(ViewerStatus::Error(e.to_string()));
                return Err(e).context("Failed to load StageRunner configuration");
            }
        };

        let (poller, handle) = ControlPoller::new(self.api.clone(), Some(config_id), self.poll_interval);
        tokio::spawn(poller.run());
        let mut updates = handle.updates();
        let mut poll_statuses = handle.statuses();

        self.refresh_edition().await;
        self.refresh_content().await;
        self.render();

        let mut auto_advance = self.arm_auto_advance();

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(ViewerCommand::Key(Key::Quit)) | Some(ViewerCommand::Shutdown) | None => {
                            info!("Shutdown command received");
                            break;
                        }
                        Some(ViewerCommand::Key(key)) => {
                            let Some(stage) = self.stage.as_ref() else {
                                continue;
                            };
                            let production_count = self.content.productions().len();
                            if self.viewer.handle_key(key, stage, production_count) {
                                debug!("Key {:?} moved view to {:?}", key, self.viewer.view());
                                self.refresh_content().await;
                                self.render();
                                auto_advance = self.arm_auto_advance();
                            }
                        }
                    }
                }

                Some(update) = updates.next() => {
                    if let Some(state) = update {
                        self.apply_remote(config_id, &state).await;
                        auto_advance = self.arm_auto_advance();
                    }
                }

                Ok(status) = poll_statuses.recv() => {
                    // An unchanged poll still pulls local input back to the remote view
                    if matches!(status, PollerStatus::Confirmed { .. }) && self.viewer.resync_remote() {
                        debug!("Restored remote view {:?}", self.viewer.view());
                        self.refresh_content().await;
                        self.render();
                        auto_advance = self.arm_auto_advance();
                    }
                }

                epoch = async {
                    match auto_advance.as_mut() {
                        Some(auto) => {
                            auto.timer.tick().await;
                            auto.epoch
                        }
                        None => std::future::pending().await,
                    }
                } => {
                    let production_count = self.content.productions().len();
                    if self.viewer.auto_advance_tick(epoch, production_count) {
                        debug!("Auto-advanced to production {}", self.viewer.view().production_index);
                        self.render();
                    }
                }
            }
        }

        handle.shutdown();
        let _ = self.status_tx.send(ViewerStatus::Stopped);
        info!("Viewer stopped");
        Ok(())
    }

    /// Resolve the configuration and load its slides
    async fn load(&mut self) -> Result<ConfigId, ApiError> {
        let config_id = match self.target {
            ViewerTarget::Config(id) => id,
            ViewerTarget::Edition(edition_id) => {
                let id = self.api.find_config(edition_id).await?;
                info!("Edition {} uses config {}", edition_id, id);
                id
            }
        };

        let stage = self.api.fetch_stage(config_id).await?;
        info!(
            "Loaded config {} with {} active slides",
            config_id,
            stage.active_slides().len()
        );
        self.stage = Some(stage);
        Ok(config_id)
    }

    async fn wait_for_shutdown(&mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            if matches!(cmd, ViewerCommand::Shutdown | ViewerCommand::Key(Key::Quit)) {
                break;
            }
        }
    }

    async fn apply_remote(&mut self, config_id: ConfigId, state: &ControlState) {
        let presentation_changed = self
            .presentation
            .is_some_and(|previous| previous != state.current_presentation);
        self.presentation = Some(state.current_presentation);

        if presentation_changed {
            info!("Presentation changed to {:?}, reloading slides", state.current_presentation);
            match self.api.fetch_stage(config_id).await {
                Ok(stage) => {
                    self.stage = Some(stage);
                    self.content_slide = None;
                }
                Err(e) => warn!("Failed to reload slides: {}", e),
            }
        }

        if self.viewer.apply_remote(state) || presentation_changed {
            self.refresh_content().await;
        }
        self.render();
    }

    /// Start (or restart) the production timer for the current slide
    fn arm_auto_advance(&self) -> Option<AutoAdvance> {
        if !self.auto_advance {
            return None;
        }
        let stage = self.stage.as_ref()?;
        if !self.viewer.auto_advance_active(stage) {
            return None;
        }
        let slide = active_slide(stage, self.viewer.view().slide_index)?;

        let period = Duration::from_millis(slide.production_display_time.max(1));
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Auto-advance armed every {:?}", period);
        Some(AutoAdvance {
            timer,
            epoch: self.viewer.epoch(),
        })
    }

    async fn refresh_edition(&mut self) {
        let Some(edition_id) = self.stage.as_ref().map(|s| s.edition) else {
            return;
        };

        match self.api.fetch_edition(edition_id).await {
            Ok(edition) => self.content.edition = Some(edition),
            Err(e) => warn!("Failed to fetch edition {}: {}", edition_id, e),
        }
        match self.api.fetch_sponsors(edition_id).await {
            Ok(sponsors) => self.content.sponsors = sponsors,
            Err(e) => warn!("Failed to fetch sponsors for edition {}: {}", edition_id, e),
        }
    }

    /// Fetch compo data and results for the slide on screen.
    ///
    /// Failures keep whatever content was loaded before.
    async fn refresh_content(&mut self) {
        let Some(slide) = self
            .stage
            .as_ref()
            .and_then(|s| active_slide(s, self.viewer.view().slide_index))
        else {
            return;
        };
        if self.content_slide == Some(slide.id) {
            return;
        }
        let slide_id = slide.id;
        let has_compo = slide.has_compo;
        let shows_results = slide.shows_results();
        self.content_slide = Some(slide_id);

        let Some(has_compo) = has_compo else {
            return;
        };

        if self.content_compo != Some(has_compo) {
            self.content.compo = None;
            self.content.results = None;
            self.content_compo = Some(has_compo);
        }

        if self.content.compo.is_none() {
            match self.api.fetch_compo(has_compo).await {
                Ok(compo) => {
                    debug!("Loaded {} productions for compo {}", compo.productions.len(), has_compo);
                    self.content.compo = Some(compo);
                }
                Err(e) => warn!("Failed to fetch compo {}: {}", has_compo, e),
            }
        }

        if shows_results {
            match self.api.fetch_results(has_compo).await {
                Ok(results) => self.content.results = Some(results),
                Err(e) => warn!("Failed to fetch results for compo {}: {}", has_compo, e),
            }
        }
    }

    fn render(&mut self) {
        let screen = match self.stage.as_ref() {
            Some(stage) => project(stage, &self.viewer.view(), &self.content),
            None => Screen::Loading,
        };
        if self.show(screen) {
            let view = self.viewer.view();
            let _ = self.status_tx.send(ViewerStatus::Showing {
                slide_index: view.slide_index,
                production_index: view.production_index,
                live: self.viewer.is_live(),
            });
        }
    }

    /// Hand the screen to the sink if it changed
    fn show(&mut self, screen: Screen) -> bool {
        if self.last_screen.as_ref() == Some(&screen) {
            return false;
        }
        self.sink.show(&screen);
        self.last_screen = Some(screen);
        true
    }
}

/// Create command and status channels for the engine
pub fn create_engine_channels() -> (
    mpsc::Sender<ViewerCommand>,
    mpsc::Receiver<ViewerCommand>,
    broadcast::Sender<ViewerStatus>,
    broadcast::Receiver<ViewerStatus>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = broadcast::channel(16);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeStageApi;
    use crate::data::fixtures::*;
    use crate::data::{ElementKind, SlideType};
    use crate::projection::{Frame, RenderedElement};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        screens: Arc<Mutex<Vec<Screen>>>,
    }

    impl FrameSink for RecordingSink {
        fn show(&mut self, screen: &Screen) {
            self.screens.lock().unwrap().push(screen.clone());
        }
    }

    impl RecordingSink {
        fn last_frame(&self) -> Frame {
            match self.screens.lock().unwrap().last() {
                Some(Screen::Slide(frame)) => frame.clone(),
                other => panic!("expected a slide, got {:?}", other),
            }
        }

        fn last_title(&self) -> String {
            let frame = self.last_frame();
            frame
                .elements
                .iter()
                .find_map(|e| match &e.content {
                    RenderedElement::Text(t) => Some(t.clone()),
                    _ => None,
                })
                .unwrap_or_default()
        }
    }

    fn show_stage() -> StageConfig {
        let mut show = slide(2, SlideType::ProductionShow, 0);
        show.has_compo = Some(3);
        show.auto_advance_productions = true;
        show.production_display_time = 2000;
        show.elements = vec![element(10, ElementKind::ProductionTitle, 1)];
        let mut results_slide = slide(3, SlideType::ResultsLive, 1);
        results_slide.has_compo = Some(3);
        results_slide.elements = vec![element(20, ElementKind::ResultsTable, 1)];
        stage(vec![show, results_slide])
    }

    fn api_with_stage() -> Arc<FakeStageApi> {
        let api = Arc::new(FakeStageApi::new());
        api.set_stage(show_stage());
        api.set_compo(
            3,
            compo(vec![
                production(1, "Elevated"),
                production(2, "fr-041"),
                production(3, "Stargazer"),
                production(4, "Zoom"),
            ]),
        );
        api.set_results(3, results(&["Elevated", "fr-041", "Stargazer", "Zoom"]));
        api
    }

    fn spawn_engine(
        api: &Arc<FakeStageApi>,
        target: ViewerTarget,
    ) -> (
        RecordingSink,
        mpsc::Sender<ViewerCommand>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let sink = RecordingSink::default();
        let (cmd_tx, cmd_rx, status_tx, _status_rx) = create_engine_channels();
        let mut engine = ViewerEngine::new(
            api.clone(),
            sink.clone(),
            target,
            Some(Duration::from_secs(5)),
            true,
            cmd_rx,
            status_tx,
        );
        let task = tokio::spawn(async move { engine.run().await });
        (sink, cmd_tx, task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_config_shows_not_configured() {
        let api = Arc::new(FakeStageApi::new());
        let (sink, cmd_tx, task) = spawn_engine(&api, ViewerTarget::Edition(12));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            sink.screens.lock().unwrap().last(),
            Some(&Screen::NotConfigured("edition 12".to_string()))
        );

        cmd_tx.send(ViewerCommand::Shutdown).await.unwrap();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(api.control_fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_state_drives_slide() {
        let api = api_with_stage();
        let mut on_results = control_at(0);
        on_results.current_slide_index = 1;
        on_results.revealed_positions = 1;
        api.push_control(on_results);
        let (sink, cmd_tx, task) = spawn_engine(&api, ViewerTarget::Config(7));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let frame = sink.last_frame();
        assert_eq!(frame.slide_id, 3);
        match &frame.elements[0].content {
            RenderedElement::ResultsTable { rows, .. } => {
                assert_eq!(rows.len(), 4);
                assert_eq!(crate::projection::obscured_count(rows), 3);
            }
            other => panic!("unexpected element {:?}", other),
        }

        cmd_tx.send(ViewerCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }

    fn table_rows(frame: &Frame) -> Vec<crate::projection::ResultRow> {
        match &frame.elements[0].content {
            RenderedElement::ResultsTable { rows, .. } => rows.clone(),
            other => panic!("unexpected element {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_reaches_screen_within_one_interval() {
        let api = api_with_stage();
        let mut hidden = control_at(0);
        hidden.current_slide_index = 1;
        let mut revealed = control_at(1);
        revealed.current_slide_index = 1;
        revealed.revealed_positions = 1;
        api.push_control(hidden);
        api.push_control(revealed);
        let (sink, cmd_tx, task) = spawn_engine(&api, ViewerTarget::Config(7));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(crate::projection::obscured_count(&table_rows(&sink.last_frame())), 4);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let rows = table_rows(&sink.last_frame());
        assert_eq!(rows.len(), 4);
        assert_eq!(crate::projection::obscured_count(&rows), 3);
        assert!(rows[3].is_revealed());

        cmd_tx.send(ViewerCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_polls_keep_last_frame() {
        let api = api_with_stage();
        let mut on_results = control_at(0);
        on_results.current_slide_index = 1;
        on_results.revealed_positions = 2;
        api.push_control(on_results);
        api.push_control_failure();
        let (sink, cmd_tx, task) = spawn_engine(&api, ViewerTarget::Config(7));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = sink.last_frame();
        let shown = sink.screens.lock().unwrap().len();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.control_fetches(), 3);
        assert_eq!(sink.screens.lock().unwrap().len(), shown);
        assert_eq!(sink.last_frame(), before);
        assert_eq!(crate::projection::obscured_count(&table_rows(&before)), 2);

        cmd_tx.send(ViewerCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_key_preview_reverts_on_next_poll() {
        let api = api_with_stage();
        api.push_control(control_at(0));
        let (sink, cmd_tx, task) = spawn_engine(&api, ViewerTarget::Config(7));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.last_frame().slide_id, 2);

        cmd_tx.send(ViewerCommand::Key(Key::End)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.last_frame().slide_id, 3);

        // The remote state has not changed, the next poll still wins
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.control_fetches(), 2);
        assert_eq!(sink.last_frame().slide_id, 2);
        assert_eq!(sink.last_title(), "Elevated");

        cmd_tx.send(ViewerCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_of_other_compo_are_not_shown() {
        let api = api_with_stage();
        let mut stage = show_stage();
        let mut other_results = slide(4, SlideType::ResultsLive, 2);
        other_results.has_compo = Some(5);
        other_results.elements = vec![element(30, ElementKind::ResultsTable, 1)];
        stage.slides.push(other_results);
        api.set_stage(stage);
        api.set_compo(5, compo(vec![production(7, "Wild One")]));
        api.push_control_failure();
        let (sink, cmd_tx, task) = spawn_engine(&api, ViewerTarget::Config(7));

        cmd_tx.send(ViewerCommand::Key(Key::Digit(2))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.last_frame().slide_id, 3);
        assert_eq!(table_rows(&sink.last_frame()).len(), 4);

        // No results for compo 5: the table is empty rather than compo 3's
        cmd_tx.send(ViewerCommand::Key(Key::Digit(3))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.last_frame().slide_id, 4);
        assert!(table_rows(&sink.last_frame()).is_empty());

        cmd_tx.send(ViewerCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_navigate_without_remote_state() {
        let api = api_with_stage();
        api.push_control_failure();
        let (sink, cmd_tx, task) = spawn_engine(&api, ViewerTarget::Config(7));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.last_title(), "Elevated");

        cmd_tx.send(ViewerCommand::Key(Key::Right)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.last_title(), "fr-041");

        cmd_tx.send(ViewerCommand::Key(Key::End)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.last_frame().slide_id, 3);

        cmd_tx.send(ViewerCommand::Key(Key::Quit)).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_advance_yields_to_remote() {
        let api = api_with_stage();
        let mut playing = control_at(0);
        playing.is_playing = true;
        let mut reset = control_at(1);
        reset.is_playing = true;
        api.push_control(playing);
        api.push_control(reset);
        let (sink, cmd_tx, task) = spawn_engine(&api, ViewerTarget::Config(7));

        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert_eq!(sink.last_title(), "Stargazer");

        // Poll at 5s brings production 0 back
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sink.last_title(), "Elevated");

        cmd_tx.send(ViewerCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_presentation_change_reloads_slides() {
        let api = api_with_stage();
        let mut switched = control_at(1);
        switched.current_presentation = Some(4);
        api.push_control(control_at(0));
        api.push_control(switched);
        let (_sink, cmd_tx, task) = spawn_engine(&api, ViewerTarget::Config(7));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(api.stage_fetches(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.stage_fetches(), 2);

        cmd_tx.send(ViewerCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }
}
