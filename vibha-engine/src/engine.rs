//! The core engine that owns every mounted component and drives it from the clock.

use crate::common::{CountdownId, RotatorId, SessionId};
use crate::components::countdown::TimeRemaining;
use crate::components::rotator::{Rotator, RotatorError};
use crate::components::watcher::{CountdownWatcher, RotatorWatcher};
use crate::components::wizard::{FormWizard, WizardError};
use crate::config::SiteConfig;
use crate::events::{CountdownEvent, RotatorEvent, SystemEvent, WizardEvent};
use crate::forms::{check_email, FormSchema};
use crate::submission::{Receipt, SimulatedSubmitter, SubmitError, Submission, Submitter};
use crate::time::{SystemClock, TickEvent};
use chrono::{DateTime, Utc};
use slotmap::SlotMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Failure reason recorded when the collaborator call panics or is cancelled.
pub const COLLABORATOR_PANICKED: &str = "collaborator panicked";

#[derive(Debug, Error)]
pub enum NewsletterError {
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error(transparent)]
    Rejected(#[from] SubmitError),
}

/// The main admissions engine.
///
/// This struct is the central point of control. It holds the configuration
/// and the submission collaborator, owns every mounted countdown, rotator and
/// wizard session, and drives the tick loop. It is cheap to clone: every
/// clone is a handle to the same running instance.
///
/// Tick handlers run while the engine holds its countdown registry lock, so
/// they must not call back into the engine.
#[derive(Clone)]
pub struct AdmissionsEngine {
    config: Arc<SiteConfig>,
    submitter: Arc<dyn Submitter>,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
    system_event_sender: broadcast::Sender<SystemEvent>,
    countdown_event_sender: broadcast::Sender<CountdownEvent>,
    wizard_event_sender: broadcast::Sender<WizardEvent>,
    rotator_event_sender: broadcast::Sender<RotatorEvent>,
    countdowns: Arc<RwLock<SlotMap<CountdownId, CountdownWatcher>>>,
    rotators: Arc<RwLock<SlotMap<RotatorId, RotatorWatcher>>>,
    sessions: Arc<RwLock<SlotMap<SessionId, FormWizard>>>,
}

// Core implementation block for internal logic.
impl AdmissionsEngine {
    /// Creates an engine whose submissions go to a `SimulatedSubmitter`
    /// built from `config.submission`.
    pub fn new(config: SiteConfig) -> Self {
        let submitter = Arc::new(SimulatedSubmitter::from_config(&config.submission));
        Self::with_submitter(config, submitter)
    }

    /// Creates an engine that hands submissions to `submitter`.
    pub fn with_submitter(config: SiteConfig, submitter: Arc<dyn Submitter>) -> Self {
        const CHANNEL_CAPACITY: usize = 256;
        let (tick_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (system_event_sender, _) = broadcast::channel(64);
        let (countdown_event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (wizard_event_sender, _) = broadcast::channel(64);
        let (rotator_event_sender, _) = broadcast::channel(64);

        Self {
            config: Arc::new(config),
            submitter,
            tick_sender,
            system_event_sender,
            countdown_event_sender,
            wizard_event_sender,
            rotator_event_sender,
            countdowns: Arc::new(RwLock::new(SlotMap::with_key())),
            rotators: Arc::new(RwLock::new(SlotMap::with_key())),
            sessions: Arc::new(RwLock::new(SlotMap::with_key())),
        }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Runs the engine until Ctrl+C is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.run_until(async {
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received.");
            Ok::<(), anyhow::Error>(())
        })
        .await
    }

    /// Runs the engine until `shutdown` resolves.
    ///
    /// This method will:
    /// 1. Spawn the `SystemClock` task.
    /// 2. Spawn the dispatcher task that recomputes mounted components on every tick.
    /// 3. Wait for `shutdown`, then stop both tasks and wait for them to exit.
    pub async fn run_until<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        info!("AdmissionsEngine starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);

        // Subscribe before the clock starts so the first tick is not lost.
        let tick_rx = self.tick_sender.subscribe();
        let dispatcher = self.clone();
        let dispatcher_shutdown_rx = shutdown_tx.subscribe();
        let dispatcher_task =
            tokio::spawn(async move { dispatcher.dispatcher_loop(tick_rx, dispatcher_shutdown_rx).await });

        let clock = SystemClock::new(self.config.resolution.clone(), self.tick_sender.clone());
        let clock_task = tokio::spawn(clock.run(shutdown_tx.subscribe()));

        info!("Engine running at {:?}.", self.config.resolution);
        let outcome = shutdown.await;

        info!("Broadcasting shutdown to all tasks...");
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
        }
        if let Err(e) = clock_task.await {
            error!("SystemClock task ended abnormally: {}", e);
        }
        if let Err(e) = dispatcher_task.await {
            error!("Dispatcher task ended abnormally: {}", e);
        }
        self.system_event_sender.send(SystemEvent::EngineShutdown).ok();
        info!("AdmissionsEngine has shut down.");
        outcome
    }

    #[doc(hidden)]
    async fn dispatcher_loop(
        self,
        mut tick_rx: broadcast::Receiver<Arc<TickEvent>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: Instant::now(),
            })
            .ok();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                tick = tick_rx.recv() => match tick {
                    Ok(tick) => {
                        trace!("Tick #{} received.", tick.tick_count);
                        self.process_tick(&tick).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Dispatcher fell behind and skipped {} ticks.", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Recomputes every mounted component for one tick.
    pub(crate) async fn process_tick(&self, tick: &TickEvent) {
        self.process_countdowns(tick.timestamp).await;
        self.process_rotators(Instant::now()).await;
    }

    #[doc(hidden)]
    async fn process_countdowns(&self, now: DateTime<Utc>) {
        let mut countdowns = self.countdowns.write().await;
        for (id, watcher) in countdowns.iter_mut() {
            self.process_countdown(id, watcher, now);
        }
    }

    #[doc(hidden)]
    fn process_countdown(&self, id: CountdownId, watcher: &mut CountdownWatcher, now: DateTime<Utc>) {
        let update = watcher.process_tick(now);
        self.countdown_event_sender
            .send(CountdownEvent::Tick {
                id,
                remaining: update.remaining,
            })
            .ok();
        if update.completed {
            info!(?id, "Countdown reached its target.");
            self.countdown_event_sender
                .send(CountdownEvent::Completed { id, at: now })
                .ok();
        }
    }

    #[doc(hidden)]
    pub(crate) async fn process_rotators(&self, now: Instant) {
        let mut rotators = self.rotators.write().await;
        for (id, watcher) in rotators.iter_mut() {
            if let Some(index) = watcher.process_tick(now) {
                trace!(?id, index, "Rotator advanced.");
                self.rotator_event_sender
                    .send(RotatorEvent::Advanced {
                        id,
                        index,
                        direction: watcher.rotator.direction(),
                    })
                    .ok();
            }
        }
    }

    #[doc(hidden)]
    fn spawn_submission(&self, session: SessionId, submission: Submission) -> JoinHandle<()> {
        self.wizard_event_sender
            .send(WizardEvent::SubmissionStarted { session })
            .ok();
        let engine = self.clone();
        tokio::spawn(async move {
            // The call runs in its own task so a panicking collaborator still
            // leaves the session in `Failed`.
            let submitter = engine.submitter.clone();
            let call = tokio::spawn(async move { submitter.submit(&submission).await });
            let result = match call.await {
                Ok(result) => result,
                Err(e) => {
                    error!(?session, "Submission task ended abnormally: {}", e);
                    Err(SubmitError::new(COLLABORATOR_PANICKED))
                }
            };
            let event = match &result {
                Ok(receipt) => {
                    info!(?session, reference = %receipt.reference, "Submission accepted.");
                    WizardEvent::Submitted {
                        session,
                        receipt: receipt.clone(),
                    }
                }
                Err(e) => {
                    warn!(?session, reason = %e.reason, "Submission failed.");
                    WizardEvent::SubmissionFailed {
                        session,
                        reason: e.reason.clone(),
                    }
                }
            };

            let mut sessions = engine.sessions.write().await;
            let Some(wizard) = sessions.get_mut(session) else {
                debug!(?session, "Session closed before its submission resolved.");
                return;
            };
            if let Err(e) = wizard.finish_submit(result) {
                error!(?session, "Could not record submission result: {}", e);
                return;
            }
            drop(sessions);
            engine.wizard_event_sender.send(event).ok();
        })
    }
}

// Countdown API.
impl AdmissionsEngine {
    /// Mounts a countdown to `target`.
    ///
    /// The breakdown is computed immediately and then on every tick.
    /// `on_tick` receives every breakdown. `on_complete` runs once, on the
    /// first computation at or past the target, even though ticks keep
    /// arriving until the countdown is unmounted.
    ///
    /// # Returns
    /// A `CountdownId` which can be used to later unmount this countdown.
    pub async fn mount_countdown(
        &self,
        target: DateTime<Utc>,
        on_tick: impl FnMut(&TimeRemaining) + Send + Sync + 'static,
        on_complete: impl FnMut() + Send + Sync + 'static,
    ) -> CountdownId {
        let watcher = CountdownWatcher::new(target, Box::new(on_tick), Box::new(on_complete));
        let mut countdowns = self.countdowns.write().await;
        let id = countdowns.insert(watcher);
        self.system_event_sender
            .send(SystemEvent::CountdownMounted { id })
            .ok();
        debug!(?id, %target, "Countdown mounted.");
        if let Some(watcher) = countdowns.get_mut(id) {
            self.process_countdown(id, watcher, Utc::now());
        }
        id
    }

    /// Mounts a countdown that only reports through `CountdownEvent`s.
    pub async fn watch_deadline(&self, target: DateTime<Utc>) -> CountdownId {
        self.mount_countdown(target, |_| {}, || {}).await
    }

    /// Mounts a countdown for every deadline in the configuration.
    pub async fn mount_configured_deadlines(&self) -> Vec<(String, CountdownId)> {
        let mut mounted = Vec::new();
        for (name, target) in self.config.deadline_targets() {
            let id = self.watch_deadline(target).await;
            info!(%name, %target, "Deadline countdown mounted.");
            mounted.push((name, id));
        }
        mounted
    }

    /// Cancels a countdown. Returns `true` if it was mounted; cancelling
    /// twice is a no-op.
    pub async fn unmount_countdown(&self, id: CountdownId) -> bool {
        let was_removed = self.countdowns.write().await.remove(id).is_some();
        if was_removed {
            self.system_event_sender
                .send(SystemEvent::CountdownUnmounted { id })
                .ok();
        }
        was_removed
    }

    /// Gives a countdown a new target and re-arms its completion handler.
    /// Returns `false` if the countdown is not mounted.
    pub async fn retarget_countdown(&self, id: CountdownId, target: DateTime<Utc>) -> bool {
        let mut countdowns = self.countdowns.write().await;
        let Some(watcher) = countdowns.get_mut(id) else {
            return false;
        };
        watcher.retarget(target);
        self.countdown_event_sender
            .send(CountdownEvent::Retargeted { id, target })
            .ok();
        self.process_countdown(id, watcher, Utc::now());
        true
    }

    /// The most recently computed breakdown of a mounted countdown.
    pub async fn countdown_remaining(&self, id: CountdownId) -> Option<TimeRemaining> {
        self.countdowns.read().await.get(id).and_then(|watcher| watcher.last())
    }

    pub async fn countdown_target(&self, id: CountdownId) -> Option<DateTime<Utc>> {
        self.countdowns.read().await.get(id).map(|watcher| watcher.target())
    }
}

// Rotator API.
impl AdmissionsEngine {
    /// Mounts a rotator over `len` items, advancing at the configured interval.
    pub async fn mount_rotator(&self, len: usize) -> Result<RotatorId, RotatorError> {
        self.mount_rotator_with_interval(len, self.config.rotator.interval())
            .await
    }

    pub async fn mount_rotator_with_interval(
        &self,
        len: usize,
        interval: Duration,
    ) -> Result<RotatorId, RotatorError> {
        let rotator = Rotator::new(len)?;
        let id = self
            .rotators
            .write()
            .await
            .insert(RotatorWatcher::new(rotator, interval, Instant::now()));
        self.system_event_sender
            .send(SystemEvent::RotatorMounted { id })
            .ok();
        Ok(id)
    }

    pub async fn unmount_rotator(&self, id: RotatorId) -> bool {
        let was_removed = self.rotators.write().await.remove(id).is_some();
        if was_removed {
            self.system_event_sender
                .send(SystemEvent::RotatorUnmounted { id })
                .ok();
        }
        was_removed
    }

    pub async fn rotator_next(&self, id: RotatorId) -> Result<usize, RotatorError> {
        self.move_rotator(id, |rotator| Ok(rotator.next())).await
    }

    pub async fn rotator_prev(&self, id: RotatorId) -> Result<usize, RotatorError> {
        self.move_rotator(id, |rotator| Ok(rotator.prev())).await
    }

    pub async fn rotator_go_to(&self, id: RotatorId, index: usize) -> Result<usize, RotatorError> {
        self.move_rotator(id, |rotator| rotator.go_to(index)).await
    }

    pub async fn pause_rotator(&self, id: RotatorId) -> Result<(), RotatorError> {
        let mut rotators = self.rotators.write().await;
        let watcher = rotators.get_mut(id).ok_or(RotatorError::Unknown)?;
        watcher.rotator.pause();
        self.rotator_event_sender
            .send(RotatorEvent::Paused { id })
            .ok();
        Ok(())
    }

    pub async fn resume_rotator(&self, id: RotatorId) -> Result<(), RotatorError> {
        let mut rotators = self.rotators.write().await;
        let watcher = rotators.get_mut(id).ok_or(RotatorError::Unknown)?;
        watcher.rotator.resume();
        self.rotator_event_sender
            .send(RotatorEvent::Resumed { id })
            .ok();
        Ok(())
    }

    pub async fn rotator_index(&self, id: RotatorId) -> Option<usize> {
        self.rotators
            .read()
            .await
            .get(id)
            .map(|watcher| watcher.rotator.index())
    }

    #[doc(hidden)]
    async fn move_rotator(
        &self,
        id: RotatorId,
        step: impl FnOnce(&mut Rotator) -> Result<usize, RotatorError>,
    ) -> Result<usize, RotatorError> {
        let mut rotators = self.rotators.write().await;
        let watcher = rotators.get_mut(id).ok_or(RotatorError::Unknown)?;
        let index = step(&mut watcher.rotator)?;
        watcher.touch(Instant::now());
        self.rotator_event_sender
            .send(RotatorEvent::Advanced {
                id,
                index,
                direction: watcher.rotator.direction(),
            })
            .ok();
        Ok(index)
    }
}

// Wizard session API.
impl AdmissionsEngine {
    /// Opens a wizard session for `schema`, starting at step 1.
    pub async fn open_wizard(&self, schema: Arc<FormSchema>) -> SessionId {
        let id = self.sessions.write().await.insert(FormWizard::new(schema));
        self.system_event_sender
            .send(SystemEvent::SessionOpened { id })
            .ok();
        id
    }

    /// Discards a session. A submission still in flight completes at the
    /// collaborator but its result is dropped.
    pub async fn close_wizard(&self, id: SessionId) -> bool {
        let was_removed = self.sessions.write().await.remove(id).is_some();
        if was_removed {
            self.system_event_sender
                .send(SystemEvent::SessionClosed { id })
                .ok();
        }
        was_removed
    }

    /// Reads a session.
    pub async fn with_wizard<R>(
        &self,
        id: SessionId,
        read: impl FnOnce(&FormWizard) -> R,
    ) -> Result<R, WizardError> {
        let sessions = self.sessions.read().await;
        sessions.get(id).map(read).ok_or(WizardError::UnknownSession)
    }

    pub async fn update_field(
        &self,
        id: SessionId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), WizardError> {
        self.with_wizard_mut(id, |wizard| {
            wizard.update_field(name, value);
            Ok(())
        })
        .await
    }

    /// Validates the current step and moves forward. Returns the step the
    /// session is on afterwards.
    pub async fn next_step(&self, id: SessionId) -> Result<usize, WizardError> {
        let (moved, step) = self
            .with_wizard_mut(id, |wizard| {
                let moved = wizard.try_next()?;
                Ok((moved, wizard.current_step()))
            })
            .await?;
        if moved {
            self.wizard_event_sender
                .send(WizardEvent::StepChanged { session: id, step })
                .ok();
        }
        Ok(step)
    }

    /// Moves back one step. Returns the step the session is on afterwards.
    pub async fn prev_step(&self, id: SessionId) -> Result<usize, WizardError> {
        let (moved, step) = self
            .with_wizard_mut(id, |wizard| Ok((wizard.go_prev(), wizard.current_step())))
            .await?;
        if moved {
            self.wizard_event_sender
                .send(WizardEvent::StepChanged { session: id, step })
                .ok();
        }
        Ok(step)
    }

    /// Validates the session and hands its payload to the collaborator.
    ///
    /// Returns a handle to the background task that records the outcome.
    /// A session accepts one submission at a time.
    pub async fn submit(&self, id: SessionId) -> Result<JoinHandle<()>, WizardError> {
        let submission = self.with_wizard_mut(id, FormWizard::begin_submit).await?;
        info!(session = ?id, kind = submission.kind(), "Submitting form.");
        Ok(self.spawn_submission(id, submission))
    }

    /// Resubmits the payload of a failed submission.
    pub async fn retry(&self, id: SessionId) -> Result<JoinHandle<()>, WizardError> {
        let submission = self.with_wizard_mut(id, FormWizard::retry).await?;
        info!(session = ?id, "Retrying failed submission.");
        Ok(self.spawn_submission(id, submission))
    }

    /// Returns a failed session to editing on its last step.
    pub async fn edit(&self, id: SessionId) -> Result<(), WizardError> {
        self.with_wizard_mut(id, FormWizard::edit).await
    }

    /// Clears a session back to step 1.
    pub async fn reset(&self, id: SessionId) -> Result<(), WizardError> {
        self.with_wizard_mut(id, FormWizard::reset).await?;
        self.wizard_event_sender
            .send(WizardEvent::Reset { session: id })
            .ok();
        Ok(())
    }

    #[doc(hidden)]
    async fn with_wizard_mut<R>(
        &self,
        id: SessionId,
        change: impl FnOnce(&mut FormWizard) -> Result<R, WizardError>,
    ) -> Result<R, WizardError> {
        let mut sessions = self.sessions.write().await;
        let wizard = sessions.get_mut(id).ok_or(WizardError::UnknownSession)?;
        change(wizard)
    }
}

// Newsletter and subscriptions.
impl AdmissionsEngine {
    /// Signs an email address up for the newsletter.
    pub async fn subscribe_newsletter(&self, email: &str) -> Result<Receipt, NewsletterError> {
        let email = email.trim();
        check_email(email).map_err(NewsletterError::InvalidEmail)?;
        let submission = Submission::Newsletter {
            email: email.to_string(),
        };
        let receipt = self.submitter.submit(&submission).await?;
        info!(reference = %receipt.reference, "Newsletter subscription accepted.");
        Ok(receipt)
    }

    /// Subscribes to the raw tick stream.
    pub fn subscribe_tick_events(&self) -> broadcast::Receiver<Arc<TickEvent>> {
        self.tick_sender.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Subscribes to the `CountdownEvent` stream.
    pub fn subscribe_countdown_events(&self) -> broadcast::Receiver<CountdownEvent> {
        self.countdown_event_sender.subscribe()
    }

    /// Subscribes to the `WizardEvent` stream.
    pub fn subscribe_wizard_events(&self) -> broadcast::Receiver<WizardEvent> {
        self.wizard_event_sender.subscribe()
    }

    /// Subscribes to the `RotatorEvent` stream.
    pub fn subscribe_rotator_events(&self) -> broadcast::Receiver<RotatorEvent> {
        self.rotator_event_sender.subscribe()
    }
}
