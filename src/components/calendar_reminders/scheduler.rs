use super::descriptor::parse_descriptor;
use super::models::CalendarEvent;
use super::notifications::{DeliveryOutcome, Notification, NotificationSender};
use super::recipient::RecipientResolver;
use super::store::{DocumentStore, ReminderStateStore};
use super::time::{event_start_instant, is_due};
use crate::config::{Config, DeliveryPolicy, DEFAULT_POLL_INTERVAL_SECS};
use crate::utils::clock::Clock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl DeliveryPolicy {
    /// Whether a dispatch with this outcome gets its reminder marked sent
    pub fn should_mark(&self, outcome: &DeliveryOutcome) -> bool {
        match self {
            DeliveryPolicy::MarkOnAttempt => true,
            DeliveryPolicy::MarkOnDelivery => outcome.is_confirmed(),
        }
    }
}

/// Counts from one poll cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub events_scanned: usize,
    pub reminders_checked: usize,
    pub due: usize,
    pub dispatched: usize,
    pub marked_sent: usize,
    /// Dispatched but left unsent by the delivery policy
    pub left_unsent: usize,
    /// Unparseable descriptors or event start times
    pub invalid: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, run: ReminderRun) {
        match run {
            ReminderRun::Marked => {
                self.dispatched += 1;
                self.marked_sent += 1;
            }
            ReminderRun::Unmarked => {
                self.dispatched += 1;
                self.left_unsent += 1;
            }
            ReminderRun::MarkFailed => {
                self.dispatched += 1;
                self.failed += 1;
            }
            ReminderRun::DispatchFailed => self.failed += 1,
        }
    }

    fn log(&self) {
        if self.due > 0 || self.invalid > 0 || self.failed > 0 {
            info!(
                "Reminder tick: {} events, {} reminders checked, {} due, {} dispatched, {} marked sent, {} left unsent, {} invalid, {} failed",
                self.events_scanned,
                self.reminders_checked,
                self.due,
                self.dispatched,
                self.marked_sent,
                self.left_unsent,
                self.invalid,
                self.failed
            );
        } else {
            debug!(
                "Reminder tick: {} events, {} reminders checked, nothing due",
                self.events_scanned, self.reminders_checked
            );
        }
    }
}

/// How one due reminder's pipeline ended
#[derive(Debug)]
enum ReminderRun {
    Marked,
    Unmarked,
    MarkFailed,
    DispatchFailed,
}

/// Everything a tick needs; cheap to clone into spawned tasks
#[derive(Clone)]
struct TickContext {
    config: Arc<RwLock<Config>>,
    state: ReminderStateStore,
    sender: Arc<dyn NotificationSender>,
    recipients: Arc<dyn RecipientResolver>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl TickContext {
    async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let now = self.clock.now();

        let (tz, policy) = {
            let config = self.config.read().await;
            (config.tz(), config.delivery_policy)
        };
        let tz = match tz {
            Ok(tz) => tz,
            Err(e) => {
                error!("Skipping reminder tick: {}", e);
                return report;
            }
        };

        let events = match self.state.fetch_candidate_events().await {
            Ok(events) => events,
            Err(e) => {
                error!("Failed to fetch calendar events: {}", e);
                return report;
            }
        };

        let window = chrono::Duration::milliseconds(
            i64::try_from(self.poll_interval.as_millis()).unwrap_or(i64::MAX),
        );
        let mut tasks = JoinSet::new();

        for event in events {
            report.events_scanned += 1;
            let pending = event.reminders.iter().filter(|r| !r.is_sent()).count();
            report.reminders_checked += pending;

            let start = match event_start_instant(&event, tz) {
                Ok(start) => start,
                Err(e) => {
                    warn!("Skipping reminders of event {}: {}", event.id, e);
                    report.invalid += pending;
                    continue;
                }
            };

            let event = Arc::new(event);
            for (index, reminder) in event.reminders.iter().enumerate() {
                if reminder.is_sent() {
                    continue;
                }

                let offset = parse_descriptor(reminder.descriptor().as_deref());
                if offset == 0 {
                    warn!(
                        "Skipping reminder {} of event {}: invalid time descriptor {:?}",
                        index,
                        event.id,
                        reminder.descriptor()
                    );
                    report.invalid += 1;
                    continue;
                }

                if !is_due(start, offset, now, window) {
                    continue;
                }

                report.due += 1;
                let ctx = self.clone();
                let event = Arc::clone(&event);
                tasks.spawn(async move { ctx.deliver(&event, index, policy).await });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(run) => report.record(run),
                Err(e) => {
                    error!("Reminder task ended abnormally: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Dispatch one due reminder, then persist its flag per the policy
    async fn deliver(&self, event: &CalendarEvent, index: usize, policy: DeliveryPolicy) -> ReminderRun {
        let reminder = &event.reminders[index];

        let recipient = match self.recipients.resolve(event).await {
            Ok(recipient) => recipient,
            Err(e) => {
                warn!("Could not resolve recipient for event {}: {}", event.id, e);
                None
            }
        };
        let notification = Notification::for_reminder(event, reminder, recipient);

        let outcome = match self.sender.send(&notification).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Failed to dispatch reminder {} of event {}: {}",
                    index, event.id, e
                );
                return ReminderRun::DispatchFailed;
            }
        };

        if !policy.should_mark(&outcome) {
            info!(
                "Reminder {} of event {} went to {} without confirmation, leaving it unsent ({})",
                index,
                event.id,
                outcome.channel(),
                policy
            );
            return ReminderRun::Unmarked;
        }

        match self.state.mark_reminder_sent(&event.id, index).await {
            Ok(()) => {
                debug!(
                    "Reminder {} of event {} sent via {} and marked",
                    index,
                    event.id,
                    outcome.channel()
                );
                ReminderRun::Marked
            }
            Err(e) => {
                error!(
                    "Failed to mark reminder {} of event {} as sent, it may fire again: {}",
                    index, event.id, e
                );
                ReminderRun::MarkFailed
            }
        }
    }
}

/// Lifecycle of the polling loop
enum SchedulerState {
    Stopped,
    Running {
        cancel: CancellationToken,
        _task: JoinHandle<()>,
    },
}

/// Polls the document store and fires due reminders
pub struct ReminderScheduler {
    ctx: TickContext,
    state: Mutex<SchedulerState>,
}

impl ReminderScheduler {
    pub fn new(
        config: Arc<RwLock<Config>>,
        poll_interval: Duration,
        store: Arc<dyn DocumentStore>,
        sender: Arc<dyn NotificationSender>,
        recipients: Arc<dyn RecipientResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let poll_interval = if poll_interval.is_zero() {
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
        } else {
            poll_interval
        };

        Self {
            ctx: TickContext {
                config,
                state: ReminderStateStore::new(store),
                sender,
                recipients,
                clock,
                poll_interval,
            },
            state: Mutex::new(SchedulerState::Stopped),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.ctx.poll_interval
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            SchedulerState::Running { .. }
        )
    }

    /// Begin ticking every poll interval. Returns `false` if already running.
    ///
    /// The first tick happens one interval after start. Ticks are spawned and
    /// not awaited, so a slow tick can overlap the next one.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*state, SchedulerState::Running { .. }) {
            debug!("Reminder scheduler already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let ctx = self.ctx.clone();
        let period = self.ctx.poll_interval;

        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            ctx.run_tick().await.log();
                        });
                    }
                }
            }
            debug!("Reminder polling loop exited");
        });

        *state = SchedulerState::Running {
            cancel,
            _task: task,
        };
        info!("Reminder scheduler started, polling every {:?}", period);
        true
    }

    /// Stop future ticks. Dispatches already started keep running.
    /// Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match std::mem::replace(&mut *state, SchedulerState::Stopped) {
            SchedulerState::Running { cancel, .. } => {
                cancel.cancel();
                info!("Reminder scheduler stopped");
                true
            }
            SchedulerState::Stopped => false,
        }
    }

    /// Run one poll cycle now and wait for its dispatches
    pub async fn tick(&self) -> TickReport {
        let report = self.ctx.run_tick().await;
        report.log();
        report
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
