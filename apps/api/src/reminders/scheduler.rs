//! Notification scheduler — the collaborator that turns a stored reminder time
//! into a delivered notification.
//!
//! `TokioScheduler` keeps one timer task per plant id. Scheduling an id that
//! already has a timer aborts the old one, so a plant never has two reminders
//! armed at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::plant::{PlantId, StoredPlant};
use crate::reminders::clock::Clock;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub plant_id: PlantId,
    pub title: String,
    pub body: String,
}

impl NotificationPayload {
    pub fn for_plant(plant: &StoredPlant) -> Self {
        Self {
            plant_id: plant.id().clone(),
            title: "Heeey, 🌱".to_string(),
            body: format!("It's time to take care of your {}", plant.entry.name),
        }
    }
}

#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    /// Arms a notification for `plant_id`, replacing any armed one.
    async fn schedule(
        &self,
        plant_id: &PlantId,
        fire_at: DateTime<Utc>,
        payload: NotificationPayload,
    ) -> Uuid;

    /// Disarms the notification for `plant_id`. Returns whether one was armed.
    async fn cancel(&self, plant_id: &PlantId) -> bool;

    /// Disarms every armed notification. Returns how many were armed.
    async fn cancel_all(&self) -> usize;
}

/// Where fired notifications end up.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload);
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, payload: &NotificationPayload) {
        info!(plant_id = %payload.plant_id, "{} {}", payload.title, payload.body);
    }
}

struct ArmedTimer {
    notification_id: Uuid,
    fire_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

type Timers = Arc<Mutex<HashMap<PlantId, ArmedTimer>>>;

pub struct TokioScheduler {
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    timers: Timers,
}

impl TokioScheduler {
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            clock,
            notifier,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of notifications currently armed.
    pub fn armed(&self) -> usize {
        lock(&self.timers).len()
    }

    /// When the notification armed for `plant_id` fires, if one is armed.
    pub fn armed_at(&self, plant_id: &PlantId) -> Option<DateTime<Utc>> {
        lock(&self.timers).get(plant_id).map(|t| t.fire_at)
    }
}

fn lock(timers: &Timers) -> MutexGuard<'_, HashMap<PlantId, ArmedTimer>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl NotificationScheduler for TokioScheduler {
    async fn schedule(
        &self,
        plant_id: &PlantId,
        fire_at: DateTime<Utc>,
        payload: NotificationPayload,
    ) -> Uuid {
        let delay = (fire_at - self.clock.now()).to_std().unwrap_or_default();
        let notification_id = Uuid::new_v4();

        // Held while spawning so the task cannot deregister before it is registered.
        let mut armed = lock(&self.timers);

        let handle = {
            let timers = self.timers.clone();
            let notifier = self.notifier.clone();
            let plant_id = plant_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                notifier.deliver(&payload).await;

                let mut armed = lock(&timers);
                if armed
                    .get(&plant_id)
                    .is_some_and(|t| t.notification_id == notification_id)
                {
                    armed.remove(&plant_id);
                }
            })
        };

        if let Some(previous) = armed.insert(
            plant_id.clone(),
            ArmedTimer {
                notification_id,
                fire_at,
                handle,
            },
        ) {
            previous.handle.abort();
            debug!("Replaced armed notification for plant {}", plant_id);
        }

        info!(
            "Armed notification {} for plant {} at {} (in {}s)",
            notification_id,
            plant_id,
            fire_at,
            delay.as_secs()
        );
        notification_id
    }

    async fn cancel(&self, plant_id: &PlantId) -> bool {
        match lock(&self.timers).remove(plant_id) {
            Some(timer) => {
                timer.handle.abort();
                info!("Cancelled notification for plant {}", plant_id);
                true
            }
            None => false,
        }
    }

    async fn cancel_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.timers).drain().collect();
        for (_, timer) in &drained {
            timer.handle.abort();
        }
        info!("Cancelled {} armed notifications", drained.len());
        drained.len()
    }
}

/// Arms every stored reminder that is still ahead of `now`. Returns how many were armed.
pub async fn rearm_pending(
    scheduler: &dyn NotificationScheduler,
    plants: &[StoredPlant],
    now: DateTime<Utc>,
) -> usize {
    let mut armed = 0;
    for plant in plants.iter().filter(|p| p.reminder_at > now) {
        scheduler
            .schedule(
                plant.id(),
                plant.reminder_at,
                NotificationPayload::for_plant(plant),
            )
            .await;
        armed += 1;
    }
    armed
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;

    use super::*;
    use crate::models::plant::sample_entry;
    use crate::reminders::clock::ManualClock;

    const NOW: &str = "2030-05-01T09:00:00Z";

    #[derive(Default)]
    struct RecordingNotifier {
        delivered: Mutex<Vec<NotificationPayload>>,
    }

    impl RecordingNotifier {
        fn delivered_ids(&self) -> Vec<String> {
            self.delivered
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.plant_id.to_string())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, payload: &NotificationPayload) {
            self.delivered.lock().unwrap().push(payload.clone());
        }
    }

    fn scheduler() -> (TokioScheduler, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::at(NOW));
        (TokioScheduler::new(clock, notifier.clone()), notifier)
    }

    fn plant(id: &str, offset_secs: i64) -> StoredPlant {
        StoredPlant {
            entry: sample_entry(id, "Fern", &[]),
            reminder_at: NOW.parse::<DateTime<Utc>>().unwrap() + Duration::seconds(offset_secs),
        }
    }

    async fn arm(scheduler: &TokioScheduler, plant: &StoredPlant) -> Uuid {
        scheduler
            .schedule(
                plant.id(),
                plant.reminder_at,
                NotificationPayload::for_plant(plant),
            )
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_reminder_time() {
        let (scheduler, notifier) = scheduler();
        arm(&scheduler, &plant("p1", 60)).await;
        assert_eq!(scheduler.armed(), 1);

        tokio::time::sleep(StdDuration::from_secs(59)).await;
        assert!(notifier.delivered_ids().is_empty());

        tokio::time::sleep(StdDuration::from_secs(2)).await;
        assert_eq!(notifier.delivered_ids(), vec!["p1"]);
        assert_eq!(scheduler.armed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_replaces_armed_timer() {
        let (scheduler, notifier) = scheduler();
        let first = arm(&scheduler, &plant("p1", 60)).await;
        let second = arm(&scheduler, &plant("p1", 120)).await;
        assert_ne!(first, second);
        assert_eq!(scheduler.armed(), 1);

        tokio::time::sleep(StdDuration::from_secs(90)).await;
        assert!(notifier.delivered_ids().is_empty());

        tokio::time::sleep(StdDuration::from_secs(60)).await;
        assert_eq!(notifier.delivered_ids(), vec!["p1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let (scheduler, notifier) = scheduler();
        arm(&scheduler, &plant("p1", 60)).await;

        assert!(scheduler.cancel(&PlantId::new("p1")).await);
        assert!(!scheduler.cancel(&PlantId::new("p1")).await);

        tokio::time::sleep(StdDuration::from_secs(120)).await;
        assert!(notifier.delivered_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_disarms_everything() {
        let (scheduler, notifier) = scheduler();
        arm(&scheduler, &plant("p1", 60)).await;
        arm(&scheduler, &plant("p2", 90)).await;
        assert_eq!(
            scheduler.armed_at(&PlantId::new("p2")),
            Some(plant("p2", 90).reminder_at)
        );

        assert_eq!(scheduler.cancel_all().await, 2);
        assert_eq!(scheduler.armed(), 0);
        assert_eq!(scheduler.armed_at(&PlantId::new("p2")), None);
        assert_eq!(scheduler.cancel_all().await, 0);

        tokio::time::sleep(StdDuration::from_secs(120)).await;
        assert!(notifier.delivered_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_skips_past_reminders() {
        let (scheduler, notifier) = scheduler();
        let plants = vec![plant("due", 30), plant("past", -30), plant("later", 300)];

        let armed = rearm_pending(&scheduler, &plants, NOW.parse().unwrap()).await;
        assert_eq!(armed, 2);

        tokio::time::sleep(StdDuration::from_secs(301)).await;
        assert_eq!(notifier.delivered_ids(), vec!["due", "later"]);
    }

    #[test]
    fn test_payload_names_plant() {
        let payload = NotificationPayload::for_plant(&plant("p1", 60));
        assert_eq!(payload.plant_id.as_str(), "p1");
        assert!(payload.body.contains("Fern"));
    }
}
