use evreg_config::shared::PgConnectionConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, EvregResult};
use crate::store::events::EventStore;
use crate::types::{EventId, EventSlotCounts};

/// Postgres-backed event store.
///
/// The pool connects lazily, so construction never fails and the first query
/// pays the connection cost.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a store over a lazily connecting pool built from `config`.
    pub fn connect_lazy(config: &PgConnectionConfig) -> Self {
        let pool = PgPoolOptions::new().connect_lazy_with(config.with_db());

        Self { pool }
    }

    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl EventStore for PgEventStore {
    async fn load_slot_counts(&self) -> EvregResult<Vec<EventSlotCounts>> {
        // A single statement reads one consistent snapshot.
        let counts = sqlx::query_as::<_, EventSlotCounts>(
            "SELECT id, max_slots, registered_slots FROM events ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }

    async fn slot_counts(&self, event_id: EventId) -> EvregResult<Option<EventSlotCounts>> {
        let counts = sqlx::query_as::<_, EventSlotCounts>(
            "SELECT id, max_slots, registered_slots FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(counts)
    }

    async fn commit_registration(
        &self,
        event_id: EventId,
        attendee_id: Uuid,
    ) -> EvregResult<EventSlotCounts> {
        let mut tx = self.pool.begin().await?;

        // The row lock serializes concurrent registrations for the same
        // event, so the capacity check and the increment are atomic.
        let counts = sqlx::query_as::<_, EventSlotCounts>(
            "SELECT id, max_slots, registered_slots FROM events WHERE id = $1 FOR UPDATE",
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(counts) = counts else {
            bail!(
                ErrorKind::EventNotFound,
                "Event not found",
                format!("Event {event_id} does not exist")
            );
        };

        if counts.available() == 0 {
            bail!(
                ErrorKind::NoAvailableSlots,
                "No available slots",
                format!("Event {event_id} is at capacity")
            );
        }

        let existing = sqlx::query(
            "SELECT 1 FROM registrations WHERE event_id = $1 AND attendee_id = $2",
        )
        .bind(event_id)
        .bind(attendee_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            bail!(
                ErrorKind::AlreadyRegistered,
                "Attendee already registered",
                format!("Attendee {attendee_id} is already registered for event {event_id}")
            );
        }

        sqlx::query(
            "INSERT INTO registrations (id, event_id, attendee_id) VALUES ($1, $2, $3)",
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(attendee_id)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, EventSlotCounts>(
            "UPDATE events SET registered_slots = registered_slots + 1 \
             WHERE id = $1 RETURNING id, max_slots, registered_slots",
        )
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    async fn ping(&self) -> EvregResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;

        Ok(())
    }
}
