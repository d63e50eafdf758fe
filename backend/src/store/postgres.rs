//! PostgreSQL-backed store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AssignOutcome, NearbyCaptain, NotificationStore, Page, PartyStore, RideQuery, RideStore,
    StoreError, TokenStore, Transition,
};
use crate::models::{Captain, CaptainStatus, GeoPoint, PartyRole, Place, Rider, VehicleType};
use crate::notification::Notification;
use crate::ride::{
    Cancellation, Fare, Measure, Otp, Rating, RatingSlot, Ride, RideStatus, Tracking,
};

const METERS_PER_DEGREE: f64 = 111_320.0;

/// Haversine distance from ($1, $2) to the captain's last known position.
const CAPTAIN_DISTANCE_SQL: &str = "6371000.0 * 2.0 * asin(sqrt(\
    power(sin(radians(c.latitude - $1) / 2.0), 2) + \
    cos(radians($1)) * cos(radians(c.latitude)) * \
    power(sin(radians(c.longitude - $2) / 2.0), 2)))";

#[derive(sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    rider_id: Uuid,
    captain_id: Option<Uuid>,
    pickup_address: String,
    pickup_lat: f64,
    pickup_lng: f64,
    destination_address: String,
    destination_lat: f64,
    destination_lng: f64,
    vehicle_type: VehicleType,
    status: RideStatus,
    fare: Json<Fare>,
    distance: Json<Measure>,
    duration: Json<Measure>,
    otp: Json<Otp>,
    rider_rating: Option<Json<Rating>>,
    captain_rating: Option<Json<Rating>>,
    cancellation: Option<Json<Cancellation>>,
    tracking: Json<Tracking>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RideRow> for Ride {
    fn from(row: RideRow) -> Self {
        Ride {
            id: row.id,
            rider_id: row.rider_id,
            captain_id: row.captain_id,
            pickup: Place {
                address: row.pickup_address,
                location: GeoPoint::new(row.pickup_lat, row.pickup_lng),
            },
            destination: Place {
                address: row.destination_address,
                location: GeoPoint::new(row.destination_lat, row.destination_lng),
            },
            vehicle_type: row.vehicle_type,
            status: row.status,
            fare: row.fare.0,
            distance: row.distance.0,
            duration: row.duration.0,
            otp: row.otp.0,
            rider_rating: row.rider_rating.map(|r| r.0),
            captain_rating: row.captain_rating.map(|r| r.0),
            cancellation: row.cancellation.map(|c| c.0),
            tracking: row.tracking.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NearbyCaptainRow {
    #[sqlx(flatten)]
    captain: Captain,
    distance_meters: f64,
}

fn captain_status_name(status: CaptainStatus) -> &'static str {
    match status {
        CaptainStatus::Available => "available",
        CaptainStatus::Busy => "busy",
        CaptainStatus::Inactive => "inactive",
        CaptainStatus::Banned => "banned",
    }
}

fn party_column(role: PartyRole) -> &'static str {
    match role {
        PartyRole::Rider => "rider_id",
        PartyRole::Captain => "captain_id",
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RideStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_ride(&self, ride: &Ride, max_active: u32) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent creates for the same rider until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(ride.rider_id)
            .execute(&mut *tx)
            .await?;

        let active: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM rides
            WHERE rider_id = $1 AND status IN ('pending', 'confirmed', 'started')
            "#,
        )
        .bind(ride.rider_id)
        .fetch_one(&mut *tx)
        .await?;

        if active >= i64::from(max_active) {
            tx.rollback().await?;
            return Err(StoreError::ActiveRideLimit);
        }

        sqlx::query(
            r#"
            INSERT INTO rides (
                id, rider_id, captain_id,
                pickup_address, pickup_lat, pickup_lng,
                destination_address, destination_lat, destination_lng,
                vehicle_type, status, fare, distance, duration, otp, tracking,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(ride.id)
        .bind(ride.rider_id)
        .bind(ride.captain_id)
        .bind(&ride.pickup.address)
        .bind(ride.pickup.location.lat)
        .bind(ride.pickup.location.lng)
        .bind(&ride.destination.address)
        .bind(ride.destination.location.lat)
        .bind(ride.destination.location.lng)
        .bind(ride.vehicle_type)
        .bind(ride.status)
        .bind(Json(&ride.fare))
        .bind(Json(&ride.distance))
        .bind(Json(&ride.duration))
        .bind(Json(&ride.otp))
        .bind(Json(&ride.tracking))
        .bind(ride.created_at)
        .bind(ride.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, StoreError> {
        let row: Option<RideRow> = sqlx::query_as("SELECT * FROM rides WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Ride::from))
    }

    async fn active_ride_for(
        &self,
        role: PartyRole,
        party_id: Uuid,
    ) -> Result<Option<Ride>, StoreError> {
        let sql = format!(
            r#"
            SELECT * FROM rides
            WHERE {} = $1 AND status IN ('pending', 'confirmed', 'started')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            party_column(role)
        );
        let row: Option<RideRow> = sqlx::query_as(&sql)
            .bind(party_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Ride::from))
    }

    async fn count_active_rides(&self, rider_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM rides
            WHERE rider_id = $1 AND status IN ('pending', 'confirmed', 'started')
            "#,
        )
        .bind(rider_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn list_rides(&self, query: &RideQuery) -> Result<Page<Ride>, StoreError> {
        let column = party_column(query.role);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM rides WHERE {} = $1 AND ($2::ride_status IS NULL OR status = $2)",
            column
        ))
        .bind(query.party_id)
        .bind(query.status)
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<RideRow> = sqlx::query_as(&format!(
            r#"
            SELECT * FROM rides
            WHERE {} = $1 AND ($2::ride_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            column
        ))
        .bind(query.party_id)
        .bind(query.status)
        .bind(query.limit)
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(Ride::from).collect(),
            total,
        })
    }

    async fn assign_captain(
        &self,
        ride_id: Uuid,
        captain_id: Uuid,
        tracking: &Tracking,
    ) -> Result<AssignOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<RideRow> = sqlx::query_as(
            r#"
            UPDATE rides
            SET captain_id = $2, status = 'confirmed', tracking = tracking || $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(ride_id)
        .bind(captain_id)
        .bind(Json(tracking))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(AssignOutcome::RideNotPending);
        };

        let claimed = sqlx::query(
            r#"
            UPDATE captains
            SET status = 'busy', updated_at = NOW()
            WHERE id = $1 AND status = 'available'
            "#,
        )
        .bind(captain_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(AssignOutcome::CaptainNotAvailable);
        }

        tx.commit().await?;
        Ok(AssignOutcome::Assigned(row.into()))
    }

    async fn transition(
        &self,
        ride_id: Uuid,
        change: &Transition,
    ) -> Result<Option<Ride>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<RideRow> = sqlx::query_as(
            r#"
            UPDATE rides
            SET status = $3,
                tracking = tracking || $4,
                otp = CASE WHEN $5 THEN jsonb_set(otp, '{verified}', 'true'::jsonb) ELSE otp END,
                cancellation = COALESCE($6, cancellation),
                updated_at = NOW()
            WHERE id = $1 AND status = $2 AND ($7::uuid IS NULL OR captain_id = $7)
            RETURNING *
            "#,
        )
        .bind(ride_id)
        .bind(change.from)
        .bind(change.to)
        .bind(Json(&change.tracking))
        .bind(change.verify_otp)
        .bind(change.cancellation.as_ref().map(Json))
        .bind(change.expected_captain)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        if let Some(captain_id) = change.release_captain {
            sqlx::query(
                r#"
                UPDATE captains
                SET status = 'available', updated_at = NOW()
                WHERE id = $1 AND status = 'busy'
                "#,
            )
            .bind(captain_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(row.into()))
    }

    async fn record_rating(
        &self,
        ride_id: Uuid,
        slot: RatingSlot,
        rating: &Rating,
    ) -> Result<Option<Ride>, StoreError> {
        let column = slot.column();
        let row: Option<RideRow> = sqlx::query_as(&format!(
            r#"
            UPDATE rides
            SET {column} = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'completed' AND {column} IS NULL
            RETURNING *
            "#
        ))
        .bind(ride_id)
        .bind(Json(rating))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Ride::from))
    }

    async fn average_rating(
        &self,
        slot: RatingSlot,
        rated_party: Uuid,
    ) -> Result<Option<f64>, StoreError> {
        // Riders rate captains; captains rate riders.
        let party = match slot {
            RatingSlot::ByRider => "captain_id",
            RatingSlot::ByCaptain => "rider_id",
        };
        let column = slot.column();
        let average: Option<f64> = sqlx::query_scalar(&format!(
            r#"
            SELECT AVG(({column}->>'value')::float8)
            FROM rides
            WHERE {party} = $1 AND status = 'completed' AND {column} IS NOT NULL
            "#
        ))
        .bind(rated_party)
        .fetch_one(&self.pool)
        .await?;
        Ok(average)
    }

    async fn record_captain_location(
        &self,
        ride_id: Uuid,
        captain_id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Ride>, StoreError> {
        let patch = Tracking {
            captain_location: Some(location),
            captain_location_updated_at: Some(at),
            ..Default::default()
        };

        let mut tx = self.pool.begin().await?;

        let row: Option<RideRow> = sqlx::query_as(
            r#"
            UPDATE rides
            SET tracking = tracking || $3, updated_at = $4
            WHERE id = $1 AND captain_id = $2 AND status IN ('confirmed', 'started')
            RETURNING *
            "#,
        )
        .bind(ride_id)
        .bind(captain_id)
        .bind(Json(&patch))
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE captains
            SET latitude = $2, longitude = $3, location_updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(captain_id)
        .bind(location.lat)
        .bind(location.lng)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row.into()))
    }
}

#[async_trait]
impl PartyStore for PgStore {
    async fn insert_rider(&self, rider: &Rider) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO riders (id, first_name, last_name, email, phone, password_hash, rating, deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(rider.id)
        .bind(&rider.first_name)
        .bind(&rider.last_name)
        .bind(&rider.email)
        .bind(&rider.phone)
        .bind(&rider.password_hash)
        .bind(rider.rating)
        .bind(rider.deleted)
        .bind(rider.created_at)
        .bind(rider.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rider_by_id(&self, id: Uuid) -> Result<Option<Rider>, StoreError> {
        let rider = sqlx::query_as("SELECT * FROM riders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rider)
    }

    async fn rider_by_email(&self, email: &str) -> Result<Option<Rider>, StoreError> {
        let rider = sqlx::query_as("SELECT * FROM riders WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rider)
    }

    async fn soft_delete_rider(&self, id: Uuid) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            "UPDATE riders SET deleted = TRUE, updated_at = NOW() WHERE id = $1 AND deleted = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected > 0)
    }

    async fn set_rider_rating(&self, id: Uuid, rating: Option<f64>) -> Result<(), StoreError> {
        sqlx::query("UPDATE riders SET rating = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(rating)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_captain(&self, captain: &Captain) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO captains (
                id, first_name, last_name, email, phone, password_hash,
                vehicle_type, vehicle_model, vehicle_plate, vehicle_color, vehicle_capacity, vehicle_year,
                status, latitude, longitude, location_updated_at, rating, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(captain.id)
        .bind(&captain.first_name)
        .bind(&captain.last_name)
        .bind(&captain.email)
        .bind(&captain.phone)
        .bind(&captain.password_hash)
        .bind(captain.vehicle.vehicle_type)
        .bind(&captain.vehicle.model)
        .bind(&captain.vehicle.plate)
        .bind(&captain.vehicle.color)
        .bind(captain.vehicle.capacity)
        .bind(captain.vehicle.year)
        .bind(captain.status)
        .bind(captain.latitude)
        .bind(captain.longitude)
        .bind(captain.location_updated_at)
        .bind(captain.rating)
        .bind(captain.created_at)
        .bind(captain.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn captain_by_id(&self, id: Uuid) -> Result<Option<Captain>, StoreError> {
        let captain = sqlx::query_as("SELECT * FROM captains WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(captain)
    }

    async fn captain_by_email(&self, email: &str) -> Result<Option<Captain>, StoreError> {
        let captain = sqlx::query_as("SELECT * FROM captains WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(captain)
    }

    async fn set_captain_rating(&self, id: Uuid, rating: Option<f64>) -> Result<(), StoreError> {
        sqlx::query("UPDATE captains SET rating = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(rating)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_captain_status(
        &self,
        id: Uuid,
        from: &[CaptainStatus],
        to: CaptainStatus,
    ) -> Result<Option<Captain>, StoreError> {
        let allowed: Vec<&str> = from.iter().copied().map(captain_status_name).collect();
        let captain = sqlx::query_as(
            r#"
            UPDATE captains
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status::text = ANY($3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await?;
        Ok(captain)
    }

    async fn set_captain_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Captain>, StoreError> {
        let captain = sqlx::query_as(
            r#"
            UPDATE captains
            SET latitude = $2, longitude = $3, location_updated_at = $4, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(location.lat)
        .bind(location.lng)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(captain)
    }

    async fn nearby_captains(
        &self,
        point: GeoPoint,
        radius_meters: f64,
        limit: usize,
    ) -> Result<Vec<NearbyCaptain>, StoreError> {
        // Bounding box first so the partial location index can be used.
        let lat_delta = radius_meters / METERS_PER_DEGREE;
        let cos_lat = point.lat.to_radians().cos().abs();
        let lng_delta = if cos_lat < 1e-6 {
            180.0
        } else {
            (radius_meters / (METERS_PER_DEGREE * cos_lat)).min(180.0)
        };

        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT c.*, {CAPTAIN_DISTANCE_SQL} AS distance_meters
                FROM captains c
                WHERE c.status = 'available'
                  AND c.latitude BETWEEN $3 AND $4
                  AND c.longitude BETWEEN $5 AND $6
            ) nearby
            WHERE distance_meters <= $7
            ORDER BY distance_meters ASC
            LIMIT $8
            "#
        );

        let rows: Vec<NearbyCaptainRow> = sqlx::query_as(&sql)
            .bind(point.lat)
            .bind(point.lng)
            .bind(point.lat - lat_delta)
            .bind(point.lat + lat_delta)
            .bind(point.lng - lng_delta)
            .bind(point.lng + lng_delta)
            .bind(radius_meters)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| NearbyCaptain {
                captain: row.captain,
                distance_meters: row.distance_meters,
            })
            .collect())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn append(
        &self,
        notification: &Notification,
        retention: usize,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO notifications (id, party_id, party_role, event_type, message, payload, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.party_id)
        .bind(notification.party_role)
        .bind(&notification.event_type)
        .bind(&notification.message)
        .bind(&notification.payload)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE party_id = $1 AND id NOT IN (
                SELECT id FROM notifications
                WHERE party_id = $1
                ORDER BY created_at DESC
                LIMIT $2
            )
            "#,
        )
        .bind(notification.party_id)
        .bind(retention.max(1) as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn unread(&self, party_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let notifications = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE party_id = $1 AND read = FALSE
            ORDER BY created_at ASC
            "#,
        )
        .bind(party_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    async fn mark_read(&self, party_id: Uuid, notification_id: Uuid) -> Result<bool, StoreError> {
        let rows_affected =
            sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND party_id = $2")
                .bind(notification_id)
                .bind(party_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(rows_affected > 0)
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn revoke(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO blacklisted_tokens (token_hash, created_at)
            VALUES ($1, $2)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(token_hash)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_revoked(&self, token_hash: &str) -> Result<bool, StoreError> {
        let revoked: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM blacklisted_tokens WHERE token_hash = $1)",
        )
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(revoked)
    }

    async fn purge_revoked_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let purged = sqlx::query("DELETE FROM blacklisted_tokens WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(purged)
    }
}
