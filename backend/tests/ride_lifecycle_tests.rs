//! Ride lifecycle tests against the in-memory store

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use uuid::Uuid;

    use ridehail_server::config::Config;
    use ridehail_server::geocoding::{Geocoder, GeocodingError, PlaceSuggestion};
    use ridehail_server::models::{
        CaptainStatus, GeoPoint, PartyRole, Place, RegisterCaptainRequest, RegisterRiderRequest,
        VehicleRequest, VehicleType,
    };
    use ridehail_server::ride::{
        CancellationReason, CancelledBy, Measure, RideError, RideStatus, RouteMetrics,
    };
    use ridehail_server::state::AppState;
    use ridehail_server::store::{MemoryStore, PartyStore, Persistence};
    use ridehail_server::websocket::ServerMessage;

    /// 6 km / 18 min for any pair of points
    struct FixedRoute;

    #[async_trait]
    impl Geocoder for FixedRoute {
        async fn coordinates(&self, _address: &str) -> Result<GeoPoint, GeocodingError> {
            Ok(pickup_point())
        }

        async fn route_metrics(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
        ) -> Result<RouteMetrics, GeocodingError> {
            Ok(RouteMetrics {
                distance: Measure::meters(6000.0),
                duration: Measure::seconds(1080.0),
            })
        }

        async fn autocomplete(&self, _input: &str) -> Result<Vec<PlaceSuggestion>, GeocodingError> {
            Ok(Vec::new())
        }
    }

    struct NoRoute;

    #[async_trait]
    impl Geocoder for NoRoute {
        async fn coordinates(&self, address: &str) -> Result<GeoPoint, GeocodingError> {
            Err(GeocodingError::NotFound(address.to_string()))
        }

        async fn route_metrics(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
        ) -> Result<RouteMetrics, GeocodingError> {
            Err(GeocodingError::NotFound("no route".to_string()))
        }

        async fn autocomplete(&self, _input: &str) -> Result<Vec<PlaceSuggestion>, GeocodingError> {
            Ok(Vec::new())
        }
    }

    /// Never answers within any sane timeout
    struct StalledRoute;

    #[async_trait]
    impl Geocoder for StalledRoute {
        async fn coordinates(&self, _address: &str) -> Result<GeoPoint, GeocodingError> {
            Ok(pickup_point())
        }

        async fn route_metrics(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
        ) -> Result<RouteMetrics, GeocodingError> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Err(GeocodingError::Timeout)
        }

        async fn autocomplete(&self, _input: &str) -> Result<Vec<PlaceSuggestion>, GeocodingError> {
            Ok(Vec::new())
        }
    }

    fn pickup_point() -> GeoPoint {
        GeoPoint::new(12.9716, 77.5946)
    }

    fn pickup() -> Place {
        Place {
            address: "MG Road, Bengaluru".to_string(),
            location: pickup_point(),
        }
    }

    fn destination() -> Place {
        Place {
            address: "Indiranagar, Bengaluru".to_string(),
            location: GeoPoint::new(12.9784, 77.6408),
        }
    }

    fn test_config() -> Config {
        Config {
            bcrypt_cost: 4,
            ..Config::default()
        }
    }

    struct Harness {
        state: AppState,
        store: MemoryStore,
    }

    fn harness_with(config: Config, geocoder: Arc<dyn Geocoder>) -> Harness {
        let store = MemoryStore::new();
        let state = AppState::build(Persistence::from_memory(store.clone()), geocoder, &config)
            .expect("valid config");
        Harness { state, store }
    }

    fn harness() -> Harness {
        harness_with(test_config(), Arc::new(FixedRoute))
    }

    impl Harness {
        async fn rider(&self) -> Uuid {
            let email = format!("rider-{}@example.com", Uuid::new_v4());
            self.state
                .auth_service
                .register_rider(RegisterRiderRequest {
                    first_name: "Asha".to_string(),
                    last_name: "Menon".to_string(),
                    email,
                    phone: Some("+919800000001".to_string()),
                    password: "Secret123".to_string(),
                })
                .await
                .expect("rider registration")
                .party_id
        }

        /// Registered, online and parked `offset` degrees north of the pickup.
        async fn captain_near_pickup(&self, offset: f64) -> Uuid {
            let email = format!("captain-{}@example.com", Uuid::new_v4());
            let id = self
                .state
                .auth_service
                .register_captain(RegisterCaptainRequest {
                    first_name: "Ravi".to_string(),
                    last_name: "Kumar".to_string(),
                    email,
                    phone: Some("+919800000002".to_string()),
                    password: "Secret123".to_string(),
                    vehicle: VehicleRequest {
                        vehicle_type: VehicleType::Standard,
                        model: "Swift".to_string(),
                        plate: "ka01ab1234".to_string(),
                        color: "White".to_string(),
                        capacity: 4,
                        year: 2021,
                    },
                })
                .await
                .expect("captain registration")
                .party_id;

            let captains = &self.state.captain_service;
            captains
                .set_availability(id, CaptainStatus::Available)
                .await
                .unwrap();
            captains
                .update_position(
                    id,
                    GeoPoint::new(pickup_point().lat + offset, pickup_point().lng),
                )
                .await
                .unwrap();
            id
        }

        async fn captain_status(&self, id: Uuid) -> CaptainStatus {
            self.store.captain_by_id(id).await.unwrap().unwrap().status
        }

        async fn unread_types(&self, party_id: Uuid) -> Vec<String> {
            self.state
                .notification_service
                .unread(party_id)
                .await
                .unwrap()
                .into_iter()
                .map(|n| n.event_type)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_full_ride_lifecycle() {
        let h = harness();
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        assert_eq!(created.ride.status, RideStatus::Pending);
        assert_eq!(created.ride.fare.amount, 176.0);
        assert_eq!(created.ride.fare.currency, "INR");
        assert_eq!(created.otp.code.len(), 6);
        assert_eq!(created.candidates.len(), 1);
        assert_eq!(created.candidates[0].captain_id, captain);
        assert_eq!(h.unread_types(captain).await, vec!["NEW_RIDE_REQUEST"]);

        let ride_id = created.ride.id;

        let accepted = rides.accept_ride(ride_id, captain).await.unwrap();
        assert_eq!(accepted.status, RideStatus::Confirmed);
        assert_eq!(accepted.captain_id, Some(captain));
        assert!(accepted.tracking.estimated_arrival.is_some());
        assert_eq!(h.captain_status(captain).await, CaptainStatus::Busy);

        let started = rides
            .start_ride(ride_id, captain, &created.otp.code)
            .await
            .unwrap();
        assert_eq!(started.status, RideStatus::Started);
        assert!(started.otp.verified);
        assert!(started.tracking.actual_departure.is_some());

        let completed = rides.complete_ride(ride_id, captain).await.unwrap();
        assert_eq!(completed.status, RideStatus::Completed);
        assert!(completed.tracking.actual_arrival.is_some());
        assert_eq!(
            completed.tracking.actual_arrival,
            completed.tracking.actual_completion
        );
        assert_eq!(h.captain_status(captain).await, CaptainStatus::Available);

        rides
            .rate_ride(ride_id, rider, 5, Some("Smooth ride".to_string()), false)
            .await
            .unwrap();
        let rated = rides.rate_ride(ride_id, captain, 4, None, true).await.unwrap();
        assert_eq!(rated.rider_rating.as_ref().map(|r| r.value), Some(5));
        assert_eq!(rated.captain_rating.as_ref().map(|r| r.value), Some(4));

        let captain_record = h.store.captain_by_id(captain).await.unwrap().unwrap();
        assert_eq!(captain_record.rating, Some(5.0));
        let rider_record = h.store.rider_by_id(rider).await.unwrap().unwrap();
        assert_eq!(rider_record.rating, Some(4.0));

        assert_eq!(
            h.unread_types(rider).await,
            vec!["RIDE_CONFIRMED", "RIDE_STARTED", "RIDE_COMPLETED", "RIDE_RATED"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_accept_has_one_winner() {
        let h = harness();
        let rider = h.rider().await;
        let first = h.captain_near_pickup(0.01).await;
        let second = h.captain_near_pickup(0.02).await;
        let rides = h.state.ride_service.clone();

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        assert_eq!(created.candidates.len(), 2);
        // Nearest first
        assert_eq!(created.candidates[0].captain_id, first);

        let ride_id = created.ride.id;
        let (a, b) = tokio::join!(
            rides.accept_ride(ride_id, first),
            rides.accept_ride(ride_id, second)
        );

        let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(RideError::RideNotAvailable)));

        let statuses = [h.captain_status(first).await, h.captain_status(second).await];
        assert_eq!(
            statuses.iter().filter(|s| **s == CaptainStatus::Busy).count(),
            1
        );
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == CaptainStatus::Available)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_one_active_ride_per_rider() {
        let h = harness();
        let rider = h.rider().await;
        let rides = &h.state.ride_service;

        rides
            .create_ride(rider, pickup(), destination(), VehicleType::Comfort)
            .await
            .unwrap();
        let second = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Comfort)
            .await;
        assert!(matches!(second, Err(RideError::ActiveRideExists)));
    }

    #[tokio::test]
    async fn test_request_without_nearby_captains() {
        let h = harness();
        let rider = h.rider().await;
        // Well outside the 5 km search radius
        let far_captain = h.captain_near_pickup(0.5).await;

        let created = h
            .state
            .ride_service
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        assert!(created.candidates.is_empty());
        assert_eq!(created.ride.status, RideStatus::Pending);

        // The radius limits who is told, not who may accept
        let accepted = h
            .state
            .ride_service
            .accept_ride(created.ride.id, far_captain)
            .await
            .unwrap();
        assert_eq!(accepted.captain_id, Some(far_captain));
    }

    #[tokio::test]
    async fn test_no_route_writes_nothing() {
        let h = harness_with(test_config(), Arc::new(NoRoute));
        let rider = h.rider().await;
        let rides = &h.state.ride_service;

        let result = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await;
        assert!(matches!(result, Err(RideError::RouteUnavailable)));
        assert!(rides.rider_active_ride(rider).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_route_timeout_writes_nothing() {
        let config = Config {
            geocoding_timeout_ms: 50,
            ..test_config()
        };
        let h = harness_with(config, Arc::new(StalledRoute));
        let rider = h.rider().await;
        let rides = &h.state.ride_service;

        let result = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await;
        assert!(matches!(result, Err(RideError::Upstream(_))));
        assert!(rides.rider_active_ride(rider).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_racing_accept_still_cancels() {
        let h = harness();
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = h.state.ride_service.clone();

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        let ride_id = created.ride.id;

        let (accepted, cancelled) = tokio::join!(
            rides.accept_ride(ride_id, captain),
            rides.cancel_ride(ride_id, rider, CancellationReason::ChangedPlans, None)
        );

        // Whichever order the store saw, the rider's cancel wins out
        let cancelled = cancelled.unwrap();
        assert_eq!(cancelled.status, RideStatus::Cancelled);
        match accepted {
            Ok(_) => assert_eq!(cancelled.captain_id, Some(captain)),
            Err(e) => assert!(matches!(e, RideError::RideNotAvailable), "{:?}", e),
        }
        assert_eq!(h.captain_status(captain).await, CaptainStatus::Available);
    }

    #[tokio::test]
    async fn test_wrong_otp_keeps_ride_confirmed() {
        let h = harness();
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        rides.accept_ride(created.ride.id, captain).await.unwrap();

        let wrong = if created.otp.code == "000000" {
            "111111"
        } else {
            "000000"
        };
        let result = rides.start_ride(created.ride.id, captain, wrong).await;
        assert!(matches!(result, Err(RideError::InvalidOtp)));

        let view = rides.get_ride(created.ride.id, rider).await.unwrap();
        assert_eq!(view.ride.status, RideStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_expired_otp_rejected() {
        let config = Config {
            otp_ttl_minutes: -1,
            ..test_config()
        };
        let h = harness_with(config, Arc::new(FixedRoute));
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        rides.accept_ride(created.ride.id, captain).await.unwrap();

        let result = rides
            .start_ride(created.ride.id, captain, &created.otp.code)
            .await;
        assert!(matches!(result, Err(RideError::InvalidOtp)));
    }

    #[tokio::test]
    async fn test_only_assigned_captain_can_start() {
        let h = harness();
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let other = h.captain_near_pickup(0.02).await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        rides.accept_ride(created.ride.id, captain).await.unwrap();

        let result = rides
            .start_ride(created.ride.id, other, &created.otp.code)
            .await;
        assert!(matches!(result, Err(RideError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_cancel_after_accept_frees_captain() {
        let h = harness();
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        rides.accept_ride(created.ride.id, captain).await.unwrap();

        let cancelled = rides
            .cancel_ride(
                created.ride.id,
                rider,
                CancellationReason::ChangedPlans,
                Some("Plans changed".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, RideStatus::Cancelled);
        let cancellation = cancelled.cancellation.unwrap();
        assert_eq!(cancellation.cancelled_by, CancelledBy::Rider);
        assert_eq!(cancellation.reason, CancellationReason::ChangedPlans);

        assert_eq!(h.captain_status(captain).await, CaptainStatus::Available);
        assert_eq!(
            h.unread_types(captain).await,
            vec!["NEW_RIDE_REQUEST", "RIDE_CANCELLED"]
        );

        // The rider is free to book again
        rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_started_ride_cannot_be_cancelled() {
        let h = harness();
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        rides.accept_ride(created.ride.id, captain).await.unwrap();
        rides
            .start_ride(created.ride.id, captain, &created.otp.code)
            .await
            .unwrap();

        let result = rides
            .cancel_ride(created.ride.id, rider, CancellationReason::Other, None)
            .await;
        assert!(matches!(result, Err(RideError::NotCancellable)));
    }

    #[tokio::test]
    async fn test_stranger_cannot_cancel_or_read() {
        let h = harness();
        let rider = h.rider().await;
        let stranger = h.rider().await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();

        let cancel = rides
            .cancel_ride(created.ride.id, stranger, CancellationReason::Other, None)
            .await;
        assert!(matches!(cancel, Err(RideError::Unauthorized(_))));

        let read = rides.get_ride(created.ride.id, stranger).await;
        assert!(matches!(read, Err(RideError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_rating_rules() {
        let h = harness();
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        let ride_id = created.ride.id;

        // Not completed yet
        let early = rides.rate_ride(ride_id, rider, 5, None, false).await;
        assert!(matches!(early, Err(RideError::InvalidTransition { .. })));

        rides.accept_ride(ride_id, captain).await.unwrap();
        rides
            .start_ride(ride_id, captain, &created.otp.code)
            .await
            .unwrap();
        rides.complete_ride(ride_id, captain).await.unwrap();

        // Captain trying to write the rider's slot
        let wrong_slot = rides.rate_ride(ride_id, captain, 5, None, false).await;
        assert!(matches!(wrong_slot, Err(RideError::Unauthorized(_))));

        rides.rate_ride(ride_id, rider, 3, None, false).await.unwrap();
        let twice = rides.rate_ride(ride_id, rider, 4, None, false).await;
        assert!(matches!(twice, Err(RideError::AlreadyRated)));
    }

    #[tokio::test]
    async fn test_views_and_history() {
        let h = harness();
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        rides.accept_ride(created.ride.id, captain).await.unwrap();

        let rider_view = rides.get_ride(created.ride.id, rider).await.unwrap();
        assert_eq!(
            rider_view.otp.as_ref().map(|otp| otp.code.clone()),
            Some(created.otp.code.clone())
        );
        let captain_view = rides.get_ride(created.ride.id, captain).await.unwrap();
        assert!(captain_view.otp.is_none());

        let serialized = serde_json::to_value(&captain_view).unwrap();
        assert!(serialized.get("otp").is_none());

        let active = rides.captain_active_ride(captain).await.unwrap().unwrap();
        assert_eq!(active.ride.id, created.ride.id);

        let history = rides
            .rider_history(rider, Some(RideStatus::Confirmed), 1, 10)
            .await
            .unwrap();
        assert_eq!(history.total, 1);
        let none = rides
            .rider_history(rider, Some(RideStatus::Completed), 1, 10)
            .await
            .unwrap();
        assert_eq!(none.total, 0);
    }

    #[tokio::test]
    async fn test_live_push_and_location_updates() {
        let h = harness();
        let rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = &h.state.ride_service;

        let created = rides
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();

        let (_connection, mut inbox) = h.state.ws_state.connect(rider).await;

        rides.accept_ride(created.ride.id, captain).await.unwrap();
        match inbox.recv().await {
            Some(ServerMessage::Notification { notification }) => {
                assert_eq!(notification.event_type, "RIDE_CONFIRMED");
                assert_eq!(notification.party_role, PartyRole::Rider);
                assert!(notification.message.contains("Ravi Kumar"));
            }
            other => panic!("expected a notification, got {:?}", other),
        }

        let moved = GeoPoint::new(12.975, 77.6);
        let ride = rides
            .update_captain_location(created.ride.id, captain, moved)
            .await
            .unwrap();
        assert_eq!(ride.tracking.captain_location, Some(moved));

        match inbox.recv().await {
            Some(ServerMessage::Notification { notification }) => {
                assert_eq!(notification.event_type, "CAPTAIN_LOCATION_UPDATE");
            }
            other => panic!("expected a location update, got {:?}", other),
        }

        let captain_record = h.store.captain_by_id(captain).await.unwrap().unwrap();
        assert_eq!(captain_record.location(), Some(moved));
    }

    #[tokio::test]
    async fn test_busy_captain_cannot_accept_second_ride() {
        let h = harness();
        let first_rider = h.rider().await;
        let second_rider = h.rider().await;
        let captain = h.captain_near_pickup(0.01).await;
        let rides = &h.state.ride_service;

        let first = rides
            .create_ride(first_rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        let second = rides
            .create_ride(second_rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();

        rides.accept_ride(first.ride.id, captain).await.unwrap();
        let result = rides.accept_ride(second.ride.id, captain).await;
        assert!(matches!(result, Err(RideError::CaptainUnavailable)));
    }

    #[tokio::test]
    #[ignore] // Requires TEST_DATABASE_URL
    async fn test_postgres_lifecycle() {
        let database_url =
            std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        let pool = ridehail_server::db::create_pool(&database_url, 2)
            .await
            .unwrap();
        ridehail_server::db::run_migrations(&pool).await.unwrap();

        let state = AppState::build(Persistence::postgres(pool), Arc::new(FixedRoute), &test_config())
            .unwrap();
        let rider = state
            .auth_service
            .register_rider(RegisterRiderRequest {
                first_name: "Asha".to_string(),
                last_name: "Menon".to_string(),
                email: format!("pg-{}@example.com", Uuid::new_v4()),
                phone: None,
                password: "Secret123".to_string(),
            })
            .await
            .unwrap()
            .party_id;

        let created = state
            .ride_service
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await
            .unwrap();
        assert_eq!(created.ride.fare.amount, 176.0);

        let second = state
            .ride_service
            .create_ride(rider, pickup(), destination(), VehicleType::Standard)
            .await;
        assert!(matches!(second, Err(RideError::ActiveRideExists)));

        state
            .ride_service
            .cancel_ride(created.ride.id, rider, CancellationReason::ChangedPlans, None)
            .await
            .unwrap();
    }
}
