//! Ride lifecycle HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::{AuthenticatedParty, CaptainParty, RiderParty};
use crate::error::ApiResult;
use crate::models::{
    ApiResponse, CancelRideRequest, CreateRideRequest, EstimateFareRequest, HistoryQuery,
    LocationRequest, PaginatedResponse, PartyRole, RateRideRequest, StartRideRequest,
};
use crate::ride::{CreatedRide, FareEstimate, Ride, RideView};
use crate::state::AppState;

/// POST /rides - Rider requests a ride
pub async fn create_ride(
    State(state): State<AppState>,
    RiderParty(rider): RiderParty,
    Json(req): Json<CreateRideRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<CreatedRide>>)> {
    req.validate()?;

    let created = state
        .ride_service
        .create_ride(rider.party_id, req.pickup, req.destination, req.vehicle_type)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// POST /rides/estimate - Fare quote without booking
pub async fn estimate_fare(
    State(state): State<AppState>,
    RiderParty(_rider): RiderParty,
    Json(req): Json<EstimateFareRequest>,
) -> ApiResult<Json<ApiResponse<Vec<FareEstimate>>>> {
    req.validate()?;

    let estimates = state
        .ride_service
        .estimate_fare(req.pickup, req.destination, req.vehicle_type)
        .await?;

    Ok(Json(ApiResponse::ok(estimates)))
}

/// GET /rides/active
pub async fn active_ride(
    State(state): State<AppState>,
    party: AuthenticatedParty,
) -> ApiResult<Json<ApiResponse<Option<RideView>>>> {
    let ride = match party.role {
        PartyRole::Rider => state.ride_service.rider_active_ride(party.party_id).await?,
        PartyRole::Captain => {
            state
                .ride_service
                .captain_active_ride(party.party_id)
                .await?
        }
    };
    Ok(Json(ApiResponse::ok(ride)))
}

/// GET /rides/history?status=&page=&limit=
pub async fn ride_history(
    State(state): State<AppState>,
    party: AuthenticatedParty,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<PaginatedResponse<RideView>>> {
    let (page, limit) = query.pagination().normalized();

    let rides = match party.role {
        PartyRole::Rider => {
            state
                .ride_service
                .rider_history(party.party_id, query.status, page, limit)
                .await?
        }
        PartyRole::Captain => {
            state
                .ride_service
                .captain_history(party.party_id, query.status, page, limit)
                .await?
        }
    };

    Ok(Json(PaginatedResponse {
        data: rides.items,
        total: rides.total,
        page,
        limit,
    }))
}

/// GET /rides/:id
pub async fn get_ride(
    State(state): State<AppState>,
    party: AuthenticatedParty,
    Path(ride_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<RideView>>> {
    let ride = state.ride_service.get_ride(ride_id, party.party_id).await?;
    Ok(Json(ApiResponse::ok(ride)))
}

/// POST /rides/:id/accept
pub async fn accept_ride(
    State(state): State<AppState>,
    CaptainParty(captain): CaptainParty,
    Path(ride_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Ride>>> {
    let ride = state
        .ride_service
        .accept_ride(ride_id, captain.party_id)
        .await?;
    Ok(Json(ApiResponse::ok(ride)))
}

/// POST /rides/:id/start
pub async fn start_ride(
    State(state): State<AppState>,
    CaptainParty(captain): CaptainParty,
    Path(ride_id): Path<Uuid>,
    Json(req): Json<StartRideRequest>,
) -> ApiResult<Json<ApiResponse<Ride>>> {
    req.validate()?;

    let ride = state
        .ride_service
        .start_ride(ride_id, captain.party_id, &req.otp)
        .await?;
    Ok(Json(ApiResponse::ok(ride)))
}

/// POST /rides/:id/complete
pub async fn complete_ride(
    State(state): State<AppState>,
    CaptainParty(captain): CaptainParty,
    Path(ride_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Ride>>> {
    let ride = state
        .ride_service
        .complete_ride(ride_id, captain.party_id)
        .await?;
    Ok(Json(ApiResponse::ok(ride)))
}

/// PATCH /rides/:id/location
pub async fn update_location(
    State(state): State<AppState>,
    CaptainParty(captain): CaptainParty,
    Path(ride_id): Path<Uuid>,
    Json(req): Json<LocationRequest>,
) -> ApiResult<Json<ApiResponse<Ride>>> {
    req.validate()?;

    let ride = state
        .ride_service
        .update_captain_location(ride_id, captain.party_id, req.location)
        .await?;
    Ok(Json(ApiResponse::ok(ride)))
}

/// POST /rides/:id/cancel
pub async fn cancel_ride(
    State(state): State<AppState>,
    party: AuthenticatedParty,
    Path(ride_id): Path<Uuid>,
    Json(req): Json<CancelRideRequest>,
) -> ApiResult<Json<ApiResponse<Ride>>> {
    req.validate()?;

    let ride = state
        .ride_service
        .cancel_ride(ride_id, party.party_id, req.reason, req.comment)
        .await?;
    Ok(Json(ApiResponse::ok(ride)))
}

/// POST /rides/:id/rate - Slot follows the caller's role
pub async fn rate_ride(
    State(state): State<AppState>,
    party: AuthenticatedParty,
    Path(ride_id): Path<Uuid>,
    Json(req): Json<RateRideRequest>,
) -> ApiResult<Json<ApiResponse<Ride>>> {
    req.validate()?;

    let ride = state
        .ride_service
        .rate_ride(
            ride_id,
            party.party_id,
            req.rating,
            req.comment,
            party.role == PartyRole::Captain,
        )
        .await?;
    Ok(Json(ApiResponse::ok(ride)))
}
