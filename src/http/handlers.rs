use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_json::{Value, json};
use tracing::info;
use ulid::Ulid;

use crate::engine::{EngineError, NewBooking, dedup_slots};
use crate::model::*;

use super::AppState;
use super::dto::*;
use super::error::{ApiError, ApiResult};

type JsonBody<T> = Result<Json<T>, JsonRejection>;
type QueryParams<T> = Result<Query<T>, QueryRejection>;
type IdParam = Result<Path<Ulid>, PathRejection>;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "durable": state.engine.is_durable() }))
}

// ── Users ────────────────────────────────────────────────

pub async fn put_user(
    State(state): State<AppState>,
    id: IdParam,
    body: JsonBody<UserBody>,
) -> ApiResult<Json<UserRecord>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let record = body.into_record(id);
    state.engine.upsert_user(record.clone()).await?;
    Ok(Json(record))
}

pub async fn get_user(State(state): State<AppState>, id: IdParam) -> ApiResult<Json<UserRecord>> {
    let Path(id) = id?;
    state
        .engine
        .get_user(id)
        .map(Json)
        .ok_or(ApiError::Engine(EngineError::NotFound(id)))
}

pub async fn delete_user(State(state): State<AppState>, id: IdParam) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.engine.remove_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Availability ─────────────────────────────────────────

pub async fn availability(
    State(state): State<AppState>,
    query: QueryParams<AvailabilityQuery>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let Query(q) = query?;
    let subject = SubjectRef {
        subject_id: q.subject_id,
        contact: q.contact,
    }
    .key()
    .ok_or_else(|| ApiError::BadRequest("subject_id or contact is required".into()))?;

    let settings = &state.settings;
    let minutes = match (q.duration, q.urgent) {
        (Some(m), _) => m,
        (None, true) => settings.urgent_slot_minutes,
        (None, false) => settings.default_slot_minutes,
    };
    let day = day_span(q.date, settings.utc_offset)?;

    let (staff_id, mut slots) = state
        .engine
        .available_slots_for_subject(&subject, day, minutes)
        .await?;
    if settings.dedup_slots {
        slots = dedup_slots(slots);
    }

    Ok(Json(AvailabilityResponse {
        staff_id,
        date: q.date,
        duration_minutes: minutes,
        slots: slots.into_iter().map(SpanBody::from).collect(),
    }))
}

pub async fn get_windows(
    State(state): State<AppState>,
    id: IdParam,
    query: QueryParams<RangeQuery>,
) -> ApiResult<Json<Vec<WindowView>>> {
    let Path(id) = id?;
    let Query(q) = query?;
    let windows = state.engine.windows_in_range(id, q.to_span()?).await?;
    Ok(Json(windows.into_iter().map(WindowView::from).collect()))
}

pub async fn put_windows(
    State(state): State<AppState>,
    id: IdParam,
    body: JsonBody<ReplaceWindowsBody>,
) -> ApiResult<Json<Vec<WindowView>>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let range = SpanBody {
        start: body.from,
        end: body.to,
    }
    .to_span()?;
    let spans = body
        .windows
        .into_iter()
        .map(SpanBody::to_span)
        .collect::<Result<Vec<_>, _>>()?;
    let windows = state.engine.replace_windows(id, range, spans).await?;
    Ok(Json(windows.into_iter().map(WindowView::from).collect()))
}

pub async fn put_busy(
    State(state): State<AppState>,
    id: IdParam,
    body: JsonBody<BusyBody>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    let Json(body) = body?;
    if state.engine.get_schedule(&id).is_none() {
        return Err(EngineError::NotFound(id).into());
    }
    let periods = body
        .periods
        .into_iter()
        .map(SpanBody::to_span)
        .collect::<Result<Vec<_>, _>>()?;
    let count = periods.len();
    state
        .calendar
        .set_busy(id, periods)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    info!(staff = %id, count, "external busy periods updated");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_bookings(
    State(state): State<AppState>,
    id: IdParam,
    query: QueryParams<RangeQuery>,
) -> ApiResult<Json<Vec<BookingView>>> {
    let Path(id) = id?;
    let Query(q) = query?;
    let bookings = state.engine.bookings_in_range(id, q.to_span()?).await?;
    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}

pub async fn get_requests(
    State(state): State<AppState>,
    id: IdParam,
) -> ApiResult<Json<Vec<BookingView>>> {
    let Path(id) = id?;
    let pending = state.engine.pending_requests(id).await?;
    Ok(Json(pending.into_iter().map(BookingView::from).collect()))
}

// ── Bookings ─────────────────────────────────────────────

pub async fn create_booking(
    State(state): State<AppState>,
    body: JsonBody<CreateBookingBody>,
) -> ApiResult<(StatusCode, Json<BookingView>)> {
    let Json(body) = body?;
    let span = SpanBody {
        start: body.start,
        end: body.end,
    }
    .to_span()?;
    let key = body.subject.key();

    let subject_id = match &key {
        Some(key) => Some(
            state
                .engine
                .find_subject(key)
                .map(|u| u.id)
                .ok_or_else(|| ApiError::NotFound(format!("unknown subject {key}")))?,
        ),
        None => None,
    };
    let resource_id = match (body.staff_id, &key) {
        (Some(staff_id), _) => staff_id,
        (None, Some(key)) => state
            .engine
            .resolve_assigned_resource(key)
            .ok_or_else(|| EngineError::NoAssignedStaff(key.to_string()))?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "staff_id, subject_id or contact is required".into(),
            ));
        }
    };

    let booking = state
        .engine
        .create_booking(NewBooking {
            id: body.id.unwrap_or_else(Ulid::new),
            resource_id,
            subject_id,
            span,
            status: body.status.unwrap_or(BookingStatus::Scheduled),
            reason: body.reason,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

pub async fn create_urgent(
    State(state): State<AppState>,
    body: JsonBody<UrgentBody>,
) -> ApiResult<(StatusCode, Json<BookingView>)> {
    let Json(body) = body?;
    let key = body
        .subject
        .key()
        .ok_or_else(|| ApiError::BadRequest("subject_id or contact is required".into()))?;
    let booking = state
        .engine
        .create_urgent_request(body.id.unwrap_or_else(Ulid::new), &key, body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

pub async fn assign_time(
    State(state): State<AppState>,
    id: IdParam,
    body: JsonBody<SpanBody>,
) -> ApiResult<Json<BookingView>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let booking = state.engine.assign_time(id, body.to_span()?).await?;
    Ok(Json(booking.into()))
}

pub async fn set_status(
    State(state): State<AppState>,
    id: IdParam,
    body: JsonBody<StatusBody>,
) -> ApiResult<Json<BookingView>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let booking = state.engine.transition_status(id, body.status).await?;
    Ok(Json(booking.into()))
}

pub async fn get_booking(
    State(state): State<AppState>,
    id: IdParam,
) -> ApiResult<Json<BookingView>> {
    let Path(id) = id?;
    state
        .engine
        .get_booking(id)
        .await
        .map(|b| Json(b.into()))
        .ok_or(ApiError::Engine(EngineError::NotFound(id)))
}
