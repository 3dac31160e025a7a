//! HTTP surface for the coupon service

use axum::{extract::{Path, State}, http::StatusCode, routing::{get, post}, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::domain::aggregates::{Coupon, CouponAnalytics, CouponState, NewCoupon, UpdateCoupon};
use crate::domain::events::OrderLifecycleEvent;
use crate::services::{ApplyRequest, CouponService, Validation};
use crate::CouponError;

#[derive(Clone)] pub struct AppState { pub coupons: CouponService }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-coupons"})) }))
        .route("/api/v1/coupons", post(create_coupon))
        .route("/api/v1/coupons/validate", post(validate_coupon))
        .route("/api/v1/coupons/apply", post(apply_coupon))
        .route("/api/v1/coupons/:code", get(get_coupon).patch(update_coupon))
        .route("/api/v1/coupons/:code/recalculate", post(recalculate_coupon))
        .route("/api/v1/orders/events", post(order_event))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

type ApiError = (StatusCode, String);

fn api_error(e: CouponError) -> ApiError {
    let status = match e {
        CouponError::CouponNotFound => StatusCode::NOT_FOUND,
        CouponError::DuplicateCode => StatusCode::CONFLICT,
        CouponError::InvalidCoupon(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[derive(Debug, Deserialize)] #[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest { pub code: String, pub amount: Decimal, pub email: Option<String> }

#[derive(Debug, Serialize, Deserialize)] pub struct ValidateCouponResponse { pub discount: Decimal, pub message: String }

/// Always 200: rejections come back as `discount = 0` plus a message for the checkout form.
async fn validate_coupon(State(s): State<AppState>, Json(r): Json<ValidateCouponRequest>) -> Json<ValidateCouponResponse> {
    let outcome = s.coupons.validate_coupon(&r.code, r.amount, r.email.as_deref()).await;
    let message = match &outcome {
        Validation::Approved { discount, .. } => format!("Coupon applied: {discount} off."),
        Validation::Rejected(reason) => reason.to_string(),
    };
    Json(ValidateCouponResponse { discount: outcome.discount(), message })
}

#[derive(Debug, Deserialize)] #[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest { pub code: String, pub amount: Decimal, pub email: Option<String>, pub order_id: Option<String> }

#[derive(Debug, Serialize)] pub struct ApplyCouponResponse { pub discount: Decimal, pub coupon: Option<Coupon>, pub error: Option<String> }

async fn apply_coupon(State(s): State<AppState>, Json(r): Json<ApplyCouponRequest>) -> Json<ApplyCouponResponse> {
    let request = ApplyRequest { code: r.code, amount: r.amount, email: r.email, order_id: r.order_id };
    let (discount, coupon, rejection) = s.coupons.apply_coupon(request).await.into_parts();
    Json(ApplyCouponResponse { discount, coupon, error: rejection.map(|r| r.to_string()) })
}

async fn recalculate_coupon(State(s): State<AppState>, Path(code): Path<String>) -> Result<Json<CouponAnalytics>, ApiError> {
    s.coupons.recalculate_coupon_analytics(&code).await.map(Json).map_err(api_error)
}

#[derive(Debug, Serialize)] pub struct CouponStatusResponse { pub coupon: Coupon, pub state: CouponState }

async fn get_coupon(State(s): State<AppState>, Path(code): Path<String>) -> Result<Json<CouponStatusResponse>, ApiError> {
    let (coupon, state) = s.coupons.coupon_status(&code).await.map_err(api_error)?;
    Ok(Json(CouponStatusResponse { coupon, state }))
}

async fn create_coupon(State(s): State<AppState>, Json(r): Json<NewCoupon>) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    let c = s.coupons.create_coupon(r).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(c)))
}

async fn update_coupon(State(s): State<AppState>, Path(code): Path<String>, Json(r): Json<UpdateCoupon>) -> Result<Json<Coupon>, ApiError> {
    s.coupons.update_coupon(&code, r).await.map(Json).map_err(api_error)
}

#[derive(Debug, Serialize)] pub struct OrderEventResponse { pub recalculated: Option<CouponAnalytics> }

async fn order_event(State(s): State<AppState>, Json(event): Json<OrderLifecycleEvent>) -> Result<Json<OrderEventResponse>, ApiError> {
    let recalculated = s.coupons.handle_order_event(&event).await.map_err(api_error)?;
    Ok(Json(OrderEventResponse { recalculated }))
}
