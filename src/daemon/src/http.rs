//! The read-only debug HTTP surface (§6), grounded in the teacher's
//! `tracer_daemon::app::get_app` (an `axum::Router` over a cloned
//! `AppState`, one route per concern, JSON bodies).

use crate::metrics_sink::PrometheusMetricsSink;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use lumina_common::model::{InstanceType, OperatingSystem, Region, SpRateValue, Tenancy};
use lumina_engine::cache::build_sp_rate_key;
use lumina_engine::{Ec2Cache, PricingCache, RispCache};
use prometheus::Encoder;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    ec2_cache: Arc<Ec2Cache>,
    risp_cache: Arc<RispCache>,
    pricing_cache: Arc<PricingCache>,
    metrics: Arc<PrometheusMetricsSink>,
}

pub fn get_app(
    ec2_cache: Arc<Ec2Cache>,
    risp_cache: Arc<RispCache>,
    pricing_cache: Arc<PricingCache>,
    metrics: Arc<PrometheusMetricsSink>,
) -> Router {
    let state = AppState {
        ec2_cache,
        risp_cache,
        pricing_cache,
        metrics,
    };

    Router::new()
        .route("/debug/cache/ec2", get(ec2))
        .route("/debug/cache/risp", get(risp))
        .route("/debug/cache/pricing/ondemand", get(pricing_ondemand))
        .route("/debug/cache/pricing/sp", get(pricing_sp))
        .route("/debug/cache/pricing/sp/lookup", get(pricing_sp_lookup))
        .route("/debug/cache/pricing/spot", get(pricing_spot))
        .route("/debug/cache/stats", get(stats))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn ec2(State(state): State<AppState>) -> impl IntoResponse {
    let instances = state.ec2_cache.get_all_instances().await;
    Json(instances)
}

async fn risp(State(state): State<AppState>) -> impl IntoResponse {
    let reserved_instances = state.risp_cache.get_all_reserved_instances().await;
    let savings_plans = state.risp_cache.get_all_savings_plans().await;
    Json(json!({
        "reserved_instances": reserved_instances,
        "savings_plans": savings_plans,
    }))
}

async fn pricing_ondemand(State(state): State<AppState>) -> impl IntoResponse {
    let table = state.pricing_cache.get_all_on_demand_prices().await;
    let entries: Vec<_> = table
        .into_iter()
        .map(|((region, instance_type, os), rate)| {
            json!({
                "region": region,
                "instance_type": instance_type.0,
                "os": os.as_lowercase(),
                "rate": rate,
            })
        })
        .collect();
    Json(entries)
}

#[derive(Deserialize)]
struct SpQuery {
    sp: Option<String>,
}

async fn pricing_sp(State(state): State<AppState>, Query(query): Query<SpQuery>) -> impl IntoResponse {
    let Some(sp_arn) = query.sp else {
        return Json(serde_json::Value::Array(vec![])).into_response();
    };

    let entries: Vec<_> = state
        .pricing_cache
        .get_all_sp_rates_for(&sp_arn)
        .await
        .into_iter()
        .map(|(key, value)| {
            let rate = match value {
                SpRateValue::Rate(r) => json!(r),
                SpRateValue::NotAvailable => json!(null),
            };
            json!({ "key": key, "rate": rate })
        })
        .collect();

    Json(entries).into_response()
}

#[derive(Deserialize)]
struct SpLookupQuery {
    instance_type: String,
    region: String,
    tenancy: String,
    os: String,
    sp: String,
}

async fn pricing_sp_lookup(
    State(state): State<AppState>,
    Query(query): Query<SpLookupQuery>,
) -> impl IntoResponse {
    let Some(tenancy) = parse_tenancy(&query.tenancy) else {
        return (StatusCode::BAD_REQUEST, "invalid tenancy").into_response();
    };
    let Some(os) = OperatingSystem::parse(&query.os) else {
        return (StatusCode::BAD_REQUEST, "invalid os").into_response();
    };

    let instance_type = InstanceType::from(query.instance_type.as_str());
    let region: Region = query.region.clone();
    let key = build_sp_rate_key(&query.sp, &instance_type, &region, tenancy, os);
    let rate = state.pricing_cache.get_sp_rate(&key).await;

    Json(json!({ "key": key, "rate": rate })).into_response()
}

fn parse_tenancy(s: &str) -> Option<Tenancy> {
    match s.to_lowercase().as_str() {
        "default" => Some(Tenancy::Default),
        "dedicated" => Some(Tenancy::Dedicated),
        "host" => Some(Tenancy::Host),
        _ => None,
    }
}

async fn pricing_spot(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.pricing_cache.get_all_spot_prices_with_timestamps().await;
    Json(entries)
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let instance_count = state.ec2_cache.get_all_instances().await.len();
    let (risp_stats, risp_last_update) = state.risp_cache.get_stats().await;
    Json(json!({
        "instance_count": instance_count,
        "reserved_instance_count": risp_stats.reserved_instance_count,
        "savings_plan_count": risp_stats.savings_plan_count,
        "last_ec2_update": state.ec2_cache.get_last_update_time().await,
        "last_risp_update": risp_last_update,
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = prometheus::TextEncoder::new();
    let mut buf = Vec::new();
    if encoder.encode(&state.metrics.registry().gather(), &mut buf).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buf,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn empty_app() -> Router {
        get_app(
            Arc::new(Ec2Cache::new()),
            Arc::new(RispCache::new()),
            Arc::new(PricingCache::new()),
            Arc::new(PrometheusMetricsSink::new()),
        )
    }

    #[tokio::test]
    async fn ec2_route_returns_empty_array_when_cache_is_empty() {
        let app = empty_app();
        let response = app
            .oneshot(Request::builder().uri("/debug/cache/ec2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn post_to_debug_route_is_method_not_allowed() {
        let app = empty_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/debug/cache/ec2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn metrics_route_exposes_prometheus_text_format() {
        let app = empty_app();
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
