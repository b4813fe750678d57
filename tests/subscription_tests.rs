mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;
use uuid::Uuid;

use billing_rs::models::{
    BillingCycle, ItemStatus, RepeatInterval, SubscriptionStatus, Tier, TransactionStatus,
};

async fn post(app: &Router, uri: String, body: &str) -> axum::http::Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(app: &Router, uri: String) -> axum::http::Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_get_subscription_not_found() {
    let (app, _store) = common::app();
    let response = get(
        &app,
        format!("/api/billing/users/{}/subscription", Uuid::new_v4()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_subscription_returns_row() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Active,
        BillingCycle::Monthly,
    )
    .await;
    let response = get(
        &app,
        format!("/api/billing/users/{}/subscription", sub.user_id),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["tier"], "premium");
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn test_pause_and_resume() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Active,
        BillingCycle::Monthly,
    )
    .await;

    let response = post(
        &app,
        format!("/api/billing/users/{}/subscription/pause", sub.user_id),
        "",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_json(response).await["status"], "paused");

    let response = post(
        &app,
        format!("/api/billing/users/{}/subscription/resume", sub.user_id),
        "",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["status"], "active");

    // Resume opens a fresh billing period.
    let resumed = store.subscription(sub.id).await.unwrap().unwrap();
    assert!(resumed.current_period_start.unwrap() > sub.current_period_start.unwrap());
    assert!(resumed.current_period_end.unwrap() > resumed.current_period_start.unwrap());
}

#[tokio::test]
async fn test_pause_canceled_subscription_conflicts() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Canceled,
        BillingCycle::Monthly,
    )
    .await;
    let response = post(
        &app,
        format!("/api/billing/users/{}/subscription/pause", sub.user_id),
        "",
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn test_cancel_at_period_end_keeps_entitlement() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Active,
        BillingCycle::Monthly,
    )
    .await;
    let response = post(
        &app,
        format!("/api/billing/users/{}/subscription/cancel", sub.user_id),
        r#"{"reason": "too expensive"}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = store.subscription(sub.id).await.unwrap().unwrap();
    assert_eq!(updated.status, SubscriptionStatus::Active);
    assert_eq!(updated.tier, Tier::Premium);
    assert!(updated.cancel_at_period_end);
    assert_eq!(updated.cancel_reason.as_deref(), Some("too expensive"));
}

#[tokio::test]
async fn test_cancel_immediately_revokes() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Active,
        BillingCycle::Monthly,
    )
    .await;
    let response = post(
        &app,
        format!("/api/billing/users/{}/subscription/cancel", sub.user_id),
        r#"{"at_period_end": false}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = store.subscription(sub.id).await.unwrap().unwrap();
    assert_eq!(updated.status, SubscriptionStatus::Canceled);
    assert_eq!(updated.tier, Tier::Free);
    assert!(updated.provider_subscription_ref.is_none());
    assert!(updated.canceled_at.is_some());
}

#[tokio::test]
async fn test_cancel_free_tier_rejected() {
    let (app, store) = common::app();
    let sub = common::seed_free_subscription(store.as_ref()).await;
    let response = post(
        &app,
        format!("/api/billing/users/{}/subscription/cancel", sub.user_id),
        "{}",
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_switch_cycle_reports_prorated_credit() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Active,
        BillingCycle::Monthly,
    )
    .await;

    let response = post(
        &app,
        format!(
            "/api/billing/users/{}/subscription/switch-cycle",
            sub.user_id
        ),
        r#"{"new_cycle": "annual"}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["new_cycle"], "annual");
    assert_eq!(body["currency"], "USD");

    // Period is 30 days with 20 unused; credit is a strict fraction of the
    // monthly price.
    let credit = body["credit_minor"].as_i64().unwrap();
    assert!(credit > 0 && credit < common::MONTHLY_PRICE_MINOR);

    let updated = store.subscription(sub.id).await.unwrap().unwrap();
    assert_eq!(updated.billing_cycle, BillingCycle::Annual);
}

#[tokio::test]
async fn test_switch_cycle_rejects_noop_and_invalid_targets() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Active,
        BillingCycle::Monthly,
    )
    .await;

    let same = post(
        &app,
        format!(
            "/api/billing/users/{}/subscription/switch-cycle",
            sub.user_id
        ),
        r#"{"new_cycle": "monthly"}"#,
    )
    .await;
    assert_eq!(same.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let none = post(
        &app,
        format!(
            "/api/billing/users/{}/subscription/switch-cycle",
            sub.user_id
        ),
        r#"{"new_cycle": "none"}"#,
    )
    .await;
    assert_eq!(none.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_switch_cycle_requires_active_subscription() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Paused,
        BillingCycle::Monthly,
    )
    .await;
    let response = post(
        &app,
        format!(
            "/api/billing/users/{}/subscription/switch-cycle",
            sub.user_id
        ),
        r#"{"new_cycle": "annual"}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_can_add_item_free_tier_limit() {
    let (app, store) = common::app();
    let sub = common::seed_free_subscription(store.as_ref()).await;

    let response = get(
        &app,
        format!("/api/billing/users/{}/can-add-item", sub.user_id),
    )
    .await;
    let body = common::body_json(response).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["current_count"], 0);
    assert_eq!(body["limit"], common::FREE_TIER_ITEM_LIMIT);

    for i in 0..common::FREE_TIER_ITEM_LIMIT {
        common::seed_item(
            store.as_ref(),
            sub.user_id,
            &format!("item-{i}"),
            RepeatInterval::Monthly,
            Some(common::date(2026, 9, 1)),
            ItemStatus::Active,
        )
        .await;
    }
    // Canceled items do not count against the cap.
    common::seed_item(
        store.as_ref(),
        sub.user_id,
        "canceled",
        RepeatInterval::Monthly,
        Some(common::date(2026, 9, 1)),
        ItemStatus::Canceled,
    )
    .await;

    let response = get(
        &app,
        format!("/api/billing/users/{}/can-add-item", sub.user_id),
    )
    .await;
    let body = common::body_json(response).await;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["current_count"], common::FREE_TIER_ITEM_LIMIT);
}

#[tokio::test]
async fn test_can_add_item_premium_unlimited() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Active,
        BillingCycle::Monthly,
    )
    .await;
    for i in 0..10 {
        common::seed_item(
            store.as_ref(),
            sub.user_id,
            &format!("item-{i}"),
            RepeatInterval::Monthly,
            Some(common::date(2026, 9, 1)),
            ItemStatus::Active,
        )
        .await;
    }
    let response = get(
        &app,
        format!("/api/billing/users/{}/can-add-item", sub.user_id),
    )
    .await;
    let body = common::body_json(response).await;
    assert_eq!(body["allowed"], true);
    assert!(body["limit"].is_null());
}

#[tokio::test]
async fn test_refund_request_records_pending_row() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Active,
        BillingCycle::Annual,
    )
    .await;
    let response = post(
        &app,
        format!(
            "/api/billing/users/{}/subscription/refund-request",
            sub.user_id
        ),
        r#"{"reason": "accidental purchase"}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = common::body_json(response).await;
    assert_eq!(body["status"], "pending");

    let rows = store.transactions_for_subscription(sub.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransactionStatus::Pending);
    assert_eq!(rows[0].amount_minor, common::ANNUAL_PRICE_MINOR);
}

#[tokio::test]
async fn test_transactions_listed_newest_first() {
    let (app, store) = common::app();
    let sub = common::seed_premium_subscription(
        store.as_ref(),
        SubscriptionStatus::Active,
        BillingCycle::Monthly,
    )
    .await;
    for _ in 0..2 {
        post(
            &app,
            format!(
                "/api/billing/users/{}/subscription/refund-request",
                sub.user_id
            ),
            "{}",
        )
        .await;
    }
    let response = get(
        &app,
        format!("/api/billing/users/{}/transactions", sub.user_id),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0]["created_at"].as_str() >= rows[1]["created_at"].as_str());
}
