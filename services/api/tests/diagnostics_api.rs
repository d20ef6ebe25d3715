mod common;

use axum::http::{header, StatusCode};
use chrono::{Duration, Utc};
use common::*;
use diagnostic_core::domain::{DiagnosticStatus, SubscriptionStatus};
use diagnostic_core::quota::{REASON_LIFETIME_LIMIT, REASON_PERIOD_LIMIT};
use serde_json::{json, Value};
use uuid::Uuid;

async fn create_diagnostic(ctx: &TestContext, cookie: &str, company: &str) -> Uuid {
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/diagnostics",
        Some(cookie),
        Some(json!({ "company_name": company, "analysis_period": "last_quarter" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    body["id"].as_str().unwrap().parse().unwrap()
}

fn sample_answers() -> Value {
    json!({
        "answers": [
            { "area": "Revenue", "question": "Monthly revenue?", "answer": 12000 },
            { "area": "sales", "question": "Leads per month?", "answer": "40" },
            { "area": "tools", "question": "Which CRM?", "answer": "None" }
        ]
    })
}

async fn submit(ctx: &TestContext, cookie: &str, id: Uuid, answers: Value) -> (StatusCode, Value) {
    request_json(
        &ctx.app,
        "POST",
        &format!("/diagnostics/{}/answers", id),
        Some(cookie),
        Some(answers),
    )
    .await
}

//=========================================================================================
// Creation and quota
//=========================================================================================

#[tokio::test]
async fn create_and_list_own_diagnostics() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let (_, other_cookie) = user_session(&ctx, "bob@example.com", None).await;

    let first = create_diagnostic(&ctx, &cookie, "Acme Ltd").await;
    let second = create_diagnostic(&ctx, &cookie, "Acme Ltd").await;
    create_diagnostic(&ctx, &other_cookie, "Other Co").await;

    let (status, body) = request_json(&ctx.app, "GET", "/diagnostics", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], second.to_string());
    assert_eq!(list[1]["id"], first.to_string());
    assert_eq!(list[0]["status"], "pending");
    assert_eq!(list[0]["analysis_period"], "last_quarter");
}

#[tokio::test]
async fn create_validates_fields() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;

    for body in [
        json!({ "analysis_period": "last_month" }),
        json!({ "company_name": "   ", "analysis_period": "last_month" }),
        json!({ "company_name": "Acme" }),
        json!({ "company_name": "Acme", "analysis_period": "yesterday" }),
    ] {
        let (status, json) =
            request_json(&ctx.app, "POST", "/diagnostics", Some(&cookie), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }
    assert!(ctx.db.store.lock().unwrap().diagnostics.is_empty());
}

#[tokio::test]
async fn lifetime_limit_blocks_creation() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", Some(1)).await;

    create_diagnostic(&ctx, &cookie, "Acme").await;

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/diagnostics",
        Some(&cookie),
        Some(json!({ "company_name": "Acme", "analysis_period": "last_week" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], REASON_LIFETIME_LIMIT);
}

#[tokio::test]
async fn zero_limit_refuses_first_diagnostic() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", Some(0)).await;

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/diagnostics",
        Some(&cookie),
        Some(json!({ "company_name": "Acme", "analysis_period": "last_week" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn running_subscription_only_counts_its_own_window() {
    let ctx = build_test_context();
    let (user, cookie) = user_session(&ctx, "ana@example.com", Some(2)).await;
    let now = Utc::now();
    for _ in 0..3 {
        seed_diagnostic(&ctx.db, user.id, now - Duration::days(40));
    }
    seed_subscription(
        &ctx.db,
        user.id,
        now - Duration::days(10),
        now + Duration::days(20),
    );

    let (status, body) =
        request_json(&ctx.app, "GET", "/me/subscription", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], true);
    assert_eq!(body["remaining"], 2);
    assert_eq!(body["limit"], 2);

    create_diagnostic(&ctx, &cookie, "Acme").await;
    create_diagnostic(&ctx, &cookie, "Acme").await;

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/diagnostics",
        Some(&cookie),
        Some(json!({ "company_name": "Acme", "analysis_period": "last_year" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], REASON_PERIOD_LIMIT);
}

#[tokio::test]
async fn subscription_window_includes_both_edges() {
    let ctx = build_test_context();
    let (user, cookie) = user_session(&ctx, "ana@example.com", Some(2)).await;
    let now = Utc::now();
    let start = now - Duration::days(10);
    let end = now + Duration::days(20);
    seed_subscription(&ctx.db, user.id, start, end);
    seed_diagnostic(&ctx.db, user.id, start - Duration::seconds(1));
    seed_diagnostic(&ctx.db, user.id, end + Duration::seconds(1));

    let (_, body) = request_json(&ctx.app, "GET", "/me/subscription", Some(&cookie), None).await;
    assert_eq!(body["remaining"], 2);

    seed_diagnostic(&ctx.db, user.id, start);
    seed_diagnostic(&ctx.db, user.id, end);

    let (_, body) = request_json(&ctx.app, "GET", "/me/subscription", Some(&cookie), None).await;
    assert_eq!(body["remaining"], 0);

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/diagnostics",
        Some(&cookie),
        Some(json!({ "company_name": "Acme", "analysis_period": "last_month" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], REASON_PERIOD_LIMIT);
}

#[tokio::test]
async fn lapsed_subscription_is_expired_and_lifetime_count_applies() {
    let ctx = build_test_context();
    let (user, cookie) = user_session(&ctx, "ana@example.com", Some(2)).await;
    let now = Utc::now();
    seed_diagnostic(&ctx.db, user.id, now - Duration::days(60));
    seed_diagnostic(&ctx.db, user.id, now - Duration::days(50));
    let subscription = seed_subscription(
        &ctx.db,
        user.id,
        now - Duration::days(40),
        now - Duration::days(1),
    );

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/diagnostics",
        Some(&cookie),
        Some(json!({ "company_name": "Acme", "analysis_period": "last_week" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], REASON_LIFETIME_LIMIT);
    assert_eq!(
        ctx.db.subscription(subscription.id).status,
        SubscriptionStatus::Expired
    );

    let (_, body) = request_json(&ctx.app, "GET", "/me/subscription", Some(&cookie), None).await;
    assert_eq!(body["is_active"], false);
    assert_eq!(body["remaining"], 0);
}

//=========================================================================================
// Answers
//=========================================================================================

#[tokio::test]
async fn answers_replace_previous_submission() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;

    let (status, body) = submit(&ctx, &cookie, id, sample_answers()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 3);

    let details = ctx.db.details(id);
    let revenue = details.iter().find(|d| d.area == "revenue").unwrap();
    assert_eq!(revenue.answer, "12000");

    let (status, body) = submit(
        &ctx,
        &cookie,
        id,
        json!({ "answers": [{ "area": "marketing", "question": "Channels?", "answer": "Ads" }] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (_, body) =
        request_json(&ctx.app, "GET", &format!("/diagnostics/{}", id), Some(&cookie), None).await;
    let details = body["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["area"], "marketing");
    assert_eq!(body["company_name"], "Acme");
}

#[tokio::test]
async fn details_are_grouped_by_area_in_submission_order() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;
    submit(
        &ctx,
        &cookie,
        id,
        json!({ "answers": [
            { "area": "tools", "question": "Which CRM?", "answer": "None" },
            { "area": "sales", "question": "Leads per month?", "answer": "40" },
            { "area": "tools", "question": "Automation?", "answer": "No" },
            { "area": "sales", "question": "Average ticket?", "answer": "900" }
        ] }),
    )
    .await;

    let (_, body) =
        request_json(&ctx.app, "GET", &format!("/diagnostics/{}", id), Some(&cookie), None).await;
    let questions: Vec<_> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["question"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        questions,
        ["Leads per month?", "Average ticket?", "Which CRM?", "Automation?"]
    );
}

#[tokio::test]
async fn invalid_answers_leave_stored_ones_untouched() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;
    submit(&ctx, &cookie, id, sample_answers()).await;

    for body in [
        json!({ "answers": [] }),
        json!({ "answers": "revenue" }),
        json!({}),
        json!({ "answers": [{ "area": "finance", "question": "Q?", "answer": "A" }] }),
        json!({ "answers": [{ "area": "sales", "question": "  ", "answer": "A" }] }),
        json!({ "answers": [{ "area": "sales", "question": "Q?", "answer": ["A"] }] }),
    ] {
        let (status, json) = submit(&ctx, &cookie, id, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", json);
    }
    assert_eq!(ctx.db.details(id).len(), 3);
}

#[tokio::test]
async fn other_users_diagnostics_are_not_found() {
    let ctx = build_test_context_without_pdf();
    let (_, owner) = user_session(&ctx, "ana@example.com", None).await;
    let (_, intruder) = user_session(&ctx, "eve@example.com", None).await;
    let id = create_diagnostic(&ctx, &owner, "Acme").await;
    submit(&ctx, &owner, id, sample_answers()).await;

    let (status, _) =
        request_json(&ctx.app, "GET", &format!("/diagnostics/{}", id), Some(&intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = submit(&ctx, &intruder, id, sample_answers()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for (method, suffix) in [("POST", "generate"), ("GET", "report"), ("GET", "pdf")] {
        let (status, _) = request_json(
            &ctx.app,
            method,
            &format!("/diagnostics/{}/{}", id, suffix),
            Some(&intruder),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, suffix);
    }
    assert_eq!(ctx.ai.calls(), 0);
    assert_eq!(ctx.db.details(id).len(), 3);
}

#[tokio::test]
async fn malformed_diagnostic_id_is_a_bad_request() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;

    let (status, _) =
        request_json(&ctx.app, "GET", "/diagnostics/not-a-uuid", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

//=========================================================================================
// Generation
//=========================================================================================

#[tokio::test]
async fn generate_completes_diagnostic_and_sets_area_feedback() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;
    submit(&ctx, &cookie, id, sample_answers()).await;

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        &format!("/diagnostics/{}/generate", id),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["general_score"], 72.4);
    assert_eq!(body["result"]["priorities"][0]["impact"], "high");

    let diagnostic = ctx.db.diagnostic(id);
    assert_eq!(diagnostic.status, DiagnosticStatus::Completed);
    assert_eq!(diagnostic.general_score, Some(72));
    assert_eq!(
        diagnostic.strategic_reading.as_deref(),
        Some("Strong product, weak funnel.")
    );
    assert!(diagnostic.realization_date.is_some());

    let details = ctx.db.details(id);
    let feedback = |area: &str| {
        details
            .iter()
            .find(|d| d.area == area)
            .and_then(|d| d.ai_feedback.clone())
    };
    assert_eq!(feedback("sales").as_deref(), Some("Score: 55/100"));
    assert_eq!(feedback("tools").as_deref(), Some("Score: 40/100"));
    assert_eq!(feedback("revenue"), None);

    let prompts = ctx.ai.prompts.lock().unwrap();
    assert!(prompts[0].contains("Acme"));
    assert!(prompts[0].contains("Which CRM?"));
}

#[tokio::test]
async fn generate_accepts_fenced_json() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;
    submit(&ctx, &cookie, id, sample_answers()).await;
    ctx.ai
        .reply_with(&format!("Here you go:\n```json\n{}\n```", VALID_REPORT));

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/diagnostics/{}/generate", id),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx.db.diagnostic(id).status, DiagnosticStatus::Completed);
}

#[tokio::test]
async fn loosely_shaped_reply_is_accepted_and_returned_as_is() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;
    submit(&ctx, &cookie, id, sample_answers()).await;

    let replies = [
        r#"{"general_score": 61, "strategic_reading": "Good start.",
            "priorities": [{"title": "CRM", "impact": "High"}]}"#,
        r#"{"general_score": 61, "strategic_reading": "Good start.", "priorities": ["Adopt a CRM"]}"#,
        r#"{"general_score": 61, "strategic_reading": "Good start.", "priorities": [],
            "charts_data": null}"#,
        r#"{"general_score": 61, "strategic_reading": "Good start.", "priorities": [],
            "lost_revenue_indicators": [{"category": "Churn", "estimated_loss": "R$ 5.000"}]}"#,
    ];
    for reply in replies {
        ctx.ai.reply_with(reply);
        let (status, body) = request_json(
            &ctx.app,
            "POST",
            &format!("/diagnostics/{}/generate", id),
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{} -> {}", reply, body);
        let expected: Value = serde_json::from_str(reply).unwrap();
        assert_eq!(body["result"], expected);

        let diagnostic = ctx.db.diagnostic(id);
        assert_eq!(diagnostic.status, DiagnosticStatus::Completed);
        assert_eq!(diagnostic.general_score, Some(61));
    }
}

#[tokio::test]
async fn ai_failure_is_reported_and_diagnostic_stays_pending() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;
    submit(&ctx, &cookie, id, sample_answers()).await;
    ctx.ai.fail_with("Resource has been exhausted (e.g. check quota).");

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        &format!("/diagnostics/{}/generate", id),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Resource has been exhausted (e.g. check quota).");

    let diagnostic = ctx.db.diagnostic(id);
    assert_eq!(diagnostic.status, DiagnosticStatus::Pending);
    assert_eq!(diagnostic.general_score, None);
    assert!(ctx.db.details(id).iter().all(|d| d.ai_feedback.is_none()));
}

#[tokio::test]
async fn unusable_ai_reply_writes_nothing() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;
    submit(&ctx, &cookie, id, sample_answers()).await;

    for reply in [
        "I cannot help with that.",
        r#"{"general_score": "high", "strategic_reading": "x", "priorities": []}"#,
        r#"{"general_score": 50, "strategic_reading": "", "priorities": []}"#,
    ] {
        ctx.ai.reply_with(reply);
        let (status, body) = request_json(
            &ctx.app,
            "POST",
            &format!("/diagnostics/{}/generate", id),
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("not a valid diagnostic"));
    }
    assert_eq!(ctx.db.diagnostic(id).status, DiagnosticStatus::Pending);
}

#[tokio::test]
async fn generate_without_answers_is_rejected_before_calling_ai() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        &format!("/diagnostics/{}/generate", id),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No answers found");
    assert_eq!(ctx.ai.calls(), 0);
}

//=========================================================================================
// Exports
//=========================================================================================

#[tokio::test]
async fn report_is_served_as_escaped_html() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme & <Sons>").await;
    submit(&ctx, &cookie, id, sample_answers()).await;
    request_json(
        &ctx.app,
        "POST",
        &format!("/diagnostics/{}/generate", id),
        Some(&cookie),
        None,
    )
    .await;

    let resp = send(
        &ctx.app,
        "GET",
        &format!("/diagnostics/{}/report", id),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp
        .header(header::CONTENT_TYPE)
        .unwrap()
        .starts_with("text/html"));
    let html = resp.text();
    assert!(html.contains("Acme &amp; &lt;Sons&gt;"));
    assert!(!html.contains("<Sons>"));
    assert!(html.contains("Strong product, weak funnel."));
    assert!(html.contains("Score: 55/100"));
    assert!(!html.contains("{{"));
}

#[tokio::test]
async fn pdf_is_returned_as_attachment() {
    let ctx = build_test_context();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme Ltd").await;
    submit(&ctx, &cookie, id, sample_answers()).await;

    for method in ["GET", "POST"] {
        let resp = send(
            &ctx.app,
            method,
            &format!("/diagnostics/{}/pdf", id),
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.header(header::CONTENT_TYPE), Some("application/pdf"));
        let disposition = resp.header(header::CONTENT_DISPOSITION).unwrap();
        assert!(disposition.starts_with("attachment; filename=\"diagnostic-Acme-Ltd-"));
        assert!(disposition.ends_with(".pdf\""));
        assert_eq!(resp.bytes, FAKE_PDF);
    }

    let html = ctx.pdf.last_html.lock().unwrap().clone().unwrap();
    assert!(html.contains("Acme Ltd"));
}

#[tokio::test]
async fn pdf_without_renderer_is_unavailable() {
    let ctx = build_test_context_without_pdf();
    let (_, cookie) = user_session(&ctx, "ana@example.com", None).await;
    let id = create_diagnostic(&ctx, &cookie, "Acme").await;

    let (status, body) = request_json(
        &ctx.app,
        "GET",
        &format!("/diagnostics/{}/pdf", id),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "PDF generation is not configured");
}
