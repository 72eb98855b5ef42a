use axum::http::{Method, StatusCode};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tower::ServiceExt;

use crate::db::types::{ExamKind, ExamStatus, UserRole};
use crate::test_support::{self, QuestionSeed};

fn quiz_payload() -> serde_json::Value {
    let now = OffsetDateTime::now_utc().replace_nanosecond(0).expect("nanoseconds");
    let start_time = (now - Duration::hours(1)).format(&Rfc3339).unwrap();
    let end_time = (now + Duration::hours(2)).format(&Rfc3339).unwrap();

    json!({
        "title": "Rust basics",
        "description": "Ownership and borrowing",
        "kind": "quiz",
        "start_time": start_time,
        "end_time": end_time,
        "max_attempts": 2,
        "questions": [
            {"text": "Which keyword moves?", "max_points": 2.0, "options": ["let", "move"], "correct_option": 1},
            {"text": "Borrow checker runs at?", "max_points": 3.0, "options": ["compile", "run"], "correct_option": 0}
        ]
    })
}

#[tokio::test]
async fn teacher_creates_publishes_and_lists_exam() {
    let ctx = test_support::setup_test_context().await;
    let teacher =
        test_support::insert_user(ctx.state.db(), "teacher01", "Teacher", UserRole::Teacher).await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(quiz_payload()),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = test_support::read_json(response).await;
    assert_eq!(created["status"], "draft");
    assert_eq!(created["phase"], "draft");
    assert_eq!(created["max_score"], 5.0);
    assert_eq!(created["questions"].as_array().map(Vec::len), Some(2));
    assert_eq!(created["questions"][0]["correct_option"], 1);
    let exam_id = created["id"].as_str().expect("id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{exam_id}/publish"),
            Some(&token),
            None,
        ))
        .await
        .expect("publish");
    assert_eq!(response.status(), StatusCode::OK);
    let published = test_support::read_json(response).await;
    assert_eq!(published["status"], "published");
    assert_eq!(published["phase"], "open");
    assert!(published["published_at"].is_string());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/exams", Some(&token), None))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let listed = test_support::read_json(response).await;
    assert_eq!(listed["total_count"], 1);
    assert_eq!(listed["items"][0]["id"], exam_id);
}

#[tokio::test]
async fn students_cannot_create_exams() {
    let ctx = test_support::setup_test_context().await;
    let student =
        test_support::insert_user(ctx.state.db(), "student01", "Student", UserRole::Student).await;
    let token = test_support::bearer_token(&student, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(quiz_payload()),
        ))
        .await
        .expect("create");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_rejects_inverted_window_and_open_quiz_questions() {
    let ctx = test_support::setup_test_context().await;
    let teacher =
        test_support::insert_user(ctx.state.db(), "teacher02", "Teacher", UserRole::Teacher).await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let mut inverted = quiz_payload();
    let start = inverted["start_time"].clone();
    inverted["start_time"] = inverted["end_time"].clone();
    inverted["end_time"] = start;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(inverted),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut open_question = quiz_payload();
    open_question["questions"] = json!([{"text": "Explain", "max_points": 1.0}]);
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(open_question),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = test_support::read_json(response).await;
    assert_eq!(body["detail"], "Question 1 must be multiple choice in a quiz exam");
}

#[tokio::test]
async fn publish_requires_questions_and_draft_status() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let teacher = test_support::insert_user(pool, "teacher03", "Teacher", UserRole::Teacher).await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let (empty, _) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Document,
        ExamStatus::Draft,
        test_support::open_window(),
        None,
        None,
        Vec::new(),
    )
    .await;
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/publish", empty.id),
            Some(&token),
            None,
        ))
        .await
        .expect("publish");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = test_support::read_json(response).await;
    assert_eq!(body["detail"], "Exam must have at least one question");

    let (closed, _) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Quiz,
        ExamStatus::Closed,
        test_support::open_window(),
        None,
        None,
        vec![QuestionSeed::choice("Q", 1.0, 0)],
    )
    .await;
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/publish", closed.id),
            Some(&token),
            None,
        ))
        .await
        .expect("publish");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = test_support::read_json(response).await;
    assert_eq!(body["detail"], "Cannot publish an exam with status 'closed'");
}

#[tokio::test]
async fn close_then_finalize_exam() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let teacher = test_support::insert_user(pool, "teacher04", "Teacher", UserRole::Teacher).await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let (exam, _) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Quiz,
        ExamStatus::Published,
        test_support::open_window(),
        None,
        None,
        vec![QuestionSeed::choice("Q", 1.0, 0)],
    )
    .await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/finalize", exam.id),
            Some(&token),
            None,
        ))
        .await
        .expect("finalize early");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/close", exam.id),
            Some(&token),
            None,
        ))
        .await
        .expect("close");
    assert_eq!(response.status(), StatusCode::OK);
    let closed = test_support::read_json(response).await;
    assert_eq!(closed["status"], "closed");
    assert!(closed["closed_at"].is_string());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/finalize", exam.id),
            Some(&token),
            None,
        ))
        .await
        .expect("finalize");
    assert_eq!(response.status(), StatusCode::OK);
    let graded = test_support::read_json(response).await;
    assert_eq!(graded["status"], "graded");
}

#[tokio::test]
async fn other_teachers_cannot_manage_exam() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let owner = test_support::insert_user(pool, "owner01", "Owner", UserRole::Teacher).await;
    let other = test_support::insert_user(pool, "other01", "Other", UserRole::Teacher).await;
    let token = test_support::bearer_token(&other, ctx.state.settings());

    let (exam, _) = test_support::insert_exam(
        pool,
        &owner,
        ExamKind::Quiz,
        ExamStatus::Draft,
        test_support::open_window(),
        None,
        None,
        vec![QuestionSeed::choice("Q", 1.0, 0)],
    )
    .await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/publish", exam.id),
            Some(&token),
            None,
        ))
        .await
        .expect("publish");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn update_issues_join_code_and_clears_max_attempts() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let teacher = test_support::insert_user(pool, "teacher05", "Teacher", UserRole::Teacher).await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let (exam, _) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Quiz,
        ExamStatus::Draft,
        test_support::open_window(),
        Some(1),
        None,
        vec![QuestionSeed::choice("Q", 1.0, 0)],
    )
    .await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &format!("/api/v1/exams/{}", exam.id),
            Some(&token),
            Some(json!({"title": "Renamed", "max_attempts": null, "require_join_code": true})),
        ))
        .await
        .expect("update");
    assert_eq!(response.status(), StatusCode::OK);
    let updated = test_support::read_json(response).await;
    assert_eq!(updated["title"], "Renamed");
    assert!(updated["max_attempts"].is_null());
    assert_eq!(updated["requires_join_code"], true);
    assert_eq!(updated["join_code"].as_str().map(str::len), Some(9));

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/exams/{}", exam.id),
            Some(&token),
            None,
        ))
        .await
        .expect("get");
    let fetched = test_support::read_json(response).await;
    assert!(fetched.get("join_code").is_none());
    assert_eq!(fetched["requires_join_code"], true);
}

#[tokio::test]
async fn questions_can_only_be_added_to_drafts() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let teacher = test_support::insert_user(pool, "teacher06", "Teacher", UserRole::Teacher).await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());
    let body = json!({"questions": [{"text": "Write fizzbuzz", "max_points": 5.0, "language": "python"}]});

    let (draft, _) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Code,
        ExamStatus::Draft,
        test_support::open_window(),
        None,
        None,
        Vec::new(),
    )
    .await;
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/questions", draft.id),
            Some(&token),
            Some(body.clone()),
        ))
        .await
        .expect("add");
    assert_eq!(response.status(), StatusCode::CREATED);
    let exam = test_support::read_json(response).await;
    assert_eq!(exam["questions"][0]["language"], "python");
    assert_eq!(exam["questions"][0]["order_index"], 0);

    let (published, _) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Code,
        ExamStatus::Published,
        test_support::open_window(),
        None,
        None,
        vec![QuestionSeed::open("Q", 1.0, Some("rust"))],
    )
    .await;
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/questions", published.id),
            Some(&token),
            Some(body),
        ))
        .await
        .expect("add");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn question_payloads_are_validated_per_item() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let teacher = test_support::insert_user(pool, "teacher09", "Teacher", UserRole::Teacher).await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());
    let (draft, _) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Document,
        ExamStatus::Draft,
        test_support::open_window(),
        None,
        None,
        Vec::new(),
    )
    .await;
    let questions_uri = format!("/api/v1/exams/{}/questions", draft.id);

    for body in [
        json!({"questions": []}),
        json!({"questions": [{"text": "Explain", "max_points": 0.0}]}),
        json!({"questions": [{"text": "", "max_points": 1.0}]}),
    ] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &questions_uri,
                Some(&token),
                Some(body),
            ))
            .await
            .expect("add");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let mut payload = quiz_payload();
    payload["questions"][1]["max_points"] = json!(-3.0);
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(payload),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = test_support::read_json(response).await;
    assert!(error["detail"].as_str().is_some_and(|detail| detail.contains("max_points")));
}

#[tokio::test]
async fn delete_requires_force_when_submissions_exist() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let teacher = test_support::insert_user(pool, "teacher07", "Teacher", UserRole::Teacher).await;
    let student = test_support::insert_user(pool, "student07", "Student", UserRole::Student).await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());
    let student_token = test_support::bearer_token(&student, ctx.state.settings());

    let (exam, questions) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Quiz,
        ExamStatus::Published,
        test_support::open_window(),
        None,
        None,
        vec![QuestionSeed::choice("Q", 1.0, 0)],
    )
    .await;
    test_support::insert_participant(
        pool,
        &exam,
        &student,
        crate::db::types::ParticipantStatus::Accepted,
    )
    .await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/submissions", exam.id),
            Some(&student_token),
            Some(test_support::answers_body(vec![(questions[0].id.as_str(), json!(0))])),
        ))
        .await
        .expect("submit");
    assert_eq!(response.status(), StatusCode::CREATED);

    let uri = format!("/api/v1/exams/{}", exam.id);
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::DELETE, &uri, Some(&token), None))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("{uri}?force=true"),
            Some(&token),
            None,
        ))
        .await
        .expect("force delete");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, &uri, Some(&token), None))
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn students_see_questions_without_answer_keys() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let teacher = test_support::insert_user(pool, "teacher08", "Teacher", UserRole::Teacher).await;
    let student = test_support::insert_user(pool, "student08", "Student", UserRole::Student).await;
    let token = test_support::bearer_token(&student, ctx.state.settings());

    let (draft, _) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Quiz,
        ExamStatus::Draft,
        test_support::open_window(),
        None,
        None,
        vec![QuestionSeed::choice("Q", 1.0, 0)],
    )
    .await;
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/exams/{}", draft.id),
            Some(&token),
            None,
        ))
        .await
        .expect("get draft");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (exam, _) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Quiz,
        ExamStatus::Published,
        test_support::open_window(),
        None,
        None,
        vec![QuestionSeed::choice("Q", 1.0, 0)],
    )
    .await;
    let uri = format!("/api/v1/exams/{}", exam.id);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, &uri, Some(&token), None))
        .await
        .expect("get before joining");
    let before = test_support::read_json(response).await;
    assert_eq!(before["questions"].as_array().map(Vec::len), Some(0));

    test_support::insert_participant(
        pool,
        &exam,
        &student,
        crate::db::types::ParticipantStatus::Accepted,
    )
    .await;
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, &uri, Some(&token), None))
        .await
        .expect("get after joining");
    let after = test_support::read_json(response).await;
    assert_eq!(after["questions"].as_array().map(Vec::len), Some(1));
    assert!(after["questions"][0].get("correct_option").is_none());
}
