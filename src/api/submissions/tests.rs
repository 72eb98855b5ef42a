use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::db::models::{Exam, Question, User};
use crate::db::types::{ExamKind, ExamStatus, ParticipantStatus, UserRole};
use crate::test_support::{self, QuestionSeed, TestContext};

async fn send(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(method, uri, Some(token), body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

async fn quiz_with_student(
    ctx: &TestContext,
    suffix: &str,
    max_attempts: Option<i32>,
) -> (User, User, Exam, Vec<Question>) {
    let pool = ctx.state.db();
    let teacher = test_support::insert_user(
        pool,
        &format!("teacher_{suffix}"),
        "Teacher",
        UserRole::Teacher,
    )
    .await;
    let student = test_support::insert_user(
        pool,
        &format!("student_{suffix}"),
        "Student",
        UserRole::Student,
    )
    .await;
    let (exam, questions) = test_support::insert_exam(
        pool,
        &teacher,
        ExamKind::Quiz,
        ExamStatus::Published,
        test_support::open_window(),
        max_attempts,
        None,
        vec![QuestionSeed::choice("First", 2.0, 1), QuestionSeed::choice("Second", 3.0, 0)],
    )
    .await;
    test_support::insert_participant(pool, &exam, &student, ParticipantStatus::Accepted).await;
    (teacher, student, exam, questions)
}

#[tokio::test]
async fn quiz_attempt_is_scored_on_submit() {
    let ctx = test_support::setup_test_context().await;
    let (_, student, exam, questions) = quiz_with_student(&ctx, "quiz", None).await;
    let token = test_support::bearer_token(&student, ctx.state.settings());

    let body = test_support::answers_body(vec![
        (questions[0].id.as_str(), json!(1)),
        (questions[1].id.as_str(), json!(2)),
    ]);
    let (status, created) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/exams/{}/submissions", exam.id),
        &token,
        Some(body),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "corrected");
    assert_eq!(created["grader"], "multiple_choice");
    assert_eq!(created["attempt_number"], 1);
    assert_eq!(created["score"], 2.0);
    assert_eq!(created["max_score"], 5.0);
    assert_eq!(created["question_results"].as_array().map(Vec::len), Some(2));

    let participant =
        crate::repositories::participants::find(ctx.state.db(), &exam.id, &student.id)
            .await
            .expect("participant")
            .expect("participant exists");
    assert_eq!(participant.status, ParticipantStatus::Completed);
}

#[tokio::test]
async fn attempts_are_numbered_and_limited() {
    let ctx = test_support::setup_test_context().await;
    let (_, student, exam, questions) = quiz_with_student(&ctx, "limit", Some(2)).await;
    let token = test_support::bearer_token(&student, ctx.state.settings());
    let uri = format!("/api/v1/exams/{}/submissions", exam.id);

    for expected in 1..=2 {
        let body = test_support::answers_body(vec![(questions[0].id.as_str(), json!(0))]);
        let (status, created) = send(&ctx, Method::POST, &uri, &token, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["attempt_number"], expected);
    }

    let body = test_support::answers_body(vec![(questions[0].id.as_str(), json!(0))]);
    let (status, error) = send(&ctx, Method::POST, &uri, &token, Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["detail"], "No attempts left for this exam");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_respect_attempt_limit() {
    let ctx = test_support::setup_test_context().await;
    let (_, student, exam, questions) = quiz_with_student(&ctx, "race", Some(2)).await;
    let token = test_support::bearer_token(&student, ctx.state.settings());
    let uri = format!("/api/v1/exams/{}/submissions", exam.id);

    let mut submits = tokio::task::JoinSet::new();
    for _ in 0..6 {
        let app = ctx.app.clone();
        let request = test_support::json_request(
            Method::POST,
            &uri,
            Some(&token),
            Some(test_support::answers_body(vec![(questions[0].id.as_str(), json!(1))])),
        );
        submits.spawn(async move {
            let response = app.oneshot(request).await.expect("response");
            let status = response.status();
            (status, test_support::read_json(response).await)
        });
    }

    let mut numbers = Vec::new();
    let mut denied = 0;
    while let Some(joined) = submits.join_next().await {
        let (status, body) = joined.expect("submit task");
        match status {
            StatusCode::CREATED => numbers.push(body["attempt_number"].as_i64().expect("number")),
            StatusCode::FORBIDDEN => denied += 1,
            other => panic!("unexpected status {other}: {body}"),
        }
    }
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(denied, 4);

    let mine = format!("/api/v1/submissions/my?exam_id={}", exam.id);
    let (status, listed) = send(&ctx, Method::GET, &mine, &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn submit_rejects_non_participants_and_bad_answers() {
    let ctx = test_support::setup_test_context().await;
    let (_, _, exam, questions) = quiz_with_student(&ctx, "reject", None).await;
    let outsider =
        test_support::insert_user(ctx.state.db(), "outsider", "Outsider", UserRole::Student).await;
    let outsider_token = test_support::bearer_token(&outsider, ctx.state.settings());
    let uri = format!("/api/v1/exams/{}/submissions", exam.id);

    let body = test_support::answers_body(vec![(questions[0].id.as_str(), json!(0))]);
    let (status, error) = send(&ctx, Method::POST, &uri, &outsider_token, Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["detail"], "Join the exam before taking it");

    test_support::insert_participant(ctx.state.db(), &exam, &outsider, ParticipantStatus::Accepted)
        .await;
    let body = test_support::answers_body(vec![("no-such-question", json!(0))]);
    let (status, _) = send(&ctx, Method::POST, &uri, &outsider_token, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = test_support::answers_body(vec![(questions[0].id.as_str(), json!(7))]);
    let (status, _) = send(&ctx, Method::POST, &uri, &outsider_token, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submissions_are_visible_to_owner_and_exam_manager_only() {
    let ctx = test_support::setup_test_context().await;
    let (teacher, student, exam, questions) = quiz_with_student(&ctx, "visibility", None).await;
    let other_teacher =
        test_support::insert_user(ctx.state.db(), "teacher_other", "Other", UserRole::Teacher)
            .await;
    let student_token = test_support::bearer_token(&student, ctx.state.settings());
    let teacher_token = test_support::bearer_token(&teacher, ctx.state.settings());
    let other_token = test_support::bearer_token(&other_teacher, ctx.state.settings());

    let body = test_support::answers_body(vec![(questions[0].id.as_str(), json!(1))]);
    let (_, created) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/exams/{}/submissions", exam.id),
        &student_token,
        Some(body),
    )
    .await;
    let submission_uri =
        format!("/api/v1/submissions/{}", created["id"].as_str().expect("submission id"));

    let (status, own) = send(&ctx, Method::GET, &submission_uri, &student_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(own["student_id"], student.id.as_str());

    let (status, _) = send(&ctx, Method::GET, &submission_uri, &teacher_token, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&ctx, Method::GET, &submission_uri, &other_token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, mine) =
        send(&ctx, Method::GET, "/api/v1/submissions/my", &student_token, None).await;
    assert_eq!(status, StatusCode::OK);
    let mine = mine.as_array().expect("array");
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["exam_title"], "Test exam");

    let (status, listed) = send(
        &ctx,
        Method::GET,
        &format!("/api/v1/exams/{}/submissions?status=corrected", exam.id),
        &teacher_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total_count"], 1);
    assert_eq!(listed["items"][0]["student_username"], "student_visibility");

    let (status, _) = send(
        &ctx,
        Method::GET,
        &format!("/api/v1/exams/{}/submissions", exam.id),
        &other_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn teacher_revision_overrides_score_and_blocks_regrading() {
    let ctx = test_support::setup_test_context().await;
    let (teacher, student, exam, questions) = quiz_with_student(&ctx, "revise", None).await;
    let student_token = test_support::bearer_token(&student, ctx.state.settings());
    let teacher_token = test_support::bearer_token(&teacher, ctx.state.settings());

    let body = test_support::answers_body(vec![(questions[0].id.as_str(), json!(0))]);
    let (_, created) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/exams/{}/submissions", exam.id),
        &student_token,
        Some(body),
    )
    .await;
    let submission_id = created["id"].as_str().expect("submission id").to_string();
    assert_eq!(created["score"], 0.0);

    let (status, regraded) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/submissions/{submission_id}/grade"),
        &teacher_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(regraded["status"], "corrected");

    let revise_uri = format!("/api/v1/submissions/{submission_id}/revise");
    let (status, error) =
        send(&ctx, Method::POST, &revise_uri, &teacher_token, Some(json!({"score": 9.0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["detail"], "score must not exceed the maximum of 5");

    let (status, revised) = send(
        &ctx,
        Method::POST,
        &revise_uri,
        &teacher_token,
        Some(json!({"score": 4.5, "feedback": "Partial credit for the reasoning"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revised["status"], "revised");
    assert_eq!(revised["grader"], "teacher");
    assert_eq!(revised["score"], 4.5);
    assert_eq!(revised["reviewed_by"], teacher.id.as_str());

    let (status, _) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/submissions/{submission_id}/grade"),
        &teacher_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&ctx, Method::POST, &revise_uri, &student_token, Some(json!({"score": 5.0})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn open_answers_stay_pending_and_need_configured_graders() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let teacher = test_support::insert_user(pool, "teacher_doc", "Teacher", UserRole::Teacher).await;
    let student = test_support::insert_user(pool, "student_doc", "Student", UserRole::Student).await;
    let teacher_token = test_support::bearer_token(&teacher, ctx.state.settings());
    let student_token = test_support::bearer_token(&student, ctx.state.settings());

    for (kind, language, detail) in [
        (ExamKind::Document, None, "AI evaluation is not configured"),
        (ExamKind::Code, Some("python"), "Code sandbox is not configured"),
    ] {
        let (exam, questions) = test_support::insert_exam(
            pool,
            &teacher,
            kind,
            ExamStatus::Published,
            test_support::open_window(),
            None,
            None,
            vec![QuestionSeed::open("Explain", 10.0, language)],
        )
        .await;
        test_support::insert_participant(pool, &exam, &student, ParticipantStatus::Accepted).await;

        let body = test_support::answers_body(vec![(questions[0].id.as_str(), json!("print(42)"))]);
        let (status, created) = send(
            &ctx,
            Method::POST,
            &format!("/api/v1/exams/{}/submissions", exam.id),
            &student_token,
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "pending");
        assert!(created["score"].is_null());

        let (status, error) = send(
            &ctx,
            Method::POST,
            &format!("/api/v1/submissions/{}/grade", created["id"].as_str().expect("id")),
            &teacher_token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error["detail"], detail);
    }
}
