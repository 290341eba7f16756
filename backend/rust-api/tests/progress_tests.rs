// Video progress tracking and certificate issuance
use axum::http::StatusCode;
use chrono::Utc;
use coursehub_api::models::certificate::Certificate;
use coursehub_api::models::new_id;
use coursehub_api::models::user::UserType;
use coursehub_api::store::DocumentStore;
use serde_json::json;

mod common;

use common::create_test_app;

#[tokio::test]
async fn watch_time_only_moves_forward() {
    let app = create_test_app();
    let (user, token) = app.create_user("learner", UserType::Regular).await;
    let course = app.create_course("rust-basics", 4).await;
    app.grant_course(&user.id, &course.id).await;

    let mut last = json!(null);
    for seconds in [10.0, 5.0, 20.9, 15.0] {
        let (status, body) = app
            .post(
                "/api/video/progress",
                &token,
                json!({ "courseId": course.id, "lessonId": "l1", "watchTime": seconds }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        last = body;
    }

    assert_eq!(last["progress"]["watchTime"]["l1"], 20);
    assert_eq!(last["progress"]["totalWatchTime"], 20);
    assert_eq!(last["progress"]["currentLesson"], "l1");
    assert_eq!(last["progress"]["progressPercentage"], 0);
}

#[tokio::test]
async fn out_of_range_watch_time_is_rejected() {
    let app = create_test_app();
    let (user, token) = app.create_user("learner", UserType::Regular).await;
    let course = app.create_course("rust-basics", 2).await;
    app.grant_course(&user.id, &course.id).await;

    for lesson in ["l1", "l2"] {
        let (status, body) = app
            .post(
                "/api/video/progress",
                &token,
                json!({ "courseId": course.id, "lessonId": lesson, "watchTime": 1e30 }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }

    let (_, body) = app
        .get(&format!("/api/video/course/{}", course.id), &token)
        .await;
    assert_eq!(body["progress"]["totalWatchTime"], 0);

    // the ceiling itself is accepted and totals stay exact
    let mut last = json!(null);
    for lesson in ["l1", "l2"] {
        let (status, body) = app
            .post(
                "/api/video/progress",
                &token,
                json!({ "courseId": course.id, "lessonId": lesson, "watchTime": 31_536_000 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        last = body;
    }
    assert_eq!(last["progress"]["totalWatchTime"], 63_072_000u64);
}

#[tokio::test]
async fn completed_lessons_drive_percentage() {
    let app = create_test_app();
    let (user, token) = app.create_user("learner", UserType::Regular).await;
    let course = app.create_course("rust-basics", 4).await;
    app.grant_course(&user.id, &course.id).await;

    // l2 twice: completion is a set
    for lesson in ["l1", "l2", "l2"] {
        app.post(
            "/api/video/progress",
            &token,
            json!({ "courseId": course.id, "lessonId": lesson, "completed": true }),
        )
        .await;
    }

    let (status, body) = app
        .get(&format!("/api/video/course/{}", course.id), &token)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["progress"]["progressPercentage"], 50);
    assert_eq!(body["progress"]["completedLessons"], json!(["l1", "l2"]));
    assert_eq!(body["course"]["title"], "rust-basics");
}

#[tokio::test]
async fn first_visit_creates_empty_progress() {
    let app = create_test_app();
    let (user, token) = app.create_user("learner", UserType::Regular).await;
    let course = app.create_course("rust-basics", 2).await;
    app.grant_course(&user.id, &course.id).await;

    let (status, body) = app
        .get(&format!("/api/video/course/{}", course.id), &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["progressPercentage"], 0);
    assert_eq!(body["progress"]["completedLessons"], json!([]));
}

#[tokio::test]
async fn unknown_lesson_is_rejected() {
    let app = create_test_app();
    let (user, token) = app.create_user("learner", UserType::Regular).await;
    let course = app.create_course("rust-basics", 2).await;
    app.grant_course(&user.id, &course.id).await;

    let (status, body) = app
        .post(
            "/api/video/progress",
            &token,
            json!({ "courseId": course.id, "lessonId": "l99", "completed": true }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Lesson not found in course");
}

#[tokio::test]
async fn progress_requires_purchase() {
    let app = create_test_app();
    let (_, token) = app.create_user("learner", UserType::Regular).await;
    let (_, admin_token) = app.create_user("boss", UserType::Admin).await;
    let course = app.create_course("rust-basics", 2).await;

    let (status, _) = app
        .post(
            "/api/video/progress",
            &token,
            json!({ "courseId": course.id, "lessonId": "l1", "completed": true }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .get(&format!("/api/video/course/{}", course.id), &admin_token)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn certificate_is_issued_once_and_verifiable() {
    let app = create_test_app();
    let (user, token) = app.create_user("learner", UserType::Regular).await;
    let course = app.create_course("rust-basics", 2).await;
    app.grant_course(&user.id, &course.id).await;

    app.post(
        "/api/video/progress",
        &token,
        json!({ "courseId": course.id, "lessonId": "l1", "completed": true }),
    )
    .await;

    let (status, body) = app
        .post("/api/certificates/issue", &token, json!({ "courseId": course.id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Course not completed yet");

    app.post(
        "/api/video/progress",
        &token,
        json!({ "courseId": course.id, "lessonId": "l2", "completed": true, "watchTime": 300 }),
    )
    .await;

    let (status, body) = app
        .post("/api/certificates/issue", &token, json!({ "courseId": course.id }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let certificate = body["certificate"].clone();
    let number = certificate["certificateNumber"].as_str().unwrap().to_string();
    assert!(number.starts_with("CERT-"));
    assert_eq!(certificate["studentName"], "learner");
    assert_eq!(certificate["instructorName"], "Ferris Crab");
    assert_eq!(certificate["totalLessons"], 2);
    assert_eq!(certificate["totalWatchTime"], 300);

    let (status, body) = app
        .post("/api/certificates/issue", &token, json!({ "courseId": course.id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["certificate"]["certificateNumber"], number.as_str());

    let (_, body) = app.get("/api/certificates/my-certificates", &token).await;
    assert_eq!(body["count"], 1);

    let (_, body) = app
        .get(&format!("/api/video/course/{}", course.id), &token)
        .await;
    assert_eq!(body["progress"]["certificateIssued"], true);

    // verification is public
    let (status, body) = app
        .request("GET", &format!("/api/certificates/verify/{}", number), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["certificate"]["courseName"], "rust-basics");

    let (status, body) = app
        .request("GET", "/api/certificates/verify/CERT-0-0000", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn reissue_sets_missing_issued_flag() {
    let app = create_test_app();
    let (user, token) = app.create_user("learner", UserType::Regular).await;
    let course = app.create_course("rust-basics", 1).await;
    app.grant_course(&user.id, &course.id).await;

    app.post(
        "/api/video/progress",
        &token,
        json!({ "courseId": course.id, "lessonId": "l1", "completed": true }),
    )
    .await;

    // a certificate on file whose progress flag never got written
    let now = Utc::now();
    app.store
        .insert_certificate(&Certificate {
            id: new_id(),
            user_id: user.id.clone(),
            course_id: course.id.clone(),
            course_name: course.title.clone(),
            student_name: "learner".into(),
            instructor_name: "Ferris Crab".into(),
            issue_date: now,
            certificate_number: "CERT-1-0001".into(),
            completion_date: now,
            total_lessons: 1,
            completed_lessons: 1,
            total_watch_time: 0,
        })
        .await
        .unwrap();
    let (_, body) = app
        .get(&format!("/api/video/course/{}", course.id), &token)
        .await;
    assert_eq!(body["progress"]["certificateIssued"], false);

    let (status, body) = app
        .post("/api/certificates/issue", &token, json!({ "courseId": course.id }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["certificate"]["certificateNumber"], "CERT-1-0001");

    let (_, body) = app
        .get(&format!("/api/video/course/{}", course.id), &token)
        .await;
    assert_eq!(body["progress"]["certificateIssued"], true);
}

#[tokio::test]
async fn certificates_are_private() {
    let app = create_test_app();
    let (user, token) = app.create_user("learner", UserType::Regular).await;
    let (_, other_token) = app.create_user("other", UserType::Regular).await;
    let course = app.create_course("rust-basics", 1).await;
    app.grant_course(&user.id, &course.id).await;

    app.post(
        "/api/video/progress",
        &token,
        json!({ "courseId": course.id, "lessonId": "l1", "completed": true }),
    )
    .await;
    let (_, body) = app
        .post("/api/certificates/issue", &token, json!({ "courseId": course.id }))
        .await;
    let certificate_id = body["certificate"]["_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .get(&format!("/api/certificates/{}", certificate_id), &token)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .get(&format!("/api/certificates/{}", certificate_id), &other_token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/api/certificates/admin/all", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
