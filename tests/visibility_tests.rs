// tests/visibility_tests.rs

use std::collections::HashMap;

use examind::{config::Config, routes, state::AppState, utils::hash::hash_password};
use serde_json::json;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

async fn spawn_app() -> (String, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "visibility_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };
    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

async fn seed_user(pool: &SqlitePool, username: &str, password: &str, role: &str) -> i64 {
    let hashed = hash_password(password).unwrap();
    sqlx::query_scalar("INSERT INTO users (username, password, role) VALUES (?, ?, ?) RETURNING id")
        .bind(username)
        .bind(hashed)
        .bind(role)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn seed_subject(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO subjects (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn seed_category(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO categories (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn seed_question(
    pool: &SqlitePool,
    subject_id: i64,
    text: &str,
    options: &[(&str, bool)],
) -> i64 {
    let options_json: Vec<serde_json::Value> = options
        .iter()
        .map(|(text, correct)| json!({"text": text, "is_correct": correct}))
        .collect();

    sqlx::query_scalar(
        "INSERT INTO questions (subject_id, text, options) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(subject_id)
    .bind(text)
    .bind(serde_json::Value::Array(options_json).to_string())
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_exam(
    pool: &SqlitePool,
    category_id: i64,
    created_by: i64,
    question_ids: &[i64],
    marks_per_question: f64,
    negative_marks: f64,
) -> i64 {
    let total_marks = marks_per_question * question_ids.len() as f64;
    sqlx::query_scalar(
        r#"
        INSERT INTO exams
            (title, category_id, duration_minutes, marks_per_question,
             negative_marks, total_marks, question_ids, created_by)
        VALUES ('Seeded exam', ?, 60, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(category_id)
    .bind(marks_per_question)
    .bind(negative_marks)
    .bind(total_marks)
    .bind(serde_json::to_string(question_ids).unwrap())
    .bind(created_by)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn login(address: &str, client: &reqwest::Client, username: &str, password: &str) -> String {
    let resp = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    resp["token"].as_str().unwrap().to_string()
}

async fn register_and_login(
    address: &str,
    client: &reqwest::Client,
    username: &str,
    password: &str,
) -> String {
    client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .unwrap();
    login(address, client, username, password).await
}

async fn submit(
    address: &str,
    client: &reqwest::Client,
    token: &str,
    exam_id: i64,
    answers: &HashMap<i64, serde_json::Value>,
) -> serde_json::Value {
    let resp = client
        .post(format!("{}/api/attempts", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({"exam_id": exam_id, "answers": answers}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    resp.json().await.unwrap()
}

async fn publish(
    address: &str,
    client: &reqwest::Client,
    admin_token: &str,
    exam_id: i64,
    publish_at: &str,
) {
    let resp = client
        .put(format!("{}/api/admin/results/{}/publish", address, exam_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&json!({"publish_at": publish_at}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

async fn my_achievement(
    address: &str,
    client: &reqwest::Client,
    token: &str,
) -> serde_json::Value {
    client
        .get(format!("{}/api/achievements/me", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

const PAST: &str = "2020-01-01T00:00:00Z";
const FUTURE: &str = "2999-01-01T00:00:00Z";

#[tokio::test]
async fn fresh_user_gets_zeroed_profile() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register_and_login(&address, &client, &unique_name("u"), "password123").await;

    let body = my_achievement(&address, &client, &token).await;

    assert_eq!(body["rating"], 0);
    assert_eq!(body["medals"], 0);
    assert_eq!(body["expertise"], json!([]));
    assert_eq!(body["subjects_score"], json!([]));
    assert_eq!(body["visible_attempts"], json!([]));
}

/// The stored profile keeps the full rating, but until staff publish the
/// exam's result the student's view shows none of it.
#[tokio::test]
async fn unpublished_attempt_is_invisible_until_published() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let admin_name = unique_name("adm");
    let admin = seed_user(&pool, &admin_name, "password123", "admin").await;
    let subject = seed_subject(&pool, &unique_name("subj")).await;
    let category = seed_category(&pool, &unique_name("cat")).await;
    let q1 = seed_question(&pool, subject, "Q1", &[("a", true), ("b", false)]).await;
    let exam = seed_exam(&pool, category, admin, &[q1], 4.0, -1.0).await;

    let username = unique_name("u");
    let token = register_and_login(&address, &client, &username, "password123").await;

    let mut answers = HashMap::new();
    answers.insert(q1, json!([0]));
    submit(&address, &client, &token, exam, &answers).await;

    // Exactly one publish control was created, unpublished.
    let (controls, publish_at): (i64, Option<String>) = {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM publish_controls WHERE exam_id = ?")
                .bind(exam)
                .fetch_one(&pool)
                .await
                .unwrap();
        let at: Option<String> =
            sqlx::query_scalar("SELECT publish_at FROM publish_controls WHERE exam_id = ?")
                .bind(exam)
                .fetch_one(&pool)
                .await
                .unwrap();
        (count, at)
    };
    assert_eq!(controls, 1);
    assert_eq!(publish_at, None);

    // Stored rating is 100; the filtered view shows nothing yet.
    let stored_rating: i64 = sqlx::query_scalar(
        "SELECT rating FROM achievements a JOIN users u ON u.id = a.user_id WHERE u.username = ?",
    )
    .bind(&username)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored_rating, 100);

    let hidden = my_achievement(&address, &client, &token).await;
    assert_eq!(hidden["rating"], 0);
    assert_eq!(hidden["subjects_score"], json!([]));
    assert_eq!(hidden["visible_attempts"], json!([]));

    // Result review is gated too.
    let review = client
        .get(format!("{}/api/results/{}/mine", address, exam))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(review.status().as_u16(), 403);

    // Publish in the past: everything becomes visible.
    let admin_token = login(&address, &client, &admin_name, "password123").await;
    publish(&address, &client, &admin_token, exam, PAST).await;

    let visible = my_achievement(&address, &client, &token).await;
    assert_eq!(visible["rating"], 100);
    assert_eq!(visible["subjects_score"][0]["marks"], 100.0);
    assert_eq!(visible["visible_attempts"].as_array().unwrap().len(), 1);
    assert_eq!(visible["visible_attempts"][0]["exam_id"], exam);

    let review: serde_json::Value = client
        .get(format!("{}/api/results/{}/mine", address, exam))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(review["total_score"], 100.0);
    assert_eq!(review["answers"][0]["question"]["correct_options"], json!([0]));
    assert_eq!(review["answers"][0]["is_correct"], true);
}

#[tokio::test]
async fn future_publish_date_keeps_results_hidden() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let admin_name = unique_name("adm");
    let admin = seed_user(&pool, &admin_name, "password123", "admin").await;
    let subject = seed_subject(&pool, &unique_name("subj")).await;
    let category = seed_category(&pool, &unique_name("cat")).await;
    let q1 = seed_question(&pool, subject, "Q1", &[("a", true), ("b", false)]).await;
    let exam = seed_exam(&pool, category, admin, &[q1], 4.0, -1.0).await;

    let token = register_and_login(&address, &client, &unique_name("u"), "password123").await;
    let mut answers = HashMap::new();
    answers.insert(q1, json!([0]));
    submit(&address, &client, &token, exam, &answers).await;

    let admin_token = login(&address, &client, &admin_name, "password123").await;
    publish(&address, &client, &admin_token, exam, FUTURE).await;

    let body = my_achievement(&address, &client, &token).await;
    assert_eq!(body["rating"], 0);
    assert_eq!(body["visible_attempts"], json!([]));

    // The published-exams listing does not advertise it either.
    let listing: Vec<serde_json::Value> = client
        .get(format!("{}/api/results", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listing.iter().all(|e| e["exam_id"].as_i64() != Some(exam)));
}

/// Hiding one of two contributions to the same subject reverses the mean
/// exactly: only the published exam's percentage remains.
#[tokio::test]
async fn hidden_contribution_is_backed_out_of_subject_mean() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let admin_name = unique_name("adm");
    let admin = seed_user(&pool, &admin_name, "password123", "admin").await;
    let subject = seed_subject(&pool, &unique_name("subj")).await;
    let category = seed_category(&pool, &unique_name("cat")).await;
    let q1 = seed_question(&pool, subject, "Q1", &[("a", true), ("b", false)]).await;
    let q2 = seed_question(&pool, subject, "Q2", &[("a", true), ("b", false)]).await;
    let published_exam = seed_exam(&pool, category, admin, &[q1], 4.0, -1.0).await;
    let hidden_exam = seed_exam(&pool, category, admin, &[q2], 4.0, -1.0).await;

    let username = unique_name("u");
    let token = register_and_login(&address, &client, &username, "password123").await;

    // 100% on the exam that will be published.
    let mut right = HashMap::new();
    right.insert(q1, json!([0]));
    submit(&address, &client, &token, published_exam, &right).await;

    // -25% on the exam that stays hidden.
    let mut wrong = HashMap::new();
    wrong.insert(q2, json!([1]));
    submit(&address, &client, &token, hidden_exam, &wrong).await;

    // Stored mean across both: (100 + -25) / 2 = 37.5 over 2 samples.
    let stored: String = sqlx::query_scalar(
        "SELECT subjects_score FROM achievements a JOIN users u ON u.id = a.user_id WHERE u.username = ?",
    )
    .bind(&username)
    .fetch_one(&pool)
    .await
    .unwrap();
    let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(stored[0]["marks"], 37.5);
    assert_eq!(stored[0]["samples"], 2);

    let admin_token = login(&address, &client, &admin_name, "password123").await;
    publish(&address, &client, &admin_token, published_exam, PAST).await;

    let body = my_achievement(&address, &client, &token).await;
    // Rating: stored 100 + (-25) = 75, hidden -25 backed out -> 100.
    assert_eq!(body["rating"], 100);
    assert_eq!(body["subjects_score"][0]["marks"], 100.0);
    assert_eq!(body["subjects_score"][0]["samples"], 1);
    assert_eq!(body["visible_attempts"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["visible_attempts"][0]["exam_id"],
        published_exam
    );
}

/// Negative totals are persisted verbatim on the attempt and the stored
/// rating, and floored at zero only in the displayed view.
#[tokio::test]
async fn negative_scores_floor_at_display_time_only() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let admin_name = unique_name("adm");
    let admin = seed_user(&pool, &admin_name, "password123", "admin").await;
    let subject = seed_subject(&pool, &unique_name("subj")).await;
    let category = seed_category(&pool, &unique_name("cat")).await;
    let q1 = seed_question(&pool, subject, "Q1", &[("a", true), ("b", false)]).await;
    // Harsh penalty: one wrong answer outweighs the whole exam.
    let exam = seed_exam(&pool, category, admin, &[q1], 4.0, -5.0).await;

    let username = unique_name("u");
    let token = register_and_login(&address, &client, &username, "password123").await;

    let mut answers = HashMap::new();
    answers.insert(q1, json!([1]));
    let body = submit(&address, &client, &token, exam, &answers).await;
    assert_eq!(body["total_score"], -125.0);
    assert_eq!(body["profile_delta"]["rating_delta"], -125);

    let stored_total: f64 = sqlx::query_scalar("SELECT total_score FROM attempts WHERE exam_id = ?")
        .bind(exam)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored_total, -125.0);

    let stored_rating: i64 = sqlx::query_scalar(
        "SELECT rating FROM achievements a JOIN users u ON u.id = a.user_id WHERE u.username = ?",
    )
    .bind(&username)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored_rating, -125);

    let admin_token = login(&address, &client, &admin_name, "password123").await;
    publish(&address, &client, &admin_token, exam, PAST).await;

    let visible = my_achievement(&address, &client, &token).await;
    assert_eq!(visible["rating"], 0);
    // The attempt itself still reports the true signed score.
    assert_eq!(visible["visible_attempts"][0]["total_score"], -125.0);
}

/// Two students hitting a brand-new exam at the same time must end up
/// with exactly one publish control between them.
#[tokio::test]
async fn concurrent_first_submissions_create_one_publish_control() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let admin = seed_user(&pool, &unique_name("adm"), "password123", "admin").await;
    let subject = seed_subject(&pool, &unique_name("subj")).await;
    let category = seed_category(&pool, &unique_name("cat")).await;
    let q1 = seed_question(&pool, subject, "Q1", &[("a", true), ("b", false)]).await;
    let exam = seed_exam(&pool, category, admin, &[q1], 4.0, -1.0).await;

    let token_a = register_and_login(&address, &client, &unique_name("ua"), "password123").await;
    let token_b = register_and_login(&address, &client, &unique_name("ub"), "password123").await;

    let mut answers = HashMap::new();
    answers.insert(q1, json!([0]));

    let (a, b) = tokio::join!(
        submit(&address, &client, &token_a, exam, &answers),
        submit(&address, &client, &token_b, exam, &answers),
    );
    assert_eq!(a["total_score"], 100.0);
    assert_eq!(b["total_score"], 100.0);

    let controls: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM publish_controls WHERE exam_id = ?")
            .bind(exam)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(controls, 1);
}

/// Two near-simultaneous submissions by the same student (different
/// exams, two browser tabs) must both land on the profile.
#[tokio::test]
async fn concurrent_same_user_submissions_lose_no_update() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let admin = seed_user(&pool, &unique_name("adm"), "password123", "admin").await;
    let subject = seed_subject(&pool, &unique_name("subj")).await;
    let category = seed_category(&pool, &unique_name("cat")).await;
    let q1 = seed_question(&pool, subject, "Q1", &[("a", true), ("b", false)]).await;
    let q2 = seed_question(&pool, subject, "Q2", &[("a", true), ("b", false)]).await;
    let exam_a = seed_exam(&pool, category, admin, &[q1], 4.0, -1.0).await;
    let exam_b = seed_exam(&pool, category, admin, &[q2], 4.0, -1.0).await;

    let username = unique_name("u");
    let token = register_and_login(&address, &client, &username, "password123").await;

    let mut right_a = HashMap::new();
    right_a.insert(q1, json!([0]));
    let mut right_b = HashMap::new();
    right_b.insert(q2, json!([0]));

    tokio::join!(
        submit(&address, &client, &token, exam_a, &right_a),
        submit(&address, &client, &token, exam_b, &right_b),
    );

    let (rating, version): (i64, i64) = {
        let rating: i64 = sqlx::query_scalar(
            "SELECT rating FROM achievements a JOIN users u ON u.id = a.user_id WHERE u.username = ?",
        )
        .bind(&username)
        .fetch_one(&pool)
        .await
        .unwrap();
        let version: i64 = sqlx::query_scalar(
            "SELECT version FROM achievements a JOIN users u ON u.id = a.user_id WHERE u.username = ?",
        )
        .bind(&username)
        .fetch_one(&pool)
        .await
        .unwrap();
        (rating, version)
    };

    // Both 100% attempts merged: neither overwrote the other.
    assert_eq!(rating, 200);
    assert_eq!(version, 2);
}

#[tokio::test]
async fn leaderboard_orders_by_rating_then_medals() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let admin = seed_user(&pool, &unique_name("adm"), "password123", "admin").await;
    let subject = seed_subject(&pool, &unique_name("subj")).await;
    let category = seed_category(&pool, &unique_name("cat")).await;
    let q1 = seed_question(&pool, subject, "Q1", &[("a", true), ("b", false)]).await;
    let exam = seed_exam(&pool, category, admin, &[q1], 4.0, -1.0).await;

    let high = unique_name("high");
    let low = unique_name("low");
    let token_high = register_and_login(&address, &client, &high, "password123").await;
    let token_low = register_and_login(&address, &client, &low, "password123").await;

    let mut right = HashMap::new();
    right.insert(q1, json!([0]));
    let mut wrong = HashMap::new();
    wrong.insert(q1, json!([1]));

    submit(&address, &client, &token_high, exam, &right).await;
    submit(&address, &client, &token_low, exam, &wrong).await;

    let board: Vec<serde_json::Value> = client
        .get(format!("{}/api/achievements/leaderboard", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let pos_high = board
        .iter()
        .position(|e| e["username"].as_str() == Some(high.as_str()))
        .unwrap();
    let pos_low = board
        .iter()
        .position(|e| e["username"].as_str() == Some(low.as_str()))
        .unwrap();
    assert!(pos_high < pos_low);
}
