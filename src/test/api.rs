#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rocket::http::{ContentType, Header, Status};
    use serde_json::{json, Value};

    use crate::db::{
        create_session_card, record_metric, NewExerciseSet, NewMetric, NewSessionCard,
        NewSessionExercise,
    };
    use crate::models::{MetricType, ScheduleStatus};
    use crate::test::test_utils::{
        bearer, create_standard_test_db, login_test_user, read_json, setup_test_client, TestDb,
    };

    fn exercise(name: &str, category: &str, sets: &[(i64, f64)]) -> NewSessionExercise {
        NewSessionExercise {
            exercise_library_id: None,
            name: name.to_string(),
            category: Some(category.to_string()),
            notes: None,
            form_notes: None,
            is_pr: false,
            pr_note: None,
            sets: sets
                .iter()
                .map(|(reps, weight)| NewExerciseSet {
                    reps: Some(*reps),
                    weight: Some(*weight),
                    duration_seconds: None,
                    distance: None,
                    rest_seconds: None,
                    completed: true,
                    notes: None,
                })
                .collect(),
        }
    }

    /// Lays down a confirmed past session for alex and records a card on it.
    async fn logged_session(
        db: &TestDb,
        days_ago: i64,
        minutes: i64,
        exercises: Vec<NewSessionExercise>,
    ) -> i64 {
        let trainer_id = db.trainer_id("coach@example.com");
        let date = (Utc::now() - Duration::days(days_ago)).date_naive();
        let schedule_id = db
            .insert_schedule(
                trainer_id,
                db.trainee_id("alex@example.com"),
                date,
                "09:00",
                minutes,
                ScheduleStatus::Confirmed,
            )
            .await
            .unwrap();

        create_session_card(
            &db.pool,
            trainer_id,
            &NewSessionCard {
                schedule_id,
                overall_feedback: None,
                next_session_goals: vec![],
                trainer_rating: None,
                trainee_rating: None,
                exercises,
            },
            Utc::now().naive_utc(),
        )
        .await
        .unwrap()
        .id
    }

    async fn weigh_in(db: &TestDb, days_ago: i64, metric_type: MetricType, value: f64) {
        record_metric(
            &db.pool,
            db.trainee_id("alex@example.com"),
            db.user_id("coach@example.com"),
            &NewMetric {
                recorded_on: (Utc::now() - Duration::days(days_ago)).date_naive(),
                metric_type,
                value,
                unit: "kg".to_string(),
                measurement_type: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    }

    #[rocket::async_test]
    async fn test_health() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/api/v1/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "ok");
    }

    #[rocket::async_test]
    async fn test_cors_for_listed_origin() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .get("/api/v1/health")
            .header(Header::new("Origin", "http://localhost:5173"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let headers = response.headers();
        assert_eq!(
            headers.get_one("Access-Control-Allow-Origin"),
            Some("http://localhost:5173")
        );
        assert_eq!(headers.get_one("Access-Control-Allow-Credentials"), Some("true"));
        assert!(headers.get_one("Access-Control-Allow-Methods").is_none());

        let response = client
            .options("/api/v1/trainer/clients")
            .header(Header::new("Origin", "http://localhost:5173"))
            .header(Header::new("Access-Control-Request-Method", "PATCH"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NoContent);
        let methods = response
            .headers()
            .get_one("Access-Control-Allow-Methods")
            .unwrap()
            .to_string();
        assert!(methods.contains("PATCH"));
        assert!(response
            .headers()
            .get_one("Access-Control-Allow-Headers")
            .unwrap()
            .contains("Authorization"));

        let response = client
            .get("/api/v1/health")
            .header(Header::new("Origin", "https://elsewhere.example"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert!(response
            .headers()
            .get_one("Access-Control-Allow-Origin")
            .is_none());
    }

    #[rocket::async_test]
    async fn test_auth_required() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        for endpoint in [
            "/api/v1/auth/me",
            "/api/v1/notifications",
            "/api/v1/trainer/clients",
            "/api/v1/trainee/stats",
        ] {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );

            let body: Value = read_json(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        }

        let response = client
            .get("/api/v1/auth/me")
            .header(bearer("forged_token"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_login_and_me() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/api/v1/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": "coach@example.com", "password": "WrongPass1" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
        let body: Value = read_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let token = login_test_user(&client, "coach@example.com").await;
        let response = client
            .get("/api/v1/auth/me")
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["user"]["email"], "coach@example.com");
        assert_eq!(body["data"]["user"]["role"], "trainer");
        assert_eq!(body["data"]["trainer"]["name"], "Coach Carter");
        assert!(body["data"].get("trainee").is_none());

        let response = client
            .post("/api/v1/auth/logout")
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .get("/api/v1/auth/me")
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_register() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let trainer_id = db.trainer_id("coach@example.com");

        let response = client
            .post("/api/v1/auth/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "new.client@example.com",
                    "password": "Password123",
                    "name": "New Client",
                    "role": "trainee",
                    "trainerId": trainer_id
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = read_json(response).await;
        let token = body["data"]["token"].as_str().unwrap().to_string();

        let response = client
            .get("/api/v1/auth/me")
            .header(bearer(&token))
            .dispatch()
            .await;
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["trainee"]["trainerId"], trainer_id);

        // duplicate email
        let response = client
            .post("/api/v1/auth/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "new.client@example.com",
                    "password": "Password123",
                    "name": "Again",
                    "role": "trainee"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);

        let response = client
            .post("/api/v1/auth/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "weak@example.com",
                    "password": "short",
                    "name": "Weak",
                    "role": "trainer"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = read_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
        assert!(body["error"]["details"]["password"].is_array());

        let response = client
            .post("/api/v1/auth/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "root@example.com",
                    "password": "Password123",
                    "name": "Root",
                    "role": "admin"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_role_gate() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;
        let trainee = login_test_user(&client, "alex@example.com").await;
        let trainer = login_test_user(&client, "coach@example.com").await;

        let response = client
            .get("/api/v1/trainer/clients")
            .header(bearer(&trainee))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
        let body: Value = read_json(response).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let response = client
            .get("/api/v1/trainee/stats")
            .header(bearer(&trainer))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .get("/api/v1/admin/users")
            .header(bearer(&trainer))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let admin = login_test_user(&client, "admin@example.com").await;
        let response = client
            .get("/api/v1/admin/users?role=trainee")
            .header(bearer(&admin))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["totalItems"], 3);
    }

    #[rocket::async_test]
    async fn test_pagination_bounds() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "coach@example.com").await;

        let response = client
            .get("/api/v1/trainer/clients?pageSize=0")
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = read_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_INPUT");

        let response = client
            .get("/api/v1/trainer/clients?page=1&pageSize=1")
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["pageSize"], 1);
        assert_eq!(body["data"]["totalItems"], 2);
        assert_eq!(body["data"]["totalPages"], 2);
        assert_eq!(body["data"]["data"].as_array().unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn test_client_ownership() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "coach@example.com").await;
        let jo = db.trainee_id("jo@example.com");
        let alex = db.trainee_id("alex@example.com");

        let response = client
            .get(format!("/api/v1/trainer/clients/{}", jo))
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client
            .get(format!("/api/v1/trainer/clients/{}", alex))
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        // shared routes answer 403 for someone else's trainee
        let response = client
            .get(format!("/api/v1/trainees/{}/stats", jo))
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .get(format!("/api/v1/trainees/{}/stats", alex))
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["stats"]["completedSessions"], 0);
    }

    #[rocket::async_test]
    async fn test_trainee_routes_hide_existence() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let jo = db.trainee_id("jo@example.com");

        for email in ["alex@example.com", "coach@example.com"] {
            let token = login_test_user(&client, email).await;

            for path in ["stats", "schedules/upcoming"] {
                let foreign = client
                    .get(format!("/api/v1/trainees/{}/{}", jo, path))
                    .header(bearer(&token))
                    .dispatch()
                    .await;
                let missing = client
                    .get(format!("/api/v1/trainees/99999/{}", path))
                    .header(bearer(&token))
                    .dispatch()
                    .await;

                assert_eq!(foreign.status(), Status::Forbidden, "{} -> jo {}", email, path);
                assert_eq!(
                    missing.status(),
                    foreign.status(),
                    "{} could tell a missing trainee from a foreign one on {}",
                    email,
                    path
                );
            }
        }

        // admins see everyone, so a missing trainee is just missing
        let admin = login_test_user(&client, "admin@example.com").await;
        let response = client
            .get("/api/v1/trainees/99999/stats")
            .header(bearer(&admin))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_booking_flow() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let trainer = login_test_user(&client, "coach@example.com").await;
        let trainee = login_test_user(&client, "alex@example.com").await;
        let tomorrow = (Utc::now() + Duration::days(1)).date_naive();

        let booking = json!({
            "traineeId": db.trainee_id("alex@example.com"),
            "sessionDate": tomorrow.to_string(),
            "startTime": "10:00",
            "durationMinutes": 60,
            "title": "Lower body"
        });

        let response = client
            .post("/api/v1/trainer/schedules")
            .header(ContentType::JSON)
            .header(bearer(&trainer))
            .body(booking.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["status"], "scheduled");

        let response = client
            .post("/api/v1/trainer/schedules")
            .header(ContentType::JSON)
            .header(bearer(&trainer))
            .body(booking.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
        let body: Value = read_json(response).await;
        assert_eq!(body["error"]["code"], "CONFLICT");

        let response = client
            .get("/api/v1/trainee/schedules/upcoming")
            .header(bearer(&trainee))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        let upcoming = body["data"]["upcomingSessions"].as_array().unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0]["title"], "Lower body");
        assert_eq!(body["data"]["calendar"].as_array().unwrap().len(), 7);
        assert_eq!(body["data"]["windowDays"], 7);

        // oversized windows are clamped, not reset to the default
        let response = client
            .get("/api/v1/trainee/schedules/upcoming?days=400")
            .header(bearer(&trainee))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["windowDays"], 366);
        assert_eq!(body["data"]["calendar"].as_array().unwrap().len(), 366);

        let response = client
            .get("/api/v1/notifications?unreadOnly=true")
            .header(bearer(&trainee))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["unreadCount"], 1);

        for expected in [1, 0] {
            let response = client
                .put("/api/v1/notifications/read-all")
                .header(bearer(&trainee))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);
            let body: Value = read_json(response).await;
            assert_eq!(body["data"]["updated"], expected);
        }
    }

    #[rocket::async_test]
    async fn test_trainer_analytics() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let alex = db.trainee_id("alex@example.com");

        logged_session(
            &db,
            3,
            60,
            vec![exercise("Back squat", "strength", &[(5, 100.0), (5, 100.0)])],
        )
        .await;
        logged_session(
            &db,
            10,
            45,
            vec![
                exercise("Back squat", "strength", &[(5, 90.0)]),
                exercise("Deadlift", "strength", &[(3, 140.0)]),
            ],
        )
        .await;
        db.insert_schedule(
            db.trainer_id("coach@example.com"),
            alex,
            (Utc::now() - Duration::days(5)).date_naive(),
            "09:00",
            60,
            ScheduleStatus::NoShow,
        )
        .await
        .unwrap();
        weigh_in(&db, 10, MetricType::Weight, 80.0).await;
        weigh_in(&db, 3, MetricType::Weight, 78.5).await;
        weigh_in(&db, 3, MetricType::BodyFat, 20.0).await;

        let coach = login_test_user(&client, "coach@example.com").await;

        let response = client
            .get(format!("/api/v1/trainer/analytics/clients/{}", alex))
            .header(bearer(&coach))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        let data = &body["data"];
        assert_eq!(data["name"], "Alex");
        assert_eq!(data["totalSessions"], 3);
        assert_eq!(data["completedSessions"], 2);
        assert_eq!(data["attendanceRate"], 66.67);
        assert_eq!(data["averageSessionDuration"], 53);
        assert_eq!(data["weightProgress"].as_array().unwrap().len(), 2);
        assert_eq!(data["weightChange"], -1.5);
        assert_eq!(data["bodyFatProgress"].as_array().unwrap().len(), 1);
        assert!(data["bodyFatChange"].is_null());
        assert_eq!(data["topExercises"][0]["name"], "Back squat");
        assert_eq!(data["topExercises"][0]["sessions"], 2);
        assert_eq!(data["topExercises"][0]["maxWeight"], 100.0);
        assert_eq!(data["topExercises"][0]["totalVolume"], 1450.0);
        assert_eq!(data["topExercises"][1]["name"], "Deadlift");

        let response = client
            .get("/api/v1/trainer/analytics/overview?weeks=4")
            .header(bearer(&coach))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        let data = &body["data"];
        assert_eq!(data["weeks"], 4);
        assert_eq!(data["totalClients"], 2);
        assert_eq!(data["retainedClients"], 1);
        assert_eq!(data["clientRetentionRate"], 50.0);
        assert_eq!(data["attendanceRate"], 66.67);
        let weeks = data["sessionsPerWeek"].as_array().unwrap();
        assert_eq!(weeks.len(), 4);
        let counted: i64 = weeks.iter().map(|w| w["count"].as_i64().unwrap()).sum();
        assert_eq!(counted, 2);
        assert_eq!(data["popularExercises"][0], "Back squat");

        let response = client
            .get("/api/v1/trainer/analytics/overview?weeks=500")
            .header(bearer(&coach))
            .dispatch()
            .await;
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["weeks"], 52);

        // other trainers' clients are invisible
        let response = client
            .get(format!(
                "/api/v1/trainer/analytics/clients/{}",
                db.trainee_id("jo@example.com")
            ))
            .header(bearer(&coach))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let trainee = login_test_user(&client, "alex@example.com").await;
        let response = client
            .get("/api/v1/trainer/analytics/overview")
            .header(bearer(&trainee))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_session_history_routes() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let alex = db.trainee_id("alex@example.com");

        logged_session(
            &db,
            2,
            60,
            vec![exercise("Back squat", "strength", &[(5, 100.0)])],
        )
        .await;
        logged_session(
            &db,
            9,
            30,
            vec![exercise("Rowing", "cardio", &[(1, 0.0)])],
        )
        .await;

        let coach = login_test_user(&client, "coach@example.com").await;
        let response = client
            .get(format!("/api/v1/trainer/clients/{}/sessions?pageSize=1", alex))
            .header(bearer(&coach))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["totalItems"], 2);
        assert_eq!(body["data"]["data"].as_array().unwrap().len(), 1);

        let other = login_test_user(&client, "other.coach@example.com").await;
        let response = client
            .get(format!("/api/v1/trainer/clients/{}/sessions", alex))
            .header(bearer(&other))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let trainee = login_test_user(&client, "alex@example.com").await;
        let response = client
            .get("/api/v1/trainee/sessions/search?exerciseName=SQUAT")
            .header(bearer(&trainee))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["totalItems"], 1);

        let response = client
            .get("/api/v1/trainee/sessions/search?category=cardio")
            .header(bearer(&trainee))
            .dispatch()
            .await;
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["totalItems"], 1);
        assert_eq!(body["data"]["data"][0]["durationMinutes"], 30);

        let from = (Utc::now() - Duration::days(5)).date_naive();
        let response = client
            .get(format!("/api/v1/trainee/sessions/search?fromDate={}", from))
            .header(bearer(&trainee))
            .dispatch()
            .await;
        let body: Value = read_json(response).await;
        assert_eq!(body["data"]["totalItems"], 1);

        for query in ["fromDate=yesterday", "fromDate=2030-02-01&toDate=2030-01-01"] {
            let response = client
                .get(format!("/api/v1/trainee/sessions/search?{}", query))
                .header(bearer(&trainee))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::BadRequest, "{}", query);
        }

        let response = client
            .get("/api/v1/trainee/programs/99999")
            .header(bearer(&trainee))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }
}
