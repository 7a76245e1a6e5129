#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::db::{create_location, create_user, get_identity, NewUser};
    use crate::error::AppError;
    use crate::models::ScheduleStatus;
    use chrono::NaiveDate;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "Password123";
    pub const TEST_BCRYPT_COST: u32 = 4;

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        locations: Vec<String>,
    }

    pub struct TestUser {
        pub email: String,
        pub name: String,
        pub role: Role,
        pub trainer_email: Option<String>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn trainer(mut self, email: &str, name: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                name: name.to_string(),
                role: Role::Trainer,
                trainer_email: None,
            });
            self
        }

        /// Trainees are created after every trainer, so `trainer_email` may
        /// name a trainer added later in the chain.
        pub fn trainee(mut self, email: &str, name: &str, trainer_email: Option<&str>) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                name: name.to_string(),
                role: Role::Trainee,
                trainer_email: trainer_email.map(String::from),
            });
            self
        }

        pub fn admin(mut self, email: &str, name: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                name: name.to_string(),
                role: Role::Admin,
                trainer_email: None,
            });
            self
        }

        pub fn location(mut self, name: &str) -> Self {
            self.locations.push(name.to_string());
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            // every connection to sqlite::memory: is its own database
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut db = TestDb {
                pool,
                user_ids: HashMap::new(),
                trainer_ids: HashMap::new(),
                trainee_ids: HashMap::new(),
                location_ids: HashMap::new(),
            };

            let (trainers, others): (Vec<_>, Vec<_>) = self
                .users
                .into_iter()
                .partition(|u| u.role == Role::Trainer);

            for user in trainers.into_iter().chain(others) {
                let trainer_id = match &user.trainer_email {
                    Some(email) => db.trainer_ids.get(email).copied(),
                    None => None,
                };

                let new_user = NewUser {
                    email: user.email.clone(),
                    password: STANDARD_PASSWORD.to_string(),
                    name: user.name.clone(),
                    role: user.role,
                    phone_number: None,
                    trainer_id,
                };

                let user_id = create_user(&db.pool, &new_user, TEST_BCRYPT_COST).await?;
                let identity = get_identity(&db.pool, user_id).await?;

                db.user_ids.insert(user.email.clone(), user_id);
                if let Some(id) = identity.trainer_id {
                    db.trainer_ids.insert(user.email.clone(), id);
                }
                if let Some(id) = identity.trainee_id {
                    db.trainee_ids.insert(user.email.clone(), id);
                }
            }

            for name in self.locations {
                let id = create_location(&db.pool, &name, None, None, None).await?;
                db.location_ids.insert(name, id);
            }

            Ok(db)
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_ids: HashMap<String, i64>,
        pub trainer_ids: HashMap<String, i64>,
        pub trainee_ids: HashMap<String, i64>,
        pub location_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, email: &str) -> i64 {
            self.user_ids[email]
        }

        pub fn trainer_id(&self, email: &str) -> i64 {
            self.trainer_ids[email]
        }

        pub fn trainee_id(&self, email: &str) -> i64 {
            self.trainee_ids[email]
        }

        pub fn location_id(&self, name: &str) -> i64 {
            self.location_ids[name]
        }

        /// Inserts a schedule row directly, bypassing the booking rules.
        /// Used to lay down history in the past.
        pub async fn insert_schedule(
            &self,
            trainer_id: i64,
            trainee_id: i64,
            date: NaiveDate,
            start_time: &str,
            duration_minutes: i64,
            status: ScheduleStatus,
        ) -> Result<i64, sqlx::Error> {
            let res = sqlx::query(
                "INSERT INTO schedules
                 (trainer_id, trainee_id, session_date, start_time, duration_minutes, title, status)
                 VALUES (?, ?, ?, ?, ?, 'Training', ?)",
            )
            .bind(trainer_id)
            .bind(trainee_id)
            .bind(date)
            .bind(start_time)
            .bind(duration_minutes)
            .bind(status)
            .execute(&self.pool)
            .await?;

            Ok(res.last_insert_rowid())
        }
    }

    /// One trainer with two clients, a second trainer with one, and an admin.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .trainer("coach@example.com", "Coach Carter")
            .trainer("other.coach@example.com", "Other Coach")
            .trainee("alex@example.com", "Alex", Some("coach@example.com"))
            .trainee("sam@example.com", "Sam", Some("coach@example.com"))
            .trainee("jo@example.com", "Jo", Some("other.coach@example.com"))
            .admin("admin@example.com", "Admin")
            .location("Main Gym")
            .build()
            .await
            .expect("Failed to build test database")
    }
}

#[cfg(test)]
pub mod test_utils {
    pub use super::test_db::{create_standard_test_db, TestDb, TestDbBuilder, STANDARD_PASSWORD};

    use crate::api::auth::AuthResponse;
    use crate::env::Config;
    use crate::init_rocket;
    use crate::validation::ApiResponse;
    use rocket::http::{ContentType, Header};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use serde::de::DeserializeOwned;
    use serde_json::json;

    use super::test_db::TEST_BCRYPT_COST;

    pub fn test_config() -> Config {
        Config {
            bcrypt_cost: TEST_BCRYPT_COST,
            ..Config::default()
        }
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone(), test_config()).await;
        let client = Client::untracked(rocket)
            .await
            .expect("valid rocket instance");

        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, email: &str) -> String {
        let response = client
            .post("/api/v1/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": STANDARD_PASSWORD }).to_string())
            .dispatch()
            .await;

        let body: ApiResponse<AuthResponse> = read_json(response).await;
        body.data.expect("login returned no data").token
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }

    pub async fn read_json<T: DeserializeOwned>(response: LocalResponse<'_>) -> T {
        let body = response.into_string().await.expect("response body");
        serde_json::from_str(&body).unwrap_or_else(|e| panic!("bad json {}: {}", e, body))
    }
}
