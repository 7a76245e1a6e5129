#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rocket::tokio;

    use crate::auth::Role;
    use crate::db::{admin_update_user, get_identity, get_user};
    use crate::error::AppError;
    use crate::models::ScheduleStatus;
    use crate::test::test_db::create_standard_test_db;

    async fn profile_rows(pool: &sqlx::Pool<sqlx::Sqlite>, user_id: i64) -> (i64, i64) {
        let trainers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trainers WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap();
        let trainees: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trainees WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap();
        (trainers, trainees)
    }

    #[tokio::test]
    async fn test_role_change_replaces_unused_profile() {
        let db = create_standard_test_db().await;
        let sam = db.user_id("sam@example.com");

        let user = admin_update_user(&db.pool, sam, None, Some(Role::Trainer))
            .await
            .expect("sam has no history and can become a trainer");
        assert_eq!(user.role, Role::Trainer);
        assert_eq!(profile_rows(&db.pool, sam).await, (1, 0));

        let identity = get_identity(&db.pool, sam).await.unwrap();
        assert!(identity.trainer_id.is_some());
        assert_eq!(identity.trainee_id, None);

        // an admin holds neither profile
        admin_update_user(&db.pool, sam, None, Some(Role::Admin))
            .await
            .unwrap();
        assert_eq!(profile_rows(&db.pool, sam).await, (0, 0));
    }

    #[tokio::test]
    async fn test_role_change_blocked_by_history() {
        let db = create_standard_test_db().await;
        let alex = db.user_id("alex@example.com");

        db.insert_schedule(
            db.trainer_id("coach@example.com"),
            db.trainee_id("alex@example.com"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            "09:00",
            60,
            ScheduleStatus::Completed,
        )
        .await
        .unwrap();

        let result = admin_update_user(&db.pool, alex, Some(false), Some(Role::Trainer)).await;
        match result {
            Err(AppError::Conflict(_)) => {}
            other => panic!("Expected Conflict, got {:?}", other),
        }

        // the whole update rolled back
        let user = get_user(&db.pool, alex).await.unwrap();
        assert_eq!(user.role, Role::Trainee);
        assert!(user.is_active);
        assert_eq!(profile_rows(&db.pool, alex).await, (0, 1));

        // a trainer with assigned clients keeps the trainer role
        let coach = db.user_id("coach@example.com");
        assert!(matches!(
            admin_update_user(&db.pool, coach, None, Some(Role::Trainee)).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(profile_rows(&db.pool, coach).await, (1, 0));
    }

    #[tokio::test]
    async fn test_same_role_keeps_profile() {
        let db = create_standard_test_db().await;
        let jo = db.user_id("jo@example.com");

        admin_update_user(&db.pool, jo, None, Some(Role::Trainee))
            .await
            .unwrap();

        let identity = get_identity(&db.pool, jo).await.unwrap();
        assert_eq!(identity.trainee_id, Some(db.trainee_id("jo@example.com")));
    }
}
