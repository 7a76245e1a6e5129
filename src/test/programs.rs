#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use rocket::tokio;

    use crate::db::{
        assign_program, create_program, current_program, delete_program, enrolled_program,
        enrolled_programs,
        get_program_for_trainer, list_programs_for_trainer, unread_count, update_program,
        ProgramInput, ProgramUpdate,
    };
    use crate::error::AppError;
    use crate::models::{AssignmentStatus, ProgramStatus};
    use crate::test::test_db::{create_standard_test_db, TestDb};
    use crate::validation::Page;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    fn input(name: &str, status: ProgramStatus) -> ProgramInput {
        ProgramInput {
            name: name.to_string(),
            description: Some("Twelve weeks of strength".to_string()),
            total_weeks: 12,
            sessions_per_week: 3,
            goals: vec!["Strength".to_string(), "Mobility".to_string()],
            target_fitness_level: None,
            status,
        }
    }

    async fn program(db: &TestDb, name: &str, status: ProgramStatus) -> i64 {
        create_program(
            &db.pool,
            db.trainer_id("coach@example.com"),
            &input(name, status),
        )
        .await
        .expect("Failed to create program")
        .id
    }

    #[tokio::test]
    async fn test_assign_program() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let alex = db.trainee_id("alex@example.com");
        let program_id = program(&db, "Strength block", ProgramStatus::Active).await;

        let assignment = assign_program(&db.pool, trainer_id, program_id, alex, start(), Some("Go"))
            .await
            .expect("Failed to assign program");

        assert_eq!(assignment.program_name, "Strength block");
        assert_eq!(assignment.sessions_completed, 0);
        assert_eq!(assignment.total_sessions, 36);
        assert_eq!(assignment.progress_percentage, 0.0);
        assert_eq!(assignment.status, AssignmentStatus::Active);
        assert_eq!(assignment.end_date, start() + Duration::days(83));
        assert_eq!(assignment.notes.as_deref(), Some("Go"));

        let program = get_program_for_trainer(&db.pool, trainer_id, program_id)
            .await
            .unwrap();
        assert_eq!(program.total_assignments, 1);

        // the trainee hears about it
        assert_eq!(
            unread_count(&db.pool, db.user_id("alex@example.com"))
                .await
                .unwrap(),
            1
        );

        let current = current_program(&db.pool, alex)
            .await
            .unwrap()
            .expect("alex should be enrolled");
        assert_eq!(current.program.id, program_id);
        assert_eq!(current.assignment.id, assignment.id);

        assert!(current_program(&db.pool, db.trainee_id("sam@example.com"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_one_active_assignment_per_trainee() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let alex = db.trainee_id("alex@example.com");
        let first = program(&db, "First", ProgramStatus::Active).await;
        let second = program(&db, "Second", ProgramStatus::Active).await;

        assign_program(&db.pool, trainer_id, first, alex, start(), None)
            .await
            .unwrap();

        let result = assign_program(&db.pool, trainer_id, second, alex, start(), None).await;
        match result {
            Err(AppError::Conflict(_)) => {}
            other => panic!("Expected Conflict, got {:?}", other),
        }

        assert_eq!(enrolled_programs(&db.pool, alex).await.unwrap().len(), 1);

        // another trainee can still take the same program
        assign_program(
            &db.pool,
            trainer_id,
            second,
            db.trainee_id("sam@example.com"),
            start(),
            None,
        )
        .await
        .expect("sam should be assignable");
    }

    #[tokio::test]
    async fn test_only_active_programs_assignable() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let draft = program(&db, "Draft", ProgramStatus::Draft).await;

        let result = assign_program(
            &db.pool,
            trainer_id,
            draft,
            db.trainee_id("alex@example.com"),
            start(),
            None,
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let published = update_program(
            &db.pool,
            trainer_id,
            draft,
            &ProgramUpdate {
                status: Some(ProgramStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(published.status, ProgramStatus::Active);
        assert_eq!(published.name, "Draft");
        assert_eq!(published.goals.len(), 2);

        assign_program(
            &db.pool,
            trainer_id,
            draft,
            db.trainee_id("alex@example.com"),
            start(),
            None,
        )
        .await
        .expect("published program should be assignable");
    }

    #[tokio::test]
    async fn test_delete_blocked_by_active_assignment() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let enrolled = program(&db, "Enrolled", ProgramStatus::Active).await;
        let unused = program(&db, "Unused", ProgramStatus::Active).await;

        assign_program(
            &db.pool,
            trainer_id,
            enrolled,
            db.trainee_id("alex@example.com"),
            start(),
            None,
        )
        .await
        .unwrap();

        assert!(matches!(
            delete_program(&db.pool, trainer_id, enrolled).await,
            Err(AppError::Conflict(_))
        ));

        delete_program(&db.pool, trainer_id, unused)
            .await
            .expect("unused program should delete");
        assert!(matches!(
            get_program_for_trainer(&db.pool, trainer_id, unused).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_programs_scoped_to_trainer() {
        let db = create_standard_test_db().await;
        let other = db.trainer_id("other.coach@example.com");
        let program_id = program(&db, "Private", ProgramStatus::Active).await;
        program(&db, "Draft", ProgramStatus::Draft).await;

        assert!(matches!(
            get_program_for_trainer(&db.pool, other, program_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_program(&db.pool, other, program_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            assign_program(
                &db.pool,
                other,
                program_id,
                db.trainee_id("jo@example.com"),
                start(),
                None
            )
            .await,
            Err(AppError::NotFound(_))
        ));

        let page = Page {
            page: 1,
            page_size: 20,
        };
        let (_, total) = list_programs_for_trainer(&db.pool, other, None, page)
            .await
            .unwrap();
        assert_eq!(total, 0);

        let (active, total) = list_programs_for_trainer(
            &db.pool,
            db.trainer_id("coach@example.com"),
            Some(ProgramStatus::Active),
            page,
        )
        .await
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(active[0].name, "Private");
    }

    #[tokio::test]
    async fn test_enrolled_program_detail() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let alex = db.trainee_id("alex@example.com");
        let enrolled = program(&db, "Enrolled", ProgramStatus::Active).await;
        let other = program(&db, "Not for alex", ProgramStatus::Active).await;

        let assignment = assign_program(&db.pool, trainer_id, enrolled, alex, start(), None)
            .await
            .unwrap();

        let detail = enrolled_program(&db.pool, alex, enrolled).await.unwrap();
        assert_eq!(detail.program.name, "Enrolled");
        assert_eq!(detail.assignment.id, assignment.id);

        assert!(matches!(
            enrolled_program(&db.pool, alex, other).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            enrolled_program(&db.pool, db.trainee_id("sam@example.com"), enrolled).await,
            Err(AppError::NotFound(_))
        ));
    }
}
