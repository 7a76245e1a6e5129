#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use rocket::tokio;

    use crate::db::{
        assign_program, create_exercise, create_program, create_schedule, create_session_card,
        delete_session_card, get_assignment, get_exercise, get_schedule, get_session_card,
        get_session_card_for, get_trainee, list_session_cards, search_session_cards,
        update_schedule, update_session_card, CardOwner, CardSearch, ExerciseInput,
        NewExerciseSet, NewSchedule, NewSessionCard, NewSessionExercise, ProgramInput,
        ScheduleUpdate, SessionCardUpdate,
    };
    use crate::error::AppError;
    use crate::models::{AssignmentStatus, ProgramStatus, Schedule, ScheduleStatus};
    use crate::test::test_db::{create_standard_test_db, TestDb};
    use crate::validation::Page;

    fn booked_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn session_day() -> NaiveDate {
        booked_at().date() + Duration::days(1)
    }

    fn finished_at() -> NaiveDateTime {
        session_day().and_hms_opt(12, 0, 0).unwrap()
    }

    fn set(reps: i64, weight: f64, completed: bool) -> NewExerciseSet {
        NewExerciseSet {
            reps: Some(reps),
            weight: Some(weight),
            duration_seconds: None,
            distance: None,
            rest_seconds: Some(90),
            completed,
            notes: None,
        }
    }

    /// Books a confirmed session for alex tied to a four-session program.
    async fn confirmed_session(db: &TestDb) -> (Schedule, i64) {
        confirmed_session_in_program(db, 4).await
    }

    async fn confirmed_session_in_program(db: &TestDb, total_weeks: i64) -> (Schedule, i64) {
        let trainer_id = db.trainer_id("coach@example.com");
        let trainee_id = db.trainee_id("alex@example.com");

        let program = create_program(
            &db.pool,
            trainer_id,
            &ProgramInput {
                name: "Base building".to_string(),
                description: None,
                total_weeks,
                sessions_per_week: 1,
                goals: vec!["Strength".to_string()],
                target_fitness_level: None,
                status: ProgramStatus::Active,
            },
        )
        .await
        .unwrap();

        let assignment = assign_program(
            &db.pool,
            trainer_id,
            program.id,
            trainee_id,
            booked_at().date(),
            None,
        )
        .await
        .unwrap();

        let schedule = create_schedule(
            &db.pool,
            trainer_id,
            &NewSchedule {
                trainee_id,
                location_id: Some(db.location_id("Main Gym")),
                program_assignment_id: Some(assignment.id),
                session_date: session_day(),
                start_time: "10:00".to_string(),
                duration_minutes: 60,
                title: "Week 1".to_string(),
                description: None,
                session_type: None,
                planned_exercises: vec![],
                notes: None,
            },
            booked_at(),
        )
        .await
        .unwrap();

        let schedule = update_schedule(
            &db.pool,
            trainer_id,
            schedule.id,
            db.user_id("coach@example.com"),
            &ScheduleUpdate {
                status: Some(ScheduleStatus::Confirmed),
                ..Default::default()
            },
            booked_at(),
        )
        .await
        .unwrap();

        (schedule, assignment.id)
    }

    fn card_for(schedule_id: i64, library_id: Option<i64>) -> NewSessionCard {
        NewSessionCard {
            schedule_id,
            overall_feedback: Some("Solid work".to_string()),
            next_session_goals: vec!["Add 5kg".to_string()],
            trainer_rating: Some(4),
            trainee_rating: None,
            exercises: vec![
                NewSessionExercise {
                    exercise_library_id: library_id,
                    name: "Back squat".to_string(),
                    category: Some("strength".to_string()),
                    notes: None,
                    form_notes: Some("Knees out".to_string()),
                    is_pr: true,
                    pr_note: Some("5RM".to_string()),
                    sets: vec![set(5, 100.0, true), set(5, 100.0, true), set(5, 105.0, false)],
                },
                NewSessionExercise {
                    exercise_library_id: None,
                    name: "Plank".to_string(),
                    category: None,
                    notes: None,
                    form_notes: None,
                    is_pr: false,
                    pr_note: None,
                    sets: vec![NewExerciseSet {
                        reps: None,
                        weight: None,
                        duration_seconds: Some(60),
                        distance: None,
                        rest_seconds: None,
                        completed: true,
                        notes: None,
                    }],
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_card_completes_schedule_and_progress() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let (schedule, assignment_id) = confirmed_session(&db).await;

        let library = create_exercise(
            &db.pool,
            trainer_id,
            &ExerciseInput {
                name: "Back squat".to_string(),
                category: "strength".to_string(),
                description: None,
                muscle_groups: vec!["legs".to_string()],
                equipment: vec!["barbell".to_string()],
                difficulty: None,
                instructions: None,
                video_url: None,
                is_public: false,
            },
        )
        .await
        .unwrap();

        let card = create_session_card(
            &db.pool,
            trainer_id,
            &card_for(schedule.id, Some(library.id)),
            finished_at(),
        )
        .await
        .expect("Failed to create session card");

        assert_eq!(card.schedule_id, schedule.id);
        assert_eq!(card.trainer_name, "Coach Carter");
        assert_eq!(card.total_exercises, 2);
        assert_eq!(card.total_sets, 3);
        assert_eq!(card.total_reps, 10);
        assert_eq!(card.total_volume, 1000.0);
        assert_eq!(card.exercises.len(), 2);
        assert_eq!(card.exercises[0].exercise_order, 1);
        assert_eq!(card.exercises[0].name, "Back squat");
        assert_eq!(card.exercises[0].sets.len(), 3);
        assert_eq!(card.exercises[0].sets[2].set_number, 3);
        assert!(!card.exercises[0].sets[2].completed);
        assert_eq!(card.exercises[1].exercise_order, 2);

        let schedule = get_schedule(&db.pool, schedule.id).await.unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Completed);
        assert_eq!(schedule.session_card_id, Some(card.id));

        let assignment = get_assignment(&db.pool, assignment_id).await.unwrap();
        assert_eq!(assignment.sessions_completed, 1);
        assert_eq!(assignment.progress_percentage, 25.0);
        assert_eq!(assignment.status, AssignmentStatus::Active);

        let trainee = get_trainee(&db.pool, db.trainee_id("alex@example.com"))
            .await
            .unwrap();
        assert_eq!(trainee.completed_sessions, 1);
        assert_eq!(trainee.current_streak, 1);
        assert_eq!(trainee.total_workout_hours, 1.0);
        assert_eq!(trainee.last_session_date, Some(session_day()));

        let library = get_exercise(&db.pool, library.id).await.unwrap();
        assert_eq!(library.usage_count, 1);

        let result = create_session_card(
            &db.pool,
            trainer_id,
            &card_for(schedule.id, None),
            finished_at(),
        )
        .await;
        match result {
            Err(AppError::Conflict(_)) => {}
            other => panic!("Expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_card_requires_confirmed_schedule() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let trainee_id = db.trainee_id("sam@example.com");

        let schedule = create_schedule(
            &db.pool,
            trainer_id,
            &NewSchedule {
                trainee_id,
                location_id: None,
                program_assignment_id: None,
                session_date: session_day(),
                start_time: "15:00".to_string(),
                duration_minutes: 45,
                title: "Intro".to_string(),
                description: None,
                session_type: None,
                planned_exercises: vec![],
                notes: None,
            },
            booked_at(),
        )
        .await
        .unwrap();

        let result = create_session_card(
            &db.pool,
            trainer_id,
            &card_for(schedule.id, None),
            finished_at(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        // nothing was written
        let (_, total) = list_session_cards(
            &db.pool,
            CardOwner::Trainer(trainer_id),
            None,
            Page {
                page: 1,
                page_size: 20,
            },
        )
        .await
        .unwrap();
        assert_eq!(total, 0);

        let result = create_session_card(
            &db.pool,
            db.trainer_id("other.coach@example.com"),
            &card_for(schedule.id, None),
            finished_at(),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_card_visibility_and_update() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let (schedule, _) = confirmed_session(&db).await;

        let card = create_session_card(
            &db.pool,
            trainer_id,
            &card_for(schedule.id, None),
            finished_at(),
        )
        .await
        .unwrap();

        get_session_card_for(
            &db.pool,
            CardOwner::Trainee(db.trainee_id("alex@example.com")),
            card.id,
        )
        .await
        .expect("owner can read card");

        let result = get_session_card_for(
            &db.pool,
            CardOwner::Trainee(db.trainee_id("sam@example.com")),
            card.id,
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = get_session_card_for(
            &db.pool,
            CardOwner::Trainer(db.trainer_id("other.coach@example.com")),
            card.id,
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let updated = update_session_card(
            &db.pool,
            trainer_id,
            card.id,
            &SessionCardUpdate {
                trainee_rating: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.trainee_rating, Some(5));
        assert_eq!(updated.trainer_rating, Some(4));
        assert_eq!(updated.overall_feedback.as_deref(), Some("Solid work"));

        let (cards, total) = list_session_cards(
            &db.pool,
            CardOwner::Trainer(trainer_id),
            Some(db.trainee_id("alex@example.com")),
            Page {
                page: 1,
                page_size: 20,
            },
        )
        .await
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(cards[0].id, card.id);
    }

    #[tokio::test]
    async fn test_deleting_card_reverts_completion() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let (schedule, assignment_id) = confirmed_session(&db).await;

        let card = create_session_card(
            &db.pool,
            trainer_id,
            &card_for(schedule.id, None),
            finished_at(),
        )
        .await
        .unwrap();

        let result = delete_session_card(
            &db.pool,
            db.trainer_id("other.coach@example.com"),
            card.id,
            finished_at(),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        delete_session_card(&db.pool, trainer_id, card.id, finished_at())
            .await
            .expect("Failed to delete card");

        assert!(matches!(
            get_session_card(&db.pool, card.id).await,
            Err(AppError::NotFound(_))
        ));

        let sets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exercise_sets")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(sets, 0);

        let schedule = get_schedule(&db.pool, schedule.id).await.unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Confirmed);
        assert_eq!(schedule.session_card_id, None);

        let assignment = get_assignment(&db.pool, assignment_id).await.unwrap();
        assert_eq!(assignment.sessions_completed, 0);
        assert_eq!(assignment.progress_percentage, 0.0);

        let trainee = get_trainee(&db.pool, db.trainee_id("alex@example.com"))
            .await
            .unwrap();
        assert_eq!(trainee.completed_sessions, 0);
        assert_eq!(trainee.last_session_date, None);
    }

    #[tokio::test]
    async fn test_deleting_card_keeps_newer_assignment_active() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let alex = db.trainee_id("alex@example.com");
        let (schedule, first) = confirmed_session_in_program(&db, 1).await;

        let card = create_session_card(
            &db.pool,
            trainer_id,
            &card_for(schedule.id, None),
            finished_at(),
        )
        .await
        .unwrap();
        assert_eq!(
            get_assignment(&db.pool, first).await.unwrap().status,
            AssignmentStatus::Completed
        );

        let next_block = create_program(
            &db.pool,
            trainer_id,
            &ProgramInput {
                name: "Next block".to_string(),
                description: None,
                total_weeks: 4,
                sessions_per_week: 2,
                goals: vec![],
                target_fitness_level: None,
                status: ProgramStatus::Active,
            },
        )
        .await
        .unwrap();
        let second = assign_program(
            &db.pool,
            trainer_id,
            next_block.id,
            alex,
            session_day() + Duration::days(1),
            None,
        )
        .await
        .expect("finished program frees the trainee for a new one");

        delete_session_card(&db.pool, trainer_id, card.id, finished_at())
            .await
            .unwrap();

        let reverted = get_assignment(&db.pool, first).await.unwrap();
        assert_eq!(reverted.sessions_completed, 0);
        assert_eq!(reverted.status, AssignmentStatus::Completed);

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM program_assignments WHERE trainee_id = ? AND status = 'active'",
        )
        .bind(alex)
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(active, 1);
        assert_eq!(
            get_assignment(&db.pool, second.id).await.unwrap().status,
            AssignmentStatus::Active
        );
    }

    #[tokio::test]
    async fn test_deleting_card_reopens_sole_assignment() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let (schedule, assignment_id) = confirmed_session_in_program(&db, 1).await;

        let card = create_session_card(
            &db.pool,
            trainer_id,
            &card_for(schedule.id, None),
            finished_at(),
        )
        .await
        .unwrap();

        delete_session_card(&db.pool, trainer_id, card.id, finished_at())
            .await
            .unwrap();

        let assignment = get_assignment(&db.pool, assignment_id).await.unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Active);
        assert_eq!(assignment.progress_percentage, 0.0);
    }

    #[tokio::test]
    async fn test_search_cards_by_date_and_exercise() {
        let db = create_standard_test_db().await;
        let trainer_id = db.trainer_id("coach@example.com");
        let alex = CardOwner::Trainee(db.trainee_id("alex@example.com"));
        let (schedule, _) = confirmed_session(&db).await;

        create_session_card(
            &db.pool,
            trainer_id,
            &card_for(schedule.id, None),
            finished_at(),
        )
        .await
        .unwrap();

        let page = Page {
            page: 1,
            page_size: 20,
        };
        let hits = |search: CardSearch| {
            let pool = db.pool.clone();
            async move {
                search_session_cards(&pool, alex, &search, page)
                    .await
                    .unwrap()
                    .1
            }
        };

        assert_eq!(hits(CardSearch::default()).await, 1);
        assert_eq!(
            hits(CardSearch {
                exercise_name: Some("squat".to_string()),
                ..Default::default()
            })
            .await,
            1
        );
        assert_eq!(
            hits(CardSearch {
                category: Some("STRENGTH".to_string()),
                ..Default::default()
            })
            .await,
            1
        );
        assert_eq!(
            hits(CardSearch {
                category: Some("cardio".to_string()),
                ..Default::default()
            })
            .await,
            0
        );
        assert_eq!(
            hits(CardSearch {
                from: Some(session_day()),
                to: Some(session_day()),
                ..Default::default()
            })
            .await,
            1
        );
        assert_eq!(
            hits(CardSearch {
                from: Some(session_day() + Duration::days(1)),
                ..Default::default()
            })
            .await,
            0
        );

        // another trainee's search never reaches alex's cards
        let (_, total) = search_session_cards(
            &db.pool,
            CardOwner::Trainee(db.trainee_id("sam@example.com")),
            &CardSearch::default(),
            page,
        )
        .await
        .unwrap();
        assert_eq!(total, 0);

        let result = search_session_cards(
            &db.pool,
            alex,
            &CardSearch {
                from: Some(session_day()),
                to: Some(session_day() - Duration::days(1)),
                ..Default::default()
            },
            page,
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
