use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl ScheduleStatus {
    /// Scheduled and confirmed sessions still occupy the trainer's calendar.
    pub fn is_active(self) -> bool {
        matches!(self, ScheduleStatus::Scheduled | ScheduleStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScheduleStatus::Completed | ScheduleStatus::Cancelled | ScheduleStatus::NoShow
        )
    }

    pub fn can_transition_to(self, next: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        match (self, next) {
            (Scheduled, Confirmed) | (Scheduled, Cancelled) => true,
            (Confirmed, Completed) | (Confirmed, Cancelled) | (Confirmed, NoShow) => true,
            (Scheduled, _) | (Confirmed, _) => false,
            (Completed, _) | (Cancelled, _) | (NoShow, _) => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Confirmed => "confirmed",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Cancelled => "cancelled",
            ScheduleStatus::NoShow => "no_show",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ProgramStatus {
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Completed,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TraineeStatus {
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MetricType {
    Weight,
    BodyFat,
    MuscleMass,
    Measurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationType {
    Schedule,
    Progress,
    Achievement,
    System,
    Message,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrainerProfile {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub profile_image: Option<String>,
    pub bio: Option<String>,
    #[sqlx(json)]
    pub specialization: Vec<String>,
    #[sqlx(json)]
    pub certifications: Vec<String>,
    pub experience_years: i64,
    pub rating: f64,
    pub total_ratings: i64,
    pub total_clients: i64,
    pub availability: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TraineeProfile {
    pub id: i64,
    pub user_id: i64,
    pub trainer_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub profile_image: Option<String>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    #[sqlx(json)]
    pub goals: Vec<String>,
    pub fitness_level: Option<SkillLevel>,
    pub medical_notes: Option<String>,
    pub status: TraineeStatus,
    pub join_date: NaiveDate,
    pub total_sessions: i64,
    pub completed_sessions: i64,
    pub cancelled_sessions: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_workout_hours: f64,
    pub last_session_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub floor: Option<String>,
    pub building: Option<String>,
    pub map_url: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: i64,
    pub trainer_id: i64,
    pub trainer_name: String,
    pub name: String,
    pub description: Option<String>,
    pub total_weeks: i64,
    pub sessions_per_week: i64,
    #[sqlx(json)]
    pub goals: Vec<String>,
    pub target_fitness_level: Option<SkillLevel>,
    pub status: ProgramStatus,
    pub total_assignments: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProgramAssignment {
    pub id: i64,
    pub program_id: i64,
    pub program_name: String,
    pub trainee_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub current_week: i64,
    pub progress_percentage: f64,
    pub sessions_completed: i64,
    pub total_sessions: i64,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: i64,
    pub trainer_id: i64,
    pub trainer_name: String,
    pub trainee_id: i64,
    pub trainee_name: String,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,
    pub program_assignment_id: Option<i64>,
    pub program_name: Option<String>,
    pub session_date: NaiveDate,
    pub start_time: String,
    pub duration_minutes: i64,
    pub title: String,
    pub description: Option<String>,
    pub session_type: Option<String>,
    #[sqlx(json)]
    pub planned_exercises: Vec<String>,
    pub status: ScheduleStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub cancelled_by: Option<i64>,
    pub session_card_id: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSet {
    pub id: i64,
    pub session_exercise_id: i64,
    pub set_number: i64,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub duration_seconds: Option<i64>,
    pub distance: Option<f64>,
    pub rest_seconds: Option<i64>,
    pub completed: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionExercise {
    pub id: i64,
    pub session_card_id: i64,
    pub exercise_library_id: Option<i64>,
    pub name: String,
    pub category: Option<String>,
    pub exercise_order: i64,
    pub notes: Option<String>,
    pub form_notes: Option<String>,
    pub total_sets: i64,
    pub total_reps: i64,
    pub total_weight: f64,
    pub total_volume: f64,
    pub is_pr: bool,
    pub pr_note: Option<String>,
    #[sqlx(skip)]
    pub sets: Vec<ExerciseSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionCard {
    pub id: i64,
    pub schedule_id: i64,
    pub trainer_id: i64,
    pub trainer_name: String,
    pub trainee_id: i64,
    pub session_date: NaiveDate,
    pub title: String,
    pub duration_minutes: i64,
    pub overall_feedback: Option<String>,
    #[sqlx(json)]
    pub next_session_goals: Vec<String>,
    pub trainer_rating: Option<i64>,
    pub trainee_rating: Option<i64>,
    pub total_exercises: i64,
    pub total_sets: i64,
    pub total_reps: i64,
    pub total_volume: f64,
    pub created_at: NaiveDateTime,
    #[sqlx(skip)]
    pub exercises: Vec<SessionExercise>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: i64,
    pub trainer_id: Option<i64>,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    #[sqlx(json)]
    pub muscle_groups: Vec<String>,
    #[sqlx(json)]
    pub equipment: Vec<String>,
    pub difficulty: Option<SkillLevel>,
    pub instructions: Option<String>,
    pub video_url: Option<String>,
    pub is_public: bool,
    pub usage_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: i64,
    pub trainee_id: i64,
    pub recorded_on: NaiveDate,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: String,
    pub measurement_type: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_id: Option<i64>,
    pub related_type: Option<String>,
    pub action_url: Option<String>,
    pub priority: Priority,
    pub is_read: bool,
    pub read_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// Insert payload for a notification; new rows always start unread.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_id: Option<i64>,
    pub related_type: Option<String>,
    pub action_url: Option<String>,
    pub priority: Priority,
}
