//! Derived figures computed from schedule and session rows.
//!
//! Everything here is pure: callers pass the rows and the current time, so the
//! same inputs always produce the same output.

use std::collections::{BTreeSet, HashMap};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::models::{Metric, MetricType, Schedule, ScheduleStatus, TraineeProfile, TraineeStatus};

pub const DEFAULT_WINDOW_DAYS: i64 = 7;
pub const MAX_WINDOW_DAYS: i64 = 366;
pub const DEFAULT_ANALYTICS_WEEKS: i64 = 8;
pub const MAX_ANALYTICS_WEEKS: i64 = 52;
const RETENTION_DAYS: i64 = 30;
const TOP_EXERCISES: usize = 5;

/// The slice of a schedule row the aggregations need.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ScheduleFact {
    pub id: i64,
    pub session_date: NaiveDate,
    pub start_time: String,
    pub duration_minutes: i64,
    pub status: ScheduleStatus,
}

impl ScheduleFact {
    pub fn start(&self) -> Option<NaiveDateTime> {
        schedule_start(self.session_date, &self.start_time)
    }
}

impl From<&Schedule> for ScheduleFact {
    fn from(schedule: &Schedule) -> Self {
        Self {
            id: schedule.id,
            session_date: schedule.session_date,
            start_time: schedule.start_time.clone(),
            duration_minutes: schedule.duration_minutes,
            status: schedule.status,
        }
    }
}

pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub fn schedule_start(date: NaiveDate, time: &str) -> Option<NaiveDateTime> {
    parse_time_of_day(time).map(|t| date.and_time(t))
}

/// Missing or non-positive windows fall back to `default`; oversized ones are
/// clamped to `MAX_WINDOW_DAYS`.
pub fn normalize_window_days(requested: Option<i64>, default: i64) -> i64 {
    match requested {
        Some(days) if days > MAX_WINDOW_DAYS => MAX_WINDOW_DAYS,
        Some(days) if days >= 1 => days,
        _ => default,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub day_name: String,
    pub is_today: bool,
    pub has_session: bool,
    pub session_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingSchedules {
    /// The window actually applied after defaulting and clamping.
    pub window_days: i64,
    pub upcoming_sessions: Vec<Schedule>,
    pub calendar: Vec<CalendarDay>,
}

/// Active schedules starting in `[now, now + days)`, plus one calendar cell per
/// day starting today. `days` must already be normalized.
pub fn build_upcoming(schedules: Vec<Schedule>, now: NaiveDateTime, days: i64) -> UpcomingSchedules {
    let window_end = now + Duration::days(days);

    let mut upcoming: Vec<Schedule> = schedules
        .into_iter()
        .filter(|s| s.status.is_active())
        .filter(|s| match schedule_start(s.session_date, &s.start_time) {
            Some(start) => start >= now && start < window_end,
            None => false,
        })
        .collect();

    upcoming.sort_by(|a, b| {
        (a.session_date, a.start_time.as_str()).cmp(&(b.session_date, b.start_time.as_str()))
    });

    let mut per_day: HashMap<NaiveDate, i64> = HashMap::new();
    for schedule in &upcoming {
        *per_day.entry(schedule.session_date).or_insert(0) += 1;
    }

    let today = now.date();
    let calendar = (0..days)
        .map(|offset| {
            let date = today + Duration::days(offset);
            let session_count = per_day.get(&date).copied().unwrap_or(0);
            CalendarDay {
                date,
                day_name: date.format("%a").to_string(),
                is_today: offset == 0,
                has_session: session_count > 0,
                session_count,
            }
        })
        .collect();

    UpcomingSchedules {
        window_days: days,
        upcoming_sessions: upcoming,
        calendar,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraineeStats {
    pub total_sessions: i64,
    pub completed_sessions: i64,
    pub cancelled_sessions: i64,
    pub upcoming_sessions: i64,
    pub total_workout_hours: f64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub average_sessions_per_week: f64,
    pub last_session_date: Option<NaiveDate>,
}

pub fn compute_trainee_stats(rows: &[ScheduleFact], now: NaiveDateTime) -> TraineeStats {
    let today = now.date();

    let completed: Vec<&ScheduleFact> = rows
        .iter()
        .filter(|r| r.status == ScheduleStatus::Completed)
        .collect();

    let cancelled_sessions = rows
        .iter()
        .filter(|r| r.status == ScheduleStatus::Cancelled)
        .count() as i64;

    let upcoming_sessions = rows
        .iter()
        .filter(|r| r.status.is_active())
        .filter(|r| r.start().is_some_and(|start| start >= now))
        .count() as i64;

    let total_minutes: i64 = completed.iter().map(|r| r.duration_minutes).sum();

    let completed_dates: BTreeSet<NaiveDate> = completed
        .iter()
        .map(|r| r.session_date)
        .filter(|d| *d <= today)
        .collect();
    let dates: Vec<NaiveDate> = completed_dates.into_iter().collect();

    TraineeStats {
        total_sessions: rows.len() as i64,
        completed_sessions: completed.len() as i64,
        cancelled_sessions,
        upcoming_sessions,
        total_workout_hours: workout_hours(total_minutes),
        current_streak: current_streak(&dates, today),
        longest_streak: longest_streak(&dates),
        average_sessions_per_week: average_per_week(completed.len() as i64, dates.first(), today),
        last_session_date: dates.last().copied(),
    }
}

pub fn workout_hours(total_minutes: i64) -> f64 {
    if total_minutes <= 0 {
        return 0.0;
    }
    total_minutes as f64 / 60.0
}

/// Length of the run of consecutive days ending at the latest completed date.
/// The run only counts while it is still alive: its last day must be today or
/// yesterday. `dates` must be sorted ascending and distinct.
pub fn current_streak(dates: &[NaiveDate], today: NaiveDate) -> i64 {
    let Some(&latest) = dates.last() else {
        return 0;
    };

    if latest != today && latest != today - Duration::days(1) {
        return 0;
    }

    let mut streak = 1;
    let mut previous = latest;
    for &date in dates.iter().rev().skip(1) {
        if date == previous - Duration::days(1) {
            streak += 1;
            previous = date;
        } else {
            break;
        }
    }
    streak
}

/// `dates` must be sorted ascending and distinct.
pub fn longest_streak(dates: &[NaiveDate]) -> i64 {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    for &date in dates {
        run = match previous {
            Some(prev) if date == prev + Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(date);
    }
    longest
}

fn average_per_week(completed: i64, first: Option<&NaiveDate>, today: NaiveDate) -> f64 {
    let Some(first) = first else {
        return 0.0;
    };
    let days = (today - *first).num_days() + 1;
    let weeks = ((days + 6) / 7).max(1);
    round2(completed as f64 / weeks as f64)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Half-open interval test: `[a, a + a_minutes)` against `[b, b + b_minutes)`.
pub fn intervals_overlap(
    a_start: NaiveDateTime,
    a_minutes: i64,
    b_start: NaiveDateTime,
    b_minutes: i64,
) -> bool {
    let a_end = a_start + Duration::minutes(a_minutes);
    let b_end = b_start + Duration::minutes(b_minutes);
    a_start < b_end && b_start < a_end
}

/// First active schedule in `existing` that overlaps the proposed slot.
pub fn find_overlap(
    start: NaiveDateTime,
    duration_minutes: i64,
    existing: &[ScheduleFact],
    exclude_id: Option<i64>,
) -> Option<&ScheduleFact> {
    existing
        .iter()
        .filter(|s| Some(s.id) != exclude_id)
        .filter(|s| s.status.is_active())
        .find(|s| match s.start() {
            Some(other) => intervals_overlap(start, duration_minutes, other, s.duration_minutes),
            None => false,
        })
}

pub fn progress_percentage(completed: i64, total: i64) -> f64 {
    if total <= 0 || completed <= 0 {
        return 0.0;
    }
    round2((completed as f64 * 100.0 / total as f64).min(100.0))
}

/// 1-based program week for `today`, clamped to the program length.
pub fn current_week(start_date: NaiveDate, today: NaiveDate, total_weeks: i64) -> i64 {
    let elapsed = (today - start_date).num_days().max(0);
    (elapsed / 7 + 1).clamp(1, total_weeks.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetFigures {
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExerciseTotals {
    pub total_sets: i64,
    pub total_reps: i64,
    pub total_weight: f64,
    pub total_volume: f64,
}

/// Only completed sets count towards the totals.
pub fn summarize_sets(sets: &[SetFigures]) -> ExerciseTotals {
    sets.iter()
        .filter(|s| s.completed)
        .fold(ExerciseTotals::default(), |acc, set| {
            let reps = set.reps.unwrap_or(0);
            let weight = set.weight.unwrap_or(0.0);
            ExerciseTotals {
                total_sets: acc.total_sets + 1,
                total_reps: acc.total_reps + reps,
                total_weight: acc.total_weight + weight,
                total_volume: acc.total_volume + reps as f64 * weight,
            }
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CardTotals {
    pub total_exercises: i64,
    pub total_sets: i64,
    pub total_reps: i64,
    pub total_volume: f64,
}

pub fn summarize_card(exercises: &[ExerciseTotals]) -> CardTotals {
    exercises.iter().fold(
        CardTotals {
            total_exercises: exercises.len() as i64,
            ..CardTotals::default()
        },
        |acc, e| CardTotals {
            total_sets: acc.total_sets + e.total_sets,
            total_reps: acc.total_reps + e.total_reps,
            total_volume: acc.total_volume + e.total_volume,
            ..acc
        },
    )
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainerDashboard {
    pub total_clients: i64,
    pub active_clients: i64,
    pub sessions_today: i64,
    pub upcoming_this_week: i64,
    pub completed_this_month: i64,
    pub cancelled_this_month: i64,
    pub completion_rate: f64,
}

/// Dashboard figures over all of a trainer's schedules. The week runs Monday to Sunday.
pub fn trainer_dashboard(
    rows: &[ScheduleFact],
    total_clients: i64,
    active_clients: i64,
    now: NaiveDateTime,
) -> TrainerDashboard {
    let today = now.date();
    let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let week_end = week_start + Duration::days(7);
    let in_this_month = |d: NaiveDate| d.year() == today.year() && d.month() == today.month();

    let sessions_today = rows
        .iter()
        .filter(|r| r.session_date == today && r.status != ScheduleStatus::Cancelled)
        .count() as i64;

    let upcoming_this_week = rows
        .iter()
        .filter(|r| r.status.is_active())
        .filter(|r| r.start().is_some_and(|s| s >= now && s.date() < week_end))
        .count() as i64;

    let completed_this_month = rows
        .iter()
        .filter(|r| r.status == ScheduleStatus::Completed && in_this_month(r.session_date))
        .count() as i64;

    let cancelled_this_month = rows
        .iter()
        .filter(|r| r.status == ScheduleStatus::Cancelled && in_this_month(r.session_date))
        .count() as i64;

    let closed = rows.iter().filter(|r| r.status.is_terminal()).count() as i64;
    let completed = rows
        .iter()
        .filter(|r| r.status == ScheduleStatus::Completed)
        .count() as i64;

    TrainerDashboard {
        total_clients,
        active_clients,
        sessions_today,
        upcoming_this_week,
        completed_this_month,
        cancelled_this_month,
        completion_rate: progress_percentage(completed, closed),
    }
}

// Analytics

/// The slice of a trainee row the trainer overview needs.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ClientFact {
    pub join_date: NaiveDate,
    pub status: TraineeStatus,
    pub last_session_date: Option<NaiveDate>,
}

/// One recorded set with the exercise and card it belongs to.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ExerciseSetRow {
    pub session_card_id: i64,
    pub name: String,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekCount {
    pub week_start: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePerformance {
    pub name: String,
    pub sessions: i64,
    pub max_weight: f64,
    pub total_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub weeks: i64,
    pub total_clients: i64,
    pub active_clients: i64,
    pub retained_clients: i64,
    pub client_retention_rate: f64,
    pub attendance_rate: f64,
    pub average_sessions_per_week: f64,
    pub sessions_per_week: Vec<WeekCount>,
    pub client_growth: Vec<WeekCount>,
    pub popular_exercises: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAnalytics {
    pub trainee_id: i64,
    pub name: String,
    pub total_sessions: i64,
    pub completed_sessions: i64,
    pub attendance_rate: f64,
    pub average_session_duration: i64,
    pub weight_progress: Vec<MetricPoint>,
    pub weight_change: Option<f64>,
    pub body_fat_progress: Vec<MetricPoint>,
    pub body_fat_change: Option<f64>,
    pub top_exercises: Vec<ExercisePerformance>,
}

/// Completed over completed plus no-show. Cancelled sessions are not absences.
pub fn attendance_rate(rows: &[ScheduleFact]) -> f64 {
    let completed = rows
        .iter()
        .filter(|r| r.status == ScheduleStatus::Completed)
        .count() as i64;
    let missed = rows
        .iter()
        .filter(|r| r.status == ScheduleStatus::NoShow)
        .count() as i64;

    progress_percentage(completed, completed + missed)
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Counts dates per Monday-started week over the last `weeks` weeks, oldest
/// first, ending with the week containing `today`. Other dates are ignored.
pub fn weekly_counts<I>(dates: I, today: NaiveDate, weeks: i64) -> Vec<WeekCount>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let weeks = weeks.max(1);
    let first = monday_of(today) - Duration::weeks(weeks - 1);

    let mut buckets: Vec<WeekCount> = (0..weeks)
        .map(|i| WeekCount {
            week_start: first + Duration::weeks(i),
            count: 0,
        })
        .collect();

    for date in dates {
        if date < first {
            continue;
        }
        let index = ((date - first).num_days() / 7) as usize;
        if let Some(bucket) = buckets.get_mut(index) {
            bucket.count += 1;
        }
    }

    buckets
}

/// Per-exercise figures in first-seen order. Names group case-insensitively;
/// weights and volume come from completed sets only.
pub fn exercise_performance(rows: &[ExerciseSetRow]) -> Vec<ExercisePerformance> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, (ExercisePerformance, BTreeSet<i64>)> = HashMap::new();

    for row in rows {
        let key = row.name.trim().to_lowercase();
        let (performance, cards) = grouped.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (
                ExercisePerformance {
                    name: row.name.trim().to_string(),
                    sessions: 0,
                    max_weight: 0.0,
                    total_volume: 0.0,
                },
                BTreeSet::new(),
            )
        });

        cards.insert(row.session_card_id);
        if row.completed {
            let weight = row.weight.unwrap_or(0.0);
            performance.max_weight = performance.max_weight.max(weight);
            performance.total_volume += row.reps.unwrap_or(0) as f64 * weight;
        }
    }

    order
        .into_iter()
        .filter_map(|key| grouped.remove(&key))
        .map(|(mut performance, cards)| {
            performance.sessions = cards.len() as i64;
            performance.total_volume = round2(performance.total_volume);
            performance
        })
        .collect()
}

/// Highest total volume first; ties go to the more frequent exercise, then by name.
pub fn top_exercises(rows: &[ExerciseSetRow], limit: usize) -> Vec<ExercisePerformance> {
    let mut performances = exercise_performance(rows);
    performances.sort_by(|a, b| {
        b.total_volume
            .total_cmp(&a.total_volume)
            .then(b.sessions.cmp(&a.sessions))
            .then_with(|| a.name.cmp(&b.name))
    });
    performances.truncate(limit);
    performances
}

/// Names of the exercises logged in the most sessions.
pub fn popular_exercises(rows: &[ExerciseSetRow], limit: usize) -> Vec<String> {
    let mut performances = exercise_performance(rows);
    performances.sort_by(|a, b| b.sessions.cmp(&a.sessions).then_with(|| a.name.cmp(&b.name)));
    performances
        .into_iter()
        .take(limit)
        .map(|p| p.name)
        .collect()
}

pub fn analytics_overview(
    schedules: &[ScheduleFact],
    clients: &[ClientFact],
    exercises: &[ExerciseSetRow],
    now: NaiveDateTime,
    weeks: i64,
) -> AnalyticsOverview {
    let today = now.date();
    let weeks = weeks.clamp(1, MAX_ANALYTICS_WEEKS);

    let sessions_per_week = weekly_counts(
        schedules
            .iter()
            .filter(|r| r.status == ScheduleStatus::Completed && r.session_date <= today)
            .map(|r| r.session_date),
        today,
        weeks,
    );
    let in_window: i64 = sessions_per_week.iter().map(|w| w.count).sum();

    let total_clients = clients.len() as i64;
    let retained_clients = clients
        .iter()
        .filter(|c| {
            c.last_session_date
                .is_some_and(|d| d <= today && (today - d).num_days() < RETENTION_DAYS)
        })
        .count() as i64;

    AnalyticsOverview {
        weeks,
        total_clients,
        active_clients: clients
            .iter()
            .filter(|c| c.status == TraineeStatus::Active)
            .count() as i64,
        retained_clients,
        client_retention_rate: progress_percentage(retained_clients, total_clients),
        attendance_rate: attendance_rate(schedules),
        average_sessions_per_week: round2(in_window as f64 / weeks as f64),
        sessions_per_week,
        client_growth: weekly_counts(clients.iter().map(|c| c.join_date), today, weeks),
        popular_exercises: popular_exercises(exercises, TOP_EXERCISES),
    }
}

fn metric_series(metrics: &[Metric], kind: MetricType) -> Vec<MetricPoint> {
    let mut points: Vec<MetricPoint> = metrics
        .iter()
        .filter(|m| m.metric_type == kind)
        .map(|m| MetricPoint {
            date: m.recorded_on,
            value: m.value,
        })
        .collect();
    points.sort_by_key(|p| p.date);
    points
}

/// Last reading minus first; needs at least two readings.
fn series_change(points: &[MetricPoint]) -> Option<f64> {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() > 1 => Some(round2(last.value - first.value)),
        _ => None,
    }
}

pub fn client_analytics(
    trainee: &TraineeProfile,
    schedules: &[ScheduleFact],
    metrics: &[Metric],
    exercises: &[ExerciseSetRow],
) -> ClientAnalytics {
    let completed: Vec<&ScheduleFact> = schedules
        .iter()
        .filter(|r| r.status == ScheduleStatus::Completed)
        .collect();

    let average_session_duration = if completed.is_empty() {
        0
    } else {
        let minutes: i64 = completed.iter().map(|r| r.duration_minutes).sum();
        (minutes as f64 / completed.len() as f64).round() as i64
    };

    let weight_progress = metric_series(metrics, MetricType::Weight);
    let body_fat_progress = metric_series(metrics, MetricType::BodyFat);

    ClientAnalytics {
        trainee_id: trainee.id,
        name: trainee.name.clone(),
        total_sessions: schedules.len() as i64,
        completed_sessions: completed.len() as i64,
        attendance_rate: attendance_rate(schedules),
        average_session_duration,
        weight_change: series_change(&weight_progress),
        weight_progress,
        body_fat_change: series_change(&body_fat_progress),
        body_fat_progress,
        top_exercises: top_exercises(exercises, TOP_EXERCISES),
    }
}
