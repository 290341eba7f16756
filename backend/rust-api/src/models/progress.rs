use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

/// Per-(user, course) progress stored in MongoDB "progresses" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    #[serde(default)]
    pub completed_lessons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_lesson: Option<String>,
    #[serde(default)]
    pub watch_time: WatchTime,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress_percentage: u32,
    #[serde(default)]
    pub certificate_issued: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    pub fn new(user_id: &str, course_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: super::new_id(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            completed_lessons: Vec::new(),
            current_lesson: None,
            watch_time: WatchTime::default(),
            last_accessed: Some(now),
            progress_percentage: 0,
            certificate_issued: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress_percentage >= 100
    }

    /// In-place form of the store's lesson update: set-append the lesson
    /// when completed, recompute the percentage, stamp access.
    pub fn apply_lesson(
        &mut self,
        lesson_id: &str,
        completed: bool,
        total_lessons: usize,
        now: DateTime<Utc>,
    ) {
        if completed && !self.completed_lessons.iter().any(|l| l == lesson_id) {
            self.completed_lessons.push(lesson_id.to_string());
        }
        self.progress_percentage = progress_percentage(self.completed_lessons.len(), total_lessons);
        self.current_lesson = Some(lesson_id.to_string());
        self.last_accessed = Some(now);
        self.updated_at = now;
    }
}

/// round(100 * completed / total), 0 for an empty curriculum, capped at 100.
pub fn progress_percentage(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = (completed as f64 / total as f64 * 100.0).round();
    pct.min(100.0) as u32
}

/// Seconds watched per lesson. Values only ever increase.
///
/// Persisted as an array of `{lessonId, seconds}` so each entry can be
/// targeted by a conditional positional update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<LessonWatch>", into = "Vec<LessonWatch>")]
pub struct WatchTime(BTreeMap<String, u64>);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonWatch {
    pub lesson_id: String,
    pub seconds: u64,
}

impl From<Vec<LessonWatch>> for WatchTime {
    fn from(entries: Vec<LessonWatch>) -> Self {
        let mut map = BTreeMap::new();
        for entry in entries {
            let slot = map.entry(entry.lesson_id).or_insert(0);
            *slot = (*slot).max(entry.seconds);
        }
        WatchTime(map)
    }
}

impl From<WatchTime> for Vec<LessonWatch> {
    fn from(watch: WatchTime) -> Self {
        watch
            .0
            .into_iter()
            .map(|(lesson_id, seconds)| LessonWatch { lesson_id, seconds })
            .collect()
    }
}

impl WatchTime {
    pub fn get(&self, lesson_id: &str) -> u64 {
        self.0.get(lesson_id).copied().unwrap_or(0)
    }

    /// Stores `seconds` only when strictly greater than the current value.
    /// Returns whether the value changed.
    pub fn raise(&mut self, lesson_id: &str, seconds: u64) -> bool {
        match self.0.get_mut(lesson_id) {
            Some(current) if *current >= seconds => false,
            Some(current) => {
                *current = seconds;
                true
            }
            None => {
                self.0.insert(lesson_id.to_string(), seconds);
                true
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.0.values().fold(0u64, |acc, s| acc.saturating_add(*s))
    }

    pub fn as_map(&self) -> &BTreeMap<String, u64> {
        &self.0
    }
}

/// Request DTO for `POST /api/video/progress`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordProgressRequest {
    #[validate(length(min = 1, message = "courseId is required"))]
    pub course_id: String,
    #[validate(length(min = 1, message = "lessonId is required"))]
    pub lesson_id: String,
    #[serde(default)]
    #[validate(range(
        min = 0.0,
        max = 31_536_000.0,
        message = "watchTime must be between 0 and one year of seconds"
    ))]
    pub watch_time: Option<f64>,
    #[serde(default)]
    pub completed: Option<bool>,
}

/// JSON view of a progress record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub course_id: String,
    pub completed_lessons: Vec<String>,
    pub current_lesson: Option<String>,
    pub watch_time: BTreeMap<String, u64>,
    pub total_watch_time: u64,
    pub progress_percentage: u32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub certificate_issued: bool,
}

impl From<Progress> for ProgressView {
    fn from(progress: Progress) -> Self {
        Self {
            total_watch_time: progress.watch_time.total(),
            watch_time: progress.watch_time.0,
            course_id: progress.course_id,
            completed_lessons: progress.completed_lessons,
            current_lesson: progress.current_lesson,
            progress_percentage: progress.progress_percentage,
            last_accessed: progress.last_accessed,
            certificate_issued: progress.certificate_issued,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_time_never_regresses() {
        let mut watch = WatchTime::default();
        for seconds in [10, 5, 20, 15] {
            watch.raise("intro", seconds);
        }
        assert_eq!(watch.get("intro"), 20);
        assert!(!watch.raise("intro", 20));
    }

    #[test]
    fn percentage_rounds_and_handles_empty_course() {
        assert_eq!(progress_percentage(2, 4), 50);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 67);
        assert_eq!(progress_percentage(0, 0), 0);
        assert_eq!(progress_percentage(5, 4), 100);
    }

    #[test]
    fn completing_a_lesson_twice_keeps_one_entry() {
        let now = Utc::now();
        let mut progress = Progress::new("u1", "c1", now);
        progress.apply_lesson("l1", true, 4, now);
        progress.apply_lesson("l1", true, 4, now);
        progress.apply_lesson("l2", false, 4, now);
        assert_eq!(progress.completed_lessons, vec!["l1"]);
        assert_eq!(progress.progress_percentage, 25);
        assert_eq!(progress.current_lesson.as_deref(), Some("l2"));
    }

    #[test]
    fn watch_time_total_saturates() {
        let mut watch = WatchTime::default();
        watch.raise("l1", u64::MAX);
        watch.raise("l2", u64::MAX);
        assert_eq!(watch.total(), u64::MAX);
    }

    #[test]
    fn watch_time_persists_as_entry_list() {
        let mut watch = WatchTime::default();
        watch.raise("b", 7);
        watch.raise("a", 3);
        let value = serde_json::to_value(&watch).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                { "lessonId": "a", "seconds": 3 },
                { "lessonId": "b", "seconds": 7 }
            ])
        );
    }
}
