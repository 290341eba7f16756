use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use super::{ensure_course_access, load_user};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::course::{Course, CourseView};
use crate::models::progress::{Progress, ProgressView, RecordProgressRequest};
use crate::store::DocumentStore;

/// Curriculum plus the viewer's progress, served to the video player.
#[derive(Debug, Clone, Serialize)]
pub struct CourseProgress {
    pub course: CourseView,
    pub progress: ProgressView,
}

pub struct ProgressService {
    store: Arc<dyn DocumentStore>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn load_course(&self, course_id: &str) -> AppResult<Course> {
        self.store
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::not_found("Course not found"))
    }

    pub async fn course_with_progress(&self, user_id: &str, course_id: &str) -> AppResult<CourseProgress> {
        let user = load_user(self.store.as_ref(), user_id).await?;
        let course = self.load_course(course_id).await?;
        ensure_course_access(&user, course_id)?;

        let progress = self
            .store
            .ensure_progress(&Progress::new(user_id, course_id, Utc::now()))
            .await?;

        Ok(CourseProgress {
            course: course.into(),
            progress: progress.into(),
        })
    }

    /// Each step is a single atomic store operation, so concurrent calls for
    /// the same lesson can interleave without losing watch time or
    /// duplicating a completed lesson.
    pub async fn record_progress(&self, user_id: &str, req: RecordProgressRequest) -> AppResult<ProgressView> {
        req.validate()?;

        let user = load_user(self.store.as_ref(), user_id).await?;
        let course = self.load_course(&req.course_id).await?;
        ensure_course_access(&user, &course.id)?;
        if !course.has_lesson(&req.lesson_id) {
            return Err(AppError::not_found("Lesson not found in course"));
        }

        let now = Utc::now();
        self.store
            .ensure_progress(&Progress::new(user_id, &course.id, now))
            .await?;

        if let Some(seconds) = req.watch_time {
            self.store
                .raise_watch_time(user_id, &course.id, &req.lesson_id, seconds.floor() as u64)
                .await?;
        }

        let completed = req.completed.unwrap_or(false);
        let progress = self
            .store
            .apply_lesson_progress(
                user_id,
                &course.id,
                &req.lesson_id,
                completed,
                course.total_lessons(),
                now,
            )
            .await?
            .ok_or_else(|| AppError::not_found("Progress not found"))?;

        metrics::record_progress_update(completed);
        tracing::debug!(
            user_id = %user_id,
            course_id = %course.id,
            lesson_id = %req.lesson_id,
            percentage = progress.progress_percentage,
            "Progress recorded"
        );

        Ok(progress.into())
    }
}
