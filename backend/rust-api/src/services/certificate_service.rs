use chrono::Utc;
use std::sync::Arc;

use super::{ensure_course_access, load_user};
use crate::error::{AppError, AppResult};
use crate::metrics::CERTIFICATES_ISSUED_TOTAL;
use crate::models::certificate::{generate_certificate_number, Certificate, CertificateView};
use crate::models::course::Course;
use crate::models::new_id;
use crate::models::progress::Progress;
use crate::models::user::User;
use crate::store::{DocumentStore, StoreError};

const NUMBER_ATTEMPTS: usize = 3;

/// Result of an issue request. Re-issuing is a success that hands back the
/// certificate already on file.
#[derive(Debug, Clone)]
pub enum Issued {
    New(Certificate),
    Existing(Certificate),
}

impl Issued {
    pub fn is_new(&self) -> bool {
        matches!(self, Issued::New(_))
    }

    pub fn into_certificate(self) -> Certificate {
        match self {
            Issued::New(c) | Issued::Existing(c) => c,
        }
    }
}

pub struct CertificateService {
    store: Arc<dyn DocumentStore>,
}

impl CertificateService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn issue(&self, user_id: &str, course_id: &str) -> AppResult<Issued> {
        let user = load_user(self.store.as_ref(), user_id).await?;
        let course = self
            .store
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::not_found("Course not found"))?;
        ensure_course_access(&user, course_id)?;

        if let Some(existing) = self.store.find_certificate_for(user_id, course_id).await? {
            // Heals a flag write that failed after an earlier insert.
            self.store.mark_certificate_issued(user_id, course_id).await?;
            return Ok(Issued::Existing(existing));
        }

        let progress = self
            .store
            .find_progress(user_id, course_id)
            .await?
            .filter(Progress::is_complete)
            .ok_or_else(|| AppError::validation("Course not completed yet"))?;

        let mut certificate = build_certificate(&user, &course, &progress);
        for _ in 0..NUMBER_ATTEMPTS {
            match self.store.insert_certificate(&certificate).await {
                Ok(()) => {
                    self.store.mark_certificate_issued(user_id, course_id).await?;
                    CERTIFICATES_ISSUED_TOTAL.inc();
                    tracing::info!(
                        user_id = %user_id,
                        course_id = %course_id,
                        certificate_number = %certificate.certificate_number,
                        "Certificate issued"
                    );
                    return Ok(Issued::New(certificate));
                }
                Err(StoreError::Duplicate(key)) => {
                    // Lost a race with a concurrent issue for the same course.
                    if let Some(existing) = self.store.find_certificate_for(user_id, course_id).await? {
                        self.store.mark_certificate_issued(user_id, course_id).await?;
                        return Ok(Issued::Existing(existing));
                    }
                    tracing::debug!(key = %key, "Certificate number collision, regenerating");
                    certificate.certificate_number = generate_certificate_number(Utc::now());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::conflict("Could not allocate a unique certificate number"))
    }

    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<CertificateView>> {
        Ok(self
            .store
            .list_user_certificates(user_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    /// Only the holder may read a certificate by id.
    pub async fn get_owned(&self, user_id: &str, certificate_id: &str) -> AppResult<Certificate> {
        self.store
            .find_certificate(certificate_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| AppError::not_found("Certificate not found"))
    }

    pub async fn get_for_course(&self, user_id: &str, course_id: &str) -> AppResult<Certificate> {
        self.store
            .find_certificate_for(user_id, course_id)
            .await?
            .ok_or_else(|| AppError::not_found("Certificate not found for this course"))
    }

    pub async fn find_by_number(&self, number: &str) -> AppResult<Option<Certificate>> {
        Ok(self.store.find_certificate_by_number(number).await?)
    }

    pub async fn list_all(&self) -> AppResult<Vec<CertificateView>> {
        Ok(self
            .store
            .list_certificates()
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }
}

fn build_certificate(user: &User, course: &Course, progress: &Progress) -> Certificate {
    let now = Utc::now();
    let instructor_name = if course.instructor.trim().is_empty() {
        "Course Instructor".to_string()
    } else {
        course.instructor.clone()
    };

    Certificate {
        id: new_id(),
        user_id: user.id.clone(),
        course_id: course.id.clone(),
        course_name: course.title.clone(),
        student_name: user.display_name(),
        instructor_name,
        issue_date: now,
        certificate_number: generate_certificate_number(now),
        completion_date: progress.last_accessed.unwrap_or(now),
        total_lessons: course.total_lessons() as u32,
        completed_lessons: progress.completed_lessons.len() as u32,
        total_watch_time: progress.watch_time.total(),
    }
}
