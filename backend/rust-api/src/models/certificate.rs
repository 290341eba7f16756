use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::bson_datetime_as_chrono;

/// Completion certificate stored in MongoDB "certificates" collection.
/// At most one per (user, course); `certificate_number` is globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub course_name: String,
    pub student_name: String,
    pub instructor_name: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub issue_date: DateTime<Utc>,
    pub certificate_number: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub completion_date: DateTime<Utc>,
    pub total_lessons: u32,
    pub completed_lessons: u32,
    /// Seconds.
    pub total_watch_time: u64,
}

/// `CERT-{unix millis}-{4 digits}`
pub fn generate_certificate_number(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::rng().random_range(0..10_000);
    format!("CERT-{}-{:04}", now.timestamp_millis(), suffix)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCertificateRequest {
    pub course_id: String,
}

/// JSON view of a certificate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateView {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub course_name: String,
    pub student_name: String,
    pub instructor_name: String,
    pub issue_date: DateTime<Utc>,
    pub certificate_number: String,
    pub completion_date: DateTime<Utc>,
    pub total_lessons: u32,
    pub completed_lessons: u32,
    pub total_watch_time: u64,
}

impl From<Certificate> for CertificateView {
    fn from(c: Certificate) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            course_id: c.course_id,
            course_name: c.course_name,
            student_name: c.student_name,
            instructor_name: c.instructor_name,
            issue_date: c.issue_date,
            certificate_number: c.certificate_number,
            completion_date: c.completion_date,
            total_lessons: c.total_lessons,
            completed_lessons: c.completed_lessons,
            total_watch_time: c.total_watch_time,
        }
    }
}

/// What the public verification endpoint discloses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateVerification {
    pub certificate_number: String,
    pub student_name: String,
    pub course_name: String,
    pub issue_date: DateTime<Utc>,
    pub completion_date: DateTime<Utc>,
}

impl From<Certificate> for CertificateVerification {
    fn from(c: Certificate) -> Self {
        Self {
            certificate_number: c.certificate_number,
            student_name: c.student_name,
            course_name: c.course_name,
            issue_date: c.issue_date,
            completion_date: c.completion_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn certificate_number_format() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let number = generate_certificate_number(now);
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts[0], "CERT");
        assert_eq!(parts[1], "1700000000123");
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }
}
