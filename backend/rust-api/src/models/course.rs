use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError};

use super::bson_datetime_as_chrono;

/// Course model stored in MongoDB "courses" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    pub category: String,
    pub level: CourseLevel,
    pub language: String,
    #[serde(default)]
    pub thumbnail: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<f64>,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub has_discount: bool,
    #[serde(default)]
    pub curriculum: Vec<Topic>,
    #[serde(default)]
    pub instructor: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(length(min = 1))]
    pub title: String,
    #[serde(default)]
    #[validate(nested)]
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(length(min = 1))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default)]
    pub video_provider: VideoProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// Display duration such as "15:30".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub resources: Vec<LessonResource>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoProvider {
    Youtube,
    Dropbox,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonResource {
    pub title: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pdf,
    Code,
    Document,
    #[default]
    Other,
}

impl Course {
    pub fn total_lessons(&self) -> usize {
        self.curriculum.iter().map(|t| t.lessons.len()).sum()
    }

    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.curriculum.iter().flat_map(|t| t.lessons.iter())
    }

    pub fn has_lesson(&self, lesson_id: &str) -> bool {
        self.lessons().any(|l| l.id == lesson_id)
    }

    /// Price charged at checkout: the discount price when a discount is active.
    pub fn effective_price(&self) -> f64 {
        if self.is_free {
            return 0.0;
        }
        match (self.has_discount, self.discount_price) {
            (true, Some(discounted)) => discounted,
            _ => self.price,
        }
    }
}

fn validate_unique_lesson_ids(curriculum: &[Topic]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for lesson in curriculum.iter().flat_map(|t| t.lessons.iter()) {
        if !seen.insert(lesson.id.as_str()) {
            let mut err = ValidationError::new("duplicate_lesson_id");
            err.message = Some(format!("Lesson id '{}' appears more than once", lesson.id).into());
            return Err(err);
        }
    }
    Ok(())
}

/// Request DTO for creating a course
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    #[validate(length(min = 1))]
    pub category: String,
    pub level: CourseLevel,
    #[validate(length(min = 1))]
    pub language: String,
    #[serde(default)]
    pub thumbnail: String,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "Discount price cannot be negative"))]
    pub discount_price: Option<f64>,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub has_discount: bool,
    #[serde(default)]
    #[validate(nested, custom(function = "validate_unique_lesson_ids"))]
    pub curriculum: Vec<Topic>,
    #[serde(default)]
    pub instructor: String,
}

impl CreateCourseRequest {
    pub fn into_course(self, now: DateTime<Utc>) -> Course {
        Course {
            id: super::new_id(),
            title: self.title,
            description: self.description,
            short_description: self.short_description,
            category: self.category,
            level: self.level,
            language: self.language,
            thumbnail: self.thumbnail,
            price: self.price,
            discount_price: self.discount_price,
            is_free: self.is_free,
            has_discount: self.has_discount,
            curriculum: self.curriculum,
            instructor: self.instructor,
            created_at: now,
            updated_at: now,
        }
    }
}

/// JSON view of a course
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub short_description: String,
    pub category: String,
    pub level: CourseLevel,
    pub language: String,
    pub thumbnail: String,
    pub price: f64,
    pub discount_price: Option<f64>,
    pub is_free: bool,
    pub has_discount: bool,
    pub curriculum: Vec<Topic>,
    pub instructor: String,
    pub total_lessons: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Course> for CourseView {
    fn from(course: Course) -> Self {
        Self {
            total_lessons: course.total_lessons(),
            id: course.id,
            title: course.title,
            description: course.description,
            short_description: course.short_description,
            category: course.category,
            level: course.level,
            language: course.language,
            thumbnail: course.thumbnail,
            price: course.price,
            discount_price: course.discount_price,
            is_free: course.is_free,
            has_discount: course.has_discount,
            curriculum: course.curriculum,
            instructor: course.instructor,
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(id: &str) -> Lesson {
        Lesson {
            id: id.to_string(),
            title: format!("Lesson {}", id),
            description: String::new(),
            video_url: None,
            video_provider: VideoProvider::None,
            video_id: None,
            duration: None,
            duration_seconds: None,
            is_free: false,
            order: 0,
            resources: Vec::new(),
        }
    }

    fn request(curriculum: Vec<Topic>) -> CreateCourseRequest {
        CreateCourseRequest {
            title: "Rust".into(),
            description: "Systems programming".into(),
            short_description: String::new(),
            category: "programming".into(),
            level: CourseLevel::Beginner,
            language: "English".into(),
            thumbnail: String::new(),
            price: 499.0,
            discount_price: Some(299.0),
            is_free: false,
            has_discount: true,
            curriculum,
            instructor: "Ferris".into(),
        }
    }

    #[test]
    fn counts_lessons_across_topics() {
        let course = request(vec![
            Topic { id: "t1".into(), title: "One".into(), lessons: vec![lesson("a"), lesson("b")] },
            Topic { id: "t2".into(), title: "Two".into(), lessons: vec![lesson("c")] },
        ])
        .into_course(Utc::now());
        assert_eq!(course.total_lessons(), 3);
        assert!(course.has_lesson("c"));
        assert!(!course.has_lesson("z"));
        assert_eq!(course.effective_price(), 299.0);
    }

    #[test]
    fn rejects_duplicate_lesson_ids() {
        let req = request(vec![
            Topic { id: "t1".into(), title: "One".into(), lessons: vec![lesson("a")] },
            Topic { id: "t2".into(), title: "Two".into(), lessons: vec![lesson("a")] },
        ]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_negative_price() {
        let mut req = request(Vec::new());
        req.price = -1.0;
        assert!(req.validate().is_err());
    }
}
