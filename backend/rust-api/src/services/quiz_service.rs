use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

use super::{ensure_course_access, grading, load_user};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::course::Course;
use crate::models::new_id;
use crate::models::quiz::{
    CourseQuizSummary, QuestionForTaking, Quiz, QuizForTaking, QuizInput, QuizSummary,
};
use crate::models::quiz_attempt::{
    AttemptResult, AttemptScoreCard, AttemptSummary, QuizAttempt, QuizResults, QuizResultsHeader,
    RevealedAnswer, StudentAttemptRow, SubmitAttemptRequest,
};
use crate::store::{DocumentStore, StoreError};
use crate::utils::time::elapsed_seconds;

/// Attempts made to store a submission when its number is already taken
/// (counter documents missing for attempts written before counters existed).
const ATTEMPT_NUMBER_RETRIES: usize = 3;

pub struct QuizService {
    store: Arc<dyn DocumentStore>,
}

impl QuizService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn find_quiz(&self, quiz_id: &str) -> AppResult<Quiz> {
        self.store
            .find_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::not_found("Quiz not found"))
    }

    async fn require_course(&self, course_id: &str) -> AppResult<Course> {
        self.store
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::not_found("Course not found"))
    }

    async fn course_titles(&self, course_ids: Vec<String>) -> AppResult<HashMap<String, String>> {
        let courses = self.store.find_courses(&course_ids).await?;
        Ok(courses.into_iter().map(|c| (c.id, c.title)).collect())
    }

    pub async fn create_quiz(&self, creator_id: &str, input: QuizInput) -> AppResult<Quiz> {
        input.validate()?;
        self.require_course(&input.course_id).await?;

        let now = Utc::now();
        let quiz = input.into_quiz(new_id(), creator_id.to_string(), false, now, now);
        self.store.insert_quiz(&quiz).await?;

        tracing::info!(quiz_id = %quiz.id, course_id = %quiz.course_id, "Quiz created");
        Ok(quiz)
    }

    /// Full replacement; identity, author, publication state and creation
    /// time carry over and total points are recomputed.
    pub async fn update_quiz(&self, quiz_id: &str, input: QuizInput) -> AppResult<Quiz> {
        input.validate()?;
        let existing = self.find_quiz(quiz_id).await?;
        self.require_course(&input.course_id).await?;

        let quiz = input.into_quiz(
            existing.id,
            existing.created_by,
            existing.is_published,
            existing.created_at,
            Utc::now(),
        );
        if !self.store.replace_quiz(&quiz).await? {
            return Err(AppError::not_found("Quiz not found"));
        }

        tracing::info!(quiz_id = %quiz.id, "Quiz updated");
        Ok(quiz)
    }

    pub async fn set_published(&self, quiz_id: &str, published: bool) -> AppResult<Quiz> {
        self.store
            .set_quiz_published(quiz_id, published)
            .await?
            .ok_or_else(|| AppError::not_found("Quiz not found"))
    }

    pub async fn delete_quiz(&self, quiz_id: &str) -> AppResult<()> {
        if !self.store.delete_quiz(quiz_id).await? {
            return Err(AppError::not_found("Quiz not found"));
        }
        tracing::info!(quiz_id = %quiz_id, "Quiz deleted with its attempts");
        Ok(())
    }

    pub async fn get_quiz(&self, quiz_id: &str) -> AppResult<Quiz> {
        self.find_quiz(quiz_id).await
    }

    pub async fn list_all(&self) -> AppResult<Vec<QuizSummary>> {
        let quizzes = self.store.list_quizzes().await?;
        let titles = self
            .course_titles(quizzes.iter().map(|q| q.course_id.clone()).collect())
            .await?;

        let mut summaries = Vec::with_capacity(quizzes.len());
        for quiz in quizzes {
            let total_attempts = self.store.count_quiz_attempts(&quiz.id).await?;
            summaries.push(QuizSummary {
                course_title: titles.get(&quiz.course_id).cloned().unwrap_or_default(),
                question_count: quiz.questions.len(),
                total_attempts,
                id: quiz.id,
                title: quiz.title,
                description: quiz.description,
                course_id: quiz.course_id,
                duration: quiz.duration,
                total_points: quiz.total_points,
                passing_score: quiz.passing_score,
                is_published: quiz.is_published,
                created_at: quiz.created_at,
            });
        }
        Ok(summaries)
    }

    pub async fn list_course_quizzes(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Vec<CourseQuizSummary>> {
        let user = load_user(self.store.as_ref(), user_id).await?;
        ensure_course_access(&user, course_id)?;

        let quizzes = self.store.list_course_quizzes(course_id, user_id).await?;
        let mut summaries = Vec::with_capacity(quizzes.len());
        for quiz in quizzes {
            let attempts = self.store.count_attempts(&quiz.id, user_id).await?;
            summaries.push(CourseQuizSummary {
                question_count: quiz.questions.len(),
                attempts,
                max_attempts: quiz.attempts,
                id: quiz.id,
                title: quiz.title,
                module_id: quiz.module_id,
                description: quiz.description,
                duration: quiz.duration,
                total_points: quiz.total_points,
                passing_score: quiz.passing_score,
                is_published: quiz.is_published,
            });
        }
        Ok(summaries)
    }

    /// Hands out the quiz without its answer key. Publication, purchase and
    /// the attempt cap are all checked here.
    pub async fn start_attempt(&self, user_id: &str, quiz_id: &str) -> AppResult<QuizForTaking> {
        let user = load_user(self.store.as_ref(), user_id).await?;
        let quiz = self.find_quiz(quiz_id).await?;

        if !quiz.is_published && quiz.created_by != user.id {
            return Err(AppError::access_denied("Quiz not available"));
        }
        ensure_course_access(&user, &quiz.course_id)?;

        let prior = self.store.count_attempts(&quiz.id, &user.id).await?;
        if !quiz.allows_attempt(prior) {
            return Err(AppError::LimitExceeded(format!(
                "Maximum attempts reached ({} of {})",
                prior, quiz.attempts
            )));
        }

        let mut questions: Vec<QuestionForTaking> =
            quiz.questions.iter().map(QuestionForTaking::from).collect();
        if quiz.randomize_questions {
            questions.shuffle(&mut rand::rng());
        }

        Ok(QuizForTaking {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            instructions: quiz.instructions,
            questions,
            duration: quiz.duration,
            total_points: quiz.total_points,
            passing_score: quiz.passing_score,
            current_attempt: prior + 1,
            max_attempts: quiz.attempts,
        })
    }

    /// Grades and stores one attempt.
    ///
    /// The attempt cap is not re-checked here; a client that never calls
    /// start can exceed it. Numbering still never repeats because it comes
    /// from the store's atomic counter.
    pub async fn submit_attempt(
        &self,
        user_id: &str,
        quiz_id: &str,
        req: SubmitAttemptRequest,
    ) -> AppResult<AttemptResult> {
        req.validate()?;
        let quiz = self.find_quiz(quiz_id).await?;

        let grade = grading::grade(&quiz, &req.answers);
        let now = Utc::now();
        let time_spent = match (req.time_spent, req.started_at) {
            (Some(seconds), _) => seconds.floor() as u64,
            (None, Some(started)) => elapsed_seconds(started, now),
            (None, None) => 0,
        };

        let mut attempt = QuizAttempt {
            id: new_id(),
            quiz_id: quiz.id.clone(),
            user_id: user_id.to_string(),
            course_id: quiz.course_id.clone(),
            answers: grade.answers,
            score: grade.score,
            total_points: quiz.total_points,
            percentage: grade.percentage,
            passed: grade.passed,
            time_spent,
            started_at: req.started_at.unwrap_or(now),
            submitted_at: now,
            attempt_number: 0,
        };

        let mut tries_left = ATTEMPT_NUMBER_RETRIES;
        loop {
            attempt.attempt_number = self.store.next_attempt_number(&quiz.id, user_id).await?;
            match self.store.insert_attempt(&attempt).await {
                Ok(()) => break,
                Err(StoreError::Duplicate(_)) if tries_left > 1 => {
                    tries_left -= 1;
                    tracing::warn!(
                        quiz_id = %quiz.id,
                        user_id = %user_id,
                        attempt_number = attempt.attempt_number,
                        "Attempt number already taken, drawing the next one"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        metrics::record_attempt_submitted(attempt.passed);
        tracing::info!(
            quiz_id = %quiz.id,
            user_id = %user_id,
            attempt_number = attempt.attempt_number,
            percentage = attempt.percentage,
            passed = attempt.passed,
            "Quiz attempt submitted"
        );

        Ok(build_result(&quiz, attempt))
    }

    pub async fn list_user_attempts(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Vec<AttemptSummary>> {
        let attempts = self.store.list_user_attempts(user_id, course_id).await?;

        let mut titles: HashMap<String, Option<String>> = HashMap::new();
        let mut summaries = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            if !titles.contains_key(&attempt.quiz_id) {
                let title = self.store.find_quiz(&attempt.quiz_id).await?.map(|q| q.title);
                titles.insert(attempt.quiz_id.clone(), title);
            }
            summaries.push(AttemptSummary {
                quiz_title: titles.get(&attempt.quiz_id).cloned().flatten(),
                id: attempt.id,
                quiz_id: attempt.quiz_id,
                score: attempt.score,
                total_points: attempt.total_points,
                percentage: attempt.percentage,
                passed: attempt.passed,
                time_spent: attempt.time_spent,
                submitted_at: attempt.submitted_at,
                attempt_number: attempt.attempt_number,
            });
        }
        Ok(summaries)
    }

    /// Admin results view: statistics plus every attempt with student info.
    pub async fn quiz_results(&self, quiz_id: &str) -> AppResult<QuizResults> {
        let quiz = self.find_quiz(quiz_id).await?;
        let course_title = self.store.find_course(&quiz.course_id).await?.map(|c| c.title);
        let attempts = self.store.list_quiz_attempts(&quiz.id).await?;
        let statistics = grading::statistics(&attempts);

        let mut students = HashMap::new();
        for attempt in &attempts {
            if !students.contains_key(&attempt.user_id) {
                let user = self.store.find_user(&attempt.user_id).await?;
                students.insert(attempt.user_id.clone(), user);
            }
        }

        let rows = attempts
            .into_iter()
            .map(|attempt| {
                let student = students.get(&attempt.user_id).and_then(|u| u.as_ref());
                StudentAttemptRow {
                    student_name: student.map(|u| u.username.clone()),
                    student_email: student.map(|u| u.email.clone()),
                    id: attempt.id,
                    user_id: attempt.user_id,
                    score: attempt.score,
                    percentage: attempt.percentage,
                    passed: attempt.passed,
                    attempt_number: attempt.attempt_number,
                    time_spent: attempt.time_spent,
                    submitted_at: attempt.submitted_at,
                }
            })
            .collect();

        Ok(QuizResults {
            quiz: QuizResultsHeader {
                question_count: quiz.questions.len(),
                id: quiz.id,
                title: quiz.title,
                description: quiz.description,
                course_title,
                total_points: quiz.total_points,
                passing_score: quiz.passing_score,
                duration: quiz.duration,
            },
            statistics,
            attempts: rows,
        })
    }
}

/// Shapes the submission response according to the quiz display flags:
/// the score card needs `showResults`, revealed answers need both flags.
fn build_result(quiz: &Quiz, attempt: QuizAttempt) -> AttemptResult {
    let results = quiz.show_results.then(|| AttemptScoreCard {
        score: attempt.score,
        total_points: attempt.total_points,
        percentage: attempt.percentage,
        passed: attempt.passed,
        time_spent: attempt.time_spent,
    });

    let answers = (quiz.show_results && quiz.show_correct_answers).then(|| {
        attempt
            .answers
            .iter()
            .map(|graded| {
                let question = quiz.question(&graded.question_id);
                RevealedAnswer {
                    graded: graded.clone(),
                    correct_answer: question.map(|q| q.correct_answer.clone()),
                    explanation: question.and_then(|q| q.explanation.clone()),
                }
            })
            .collect()
    });

    AttemptResult {
        attempt_id: attempt.id,
        score: attempt.score,
        total_points: attempt.total_points,
        percentage: attempt.percentage,
        passed: attempt.passed,
        attempt_number: attempt.attempt_number,
        results,
        answers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::{AnswerValue, Question, QuestionType};
    use crate::models::quiz_attempt::GradedAnswer;

    fn quiz(show_results: bool, show_correct_answers: bool) -> Quiz {
        Quiz {
            id: "quiz-1".into(),
            course_id: "course-1".into(),
            module_id: None,
            title: "Lifetimes".into(),
            description: String::new(),
            instructions: None,
            questions: vec![Question {
                id: "q1".into(),
                question: "Does 'static outlive everything?".into(),
                kind: QuestionType::TrueFalse,
                options: None,
                correct_answer: AnswerValue::Flag(true),
                explanation: Some("It lives for the whole program".into()),
                points: 1,
            }],
            duration: 10,
            passing_score: 70,
            total_points: 1,
            attempts: 3,
            show_results,
            show_correct_answers,
            randomize_questions: false,
            is_published: true,
            created_by: "admin".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn attempt() -> QuizAttempt {
        QuizAttempt {
            id: "a1".into(),
            quiz_id: "quiz-1".into(),
            user_id: "u1".into(),
            course_id: "course-1".into(),
            answers: vec![GradedAnswer {
                question_id: "q1".into(),
                user_answer: Some(AnswerValue::Flag(false)),
                is_correct: false,
                points_earned: 0,
            }],
            score: 0,
            total_points: 1,
            percentage: 0,
            passed: false,
            time_spent: 42,
            started_at: Utc::now(),
            submitted_at: Utc::now(),
            attempt_number: 2,
        }
    }

    #[test]
    fn reveals_answers_only_with_both_flags() {
        let full = build_result(&quiz(true, true), attempt());
        assert!(full.results.is_some());
        let answers = full.answers.unwrap();
        assert_eq!(answers[0].correct_answer, Some(AnswerValue::Flag(true)));
        assert!(answers[0].explanation.is_some());

        let scores_only = build_result(&quiz(true, false), attempt());
        assert!(scores_only.results.is_some());
        assert!(scores_only.answers.is_none());

        let hidden = build_result(&quiz(false, true), attempt());
        assert!(hidden.results.is_none());
        assert!(hidden.answers.is_none());
        assert_eq!(hidden.attempt_number, 2);
    }
}
