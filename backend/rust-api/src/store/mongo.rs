use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
    Collection, Database, IndexModel,
};

use super::{
    DocumentStore, OrderFilter, StoreError, StoreResult, Transition, UserFilter, UserTypeBreakdown,
};
use crate::metrics::track_db_operation;
use crate::models::certificate::Certificate;
use crate::models::course::Course;
use crate::models::order::{GatewayPaymentDetails, Order, OrderStatus, PaymentStatus};
use crate::models::progress::Progress;
use crate::models::quiz::Quiz;
use crate::models::quiz_attempt::QuizAttempt;
use crate::models::user::{PurchasedCourse, User, UserStatus, UserType};
use crate::utils::time::chrono_to_bson;

const USERS: &str = "users";

/// User fields `update_account` may `$set`. Purchases stay out of it so a
/// stale account write cannot drop a concurrent grant.
const ACCOUNT_FIELDS: [&str; 7] = [
    "status",
    "loginAttempts",
    "lastLogin",
    "isVerified",
    "suspiciousActivity",
    "profile",
    "metadata",
];
const COURSES: &str = "courses";
const ORDERS: &str = "orders";
const PROGRESS: &str = "progresses";
const QUIZZES: &str = "quizzes";
const ATTEMPTS: &str = "quizattempts";
const ATTEMPT_COUNTERS: &str = "quizattemptcounters";
const CERTIFICATES: &str = "certificates";

const DUPLICATE_KEY: i32 = 11000;

/// Maps a driver error to `StoreError`, naming the first of `keys` that the
/// server's duplicate-key message mentions.
fn classify(err: mongodb::error::Error, keys: &[&str]) -> StoreError {
    let message = match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == DUPLICATE_KEY => {
            Some(we.message.clone())
        }
        ErrorKind::Command(ref ce) if ce.code == DUPLICATE_KEY => Some(ce.message.clone()),
        _ => None,
    };
    match message {
        Some(message) => {
            let key = keys
                .iter()
                .find(|k| message.contains(*k))
                .or_else(|| keys.first())
                .copied()
                .unwrap_or("_id");
            StoreError::Duplicate(key.to_string())
        }
        None => StoreError::Backend(err.into()),
    }
}

fn backend(err: mongodb::error::Error) -> StoreError {
    StoreError::Backend(err.into())
}

fn read_count(doc: &Document, key: &str) -> u64 {
    doc.get_i64(key)
        .or_else(|_| doc.get_i32(key).map(i64::from))
        .unwrap_or(0)
        .max(0) as u64
}

fn open_statuses() -> Bson {
    Bson::Array(vec![
        OrderStatus::Pending.as_str().into(),
        OrderStatus::Processing.as_str().into(),
    ])
}

/// `DocumentStore` over MongoDB. Collection names follow the existing
/// database so records written by earlier deployments stay readable.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn connect(uri: &str, database: &str) -> anyhow::Result<Self> {
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .context("Failed to connect to MongoDB")?;
        let store = Self::new(client.database(database));
        store.ensure_indexes().await?;
        Ok(store)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn courses(&self) -> Collection<Course> {
        self.db.collection(COURSES)
    }

    fn orders(&self) -> Collection<Order> {
        self.db.collection(ORDERS)
    }

    fn progress(&self) -> Collection<Progress> {
        self.db.collection(PROGRESS)
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.db.collection(QUIZZES)
    }

    fn attempts(&self) -> Collection<QuizAttempt> {
        self.db.collection(ATTEMPTS)
    }

    fn counters(&self) -> Collection<Document> {
        self.db.collection(ATTEMPT_COUNTERS)
    }

    fn certificates(&self) -> Collection<Certificate> {
        self.db.collection(CERTIFICATES)
    }

    /// Unique indexes backing the store's uniqueness rules, plus the
    /// lookup indexes the list queries sort on.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();
        let specs: Vec<(&str, Document, bool)> = vec![
            (USERS, doc! { "email": 1 }, true),
            (USERS, doc! { "username": 1 }, true),
            (ORDERS, doc! { "orderId": 1 }, true),
            (ORDERS, doc! { "userId": 1, "orderDate": -1 }, false),
            (PROGRESS, doc! { "userId": 1, "courseId": 1 }, true),
            (QUIZZES, doc! { "courseId": 1 }, false),
            (ATTEMPTS, doc! { "quizId": 1, "userId": 1, "attemptNumber": 1 }, true),
            (ATTEMPTS, doc! { "userId": 1, "courseId": 1, "submittedAt": -1 }, false),
            (ATTEMPT_COUNTERS, doc! { "quizId": 1 }, false),
            (CERTIFICATES, doc! { "userId": 1, "courseId": 1 }, true),
            (CERTIFICATES, doc! { "certificateNumber": 1 }, true),
        ];

        for (collection, keys, is_unique) in specs {
            let model = if is_unique {
                IndexModel::builder().keys(keys).options(unique()).build()
            } else {
                IndexModel::builder().keys(keys).build()
            };
            self.db
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .with_context(|| format!("Failed to create index on {}", collection))?;
        }
        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    async fn order_after_noop(&self, order_id: &str) -> StoreResult<Transition> {
        Ok(match self.find_order(order_id).await? {
            Some(order) => Transition::Unchanged(order),
            None => Transition::Missing,
        })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        track_db_operation("insert_one", USERS, async {
            self.users()
                .insert_one(user)
                .await
                .map(|_| ())
                .map_err(|e| classify(e, &["email", "username", "_id"]))
        })
        .await
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        track_db_operation("find_one", USERS, async {
            self.users().find_one(doc! { "_id": id }).await.map_err(backend)
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        track_db_operation("find_one", USERS, async {
            self.users()
                .find_one(doc! { "email": email })
                .await
                .map_err(backend)
        })
        .await
    }

    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> StoreResult<Option<User>> {
        self.users()
            .find_one(doc! { "$or": [ { "email": email }, { "username": username } ] })
            .await
            .map_err(backend)
    }

    async fn update_account(&self, user: &User) -> StoreResult<bool> {
        track_db_operation("update_one", USERS, async {
            let full = bson::to_document(user).map_err(|e| StoreError::Backend(e.into()))?;
            let changes: Document = full
                .into_iter()
                .filter(|(key, _)| ACCOUNT_FIELDS.contains(&key.as_str()))
                .collect();
            let result = self
                .users()
                .update_one(doc! { "_id": &user.id }, doc! { "$set": changes })
                .await
                .map_err(backend)?;
            Ok(result.matched_count > 0)
        })
        .await
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        skip: u64,
        limit: u64,
    ) -> StoreResult<(Vec<User>, u64)> {
        let mut query = Document::new();
        if let Some(user_type) = filter.user_type {
            query.insert("userType", user_type.as_str());
        }
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }

        track_db_operation("find", USERS, async {
            let total = self
                .users()
                .count_documents(query.clone())
                .await
                .map_err(backend)?;
            let users: Vec<User> = self
                .users()
                .find(query)
                .sort(doc! { "accountCreated": -1 })
                .skip(skip)
                .limit(i64::try_from(limit).unwrap_or(i64::MAX))
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)?;
            Ok((users, total))
        })
        .await
    }

    async fn grant_purchases(&self, user_id: &str, grants: &[PurchasedCourse]) -> StoreResult<u32> {
        track_db_operation("update_one", USERS, async {
            let mut added = 0;
            for grant in grants {
                let grant_doc = bson::to_bson(grant).map_err(|e| StoreError::Backend(e.into()))?;
                let result = self
                    .users()
                    .update_one(
                        doc! {
                            "_id": user_id,
                            "purchasedCourses.courseId": { "$ne": &grant.course_id },
                        },
                        doc! { "$push": { "purchasedCourses": grant_doc } },
                    )
                    .await
                    .map_err(backend)?;
                added += result.modified_count as u32;
            }
            Ok(added)
        })
        .await
    }

    async fn delete_disposable_users_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = self
            .users()
            .delete_many(doc! {
                "userType": { "$in": [UserType::Dummy.as_str(), UserType::Test.as_str()] },
                "accountCreated": { "$lt": chrono_to_bson(cutoff) },
            })
            .await
            .map_err(backend)?;
        Ok(result.deleted_count)
    }

    async fn user_breakdown(&self) -> StoreResult<Vec<UserTypeBreakdown>> {
        let pipeline = vec![
            doc! {
                "$group": {
                    "_id": { "$ifNull": ["$userType", UserType::Regular.as_str()] },
                    "count": { "$sum": 1 },
                    "activeUsers": {
                        "$sum": { "$cond": [{ "$eq": ["$status", UserStatus::Active.as_str()] }, 1, 0] }
                    },
                    "flaggedUsers": {
                        "$sum": { "$cond": [{ "$eq": ["$status", UserStatus::Flagged.as_str()] }, 1, 0] }
                    },
                }
            },
            doc! { "$sort": { "_id": 1 } },
        ];

        track_db_operation("aggregate", USERS, async {
            let mut cursor = self
                .db
                .collection::<Document>(USERS)
                .aggregate(pipeline)
                .await
                .map_err(backend)?;
            let mut rows = Vec::new();
            while let Some(row) = cursor.try_next().await.map_err(backend)? {
                let Some(raw_type) = row.get("_id").cloned() else {
                    continue;
                };
                let Ok(user_type) = bson::from_bson::<UserType>(raw_type) else {
                    continue;
                };
                rows.push(UserTypeBreakdown {
                    user_type,
                    count: read_count(&row, "count"),
                    active_users: read_count(&row, "activeUsers"),
                    flagged_users: read_count(&row, "flaggedUsers"),
                });
            }
            Ok(rows)
        })
        .await
    }

    async fn count_users(&self) -> StoreResult<u64> {
        self.users().count_documents(doc! {}).await.map_err(backend)
    }

    async fn count_suspicious_users(&self, min_count: u32) -> StoreResult<u64> {
        self.users()
            .count_documents(doc! { "suspiciousActivity.count": { "$gte": i64::from(min_count) } })
            .await
            .map_err(backend)
    }

    async fn insert_course(&self, course: &Course) -> StoreResult<()> {
        track_db_operation("insert_one", COURSES, async {
            self.courses()
                .insert_one(course)
                .await
                .map(|_| ())
                .map_err(|e| classify(e, &["_id"]))
        })
        .await
    }

    async fn find_course(&self, id: &str) -> StoreResult<Option<Course>> {
        track_db_operation("find_one", COURSES, async {
            self.courses().find_one(doc! { "_id": id }).await.map_err(backend)
        })
        .await
    }

    async fn find_courses(&self, ids: &[String]) -> StoreResult<Vec<Course>> {
        track_db_operation("find", COURSES, async {
            self.courses()
                .find(doc! { "_id": { "$in": ids } })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }

    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        track_db_operation("find", COURSES, async {
            self.courses()
                .find(doc! {})
                .sort(doc! { "createdAt": -1 })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        track_db_operation("insert_one", ORDERS, async {
            self.orders()
                .insert_one(order)
                .await
                .map(|_| ())
                .map_err(|e| classify(e, &["orderId", "_id"]))
        })
        .await
    }

    async fn find_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        track_db_operation("find_one", ORDERS, async {
            self.orders()
                .find_one(doc! { "orderId": order_id })
                .await
                .map_err(backend)
        })
        .await
    }

    async fn complete_order(
        &self,
        order_id: &str,
        details: &GatewayPaymentDetails,
        now: DateTime<Utc>,
    ) -> StoreResult<Transition> {
        let paid_at = chrono_to_bson(now);
        let mut set = doc! {
            "payment.status": PaymentStatus::Completed.as_str(),
            "payment.paidAt": paid_at,
            "status": OrderStatus::Completed.as_str(),
            "completedAt": paid_at,
        };
        let references = [
            ("payment.razorpayOrderId", &details.razorpay_order_id),
            ("payment.razorpayPaymentId", &details.razorpay_payment_id),
            ("payment.razorpaySignature", &details.razorpay_signature),
            ("payment.transactionId", &details.transaction_id),
        ];
        for (field, value) in references {
            if let Some(value) = value {
                set.insert(field, value.as_str());
            }
        }

        let updated = track_db_operation("find_one_and_update", ORDERS, async {
            self.orders()
                .find_one_and_update(
                    doc! { "orderId": order_id, "status": { "$in": open_statuses() } },
                    doc! { "$set": set },
                )
                .return_document(ReturnDocument::After)
                .await
                .map_err(backend)
        })
        .await?;

        match updated {
            Some(order) => Ok(Transition::Applied(order)),
            None => self.order_after_noop(order_id).await,
        }
    }

    async fn fail_order(&self, order_id: &str, reason: Option<&str>) -> StoreResult<Transition> {
        let mut set = doc! {
            "payment.status": PaymentStatus::Failed.as_str(),
            "status": OrderStatus::Cancelled.as_str(),
        };
        if let Some(reason) = reason {
            set.insert("notes", reason);
        }

        let updated = track_db_operation("find_one_and_update", ORDERS, async {
            self.orders()
                .find_one_and_update(
                    doc! { "orderId": order_id, "status": { "$in": open_statuses() } },
                    doc! { "$set": set },
                )
                .return_document(ReturnDocument::After)
                .await
                .map_err(backend)
        })
        .await?;

        match updated {
            Some(order) => Ok(Transition::Applied(order)),
            None => self.order_after_noop(order_id).await,
        }
    }

    async fn list_user_orders(&self, user_id: &str) -> StoreResult<Vec<Order>> {
        track_db_operation("find", ORDERS, async {
            self.orders()
                .find(doc! { "userId": user_id })
                .sort(doc! { "orderDate": -1 })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let mut query = Document::new();
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }
        if let Some(payment_status) = filter.payment_status {
            query.insert("payment.status", payment_status.as_str());
        }

        track_db_operation("find", ORDERS, async {
            self.orders()
                .find(query)
                .sort(doc! { "orderDate": -1 })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }

    async fn find_progress(&self, user_id: &str, course_id: &str) -> StoreResult<Option<Progress>> {
        track_db_operation("find_one", PROGRESS, async {
            self.progress()
                .find_one(doc! { "userId": user_id, "courseId": course_id })
                .await
                .map_err(backend)
        })
        .await
    }

    async fn ensure_progress(&self, fresh: &Progress) -> StoreResult<Progress> {
        let mut on_insert = bson::to_document(fresh).map_err(|e| StoreError::Backend(e.into()))?;
        on_insert.remove("userId");
        on_insert.remove("courseId");

        let upsert = self
            .progress()
            .update_one(
                doc! { "userId": &fresh.user_id, "courseId": &fresh.course_id },
                doc! { "$setOnInsert": on_insert },
            )
            .upsert(true)
            .await;

        // Two first visits racing on the unique (userId, courseId) index:
        // the loser's upsert fails, but the record exists either way.
        match upsert.map_err(|e| classify(e, &["userId"])) {
            Ok(_) | Err(StoreError::Duplicate(_)) => {}
            Err(other) => return Err(other),
        }

        self.find_progress(&fresh.user_id, &fresh.course_id)
            .await?
            .ok_or_else(|| StoreError::Backend(anyhow!("progress record missing after upsert")))
    }

    async fn raise_watch_time(
        &self,
        user_id: &str,
        course_id: &str,
        lesson_id: &str,
        seconds: u64,
    ) -> StoreResult<()> {
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        let raise = || async {
            self.progress()
                .update_one(
                    doc! {
                        "userId": user_id,
                        "courseId": course_id,
                        "watchTime": {
                            "$elemMatch": { "lessonId": lesson_id, "seconds": { "$lt": seconds } }
                        },
                    },
                    doc! { "$set": { "watchTime.$.seconds": seconds } },
                )
                .await
                .map(|r| r.matched_count > 0)
                .map_err(backend)
        };

        track_db_operation("update_one", PROGRESS, async {
            if raise().await? {
                return Ok(());
            }

            let appended = self
                .progress()
                .update_one(
                    doc! {
                        "userId": user_id,
                        "courseId": course_id,
                        "watchTime.lessonId": { "$ne": lesson_id },
                    },
                    doc! { "$push": { "watchTime": { "lessonId": lesson_id, "seconds": seconds } } },
                )
                .await
                .map_err(backend)?;
            if appended.matched_count > 0 {
                return Ok(());
            }

            // The entry exists now. Either it already holds >= seconds, or a
            // concurrent push added a smaller value after our first check.
            raise().await.map(|_| ())
        })
        .await
    }

    async fn apply_lesson_progress(
        &self,
        user_id: &str,
        course_id: &str,
        lesson_id: &str,
        completed: bool,
        total_lessons: usize,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Progress>> {
        let existing = doc! { "$ifNull": ["$completedLessons", []] };
        let lessons = if completed {
            Bson::Document(doc! {
                "$cond": [
                    { "$in": [{ "$literal": lesson_id }, existing.clone()] },
                    existing.clone(),
                    { "$concatArrays": [existing.clone(), [{ "$literal": lesson_id }]] },
                ]
            })
        } else {
            Bson::Document(existing)
        };

        let percentage = if total_lessons == 0 {
            Bson::Int32(0)
        } else {
            Bson::Document(doc! {
                "$toInt": {
                    "$min": [
                        100,
                        { "$floor": { "$add": [
                            { "$multiply": [
                                { "$divide": [{ "$size": "$completedLessons" }, total_lessons as f64] },
                                100.0,
                            ] },
                            0.5,
                        ] } },
                    ]
                }
            })
        };

        let stamp = chrono_to_bson(now);
        let pipeline = vec![
            doc! {
                "$set": {
                    "completedLessons": lessons,
                    "currentLesson": { "$literal": lesson_id },
                    "lastAccessed": stamp,
                    "updatedAt": stamp,
                }
            },
            doc! { "$set": { "progressPercentage": percentage } },
        ];

        track_db_operation("find_one_and_update", PROGRESS, async {
            self.progress()
                .find_one_and_update(doc! { "userId": user_id, "courseId": course_id }, pipeline)
                .return_document(ReturnDocument::After)
                .await
                .map_err(backend)
        })
        .await
    }

    async fn mark_certificate_issued(&self, user_id: &str, course_id: &str) -> StoreResult<()> {
        self.progress()
            .update_one(
                doc! { "userId": user_id, "courseId": course_id },
                doc! { "$set": { "certificateIssued": true } },
            )
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()> {
        track_db_operation("insert_one", QUIZZES, async {
            self.quizzes()
                .insert_one(quiz)
                .await
                .map(|_| ())
                .map_err(|e| classify(e, &["_id"]))
        })
        .await
    }

    async fn find_quiz(&self, id: &str) -> StoreResult<Option<Quiz>> {
        track_db_operation("find_one", QUIZZES, async {
            self.quizzes().find_one(doc! { "_id": id }).await.map_err(backend)
        })
        .await
    }

    async fn replace_quiz(&self, quiz: &Quiz) -> StoreResult<bool> {
        track_db_operation("replace_one", QUIZZES, async {
            let result = self
                .quizzes()
                .replace_one(doc! { "_id": &quiz.id }, quiz)
                .await
                .map_err(backend)?;
            Ok(result.matched_count > 0)
        })
        .await
    }

    async fn set_quiz_published(&self, id: &str, published: bool) -> StoreResult<Option<Quiz>> {
        self.quizzes()
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": { "isPublished": published, "updatedAt": chrono_to_bson(Utc::now()) } },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(backend)
    }

    async fn delete_quiz(&self, id: &str) -> StoreResult<bool> {
        track_db_operation("delete", QUIZZES, async {
            let deleted = self
                .quizzes()
                .delete_one(doc! { "_id": id })
                .await
                .map_err(backend)?;
            if deleted.deleted_count == 0 {
                return Ok(false);
            }
            self.attempts()
                .delete_many(doc! { "quizId": id })
                .await
                .map_err(backend)?;
            self.counters()
                .delete_many(doc! { "quizId": id })
                .await
                .map_err(backend)?;
            Ok(true)
        })
        .await
    }

    async fn list_quizzes(&self) -> StoreResult<Vec<Quiz>> {
        track_db_operation("find", QUIZZES, async {
            self.quizzes()
                .find(doc! {})
                .sort(doc! { "createdAt": -1 })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }

    async fn list_course_quizzes(&self, course_id: &str, viewer_id: &str) -> StoreResult<Vec<Quiz>> {
        track_db_operation("find", QUIZZES, async {
            self.quizzes()
                .find(doc! {
                    "courseId": course_id,
                    "$or": [ { "isPublished": true }, { "createdBy": viewer_id } ],
                })
                .sort(doc! { "createdAt": 1 })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }

    async fn count_attempts(&self, quiz_id: &str, user_id: &str) -> StoreResult<u64> {
        track_db_operation("count", ATTEMPTS, async {
            self.attempts()
                .count_documents(doc! { "quizId": quiz_id, "userId": user_id })
                .await
                .map_err(backend)
        })
        .await
    }

    async fn count_quiz_attempts(&self, quiz_id: &str) -> StoreResult<u64> {
        self.attempts()
            .count_documents(doc! { "quizId": quiz_id })
            .await
            .map_err(backend)
    }

    async fn next_attempt_number(&self, quiz_id: &str, user_id: &str) -> StoreResult<u32> {
        let key = format!("{}:{}", quiz_id, user_id);
        track_db_operation("find_one_and_update", ATTEMPT_COUNTERS, async {
            // Concurrent first upserts on one key can lose the unique _id
            // race; the retry then increments the winner's document.
            let mut attempts_left = 3;
            loop {
                let result = self
                    .counters()
                    .find_one_and_update(
                        doc! { "_id": &key },
                        doc! {
                            "$inc": { "seq": 1_i64 },
                            "$setOnInsert": { "quizId": quiz_id, "userId": user_id },
                        },
                    )
                    .upsert(true)
                    .return_document(ReturnDocument::After)
                    .await
                    .map_err(|e| classify(e, &["_id"]));

                match result {
                    Ok(Some(counter)) => {
                        let seq = read_count(&counter, "seq");
                        return u32::try_from(seq)
                            .map_err(|_| StoreError::Backend(anyhow!("attempt counter overflow")));
                    }
                    Ok(None) => {
                        return Err(StoreError::Backend(anyhow!(
                            "attempt counter upsert returned no document"
                        )))
                    }
                    Err(StoreError::Duplicate(_)) if attempts_left > 1 => attempts_left -= 1,
                    Err(other) => return Err(other),
                }
            }
        })
        .await
    }

    async fn insert_attempt(&self, attempt: &QuizAttempt) -> StoreResult<()> {
        track_db_operation("insert_one", ATTEMPTS, async {
            self.attempts()
                .insert_one(attempt)
                .await
                .map(|_| ())
                .map_err(|e| classify(e, &["attemptNumber", "_id"]))
        })
        .await
    }

    async fn list_quiz_attempts(&self, quiz_id: &str) -> StoreResult<Vec<QuizAttempt>> {
        track_db_operation("find", ATTEMPTS, async {
            self.attempts()
                .find(doc! { "quizId": quiz_id })
                .sort(doc! { "submittedAt": -1 })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }

    async fn list_user_attempts(&self, user_id: &str, course_id: &str) -> StoreResult<Vec<QuizAttempt>> {
        track_db_operation("find", ATTEMPTS, async {
            self.attempts()
                .find(doc! { "userId": user_id, "courseId": course_id })
                .sort(doc! { "submittedAt": -1 })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }

    async fn insert_certificate(&self, certificate: &Certificate) -> StoreResult<()> {
        track_db_operation("insert_one", CERTIFICATES, async {
            self.certificates()
                .insert_one(certificate)
                .await
                .map(|_| ())
                .map_err(|e| classify(e, &["certificateNumber", "userId"]))
        })
        .await
    }

    async fn find_certificate(&self, id: &str) -> StoreResult<Option<Certificate>> {
        self.certificates()
            .find_one(doc! { "_id": id })
            .await
            .map_err(backend)
    }

    async fn find_certificate_for(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<Option<Certificate>> {
        track_db_operation("find_one", CERTIFICATES, async {
            self.certificates()
                .find_one(doc! { "userId": user_id, "courseId": course_id })
                .await
                .map_err(backend)
        })
        .await
    }

    async fn find_certificate_by_number(&self, number: &str) -> StoreResult<Option<Certificate>> {
        self.certificates()
            .find_one(doc! { "certificateNumber": number })
            .await
            .map_err(backend)
    }

    async fn list_user_certificates(&self, user_id: &str) -> StoreResult<Vec<Certificate>> {
        track_db_operation("find", CERTIFICATES, async {
            self.certificates()
                .find(doc! { "userId": user_id })
                .sort(doc! { "issueDate": -1 })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }

    async fn list_certificates(&self) -> StoreResult<Vec<Certificate>> {
        track_db_operation("find", CERTIFICATES, async {
            self.certificates()
                .find(doc! {})
                .sort(doc! { "issueDate": -1 })
                .await
                .map_err(backend)?
                .try_collect()
                .await
                .map_err(backend)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_counts_of_either_integer_width() {
        let row = doc! { "a": 3_i32, "b": 7_i64 };
        assert_eq!(read_count(&row, "a"), 3);
        assert_eq!(read_count(&row, "b"), 7);
        assert_eq!(read_count(&row, "missing"), 0);
    }
}
