//! Raw record fetching.
//!
//! Pulls the closure of rows one teacher's results depend on. Only the
//! identity lookup is fatal: every other step that fails is logged and
//! contributes no rows, so the reducers see partial data rather than an
//! error.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{FetchError, PipelineError};
use crate::models::{
    AnswerDetail, ClassSession, Feedback, GroupAssignment, Question, Quiz, Recommendation,
    RosterMembership, ServerClassMetrics, StudentAnswer, Teacher,
};

/// Read access to the backend tables the pipeline consumes.
///
/// Id-filtered methods are only called with non-empty id lists.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn teacher_by_user(&self, user_id: Uuid) -> Result<Option<Teacher>, FetchError>;
    async fn classes_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<ClassSession>, FetchError>;
    async fn assigned_groups(&self, teacher_id: Uuid) -> Result<Vec<Uuid>, FetchError>;
    async fn quizzes_for_classes(&self, class_ids: &[Uuid]) -> Result<Vec<Quiz>, FetchError>;
    async fn questions_for_quizzes(&self, quiz_ids: &[Uuid]) -> Result<Vec<Question>, FetchError>;
    async fn answers_for_quizzes(&self, quiz_ids: &[Uuid])
        -> Result<Vec<StudentAnswer>, FetchError>;
    async fn details_for_answers(&self, answer_ids: &[Uuid])
        -> Result<Vec<AnswerDetail>, FetchError>;
    async fn roster_for_groups(&self, group_ids: &[Uuid])
        -> Result<Vec<RosterMembership>, FetchError>;
    async fn server_metrics_for_classes(
        &self,
        class_ids: &[Uuid],
    ) -> Result<Vec<ServerClassMetrics>, FetchError>;
    async fn feedback_for_classes(&self, class_ids: &[Uuid]) -> Result<Vec<Feedback>, FetchError>;
    async fn recommendations_for_classes(
        &self,
        class_ids: &[Uuid],
    ) -> Result<Vec<Recommendation>, FetchError>;
}

/// Everything fetched for one teacher, frozen before any reducer runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchedRecords {
    pub classes: Vec<ClassSession>,
    pub assigned_groups: Vec<Uuid>,
    pub quizzes: Vec<Quiz>,
    pub questions: Vec<Question>,
    pub answers: Vec<StudentAnswer>,
    pub details: Vec<AnswerDetail>,
    pub roster: Vec<RosterMembership>,
    pub server_metrics: Vec<ServerClassMetrics>,
    pub feedback: Vec<Feedback>,
    pub recommendations: Vec<Recommendation>,
}

fn or_empty<T>(step: &'static str, result: Result<Vec<T>, FetchError>) -> Vec<T> {
    match result {
        Ok(rows) => {
            debug!(step, rows = rows.len(), "fetched");
            rows
        }
        Err(err) => {
            warn!(step, error = %err, "fetch step failed, continuing without its rows");
            Vec::new()
        }
    }
}

async fn filtered<'a, T, F, Fut>(step: &'static str, ids: &'a [Uuid], fetch: F) -> Vec<T>
where
    F: FnOnce(&'a [Uuid]) -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
{
    if ids.is_empty() {
        debug!(step, "empty filter, skipping query");
        return Vec::new();
    }
    or_empty(step, fetch(ids).await)
}

fn unique_ids(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Resolves the teacher behind `user_id` and fetches their record closure.
#[instrument(skip(source))]
pub async fn fetch_records<S>(
    source: &S,
    user_id: Uuid,
) -> Result<(Teacher, FetchedRecords), PipelineError>
where
    S: RecordSource + ?Sized,
{
    let teacher = match source.teacher_by_user(user_id).await {
        Ok(Some(teacher)) => teacher,
        Ok(None) => return Err(PipelineError::TeacherNotFound(user_id)),
        Err(err) => {
            warn!(error = %err, "teacher lookup failed");
            return Err(PipelineError::TeacherNotFound(user_id));
        }
    };

    let classes = or_empty("classes", source.classes_for_teacher(teacher.id).await);
    let class_ids = unique_ids(classes.iter().map(|c| c.id));

    let (assigned_groups, quizzes, server_metrics, feedback, recommendations) = tokio::join!(
        async { or_empty("assigned_groups", source.assigned_groups(teacher.id).await) },
        filtered("quizzes", &class_ids, move |ids| source.quizzes_for_classes(ids)),
        filtered("server_metrics", &class_ids, move |ids| {
            source.server_metrics_for_classes(ids)
        }),
        filtered("feedback", &class_ids, move |ids| source.feedback_for_classes(ids)),
        filtered("recommendations", &class_ids, move |ids| {
            source.recommendations_for_classes(ids)
        }),
    );

    let quiz_ids = unique_ids(quizzes.iter().map(|q| q.id));
    let (questions, answers) = tokio::join!(
        filtered("questions", &quiz_ids, move |ids| source.questions_for_quizzes(ids)),
        filtered("answers", &quiz_ids, move |ids| source.answers_for_quizzes(ids)),
    );

    let answer_ids = unique_ids(answers.iter().map(|a| a.id));
    let group_ids = unique_ids(
        assigned_groups
            .iter()
            .copied()
            .chain(classes.iter().map(|c| c.group.id)),
    );
    let (details, roster) = tokio::join!(
        filtered("details", &answer_ids, move |ids| source.details_for_answers(ids)),
        filtered("roster", &group_ids, move |ids| source.roster_for_groups(ids)),
    );

    info!(
        teacher_id = %teacher.id,
        classes = classes.len(),
        quizzes = quizzes.len(),
        answers = answers.len(),
        roster = roster.len(),
        "record closure fetched"
    );

    Ok((
        teacher,
        FetchedRecords {
            classes,
            assigned_groups,
            quizzes,
            questions,
            answers,
            details,
            roster,
            server_metrics,
            feedback,
            recommendations,
        },
    ))
}

/// A frozen dump of backend rows that can stand in for the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub teachers: Vec<Teacher>,
    pub assignments: Vec<GroupAssignment>,
    pub classes: Vec<ClassSession>,
    pub quizzes: Vec<Quiz>,
    pub questions: Vec<Question>,
    pub answers: Vec<StudentAnswer>,
    pub details: Vec<AnswerDetail>,
    pub roster: Vec<RosterMembership>,
    pub server_metrics: Vec<ServerClassMetrics>,
    pub feedback: Vec<Feedback>,
    pub recommendations: Vec<Recommendation>,
}

impl Snapshot {
    pub fn from_records(teacher: Teacher, records: FetchedRecords) -> Self {
        let assignments = records
            .assigned_groups
            .iter()
            .map(|group_id| GroupAssignment {
                teacher_id: teacher.id,
                group_id: *group_id,
            })
            .collect();
        Self {
            teachers: vec![teacher],
            assignments,
            classes: records.classes,
            quizzes: records.quizzes,
            questions: records.questions,
            answers: records.answers,
            details: records.details,
            roster: records.roster,
            server_metrics: records.server_metrics,
            feedback: records.feedback,
            recommendations: records.recommendations,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("snapshot {} is not valid JSON", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write snapshot {}", path.display()))
    }
}

fn keep<T: Clone>(rows: &[T], ids: &[Uuid], key: impl Fn(&T) -> Uuid) -> Vec<T> {
    rows.iter().filter(|row| ids.contains(&key(row))).cloned().collect()
}

#[async_trait]
impl RecordSource for Snapshot {
    async fn teacher_by_user(&self, user_id: Uuid) -> Result<Option<Teacher>, FetchError> {
        Ok(self.teachers.iter().find(|t| t.user_id == user_id).cloned())
    }

    async fn classes_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<ClassSession>, FetchError> {
        Ok(keep(&self.classes, &[teacher_id], |c| c.teacher_id))
    }

    async fn assigned_groups(&self, teacher_id: Uuid) -> Result<Vec<Uuid>, FetchError> {
        Ok(self
            .assignments
            .iter()
            .filter(|a| a.teacher_id == teacher_id)
            .map(|a| a.group_id)
            .collect())
    }

    async fn quizzes_for_classes(&self, class_ids: &[Uuid]) -> Result<Vec<Quiz>, FetchError> {
        Ok(keep(&self.quizzes, class_ids, |q| q.class_id))
    }

    async fn questions_for_quizzes(&self, quiz_ids: &[Uuid]) -> Result<Vec<Question>, FetchError> {
        Ok(keep(&self.questions, quiz_ids, |q| q.quiz_id))
    }

    async fn answers_for_quizzes(
        &self,
        quiz_ids: &[Uuid],
    ) -> Result<Vec<StudentAnswer>, FetchError> {
        Ok(keep(&self.answers, quiz_ids, |a| a.quiz_id))
    }

    async fn details_for_answers(
        &self,
        answer_ids: &[Uuid],
    ) -> Result<Vec<AnswerDetail>, FetchError> {
        Ok(keep(&self.details, answer_ids, |d| d.answer_id))
    }

    async fn roster_for_groups(
        &self,
        group_ids: &[Uuid],
    ) -> Result<Vec<RosterMembership>, FetchError> {
        Ok(keep(&self.roster, group_ids, |m| m.group_id))
    }

    async fn server_metrics_for_classes(
        &self,
        class_ids: &[Uuid],
    ) -> Result<Vec<ServerClassMetrics>, FetchError> {
        Ok(keep(&self.server_metrics, class_ids, |m| m.class_id))
    }

    async fn feedback_for_classes(&self, class_ids: &[Uuid]) -> Result<Vec<Feedback>, FetchError> {
        Ok(keep(&self.feedback, class_ids, |f| f.class_id))
    }

    async fn recommendations_for_classes(
        &self,
        class_ids: &[Uuid],
    ) -> Result<Vec<Recommendation>, FetchError> {
        Ok(keep(&self.recommendations, class_ids, |r| r.class_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a snapshot but fails selected steps and counts filtered calls.
    struct FlakySource {
        inner: Snapshot,
        fail_quizzes: bool,
        fail_roster: bool,
        filtered_calls: AtomicUsize,
    }

    impl FlakySource {
        fn new(inner: Snapshot) -> Self {
            Self {
                inner,
                fail_quizzes: false,
                fail_roster: false,
                filtered_calls: AtomicUsize::new(0),
            }
        }

        fn touch(&self) {
            self.filtered_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn down() -> FetchError {
        FetchError::Database(sqlx::Error::PoolTimedOut)
    }

    #[async_trait]
    impl RecordSource for FlakySource {
        async fn teacher_by_user(&self, user_id: Uuid) -> Result<Option<Teacher>, FetchError> {
            self.inner.teacher_by_user(user_id).await
        }

        async fn classes_for_teacher(
            &self,
            teacher_id: Uuid,
        ) -> Result<Vec<ClassSession>, FetchError> {
            self.inner.classes_for_teacher(teacher_id).await
        }

        async fn assigned_groups(&self, teacher_id: Uuid) -> Result<Vec<Uuid>, FetchError> {
            self.inner.assigned_groups(teacher_id).await
        }

        async fn quizzes_for_classes(&self, class_ids: &[Uuid]) -> Result<Vec<Quiz>, FetchError> {
            self.touch();
            if self.fail_quizzes {
                return Err(down());
            }
            self.inner.quizzes_for_classes(class_ids).await
        }

        async fn questions_for_quizzes(
            &self,
            quiz_ids: &[Uuid],
        ) -> Result<Vec<Question>, FetchError> {
            self.touch();
            self.inner.questions_for_quizzes(quiz_ids).await
        }

        async fn answers_for_quizzes(
            &self,
            quiz_ids: &[Uuid],
        ) -> Result<Vec<StudentAnswer>, FetchError> {
            self.touch();
            self.inner.answers_for_quizzes(quiz_ids).await
        }

        async fn details_for_answers(
            &self,
            answer_ids: &[Uuid],
        ) -> Result<Vec<AnswerDetail>, FetchError> {
            self.touch();
            self.inner.details_for_answers(answer_ids).await
        }

        async fn roster_for_groups(
            &self,
            group_ids: &[Uuid],
        ) -> Result<Vec<RosterMembership>, FetchError> {
            self.touch();
            if self.fail_roster {
                return Err(down());
            }
            self.inner.roster_for_groups(group_ids).await
        }

        async fn server_metrics_for_classes(
            &self,
            class_ids: &[Uuid],
        ) -> Result<Vec<ServerClassMetrics>, FetchError> {
            self.touch();
            self.inner.server_metrics_for_classes(class_ids).await
        }

        async fn feedback_for_classes(
            &self,
            class_ids: &[Uuid],
        ) -> Result<Vec<Feedback>, FetchError> {
            self.touch();
            self.inner.feedback_for_classes(class_ids).await
        }

        async fn recommendations_for_classes(
            &self,
            class_ids: &[Uuid],
        ) -> Result<Vec<Recommendation>, FetchError> {
            self.touch();
            self.inner.recommendations_for_classes(class_ids).await
        }
    }

    #[tokio::test]
    async fn unknown_user_is_fatal() {
        let snapshot = fixtures::two_class_snapshot();
        let err = fetch_records(&snapshot, Uuid::new_v4())
            .await
            .expect_err("unknown user");
        assert!(matches!(err, PipelineError::TeacherNotFound(_)));
    }

    #[tokio::test]
    async fn fetches_only_the_teachers_closure() {
        let mut snapshot = fixtures::two_class_snapshot();
        let other = fixtures::class_session(Uuid::new_v4(), Uuid::new_v4(), 9, "programada");
        snapshot.classes.push(other.clone());

        let (teacher, records) = fetch_records(&snapshot, fixtures::USER_ID)
            .await
            .expect("closure");
        assert_eq!(teacher.user_id, fixtures::USER_ID);
        assert_eq!(records.classes.len(), 2);
        assert!(records.classes.iter().all(|c| c.id != other.id));
        assert_eq!(records.quizzes.len(), 4);
        assert_eq!(records.roster.len(), 5);
        assert!(!records.answers.is_empty());
        assert!(!records.details.is_empty());
    }

    #[tokio::test]
    async fn failed_steps_degrade_to_empty() {
        let mut source = FlakySource::new(fixtures::two_class_snapshot());
        source.fail_quizzes = true;
        source.fail_roster = true;

        let (_, records) = fetch_records(&source, fixtures::USER_ID)
            .await
            .expect("partial closure");
        assert_eq!(records.classes.len(), 2);
        assert!(records.quizzes.is_empty());
        assert!(records.roster.is_empty());
        // No quizzes means no quiz ids, so dependent steps are never queried.
        assert!(records.questions.is_empty());
        assert!(records.answers.is_empty());
        assert!(records.details.is_empty());
    }

    #[tokio::test]
    async fn teacher_without_classes_issues_no_filtered_queries() {
        let mut snapshot = fixtures::two_class_snapshot();
        snapshot.classes.clear();
        snapshot.assignments.clear();
        let source = FlakySource::new(snapshot);

        let (_, records) = fetch_records(&source, fixtures::USER_ID)
            .await
            .expect("empty closure");
        assert_eq!(records, FetchedRecords::default());
        assert_eq!(source.filtered_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_records() {
        let snapshot = fixtures::two_class_snapshot();
        let (teacher, records) = fetch_records(&snapshot, fixtures::USER_ID)
            .await
            .expect("closure");
        let frozen = Snapshot::from_records(teacher, records.clone());
        let (_, again) = fetch_records(&frozen, fixtures::USER_ID)
            .await
            .expect("closure from frozen");
        assert_eq!(records, again);
    }
}
