use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Post-test scores strictly below this mark (0–20 scale) flag a student as
/// underperforming.
pub const PASSING_SCORE: f64 = 11.0;

/// Attention entries below this participation percentage are flagged.
pub const LOW_PARTICIPATION_RATE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

impl Teacher {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassStatus {
    Scheduled,
    Executed,
    Cancelled,
    Unknown,
}

impl ClassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassStatus::Scheduled => "scheduled",
            ClassStatus::Executed => "executed",
            ClassStatus::Cancelled => "cancelled",
            ClassStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "programada" | "scheduled" | "planificada" | "en_preparacion" => ClassStatus::Scheduled,
            "ejecutada" | "executed" | "completada" | "completed" | "finalizada" => {
                ClassStatus::Executed
            }
            "cancelada" | "cancelled" | "canceled" => ClassStatus::Cancelled,
            _ => ClassStatus::Unknown,
        }
    }

    /// Scheduled and executed sessions are the ones a teacher is accountable for.
    pub fn is_active(&self) -> bool {
        matches!(self, ClassStatus::Scheduled | ClassStatus::Executed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizKind {
    Pre,
    Post,
}

impl QuizKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizKind::Pre => "pre",
            QuizKind::Post => "post",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pre" | "previo" | "entrada" | "diagnostico" => Some(QuizKind::Pre),
            "post" | "posterior" | "salida" => Some(QuizKind::Post),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Draft,
    Published,
    Closed,
}

impl QuizStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::Draft => "draft",
            QuizStatus::Published => "published",
            QuizStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "publicado" | "published" => QuizStatus::Published,
            "cerrado" | "closed" => QuizStatus::Closed,
            _ => QuizStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "completado" | "completed" | "finalizado" => AttemptStatus::Completed,
            _ => AttemptStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub grade: Option<String>,
    pub section: Option<String>,
}

impl Group {
    pub fn label(&self) -> String {
        match (&self.grade, &self.section) {
            (Some(grade), Some(section)) => format!("{} {}{}", self.name, grade, section),
            (Some(grade), None) => format!("{} {}", self.name, grade),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: Uuid,
    pub session_number: i32,
    pub scheduled_date: Option<NaiveDate>,
    pub executed_date: Option<NaiveDate>,
    pub status: ClassStatus,
    pub teacher_id: Uuid,
    pub topic_id: Uuid,
    pub topic_name: String,
    pub subject: Subject,
    pub group: Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub class_id: Uuid,
    pub kind: QuizKind,
    pub status: QuizStatus,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    #[serde(default)]
    pub numeric_score: Option<f64>,
    #[serde(default)]
    pub percent_correct: Option<f64>,
}

/// Shapes the grade relation is known to arrive in.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GradeShape {
    Many(Vec<Grade>),
    One(Grade),
}

/// Collapses a raw grade relation (null, object, or array) into at most one
/// grade.
pub fn normalize_grade(value: Option<serde_json::Value>) -> Option<Grade> {
    let value = value?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value::<GradeShape>(value) {
        Ok(GradeShape::Many(grades)) => grades.into_iter().next(),
        Ok(GradeShape::One(grade)) => Some(grade),
        Err(err) => {
            tracing::debug!(error = %err, "unrecognised grade shape, treating as ungraded");
            None
        }
    }
}

fn deserialize_grade<'de, D>(deserializer: D) -> Result<Option<Grade>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(normalize_grade(value))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAnswer {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub student_id: Uuid,
    pub status: AttemptStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_grade")]
    pub grade: Option<Grade>,
}

impl StudentAnswer {
    pub fn is_completed(&self) -> bool {
        self.status == AttemptStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDetail {
    pub answer_id: Uuid,
    pub question_id: Uuid,
    pub elapsed_seconds: Option<f64>,
    pub correct: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub section: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterMembership {
    pub group_id: Uuid,
    pub student: Student,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAssignment {
    pub teacher_id: Uuid,
    pub group_id: Uuid,
}

/// Aggregate row computed server-side for a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerClassMetrics {
    pub class_id: Uuid,
    pub completion_rate: Option<f64>,
    pub comprehension_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub class_id: Uuid,
    pub student_id: Uuid,
    pub kind: String,
    pub content: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub class_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub kind: String,
    pub summary: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudentAlerts {
    pub underperforming: bool,
    pub incomplete: bool,
    pub low_participation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentResult {
    pub class_id: Uuid,
    pub student: Student,
    pub pre_score: Option<f64>,
    pub post_score: Option<f64>,
    pub pre_percent: Option<f64>,
    pub post_percent: Option<f64>,
    pub pre_status: Option<AttemptStatus>,
    pub post_status: Option<AttemptStatus>,
    pub avg_response_seconds: Option<f64>,
    pub alerts: StudentAlerts,
    pub latest_feedback: Option<FeedbackSummary>,
}

impl StudentResult {
    pub fn completed_post(&self) -> bool {
        self.post_status == Some(AttemptStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSummary {
    pub quiz_id: Uuid,
    pub class_id: Uuid,
    pub kind: QuizKind,
    pub status: QuizStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub total_questions: usize,
    pub completed_responses: usize,
    pub roster_size: usize,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_id: Uuid,
    pub post_average: Option<f64>,
    pub pre_average: Option<f64>,
    pub participation_rate: f64,
    pub completion_rate: f64,
    pub comprehension_level: Option<f64>,
    pub improvement_delta: Option<f64>,
    pub roster_size: usize,
    pub completed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub session: ClassSession,
    pub pre_quiz: Option<QuizSummary>,
    pub post_quiz: Option<QuizSummary>,
    pub students: Vec<StudentResult>,
    pub metrics: ClassMetrics,
    pub has_recommendations: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionEntry {
    pub student_id: Uuid,
    pub student_name: String,
    pub group_label: String,
    pub subject_id: Uuid,
    pub subject_name: String,
    pub average_score: Option<f64>,
    pub pending_quizzes: usize,
    /// Never measured by the aggregator; stays `None`.
    pub participation_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherKpis {
    pub total_classes: usize,
    pub overall_average: Option<f64>,
    pub avg_participation: i64,
    pub at_risk_count: usize,
    pub pending_review_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherDashboard {
    pub teacher: Teacher,
    pub classes: Vec<ClassReport>,
    pub attention: Vec<AttentionEntry>,
    pub kpis: TeacherKpis,
}
