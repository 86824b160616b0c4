use serde_json::Value;
use uuid::Uuid;

use crate::fetch::FetchedRecords;
use crate::models::{
    AnswerDetail, ClassSession, Feedback, FeedbackSummary, Quiz, StudentAlerts, StudentAnswer,
    StudentResult, PASSING_SCORE,
};

const SUMMARY_FIELDS: [&str; 5] = ["resumen", "summary", "mensaje", "message", "contenido"];

fn find_answer<'a>(
    answers: &'a [StudentAnswer],
    quiz: Option<&Quiz>,
    student_id: Uuid,
) -> Option<&'a StudentAnswer> {
    let quiz = quiz?;
    answers
        .iter()
        .find(|a| a.quiz_id == quiz.id && a.student_id == student_id)
}

/// Mean elapsed time over the answer's timed detail rows; `None` without any.
pub fn average_response_seconds(details: &[AnswerDetail], answer_id: Uuid) -> Option<f64> {
    let (total, count) = details
        .iter()
        .filter(|d| d.answer_id == answer_id)
        .filter_map(|d| d.elapsed_seconds)
        .fold((0.0, 0usize), |(total, count), secs| (total + secs, count + 1));
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

pub fn is_underperforming(post_score: Option<f64>) -> bool {
    post_score.is_some_and(|score| score < PASSING_SCORE)
}

/// Pulls a readable line out of free-form feedback content.
pub fn summarize_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Object(map) => SUMMARY_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| content.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn latest_feedback(
    feedback: &[Feedback],
    class_id: Uuid,
    student_id: Uuid,
) -> Option<FeedbackSummary> {
    feedback
        .iter()
        .filter(|f| f.class_id == class_id && f.student_id == student_id)
        .max_by_key(|f| f.sent_at)
        .map(|f| FeedbackSummary {
            kind: f.kind.clone(),
            summary: summarize_content(&f.content),
            date: f.sent_at,
        })
}

/// Builds one result per roster student of the class's group, attempted or not.
pub fn reduce_students(
    session: &ClassSession,
    pre_quiz: Option<&Quiz>,
    post_quiz: Option<&Quiz>,
    records: &FetchedRecords,
) -> Vec<StudentResult> {
    records
        .roster
        .iter()
        .filter(|m| m.group_id == session.group.id)
        .map(|membership| {
            let student = &membership.student;
            let pre = find_answer(&records.answers, pre_quiz, student.id);
            let post = find_answer(&records.answers, post_quiz, student.id);
            let pre_grade = pre.and_then(|a| a.grade.as_ref());
            let post_grade = post.and_then(|a| a.grade.as_ref());
            let post_score = post_grade.and_then(|g| g.numeric_score);

            let alerts = StudentAlerts {
                underperforming: is_underperforming(post_score),
                incomplete: !post.is_some_and(StudentAnswer::is_completed),
                low_participation: pre.is_none() && post.is_none(),
            };

            StudentResult {
                class_id: session.id,
                student: student.clone(),
                pre_score: pre_grade.and_then(|g| g.numeric_score),
                post_score,
                pre_percent: pre_grade.and_then(|g| g.percent_correct),
                post_percent: post_grade.and_then(|g| g.percent_correct),
                pre_status: pre.map(|a| a.status),
                post_status: post.map(|a| a.status),
                avg_response_seconds: post
                    .and_then(|a| average_response_seconds(&records.details, a.id)),
                alerts,
                latest_feedback: latest_feedback(&records.feedback, session.id, student.id),
            }
        })
        .collect()
}
