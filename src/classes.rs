use std::collections::HashSet;

use uuid::Uuid;

use crate::fetch::FetchedRecords;
use crate::models::{
    ClassMetrics, ClassReport, ClassSession, Quiz, QuizKind, QuizSummary, ServerClassMetrics,
    StudentResult,
};
use crate::students;

pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (total, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(total, count), v| (total + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

pub fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn improvement_delta(pre_average: Option<f64>, post_average: Option<f64>) -> Option<f64> {
    Some(post_average? - pre_average?)
}

pub fn reduce_class_metrics(
    class_id: Uuid,
    results: &[StudentResult],
    roster_size: usize,
    server: Option<&ServerClassMetrics>,
) -> ClassMetrics {
    let post_average = mean(results.iter().filter_map(|r| r.post_score));
    let pre_average = mean(results.iter().filter_map(|r| r.pre_score));
    let completed_count = results.iter().filter(|r| r.completed_post()).count();

    ClassMetrics {
        class_id,
        post_average,
        pre_average,
        participation_rate: rate(completed_count, roster_size),
        completion_rate: server.and_then(|m| m.completion_rate).unwrap_or(0.0),
        comprehension_level: server.and_then(|m| m.comprehension_level),
        improvement_delta: improvement_delta(pre_average, post_average),
        roster_size,
        completed_count,
    }
}

fn first_quiz<'a>(quizzes: &'a [Quiz], class_id: Uuid, kind: QuizKind) -> Option<&'a Quiz> {
    quizzes
        .iter()
        .find(|q| q.class_id == class_id && q.kind == kind)
}

pub fn summarize_quiz(quiz: &Quiz, roster: &HashSet<Uuid>, records: &FetchedRecords) -> QuizSummary {
    let total_questions = records
        .questions
        .iter()
        .filter(|q| q.quiz_id == quiz.id)
        .count();
    let completed: HashSet<Uuid> = records
        .answers
        .iter()
        .filter(|a| a.quiz_id == quiz.id && a.is_completed() && roster.contains(&a.student_id))
        .map(|a| a.student_id)
        .collect();

    QuizSummary {
        quiz_id: quiz.id,
        class_id: quiz.class_id,
        kind: quiz.kind,
        status: quiz.status,
        due_date: quiz.due_date,
        total_questions,
        completed_responses: completed.len(),
        roster_size: roster.len(),
        completion_rate: rate(completed.len(), roster.len()),
    }
}

/// Runs the per-student and per-class reducers for one session.
pub fn build_class_report(session: &ClassSession, records: &FetchedRecords) -> ClassReport {
    let pre_quiz = first_quiz(&records.quizzes, session.id, QuizKind::Pre);
    let post_quiz = first_quiz(&records.quizzes, session.id, QuizKind::Post);
    let roster: HashSet<Uuid> = records
        .roster
        .iter()
        .filter(|m| m.group_id == session.group.id)
        .map(|m| m.student.id)
        .collect();

    let students = students::reduce_students(session, pre_quiz, post_quiz, records);
    let server = records
        .server_metrics
        .iter()
        .find(|m| m.class_id == session.id);
    let metrics = reduce_class_metrics(session.id, &students, students.len(), server);

    ClassReport {
        session: session.clone(),
        pre_quiz: pre_quiz.map(|q| summarize_quiz(q, &roster, records)),
        post_quiz: post_quiz.map(|q| summarize_quiz(q, &roster, records)),
        students,
        metrics,
        has_recommendations: records
            .recommendations
            .iter()
            .any(|r| r.class_id == session.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::models::{AttemptStatus, QuizStatus, Recommendation};

    fn result_with(pre: Option<f64>, post: Option<f64>, completed: bool) -> StudentResult {
        let mut result = fixtures::blank_result(Uuid::new_v4());
        result.pre_score = pre;
        result.post_score = post;
        result.post_status = completed.then_some(AttemptStatus::Completed);
        result
    }

    #[test]
    fn empty_roster_has_zero_participation() {
        let metrics = reduce_class_metrics(Uuid::new_v4(), &[], 0, None);
        assert_eq!(metrics.participation_rate, 0.0);
        assert_eq!(metrics.completed_count, 0);
        assert_eq!(metrics.post_average, None);
        assert_eq!(metrics.pre_average, None);
        assert_eq!(metrics.improvement_delta, None);
        assert_eq!(metrics.completion_rate, 0.0);
        assert_eq!(metrics.comprehension_level, None);
    }

    #[test]
    fn improvement_delta_needs_both_sides() {
        let results = vec![
            result_with(Some(8.0), Some(12.0), true),
            result_with(Some(12.0), Some(16.0), true),
        ];
        let metrics = reduce_class_metrics(Uuid::new_v4(), &results, 2, None);
        assert_eq!(metrics.pre_average, Some(10.0));
        assert_eq!(metrics.post_average, Some(14.0));
        assert_eq!(metrics.improvement_delta, Some(4.0));

        let results = vec![result_with(None, Some(18.0), true)];
        let metrics = reduce_class_metrics(Uuid::new_v4(), &results, 1, None);
        assert_eq!(metrics.pre_average, None);
        assert_eq!(metrics.improvement_delta, None);
    }

    #[test]
    fn server_row_supplies_completion_and_comprehension() {
        let class_id = Uuid::new_v4();
        let server = ServerClassMetrics {
            class_id,
            completion_rate: Some(80.0),
            comprehension_level: Some(72.5),
        };
        let results = vec![
            result_with(None, Some(15.0), true),
            result_with(None, None, false),
        ];
        let metrics = reduce_class_metrics(class_id, &results, 2, Some(&server));
        assert_eq!(metrics.completion_rate, 80.0);
        assert_eq!(metrics.comprehension_level, Some(72.5));
        assert_eq!(metrics.participation_rate, 50.0);
        assert_eq!(metrics.completed_count, 1);
    }

    #[test]
    fn quiz_summary_counts_only_completed_roster_answers() {
        let class = fixtures::class_session(fixtures::TEACHER_ID, Uuid::new_v4(), 1, "ejecutada");
        let quiz = fixtures::quiz(class.id, QuizKind::Post);
        let inside = fixtures::student("Ana", "Torres");
        let slow = fixtures::student("Bruno", "Diaz");
        let outsider = fixtures::student("Carla", "Mendez");
        let mut in_progress = fixtures::answer(quiz.id, slow.id, None);
        in_progress.status = AttemptStatus::InProgress;

        let records = FetchedRecords {
            questions: vec![fixtures::question(quiz.id), fixtures::question(quiz.id)],
            answers: vec![
                fixtures::answer(quiz.id, inside.id, Some(13.0)),
                in_progress,
                fixtures::answer(quiz.id, outsider.id, Some(20.0)),
            ],
            ..FetchedRecords::default()
        };
        let roster: HashSet<Uuid> = [inside.id, slow.id].into_iter().collect();

        let summary = summarize_quiz(&quiz, &roster, &records);
        assert_eq!(summary.total_questions, 2);
        assert_eq!(summary.completed_responses, 1);
        assert_eq!(summary.roster_size, 2);
        assert_eq!(summary.completion_rate, 50.0);
        assert_eq!(summary.status, QuizStatus::Published);
    }

    #[test]
    fn report_flags_recommendations_and_picks_quizzes_by_kind() {
        let snapshot = fixtures::two_class_snapshot();
        let mut records = fixtures::records_of(&snapshot);
        let class = records.classes[0].clone();
        records.recommendations.push(Recommendation { class_id: class.id });

        let report = build_class_report(&class, &records);
        assert!(report.has_recommendations);
        assert_eq!(report.pre_quiz.as_ref().map(|q| q.kind), Some(QuizKind::Pre));
        assert_eq!(report.post_quiz.as_ref().map(|q| q.kind), Some(QuizKind::Post));
        assert_eq!(report.students.len(), 3);
        assert_eq!(report.metrics.roster_size, 3);

        let other = build_class_report(&records.classes[1], &records);
        assert!(!other.has_recommendations);
    }
}
