use crate::classes::mean;
use crate::models::{AttentionEntry, ClassReport, QuizStatus, TeacherKpis};

pub fn summarize(classes: &[ClassReport], attention: &[AttentionEntry]) -> TeacherKpis {
    let total_classes = classes
        .iter()
        .filter(|c| c.session.status.is_active())
        .count();

    // Flattened over every student, not a mean of class means.
    let overall_average = mean(
        classes
            .iter()
            .flat_map(|c| c.students.iter())
            .filter_map(|r| r.post_score),
    );

    let avg_participation = mean(classes.iter().map(|c| c.metrics.participation_rate))
        .map(|rate| rate.round() as i64)
        .unwrap_or(0);

    let pending_review_count = classes
        .iter()
        .flat_map(|c| c.pre_quiz.iter().chain(c.post_quiz.iter()))
        .filter(|q| q.status == QuizStatus::Published && q.completion_rate < 100.0)
        .count();

    TeacherKpis {
        total_classes,
        overall_average,
        avg_participation,
        at_risk_count: attention.len(),
        pending_review_count,
    }
}
