use std::fmt::Write;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{ClassReport, TeacherDashboard};

fn score(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

fn percent(value: f64) -> String {
    format!("{value:.1}%")
}

fn class_title(class: &ClassReport) -> String {
    let session = &class.session;
    format!(
        "Session {} · {} · {} ({})",
        session.session_number,
        session.subject.name,
        session.topic_name,
        session.group.label()
    )
}

pub fn build_report(dashboard: &TeacherDashboard) -> String {
    let kpis = &dashboard.kpis;
    let mut output = String::new();

    let _ = writeln!(output, "# Teacher Results Report");
    let _ = writeln!(output, "Generated for {}", dashboard.teacher.full_name());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Classes: {}", kpis.total_classes);
    let _ = writeln!(output, "- Overall average: {}", score(kpis.overall_average));
    let _ = writeln!(output, "- Average participation: {}%", kpis.avg_participation);
    let _ = writeln!(output, "- Students needing attention: {}", kpis.at_risk_count);
    let _ = writeln!(output, "- Quizzes pending review: {}", kpis.pending_review_count);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Classes");

    if dashboard.classes.is_empty() {
        let _ = writeln!(output, "No classes recorded for this teacher.");
    }

    for class in &dashboard.classes {
        let metrics = &class.metrics;
        let _ = writeln!(output);
        let _ = writeln!(output, "### {}", class_title(class));
        let _ = writeln!(output, "Status: {}", class.session.status.as_str());
        let _ = writeln!(
            output,
            "- Pre average {} → post average {} (delta {})",
            score(metrics.pre_average),
            score(metrics.post_average),
            score(metrics.improvement_delta)
        );
        let _ = writeln!(
            output,
            "- Participation {} ({} of {} completed)",
            percent(metrics.participation_rate),
            metrics.completed_count,
            metrics.roster_size
        );
        let _ = writeln!(
            output,
            "- Completion {}, comprehension {}",
            percent(metrics.completion_rate),
            metrics
                .comprehension_level
                .map_or_else(|| "-".to_string(), percent)
        );
        for quiz in class.pre_quiz.iter().chain(class.post_quiz.iter()) {
            let _ = writeln!(
                output,
                "- {} quiz ({}): {} of {} answered, {} questions",
                quiz.kind.as_str(),
                quiz.status.as_str(),
                quiz.completed_responses,
                quiz.roster_size,
                quiz.total_questions
            );
        }
        if class.has_recommendations {
            let _ = writeln!(output, "- Recommendations available");
        }

        let flagged: Vec<_> = class
            .students
            .iter()
            .filter(|r| r.alerts.underperforming || r.alerts.incomplete)
            .collect();
        for result in flagged {
            let mut reasons = Vec::new();
            if result.alerts.underperforming {
                reasons.push("below passing");
            }
            if result.alerts.incomplete {
                reasons.push("post quiz not completed");
            }
            let _ = writeln!(
                output,
                "  - {}: post {} ({})",
                result.student.full_name(),
                score(result.post_score),
                reasons.join(", ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Attention");

    if dashboard.attention.is_empty() {
        let _ = writeln!(output, "No students need attention right now.");
    } else {
        for entry in &dashboard.attention {
            let _ = writeln!(
                output,
                "- {} ({}, {}) average {} with {} pending quizzes",
                entry.student_name,
                entry.group_label,
                entry.subject_name,
                score(entry.average_score),
                entry.pending_quizzes
            );
        }
    }

    output
}

#[derive(Debug, Serialize)]
struct StudentRow<'a> {
    class_id: Uuid,
    session_number: i32,
    subject: &'a str,
    group: String,
    student_id: Uuid,
    student_name: String,
    pre_score: Option<f64>,
    post_score: Option<f64>,
    pre_percent: Option<f64>,
    post_percent: Option<f64>,
    post_status: &'a str,
    avg_response_seconds: Option<f64>,
    underperforming: bool,
    incomplete: bool,
    low_participation: bool,
    latest_feedback: Option<&'a str>,
}

/// Writes one CSV row per student result.
pub fn write_student_csv<W: std::io::Write>(
    writer: W,
    dashboard: &TeacherDashboard,
) -> anyhow::Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut written = 0usize;

    for class in &dashboard.classes {
        for result in &class.students {
            csv.serialize(StudentRow {
                class_id: class.session.id,
                session_number: class.session.session_number,
                subject: &class.session.subject.name,
                group: class.session.group.label(),
                student_id: result.student.id,
                student_name: result.student.full_name(),
                pre_score: result.pre_score,
                post_score: result.post_score,
                pre_percent: result.pre_percent,
                post_percent: result.post_percent,
                post_status: result.post_status.map_or("missing", |s| s.as_str()),
                avg_response_seconds: result.avg_response_seconds,
                underperforming: result.alerts.underperforming,
                incomplete: result.alerts.incomplete,
                low_participation: result.alerts.low_participation,
                latest_feedback: result.latest_feedback.as_ref().map(|f| f.summary.as_str()),
            })?;
            written += 1;
        }
    }

    csv.flush()?;
    Ok(written)
}

/// One line per class for console output.
pub fn class_lines(dashboard: &TeacherDashboard) -> Vec<String> {
    dashboard
        .classes
        .iter()
        .map(|class| {
            format!(
                "- {}: post avg {}, participation {} ({}/{})",
                class_title(class),
                score(class.metrics.post_average),
                percent(class.metrics.participation_rate),
                class.metrics.completed_count,
                class.metrics.roster_size
            )
        })
        .collect()
}
