use tracing::debug;

use crate::classes::build_class_report;
use crate::fetch::FetchedRecords;
use crate::kpi;
use crate::models::{ClassReport, Teacher, TeacherDashboard};
use crate::risk;

/// Folds one fetched closure into the teacher's dashboard. Pure: the same
/// records always produce the same dashboard.
pub fn build_dashboard(teacher: &Teacher, records: &FetchedRecords) -> TeacherDashboard {
    let classes: Vec<ClassReport> = records
        .classes
        .iter()
        .map(|session| build_class_report(session, records))
        .collect();
    let attention = risk::students_needing_attention(&classes);
    let kpis = kpi::summarize(&classes, &attention);

    debug!(
        classes = classes.len(),
        attention = attention.len(),
        "dashboard computed"
    );

    TeacherDashboard {
        teacher: teacher.clone(),
        classes,
        attention,
        kpis,
    }
}
