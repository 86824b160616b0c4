use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{AttentionEntry, ClassReport, LOW_PARTICIPATION_RATE, PASSING_SCORE};

/// Merges student results across a teacher's classes by (student, subject),
/// in first-seen order.
///
/// Repeated observations fold into the average as `(avg + score) / 2`, so
/// later classes weigh more than earlier ones.
pub fn merge_results(classes: &[ClassReport]) -> Vec<AttentionEntry> {
    let mut entries: Vec<AttentionEntry> = Vec::new();
    let mut index: HashMap<(Uuid, Uuid), usize> = HashMap::new();

    for class in classes {
        let subject = &class.session.subject;
        for result in &class.students {
            let pending = usize::from(!result.completed_post());
            let key = (result.student.id, subject.id);

            match index.get(&key) {
                Some(&position) => {
                    let entry = &mut entries[position];
                    if let Some(score) = result.post_score {
                        entry.average_score = Some(match entry.average_score {
                            Some(avg) => (avg + score) / 2.0,
                            None => score,
                        });
                    }
                    entry.pending_quizzes += pending;
                }
                None => {
                    index.insert(key, entries.len());
                    entries.push(AttentionEntry {
                        student_id: result.student.id,
                        student_name: result.student.full_name(),
                        group_label: class.session.group.label(),
                        subject_id: subject.id,
                        subject_name: subject.name.clone(),
                        average_score: result.post_score,
                        pending_quizzes: pending,
                        participation_rate: None,
                    });
                }
            }
        }
    }

    entries
}

pub fn students_needing_attention(classes: &[ClassReport]) -> Vec<AttentionEntry> {
    merge_results(classes)
        .into_iter()
        .filter(needs_attention)
        .collect()
}

pub fn needs_attention(entry: &AttentionEntry) -> bool {
    entry.average_score.is_some_and(|avg| avg < PASSING_SCORE)
        || entry.pending_quizzes > 0
        || entry
            .participation_rate
            .is_some_and(|rate| rate < LOW_PARTICIPATION_RATE)
}
