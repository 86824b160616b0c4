//! Shared builders for unit tests.

use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::fetch::{FetchedRecords, Snapshot};
use crate::models::{
    AnswerDetail, AttemptStatus, ClassSession, ClassStatus, Grade, Group, GroupAssignment,
    Question, Quiz, QuizKind, QuizStatus, RosterMembership, Student, StudentAlerts, StudentAnswer,
    StudentResult, Subject, Teacher,
};

pub const USER_ID: Uuid = Uuid::from_u128(0x0a11ce00_0000_4000_8000_000000000001);
pub const TEACHER_ID: Uuid = Uuid::from_u128(0x7eac4e00_0000_4000_8000_000000000001);
pub const SUBJECT_ID: Uuid = Uuid::from_u128(0x5b1ec700_0000_4000_8000_000000000001);
pub const LOW_SCORER_ID: Uuid = Uuid::from_u128(0x57d00000_0000_4000_8000_000000000008);
pub const ABSENT_ID: Uuid = Uuid::from_u128(0x57d00000_0000_4000_8000_0000000000ab);

pub fn teacher() -> Teacher {
    Teacher {
        id: TEACHER_ID,
        user_id: USER_ID,
        first_name: "Rosa".to_string(),
        last_name: "Quiroz".to_string(),
    }
}

pub fn class_session(teacher_id: Uuid, group_id: Uuid, number: i32, status: &str) -> ClassSession {
    ClassSession {
        id: Uuid::new_v4(),
        session_number: number,
        scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 2),
        executed_date: None,
        status: ClassStatus::parse(status),
        teacher_id,
        topic_id: Uuid::new_v4(),
        topic_name: "Fracciones equivalentes".to_string(),
        subject: Subject {
            id: SUBJECT_ID,
            name: "Matematica".to_string(),
        },
        group: Group {
            id: group_id,
            name: "Primaria".to_string(),
            grade: Some("5".to_string()),
            section: Some("A".to_string()),
        },
    }
}

pub fn quiz(class_id: Uuid, kind: QuizKind) -> Quiz {
    Quiz {
        id: Uuid::new_v4(),
        class_id,
        kind,
        status: QuizStatus::Published,
        due_date: None,
    }
}

pub fn question(quiz_id: Uuid) -> Question {
    Question {
        id: Uuid::new_v4(),
        quiz_id,
    }
}

pub fn student(first_name: &str, last_name: &str) -> Student {
    student_with_id(Uuid::new_v4(), first_name, last_name)
}

fn student_with_id(id: Uuid, first_name: &str, last_name: &str) -> Student {
    Student {
        id,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        grade: Some("5".to_string()),
        section: Some("A".to_string()),
    }
}

pub fn membership(group_id: Uuid, student: &Student) -> RosterMembership {
    RosterMembership {
        group_id,
        student: student.clone(),
    }
}

/// A completed answer, graded when `score` is given.
pub fn answer(quiz_id: Uuid, student_id: Uuid, score: Option<f64>) -> StudentAnswer {
    StudentAnswer {
        id: Uuid::new_v4(),
        quiz_id,
        student_id,
        status: AttemptStatus::Completed,
        submitted_at: Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).single(),
        grade: score.map(|s| Grade {
            numeric_score: Some(s),
            percent_correct: Some(s * 5.0),
        }),
    }
}

pub fn detail(answer_id: Uuid, elapsed_seconds: Option<f64>) -> AnswerDetail {
    AnswerDetail {
        answer_id,
        question_id: Uuid::new_v4(),
        elapsed_seconds,
        correct: Some(true),
    }
}

pub fn blank_result(class_id: Uuid) -> StudentResult {
    StudentResult {
        class_id,
        student: student("Sin", "Nombre"),
        pre_score: None,
        post_score: None,
        pre_percent: None,
        post_percent: None,
        pre_status: None,
        post_status: None,
        avg_response_seconds: None,
        alerts: StudentAlerts::default(),
        latest_feedback: None,
    }
}

/// Class A: three students, post scores 15 and 8, one never attempted.
/// Class B: two students, both scoring 12.
pub fn two_class_snapshot() -> Snapshot {
    let group_a = Uuid::new_v4();
    let group_b = Uuid::new_v4();
    let class_a = class_session(TEACHER_ID, group_a, 1, "ejecutada");
    let class_b = class_session(TEACHER_ID, group_b, 2, "ejecutada");

    let strong = student("Andrea", "Castillo");
    let low = student_with_id(LOW_SCORER_ID, "Bruno", "Mamani");
    let absent = student_with_id(ABSENT_ID, "Camila", "Flores");
    let b_first = student("Daniel", "Chavez");
    let b_second = student("Eva", "Soto");

    let pre_a = quiz(class_a.id, QuizKind::Pre);
    let post_a = quiz(class_a.id, QuizKind::Post);
    let pre_b = quiz(class_b.id, QuizKind::Pre);
    let post_b = quiz(class_b.id, QuizKind::Post);

    let strong_post = answer(post_a.id, strong.id, Some(15.0));
    let low_post = answer(post_a.id, low.id, Some(8.0));
    let answers = vec![
        answer(pre_a.id, strong.id, Some(10.0)),
        answer(pre_a.id, low.id, Some(6.0)),
        strong_post.clone(),
        low_post.clone(),
        answer(pre_b.id, b_first.id, Some(9.0)),
        answer(post_b.id, b_first.id, Some(12.0)),
        answer(post_b.id, b_second.id, Some(12.0)),
    ];

    Snapshot {
        teachers: vec![teacher()],
        assignments: vec![
            GroupAssignment {
                teacher_id: TEACHER_ID,
                group_id: group_a,
            },
            GroupAssignment {
                teacher_id: TEACHER_ID,
                group_id: group_b,
            },
        ],
        classes: vec![class_a, class_b],
        questions: vec![
            question(post_a.id),
            question(post_a.id),
            question(post_b.id),
        ],
        quizzes: vec![pre_a, post_a, pre_b, post_b],
        answers,
        details: vec![
            detail(strong_post.id, Some(40.0)),
            detail(strong_post.id, Some(20.0)),
            detail(low_post.id, Some(90.0)),
        ],
        roster: vec![
            membership(group_a, &strong),
            membership(group_a, &low),
            membership(group_a, &absent),
            membership(group_b, &b_first),
            membership(group_b, &b_second),
        ],
        ..Snapshot::default()
    }
}

pub fn records_of(snapshot: &Snapshot) -> FetchedRecords {
    FetchedRecords {
        classes: snapshot.classes.clone(),
        assigned_groups: snapshot.assignments.iter().map(|a| a.group_id).collect(),
        quizzes: snapshot.quizzes.clone(),
        questions: snapshot.questions.clone(),
        answers: snapshot.answers.clone(),
        details: snapshot.details.clone(),
        roster: snapshot.roster.clone(),
        server_metrics: snapshot.server_metrics.clone(),
        feedback: snapshot.feedback.clone(),
        recommendations: snapshot.recommendations.clone(),
    }
}
