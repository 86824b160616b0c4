use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::FetchError;
use crate::fetch::RecordSource;
use crate::models::{
    normalize_grade, AnswerDetail, AttemptStatus, ClassSession, ClassStatus, Feedback, Group,
    Question, Quiz, QuizKind, QuizStatus, Recommendation, RosterMembership, ServerClassMetrics,
    Student, StudentAnswer, Subject, Teacher,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Backend reads over the `eduthink` schema.
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn class_from_row(row: &PgRow) -> Result<ClassSession, sqlx::Error> {
    let status: String = row.try_get("estado")?;
    Ok(ClassSession {
        id: row.try_get("id")?,
        session_number: row.try_get("numero_sesion")?,
        scheduled_date: row.try_get("fecha_programada")?,
        executed_date: row.try_get("fecha_ejecutada")?,
        status: ClassStatus::parse(&status),
        teacher_id: row.try_get("id_profesor")?,
        topic_id: row.try_get("id_tema")?,
        topic_name: row.try_get("tema_nombre")?,
        subject: Subject {
            id: row.try_get("id_curso")?,
            name: row.try_get("curso_nombre")?,
        },
        group: Group {
            id: row.try_get("id_grupo")?,
            name: row.try_get("grupo_nombre")?,
            grade: row.try_get("grado")?,
            section: row.try_get("seccion")?,
        },
    })
}

fn quiz_from_row(row: &PgRow) -> Result<Option<Quiz>, sqlx::Error> {
    let id: Uuid = row.try_get("id")?;
    let kind: String = row.try_get("tipo")?;
    let status: String = row.try_get("estado")?;
    let Some(kind) = QuizKind::parse(&kind) else {
        debug!(quiz_id = %id, kind = %kind, "skipping quiz of unknown kind");
        return Ok(None);
    };
    Ok(Some(Quiz {
        id,
        class_id: row.try_get("id_clase")?,
        kind,
        status: QuizStatus::parse(&status),
        due_date: row.try_get("fecha_limite")?,
    }))
}

fn answer_from_row(row: &PgRow) -> Result<StudentAnswer, sqlx::Error> {
    let status: String = row.try_get("estado")?;
    let grade: Option<serde_json::Value> = row.try_get("calificacion")?;
    Ok(StudentAnswer {
        id: row.try_get("id")?,
        quiz_id: row.try_get("id_quiz")?,
        student_id: row.try_get("id_alumno")?,
        status: AttemptStatus::parse(&status),
        submitted_at: row.try_get("fecha_envio")?,
        grade: normalize_grade(grade),
    })
}

fn membership_from_row(row: &PgRow) -> Result<RosterMembership, sqlx::Error> {
    Ok(RosterMembership {
        group_id: row.try_get("id_grupo")?,
        student: Student {
            id: row.try_get("id")?,
            first_name: row.try_get("nombre")?,
            last_name: row.try_get("apellido")?,
            grade: row.try_get("grado")?,
            section: row.try_get("seccion")?,
        },
    })
}

#[async_trait]
impl RecordSource for PgSource {
    async fn teacher_by_user(&self, user_id: Uuid) -> Result<Option<Teacher>, FetchError> {
        let row = sqlx::query(
            "SELECT id, user_id, nombre, apellido FROM eduthink.profesores WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Teacher {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            first_name: row.try_get("nombre")?,
            last_name: row.try_get("apellido")?,
        }))
    }

    async fn classes_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<ClassSession>, FetchError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.numero_sesion, c.fecha_programada, c.fecha_ejecutada, c.estado,
                   c.id_profesor, t.id AS id_tema, t.nombre AS tema_nombre,
                   cu.id AS id_curso, cu.nombre AS curso_nombre,
                   g.id AS id_grupo, g.nombre AS grupo_nombre, g.grado, g.seccion
            FROM eduthink.clases c
            JOIN eduthink.temas t ON t.id = c.id_tema
            JOIN eduthink.cursos cu ON cu.id = t.id_curso
            JOIN eduthink.grupos g ON g.id = c.id_grupo
            WHERE c.id_profesor = $1
            ORDER BY c.fecha_programada NULLS LAST, c.numero_sesion
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(class_from_row).collect::<Result<_, _>>()?)
    }

    async fn assigned_groups(&self, teacher_id: Uuid) -> Result<Vec<Uuid>, FetchError> {
        let rows = sqlx::query(
            "SELECT DISTINCT id_grupo FROM eduthink.asignaciones_profesor \
             WHERE id_profesor = $1 ORDER BY id_grupo",
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id_grupo"))
            .collect::<Result<_, _>>()?)
    }

    async fn quizzes_for_classes(&self, class_ids: &[Uuid]) -> Result<Vec<Quiz>, FetchError> {
        let rows = sqlx::query(
            "SELECT id, id_clase, tipo, estado, fecha_limite FROM eduthink.quizzes \
             WHERE id_clase = ANY($1) ORDER BY id_clase, tipo DESC, id",
        )
        .bind(class_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut quizzes = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(quiz) = quiz_from_row(row)? {
                quizzes.push(quiz);
            }
        }
        Ok(quizzes)
    }

    async fn questions_for_quizzes(&self, quiz_ids: &[Uuid]) -> Result<Vec<Question>, FetchError> {
        let rows = sqlx::query("SELECT id, id_quiz FROM eduthink.preguntas WHERE id_quiz = ANY($1)")
            .bind(quiz_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(Question {
                id: row.try_get("id")?,
                quiz_id: row.try_get("id_quiz")?,
            });
        }
        Ok(questions)
    }

    async fn answers_for_quizzes(
        &self,
        quiz_ids: &[Uuid],
    ) -> Result<Vec<StudentAnswer>, FetchError> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.id_quiz, r.id_alumno, r.estado, r.fecha_envio,
                   (SELECT jsonb_agg(jsonb_build_object(
                               'numeric_score', c.nota_numerica,
                               'percent_correct', c.porcentaje_aciertos))
                    FROM eduthink.calificaciones c
                    WHERE c.id_respuesta_alumno = r.id) AS calificacion
            FROM eduthink.respuestas_alumno r
            WHERE r.id_quiz = ANY($1)
            ORDER BY r.fecha_envio NULLS LAST, r.id
            "#,
        )
        .bind(quiz_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(answer_from_row).collect::<Result<_, _>>()?)
    }

    async fn details_for_answers(
        &self,
        answer_ids: &[Uuid],
    ) -> Result<Vec<AnswerDetail>, FetchError> {
        let rows = sqlx::query(
            "SELECT id_respuesta_alumno, id_pregunta, tiempo_respuesta_segundos, es_correcta \
             FROM eduthink.respuestas_detalle WHERE id_respuesta_alumno = ANY($1)",
        )
        .bind(answer_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut details = Vec::with_capacity(rows.len());
        for row in rows {
            details.push(AnswerDetail {
                answer_id: row.try_get("id_respuesta_alumno")?,
                question_id: row.try_get("id_pregunta")?,
                elapsed_seconds: row.try_get("tiempo_respuesta_segundos")?,
                correct: row.try_get("es_correcta")?,
            });
        }
        Ok(details)
    }

    async fn roster_for_groups(
        &self,
        group_ids: &[Uuid],
    ) -> Result<Vec<RosterMembership>, FetchError> {
        let rows = sqlx::query(
            r#"
            SELECT ga.id_grupo, a.id, a.nombre, a.apellido, g.grado, g.seccion
            FROM eduthink.grupo_alumnos ga
            JOIN eduthink.alumnos a ON a.id = ga.id_alumno
            JOIN eduthink.grupos g ON g.id = ga.id_grupo
            WHERE ga.id_grupo = ANY($1)
            ORDER BY a.apellido, a.nombre
            "#,
        )
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(membership_from_row).collect::<Result<_, _>>()?)
    }

    async fn server_metrics_for_classes(
        &self,
        class_ids: &[Uuid],
    ) -> Result<Vec<ServerClassMetrics>, FetchError> {
        let rows = sqlx::query(
            "SELECT id_clase, porcentaje_completado, nivel_comprension \
             FROM eduthink.metricas_clase WHERE id_clase = ANY($1)",
        )
        .bind(class_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in rows {
            metrics.push(ServerClassMetrics {
                class_id: row.try_get("id_clase")?,
                completion_rate: row.try_get("porcentaje_completado")?,
                comprehension_level: row.try_get("nivel_comprension")?,
            });
        }
        Ok(metrics)
    }

    async fn feedback_for_classes(&self, class_ids: &[Uuid]) -> Result<Vec<Feedback>, FetchError> {
        let rows = sqlx::query(
            "SELECT id_clase, id_alumno, tipo, contenido, fecha_envio \
             FROM eduthink.retroalimentaciones WHERE id_clase = ANY($1) \
             ORDER BY fecha_envio",
        )
        .bind(class_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut feedback = Vec::with_capacity(rows.len());
        for row in rows {
            feedback.push(Feedback {
                class_id: row.try_get("id_clase")?,
                student_id: row.try_get("id_alumno")?,
                kind: row.try_get("tipo")?,
                content: row.try_get("contenido")?,
                sent_at: row.try_get("fecha_envio")?,
            });
        }
        Ok(feedback)
    }

    async fn recommendations_for_classes(
        &self,
        class_ids: &[Uuid],
    ) -> Result<Vec<Recommendation>, FetchError> {
        let rows = sqlx::query(
            "SELECT id_clase FROM eduthink.recomendaciones WHERE id_clase = ANY($1)",
        )
        .bind(class_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut recommendations = Vec::with_capacity(rows.len());
        for row in rows {
            recommendations.push(Recommendation {
                class_id: row.try_get("id_clase")?,
            });
        }
        Ok(recommendations)
    }
}

fn seed_id(n: u128) -> Uuid {
    Uuid::from_u128(0x5eed0000_0000_4000_8000_000000000000 | n)
}

/// Auth user of the demo teacher inserted by [`seed`].
pub fn demo_user_id() -> Uuid {
    seed_id(0x1)
}

/// Inserts a demo teacher with two executed classes: 5A (three students, one
/// of them without a post attempt) and 5B (two students).
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let teacher_id = seed_id(0x10);
    let subject_id = seed_id(0x20);
    let topic_id = seed_id(0x21);
    let group_a = seed_id(0x30);
    let group_b = seed_id(0x31);

    sqlx::query(
        r#"
        INSERT INTO eduthink.profesores (id, user_id, nombre, apellido)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET nombre = EXCLUDED.nombre, apellido = EXCLUDED.apellido
        "#,
    )
    .bind(teacher_id)
    .bind(demo_user_id())
    .bind("Rosa")
    .bind("Quiroz")
    .execute(pool)
    .await?;

    sqlx::query("INSERT INTO eduthink.cursos (id, nombre) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
        .bind(subject_id)
        .bind("Matematica")
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO eduthink.temas (id, id_curso, nombre) VALUES ($1, $2, $3) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(topic_id)
    .bind(subject_id)
    .bind("Fracciones equivalentes")
    .execute(pool)
    .await?;

    for (group_id, section) in [(group_a, "A"), (group_b, "B")] {
        sqlx::query(
            "INSERT INTO eduthink.grupos (id, nombre, grado, seccion) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(group_id)
        .bind("Primaria")
        .bind("5")
        .bind(section)
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO eduthink.asignaciones_profesor (id_profesor, id_grupo, id_curso) \
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(teacher_id)
        .bind(group_id)
        .bind(subject_id)
        .execute(pool)
        .await?;
    }

    let students = vec![
        (seed_id(0x40), "Andrea", "Castillo", group_a),
        (seed_id(0x41), "Bruno", "Mamani", group_a),
        (seed_id(0x42), "Camila", "Flores", group_a),
        (seed_id(0x43), "Daniel", "Chavez", group_b),
        (seed_id(0x44), "Eva", "Soto", group_b),
    ];

    for (student_id, first_name, last_name, group_id) in &students {
        sqlx::query(
            "INSERT INTO eduthink.alumnos (id, nombre, apellido) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(student_id)
        .bind(first_name)
        .bind(last_name)
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO eduthink.grupo_alumnos (id_grupo, id_alumno) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(student_id)
        .execute(pool)
        .await?;
    }

    let first_day = NaiveDate::from_ymd_opt(2026, 3, 2).context("invalid date")?;
    let classes = vec![(seed_id(0x50), 1, group_a), (seed_id(0x51), 2, group_b)];

    for (class_id, session_number, group_id) in &classes {
        let day = first_day + Duration::days(i64::from(*session_number) - 1);
        sqlx::query(
            r#"
            INSERT INTO eduthink.clases
            (id, numero_sesion, fecha_programada, fecha_ejecutada, estado, id_profesor, id_grupo, id_tema)
            VALUES ($1, $2, $3, $3, 'ejecutada', $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(class_id)
        .bind(session_number)
        .bind(day)
        .bind(teacher_id)
        .bind(group_id)
        .bind(topic_id)
        .execute(pool)
        .await?;
    }

    let due = Utc
        .with_ymd_and_hms(2026, 3, 9, 23, 59, 0)
        .single()
        .context("invalid due date")?;
    let quizzes = vec![
        (seed_id(0x60), classes[0].0, "previo"),
        (seed_id(0x61), classes[0].0, "post"),
        (seed_id(0x62), classes[1].0, "previo"),
        (seed_id(0x63), classes[1].0, "post"),
    ];

    for (n, (quiz_id, class_id, kind)) in quizzes.iter().enumerate() {
        sqlx::query(
            "INSERT INTO eduthink.quizzes (id, id_clase, tipo, estado, fecha_limite) \
             VALUES ($1, $2, $3, 'publicado', $4) ON CONFLICT (id) DO NOTHING",
        )
        .bind(quiz_id)
        .bind(class_id)
        .bind(kind)
        .bind(due)
        .execute(pool)
        .await?;

        for q in 0..4u128 {
            sqlx::query(
                "INSERT INTO eduthink.preguntas (id, id_quiz, texto) VALUES ($1, $2, $3) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(seed_id(0x700 + (n as u128) * 0x10 + q))
            .bind(quiz_id)
            .bind(format!("Pregunta {}", q + 1))
            .execute(pool)
            .await?;
        }
    }

    // (answer, quiz, student, score); Camila (0x42) never answers the post quiz.
    let answers = vec![
        (seed_id(0x80), quizzes[0].0, students[0].0, 10.0),
        (seed_id(0x81), quizzes[0].0, students[1].0, 6.0),
        (seed_id(0x82), quizzes[1].0, students[0].0, 15.0),
        (seed_id(0x83), quizzes[1].0, students[1].0, 8.0),
        (seed_id(0x84), quizzes[2].0, students[3].0, 9.0),
        (seed_id(0x85), quizzes[3].0, students[3].0, 12.0),
        (seed_id(0x86), quizzes[3].0, students[4].0, 12.0),
    ];

    let submitted = due - Duration::days(2);
    for (answer_id, quiz_id, student_id, score) in &answers {
        sqlx::query(
            "INSERT INTO eduthink.respuestas_alumno (id, id_quiz, id_alumno, estado, fecha_envio) \
             VALUES ($1, $2, $3, 'completado', $4) ON CONFLICT (id) DO NOTHING",
        )
        .bind(answer_id)
        .bind(quiz_id)
        .bind(student_id)
        .bind(submitted)
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO eduthink.calificaciones \
             (id, id_respuesta_alumno, nota_numerica, porcentaje_aciertos) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (id_respuesta_alumno) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(answer_id)
        .bind(score)
        .bind(score * 5.0)
        .execute(pool)
        .await?;
    }

    let timings = vec![
        (seed_id(0x90), answers[2].0, seed_id(0x710), 42.0, true),
        (seed_id(0x91), answers[2].0, seed_id(0x711), 35.5, true),
        (seed_id(0x92), answers[3].0, seed_id(0x710), 88.0, false),
        (seed_id(0x93), answers[3].0, seed_id(0x711), 120.0, false),
    ];

    for (detail_id, answer_id, question_id, seconds, correct) in timings {
        sqlx::query(
            r#"
            INSERT INTO eduthink.respuestas_detalle
            (id, id_respuesta_alumno, id_pregunta, tiempo_respuesta_segundos, es_correcta)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(detail_id)
        .bind(answer_id)
        .bind(question_id)
        .bind(seconds)
        .bind(correct)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "INSERT INTO eduthink.metricas_clase (id_clase, porcentaje_completado, nivel_comprension) \
         VALUES ($1, $2, $3) ON CONFLICT (id_clase) DO NOTHING",
    )
    .bind(classes[0].0)
    .bind(66.7)
    .bind(57.5)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO eduthink.retroalimentaciones (id, id_clase, id_alumno, tipo, contenido, fecha_envio)
        VALUES ($1, $2, $3, 'refuerzo', $4, $5)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(seed_id(0xa0))
    .bind(classes[0].0)
    .bind(students[1].0)
    .bind(serde_json::json!({"resumen": "Repasar equivalencias con material concreto"}))
    .bind(submitted + Duration::days(1))
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO eduthink.recomendaciones (id, id_clase, contenido) VALUES ($1, $2, $3) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(seed_id(0xb0))
    .bind(classes[0].0)
    .bind(serde_json::json!({"texto": "Reforzar con trabajo en parejas"}))
    .execute(pool)
    .await?;

    info!(user_id = %demo_user_id(), "demo data seeded");
    Ok(())
}
