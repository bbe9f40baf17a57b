use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("escuela.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            role TEXT NOT NULL,
            full_name TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year INTEGER NOT NULL,
            division TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_teacher ON courses(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            dni TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            course_id TEXT NOT NULL,
            parent_id TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(parent_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course ON students(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_parent ON students(parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            course_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_course ON subjects(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_teacher ON subjects(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            grade REAL NOT NULL,
            trimester INTEGER NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_trimester ON grades(trimester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_subject ON attendance(subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            recipient_id TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            FOREIGN KEY(sender_id) REFERENCES users(id),
            FOREIGN KEY(recipient_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_sender ON notifications(sender_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(created_by) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_date ON events(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS materials(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            file_url TEXT NOT NULL,
            course_id TEXT NOT NULL,
            uploaded_by TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(uploaded_by) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_materials_course ON materials(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_materials_uploader ON materials(uploaded_by)",
        [],
    )?;

    seed_account_directory(&conn)?;

    Ok(conn)
}

pub const DIRECTOR_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const DOCENTE_ID: &str = "22222222-2222-2222-2222-222222222222";
pub const FAMILIA_ID: &str = "33333333-3333-3333-3333-333333333333";

/// The fixed three-account sign-in directory. Plain-text passwords: this is
/// a demonstration directory, not a security boundary.
fn seed_account_directory(conn: &Connection) -> anyhow::Result<()> {
    let accounts: [(&str, &str, &str, &str, &str); 3] = [
        (
            DIRECTOR_ID,
            "director@instituto.edu",
            "director123",
            "director",
            "María González",
        ),
        (
            DOCENTE_ID,
            "docente@instituto.edu",
            "docente123",
            "docente",
            "Carlos Rodríguez",
        ),
        (
            FAMILIA_ID,
            "familia@instituto.edu",
            "familia123",
            "familia",
            "Ana Martínez",
        ),
    ];
    for (id, email, password, role, full_name) in accounts {
        conn.execute(
            "INSERT OR IGNORE INTO users(id, email, password, role, full_name, created_at)
             VALUES(?, ?, ?, ?, ?, '2024-01-01T00:00:00Z')",
            (id, email, password, role, full_name),
        )?;
    }
    Ok(())
}

/// Demonstration dataset covering every entity, matching the institute's
/// sample workspace. Idempotent; safe to call on an existing DB.
pub fn seed_demo_data(conn: &Connection) -> anyhow::Result<()> {
    let courses: [(&str, &str, i64, &str, &str); 3] = [
        (
            "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa",
            "Matemáticas",
            3,
            "A",
            DOCENTE_ID,
        ),
        (
            "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb",
            "Historia",
            3,
            "A",
            DOCENTE_ID,
        ),
        (
            "cccccccc-cccc-cccc-cccc-cccccccccccc",
            "Lengua",
            2,
            "B",
            DOCENTE_ID,
        ),
    ];
    for (id, name, year, division, teacher_id) in courses {
        conn.execute(
            "INSERT OR IGNORE INTO courses(id, name, year, division, teacher_id, created_at)
             VALUES(?, ?, ?, ?, ?, '2024-01-01T00:00:00Z')",
            (id, name, year, division, teacher_id),
        )?;
    }

    let students: [(&str, &str, &str, &str, &str); 3] = [
        (
            "dddddddd-dddd-dddd-dddd-dddddddddddd",
            "Juan Martínez",
            "12345678",
            "2008-05-15",
            "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa",
        ),
        (
            "eeeeeeee-eeee-eeee-eeee-eeeeeeeeeeee",
            "Sofía Martínez",
            "87654321",
            "2009-03-20",
            "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa",
        ),
        (
            "hhhhhhhh-hhhh-hhhh-hhhh-hhhhhhhhhhhh",
            "Pedro García",
            "11223344",
            "2007-08-10",
            "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb",
        ),
    ];
    for (id, full_name, dni, birth_date, course_id) in students {
        conn.execute(
            "INSERT OR IGNORE INTO students(id, full_name, dni, birth_date, course_id, parent_id, created_at)
             VALUES(?, ?, ?, ?, ?, ?, '2024-01-01T00:00:00Z')",
            (id, full_name, dni, birth_date, course_id, FAMILIA_ID),
        )?;
    }

    let subjects: [(&str, &str, &str, &str); 4] = [
        (
            "ffffffff-ffff-ffff-ffff-ffffffffffff",
            "Matemáticas",
            "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa",
            DOCENTE_ID,
        ),
        (
            "gggggggg-gggg-gggg-gggg-gggggggggggg",
            "Historia",
            "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb",
            DOCENTE_ID,
        ),
        (
            "iiiiiiii-iiii-iiii-iiii-iiiiiiiiiiii",
            "Lengua",
            "cccccccc-cccc-cccc-cccc-cccccccccccc",
            DOCENTE_ID,
        ),
        // Taught by the director; useful to show teacher scoping excluding
        // another teacher's subject.
        (
            "jjjjjjjj-jjjj-jjjj-jjjj-jjjjjjjjjjjj",
            "Educación Física",
            "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb",
            DIRECTOR_ID,
        ),
    ];
    for (id, name, course_id, teacher_id) in subjects {
        conn.execute(
            "INSERT OR IGNORE INTO subjects(id, name, course_id, teacher_id, created_at)
             VALUES(?, ?, ?, ?, '2024-01-01T00:00:00Z')",
            (id, name, course_id, teacher_id),
        )?;
    }

    let grades: [(&str, &str, &str, f64, i64, &str); 6] = [
        (
            "grade-1",
            "dddddddd-dddd-dddd-dddd-dddddddddddd",
            "ffffffff-ffff-ffff-ffff-ffffffffffff",
            8.0,
            1,
            "2024-04-15",
        ),
        (
            "grade-2",
            "dddddddd-dddd-dddd-dddd-dddddddddddd",
            "gggggggg-gggg-gggg-gggg-gggggggggggg",
            9.0,
            1,
            "2024-04-20",
        ),
        (
            "grade-3",
            "eeeeeeee-eeee-eeee-eeee-eeeeeeeeeeee",
            "ffffffff-ffff-ffff-ffff-ffffffffffff",
            7.0,
            1,
            "2024-04-15",
        ),
        (
            "grade-4",
            "eeeeeeee-eeee-eeee-eeee-eeeeeeeeeeee",
            "gggggggg-gggg-gggg-gggg-gggggggggggg",
            8.0,
            1,
            "2024-04-20",
        ),
        (
            "grade-5",
            "dddddddd-dddd-dddd-dddd-dddddddddddd",
            "ffffffff-ffff-ffff-ffff-ffffffffffff",
            6.0,
            2,
            "2024-08-15",
        ),
        (
            "grade-6",
            "dddddddd-dddd-dddd-dddd-dddddddddddd",
            "jjjjjjjj-jjjj-jjjj-jjjj-jjjjjjjjjjjj",
            7.0,
            1,
            "2024-04-22",
        ),
    ];
    for (id, student_id, subject_id, grade, trimester, date) in grades {
        conn.execute(
            "INSERT OR IGNORE INTO grades(id, student_id, subject_id, grade, trimester, date, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (id, student_id, subject_id, grade, trimester, date, date),
        )?;
    }

    let attendance: [(&str, &str, &str, &str, &str); 5] = [
        (
            "att-1",
            "dddddddd-dddd-dddd-dddd-dddddddddddd",
            "ffffffff-ffff-ffff-ffff-ffffffffffff",
            "2024-11-01",
            "presente",
        ),
        (
            "att-2",
            "dddddddd-dddd-dddd-dddd-dddddddddddd",
            "gggggggg-gggg-gggg-gggg-gggggggggggg",
            "2024-11-02",
            "presente",
        ),
        (
            "att-3",
            "eeeeeeee-eeee-eeee-eeee-eeeeeeeeeeee",
            "ffffffff-ffff-ffff-ffff-ffffffffffff",
            "2024-11-01",
            "tardanza",
        ),
        (
            "att-4",
            "eeeeeeee-eeee-eeee-eeee-eeeeeeeeeeee",
            "gggggggg-gggg-gggg-gggg-gggggggggggg",
            "2024-11-02",
            "presente",
        ),
        (
            "att-5",
            "dddddddd-dddd-dddd-dddd-dddddddddddd",
            "ffffffff-ffff-ffff-ffff-ffffffffffff",
            "2024-11-03",
            "ausente",
        ),
    ];
    for (id, student_id, subject_id, date, status) in attendance {
        conn.execute(
            "INSERT OR IGNORE INTO attendance(id, student_id, subject_id, date, status, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (id, student_id, subject_id, date, status, date),
        )?;
    }

    let notifications: [(&str, &str, &str, &str, i64, &str); 3] = [
        (
            "notif-1",
            "Reunión de Padres",
            "Se convoca a reunión de padres el día 15 de noviembre a las 18:00 hs.",
            DIRECTOR_ID,
            0,
            "2024-11-10T10:00:00Z",
        ),
        (
            "notif-2",
            "Calificaciones Actualizadas",
            "Se han actualizado las calificaciones del primer trimestre.",
            DOCENTE_ID,
            1,
            "2024-11-08T14:30:00Z",
        ),
        (
            "notif-3",
            "Examen de Matemáticas",
            "Recordatorio: Examen de matemáticas el próximo lunes 18 de noviembre.",
            DOCENTE_ID,
            0,
            "2024-11-12T09:15:00Z",
        ),
    ];
    for (id, title, message, sender_id, read, created_at) in notifications {
        conn.execute(
            "INSERT OR IGNORE INTO notifications(id, title, message, sender_id, recipient_id, read, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (id, title, message, sender_id, FAMILIA_ID, read, created_at),
        )?;
    }

    let events: [(&str, &str, &str, &str, &str, &str); 4] = [
        (
            "event-1",
            "Reunión de Padres",
            "Reunión informativa sobre el progreso académico",
            "2024-11-15",
            "18:00",
            DIRECTOR_ID,
        ),
        (
            "event-2",
            "Examen de Matemáticas",
            "Evaluación del primer trimestre",
            "2024-11-18",
            "08:00",
            DOCENTE_ID,
        ),
        (
            "event-3",
            "Acto del Día de la Tradición",
            "Celebración del Día de la Tradición Argentina",
            "2024-11-20",
            "10:00",
            DIRECTOR_ID,
        ),
        (
            "event-4",
            "Feria de Ciencias",
            "Exposición de proyectos científicos de los estudiantes",
            "2024-12-05",
            "14:00",
            DIRECTOR_ID,
        ),
    ];
    for (id, title, description, date, time, created_by) in events {
        conn.execute(
            "INSERT OR IGNORE INTO events(id, title, description, date, time, created_by, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (id, title, description, date, time, created_by, date),
        )?;
    }

    let materials: [(&str, &str, &str, &str, &str, &str); 4] = [
        (
            "mat-1",
            "Guía de Matemáticas - Unidad 1",
            "Material de estudio para la primera unidad de matemáticas",
            "https://example.com/math-guide-1.pdf",
            "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa",
            DOCENTE_ID,
        ),
        (
            "mat-2",
            "Historia Argentina - Siglo XIX",
            "Resumen de los principales eventos del siglo XIX en Argentina",
            "https://example.com/history-19th.pdf",
            "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb",
            DOCENTE_ID,
        ),
        (
            "mat-3",
            "Ejercicios de Álgebra",
            "Práctica de ecuaciones y sistemas de ecuaciones",
            "https://example.com/algebra-exercises.pdf",
            "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa",
            DOCENTE_ID,
        ),
        (
            "mat-4",
            "Reglamento Interno",
            "Normas de convivencia del instituto",
            "https://example.com/reglamento.pdf",
            "cccccccc-cccc-cccc-cccc-cccccccccccc",
            DIRECTOR_ID,
        ),
    ];
    for (id, title, description, file_url, course_id, uploaded_by) in materials {
        conn.execute(
            "INSERT OR IGNORE INTO materials(id, title, description, file_url, course_id, uploaded_by, created_at)
             VALUES(?, ?, ?, ?, ?, ?, '2024-10-15T00:00:00Z')",
            (id, title, description, file_url, course_id, uploaded_by),
        )?;
    }

    Ok(())
}
