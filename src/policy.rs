use serde::{Deserialize, Serialize};

/// The three account roles of the institute. A role plus a user id is all
/// the visibility policy ever looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Director,
    Docente,
    Familia,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "director" => Some(Role::Director),
            "docente" => Some(Role::Docente),
            "familia" => Some(Role::Familia),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Director => "director",
            Role::Docente => "docente",
            Role::Familia => "familia",
        }
    }
}

/// The active session's identity, as far as visibility is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: String,
    pub role: Role,
}

impl Viewer {
    pub fn new(id: impl Into<String>, role: Role) -> Viewer {
        Viewer {
            id: id.into(),
            role,
        }
    }
}

// Visibility predicates. Pure functions of (role, viewer id, row scope
// attributes): no I/O, no ordering effects, so filtering a candidate set
// twice yields the same subset. Handlers must apply these unconditionally;
// selected-student/course/date refinements intersect with them, never
// replace them.

pub fn student_visible(viewer: &Viewer, parent_id: &str, course_teacher_id: &str) -> bool {
    match viewer.role {
        Role::Director => true,
        Role::Docente => course_teacher_id == viewer.id,
        Role::Familia => parent_id == viewer.id,
    }
}

pub fn grade_visible(viewer: &Viewer, subject_teacher_id: &str, student_parent_id: &str) -> bool {
    match viewer.role {
        Role::Director => true,
        Role::Docente => subject_teacher_id == viewer.id,
        Role::Familia => student_parent_id == viewer.id,
    }
}

/// Attendance rows carry the same scope attributes as grades and follow the
/// same rule.
pub fn attendance_visible(
    viewer: &Viewer,
    subject_teacher_id: &str,
    student_parent_id: &str,
) -> bool {
    grade_visible(viewer, subject_teacher_id, student_parent_id)
}

/// Directors and teachers see the full sent list (sender scoping is a UI
/// concern, not enforced here); families see only what was addressed to them.
pub fn notification_visible(viewer: &Viewer, recipient_id: &str) -> bool {
    match viewer.role {
        Role::Director | Role::Docente => true,
        Role::Familia => recipient_id == viewer.id,
    }
}

pub fn material_visible(
    viewer: &Viewer,
    uploaded_by: &str,
    course_id: &str,
    child_course_ids: &[String],
) -> bool {
    match viewer.role {
        Role::Director => true,
        Role::Docente => uploaded_by == viewer.id,
        Role::Familia => child_course_ids.iter().any(|c| c == course_id),
    }
}

/// The calendar is shared: every role sees every event.
pub fn event_visible(_viewer: &Viewer) -> bool {
    true
}

pub fn course_visible(viewer: &Viewer, teacher_id: &str, has_own_child: bool) -> bool {
    match viewer.role {
        Role::Director => true,
        Role::Docente => teacher_id == viewer.id,
        Role::Familia => has_own_child,
    }
}

pub fn subject_visible(viewer: &Viewer, teacher_id: &str) -> bool {
    match viewer.role {
        Role::Director => true,
        Role::Docente => teacher_id == viewer.id,
        Role::Familia => true,
    }
}

/// Mutating operations a role may perform. `familia` is read-only everywhere;
/// its one write (marking an own received notification as read) is decided by
/// [`may_mark_read`] because it depends on the row, not just the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ManageStudents,
    ManageCourses,
    RecordGrade,
    RecordAttendance,
    UploadMaterial,
    DeleteMaterial,
    SendNotification,
    CreateEvent,
}

pub fn permits(role: Role, action: Action) -> bool {
    match role {
        Role::Director => true,
        Role::Docente => matches!(
            action,
            Action::RecordGrade
                | Action::RecordAttendance
                | Action::UploadMaterial
                | Action::SendNotification
                | Action::CreateEvent
        ),
        Role::Familia => false,
    }
}

pub fn may_mark_read(viewer: &Viewer, recipient_id: &str) -> bool {
    viewer.id == recipient_id
}
