use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Presente,
    Ausente,
    Tardanza,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<AttendanceStatus> {
        match s {
            "presente" => Some(AttendanceStatus::Presente),
            "ausente" => Some(AttendanceStatus::Ausente),
            "tardanza" => Some(AttendanceStatus::Tardanza),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Presente => "presente",
            AttendanceStatus::Ausente => "ausente",
            AttendanceStatus::Tardanza => "tardanza",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub total_days: usize,
    pub present_days: usize,
    pub absent_days: usize,
    pub late_days: usize,
}

impl AttendanceStats {
    pub fn from_statuses<I>(statuses: I) -> AttendanceStats
    where
        I: IntoIterator<Item = AttendanceStatus>,
    {
        let mut stats = AttendanceStats::default();
        for s in statuses {
            stats.total_days += 1;
            match s {
                AttendanceStatus::Presente => stats.present_days += 1,
                AttendanceStatus::Ausente => stats.absent_days += 1,
                AttendanceStatus::Tardanza => stats.late_days += 1,
            }
        }
        stats
    }

    /// presentDays/totalDays×100 to one decimal; "0" when there are no
    /// records at all.
    pub fn rate_percent(&self) -> String {
        if self.total_days == 0 {
            return "0".to_string();
        }
        let rate = self.present_days as f64 / self.total_days as f64 * 100.0;
        format!("{:.1}", rate)
    }
}

/// Arithmetic mean of the selected grades; `None` for an empty set.
pub fn grade_average(grades: &[f64]) -> Option<f64> {
    if grades.is_empty() {
        return None;
    }
    Some(grades.iter().sum::<f64>() / grades.len() as f64)
}

pub fn format_average(avg: f64) -> String {
    format!("{:.2}", avg)
}

// Fixed-layout document models handed to the export collaborator. The daemon
// assembles the text and the filename; rasterization happens client-side.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub title: String,
    pub header_lines: Vec<String>,
    pub summary_lines: Vec<String>,
    pub table: ReportTable,
    pub file_name: String,
}

pub fn report_card(
    student_name: &str,
    dni: &str,
    trimester: i64,
    issued_on: &str,
    grade_rows: &[(String, f64)],
) -> ReportDocument {
    let rows: Vec<Vec<String>> = grade_rows
        .iter()
        .map(|(subject, grade)| vec![subject.clone(), format_grade(*grade)])
        .collect();
    let grades: Vec<f64> = grade_rows.iter().map(|(_, g)| *g).collect();
    let summary_lines = match grade_average(&grades) {
        Some(avg) => vec![format!("Promedio: {}", format_average(avg))],
        None => vec!["Sin calificaciones en el período".to_string()],
    };
    ReportDocument {
        title: "Boletín de Calificaciones".to_string(),
        header_lines: vec![
            format!("Estudiante: {}", student_name),
            format!("DNI: {}", dni),
            format!("Trimestre: {}", trimester),
            format!("Fecha: {}", issued_on),
        ],
        summary_lines,
        table: ReportTable {
            columns: vec!["Materia".to_string(), "Nota".to_string()],
            rows,
        },
        file_name: format!("boletin_{}_trimestre_{}.pdf", student_name, trimester),
    }
}

pub fn attendance_report(
    student_name: &str,
    dni: &str,
    month: &str,
    issued_on: &str,
    records: &[(String, String, AttendanceStatus)],
) -> ReportDocument {
    let stats = AttendanceStats::from_statuses(records.iter().map(|(_, _, s)| *s));
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|(date, subject, status)| {
            vec![date.clone(), subject.clone(), status.as_str().to_string()]
        })
        .collect();
    ReportDocument {
        title: "Reporte de Asistencias".to_string(),
        header_lines: vec![
            format!("Estudiante: {}", student_name),
            format!("DNI: {}", dni),
            format!("Período: {}", month),
            format!("Fecha: {}", issued_on),
        ],
        summary_lines: vec![
            format!("Total de días: {}", stats.total_days),
            format!("Presentes: {}", stats.present_days),
            format!("Ausentes: {}", stats.absent_days),
            format!("Tardanzas: {}", stats.late_days),
            format!("Porcentaje de asistencia: {}%", stats.rate_percent()),
        ],
        table: ReportTable {
            columns: vec![
                "Fecha".to_string(),
                "Materia".to_string(),
                "Estado".to_string(),
            ],
            rows,
        },
        file_name: format!("asistencia_{}_{}.pdf", student_name, month),
    }
}

/// Whole marks print without a decimal tail, matching how the grade sheet
/// displays them.
fn format_grade(grade: f64) -> String {
    if grade.fract() == 0.0 {
        format!("{}", grade as i64)
    } else {
        format!("{}", grade)
    }
}
