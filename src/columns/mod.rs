use tracing::debug;

use crate::normalize::normalize_text;

/// Indices of the logical fields inside a feed row. The five required
/// fields drive matching; the optional ones only enrich the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub subject: usize,
    pub section: usize,
    pub session_type: usize,
    pub classroom: usize,
    pub status: usize,
    pub observation: Option<usize>,
    pub substitute: Option<usize>,
    pub start_time: Option<usize>,
    pub lead_teacher: Option<usize>,
}

/// Fixed letter-column offsets (columns D,E,F,H,I,J,L,M of the sheet)
/// used when the export carries no usable header row.
pub const POSITIONAL: ColumnMap = ColumnMap {
    subject: 3,
    section: 4,
    session_type: 5,
    observation: Some(7),
    substitute: Some(8),
    start_time: Some(9),
    classroom: 11,
    status: 12,
    lead_teacher: None,
};

/// How the columns of a fetch cycle were determined. Chosen once per
/// snapshot; `Positional` means the first row is data, `Inferred` means
/// it was a header row and is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLayout {
    Positional,
    Inferred(ColumnMap),
}

/// Ordered synonym substrings per logical field. The first synonym that
/// matches any header cell wins; within one synonym the leftmost
/// matching cell wins.
const SUBJECT_SYNONYMS: &[&str] = &["ASIGNATURA", "MATERIA", "NOMBRE"];
const SECTION_SYNONYMS: &[&str] = &["SECCION"];
const SESSION_TYPE_SYNONYMS: &[&str] = &["TIPO", "T/P", "TP"];
const OBSERVATION_SYNONYMS: &[&str] = &["OBSERVACION", "OBS"];
const SUBSTITUTE_SYNONYMS: &[&str] = &["REEMPLAZ", "SUPL"];
const START_TIME_SYNONYMS: &[&str] = &["HORA INICIO", "INICIO"];
const CLASSROOM_SYNONYMS: &[&str] = &["AULA"];
const STATUS_SYNONYMS: &[&str] = &["ESTADO", "ASIST"];
const LEAD_TEACHER_SYNONYMS: &[&str] = &["PROF", "DOCENTE"];

fn find_column(headers: &[String], synonyms: &[&str]) -> Option<usize> {
    synonyms
        .iter()
        .find_map(|syn| headers.iter().position(|h| h.contains(syn)))
}

impl ColumnLayout {
    /// Decide the layout for a fetch cycle from the table's first row.
    ///
    /// Headers are assumed present when at least one cell normalizes to
    /// something non-empty and not purely numeric. A header map missing
    /// any required field is discarded wholesale for the positional
    /// fallback; a half-correct schema silently misreads data.
    pub fn detect(first_row: &[String]) -> Self {
        let headers: Vec<String> = first_row.iter().map(|c| normalize_text(c)).collect();

        let has_headers = headers
            .iter()
            .any(|h| !h.is_empty() && !h.chars().all(|c| c.is_ascii_digit()));
        if !has_headers {
            debug!("first row looks like data, using positional columns");
            return ColumnLayout::Positional;
        }

        let subject = find_column(&headers, SUBJECT_SYNONYMS);
        let section = find_column(&headers, SECTION_SYNONYMS);
        let session_type = find_column(&headers, SESSION_TYPE_SYNONYMS);
        let classroom = find_column(&headers, CLASSROOM_SYNONYMS);
        let status = find_column(&headers, STATUS_SYNONYMS);

        match (subject, section, session_type, classroom, status) {
            (Some(subject), Some(section), Some(session_type), Some(classroom), Some(status)) => {
                ColumnLayout::Inferred(ColumnMap {
                    subject,
                    section,
                    session_type,
                    classroom,
                    status,
                    observation: find_column(&headers, OBSERVATION_SYNONYMS),
                    substitute: find_column(&headers, SUBSTITUTE_SYNONYMS),
                    start_time: find_column(&headers, START_TIME_SYNONYMS),
                    lead_teacher: find_column(&headers, LEAD_TEACHER_SYNONYMS),
                })
            }
            _ => {
                debug!("header row missing required columns, using positional fallback");
                ColumnLayout::Positional
            }
        }
    }

    pub fn columns(&self) -> &ColumnMap {
        match self {
            ColumnLayout::Positional => &POSITIONAL,
            ColumnLayout::Inferred(map) => map,
        }
    }

    /// Whether the table's first row was a header row rather than data.
    pub fn consumes_header_row(&self) -> bool {
        matches!(self, ColumnLayout::Inferred(_))
    }
}
