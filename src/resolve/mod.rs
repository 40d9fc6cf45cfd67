use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::columns::ColumnMap;
use crate::normalize::{
    minutes_from_time, normalize_session_type, normalize_text, normalize_time,
};

/// Label reported when the winning row has a blank classroom cell.
pub const NO_CLASSROOM_LABEL: &str = "Not listed";

/// Rows whose start time does not parse score as if this many minutes
/// away: they lose to any candidate with a real time but stay
/// selectable when nobody has one.
const UNPARSEABLE_TIME_MINUTES: i64 = 1_000_000_000;

/// A point query in canonical comparison form. Construct with
/// [`NormalizedQuery::new`]; empty fields mean the caller omitted them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub subject: String,
    pub section: String,
    pub session_type: String,
    pub start_time: String,
}

impl NormalizedQuery {
    pub fn new(subject: &str, section: &str, session_type: &str, start_time: &str) -> Self {
        Self {
            subject: normalize_text(subject),
            section: normalize_text(section),
            session_type: normalize_session_type(session_type),
            start_time: normalize_time(start_time),
        }
    }
}

/// Attendance status decoded from the feed's status column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Pending,
    Present,
    Absent,
    AbsentWithNotice,
    Substitution,
    Tutoring,
    Makeup,
    Other(String),
}

impl Status {
    pub fn decode(code: &str) -> Self {
        match normalize_text(code).as_str() {
            "" => Status::Pending,
            "P" => Status::Present,
            "A" => Status::Absent,
            "AA" => Status::AbsentWithNotice,
            "R" => Status::Substitution,
            "T" => Status::Tutoring,
            "REC" => Status::Makeup,
            other => Status::Other(other.to_string()),
        }
    }

    pub fn is_substitution(&self) -> bool {
        matches!(self, Status::Substitution)
    }

    /// Presentation triple for the response envelope. Unknown codes
    /// pass through verbatim under the generic icon.
    pub fn info(&self) -> StatusInfo {
        let (icon, text, code) = match self {
            Status::Pending => ("⏳", "Not arrived yet", ""),
            Status::Present => ("✅", "Present", "P"),
            Status::Absent => ("❌", "Absent", "A"),
            Status::AbsentWithNotice => ("⚠️", "Absent with notice", "AA"),
            Status::Substitution => ("🔄", "Substitution", "R"),
            Status::Tutoring => ("ℹ️", "Tutoring", "T"),
            Status::Makeup => ("📅", "Makeup session", "REC"),
            Status::Other(code) => ("ℹ️", code.as_str(), code.as_str()),
        };
        StatusInfo {
            icon: icon.to_string(),
            text: text.to_string(),
            code: code.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusInfo {
    pub icon: String,
    pub text: String,
    pub code: String,
}

/// The answer to one point query.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedClass {
    pub classroom: String,
    pub status: StatusInfo,
    pub substitute_teacher: String,
    pub observation: String,
}

/// Outcome of one point query. A missing required field and "nothing
/// matched" are different things; only the former is a caller error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    MissingField(&'static str),
    NotFound,
    Found(ResolvedClass),
}

fn cell<'a>(row: &'a [String], idx: usize) -> &'a str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// Temporal-proximity score: minutes of distance dominate, and among
/// equally distant candidates the one with a populated classroom cell
/// wins. Lower is better.
fn score_candidate(row: &[String], cols: &ColumnMap, query_minutes: i64) -> i64 {
    let diff = match cols.start_time.and_then(|i| minutes_from_time(cell(row, i))) {
        Some(minutes) => (minutes - query_minutes).abs(),
        None => UNPARSEABLE_TIME_MINUTES,
    };
    let has_classroom = !cell(row, cols.classroom).trim().is_empty();
    diff * 1000 + if has_classroom { 0 } else { 1 }
}

fn pick_best<'a>(
    candidates: &[&'a Vec<String>],
    query_time: &str,
    cols: &ColumnMap,
) -> &'a Vec<String> {
    let query_minutes = match minutes_from_time(query_time) {
        Some(m) => m,
        // No usable query time: prefer any candidate that names a
        // classroom, else the first one.
        None => {
            return candidates
                .iter()
                .find(|row| !cell(row, cols.classroom).trim().is_empty())
                .copied()
                .unwrap_or(candidates[0]);
        }
    };

    let mut best = candidates[0];
    let mut best_score = score_candidate(best, cols, query_minutes);
    for &row in &candidates[1..] {
        let score = score_candidate(row, cols, query_minutes);
        // Strict comparison keeps ties stable on the earliest row.
        if score < best_score {
            best = row;
            best_score = score;
        }
    }
    best
}

/// Answer one point query against a snapshot's data rows.
pub fn resolve_one(
    query: &NormalizedQuery,
    data_rows: &[Vec<String>],
    cols: &ColumnMap,
) -> MatchOutcome {
    if query.subject.is_empty() {
        return MatchOutcome::MissingField("subject");
    }
    if query.section.is_empty() {
        return MatchOutcome::MissingField("section");
    }
    if query.session_type.is_empty() {
        return MatchOutcome::MissingField("sessionType");
    }

    let candidates: Vec<&Vec<String>> = data_rows
        .iter()
        .filter(|row| {
            let subject = normalize_text(cell(row, cols.subject));
            if subject.is_empty() || subject != query.subject {
                return false;
            }
            if normalize_text(cell(row, cols.section)) != query.section {
                return false;
            }
            let session_type = normalize_session_type(cell(row, cols.session_type));
            !session_type.is_empty() && session_type == query.session_type
        })
        .collect();

    if candidates.is_empty() {
        return MatchOutcome::NotFound;
    }
    debug!(
        subject = %query.subject,
        candidates = candidates.len(),
        "disambiguating candidate rows"
    );

    let best = pick_best(&candidates, &query.start_time, cols);

    let status = Status::decode(cell(best, cols.status));
    let substitute_teacher = if status.is_substitution() {
        cols.substitute
            .map(|i| cell(best, i).trim().to_string())
            .unwrap_or_default()
    } else {
        String::new()
    };
    let observation = cols
        .observation
        .map(|i| cell(best, i).trim().to_string())
        .unwrap_or_default();
    let classroom = cell(best, cols.classroom).trim();

    MatchOutcome::Found(ResolvedClass {
        classroom: if classroom.is_empty() {
            NO_CLASSROOM_LABEL.to_string()
        } else {
            classroom.to_string()
        },
        status: status.info(),
        substitute_teacher,
        observation,
    })
}

/// Answer many keyed point queries against one shared snapshot. The
/// caller obtains the snapshot once; nothing here can trigger a fetch.
pub fn resolve_batch(
    items: Vec<(String, NormalizedQuery)>,
    data_rows: &[Vec<String>],
    cols: &ColumnMap,
) -> HashMap<String, MatchOutcome> {
    let mut results = HashMap::with_capacity(items.len());
    for (key, query) in items {
        let outcome = resolve_one(&query, data_rows, cols);
        results.insert(key, outcome);
    }
    results
}
