/// A parsed feed export: ordered rows of ordered text cells.
///
/// Rows whose every cell is blank after trimming are dropped during
/// parsing, so consumers never see the fully-blank separator or
/// trailing lines the spreadsheet export tends to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn parse(text: &str) -> Self {
        Self {
            rows: parse_delimited(text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Widest observed row, in cells.
    pub fn max_width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// Parse comma-separated text with optional double-quoted fields.
///
/// `""` inside a quoted field is a literal quote; CR, LF, and CRLF all
/// terminate a row (CRLF as one terminator); quoted fields may span
/// delimiters and newlines. An unterminated quote at end-of-input is
/// tolerated and flushes whatever was accumulated.
pub fn parse_delimited(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => row.push(std::mem::take(&mut cell)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut cell));
                if !is_blank_row(&row) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => cell.push(ch),
        }
    }

    row.push(cell);
    if !is_blank_row(&row) {
        rows.push(row);
    }
    rows
}
