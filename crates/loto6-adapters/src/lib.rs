//! Source adapter contract + the draw-table extractor for the ohtashp result pages.

use std::collections::HashSet;

use loto6_core::{is_valid_ball, normalize_digit, DrawRecord, NUMBERS_PER_DRAW};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

pub const OHTASHP_SOURCE_ID: &str = "ohtashp";

/// Round cell, date cell, six number cells. The bonus cell is optional.
pub const MIN_ROW_CELLS: usize = 2 + NUMBERS_PER_DRAW;
const FIRST_NUMBER_CELL: usize = 2;
const BONUS_CELL: usize = FIRST_NUMBER_CELL + NUMBERS_PER_DRAW;

/// Round cells read `第<digits>回`, e.g. `第1855回`.
const ROUND_MARKER_OPEN: char = '第';
const ROUND_MARKER_CLOSE: char = '回';

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
}

/// Why a table row did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowRejection {
    #[error("row has {found} cells, need at least 8")]
    TooFewCells { found: usize },
    #[error("first cell has no round marker")]
    MissingRoundMarker,
    #[error("round {digits} is not a positive 32-bit number")]
    InvalidRound { digits: String },
    #[error("date cell has no digits")]
    DateWithoutDigits,
    #[error("number cell {column} has no digits")]
    NumberWithoutDigits { column: usize },
    #[error("number cell {column} holds {digits}, outside the ball range")]
    NumberOutOfRange { column: usize, digits: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// Index among all `table tr` rows of the page.
    pub row_index: usize,
    pub reason: RowRejection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageExtraction {
    /// Accepted records in page order, first occurrence of each round only.
    pub records: Vec<DrawRecord>,
    pub rejected: Vec<RejectedRow>,
    /// Valid rows dropped because an earlier row had the same round.
    pub duplicates: usize,
    pub rows_scanned: usize,
}

pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    fn parse_page(&self, html: &str) -> Result<PageExtraction, AdapterError>;
}

#[derive(Debug, Clone, Copy, Default)]
struct OhtashpTableAdapter;

impl SourceAdapter for OhtashpTableAdapter {
    fn source_id(&self) -> &'static str {
        OHTASHP_SOURCE_ID
    }

    fn parse_page(&self, html: &str) -> Result<PageExtraction, AdapterError> {
        extract_draw_tables(html)
    }
}

pub fn ohtashp_adapter() -> impl SourceAdapter {
    OhtashpTableAdapter
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Message(e.to_string()))
}

/// Scans every row of every table. Header position is not assumed and rejected
/// rows never stop the scan.
pub fn extract_draw_tables(html: &str) -> Result<PageExtraction, AdapterError> {
    let document = Html::parse_document(html);
    let row_sel = selector("table tr")?;
    let cell_sel = selector("td, th")?;

    let mut out = PageExtraction::default();
    let mut seen_rounds = HashSet::new();

    for (row_index, row) in document.select(&row_sel).enumerate() {
        out.rows_scanned += 1;
        let cells = row_cell_texts(row, &cell_sel);
        match parse_row(&cells) {
            Ok(record) => {
                if !seen_rounds.insert(record.round) {
                    out.duplicates += 1;
                    continue;
                }
                if record.has_duplicate_numbers() {
                    warn!(
                        round = record.round,
                        numbers = ?record.numbers,
                        "draw repeats a ball; keeping it as published"
                    );
                }
                out.records.push(record);
            }
            Err(reason) => {
                debug!(row_index, %reason, "row rejected");
                out.rejected.push(RejectedRow { row_index, reason });
            }
        }
    }

    Ok(out)
}

/// Text of each `td`/`th` under the row, every text node trimmed.
pub fn row_cell_texts(row: ElementRef<'_>, cell_sel: &Selector) -> Vec<String> {
    row.select(cell_sel)
        .map(|cell| cell.text().map(str::trim).collect::<String>())
        .collect()
}

/// Validates one row. The first failing check decides the rejection.
pub fn parse_row(cells: &[String]) -> Result<DrawRecord, RowRejection> {
    if cells.len() < MIN_ROW_CELLS {
        return Err(RowRejection::TooFewCells { found: cells.len() });
    }

    let round = parse_round(&cells[0])?;

    let date = &cells[1];
    if !date.chars().any(|c| normalize_digit(c).is_some()) {
        return Err(RowRejection::DateWithoutDigits);
    }

    let mut numbers = [0u8; NUMBERS_PER_DRAW];
    for (slot, column) in numbers.iter_mut().zip(FIRST_NUMBER_CELL..BONUS_CELL) {
        let digits = digits_only(&cells[column]);
        if digits.is_empty() {
            return Err(RowRejection::NumberWithoutDigits { column });
        }
        *slot = parse_ball(&digits).ok_or(RowRejection::NumberOutOfRange { column, digits })?;
    }

    let bonus = parse_bonus(round, cells.get(BONUS_CELL).map(String::as_str));

    Ok(DrawRecord {
        round,
        date: date.clone(),
        numbers,
        bonus,
    })
}

fn parse_round(cell: &str) -> Result<u32, RowRejection> {
    let digits = round_marker_digits(cell).ok_or(RowRejection::MissingRoundMarker)?;
    match digits.parse::<u32>() {
        Ok(round) if round > 0 => Ok(round),
        _ => Err(RowRejection::InvalidRound { digits }),
    }
}

/// Never rejects the row. Anything that is not a ball reads as undetermined.
fn parse_bonus(round: u32, cell: Option<&str>) -> Option<u8> {
    let digits = cell.map(digits_only).unwrap_or_default();
    if digits.is_empty() || digits.bytes().all(|b| b == b'0') {
        return None;
    }
    let bonus = parse_ball(&digits);
    if bonus.is_none() {
        warn!(round, digits = %digits, "bonus cell is not a ball; storing as undetermined");
    }
    bonus
}

fn parse_ball(digits: &str) -> Option<u8> {
    digits.parse::<u8>().ok().filter(|n| is_valid_ball(*n))
}

/// Digits of the first `第<digits>回` marker in the text, normalized to ASCII.
fn round_marker_digits(text: &str) -> Option<String> {
    let mut rest = text;
    while let Some(pos) = rest.find(ROUND_MARKER_OPEN) {
        let after = &rest[pos + ROUND_MARKER_OPEN.len_utf8()..];
        let run_len: usize = after
            .chars()
            .take_while(|c| normalize_digit(*c).is_some())
            .map(char::len_utf8)
            .sum();
        if run_len > 0 && after[run_len..].starts_with(ROUND_MARKER_CLOSE) {
            return Some(digits_only(&after[..run_len]));
        }
        rest = after;
    }
    None
}

fn digits_only(text: &str) -> String {
    text.chars().filter_map(normalize_digit).collect()
}
