//! Core domain model for LOTO6 draw history.

use serde::{Deserialize, Serialize};

/// Lowest ball that can be drawn.
pub const BALL_MIN: u8 = 1;
/// Highest ball that can be drawn.
pub const BALL_MAX: u8 = 43;
/// Main numbers per draw, excluding the bonus ball.
pub const NUMBERS_PER_DRAW: usize = 6;

pub fn is_valid_ball(value: u8) -> bool {
    (BALL_MIN..=BALL_MAX).contains(&value)
}

/// One draw outcome. `round` is the primary key of the store.
///
/// Field order is the wire order of the persisted store; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub round: u32,
    pub date: String,
    pub numbers: [u8; NUMBERS_PER_DRAW],
    /// `None` when the bonus ball is not determined yet.
    #[serde(with = "bonus_sentinel")]
    pub bonus: Option<u8>,
}

impl DrawRecord {
    /// Leading four-digit year of `date`, e.g. `2022` for `"2022/03/10"`.
    pub fn year(&self) -> Option<i32> {
        leading_year(&self.date)
    }

    /// True when a ball appears more than once among the main numbers.
    pub fn has_duplicate_numbers(&self) -> bool {
        let mut seen = [false; BALL_MAX as usize + 1];
        for &n in &self.numbers {
            let slot = usize::from(n);
            if slot < seen.len() {
                if seen[slot] {
                    return true;
                }
                seen[slot] = true;
            }
        }
        false
    }
}

/// Parses a leading run of exactly four digits (full-width digits allowed).
pub fn leading_year(date: &str) -> Option<i32> {
    let digits: String = date
        .trim()
        .chars()
        .map_while(normalize_digit)
        .collect();
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok()
}

/// Maps ASCII and full-width decimal digits to their ASCII form.
pub fn normalize_digit(ch: char) -> Option<char> {
    match ch {
        '0'..='9' => Some(ch),
        '\u{FF10}'..='\u{FF19}' => char::from_u32(ch as u32 - 0xFF10 + u32::from(b'0')),
        _ => None,
    }
}

/// The persisted format writes an undetermined bonus as `0`.
mod bonus_sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(value.unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Ok((raw != 0).then_some(raw))
    }
}

/// Per-ball aggregates over a newest-first draw history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BallStat {
    pub ball: u8,
    /// Appearances among main numbers.
    pub frequency: usize,
    /// Draws since the ball last appeared; the history length if it never did.
    pub gap: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberStats {
    pub draws: usize,
    pub balls: Vec<BallStat>,
}

impl NumberStats {
    pub fn from_history(records: &[DrawRecord]) -> Self {
        let mut balls: Vec<BallStat> = (BALL_MIN..=BALL_MAX)
            .map(|ball| BallStat {
                ball,
                frequency: 0,
                gap: records.len(),
            })
            .collect();

        for (idx, record) in records.iter().enumerate() {
            for &n in &record.numbers {
                if !is_valid_ball(n) {
                    continue;
                }
                let stat = &mut balls[usize::from(n - BALL_MIN)];
                stat.frequency += 1;
                if stat.gap == records.len() {
                    stat.gap = idx;
                }
            }
        }

        Self {
            draws: records.len(),
            balls,
        }
    }

    pub fn get(&self, ball: u8) -> Option<&BallStat> {
        if !is_valid_ball(ball) {
            return None;
        }
        self.balls.get(usize::from(ball - BALL_MIN))
    }

    /// Balls ordered by descending frequency, ties broken by ball number.
    pub fn hottest(&self) -> Vec<BallStat> {
        let mut sorted = self.balls.clone();
        sorted.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.ball.cmp(&b.ball)));
        sorted
    }
}
