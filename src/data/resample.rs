use std::fmt;
use std::str::FromStr;

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::loader::RawReadings;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Frequency – the fixed sampling interval of the time grid
// ---------------------------------------------------------------------------

/// Sampling interval, stored in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frequency {
    millis: i64,
}

impl Frequency {
    pub fn from_millis(millis: i64) -> Result<Self> {
        if millis <= 0 {
            return Err(Error::invalid("freq", format!("{millis}ms is not a positive interval")));
        }
        Ok(Frequency { millis })
    }

    pub fn from_seconds(seconds: i64) -> Result<Self> {
        Self::from_millis(seconds.saturating_mul(1000))
    }

    pub fn as_millis(&self) -> i64 {
        self.millis
    }
}

/// Accepts pandas-style offset aliases: `5T`, `5min`, `15s`, `1H`, `1D`, `100ms`.
/// A bare unit means one of it.
impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (count, unit) = s.split_at(split);
        let count: i64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| Error::invalid("freq", format!("'{s}' has an invalid multiplier")))?
        };
        let unit_ms = match unit {
            "ms" | "L" => 1,
            "s" | "S" | "sec" => 1_000,
            "T" | "min" | "m" => 60_000,
            "H" | "h" => 3_600_000,
            "D" | "d" => 86_400_000,
            other => {
                return Err(Error::invalid(
                    "freq",
                    format!("unknown unit '{other}' in '{s}'"),
                ))
            }
        };
        Self::from_millis(count.saturating_mul(unit_ms))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.millis;
        for (unit, size) in [("D", 86_400_000), ("h", 3_600_000), ("min", 60_000), ("s", 1_000)] {
            if ms % size == 0 {
                return write!(f, "{}{unit}", ms / size);
            }
        }
        write!(f, "{ms}ms")
    }
}

// ---------------------------------------------------------------------------
// Timestamp parsing
// ---------------------------------------------------------------------------

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Parse a timestamp cell. Offsets (RFC 3339) are converted to UTC.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// Regularization onto a fixed grid
// ---------------------------------------------------------------------------

/// How several raw readings falling into the same grid slot are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalAggregation {
    /// Keep the observed reading closest in time to the slot (earlier wins ties).
    #[default]
    Nearest,
    /// Average every observed reading in the slot.
    Mean,
}

/// Readings laid out on a regular time grid; `None` marks a missing entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularGrid {
    pub index: Vec<NaiveDateTime>,
    pub freq: Frequency,
    pub cells: Array2<Option<f64>>,
}

/// Most common gap between consecutive distinct timestamps.
///
/// Gaps are tried from most to least frequent (larger first on ties) and the
/// first one that puts more than half of the timestamps exactly on its grid is
/// taken. A jittered timestamp therefore snaps to the nearest slot instead of
/// shrinking the step; when no gap fits, the caller must set `freq`.
pub fn infer_frequency(raw: &RawReadings) -> Result<Frequency> {
    let mut ts = raw.timestamps.clone();
    ts.sort_unstable();
    ts.dedup();
    let Some(&start) = ts.first() else {
        return Err(Error::load(&raw.path, "no readings"));
    };

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for w in ts.windows(2) {
        *counts.entry((w[1] - w[0]).num_milliseconds()).or_default() += 1;
    }
    if counts.is_empty() {
        return Err(Error::load(
            &raw.path,
            "cannot infer sampling frequency from fewer than two distinct timestamps",
        ));
    }
    let mut candidates: Vec<(i64, usize)> = counts.into_iter().collect();
    candidates.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));

    let offsets: Vec<i64> = ts.iter().map(|t| (*t - start).num_milliseconds()).collect();
    for (gap, _) in candidates {
        let on_grid = offsets.iter().filter(|&&o| o % gap == 0).count();
        if on_grid * 2 > offsets.len() {
            return Frequency::from_millis(gap);
        }
    }
    Err(Error::load(
        &raw.path,
        "timestamps are irregular; set loader.freq explicitly",
    ))
}

/// Snap raw rows onto `start, start + freq, ...` up to the last timestamp.
///
/// Slots with no observed reading for a node stay `None`, so gaps in the
/// source show up as missing rows instead of being dropped.
pub fn regularize(
    raw: &RawReadings,
    freq: Option<Frequency>,
    aggregation: TemporalAggregation,
) -> Result<RegularGrid> {
    let freq = match freq {
        Some(f) => f,
        None => infer_frequency(raw)?,
    };
    let n_nodes = raw.nodes.len();

    let (Some(&start), Some(&end)) = (raw.timestamps.iter().min(), raw.timestamps.iter().max())
    else {
        return Err(Error::load(&raw.path, "no readings"));
    };

    let step = freq.as_millis();
    let slot_of = |t: NaiveDateTime| ((t - start).num_milliseconds() + step / 2) / step;
    let n_slots = slot_of(end) as usize + 1;
    let index: Vec<NaiveDateTime> = (0..n_slots)
        .map(|k| start + Duration::milliseconds(step * k as i64))
        .collect();

    let cells = match aggregation {
        TemporalAggregation::Nearest => {
            // (distance to slot, timestamp, value)
            let mut best: Array2<Option<(i64, NaiveDateTime, f64)>> =
                Array2::from_elem((n_slots, n_nodes), None);
            for (t, row) in raw.timestamps.iter().zip(&raw.rows) {
                let slot = slot_of(*t) as usize;
                let dist = (*t - index[slot]).num_milliseconds().abs();
                for (node, cell) in row.iter().enumerate() {
                    let Some(v) = *cell else { continue };
                    let slot_best = &mut best[[slot, node]];
                    let better = match slot_best {
                        None => true,
                        Some((d, bt, _)) => (dist, *t) < (*d, *bt),
                    };
                    if better {
                        *slot_best = Some((dist, *t, v));
                    }
                }
            }
            best.mapv(|b| b.map(|(_, _, v)| v))
        }
        TemporalAggregation::Mean => {
            let mut acc: Array2<(f64, usize)> = Array2::from_elem((n_slots, n_nodes), (0.0, 0));
            for (t, row) in raw.timestamps.iter().zip(&raw.rows) {
                let slot = slot_of(*t) as usize;
                for (node, cell) in row.iter().enumerate() {
                    if let Some(v) = *cell {
                        let (sum, count) = &mut acc[[slot, node]];
                        *sum += v;
                        *count += 1;
                    }
                }
            }
            acc.mapv(|(sum, count)| (count > 0).then(|| sum / count as f64))
        }
    };

    let empty_rows = cells
        .rows()
        .into_iter()
        .filter(|r| r.iter().all(Option::is_none))
        .count();
    log::debug!(
        "regularized {} raw rows onto {n_slots} slots @ {freq} ({empty_rows} fully missing)",
        raw.rows.len()
    );

    Ok(RegularGrid { index, freq, cells })
}
