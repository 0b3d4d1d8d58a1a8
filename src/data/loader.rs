use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, AsArray, Float64Array, StringArray, TimestampMillisecondArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, TimeUnit};
use chrono::NaiveDateTime;
use ndarray::Array2;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::impute::impute;
use super::model::{array_from_rows, DistanceMatrix, SpatioTemporalDataset};
use super::resample::{parse_timestamp, regularize, Frequency};
use crate::config::DatasetConfig;
use crate::error::{Error, Result};

/// Readings exactly as they appear in the source file, before regularization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReadings {
    pub path: PathBuf,
    /// Node identifiers, in column order.
    pub nodes: Vec<String>,
    pub timestamps: Vec<NaiveDateTime>,
    /// One entry per timestamp; `None` marks a missing reading.
    pub rows: Vec<Vec<Option<f64>>>,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load, regularize and clean a complete dataset.
///
/// All-or-nothing: the first malformed file or row aborts the load.
pub fn load_dataset(config: &DatasetConfig) -> Result<SpatioTemporalDataset> {
    let loader = &config.loader;
    let raw = load_readings(&config.readings_path)?;
    log::info!(
        "Loaded {} rows x {} nodes from {}",
        raw.rows.len(),
        raw.nodes.len(),
        config.readings_path.display()
    );

    let freq = loader
        .freq
        .as_deref()
        .map(str::parse::<Frequency>)
        .transpose()?;
    let grid = regularize(&raw, freq, loader.aggregation)?;
    let (values, mask) = impute(&grid.cells, loader.fill);

    let mut distances = load_distances(&config.distances_path, &raw.nodes)?;
    if loader.normalize_distances {
        distances = distances.min_max_normalized();
    }

    let dataset = SpatioTemporalDataset::new(
        config.name.clone(),
        grid.index,
        grid.freq,
        raw.nodes,
        values,
        mask,
        distances,
    )?;
    log::info!("{dataset}");
    Ok(dataset)
}

/// Load readings from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – first column timestamps, one column per node
/// * `.parquet` – same layout; the timestamp column may be text or an Arrow timestamp
pub fn load_readings(path: &Path) -> Result<RawReadings> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "csv" => load_readings_csv(path)?,
        "parquet" | "pq" => load_readings_parquet(path)?,
        other => return Err(Error::load(path, format!("unsupported file extension: .{other}"))),
    };

    if raw.nodes.is_empty() {
        return Err(Error::load(path, "no node columns after the timestamp column"));
    }
    if raw.timestamps.is_empty() {
        return Err(Error::load(path, "no readings"));
    }
    Ok(raw)
}

// ---------------------------------------------------------------------------
// CSV readings
// ---------------------------------------------------------------------------

const MISSING_TOKENS: &[&str] = &["", "nan", "NaN", "NAN", "NA", "N/A", "null", "None"];

/// CSV layout: header row `timestamp,<node>,<node>,...`, one row per timestamp.
/// Empty or `NaN`-like cells are missing readings.
fn load_readings_csv(path: &Path) -> Result<RawReadings> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::load(path, format!("opening CSV: {e}")))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::load(path, format!("reading CSV headers: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let nodes = node_columns(path, &headers[headers.len().min(1)..])?;

    let mut timestamps = Vec::new();
    let mut rows = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let row_no = i + 1;
        let record = result.map_err(|e| Error::load_row(path, row_no, e.to_string()))?;
        if record.len() != headers.len() {
            return Err(Error::load_row(
                path,
                row_no,
                format!("expected {} cells, found {}", headers.len(), record.len()),
            ));
        }

        let stamp = record.get(0).unwrap_or("");
        let t = parse_timestamp(stamp)
            .ok_or_else(|| Error::load_row(path, row_no, format!("unparsable timestamp '{stamp}'")))?;

        let row = record
            .iter()
            .skip(1)
            .zip(&nodes)
            .map(|(cell, node)| parse_reading(cell, path, row_no, node))
            .collect::<Result<Vec<_>>>()?;

        timestamps.push(t);
        rows.push(row);
    }

    Ok(RawReadings {
        path: path.to_path_buf(),
        nodes,
        timestamps,
        rows,
    })
}

fn parse_reading(cell: &str, path: &Path, row: usize, node: &str) -> Result<Option<f64>> {
    if MISSING_TOKENS.contains(&cell) {
        return Ok(None);
    }
    let v: f64 = cell
        .parse()
        .map_err(|_| Error::load_row(path, row, format!("node {node}: '{cell}' is not a number")))?;
    Ok(v.is_finite().then_some(v))
}

fn node_columns(path: &Path, names: &[String]) -> Result<Vec<String>> {
    let mut seen = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        if let Some(prev) = seen.insert(name.as_str(), i) {
            return Err(Error::load(
                path,
                format!("node '{name}' appears in columns {} and {}", prev + 2, i + 2),
            ));
        }
    }
    Ok(names.to_vec())
}

// ---------------------------------------------------------------------------
// Parquet readings
// ---------------------------------------------------------------------------

/// Expected schema:
/// - first column: Utf8 / LargeUtf8 timestamp strings, or an Arrow `Timestamp` / `Date` column
/// - every other column: one numeric (int or float) column per node, nulls are missing
fn load_readings_parquet(path: &Path) -> Result<RawReadings> {
    let file = std::fs::File::open(path).map_err(|e| Error::load(path, format!("opening parquet file: {e}")))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::load(path, format!("reading parquet metadata: {e}")))?;
    if builder.schema().fields().is_empty() {
        return Err(Error::load(path, "parquet file has no columns"));
    }
    let nodes: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .skip(1)
        .map(|f| f.name().clone())
        .collect();
    let nodes = node_columns(path, &nodes)?;
    let reader = builder
        .build()
        .map_err(|e| Error::load(path, format!("building parquet reader: {e}")))?;

    let mut timestamps = Vec::new();
    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.map_err(|e| Error::load(path, format!("reading parquet record batch: {e}")))?;
        let first_row = rows.len();

        let stamps = extract_timestamps(batch.column(0), path, first_row)?;
        let columns = batch
            .columns()
            .iter()
            .skip(1)
            .zip(&nodes)
            .map(|(col, node)| {
                cast(col, &DataType::Float64).map_err(|e| {
                    Error::load(path, format!("node column '{node}' is not numeric: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let columns: Vec<&Float64Array> = columns.iter().map(|c| c.as_primitive::<Float64Type>()).collect();

        for (r, t) in stamps.into_iter().enumerate() {
            let row: Vec<Option<f64>> = columns
                .iter()
                .map(|col| {
                    let v = (!col.is_null(r)).then(|| col.value(r));
                    v.filter(|v| v.is_finite())
                })
                .collect();
            timestamps.push(t);
            rows.push(row);
        }
    }

    Ok(RawReadings {
        path: path.to_path_buf(),
        nodes,
        timestamps,
        rows,
    })
}

/// Decode the timestamp column of one record batch.
fn extract_timestamps(col: &Arc<dyn Array>, path: &Path, first_row: usize) -> Result<Vec<NaiveDateTime>> {
    let row_err = |r: usize, reason: String| Error::load_row(path, first_row + r + 1, reason);

    match col.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => {
            let text: Vec<Option<&str>> = if let Some(s) = col.as_any().downcast_ref::<StringArray>() {
                s.iter().collect()
            } else {
                col.as_string::<i64>().iter().collect()
            };
            text.into_iter()
                .enumerate()
                .map(|(r, s)| {
                    let s = s.ok_or_else(|| row_err(r, "null timestamp".into()))?;
                    parse_timestamp(s).ok_or_else(|| row_err(r, format!("unparsable timestamp '{s}'")))
                })
                .collect()
        }
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
            let millis = cast(col, &DataType::Timestamp(TimeUnit::Millisecond, None))
                .map_err(|e| Error::load(path, format!("converting timestamp column: {e}")))?;
            let millis = millis
                .as_any()
                .downcast_ref::<TimestampMillisecondArray>()
                .ok_or_else(|| Error::load(path, "expected millisecond timestamps after cast"))?;
            (0..millis.len())
                .map(|r| {
                    if millis.is_null(r) {
                        return Err(row_err(r, "null timestamp".into()));
                    }
                    millis
                        .value_as_datetime(r)
                        .ok_or_else(|| row_err(r, "timestamp out of range".into()))
                })
                .collect()
        }
        other => Err(Error::load(
            path,
            format!("first column must hold timestamps, got {other:?}"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Distance table
// ---------------------------------------------------------------------------

const SOURCE_COLUMNS: &[&str] = &["node_a", "detector_1", "from", "source"];
const TARGET_COLUMNS: &[&str] = &["node_b", "detector_2", "to", "target"];
const DISTANCE_COLUMNS: &[&str] = &["distance", "dist", "cost", "weight"];

/// Pivot a sparse `(node_a, node_b, distance)` table into a dense symmetric
/// matrix over `nodes`.
///
/// Pairs absent from the table stay disconnected. Each listed pair connects
/// both directions; listing a pair twice with different distances is an
/// error, as is naming a node that has no readings column.
pub fn load_distances(path: &Path, nodes: &[String]) -> Result<DistanceMatrix> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::load(path, format!("opening CSV: {e}")))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::load(path, format!("reading CSV headers: {e}")))?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    let (a_idx, b_idx, d_idx) = distance_columns(path, &headers)?;

    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
    let lookup = |id: &str, row: usize| {
        index.get(id).copied().ok_or_else(|| {
            Error::load_row(path, row, format!("node '{id}' has no readings column (non-square pivot)"))
        })
    };

    let mut distances = DistanceMatrix::disconnected(nodes.len());
    // (low, high) -> (distance, row that set it)
    let mut seen: HashMap<(usize, usize), (f64, usize)> = HashMap::new();

    for (i, result) in reader.records().enumerate() {
        let row_no = i + 1;
        let record = result.map_err(|e| Error::load_row(path, row_no, e.to_string()))?;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let a = lookup(cell(a_idx), row_no)?;
        let b = lookup(cell(b_idx), row_no)?;
        let raw_d = cell(d_idx);
        let d: f64 = raw_d
            .parse()
            .map_err(|_| Error::load_row(path, row_no, format!("'{raw_d}' is not a distance")))?;
        if !d.is_finite() || d < 0.0 {
            return Err(Error::load_row(path, row_no, format!("distance {d} must be finite and non-negative")));
        }

        let key = (a.min(b), a.max(b));
        match seen.get(&key) {
            Some(&(prev, prev_row)) if prev != d => {
                return Err(Error::load_row(
                    path,
                    row_no,
                    format!(
                        "pair ({}, {}) has distance {d} but row {prev_row} gave {prev}",
                        nodes[a], nodes[b]
                    ),
                ));
            }
            Some(_) => {}
            None => {
                seen.insert(key, (d, row_no));
                distances.connect(a, b, d);
            }
        }
    }

    log::info!(
        "Loaded {} distinct node pairs for {} nodes from {}",
        seen.len(),
        nodes.len(),
        path.display()
    );
    Ok(distances)
}

/// Locate the (source, target, distance) columns by name, falling back to
/// the last three columns so a leading row-index column is tolerated.
fn distance_columns(path: &Path, headers: &[String]) -> Result<(usize, usize, usize)> {
    let find = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));
    match (find(SOURCE_COLUMNS), find(TARGET_COLUMNS), find(DISTANCE_COLUMNS)) {
        (Some(a), Some(b), Some(d)) => Ok((a, b, d)),
        _ if headers.len() >= 3 => {
            let n = headers.len();
            Ok((n - 3, n - 2, n - 1))
        }
        _ => Err(Error::load(
            path,
            "expected columns node_a, node_b, distance",
        )),
    }
}

// ---------------------------------------------------------------------------
// Learned edge scores
// ---------------------------------------------------------------------------

/// Read a dense `n × n` score matrix written by a structure-inference model.
///
/// A header row and a leading row-label column are both optional and are
/// told apart by shape, so numeric node ids work as labels:
///
/// * `n` rows of `n` cells: plain matrix, unless the top-left cell is empty
///   or non-numeric, in which case it is `n - 1` labelled rows under a header
///   (the layout [`crate::graph::Adjacency::write_csv`] produces).
/// * `n + 1` rows of `n` cells: header row only.
/// * `n` rows of `n + 1` cells: row labels only.
pub fn load_score_matrix(path: &Path) -> Result<Array2<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::load(path, format!("opening CSV: {e}")))?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| Error::load_row(path, i + 1, e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    let corner_is_label = rows
        .first()
        .and_then(|r| r.first())
        .is_some_and(|c| c.is_empty() || c.parse::<f64>().is_err());
    let (header, labelled) = if n_cols == n_rows {
        (corner_is_label, corner_is_label)
    } else if n_rows == n_cols + 1 {
        (true, false)
    } else if n_cols == n_rows + 1 {
        (false, true)
    } else {
        return Err(Error::load(
            path,
            format!("{n_rows} rows of {n_cols} cells cannot hold a square score matrix"),
        ));
    };
    let first_data = usize::from(header);
    let skip = usize::from(labelled);

    let parsed = rows[first_data..]
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.iter()
                .skip(skip)
                .map(|c| {
                    c.parse::<f64>().map_err(|_| {
                        Error::load_row(path, first_data + i + 1, format!("'{c}' is not a score"))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    array_from_rows(parsed).map_err(|e| Error::load(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_tmp(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    fn nodes(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn csv_readings_mark_missing_cells() {
        let f = write_tmp(
            ".csv",
            "time,a,b\n2024-01-01 00:00:00,1.5,\n2024-01-01 00:05:00,NaN,2\n",
        );
        let raw = load_readings(f.path()).unwrap();
        assert_eq!(raw.nodes, nodes(&["a", "b"]));
        assert_eq!(raw.rows, vec![vec![Some(1.5), None], vec![None, Some(2.0)]]);
    }

    #[test]
    fn bad_timestamp_reports_row() {
        let f = write_tmp(".csv", "time,a\n2024-01-01 00:00:00,1\nnot-a-date,2\n");
        match load_readings(f.path()).unwrap_err() {
            Error::DataLoad { row, path, .. } => {
                assert_eq!(row, Some(2));
                assert_eq!(path, f.path());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_numeric_cell_is_rejected() {
        let f = write_tmp(".csv", "time,a\n2024-01-01 00:00:00,fast\n");
        assert!(matches!(
            load_readings(f.path()),
            Err(Error::DataLoad { row: Some(1), .. })
        ));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let f = write_tmp(".xlsx", "whatever");
        assert!(matches!(load_readings(f.path()), Err(Error::DataLoad { row: None, .. })));
    }

    #[test]
    fn distances_are_symmetric_and_sparse() {
        let f = write_tmp(
            ".csv",
            "node_a,node_b,distance\na,b,1.0\nb,c,2.5\nc,b,2.5\n",
        );
        let d = load_distances(f.path(), &nodes(&["a", "b", "c"])).unwrap();
        assert_eq!(d.get(0, 1), Some(1.0));
        assert_eq!(d.get(1, 0), Some(1.0));
        assert_eq!(d.get(2, 1), Some(2.5));
        assert_eq!(d.get(0, 2), None);
        assert!(d.is_symmetric());
    }

    #[test]
    fn legacy_column_names_with_index_column() {
        let f = write_tmp(
            ".csv",
            ",detector_1,detector_2,dist\n0,a,b,0.0\n",
        );
        let d = load_distances(f.path(), &nodes(&["a", "b"])).unwrap();
        assert_eq!(d.get(0, 1), Some(0.0));
    }

    #[test]
    fn conflicting_duplicate_pair_is_rejected() {
        let f = write_tmp(".csv", "node_a,node_b,distance\na,b,1.0\nb,a,3.0\n");
        match load_distances(f.path(), &nodes(&["a", "b"])).unwrap_err() {
            Error::DataLoad { row, reason, .. } => {
                assert_eq!(row, Some(2));
                assert!(reason.contains("row 1"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_node_is_rejected() {
        let f = write_tmp(".csv", "node_a,node_b,distance\na,z,1.0\n");
        assert!(matches!(
            load_distances(f.path(), &nodes(&["a", "b"])),
            Err(Error::DataLoad { row: Some(1), .. })
        ));
    }

    #[test]
    fn score_matrix_with_headers_and_labels() {
        let f = write_tmp(".csv", ",a,b\na,0.0,0.4\nb,0.6,0.0\n");
        let m = load_score_matrix(f.path()).unwrap();
        assert_eq!(m.dim(), (2, 2));
        assert_eq!(m[[1, 0]], 0.6);

        let f = write_tmp(".csv", "0.0,1.0\n1.0,0.0\n");
        assert_eq!(load_score_matrix(f.path()).unwrap().dim(), (2, 2));

        let f = write_tmp(".csv", "a,b\n0.0,0.4\n0.6,0.0\n");
        assert_eq!(load_score_matrix(f.path()).unwrap()[[0, 1]], 0.4);

        let f = write_tmp(".csv", "a,0.0,0.4\nb,0.6,0.0\n");
        assert_eq!(load_score_matrix(f.path()).unwrap()[[1, 0]], 0.6);

        let f = write_tmp(".csv", "0.0,0.4,0.1\n");
        assert!(matches!(load_score_matrix(f.path()), Err(Error::DataLoad { .. })));
    }

    #[test]
    fn adjacency_csv_with_numeric_ids_reads_back() {
        use crate::graph::Adjacency;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adjacency.csv");
        let adj = Adjacency::from_weights(ndarray::array![[0.0, 0.25], [0.25, 0.0]]).unwrap();
        adj.write_csv(&path, &nodes(&["1000", "1001"])).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            ",1000,1001\n1000,0,0.25\n1001,0.25,0\n"
        );

        let scores = load_score_matrix(&path).unwrap();
        assert_eq!(&scores, adj.weights());
    }
}
