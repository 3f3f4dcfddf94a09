//! File formats
//!
//! Plain-text formats for everything parties exchange or inspect by hand
//! (reference sets, profiles, q-gram sets, bit strings) plus a bincode form
//! for bulk encodings.

use crate::error::{Result, RseError};
use crate::frequency::FrequencyProfile;
use crate::qgram::{QGramMode, QGramSet};
use crate::reference::{ReferenceSet, ReferenceValue};
use crate::vector::EncodedVector;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// An identified record's q-grams.
pub type IdQGrams = (String, QGramSet);

/// An identified record's encoding.
pub type IdEncoding = (String, EncodedVector);

fn origin(path: &Path) -> String {
    path.display().to_string()
}

fn lines(path: &Path) -> Result<impl Iterator<Item = std::io::Result<String>>> {
    Ok(BufReader::new(File::open(path)?).lines())
}

/// Write one reference value per line, in set order.
pub fn write_reference_set(set: &ReferenceSet, path: impl AsRef<Path>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for v in set {
        writeln!(out, "{v}")?;
    }
    out.flush()?;
    Ok(())
}

/// Read a reference set written by [`write_reference_set`].
///
/// Trailing blank lines are ignored; a blank line between values is an
/// error, as are all reference set invariant violations.
pub fn read_reference_set(path: impl AsRef<Path>) -> Result<ReferenceSet> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let body = text.trim_end_matches(['\n', '\r']);
    let mut values = Vec::new();
    for (i, line) in body.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return Err(RseError::parse(origin(path), i + 1, "blank line inside reference set"));
        }
        values.push(ReferenceValue::new(line));
    }
    let set = ReferenceSet::from_values(values)?;
    debug!(path = %path.display(), m = set.len(), k = set.value_len(), "read reference set");
    Ok(set)
}

/// Write `qgram,count` lines, most frequent first.
pub fn write_profile(profile: &FrequencyProfile, path: impl AsRef<Path>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# qgram,count")?;
    for (g, c) in profile.top(profile.len()) {
        writeln!(out, "{g},{c}")?;
    }
    out.flush()?;
    Ok(())
}

/// Read `qgram,count` lines; `#` starts a comment line. Repeated q-grams
/// accumulate.
pub fn read_profile(path: impl AsRef<Path>) -> Result<FrequencyProfile> {
    let path = path.as_ref();
    let mut profile = FrequencyProfile::new();
    for (i, line) in lines(path)?.enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // q-grams may themselves contain commas, so split on the last one
        let (gram, count) = line
            .rsplit_once(',')
            .ok_or_else(|| RseError::parse(origin(path), i + 1, "expected qgram,count"))?;
        let count: f64 = count
            .trim()
            .parse()
            .map_err(|_| RseError::parse(origin(path), i + 1, format!("invalid count {count:?}")))?;
        if !count.is_finite() || count < 0.0 {
            return Err(RseError::parse(origin(path), i + 1, "count must be a non-negative number"));
        }
        if gram.is_empty() {
            return Err(RseError::parse(origin(path), i + 1, "empty q-gram"));
        }
        profile.add(gram, count);
    }
    debug!(path = %path.display(), qgrams = profile.len(), "read frequency profile");
    Ok(profile)
}

/// How to turn rows of a delimited file into q-gram sets.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordLayout {
    pub id_column: usize,
    /// Sensitive attribute columns, zero-based
    pub columns: Vec<usize>,
    pub delimiter: char,
    pub q: usize,
    pub mode: QGramMode,
}

impl RecordLayout {
    pub fn new(columns: Vec<usize>, q: usize) -> Self {
        RecordLayout {
            id_column: 0,
            columns,
            delimiter: ',',
            q,
            mode: QGramMode::Set,
        }
    }
}

/// Records read from a delimited file.
#[derive(Clone, Debug, Default)]
pub struct LoadedRecords {
    /// Header names of the sensitive columns
    pub headers: Vec<String>,
    /// Records in order of first appearance of each id
    pub records: Vec<IdQGrams>,
    /// Rows with a blank sensitive attribute or no q-grams
    pub skipped: usize,
    /// Rows whose id had already been seen; the later row wins
    pub duplicates: usize,
}

impl LoadedRecords {
    pub fn qgram_sets(&self) -> Vec<QGramSet> {
        self.records.iter().map(|(_, qs)| qs.clone()).collect()
    }

    /// Number of ids present in both collections.
    pub fn common_ids(&self, other: &LoadedRecords) -> usize {
        let mine: std::collections::HashSet<&str> = self.records.iter().map(|(id, _)| id.as_str()).collect();
        other.records.iter().filter(|(id, _)| mine.contains(id.as_str())).count()
    }
}

/// Split one delimited line; fields may be wrapped in double quotes, with
/// `""` inside quotes standing for a literal quote.
fn split_fields(line: &str, delimiter: char) -> std::result::Result<Vec<String>, &'static str> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    quoted = false;
                }
            } else {
                field.push(c);
            }
        } else if c == '"' && field.is_empty() {
            quoted = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(c);
        }
    }
    if quoted {
        return Err("unterminated quoted field");
    }
    fields.push(field);
    Ok(fields)
}

/// Read a delimited record file with a header row.
pub fn read_records(path: impl AsRef<Path>, layout: &RecordLayout) -> Result<LoadedRecords> {
    let path = path.as_ref();
    if layout.columns.is_empty() {
        return Err(RseError::config("at least one sensitive column is required"));
    }
    if layout.q == 0 {
        return Err(RseError::config("q must be positive"));
    }
    let widest = layout.columns.iter().copied().chain([layout.id_column]).max().unwrap_or(0);

    let mut loaded = LoadedRecords::default();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut rows = lines(path)?.enumerate();

    let Some((_, header)) = rows.next() else {
        return Err(RseError::parse(origin(path), 1, "missing header row"));
    };
    let header = split_fields(header?.trim_end_matches('\r'), layout.delimiter)
        .map_err(|e| RseError::parse(origin(path), 1, e))?;
    if header.len() <= widest {
        return Err(RseError::parse(
            origin(path),
            1,
            format!("header has {} columns, column {widest} requested", header.len()),
        ));
    }
    loaded.headers = layout.columns.iter().map(|&c| header[c].trim().to_owned()).collect();

    for (i, row) in rows {
        let row = row?;
        let row = row.trim_end_matches('\r');
        if row.trim().is_empty() {
            continue;
        }
        let fields = split_fields(row, layout.delimiter).map_err(|e| RseError::parse(origin(path), i + 1, e))?;
        if fields.len() <= widest {
            return Err(RseError::parse(
                origin(path),
                i + 1,
                format!("row has {} fields, column {widest} requested", fields.len()),
            ));
        }
        let id = fields[layout.id_column].trim().to_owned();
        let values: Vec<&str> = layout.columns.iter().map(|&c| fields[c].as_str()).collect();
        let qgrams = match QGramSet::from_attributes(&values, layout.q, layout.mode) {
            Some(qs) if !qs.is_empty() => qs,
            _ => {
                loaded.skipped += 1;
                continue;
            }
        };
        match index.get(&id) {
            Some(&at) => {
                loaded.duplicates += 1;
                debug!(id = %id, line = i + 1, "duplicate record id, keeping later row");
                loaded.records[at].1 = qgrams;
            }
            None => {
                index.insert(id.clone(), loaded.records.len());
                loaded.records.push((id, qgrams));
            }
        }
    }

    if loaded.skipped > 0 || loaded.duplicates > 0 {
        warn!(
            path = %path.display(),
            skipped = loaded.skipped,
            duplicates = loaded.duplicates,
            "some rows were not encoded as separate records"
        );
    }
    info!(path = %path.display(), records = loaded.records.len(), "read record file");
    Ok(loaded)
}

/// Write `id<TAB>qgram qgram ...` lines; multiset q-grams are repeated.
pub fn write_qgram_sets(records: &[IdQGrams], path: impl AsRef<Path>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (id, qs) in records {
        let grams: Vec<&str> = qs
            .counts()
            .flat_map(|(g, c)| std::iter::repeat(g).take(c as usize))
            .collect();
        writeln!(out, "{id}\t{}", grams.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

/// Read a q-gram set file; repeated q-grams on a line count as repeats in
/// [`QGramMode::Multiset`].
pub fn read_qgram_sets(path: impl AsRef<Path>, mode: QGramMode) -> Result<Vec<IdQGrams>> {
    let path = path.as_ref();
    let mut records = Vec::new();
    for (i, line) in lines(path)?.enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let (id, grams) = line
            .split_once('\t')
            .ok_or_else(|| RseError::parse(origin(path), i + 1, "expected id<TAB>q-grams"))?;
        records.push((id.to_owned(), QGramSet::from_grams(grams.split_whitespace(), mode)));
    }
    Ok(records)
}

/// Write `id,0101...` lines in input order.
pub fn write_encodings_text(encodings: &[IdEncoding], path: impl AsRef<Path>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (id, bits) in encodings {
        writeln!(out, "{id},{bits}")?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_encodings_text(path: impl AsRef<Path>) -> Result<Vec<IdEncoding>> {
    let path = path.as_ref();
    let mut encodings = Vec::new();
    for (i, line) in lines(path)?.enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (id, bits) = line
            .rsplit_once(',')
            .ok_or_else(|| RseError::parse(origin(path), i + 1, "expected id,bits"))?;
        let bits = EncodedVector::from_bit_string(bits)
            .map_err(|e| RseError::parse(origin(path), i + 1, e.to_string()))?;
        encodings.push((id.to_owned(), bits));
    }
    Ok(encodings)
}

pub fn write_encodings_bincode(encodings: &[IdEncoding], path: impl AsRef<Path>) -> Result<()> {
    let out = BufWriter::new(File::create(path)?);
    bincode::serialize_into(out, encodings)?;
    Ok(())
}

pub fn read_encodings_bincode(path: impl AsRef<Path>) -> Result<Vec<IdEncoding>> {
    let data = fs::read(path)?;
    Ok(bincode::deserialize(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_quotes() {
        assert_eq!(split_fields("a,b,,c", ',').unwrap(), vec!["a", "b", "", "c"]);
        assert_eq!(
            split_fields(r#"1,"Smith, John","say ""hi""""#, ',').unwrap(),
            vec!["1", "Smith, John", r#"say "hi""#]
        );
        assert_eq!(split_fields("x|y", '|').unwrap(), vec!["x", "y"]);
        assert!(split_fields(r#"1,"open"#, ',').is_err());
    }
}
