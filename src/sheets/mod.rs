//! Spreadsheet tables: CSV parsing, column normalization, cell helpers and
//! per-sheet manifests.

pub mod loader;
pub mod retry;
pub mod source;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub use loader::{load_workbook, Workbook};
pub use source::{DirSource, GvizSource, SheetSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SheetName {
    Timbulan,
    Program,
    Ketidaksesuaian,
    SurveiOnline,
    SurveiOffline,
    Cctv,
    JmlCctv,
    KoordinatUtm,
}

impl SheetName {
    pub const ALL: [SheetName; 8] = [
        SheetName::Timbulan,
        SheetName::Program,
        SheetName::Ketidaksesuaian,
        SheetName::SurveiOnline,
        SheetName::SurveiOffline,
        SheetName::Cctv,
        SheetName::JmlCctv,
        SheetName::KoordinatUtm,
    ];

    /// Tab name as it appears in the spreadsheet.
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetName::Timbulan => "Timbulan",
            SheetName::Program => "Program",
            SheetName::Ketidaksesuaian => "Ketidaksesuaian",
            SheetName::SurveiOnline => "Survei_Online",
            SheetName::SurveiOffline => "Survei_Offline",
            SheetName::Cctv => "CCTV",
            SheetName::JmlCctv => "Jml_CCTV",
            SheetName::KoordinatUtm => "Koordinat_UTM",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Columns whose absence disables a whole dashboard section.
    pub fn expected_columns(&self) -> &'static [&'static str] {
        match self {
            SheetName::Timbulan => &["site", "perusahaan", "timbulan", "man_power", "jenis_timbulan", "jenis_sampah"],
            SheetName::Program => &["site", "perusahaan", "nama_program", "kategori", "total_calc"],
            SheetName::Ketidaksesuaian => &["site", "perusahaan", "status_temuan", "tanggallapor", "kategori_subketidaksesuaian"],
            SheetName::SurveiOnline | SheetName::SurveiOffline => &["perusahaan_area_kerja_tambang", "site_/_lokasi_kerja"],
            SheetName::Cctv => &["perusahaan", "site", "easting", "northing"],
            SheetName::JmlCctv => &["site", "perusahaan", "coverage_24jam", "coverage_non_24jam", "tidak_tercover", "total_cctv"],
            SheetName::KoordinatUtm => &["site", "company", "x", "y"],
        }
    }
}

/// `"Man Power "` -> `"man_power"`.
pub fn norm_col(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Normalizes a header row; repeated names get `.1`, `.2`, ... suffixes.
pub fn norm_cols(headers: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .iter()
        .map(|h| {
            let base = norm_col(h);
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 { base.clone() } else { format!("{}.{}", base, count) };
            *count += 1;
            name
        })
        .collect()
}

/// Numeric cell parse accepting a decimal comma. Empty or invalid -> None.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(' ', "").replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Capitalizes the first letter of every alphabetic run, lowercases the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
            start = true;
        }
    }
    out
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Borrowed view of one table row with name-based access.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    values: &'a [String],
}

impl<'a> Row<'a> {
    /// Trimmed, non-empty cell value.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.col(column)?;
        self.values
            .get(idx)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn text(&self, column: &str) -> String {
        self.get(column).unwrap_or("").to_string()
    }

    pub fn num(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(parse_number)
    }

    pub fn values(&self) -> &'a [String] {
        self.values
    }
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    /// Parses a CSV export, normalizing headers. Short rows are padded.
    pub fn from_csv_str(body: &str) -> Result<Self> {
        Ok(parse_csv(body)?.0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn col(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.col(name).is_some()
    }

    pub fn has_all(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.has(n))
    }

    pub fn missing<'n>(&self, names: &[&'n str]) -> Vec<&'n str> {
        names.iter().copied().filter(|n| !self.has(n)).collect()
    }

    /// First column in `candidates` that exists.
    pub fn first_of<'n>(&self, candidates: &[&'n str]) -> Option<&'n str> {
        candidates.iter().copied().find(|c| self.has(c))
    }

    pub fn find_column(&self, pred: impl Fn(&str) -> bool) -> Option<&str> {
        self.columns.iter().map(|c| c.as_str()).find(|c| pred(c))
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row { table: self, values })
    }

    pub fn push_row(&mut self, mut values: Vec<String>) {
        values.resize(self.columns.len(), String::new());
        self.rows.push(values);
    }

    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Keeps rows matching `pred`.
    pub fn filter(&self, pred: impl Fn(&Row<'_>) -> bool) -> Table {
        let rows = self
            .iter()
            .filter(|r| pred(r))
            .map(|r| r.values.to_vec())
            .collect();
        Table { columns: self.columns.clone(), rows }
    }

    /// Stacks two tables over the union of their columns.
    pub fn concat(a: &Table, b: &Table) -> Table {
        let mut columns = a.columns.clone();
        for c in &b.columns {
            if !columns.contains(c) {
                columns.push(c.clone());
            }
        }
        let mut out = Table::new(columns);
        for src in [a, b] {
            for row in src.iter() {
                let values = out
                    .columns
                    .iter()
                    .map(|c| row.get(c).unwrap_or("").to_string())
                    .collect();
                out.rows.push(values);
            }
        }
        out
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        let bytes = wtr.into_inner().context("flush csv writer")?;
        Ok(String::from_utf8(bytes)?)
    }
}

fn parse_csv(body: &str) -> Result<(Table, usize)> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(body.as_bytes());
    let headers: Vec<String> = rdr
        .headers()
        .context("read csv header")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let mut table = Table::new(norm_cols(&headers));
    let mut ragged = 0usize;
    for record in rdr.records() {
        let record = record.context("read csv record")?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        if record.len() != table.columns.len() {
            ragged += 1;
        }
        let mut values: Vec<String> = record.iter().map(|v| v.to_string()).collect();
        values.truncate(table.columns.len());
        table.push_row(values);
    }
    Ok((table, ragged))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetManifest {
    pub sheet: String,
    pub source: String,
    pub hash_sha256: String,
    pub row_count: u64,
    pub ragged_rows: u64,
    pub columns: Vec<String>,
    pub missing_columns: Vec<String>,
    pub warnings: Vec<String>,
    pub generated_at_epoch: u64,
}

/// Parses `body` and describes it. Parse failures become warnings.
pub fn analyze_sheet(sheet: SheetName, source: &str, body: &str, now_ts: u64) -> (Table, SheetManifest) {
    let mut warnings = Vec::new();
    let (table, ragged) = match parse_csv(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            warnings.push(format!("parse_error: {:#}", err));
            (Table::default(), 0)
        }
    };
    if table.is_empty() {
        warnings.push("empty_sheet".to_string());
    }
    if ragged > 0 {
        warnings.push(format!("ragged_rows: {}", ragged));
    }
    let missing: Vec<String> = table
        .missing(sheet.expected_columns())
        .into_iter()
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() && !table.columns.is_empty() {
        warnings.push(format!("missing_columns: {}", missing.join(",")));
    }

    let manifest = SheetManifest {
        sheet: sheet.as_str().to_string(),
        source: source.to_string(),
        hash_sha256: body_sha256(body),
        row_count: table.len() as u64,
        ragged_rows: ragged as u64,
        columns: table.columns.clone(),
        missing_columns: missing,
        warnings,
        generated_at_epoch: now_ts,
    };
    (table, manifest)
}

pub fn body_sha256(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_dedupes_headers() {
        let headers: Vec<String> = ["Site", " Man Power ", "Kapasitas", "Kapasitas", "Coverage 24jam"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            norm_cols(&headers),
            vec!["site", "man_power", "kapasitas", "kapasitas.1", "coverage_24jam"]
        );
    }

    #[test]
    fn parse_number_accepts_decimal_comma() {
        assert_eq!(parse_number("1,5"), Some(1.5));
        assert_eq!(parse_number(" 12 "), Some(12.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn title_case_matches_spreadsheet_labels() {
        assert_eq!(title_case(" non perilaku"), " Non Perilaku");
        assert_eq!(title_case("VALID"), "Valid");
        assert_eq!(title_case("maggot/bsf"), "Maggot/Bsf");
    }

    #[test]
    fn table_from_csv_pads_short_rows() {
        let t = Table::from_csv_str("Site,Perusahaan,Timbulan\nA,PT X,\"1,5\"\nB,PT Y\n").unwrap();
        assert_eq!(t.columns, vec!["site", "perusahaan", "timbulan"]);
        assert_eq!(t.len(), 2);
        let rows: Vec<_> = t.iter().collect();
        assert_eq!(rows[0].num("timbulan"), Some(1.5));
        assert_eq!(rows[1].get("timbulan"), None);
        assert_eq!(rows[1].get("missing_col"), None);
    }

    #[test]
    fn concat_unions_columns() {
        let a = Table::from_csv_str("a,b\n1,2\n").unwrap();
        let b = Table::from_csv_str("b,c\n3,4\n").unwrap();
        let c = Table::concat(&a, &b);
        assert_eq!(c.columns, vec!["a", "b", "c"]);
        assert_eq!(c.rows, vec![vec!["1", "2", ""], vec!["", "3", "4"]]);
    }

    #[test]
    fn manifest_flags_missing_columns_and_empty_sheets() {
        let (_, m) = analyze_sheet(SheetName::Timbulan, "test", "Site,Foo\n", 0);
        assert!(m.warnings.iter().any(|w| w == "empty_sheet"));
        assert!(m.missing_columns.contains(&"timbulan".to_string()));
        assert_eq!(m.hash_sha256.len(), 64);
    }

    #[test]
    fn sheet_name_round_trips() {
        for s in SheetName::ALL {
            assert_eq!(SheetName::parse(s.as_str()), Some(s));
        }
        assert_eq!(SheetName::parse("jml_cctv"), Some(SheetName::JmlCctv));
    }
}
