//! Taxonomy workbook parsing
//!
//! The UCS taxonomy ships as a spreadsheet; the core consumes the CSV
//! export of its two sheets. Parsing is tolerant: the header row is found
//! by known column names, matched case- and whitespace-insensitively, so
//! exports with title rows or reordered columns load unchanged.

use std::io::Read;

use super::UcsError;

/// One row of the primary sheet
#[derive(Debug, Clone)]
pub struct WorkbookRow {
    pub category: String,
    pub subcategory: String,
    pub cat_id: String,
    pub cat_short: String,
    pub category_full: String,
    pub explanation: String,
    pub synonyms: Vec<String>,
}

/// Normalize a header cell for matching: lowercase, whitespace stripped
fn normalize_header(cell: &str) -> String {
    cell.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Find a column index by any of the given normalized names
fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|cell| names.contains(&normalize_header(cell).as_str()))
}

/// Column indexes of the primary sheet, located from its header row
struct PrimaryColumns {
    category: usize,
    subcategory: usize,
    cat_id: usize,
    cat_short: Option<usize>,
    category_full: Option<usize>,
    explanation: Option<usize>,
    synonyms: Option<usize>,
}

impl PrimaryColumns {
    /// Try to interpret a record as the header row
    fn locate(record: &csv::StringRecord) -> Option<Self> {
        let category = find_column(record, &["category"])?;
        let subcategory = find_column(record, &["subcategory"])?;
        let cat_id = find_column(record, &["catid"])?;
        Some(Self {
            category,
            subcategory,
            cat_id,
            cat_short: find_column(record, &["catshort"]),
            category_full: find_column(record, &["categoryfull"]),
            explanation: find_column(record, &["explanation", "explanations"]),
            synonyms: find_column(record, &["synonyms", "synonyms-comma separated"]),
        })
    }
}

fn cell(record: &csv::StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}

fn optional_cell(record: &csv::StringRecord, idx: Option<usize>) -> &str {
    idx.map(|i| cell(record, i)).unwrap_or("")
}

/// Parse the primary sheet (Category / SubCategory / CatID / … / Synonyms)
pub fn parse_primary<R: Read>(reader: R) -> Result<Vec<WorkbookRow>, UcsError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut columns: Option<PrimaryColumns> = None;
    let mut rows = Vec::new();

    for record in csv_reader.records() {
        let record = record?;

        let Some(cols) = &columns else {
            // Still hunting for the header row; tolerate leading title rows.
            columns = PrimaryColumns::locate(&record);
            continue;
        };

        let cat_id = cell(&record, cols.cat_id);
        let category = cell(&record, cols.category);
        let subcategory = cell(&record, cols.subcategory);
        if cat_id.is_empty() || category.is_empty() || subcategory.is_empty() {
            continue;
        }

        let category_full = {
            let explicit = optional_cell(&record, cols.category_full);
            if explicit.is_empty() {
                format!("{category}-{subcategory}")
            } else {
                explicit.to_string()
            }
        };

        let synonyms = optional_cell(&record, cols.synonyms)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        rows.push(WorkbookRow {
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            cat_id: cat_id.to_string(),
            cat_short: optional_cell(&record, cols.cat_short).to_string(),
            category_full,
            explanation: optional_cell(&record, cols.explanation).to_string(),
            synonyms,
        });
    }

    if columns.is_none() {
        return Err(UcsError::MissingHeader);
    }
    if rows.is_empty() {
        return Err(UcsError::Empty);
    }
    Ok(rows)
}

/// Parse the secondary sheet of category-level explanations
pub fn parse_category_explanations<R: Read>(
    reader: R,
) -> Result<Vec<(String, String)>, UcsError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut cols: Option<(usize, usize)> = None;
    let mut out = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        let Some((cat_idx, expl_idx)) = cols else {
            let category = find_column(&record, &["category"]);
            let explanation = find_column(&record, &["explanation", "explanations"]);
            if let (Some(c), Some(e)) = (category, explanation) {
                cols = Some((c, e));
            }
            continue;
        };

        let category = cell(&record, cat_idx);
        let explanation = cell(&record, expl_idx);
        if !category.is_empty() && !explanation.is_empty() {
            out.push((category.to_string(), explanation.to_string()));
        }
    }

    Ok(out)
}
