use std::fs;
use std::path::Path;

use calamine::{open_workbook, Reader, Xlsx};
use log::{error, info, warn};

/// Label of the single column in a batch terms file.
pub const HEADER_LABEL: &str = "Business Types";

/// Loads batch search terms from a CSV or Excel file. Problems are logged and
/// yield an empty list, like an empty file would.
pub fn load_terms<P: AsRef<Path>>(filename: P) -> Vec<String> {
    let path_ref = filename.as_ref();

    if !path_ref.exists() {
        error!("Input file {:?} does not exist.", path_ref);
        return Vec::new();
    }

    let is_excel = path_ref
        .extension()
        .map_or(false, |ext| ext == "xlsx" || ext == "xls");

    if is_excel {
        return load_excel(path_ref);
    }

    match fs::read_to_string(path_ref) {
        Ok(text) => {
            let terms = parse_terms(&text);
            info!("Loaded {} terms from CSV {:?}", terms.len(), path_ref);
            terms
        }
        Err(e) => {
            error!("Could not open CSV file: {}", e);
            Vec::new()
        }
    }
}

/// One term per line after the header line, first column only. Blank lines
/// and repeated header lines are skipped; order is kept.
pub fn parse_terms(text: &str) -> Vec<String> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut terms = Vec::new();
    for result in rdr.records() {
        match result {
            Ok(record) => {
                if let Some(term) = accept(record.get(0).unwrap_or("")) {
                    terms.push(term);
                }
            }
            Err(e) => warn!("Skipping unreadable line: {}", e),
        }
    }
    terms
}

fn accept(cell: &str) -> Option<String> {
    let term = cell.trim();
    if term.is_empty() || term == HEADER_LABEL {
        None
    } else {
        Some(term.to_string())
    }
}

fn load_excel(path: &Path) -> Vec<String> {
    let mut terms = Vec::new();
    let mut excel: Xlsx<_> = match open_workbook(path) {
        Ok(wb) => wb,
        Err(e) => {
            error!("Could not open Excel file: {}", e);
            return terms;
        }
    };

    let worksheets = excel.worksheets();
    if let Some((_name, range)) = worksheets.first() {
        // First row is the header.
        for row in range.rows().skip(1) {
            let cell = row.first().map(|c| c.to_string()).unwrap_or_default();
            if let Some(term) = accept(&cell) {
                terms.push(term);
            }
        }
    }

    info!("Loaded {} terms from Excel {:?}", terms.len(), path);
    terms
}
