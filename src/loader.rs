use crate::types::{
    is_important_field, GrantRecord, OtherField, RawRow, IMPORTANT_FIELDS, UNSPECIFIED, UNTITLED,
};
use crate::util::{extract_year, parse_coordinate, parse_currency};
use csv::ReaderBuilder;
use std::error::Error;
use std::io::Read;
use std::path::Path;

/// Diagnostics from one batch load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub total_rows: usize,
    pub kept_records: usize,
    pub skipped_missing_school: usize,
}

/// Load the export at `path` and normalize it into a batch of records.
pub fn load_batch(path: impl AsRef<Path>) -> Result<(Vec<GrantRecord>, LoadReport), Box<dyn Error>> {
    let rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    load_from_reader(rdr)
}

/// Reader-generic load so tests can feed in-memory CSV text.
///
/// Any row-level parse error fails the whole batch with one newline-joined
/// message; no partially-normalized data is ever returned.
pub fn load_from_reader<R: Read>(
    mut rdr: csv::Reader<R>,
) -> Result<(Vec<GrantRecord>, LoadReport), Box<dyn Error>> {
    let headers = rdr.headers()?.clone();
    let mut rows: Vec<RawRow> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(e.to_string());
                continue;
            }
        };
        let mut row = RawRow::new();
        for (i, key) in headers.iter().enumerate() {
            // Short rows read as empty cells for the missing columns.
            row.push(key, record.get(i).unwrap_or(""));
        }
        // Rows whose cells are all blank are separators, not data.
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }

    if !errors.is_empty() {
        return Err(errors.join("\n").into());
    }

    let total_rows = rows.len();
    let (records, skipped_missing_school) = normalize_batch(&rows);
    let report = LoadReport {
        total_rows,
        kept_records: records.len(),
        skipped_missing_school,
    };
    Ok((records, report))
}

/// Normalize a batch, dropping rows whose `School` cell is blank after
/// trimming. The check runs on the pre-fallback cell; positional indices
/// (and therefore record ids) are assigned before the drop so ids stay
/// stable relative to the source sequence.
pub fn normalize_batch(rows: &[RawRow]) -> (Vec<GrantRecord>, usize) {
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for (index, row) in rows.iter().enumerate() {
        let school_blank = row.get("School").map_or(true, |v| v.trim().is_empty());
        if school_blank {
            skipped += 1;
            continue;
        }
        records.push(normalize_row(row, index));
    }
    (records, skipped)
}

fn lookup<'a>(fields: &'a [(&'static str, String)], field: &str) -> &'a str {
    fields
        .iter()
        .find(|(k, _)| *k == field)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// Normalize one raw row into a canonical record.
///
/// Total: absent or malformed cells degrade to fallback values rather than
/// failing. `index` is the row's ordinal position in the source sequence.
pub fn normalize_row(row: &RawRow, index: usize) -> GrantRecord {
    let important_fields: Vec<(&'static str, String)> = IMPORTANT_FIELDS
        .iter()
        .map(|field| {
            (
                *field,
                row.get(field).unwrap_or("").trim().to_string(),
            )
        })
        .collect();

    let other_fields: Vec<OtherField> = row
        .iter()
        .filter(|(key, _)| !is_important_field(key))
        .filter_map(|(key, value)| {
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            Some(OtherField {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect();

    let grant_id_cell = lookup(&important_fields, "Grant ID");
    let id = format!(
        "{}-{}",
        if grant_id_cell.is_empty() {
            "record"
        } else {
            grant_id_cell
        },
        index
    );

    let date_of_letter = lookup(&important_fields, "Date of Letter ").to_string();
    let date_range = lookup(&important_fields, "Date range of grant").to_string();
    let date_of_application = lookup(&important_fields, "Date of application").to_string();

    let amount_raw = lookup(&important_fields, "Amount").to_string();
    let amount_requested_raw = lookup(&important_fields, "Amount Requested").to_string();
    let full_disbursed_raw = lookup(&important_fields, "Full grant amount disbursed").to_string();
    let amount = parse_currency(&amount_raw);
    let amount_requested = parse_currency(&amount_requested_raw);
    let full_grant_amount_disbursed = parse_currency(&full_disbursed_raw);

    // The explicit `Year` cell wins over derived extraction for the value;
    // for the label its raw text wins even when it fails to parse.
    let year_cell = lookup(&important_fields, "Year");
    let explicit_year: Option<i32> = year_cell.parse().ok();
    let year_value = explicit_year.or_else(|| {
        let date_text = if date_of_letter.is_empty() {
            date_range.as_str()
        } else {
            date_of_letter.as_str()
        };
        extract_year(date_text)
    });
    let year_label = if !year_cell.is_empty() {
        year_cell.to_string()
    } else {
        match year_value {
            Some(year) => year.to_string(),
            None => UNSPECIFIED.to_string(),
        }
    };

    let latitude = parse_coordinate(row.get("Latitude"));
    let longitude = parse_coordinate(row.get("Longitude"));

    GrantRecord {
        id,
        source_file: non_empty_or(lookup(&important_fields, "Source_File"), UNSPECIFIED),
        school: non_empty_or(lookup(&important_fields, "School"), UNSPECIFIED),
        grant_id: non_empty_or(grant_id_cell, UNSPECIFIED),
        title: non_empty_or(lookup(&important_fields, "Title of Project"), UNTITLED),
        date_of_letter,
        date_range,
        date_of_application,
        year_label,
        year_value,
        amount,
        amount_raw,
        amount_requested,
        amount_requested_raw,
        full_grant_amount_disbursed,
        full_grant_amount_disbursed_raw: full_disbursed_raw,
        purpose: non_empty_or(lookup(&important_fields, "Purpose of Grant"), UNSPECIFIED),
        latitude,
        longitude,
        important_fields,
        other_fields,
        raw: row.clone(),
    }
}
