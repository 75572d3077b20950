use serde::Serialize;
use tabled::Tabled;

use crate::util::{format_currency, format_date};

/// The twelve column names the pipeline understands semantically. Anything
/// else in a row is "other" data and is preserved verbatim.
///
/// Keys are matched exactly as they appear in the dossier headers --
/// `"Date of Letter "` really does carry a trailing space.
pub const IMPORTANT_FIELDS: [&str; 12] = [
    "Source_File",
    "School",
    "Grant ID",
    "Title of Project",
    "Date of Letter ",
    "Date range of grant",
    "Date of application",
    "Year",
    "Amount",
    "Amount Requested",
    "Full grant amount disbursed",
    "Purpose of Grant",
];

/// Fallback for blank canonical fields.
pub const UNSPECIFIED: &str = "Unspecified";
/// Fallback for a blank project title.
pub const UNTITLED: &str = "Untitled Project";

pub fn is_important_field(key: &str) -> bool {
    IMPORTANT_FIELDS.contains(&key)
}

/// One source row: column name/value pairs in header order. The per-dossier
/// exports disagree on their column sets, so nothing beyond the header is
/// assumed about the shape.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    columns: Vec<(String, String)>,
}

impl RawRow {
    pub fn new() -> Self {
        RawRow { columns: Vec::new() }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.columns.push((key.into(), value.into()));
    }

    /// Exact-key lookup; keys are never trimmed.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Columns in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_blank(&self) -> bool {
        self.columns.iter().all(|(_, v)| v.trim().is_empty())
    }
}

/// A non-canonical column kept on the record, trimmed, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherField {
    pub key: String,
    pub value: String,
}

/// Canonical grant record, immutable once constructed.
#[derive(Debug, Clone)]
pub struct GrantRecord {
    /// Grant ID plus positional index; unique within a batch even when
    /// grant IDs collide or are absent.
    pub id: String,
    pub source_file: String,
    pub school: String,
    pub grant_id: String,
    pub title: String,
    /// Date texts stay raw; display formatting happens at render time.
    pub date_of_letter: String,
    pub date_range: String,
    pub date_of_application: String,
    /// The explicit `Year` cell verbatim when present, else the derived
    /// year, else `"Unspecified"`. A non-numeric cell still becomes the
    /// label even though it cannot become the value.
    pub year_label: String,
    pub year_value: Option<i32>,
    pub amount: Option<f64>,
    pub amount_raw: String,
    pub amount_requested: Option<f64>,
    pub amount_requested_raw: String,
    pub full_grant_amount_disbursed: Option<f64>,
    pub full_grant_amount_disbursed_raw: String,
    pub purpose: String,
    /// Consumed by the geographic view; outside the twelve canonical fields.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Trimmed text of all twelve canonical columns, in schema order.
    pub important_fields: Vec<(&'static str, String)>,
    pub other_fields: Vec<OtherField>,
    /// Original row, untouched, for traceability and search.
    pub raw: RawRow,
}

impl GrantRecord {
    /// Trimmed text of one of the twelve canonical columns.
    pub fn important(&self, field: &str) -> &str {
        self.important_fields
            .iter()
            .find(|(k, _)| *k == field)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// Space-joined text the free-text search runs against. Built live per
    /// call, not precomputed.
    pub fn search_haystack(&self) -> String {
        let mut parts: Vec<String> = vec![
            self.school.clone(),
            self.title.clone(),
            self.purpose.clone(),
            self.grant_id.clone(),
            self.source_file.clone(),
            self.date_range.clone(),
            self.date_of_application.clone(),
            self.date_of_letter.clone(),
        ];
        parts.extend(
            self.other_fields
                .iter()
                .map(|field| format!("{} {}", field.key, field.value)),
        );
        parts.join(" ")
    }
}

/// Portfolio-wide scalars, recomputed on demand from a record sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantMetrics {
    pub total_grants: usize,
    pub total_awarded: f64,
    pub total_requested: f64,
    pub total_schools: usize,
    pub total_sources: usize,
    /// Awarded total over grant count; 0 when the batch is empty.
    pub average_grant: f64,
    /// Awarded total over requested total; `None` when nothing was requested.
    pub request_to_award_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearFunding {
    pub year: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFunding {
    pub source: String,
    pub total_amount: f64,
    pub grants: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurposeSummary {
    pub purpose: String,
    pub count: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchoolSummary {
    pub school: String,
    pub count: usize,
    pub amount: f64,
}

/// The four independent groupings over one record sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregations {
    pub amount_by_year: Vec<YearFunding>,
    pub amount_by_source: Vec<SourceFunding>,
    pub top_purposes: Vec<PurposeSummary>,
    pub top_schools: Vec<SchoolSummary>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct YearFundingRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: String,
    #[serde(rename = "TotalAmount")]
    #[tabled(rename = "TotalAmount")]
    pub total_amount: String,
}

impl From<&YearFunding> for YearFundingRow {
    fn from(entry: &YearFunding) -> Self {
        YearFundingRow {
            year: entry.year.clone(),
            total_amount: format_currency(Some(entry.total_amount)),
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SourceFundingRow {
    #[serde(rename = "SourceFile")]
    #[tabled(rename = "SourceFile")]
    pub source: String,
    #[serde(rename = "TotalAmount")]
    #[tabled(rename = "TotalAmount")]
    pub total_amount: String,
    #[serde(rename = "Grants")]
    #[tabled(rename = "Grants")]
    pub grants: usize,
}

impl From<&SourceFunding> for SourceFundingRow {
    fn from(entry: &SourceFunding) -> Self {
        SourceFundingRow {
            source: entry.source.clone(),
            total_amount: format_currency(Some(entry.total_amount)),
            grants: entry.grants,
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct PurposeRow {
    #[serde(rename = "Purpose")]
    #[tabled(rename = "Purpose")]
    pub purpose: String,
    #[serde(rename = "Grants")]
    #[tabled(rename = "Grants")]
    pub grants: usize,
    #[serde(rename = "TotalAmount")]
    #[tabled(rename = "TotalAmount")]
    pub total_amount: String,
}

impl From<&PurposeSummary> for PurposeRow {
    fn from(entry: &PurposeSummary) -> Self {
        PurposeRow {
            purpose: entry.purpose.clone(),
            grants: entry.count,
            total_amount: format_currency(Some(entry.amount)),
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SchoolRow {
    #[serde(rename = "School")]
    #[tabled(rename = "School")]
    pub school: String,
    #[serde(rename = "Grants")]
    #[tabled(rename = "Grants")]
    pub grants: usize,
    #[serde(rename = "TotalAmount")]
    #[tabled(rename = "TotalAmount")]
    pub total_amount: String,
}

impl From<&SchoolSummary> for SchoolRow {
    fn from(entry: &SchoolSummary) -> Self {
        SchoolRow {
            school: entry.school.clone(),
            grants: entry.count,
            total_amount: format_currency(Some(entry.amount)),
        }
    }
}

/// Grant-level detail view: formatted dates and currency, raw text elsewhere.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct GrantDetailRow {
    #[serde(rename = "SourceFile")]
    #[tabled(rename = "SourceFile")]
    pub source_file: String,
    #[serde(rename = "School")]
    #[tabled(rename = "School")]
    pub school: String,
    #[serde(rename = "GrantID")]
    #[tabled(rename = "GrantID")]
    pub grant_id: String,
    #[serde(rename = "Title")]
    #[tabled(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: String,
    #[serde(rename = "DateOfLetter")]
    #[tabled(rename = "DateOfLetter")]
    pub date_of_letter: String,
    #[serde(rename = "DateOfApplication")]
    #[tabled(rename = "DateOfApplication")]
    pub date_of_application: String,
    #[serde(rename = "GrantPeriod")]
    #[tabled(rename = "GrantPeriod")]
    pub grant_period: String,
    #[serde(rename = "AmountApproved")]
    #[tabled(rename = "AmountApproved")]
    pub amount_approved: String,
    #[serde(rename = "AmountRequested")]
    #[tabled(rename = "AmountRequested")]
    pub amount_requested: String,
    #[serde(rename = "Purpose")]
    #[tabled(rename = "Purpose")]
    pub purpose: String,
}

impl From<&GrantRecord> for GrantDetailRow {
    fn from(record: &GrantRecord) -> Self {
        GrantDetailRow {
            source_file: record.source_file.clone(),
            school: record.school.clone(),
            grant_id: record.grant_id.clone(),
            title: record.title.clone(),
            year: record.year_label.clone(),
            date_of_letter: format_date(&record.date_of_letter),
            date_of_application: format_date(&record.date_of_application),
            grant_period: format_date(&record.date_range),
            amount_approved: format_currency(record.amount),
            amount_requested: format_currency(record.amount_requested),
            purpose: record.purpose.clone(),
        }
    }
}
