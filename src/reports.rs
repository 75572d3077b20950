use crate::types::{
    Aggregations, GrantMetrics, GrantRecord, PurposeSummary, SchoolSummary, SourceFunding,
    YearFunding, UNSPECIFIED,
};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// The by-source grouping is truncated to this many entries after sorting.
const SOURCE_LIMIT: usize = 12;

/// Portfolio-wide scalars over one record sequence.
pub fn compute_metrics(records: &[GrantRecord]) -> GrantMetrics {
    let total_grants = records.len();
    let mut total_awarded = 0.0;
    let mut total_requested = 0.0;
    let mut schools: HashSet<&str> = HashSet::new();
    let mut sources: HashSet<&str> = HashSet::new();

    for record in records {
        if let Some(amount) = record.amount {
            total_awarded += amount;
        }
        if let Some(requested) = record.amount_requested {
            total_requested += requested;
        }
        if !record.school.is_empty() {
            schools.insert(record.school.as_str());
        }
        if !record.source_file.is_empty() {
            sources.insert(record.source_file.as_str());
        }
    }

    GrantMetrics {
        total_grants,
        total_awarded,
        total_requested,
        total_schools: schools.len(),
        total_sources: sources.len(),
        // Average divides by grant count; the ratio divides by the
        // requested total. The denominators are intentionally different.
        average_grant: if total_grants > 0 {
            total_awarded / total_grants as f64
        } else {
            0.0
        },
        request_to_award_ratio: if total_requested > 0.0 {
            Some(total_awarded / total_requested)
        } else {
            None
        },
    }
}

/// Group-by accumulator that remembers first-seen key order, so the stable
/// sorts downstream break remaining ties in source order.
struct Buckets<V> {
    order: Vec<String>,
    entries: HashMap<String, V>,
}

impl<V: Default> Buckets<V> {
    fn new() -> Self {
        Buckets {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    fn entry(&mut self, key: &str) -> &mut V {
        if !self.entries.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.entries.entry(key.to_string()).or_default()
    }

    fn into_ordered(self) -> Vec<(String, V)> {
        let Buckets { order, mut entries } = self;
        order
            .into_iter()
            .filter_map(|key| entries.remove(&key).map(|value| (key, value)))
            .collect()
    }
}

#[derive(Default)]
struct AmountAcc {
    amount: f64,
}

#[derive(Default)]
struct SourceAcc {
    amount: f64,
    grants: usize,
}

#[derive(Default)]
struct CountAcc {
    count: usize,
    amount: f64,
}

/// Ascending numeric years first, then non-numeric labels lexicographically.
fn compare_year_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<i32>(), b.parse::<i32>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Four independent groupings over one record sequence.
///
/// Buckets keyed `"Unspecified"` are excluded from every output: they
/// pollute no statistic. Amounts accumulate only where present; counts
/// increment for every record landing in a kept bucket.
pub fn compute_aggregations(records: &[GrantRecord]) -> Aggregations {
    let mut by_year: Buckets<AmountAcc> = Buckets::new();
    let mut by_source: Buckets<SourceAcc> = Buckets::new();
    let mut by_purpose: Buckets<CountAcc> = Buckets::new();
    let mut by_school: Buckets<CountAcc> = Buckets::new();

    for record in records {
        let year_key = match record.year_value {
            Some(year) => year.to_string(),
            None if !record.year_label.is_empty() => record.year_label.clone(),
            None => UNSPECIFIED.to_string(),
        };

        let year = by_year.entry(&year_key);
        if let Some(amount) = record.amount {
            year.amount += amount;
        }

        if record.source_file != UNSPECIFIED {
            let source = by_source.entry(&record.source_file);
            if let Some(amount) = record.amount {
                source.amount += amount;
            }
            source.grants += 1;
        }
        if record.purpose != UNSPECIFIED {
            let purpose = by_purpose.entry(&record.purpose);
            if let Some(amount) = record.amount {
                purpose.amount += amount;
            }
            purpose.count += 1;
        }
        if record.school != UNSPECIFIED {
            let school = by_school.entry(&record.school);
            if let Some(amount) = record.amount {
                school.amount += amount;
            }
            school.count += 1;
        }
    }

    let mut amount_by_year: Vec<YearFunding> = by_year
        .into_ordered()
        .into_iter()
        .filter(|(year, _)| year != UNSPECIFIED)
        .map(|(year, acc)| YearFunding {
            year,
            total_amount: acc.amount,
        })
        .collect();
    amount_by_year.sort_by(|a, b| compare_year_labels(&a.year, &b.year));

    let mut amount_by_source: Vec<SourceFunding> = by_source
        .into_ordered()
        .into_iter()
        .map(|(source, acc)| SourceFunding {
            source,
            total_amount: acc.amount,
            grants: acc.grants,
        })
        .collect();
    amount_by_source.sort_by(|a, b| {
        b.total_amount
            .partial_cmp(&a.total_amount)
            .unwrap_or(Ordering::Equal)
    });
    amount_by_source.truncate(SOURCE_LIMIT);

    let mut top_purposes: Vec<PurposeSummary> = by_purpose
        .into_ordered()
        .into_iter()
        .map(|(purpose, acc)| PurposeSummary {
            purpose,
            count: acc.count,
            amount: acc.amount,
        })
        .collect();
    top_purposes.sort_by(|a, b| {
        b.count.cmp(&a.count).then_with(|| {
            b.amount
                .partial_cmp(&a.amount)
                .unwrap_or(Ordering::Equal)
        })
    });

    let mut top_schools: Vec<SchoolSummary> = by_school
        .into_ordered()
        .into_iter()
        .map(|(school, acc)| SchoolSummary {
            school,
            count: acc.count,
            amount: acc.amount,
        })
        .collect();
    top_schools.sort_by(|a, b| {
        b.amount
            .partial_cmp(&a.amount)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.count.cmp(&a.count))
    });

    Aggregations {
        amount_by_year,
        amount_by_source,
        top_purposes,
        top_schools,
    }
}

fn non_blank(value: &str) -> &str {
    if value.is_empty() {
        UNSPECIFIED
    } else {
        value
    }
}

/// Per-record inclusion over user-selected years, sources, and a free-text
/// search term. An empty selection or blank term means that clause always
/// passes.
///
/// With no filter active at all the input comes back borrowed, so callers
/// can detect "no filtering in effect" cheaply and reuse baseline results.
pub fn filter_records<'a>(
    records: &'a [GrantRecord],
    selected_years: &[String],
    selected_sources: &[String],
    search: &str,
) -> Cow<'a, [GrantRecord]> {
    let search_term = search.trim().to_lowercase();
    if selected_years.is_empty() && selected_sources.is_empty() && search_term.is_empty() {
        return Cow::Borrowed(records);
    }

    let filtered: Vec<GrantRecord> = records
        .iter()
        .filter(|record| {
            let year_label = non_blank(record.year_label.trim());
            let source = non_blank(record.source_file.trim());
            let matches_year =
                selected_years.is_empty() || selected_years.iter().any(|y| y == year_label);
            let matches_source =
                selected_sources.is_empty() || selected_sources.iter().any(|s| s == source);
            let matches_search = search_term.is_empty()
                || record
                    .search_haystack()
                    .to_lowercase()
                    .contains(&search_term);
            matches_year && matches_source && matches_search
        })
        .cloned()
        .collect();
    Cow::Owned(filtered)
}

/// Distinct year labels for the filter panel: numeric years newest-first,
/// then non-numeric labels alphabetically.
pub fn available_years(records: &[GrantRecord]) -> Vec<String> {
    let distinct: HashSet<String> = records
        .iter()
        .filter(|r| !r.year_label.is_empty())
        .map(|r| r.year_label.trim().to_string())
        .collect();
    let mut years: Vec<String> = distinct.into_iter().collect();
    years.sort_by(|a, b| match (a.parse::<i32>(), b.parse::<i32>()) {
        (Ok(x), Ok(y)) => y.cmp(&x),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    years
}

/// Distinct source dossiers for the filter panel, alphabetical.
pub fn available_sources(records: &[GrantRecord]) -> Vec<String> {
    let distinct: HashSet<String> = records
        .iter()
        .filter(|r| !r.source_file.is_empty())
        .map(|r| r.source_file.trim().to_string())
        .collect();
    let mut sources: Vec<String> = distinct.into_iter().collect();
    sources.sort();
    sources
}

/// Detail-view ordering: larger approved awards first, ties by school name.
pub fn sort_for_detail(records: &[GrantRecord]) -> Vec<&GrantRecord> {
    let mut sorted: Vec<&GrantRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        let amount_a = a.amount.unwrap_or(0.0);
        let amount_b = b.amount.unwrap_or(0.0);
        amount_b
            .partial_cmp(&amount_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.school.cmp(&b.school))
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::normalize_row;
    use crate::types::RawRow;

    fn record(
        school: &str,
        source: &str,
        purpose: &str,
        year: &str,
        amount: &str,
        requested: &str,
        index: usize,
    ) -> GrantRecord {
        let mut row = RawRow::new();
        row.push("School", school);
        row.push("Source_File", source);
        row.push("Purpose of Grant", purpose);
        row.push("Year", year);
        row.push("Amount", amount);
        row.push("Amount Requested", requested);
        normalize_row(&row, index)
    }

    fn small_batch() -> Vec<GrantRecord> {
        vec![
            record("A School", "alpha.csv", "Teaching", "2019", "$100", "$200", 0),
            record("B School", "beta.csv", "Teaching", "2020", "", "", 1),
            record("C School", "alpha.csv", "Research", "2019", "$300", "$200", 2),
        ]
    }

    #[test]
    fn metrics_sum_present_amounts_over_full_count() {
        let metrics = compute_metrics(&small_batch());
        assert_eq!(metrics.total_grants, 3);
        assert_eq!(metrics.total_awarded, 400.0);
        assert_eq!(metrics.total_requested, 400.0);
        assert_eq!(metrics.total_schools, 3);
        assert_eq!(metrics.total_sources, 2);
        assert!((metrics.average_grant - 400.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.request_to_award_ratio, Some(1.0));
    }

    #[test]
    fn ratio_is_none_when_nothing_requested() {
        let records = vec![record("A School", "alpha.csv", "Teaching", "2019", "$100", "", 0)];
        let metrics = compute_metrics(&records);
        assert!(metrics.total_awarded > 0.0);
        assert_eq!(metrics.request_to_award_ratio, None);
    }

    #[test]
    fn empty_batch_has_zero_average() {
        let metrics = compute_metrics(&[]);
        assert_eq!(metrics.average_grant, 0.0);
        assert_eq!(metrics.request_to_award_ratio, None);
    }

    #[test]
    fn years_sort_numeric_ascending_then_labels() {
        let records = vec![
            record("A School", "s.csv", "P", "2021", "$10", "", 0),
            record("B School", "s.csv", "P", "FY 19-20", "$20", "", 1),
            record("C School", "s.csv", "P", "2019", "$30", "", 2),
            record("D School", "s.csv", "P", "Archive", "$40", "", 3),
        ];
        let aggregations = compute_aggregations(&records);
        let years: Vec<&str> = aggregations
            .amount_by_year
            .iter()
            .map(|e| e.year.as_str())
            .collect();
        assert_eq!(years, vec!["2019", "2021", "Archive", "FY 19-20"]);
    }

    #[test]
    fn unspecified_year_bucket_is_dropped_from_output() {
        let records = vec![
            record("A School", "s.csv", "P", "", "", "", 0),
            record("B School", "s.csv", "P", "2020", "$50", "", 1),
        ];
        let aggregations = compute_aggregations(&records);
        assert_eq!(aggregations.amount_by_year.len(), 1);
        assert_eq!(aggregations.amount_by_year[0].year, "2020");
    }

    #[test]
    fn unspecified_groups_are_excluded_from_source_purpose_school() {
        let records = vec![
            record("A School", "", "", "2020", "$50", "", 0),
            record("B School", "beta.csv", "Teaching", "2020", "$10", "", 1),
        ];
        let aggregations = compute_aggregations(&records);
        assert_eq!(aggregations.amount_by_source.len(), 1);
        assert_eq!(aggregations.amount_by_source[0].source, "beta.csv");
        assert_eq!(aggregations.top_purposes.len(), 1);
        assert_eq!(aggregations.top_purposes[0].purpose, "Teaching");
        assert_eq!(aggregations.top_schools.len(), 2);
    }

    #[test]
    fn by_source_is_sorted_descending_and_capped_at_twelve() {
        let records: Vec<GrantRecord> = (0..15)
            .map(|i| {
                record(
                    "School",
                    &format!("source_{:02}.csv", i),
                    "P",
                    "2020",
                    &format!("${}", (i + 1) * 100),
                    "",
                    i,
                )
            })
            .collect();
        let aggregations = compute_aggregations(&records);
        assert_eq!(aggregations.amount_by_source.len(), 12);
        assert_eq!(aggregations.amount_by_source[0].total_amount, 1500.0);
        for pair in aggregations.amount_by_source.windows(2) {
            assert!(pair[0].total_amount >= pair[1].total_amount);
        }
        // The three smallest sources fall off the end, not the start.
        assert_eq!(
            aggregations.amount_by_source.last().map(|e| e.total_amount),
            Some(400.0)
        );
    }

    #[test]
    fn purposes_rank_by_count_then_amount() {
        let records = vec![
            record("A", "s.csv", "Library", "2020", "$500", "", 0),
            record("B", "s.csv", "Teaching", "2020", "$100", "", 1),
            record("C", "s.csv", "Teaching", "2020", "$100", "", 2),
            record("D", "s.csv", "Scholarships", "2020", "$900", "", 3),
        ];
        let aggregations = compute_aggregations(&records);
        let purposes: Vec<&str> = aggregations
            .top_purposes
            .iter()
            .map(|e| e.purpose.as_str())
            .collect();
        // Teaching leads on count; Scholarships beats Library on amount.
        assert_eq!(purposes, vec!["Teaching", "Scholarships", "Library"]);
    }

    #[test]
    fn schools_rank_by_amount_then_count() {
        let records = vec![
            record("North High", "s.csv", "P", "2020", "$100", "", 0),
            record("North High", "s.csv", "P", "2020", "$100", "", 1),
            record("South High", "s.csv", "P", "2020", "$200", "", 2),
            record("East High", "s.csv", "P", "2020", "$300", "", 3),
        ];
        let aggregations = compute_aggregations(&records);
        let schools: Vec<&str> = aggregations
            .top_schools
            .iter()
            .map(|e| e.school.as_str())
            .collect();
        // North and South tie on amount; North wins on count.
        assert_eq!(schools, vec!["East High", "North High", "South High"]);
    }

    #[test]
    fn counts_increment_even_when_amount_is_missing() {
        let records = vec![
            record("A School", "alpha.csv", "Teaching", "2020", "", "", 0),
            record("B School", "alpha.csv", "Teaching", "2020", "$50", "", 1),
        ];
        let aggregations = compute_aggregations(&records);
        assert_eq!(aggregations.amount_by_source[0].grants, 2);
        assert_eq!(aggregations.amount_by_source[0].total_amount, 50.0);
        assert_eq!(aggregations.top_purposes[0].count, 2);
    }

    #[test]
    fn no_active_filter_returns_borrowed_input() {
        let records = small_batch();
        let filtered = filter_records(&records, &[], &[], "   ");
        assert!(matches!(filtered, Cow::Borrowed(_)));
        assert_eq!(compute_metrics(&filtered), compute_metrics(&records));
        assert_eq!(
            compute_aggregations(&filtered),
            compute_aggregations(&records)
        );
    }

    #[test]
    fn filter_by_year_and_source_intersects() {
        let records = small_batch();
        let years = vec!["2019".to_string()];
        let sources = vec!["alpha.csv".to_string()];
        let filtered = filter_records(&records, &years, &sources, "");
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|r| r.year_label == "2019"));
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let records = small_batch();
        let filtered = filter_records(&records, &[], &[], "RESEARCH");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].school, "C School");
    }

    #[test]
    fn search_reaches_other_fields_as_key_value_pairs() {
        let mut row = RawRow::new();
        row.push("School", "Hidden School");
        row.push("Region", "Northeast");
        let records = vec![normalize_row(&row, 0)];
        let by_value = filter_records(&records, &[], &[], "northeast");
        assert_eq!(by_value.len(), 1);
        let by_key = filter_records(&records, &[], &[], "region north");
        assert_eq!(by_key.len(), 1);
        let miss = filter_records(&records, &[], &[], "southwest");
        assert!(miss.is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let records = small_batch();
        let years = vec!["2019".to_string()];
        let once = filter_records(&records, &years, &[], "").into_owned();
        let twice = filter_records(&once, &years, &[], "").into_owned();
        assert_eq!(once.len(), twice.len());
        let once_ids: Vec<&str> = once.iter().map(|r| r.id.as_str()).collect();
        let twice_ids: Vec<&str> = twice.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(once_ids, twice_ids);
    }

    #[test]
    fn unmatched_selection_yields_empty_owned_set() {
        let records = small_batch();
        let years = vec!["1999".to_string()];
        let filtered = filter_records(&records, &years, &[], "");
        assert!(matches!(filtered, Cow::Owned(_)));
        assert!(filtered.is_empty());
    }

    #[test]
    fn available_years_sorts_numeric_descending_then_labels() {
        let records = vec![
            record("A", "s.csv", "P", "2019", "", "", 0),
            record("B", "s.csv", "P", "2021", "", "", 1),
            record("C", "s.csv", "P", "FY 19-20", "", "", 2),
            record("D", "s.csv", "P", "Archive", "", "", 3),
        ];
        let years = available_years(&records);
        assert_eq!(years, vec!["2021", "2019", "Archive", "FY 19-20"]);
    }

    #[test]
    fn available_sources_are_distinct_and_alphabetical() {
        let records = small_batch();
        let sources = available_sources(&records);
        assert_eq!(sources, vec!["alpha.csv", "beta.csv"]);
    }

    #[test]
    fn detail_order_is_amount_descending_then_school() {
        let records = vec![
            record("Zeta School", "s.csv", "P", "2020", "$100", "", 0),
            record("Alpha School", "s.csv", "P", "2020", "$100", "", 1),
            record("Mid School", "s.csv", "P", "2020", "$500", "", 2),
        ];
        let sorted = sort_for_detail(&records);
        let schools: Vec<&str> = sorted.iter().map(|r| r.school.as_str()).collect();
        assert_eq!(schools, vec!["Mid School", "Alpha School", "Zeta School"]);
    }
}
