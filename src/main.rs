// Entry point and high-level CLI flow.
//
// - Option [1] loads the grants CSV export and normalizes it into a batch.
// - Option [2] computes portfolio metrics and aggregations over the full
//   batch, writes the report artifacts, and prints previews.
// - Option [3] applies an interactive year/source/search filter and prints
//   the same statistics recomputed over the narrowed subset.
mod loader;
mod output;
mod reports;
mod types;
mod util;

use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::Mutex;
use types::{
    GrantDetailRow, GrantRecord, PurposeRow, SchoolRow, SourceFundingRow, YearFundingRow,
};

const DATA_PATH: &str = "grants_export.csv";
const PREVIEW_ROWS: usize = 5;

// In-memory app state so the CSV loads once but reports and filtered views
// can be generated repeatedly in a single run. Reloading recomputes
// everything from scratch.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { data: None }));

struct AppState {
    data: Option<Vec<GrantRecord>>,
}

fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Comma-separated multi-select; blank input selects nothing.
fn read_list(prompt: &str) -> Vec<String> {
    read_line(prompt)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn prompt_back_to_menu() -> bool {
    loop {
        match read_line("Back to selection (Y/N): ").to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Handle option [1]: load and normalize the CSV export.
///
/// On success the batch replaces whatever was loaded before; on failure the
/// previous batch (if any) is left untouched.
fn handle_load() {
    match loader::load_batch(DATA_PATH) {
        Ok((data, report)) => {
            println!(
                "Processing dataset... ({} rows read, {} records kept)",
                util::format_int(report.total_rows),
                util::format_int(report.kept_records)
            );
            if report.skipped_missing_school > 0 {
                println!(
                    "Note: {} rows dropped for a blank School column.",
                    util::format_int(report.skipped_missing_school)
                );
            }
            println!();
            let mut state = APP_STATE.lock().unwrap();
            state.data = Some(data);
        }
        Err(e) => {
            eprintln!("Failed to load {}: {}\n", DATA_PATH, e);
        }
    }
}

fn loaded_data() -> Option<Vec<GrantRecord>> {
    let state = APP_STATE.lock().unwrap();
    state.data.clone()
}

/// Print the portfolio summary and all four aggregation previews for one
/// record sequence; optionally export the full tables and metrics.
fn print_portfolio(records: &[GrantRecord], write_files: bool) {
    let metrics = reports::compute_metrics(records);
    let aggregations = reports::compute_aggregations(records);

    println!("Portfolio summary:");
    println!(
        "  Total awarded:    {}",
        util::format_currency(Some(metrics.total_awarded))
    );
    println!(
        "  Total requested:  {}",
        util::format_currency(Some(metrics.total_requested))
    );
    println!("  Grant records:    {}", util::format_int(metrics.total_grants));
    println!("  Schools/partners: {}", util::format_int(metrics.total_schools));
    println!("  Source dossiers:  {}", util::format_int(metrics.total_sources));
    println!(
        "  Average grant:    {}",
        util::format_currency(Some(metrics.average_grant))
    );
    match metrics.request_to_award_ratio {
        Some(ratio) => println!("  Award/request:    {}", util::format_number(ratio, 2)),
        None => println!("  Award/request:    {}", util::EM_DASH),
    }
    println!();

    let year_rows: Vec<YearFundingRow> = aggregations.amount_by_year.iter().map(Into::into).collect();
    let source_rows: Vec<SourceFundingRow> =
        aggregations.amount_by_source.iter().map(Into::into).collect();
    let purpose_rows: Vec<PurposeRow> = aggregations.top_purposes.iter().map(Into::into).collect();
    let school_rows: Vec<SchoolRow> = aggregations.top_schools.iter().map(Into::into).collect();
    let detail_rows: Vec<GrantDetailRow> = reports::sort_for_detail(records)
        .into_iter()
        .map(Into::into)
        .collect();

    output::preview_table("Funding by year", &year_rows, PREVIEW_ROWS);
    output::preview_table("Funding by source dossier (top 12)", &source_rows, PREVIEW_ROWS);
    output::preview_table("Top purposes", &purpose_rows, PREVIEW_ROWS);
    output::preview_table("Top schools", &school_rows, PREVIEW_ROWS);
    output::preview_table("Grant-level detail (largest awards)", &detail_rows, PREVIEW_ROWS);

    if write_files {
        if let Err(e) = output::write_csv("funding_by_year.csv", &year_rows) {
            eprintln!("Write error: {}", e);
        }
        if let Err(e) = output::write_csv("funding_by_source.csv", &source_rows) {
            eprintln!("Write error: {}", e);
        }
        if let Err(e) = output::write_csv("top_purposes.csv", &purpose_rows) {
            eprintln!("Write error: {}", e);
        }
        if let Err(e) = output::write_csv("top_schools.csv", &school_rows) {
            eprintln!("Write error: {}", e);
        }
        if let Err(e) = output::write_csv("grants_detail.csv", &detail_rows) {
            eprintln!("Write error: {}", e);
        }
        if let Err(e) = output::write_json("summary.json", &metrics) {
            eprintln!("Write error: {}", e);
        }
        println!("(Full tables exported alongside summary.json)\n");
    }
}

/// Console analog of the dashboard's expandable table row: everything the
/// pipeline kept about one record, raw cells included.
fn print_record_detail(record: &GrantRecord) {
    println!("Record {}", record.id);
    println!(
        "  Source row: {} columns ({} canonical cells filled, {} other)",
        record.raw.iter().count(),
        record
            .important_fields
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .count(),
        record.other_fields.len()
    );
    println!("  School:   {}", record.school);
    println!("  Title:    {}", record.title);
    println!("  Source:   {}", record.source_file);
    println!("  Purpose:  {}", record.purpose);
    match record.year_value {
        Some(year) => println!("  Year:     {} ({})", record.year_label, year),
        None => println!("  Year:     {}", record.year_label),
    }
    println!(
        "  Letter:   {}  Application: {}  Period: {}",
        util::format_date(&record.date_of_letter),
        util::format_date(&record.date_of_application),
        util::format_date(&record.date_range)
    );
    println!(
        "  Approved: {} (cell: {:?})",
        util::format_currency(record.amount),
        record.amount_raw
    );
    println!(
        "  Requested: {} (cell: {:?})",
        util::format_currency(record.amount_requested),
        record.amount_requested_raw
    );
    println!(
        "  Disbursed: {} (cell: {:?})",
        util::format_currency(record.full_grant_amount_disbursed),
        record.full_grant_amount_disbursed_raw
    );
    if let (Some(lat), Some(lon)) = (record.latitude, record.longitude) {
        println!("  Location: {}, {}", lat, lon);
    }
    if record.other_fields.is_empty() {
        println!("  Additional context: none");
    } else {
        println!("  Additional context:");
        for field in &record.other_fields {
            println!("    {}: {}", field.key, field.value);
        }
    }
    println!();
}

/// Handle option [2]: full-batch reports plus file artifacts.
fn handle_generate_reports() {
    let Some(data) = loaded_data() else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return;
    };
    println!("Generating reports...\n");
    print_portfolio(&data, true);
}

/// Handle option [3]: interactive filtered view.
///
/// An empty selection for years/sources and a blank search term mean no
/// filtering; the baseline statistics are shown unrecomputed in that case.
fn handle_filtered_view() {
    let Some(data) = loaded_data() else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return;
    };

    println!(
        "Available years: {}",
        reports::available_years(&data).join(", ")
    );
    println!(
        "Available sources: {}",
        reports::available_sources(&data).join(", ")
    );
    let years = read_list("Years (comma-separated, blank for all): ");
    let sources = read_list("Sources (comma-separated, blank for all): ");
    let search = read_line("Search term (blank for none): ");

    let filtered = reports::filter_records(&data, &years, &sources, &search);
    match &filtered {
        Cow::Borrowed(_) => println!("\nNo filters active; showing the full portfolio.\n"),
        Cow::Owned(subset) => println!(
            "\n{} of {} records match.\n",
            util::format_int(subset.len()),
            util::format_int(data.len())
        ),
    }
    print_portfolio(&filtered, false);

    if let Some(top) = reports::sort_for_detail(&filtered).first() {
        if read_line("Inspect the largest matching award? (Y/N): ").to_uppercase() == "Y" {
            println!();
            print_record_detail(top);
        }
    }
}

fn main() {
    loop {
        println!("Grant Portfolio Explorer");
        println!("[1] Load the grants export");
        println!("[2] Generate portfolio reports");
        println!("[3] Filtered view\n");
        match read_line("Enter choice: ").as_str() {
            "1" => handle_load(),
            "2" => {
                println!();
                handle_generate_reports();
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            "3" => {
                println!();
                handle_filtered_view();
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => {
                println!("Invalid choice. Please enter 1, 2, or 3.\n");
            }
        }
    }
}
