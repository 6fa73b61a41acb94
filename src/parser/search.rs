use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::text::{clean_amount, extract_text};

const SITE_ORIGIN: &str = "https://grants.gov";

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.usa-table").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.usa-link").unwrap());
static DETAILS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.grant-details").unwrap());
static AWARD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.award-info").unwrap());
static CEILING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.ceiling").unwrap());
static FLOOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.floor").unwrap());
static ELIGIBILITY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.eligibility").unwrap());
static FUNDING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.funding-instrument").unwrap());
static CATEGORY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.category").unwrap());

/// One row's worth of grant metadata from the search-results table.
/// Absent optional fields are None, never empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSummary {
    pub opportunity_number: String,
    pub detail_page_url: String,
    pub title: Option<String>,
    pub agency: Option<String>,
    pub status: Option<String>,
    pub posted_date: Option<String>,
    pub close_date: Option<String>,
    pub award_ceiling: Option<String>,
    pub award_floor: Option<String>,
    pub eligibility: Option<String>,
    pub funding_instrument: Option<String>,
    pub category: Option<String>,
}

/// Required-field gate: a summary is kept only when title, opportunity
/// number, and detail URL are all present and non-empty.
pub fn has_required_fields(grant: &GrantSummary) -> bool {
    let required = [
        ("title", grant.title.as_deref()),
        ("opportunity_number", Some(grant.opportunity_number.as_str())),
        ("detail_page_url", Some(grant.detail_page_url.as_str())),
    ];
    for (field, value) in required {
        if value.map_or(true, str::is_empty) {
            warn!("Missing required field: {}", field);
            return false;
        }
    }
    true
}

/// Parse a search-results page into summary records, in row order.
///
/// Rows are processed independently: a malformed row is skipped with a log
/// entry and never aborts the batch. A missing table or empty input yields
/// an empty vec, not an error.
pub fn parse_search_results(html: &str) -> Vec<GrantSummary> {
    if html.is_empty() {
        warn!("Empty HTML content provided");
        return Vec::new();
    }

    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&TABLE_SEL).next() else {
        warn!("No results table found in HTML content");
        return Vec::new();
    };

    // First row is the header.
    let rows: Vec<ElementRef> = table.select(&ROW_SEL).collect();
    let data_rows = rows.get(1..).unwrap_or(&[]);
    info!("Found {} grant rows to parse", data_rows.len());

    let mut grants = Vec::new();
    for (idx, row) in data_rows.iter().enumerate() {
        let Some(grant) = parse_row(*row, idx + 1) else {
            continue;
        };
        if !has_required_fields(&grant) {
            warn!(
                "Skipping grant {} with missing required fields",
                grant.opportunity_number
            );
            continue;
        }
        debug!("Parsed grant {}", grant.opportunity_number);
        grants.push(grant);
    }

    info!("Parsed {} grants with detail URLs", grants.len());
    grants
}

fn parse_row(row: ElementRef, idx: usize) -> Option<GrantSummary> {
    let cells: Vec<ElementRef> = row.select(&CELL_SEL).collect();
    if cells.len() < 6 {
        warn!("Skipping row {} with insufficient columns: {}", idx, cells.len());
        return None;
    }

    let Some(link) = cells[0].select(&LINK_SEL).next() else {
        warn!("No opportunity link found in row {}", idx);
        return None;
    };
    let opportunity_number = link.text().collect::<String>().trim().to_string();

    let href = link.value().attr("href").unwrap_or("").trim().to_string();
    if href.is_empty() {
        warn!("No detail URL found for opportunity {}", opportunity_number);
        return None;
    }
    let detail_page_url = qualify_url(&href);
    debug!("Found detail URL for {}: {}", opportunity_number, detail_page_url);

    let mut grant = GrantSummary {
        opportunity_number,
        detail_page_url,
        title: extract_text(Some(cells[1]), "title"),
        agency: extract_text(Some(cells[2]), "agency"),
        status: extract_text(Some(cells[3]), "status"),
        posted_date: extract_text(Some(cells[4]), "posted_date"),
        close_date: extract_text(Some(cells[5]), "close_date"),
        award_ceiling: None,
        award_floor: None,
        eligibility: None,
        funding_instrument: None,
        category: None,
    };
    extract_nested_details(cells[1], &mut grant);
    Some(grant)
}

/// Best-effort block: expanded rows nest a grant-details element inside the
/// title cell. Anything missing here just leaves the fields absent.
fn extract_nested_details(cell: ElementRef, grant: &mut GrantSummary) {
    let Some(details) = cell.select(&DETAILS_SEL).next() else {
        debug!(
            "No additional fields for grant {}",
            grant.opportunity_number
        );
        return;
    };

    if let Some(award) = details.select(&AWARD_SEL).next() {
        grant.award_ceiling = clean_amount(
            extract_text(award.select(&CEILING_SEL).next(), "award_ceiling").as_deref(),
        );
        grant.award_floor = clean_amount(
            extract_text(award.select(&FLOOR_SEL).next(), "award_floor").as_deref(),
        );
    }

    grant.eligibility = extract_text(details.select(&ELIGIBILITY_SEL).next(), "eligibility");
    grant.funding_instrument =
        extract_text(details.select(&FUNDING_SEL).next(), "funding_instrument");
    grant.category = extract_text(details.select(&CATEGORY_SEL).next(), "category");
}

/// Hrefs in the results table are site-relative; join them with the fixed
/// origin. Already-absolute URLs pass through untouched.
fn qualify_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", SITE_ORIGIN, href)
    }
}

// ── Tests ──
