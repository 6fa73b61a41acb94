use std::path::Path;

use anyhow::Result;
use indexmap::IndexSet;
use tracing::{info, warn};

use crate::parser::{DetailValue, GrantDetail, GrantSummary};

pub const SUMMARIES_PATH: &str = "data/grants.csv";
pub const DETAILS_PATH: &str = "data/grant_details.csv";

/// One persisted detail page: the parsed field mapping plus the two
/// identifying keys the parser itself does not populate.
pub struct DetailRecord {
    pub opportunity_number: String,
    pub detail_page_url: String,
    pub fields: GrantDetail,
}

/// Write summary records as CSV, fixed columns, absent optionals as empty
/// cells.
pub fn write_summaries(path: &str, grants: &[GrantSummary]) -> Result<()> {
    if grants.is_empty() {
        warn!("No summary data to save");
        return Ok(());
    }
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    for grant in grants {
        wtr.serialize(grant)?;
    }
    wtr.flush()?;
    info!("Saved {} grants to {}", grants.len(), path);
    Ok(())
}

pub fn load_summaries(path: &str) -> Result<Vec<GrantSummary>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let grants = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<GrantSummary>, _>>()?;
    info!("Loaded {} grant URLs from {}", grants.len(), path);
    Ok(grants)
}

/// Write detail records as CSV. The header is opportunity_number and
/// detail_page_url followed by the union of field keys across all records
/// in first-seen order; records missing a key get an empty cell.
pub fn write_details(path: &str, records: &[DetailRecord]) -> Result<()> {
    if records.is_empty() {
        warn!("No detail data to save");
        return Ok(());
    }
    ensure_parent(path)?;
    let header = detail_header(records);
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&header)?;
    for rec in records {
        wtr.write_record(detail_row(rec, &header))?;
    }
    wtr.flush()?;
    info!("Saved {} grant details to {}", records.len(), path);
    Ok(())
}

/// Data rows in a CSV file; 0 when the file does not exist yet.
pub fn count_rows(path: &str) -> Result<usize> {
    if !Path::new(path).exists() {
        return Ok(0);
    }
    let mut rdr = csv::Reader::from_path(path)?;
    Ok(rdr.records().filter_map(|r| r.ok()).count())
}

fn detail_header(records: &[DetailRecord]) -> Vec<String> {
    let mut keys: IndexSet<String> = IndexSet::new();
    for rec in records {
        for key in rec.fields.keys() {
            keys.insert(key.clone());
        }
    }
    let mut header = vec!["opportunity_number".to_string(), "detail_page_url".to_string()];
    header.extend(keys);
    header
}

fn detail_row(rec: &DetailRecord, header: &[String]) -> Vec<String> {
    let mut row = vec![rec.opportunity_number.clone(), rec.detail_page_url.clone()];
    for key in &header[2..] {
        row.push(detail_cell(rec.fields.get(key)));
    }
    row
}

/// Plain text goes in verbatim (csv quoting handles newlines); linked
/// values are rendered as JSON objects.
fn detail_cell(value: Option<&DetailValue>) -> String {
    match value {
        None => String::new(),
        Some(DetailValue::Text(s)) => s.clone(),
        Some(linked @ DetailValue::Linked { .. }) => {
            serde_json::to_string(linked).unwrap_or_default()
        }
    }
}

fn ensure_parent(path: &str) -> Result<()> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::GrantDetail;

    fn record(number: &str, fields: &[(&str, DetailValue)]) -> DetailRecord {
        let mut map = GrantDetail::new();
        for (k, v) in fields {
            map.insert(k.to_string(), v.clone());
        }
        DetailRecord {
            opportunity_number: number.to_string(),
            detail_page_url: format!("https://grants.gov/search-results-detail/{}", number),
            fields: map,
        }
    }

    fn text(s: &str) -> DetailValue {
        DetailValue::Text(s.to_string())
    }

    #[test]
    fn header_is_union_of_keys_in_first_seen_order() {
        let records = [
            record("1", &[("synopsis", text("a")), ("Agency", text("b"))]),
            record("2", &[("Agency", text("c")), ("Eligible Applicants", text("d"))]),
        ];
        assert_eq!(
            detail_header(&records),
            vec![
                "opportunity_number",
                "detail_page_url",
                "synopsis",
                "Agency",
                "Eligible Applicants",
            ]
        );
    }

    #[test]
    fn missing_keys_become_empty_cells() {
        let records = [
            record("1", &[("synopsis", text("a"))]),
            record("2", &[("Agency", text("b"))]),
        ];
        let header = detail_header(&records);
        let row = detail_row(&records[1], &header);
        assert_eq!(row[2], ""); // synopsis absent on record 2
        assert_eq!(row[3], "b");
    }

    #[test]
    fn linked_cell_rendered_as_json() {
        let linked = DetailValue::Linked {
            text: Some("See links".to_string()),
            urls: vec!["/a".to_string(), "/b".to_string()],
        };
        assert_eq!(
            detail_cell(Some(&linked)),
            r#"{"text":"See links","urls":["/a","/b"]}"#
        );
        assert_eq!(detail_cell(Some(&text("plain"))), "plain");
        assert_eq!(detail_cell(None), "");
    }

    #[test]
    fn summaries_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "grants_scraper_test_{}_summaries.csv",
            std::process::id()
        ));
        let path = path.to_str().unwrap();

        let grants = vec![
            GrantSummary {
                opportunity_number: "RT-1".to_string(),
                detail_page_url: "https://grants.gov/search-results-detail/1".to_string(),
                title: Some("Round trip".to_string()),
                agency: Some("DOE".to_string()),
                status: Some("Posted".to_string()),
                posted_date: Some("01/02/2025".to_string()),
                close_date: None,
                award_ceiling: Some("500000".to_string()),
                award_floor: None,
                eligibility: None,
                funding_instrument: None,
                category: None,
            },
            GrantSummary {
                opportunity_number: "RT-2".to_string(),
                detail_page_url: "https://grants.gov/search-results-detail/2".to_string(),
                title: Some("Second".to_string()),
                agency: None,
                status: None,
                posted_date: None,
                close_date: None,
                award_ceiling: None,
                award_floor: None,
                eligibility: None,
                funding_instrument: None,
                category: None,
            },
        ];

        write_summaries(path, &grants).unwrap();
        let loaded = load_summaries(path).unwrap();
        assert_eq!(loaded, grants);
        assert_eq!(count_rows(path).unwrap(), 2);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn count_rows_missing_file_is_zero() {
        assert_eq!(count_rows("data/does_not_exist.csv").unwrap(), 0);
    }
}
