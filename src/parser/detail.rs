use std::sync::LazyLock;

use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};

static H2_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// Value of one extracted detail field. Cells containing hyperlinks keep
/// their link targets alongside the visible text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DetailValue {
    Text(String),
    Linked {
        text: Option<String>,
        urls: Vec<String>,
    },
}

/// Open key/value mapping extracted from one grant's detail page.
/// Insertion-ordered so persisted headers stay deterministic.
pub type GrantDetail = IndexMap<String, DetailValue>;

/// Parse a grant detail page into its synopsis and section fields.
///
/// Sections are merged in the order General → Eligibility → Additional;
/// a later section overwrites a same-named key from an earlier one. Missing
/// headings or tables contribute nothing. Empty input yields an empty map.
pub fn parse_grant_details(html: &str) -> GrantDetail {
    if html.is_empty() {
        warn!("Received empty HTML content for grant details");
        return GrantDetail::new();
    }

    info!("Parsing grant details");
    let doc = Html::parse_document(html);
    let mut details = GrantDetail::new();

    match find_heading(&doc, "Opportunity Synopsis") {
        Some(header) => {
            if let Some(section) = next_element_after(&doc, header, "div") {
                let text: String = section.text().collect();
                let text = text.trim();
                if !text.is_empty() {
                    details.insert("synopsis".to_string(), DetailValue::Text(text.to_string()));
                    debug!("Extracted synopsis");
                }
            }
        }
        None => debug!("Could not find synopsis section"),
    }

    for (section, header_text) in [
        ("general", "General Information"),
        ("eligibility", "Eligibility"),
        ("additional", "Additional Information"),
    ] {
        let section_data = extract_table_data(&doc, section, header_text);
        // Sequential merge: later sections shadow same-named keys.
        details.extend(section_data);
    }

    details
}

/// Extract key/value pairs from the table following a section heading.
fn extract_table_data(doc: &Html, section: &str, header_text: &str) -> GrantDetail {
    let mut data = GrantDetail::new();

    let Some(header) = find_heading(doc, header_text) else {
        debug!("Could not find {} section", header_text);
        return data;
    };
    let Some(table) = next_element_after(doc, header, "table") else {
        debug!("No table found for {} section", header_text);
        return data;
    };

    for row in table.select(&ROW_SEL) {
        let cells: Vec<ElementRef> = row.select(&CELL_SEL).collect();
        if cells.len() != 2 {
            debug!("Skipping malformed row in {}", section);
            continue;
        }

        let key: String = cells[0].text().collect();
        let key = key.trim().trim_end_matches(':').to_string();

        let Some(value) = cell_value(cells[1]) else {
            continue;
        };
        debug!("Extracted {} from {}", key, section);
        data.insert(key, value);
    }

    data
}

/// Value cell contents: linked when the cell contains anchors, otherwise
/// the cell's trimmed text fragments newline-joined. None when empty.
fn cell_value(cell: ElementRef) -> Option<DetailValue> {
    let anchors: Vec<ElementRef> = cell.select(&ANCHOR_SEL).collect();
    if !anchors.is_empty() {
        let text: String = cell.text().collect();
        let text = text.trim();
        let urls: Vec<String> = anchors
            .iter()
            .filter_map(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
            .collect();
        return Some(DetailValue::Linked {
            text: (!text.is_empty()).then(|| text.to_string()),
            urls,
        });
    }

    let joined = cell
        .text()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.is_empty() {
        None
    } else {
        Some(DetailValue::Text(joined))
    }
}

/// Find the h2 whose trimmed text equals `text` exactly.
fn find_heading<'a>(doc: &'a Html, text: &str) -> Option<ElementRef<'a>> {
    doc.select(&H2_SEL)
        .find(|h| h.text().collect::<String>().trim() == text)
}

/// First element named `tag` after `after` in document order, descending
/// into subtrees. The page puts section tables inside wrapper markup, so a
/// plain sibling walk is not enough.
fn next_element_after<'a>(doc: &'a Html, after: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    let mut seen = false;
    for node in doc.root_element().descendants() {
        if node.id() == after.id() {
            seen = true;
            continue;
        }
        if !seen {
            continue;
        }
        if let Some(el) = ElementRef::wrap(node) {
            if el.value().name() == tag {
                return Some(el);
            }
        }
    }
    None
}

// ── Tests ──
