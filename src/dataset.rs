//! Local HS-code dataset
//!
//! One-shot CSV load of the tariff/gain table keyed by 6-digit HS code,
//! queried synchronously afterwards. Also provides the case-insensitive
//! filter backing the search box.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, TradeDataError};

/// Provinces carried in the dataset, in display order
pub const PROVINCES: [(&str, &str); 4] = [
    ("BC", "British Columbia"),
    ("AB", "Alberta"),
    ("SK", "Saskatchewan"),
    ("MB", "Manitoba"),
];

/// Precomputed gain figures for one province
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvincialGain {
    pub abbr: String,
    pub province: String,
    pub gain: Decimal,
    pub percent: Option<Decimal>,
}

impl ProvincialGain {
    /// `"BC: $12,000"`, with a zero gain rendered as the literal
    /// no-data label rather than `$0`
    pub fn label(&self) -> String {
        format!("{}: {}", self.abbr, gain_label(self.gain))
    }
}

/// One row of the local dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HsRecord {
    pub hs6: String,
    pub description: String,
    pub tariff_rate: String,
    pub canada_gain: Decimal,
    pub canada_gain_percent: Option<Decimal>,
    pub provinces: Vec<ProvincialGain>,
}

impl HsRecord {
    /// Per-province display lines, zero gains shown as `None`
    pub fn provincial_lines(&self) -> Vec<String> {
        self.provinces.iter().map(ProvincialGain::label).collect()
    }
}

/// In-memory dataset keyed by HS6 code
#[derive(Debug, Default)]
pub struct HsDataset {
    records: HashMap<String, HsRecord>,
}

impl HsDataset {
    /// Load the dataset from a CSV file.
    ///
    /// HS6 cells may carry the source file's leading apostrophe
    /// (`'271019`); it is stripped here. Rows without an HS6 or a
    /// description are skipped with a warning rather than aborting the
    /// whole load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new().from_path(path)?;

        let headers = reader.headers()?.clone();
        for required in ["HS6", "Description"] {
            if !headers.iter().any(|h| h == required) {
                return Err(TradeDataError::MissingColumn(required.to_string()));
            }
        }

        let mut records = HashMap::new();
        for row in reader.deserialize::<HashMap<String, String>>() {
            let row = row?;
            let hs6 = row
                .get("HS6")
                .map(|v| v.trim_start_matches('\'').trim().to_string())
                .unwrap_or_default();
            let description = row.get("Description").cloned().unwrap_or_default();
            if hs6.is_empty() || description.is_empty() {
                warn!("skipping dataset row with empty HS6 or description");
                continue;
            }

            let provinces = PROVINCES
                .iter()
                .map(|(abbr, province)| ProvincialGain {
                    abbr: abbr.to_string(),
                    province: province.to_string(),
                    gain: parse_money(row.get(&format!("{abbr} Gain - no export promotion"))),
                    percent: parse_decimal(row.get(&format!("{abbr}%"))),
                })
                .collect();

            let record = HsRecord {
                hs6: hs6.clone(),
                description,
                tariff_rate: row
                    .get("Japan Rate for Canada TPP")
                    .cloned()
                    .unwrap_or_default(),
                canada_gain: parse_money(row.get("Total Canada Gain - no export promotion")),
                canada_gain_percent: parse_decimal(row.get("Total Canada Gain %")),
                provinces,
            };
            records.insert(hs6, record);
        }

        info!(path = %path.display(), codes = records.len(), "HS dataset loaded");
        Ok(Self { records })
    }

    /// Exact-match lookup by 6-digit code
    pub fn lookup(&self, hs6: &str) -> Option<&HsRecord> {
        self.records.get(hs6.trim())
    }

    /// Case-insensitive prefix-or-substring filter over codes and
    /// descriptions, for the autocomplete source. Results are sorted by
    /// code so the suggestion order is stable.
    pub fn search(&self, query: &str) -> Vec<&HsRecord> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<&HsRecord> = self
            .records
            .values()
            .filter(|r| {
                r.hs6.starts_with(&needle) || r.description.to_lowercase().contains(&needle)
            })
            .collect();
        hits.sort_by(|a, b| a.hs6.cmp(&b.hs6));
        hits
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// `$12,000`-style label, or `None` for a zero gain
pub fn gain_label(value: Decimal) -> String {
    if value.is_zero() {
        "None".to_string()
    } else {
        dollar(value)
    }
}

/// Grouped dollar formatting; cents only when the value has any
pub fn dollar(value: Decimal) -> String {
    let negative = value < Decimal::ZERO;
    let value = value.abs();
    let whole = value.trunc();
    let fraction = value - whole;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    if fraction.is_zero() {
        format!("{sign}${grouped}")
    } else {
        let cents = i64::try_from((fraction * Decimal::from(100)).round()).unwrap_or(0);
        format!("{sign}${grouped}.{cents:02}")
    }
}

fn parse_money(raw: Option<&String>) -> Decimal {
    parse_decimal(raw).unwrap_or(Decimal::ZERO)
}

fn parse_decimal(raw: Option<&String>) -> Option<Decimal> {
    let cleaned: String = raw?
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "HS6,Description,Japan Rate for Canada TPP,\
Total Canada Gain - no export promotion,Total Canada Gain %,\
BC Gain - no export promotion,BC%,AB Gain - no export promotion,AB%,\
SK Gain - no export promotion,SK%,MB Gain - no export promotion,MB%";

    fn dataset_with(rows: &[&str]) -> HsDataset {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        HsDataset::load(file.path()).unwrap()
    }

    #[test]
    fn test_lookup_strips_leading_apostrophe() {
        let dataset = dataset_with(&[
            "'271019,Petroleum oils,2.1%,\"$40,000\",1.5,\"$12,000\",1.2,$0,,$0,,$0,",
        ]);
        let record = dataset.lookup("271019").unwrap();
        assert_eq!(record.description, "Petroleum oils");
        assert_eq!(record.canada_gain, dec!(40000));
    }

    #[test]
    fn test_zero_gain_renders_as_none_label() {
        let dataset = dataset_with(&[
            "'271019,Petroleum oils,2.1%,\"$40,000\",1.5,\"$12,000\",1.2,$0,,$0,,$0,",
        ]);
        let lines = dataset.lookup("271019").unwrap().provincial_lines();
        assert_eq!(lines[0], "BC: $12,000");
        assert_eq!(lines[1], "AB: None");
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let dataset = dataset_with(&[
            "'271019,Petroleum oils,2.1%,$100,,$0,,$0,,$0,,$0,",
            "'850440,Static converters,0%,$200,,$0,,$0,,$0,,$0,",
        ]);
        let hits = dataset.search("PETROLEUM");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].hs6, "271019");

        let hits = dataset.search("8504");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].hs6, "850440");

        assert!(dataset.search("  ").is_empty());
    }

    #[test]
    fn test_unknown_code_is_none() {
        let dataset = dataset_with(&["'271019,Petroleum oils,2.1%,$100,,$0,,$0,,$0,,$0,"]);
        assert!(dataset.lookup("999999").is_none());
    }

    #[test]
    fn test_missing_required_column_is_reported() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "code,name").unwrap();
        writeln!(file, "271019,Petroleum oils").unwrap();
        let err = HsDataset::load(file.path()).unwrap_err();
        assert!(matches!(err, TradeDataError::MissingColumn(_)));
    }

    #[test]
    fn test_dollar_grouping() {
        assert_eq!(dollar(dec!(12000)), "$12,000");
        assert_eq!(dollar(dec!(1234567)), "$1,234,567");
        assert_eq!(dollar(dec!(999)), "$999");
        assert_eq!(dollar(dec!(10.5)), "$10.50");
    }
}
