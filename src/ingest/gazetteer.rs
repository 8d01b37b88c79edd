//! Gazetteer lookup for named navigable rivers.
//!
//! Asks a SPARQL endpoint (TSV accept header) for rivers intersecting an
//! expanded map bbox with a minimum length, and turns the answer into
//! matchable name-variant sets. Matching is Unicode-aware: NFC
//! normalization plus case folding, word-boundary semantics for short
//! names, substring in either direction for names of four or more
//! characters. A failed lookup never fails the generation; callers fall
//! back to span-based navigability heuristics.

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::common::{GenLog, HttpFetch};
use crate::types::GeoBounds;

/// One gazetteer river: display name plus every matchable variant,
/// pre-normalized.
#[derive(Debug, Clone)]
pub struct RiverName {
    pub display: String,
    variants: Vec<String>,
}

/// NFC-normalize and case-fold for comparison.
fn normalize(name: &str) -> String {
    name.nfc().collect::<String>().to_lowercase()
}

fn word_boundary_match(haystack: &str, needle: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == needle)
}

impl RiverName {
    pub fn new(display: impl Into<String>, variants: impl IntoIterator<Item = String>) -> Self {
        let display = display.into();
        let mut normalized: Vec<String> = std::iter::once(display.clone())
            .chain(variants)
            .map(|v| normalize(&v))
            .collect();
        normalized.sort();
        normalized.dedup();
        Self { display, variants: normalized }
    }

    /// Does a waterway name refer to this river? Short variants require a
    /// whole-word hit; longer ones may substring-match either direction.
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = normalize(candidate);
        if candidate.is_empty() {
            return false;
        }
        self.variants.iter().any(|variant| {
            if variant.chars().count() < 4 {
                word_boundary_match(&candidate, variant)
            } else {
                candidate.contains(variant.as_str())
                    || (candidate.chars().count() >= 4 && variant.contains(candidate.as_str()))
            }
        })
    }
}

pub struct GazetteerResolver<'a> {
    http: &'a dyn HttpFetch,
    endpoint: String,
    error_filter: Regex,
}

const TSV_ACCEPT: &str = "text/tab-separated-values";

/// Minimal percent-encoding for a query-string value.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 2);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

impl<'a> GazetteerResolver<'a> {
    pub fn new(http: &'a dyn HttpFetch, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            // Obvious data errors: bare entity ids, URLs, underscore slugs,
            // pure numbers.
            error_filter: Regex::new(r"^Q\d+$|https?:|[/_]|^\d+$").unwrap(),
        }
    }

    fn sparql(bounds: &GeoBounds, min_length_km: f64) -> String {
        // Rivers whose course crosses the box and whose length clears the
        // threshold; labels and alt labels concatenated with '|'.
        format!(
            "SELECT ?riverLabel ?altLabels WHERE {{ \
             ?river wdt:P31/wdt:P279* wd:Q4022 . \
             ?river wdt:P625 ?coord . \
             ?river wdt:P2043 ?length . \
             FILTER(?length >= {min_length_km}) \
             SERVICE wikibase:box {{ \
               ?river wdt:P625 ?location . \
               bd:serviceParam wikibase:cornerSouthWest \"Point({} {})\"^^geo:wktLiteral . \
               bd:serviceParam wikibase:cornerNorthEast \"Point({} {})\"^^geo:wktLiteral . \
             }} \
             OPTIONAL {{ ?river skos:altLabel ?alt . FILTER(lang(?alt) != \"\") }} \
             SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"[AUTO_LANGUAGE],en\" }} \
             }} GROUP BY ?riverLabel ?altLabels",
            bounds.west, bounds.south, bounds.east, bounds.north
        )
    }

    /// Named rivers intersecting the expanded bbox. Empty on any failure.
    pub fn resolve(
        &self,
        bounds: &GeoBounds,
        min_length_km: f64,
        log: &mut GenLog,
    ) -> Vec<RiverName> {
        log.section("gazetteer");
        let expanded = bounds.expanded(
            bounds.lat_span() * 0.1 + 0.1,
            bounds.lon_span() * 0.1 + 0.1,
        );
        let query = Self::sparql(&expanded, min_length_km);
        let url = format!("{}?query={}", self.endpoint, encode_query(&query));

        let resp = match self.http.get_with_accept(&url, TSV_ACCEPT) {
            Ok(resp) if resp.is_ok() => resp,
            Ok(resp) => {
                log.warn(format!("gazetteer: HTTP {}", resp.status));
                return Vec::new();
            }
            Err(e) => {
                log.warn(format!("gazetteer: {e}"));
                return Vec::new();
            }
        };
        let text = match resp.text() {
            Ok(t) => t.to_string(),
            Err(e) => {
                log.warn(format!("gazetteer: {e}"));
                return Vec::new();
            }
        };

        let rivers = self.parse_tsv(&text);
        log.kv("rivers", rivers.len());
        log.ok("gazetteer resolved");
        rivers
    }

    /// Parse the TSV answer: header row names the columns, then one river
    /// per line with '|'-separated alt labels.
    fn parse_tsv(&self, text: &str) -> Vec<RiverName> {
        let mut lines = text.lines();
        let Some(header) = lines.next() else { return Vec::new() };
        let columns: Vec<&str> = header.split('\t').map(|c| c.trim_start_matches('?')).collect();
        let label_col = columns.iter().position(|c| *c == "riverLabel");
        let alt_col = columns.iter().position(|c| *c == "altLabels");
        let Some(label_col) = label_col else { return Vec::new() };

        let mut rivers = Vec::new();
        for line in lines {
            let fields: Vec<&str> = line.split('\t').collect();
            let Some(label) = fields.get(label_col).map(|f| f.trim().trim_matches('"')) else {
                continue;
            };
            if label.is_empty() || self.error_filter.is_match(label) {
                continue;
            }
            let variants: Vec<String> = alt_col
                .and_then(|c| fields.get(c))
                .map(|raw| {
                    raw.trim_matches('"')
                        .split('|')
                        .map(str::trim)
                        .filter(|v| !v.is_empty() && !self.error_filter.is_match(v))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            rivers.push(RiverName::new(label, variants));
        }
        rivers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::http::MemFetch;

    #[test]
    fn long_names_substring_match_both_directions() {
        let rhine = RiverName::new("Rhein", vec!["Rhine".to_string(), "Rhin".to_string()]);
        assert!(rhine.matches("Rhein"));
        assert!(rhine.matches("Mittlerer Rhein"));
        assert!(rhine.matches("rhine"));
        assert!(!rhine.matches("Main"));
    }

    #[test]
    fn short_names_require_word_boundary() {
        let po = RiverName::new("Po", Vec::new());
        assert!(po.matches("Po"));
        assert!(po.matches("Fiume Po"));
        assert!(!po.matches("Poland"));
        assert!(!po.matches("Limpopo"));
    }

    #[test]
    fn matching_is_unicode_aware() {
        let river = RiverName::new("Сейм", Vec::new());
        assert!(river.matches("СЕЙМ"));
        assert!(river.matches("річка Сейм"));
    }

    #[test]
    fn tsv_parse_filters_data_errors() {
        let body = "?riverLabel\t?altLabels\nRhein\tRhine|Q102142\nQ4521\t\nhttp://x\t\nLoire\t\n";
        let http = MemFetch::new().route("https://gaz", 200, body.as_bytes().to_vec());
        let resolver = GazetteerResolver::new(&http, "https://gaz");
        let mut log = GenLog::new();
        let rivers = resolver.resolve(&GeoBounds::new(45.0, 46.0, 6.0, 7.0), 50.0, &mut log);
        let names: Vec<&str> = rivers.iter().map(|r| r.display.as_str()).collect();
        assert_eq!(names, vec!["Rhein", "Loire"]);
        assert!(rivers[0].matches("rhine"));
        assert!(!rivers[0].matches("Q102142"));
    }

    #[test]
    fn failed_lookup_is_empty_not_fatal() {
        let http = MemFetch::new().route("https://gaz", 500, Vec::new());
        let resolver = GazetteerResolver::new(&http, "https://gaz");
        let mut log = GenLog::new();
        let rivers = resolver.resolve(&GeoBounds::new(0.0, 1.0, 0.0, 1.0), 50.0, &mut log);
        assert!(rivers.is_empty());
        assert_eq!(log.error_count(), 0); // downgraded to a warning
    }
}
