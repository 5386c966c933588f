//! Maps recognized label text to a catalog product.
//!
//! Two tiers: exact keyword containment in catalog order, then a best-effort
//! normalized Levenshtein pass when nothing matched exactly.

use strsim::normalized_levenshtein;
use tracing::debug;

use super::normalize::normalize;
use crate::models::product::{Catalog, MatchMethod, MatchResult, Product};

/// Match raw OCR text against the catalog
pub fn match_product<'a>(raw_text: &str, catalog: &'a Catalog, fuzzy_threshold: f64) -> MatchResult<'a> {
    let text = normalize(raw_text);

    if let Some(product) = keyword_match(&text, catalog) {
        debug!(product = %product.id, "keyword_match");
        return MatchResult {
            product: Some(product),
            method: MatchMethod::Keyword,
        };
    }

    match best_fuzzy_candidate(&text, catalog) {
        Some((product, score)) if score >= fuzzy_threshold => {
            debug!(product = %product.id, score, "fuzzy_match");
            MatchResult {
                product: Some(product),
                method: MatchMethod::Fuzzy,
            }
        }
        Some((product, score)) => {
            debug!(closest = %product.id, score, threshold = fuzzy_threshold, "no_match");
            MatchResult::none()
        }
        None => MatchResult::none(),
    }
}

/// First product (in catalog order) with a keyword contained in `text`
fn keyword_match<'a>(text: &str, catalog: &'a Catalog) -> Option<&'a Product> {
    catalog.products().iter().find(|product| {
        normalized_keywords(product).any(|keyword| text.contains(keyword.as_str()))
    })
}

/// Highest-scoring (product, score) over every keyword against the whole text
/// and each space-separated token. Ties keep the earliest candidate.
fn best_fuzzy_candidate<'a>(text: &str, catalog: &'a Catalog) -> Option<(&'a Product, f64)> {
    let tokens: Vec<&str> = text.split(' ').collect();
    let mut best: Option<(&Product, f64)> = None;

    for product in catalog.products() {
        for keyword in normalized_keywords(product) {
            let candidates = std::iter::once(text).chain(tokens.iter().copied());
            for candidate in candidates {
                let score = similarity(&keyword, candidate);
                if best.map_or(true, |(_, top)| score > top) {
                    best = Some((product, score));
                }
            }
        }
    }

    best
}

/// `1 - levenshtein(a, b) / max(len(a), len(b))`, with two empty strings scoring 1
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

// Empty keywords would contain-match everything, so they are ignored.
fn normalized_keywords(product: &Product) -> impl Iterator<Item = String> + '_ {
    product
        .keywords
        .iter()
        .map(|k| normalize(k))
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f64 = 0.75;

    fn foo_bar_catalog() -> Catalog {
        Catalog::new(vec![
            Product::new("A", "Foo", &["FOO"]),
            Product::new("B", "Bar", &["BAR"]),
        ])
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("ABC", "ABC"), 1.0);
        assert_eq!(similarity("ABC", ""), 0.0);
        assert!((similarity("F0O", "FOO") - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_match() {
        let catalog = foo_bar_catalog();
        let result = match_product("some FOO label", &catalog, THRESHOLD);

        assert_eq!(result.product_id(), Some("A"));
        assert_eq!(result.method, MatchMethod::Keyword);
    }

    #[test]
    fn test_keyword_match_is_case_and_accent_insensitive() {
        let catalog = Catalog::new(vec![Product::new("sian_etupaarusto", "Sian etupäärusto", &["ETUPÄÄRUSTO"])]);
        let result = match_product("sian etuparusto / etupaarusto 2,1 kg", &catalog, THRESHOLD);

        assert_eq!(result.product_id(), Some("sian_etupaarusto"));
        assert_eq!(result.method, MatchMethod::Keyword);
    }

    #[test]
    fn test_catalog_order_is_priority() {
        let catalog = Catalog::new(vec![
            Product::new("first", "First", &["BAR"]),
            Product::new("second", "Second", &["FOO"]),
        ]);
        let result = match_product("FOO BAR", &catalog, THRESHOLD);

        assert_eq!(result.product_id(), Some("first"));
    }

    #[test]
    fn test_keyword_beats_fuzzy() {
        // "FOX" is a closer fuzzy candidate for product A's keyword but B matches exactly
        let catalog = Catalog::new(vec![
            Product::new("A", "Fox", &["FOXX"]),
            Product::new("B", "Bar", &["BAR"]),
        ]);
        let result = match_product("FOX BAR", &catalog, THRESHOLD);

        assert_eq!(result.product_id(), Some("B"));
        assert_eq!(result.method, MatchMethod::Keyword);
    }

    #[test]
    fn test_single_substitution_in_short_word_is_below_threshold() {
        let catalog = foo_bar_catalog();

        let result = match_product("some F0O label", &catalog, THRESHOLD);
        assert!(result.product.is_none());
        assert_eq!(result.method, MatchMethod::None);

        let result = match_product("some FO0 label", &catalog, THRESHOLD);
        assert!(result.product.is_none());
    }

    #[test]
    fn test_fuzzy_match_on_token() {
        let catalog = Catalog::new(vec![Product::new("jauheliha", "Naudan jauheliha", &["JAUHELIHA"])]);
        // One misread letter out of nine
        let result = match_product("NAUDAN JAUHEL1HA 400 G", &catalog, THRESHOLD);

        assert_eq!(result.product_id(), Some("jauheliha"));
        assert_eq!(result.method, MatchMethod::Fuzzy);
    }

    #[test]
    fn test_fuzzy_match_on_full_text() {
        let catalog = Catalog::new(vec![Product::new("kassler", "Kassler", &["PORSAAN KASSLER"])]);
        let result = match_product("porsaan kass1er", &catalog, THRESHOLD);

        assert_eq!(result.product_id(), Some("kassler"));
        assert_eq!(result.method, MatchMethod::Fuzzy);
    }

    #[test]
    fn test_fuzzy_tie_keeps_first_candidate() {
        let catalog = Catalog::new(vec![
            Product::new("first", "First", &["ABCDX"]),
            Product::new("second", "Second", &["ABCDY"]),
        ]);
        let result = match_product("ABCDZ", &catalog, THRESHOLD);

        assert_eq!(result.product_id(), Some("first"));
        assert_eq!(result.method, MatchMethod::Fuzzy);
    }

    #[test]
    fn test_empty_catalog() {
        let empty = Catalog::default();
        let result = match_product("anything", &empty, THRESHOLD);
        assert_eq!(result, MatchResult::none());
    }

    #[test]
    fn test_product_without_keywords_never_matches() {
        let catalog = Catalog::new(vec![Product::new("bare", "Bare", &[]), Product::new("blank", "Blank", &["", "  "])]);
        let result = match_product("BARE", &catalog, THRESHOLD);
        assert!(result.product.is_none());
    }
}
