//! Declarative dish-name rewrite rules.
//!
//! Aliases are data, not code: an ordered rule list evaluated once per
//! resolve call. The first rule whose pattern appears in the query (as a
//! case-insensitive substring) rewrites it; rules are never applied
//! cumulatively.

use once_cell::sync::Lazy;
use serde::Deserialize;

use super::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AliasRule {
    pub pattern: String,
    pub canonical: String,
}

/// Outcome of applying the first matching rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// The query with the matched substring replaced by the canonical form.
    pub rewritten: String,
    /// The bare canonical category word the rule points at.
    pub canonical: String,
}

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    rules: Vec<AliasRule>,
}

#[derive(Debug, Deserialize)]
struct AliasDocument {
    #[serde(default)]
    rules: Vec<AliasRule>,
}

static BUILTIN: Lazy<AliasTable> = Lazy::new(|| {
    AliasTable::new(
        [
            ("banh mi", "Sandwich"),
            ("banhmi", "Sandwich"),
            ("bánh mì", "Sandwich"),
            ("baguette", "Sandwich"),
            ("noodle soup", "Pho"),
            ("bun thit", "Vermicelli"),
            ("summer roll", "Spring Roll"),
        ]
        .into_iter()
        .map(|(pattern, canonical)| AliasRule {
            pattern: pattern.to_string(),
            canonical: canonical.to_string(),
        })
        .collect(),
    )
});

impl AliasTable {
    #[must_use]
    pub fn new(rules: Vec<AliasRule>) -> Self {
        Self { rules }
    }

    /// The compiled-in rule set used when no alias file is configured.
    #[must_use]
    pub fn builtin() -> &'static AliasTable {
        &BUILTIN
    }

    /// Parse a TOML document of the form `rules = [{ pattern, canonical }]`.
    pub fn from_toml_str(raw: &str) -> Result<Self, DomainError> {
        let document: AliasDocument = toml::from_str(raw)
            .map_err(|err| DomainError::validation(format!("alias rules are not valid: {err}")))?;
        for rule in &document.rules {
            if rule.pattern.trim().is_empty() || rule.canonical.trim().is_empty() {
                return Err(DomainError::validation(
                    "alias rules need a non-empty pattern and canonical form",
                ));
            }
        }
        Ok(Self::new(document.rules))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the first rule whose pattern matches; `None` when nothing does.
    #[must_use]
    pub fn rewrite(&self, query: &str) -> Option<Rewrite> {
        for rule in &self.rules {
            if let Some((start, end)) = find_ci(query, &rule.pattern) {
                let mut rewritten = String::with_capacity(query.len());
                rewritten.push_str(&query[..start]);
                rewritten.push_str(&rule.canonical);
                rewritten.push_str(&query[end..]);
                return Some(Rewrite {
                    rewritten: rewritten.trim().to_string(),
                    canonical: rule.canonical.clone(),
                });
            }
        }
        None
    }
}

/// Case-insensitive substring search returning byte bounds into `haystack`.
/// Walks characters rather than lowercasing the whole string so byte offsets
/// stay valid for non-ASCII dish names.
fn find_ci(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let needle_folded: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    let indexed: Vec<(usize, char)> = haystack.char_indices().collect();

    for i in 0..indexed.len() {
        let mut folded = Vec::with_capacity(needle_folded.len());
        let mut j = i;
        while folded.len() < needle_folded.len() && j < indexed.len() {
            folded.extend(indexed[j].1.to_lowercase());
            j += 1;
        }
        if folded == needle_folded {
            let start = indexed[i].0;
            let end = if j < indexed.len() {
                indexed[j].0
            } else {
                haystack.len()
            };
            return Some((start, end));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rules: &[(&str, &str)]) -> AliasTable {
        AliasTable::new(
            rules
                .iter()
                .map(|(pattern, canonical)| AliasRule {
                    pattern: (*pattern).to_string(),
                    canonical: (*canonical).to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn first_matching_rule_wins() {
        let aliases = table(&[("banhmi", "Sandwich"), ("banh", "Bread")]);
        let rewrite = aliases.rewrite("Chicken Banhmi").expect("rule matches");
        assert_eq!(rewrite.rewritten, "Chicken Sandwich");
        assert_eq!(rewrite.canonical, "Sandwich");
    }

    #[test]
    fn rules_are_not_cumulative() {
        let aliases = table(&[("noodle soup", "Pho"), ("pho", "Soup")]);
        let rewrite = aliases.rewrite("Beef Noodle Soup").expect("rule matches");
        // Only the first match rewrites; the result is not re-scanned.
        assert_eq!(rewrite.rewritten, "Beef Pho");
    }

    #[test]
    fn match_is_case_insensitive() {
        let aliases = table(&[("banh mi", "Sandwich")]);
        assert!(aliases.rewrite("BANH MI deluxe").is_some());
        assert!(aliases.rewrite("Pho").is_none());
    }

    #[test]
    fn non_ascii_patterns_keep_byte_offsets_straight() {
        let aliases = table(&[("bánh mì", "Sandwich")]);
        let rewrite = aliases.rewrite("Grilled Bánh Mì").expect("rule matches");
        assert_eq!(rewrite.rewritten, "Grilled Sandwich");
    }

    #[test]
    fn toml_rules_round_trip() {
        let aliases = AliasTable::from_toml_str(
            r#"
            [[rules]]
            pattern = "hoagie"
            canonical = "Sandwich"
            "#,
        )
        .expect("valid document");
        assert_eq!(aliases.len(), 1);
        assert!(aliases.rewrite("Turkey Hoagie").is_some());
    }

    #[test]
    fn toml_rules_reject_blank_fields() {
        let err = AliasTable::from_toml_str(
            r#"
            [[rules]]
            pattern = ""
            canonical = "Sandwich"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn builtin_rules_cover_the_sandwich_family() {
        let rewrite = AliasTable::builtin()
            .rewrite("Chicken Banhmi")
            .expect("builtin rule");
        assert_eq!(rewrite.canonical, "Sandwich");
    }
}
