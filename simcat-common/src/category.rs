//! Tag → category label classifier
//!
//! Maps a free-text tag set onto one label of a small closed vocabulary by
//! counting keyword overlap. The rule table is an ordered list; when two
//! labels score the same, the one defined first wins. A hash map would make
//! that tie-break depend on hashing, so the table is never stored in one.

use crate::error::EmbeddingError;
use std::collections::{BTreeSet, HashSet};

/// Default mood rules, in tie-break order
pub const DEFAULT_MOOD_RULES: &[(&str, &[&str])] = &[
    (
        "focus",
        &[
            "ambient", "instrumental", "minimal", "lofi", "concentration", "study", "work",
            "deep", "calm", "meditation", "deepwork", "coding", "productivity",
        ],
    ),
    (
        "energetic",
        &[
            "upbeat", "dance", "electronic", "edm", "workout", "party", "energetic", "fast",
            "pump", "high-energy", "rock", "metal", "trap", "drum-and-bass", "dnb", "techno",
            "house",
        ],
    ),
    (
        "chill",
        &[
            "chill", "relaxing", "downtempo", "smooth", "jazz", "acoustic", "mellow",
            "laid-back", "easy", "soft", "lounge", "chillout", "lo-fi", "beats",
        ],
    ),
    (
        "melancholic",
        &[
            "sad", "melancholic", "emotional", "dark", "moody", "introspective", "somber",
            "melancholy", "blue", "nostalgic", "reflective", "depressing", "gloomy",
        ],
    ),
    (
        "happy",
        &[
            "happy", "uplifting", "cheerful", "positive", "joyful", "bright", "feel-good",
            "sunshine", "optimistic", "fun", "poppy", "pop",
        ],
    ),
];

/// One label and its keyword set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    label: String,
    keywords: BTreeSet<String>,
}

impl CategoryRule {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }
}

/// Ordered label → keywords table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<CategoryRule>,
}

impl RuleTable {
    /// Build a table from `(label, keywords)` pairs, keeping their order
    ///
    /// Labels and keywords are normalized the same way input tags are
    /// (trimmed, lowercased). Labels must be non-blank and unique after
    /// normalization.
    pub fn new<L, K, I>(rules: I) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = (L, K)>,
        L: Into<String>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut table = Vec::new();

        for (label, keywords) in rules {
            let label = label.into().trim().to_lowercase();
            if label.is_empty() {
                return Err(EmbeddingError::InvalidRuleTable(
                    "label cannot be blank".to_string(),
                ));
            }
            if !seen.insert(label.clone()) {
                return Err(EmbeddingError::InvalidRuleTable(format!(
                    "label '{}' is defined more than once",
                    label
                )));
            }
            let keywords = keywords
                .into_iter()
                .filter_map(|k| normalize_tag(k.as_ref()))
                .collect();
            table.push(CategoryRule { label, keywords });
        }

        if table.is_empty() {
            return Err(EmbeddingError::InvalidRuleTable(
                "rule table is empty".to_string(),
            ));
        }

        Ok(Self { rules: table })
    }

    /// Stock mood table: focus, energetic, chill, melancholic, happy
    pub fn default_moods() -> Self {
        Self {
            rules: DEFAULT_MOOD_RULES
                .iter()
                .map(|(label, keywords)| CategoryRule {
                    label: (*label).to_string(),
                    keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
                })
                .collect(),
        }
    }

    /// Labels in definition order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.label.as_str())
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.rules.iter().any(|r| r.label == label)
    }

    /// Representative keywords for a label
    pub fn keywords_for(&self, label: &str) -> Option<&BTreeSet<String>> {
        self.rules
            .iter()
            .find(|r| r.label == label)
            .map(|r| &r.keywords)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::default_moods()
    }
}

/// Keyword-overlap classifier over a [`RuleTable`]
#[derive(Debug, Clone, Default)]
pub struct CategoryClassifier {
    table: RuleTable,
}

impl CategoryClassifier {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Classify a tag set
    ///
    /// Tags are trimmed and lowercased; duplicates count once. Returns the
    /// label with the most matching keywords, the earliest-defined label on
    /// a tie, or `None` when nothing matches.
    pub fn classify<I>(&self, tags: I) -> Option<&str>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let tags: BTreeSet<String> = tags
            .into_iter()
            .filter_map(|t| normalize_tag(t.as_ref()))
            .collect();
        if tags.is_empty() {
            return None;
        }

        let mut best: Option<(&str, usize)> = None;
        for rule in &self.table.rules {
            let score = rule.keywords.intersection(&tags).count();
            if score == 0 {
                continue;
            }
            // Strictly greater only: earlier labels keep ties
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((rule.label.as_str(), score));
            }
        }

        best.map(|(label, _)| label)
    }
}

fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}
