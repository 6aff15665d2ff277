//! Duplicate/record reconciliation scorer run before items enter the queue.
//!
//! Pure and independent of the lane: callers classify each candidate against
//! their existing records and decide what to enqueue.

/// Best-match threshold below which a candidate counts as `New`.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

/// An already-known record a candidate is compared against.
#[derive(Debug, Clone)]
pub struct ExistingRecord {
    pub name: String,
    /// Normalized exact-match key (e.g. a digits-only phone, or a
    /// name+amount+date fingerprint). `None` opts the record out of exact
    /// matching.
    pub key: Option<String>,
}

impl ExistingRecord {
    pub fn new(name: impl Into<String>, key: Option<String>) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }
}

/// How exact keys are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// Strict equality of normalized keys.
    Exact,
    /// Loose phone matching: normalized numbers are equal or one contains
    /// the other (catches country-code prefixes like 55 + same number).
    PhoneContains,
}

/// Outcome of classifying one candidate. Indexes refer to the `existing`
/// slice passed to [`classify`].
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Exact match on the normalized key.
    Duplicate { index: usize },
    /// No exact match, but the best name similarity reached the threshold.
    Similar { index: usize, score: f64 },
    New,
}

/// Classify a candidate against existing records: exact-key duplicates win,
/// then the best-scoring similar name at or above [`SIMILARITY_THRESHOLD`],
/// ties broken by first-encountered order.
pub fn classify(
    candidate_name: &str,
    candidate_key: Option<&str>,
    existing: &[ExistingRecord],
    key_match: KeyMatch,
) -> Classification {
    if let Some(candidate_key) = candidate_key {
        for (index, record) in existing.iter().enumerate() {
            let matched = match (&record.key, key_match) {
                (Some(key), KeyMatch::Exact) => key == candidate_key,
                (Some(key), KeyMatch::PhoneContains) => phones_match(key, candidate_key),
                (None, _) => false,
            };
            if matched {
                return Classification::Duplicate { index };
            }
        }
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, record) in existing.iter().enumerate() {
        let score = name_similarity(candidate_name, &record.name);
        // Strict > keeps the first-encountered record on ties.
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((index, score));
        }
    }
    match best {
        Some((index, score)) if score >= SIMILARITY_THRESHOLD => {
            Classification::Similar { index, score }
        }
        _ => Classification::New,
    }
}

/// Similarity score for two names; higher is closer, 1.0 is an exact match
/// after normalization.
///
/// Equality after lowercase+trim scores 1.0; containment scores the length
/// ratio; otherwise a blend of word overlap (weight 0.7) and positional
/// character overlap (weight 0.3). The character component is a naive
/// same-position comparison, not an edit distance.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a == b {
        return 1.0;
    }

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a.contains(&b) || b.contains(&a) {
        let shorter = a_len.min(b_len);
        let longer = a_len.max(b_len);
        return shorter as f64 / longer as f64;
    }

    let words_a: Vec<&str> = a.split_whitespace().filter(|w| w.chars().count() > 2).collect();
    let words_b: Vec<&str> = b.split_whitespace().filter(|w| w.chars().count() > 2).collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let common = words_a
        .iter()
        .copied()
        .filter(|&wa| {
            words_b
                .iter()
                .copied()
                .any(|wb| wa == wb || wa.contains(wb) || wb.contains(wa))
        })
        .count();
    let mut union: Vec<&str> = Vec::new();
    for word in words_a.iter().copied().chain(words_b.iter().copied()) {
        if !union.contains(&word) {
            union.push(word);
        }
    }
    let word_sim = 2.0 * common as f64 / union.len() as f64;

    let chars_a: Vec<char> = a.chars().collect();
    let chars_b: Vec<char> = b.chars().collect();
    let matching = chars_a
        .iter()
        .zip(chars_b.iter())
        .filter(|(ca, cb)| ca == cb)
        .count();
    let char_sim = matching as f64 / a_len.max(b_len) as f64;

    0.7 * word_sim + 0.3 * char_sim
}

/// Strip everything but digits.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Loose phone comparison on normalized forms: equal, or one a substring of
/// the other. Empty numbers never match.
pub fn phones_match(a: &str, b: &str) -> bool {
    let a = normalize_phone(a);
    let b = normalize_phone(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}
