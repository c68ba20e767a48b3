//! Inverted word index over display names.

use std::collections::{HashMap, HashSet};

use countryguard_blocklist::CountryCode;

/// Upper-cased name word → codes whose display name contains that word.
///
/// Only holds words of live entries: a word's set is dropped as soon as it
/// becomes empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameIndex {
    words: HashMap<String, HashSet<CountryCode>>,
}

fn normalized_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().map(str::to_uppercase)
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, code: &CountryCode) {
        for word in normalized_words(name) {
            self.words.entry(word).or_default().insert(code.clone());
        }
    }

    pub fn remove(&mut self, name: &str, code: &CountryCode) {
        for word in normalized_words(name) {
            if let Some(codes) = self.words.get_mut(&word) {
                codes.remove(code);
                if codes.is_empty() {
                    self.words.remove(&word);
                }
            }
        }
    }

    /// Codes indexed under exactly `word` (case-insensitive).
    pub fn lookup(&self, word: &str) -> Option<&HashSet<CountryCode>> {
        self.words.get(&word.to_uppercase())
    }

    /// Codes whose name matches every word of `term`.
    ///
    /// A term word matches an indexed word it is a substring of, so a whole-word
    /// query is the exact case and "KING" still finds "UNITED KINGDOM".
    pub fn matching(&self, term: &str) -> HashSet<CountryCode> {
        let mut result: Option<HashSet<CountryCode>> = None;

        for needle in normalized_words(term) {
            let hits: HashSet<CountryCode> = self
                .words
                .iter()
                .filter(|(word, _)| word.contains(&needle))
                .flat_map(|(_, codes)| codes.iter().cloned())
                .collect();

            result = Some(match result {
                None => hits,
                Some(acc) => acc.intersection(&hits).cloned().collect(),
            });

            if result.as_ref().is_some_and(HashSet::is_empty) {
                break;
            }
        }

        result.unwrap_or_default()
    }

    /// Number of distinct indexed words.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> CountryCode {
        CountryCode::parse(s).unwrap()
    }

    #[test]
    fn words_are_indexed_upper_cased() {
        let mut index = NameIndex::new();
        index.insert("United States", &code("US"));

        assert!(index.lookup("united").unwrap().contains(&code("US")));
        assert!(index.lookup("STATES").unwrap().contains(&code("US")));
        assert_eq!(index.word_count(), 2);
    }

    #[test]
    fn shared_words_keep_every_code() {
        let mut index = NameIndex::new();
        index.insert("United States", &code("US"));
        index.insert("United Kingdom", &code("GB"));

        let united = index.lookup("UNITED").unwrap();
        assert_eq!(united.len(), 2);

        index.remove("United States", &code("US"));
        let united = index.lookup("UNITED").unwrap();
        assert_eq!(united.len(), 1);
        assert!(united.contains(&code("GB")));
    }

    #[test]
    fn removing_last_code_drops_the_word() {
        let mut index = NameIndex::new();
        index.insert("Germany", &code("DE"));
        index.remove("Germany", &code("DE"));

        assert!(index.lookup("GERMANY").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn removing_unknown_name_is_a_no_op() {
        let mut index = NameIndex::new();
        index.insert("France", &code("FR"));
        index.remove("Spain", &code("ES"));
        index.remove("France", &code("ES"));

        assert!(index.lookup("FRANCE").unwrap().contains(&code("FR")));
    }

    #[test]
    fn matching_requires_every_term_word() {
        let mut index = NameIndex::new();
        index.insert("United States", &code("US"));
        index.insert("United Kingdom", &code("GB"));

        let hits = index.matching("united king");
        assert_eq!(hits.len(), 1);
        assert!(hits.contains(&code("GB")));

        assert_eq!(index.matching("united").len(), 2);
        assert!(index.matching("united mexico").is_empty());
        assert!(index.matching("   ").is_empty());
    }
}
