//! Lexical sentiment scoring.
//!
//! The aggregator only needs a signed score per post (>0 positive, <0 negative,
//! 0 neutral), so the scorer is a small trait with a built-in valence-lexicon
//! implementation. The lexicon carries general sentiment terms plus the
//! football vocabulary fans actually use.

/// Signed real-valued sentiment score for a piece of text.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

/// Word valences, AFINN-style. Matching is on lowercased whole tokens.
const LEXICON: &[(&str, i32)] = &[
    // general positive
    ("amazing", 4),
    ("awesome", 4),
    ("beautiful", 3),
    ("best", 3),
    ("brilliant", 4),
    ("buzzing", 3),
    ("class", 3),
    ("clinical", 2),
    ("composed", 2),
    ("delighted", 3),
    ("dominant", 2),
    ("excellent", 3),
    ("fantastic", 4),
    ("good", 2),
    ("great", 3),
    ("happy", 2),
    ("incredible", 4),
    ("love", 3),
    ("loved", 3),
    ("magic", 3),
    ("masterclass", 4),
    ("outstanding", 4),
    ("perfect", 3),
    ("proud", 2),
    ("quality", 2),
    ("sensational", 4),
    ("solid", 2),
    ("strong", 2),
    ("stunning", 4),
    ("superb", 4),
    ("unreal", 3),
    ("win", 3),
    ("winner", 3),
    ("winning", 3),
    ("wonderful", 3),
    ("worldie", 4),
    // general negative
    ("abysmal", -4),
    ("angry", -2),
    ("atrocious", -4),
    ("awful", -4),
    ("bad", -2),
    ("bottled", -3),
    ("clueless", -3),
    ("defeat", -2),
    ("disaster", -3),
    ("disgrace", -4),
    ("dreadful", -3),
    ("embarrassing", -3),
    ("frustrating", -2),
    ("fuming", -3),
    ("gutted", -3),
    ("hate", -3),
    ("hopeless", -3),
    ("horrible", -3),
    ("loss", -2),
    ("losing", -2),
    ("lost", -2),
    ("nervous", -1),
    ("pathetic", -4),
    ("poor", -2),
    ("robbed", -2),
    ("sack", -3),
    ("shambles", -4),
    ("sloppy", -2),
    ("terrible", -3),
    ("toothless", -3),
    ("useless", -3),
    ("weak", -2),
    ("worst", -3),
    ("worried", -2),
];

const NEGATORS: &[&str] = &["not", "no", "never", "cannot", "cant", "dont", "didnt", "wasnt", "isnt"];

#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    fn valence(token: &str) -> Option<i32> {
        LEXICON.iter().find(|(w, _)| *w == token).map(|(_, v)| *v)
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        let mut total = 0i32;
        let mut prev_was_negator = false;
        for raw in text.split(|c: char| !c.is_alphanumeric() && c != '\'') {
            let token: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(|c| c.to_lowercase())
                .collect();
            if token.is_empty() {
                continue;
            }
            if let Some(v) = Self::valence(&token) {
                // A directly preceding negator flips the word's polarity.
                total += if prev_was_negator { -v } else { v };
            }
            prev_was_negator = NEGATORS.contains(&token.as_str());
        }
        total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_negative_and_neutral_texts() {
        let s = LexiconScorer::new();
        assert!(s.score("Great Arsenal performance!") > 0.0);
        assert!(s.score("Terrible Arsenal performance!") < 0.0);
        assert_eq!(s.score("Arsenal played okay today"), 0.0);
    }

    #[test]
    fn negation_flips_polarity() {
        let s = LexiconScorer::new();
        assert!(s.score("not good from the back line") < 0.0);
        assert!(s.score("not terrible to be fair") > 0.0);
    }

    #[test]
    fn case_and_punctuation_are_ignored() {
        let s = LexiconScorer::new();
        assert_eq!(s.score("BRILLIANT!!!"), s.score("brilliant"));
    }

    #[test]
    fn empty_text_is_neutral() {
        assert_eq!(LexiconScorer::new().score(""), 0.0);
    }
}
