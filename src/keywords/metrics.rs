//! Deterministic keyword scoring: difficulty, intent, CPC estimate, and
//! opportunity. Pure functions of the keyword text; the scale is relied on
//! by downstream sorting and filtering, so the constants are fixed.

use serde::Serialize;

use super::autocomplete::KeywordCandidate;

const BASE_DIFFICULTY: i32 = 50;
const MIN_DIFFICULTY: i32 = 10;
const MAX_DIFFICULTY: i32 = 95;
const BASE_CPC: f64 = 1.5;
const COMMERCIAL_OPPORTUNITY_BONUS: i32 = 20;

const COMMERCIAL_CUES: &[&str] = &[
    "buy", "price", "prices", "pricing", "cost", "costs", "cheap", "cheapest", "deal", "deals",
    "discount", "coupon", "affordable", "sale", "order", "purchase", "quote", "hire", "shop",
    "subscription", "plans", "book", "subscribe",
];

const PURCHASE_VERBS: &[&str] = &["buy", "order", "purchase", "hire", "shop", "book", "subscribe"];

const LOCAL_CUES: &[&str] = &["near me", "nearby", "near", "local", "open now", "in my area", "directions"];

const QUESTION_WORDS: &[&str] = &[
    "how", "what", "why", "when", "where", "who", "which", "can", "does", "do", "is", "are",
    "should",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Intent {
    Informational,
    Commercial,
    /// Part of the published taxonomy; the lexical rules below do not
    /// currently assign it.
    #[serde(rename = "Commercial-Investigation")]
    CommercialInvestigation,
    Transactional,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DifficultyLabel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLabel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..40 => DifficultyLabel::Easy,
            40..65 => DifficultyLabel::Medium,
            _ => DifficultyLabel::Hard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredKeyword {
    #[serde(flatten)]
    pub candidate: KeywordCandidate,
    pub difficulty_score: u32,
    pub difficulty_label: DifficultyLabel,
    pub estimated_cpc: f64,
    pub intent: Intent,
    pub opportunity_score: u32,
}

impl ScoredKeyword {
    pub fn text(&self) -> &str {
        &self.candidate.text
    }
}

/// Lexical features the formulas read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cues {
    words: usize,
    commercial: bool,
    purchase: bool,
    local: bool,
    question: bool,
}

impl Cues {
    fn of(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|word| !word.is_empty())
            .collect();
        let padded = format!(" {} ", words.join(" "));

        Self {
            words: text.split_whitespace().count(),
            commercial: any_cue(&words, &padded, COMMERCIAL_CUES),
            purchase: any_cue(&words, &padded, PURCHASE_VERBS),
            local: any_cue(&words, &padded, LOCAL_CUES),
            question: lowered.trim_end().ends_with('?')
                || words
                    .first()
                    .is_some_and(|first| QUESTION_WORDS.contains(first)),
        }
    }
}

fn any_cue(words: &[&str], padded: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| {
        if cue.contains(' ') {
            padded.contains(&format!(" {cue} "))
        } else {
            words.contains(cue)
        }
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMetricsEstimator;

impl KeywordMetricsEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, keyword: impl Into<KeywordCandidate>) -> ScoredKeyword {
        let candidate = keyword.into();
        let cues = Cues::of(&candidate.text);
        let difficulty = difficulty_score(&cues);
        ScoredKeyword {
            difficulty_score: difficulty,
            difficulty_label: DifficultyLabel::from_score(difficulty),
            estimated_cpc: estimated_cpc(&cues),
            intent: intent(&cues),
            opportunity_score: opportunity_score(difficulty, &cues),
            candidate,
        }
    }
}

fn difficulty_score(cues: &Cues) -> u32 {
    let mut score = BASE_DIFFICULTY;
    if cues.words >= 4 {
        score -= 20;
    }
    if cues.words >= 6 {
        score -= 15;
    }
    if cues.commercial {
        score += 15;
    }
    if cues.local {
        score -= 10;
    }
    if cues.question {
        score -= 5;
    }
    score.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY) as u32
}

fn estimated_cpc(cues: &Cues) -> f64 {
    let mut cpc = BASE_CPC;
    if cues.commercial {
        cpc *= 2.5;
    }
    if cues.local {
        cpc *= 1.5;
    }
    if cues.words >= 4 {
        cpc *= 0.7;
    }
    (cpc * 100.0).round() / 100.0
}

fn intent(cues: &Cues) -> Intent {
    if cues.purchase {
        Intent::Transactional
    } else if cues.commercial {
        Intent::Commercial
    } else if cues.local {
        Intent::Local
    } else {
        Intent::Informational
    }
}

fn opportunity_score(difficulty: u32, cues: &Cues) -> u32 {
    let bonus = if cues.commercial {
        COMMERCIAL_OPPORTUNITY_BONUS
    } else {
        0
    };
    (100 - difficulty as i32 + bonus).max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commercial_phrase_outranks_question_in_difficulty() {
        let estimator = KeywordMetricsEstimator::new();
        let deal = estimator.score("cheap internet deal");
        let question = estimator.score("how does fiber internet work");

        assert_eq!(deal.intent, Intent::Commercial);
        assert_eq!(deal.difficulty_score, 65);
        assert_eq!(deal.difficulty_label, DifficultyLabel::Hard);
        assert_eq!(deal.estimated_cpc, 3.75);
        assert_eq!(deal.opportunity_score, 55);

        assert_eq!(question.intent, Intent::Informational);
        assert_eq!(question.difficulty_score, 25);
        assert_eq!(question.difficulty_label, DifficultyLabel::Easy);
        assert_eq!(question.estimated_cpc, 1.05);
        assert_eq!(question.opportunity_score, 75);

        assert!(deal.difficulty_score > question.difficulty_score);
    }

    #[test]
    fn scoring_is_deterministic() {
        let estimator = KeywordMetricsEstimator::new();
        for text in ["cheap internet deal", "how does fiber internet work", "plumber near me"] {
            assert_eq!(estimator.score(text), estimator.score(text));
        }
    }

    #[test]
    fn long_phrases_take_both_length_penalties() {
        let scored = KeywordMetricsEstimator.score("what is the best way to learn rust programming");
        assert_eq!(scored.difficulty_score, 10);
        assert_eq!(scored.opportunity_score, 90);
    }

    #[test]
    fn purchase_verbs_are_transactional() {
        let scored = KeywordMetricsEstimator.score("buy running shoes");
        assert_eq!(scored.intent, Intent::Transactional);
        assert_eq!(scored.difficulty_score, 65);
    }

    #[test]
    fn every_purchase_verb_is_also_a_commercial_cue() {
        for verb in PURCHASE_VERBS {
            assert!(COMMERCIAL_CUES.contains(verb), "{verb}");
        }
        let scored = KeywordMetricsEstimator.score("book a hotel");
        assert_eq!(scored.intent, Intent::Transactional);
        assert_eq!(scored.difficulty_score, 65);
        assert_eq!(scored.estimated_cpc, 3.75);
        assert_eq!(scored.opportunity_score, 55);
    }

    #[test]
    fn intent_labels_serialize_as_taxonomy_names() {
        let labels: Vec<serde_json::Value> = [
            Intent::Informational,
            Intent::Commercial,
            Intent::CommercialInvestigation,
            Intent::Transactional,
            Intent::Local,
        ]
        .iter()
        .map(|intent| serde_json::to_value(intent).unwrap())
        .collect();
        assert_eq!(
            labels,
            vec![
                "Informational",
                "Commercial",
                "Commercial-Investigation",
                "Transactional",
                "Local"
            ]
        );
    }

    #[test]
    fn local_cues_lower_difficulty_and_raise_cpc() {
        let scored = KeywordMetricsEstimator.score("plumber near me");
        assert_eq!(scored.intent, Intent::Local);
        assert_eq!(scored.difficulty_score, 40);
        assert_eq!(scored.difficulty_label, DifficultyLabel::Medium);
        assert_eq!(scored.estimated_cpc, 2.25);
    }

    #[test]
    fn cues_match_whole_words_only() {
        // "nearest" is not "near", "costume" is not "cost"
        let scored = KeywordMetricsEstimator.score("costume nearest");
        assert_eq!(scored.intent, Intent::Informational);
        assert_eq!(scored.difficulty_score, 50);
    }

    #[test]
    fn serializes_flat_camel_case() {
        let scored = KeywordMetricsEstimator.score(KeywordCandidate::new("fiber deals", 3));
        let json = serde_json::to_value(&scored).unwrap();
        assert_eq!(json["text"], "fiber deals");
        assert_eq!(json["sourceRank"], 3);
        assert_eq!(json["intent"], "Commercial");
        assert_eq!(json["difficultyLabel"], "Hard");
        assert!(json.get("opportunityScore").is_some());
    }
}
