//! Regex-based classifier.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Classifier, Intent, IntentSet};

/// Questions about history or totals. These win over food detection so that
/// "what did I eat today?" is never logged as a meal.
static QUERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \bwhat\s+(did|have)\s+i\s+(eat|eaten|had|have|log|logged)\b
        | \bhave\s+i\s+(eaten|had|logged)\b
        | \bshow\s+me\b
        | \bhow\s+(many|much)\s+(calories|protein|carbs|fat|kcal)\s+(have|did|do)\s+i\b
        | \bhow\s+am\s+i\s+doing\b
        | \b(today'?s|my)\s+(log|diary|intake|totals?|summary)\b
        | \bwhat'?s\s+(left|remaining)\b
        ",
    )
    .unwrap()
});

static SEARCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \bhow\s+many\s+(calories|kcal)\s+(are\s+|is\s+)?in\b
        | \b(calories|nutrition|macros|protein)\s+(in|of|for)\b
        | \b(search|look\s+up|lookup)\b
        | \bis\s+(a|an)?\s*\w+\s+healthy\b
        ",
    )
    .unwrap()
});

static FOOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b(i|i've|i\s+have|just)\s+(had|ate|eaten|eat|drank|drink|snacked|finished)\b
        | \bfor\s+(breakfast|lunch|dinner|a\s+snack)\b
        | \b(breakfast|lunch|dinner|snack|meal)\s+(was|is)\b
        | \blog\s+(my\s+|a\s+|an\s+|some\s+)?(food|meal|breakfast|lunch|dinner|snack)\b
        | \b(banana|apple|orange|egg|eggs|toast|bread|coffee|latte|tea|sandwich|salad|pizza|burger|chicken|rice|pasta|oatmeal|yogurt|cereal|cheese|steak|fish|soup|smoothie|cookie|chips)\b
        ",
    )
    .unwrap()
});

static WEIGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b(weigh|weighed|weighing|weight|scale)\b
        | \b\d+(\.\d+)?\s?(kg|kgs|kilos?|lbs?|pounds)\b
        ",
    )
    .unwrap()
});

static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(progress|on\s+track|trend|remaining|stats|streak|goal\s+so\s+far)\b").unwrap()
});

static GREETING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(hi|hello|hey|hiya|howdy|good\s+(morning|afternoon|evening))\b").unwrap()
});

static PHOTO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(photo|picture|pic|image|snap)\b").unwrap());

/// Fixed confirmation vocabulary, matched case-insensitively on word boundaries.
const CONFIRMATION_PHRASES: &[&str] = &[
    "yes",
    "yep",
    "yeah",
    "yup",
    "ya",
    "sure",
    "correct",
    "that's right",
    "thats right",
    "that is right",
    "ok",
    "okay",
    "confirm",
    "confirmed",
    "log it",
    "sounds good",
    "looks good",
    "perfect",
    "exactly",
    "do it",
];

static CONFIRMATION_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = CONFIRMATION_PHRASES
        .iter()
        .map(|p| regex::escape(p).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b({})\b", alternatives)).unwrap()
});

/// Negations, hedges, corrections and questions. Any of these in the message
/// means it is not an unconditional yes.
static NOT_CONFIRMATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b(no|nope|nah|not|never|wrong|incorrect|wait|hold\s+on|but|actually|instead|change|except|unless|sure\s+if)\b
        | n't\b
        | \bdont\b
        | \?
        ",
    )
    .unwrap()
});

/// Words that may pad a confirmation without changing it.
const CONFIRMATION_FILLER: &[&str] = &[
    "please", "thanks", "thank", "you", "thing", "that", "it", "go", "ahead", "great", "and",
    "so", "then", "just", "all", "good",
];

/// Longer messages carry content of their own and are not plain replies.
const MAX_CONFIRMATION_WORDS: usize = 6;

/// A confirmation phrase that makes up most of a short message with no
/// negation, correction or question in it.
fn is_confirmation(text: &str) -> bool {
    if NOT_CONFIRMATION_RE.is_match(text) || !CONFIRMATION_RE.is_match(text) {
        return false;
    }
    let words = text.split_whitespace().count();
    if words > MAX_CONFIRMATION_WORDS {
        return false;
    }
    let rest = CONFIRMATION_RE.replace_all(text, " ");
    let leftover = rest
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty() && !CONFIRMATION_FILLER.contains(w))
        .count();
    leftover * 2 <= words
}

/// Classifier backed by compiled regular expressions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexClassifier;

impl RegexClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Classifier for RegexClassifier {
    fn detect_intents(&self, message: &str) -> IntentSet {
        let text = message.trim().to_lowercase().replace('\u{2019}', "'");
        let mut intents = IntentSet::new();
        if text.is_empty() {
            return intents;
        }

        let is_query = QUERY_RE.is_match(&text);
        if is_query {
            intents.insert(Intent::Query);
            intents.insert(Intent::Progress);
        }
        if SEARCH_RE.is_match(&text) {
            intents.insert(Intent::Search);
        }
        if !is_query && !intents.contains(&Intent::Search) && FOOD_RE.is_match(&text) {
            intents.insert(Intent::Food);
        }
        if WEIGHT_RE.is_match(&text) {
            intents.insert(Intent::Weight);
        }
        if PROGRESS_RE.is_match(&text) {
            intents.insert(Intent::Progress);
        }
        if GREETING_RE.is_match(&text) {
            intents.insert(Intent::Greeting);
        }
        if PHOTO_RE.is_match(&text) {
            intents.insert(Intent::Photo);
        }
        if is_confirmation(&text) {
            intents.insert(Intent::Confirmation);
        }

        intents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(message: &str) -> IntentSet {
        RegexClassifier::new().detect_intents(message)
    }

    #[test]
    fn test_query_precedence() {
        let intents = detect("What did I eat today?");
        assert!(intents.contains(&Intent::Query));
        assert!(intents.contains(&Intent::Progress));
        assert!(!intents.contains(&Intent::Food));
    }

    #[test]
    fn test_query_with_food_words() {
        let intents = detect("show me the banana and toast I had");
        assert!(intents.contains(&Intent::Query));
        assert!(!intents.contains(&Intent::Food));
    }

    #[test]
    fn test_food_statement() {
        let intents = detect("I had a banana");
        assert!(intents.contains(&Intent::Food));
        assert!(!intents.contains(&Intent::Query));
    }

    #[test]
    fn test_food_for_meal() {
        assert!(detect("two eggs for breakfast").contains(&Intent::Food));
    }

    #[test]
    fn test_confirmation_vocabulary() {
        for msg in ["yes", "Yep!", "sure thing", "That's right", "ok log it", "YES PLEASE"] {
            assert!(
                detect(msg).contains(&Intent::Confirmation),
                "{} should be a confirmation",
                msg
            );
        }
        assert!(!detect("eyes hurt").contains(&Intent::Confirmation));
        assert!(!detect("no thanks").contains(&Intent::Confirmation));
    }

    #[test]
    fn test_negated_or_questioning_replies_are_not_confirmations() {
        for msg in [
            "no, that's not correct",
            "not sure",
            "ok but it was two bananas",
            "is pizza ok?",
            "yes?",
            "that's not right",
            "don't log it",
            "actually it was an apple, ok",
        ] {
            assert!(
                !detect(msg).contains(&Intent::Confirmation),
                "{} should not be a confirmation",
                msg
            );
        }
    }

    #[test]
    fn test_confirmation_inside_a_long_message() {
        let long = detect("ok so yesterday I went to the gym and then had lunch");
        assert!(!long.contains(&Intent::Confirmation));
        assert!(detect("yes that's right, thanks").contains(&Intent::Confirmation));
    }

    #[test]
    fn test_curly_apostrophe() {
        assert!(detect("that\u{2019}s right").contains(&Intent::Confirmation));
    }

    #[test]
    fn test_weight() {
        assert!(detect("I weighed in at 72.4 kg").contains(&Intent::Weight));
        assert!(detect("160 lbs this morning").contains(&Intent::Weight));
    }

    #[test]
    fn test_search_is_not_food() {
        let intents = detect("how many calories are in a banana?");
        assert!(intents.contains(&Intent::Search));
        assert!(!intents.contains(&Intent::Food));
    }

    #[test]
    fn test_greeting() {
        assert!(detect("hey there").contains(&Intent::Greeting));
        assert!(!detect("they had lunch").contains(&Intent::Greeting));
    }

    #[test]
    fn test_progress() {
        let intents = detect("am I on track this week?");
        assert!(intents.contains(&Intent::Progress));
    }

    #[test]
    fn test_photo_words() {
        assert!(detect("here's a picture of lunch").contains(&Intent::Photo));
    }

    #[test]
    fn test_unclassified_is_empty() {
        assert!(detect("hmm").is_empty());
        assert!(detect("   ").is_empty());
    }
}
