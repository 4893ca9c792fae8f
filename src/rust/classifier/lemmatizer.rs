use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;

lazy_static! {
    /// Irregular plural forms that suffix rules would get wrong.
    static ref EXCEPTIONS: HashMap<&'static str, &'static str> = [
        ("children", "child"),
        ("people", "person"),
        ("men", "man"),
        ("women", "woman"),
        ("feet", "foot"),
        ("teeth", "tooth"),
        ("mice", "mouse"),
        ("geese", "goose"),
        ("oxen", "ox"),
        ("dice", "die"),
        ("lives", "life"),
        ("wives", "wife"),
        ("knives", "knife"),
        ("leaves", "leaf"),
        ("halves", "half"),
        ("shelves", "shelf"),
        ("wolves", "wolf"),
        ("thieves", "thief"),
        ("loaves", "loaf"),
        ("calves", "calf"),
        ("data", "datum"),
        ("criteria", "criterion"),
        ("phenomena", "phenomenon"),
        ("analyses", "analysis"),
        ("crises", "crisis"),
        ("diagnoses", "diagnosis"),
        ("oases", "oasis"),
        ("indices", "index"),
        ("matrices", "matrix"),
        ("vertices", "vertex"),
        ("potatoes", "potato"),
        ("tomatoes", "tomato"),
        ("heroes", "hero"),
        ("echoes", "echo"),
        ("volcanoes", "volcano"),
        ("tornadoes", "tornado"),
        ("mosquitoes", "mosquito"),
        ("cacti", "cactus"),
        ("fungi", "fungus"),
        ("buses", "bus"),
        ("gases", "gas"),
        ("viruses", "virus"),
        ("statuses", "status"),
        ("houses", "house"),
        ("causes", "cause"),
        ("nurses", "nurse"),
        ("horses", "horse"),
        ("courses", "course"),
        ("responses", "response"),
        ("purposes", "purpose"),
        ("diseases", "disease"),
        ("cases", "case"),
        ("bases", "base"),
        ("doses", "dose"),
        ("vaccines", "vaccine"),
    ]
    .into_iter()
    .collect();

    /// Words that end like plurals but are already in their base form.
    static ref INVARIANTS: HashSet<&'static str> = [
        "news", "series", "species", "means", "aids", "diabetes", "measles",
        "mumps", "rabies", "scabies", "clothes", "physics", "politics",
        "economics", "mathematics", "athletics", "logistics", "ethics",
        "always", "perhaps", "sometimes", "whereas", "towards", "afterwards",
        "besides", "regardless", "nevertheless", "unless", "thanks",
        "this", "thus", "was", "has", "does", "goes", "yes", "its",
        "his", "hers", "ours", "yours", "theirs", "chaos", "lens",
        "canvas", "atlas", "alias", "bias", "christmas", "texas", "kansas",
        "arkansas", "honduras", "philippines", "bahamas", "barbados",
    ]
    .into_iter()
    .collect();
}

/// Suffix rewrites tried in order; the first matching suffix wins.
const SUFFIX_RULES: &[(&str, &str)] = &[
    ("sses", "ss"),
    ("ches", "ch"),
    ("shes", "sh"),
    ("xes", "x"),
    ("ies", "y"),
    ("s", ""),
];

/// Reduces a lowercase token to its noun lemma.
///
/// Lookups go through an irregular-form table first, then a short list of
/// plural suffix rules. Tokens the table does not cover and the rules do not
/// apply to are returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lemmatizer;

impl Lemmatizer {
    pub fn new() -> Self {
        Self
    }

    pub fn lemmatize(&self, token: &str) -> String {
        if let Some(lemma) = EXCEPTIONS.get(token) {
            return (*lemma).to_string();
        }
        if !Self::is_rule_candidate(token) {
            return token.to_string();
        }
        for (suffix, replacement) in SUFFIX_RULES {
            if let Some(stem) = token.strip_suffix(suffix) {
                return format!("{stem}{replacement}");
            }
        }
        token.to_string()
    }

    fn is_rule_candidate(token: &str) -> bool {
        token.chars().count() > 3
            && token.chars().all(char::is_alphabetic)
            && !token.ends_with("ss")
            && !token.ends_with("us")
            && !token.ends_with("is")
            && !INVARIANTS.contains(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_plurals() {
        let lemmatizer = Lemmatizer::new();
        assert_eq!(lemmatizer.lemmatize("tents"), "tent");
        assert_eq!(lemmatizer.lemmatize("supplies"), "supply");
        assert_eq!(lemmatizer.lemmatize("boxes"), "box");
        assert_eq!(lemmatizer.lemmatize("churches"), "church");
        assert_eq!(lemmatizer.lemmatize("addresses"), "address");
    }

    #[test]
    fn test_irregular_forms() {
        let lemmatizer = Lemmatizer::new();
        assert_eq!(lemmatizer.lemmatize("children"), "child");
        assert_eq!(lemmatizer.lemmatize("people"), "person");
        assert_eq!(lemmatizer.lemmatize("volcanoes"), "volcano");
    }

    #[test]
    fn test_pass_through() {
        let lemmatizer = Lemmatizer::new();
        for word in ["news", "crisis", "virus", "water", "gas", "can't", "2010", "is", "!"] {
            assert_eq!(lemmatizer.lemmatize(word), word);
        }
    }
}
