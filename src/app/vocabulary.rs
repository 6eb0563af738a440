use super::letters::{NATO, UNKNOWN_TOKEN};
use crate::error::PipelineError;

/// The closed set of phrases the recognizer may emit. Always ends with the
/// unknown token so the engine can report "no match" instead of forcing a
/// wrong letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    phrases: Vec<String>,
}

#[derive(Debug, Default)]
pub struct VocabularyBuilder {
    phonetic: bool,
    extra: Vec<String>,
}

impl VocabularyBuilder {
    pub fn phonetic(mut self, enabled: bool) -> Self {
        self.phonetic = enabled;
        self
    }

    pub fn extra<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra.extend(words.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<Vocabulary, PipelineError> {
        let mut phrases: Vec<String> = ('a'..='z').map(String::from).collect();
        if self.phonetic {
            phrases.extend(NATO.iter().map(|w| w.to_string()));
        }
        for word in self.extra {
            let word = word.trim().to_lowercase();
            if word.is_empty() {
                return Err(PipelineError::VocabularyBuild(
                    "empty phrase in vocabulary".to_string(),
                ));
            }
            if word != UNKNOWN_TOKEN {
                phrases.push(word);
            }
        }
        let mut seen = std::collections::HashSet::new();
        phrases.retain(|p| seen.insert(p.clone()));
        phrases.push(UNKNOWN_TOKEN.to_string());
        Ok(Vocabulary { phrases })
    }
}

impl Vocabulary {
    pub fn builder() -> VocabularyBuilder {
        VocabularyBuilder::default()
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Phrases without the trailing unknown token.
    pub fn words(&self) -> &[String] {
        &self.phrases[..self.phrases.len() - 1]
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.phrases.iter().any(|p| p == phrase)
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// The grammar handed to the engine, e.g. `["a","b",...,"[unk]"]`.
    pub fn grammar_json(&self) -> String {
        serde_json::Value::from(self.phrases.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_only() {
        let v = Vocabulary::builder().build().unwrap();
        assert_eq!(v.len(), 27);
        assert_eq!(v.phrases()[0], "a");
        assert_eq!(v.phrases()[25], "z");
        assert_eq!(v.phrases().last().map(String::as_str), Some(UNKNOWN_TOKEN));
        assert_eq!(v.words().len(), 26);
    }

    #[test]
    fn test_construction_is_deterministic() {
        let a = Vocabulary::builder().build().unwrap();
        let b = Vocabulary::builder().build().unwrap();
        assert_eq!(a.phrases(), b.phrases());
        assert_eq!(a.grammar_json(), b.grammar_json());
    }

    #[test]
    fn test_phonetic_words_follow_letters() {
        let v = Vocabulary::builder().phonetic(true).build().unwrap();
        assert_eq!(v.len(), 26 + 26 + 1);
        assert_eq!(v.phrases()[26], "alfa");
        assert_eq!(v.phrases()[51], "zulu");
        assert!(v.contains(UNKNOWN_TOKEN));
    }

    #[test]
    fn test_extra_words_are_deduplicated() {
        let v = Vocabulary::builder()
            .phonetic(true)
            .extra(["Bee", "alfa", "bee", "[unk]"])
            .build()
            .unwrap();
        assert_eq!(v.len(), 26 + 26 + 1 + 1);
        assert_eq!(v.phrases()[52], "bee");
        assert_eq!(v.phrases().iter().filter(|p| *p == UNKNOWN_TOKEN).count(), 1);
    }

    #[test]
    fn test_empty_extra_word_fails() {
        let err = Vocabulary::builder().extra([" "]).build().unwrap_err();
        assert!(matches!(err, PipelineError::VocabularyBuild(_)));
    }

    #[test]
    fn test_grammar_json() {
        let v = Vocabulary::builder().build().unwrap();
        let json = v.grammar_json();
        assert!(json.starts_with(r#"["a","b","c""#));
        assert!(json.ends_with(r#""z","[unk]"]"#));
        let parsed: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, v.phrases());
    }
}
