use std::collections::BTreeMap;
use std::fmt;

use crate::error::PipelineError;

pub const UNKNOWN_TOKEN: &str = "[unk]";

pub const NATO: [&str; 26] = [
    "alfa", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet",
    "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo", "sierra", "tango",
    "uniform", "victor", "whiskey", "xray", "yankee", "zulu",
];

// Spellings of letter names and words that sound like one.
const ACOUSTIC_ALIASES: &[(&str, char)] = &[
    ("alpha", 'A'),
    ("ay", 'A'),
    ("be", 'B'),
    ("bee", 'B'),
    ("see", 'C'),
    ("sea", 'C'),
    ("cee", 'C'),
    ("dee", 'D'),
    ("ee", 'E'),
    ("ef", 'F'),
    ("eff", 'F'),
    ("gee", 'G'),
    ("aitch", 'H'),
    ("eye", 'I'),
    ("jay", 'J'),
    ("juliett", 'J'),
    ("kay", 'K'),
    ("el", 'L'),
    ("ell", 'L'),
    ("em", 'M'),
    ("en", 'N'),
    ("oh", 'O'),
    ("pee", 'P'),
    ("cue", 'Q'),
    ("queue", 'Q'),
    ("are", 'R'),
    ("ar", 'R'),
    ("es", 'S'),
    ("ess", 'S'),
    ("tee", 'T'),
    ("tea", 'T'),
    ("you", 'U'),
    ("vee", 'V'),
    ("double-u", 'W'),
    ("ex", 'X'),
    ("x-ray", 'X'),
    ("why", 'Y'),
    ("zed", 'Z'),
    ("zee", 'Z'),
];

/// One of the 26 target letters, stored as its uppercase ASCII byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Letter(u8);

impl Letter {
    /// A through Z, in order.
    pub const ALL: [Letter; 26] = {
        let mut all = [Letter(b'A'); 26];
        let mut i = 0;
        while i < 26 {
            all[i] = Letter(b'A' + i as u8);
            i += 1;
        }
        all
    };

    pub fn from_char(c: char) -> Option<Self> {
        let c = c.to_ascii_uppercase();
        c.is_ascii_uppercase().then_some(Self(c as u8))
    }

    pub fn from_index(i: usize) -> Option<Self> {
        (i < 26).then(|| Self(b'A' + i as u8))
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        b.is_ascii_uppercase().then_some(Self(b))
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }

    pub fn as_byte(self) -> u8 {
        self.0
    }

    /// Position in the alphabet, `A` is 0.
    pub fn index(self) -> usize {
        usize::from(self.0 - b'A')
    }

}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Lowercase token to letter. Each token maps to exactly one letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, Letter>,
}

impl AliasTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Canonical names, NATO words and the acoustic aliases.
    pub fn standard() -> Result<Self, PipelineError> {
        let mut table = Self::empty();
        for letter in Letter::ALL {
            table.insert(&letter.as_char().to_ascii_lowercase().to_string(), letter)?;
        }
        for (i, word) in NATO.iter().enumerate() {
            if let Some(letter) = Letter::from_index(i) {
                table.insert(word, letter)?;
            }
        }
        for (word, c) in ACOUSTIC_ALIASES {
            let letter = Letter::from_char(*c)
                .ok_or_else(|| PipelineError::VocabularyBuild(format!("bad alias target {c}")))?;
            table.insert(word, letter)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, token: &str, letter: Letter) -> Result<(), PipelineError> {
        let token = token.trim().to_lowercase();
        if token.is_empty() || token == UNKNOWN_TOKEN {
            return Err(PipelineError::VocabularyBuild(format!(
                "{token:?} can't be an alias"
            )));
        }
        match self.entries.get(&token) {
            Some(existing) if *existing != letter => Err(PipelineError::VocabularyBuild(format!(
                "{token:?} maps to both {existing} and {letter}"
            ))),
            Some(_) => Ok(()),
            None => {
                self.entries.insert(token, letter);
                Ok(())
            }
        }
    }

    pub fn get(&self, token: &str) -> Option<Letter> {
        self.entries.get(token).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Letter)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct LetterResolver {
    aliases: AliasTable,
}

impl LetterResolver {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    /// Maps a hypothesis to at most one letter.
    ///
    /// The recognizer tends to emit onset noise before the intended word
    /// ("a the"), so the last token wins. When the last token is not an
    /// alias, the remaining tokens are scanned from the end.
    pub fn resolve(&self, hypothesis: &str) -> Option<Letter> {
        let hypothesis = hypothesis.trim();
        if hypothesis.is_empty() || hypothesis.eq_ignore_ascii_case(UNKNOWN_TOKEN) {
            return None;
        }
        let tokens: Vec<String> = hypothesis
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        tokens.iter().rev().find_map(|t| self.aliases.get(t))
    }
}
