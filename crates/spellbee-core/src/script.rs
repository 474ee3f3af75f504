//! Utterance scripts spoken for each word.
//!
//! Used both when synthesizing stored clips and when re-rendering a clip
//! through on-device speech, so the learner hears the same words either way.

use crate::types::ClipKind;

pub fn announcement(word: &str) -> String {
    format!("The word is: {}.", word)
}

pub fn fallback_sentence(word: &str) -> String {
    format!("{} is this week's spelling word.", word)
}

pub fn repeat(word: &str) -> String {
    format!("{}.", word)
}

/// Letter-by-letter readout: letters joined by a pause cue, then the word.
pub fn spelling(word: &str) -> String {
    let letters: Vec<String> = word.chars().map(|c| c.to_string()).collect();
    format!("{} is spelt: {}. {}.", word, letters.join(", "), word)
}

/// The text for a per-word clip. `sentence` is the generated sentence, if any.
pub fn utterance(kind: ClipKind, word: &str, sentence: Option<&str>) -> String {
    match kind {
        ClipKind::Word => announcement(word),
        ClipKind::Sentence => match sentence {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => fallback_sentence(word),
        },
        ClipKind::Repeat => repeat(word),
        ClipKind::Spelling => spelling(word),
    }
}
