//! External provider contracts and response handling.
//!
//! - `TextGenerator` produces a sentence per word and a story in one call.
//! - `SpeechSynthesizer` renders text to audio bytes.
//! - `VisionExtractor` reads a word list off a photographed sheet.
//!
//! Generative providers answer with JSON that is sometimes wrapped in
//! markdown fences; the `parse_*` functions strip those before decoding.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use spellbee_core::error::{Result, SpellbeeError};
use spellbee_core::types::parse_word_list;

/// Sentences and story generated for a word list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    /// word -> sentence. Words may be missing.
    pub sentences: BTreeMap<String, String>,
    pub story: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate content for the whole list. Fails on any non-success
    /// response or malformed output.
    async fn generate(&self, words: &[String]) -> Result<GeneratedContent>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract_words(&self, image: &[u8]) -> Result<Vec<String>>;
}

// =============================================================================
// Response parsing
// =============================================================================

/// Remove every markdown code fence marker and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Decode a text-generation response. Sentence keys are normalised the same
/// way words are, so lookups by word succeed.
pub fn parse_generated_content(raw: &str) -> Result<GeneratedContent> {
    let cleaned = strip_code_fences(raw);
    let parsed: GeneratedContent = serde_json::from_str(&cleaned).map_err(|e| {
        SpellbeeError::Generation(format!("Malformed generated content: {}", e))
    })?;

    let sentences = parsed
        .sentences
        .into_iter()
        .map(|(word, sentence)| (word.trim().to_lowercase(), sentence.trim().to_string()))
        .filter(|(word, sentence)| !word.is_empty() && !sentence.is_empty())
        .collect();

    Ok(GeneratedContent {
        sentences,
        story: parsed.story.trim().to_string(),
    })
}

/// Decode a vision-extraction response (a JSON array of strings) into a
/// normalised word list.
pub fn parse_extracted_words(raw: &str) -> Result<Vec<String>> {
    let cleaned = strip_code_fences(raw);
    let words: Vec<String> = serde_json::from_str(&cleaned)
        .map_err(|e| SpellbeeError::Generation(format!("Malformed word list: {}", e)))?;
    Ok(parse_word_list(&words.join("\n")))
}

// =============================================================================
// Speech model fallback
// =============================================================================

/// Tries a richer voice once, then a baseline voice once.
pub struct FallbackSynthesizer {
    primary: Arc<dyn SpeechSynthesizer>,
    baseline: Arc<dyn SpeechSynthesizer>,
}

impl FallbackSynthesizer {
    pub fn new(primary: Arc<dyn SpeechSynthesizer>, baseline: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { primary, baseline }
    }
}

#[async_trait]
impl SpeechSynthesizer for FallbackSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        match self.primary.synthesize(text).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                warn!(error = %e, "Primary voice failed, using baseline voice");
                self.baseline.synthesize(text).await
            }
        }
    }
}

// =============================================================================
// Mocks
// =============================================================================

/// Text generator that writes a stock sentence for every word.
#[derive(Debug, Default)]
pub struct MockTextGenerator {
    fail: AtomicBool,
    skip_sentences: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail.
    pub fn failing() -> Self {
        let generator = Self::default();
        generator.fail.store(true, Ordering::SeqCst);
        generator
    }

    /// Leave `word` out of the generated sentences.
    pub fn without_sentence_for(self, word: &str) -> Self {
        if let Ok(mut skip) = self.skip_sentences.lock() {
            skip.push(word.to_string());
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sentence_for(word: &str) -> String {
        format!("The cheeky badger could not stop saying {}.", word)
    }

    pub fn story_for(words: &[String]) -> String {
        format!("Once upon a time a badger learnt {}.", words.join(", "))
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, words: &[String]) -> Result<GeneratedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SpellbeeError::Generation(
                "Simulated text generation failure".to_string(),
            ));
        }
        let skip = self
            .skip_sentences
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let sentences = words
            .iter()
            .filter(|w| !skip.contains(*w))
            .map(|w| (w.clone(), Self::sentence_for(w)))
            .collect();
        Ok(GeneratedContent {
            sentences,
            story: Self::story_for(words),
        })
    }
}

/// Speech synthesizer that returns the text's bytes as "audio" and records
/// every request. Texts containing a registered pattern fail.
#[derive(Debug, Default)]
pub struct MockSpeechSynthesizer {
    failing: Mutex<Vec<String>>,
    requests: Mutex<Vec<String>>,
}

impl MockSpeechSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any synthesis whose text contains `pattern`.
    pub fn fail_on(self, pattern: &str) -> Self {
        if let Ok(mut failing) = self.failing.lock() {
            failing.push(pattern.to_string());
        }
        self
    }

    /// Texts requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(text.to_string());
        }
        let fails = self
            .failing
            .lock()
            .map(|f| f.iter().any(|p| text.contains(p.as_str())))
            .unwrap_or(false);
        if fails {
            return Err(SpellbeeError::Synthesis(format!(
                "Simulated synthesis failure for: {}",
                text
            )));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Vision extractor that answers with a canned raw response.
#[derive(Debug, Clone)]
pub struct MockVisionExtractor {
    response: String,
}

impl MockVisionExtractor {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl VisionExtractor for MockVisionExtractor {
    async fn extract_words(&self, image: &[u8]) -> Result<Vec<String>> {
        if image.is_empty() {
            return Err(SpellbeeError::InvalidInput("Empty image".to_string()));
        }
        parse_extracted_words(&self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generated_content_with_fences() {
        let raw = "```json\n{\"sentences\": {\"Cat\": \" A cat ate my homework. \"}, \"story\": \"Once.\"}\n```";
        let content = parse_generated_content(raw).unwrap();
        assert_eq!(content.sentences["cat"], "A cat ate my homework.");
        assert_eq!(content.story, "Once.");
    }

    #[test]
    fn test_parse_generated_content_rejects_malformed() {
        assert!(matches!(
            parse_generated_content("Sorry, I can't help with that."),
            Err(SpellbeeError::Generation(_))
        ));
        assert!(parse_generated_content("{\"story\": \"no sentences\"}").is_err());
    }

    #[test]
    fn test_parse_generated_content_drops_blank_sentences() {
        let raw = r#"{"sentences": {"cat": "   ", "dog": "Woof."}, "story": "S"}"#;
        let content = parse_generated_content(raw).unwrap();
        assert!(!content.sentences.contains_key("cat"));
        assert_eq!(content.sentences["dog"], "Woof.");
    }

    #[test]
    fn test_parse_extracted_words() {
        let words = parse_extracted_words("```\n[\"Bridge\", \" knee \", \"\"]\n```").unwrap();
        assert_eq!(words, vec!["bridge", "knee"]);
        assert!(parse_extracted_words("bridge, knee").is_err());
    }

    #[tokio::test]
    async fn test_fallback_synthesizer_single_fallback() {
        let primary = Arc::new(MockSpeechSynthesizer::new().fail_on("cat"));
        let baseline = Arc::new(MockSpeechSynthesizer::new());
        let synth = FallbackSynthesizer::new(primary.clone(), baseline.clone());

        assert_eq!(synth.synthesize("dog").await.unwrap(), b"dog".to_vec());
        assert!(baseline.requests().is_empty());

        assert_eq!(synth.synthesize("cat").await.unwrap(), b"cat".to_vec());
        assert_eq!(primary.requests(), vec!["dog", "cat"]);
        assert_eq!(baseline.requests(), vec!["cat"]);
    }

    #[tokio::test]
    async fn test_fallback_synthesizer_both_fail() {
        let primary = Arc::new(MockSpeechSynthesizer::new().fail_on("cat"));
        let baseline = Arc::new(MockSpeechSynthesizer::new().fail_on("cat"));
        let synth = FallbackSynthesizer::new(primary, baseline.clone());
        assert!(synth.synthesize("cat").await.is_err());
        assert_eq!(baseline.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_text_generator() {
        let generator = MockTextGenerator::new().without_sentence_for("dog");
        let words = vec!["cat".to_string(), "dog".to_string()];
        let content = generator.generate(&words).await.unwrap();
        assert!(content.sentences.contains_key("cat"));
        assert!(!content.sentences.contains_key("dog"));
        assert_eq!(generator.calls(), 1);

        assert!(MockTextGenerator::failing().generate(&words).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_vision_extractor() {
        let vision = MockVisionExtractor::new(r#"["Cat","DOG"]"#);
        assert_eq!(vision.extract_words(&[1, 2, 3]).await.unwrap(), vec!["cat", "dog"]);
        assert!(vision.extract_words(&[]).await.is_err());
    }
}
