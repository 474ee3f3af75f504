//! Spellbee Content crate - turns a word list into sentences, a story and
//! cached audio for one group and spelling week.
//!
//! Provider contracts (text generation, speech synthesis, vision extraction)
//! are traits with mock implementations; no concrete provider is bundled.

pub mod pipeline;
pub mod progress;
pub mod providers;

pub use pipeline::{asset_path, AssetOutcome, ContentPipeline, GenerationReport};
pub use progress::{NoProgress, Progress, ProgressLog, ProgressReporter};
pub use providers::{
    parse_extracted_words, parse_generated_content, FallbackSynthesizer, GeneratedContent,
    MockSpeechSynthesizer, MockTextGenerator, MockVisionExtractor, SpeechSynthesizer,
    TextGenerator, VisionExtractor,
};
