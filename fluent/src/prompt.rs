use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE: &str = "English";
pub const DEFAULT_EXPLAIN_LANGUAGE: &str = "Portuguese";
const NATIVE_LANGUAGE_FALLBACK: &str = "another language";

/// Style profile applied to grammar corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Casual,
    Professional,
    Executive,
}

impl Tone {
    pub const ALL: [Tone; 3] = [Tone::Casual, Tone::Professional, Tone::Executive];

    /// Parses a stored tone name, falling back to casual for anything unknown.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Casual => "casual",
            Tone::Professional => "professional",
            Tone::Executive => "executive",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Tone::Casual => "casual everyday chat",
            Tone::Professional => "professional workplace communication",
            Tone::Executive => "senior-level executive communication",
        }
    }

    pub fn rules(self) -> &'static str {
        match self {
            Tone::Casual => concat!(
                "Use a natural, casual and friendly tone. This is everyday chat.\n",
                "Use contractions (I'm, don't, I'll, they're). Avoid stiff/formal phrasing.\n",
                "Keep it concise and conversational.",
            ),
            Tone::Professional => concat!(
                "Use a professional but approachable tone. Suitable for workplace emails, ",
                "Slack with managers, and team communication.\n",
                "Use \"I believe\" instead of \"I think\". ",
                "Use \"What are your thoughts?\" instead of \"What do you think?\".\n",
                "Avoid comma splices - use proper sentence separation.\n",
                "Sound competent and clear. Avoid filler words and redundancy.\n",
                "Contractions are OK (it's, don't) but don't overuse them.",
            ),
            Tone::Executive => concat!(
                "Use a polished, confident and strategic tone. ",
                "This is executive-level communication.\n",
                "Use \"I believe\", \"I'd recommend\", \"There's an opportunity to\". ",
                "Never use \"I think\".\n",
                "Prefer active voice and decisive language. Sound like a senior leader.\n",
                "Be precise and structured. Every word should add value.\n",
                "Avoid contractions when possible. Use full forms (do not, I would, we will).\n",
                "Avoid comma splices - use proper punctuation and sentence structure.",
            ),
        }
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "casual" => Ok(Tone::Casual),
            "professional" => Ok(Tone::Professional),
            "executive" => Ok(Tone::Executive),
            other => Err(format!(
                "unknown tone `{other}`; expected casual, professional or executive"
            )),
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instruction for correcting text into `language` with the given tone.
pub fn build_system_prompt(language: &str, native_language: Option<&str>, tone: Tone) -> String {
    let native = native_language
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(NATIVE_LANGUAGE_FALLBACK);

    format!(
        "You are a {language} writing assistant for {description}.\n\
         RULES:\n\
         1. The output MUST ALWAYS be in {language}, no matter what language the input is in.\n\
         2. If the input is in {native} or any other language, translate it to {language}.\n\
         3. If the input is already in {language}, just fix grammar and spelling.\n\
         4. If the input mixes languages, translate everything to {language} and fix grammar.\n\
         5. {rules}\n\
         6. Keep the original meaning and intent.\n\
         7. PRESERVE all @mentions exactly as they appear (e.g. @john, @channel, @here). \
         Never translate, remove or modify them.\n\
         8. PRESERVE line breaks, paragraph structure, and formatting (use \\n for line breaks).\n\
         9. Reply ONLY with the improved {language} text, nothing else.",
        description = tone.description(),
        rules = tone.rules(),
    )
}

/// Instruction for translating or explaining a selection in the reader's language.
pub fn build_explain_prompt(native_language: &str) -> String {
    format!(
        "You are a translator. The user selected text and wants to understand it in {native_language}.\n\
         IMPORTANT: Your task is to TRANSLATE the selected text or Explain the meaning of it \
         in {native_language} ONLY.\n\
         Do NOT respond conversationally. Do NOT answer questions conversationally.\n\
         If the text is a question, translate it as a question, do not answer it.\n\
         If the text is a statement, translate or explain it. Be concise and natural.\n\
         If it contains idioms or slang, explain them briefly in {native_language}.\n\
         Reply ONLY in {native_language}. Nothing else."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tone_has_description_and_rules() {
        for tone in Tone::ALL {
            assert!(!tone.description().is_empty());
            assert!(!tone.rules().is_empty());
        }
    }

    #[test]
    fn every_tone_demands_output_in_target_language() {
        for tone in Tone::ALL {
            let prompt = build_system_prompt("English", Some("Portuguese"), tone);
            assert!(prompt.contains("MUST ALWAYS be in English"), "tone {tone}");
        }
    }

    #[test]
    fn grammar_prompt_translates_native_and_mixed_input() {
        let prompt = build_system_prompt("English", Some("Portuguese"), Tone::Casual);
        assert!(prompt.contains("If the input is in Portuguese"));
        assert!(prompt.contains("translate it to English"));
        assert!(prompt.contains("mixes languages"));
        assert!(prompt.contains("translate everything to English"));
    }

    #[test]
    fn grammar_prompt_preserves_mentions_and_line_breaks() {
        let prompt = build_system_prompt("English", Some("Portuguese"), Tone::Casual);
        assert!(prompt.contains("PRESERVE all @mentions"));
        assert!(prompt.contains("PRESERVE line breaks"));
        assert!(prompt.contains("Reply ONLY with the improved English text"));
    }

    #[test]
    fn casual_tone_is_default() {
        let prompt = build_system_prompt("English", Some("Portuguese"), Tone::default());
        assert!(prompt.contains("casual"));
        assert!(prompt.contains("contractions"));
    }

    #[test]
    fn professional_tone_rules_are_included() {
        let prompt = build_system_prompt("English", Some("Portuguese"), Tone::Professional);
        assert!(prompt.contains("professional"));
        assert!(prompt.contains("I believe"));
        assert!(prompt.contains("Avoid comma splices - use proper sentence separation."));
    }

    #[test]
    fn executive_tone_rules_are_included() {
        let prompt = build_system_prompt("English", Some("Portuguese"), Tone::Executive);
        assert!(prompt.contains("executive"));
        assert!(prompt.contains("strategic"));
        assert!(prompt.contains("Never use \"I think\""));
        assert!(prompt.contains(
            "Avoid comma splices - use proper punctuation and sentence structure."
        ));
    }

    #[test]
    fn unknown_tone_falls_back_to_casual() {
        assert_eq!(Tone::parse_lenient("unknown"), Tone::Casual);
        assert_eq!(Tone::parse_lenient(" Executive "), Tone::Executive);
    }

    #[test]
    fn missing_native_language_uses_generic_phrase() {
        for native in [None, Some(""), Some("   ")] {
            let prompt = build_system_prompt("English", native, Tone::Casual);
            assert!(prompt.contains("another language"));
            assert!(!prompt.contains("undefined"));
            assert!(!prompt.contains("None"));
        }
    }

    #[test]
    fn non_latin_target_language() {
        let prompt = build_system_prompt("Japanese", Some("English"), Tone::Casual);
        assert!(prompt.contains("MUST ALWAYS be in Japanese"));
        assert!(prompt.contains("If the input is in English"));
    }

    #[test]
    fn explain_prompt_stays_in_native_language() {
        let prompt = build_explain_prompt("Portuguese");
        assert!(prompt.contains("Explain the meaning"));
        assert!(prompt.contains("Reply ONLY in Portuguese"));
        assert!(prompt.contains("Do NOT answer questions conversationally"));
    }

    #[test]
    fn explain_prompt_mentions_idioms_and_slang() {
        let prompt = build_explain_prompt("Spanish");
        assert!(prompt.contains("idioms"));
        assert!(prompt.contains("slang"));
    }
}
