use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use log::info;

#[derive(Debug)]
pub enum PromptError {
    IntentNotFound(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::IntentNotFound(key) => write!(f, "Intent '{}' not found", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// What the user asked the model to do with the submitted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    CompleteCode,
    ExplainCode,
    CommitMessage,
    RuntimeError,
    Documentation,
    SuggestNames,
    Refactor,
    BugFinder,
    FixCode,
    GenerateTests,
    ConvertLanguage,
    VcsQuestion,
    ExplainCommit,
    ProgrammingQuestion,
}

impl Intent {
    pub const ALL: [Intent; 14] = [
        Intent::CompleteCode,
        Intent::ExplainCode,
        Intent::CommitMessage,
        Intent::RuntimeError,
        Intent::Documentation,
        Intent::SuggestNames,
        Intent::Refactor,
        Intent::BugFinder,
        Intent::FixCode,
        Intent::GenerateTests,
        Intent::ConvertLanguage,
        Intent::VcsQuestion,
        Intent::ExplainCommit,
        Intent::ProgrammingQuestion,
    ];

    /// Name used on the command line and as key in a prompts file.
    pub fn name(&self) -> &'static str {
        match self {
            Intent::CompleteCode => "complete-code",
            Intent::ExplainCode => "explain-code",
            Intent::CommitMessage => "commit-message",
            Intent::RuntimeError => "runtime-error",
            Intent::Documentation => "documentation",
            Intent::SuggestNames => "suggest-names",
            Intent::Refactor => "refactor",
            Intent::BugFinder => "bug-finder",
            Intent::FixCode => "fix-code",
            Intent::GenerateTests => "generate-tests",
            Intent::ConvertLanguage => "convert-language",
            Intent::VcsQuestion => "vcs-question",
            Intent::ExplainCommit => "explain-commit",
            Intent::ProgrammingQuestion => "programming-question",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Intent::CompleteCode => "Complete Code",
            Intent::ExplainCode => "Explain Code",
            Intent::CommitMessage => "Generate Commit Message",
            Intent::RuntimeError => "Explain Runtime Error",
            Intent::Documentation => "Generate Documentation",
            Intent::SuggestNames => "Suggest Names",
            Intent::Refactor => "Suggest Refactoring",
            Intent::BugFinder => "Find Bugs",
            Intent::FixCode => "Fix Code",
            Intent::GenerateTests => "Generate Tests",
            Intent::ConvertLanguage => "Convert Language",
            Intent::VcsQuestion => "VCS Help",
            Intent::ExplainCommit => "Explain Commits",
            Intent::ProgrammingQuestion => "Programming Q&A",
        }
    }

    pub fn default_template(&self) -> &'static str {
        match self {
            Intent::CompleteCode =>
                "Complete the following code. Provide only the completion and short reasoning.",
            Intent::ExplainCode =>
                "Explain what this code does, its complexity, and any surprising behavior.",
            Intent::CommitMessage =>
                "Generate a concise, clear git commit message for the following diff or changes.",
            Intent::RuntimeError => "Explain the runtime error and how to fix it.",
            Intent::Documentation => "Generate documentation and comments for the following code.",
            Intent::SuggestNames =>
                "Suggest clearer, more descriptive names for identifiers and APIs in the snippet.",
            Intent::Refactor =>
                "Suggest refactoring ideas, simplifications, and improvements while keeping behavior.",
            Intent::BugFinder =>
                "Find potential bugs, edge cases, and provide fixes for the following code.",
            Intent::FixCode =>
                "Fix defects, suggest safe improvements, and return the corrected code.",
            Intent::GenerateTests =>
                "Write concise unit tests that cover critical paths and edge cases.",
            Intent::ConvertLanguage =>
                "Convert this code to another language. Keep comments explaining important changes.",
            Intent::VcsQuestion =>
                "Answer questions about version control usage and best practices related to this context.",
            Intent::ExplainCommit =>
                "Explain the intent of these commits and how they impact the codebase.",
            Intent::ProgrammingQuestion =>
                "Answer the following programming question or request with clear steps and examples.",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Intent {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Intent::ALL
            .into_iter()
            .find(|intent| intent.name() == wanted)
            .ok_or_else(|| PromptError::IntentNotFound(s.to_string()))
    }
}

/// Instruction templates keyed by intent name. Intents without an entry use
/// their built-in template.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PromptConfig {
    #[serde(default)]
    pub templates: HashMap<String, String>,
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        for key in self.templates.keys() {
            key.parse::<Intent>()?;
        }
        Ok(())
    }

    pub fn template(&self, intent: Intent) -> &str {
        self.templates
            .get(intent.name())
            .map(|s| s.as_str())
            .unwrap_or_else(|| intent.default_template())
    }

    pub fn build_prompt(&self, intent: Intent, content: &str, context: Option<&str>) -> String {
        build_prompt(self.template(intent), content, context)
    }
}

/// Joins instruction, content and optional context with blank lines,
/// leaving out parts that are blank.
pub fn build_prompt(template: &str, content: &str, context: Option<&str>) -> String {
    [template.trim(), content.trim(), context.unwrap_or_default()]
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    config.validate()?;
    info!(
        "Loaded {} prompt template override(s) from {}",
        config.templates.len(),
        path.as_ref().display()
    );
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn prompt_parts_are_joined_with_blank_lines() {
        let prompt = build_prompt("  Explain.  ", "\nfn main() {}\n", Some("in a CLI"));
        assert_eq!(prompt, "Explain.\n\nfn main() {}\n\nin a CLI");
    }

    #[test]
    fn blank_parts_are_skipped() {
        assert_eq!(build_prompt("Do it.", "code", Some("   ")), "Do it.\n\ncode");
        assert_eq!(build_prompt("", "code", None), "code");
    }

    #[test]
    fn intent_names_round_trip_through_from_str() {
        for intent in Intent::ALL {
            assert_eq!(intent.name().parse::<Intent>().unwrap(), intent);
        }
        assert_eq!("Bug_Finder".parse::<Intent>().unwrap(), Intent::BugFinder);
        assert!("poetry".parse::<Intent>().is_err());
    }

    #[test]
    fn overrides_replace_builtin_template() {
        let mut config = PromptConfig::default();
        config.templates.insert("fix-code".to_string(), "Just fix it.".to_string());

        assert_eq!(config.template(Intent::FixCode), "Just fix it.");
        assert_eq!(config.template(Intent::Refactor), Intent::Refactor.default_template());
        assert_eq!(
            config.build_prompt(Intent::FixCode, "x = 1", None),
            "Just fix it.\n\nx = 1"
        );
    }

    #[test]
    fn load_prompts_rejects_unknown_intents() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("gemini-chat-prompts-{}.json", uuid::Uuid::new_v4()));
        let bad = dir.join(format!("gemini-chat-prompts-{}.json", uuid::Uuid::new_v4()));

        std::fs::File::create(&good)
            .unwrap()
            .write_all(br#"{"templates": {"explain-code": "Explain briefly."}}"#)
            .unwrap();
        std::fs::File::create(&bad)
            .unwrap()
            .write_all(br#"{"templates": {"sing": "La la"}}"#)
            .unwrap();

        let config = load_prompts(&good).unwrap();
        assert_eq!(config.template(Intent::ExplainCode), "Explain briefly.");
        assert!(matches!(load_prompts(&bad), Err(PromptError::IntentNotFound(_))));
        assert!(matches!(load_prompts(dir.join("missing-prompts.json")), Err(PromptError::IoError(_))));

        let _ = std::fs::remove_file(good);
        let _ = std::fs::remove_file(bad);
    }
}
