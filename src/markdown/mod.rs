//! Splits finished assistant text into prose and fenced code blocks.

pub const CODE_FENCE: &str = "```";

/// A piece of assistant output, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Prose between code blocks, trimmed.
    Text(String),
    /// A fenced block with its language tag when the opening line carried a valid one.
    CodeBlock { language: Option<String>, code: String },
}

/// Parses `text` into text and code-block segments.
///
/// The scan is lenient: a fence that is never closed swallows the rest of the
/// input as code, and an opening line that does not look like a language tag
/// is dropped instead of being reported.
pub fn segment(text: &str) -> Vec<Segment> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let Some(code_start) = remaining.find(CODE_FENCE) else {
            push_text(&mut segments, remaining);
            break;
        };

        push_text(&mut segments, &remaining[..code_start]);

        let after_opening = &remaining[code_start + CODE_FENCE.len()..];
        let (language, body) = split_language_line(after_opening);

        let Some(code_end) = body.find(CODE_FENCE) else {
            push_code(&mut segments, language, body.trim());
            break;
        };

        push_code(&mut segments, language, body[..code_end].trim_end());
        remaining = &body[code_end + CODE_FENCE.len()..];
    }

    if segments.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }

    segments
}

/// True when `text` holds at least an opening and a closing fence.
pub fn has_code_blocks(text: &str) -> bool {
    match text.find(CODE_FENCE) {
        Some(first) => text[first + CODE_FENCE.len()..].contains(CODE_FENCE),
        None => false,
    }
}

/// Maps a fence language tag to the label shown above a rendered block.
pub fn normalize_language(language: Option<&str>) -> String {
    let Some(language) = language else {
        return "Code".to_string();
    };
    let label = match language.to_lowercase().as_str() {
        "kotlin" | "kt" => "Kotlin",
        "java" => "Java",
        "javascript" | "js" => "JavaScript",
        "typescript" | "ts" => "TypeScript",
        "python" | "py" => "Python",
        "ruby" | "rb" => "Ruby",
        "go" | "golang" => "Go",
        "rust" | "rs" => "Rust",
        "c" => "C",
        "cpp" | "c++" => "C++",
        "csharp" | "c#" | "cs" => "C#",
        "swift" => "Swift",
        "scala" => "Scala",
        "groovy" => "Groovy",
        "php" => "PHP",
        "html" => "HTML",
        "css" => "CSS",
        "scss" | "sass" => "SCSS",
        "xml" => "XML",
        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "sql" => "SQL",
        "shell" | "bash" | "sh" | "zsh" => "Shell",
        "powershell" | "ps1" => "PowerShell",
        "markdown" | "md" => "Markdown",
        "dockerfile" => "Dockerfile",
        "plaintext" | "text" | "txt" => "Text",
        _ => return language.to_string(),
    };
    label.to_string()
}

fn push_text(segments: &mut Vec<Segment>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        segments.push(Segment::Text(trimmed.to_string()));
    }
}

fn push_code(segments: &mut Vec<Segment>, language: Option<String>, code: &str) {
    if !code.is_empty() || language.is_some() {
        segments.push(Segment::CodeBlock { language, code: code.to_string() });
    }
}

/// Separates the optional language line from the block body.
///
/// Without any line break after the fence there is no language line and the
/// whole remainder is body.
fn split_language_line(after_opening: &str) -> (Option<String>, &str) {
    let Some(line_end) = after_opening.find(['\n', '\r']) else {
        return (None, after_opening);
    };

    let tag = after_opening[..line_end].trim();
    let language = (!tag.is_empty() && tag.chars().all(is_language_char)).then(|| tag.to_string());

    let body_start = if after_opening[line_end..].starts_with("\r\n") {
        line_end + 2
    } else {
        line_end + 1
    };

    (language, &after_opening[body_start..])
}

fn is_language_char(c: char) -> bool {
    c.is_alphanumeric() || c == '+' || c == '#'
}
