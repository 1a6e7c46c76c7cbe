//! Content classification for clipboard text.
//!
//! Rules are tried in a fixed order and the first match wins, because the
//! patterns overlap: a URL is also a path-like string, JSON is also code.
//! Everything here is regex driven and total; unclassifiable input is
//! plain `text`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::entry::EntryType;

/// Paths longer than this are treated as prose that happens to start with `/`.
const MAX_PATH_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
}

impl Classification {
    fn plain(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            sub_type: None,
        }
    }

    fn code(language: &str) -> Self {
        Self {
            entry_type: EntryType::Code,
            sub_type: Some(language.to_string()),
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid classifier pattern"))
        .collect()
}

fn url_regex() -> &'static Regex {
    static URL_REGEX: OnceLock<Regex> = OnceLock::new();
    URL_REGEX.get_or_init(|| {
        Regex::new(r"(?i)^(?:(?:https?|ftp)://[^\s/$.?#][^\s]*|www\.[^\s/$.?#][^\s]*)$")
            .expect("valid url regex")
    })
}

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
    })
}

fn path_regex() -> &'static Regex {
    static PATH_REGEX: OnceLock<Regex> = OnceLock::new();
    PATH_REGEX.get_or_init(|| Regex::new(r"^(?:[A-Za-z]:\\|/|~/|\./)").expect("valid path regex"))
}

/// Shapes that mark a snippet as source code in any supported language.
fn code_patterns() -> &'static [Regex] {
    static CODE_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    CODE_PATTERNS.get_or_init(|| {
        compile(&[
            // JavaScript / TypeScript
            r"\bfunction\s*\w*\s*\(",
            r"\b(?:const|let|var)\s+[A-Za-z_$][\w$]*\s*=",
            r"\([^)]*\)\s*=>",
            r"\bimport\s+[^\n]+\s+from\s+['\x22]",
            r"\bconsole\.\w+\(",
            r"(?m)^\s*(?:export\s+)?(?:interface|type)\s+\w+\s*(?:=|\{)",
            // Python
            r"(?m)^\s*def\s+\w+\s*\([^)]*\)\s*(?:->\s*[^:]+)?:",
            r"(?m)^\s*from\s+[\w.]+\s+import\s+\w+",
            r"(?m)^\s*class\s+\w+(?:\([^)]*\))?\s*:",
            // Java / C#
            r"\b(?:public|private|protected)\s+(?:static\s+)?(?:final\s+)?[\w<>\[\]]+\s+\w+\s*\(",
            r"\bSystem\.out\.print",
            r"(?m)^\s*using\s+System(?:\.\w+)*\s*;",
            r"(?m)^\s*namespace\s+[\w.]+",
            // C / C++
            r"(?m)^\s*#include\s*[<\x22]",
            r"\bint\s+main\s*\(",
            r"\bstd::\w+",
            // HTML
            r"(?i)<!DOCTYPE\s+html",
            r"(?i)<(?:html|head|body|div|span|p|a|ul|ol|li|table|script|style|link|meta|img|form|input|button|h[1-6])\b[^>]*>",
            // CSS
            r"[\w\-.#:\s,>*\[\]=\x22]+\{\s*(?:[\w-]+\s*:\s*[^;{}]+;?\s*)+\}",
            // SQL
            r"\bSELECT\s+(?:DISTINCT\s+)?(?:\*|[\w.]+(?:\s+AS\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+AS\s+\w+)?)*)\s+FROM\s+[\w.]+",
            r"\b(?:INSERT\s+INTO|UPDATE\s+\w+\s+SET|DELETE\s+FROM|CREATE\s+(?:TABLE|INDEX|VIEW)|ALTER\s+TABLE|DROP\s+TABLE)\b",
            r"(?i)\bselect\s+\*\s+from\s+\w+",
            // Generic control flow and statements
            r"\b(?:if|for|while|switch)\s*\([^)]*\)\s*\{",
            r"(?m)^\s*[\w.]+\s*\([^()]*\)\s*;\s*$",
            r"(?m)^\s*return\b[^;\n]*;\s*$",
            r"\{[^{}]*;[^{}]*\}",
        ])
    })
}

struct LanguageRules {
    typescript: Regex,
    javascript: Regex,
    python: Regex,
    java: Regex,
    csharp: Regex,
    c_family: Regex,
    cpp: Regex,
    html: Regex,
    css: Regex,
    sql: Regex,
}

fn language_rules() -> &'static LanguageRules {
    static RULES: OnceLock<LanguageRules> = OnceLock::new();
    RULES.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("valid language pattern");
        LanguageRules {
            typescript: re(
                r"\binterface\s+\w+\s*\{|:\s*(?:string|number|boolean|any|void|unknown)\b|\btype\s+\w+\s*=|\bas\s+(?:string|number|const)\b",
            ),
            javascript: re(
                r"\bfunction\b|\b(?:let|var)\s+\w+\s*=|\bconst\s+\w+\s*=|=>|\bconsole\.\w+|\bimport\s+[^\n]+\s+from\b|\bexport\s+(?:default|const|function|class)\b|\bdocument\.|\bwindow\.|\brequire\(",
            ),
            python: re(
                r"(?m)^\s*def\s+\w+\s*\(|^\s*from\s+[\w.]+\s+import\s|^\s*import\s+[\w.]+\s*$|^\s*class\s+\w+(?:\([^)]*\))?\s*:|\bprint\s*\(|\belif\b|\bself\.|if\s+__name__\s*==",
            ),
            java: re(
                r"\bSystem\.out\.|\bpublic\s+static\s+void\s+main|@Override\b|\bimport\s+java\.|(?m)^\s*package\s+[\w.]+\s*;|\bextends\s+\w+|\bimplements\s+\w+",
            ),
            csharp: re(
                r"\busing\s+System\b|\bnamespace\s+[\w.]+|\bConsole\.Write|\{\s*get;|\bpublic\s+(?:static\s+)?(?:partial\s+)?class\b|\bstring\s+\w+\s*=",
            ),
            c_family: re(
                r"(?m)^\s*#include\b|\bstd::|\bprintf\s*\(|\bcout\s*<<|\bint\s+main\s*\(|\bmalloc\s*\(|->\w+|\btemplate\s*<",
            ),
            cpp: re(
                r"\bstd::|\bcout\b|\bcin\b|\btemplate\s*<|\bclass\s+\w+\s*(?::|\{)|#include\s*<(?:iostream|vector|string|map|memory)>",
            ),
            html: re(
                r"(?i)<!DOCTYPE\s+html|<(?:html|head|body|div|span|p|a|ul|ol|li|table|script|style|link|meta|img|form|input|button|h[1-6])\b[^>]*>|</[a-z][a-z0-9]*>",
            ),
            css: re(r"[\w\-.#:\s,>*\[\]=\x22]+\{\s*(?:[\w-]+\s*:\s*[^;{}]+;?\s*)+\}"),
            sql: re(
                r"(?i)\b(?:select\s+[\s\S]+?\s+from|insert\s+into|update\s+\w+\s+set|delete\s+from|create\s+(?:table|index|view)|alter\s+table|drop\s+table)\b",
            ),
        }
    })
}

fn is_json(trimmed: &str) -> bool {
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

fn looks_like_code(text: &str) -> bool {
    code_patterns().iter().any(|re| re.is_match(text))
}

/// Best-effort language name for a snippet already known to be code.
pub fn detect_language(text: &str) -> &'static str {
    let rules = language_rules();
    let trimmed = text.trim();

    if rules.javascript.is_match(trimmed) || rules.typescript.is_match(trimmed) {
        if rules.typescript.is_match(trimmed) {
            return "typescript";
        }
        return "javascript";
    }
    if rules.python.is_match(trimmed) {
        return "python";
    }
    if rules.java.is_match(trimmed) {
        return "java";
    }
    if rules.csharp.is_match(trimmed) {
        return "csharp";
    }
    if rules.c_family.is_match(trimmed) {
        return if rules.cpp.is_match(trimmed) { "cpp" } else { "c" };
    }
    if rules.html.is_match(trimmed) {
        return "html";
    }
    if rules.css.is_match(trimmed) {
        return "css";
    }
    if rules.sql.is_match(trimmed) {
        return "sql";
    }
    if is_json(trimmed) {
        return "json";
    }
    "text"
}

/// Classify clipboard text into an entry type (and language for code).
pub fn classify(text: &str) -> Classification {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Classification::plain(EntryType::Text);
    }

    if url_regex().is_match(trimmed) {
        return Classification::plain(EntryType::Url);
    }

    if email_regex().is_match(trimmed) {
        return Classification::plain(EntryType::Email);
    }

    if is_json(trimmed) {
        return Classification::code("json");
    }

    if looks_like_code(trimmed) {
        return Classification::code(detect_language(trimmed));
    }

    if path_regex().is_match(trimmed) && trimmed.chars().count() < MAX_PATH_CHARS {
        return Classification::plain(EntryType::File);
    }

    Classification::plain(EntryType::Text)
}
