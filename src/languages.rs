use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::EngineError;
use crate::materialize;

/// Closed set of languages the engine will ever execute.
///
/// This is an allow-list, not a convenience: command lines are built from
/// the registry entry for one of these variants and never from request
/// input, so an unknown language can never reach a process spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Ruby,
    Java,
    Cpp,
    CSharp,
    Go,
    Rust,
}

impl Language {
    pub const ALL: [Language; 9] = [
        Language::JavaScript,
        Language::TypeScript,
        Language::Python,
        Language::Ruby,
        Language::Java,
        Language::Cpp,
        Language::CSharp,
        Language::Go,
        Language::Rust,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Ruby => "ruby",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Go => "go",
            Language::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .iter()
            .find(|l| l.id() == s)
            .copied()
            .ok_or_else(|| EngineError::UnsupportedLanguage(s.to_string()))
    }
}

/// Produces the full source file for one execution: language prelude, the
/// user's code verbatim, and an entry point that applies the parsed input
/// arguments to `solution` and prints a canonical result.
pub type HarnessFn = fn(user_code: &str, args: &[serde_json::Value]) -> String;

/// An argv command template. The program and each argument may contain the
/// placeholders `%SOURCE%` and `%EXE%`; substitution happens per argument,
/// never through a shell, so neither user code nor test input can alter the
/// command line.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(parts: &[&str]) -> Self {
        assert!(!parts.is_empty(), "command template must name a program");
        Self {
            program: parts[0].to_string(),
            args: parts[1..].iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Substitutes placeholders and returns (program, args).
    pub fn render(&self, source_file: &str, exe_name: &str) -> (String, Vec<String>) {
        let sub = |s: &str| s.replace("%SOURCE%", source_file).replace("%EXE%", exe_name);
        (sub(&self.program), self.args.iter().map(|a| sub(a)).collect())
    }
}

/// Declarative description of how to materialize, compile, and run code in
/// one language. Immutable; built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct LanguageProfile {
    pub language: Language,
    /// File name the user's (wrapped) code is written to inside the scratch
    /// directory. Fixed per language; never derived from request input.
    pub source_file: &'static str,
    /// Compile step, absent for interpreted languages.
    pub compile: Option<CommandTemplate>,
    pub run: CommandTemplate,
    /// Per-language wall-clock override; `None` means the engine default.
    pub timeout_ms: Option<u64>,
    pub harness: HarnessFn,
}

impl LanguageProfile {
    pub fn requires_compilation(&self) -> bool {
        self.compile.is_some()
    }
}

/// Static language table. `lookup` is the only way in; anything not listed
/// here is `UnsupportedLanguage`.
pub struct LanguageRegistry {
    profiles: HashMap<Language, LanguageProfile>,
}

impl LanguageRegistry {
    pub fn builtin() -> Self {
        let profiles = [
            LanguageProfile {
                language: Language::JavaScript,
                source_file: "main.js",
                compile: None,
                run: CommandTemplate::new(&["node", "%SOURCE%"]),
                timeout_ms: None,
                harness: materialize::javascript_harness,
            },
            LanguageProfile {
                language: Language::TypeScript,
                source_file: "main.ts",
                compile: None,
                run: CommandTemplate::new(&["ts-node", "%SOURCE%"]),
                timeout_ms: Some(20_000), // ts-node startup is slow
                harness: materialize::javascript_harness,
            },
            LanguageProfile {
                language: Language::Python,
                source_file: "main.py",
                compile: None,
                run: CommandTemplate::new(&["python3", "%SOURCE%"]),
                timeout_ms: None,
                harness: materialize::python_harness,
            },
            LanguageProfile {
                language: Language::Ruby,
                source_file: "main.rb",
                compile: None,
                run: CommandTemplate::new(&["ruby", "%SOURCE%"]),
                timeout_ms: None,
                harness: materialize::ruby_harness,
            },
            LanguageProfile {
                language: Language::Java,
                source_file: "Main.java",
                compile: Some(CommandTemplate::new(&["javac", "%SOURCE%"])),
                run: CommandTemplate::new(&["java", "-cp", ".", "Main"]),
                timeout_ms: Some(20_000),
                harness: materialize::java_harness,
            },
            LanguageProfile {
                language: Language::Cpp,
                source_file: "main.cpp",
                compile: Some(CommandTemplate::new(&[
                    "g++", "-O2", "-std=c++17", "-o", "%EXE%", "%SOURCE%",
                ])),
                run: CommandTemplate::new(&["./%EXE%"]),
                timeout_ms: None,
                harness: materialize::cpp_harness,
            },
            LanguageProfile {
                language: Language::CSharp,
                source_file: "main.cs",
                compile: Some(CommandTemplate::new(&["mcs", "-out:%EXE%", "%SOURCE%"])),
                run: CommandTemplate::new(&["mono", "%EXE%"]),
                timeout_ms: Some(20_000),
                harness: materialize::csharp_harness,
            },
            LanguageProfile {
                language: Language::Go,
                source_file: "main.go",
                compile: Some(CommandTemplate::new(&[
                    "go", "build", "-o", "%EXE%", "%SOURCE%",
                ])),
                run: CommandTemplate::new(&["./%EXE%"]),
                timeout_ms: Some(20_000),
                harness: materialize::go_harness,
            },
            LanguageProfile {
                language: Language::Rust,
                source_file: "main.rs",
                compile: Some(CommandTemplate::new(&[
                    "rustc", "-O", "--edition", "2021", "-o", "%EXE%", "%SOURCE%",
                ])),
                run: CommandTemplate::new(&["./%EXE%"]),
                timeout_ms: Some(20_000),
                harness: materialize::rust_harness,
            },
        ];

        Self {
            profiles: profiles.into_iter().map(|p| (p.language, p)).collect(),
        }
    }

    /// Builds a registry from explicit profiles. The language set stays
    /// closed (profiles are keyed by `Language`); this exists for tests and
    /// embedders that point a language at an alternate toolchain command.
    pub fn custom(profiles: impl IntoIterator<Item = LanguageProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.language, p)).collect(),
        }
    }

    pub fn lookup(&self, language_id: &str) -> Result<&LanguageProfile, EngineError> {
        let language = Language::from_str(language_id)?;
        self.profiles
            .get(&language)
            .ok_or_else(|| EngineError::UnsupportedLanguage(language_id.to_string()))
    }

    /// Identifiers of the languages this registry actually holds profiles
    /// for, in declaration order.
    pub fn language_ids(&self) -> Vec<&'static str> {
        Language::ALL
            .iter()
            .filter(|l| self.profiles.contains_key(l))
            .map(|l| l.id())
            .collect()
    }
}
