// Language adapter: per-language build/run recipes and sandbox configuration
use crate::sandbox::ResourceLimits;
use crate::workspace::JobId;
use anyhow::{bail, Context, Result};
use arbiter_common::config::EngineConfig;
use arbiter_common::types::Language;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Where the job's source directory is mounted inside the sandbox.
pub const SANDBOX_SRC_DIR: &str = "/sandbox/src";
/// Where compile artifacts are written (compile stage) and read (run stage).
pub const SANDBOX_BUILD_DIR: &str = "/sandbox/build";
/// Where the test input is mounted; the run stage reads stdin from it.
pub const SANDBOX_INPUT: &str = "/sandbox/input.txt";

lazy_static! {
    static ref PUBLIC_CLASS: Regex = Regex::new(
        r"public\s+(?:(?:final|abstract|strictfp)\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)"
    )
    .expect("public class pattern is valid");
    static ref PACKAGE_DECL: Regex =
        Regex::new(r"(?m)^\s*package\s+[A-Za-z_$][A-Za-z0-9_$.]*\s*;").expect("package pattern is valid");
}

/// How the source file inside the job workspace is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// `<job id>.<ext>`
    JobId,
    /// Name required by the toolchain, discovered from the source text.
    Named(String),
}

/// Why a source could not be turned into a recipe. Surfaces as a
/// compilation error, never as a runtime crash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EntryPointError(pub String);

/// Build/run recipe for one source program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub language: Language,
    pub extension: &'static str,
    /// Static language property: interpreted languages have no compile stage,
    /// so their non-zero exits are always runtime errors.
    pub compile_required: bool,
    pub entry_point: EntryPoint,
}

impl Recipe {
    /// Resolves the recipe for `source`, discovering a name-derived entry point
    /// where the toolchain needs one. Performs no I/O.
    pub fn resolve(language: Language, source: &str) -> Result<Self, EntryPointError> {
        let (extension, compile_required) = match language {
            Language::Cpp => ("cpp", true),
            Language::Java => ("java", true),
            Language::Python => ("py", false),
            Language::Javascript => ("js", false),
        };

        let entry_point = match language {
            Language::Java => {
                reject_package(source)?;
                EntryPoint::Named(extract_public_class(source)?)
            }
            _ => EntryPoint::JobId,
        };

        Ok(Self {
            language,
            extension,
            compile_required,
            entry_point,
        })
    }

    pub fn source_file_name(&self, job_id: &JobId) -> String {
        match &self.entry_point {
            EntryPoint::JobId => format!("{}.{}", job_id, self.extension),
            EntryPoint::Named(name) => format!("{}.{}", name, self.extension),
        }
    }

    /// Compile argv, or `None` for languages without a compile stage.
    pub fn compile_command(&self, source_file: &str) -> Option<Vec<String>> {
        if !self.compile_required {
            return None;
        }
        let source = format!("{}/{}", SANDBOX_SRC_DIR, source_file);
        let argv = match self.language {
            Language::Cpp => vec![
                "g++".to_string(),
                "-O2".to_string(),
                "-std=c++17".to_string(),
                "-o".to_string(),
                format!("{}/main", SANDBOX_BUILD_DIR),
                source,
            ],
            Language::Java => vec![
                "javac".to_string(),
                "-d".to_string(),
                SANDBOX_BUILD_DIR.to_string(),
                source,
            ],
            Language::Python | Language::Javascript => return None,
        };
        Some(argv)
    }

    pub fn run_command(&self, source_file: &str) -> Vec<String> {
        match self.language {
            Language::Cpp => vec![format!("{}/main", SANDBOX_BUILD_DIR)],
            Language::Java => {
                let class = match &self.entry_point {
                    EntryPoint::Named(name) => name.clone(),
                    EntryPoint::JobId => "Main".to_string(),
                };
                vec![
                    "java".to_string(),
                    "-Xss64m".to_string(),
                    "-cp".to_string(),
                    SANDBOX_BUILD_DIR.to_string(),
                    class,
                ]
            }
            Language::Python => vec![
                "python3".to_string(),
                "-u".to_string(),
                format!("{}/{}", SANDBOX_SRC_DIR, source_file),
            ],
            Language::Javascript => vec![
                "node".to_string(),
                format!("{}/{}", SANDBOX_SRC_DIR, source_file),
            ],
        }
    }
}

/// javac would place packaged classes in a subdirectory the run classpath
/// does not cover, so only the default package is accepted.
fn reject_package(source: &str) -> Result<(), EntryPointError> {
    if PACKAGE_DECL.is_match(source) {
        return Err(EntryPointError(
            "Package declarations are not supported; remove the package line".to_string(),
        ));
    }
    Ok(())
}

/// Finds the declared public class, which javac requires as the file name.
pub fn extract_public_class(source: &str) -> Result<String, EntryPointError> {
    PUBLIC_CLASS
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| EntryPointError("No public class found in the Java source".to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: Language,
    #[serde(default)]
    pub version: String,
    pub image: String,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
    #[serde(default)]
    pub cpu_limit: Option<f64>,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
}

impl LanguageConfig {
    fn builtin(language: Language) -> Self {
        let (version, image) = match language {
            Language::Cpp => ("13", "gcc:13"),
            Language::Java => ("17", "eclipse-temurin:17-jdk"),
            Language::Python => ("3.12", "python:3.12-slim"),
            Language::Javascript => ("20", "node:20-slim"),
        };
        Self {
            name: language,
            version: version.to_string(),
            image: image.to_string(),
            memory_limit_mb: None,
            cpu_limit: None,
            time_limit_ms: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Image and limits for every stage of one language's jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxProfile {
    pub image: String,
    pub run_limits: ResourceLimits,
    pub compile_limits: ResourceLimits,
}

/// Language configuration manager
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Built-in images for every supported language.
    pub fn builtin() -> Self {
        let configs = Language::ALL
            .iter()
            .map(|lang| (*lang, LanguageConfig::builtin(*lang)))
            .collect();
        Self { configs }
    }

    /// Load language configurations from languages.json.
    /// Languages the file omits keep their built-in configuration.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Like `load`, but a missing file means built-in defaults.
    pub fn load_or_builtin(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            warn!(path = %config_path.display(), "Language config not found, using built-in images");
            Ok(Self::builtin())
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson = serde_json::from_str(content)?;
        let mut manager = Self::builtin();
        for lang in languages_json.languages {
            if lang.image.trim().is_empty() {
                bail!("Empty image for language {}", lang.name);
            }
            manager.configs.insert(lang.name, lang);
        }
        Ok(manager)
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: Language) -> &LanguageConfig {
        // builtin() seeds every variant, so lookups cannot miss
        &self.configs[&language]
    }

    pub fn get_image(&self, language: Language) -> &str {
        &self.get_config(language).image
    }

    /// Effective sandbox profile: per-language overrides over engine defaults.
    pub fn profile(&self, language: Language, engine: &EngineConfig) -> SandboxProfile {
        let config = self.get_config(language);
        let memory_mb = config.memory_limit_mb.unwrap_or(engine.default_memory_limit_mb);
        let cpus = config.cpu_limit.unwrap_or(engine.default_cpus);
        let wall_time = config
            .time_limit_ms
            .map(std::time::Duration::from_millis)
            .unwrap_or(engine.default_time_limit);

        let run_limits = ResourceLimits {
            wall_time,
            memory_bytes: memory_mb * 1024 * 1024,
            cpus,
        };
        // Toolchains get at least the run ceiling and the compile time budget
        let compile_limits = ResourceLimits {
            wall_time: engine.compile_time_limit.max(wall_time),
            memory_bytes: run_limits.memory_bytes.max(512 * 1024 * 1024),
            cpus,
        };

        SandboxProfile {
            image: config.image.clone(),
            run_limits,
            compile_limits,
        }
    }

    /// List all configured languages
    pub fn list_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.configs.keys().copied().collect();
        languages.sort_by_key(|l| l.as_str());
        languages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_extract_public_class() {
        let src = "import java.util.*;\n\npublic class Solution {\n  public static void main(String[] a) {}\n}";
        assert_eq!(extract_public_class(src).unwrap(), "Solution");
        assert_eq!(
            extract_public_class("public final class Main { }").unwrap(),
            "Main"
        );
        assert_eq!(
            extract_public_class("public   \n class\tWeird_1 {}").unwrap(),
            "Weird_1"
        );
    }

    #[test]
    fn test_missing_public_class_is_entry_point_error() {
        let err = Recipe::resolve(Language::Java, "class Main { public static void main(String[] a) {} }")
            .unwrap_err();
        assert!(err.to_string().contains("No public class"));
    }

    #[test]
    fn test_java_package_declaration_is_rejected() {
        let src = "package com.example;\n\npublic class Main { public static void main(String[] a) {} }";
        let err = Recipe::resolve(Language::Java, src).unwrap_err();
        assert!(err.to_string().contains("Package declarations"));

        // an identifier merely containing the word is fine
        let src = "public class Main { static int packageCount; }";
        assert!(Recipe::resolve(Language::Java, src).is_ok());
    }

    #[test]
    fn test_compile_required_is_a_language_property() {
        assert!(Recipe::resolve(Language::Cpp, "int main(){}").unwrap().compile_required);
        assert!(Recipe::resolve(Language::Java, "public class A {}").unwrap().compile_required);
        assert!(!Recipe::resolve(Language::Python, "print(1)").unwrap().compile_required);
        assert!(!Recipe::resolve(Language::Javascript, "console.log(1)").unwrap().compile_required);
    }

    #[test]
    fn test_source_file_names() {
        let job = JobId::new();
        let cpp = Recipe::resolve(Language::Cpp, "int main(){}").unwrap();
        assert_eq!(cpp.source_file_name(&job), format!("{}.cpp", job));

        let java = Recipe::resolve(Language::Java, "public class Hello {}").unwrap();
        assert_eq!(java.source_file_name(&job), "Hello.java");
    }

    #[test]
    fn test_commands() {
        let java = Recipe::resolve(Language::Java, "public class Hello {}").unwrap();
        let compile = java.compile_command("Hello.java").unwrap();
        assert_eq!(compile[0], "javac");
        assert_eq!(compile.last().unwrap(), "/sandbox/src/Hello.java");
        assert_eq!(java.run_command("Hello.java").last().unwrap(), "Hello");

        let py = Recipe::resolve(Language::Python, "print(1)").unwrap();
        assert_eq!(py.compile_command("x.py"), None);
        assert_eq!(py.run_command("x.py"), vec!["python3", "-u", "/sandbox/src/x.py"]);

        let cpp = Recipe::resolve(Language::Cpp, "").unwrap();
        assert_eq!(cpp.run_command("x.cpp"), vec!["/sandbox/build/main"]);
    }

    #[test]
    fn test_config_overrides_and_fallbacks() {
        let json = r#"{"languages":[{"name":"python","image":"my-python:1","memory_limit_mb":128,"time_limit_ms":2000}]}"#;
        let manager = LanguageConfigManager::from_json(json).unwrap();
        assert_eq!(manager.get_image(Language::Python), "my-python:1");
        assert_eq!(manager.get_image(Language::Cpp), "gcc:13");
        assert_eq!(manager.list_languages().len(), 4);

        let engine = EngineConfig::default();
        let profile = manager.profile(Language::Python, &engine);
        assert_eq!(profile.run_limits.memory_bytes, 128 * 1024 * 1024);
        assert_eq!(profile.run_limits.wall_time, Duration::from_secs(2));
        assert_eq!(profile.run_limits.cpus, 1.0);
        assert!(profile.compile_limits.wall_time >= engine.compile_time_limit);

        let cpp = manager.profile(Language::Cpp, &engine);
        assert_eq!(cpp.run_limits.memory_bytes, 256 * 1024 * 1024);
        assert_eq!(cpp.run_limits.wall_time, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_language_in_config_is_rejected() {
        let json = r#"{"languages":[{"name":"rust","image":"rust:1"}]}"#;
        assert!(LanguageConfigManager::from_json(json).is_err());
    }

    #[test]
    fn test_repository_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/languages.json");
        let manager = LanguageConfigManager::load(&path).unwrap();
        assert_eq!(manager.get_image(Language::Java), "eclipse-temurin:17-jdk");
    }
}
