// CLI commands for running and grading code locally
use anyhow::{bail, Context, Result};
use arbiter_common::config::EngineConfig;
use arbiter_common::store::MemoryVerdictStore;
use arbiter_common::types::{Language, RunReport, RunRequest, SubmitRequest, TestCase, UserRef};
use arbiter_engine::language::LanguageConfigManager;
use arbiter_engine::sandbox::docker::DockerRuntime;
use arbiter_engine::Judge;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const CLI_USER: &str = "cli";
const CLI_PROBLEM: &str = "local";

fn load_engine() -> Result<(EngineConfig, LanguageConfigManager)> {
    let config = EngineConfig::from_env().context("Invalid engine configuration")?;
    let languages = LanguageConfigManager::load_or_builtin(&config.languages_config)?;
    Ok((config, languages))
}

async fn docker_runtime(config: &EngineConfig) -> Result<DockerRuntime> {
    let runtime = DockerRuntime::connect(config.max_output_bytes).context("Failed to create Docker client")?;
    runtime
        .ping()
        .await
        .context("Docker daemon is not reachable. Is Docker running?")?;
    Ok(runtime)
}

async fn build_judge() -> Result<Judge> {
    let (config, languages) = load_engine()?;
    let runtime = docker_runtime(&config).await?;
    let judge = Judge::new(config, languages, Arc::new(runtime), Arc::new(MemoryVerdictStore::new()))?;
    Ok(judge)
}

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read source file {}", file.display()))
}

/// Parses `[{"input": "...", "output": "..."}, ...]`.
fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let tests: Vec<TestCase> =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse test cases in {}", path.display()))?;
    if tests.is_empty() {
        bail!("{} contains no test cases", path.display());
    }
    Ok(tests)
}

pub async fn run_program(language: Language, file: &Path, input: Option<&Path>) -> Result<()> {
    let source_code = read_source(file)?;
    let input = match input {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read input {}", path.display()))?,
        None => String::new(),
    };

    let judge = build_judge().await?;
    println!("🚀 Running {} ({})", file.display(), language);

    let report = judge
        .run(RunRequest {
            language,
            source_code,
            input,
        })
        .await?;

    match report {
        RunReport::Output { stdout } => {
            println!("✅ Successfully executed");
            println!("{}", "─".repeat(60));
            print!("{}", stdout);
        }
        RunReport::Failed { kind, diagnostic } => {
            println!("❌ {}", kind.label());
            if !diagnostic.is_empty() {
                println!("{}", "─".repeat(60));
                println!("{}", diagnostic);
            }
        }
    }
    Ok(())
}

pub async fn grade_program(language: Language, file: &Path, tests: &Path) -> Result<()> {
    let source_code = read_source(file)?;
    let test_cases = load_test_cases(tests)?;

    let judge = build_judge().await?;
    println!(
        "⚖️  Grading {} ({}) against {} test case(s)",
        file.display(),
        language,
        test_cases.len()
    );

    let verdict = judge
        .submit(SubmitRequest {
            user: UserRef {
                id: CLI_USER.to_string(),
                name: CLI_USER.to_string(),
            },
            problem_id: CLI_PROBLEM.to_string(),
            language,
            source_code,
            test_cases,
        })
        .await?;

    let marker = if verdict.is_accepted() { "✅" } else { "❌" };
    println!("{} {}", marker, verdict.label());
    println!("{}", "─".repeat(60));
    println!("{}", verdict.diagnostic());
    Ok(())
}

pub fn list_languages() -> Result<()> {
    let (config, languages) = load_engine()?;

    println!("📋 Configured Languages:\n");
    println!(
        "{:<12} {:<10} {:<28} {:<10} {:<10} {:<10}",
        "Name", "Version", "Image", "CPUs", "Memory", "Time"
    );
    println!("{}", "─".repeat(84));

    for language in languages.list_languages() {
        let lang = languages.get_config(language);
        let profile = languages.profile(language, &config);
        println!(
            "{:<12} {:<10} {:<28} {:<10.1} {:<10} {:<10}",
            language,
            lang.version,
            profile.image,
            profile.run_limits.cpus,
            format!("{} MB", profile.run_limits.memory_bytes / (1024 * 1024)),
            format!("{} ms", profile.run_limits.wall_time.as_millis()),
        );
    }

    println!("\n✅ Total: {} language(s)", languages.list_languages().len());
    Ok(())
}

pub async fn pull_images() -> Result<()> {
    let (config, languages) = load_engine()?;
    let runtime = docker_runtime(&config).await?;

    for language in languages.list_languages() {
        let image = languages.get_image(language);
        println!("🐳 Ensuring image for {}: {}", language, image);
        runtime
            .ensure_image(image)
            .await
            .with_context(|| format!("Failed to pull {}", image))?;
    }

    println!("\n✅ All sandbox images available");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_test_cases_uses_output_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tests.json");
        fs::write(&path, r#"[{"input": "1 2", "output": "3"}, {"input": "", "output": "0"}]"#).unwrap();

        let tests = load_test_cases(&path).unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].input, "1 2");
        assert_eq!(tests[0].expected_output, "3");
    }

    #[test]
    fn test_load_test_cases_rejects_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tests.json");
        fs::write(&path, "[]").unwrap();

        assert!(load_test_cases(&path).is_err());
    }

    #[test]
    fn test_missing_source_file_names_the_path() {
        let err = read_source(Path::new("/nonexistent/solution.cpp")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/solution.cpp"));
    }
}
