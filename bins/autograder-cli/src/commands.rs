// CLI commands for grading and sandbox management
use anyhow::{bail, Context, Result};
use autograder_common::{Config, Language, SubmissionAttempt, TestCase};
use autograder_engine::metrics::render_metrics;
use autograder_engine::{GradeOptions, Grader, HarnessGenerator, SandboxClient};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::info;

fn load_submission(language: &str, source: &Path) -> Result<SubmissionAttempt> {
    let source_code = fs::read_to_string(source)
        .with_context(|| format!("Failed to read source file {}", source.display()))?;
    Ok(SubmissionAttempt {
        source_code,
        language: Language::parse(language),
    })
}

fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test cases {}", path.display()))?;
    let tests: Vec<TestCase> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test cases {}", path.display()))?;
    if tests.is_empty() {
        bail!("No test cases in {}", path.display());
    }
    Ok(tests)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

fn sandbox_client(config: Config) -> Result<SandboxClient> {
    SandboxClient::new(config).context("Failed to create sandbox client")
}

/// Grade one submission end to end
pub async fn grade(
    language: &str,
    source: &Path,
    tests: &Path,
    instructor: bool,
    timeout_ms: Option<u64>,
    show_metrics: bool,
) -> Result<()> {
    let attempt = load_submission(language, source)?;
    let test_cases = load_test_cases(tests)?;

    let grader = Grader::from_config(Config::from_env()).context("Failed to initialize grader")?;
    let options = GradeOptions {
        timeout_ms,
        instructor_view: instructor,
    };
    let result = grader
        .grade_with_options(
            &attempt.language.to_string(),
            &attempt.source_code,
            &test_cases,
            options,
        )
        .await;

    print_json(&result)?;
    if show_metrics {
        eprintln!("{}", render_metrics());
    }
    Ok(())
}

/// Print the harness that would be submitted
pub fn print_harness(language: &str, source: &Path, tests: &Path) -> Result<()> {
    let attempt = load_submission(language, source)?;
    let test_cases = load_test_cases(tests)?;

    let config = Config::from_env();
    let generator = HarnessGenerator::from_config_dir(config.template_dir.as_deref())
        .context("Failed to load harness templates")?;
    let harness = generator
        .generate(&attempt.language, &attempt.source_code, &test_cases)
        .context("Failed to generate harness")?;

    print!("{}", harness);
    Ok(())
}

pub async fn list_runtimes() -> Result<()> {
    let client = sandbox_client(Config::from_env())?;
    let runtimes = client.runtimes().await.context("Failed to list runtimes")?;
    info!(count = runtimes.len(), "Listed sandbox runtimes");
    print_json(&runtimes)
}

pub async fn resolve(language: &str, version: Option<&str>) -> Result<()> {
    let client = sandbox_client(Config::from_env())?;
    let language = Language::parse(language);
    let resolved = client.catalog().resolve_version(&language, version).await;
    print_json(&json!({
        "language": language,
        "requested": version,
        "version": resolved,
    }))
}

/// Install packages; no names means every supported language
pub async fn install(languages: &[String]) -> Result<()> {
    let client = sandbox_client(Config::from_env())?;
    let languages: Vec<Language> = if languages.is_empty() {
        Language::all_variants().to_vec()
    } else {
        languages.iter().map(|name| Language::parse(name)).collect()
    };

    let reports = client
        .catalog()
        .ensure_installed(&languages)
        .await
        .context("Failed to install sandbox packages")?;
    print_json(&reports)
}

pub async fn status() -> Result<()> {
    let config = Config::from_env();
    let base = config.api_base();
    let client = sandbox_client(config)?;

    let health = client.health().await;
    let breaker = client.breaker_snapshot();
    print_json(&json!({
        "sandbox": base,
        "available": health.available,
        "message": health.message,
        "breaker": {
            "open": breaker.open,
            "consecutive_failures": breaker.consecutive_failures,
            "trips": breaker.trips,
        },
    }))
}
