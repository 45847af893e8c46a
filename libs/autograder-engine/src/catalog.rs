// Resolves which installed sandbox version to run a language with

use crate::sandbox::{Package, Runtime, SandboxClient, SandboxError};
use autograder_common::Language;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Version selector the sandbox accepts when nothing better is known
pub const LATEST: &str = "latest";

pub struct LanguageCatalog<'a> {
    client: &'a SandboxClient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    AlreadyInstalled { version: String },
    Installed { version: String },
    NotAvailable,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub language: Language,
    #[serde(flatten)]
    pub outcome: InstallOutcome,
}

impl<'a> LanguageCatalog<'a> {
    pub fn new(client: &'a SandboxClient) -> Self {
        Self { client }
    }

    /// Best installed version for `language`, preferring `requested`
    ///
    /// Never fails: an open circuit, a sandbox error or an unknown language
    /// all resolve to `latest`.
    pub async fn resolve_version(&self, language: &Language, requested: Option<&str>) -> String {
        if self.client.breaker().check().is_open() {
            debug!(language = %language, "Circuit open, using latest");
            return LATEST.to_string();
        }

        match self.client.packages().await {
            Ok(packages) => {
                let versions = installed_package_versions(&packages, language);
                if let Some(version) = pick_version(language, &versions, requested) {
                    debug!(language = %language, version = %version, "Resolved version from packages");
                    return version;
                }
            }
            Err(e) => debug!(language = %language, error = %e, "Package listing failed"),
        }

        match self.client.runtimes().await {
            Ok(runtimes) => {
                let versions = runtime_versions(&runtimes, language);
                if let Some(version) = pick_version(language, &versions, requested) {
                    debug!(language = %language, version = %version, "Resolved version from runtimes");
                    return version;
                }
            }
            Err(e) => debug!(language = %language, error = %e, "Runtime listing failed"),
        }

        warn!(language = %language, "No sandbox version found, using latest");
        LATEST.to_string()
    }

    /// Install the newest available package for each language that has none
    pub async fn ensure_installed(&self, languages: &[Language]) -> Result<Vec<InstallReport>, SandboxError> {
        let packages = self.client.packages().await?;
        let mut reports = Vec::with_capacity(languages.len());

        for language in languages {
            let installed = installed_package_versions(&packages, language);
            if let Some(version) = pick_version(language, &installed, None) {
                reports.push(InstallReport {
                    language: language.clone(),
                    outcome: InstallOutcome::AlreadyInstalled { version },
                });
                continue;
            }

            let available: Vec<String> = packages
                .iter()
                .filter(|p| names_language(&p.language, language))
                .map(|p| p.language_version.clone())
                .collect();
            let Some(version) = pick_version(language, &available, None) else {
                warn!(language = %language, "No installable package found");
                reports.push(InstallReport {
                    language: language.clone(),
                    outcome: InstallOutcome::NotAvailable,
                });
                continue;
            };

            info!(language = %language, version = %version, "Installing package");
            let outcome = match self.client.install_package(language, &version).await {
                Ok(()) => InstallOutcome::Installed { version },
                Err(e) => InstallOutcome::Failed { reason: e.to_string() },
            };
            reports.push(InstallReport {
                language: language.clone(),
                outcome,
            });
        }

        Ok(reports)
    }
}

fn names_language(name: &str, language: &Language) -> bool {
    let name = name.trim().to_lowercase();
    name == language.package_name() || name == language.sandbox_name() || &Language::parse(&name) == language
}

fn installed_package_versions(packages: &[Package], language: &Language) -> Vec<String> {
    packages
        .iter()
        .filter(|p| p.installed != Some(false))
        .filter(|p| names_language(&p.language, language))
        .map(|p| p.language_version.clone())
        .collect()
}

fn runtime_versions(runtimes: &[Runtime], language: &Language) -> Vec<String> {
    runtimes
        .iter()
        .filter(|r| {
            names_language(&r.language, language)
                || r.aliases.iter().any(|alias| names_language(alias, language))
        })
        .map(|r| r.version.clone())
        .collect()
}

/// Requested version if offered (exact or dotted prefix), else the highest
pub fn pick_version(language: &Language, versions: &[String], requested: Option<&str>) -> Option<String> {
    let candidates: Vec<&String> = versions
        .iter()
        .filter(|v| !v.trim().is_empty())
        .filter(|v| !(matches!(language, Language::Python) && v.starts_with("2.")))
        .collect();

    let requested = requested
        .map(|r| r.trim().trim_end_matches(".x").trim_end_matches(".*"))
        .filter(|r| !r.is_empty() && *r != LATEST && *r != "*");

    if let Some(wanted) = requested {
        if let Some(exact) = candidates.iter().find(|v| v.as_str() == wanted) {
            return Some((*exact).clone());
        }
        let prefix = format!("{}.", wanted);
        let best_prefixed = candidates
            .iter()
            .filter(|v| v.starts_with(&prefix))
            .max_by(|a, b| compare_versions(a, b));
        if let Some(version) = best_prefixed {
            return Some((*version).clone());
        }
    }

    candidates
        .into_iter()
        .max_by(|a, b| compare_versions(a, b))
        .cloned()
}

/// Numeric dotted comparison; missing segments count as zero
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|segment| {
                let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse::<u64>().unwrap_or(0)
            })
            .collect()
    };
    let (left, right) = (parse(a), parse(b));
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
