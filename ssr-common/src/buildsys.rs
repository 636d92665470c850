//! Build-system detection and prerequisite resolution.
//!
//! Classification is a pure function of marker files at the workspace
//! root, checked in a fixed priority order. An unrecognized project is
//! not an error: downstream stages skip the build entirely and go
//! straight to analysis.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Supported build tool kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystem {
    Maven,
    Gradle,
    CMake,
    Make,
    Npm,
    Python,
}

impl BuildSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Maven => "maven",
            Self::Gradle => "gradle",
            Self::CMake => "cmake",
            Self::Make => "make",
            Self::Npm => "npm",
            Self::Python => "python",
        }
    }
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected build system plus its canonical default build command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub system: BuildSystem,
    pub command: String,
}

/// Marker files checked at the workspace root, highest priority first.
const MARKERS: &[(&str, BuildSystem, &str)] = &[
    ("pom.xml", BuildSystem::Maven, "mvn clean install"),
    ("build.gradle", BuildSystem::Gradle, "./gradlew build"),
    ("build.gradle.kts", BuildSystem::Gradle, "./gradlew build"),
    ("CMakeLists.txt", BuildSystem::CMake, "cmake . && make"),
    ("Makefile", BuildSystem::Make, "make"),
    ("package.json", BuildSystem::Npm, "npm install && npm run build"),
    ("setup.py", BuildSystem::Python, "python setup.py build"),
];

/// Classify the project at `root` by its top-level marker files.
///
/// Returns `None` when no marker matches.
pub fn detect(root: &Path) -> Option<BuildPlan> {
    MARKERS
        .iter()
        .find(|(marker, _, _)| root.join(marker).is_file())
        .map(|&(_, system, command)| BuildPlan {
            system,
            command: command.to_string(),
        })
}

/// Setup commands to run ahead of a build, grouped by build system.
///
/// The resolved list later executes inside a single shell session
/// together with the build command, so environment mutations made by
/// one command are visible to the ones after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrerequisiteConfig {
    pub global: Vec<String>,
    pub maven: Vec<String>,
    pub gradle: Vec<String>,
    pub cmake: Vec<String>,
    pub make: Vec<String>,
    pub npm: Vec<String>,
    pub python: Vec<String>,
}

impl PrerequisiteConfig {
    fn for_system(&self, system: BuildSystem) -> &[String] {
        match system {
            BuildSystem::Maven => &self.maven,
            BuildSystem::Gradle => &self.gradle,
            BuildSystem::CMake => &self.cmake,
            BuildSystem::Make => &self.make,
            BuildSystem::Npm => &self.npm,
            BuildSystem::Python => &self.python,
        }
    }

    /// Global commands followed by the system-specific ones, configured
    /// order preserved.
    pub fn resolve(&self, system: BuildSystem) -> Vec<String> {
        self.global
            .iter()
            .chain(self.for_system(system))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn detects_maven_before_anything_else() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Makefile"), "all:\n").unwrap();
        fs::write(dir.path().join("pom.xml"), "<project/>").unwrap();

        let plan = detect(dir.path()).unwrap();
        assert_eq!(plan.system, BuildSystem::Maven);
        assert_eq!(plan.command, "mvn clean install");
    }

    #[test]
    fn detects_kotlin_gradle_script() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("build.gradle.kts"), "").unwrap();

        let plan = detect(dir.path()).unwrap();
        assert_eq!(plan.system, BuildSystem::Gradle);
        assert_eq!(plan.command, "./gradlew build");
    }

    #[test]
    fn detects_npm_over_python() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("setup.py"), "").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        let plan = detect(dir.path()).unwrap();
        assert_eq!(plan.system, BuildSystem::Npm);
    }

    #[test]
    fn unknown_project_yields_none() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "hello").unwrap();
        assert_eq!(detect(dir.path()), None);
    }

    #[test]
    fn marker_must_be_a_file() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("Makefile")).unwrap();
        assert_eq!(detect(dir.path()), None);
    }

    #[test]
    fn resolve_puts_global_before_system_specific() {
        let config = PrerequisiteConfig {
            global: vec!["export X=1".to_string()],
            maven: vec!["echo maven".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.resolve(BuildSystem::Maven),
            vec!["export X=1".to_string(), "echo maven".to_string()]
        );
    }

    #[test]
    fn resolve_ignores_other_systems() {
        let config = PrerequisiteConfig {
            global: vec!["export X=1".to_string()],
            maven: vec!["echo maven".to_string()],
            npm: vec!["echo npm".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.resolve(BuildSystem::Npm),
            vec!["export X=1".to_string(), "echo npm".to_string()]
        );
    }

    #[test]
    fn empty_config_resolves_empty() {
        let config = PrerequisiteConfig::default();
        assert!(config.resolve(BuildSystem::Make).is_empty());
    }
}
