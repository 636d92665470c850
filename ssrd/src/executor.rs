//! The scan pipeline.
//!
//! Each submitted scan runs on its own background task: verify the
//! external tools, clone the requested branch, detect the build
//! system, run any configured prerequisites plus the instrumented
//! build in one shell session, run the analysis scanner, then remove
//! the working directory. Failures are contained to the job being
//! executed; the serving loop never sees them.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::registry::ScanRegistry;
use crate::runner;
use ssr_common::buildsys::{self, BuildPlan};
use ssr_common::util::{mask_credentials, project_key_from_repo};
use ssr_common::{ScanError, ScanId, ScanState, SsrConfig};

/// Directory inside a workdir where build-wrapper trace artifacts land.
const BW_OUTPUT_DIR: &str = "bw-output";

/// Drives one scan job from `queued` to a terminal state.
pub struct ScanExecutor {
    registry: Arc<ScanRegistry>,
    config: Arc<SsrConfig>,
}

impl ScanExecutor {
    pub fn new(registry: Arc<ScanRegistry>, config: Arc<SsrConfig>) -> Self {
        Self { registry, config }
    }

    /// Dispatch the pipeline onto its own background task.
    pub fn spawn(
        self,
        id: ScanId,
        repository: String,
        branch: String,
        version: String,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(id, repository, branch, version).await })
    }

    /// Run the pipeline to completion and map the outcome onto the
    /// job's terminal state.
    pub async fn run(&self, id: ScanId, repository: String, branch: String, version: String) {
        self.registry.mark_running(&id);
        self.emit(&id, format!("scan started for {repository} (branch {branch}, version {version})"));
        info!("scan {id} started for {repository}@{branch}");

        // The workdir is named after the id, which already carries the
        // per-submission counter, so concurrent scans of the same
        // repository and branch never share a directory.
        let workdir = self.config.sonar.workspace_dir.join(id.as_str());

        let outcome = self
            .execute(&id, &repository, &branch, &version, &workdir)
            .await;
        self.cleanup(&id, &workdir).await;

        match outcome {
            Ok(code) => {
                self.emit(&id, "scan finished successfully");
                self.registry.finish(&id, ScanState::Completed, Some(code));
                info!("scan {id} completed");
            }
            Err(err) => {
                let state = match err.exit_code() {
                    Some(_) => ScanState::Failed,
                    None => ScanState::Error,
                };
                self.emit(&id, format!("error: {err}"));
                self.registry.finish(&id, state, err.exit_code());
                warn!("scan {id} ended in {state:?}: {err}");
            }
        }
    }

    async fn execute(
        &self,
        id: &ScanId,
        repository: &str,
        branch: &str,
        version: &str,
        workdir: &Path,
    ) -> Result<i32, ScanError> {
        self.check_tools(id)?;
        self.clone_repository(id, repository, branch, workdir).await?;

        if let Some(plan) = self.detect_build_system(id, workdir) {
            let prereqs = self.config.prerequisites.resolve(plan.system);
            self.show_prerequisites(id, &plan, &prereqs);
            self.instrumented_build(id, &plan, &prereqs, workdir).await?;
        }

        self.run_scanner(id, repository, version, workdir).await
    }

    /// Stage 1: every external tool must resolve before any work starts.
    fn check_tools(&self, id: &ScanId) -> Result<(), ScanError> {
        self.emit(id, "checking prerequisites");
        let tools = [
            &self.config.tools.git,
            &self.config.tools.build_wrapper,
            &self.config.tools.scanner,
        ];

        let mut missing = Vec::new();
        for tool in tools {
            if resolve_tool(tool) {
                self.emit(id, format!("found {tool}"));
            } else {
                self.emit(id, format!("missing required tool: {tool}"));
                missing.push(tool.clone());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ScanError::Setup(missing.join(", ")))
        }
    }

    /// Stage 2: materialize the requested branch into the fresh workdir.
    async fn clone_repository(
        &self,
        id: &ScanId,
        repository: &str,
        branch: &str,
        workdir: &Path,
    ) -> Result<(), ScanError> {
        self.emit(id, format!("cloning {repository} (branch {branch})"));
        if let Some(parent) = workdir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let argv = vec![
            self.config.tools.git.clone(),
            "clone".to_string(),
            "--branch".to_string(),
            branch.to_string(),
            "--single-branch".to_string(),
            repository.to_string(),
            workdir.display().to_string(),
        ];
        let code = self.run_logged(id, &argv, None).await?;
        if code != 0 {
            return Err(ScanError::Clone(code));
        }
        self.emit(id, format!("repository cloned into {}", workdir.display()));
        Ok(())
    }

    /// Stage 3: `None` skips the prerequisite and build stages.
    fn detect_build_system(&self, id: &ScanId, workdir: &Path) -> Option<BuildPlan> {
        match buildsys::detect(workdir) {
            Some(plan) => {
                self.emit(
                    id,
                    format!("detected {} project (default build: {})", plan.system, plan.command),
                );
                Some(plan)
            }
            None => {
                self.emit(
                    id,
                    "warning: could not detect build system, skipping prerequisite and build stages",
                );
                None
            }
        }
    }

    /// Stage 4: record the resolved command chain before running it.
    fn show_prerequisites(&self, id: &ScanId, plan: &BuildPlan, prereqs: &[String]) {
        if prereqs.is_empty() {
            self.emit(id, "no prerequisite commands configured");
            return;
        }
        self.emit(
            id,
            format!("prerequisites for {} (run in the build's shell session):", plan.system),
        );
        for (index, command) in prereqs.iter().enumerate() {
            self.emit(id, format!("  [{}] {}", index + 1, command));
        }
    }

    /// Stage 5: prerequisites and the wrapped build share one shell so
    /// environment changes carry through. A non-zero build is a
    /// warning, not a failure: a partial build can still leave
    /// analyzable artifacts for the scanner.
    async fn instrumented_build(
        &self,
        id: &ScanId,
        plan: &BuildPlan,
        prereqs: &[String],
        workdir: &Path,
    ) -> Result<(), ScanError> {
        self.emit(id, "building project under the build wrapper");

        let bw_dir = workdir.join(BW_OUTPUT_DIR);
        let wrapped = format!(
            "{} --out-dir {} {}",
            self.config.tools.build_wrapper,
            shell_escape::escape(Cow::from(bw_dir.display().to_string())),
            plan.command,
        );
        let script = if prereqs.is_empty() {
            wrapped
        } else {
            format!("{} && {}", prereqs.join(" && "), wrapped)
        };

        let code = self.run_logged_shell(id, &script, Some(workdir)).await?;
        if code != 0 {
            self.emit(
                id,
                format!("warning: instrumented build exited with code {code}, continuing to analysis"),
            );
        }
        Ok(())
    }

    /// Stage 6: a non-zero scanner exit fails the whole job.
    async fn run_scanner(
        &self,
        id: &ScanId,
        repository: &str,
        version: &str,
        workdir: &Path,
    ) -> Result<i32, ScanError> {
        self.emit(id, "running analysis scanner");

        let project = project_key_from_repo(repository);
        let mut argv = vec![
            self.config.tools.scanner.clone(),
            format!("-Dsonar.projectKey={project}"),
            format!("-Dsonar.projectName={project}"),
            format!("-Dsonar.projectVersion={version}"),
            "-Dsonar.sources=.".to_string(),
            format!("-Dsonar.host.url={}", self.config.sonar.host_url),
        ];
        if !self.config.sonar.token.is_empty() {
            argv.push(format!("-Dsonar.login={}", self.config.sonar.token));
        }
        let bw_dir = workdir.join(BW_OUTPUT_DIR);
        if bw_dir.is_dir() {
            argv.push(format!("-Dsonar.cfamily.build-wrapper-output={}", bw_dir.display()));
        }

        let code = self.run_logged(id, &argv, Some(workdir)).await?;
        if code != 0 {
            return Err(ScanError::Analysis(code));
        }
        Ok(code)
    }

    /// Stage 7: always attempted; failure never changes the outcome.
    async fn cleanup(&self, id: &ScanId, workdir: &Path) {
        if !workdir.exists() {
            return;
        }
        match tokio::fs::remove_dir_all(workdir).await {
            Ok(()) => self.emit(id, format!("removed working directory {}", workdir.display())),
            Err(err) => {
                warn!("scan {id}: failed to remove {}: {err}", workdir.display());
                self.emit(id, format!("warning: could not remove working directory: {err}"));
            }
        }
    }

    /// Echo an argv command (credentials masked) and its output into
    /// the job log, then run it.
    async fn run_logged(
        &self,
        id: &ScanId,
        argv: &[String],
        cwd: Option<&Path>,
    ) -> Result<i32, ScanError> {
        self.emit(id, format!("executing: {}", mask_credentials(&argv.join(" "))));
        let registry = Arc::clone(&self.registry);
        let job = id.clone();
        // Per-line append into the shared job; each call takes the
        // write lock only for the duration of one push.
        let mut sink = move |line: String| {
            registry.append_output(&job, line);
        };
        runner::run_command(argv, cwd, &mut sink).await
    }

    /// Shell variant of [`Self::run_logged`] for chained commands.
    async fn run_logged_shell(
        &self,
        id: &ScanId,
        script: &str,
        cwd: Option<&Path>,
    ) -> Result<i32, ScanError> {
        self.emit(id, format!("executing: {}", mask_credentials(script)));
        let registry = Arc::clone(&self.registry);
        let job = id.clone();
        let mut sink = move |line: String| {
            registry.append_output(&job, line);
        };
        runner::run_shell(script, cwd, &mut sink).await
    }

    fn emit(&self, id: &ScanId, line: impl Into<String>) {
        self.registry.append_output(id, line);
    }
}

/// Explicit paths are checked directly; bare names resolve via PATH.
fn resolve_tool(command: &str) -> bool {
    let path = Path::new(command);
    if path.components().count() > 1 {
        path.is_file()
    } else {
        which::which(command).is_ok()
    }
}
