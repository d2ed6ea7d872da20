use std::fmt;
use std::path::{Path, PathBuf};

use dockyard_build::changelog::{self, CHANGELOG_FILE};
use dockyard_core::{
    BumpKind, EnvMap, RegistryTarget, ResolvedConfig, SemanticVersion, VERSION_FILE, VersionStore,
};
use dockyard_ops::{
    CertificateSettings, GitClient, ImagePublisher, PublishRequest, RepositorySet, ToolExecutor,
};

use super::report::{DeployMode, DeployReport, EntryReport};
use super::{CERT_STAGING_DIR, Workspace};

/// What a deploy run should do.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub bump: BumpKind,
    /// Build only; no login, push, or persistence.
    pub dry_run: bool,
    pub additional_tag: Option<String>,
}

/// Pipeline states, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Init,
    ConfigResolved,
    VersionBumped,
    RepositoriesMaterialized,
    Published,
    Committed,
    Reported,
}

/// The transition a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ResolveConfig,
    BumpVersion,
    Materialize,
    Publish,
    Commit,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResolveConfig => "resolve-config",
            Self::BumpVersion => "bump-version",
            Self::Materialize => "materialize",
            Self::Publish => "publish",
            Self::Commit => "commit",
        })
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A fatal pipeline failure, naming the step and (if any) the entry.
#[derive(Debug, thiserror::Error)]
#[error("step '{step}' failed{}: {source}", entry_suffix(.entry))]
pub struct PipelineError {
    pub step: Step,
    pub entry: Option<String>,
    #[source]
    pub source: BoxError,
}

fn entry_suffix(entry: &Option<String>) -> String {
    entry
        .as_ref()
        .map(|name| format!(" for entry '{name}'"))
        .unwrap_or_default()
}

impl PipelineError {
    fn new(step: Step, entry: Option<&str>, source: impl Into<BoxError>) -> Self {
        Self {
            step,
            entry: entry.map(str::to_owned),
            source: source.into(),
        }
    }
}

/// Stage bookkeeping plus the human-readable step log.
struct Progress {
    stage: Stage,
    steps: Vec<String>,
}

impl Progress {
    fn new() -> Self {
        Self {
            stage: Stage::Init,
            steps: Vec::new(),
        }
    }

    fn advance(&mut self, next: Stage, step: String) {
        debug_assert!(next > self.stage, "{next:?} does not follow {:?}", self.stage);
        tracing::info!(from = ?self.stage, to = ?next, "{step}");
        self.stage = next;
        self.steps.push(step);
    }
}

/// Run the full deploy pipeline:
/// config → version bump → clone → publish (per entry) → commit | report.
///
/// Every tool invocation is awaited in turn; the first failure ends the run.
pub(crate) async fn run<E: ToolExecutor>(
    workspace: &Workspace,
    options: &DeployOptions,
    executor: &E,
) -> Result<DeployReport, PipelineError> {
    let mut progress = Progress::new();

    // Init → ConfigResolved
    let config = ResolvedConfig::load(&workspace.config_path, &workspace.env)
        .map_err(|e| PipelineError::new(Step::ResolveConfig, None, e))?;
    let target = resolve_target(&config, &workspace.env)
        .map_err(|e| PipelineError::new(Step::ResolveConfig, None, e))?;
    progress.advance(
        Stage::ConfigResolved,
        format!(
            "{} repositories ({:?}) for {}",
            config.entries.len(),
            config.entry_source,
            target.as_registry().login_server()
        ),
    );

    // ConfigResolved → VersionBumped (nothing written yet)
    let store = VersionStore::in_dir(&workspace.root);
    let previous = if options.dry_run {
        store
            .peek()
            .map(|v| v.unwrap_or(SemanticVersion::INITIAL))
    } else {
        store.read()
    }
    .map_err(|e| PipelineError::new(Step::BumpVersion, None, e))?;
    let version = previous
        .bump(options.bump)
        .map_err(|e| PipelineError::new(Step::BumpVersion, None, e))?;
    progress.advance(
        Stage::VersionBumped,
        format!("Version {previous} -> {version} ({})", options.bump),
    );

    // VersionBumped → RepositoriesMaterialized
    let git = GitClient::with_executor(executor);
    let workspace_dir = workspace.path(&config.workspace_dir);
    let repos = RepositorySet::materialize(&git, &workspace_dir, &config.entries)
        .await
        .map_err(|e| {
            let entry = e.entry().map(str::to_owned);
            PipelineError {
                step: Step::Materialize,
                entry,
                source: Box::new(e),
            }
        })?;
    progress.advance(
        Stage::RepositoriesMaterialized,
        format!("Cloned {} repositories into {}", repos.len(), workspace_dir.display()),
    );

    // RepositoriesMaterialized → Published
    let publisher = ImagePublisher::with_executor(executor);
    let registry = target.as_registry();
    let cert_dir = workspace.path(&config.cert_dir);
    let staging_dir = workspace.path(Path::new(CERT_STAGING_DIR));
    let mut entries = Vec::with_capacity(config.entries.len());

    for entry in &config.entries {
        let Some(repo) = repos.describe(&entry.name) else {
            return Err(PipelineError::new(
                Step::Publish,
                Some(&entry.name),
                "working copy missing after clone",
            ));
        };

        let request = PublishRequest {
            entry,
            build_context: &repo.local_path,
            dockerfile: &config.dockerfile,
            version,
            additional_tag: options.additional_tag.as_deref(),
            certificates: CertificateSettings {
                source_dir: &cert_dir,
                install_path: &config.cert_install_path,
                staging_dir: &staging_dir,
            },
            dry_run: options.dry_run,
        };
        let outcome = publisher
            .publish(registry, &request)
            .await
            .map_err(|e| PipelineError::new(Step::Publish, Some(&entry.name), e))?;

        entries.push(EntryReport {
            name: entry.name.clone(),
            commit_id: repo.head_commit_id.clone(),
            commit_message: repo.head_commit_message.clone(),
            web_url: repo.web_url.clone(),
            tags: outcome.tags,
            certificates_injected: outcome.certificates_injected,
        });
    }
    let verb = if options.dry_run { "Built" } else { "Published" };
    progress.advance(Stage::Published, format!("{verb} {} images", entries.len()));

    // Published → Committed | Reported
    let (mode, persisted) = if options.dry_run {
        progress.advance(
            Stage::Reported,
            "Dry run complete; version, changelog and registry untouched".to_owned(),
        );
        (DeployMode::DryRun, false)
    } else {
        let persisted = commit(&workspace.root, &store, &git, version, &repos).await?;
        let step = if persisted {
            format!("Recorded release v{version}")
        } else {
            format!("v{version} already recorded")
        };
        progress.advance(Stage::Committed, step);
        (DeployMode::Commit, persisted)
    };

    Ok(DeployReport {
        version: version.to_string(),
        previous_version: previous.to_string(),
        mode,
        persisted,
        entries,
        steps: progress.steps,
    })
}

fn resolve_target(config: &ResolvedConfig, env: &EnvMap) -> dockyard_core::Result<RegistryTarget> {
    if config.entries.is_empty() {
        return Err(dockyard_core::Error::NoEntries);
    }
    let kind = config.registry_kind()?;
    RegistryTarget::from_env(kind, config.registry_host.as_deref(), env)
}

/// Persist the version, prepend the changelog, and tag the release.
///
/// Returns `false` (and touches nothing) when the persisted version already
/// equals `version`. On failure `version.txt` and `CHANGELOG.md` are put back
/// as they were.
async fn commit<E: ToolExecutor>(
    root: &Path,
    store: &VersionStore,
    git: &GitClient<E>,
    version: SemanticVersion,
    repos: &RepositorySet,
) -> Result<bool, PipelineError> {
    let commit_err = |e: BoxError| PipelineError::new(Step::Commit, None, e);

    if store.peek().map_err(|e| commit_err(e.into()))? == Some(version) {
        tracing::info!(%version, "version already current; nothing to persist");
        return Ok(false);
    }

    let changelog_path = root.join(CHANGELOG_FILE);
    let snapshots = [
        FileSnapshot::take(store.path()).map_err(|e| commit_err(e.into()))?,
        FileSnapshot::take(&changelog_path).map_err(|e| commit_err(e.into()))?,
    ];

    let result = async {
        store.write(version)?;

        let section = changelog::render_section(version, &changelog::today(), repos.as_slice());
        changelog::prepend_section(&changelog_path, &section)?;

        let tag = format!("v{version}");
        git.record_release(
            root,
            &[VERSION_FILE, CHANGELOG_FILE],
            &format!("Release {tag}"),
            &tag,
        )
        .await?;
        Ok::<_, BoxError>(())
    }
    .await;

    if let Err(e) = result {
        for snapshot in &snapshots {
            if let Err(restore) = snapshot.restore() {
                tracing::warn!(
                    path = %snapshot.path.display(),
                    error = %restore,
                    "could not restore file after failed release"
                );
            }
        }
        return Err(commit_err(e));
    }

    Ok(true)
}

/// Content of a file before the commit step touched it.
struct FileSnapshot {
    path: PathBuf,
    content: Option<Vec<u8>>,
}

impl FileSnapshot {
    fn take(path: &Path) -> std::io::Result<Self> {
        let content = match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        Ok(Self {
            path: path.to_path_buf(),
            content,
        })
    }

    /// Put the file back as it was; a file that did not exist is removed.
    fn restore(&self) -> std::io::Result<()> {
        match &self.content {
            Some(bytes) => std::fs::write(&self.path, bytes),
            None => match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use dockyard_ops::{Tool, ToolError};
    use mockall::mock;
    use tempfile::TempDir;

    use super::*;

    mock! {
        Executor {}

        impl ToolExecutor for Executor {
            async fn exec(&self, tool: Tool, args: &[String]) -> Result<String, ToolError>;
            async fn exec_streaming(&self, tool: Tool, args: &[String]) -> Result<(), ToolError>;
            async fn exec_with_stdin(
                &self,
                tool: Tool,
                args: &[String],
                stdin_data: &[u8],
            ) -> Result<String, ToolError>;
        }
    }

    const CONF: &str = "\
# two services, web needs the corporate CA
docker_registry=ghcr
api=https://example.com/api.git
web=https://example.com/web.git
web_needs_certs=true
";

    type Log = Arc<Mutex<Vec<String>>>;

    /// Plays git and docker: records every call and answers like the real
    /// tools would. Any call whose command line contains `fail_on` fails.
    fn respond(
        log: &Log,
        fail_on: Option<&str>,
        tool: Tool,
        args: &[String],
    ) -> Result<String, ToolError> {
        let line = format!("{tool} {}", args.join(" "));
        log.lock().unwrap().push(line.clone());

        if fail_on.is_some_and(|f| line.contains(f)) {
            return Err(ToolError::CommandFailed {
                tool,
                args: args.to_vec(),
                stderr: "scripted failure".to_owned(),
            });
        }

        let has = |word: &str| args.iter().any(|a| a == word);
        let output = match tool {
            Tool::Git if has("clone") => {
                let dest = Path::new(args.last().unwrap());
                std::fs::create_dir_all(dest).unwrap();
                std::fs::write(dest.join("Dockerfile"), "FROM alpine\n").unwrap();
                String::new()
            }
            Tool::Git if has("log") => {
                "0123456789abcdef0123456789abcdef01234567\nInitial import\n".to_owned()
            }
            Tool::Git if has("get-url") => {
                let name = Path::new(&args[1]).file_name().unwrap().to_string_lossy();
                format!("git@github.com:acme/{name}.git\n")
            }
            Tool::Git if has("rev-parse") => "abc1234\n".to_owned(),
            Tool::Docker if has("inspect") => "app\n".to_owned(),
            _ => String::new(),
        };
        Ok(output)
    }

    fn scripted(log: &Log, fail_on: Option<&'static str>) -> MockExecutor {
        let mut mock = MockExecutor::new();
        let exec_log = Arc::clone(log);
        mock.expect_exec()
            .returning(move |tool, args| respond(&exec_log, fail_on, tool, args));
        let stream_log = Arc::clone(log);
        mock.expect_exec_streaming()
            .returning(move |tool, args| respond(&stream_log, fail_on, tool, args).map(|_| ()));
        let stdin_log = Arc::clone(log);
        mock.expect_exec_with_stdin()
            .returning(move |tool, args, _| respond(&stdin_log, fail_on, tool, args));
        mock
    }

    struct Fixture {
        tmp: TempDir,
        workspace: Workspace,
    }

    impl Fixture {
        fn new(conf: &str, env: &[(&str, &str)]) -> Self {
            let tmp = TempDir::new().unwrap();
            std::fs::write(tmp.path().join("repos.conf"), conf).unwrap();
            std::fs::write(tmp.path().join(VERSION_FILE), "1.0.0\n").unwrap();
            let env = env
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect();
            let workspace = Workspace::with_env(tmp.path(), None, env);
            Self { tmp, workspace }
        }

        fn root(&self) -> &Path {
            self.tmp.path()
        }

        fn read(&self, name: &str) -> Option<String> {
            std::fs::read_to_string(self.root().join(name)).ok()
        }
    }

    fn options(bump: BumpKind, dry_run: bool) -> DeployOptions {
        DeployOptions {
            bump,
            dry_run,
            additional_tag: None,
        }
    }

    fn position(log: &[String], needle: &str) -> usize {
        log.iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("no call containing {needle:?} in {log:#?}"))
    }

    const OWNER: (&str, &str) = ("GITHUB_REPOSITORY_OWNER", "Acme");

    #[tokio::test]
    async fn dry_run_reports_without_persisting() {
        let fx = Fixture::new(CONF, &[OWNER]);
        let log = Log::default();
        let mock = scripted(&log, None);

        let report = run(&fx.workspace, &options(BumpKind::Minor, true), &mock)
            .await
            .unwrap();

        assert_eq!(report.version, "1.1.0");
        assert_eq!(report.previous_version, "1.0.0");
        assert_eq!(report.mode, DeployMode::DryRun);
        assert!(!report.persisted);

        let log = log.lock().unwrap();
        let clones: Vec<&String> = log.iter().filter(|l| l.starts_with("git clone")).collect();
        assert_eq!(clones.len(), 2);
        assert!(clones[0].contains("https://example.com/api.git"));
        assert!(clones[1].contains("https://example.com/web.git"));
        assert!(!log.iter().any(|l| l.starts_with("docker login")));
        assert!(!log.iter().any(|l| l.starts_with("docker push")));
        assert!(!log.iter().any(|l| l.contains(" commit ")));

        let api = &report.entries[0];
        assert_eq!(api.name, "api");
        assert_eq!(
            api.tags,
            vec![
                "ghcr.io/acme/api:latest".to_owned(),
                "ghcr.io/acme/api:sha-abc1234".to_owned(),
            ]
        );
        assert_eq!(api.commit_message, "Initial import");
        assert_eq!(api.web_url, "https://github.com/acme/api");
        assert_eq!(report.entries[1].name, "web");
        assert_eq!(report.entries[1].commit_id.len(), 40);

        assert_eq!(fx.read(VERSION_FILE).as_deref(), Some("1.0.0\n"));
        assert!(fx.read(CHANGELOG_FILE).is_none());
    }

    #[tokio::test]
    async fn dry_run_without_version_file_creates_nothing() {
        let fx = Fixture::new(CONF, &[OWNER]);
        std::fs::remove_file(fx.root().join(VERSION_FILE)).unwrap();
        let log = Log::default();

        let report = run(&fx.workspace, &options(BumpKind::Patch, true), &scripted(&log, None))
            .await
            .unwrap();

        assert_eq!(report.version, "1.0.1");
        assert!(fx.read(VERSION_FILE).is_none());
    }

    #[tokio::test]
    async fn commit_mode_publishes_and_records_release() {
        let fx = Fixture::new(
            CONF,
            &[OWNER, ("GITHUB_ACTOR", "octocat"), ("GITHUB_TOKEN", "ghp_token")],
        );
        std::fs::create_dir_all(fx.root().join("assets/certs")).unwrap();
        std::fs::write(fx.root().join("assets/certs/corp.crt"), "CERT").unwrap();
        let log = Log::default();

        let report = run(&fx.workspace, &options(BumpKind::Minor, false), &scripted(&log, None))
            .await
            .unwrap();

        assert_eq!(report.mode, DeployMode::Commit);
        assert!(report.persisted);
        assert!(!report.entries[0].certificates_injected);
        assert!(report.entries[1].certificates_injected);

        let log = log.lock().unwrap();
        let web_clone = position(&log, "git clone --depth 1 --quiet https://example.com/web.git");
        let first_build = position(&log, "docker build");
        assert!(web_clone < first_build);

        let staging = fx.root().join(".dockyard/cert-context/web");
        let cert_build = position(&log, &format!("--file {}", staging.join("Dockerfile").display()));
        let web_push = position(&log, "docker push ghcr.io/acme/web:latest");
        let api_push = position(&log, "docker push ghcr.io/acme/api:latest");
        assert!(api_push < cert_build);
        assert!(cert_build < web_push);
        assert_eq!(log.iter().filter(|l| l.starts_with("docker logout")).count(), 2);

        let tag = format!("git -C {} tag -a v1.1.0 -m Release v1.1.0", fx.root().display());
        assert!(log.iter().any(|l| *l == tag), "{log:#?}");

        assert_eq!(fx.read(VERSION_FILE).as_deref(), Some("1.1.0\n"));
        let changelog = fx.read(CHANGELOG_FILE).unwrap();
        assert!(changelog.starts_with("# Changelog\n\n## v1.1.0 - "));
        assert!(changelog.contains("- **api**: Initial import ([0123456](https://github.com/acme/api/commit/"));
        assert!(changelog.contains("- **web**: Initial import"));
    }

    #[tokio::test]
    async fn push_failure_stops_pipeline_before_commit() {
        let fx = Fixture::new(
            CONF,
            &[OWNER, ("GITHUB_ACTOR", "octocat"), ("GITHUB_TOKEN", "ghp_token")],
        );
        let log = Log::default();
        let mock = scripted(&log, Some("docker push ghcr.io/acme/api:sha-abc1234"));

        let err = run(&fx.workspace, &options(BumpKind::Patch, false), &mock)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Publish);
        assert_eq!(err.entry.as_deref(), Some("api"));
        assert_eq!(
            err.to_string(),
            "step 'publish' failed for entry 'api': push failed for 'api' (ghcr.io/acme/api:sha-abc1234)"
        );

        let log = log.lock().unwrap();
        assert!(!log.iter().any(|l| l.contains("acme/web")));
        assert!(!log.iter().any(|l| l.contains(" commit ")));
        assert_eq!(fx.read(VERSION_FILE).as_deref(), Some("1.0.0\n"));
    }

    #[tokio::test]
    async fn clone_failure_names_entry_and_skips_the_rest() {
        let fx = Fixture::new(CONF, &[OWNER]);
        let log = Log::default();
        let mock = scripted(&log, Some("https://example.com/api.git"));

        let err = run(&fx.workspace, &options(BumpKind::Patch, true), &mock)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Materialize);
        assert_eq!(err.entry.as_deref(), Some("api"));
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn unsupported_registry_fails_before_any_tool_runs() {
        let fx = Fixture::new("docker_registry=nexus\napi=https://example.com/api.git\n", &[OWNER]);

        let err = run(&fx.workspace, &options(BumpKind::Patch, true), &MockExecutor::new())
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::ResolveConfig);
        assert!(err.entry.is_none());
        assert!(format!("{:?}", err.source).contains("nexus"));
    }

    #[tokio::test]
    async fn github_registry_requires_owner() {
        let fx = Fixture::new(CONF, &[]);

        let err = run(&fx.workspace, &options(BumpKind::Patch, true), &MockExecutor::new())
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::ResolveConfig);
        assert!(err.source.to_string().contains("GITHUB_REPOSITORY_OWNER"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_publish_without_retry() {
        let fx = Fixture::new(CONF, &[OWNER]);
        let log = Log::default();

        let err = run(&fx.workspace, &options(BumpKind::Patch, false), &scripted(&log, None))
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Publish);
        assert_eq!(err.entry.as_deref(), Some("api"));
        assert!(!log.lock().unwrap().iter().any(|l| l.starts_with("docker login")));
    }

    #[tokio::test]
    async fn failed_release_tag_restores_version_and_changelog() {
        let fx = Fixture::new(
            CONF,
            &[OWNER, ("GITHUB_ACTOR", "octocat"), ("GITHUB_TOKEN", "ghp_token")],
        );
        let log = Log::default();
        let mock = scripted(&log, Some("tag -a"));

        let err = run(&fx.workspace, &options(BumpKind::Minor, false), &mock)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Commit);
        assert!(err.entry.is_none());
        assert!(err.to_string().starts_with("step 'commit' failed: "), "{err}");
        assert_eq!(fx.read(VERSION_FILE).as_deref(), Some("1.0.0\n"));
        assert!(fx.read(CHANGELOG_FILE).is_none());
        assert!(log.lock().unwrap().iter().any(|l| l.contains(" tag -a v1.1.0 ")));
    }

    #[tokio::test]
    async fn failed_release_commit_keeps_existing_changelog() {
        let fx = Fixture::new(CONF, &[]);
        let previous = "# Changelog\n\n## v1.0.0 - 2026-01-01\n\n- **api**: first\n";
        std::fs::write(fx.root().join(CHANGELOG_FILE), previous).unwrap();
        let store = VersionStore::in_dir(fx.root());
        let log = Log::default();
        let mock = scripted(&log, Some("commit --quiet"));
        let git = GitClient::with_executor(&mock);

        let err = commit(
            fx.root(),
            &store,
            &git,
            SemanticVersion::new(1, 0, 1),
            &RepositorySet::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.step, Step::Commit);
        assert_eq!(fx.read(VERSION_FILE).as_deref(), Some("1.0.0\n"));
        assert_eq!(fx.read(CHANGELOG_FILE).as_deref(), Some(previous));
    }

    #[tokio::test]
    async fn commit_is_skipped_when_version_already_current() {
        let fx = Fixture::new(CONF, &[]);
        std::fs::write(fx.root().join(VERSION_FILE), "1.1.0\n").unwrap();
        let store = VersionStore::in_dir(fx.root());
        let mock = MockExecutor::new();
        let git = GitClient::with_executor(&mock);

        let persisted = commit(
            fx.root(),
            &store,
            &git,
            SemanticVersion::new(1, 1, 0),
            &RepositorySet::default(),
        )
        .await
        .unwrap();

        assert!(!persisted);
        assert!(fx.read(CHANGELOG_FILE).is_none());
    }
}
