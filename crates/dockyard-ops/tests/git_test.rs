use std::path::Path;
use std::sync::{Arc, Mutex};

use dockyard_core::RepositoryEntry;
use dockyard_ops::executor::{Tool, ToolExecutor};
use dockyard_ops::git::GitClient;
use dockyard_ops::repository_set::{CloneError, RepositorySet};
use dockyard_ops::tool::ToolError;
use mockall::mock;
use tempfile::TempDir;

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

fn has(args: &[String], word: &str) -> bool {
    args.iter().any(|a| a == word)
}

/// Clones create the destination directory; log / remote answer from a table.
fn expect_clones(mock: &mut MockExecutor, cloned: Arc<Mutex<Vec<String>>>) {
    mock.expect_exec()
        .withf(|tool, args| *tool == Tool::Git && has(args, "clone"))
        .returning(move |_, args| {
            let dest = args.last().unwrap();
            assert!(!Path::new(dest).exists(), "stale working copy not removed");
            std::fs::create_dir_all(dest).unwrap();
            cloned.lock().unwrap().push(args[args.len() - 2].clone());
            Ok(String::new())
        });
    mock.expect_exec()
        .withf(|_, args| has(args, "log"))
        .returning(|_, _| Ok("0123456789abcdef\nInitial import\n".to_owned()));
    mock.expect_exec()
        .withf(|_, args| has(args, "get-url"))
        .returning(|_, _| Ok("git@github.com:acme/api.git\n".to_owned()));
}

// ── GitClient ──

#[tokio::test]
async fn clone_is_shallow_and_quiet() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|tool, args| {
            *tool == Tool::Git
                && *args
                    == [
                        "clone",
                        "--depth",
                        "1",
                        "--quiet",
                        "https://example.com/api.git",
                        "/work/repos/api",
                    ]
        })
        .times(1)
        .returning(|_, _| Ok(String::new()));

    let git = GitClient::with_executor(mock);
    git.clone_repo("https://example.com/api.git", Path::new("/work/repos/api"))
        .await
        .unwrap();
}

#[tokio::test]
async fn head_commit_reads_id_and_subject() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|_, args| *args == ["-C", "/work/repos/api", "log", "-1", "--format=%H%n%s"])
        .returning(|_, _| Ok("0123456789abcdef\nFix login redirect\n".to_owned()));

    let git = GitClient::with_executor(mock);
    let head = git.head_commit(Path::new("/work/repos/api")).await.unwrap();

    assert_eq!(head.id, "0123456789abcdef");
    assert_eq!(head.message, "Fix login redirect");
}

#[tokio::test]
async fn head_commit_on_empty_repository_fails() {
    let mut mock = MockExecutor::new();
    mock.expect_exec().returning(|_, _| Ok(String::new()));

    let git = GitClient::with_executor(mock);
    let err = git.head_commit(Path::new("/work/repos/api")).await.unwrap_err();

    assert!(matches!(err, ToolError::CommandFailed { .. }));
}

#[tokio::test]
async fn record_release_adds_commits_and_tags_in_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .times(3)
        .returning(move |_, args| {
            log.lock().unwrap().push(args.join(" "));
            Ok(String::new())
        });

    let git = GitClient::with_executor(mock);
    git.record_release(
        Path::new("/work"),
        &["version.txt", "CHANGELOG.md"],
        "Release v1.1.0",
        "v1.1.0",
    )
    .await
    .unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "-C /work add -- version.txt CHANGELOG.md".to_owned(),
            "-C /work commit --quiet -m Release v1.1.0".to_owned(),
            "-C /work tag -a v1.1.0 -m Release v1.1.0".to_owned(),
        ]
    );
}

// ── RepositorySet ──

#[tokio::test]
async fn materialize_clones_in_configuration_order() {
    let tmp = TempDir::new().unwrap();
    let workspace = tmp.path().join("repos");
    let cloned = Arc::new(Mutex::new(Vec::new()));
    let mut mock = MockExecutor::new();
    expect_clones(&mut mock, Arc::clone(&cloned));

    let entries = vec![
        RepositoryEntry::new("web", "https://example.com/web.git"),
        RepositoryEntry::new("api", "https://example.com/api.git"),
    ];
    let git = GitClient::with_executor(mock);
    let set = RepositorySet::materialize(&git, &workspace, &entries)
        .await
        .unwrap();

    assert_eq!(
        *cloned.lock().unwrap(),
        vec![
            "https://example.com/web.git".to_owned(),
            "https://example.com/api.git".to_owned(),
        ]
    );
    let names: Vec<&str> = set.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["web", "api"]);

    let api = set.describe("api").unwrap();
    assert_eq!(api.local_path, workspace.join("api"));
    assert_eq!(api.head_commit_id, "0123456789abcdef");
    assert_eq!(api.head_commit_message, "Initial import");
    assert_eq!(api.web_url, "https://github.com/acme/api");
    assert!(set.describe("missing").is_none());
}

#[tokio::test]
async fn materialize_replaces_stale_working_copy() {
    let tmp = TempDir::new().unwrap();
    let workspace = tmp.path().join("repos");
    std::fs::create_dir_all(workspace.join("api/src")).unwrap();
    std::fs::write(workspace.join("api/src/stale.rs"), "old").unwrap();
    let mut mock = MockExecutor::new();
    expect_clones(&mut mock, Arc::new(Mutex::new(Vec::new())));

    let git = GitClient::with_executor(mock);
    let set = RepositorySet::materialize(
        &git,
        &workspace,
        &[RepositoryEntry::new("api", "https://example.com/api.git")],
    )
    .await
    .unwrap();

    assert_eq!(set.len(), 1);
    assert!(!workspace.join("api/src/stale.rs").exists());
}

#[tokio::test]
async fn clone_failure_names_entry_and_stops() {
    let tmp = TempDir::new().unwrap();
    let workspace = tmp.path().join("repos");
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|_, args| has(args, "clone") && has(args, "https://example.com/web.git"))
        .times(1)
        .returning(|_, _| {
            Err(ToolError::CommandFailed {
                tool: Tool::Git,
                args: vec![],
                stderr: "fatal: repository not found".to_owned(),
            })
        });
    mock.expect_exec()
        .withf(|_, args| has(args, "https://example.com/docs.git"))
        .never();

    let entries = vec![
        RepositoryEntry::new("web", "https://example.com/web.git"),
        RepositoryEntry::new("docs", "https://example.com/docs.git"),
    ];
    let git = GitClient::with_executor(mock);
    let err = RepositorySet::materialize(&git, &workspace, &entries)
        .await
        .unwrap_err();

    assert_eq!(err.entry(), Some("web"));
    match err {
        CloneError::Clone { url, .. } => assert_eq!(url, "https://example.com/web.git"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_entry_list_yields_empty_set() {
    let tmp = TempDir::new().unwrap();
    let git = GitClient::with_executor(MockExecutor::new());

    let set = RepositorySet::materialize(&git, &tmp.path().join("repos"), &[])
        .await
        .unwrap();

    assert!(set.is_empty());
}
