//! External analyzer invocation and finding normalization.
//!
//! The analyzer is an opaque program run inside the staged tree. Its
//! diagnostics (`path:line:column: message`, as printed by `go vet` and
//! most compilers) are turned into [`Finding`]s whose paths are relative
//! to the repository root.

use crate::config::AnalyzerConfig;
use crate::error::{Error, Result};
use crate::models::Finding;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// Produces findings for a staged source tree.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze the tree rooted at `root`. An empty list means a clean tree.
    async fn analyze(&self, root: &Path) -> Result<Vec<Finding>>;
}

/// Runs a configured command and parses its diagnostics.
pub struct CommandAnalyzer {
    command: String,
    args: Vec<String>,
}

impl CommandAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    async fn analyze(&self, root: &Path) -> Result<Vec<Finding>> {
        debug!("Running {} {:?} in {}", self.command, self.args, root.display());

        let output = Command::new(&self.command)
            .args(&self.args)
            .current_dir(root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Analysis(format!("cannot run {}: {}", self.command, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut findings = parse_diagnostics(&stdout, root);
        findings.extend(parse_diagnostics(&stderr, root));

        if !output.status.success() && findings.is_empty() {
            return Err(Error::Analysis(format!(
                "{} exited with {} without reporting diagnostics: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        info!("Analyzer reported {} findings", findings.len());
        Ok(findings)
    }
}

/// Parse tool output into findings, in output order.
///
/// Blank lines, `#` package headers and lines that are not diagnostics
/// are skipped.
pub fn parse_diagnostics(output: &str, root: &Path) -> Vec<Finding> {
    let roots = root_prefixes(root);

    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| parse_line(line, &roots))
        .collect()
}

/// `path:line[:column]: message`
fn parse_line(line: &str, roots: &[String]) -> Option<Finding> {
    let (file, rest) = line.split_once(':')?;
    let (line_no, rest) = rest.split_once(':')?;
    let line_no: u32 = line_no.trim().parse().ok()?;

    let (column, message) = match rest.split_once(':') {
        Some((column, message)) => match column.trim().parse::<u32>() {
            Ok(column) => (column, message),
            // No column: the message itself contains a colon.
            Err(_) => (0, rest),
        },
        None => (0, rest),
    };

    let file = file.trim();
    let message = message.trim();
    if file.is_empty() || message.is_empty() {
        return None;
    }

    Some(Finding {
        message: strip_roots(message, roots),
        file: normalize_path(file, roots),
        line: line_no,
        column,
    })
}

/// Workspace root spellings to strip: as given and canonicalized.
fn root_prefixes(root: &Path) -> Vec<String> {
    let mut prefixes = vec![root.to_string_lossy().trim_end_matches('/').to_string()];
    if let Ok(canonical) = std::fs::canonicalize(root) {
        let canonical = canonical.to_string_lossy().trim_end_matches('/').to_string();
        if !prefixes.contains(&canonical) {
            prefixes.push(canonical);
        }
    }
    prefixes.retain(|p| !p.is_empty());
    // Longest first so a nested spelling never leaves a partial prefix behind.
    prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
    prefixes
}

/// Make a tool-native path relative to the repository root.
fn normalize_path(file: &str, roots: &[String]) -> String {
    for root in roots {
        if let Some(rest) = file.strip_prefix(root.as_str()) {
            if let Some(relative) = rest.strip_prefix('/') {
                return relative.to_string();
            }
        }
    }
    file.strip_prefix("./").unwrap_or(file).to_string()
}

fn strip_roots(message: &str, roots: &[String]) -> String {
    roots.iter().fold(message.to_string(), |acc, root| {
        acc.replace(&format!("{}/", root), "").replace(root.as_str(), "")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(message: &str, file: &str, line: u32, column: u32) -> Finding {
        Finding {
            message: message.to_string(),
            file: file.to_string(),
            line,
            column,
        }
    }

    #[test]
    fn test_absolute_path_is_made_relative() {
        let root = Path::new("/srv/repositories/octo/sample");
        let output = "/srv/repositories/octo/sample/pkg/x.go:12:5: leaked type pkg.T\n";

        let findings = parse_diagnostics(output, root);
        assert_eq!(findings, vec![finding("leaked type pkg.T", "pkg/x.go", 12, 5)]);
    }

    #[test]
    fn test_relative_paths_and_headers() {
        let root = Path::new("/srv/repositories/octo/sample");
        let output = "# example.com/octo/sample\n\
                      ./main.go:4:2: unused import\n\
                      \n\
                      pkg/y.go:9:1: exported func returns unexported type\n";

        let findings = parse_diagnostics(output, root);
        assert_eq!(
            findings,
            vec![
                finding("unused import", "main.go", 4, 2),
                finding("exported func returns unexported type", "pkg/y.go", 9, 1),
            ]
        );
    }

    #[test]
    fn test_missing_column() {
        let root = Path::new("/ws");
        let findings = parse_diagnostics("main.go:7: note: shadowed variable\n", root);
        assert_eq!(findings, vec![finding("note: shadowed variable", "main.go", 7, 0)]);
    }

    #[test]
    fn test_order_is_preserved() {
        let root = Path::new("/ws");
        let output = "b.go:9:1: second\na.go:1:1: first\n";
        let files: Vec<String> = parse_diagnostics(output, root)
            .into_iter()
            .map(|f| f.file)
            .collect();
        assert_eq!(files, vec!["b.go", "a.go"]);
    }

    #[test]
    fn test_workspace_root_stripped_from_message() {
        let root = Path::new("/srv/repositories/octo/sample");
        let output = "/srv/repositories/octo/sample/a.go:1:1: type leaks from /srv/repositories/octo/sample/b.go\n";
        let findings = parse_diagnostics(output, root);
        assert_eq!(findings[0].message, "type leaks from b.go");
    }

    #[test]
    fn test_paths_outside_root_are_kept() {
        let root = Path::new("/srv/repositories/octo/sample");
        let output = "/usr/lib/go/src/fmt/print.go:3:1: vendored\n\
                      /srv/repositories/octo/sample2/x.go:1:1: sibling\n";
        let files: Vec<String> = parse_diagnostics(output, root)
            .into_iter()
            .map(|f| f.file)
            .collect();
        assert_eq!(
            files,
            vec!["/usr/lib/go/src/fmt/print.go", "/srv/repositories/octo/sample2/x.go"]
        );
    }

    #[test]
    fn test_chatter_is_ignored() {
        let root = Path::new("/ws");
        let output = "go: downloading example.com/dep v1.0.0\nok\n";
        assert!(parse_diagnostics(output, root).is_empty());
    }

    #[tokio::test]
    async fn test_command_analyzer_normalizes_output() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = CommandAnalyzer::new(&AnalyzerConfig {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo \"$PWD/pkg/x.go:3:7: leaked\" 1>&2; exit 1".to_string(),
            ],
        });

        let findings = analyzer.analyze(dir.path()).await.unwrap();
        assert_eq!(findings, vec![finding("leaked", "pkg/x.go", 3, 7)]);
    }

    #[tokio::test]
    async fn test_command_analyzer_clean_tree() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = CommandAnalyzer::new(&AnalyzerConfig {
            command: "true".to_string(),
            args: Vec::new(),
        });

        let findings = analyzer.analyze(dir.path()).await.unwrap();
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_command_analyzer_failure_without_findings() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = CommandAnalyzer::new(&AnalyzerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo 'go: no module' 1>&2; exit 2".to_string()],
        });

        let err = analyzer.analyze(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), "analysis");
    }

    #[tokio::test]
    async fn test_command_analyzer_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = CommandAnalyzer::new(&AnalyzerConfig {
            command: "definitely-not-an-analyzer".to_string(),
            args: Vec::new(),
        });

        tokio_test::assert_err!(analyzer.analyze(dir.path()).await);
    }
}
