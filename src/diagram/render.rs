use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{DiagramError, DiagramKind, DiagramRenderer};

/// Renders through the mermaid command line tool (`mmdc`), reading the
/// source from stdin and taking SVG from stdout.
#[derive(Debug, Clone)]
pub struct MermaidCli {
    program: PathBuf,
}

impl Default for MermaidCli {
    fn default() -> Self {
        Self::new("mmdc")
    }
}

impl MermaidCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DiagramRenderer for MermaidCli {
    async fn render(&self, kind: DiagramKind, source: &str) -> Result<String, DiagramError> {
        if source.trim().is_empty() {
            return Err(DiagramError::Empty);
        }
        let mut child = Command::new(&self.program)
            .args(["--input", "-", "--output", "-", "--outputFormat", "svg", "--quiet"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| DiagramError::Unavailable(format!("{}: {err}", self.program.display())))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .await
                .map_err(|err| DiagramError::Unavailable(err.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| DiagramError::Unavailable(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("renderer exited with an error")
                .trim()
                .to_string();
            return Err(DiagramError::Syntax(message));
        }

        let svg = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !svg.contains("<svg") {
            return Err(DiagramError::Syntax(format!("no svg produced for {kind}")));
        }
        Ok(svg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_reported_as_unavailable() {
        let renderer = MermaidCli::new("/nonexistent/strata-mmdc");
        let err = renderer
            .render(DiagramKind::Flowchart, "graph TD\n A --> B")
            .await
            .expect_err("missing binary");
        assert!(matches!(err, DiagramError::Unavailable(_)));
    }

    #[tokio::test]
    async fn empty_source_is_rejected_before_spawning() {
        let renderer = MermaidCli::new("/nonexistent/strata-mmdc");
        assert_eq!(
            renderer.render(DiagramKind::Mindmap, "  ").await,
            Err(DiagramError::Empty)
        );
    }
}
