use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StylizeError {
    #[error("style model weights not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    #[error("style model weights are empty: {}", path.display())]
    EmptyWeights { path: PathBuf },

    #[error("inference command is empty")]
    EmptyCommand,

    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("inference exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("inference produced no output at {}", path.display())]
    MissingOutput { path: PathBuf },

    #[error("cannot prepare output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle to a pretrained weight file that passed loading checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleModel {
    pub path: PathBuf,
    pub size: u64,
}

#[async_trait]
pub trait Stylizer: Send + Sync {
    async fn load_model(&self, path: &Path) -> Result<StyleModel, StylizeError>;

    async fn stylize(
        &self,
        model: &StyleModel,
        input: &Path,
        output: &Path,
    ) -> Result<(), StylizeError>;
}

/// Runs an external inference program. `{model}`, `{input}` and `{output}`
/// in the argument template are replaced with the request's paths.
#[derive(Debug, Clone)]
pub struct CommandStylizer {
    program: String,
    args: Vec<String>,
}

impl CommandStylizer {
    pub fn parse(command_line: &str) -> Result<Self, StylizeError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(StylizeError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    fn arguments(&self, model: &Path, input: &Path, output: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{model}", &model.to_string_lossy())
                    .replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect()
    }
}

#[async_trait]
impl Stylizer for CommandStylizer {
    async fn load_model(&self, path: &Path) -> Result<StyleModel, StylizeError> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|_| StylizeError::ModelNotFound {
                path: path.to_path_buf(),
            })?;
        if metadata.len() == 0 {
            return Err(StylizeError::EmptyWeights {
                path: path.to_path_buf(),
            });
        }
        debug!(model = %path.display(), bytes = metadata.len(), "loaded style model");
        Ok(StyleModel {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    async fn stylize(
        &self,
        model: &StyleModel,
        input: &Path,
        output: &Path,
    ) -> Result<(), StylizeError> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StylizeError::OutputDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let args = self.arguments(&model.path, input, output);
        info!(program = %self.program, model = %model.path.display(), input = %input.display(), "running inference");

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|source| StylizeError::Launch {
                program: self.program.clone(),
                source,
            })?;
        if !result.status.success() {
            return Err(StylizeError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        if !fs::try_exists(output).await.unwrap_or(false) {
            return Err(StylizeError::MissingOutput {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_program_and_template() {
        let stylizer = CommandStylizer::parse("python eval.py --model {model} --content-image {input} --output-image {output}")
            .expect("command should parse");
        let args = stylizer.arguments(
            Path::new("saved_models/candy.pth"),
            Path::new("static/house.jpg"),
            Path::new("generated/candy-house.jpg"),
        );
        assert_eq!(stylizer.program, "python");
        assert_eq!(
            args,
            vec![
                "eval.py",
                "--model",
                "saved_models/candy.pth",
                "--content-image",
                "static/house.jpg",
                "--output-image",
                "generated/candy-house.jpg",
            ]
        );
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            CommandStylizer::parse("   "),
            Err(StylizeError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn missing_weights_fail_to_load() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let stylizer = CommandStylizer::parse("true").expect("command should parse");
        let error = stylizer
            .load_model(&dir.path().join("udnie.pth"))
            .await
            .expect_err("loading should fail");
        assert!(matches!(error, StylizeError::ModelNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_copies_input_to_output() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let model_path = dir.path().join("candy.pth");
        let input = dir.path().join("house.jpg");
        let output = dir.path().join("generated").join("candy-house.jpg");
        std::fs::write(&model_path, b"weights").expect("weights should write");
        std::fs::write(&input, b"pixels").expect("input should write");

        let stylizer = CommandStylizer::parse("cp {input} {output}").expect("command should parse");
        let model = stylizer.load_model(&model_path).await.expect("model should load");
        stylizer
            .stylize(&model, &input, &output)
            .await
            .expect("inference should succeed");
        assert_eq!(std::fs::read(output).expect("output should exist"), b"pixels");
    }

    #[tokio::test]
    async fn unwritable_output_directory_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let model_path = dir.path().join("candy.pth");
        let blocker = dir.path().join("generated");
        std::fs::write(&model_path, b"weights").expect("weights should write");
        std::fs::write(&blocker, b"not a directory").expect("blocker should write");

        let stylizer = CommandStylizer::parse("true").expect("command should parse");
        let model = stylizer.load_model(&model_path).await.expect("model should load");
        let error = stylizer
            .stylize(&model, &dir.path().join("in.jpg"), &blocker.join("out.jpg"))
            .await
            .expect_err("inference should fail");
        assert!(matches!(error, StylizeError::OutputDir { ref path, .. } if *path == blocker));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_status() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let model_path = dir.path().join("candy.pth");
        std::fs::write(&model_path, b"weights").expect("weights should write");

        let stylizer = CommandStylizer::parse("false").expect("command should parse");
        let model = stylizer.load_model(&model_path).await.expect("model should load");
        let error = stylizer
            .stylize(&model, &dir.path().join("in.jpg"), &dir.path().join("out.jpg"))
            .await
            .expect_err("inference should fail");
        assert!(matches!(error, StylizeError::Failed { .. }));
    }
}
