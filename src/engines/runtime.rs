//! Out-of-process model runtime
//!
//! The Moondream weights are executed by an external runtime program. It is
//! started with `--model <artifact>` and speaks newline-delimited JSON on
//! stdin/stdout:
//!
//! ```text
//! <- {"ready":true}
//! -> {"op":"encode_image","image":"<base64 jpeg>"}
//! <- {"image_id":"img-1"}
//! -> {"op":"query","image_id":"img-1","question":"What is this?"}
//! <- {"answer":"A cat."}
//! -> {"op":"release","image_id":"img-1"}
//! <- {}
//! ```
//!
//! Any reply may carry `{"error": "..."}` instead.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use eyre::{Result, WrapErr};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::VisionModel;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum RuntimeRequest<'a> {
    EncodeImage { image: String },
    Query { image_id: &'a str, question: &'a str },
    Release { image_id: &'a str },
}

#[derive(Debug, Default, Deserialize)]
struct RuntimeReply {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    image_id: Option<String>,
    #[serde(default)]
    answer: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Handle to an encoded image living inside the runtime
#[derive(Debug)]
pub struct EncodedImage {
    id: String,
}

pub struct RuntimeModel {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl RuntimeModel {
    /// Start `command` (program plus optional arguments) on `model_path` and
    /// wait for it to report readiness.
    pub fn spawn(command: &str, model_path: &Path) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| eyre::eyre!("MOONDREAM_RUNTIME is empty"))?;

        tracing::info!("Starting model runtime: {} --model {:?}", command, model_path);
        let mut child = Command::new(program)
            .args(parts)
            .arg("--model")
            .arg(model_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .wrap_err_with(|| format!("Failed to start model runtime `{}`", command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| eyre::eyre!("runtime stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| eyre::eyre!("runtime stdout unavailable"))?;

        let mut model = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        let hello = model.read_reply().wrap_err("Model runtime did not start")?;
        if !hello.ready {
            return Err(eyre::eyre!("Model runtime sent an unexpected greeting"));
        }
        tracing::info!("Model runtime ready (pid {})", model.child.id());
        Ok(model)
    }

    fn call(&mut self, request: &RuntimeRequest<'_>) -> Result<RuntimeReply> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.flush())
            .wrap_err("Failed to write to model runtime")?;
        self.read_reply()
    }

    fn read_reply(&mut self) -> Result<RuntimeReply> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .wrap_err("Failed to read from model runtime")?;
        if read == 0 {
            return Err(eyre::eyre!("model runtime exited"));
        }
        let reply: RuntimeReply = serde_json::from_str(line.trim())
            .wrap_err_with(|| format!("Malformed runtime reply: {}", line.trim()))?;
        match reply.error {
            Some(error) => Err(eyre::eyre!(error)),
            None => Ok(reply),
        }
    }
}

impl VisionModel for RuntimeModel {
    type Encoded = EncodedImage;

    fn encode_image(&mut self, image: &DynamicImage) -> Result<EncodedImage> {
        let image = crate::image::encode_jpeg_base64(image)?;
        let reply = self.call(&RuntimeRequest::EncodeImage { image })?;
        let id = reply
            .image_id
            .ok_or_else(|| eyre::eyre!("runtime reply is missing `image_id`"))?;
        Ok(EncodedImage { id })
    }

    fn query(&mut self, encoded: &EncodedImage, question: &str) -> Result<String> {
        let reply = self.call(&RuntimeRequest::Query {
            image_id: &encoded.id,
            question,
        });
        if let Err(e) = self.call(&RuntimeRequest::Release { image_id: &encoded.id }) {
            tracing::warn!("Failed to release encoded image {}: {}", encoded.id, e);
        }
        let answer = reply?
            .answer
            .ok_or_else(|| eyre::eyre!("runtime reply is missing `answer`"))?;
        Ok(match answer {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
    }

    fn runtime_pid(&self) -> Option<u32> {
        Some(self.child.id())
    }
}

impl Drop for RuntimeModel {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!("Model runtime already stopped: {}", e);
        }
        let _ = self.child.wait();
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use image::RgbImage;

    /// A shell stand-in for the runtime; answers every query with `answer`.
    pub(crate) fn fake_runtime(dir: &Path, answer: &str) -> String {
        let script = dir.join("fake-runtime.sh");
        let body = format!(
            r#"[ "$1" = "--model" ] && [ -f "$2" ] || {{ echo '{{"error":"no model"}}'; exit 1; }}
echo '{{"ready":true}}'
while IFS= read -r line; do
  case "$line" in
    *'"op":"encode_image"'*) echo '{{"image_id":"img-1"}}' ;;
    *'"op":"query"'*'broken'*) echo '{{"error":"model crashed"}}' ;;
    *'"op":"query"'*) echo '{{"answer":"{answer}"}}' ;;
    *'"op":"release"'*) echo '{{}}' ;;
    *) echo '{{"error":"unknown op"}}' ;;
  esac
done
"#
        );
        std::fs::write(&script, body).unwrap();
        format!("sh {}", script.display())
    }

    fn model_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("moondream-test");
        std::fs::write(&path, b"weights").unwrap();
        path
    }

    #[test]
    fn encodes_then_queries() {
        let dir = tempfile::tempdir().unwrap();
        let command = fake_runtime(dir.path(), "  a red square ");
        let mut model = RuntimeModel::spawn(&command, &model_file(dir.path())).unwrap();

        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let encoded = model.encode_image(&image).unwrap();
        let answer = model.query(&encoded, "what is it?").unwrap();
        assert_eq!(answer, "  a red square ");
        assert!(model.runtime_pid().is_some());
    }

    #[test]
    fn runtime_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        let command = fake_runtime(dir.path(), "unused");
        let mut model = RuntimeModel::spawn(&command, &model_file(dir.path())).unwrap();

        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let encoded = model.encode_image(&image).unwrap();
        let err = model.query(&encoded, "broken").unwrap_err();
        assert!(err.to_string().contains("model crashed"));
    }

    #[test]
    fn missing_artifact_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let command = fake_runtime(dir.path(), "unused");
        let result = RuntimeModel::spawn(&command, &dir.path().join("absent"));
        assert!(result.is_err());
    }

    #[test]
    fn missing_program_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let result = RuntimeModel::spawn("definitely-not-a-moondream-runtime", &model_file(dir.path()));
        assert!(result.is_err());
    }
}
