// Headless Chromium screenshot capture
// Spawns one browser process per capture with an allowlisted environment.

use async_trait::async_trait;
use perfscope_core::domain::Target;
use perfscope_core::port::{CapabilityError, CapturedImage, Viewport, VisualCapture};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Variables passed through to the browser process
const ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "TMPDIR", "LANG", "DISPLAY"];

pub struct ChromiumCapture {
    binary: PathBuf,
    output_dir: PathBuf,
    timeout: Duration,
}

impl ChromiumCapture {
    /// # Arguments
    /// * `binary` - Chromium or Chrome executable
    /// * `output_dir` - Directory screenshots are written to (created on demand)
    /// * `timeout` - Upper bound for one browser run
    pub fn new(binary: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            output_dir: output_dir.into(),
            timeout,
        }
    }

    fn args(&self, target: &Target, viewport: &Viewport, path: &Path) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--hide-scrollbars".to_string(),
            format!("--window-size={},{}", viewport.width, viewport.height),
            format!("--screenshot={}", path.display()),
            target.as_str().to_string(),
        ]
    }
}

#[async_trait]
impl VisualCapture for ChromiumCapture {
    async fn capture(
        &self,
        target: &Target,
        viewport: &Viewport,
    ) -> Result<CapturedImage, CapabilityError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| CapabilityError::Io(e.to_string()))?;
        let path = self
            .output_dir
            .join(format!("{}-{}.png", Uuid::new_v4(), viewport.name));

        let env = std::env::vars().filter(|(k, _)| ENV_ALLOWLIST.contains(&k.as_str()));
        let child = Command::new(&self.binary)
            .args(self.args(target, viewport, &path))
            .env_clear()
            .envs(env)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CapabilityError::Io(format!("failed to spawn {}: {}", self.binary.display(), e)))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(CapabilityError::Io(e.to_string())),
            Err(_) => return Err(CapabilityError::Timeout(self.timeout.as_millis() as u64)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                target = %target,
                viewport = %viewport.name,
                exit_code = ?output.status.code(),
                "Browser exited with failure"
            );
            return Err(CapabilityError::Io(format!(
                "browser exited with {:?}: {}",
                output.status.code(),
                stderr.lines().last().unwrap_or_default()
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| CapabilityError::Io(format!("screenshot not written: {}", e)))?;
        debug!(target = %target, viewport = %viewport.name, size = bytes.len(), "Screenshot captured");

        Ok(CapturedImage {
            bytes,
            location: Some(path.display().to_string()),
        })
    }

    async fn discard(&self, location: &str) -> Result<(), CapabilityError> {
        let path = Path::new(location);
        if !path.starts_with(&self.output_dir) {
            return Err(CapabilityError::Unavailable(format!(
                "{} is outside {}",
                location,
                self.output_dir.display()
            )));
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(location, "Screenshot already gone");
                Ok(())
            }
            Err(e) => Err(CapabilityError::Io(format!("{}: {}", location, e))),
        }
    }
}
