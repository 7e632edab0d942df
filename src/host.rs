// host.rs - Side effects of provisioning: shell commands, PATH lookup,
// release download, permission changes and the detached launch

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ProvisionError;

/// Handle to a launched service. Holds only the PID: the child is not
/// waited on, reaped or killed by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detached {
    pub pid: u32,
}

/// Everything the procedure does to the machine goes through this trait.
#[allow(async_fn_in_trait)]
pub trait Host {
    /// Run `command` through `sh -c`, streaming output to the terminal.
    async fn run(&mut self, command: &str, cwd: Option<&Path>) -> Result<(), ProvisionError>;

    /// Whether `name` resolves to an executable on PATH.
    fn has_program(&self, name: &str) -> bool;

    /// Fetch `url` into `dest`, returning the number of bytes written.
    async fn download(&mut self, url: &str, dest: &Path) -> Result<u64, ProvisionError>;

    fn make_executable(&mut self, path: &Path) -> Result<(), ProvisionError>;

    /// Start `program` in `cwd` and return without waiting for it.
    fn detach(&mut self, program: &Path, cwd: &Path) -> Result<Detached, ProvisionError>;
}

/// The real machine
pub struct SystemHost {
    client: reqwest::Client,
}

impl SystemHost {
    pub fn new() -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("phishdeploy/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProvisionError::Download {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    async fn fetch_to(&self, url: &str, part: &Path) -> Result<u64, String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;

        let bar = match response.content_length() {
            Some(total) => {
                let bar = ProgressBar::new(total);
                let style = ProgressStyle::with_template(
                    "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )
                .map(|s| s.progress_chars("=>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
                bar.set_style(style);
                bar
            }
            None => ProgressBar::new_spinner(),
        };

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| format!("create {}: {}", part.display(), e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write {}: {}", part.display(), e))?;
            written += chunk.len() as u64;
            bar.set_position(written);
        }

        file.flush()
            .await
            .map_err(|e| format!("flush {}: {}", part.display(), e))?;
        bar.finish_and_clear();

        Ok(written)
    }
}

impl Host for SystemHost {
    async fn run(&mut self, command: &str, cwd: Option<&Path>) -> Result<(), ProvisionError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let status = cmd.status().await.map_err(|e| ProvisionError::CommandSpawn {
            command: command.to_string(),
            source: e,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(ProvisionError::CommandFailed {
                command: command.to_string(),
                status: status.code(),
            })
        }
    }

    fn has_program(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    async fn download(&mut self, url: &str, dest: &Path) -> Result<u64, ProvisionError> {
        let part = dest.with_extension("zip.part");

        match self.fetch_to(url, &part).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, dest).await.map_err(|e| ProvisionError::Download {
                    url: url.to_string(),
                    reason: format!("rename {}: {}", part.display(), e),
                })?;
                Ok(bytes)
            }
            Err(reason) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(ProvisionError::Download {
                    url: url.to_string(),
                    reason,
                })
            }
        }
    }

    fn make_executable(&mut self, path: &Path) -> Result<(), ProvisionError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(path)
                .map_err(|e| ProvisionError::io(format!("stat {}", path.display()), e))?;
            let mut permissions = metadata.permissions();
            // Execute only where read is already granted, as `chmod +x` under the usual umask
            let mode = permissions.mode();
            permissions.set_mode(mode | ((mode & 0o444) >> 2));
            std::fs::set_permissions(path, permissions)
                .map_err(|e| ProvisionError::io(format!("chmod {}", path.display()), e))?;
        }
        #[cfg(not(unix))]
        {
            let _ = path;
        }
        Ok(())
    }

    fn detach(&mut self, program: &Path, cwd: &Path) -> Result<Detached, ProvisionError> {
        // Relative program paths resolve differently once current_dir is set
        let program = std::fs::canonicalize(program)
            .map_err(|e| ProvisionError::io(format!("resolve {}", program.display()), e))?;

        let mut cmd = std::process::Command::new(&program);
        cmd.current_dir(cwd).stdin(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| ProvisionError::CommandSpawn {
            command: program.display().to_string(),
            source: e,
        })?;

        Ok(Detached { pid: child.id() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_reports_exit_status() {
        let mut host = SystemHost::new().unwrap();
        assert!(host.run("true", None).await.is_ok());

        match host.run("exit 3", None).await {
            Err(ProvisionError::CommandFailed { command, status }) => {
                assert_eq!(command, "exit 3");
                assert_eq!(status, Some(3));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_uses_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        let mut host = SystemHost::new().unwrap();
        host.run("touch marker", Some(tmp.path())).await.unwrap();
        assert!(tmp.path().join("marker").exists());
    }

    #[test]
    fn test_has_program() {
        let host = SystemHost::new().unwrap();
        assert!(host.has_program("sh"));
        assert!(!host.has_program("definitely-not-a-real-program-4b1d"));
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable_sets_exec_bits() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gophish");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut host = SystemHost::new().unwrap();
        host.make_executable(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_make_executable_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut host = SystemHost::new().unwrap();
        let err = host.make_executable(&tmp.path().join("gophish")).unwrap_err();
        assert!(matches!(err, ProvisionError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable_follows_read_bits() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gophish");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let mut host = SystemHost::new().unwrap();
        host.make_executable(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    fn loopback_host() -> SystemHost {
        SystemHost {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        }
    }

    /// Serves one response whose body stops short of its Content-Length
    fn truncated_body_server() -> String {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789");
                let _ = stream.flush();
            }
        });
        format!("http://{}/gophish.zip", addr)
    }

    #[tokio::test]
    async fn test_download_failure_removes_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("gophish-v0.12.1-linux-64bit.zip");
        let url = truncated_body_server();

        let mut host = loopback_host();
        let err = host.download(&url, &dest).await.unwrap_err();

        assert!(matches!(err, ProvisionError::Download { .. }));
        assert!(!dest.exists());
        assert!(!dest.with_extension("zip.part").exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_refused_connection() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("release.zip");
        // Bind then drop so nothing listens on the port
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        let mut host = loopback_host();
        let err = host
            .download(&format!("http://127.0.0.1:{}/release.zip", port), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Download { .. }));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_detach_returns_immediately() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let program = tmp.path().join("service");
        std::fs::write(&program, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut host = SystemHost::new().unwrap();
        let started = std::time::Instant::now();
        let detached = host.detach(&program, tmp.path()).unwrap();

        assert!(detached.pid > 0);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
