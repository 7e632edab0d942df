// main.rs - phishdeploy - GoPhish provisioning for a fresh Linux host
// Purpose: update the host, install prerequisites, fetch and unpack the pinned
//          GoPhish release, enable TLS/remote admin in config.json, launch it

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;

mod error;
mod gophish_config;
mod host;
mod progress;
mod prompt;
mod provision;
mod settings;
mod status;

use host::SystemHost;
use provision::Provisioner;
use settings::ProvisionSettings;

/// phishdeploy - GoPhish provisioning
#[derive(Parser, Debug)]
#[command(
    name = "phishdeploy",
    version,
    about = "Install, configure and start GoPhish on an apt-based Linux host",
    long_about = r#"
phishdeploy runs one linear provisioning procedure:

  1. apt update / apt upgrade -y (via sudo)
  2. install unzip and certbot when they are not on PATH
  3. download and unpack the pinned GoPhish release into ./gophish
  4. mark the gophish binary executable
  5. ask for the phish_server certificate and key paths
  6. rewrite config.json: admin UI on 0.0.0.0:3333, phishing server on
     0.0.0.0:443 with TLS
  7. start gophish in the background

Package command failures are reported and the run continues. A malformed
config.json aborts the run before GoPhish is started.

EXAMPLES:

  Interactive run:
    phishdeploy

  Non-interactive run with Let's Encrypt material:
    phishdeploy --cert /etc/letsencrypt/live/example.com/fullchain.pem \
                --key /etc/letsencrypt/live/example.com/privkey.pem
"#
)]
struct Args {
    /// Directory the release is unpacked into
    #[arg(long, default_value = "gophish", value_name = "DIR", help_heading = "Layout")]
    workdir: PathBuf,

    /// GoPhish release tag to download
    #[arg(long, default_value = "v0.12.1", value_name = "TAG", help_heading = "Layout")]
    release_version: String,

    /// phish_server certificate path (skips the prompt)
    #[arg(long, value_name = "PATH", help_heading = "TLS")]
    cert: Option<String>,

    /// phish_server key path (skips the prompt)
    #[arg(long, value_name = "PATH", help_heading = "TLS")]
    key: Option<String>,

    /// Run package commands without sudo
    #[arg(long, help_heading = "Procedure")]
    no_sudo: bool,

    /// Skip `apt upgrade`
    #[arg(long, help_heading = "Procedure")]
    skip_upgrade: bool,

    /// Configure GoPhish but do not start it
    #[arg(long, help_heading = "Procedure")]
    no_launch: bool,
}

impl Args {
    fn into_settings(self) -> Result<ProvisionSettings> {
        // Every step gets an absolute working directory; the process cwd never changes
        let workdir = if self.workdir.is_absolute() {
            self.workdir
        } else {
            std::env::current_dir()
                .context("Failed to resolve current directory")?
                .join(self.workdir)
        };

        Ok(ProvisionSettings {
            workdir,
            release_version: self.release_version,
            escalate: !self.no_sudo,
            skip_upgrade: self.skip_upgrade,
            launch: !self.no_launch,
            cert_path: self.cert,
            key_path: self.key,
            ..ProvisionSettings::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = args.into_settings()?;

    status::print_banner();

    let mut host = SystemHost::new()?;
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let report = match Provisioner::new(&settings, &mut host)
        .run(&mut input, &mut output)
        .await
    {
        Ok(report) => report,
        Err(_) => {
            // The failing step already printed the error
            status::error("Provisioning aborted.");
            std::process::exit(1);
        }
    };

    report.print_summary();
    if report.config_skipped() {
        status::warning("config.json was not updated; GoPhish is running with its upstream TLS settings.");
    }
    let recovered = report.recovered_count();
    if recovered > 0 {
        status::warning(&format!("{} step(s) failed and were skipped over; see the errors above.", recovered));
    }
    status::info("All tasks completed.");

    Ok(())
}
