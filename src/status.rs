// status.rs - Severity-tagged terminal output

use colored::*;

pub fn info(message: &str) {
    println!("{} {}", "[INFO]".cyan().bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "[WARNING]".yellow().bold(), message.yellow());
}

pub fn error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message.red());
}

/// Print application banner
pub fn print_banner() {
    println!("{}", "═══════════════════════════════════════════════════════════════".cyan().bold());
    println!("{}", "  phishdeploy - GoPhish provisioning".white().bold());
    println!("{}", "  update | prerequisites | release | TLS config | launch".white());
    println!("{}", "═══════════════════════════════════════════════════════════════\n".cyan().bold());
}
