// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

#![forbid(unsafe_code)]

use console::{style, Term};

const NAME_WIDTH: usize = 16;
const PRINCIPALS_WIDTH: usize = 24;

pub struct Output {
    term: Term,
}

impl Output {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    pub fn success(&self, msg: &str) {
        let _ = self
            .term
            .write_line(&format!("{} {}", style("✓").green().bold(), msg));
    }

    pub fn error(&self, msg: &str) {
        let _ = self
            .term
            .write_line(&format!("{} {}", style("✗").red().bold(), msg));
    }

    pub fn info(&self, msg: &str) {
        let _ = self.term.write_line(msg);
    }

    pub fn newline(&self) {
        let _ = self.term.write_line("");
    }

    pub fn header(&self, msg: &str) {
        let _ = self.term.write_line(&format!("\n{}", style(msg).bold()));
    }

    pub fn field(&self, label: &str, value: &str) {
        let _ = self
            .term
            .write_line(&format!("  {}: {}", style(label).dim(), value));
    }

    /// Fingerprints and other values the operator may want to copy.
    pub fn key_field(&self, label: &str, value: &str) {
        let _ = self.term.write_line(&format!(
            "  {}: {}",
            style(label).dim(),
            style(value).yellow()
        ));
    }

    pub fn principals_header(&self) {
        let _ = self.term.write_line(&format!(
            "\n{:<nw$} {:<pw$} {}",
            style("USER").bold(),
            style("PRINCIPALS").bold(),
            style("FINGERPRINT").bold(),
            nw = NAME_WIDTH,
            pw = PRINCIPALS_WIDTH,
        ));
        let _ = self.term.write_line(&"─".repeat(NAME_WIDTH + PRINCIPALS_WIDTH + 52));
    }

    pub fn principal_row(&self, name: &str, principals: &[String], fingerprint: &str) {
        let _ = self.term.write_line(&format!(
            "{:<nw$} {:<pw$} {}",
            name,
            principals.join(","),
            style(fingerprint).yellow(),
            nw = NAME_WIDTH,
            pw = PRINCIPALS_WIDTH,
        ));
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
