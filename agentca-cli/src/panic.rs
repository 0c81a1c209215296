// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

#![forbid(unsafe_code)]

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::PanicHookInfo;

const REDACTED: &str = "[redacted]";

/// Words that suggest a panic payload carries key material or a passphrase.
const SENSITIVE_WORDS: &[&str] = &[
    "passphrase",
    "password",
    "secret",
    "private",
    "seed",
    "-----begin",
];

/// Connection tasks panic inside tokio workers, so the thread name is kept
/// to tell them apart from the accept loop.
struct PanicReport {
    thread: String,
    location: String,
    message: String,
}

impl PanicReport {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        let thread = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();
        let location = info.location().map_or_else(
            || "unknown".to_string(),
            |l| format!("{}:{}", l.file(), l.line()),
        );
        Self {
            thread,
            location,
            message: redact(payload_text(info.payload())),
        }
    }

    fn log(&self) {
        tracing::error!(
            thread = %self.thread,
            location = %self.location,
            message = %self.message,
            "agentca panicked"
        );
    }
}

pub fn install() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        PanicReport::capture(info).log();
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            eprintln!("\n{}", backtrace);
        }
        previous(info);
    }));
}

fn payload_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn redact(text: &str) -> String {
    let lower = text.to_lowercase();
    if SENSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
        REDACTED.to_string()
    } else {
        text.to_string()
    }
}
