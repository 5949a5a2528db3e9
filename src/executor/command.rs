//! Command lines for the chaos tool.
//!
//! ```text
//! <bin> create <target> <action> <matchers...> --uid <id>
//! <bin> destroy <id>
//! <bin> destroy <target> <action> <matchers...>
//! ```
//!
//! Matchers are every experiment flag except the transport flags this crate
//! consumes itself, serialised in name order.

use std::collections::BTreeMap;

use super::{ExperimentRequest, flags};
use crate::engine::shell_quote as quote;

/// Flags consumed locally and never forwarded to the tool.
const TRANSPORT_FLAGS: &[&str] = &[
    flags::CONTAINER_ID,
    flags::CONTAINER_NAME,
    flags::DOCKER_ENDPOINT,
    flags::IMAGE_REPO,
    flags::IMAGE_VERSION,
    flags::BLADE_TAR_FILE,
    flags::BLADE_OVERRIDE,
];

/// How a destroy command identifies the experiment to reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyForm {
    /// `destroy <id>` when the experiment id is known, matchers otherwise.
    PreferUid,
    /// Always `destroy <target> <action> <matchers...>`.
    Matchers,
}

/// Build the create command for `request`.
#[must_use]
pub fn create_command(bin: &str, request: &ExperimentRequest) -> String {
    let mut line = format!(
        "{} create {} {}",
        quote(bin),
        quote(request.target()),
        quote(request.action())
    );
    push_matchers(&mut line, request.flags());
    if let Some(uid) = request.experiment_uid() {
        line.push_str(" --uid ");
        line.push_str(&quote(uid));
    }
    line
}

/// Build the destroy command for `request`.
#[must_use]
pub fn destroy_command(bin: &str, request: &ExperimentRequest, form: DestroyForm) -> String {
    if let (DestroyForm::PreferUid, Some(uid)) = (form, request.experiment_uid()) {
        return format!("{} destroy {}", quote(bin), quote(uid));
    }
    let mut line = format!(
        "{} destroy {} {}",
        quote(bin),
        quote(request.target()),
        quote(request.action())
    );
    push_matchers(&mut line, request.flags());
    line
}

fn push_matchers(line: &mut String, flags: &BTreeMap<String, String>) {
    let matchers = flags
        .iter()
        .filter(|(name, _)| !TRANSPORT_FLAGS.contains(&name.as_str()))
        .filter(|(_, value)| !value.trim().is_empty());

    for (name, value) in matchers {
        line.push_str(" --");
        line.push_str(name);
        if value.trim() != "true" {
            line.push(' ');
            line.push_str(&quote(value.trim()));
        }
    }
}
