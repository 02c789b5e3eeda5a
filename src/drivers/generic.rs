use std::path::Path;

use tracing::{debug, warn};

use super::{DriverContext, SnapshotDriver};
use crate::error::DriverError;
use crate::utils::io::write_atomic;

/// Django's own `dumpdata` / `loaddata`, run through the command executor.
/// Works for any engine Django can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenericDriver;

const DUMP_ARGS: [&str; 5] = [
    "dumpdata",
    "--natural-foreign",
    "--natural-primary",
    "--indent",
    "2",
];

/// The fixture inside `dumpdata` output: the first JSON value starting at the
/// beginning of a line. Chatter before it and warnings after it are dropped.
fn fixture_body(output: &str) -> Result<&str, DriverError> {
    let invalid = |reason: String| DriverError::InvalidFixture {
        reason,
        output: output.to_string(),
    };

    let mut offset = 0;
    let start = output
        .split_inclusive('\n')
        .find_map(|line| {
            let at = offset + (line.len() - line.trim_start().len());
            offset += line.len();
            line.trim_start().starts_with(['[', '{']).then_some(at)
        })
        .ok_or_else(|| invalid("no JSON found".into()))?;

    let body = &output[start..];
    let mut values = serde_json::Deserializer::from_str(body).into_iter::<serde_json::Value>();
    match values.next() {
        Some(Ok(_)) => {
            let end = values.byte_offset();
            if !body[end..].trim().is_empty() {
                warn!("dropping trailing output after dumpdata fixture");
            }
            Ok(&body[..end])
        }
        Some(Err(err)) => Err(invalid(err.to_string())),
        None => Err(invalid("no JSON found".into())),
    }
}

impl SnapshotDriver for GenericDriver {
    fn name(&self) -> &'static str { "django" }

    fn extension(&self) -> &'static str { ".json" }

    fn dump(&self, cx: &mut DriverContext<'_>, out: &Path) -> Result<(), DriverError> {
        let output = cx
            .executor
            .run(&DUMP_ARGS)
            .map_err(|source| DriverError::command("dumpdata", source))?;
        let fixture = fixture_body(&output)?;
        write_atomic(out, fixture.as_bytes()).map_err(|source| DriverError::Io {
            action: "write fixture",
            path: out.to_path_buf(),
            source,
        })
    }

    /// `loaddata` gets the payload relative to the project root when it lives
    /// under it, so a container with the project bind-mounted can open it.
    fn restore(&self, cx: &mut DriverContext<'_>, payload: &Path) -> Result<(), DriverError> {
        let root = cx.executor.project().root_dir.clone();
        let fixture = payload
            .strip_prefix(&root)
            .unwrap_or(payload)
            .display()
            .to_string();

        cx.executor
            .run(&["flush", "--no-input"])
            .map_err(|source| DriverError::command("flush", source))?;
        debug!(fixture = %fixture, "loading fixture");
        cx.executor
            .run(&["loaddata", fixture.as_str()])
            .map_err(|source| DriverError::command("loaddata", source))?;
        Ok(())
    }
}
