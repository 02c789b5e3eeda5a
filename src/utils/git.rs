use std::path::Path;

use crate::utils::process::{Invocation, ProcessRunner};

/// Branch and commit of the repository at `root`; empty strings when git is
/// missing or `root` is not a repository.
pub fn head_info(runner: &dyn ProcessRunner, root: &Path) -> (String, String) {
    let branch = rev_parse(runner, root, &["--abbrev-ref", "HEAD"]);
    let commit = rev_parse(runner, root, &["HEAD"]);
    (branch, commit)
}

fn rev_parse(runner: &dyn ProcessRunner, root: &Path, args: &[&str]) -> String {
    let mut all = vec!["-C".to_string(), root.display().to_string(), "rev-parse".into()];
    all.extend(args.iter().map(|a| a.to_string()));
    runner
        .run_checked(&Invocation::new("git", all))
        .map(|out| out.trim().to_string())
        .unwrap_or_default()
}
