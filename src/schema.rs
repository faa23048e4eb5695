//! Selection of the correct data group when several versioned revisions of
//! the same group share a prefix (e.g. `op_hits_1`, `op_hits_2`, ...).

/// Resolve the highest-versioned group name starting with `prefix`.
///
/// The trailing decimal digit run of each candidate is parsed as its version;
/// a bare name equal to the prefix (no version suffix) counts as version 0,
/// so fixed-name groups like `mc_truth` resolve through the same path.
/// Returns `None` when nothing matches, which is only acceptable for optional
/// groups; the validator promotes absence of a required group to a rejection.
pub fn resolve_versioned_group<S: AsRef<str>>(names: &[S], prefix: &str) -> Option<String> {
    let mut best: Option<(u32, &str)> = None;
    for name in names {
        let name = name.as_ref();
        if !name.starts_with(prefix) {
            continue;
        }
        let version = trailing_version(name);
        match best {
            Some((current, _)) if current >= version => {}
            _ => best = Some((version, name)),
        }
    }
    best.map(|(_, name)| name.to_string())
}

fn trailing_version(name: &str) -> u32 {
    let digits: Vec<char> = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits
        .iter()
        .rev()
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}
