//! Persists sweep results as plain text, one address per line.
use crate::address::Address;
use crate::scanner::ResultSnapshot;
use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes both result sets, each sorted by address, overwriting the files.
pub fn write_results(
    snapshot: &ResultSnapshot,
    reachable_path: &Path,
    unreachable_path: &Path,
) -> anyhow::Result<()> {
    write_sorted(&snapshot.reachable, reachable_path)?;
    write_sorted(&snapshot.unreachable, unreachable_path)?;
    Ok(())
}

fn write_sorted(addresses: &[Address], path: &Path) -> anyhow::Result<()> {
    let mut addresses = addresses.to_vec();
    addresses.sort_unstable();

    let file =
        File::create(path).with_context(|| format!("could not create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for address in &addresses {
        writeln!(writer, "{address}")
            .with_context(|| format!("could not write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("could not write {}", path.display()))
}
