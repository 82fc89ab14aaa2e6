//! Final routing-table emission: one human-readable file per router.

use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr as _};

use dvsim_primitives::RoutingTable;

/// Writes `table` to `<dir>/<owner>.txt`, entries destination-ascending.
/// Called exactly once, on terminate.
pub(crate) fn write_table(dir: &Path, table: &RoutingTable) -> Result<PathBuf> {
    let path = dir.join(format!("{}.txt", table.owner()));
    let mut out = format!("routing table for router {}\n\n", table.owner());
    for (destination, entry) in table.iter() {
        out.push_str(&format!(
            "destination {destination}  cost {}  next-hop {}\n",
            entry.cost, entry.next_hop
        ));
    }
    fs::write(&path, &out)
        .wrap_err_with(|| format!("failed writing routing table to {}", path.display()))?;
    Ok(path)
}
