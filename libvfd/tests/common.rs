use std::sync::Arc;

use libvfd::memory::MemoryDirectory;
use libvfd::{DirectoryHandle, FdTable};

/// A table with one in-memory preopen per name, registered in order.
#[allow(dead_code)]
pub fn memory_table(paths: &[&str]) -> (Vec<Arc<MemoryDirectory>>, FdTable) {
    let roots: Vec<Arc<MemoryDirectory>> = paths.iter().map(|_| MemoryDirectory::root()).collect();
    let preopens: Vec<(String, Arc<dyn DirectoryHandle>)> = paths
        .iter()
        .zip(&roots)
        .map(|(p, r)| (p.to_string(), r.clone() as Arc<dyn DirectoryHandle>))
        .collect();
    (roots, FdTable::new(preopens))
}
