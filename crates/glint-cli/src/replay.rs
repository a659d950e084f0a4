//! Allocation trace replay.
//!
//! A trace is one operation per line:
//!
//! ```text
//! alloc <id> <size>
//! realloc <id> <size>
//! free <id>
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Ids name blocks
//! within the trace; `realloc` of an unknown id behaves like `alloc`.
use std::collections::HashMap;
use std::ptr::NonNull;

use anyhow::{anyhow, bail, Context, Result};
use glint_host::{AllocStats, HeterogeneousAllocator};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Alloc { id: u64, size: usize },
    Realloc { id: u64, size: usize },
    Free { id: u64 },
}

fn parse_line(line: &str) -> Result<Option<Op>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let number = |index: usize, what: &str| -> Result<u64> {
        let field = fields
            .get(index)
            .ok_or_else(|| anyhow!("missing {}", what))?;
        field
            .parse::<u64>()
            .with_context(|| format!("invalid {} '{}'", what, field))
    };

    let op = match fields[0] {
        "alloc" => Op::Alloc {
            id: number(1, "id")?,
            size: number(2, "size")? as usize,
        },
        "realloc" => Op::Realloc {
            id: number(1, "id")?,
            size: number(2, "size")? as usize,
        },
        "free" => Op::Free { id: number(1, "id")? },
        other => bail!("unknown operation '{}'", other),
    };
    Ok(Some(op))
}

/// Outcome of a replayed trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub operations: usize,
    /// Requests the allocator answered with `None`
    pub failures: usize,
    /// Blocks still allocated at the end of the trace
    pub live_blocks: usize,
    pub stats: AllocStats,
}

/// Run every operation of `trace` through `heap`
pub fn replay(heap: &mut HeterogeneousAllocator, trace: &str) -> Result<ReplaySummary> {
    let mut blocks: HashMap<u64, (NonNull<u8>, usize)> = HashMap::new();
    let mut operations = 0;
    let mut failures = 0;

    for (index, line) in trace.lines().enumerate() {
        let Some(op) = parse_line(line).with_context(|| format!("line {}", index + 1))? else {
            continue;
        };
        operations += 1;

        match op {
            Op::Alloc { id, size } => {
                if blocks.contains_key(&id) {
                    bail!("line {}: block {} is already allocated", index + 1, id);
                }
                match heap.allocate(size) {
                    Some(ptr) => {
                        blocks.insert(id, (ptr, size));
                    }
                    None if size == 0 => {}
                    None => {
                        warn!(target: "alloc", "line {}: alloc of {} bytes failed", index + 1, size);
                        failures += 1;
                    }
                }
            }
            Op::Realloc { id, size } => {
                let previous = blocks.remove(&id);
                let (ptr, old_size) = match previous {
                    Some((ptr, old)) => (Some(ptr), old),
                    None => (None, 0),
                };
                match heap.reallocate(ptr, old_size, size) {
                    Some(new_ptr) => {
                        blocks.insert(id, (new_ptr, size));
                    }
                    None if size == 0 => {}
                    None => {
                        warn!(target: "alloc", "line {}: realloc to {} bytes failed", index + 1, size);
                        failures += 1;
                        if let Some(kept) = previous {
                            blocks.insert(id, kept);
                        }
                    }
                }
            }
            Op::Free { id } => match blocks.remove(&id) {
                Some((ptr, size)) => heap.deallocate(ptr, size),
                None => debug!(target: "alloc", "line {}: free of unknown block {}", index + 1, id),
            },
        }
    }

    Ok(ReplaySummary {
        operations,
        failures,
        live_blocks: blocks.len(),
        stats: heap.stats(),
    })
}
