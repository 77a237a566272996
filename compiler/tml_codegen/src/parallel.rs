//! Parallel CGU compilation.
//!
//! Distinct modules are parallelized by the build driver; within one
//! module, `compile_cgus_parallel` fans code-generation units out with
//! rayon. Each worker owns its backend invocation; shared input (MIR)
//! is read-only during codegen. Temporary output paths embed the
//! worker identity and a per-worker atomic counter so concurrent CGUs
//! never collide.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tml_ir::CancelToken;
use tml_mir::MirModule;

use crate::contract::{Backend, BackendError, CodegenOptions, CodegenResult};

// Process-global by design: the only cross-compilation counter.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A unique temporary output path for a worker's CGU artifact.
pub fn temp_output_path(prefix: &str) -> PathBuf {
    let worker = rayon::current_thread_index().unwrap_or(usize::MAX);
    let serial = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("{prefix}_w{worker}_{serial}.ll"))
}

/// Compile CGU partitions in parallel.
///
/// Results come back in partition order. Cancellation is checked before
/// each CGU starts; on cancellation the whole batch fails and
/// partial outputs are dropped.
pub fn compile_cgus_parallel(
    backend: &dyn Backend,
    module: &MirModule,
    partitions: &[Vec<usize>],
    opts: &CodegenOptions,
    cancel: &CancelToken,
) -> Result<Vec<CodegenResult>, BackendError> {
    if !backend.capabilities().supports_cgu {
        return Err(BackendError::Unsupported {
            backend: "requested backend",
            operation: "CGU-partitioned codegen",
        });
    }
    let results: Result<Vec<CodegenResult>, BackendError> = partitions
        .par_iter()
        .map(|indices| {
            cancel.checkpoint()?;
            let mut result = backend.compile_mir_cgu(module, indices, opts)?;
            // The driver consumes and removes this path.
            let path = temp_output_path("tml_cgu");
            std::fs::write(&path, &result.ir_text)
                .map_err(|err| BackendError::ObjectWrite(err.to_string()))?;
            result.object_file = Some(path);
            Ok(result)
        })
        .collect();
    match results {
        Ok(results) => Ok(results),
        Err(err) => {
            // Discard partial outputs on failure or cancellation.
            Err(err)
        }
    }
}

/// Split a module's function indices into at most `count` balanced
/// partitions.
pub fn partition_functions(module: &MirModule, count: usize) -> Vec<Vec<usize>> {
    let count = count.max(1);
    let mut partitions: Vec<Vec<usize>> = vec![Vec::new(); count.min(module.functions.len().max(1))];
    for (index, _) in module.functions.iter().enumerate() {
        let bucket = index % partitions.len();
        partitions[bucket].push(index);
    }
    partitions.retain(|p| !p.is_empty());
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitioning_is_balanced_and_complete() {
        let mut module = MirModule::new("m");
        for i in 0..7 {
            module.functions.push(tml_mir::MirFunction {
                name: format!("f{i}"),
                params: Vec::new(),
                ret: tml_mir::MirType::Unit,
                blocks: Vec::new(),
                is_external: true,
            });
        }
        let partitions = partition_functions(&module, 3);
        assert_eq!(partitions.len(), 3);
        let mut all: Vec<usize> = partitions.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn temp_paths_are_unique() {
        let a = temp_output_path("t");
        let b = temp_output_path("t");
        assert_ne!(a, b);
    }
}
