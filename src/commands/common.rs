use anyhow::{anyhow, Result};
use edquant_lib::core::concurrency::determine_allowed_cpus;
use edquant_lib::core::errors::EdquantError;
use once_cell::sync::OnceCell;
use rayon::ThreadPoolBuilder;
use std::path::Path;

static GLOBAL_RAYON_THREADS: OnceCell<usize> = OnceCell::new();

/// Configure the global Rayon thread pool exactly once, returning the active
/// worker count. Subsequent calls reuse the first configured pool and emit a
/// warning when the requested thread count differs from the established size.
pub fn configure_global_thread_pool(threads: usize) -> Result<usize> {
    let requested = determine_allowed_cpus(threads)?;

    if let Some(active) = GLOBAL_RAYON_THREADS.get() {
        if *active != requested {
            log::warn!(
                "Rayon global thread pool already initialised with {} threads; ignoring request for {}",
                active,
                requested
            );
        }
        return Ok(*active);
    }

    match ThreadPoolBuilder::new().num_threads(requested).build_global() {
        Ok(_) => {
            GLOBAL_RAYON_THREADS
                .set(requested)
                .map_err(|_| anyhow!("Failed to record global Rayon thread count"))?;
            Ok(requested)
        }
        Err(err) => {
            log::debug!("Global Rayon thread pool initialisation skipped: {}", err);
            let fallback = rayon::current_num_threads();
            GLOBAL_RAYON_THREADS.set(fallback).ok();
            Ok(fallback)
        }
    }
}

/// Validate that a fraction-valued flag lies in [0, 1].
pub fn validate_fraction(field: &str, value: f64) -> Result<(), EdquantError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EdquantError::ThresholdValidation {
            field: field.to_string(),
            min: 0.0,
            max: 1.0,
            value,
        });
    }
    Ok(())
}

/// Validate that a required input path exists.
pub fn validate_input_file(label: &str, path: &Path) -> Result<(), EdquantError> {
    if !path.exists() {
        return Err(EdquantError::FileNotFound(format!(
            "{} not found: {}",
            label,
            path.display()
        )));
    }
    Ok(())
}
