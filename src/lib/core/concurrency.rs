//! Thread-count negotiation for the read-only parallel fan-out used when
//! parsing large batches of independent input files.

use crate::core::errors::{EdquantError, Result};

/// Clamp a requested worker count to the machine's available CPUs.
pub fn determine_allowed_cpus(requested: usize) -> Result<usize> {
    if requested == 0 {
        return Err(EdquantError::InvalidInput(
            "thread count must be greater than 0".to_string(),
        ));
    }
    Ok(requested.min(num_cpus::get()))
}
