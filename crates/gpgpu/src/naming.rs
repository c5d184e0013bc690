//! Identifier rules shared by variables, kernels and parameters.

use crate::error::{GraphError, GraphResult};

/// Params field holding the grid size; no kernel parameter may map onto it.
pub const RESOLUTION_FIELD: &str = "resolution";

/// Accepts ASCII identifiers: letters, digits and `_`, not starting with a digit.
pub fn validate_identifier(name: &str) -> GraphResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(GraphError::InvalidName(name.to_string()))
    }
}

/// `PositionsMasses` → `positions_masses`, `uNparticles` → `u_nparticles`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
