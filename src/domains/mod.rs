//! Built-in domain rules.
//!
//! Providers that need more than the generic page scraping get a module
//! here. Everything else is handled by bare-name rules added at runtime
//! (`engine.add_domain("example.com")`).

pub mod rutube;
pub mod vimeo;
pub mod youtube;

use crate::error::Result;
use crate::rules::Domain;

/// Built-in domains in registration order.
pub fn builtin() -> Result<Vec<Domain>> {
    Ok(vec![youtube::domain()?, vimeo::domain()?, rutube::domain()?])
}
