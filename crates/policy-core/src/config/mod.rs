//! Declarative configuration
//!
//! The desired state is declared in a TOML manifest (`policy.toml`):
//!
//! ```toml
//! [core]
//! state_dir = ".policy"
//! bulk_create = false
//!
//! [[objects]]
//! kind = "network"
//! name = "dmz"
//! [objects.attributes]
//! value = "10.0.0.0/24"
//!
//! [[objects]]
//! kind = "access_rule"
//! name = "allow-web"
//! position = { section = "mandatory", insert_after = 3 }
//! [objects.attributes]
//! action = "ALLOW"
//! ```
//!
//! An optional `policy.local.toml` next to the manifest overrides `[core]`
//! settings for one machine and is meant to stay out of version control.
//!
//! This is the boundary where declarations are validated; everything past
//! [`ConfigResolver::resolve`] works on [`DeclaredCollection`]s.
//!
//! [`DeclaredCollection`]: crate::declared::DeclaredCollection

mod manifest;
mod resolver;

pub use manifest::{CoreSection, Manifest, ObjectDecl};
pub use resolver::{ConfigResolver, ResolvedConfig};
