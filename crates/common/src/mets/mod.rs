//! METS manifest parsing and structural verification
//!
//! A preserved file appears in three loosely linked regions of a METS
//! document: an administrative section (`amdSec`) keyed by its original
//! name, a file entry (`fileSec`) pointing back at that section via `ADMID`,
//! and a division in the physical structure map. Checks walk all three and
//! follow the identifier cross-references rather than matching text.

mod model;
mod verify;

pub use model::{AdministrativeSection, FileEntry, Manifest, StructDiv, StructuralMatch};
pub use verify::{MetsVerifier, PresentEntry, DEFAULT_ROOT_LABEL};
