//! Call Site Module
//!
//! Identifies the code that invoked the key-less `remember` form, so that
//! the cache key can be derived from where the call was made.

use std::panic::Location;

use super::{identity_of, normalize_separators};

/// Where a key-less memoization was requested from.
///
/// `owner` becomes the key's identity and `line` names the operation
/// (`Closure_<line>`). Two requests on the same line of the same owner
/// share a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    owner: String,
    line: u32,
    parent: Option<String>,
}

impl CallSite {
    /// The caller's source file and line.
    ///
    /// Used when the calling code is not inside a type that can name
    /// itself; the file path stands in for the owner.
    #[track_caller]
    pub fn here() -> Self {
        let location = Location::caller();
        Self::tagged(&owner_from_file(location.file()), location.line())
    }

    /// The caller's line, owned by type `T`.
    #[track_caller]
    pub fn of<T: ?Sized>() -> Self {
        Self {
            owner: identity_of::<T>(),
            line: Location::caller().line(),
            parent: None,
        }
    }

    /// Explicit owner and line.
    pub fn tagged(owner: &str, line: u32) -> Self {
        Self {
            owner: normalize_separators(owner),
            line,
            parent: None,
        }
    }

    /// Records that the owner inherits the memoizing behavior from `P`.
    ///
    /// Keeps keys of a derived owner apart from those of its parent even
    /// when both call from the same line.
    pub fn via<P: ?Sized>(mut self) -> Self {
        self.parent = Some(identity_of::<P>());
        self
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Identity segment of the key.
    pub fn identity(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}/parent/{}", self.owner, parent),
            None => self.owner.clone(),
        }
    }

    /// Operation segment of the key.
    pub fn operation(&self) -> String {
        format!("Closure_{}", self.line)
    }
}

/// Turns a source path into a relative key identity.
///
/// Sources outside the workspace report absolute paths or paths with
/// `..` (path dependencies), so empty, `.` and `..` segments are dropped.
fn owner_from_file(file: &str) -> String {
    file.trim_end_matches(".rs")
        .split(['/', '\\'])
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyGenerator;

    struct Invoice;
    struct Document;

    #[test]
    fn test_here_captures_caller_line() {
        let line = line!() + 1;
        let site = CallSite::here();
        assert_eq!(site.line(), line);
        assert!(site.identity().ends_with("keys/call_site"));
    }

    #[test]
    fn test_owner_from_file_stays_relative() {
        assert_eq!(owner_from_file("src/report.rs"), "src/report");
        assert_eq!(owner_from_file("../shared/src/util.rs"), "shared/src/util");
        assert_eq!(owner_from_file("/abs/./x.rs"), "abs/x");
        assert_eq!(owner_from_file("C:\\work\\..\\lib.rs"), "C:/work/lib");
    }

    #[test]
    fn test_out_of_tree_caller_key_is_storable() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = crate::backend::FileBackend::new(dir.path(), "cache");
        let site = CallSite::tagged(&owner_from_file("../../vendor/lib.rs"), 3);
        let key = KeyGenerator::new().for_call_site(&site);

        assert_eq!(key, "vendor/lib/Closure_3");
        assert!(backend.record_path(&key).is_ok());
    }

    #[test]
    fn test_of_uses_type_identity() {
        let site = CallSite::of::<Invoice>();
        assert!(site.identity().ends_with("/Invoice"));
        assert_eq!(site.operation(), format!("Closure_{}", site.line()));
    }

    #[test]
    fn test_tagged_normalizes_owner() {
        let site = CallSite::tagged("app::billing::Invoice", 42);
        assert_eq!(site.identity(), "app/billing/Invoice");
        assert_eq!(site.operation(), "Closure_42");
    }

    #[test]
    fn test_parent_qualifier() {
        let site = CallSite::tagged("app/Invoice", 7).via::<Document>();
        assert!(site.identity().starts_with("app/Invoice/parent/"));
        assert!(site.identity().ends_with("/Document"));
    }

    #[test]
    fn test_call_site_key() {
        let keys = KeyGenerator::with_identifier("ns");
        let key = keys.for_call_site(&CallSite::tagged("app/Invoice", 12));
        assert_eq!(key, "@ns/app/Invoice/Closure_12");
    }

    #[test]
    fn test_distinct_lines_yield_distinct_keys() {
        let keys = KeyGenerator::new();
        let a = keys.for_call_site(&CallSite::tagged("app/Invoice", 1));
        let b = keys.for_call_site(&CallSite::tagged("app/Invoice", 2));
        assert_ne!(a, b);
    }
}
