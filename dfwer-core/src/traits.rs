//! Core trait definitions shared across the workspace.

/// A type that can produce a summary of its contents.
pub trait Summarizable {
    /// A one-line summary suitable for display or log fields.
    fn summary(&self) -> String;
}
