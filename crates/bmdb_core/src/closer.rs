//! Release-exactly-once capability.

/// A resource that can be released exactly once.
///
/// Implemented by transaction state (forced close) and cursor slots. A
/// handle-driven cascade uses it to release resources it does not own.
pub trait Closable {
    /// Returns true once the resource has been released.
    fn is_closed(&self) -> bool;

    /// Releases the resource. Returns true if this call performed the
    /// release, false if it had already happened.
    fn close(&self) -> bool;
}
