//! Diagnostics.

/// Logs misuse that is tolerated but leads to undefined results, such as mutating a graph off its
/// thread. Warnings go to the `viewgraph::runtime_issues` target.
#[macro_export]
macro_rules! runtime_issue {
    ($($arg:tt)+) => {
        ::tracing::warn!(target: "viewgraph::runtime_issues", $($arg)+)
    };
}
