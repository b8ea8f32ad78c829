//! Small helpers shared across the crate.

/// Open a profiling zone lasting until the end of the enclosing scope.
///
/// Only recorded when the `tracy` feature is enabled and a tracy client is running,
/// otherwise expands to nothing.
macro_rules! tracy_span {
    ($name:literal) => {
        #[cfg(feature = "tracy")]
        let _span = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!($name), 0));
    };
}
pub(crate) use tracy_span;
