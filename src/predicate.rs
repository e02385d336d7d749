use http::request::Parts;

/// Decides whether compression should be bypassed for a request.
///
/// The predicate sees only the request head and runs exactly once per
/// request, before encoding negotiation. Returning `true` turns the whole
/// middleware into a pass-through for that exchange: the body is forwarded
/// untouched and no response header is modified.
pub trait SkipPredicate {
    /// Returns `true` to bypass compression for this request.
    fn should_skip(&self, head: &Parts) -> bool;
}

impl<F> SkipPredicate for F
where
    F: Fn(&Parts) -> bool,
{
    fn should_skip(&self, head: &Parts) -> bool {
        self(head)
    }
}

/// Default predicate: compression is never bypassed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSkip;

impl SkipPredicate for NeverSkip {
    fn should_skip(&self, _head: &Parts) -> bool {
        false
    }
}
