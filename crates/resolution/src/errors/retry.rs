/// Classification for failover policy.
///
/// Used to determine how the engine should respond to a provider failure.
/// A failure never stops the walk: every class moves on to the next provider.
///
/// # Behavior Summary
///
/// | Class | Try Next Provider? | Record Circuit Breaker Failure? |
/// |-------|-------------------|--------------------------------|
/// | `FailoverWithPenalty` | Yes | Yes (affects future resolutions) |
/// | `NextProvider` | Yes | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Failover to next provider and record a circuit breaker penalty.
    ///
    /// Used for transient errors like timeouts, transport failures and
    /// upstream 5xx/429 responses. After enough of these the provider's
    /// circuit opens and it is left out of future walks for a while.
    FailoverWithPenalty,

    /// Try next provider without recording any penalty.
    ///
    /// Used when this provider can't answer the request (capability missing,
    /// unexpected payload shape) but is otherwise healthy.
    NextProvider,
}
