//! Options that are either a literal value or computed from the live instance.
//!
//! Every decision point (accepting a call, arming a timer, deriving status)
//! resolves the parameter again, so a resolver observes the instance's current
//! state. Resolvers must be side-effect free and must not call scheduling
//! operations on the instance they are handed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A literal `T` or a function of the instance `I` producing one.
pub enum Param<T, I> {
    Value(T),
    Resolver(Arc<dyn Fn(&I) -> T + Send + Sync>),
}

impl<T: Clone, I> Param<T, I> {
    /// Build a parameter from a resolver function.
    pub fn from_fn(f: impl Fn(&I) -> T + Send + Sync + 'static) -> Self {
        Self::Resolver(Arc::new(f))
    }

    /// Evaluate against the instance. Never cached.
    pub fn resolve(&self, instance: &I) -> T {
        match self {
            Self::Value(value) => value.clone(),
            Self::Resolver(f) => f(instance),
        }
    }

    /// The literal value, if this parameter is not a resolver.
    pub fn literal(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Resolver(_) => None,
        }
    }
}

impl<T, I> From<T> for Param<T, I> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: Clone, I> Clone for Param<T, I> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(value) => Self::Value(value.clone()),
            Self::Resolver(f) => Self::Resolver(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug, I> fmt::Debug for Param<T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Convert a millisecond count into a delay.
///
/// NaN, infinite and negative inputs become zero; a zero delay is scheduled on
/// the next timer tick rather than run inline. Finite values too large for a
/// `Duration` saturate to [`Duration::MAX`].
#[must_use]
pub fn coerce_millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Owner {
        calls: AtomicU32,
    }

    #[test]
    fn literal_resolves_to_itself() {
        let p: Param<u64, Owner> = 42.into();
        let owner = Owner {
            calls: AtomicU32::new(0),
        };
        assert_eq!(p.resolve(&owner), 42);
        assert_eq!(p.literal(), Some(&42));
    }

    #[test]
    fn resolver_is_evaluated_every_time() {
        let p: Param<u32, Owner> = Param::from_fn(|owner: &Owner| owner.calls.fetch_add(1, Ordering::SeqCst));
        let owner = Owner {
            calls: AtomicU32::new(0),
        };
        assert_eq!(p.resolve(&owner), 0);
        assert_eq!(p.resolve(&owner), 1);
        assert_eq!(p.resolve(&owner), 2);
        assert!(p.literal().is_none());
    }

    #[test]
    fn clone_shares_resolver() {
        let p: Param<bool, Owner> = Param::from_fn(|owner: &Owner| owner.calls.load(Ordering::SeqCst) > 0);
        let q = p.clone();
        let owner = Owner {
            calls: AtomicU32::new(1),
        };
        assert!(q.resolve(&owner));
        assert_eq!(format!("{q:?}"), "Resolver(..)");
    }

    #[test]
    fn coerce_millis_handles_bad_input() {
        assert_eq!(coerce_millis(f64::NAN), Duration::ZERO);
        assert_eq!(coerce_millis(f64::INFINITY), Duration::ZERO);
        assert_eq!(coerce_millis(-5.0), Duration::ZERO);
        assert_eq!(coerce_millis(0.0), Duration::ZERO);
        assert_eq!(coerce_millis(250.0), Duration::from_millis(250));
        assert_eq!(coerce_millis(1.5), Duration::from_micros(1500));
    }

    #[test]
    fn coerce_millis_saturates_huge_values() {
        assert_eq!(coerce_millis(1e300), Duration::MAX);
        assert_eq!(coerce_millis(f64::MAX), Duration::MAX);
        assert!(coerce_millis(1e18) < Duration::MAX);
    }
}
