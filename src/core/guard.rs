//! Guard predicates for controlling state transitions.
//!
//! Guards are pure boolean functions over the entity and the event payload.
//! A transition carries an ordered list of guards which are ANDed together;
//! evaluation stops at the first guard that rejects.

use super::payload::Payload;
use std::fmt;
use std::sync::Arc;

type Predicate<E> = dyn Fn(&E, &Payload) -> bool + Send + Sync;

/// Pure predicate that determines if a transition can be taken.
///
/// The predicate must be deterministic for identical inputs and must not
/// perform side effects. Guards are cheap to clone (the predicate is shared).
///
/// # Example
///
/// ```rust
/// use flowstate::core::{Guard, Payload};
///
/// struct Cart {
///     items: usize,
/// }
///
/// let not_empty = Guard::new("cart not empty", |cart: &Cart, _: &Payload| cart.items > 0);
///
/// assert!(not_empty.check(&Cart { items: 2 }, &Payload::new()));
/// assert!(!not_empty.check(&Cart { items: 0 }, &Payload::new()));
/// ```
pub struct Guard<E> {
    label: String,
    predicate: Arc<Predicate<E>>,
}

impl<E> Guard<E> {
    /// Create a guard from a label and a pure predicate.
    pub fn new<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&E, &Payload) -> bool + Send + Sync + 'static,
    {
        Guard {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Guard that only looks at the entity.
    pub fn on_entity<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self::new(label, move |entity: &E, _: &Payload| predicate(entity))
    }

    /// Guard that only looks at the payload.
    pub fn on_payload<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        Self::new(label, move |_: &E, payload: &Payload| predicate(payload))
    }

    /// Human readable label, used in logs when the guard rejects.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate the guard.
    pub fn check(&self, entity: &E, payload: &Payload) -> bool {
        (self.predicate)(entity, payload)
    }
}

impl<E> Clone for Guard<E> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<E> fmt::Debug for Guard<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("label", &self.label).finish()
    }
}

/// Evaluate an ordered guard list against an entity and payload.
///
/// Returns the label of the first rejecting guard, or `None` if every guard
/// passed. An empty list always passes.
pub fn first_rejection<'g, E>(
    guards: &'g [Guard<E>],
    entity: &E,
    payload: &Payload,
) -> Option<&'g str> {
    guards
        .iter()
        .find(|guard| !guard.check(entity, payload))
        .map(|guard| guard.label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Account {
        balance: i64,
        frozen: bool,
    }

    #[test]
    fn guard_allows_matching_entities() {
        let guard = Guard::on_entity("positive balance", |a: &Account| a.balance > 0);

        let open = Account {
            balance: 10,
            frozen: false,
        };
        let empty = Account {
            balance: 0,
            frozen: false,
        };
        assert!(guard.check(&open, &Payload::new()));
        assert!(!guard.check(&empty, &Payload::new()));
    }

    #[test]
    fn guard_can_read_payload() {
        let guard = Guard::on_payload("has reason", |p: &Payload| p.contains("reason"));
        let account = Account {
            balance: 1,
            frozen: false,
        };

        assert!(!guard.check(&account, &Payload::new()));
        assert!(guard.check(&account, &Payload::new().with("reason", "audit")));
    }

    #[test]
    fn guard_is_deterministic() {
        let account = Account {
            balance: 5,
            frozen: true,
        };
        let guard = Guard::new("withdrawable", |a: &Account, p: &Payload| {
            !a.frozen && p.f64("amount").unwrap_or(0.0) <= a.balance as f64
        });

        let payload = Payload::new().with("amount", 3.0);
        assert_eq!(
            guard.check(&account, &payload),
            guard.check(&account, &payload)
        );
    }

    #[test]
    fn first_rejection_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let guards = vec![
            Guard::on_entity("not frozen", |a: &Account| !a.frozen),
            Guard::on_entity("counted", move |_: &Account| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }),
        ];

        let frozen = Account {
            balance: 1,
            frozen: true,
        };
        assert_eq!(
            first_rejection(&guards, &frozen, &Payload::new()),
            Some("not frozen")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_guard_list_passes() {
        let guards: Vec<Guard<Account>> = Vec::new();
        let account = Account {
            balance: 0,
            frozen: true,
        };
        assert_eq!(first_rejection(&guards, &account, &Payload::new()), None);
    }
}
