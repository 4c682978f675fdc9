//! Status and event traits for workflow entities.
//!
//! A workflow is described by two closed enumerations: the statuses an
//! entity can occupy and the events that move it between them. Both are
//! plain values; all methods here are pure.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Trait for entity statuses.
///
/// Statuses are partitioned into *idle* statuses (awaiting further events)
/// and *final* statuses (terminal, no outgoing transitions). A *failed*
/// status is a final status that represents an aborted or compensated
/// outcome.
///
/// # Example
///
/// ```rust
/// use flowstate::core::Status;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// enum TicketStatus {
///     Open,
///     Resolved,
///     Rejected,
/// }
///
/// impl Status for TicketStatus {
///     fn name(&self) -> &str {
///         match self {
///             Self::Open => "open",
///             Self::Resolved => "resolved",
///             Self::Rejected => "rejected",
///         }
///     }
///
///     fn is_final(&self) -> bool {
///         matches!(self, Self::Resolved | Self::Rejected)
///     }
///
///     fn is_failed(&self) -> bool {
///         matches!(self, Self::Rejected)
///     }
/// }
///
/// assert!(TicketStatus::Open.is_idle());
/// assert!(TicketStatus::Rejected.is_final());
/// ```
pub trait Status:
    Clone + PartialEq + Eq + Hash + Debug + Serialize + for<'de> Deserialize<'de> + Send + Sync
{
    /// Wire name of the status, used for logging and persistence.
    fn name(&self) -> &str;

    /// Check if this is a final (terminal) status.
    fn is_final(&self) -> bool;

    /// Check if this is a failed status.
    ///
    /// Failed statuses are expected to also be final; table validation
    /// reports a violation otherwise.
    ///
    /// Default implementation returns `false`.
    fn is_failed(&self) -> bool {
        false
    }

    /// An idle status is any status that is not final.
    fn is_idle(&self) -> bool {
        !self.is_final()
    }
}

/// Trait for workflow events.
///
/// Events are named triggers. Their payload travels separately as a
/// [`Payload`](crate::core::Payload).
pub trait Event: Clone + PartialEq + Eq + Hash + Debug + Send + Sync {
    /// Dotted wire name of the event, e.g. `order.payment.success`.
    fn name(&self) -> &str;
}

/// Generate [`Status`] and [`Event`] implementations for simple enums.
///
/// Each variant is given its wire name as a string literal.
///
/// ```
/// use flowstate::core::{Event, Status};
/// use flowstate::{workflow_event, workflow_status};
///
/// workflow_status! {
///     pub enum JobStatus {
///         Queued => "queued",
///         Done => "done",
///         Aborted => "aborted",
///     }
///     final: [Done, Aborted]
///     failed: [Aborted]
/// }
///
/// workflow_event! {
///     pub enum JobEvent {
///         Finish => "job.finish",
///     }
/// }
///
/// assert_eq!(JobStatus::Queued.name(), "queued");
/// assert!(JobStatus::Aborted.is_failed());
/// assert_eq!(JobEvent::Finish.name(), "job.finish");
/// ```
#[macro_export]
macro_rules! workflow_status {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $wire:literal
            ),* $(,)?
        }

        $(final: [$($final:ident),* $(,)?])?
        $(failed: [$($failed:ident),* $(,)?])?
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                #[serde(rename = $wire)]
                $variant
            ),*
        }

        impl $name {
            /// Every status, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),*];
        }

        impl $crate::core::Status for $name {
            fn name(&self) -> &str {
                match self {
                    $(Self::$variant => $wire),*
                }
            }

            fn is_final(&self) -> bool {
                match self {
                    $($(Self::$final => true,)*)?
                    _ => false,
                }
            }

            fn is_failed(&self) -> bool {
                match self {
                    $($(Self::$failed => true,)*)?
                    _ => false,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::core::Status::name(self))
            }
        }
    };
}

/// Generate an [`Event`] implementation for a simple enum.
///
/// Also generates `from_name`, used by broker routing to resolve wire names.
#[macro_export]
macro_rules! workflow_event {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $wire:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                #[serde(rename = $wire)]
                $variant
            ),*
        }

        impl $name {
            /// Every event, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            /// Resolve an event from its wire name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($wire => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }

        impl $crate::core::Event for $name {
            fn name(&self) -> &str {
                match self {
                    $(Self::$variant => $wire),*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::core::Event::name(self))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    workflow_status! {
        enum TestStatus {
            Initial => "initial",
            Processing => "processing",
            Complete => "complete",
            Failed => "failed",
        }
        final: [Complete, Failed]
        failed: [Failed]
    }

    workflow_event! {
        enum TestEvent {
            Start => "test.start",
            Finish => "test.finish",
        }
    }

    #[test]
    fn status_name_returns_wire_value() {
        assert_eq!(TestStatus::Initial.name(), "initial");
        assert_eq!(TestStatus::Processing.name(), "processing");
        assert_eq!(TestStatus::Complete.to_string(), "complete");
    }

    #[test]
    fn final_and_idle_partition_statuses() {
        for status in TestStatus::ALL {
            assert_ne!(status.is_final(), status.is_idle());
        }
        assert!(TestStatus::Initial.is_idle());
        assert!(TestStatus::Complete.is_final());
    }

    #[test]
    fn failed_statuses_are_final() {
        assert!(TestStatus::Failed.is_failed());
        assert!(TestStatus::Failed.is_final());
        assert!(!TestStatus::Complete.is_failed());
    }

    #[test]
    fn status_serializes_with_wire_name() {
        let json = serde_json::to_string(&TestStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let back: TestStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TestStatus::Processing);
    }

    #[test]
    fn event_resolves_from_wire_name() {
        assert_eq!(TestEvent::from_name("test.finish"), Some(TestEvent::Finish));
        assert_eq!(TestEvent::from_name("test.unknown"), None);
        assert_eq!(TestEvent::Start.name(), "test.start");
    }
}
