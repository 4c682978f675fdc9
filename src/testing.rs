//! Small support-ticket workflow used by unit tests.

use crate::core::{Entity, StatusChange, StatusHistory};
use crate::table::{TableBuilder, TransitionBuilder, TransitionTable};
use crate::{workflow_event, workflow_status};
use serde::{Deserialize, Serialize};

workflow_status! {
    pub enum TicketStatus {
        Open => "open",
        Triaged => "triaged",
        Escalated => "escalated",
        Closed => "closed",
        Rejected => "rejected",
    }
    final: [Closed, Rejected]
    failed: [Rejected]
}

workflow_event! {
    pub enum TicketEvent {
        Triage => "ticket.triage",
        Escalate => "ticket.escalate",
        Close => "ticket.close",
        Reject => "ticket.reject",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub urn: String,
    pub status: TicketStatus,
    pub priority: u32,
    pub reference: Option<String>,
    pub notes: Vec<String>,
    pub history: StatusHistory<TicketStatus>,
}

impl Ticket {
    pub fn new(urn: impl Into<String>) -> Self {
        Self {
            urn: urn.into(),
            status: TicketStatus::Open,
            priority: 0,
            reference: None,
            notes: Vec::new(),
            history: StatusHistory::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = status;
        self
    }
}

impl Entity for Ticket {
    type Status = TicketStatus;
    type Event = TicketEvent;

    fn urn(&self) -> &str {
        &self.urn
    }

    fn status(&self) -> TicketStatus {
        self.status
    }

    fn set_status(&mut self, status: TicketStatus) {
        self.status = status;
    }

    fn secondary_key(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    fn record_change(&mut self, change: StatusChange<TicketStatus>) {
        self.history = self.history.record(change);
    }
}

/// open -> triaged -> escalated (priority > 2) -> closed, with reject from
/// open or triaged.
pub fn ticket_table() -> TransitionTable<Ticket> {
    let build = || -> Result<TransitionTable<Ticket>, crate::table::BuildError> {
        TableBuilder::<Ticket>::new()
            .initial(TicketStatus::Open)
            .transition(
                TransitionBuilder::new()
                    .from(TicketStatus::Open)
                    .on(TicketEvent::Triage)
                    .to(TicketStatus::Triaged),
            )?
            .transition(
                TransitionBuilder::new()
                    .from_any([TicketStatus::Open, TicketStatus::Triaged])
                    .on(TicketEvent::Escalate)
                    .to(TicketStatus::Escalated)
                    .when("high priority", |t: &Ticket, _| t.priority > 2),
            )?
            .transition(
                TransitionBuilder::new()
                    .from_any([
                        TicketStatus::Open,
                        TicketStatus::Triaged,
                        TicketStatus::Escalated,
                    ])
                    .on(TicketEvent::Close)
                    .to(TicketStatus::Closed),
            )?
            .transition(
                TransitionBuilder::new()
                    .from_any([TicketStatus::Open, TicketStatus::Triaged])
                    .on(TicketEvent::Reject)
                    .to(TicketStatus::Rejected),
            )?
            .build()
    };
    build().expect("ticket table is valid")
}
