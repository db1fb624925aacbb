use std::time::Duration;

use log::{debug, warn};

use crate::models::MessageRecord;
use crate::render::{render_or_update, MessageList, Rendered};
use crate::storage::{Action, ChangeEvent, Query};

pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(50);

/// Ticket for a pending scroll. Only the most recent ticket fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest(u64);

#[derive(Debug, Default)]
pub struct Projection {
    list: MessageList,
    scroll_generation: u64,
    scroll_pending: bool,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query() -> Query {
        Query::messages()
    }

    pub fn messages(&self) -> &MessageList {
        &self.list
    }

    /// Applies one change event. Returns a scroll ticket to be redeemed with
    /// [`Projection::scroll_due`] once [`SCROLL_DEBOUNCE`] has elapsed.
    pub fn apply(&mut self, event: ChangeEvent, current_user: Option<&str>) -> Option<ScrollRequest> {
        match event.action {
            Action::Initial | Action::Added => {
                let record = self.accept(&event)?;
                let is_own = current_user == Some(record.sender.as_str());
                if let Rendered::New(node) = render_or_update(&mut self.list, &event.id, &record, is_own) {
                    self.list.append(node);
                }
                Some(self.schedule_scroll())
            }
            Action::Updated => {
                let record = self.accept(&event)?;
                let is_own = current_user == Some(record.sender.as_str());
                if let Rendered::New(_) = render_or_update(&mut self.list, &event.id, &record, is_own) {
                    debug!("Update for message {} that is not on screen", event.id);
                }
                None
            }
            Action::Removed => {
                if !self.list.remove(&event.id) {
                    debug!("Removal for message {} that is not on screen", event.id);
                }
                None
            }
            Action::Other(ref action) => {
                warn!("Unhandled action {} for message {}", action, event.id);
                None
            }
        }
    }

    /// True when `request` is still the latest scroll ticket.
    pub fn scroll_due(&mut self, request: ScrollRequest) -> bool {
        if self.scroll_pending && request.0 == self.scroll_generation {
            self.scroll_pending = false;
            true
        } else {
            false
        }
    }

    fn schedule_scroll(&mut self) -> ScrollRequest {
        self.scroll_generation = self.scroll_generation.wrapping_add(1);
        self.scroll_pending = true;
        ScrollRequest(self.scroll_generation)
    }

    fn accept(&self, event: &ChangeEvent) -> Option<MessageRecord> {
        match MessageRecord::from_value(event.value.as_ref()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Dropping message {}: {}", event.id, e);
                None
            }
        }
    }
}
