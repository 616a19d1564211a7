//! The in-memory record of one presentation and its state transitions.
//!
//! Everything here is synchronous and side-effect free; the session actor
//! owns a `Session` and is the only thing that calls the mutating methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::protocol::Command;

pub type SessionId = String;
pub type ConnectionId = String;

/// How a connection relates to a session it participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Remote,
}

/// The convergent part of a session: what every party should be showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideState {
    pub current_slide: usize,
    pub total_slides: usize,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub host_connection_id: ConnectionId,
    current_slide: usize,
    total_slides: usize,
    remotes: HashSet<ConnectionId>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, host_connection_id: ConnectionId) -> Self {
        Self {
            id,
            host_connection_id,
            current_slide: 0,
            total_slides: 0,
            remotes: HashSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn slide_state(&self) -> SlideState {
        SlideState {
            current_slide: self.current_slide,
            total_slides: self.total_slides,
        }
    }

    /// Authorization predicate shared by every handler.
    pub fn is_member(&self, connection_id: &str, role: Role) -> bool {
        match role {
            Role::Host => self.host_connection_id == connection_id,
            Role::Remote => self.remotes.contains(connection_id),
        }
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Adds a remote and returns the new remote count. Re-adding is a no-op.
    pub fn add_remote(&mut self, connection_id: ConnectionId) -> usize {
        self.remotes.insert(connection_id);
        self.remotes.len()
    }

    /// Removes a remote, returning the remaining count if it was present.
    pub fn remove_remote(&mut self, connection_id: &str) -> Option<usize> {
        self.remotes
            .remove(connection_id)
            .then_some(self.remotes.len())
    }

    /// Applies a remote command. Only navigation commands move the slide;
    /// the others are UI toggles relayed to the host untouched.
    pub fn apply_command(&mut self, command: &Command) -> SlideState {
        let last = self.last_index();
        match command {
            Command::Next => {
                self.current_slide = (self.current_slide + 1).min(last);
            }
            Command::Previous => {
                self.current_slide = self.current_slide.saturating_sub(1);
            }
            Command::Goto { index } => {
                self.current_slide = clamp_index(*index, last);
            }
            Command::Scroll { .. }
            | Command::ScrollSync { .. }
            | Command::Presenter { .. }
            | Command::Focus { .. } => {}
        }
        self.slide_state()
    }

    /// Authoritative push from the host.
    pub fn apply_update(&mut self, current_slide: usize, total_slides: usize) -> SlideState {
        self.total_slides = total_slides;
        self.current_slide = current_slide.min(self.last_index());
        self.slide_state()
    }

    fn last_index(&self) -> usize {
        self.total_slides.saturating_sub(1)
    }
}

fn clamp_index(index: i64, last: usize) -> usize {
    usize::try_from(index).map_or(0, |i| i.min(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ScrollDirection;

    fn session_with(current: usize, total: usize) -> Session {
        let mut s = Session::new("abc12345".into(), "host".into());
        s.apply_update(current, total);
        s
    }

    #[test]
    fn test_new_session_is_empty() {
        let s = Session::new("abc12345".into(), "host".into());
        assert_eq!(
            s.slide_state(),
            SlideState {
                current_slide: 0,
                total_slides: 0
            }
        );
        assert_eq!(s.remote_count(), 0);
    }

    #[test]
    fn test_next_advances() {
        let mut s = session_with(2, 5);
        assert_eq!(s.apply_command(&Command::Next).current_slide, 3);
    }

    #[test]
    fn test_next_at_last_slide_stays() {
        let mut s = session_with(4, 5);
        assert_eq!(s.apply_command(&Command::Next).current_slide, 4);
    }

    #[test]
    fn test_previous_at_first_slide_stays() {
        let mut s = session_with(0, 5);
        assert_eq!(s.apply_command(&Command::Previous).current_slide, 0);
    }

    #[test]
    fn test_navigation_on_empty_session_stays_at_zero() {
        let mut s = session_with(0, 0);
        assert_eq!(s.apply_command(&Command::Next).current_slide, 0);
        assert_eq!(s.apply_command(&Command::Previous).current_slide, 0);
        assert_eq!(
            s.apply_command(&Command::Goto { index: 3 }).current_slide,
            0
        );
    }

    #[test]
    fn test_goto_clamps_both_ends() {
        let mut s = session_with(1, 5);
        assert_eq!(
            s.apply_command(&Command::Goto { index: 3 }).current_slide,
            3
        );
        assert_eq!(
            s.apply_command(&Command::Goto { index: 99 }).current_slide,
            4
        );
        assert_eq!(
            s.apply_command(&Command::Goto { index: -2 }).current_slide,
            0
        );
    }

    #[test]
    fn test_toggles_do_not_move_slide() {
        let mut s = session_with(2, 5);
        let commands = [
            Command::Scroll {
                direction: ScrollDirection::Down,
            },
            Command::ScrollSync { position: 120.5 },
            Command::Presenter { toggle: Some(true) },
            Command::Focus { toggle: None },
        ];
        for command in &commands {
            assert_eq!(s.apply_command(command).current_slide, 2);
        }
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut s = session_with(0, 0);
        let first = s.apply_update(2, 5);
        let second = s.apply_update(2, 5);
        assert_eq!(first, second);
        assert_eq!(s.slide_state(), first);
    }

    #[test]
    fn test_update_clamps_current_into_range() {
        let mut s = session_with(0, 0);
        assert_eq!(s.apply_update(9, 3).current_slide, 2);
    }

    #[test]
    fn test_membership_roles() {
        let mut s = Session::new("abc12345".into(), "host".into());
        assert_eq!(s.add_remote("r1".into()), 1);
        assert_eq!(s.add_remote("r1".into()), 1);

        assert!(s.is_member("host", Role::Host));
        assert!(!s.is_member("host", Role::Remote));
        assert!(s.is_member("r1", Role::Remote));
        assert!(!s.is_member("r1", Role::Host));
        assert!(!s.is_member("stranger", Role::Host));
        assert!(!s.is_member("stranger", Role::Remote));

        assert_eq!(s.remove_remote("r1"), Some(0));
        assert_eq!(s.remove_remote("r1"), None);
    }
}
