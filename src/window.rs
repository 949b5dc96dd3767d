//! Partitioning of the inbound message stream into windows.
//!
//! A window is the contiguous run of messages answering one submission. It is
//! closed by a boundary message (ReadyForQuery at the connection level).

use std::collections::VecDeque;

use crate::error::{Error, Result, ServerError};
use crate::protocol::backend::BackendMessage;
use crate::protocol::types::TransactionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowState {
    Outside,
    Inside,
}

/// Event emitted by [`Windower::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The message opened a new window.
    pub opened: bool,
    /// The message closed the current window.
    pub closed: bool,
}

/// Window event, in the order a consumer must apply them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent<T> {
    Open,
    Message(T),
    Close,
}

/// Two-state automaton classifying each message against the current window.
///
/// - non-boundary while outside: opens a window
/// - boundary while inside: closes it
/// - boundary while outside: opens and closes a single-message window
pub struct Windower<F> {
    state: WindowState,
    is_boundary: F,
}

impl<F> Windower<F> {
    pub fn new(is_boundary: F) -> Self {
        Self {
            state: WindowState::Outside,
            is_boundary,
        }
    }

    /// Returns true while a window is open.
    pub fn is_inside(&self) -> bool {
        self.state == WindowState::Inside
    }

    /// Classify the next message.
    pub fn push<T>(&mut self, message: &T) -> Transition
    where
        F: Fn(&T) -> bool,
    {
        let boundary = (self.is_boundary)(message);
        let opened = self.state == WindowState::Outside;
        self.state = if boundary {
            WindowState::Outside
        } else {
            WindowState::Inside
        };
        Transition {
            opened,
            closed: boundary,
        }
    }

    /// Classify the next message and expand it into events.
    pub fn events<T>(&mut self, message: T) -> Vec<WindowEvent<T>>
    where
        F: Fn(&T) -> bool,
    {
        let transition = self.push(&message);
        let mut events = Vec::with_capacity(3);
        if transition.opened {
            events.push(WindowEvent::Open);
        }
        events.push(WindowEvent::Message(message));
        if transition.closed {
            events.push(WindowEvent::Close);
        }
        events
    }
}

/// Messages answering one submission, in receipt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window<T = BackendMessage> {
    messages: Vec<T>,
}

impl<T> Window<T> {
    pub fn new(messages: Vec<T>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[T] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<T> {
        self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl<T> Default for Window<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> IntoIterator for Window<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Window<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl Window<BackendMessage> {
    /// First ErrorResponse in the window.
    pub fn error(&self) -> Option<&ServerError> {
        self.messages.iter().find_map(|msg| match msg {
            BackendMessage::ErrorResponse(err) => Some(err),
            _ => None,
        })
    }

    /// Fail with the first ErrorResponse, if any.
    pub fn into_result(self) -> Result<Self> {
        match self.error() {
            Some(err) => Err(Error::Server(err.clone())),
            None => Ok(self),
        }
    }

    /// Status reported by the last ReadyForQuery in the window.
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.messages.iter().rev().find_map(BackendMessage::ready_status)
    }
}

/// Feeds a [`Windower`] and keeps completed windows in arrival order.
pub struct WindowCollector<T, F> {
    windower: Windower<F>,
    open: Vec<T>,
    completed: VecDeque<Window<T>>,
}

impl<T, F: Fn(&T) -> bool> WindowCollector<T, F> {
    pub fn new(is_boundary: F) -> Self {
        Self {
            windower: Windower::new(is_boundary),
            open: Vec::new(),
            completed: VecDeque::new(),
        }
    }

    /// Add a message; returns true if it completed a window.
    pub fn push(&mut self, message: T) -> bool {
        let transition = self.windower.push(&message);
        self.open.push(message);
        if transition.closed {
            let window = Window::new(std::mem::take(&mut self.open));
            self.completed.push_back(window);
        }
        transition.closed
    }

    /// Oldest completed window.
    pub fn pop(&mut self) -> Option<Window<T>> {
        self.completed.pop_front()
    }

    /// Number of completed, undelivered windows.
    pub fn completed(&self) -> usize {
        self.completed.len()
    }

    /// Messages of the window still open.
    pub fn open_messages(&self) -> &[T] {
        &self.open
    }

    /// Take the open window's messages, leaving the automaton outside.
    pub fn take_open(&mut self) -> Vec<T> {
        self.windower.state = WindowState::Outside;
        std::mem::take(&mut self.open)
    }
}

/// Split `messages` into completed windows and the trailing open remainder.
pub fn split_windows<T, F>(messages: impl IntoIterator<Item = T>, is_boundary: F) -> (Vec<Vec<T>>, Vec<T>)
where
    F: Fn(&T) -> bool,
{
    let mut collector = WindowCollector::new(is_boundary);
    for message in messages {
        collector.push(message);
    }
    let remainder = collector.take_open();
    let windows = collector.completed.into_iter().map(Window::into_messages).collect();
    (windows, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_upper(c: &char) -> bool {
        c.is_ascii_uppercase()
    }

    #[test]
    fn windows_close_on_boundary() {
        let (windows, open) = split_windows("abBcBd".chars(), is_upper);
        assert_eq!(windows, vec![vec!['a', 'b', 'B'], vec!['c', 'B']]);
        assert_eq!(open, vec!['d']);
    }

    #[test]
    fn boundary_outside_is_single_message_window() {
        let (windows, open) = split_windows("BaB".chars(), is_upper);
        assert_eq!(windows, vec![vec!['B'], vec!['a', 'B']]);
        assert!(open.is_empty());
    }

    #[test]
    fn events_follow_automaton() {
        let mut windower = Windower::new(is_upper);
        assert_eq!(
            windower.events('a'),
            vec![WindowEvent::Open, WindowEvent::Message('a')]
        );
        assert!(windower.is_inside());
        assert_eq!(windower.events('b'), vec![WindowEvent::Message('b')]);
        assert_eq!(
            windower.events('B'),
            vec![WindowEvent::Message('B'), WindowEvent::Close]
        );
        assert_eq!(
            windower.events('C'),
            vec![WindowEvent::Open, WindowEvent::Message('C'), WindowEvent::Close]
        );
        assert!(!windower.is_inside());
    }

    #[test]
    fn collector_delivers_in_order() {
        let mut collector = WindowCollector::new(is_upper);
        for c in "xYzW".chars() {
            collector.push(c);
        }
        assert_eq!(collector.completed(), 2);
        assert_eq!(collector.pop().unwrap().into_messages(), vec!['x', 'Y']);
        assert_eq!(collector.pop().unwrap().into_messages(), vec!['z', 'W']);
        assert!(collector.pop().is_none());
    }

    #[test]
    fn window_error_and_status() {
        let window = Window::new(vec![
            BackendMessage::ErrorResponse(ServerError::default()),
            crate::protocol::backend::ReadyForQuery::message(TransactionStatus::Failed),
        ]);
        assert!(window.error().is_some());
        assert_eq!(window.transaction_status(), Some(TransactionStatus::Failed));
        assert!(matches!(window.into_result(), Err(Error::Server(_))));
    }
}
