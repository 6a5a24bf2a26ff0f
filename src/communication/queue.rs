//! Command queue with strict request/acknowledge pacing.
//!
//! The firmware line-buffers commands and answers each one with an
//! acknowledgment, so at most one command is ever outstanding. Pending
//! commands are held here until the previous one is acknowledged.

use std::collections::VecDeque;

/// A single line to send to the firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    pub comment: Option<String>,
    /// Ordinal of the countable file line this command came from.
    pub line: Option<usize>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            comment: None,
            line: None,
        }
    }

    pub fn with_comment(text: impl Into<String>, comment: Option<String>) -> Self {
        Self {
            text: text.into(),
            comment,
            line: None,
        }
    }

    pub fn from_file_line(text: impl Into<String>, comment: Option<String>, line: usize) -> Self {
        Self {
            text: text.into(),
            comment,
            line: Some(line),
        }
    }

    pub fn is_file_line(&self) -> bool {
        self.line.is_some()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.comment {
            Some(comment) => write!(f, "{} ;{}", self.text, comment),
            None => write!(f, "{}", self.text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
    in_flight: Option<Command>,
    busy: bool,
    window_size: usize,
    refill_threshold: usize,
}

impl CommandQueue {
    pub fn new(window_size: usize, refill_threshold: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(window_size),
            in_flight: None,
            busy: false,
            window_size,
            refill_threshold,
        }
    }

    /// Appends a command. Returns true when the channel is idle and draining should start.
    pub fn push(&mut self, command: Command) -> bool {
        self.pending.push_back(command);
        !self.busy
    }

    /// Places commands ahead of everything already pending, preserving their order.
    pub fn push_front_all(&mut self, commands: impl IntoIterator<Item = Command>) {
        let commands: Vec<Command> = commands.into_iter().collect();
        for command in commands.into_iter().rev() {
            self.pending.push_front(command);
        }
    }

    /// Pops the head and records it as in flight. When nothing is pending the
    /// channel becomes idle and `None` is returned.
    pub fn begin_next(&mut self) -> Option<Command> {
        debug_assert!(self.in_flight.is_none(), "a command is already in flight");
        match self.pending.pop_front() {
            Some(command) => {
                self.busy = true;
                self.in_flight = Some(command.clone());
                Some(command)
            }
            None => {
                self.busy = false;
                None
            }
        }
    }

    /// Ends the in-flight command. The channel stays busy until `begin_next` runs.
    pub fn acknowledge(&mut self) -> Option<Command> {
        self.in_flight.take()
    }

    /// Marks the channel idle without dispatching, used when draining is gated.
    pub fn hold(&mut self) {
        if self.in_flight.is_none() {
            self.busy = false;
        }
    }

    /// Removes pending commands that came from the file and returns how many were withdrawn.
    pub fn withdraw_file_lines(&mut self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|command| !command.is_file_line());
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = None;
        self.busy = false;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn in_flight(&self) -> Option<&Command> {
        self.in_flight.as_ref()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn refill_threshold(&self) -> usize {
        self.refill_threshold
    }

    /// Low-water mark reached: the producer should top the queue up.
    pub fn needs_refill(&self) -> bool {
        self.pending.len() < self.refill_threshold
    }

    pub fn has_room(&self) -> bool {
        self.pending.len() < self.window_size
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(20, 10)
    }
}
