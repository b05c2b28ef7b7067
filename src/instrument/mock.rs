//! Scripted in-memory session for tests.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::session::{Session, TransportError};

/// Replies to queries from a per-command script and records everything sent.
pub struct ScriptedSession {
    resource: String,
    replies: HashMap<String, VecDeque<String>>,
    raw: VecDeque<Vec<u8>>,
    pub sent: Vec<String>,
    closed: Rc<Cell<bool>>,
}

impl ScriptedSession {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            replies: HashMap::new(),
            raw: VecDeque::new(),
            sent: Vec::new(),
            closed: Rc::new(Cell::new(false)),
        }
    }

    pub fn reply(mut self, command: &str, response: &str) -> Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push_back(response.to_string());
        self
    }

    pub fn raw_reply(mut self, bytes: Vec<u8>) -> Self {
        self.raw.push_back(bytes);
        self
    }

    pub fn closed_flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.closed)
    }
}

impl Session for ScriptedSession {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        if self.closed.get() {
            return Err(TransportError::NotOpen(self.resource.clone()));
        }
        self.sent.push(command.to_string());
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.write(command)?;
        self.replies
            .get_mut(command)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TransportError::Timeout {
                resource: self.resource.clone(),
                timeout_ms: 0,
            })
    }

    fn read_raw(&mut self) -> Result<Vec<u8>, TransportError> {
        self.raw.pop_front().ok_or_else(|| TransportError::Timeout {
            resource: self.resource.clone(),
            timeout_ms: 0,
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed.set(true);
        Ok(())
    }
}
